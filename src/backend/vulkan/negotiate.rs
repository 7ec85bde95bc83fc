// Swapchain negotiation
//
// Pure choices made from what the surface reports. Kept apart from the
// swapchain itself so every rebuild re-runs the same rules on fresh data.

use anyhow::{Context, Result};
use ash::vk;

use super::ops::DeviceOps;

pub const PREFERRED_FORMAT: vk::Format = vk::Format::B8G8R8A8_SRGB;
pub const PREFERRED_COLOR_SPACE: vk::ColorSpaceKHR = vk::ColorSpaceKHR::SRGB_NONLINEAR;

/// Everything the surface reports, queried fresh for every (re)build
#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query<D: DeviceOps + ?Sized>(device: &D, surface: vk::SurfaceKHR) -> Result<Self> {
        let capabilities = device
            .surface_capabilities(surface)
            .context("Failed to query surface capabilities")?;
        let formats = device
            .surface_formats(surface)
            .context("Failed to query surface formats")?;
        let present_modes = device
            .surface_present_modes(surface)
            .context("Failed to query surface present modes")?;

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }
}

/// The full set of negotiated swapchain parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub min_image_count: u32,
    pub extent: vk::Extent2D,
}

impl SwapchainSupport {
    pub fn negotiate(
        &self,
        preferred_present_mode: vk::PresentModeKHR,
        requested_image_count: u32,
        framebuffer_size: (u32, u32),
    ) -> Result<Negotiated> {
        Ok(Negotiated {
            format: choose_surface_format(&self.formats)?,
            present_mode: choose_present_mode(preferred_present_mode, &self.present_modes),
            min_image_count: choose_image_count(requested_image_count, &self.capabilities),
            extent: choose_extent(&self.capabilities, framebuffer_size),
        })
    }
}

/// Prefer SRGB BGRA8, otherwise whatever the surface lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == PREFERRED_FORMAT && f.color_space == PREFERRED_COLOR_SPACE)
        .or_else(|| formats.first())
        .copied()
        .context("Surface reports no supported formats")
}

/// The preferred (low-latency) mode when supported, else FIFO which every
/// implementation must support
pub fn choose_present_mode(
    preferred: vk::PresentModeKHR,
    available: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Clamp the requested count into `[min, max]`; `max == 0` means unbounded
pub fn choose_image_count(requested: u32, capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let max = if capabilities.max_image_count > 0 {
        capabilities.max_image_count
    } else {
        u32::MAX
    };
    requested.max(capabilities.min_image_count).min(max)
}

/// The surface's current extent, or the framebuffer size clamped to the
/// allowed range when the surface leaves it to us (`u32::MAX` sentinel)
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer_size: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = framebuffer_size;
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}
