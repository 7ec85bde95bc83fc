// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// The handle, its images and one view per image are created together and
// torn down together: views first, then the handle.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::ops::DeviceOps;
use super::VulkanDevice;

/// Negotiated parameters a swapchain is built from
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub surface: vk::SurfaceKHR,
    pub format: vk::SurfaceFormatKHR,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub present_mode: vk::PresentModeKHR,
    pub usage: vk::ImageUsageFlags,
    pub queue_family: u32,
    pub min_image_count: u32,
    pub extent: vk::Extent2D,
}

pub struct VulkanSwapchain<D: DeviceOps = VulkanDevice> {
    handle: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    /// Owned by the swapchain handle, valid exactly as long as it is
    images: Vec<vk::Image>,
    /// Owned by us, 1:1 with `images`
    image_views: Vec<vk::ImageView>,
    min_image_count: u32,
    device: Arc<D>,
}

impl<D: DeviceOps> VulkanSwapchain<D> {
    /// Build the swapchain, fetch its images and create their views.
    ///
    /// Either everything exists afterwards or nothing does: on failure the
    /// partially created objects are released before the error is returned.
    pub fn new(device: Arc<D>, desc: &SwapchainDesc) -> Result<Self> {
        log::info!(
            "Creating swapchain: {}x{} {:?} {:?}, min {} images",
            desc.extent.width,
            desc.extent.height,
            desc.format.format,
            desc.present_mode,
            desc.min_image_count
        );
        debug_assert!(desc.min_image_count >= desc.capabilities.min_image_count);
        debug_assert!(
            desc.capabilities.max_image_count == 0
                || desc.min_image_count <= desc.capabilities.max_image_count
        );

        let queue_family_indices = [desc.queue_family];
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(desc.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.format.format)
            .image_color_space(desc.format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(desc.usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(&queue_family_indices)
            .pre_transform(desc.capabilities.current_transform)
            .composite_alpha(choose_composite_alpha(desc.capabilities.supported_composite_alpha))
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let handle = device
            .create_swapchain(&create_info)
            .context("Failed to create swapchain")?;

        let images = match device.swapchain_images(handle) {
            Ok(images) => images,
            Err(e) => {
                device.destroy_swapchain(handle);
                return Err(e).context("Failed to get swapchain images");
            }
        };

        if (images.len() as u32) < desc.min_image_count {
            device.destroy_swapchain(handle);
            anyhow::bail!(
                "Swapchain returned {} images, fewer than the {} requested",
                images.len(),
                desc.min_image_count
            );
        }

        let image_views = match create_image_views(device.as_ref(), &images, desc.format.format) {
            Ok(views) => views,
            Err(e) => {
                device.destroy_swapchain(handle);
                return Err(e);
            }
        };

        log::info!(
            "Requested {} images, created {} images",
            desc.min_image_count,
            images.len()
        );

        Ok(Self {
            handle,
            format: desc.format,
            present_mode: desc.present_mode,
            extent: desc.extent,
            images,
            image_views,
            min_image_count: desc.min_image_count,
            device,
        })
    }

    /// Release image views, then the swapchain handle. Safe to call again;
    /// later calls do nothing.
    ///
    /// The caller guarantees no queue operation still references the images
    /// (wait idle first).
    pub fn destroy(&mut self) {
        if self.handle == vk::SwapchainKHR::null() {
            return;
        }

        for view in self.image_views.drain(..) {
            self.device.destroy_image_view(view);
        }
        log::debug!("Swapchain image views destroyed");

        // Images die with the handle
        self.images.clear();
        self.device.destroy_swapchain(self.handle);
        self.handle = vk::SwapchainKHR::null();
        log::debug!("Swapchain destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.handle == vk::SwapchainKHR::null()
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// `None` when `index` is outside `[0, image_count)`
    pub fn image(&self, index: u32) -> Option<vk::Image> {
        self.images.get(index as usize).copied()
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// `None` when `index` is outside `[0, image_count)`
    pub fn image_view(&self, index: u32) -> Option<vk::ImageView> {
        self.image_views.get(index as usize).copied()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    pub fn min_image_count(&self) -> u32 {
        self.min_image_count
    }
}

impl<D: DeviceOps> Drop for VulkanSwapchain<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// One 2D colour view per image; on failure the views made so far are
/// destroyed again
fn create_image_views<D: DeviceOps + ?Sized>(
    device: &D,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(images.len());

    for &image in images {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        match device.create_image_view(&create_info) {
            Ok(view) => views.push(view),
            Err(e) => {
                for view in views {
                    device.destroy_image_view(view);
                }
                return Err(e).context("Failed to create image view");
            }
        }
    }

    Ok(views)
}

fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|&mode| supported.contains(mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}
