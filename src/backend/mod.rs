// Backend module - graphics context abstraction
//
// One contract (`GraphicsContext`) for bringing a backend up on a window and
// tearing it down again, and one closed set of backends (`RenderBackend`)
// the frame loop dispatches on. Backend-specific work (swapchain rebuilds,
// submits, buffer swaps) lives on the concrete types.

pub mod error;
pub mod opengl;
pub mod vulkan;

pub use error::{ContextError, FrameError, PresentStatus};
pub use opengl::OpenGlContext;
pub use vulkan::{VulkanContext, VulkanHandles};

use anyhow::Result;
use ash::vk;
use glam::Vec4;
use serde::Deserialize;

use crate::window::NativeWindow;

/// Init/shutdown contract shared by every backend
pub trait GraphicsContext {
    /// Bind to `window` and do all one-time setup. There is no fallback: an
    /// error here means the application cannot render and should exit.
    fn init(window: &dyn NativeWindow, settings: &ContextSettings) -> Result<Self>
    where
        Self: Sized;

    /// Release every backend resource. Later calls are logged no-ops.
    fn shutdown(&mut self);
}

/// Which graphics API to bring up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Vulkan,
    OpenGl,
}

/// Everything a backend needs at init, resolved from config
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSettings {
    pub app_name: String,
    pub enable_validation: bool,
    /// Preferred Vulkan present mode; FIFO is used when unsupported
    pub present_mode: vk::PresentModeKHR,
    pub min_image_count: u32,
    /// Descriptors of each type in the shared pool
    pub descriptor_pool_size: u32,
    pub clear_color: Vec4,
    /// OpenGL swap interval
    pub vsync: bool,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            app_name: "Render Context".to_string(),
            enable_validation: cfg!(debug_assertions),
            present_mode: vk::PresentModeKHR::MAILBOX,
            min_image_count: 2,
            descriptor_pool_size: 1000,
            clear_color: Vec4::new(0.1, 0.1, 0.1, 1.0),
            vsync: true,
        }
    }
}

/// The active backend. One per application, owned by the frame loop.
pub enum RenderBackend {
    Vulkan(VulkanContext),
    OpenGl(OpenGlContext),
}

impl RenderBackend {
    /// Create and initialize the selected backend
    pub fn create(api: Backend, window: &dyn NativeWindow, settings: &ContextSettings) -> Result<Self> {
        log::info!("Creating {:?} backend", api);
        Ok(match api {
            Backend::Vulkan => RenderBackend::Vulkan(VulkanContext::init(window, settings)?),
            Backend::OpenGl => RenderBackend::OpenGl(OpenGlContext::init(window, settings)?),
        })
    }

    pub fn api(&self) -> Backend {
        match self {
            RenderBackend::Vulkan(_) => Backend::Vulkan,
            RenderBackend::OpenGl(_) => Backend::OpenGl,
        }
    }

    pub fn vulkan(&self) -> Option<&VulkanContext> {
        match self {
            RenderBackend::Vulkan(context) => Some(context),
            _ => None,
        }
    }

    pub fn vulkan_mut(&mut self) -> Option<&mut VulkanContext> {
        match self {
            RenderBackend::Vulkan(context) => Some(context),
            _ => None,
        }
    }

    pub fn opengl(&self) -> Option<&OpenGlContext> {
        match self {
            RenderBackend::OpenGl(context) => Some(context),
            _ => None,
        }
    }

    pub fn opengl_mut(&mut self) -> Option<&mut OpenGlContext> {
        match self {
            RenderBackend::OpenGl(context) => Some(context),
            _ => None,
        }
    }

    /// Vulkan stores it premultiplied, OpenGL as given
    pub fn set_clear_color(&mut self, color: Vec4) {
        match self {
            RenderBackend::Vulkan(context) => context.set_clear_color(color),
            RenderBackend::OpenGl(context) => context.set_clear_color(color),
        }
    }

    /// Apply settings changed at runtime (config reload). Swapchain
    /// preferences take effect at the next Vulkan rebuild.
    pub fn apply_settings(&mut self, settings: &ContextSettings) {
        self.set_clear_color(settings.clear_color);
        match self {
            RenderBackend::Vulkan(context) => {
                context.set_present_preferences(settings.present_mode, settings.min_image_count)
            }
            RenderBackend::OpenGl(context) => context.set_vsync(settings.vsync),
        }
    }

    /// Window resize notification
    pub fn handle_resize(&mut self, width: u32, height: u32) {
        match self {
            RenderBackend::Vulkan(context) => context.set_rebuild_swapchain(true),
            RenderBackend::OpenGl(context) => context.resize(width, height),
        }
    }

    /// Clear and present one frame. Skipped frames (stale swapchain,
    /// minimized window) are not errors.
    pub fn render_frame(&mut self, window: &dyn NativeWindow) -> Result<()> {
        match self {
            RenderBackend::Vulkan(context) => {
                if let Some(target) = context.begin_frame(window)? {
                    context.record_clear_pass(&target);
                    context.end_frame(target)?;
                }
                Ok(())
            }
            RenderBackend::OpenGl(context) => {
                context.clear();
                context.swap_buffers()
            }
        }
    }

    pub fn shutdown(&mut self) {
        match self {
            RenderBackend::Vulkan(context) => GraphicsContext::shutdown(context),
            RenderBackend::OpenGl(context) => GraphicsContext::shutdown(context),
        }
    }
}
