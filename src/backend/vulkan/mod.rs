// Vulkan backend
//
// device      - instance, surface, physical + logical device (ash)
// ops         - the device calls everything above `device` goes through
// negotiate   - surface format / present mode / image count / extent choices
// swapchain   - swapchain handle, images and views
// queue       - sync objects and the acquire/submit/present protocol
// render_pass - colour pass + framebuffers over the swapchain views
// context     - owns all of the above, rebuild + shutdown

mod context;
mod device;
mod negotiate;
mod ops;
mod queue;
mod render_pass;
mod swapchain;

#[cfg(test)]
pub(crate) mod fake;

pub use context::{FrameTarget, VulkanContext, VulkanHandles};
pub use device::VulkanDevice;
pub use negotiate::{Negotiated, SwapchainSupport};
pub use ops::DeviceOps;
pub use queue::{AcquiredImage, FrameState, VulkanQueue};
pub use swapchain::{SwapchainDesc, VulkanSwapchain};
