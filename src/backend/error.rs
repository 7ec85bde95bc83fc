use ash::vk;
use thiserror::Error;

use super::vulkan::FrameState;

/// Errors on the per-frame path. Only `OutOfDate` is expected in normal
/// operation; the caller rebuilds the swapchain and tries again next frame.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("Swapchain is out of date and must be rebuilt")]
    OutOfDate,
    #[error("{op} called while the frame is {state:?}")]
    OutOfOrder { op: &'static str, state: FrameState },
    #[error("Vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),
}

impl FrameError {
    /// Whether a swapchain rebuild is enough to continue rendering
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::OutOfDate)
    }
}

/// Context-level failures callers may want to match on
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("Descriptor pool exhausted")]
    DescriptorPoolExhausted,
    #[error("A Vulkan context is already live in this process")]
    AlreadyLive,
    #[error("Graphics context used before init or after shutdown")]
    NotInitialized,
    #[error("Vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),
}

/// Outcome of a successful present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    /// Presented, but the swapchain no longer matches the surface exactly
    Suboptimal,
    /// Not presented; the swapchain must be rebuilt
    OutOfDate,
}

impl PresentStatus {
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, PresentStatus::Optimal)
    }
}
