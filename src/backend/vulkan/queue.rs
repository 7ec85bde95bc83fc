// Queue + frame synchronization
//
// One graphics/present queue and the sync objects for a single frame in
// flight:
//
//   wait_and_reset_fences -> acquire_next_image -> submit -> present
//
// image_available: acquire signals, submit waits
// render_finished: submit signals, present waits
// in_flight:       submit signals, next wait_and_reset_fences waits + resets
//
// The fence is only waited on when a submission is actually outstanding.
// After an out-of-date acquire nothing was submitted, so the next frame
// must not block on it again.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::ops::DeviceOps;
use super::swapchain::VulkanSwapchain;
use super::VulkanDevice;
use crate::backend::error::{FrameError, PresentStatus};

/// Where the queue is in the per-frame protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Acquired,
    Submitted,
    Presenting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    /// Signaled, nothing outstanding
    Signaled,
    /// Reset, ready to be handed to the next submission
    Armed,
    /// Handed to a submission the CPU has not waited for
    Pending,
}

/// Result of a successful acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    pub index: u32,
    /// Usable, but the swapchain should be rebuilt soon
    pub suboptimal: bool,
}

/// Frame synchronization - one set, one frame in flight
struct FrameSync {
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
}

impl FrameSync {
    fn new<D: DeviceOps>(device: &D) -> Result<Self> {
        let image_available = device
            .create_semaphore()
            .context("Failed to create image-available semaphore")?;
        let render_finished = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_semaphore(image_available);
                return Err(e).context("Failed to create render-finished semaphore");
            }
        };
        // Start signaled so the very first frame does not wait
        let in_flight = match device.create_fence(true) {
            Ok(fence) => fence,
            Err(e) => {
                device.destroy_semaphore(render_finished);
                device.destroy_semaphore(image_available);
                return Err(e).context("Failed to create in-flight fence");
            }
        };

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    fn destroy<D: DeviceOps>(&self, device: &D) {
        device.destroy_semaphore(self.image_available);
        device.destroy_semaphore(self.render_finished);
        device.destroy_fence(self.in_flight);
    }
}

pub struct VulkanQueue<D: DeviceOps = VulkanDevice> {
    device: Arc<D>,
    queue: vk::Queue,
    family_index: u32,
    sync: Option<FrameSync>,
    frame_state: FrameState,
    fence_state: FenceState,
    image_index: Option<u32>,
}

impl<D: DeviceOps> VulkanQueue<D> {
    /// Fetch queue `queue_index` of `family_index` and create its sync
    /// objects. The family must have been resolved at device creation.
    pub fn new(device: Arc<D>, family_index: u32, queue_index: u32) -> Result<Self> {
        let queue = device.device_queue(family_index, queue_index);
        let sync = FrameSync::new(device.as_ref())?;
        log::debug!("Queue {}:{} ready", family_index, queue_index);

        Ok(Self {
            device,
            queue,
            family_index,
            sync: Some(sync),
            frame_state: FrameState::Idle,
            fence_state: FenceState::Signaled,
            image_index: None,
        })
    }

    fn sync(&self, op: &'static str) -> Result<&FrameSync, FrameError> {
        self.sync.as_ref().ok_or(FrameError::OutOfOrder {
            op,
            state: self.frame_state,
        })
    }

    fn expect_state(&self, op: &'static str, expected: FrameState) -> Result<(), FrameError> {
        if self.frame_state == expected {
            Ok(())
        } else {
            Err(FrameError::OutOfOrder {
                op,
                state: self.frame_state,
            })
        }
    }

    /// Block until the previous submission finished, then reset the fence
    /// for the next one. Does not block when nothing is outstanding.
    pub fn wait_and_reset_fences(&mut self) -> Result<(), FrameError> {
        self.expect_state("wait_and_reset_fences", FrameState::Idle)?;
        let fence = self.sync("wait_and_reset_fences")?.in_flight;

        match self.fence_state {
            FenceState::Armed => return Ok(()),
            FenceState::Pending => self.device.wait_for_fence(fence, u64::MAX)?,
            FenceState::Signaled => {}
        }

        self.device.reset_fence(fence)?;
        self.fence_state = FenceState::Armed;
        Ok(())
    }

    /// Acquire the next presentable image, signaling image-available.
    ///
    /// Requires `wait_and_reset_fences` since the last submission.
    /// `Err(FrameError::OutOfDate)` leaves the queue idle; rebuild the
    /// swapchain and try again.
    pub fn acquire_next_image(&mut self, swapchain: &VulkanSwapchain<D>) -> Result<AcquiredImage, FrameError> {
        self.expect_state("acquire_next_image", FrameState::Idle)?;
        if self.fence_state != FenceState::Armed {
            return Err(FrameError::OutOfOrder {
                op: "acquire_next_image before wait_and_reset_fences",
                state: self.frame_state,
            });
        }
        debug_assert!(!swapchain.is_destroyed(), "acquire on a destroyed swapchain");
        let semaphore = self.sync("acquire_next_image")?.image_available;

        self.frame_state = FrameState::Acquiring;
        let result = self
            .device
            .acquire_next_image(swapchain.handle(), u64::MAX, semaphore);

        match result {
            Ok((index, suboptimal)) => {
                self.frame_state = FrameState::Acquired;
                self.image_index = Some(index);
                Ok(AcquiredImage { index, suboptimal })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.frame_state = FrameState::Idle;
                Err(FrameError::OutOfDate)
            }
            Err(e) => {
                self.frame_state = FrameState::Idle;
                Err(FrameError::Vulkan(e))
            }
        }
    }

    /// Submit `command_buffer` without waiting for it to finish
    pub fn submit_async(&mut self, command_buffer: vk::CommandBuffer) -> Result<(), FrameError> {
        self.expect_state("submit", FrameState::Acquired)?;
        debug_assert_eq!(self.fence_state, FenceState::Armed);
        let sync = self.sync("submit")?;

        let wait_semaphores = [sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [command_buffer];
        let fence = sync.in_flight;

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        self.device.queue_submit(self.queue, &[submit_info], fence)?;

        self.frame_state = FrameState::Submitted;
        self.fence_state = FenceState::Pending;
        Ok(())
    }

    /// Submit `command_buffer` and block until the GPU is done with it
    pub fn submit_sync(&mut self, command_buffer: vk::CommandBuffer) -> Result<(), FrameError> {
        self.submit_async(command_buffer)?;

        let fence = self.sync("submit")?.in_flight;
        self.device.wait_for_fence(fence, u64::MAX)?;
        self.fence_state = FenceState::Signaled;
        Ok(())
    }

    /// Present the acquired image once rendering has finished.
    ///
    /// The image goes back to the swapchain whatever the outcome; out-of-date
    /// and suboptimal are reported for the caller to schedule a rebuild.
    pub fn present(&mut self, swapchain: &VulkanSwapchain<D>) -> Result<PresentStatus, FrameError> {
        self.expect_state("present", FrameState::Submitted)?;
        let render_finished = self.sync("present")?.render_finished;
        let image_index = self.image_index.ok_or(FrameError::OutOfOrder {
            op: "present",
            state: self.frame_state,
        })?;

        let wait_semaphores = [render_finished];
        let swapchains = [swapchain.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        self.frame_state = FrameState::Presenting;
        let result = self.device.queue_present(self.queue, &present_info);
        self.frame_state = FrameState::Idle;
        self.image_index = None;

        match result {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => Err(FrameError::Vulkan(e)),
        }
    }

    /// Replace both semaphores. Only valid between frames; used when the
    /// swapchain is rebuilt so no stale signal survives into the new one.
    pub fn recreate_semaphores(&mut self) -> Result<()> {
        debug_assert_eq!(self.frame_state, FrameState::Idle);
        let Some(sync) = self.sync.as_mut() else {
            anyhow::bail!("Queue already destroyed");
        };

        let image_available = self
            .device
            .create_semaphore()
            .context("Failed to create image-available semaphore")?;
        let render_finished = match self.device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                self.device.destroy_semaphore(image_available);
                return Err(e).context("Failed to create render-finished semaphore");
            }
        };

        self.device.destroy_semaphore(sync.image_available);
        self.device.destroy_semaphore(sync.render_finished);
        sync.image_available = image_available;
        sync.render_finished = render_finished;
        Ok(())
    }

    pub fn wait_idle(&self) -> Result<(), FrameError> {
        self.device.queue_wait_idle(self.queue)?;
        Ok(())
    }

    /// Release the sync objects. Safe to call again. The caller waits idle
    /// first so nothing still references them.
    pub fn destroy(&mut self) {
        if let Some(sync) = self.sync.take() {
            sync.destroy(self.device.as_ref());
            self.frame_state = FrameState::Idle;
            self.image_index = None;
            log::debug!("Queue sync objects destroyed");
        }
    }

    pub fn handle(&self) -> vk::Queue {
        self.queue
    }

    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    pub fn frame_state(&self) -> FrameState {
        self.frame_state
    }

    /// Valid only between a successful acquire and its present
    pub fn image_index(&self) -> Option<u32> {
        self.image_index
    }
}

impl<D: DeviceOps> Drop for VulkanQueue<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
