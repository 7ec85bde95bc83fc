// Vulkan context - device-level state + swapchain lifecycle
//
// Owns everything that lives as long as the window does (device, surface,
// queue, descriptor pool, pipeline cache, command pool) and everything
// that is rebuilt with the swapchain (swapchain, render pass, framebuffers,
// per-image command buffers).
//
// Per frame:
//   begin_frame  -> rebuild if flagged, wait fence, acquire
//   record_*     -> caller records into the frame's command buffer
//   end_frame    -> submit, present, flag a rebuild on stale results

use anyhow::{Context, Result};
use ash::vk;
use glam::Vec4;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::negotiate::{Negotiated, SwapchainSupport};
use super::ops::DeviceOps;
use super::queue::{FrameState, VulkanQueue};
use super::render_pass::{create_framebuffers, create_render_pass, destroy_framebuffers};
use super::swapchain::{SwapchainDesc, VulkanSwapchain};
use super::VulkanDevice;
use crate::backend::error::{ContextError, FrameError, PresentStatus};
use crate::backend::{ContextSettings, GraphicsContext};
use crate::window::{NativeWindow, SurfaceWindow};

/// Every descriptor type the shared pool hands out, `size` of each
const DESCRIPTOR_TYPES: [vk::DescriptorType; 11] = [
    vk::DescriptorType::SAMPLER,
    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    vk::DescriptorType::SAMPLED_IMAGE,
    vk::DescriptorType::STORAGE_IMAGE,
    vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
    vk::DescriptorType::STORAGE_TEXEL_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER,
    vk::DescriptorType::STORAGE_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
    vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
    vk::DescriptorType::INPUT_ATTACHMENT,
];

// ── One context per process ────────────────────────────────────────────────

static LIVE_CONTEXT: AtomicBool = AtomicBool::new(false);

/// Held by the context created through `init`; a second concurrent `init`
/// fails instead of creating another device on the same window.
struct LiveGuard;

impl LiveGuard {
    fn acquire() -> Result<Self, ContextError> {
        if LIVE_CONTEXT.swap(true, Ordering::AcqRel) {
            Err(ContextError::AlreadyLive)
        } else {
            Ok(LiveGuard)
        }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        LIVE_CONTEXT.store(false, Ordering::Release);
    }
}

/// Handles that stay valid from init until shutdown, for renderer code that
/// records and submits its own work. Swapchain-dependent objects (render
/// pass, framebuffers) are not included; read those off the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulkanHandles {
    pub device: vk::Device,
    pub physical_device: vk::PhysicalDevice,
    pub queue: vk::Queue,
    pub queue_family: u32,
    pub descriptor_pool: vk::DescriptorPool,
    pub pipeline_cache: vk::PipelineCache,
}

/// The image and command buffer acquired for one frame
#[derive(Debug)]
pub struct FrameTarget {
    pub image_index: u32,
    pub command_buffer: vk::CommandBuffer,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
}

pub struct VulkanContext<D: DeviceOps = VulkanDevice> {
    queue: VulkanQueue<D>,
    swapchain: Option<VulkanSwapchain<D>>,

    // Rebuilt with the swapchain
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    command_buffers: Vec<vk::CommandBuffer>,

    // Live until shutdown
    command_pool: vk::CommandPool,
    descriptor_pool: vk::DescriptorPool,
    pipeline_cache: vk::PipelineCache,
    surface: vk::SurfaceKHR,
    queue_family: u32,

    clear_value: vk::ClearValue,
    present_mode: vk::PresentModeKHR,
    requested_image_count: u32,
    min_image_count: u32,
    descriptor_pool_size: u32,

    needs_rebuild: bool,
    shut_down: bool,
    device: Arc<D>,
    live: Option<LiveGuard>,
}

impl<D: DeviceOps> VulkanContext<D> {
    /// Build the context on an existing device and surface. Takes ownership
    /// of `surface`; on failure everything created so far, the surface
    /// included, is released.
    pub fn with_device(
        device: Arc<D>,
        surface: vk::SurfaceKHR,
        window: &dyn SurfaceWindow,
        settings: &ContextSettings,
    ) -> Result<Self> {
        let queue_family = device.queue_family();

        let queue = match VulkanQueue::new(device.clone(), queue_family, 0) {
            Ok(queue) => queue,
            Err(e) => {
                device.destroy_surface(surface);
                return Err(e);
            }
        };

        // From here on a failed step drops `context`, which releases
        // whatever was already created
        let mut context = Self {
            queue,
            swapchain: None,
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            command_buffers: Vec::new(),
            command_pool: vk::CommandPool::null(),
            descriptor_pool: vk::DescriptorPool::null(),
            pipeline_cache: vk::PipelineCache::null(),
            surface,
            queue_family,
            clear_value: premultiplied_clear_value(settings.clear_color),
            present_mode: settings.present_mode,
            requested_image_count: settings.min_image_count,
            min_image_count: settings.min_image_count,
            descriptor_pool_size: settings.descriptor_pool_size,
            needs_rebuild: false,
            shut_down: false,
            device,
            live: None,
        };

        context.descriptor_pool = create_descriptor_pool(context.device.as_ref(), settings.descriptor_pool_size)?;
        context.pipeline_cache = context
            .device
            .create_pipeline_cache(&vk::PipelineCacheCreateInfo::builder())
            .context("Failed to create pipeline cache")?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);
        context.command_pool = context
            .device
            .create_command_pool(&pool_info)
            .context("Failed to create command pool")?;

        let (width, height) = window.framebuffer_size();
        let support = SwapchainSupport::query(context.device.as_ref(), surface)?;
        let negotiated = support.negotiate(
            context.present_mode,
            context.requested_image_count,
            (width, height),
        )?;

        // A window that starts minimized gets its swapchain at the first
        // frame with a non-zero size
        if width == 0 || height == 0 || negotiated.extent.width == 0 || negotiated.extent.height == 0 {
            log::info!("Surface is zero-sized at init, deferring swapchain creation");
            context.needs_rebuild = true;
        } else {
            context.create_swapchain_resources(&support, negotiated)?;
        }

        Ok(context)
    }

    // ── Swapchain lifecycle ────────────────────────────────────────────────

    /// Swapchain, render pass, framebuffers and command buffers from freshly
    /// negotiated parameters. Each object is stored as soon as it exists so
    /// a later failure still releases it.
    fn create_swapchain_resources(
        &mut self,
        support: &SwapchainSupport,
        negotiated: Negotiated,
    ) -> Result<()> {
        let desc = SwapchainDesc {
            surface: self.surface,
            format: negotiated.format,
            capabilities: support.capabilities,
            present_mode: negotiated.present_mode,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            queue_family: self.queue_family,
            min_image_count: negotiated.min_image_count,
            extent: negotiated.extent,
        };
        let swapchain = VulkanSwapchain::new(self.device.clone(), &desc)?;
        let image_count = swapchain.image_count();
        let swapchain = self.swapchain.insert(swapchain);

        self.render_pass = create_render_pass(self.device.as_ref(), negotiated.format.format)?;
        self.framebuffers = create_framebuffers(
            self.device.as_ref(),
            swapchain.image_views(),
            self.render_pass,
            negotiated.extent,
        )?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(image_count);
        self.command_buffers = self
            .device
            .allocate_command_buffers(&alloc_info)
            .context("Failed to allocate command buffers")?;

        self.min_image_count = negotiated.min_image_count;
        Ok(())
    }

    /// Reverse of `create_swapchain_resources`; tolerates partially built state
    fn destroy_swapchain_resources(&mut self) {
        destroy_framebuffers(self.device.as_ref(), &mut self.framebuffers);

        if !self.command_buffers.is_empty() {
            self.device
                .free_command_buffers(self.command_pool, &self.command_buffers);
            self.command_buffers.clear();
        }

        if let Some(mut swapchain) = self.swapchain.take() {
            swapchain.destroy();
        }

        if self.render_pass != vk::RenderPass::null() {
            self.device.destroy_render_pass(self.render_pass);
            self.render_pass = vk::RenderPass::null();
        }
    }

    /// Tear down and recreate the swapchain and everything sized by it.
    ///
    /// Returns `Ok(false)` without touching anything while the window has a
    /// zero-area framebuffer (minimized); the rebuild flag stays set so the
    /// next frame tries again.
    pub fn rebuild_swapchain(&mut self, window: &dyn SurfaceWindow) -> Result<bool> {
        if self.shut_down {
            return Err(ContextError::NotInitialized.into());
        }
        if self.queue.frame_state() != FrameState::Idle {
            return Err(FrameError::OutOfOrder {
                op: "rebuild_swapchain",
                state: self.queue.frame_state(),
            }
            .into());
        }

        let (width, height) = window.framebuffer_size();
        if width == 0 || height == 0 {
            log::debug!("Framebuffer is {}x{}, deferring swapchain rebuild", width, height);
            self.needs_rebuild = true;
            return Ok(false);
        }

        let support = SwapchainSupport::query(self.device.as_ref(), self.surface)?;
        let negotiated = support.negotiate(self.present_mode, self.requested_image_count, (width, height))?;
        if negotiated.extent.width == 0 || negotiated.extent.height == 0 {
            log::debug!("Surface extent is zero, deferring swapchain rebuild");
            self.needs_rebuild = true;
            return Ok(false);
        }

        self.device
            .wait_idle()
            .context("Failed to wait for device idle")?;

        self.destroy_swapchain_resources();
        self.create_swapchain_resources(&support, negotiated)?;
        self.queue.recreate_semaphores()?;

        self.needs_rebuild = false;
        log::info!(
            "Swapchain rebuilt: {}x{}",
            negotiated.extent.width,
            negotiated.extent.height
        );
        Ok(true)
    }

    // ── Frame helpers ──────────────────────────────────────────────────────

    /// Rebuild if flagged, wait for the previous frame, acquire the next
    /// image and start recording its command buffer.
    ///
    /// `Ok(None)` means there is nothing to draw into this frame (stale
    /// swapchain or minimized window); skip rendering and try again.
    pub fn begin_frame(&mut self, window: &dyn SurfaceWindow) -> Result<Option<FrameTarget>> {
        if self.needs_rebuild && !self.rebuild_swapchain(window)? {
            return Ok(None);
        }

        self.queue.wait_and_reset_fences()?;

        let swapchain = self.swapchain.as_ref().ok_or(ContextError::NotInitialized)?;
        let acquired = match self.queue.acquire_next_image(swapchain) {
            Ok(acquired) => acquired,
            Err(FrameError::OutOfDate) => {
                log::debug!("Acquire reported out-of-date swapchain");
                self.needs_rebuild = true;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if acquired.suboptimal {
            self.needs_rebuild = true;
        }

        let target = FrameTarget {
            image_index: acquired.index,
            command_buffer: self.command_buffers[acquired.index as usize],
            framebuffer: self.framebuffers[acquired.index as usize],
            extent: swapchain.extent(),
        };

        self.device
            .reset_command_buffer(target.command_buffer)
            .context("Failed to reset command buffer")?;
        let begin_info =
            vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        self.device
            .begin_command_buffer(target.command_buffer, &begin_info)
            .context("Failed to begin command buffer")?;

        Ok(Some(target))
    }

    /// Record a render pass that only clears the target to the clear colour
    pub fn record_clear_pass(&self, target: &FrameTarget) {
        let clear_values = [self.clear_value];
        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass)
            .framebuffer(target.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: target.extent,
            })
            .clear_values(&clear_values);

        self.device
            .cmd_begin_render_pass(target.command_buffer, &render_pass_info);
        self.device.cmd_end_render_pass(target.command_buffer);
    }

    /// Finish recording, submit and present. Stale present results flag a
    /// rebuild for the next `begin_frame`.
    pub fn end_frame(&mut self, target: FrameTarget) -> Result<()> {
        self.device
            .end_command_buffer(target.command_buffer)
            .context("Failed to end command buffer")?;

        self.queue.submit_async(target.command_buffer)?;

        let swapchain = self.swapchain.as_ref().ok_or(ContextError::NotInitialized)?;
        let status = self.queue.present(swapchain)?;
        if status != PresentStatus::Optimal {
            log::debug!("Present reported {:?}", status);
            self.needs_rebuild = true;
        }
        Ok(())
    }

    // ── Descriptors ────────────────────────────────────────────────────────

    /// Allocate one set per layout from the shared pool. The pool never
    /// grows; running out is reported as `DescriptorPoolExhausted`.
    pub fn allocate_descriptor_sets(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>, ContextError> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(layouts);

        self.device
            .allocate_descriptor_sets(&alloc_info)
            .map_err(|e| match e {
                vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
                    log::error!(
                        "Descriptor pool exhausted ({} per type, {} sets)",
                        self.descriptor_pool_size,
                        self.descriptor_pool_size as usize * DESCRIPTOR_TYPES.len()
                    );
                    ContextError::DescriptorPoolExhausted
                }
                other => ContextError::Vulkan(other),
            })
    }

    // ── Shutdown ───────────────────────────────────────────────────────────

    /// Wait for the GPU, then release every object the context owns.
    /// A second call logs a warning and does nothing.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            log::warn!("Vulkan context already shut down");
            return;
        }
        self.shut_down = true;
        log::info!("Shutting down Vulkan context...");

        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle: {}", e);
        }

        self.queue.destroy();
        self.destroy_swapchain_resources();

        if self.command_pool != vk::CommandPool::null() {
            self.device.destroy_command_pool(self.command_pool);
            self.command_pool = vk::CommandPool::null();
        }
        if self.descriptor_pool != vk::DescriptorPool::null() {
            self.device.destroy_descriptor_pool(self.descriptor_pool);
            self.descriptor_pool = vk::DescriptorPool::null();
        }
        if self.pipeline_cache != vk::PipelineCache::null() {
            self.device.destroy_pipeline_cache(self.pipeline_cache);
            self.pipeline_cache = vk::PipelineCache::null();
        }

        self.device.destroy_surface(self.surface);
        self.surface = vk::SurfaceKHR::null();

        self.live = None;
        log::info!("Vulkan context shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn handles(&self) -> VulkanHandles {
        VulkanHandles {
            device: self.device.handle(),
            physical_device: self.device.physical_device(),
            queue: self.queue.handle(),
            queue_family: self.queue_family,
            descriptor_pool: self.descriptor_pool,
            pipeline_cache: self.pipeline_cache,
        }
    }

    /// Called by the window layer on resize
    pub fn set_rebuild_swapchain(&mut self, rebuild: bool) {
        self.needs_rebuild = rebuild;
    }

    pub fn is_rebuild_swapchain(&self) -> bool {
        self.needs_rebuild
    }

    /// Change the preferred present mode and image count. Takes effect at
    /// the next rebuild, which is flagged when either value changed.
    pub fn set_present_preferences(&mut self, present_mode: vk::PresentModeKHR, min_image_count: u32) {
        if present_mode != self.present_mode || min_image_count != self.requested_image_count {
            self.present_mode = present_mode;
            self.requested_image_count = min_image_count;
            self.needs_rebuild = true;
        }
    }

    /// Store the clear colour with rgb premultiplied by alpha
    pub fn set_clear_color(&mut self, color: Vec4) {
        self.clear_value = premultiplied_clear_value(color);
    }

    pub fn clear_value(&self) -> vk::ClearValue {
        self.clear_value
    }

    /// Negotiated minimum image count of the current swapchain
    pub fn min_image_count(&self) -> u32 {
        self.min_image_count
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// `None` only after shutdown or a failed rebuild
    pub fn swapchain(&self) -> Option<&VulkanSwapchain<D>> {
        self.swapchain.as_ref()
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn vk_device(&self) -> vk::Device {
        self.device.handle()
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.device.physical_device()
    }

    pub fn vk_queue(&self) -> vk::Queue {
        self.queue.handle()
    }

    pub fn queue(&self) -> &VulkanQueue<D> {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut VulkanQueue<D> {
        &mut self.queue
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn descriptor_pool(&self) -> vk::DescriptorPool {
        self.descriptor_pool
    }

    pub fn pipeline_cache(&self) -> vk::PipelineCache {
        self.pipeline_cache
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    pub fn command_buffer(&self, image_index: u32) -> Option<vk::CommandBuffer> {
        self.command_buffers.get(image_index as usize).copied()
    }
}

impl GraphicsContext for VulkanContext<VulkanDevice> {
    /// Create instance, surface, device and every context-level object for
    /// `window`. Any failure here is fatal to the caller.
    fn init(window: &dyn NativeWindow, settings: &ContextSettings) -> Result<Self> {
        let live = LiveGuard::acquire()?;

        log::info!("Initializing Vulkan context...");
        let (device, surface) =
            VulkanDevice::new(&settings.app_name, settings.enable_validation, window)?;

        let mut context = Self::with_device(device, surface, window, settings)?;
        context.live = Some(live);

        log::info!("Vulkan context initialized");
        Ok(context)
    }

    fn shutdown(&mut self) {
        VulkanContext::shutdown(self)
    }
}

impl<D: DeviceOps> Drop for VulkanContext<D> {
    fn drop(&mut self) {
        if !self.shut_down {
            self.shutdown();
        }
    }
}

fn premultiplied_clear_value(color: Vec4) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue {
            float32: [color.x * color.w, color.y * color.w, color.z * color.w, color.w],
        },
    }
}

fn create_descriptor_pool<D: DeviceOps + ?Sized>(device: &D, size: u32) -> Result<vk::DescriptorPool> {
    if size == 0 {
        anyhow::bail!("Descriptor pool size must be at least 1");
    }
    let max_sets = size
        .checked_mul(DESCRIPTOR_TYPES.len() as u32)
        .with_context(|| format!("Descriptor pool size {} is too large", size))?;

    let pool_sizes = DESCRIPTOR_TYPES.map(|ty| vk::DescriptorPoolSize {
        ty,
        descriptor_count: size,
    });

    let pool_info = vk::DescriptorPoolCreateInfo::builder()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .max_sets(max_sets)
        .pool_sizes(&pool_sizes);

    device
        .create_descriptor_pool(&pool_info)
        .context("Failed to create descriptor pool")
}
