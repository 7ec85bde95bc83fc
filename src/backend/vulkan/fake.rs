// In-memory DeviceOps for tests
//
// Models an instantly-finishing GPU: a submission signals its semaphores
// and fence immediately. Every object is tracked by kind so tests can
// assert on leaks, and protocol violations the real driver would turn into
// hangs or validation errors (double destroy, submitting with a signaled
// fence, waiting on a fence nothing will signal, reusing a signaled
// semaphore) panic on the spot.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use super::ops::DeviceOps;

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Surface,
    Swapchain,
    ImageView,
    Semaphore,
    Fence,
    DescriptorPool,
    PipelineCache,
    RenderPass,
    Framebuffer,
    CommandPool,
    CommandBuffer,
}

/// Calls recorded for ordering assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    WaitIdle,
    QueueWaitIdle,
    CreateSwapchain,
    DestroySwapchain,
    Acquire,
    Submit,
    Present,
    WaitFence,
    ResetFence,
    BeginRenderPass,
    EndRenderPass,
}

struct FakeSwapchain {
    surface: u64,
    images: Vec<vk::Image>,
    held: Vec<bool>,
    next: usize,
    extent: vk::Extent2D,
}

struct State {
    next_handle: u64,
    live: HashMap<u64, Kind>,
    calls: Vec<Call>,

    surface: vk::SurfaceKHR,
    capabilities: vk::SurfaceCapabilitiesKHR,
    formats: Vec<vk::SurfaceFormatKHR>,
    present_modes: Vec<vk::PresentModeKHR>,
    extra_images: u32,

    swapchains: HashMap<u64, FakeSwapchain>,
    /// `true` = signaled
    fences: HashMap<u64, bool>,
    /// `true` = signaled and not yet waited on
    semaphores: HashMap<u64, bool>,
    /// pool -> (max sets, allocated sets)
    descriptor_pools: HashMap<u64, (u32, u32)>,
    last_pool_info: Option<(u32, Vec<vk::DescriptorPoolSize>, vk::DescriptorPoolCreateFlags)>,
    /// command buffer -> owning pool
    command_buffers: HashMap<u64, u64>,

    acquire_script: VecDeque<VkResult<bool>>,
    present_script: VecDeque<VkResult<bool>>,
    image_views_until_failure: Option<usize>,
    last_clear_color: Option<[f32; 4]>,
    last_framebuffer: Option<vk::Framebuffer>,
}

pub struct FakeDevice {
    id: u64,
    state: Mutex<State>,
}

impl FakeDevice {
    /// A device with one live surface reporting an 800x600 extent and
    /// `{min=2, max=3}` images
    pub fn new() -> Self {
        let mut state = State {
            next_handle: 0x1000,
            live: HashMap::new(),
            calls: Vec::new(),
            surface: vk::SurfaceKHR::null(),
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: vk::Extent2D { width: 800, height: 600 },
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
                max_image_array_layers: 1,
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            extra_images: 0,
            swapchains: HashMap::new(),
            fences: HashMap::new(),
            semaphores: HashMap::new(),
            descriptor_pools: HashMap::new(),
            last_pool_info: None,
            command_buffers: HashMap::new(),
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            image_views_until_failure: None,
            last_clear_color: None,
            last_framebuffer: None,
        };
        state.surface = vk::SurfaceKHR::from_raw(state.alloc(Kind::Surface));

        Self {
            id: NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(state),
        }
    }

    // ── Test setup ─────────────────────────────────────────────────────────

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.state.lock().surface
    }

    pub fn capabilities(&self) -> vk::SurfaceCapabilitiesKHR {
        self.state.lock().capabilities
    }

    /// Simulate the window system resizing the surface
    pub fn set_surface_extent(&self, width: u32, height: u32) {
        self.state.lock().capabilities.current_extent = vk::Extent2D { width, height };
    }

    /// Make the driver hand out `extra` images above the requested minimum
    pub fn set_extra_images(&self, extra: u32) {
        self.state.lock().extra_images = extra;
    }

    /// The next `count` image views succeed, the one after fails
    pub fn fail_image_view_after(&self, count: usize) {
        self.state.lock().image_views_until_failure = Some(count);
    }

    /// Queue a result for an upcoming acquire: `Ok(suboptimal)` or an error
    pub fn script_acquire(&self, result: VkResult<bool>) {
        self.state.lock().acquire_script.push_back(result);
    }

    pub fn script_present(&self, result: VkResult<bool>) {
        self.state.lock().present_script.push_back(result);
    }

    // ── Inspection ─────────────────────────────────────────────────────────

    pub fn live(&self, kind: Kind) -> usize {
        self.state.lock().live.values().filter(|&&k| k == kind).count()
    }

    /// Every live object, surface included
    pub fn total_live(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Images currently acquired and not yet presented, across all swapchains
    pub fn held_images(&self) -> usize {
        let state = self.state.lock();
        state
            .swapchains
            .values()
            .map(|s| s.held.iter().filter(|&&held| held).count())
            .sum()
    }

    /// Extent the most recently created swapchain was built with
    pub fn swapchain_extent(&self) -> Option<vk::Extent2D> {
        let state = self.state.lock();
        state.swapchains.values().last().map(|s| s.extent)
    }

    pub fn last_pool_info(&self) -> Option<(u32, Vec<vk::DescriptorPoolSize>, vk::DescriptorPoolCreateFlags)> {
        self.state.lock().last_pool_info.clone()
    }

    pub fn last_clear_color(&self) -> Option<[f32; 4]> {
        self.state.lock().last_clear_color
    }

    pub fn last_framebuffer(&self) -> Option<vk::Framebuffer> {
        self.state.lock().last_framebuffer
    }

    pub fn is_fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state.lock().fences[&fence.as_raw()]
    }
}

impl State {
    fn alloc(&mut self, kind: Kind) -> u64 {
        self.next_handle += 1;
        self.live.insert(self.next_handle, kind);
        self.next_handle
    }

    fn release(&mut self, raw: u64, kind: Kind) {
        match self.live.remove(&raw) {
            Some(k) if k == kind => {}
            Some(k) => panic!("destroying {raw:#x} as {kind:?} but it is a {k:?}"),
            None => panic!("{kind:?} {raw:#x} destroyed twice or never created"),
        }
    }

    fn assert_live(&self, raw: u64, kind: Kind) {
        assert_eq!(
            self.live.get(&raw),
            Some(&kind),
            "{kind:?} {raw:#x} used while not alive"
        );
    }
}

/// Read a (count, pointer) pair from a Vulkan info struct
///
/// # Safety
/// `ptr` must point at `count` valid elements when `count > 0`.
unsafe fn raw_slice<'a, T>(ptr: *const T, count: u32) -> &'a [T] {
    if count == 0 || ptr.is_null() {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, count as usize)
    }
}

impl DeviceOps for FakeDevice {
    fn handle(&self) -> vk::Device {
        vk::Device::from_raw(self.id)
    }

    fn physical_device(&self) -> vk::PhysicalDevice {
        vk::PhysicalDevice::from_raw(self.id)
    }

    fn queue_family(&self) -> u32 {
        0
    }

    fn wait_idle(&self) -> VkResult<()> {
        self.state.lock().calls.push(Call::WaitIdle);
        Ok(())
    }

    // ── Surface ────────────────────────────────────────────────────────────

    fn surface_capabilities(&self, surface: vk::SurfaceKHR) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        let state = self.state.lock();
        state.assert_live(surface.as_raw(), Kind::Surface);
        Ok(state.capabilities)
    }

    fn surface_formats(&self, surface: vk::SurfaceKHR) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        let state = self.state.lock();
        state.assert_live(surface.as_raw(), Kind::Surface);
        Ok(state.formats.clone())
    }

    fn surface_present_modes(&self, surface: vk::SurfaceKHR) -> VkResult<Vec<vk::PresentModeKHR>> {
        let state = self.state.lock();
        state.assert_live(surface.as_raw(), Kind::Surface);
        Ok(state.present_modes.clone())
    }

    fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        let mut state = self.state.lock();
        assert!(
            state.swapchains.values().all(|s| s.surface != surface.as_raw()),
            "surface destroyed while a swapchain still uses it"
        );
        state.release(surface.as_raw(), Kind::Surface);
    }

    // ── Swapchain ──────────────────────────────────────────────────────────

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR> {
        let mut state = self.state.lock();
        let surface = info.surface.as_raw();
        state.assert_live(surface, Kind::Surface);
        assert!(
            state.swapchains.values().all(|s| s.surface != surface),
            "surface already has a live swapchain"
        );
        state.calls.push(Call::CreateSwapchain);

        let raw = state.alloc(Kind::Swapchain);
        // Images belong to the swapchain, not to the live set
        let count = info.min_image_count + state.extra_images;
        let images = (0..count)
            .map(|i| vk::Image::from_raw((raw << 8) | u64::from(i)))
            .collect();
        state.swapchains.insert(
            raw,
            FakeSwapchain {
                surface,
                images,
                held: vec![false; count as usize],
                next: 0,
                extent: info.image_extent,
            },
        );
        Ok(vk::SwapchainKHR::from_raw(raw))
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let state = self.state.lock();
        state.assert_live(swapchain.as_raw(), Kind::Swapchain);
        Ok(state.swapchains[&swapchain.as_raw()].images.clone())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.lock();
        state.release(swapchain.as_raw(), Kind::Swapchain);
        state.swapchains.remove(&swapchain.as_raw());
        state.calls.push(Call::DestroySwapchain);
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        let mut state = self.state.lock();
        if let Some(remaining) = state.image_views_until_failure.as_mut() {
            if *remaining == 0 {
                state.image_views_until_failure = None;
                return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
            }
            *remaining -= 1;
        }
        Ok(vk::ImageView::from_raw(state.alloc(Kind::ImageView)))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.lock().release(view.as_raw(), Kind::ImageView);
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut state = self.state.lock();
        state.assert_live(swapchain.as_raw(), Kind::Swapchain);
        state.assert_live(semaphore.as_raw(), Kind::Semaphore);
        state.calls.push(Call::Acquire);

        let suboptimal = match state.acquire_script.pop_front() {
            Some(Err(e)) => return Err(e),
            Some(Ok(suboptimal)) => suboptimal,
            None => false,
        };

        assert!(
            !state.semaphores[&semaphore.as_raw()],
            "acquire would signal a semaphore that is already signaled"
        );

        let chain = state
            .swapchains
            .get_mut(&swapchain.as_raw())
            .expect("swapchain state");
        let count = chain.images.len();
        let index = (0..count)
            .map(|offset| (chain.next + offset) % count)
            .find(|&i| !chain.held[i])
            .expect("every swapchain image is already acquired");
        chain.held[index] = true;
        chain.next = (index + 1) % count;

        state.semaphores.insert(semaphore.as_raw(), true);
        Ok((index as u32, suboptimal))
    }

    fn queue_present(&self, _queue: vk::Queue, info: &vk::PresentInfoKHR) -> VkResult<bool> {
        let mut state = self.state.lock();
        state.calls.push(Call::Present);

        let waits = unsafe { raw_slice(info.p_wait_semaphores, info.wait_semaphore_count) };
        for semaphore in waits {
            let signaled = state
                .semaphores
                .get_mut(&semaphore.as_raw())
                .expect("present waits on unknown semaphore");
            assert!(*signaled, "present waits on a semaphore nothing signaled");
            *signaled = false;
        }

        let swapchains = unsafe { raw_slice(info.p_swapchains, info.swapchain_count) };
        let indices = unsafe { raw_slice(info.p_image_indices, info.swapchain_count) };
        for (swapchain, &index) in swapchains.iter().zip(indices) {
            state.assert_live(swapchain.as_raw(), Kind::Swapchain);
            let chain = state
                .swapchains
                .get_mut(&swapchain.as_raw())
                .expect("swapchain state");
            let held = &mut chain.held[index as usize];
            assert!(*held, "presenting image {index} that was never acquired");
            // Presented images go back to the engine even when out of date
            *held = false;
        }

        state.present_script.pop_front().unwrap_or(Ok(false))
    }

    // ── Queue + synchronization ────────────────────────────────────────────

    fn device_queue(&self, family_index: u32, queue_index: u32) -> vk::Queue {
        vk::Queue::from_raw(0x0900 | u64::from(family_index) << 4 | u64::from(queue_index))
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut state = self.state.lock();
        let raw = state.alloc(Kind::Semaphore);
        state.semaphores.insert(raw, false);
        Ok(vk::Semaphore::from_raw(raw))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.state.lock();
        state.release(semaphore.as_raw(), Kind::Semaphore);
        state.semaphores.remove(&semaphore.as_raw());
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.state.lock();
        let raw = state.alloc(Kind::Fence);
        state.fences.insert(raw, signaled);
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        state.release(fence.as_raw(), Kind::Fence);
        state.fences.remove(&fence.as_raw());
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout: u64) -> VkResult<()> {
        let mut state = self.state.lock();
        state.assert_live(fence.as_raw(), Kind::Fence);
        state.calls.push(Call::WaitFence);
        // Nothing is ever in flight here, so an unsignaled fence stays that way
        assert!(
            state.fences[&fence.as_raw()],
            "waiting on a fence with no pending submission would never return"
        );
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.lock();
        state.assert_live(fence.as_raw(), Kind::Fence);
        state.calls.push(Call::ResetFence);
        state.fences.insert(fence.as_raw(), false);
        Ok(())
    }

    fn queue_submit(&self, _queue: vk::Queue, submits: &[vk::SubmitInfo], fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Submit);

        for submit in submits {
            let waits = unsafe { raw_slice(submit.p_wait_semaphores, submit.wait_semaphore_count) };
            for semaphore in waits {
                let signaled = state
                    .semaphores
                    .get_mut(&semaphore.as_raw())
                    .expect("submit waits on unknown semaphore");
                assert!(*signaled, "submit waits on a semaphore nothing signaled");
                *signaled = false;
            }

            let signals = unsafe { raw_slice(submit.p_signal_semaphores, submit.signal_semaphore_count) };
            for semaphore in signals {
                let signaled = state
                    .semaphores
                    .get_mut(&semaphore.as_raw())
                    .expect("submit signals unknown semaphore");
                assert!(!*signaled, "submit signals a semaphore that is already signaled");
                *signaled = true;
            }

            let buffers = unsafe { raw_slice(submit.p_command_buffers, submit.command_buffer_count) };
            for cmd in buffers {
                state.assert_live(cmd.as_raw(), Kind::CommandBuffer);
            }
        }

        if fence != vk::Fence::null() {
            let signaled = state
                .fences
                .get_mut(&fence.as_raw())
                .expect("submit with unknown fence");
            assert!(!*signaled, "submitting with a fence that is still signaled");
            *signaled = true;
        }
        Ok(())
    }

    fn queue_wait_idle(&self, _queue: vk::Queue) -> VkResult<()> {
        self.state.lock().calls.push(Call::QueueWaitIdle);
        Ok(())
    }

    // ── Descriptors / pipeline cache ───────────────────────────────────────

    fn create_descriptor_pool(&self, info: &vk::DescriptorPoolCreateInfo) -> VkResult<vk::DescriptorPool> {
        let mut state = self.state.lock();
        let sizes = unsafe { raw_slice(info.p_pool_sizes, info.pool_size_count) }.to_vec();
        state.last_pool_info = Some((info.max_sets, sizes, info.flags));

        let raw = state.alloc(Kind::DescriptorPool);
        state.descriptor_pools.insert(raw, (info.max_sets, 0));
        Ok(vk::DescriptorPool::from_raw(raw))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state.lock();
        state.release(pool.as_raw(), Kind::DescriptorPool);
        state.descriptor_pools.remove(&pool.as_raw());
    }

    fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        let mut state = self.state.lock();
        state.assert_live(info.descriptor_pool.as_raw(), Kind::DescriptorPool);

        let (max_sets, allocated) = state
            .descriptor_pools
            .get_mut(&info.descriptor_pool.as_raw())
            .expect("descriptor pool state");
        if *allocated + info.descriptor_set_count > *max_sets {
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        }
        *allocated += info.descriptor_set_count;

        // Sets die with their pool, so they are not tracked individually
        let base = state.next_handle;
        state.next_handle += u64::from(info.descriptor_set_count);
        Ok((1..=u64::from(info.descriptor_set_count))
            .map(|i| vk::DescriptorSet::from_raw(base + i))
            .collect())
    }

    fn create_pipeline_cache(&self, _info: &vk::PipelineCacheCreateInfo) -> VkResult<vk::PipelineCache> {
        Ok(vk::PipelineCache::from_raw(self.state.lock().alloc(Kind::PipelineCache)))
    }

    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache) {
        self.state.lock().release(cache.as_raw(), Kind::PipelineCache);
    }

    // ── Render pass / framebuffers ─────────────────────────────────────────

    fn create_render_pass(&self, _info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass> {
        Ok(vk::RenderPass::from_raw(self.state.lock().alloc(Kind::RenderPass)))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state.lock().release(render_pass.as_raw(), Kind::RenderPass);
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer> {
        let mut state = self.state.lock();
        state.assert_live(info.render_pass.as_raw(), Kind::RenderPass);
        let attachments = unsafe { raw_slice(info.p_attachments, info.attachment_count) };
        for view in attachments {
            state.assert_live(view.as_raw(), Kind::ImageView);
        }
        Ok(vk::Framebuffer::from_raw(state.alloc(Kind::Framebuffer)))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state.lock().release(framebuffer.as_raw(), Kind::Framebuffer);
    }

    // ── Commands ───────────────────────────────────────────────────────────

    fn create_command_pool(&self, _info: &vk::CommandPoolCreateInfo) -> VkResult<vk::CommandPool> {
        Ok(vk::CommandPool::from_raw(self.state.lock().alloc(Kind::CommandPool)))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut state = self.state.lock();
        state.release(pool.as_raw(), Kind::CommandPool);

        // Buffers still allocated from the pool are freed with it
        let orphans: Vec<u64> = state
            .command_buffers
            .iter()
            .filter(|(_, owner)| **owner == pool.as_raw())
            .map(|(&cmd, _)| cmd)
            .collect();
        for cmd in orphans {
            state.command_buffers.remove(&cmd);
            state.release(cmd, Kind::CommandBuffer);
        }
    }

    fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock();
        let pool = info.command_pool.as_raw();
        state.assert_live(pool, Kind::CommandPool);

        Ok((0..info.command_buffer_count)
            .map(|_| {
                let raw = state.alloc(Kind::CommandBuffer);
                state.command_buffers.insert(raw, pool);
                vk::CommandBuffer::from_raw(raw)
            })
            .collect())
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.lock();
        for cmd in buffers {
            assert_eq!(
                state.command_buffers.remove(&cmd.as_raw()),
                Some(pool.as_raw()),
                "command buffer freed to the wrong pool"
            );
            state.release(cmd.as_raw(), Kind::CommandBuffer);
        }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, _info: &vk::CommandBufferBeginInfo) -> VkResult<()> {
        self.state.lock().assert_live(cmd.as_raw(), Kind::CommandBuffer);
        Ok(())
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.state.lock().assert_live(cmd.as_raw(), Kind::CommandBuffer);
        Ok(())
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo) {
        let mut state = self.state.lock();
        state.assert_live(cmd.as_raw(), Kind::CommandBuffer);
        state.assert_live(info.framebuffer.as_raw(), Kind::Framebuffer);
        state.calls.push(Call::BeginRenderPass);

        let clears = unsafe { raw_slice(info.p_clear_values, info.clear_value_count) };
        if let Some(clear) = clears.first() {
            state.last_clear_color = Some(unsafe { clear.color.float32 });
        }
        state.last_framebuffer = Some(info.framebuffer);
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        let mut state = self.state.lock();
        state.assert_live(cmd.as_raw(), Kind::CommandBuffer);
        state.calls.push(Call::EndRenderPass);
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.state.lock().assert_live(cmd.as_raw(), Kind::CommandBuffer);
        Ok(())
    }
}
