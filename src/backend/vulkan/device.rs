// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with the window system's surface extensions
// - Validation layers + debug messenger (debug builds)
// - Surface creation for the target window
// - Physical device selection (graphics + present queue, swapchain extension)
// - Logical device with a single combined graphics/present queue

use anyhow::{Context, Result};
use ash::extensions::{ext::DebugUtils, khr};
use ash::prelude::VkResult;
use ash::vk;
use ash::Entry;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use super::ops::DeviceOps;
use crate::window::NativeWindow;

/// Host allocation callbacks shared by every create/destroy pair.
/// Destroying with a different allocator than the one used at creation is
/// undefined, so there is exactly one.
const HOST_ALLOCATOR: Option<&vk::AllocationCallbacks> = None;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

fn required_device_extensions() -> [&'static CStr; 1] {
    [khr::Swapchain::name()]
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Vulkan handles (order matters for drop!)
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    instance: ash::Instance,
    _entry: Entry,

    surface_loader: khr::Surface,
    swapchain_loader: khr::Swapchain,
    queue_family: u32,

    // Debug utils (if validation enabled)
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,

    /// Cached for logging and downstream limits queries
    pub properties: vk::PhysicalDeviceProperties,
}

impl VulkanDevice {
    /// Create instance, surface and logical device for `window`.
    ///
    /// Returns the device together with the surface it was selected for;
    /// the surface is owned by the caller and must be destroyed through
    /// [`DeviceOps::destroy_surface`] before the device is dropped.
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        window: &dyn NativeWindow,
    ) -> Result<(Arc<Self>, vk::SurfaceKHR)> {
        log::info!("Creating Vulkan device: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Step 2: Create instance
        let (display_handle, window_handle) = window.vulkan_handles();
        let enable_validation = enable_validation && Self::validation_available(&entry);
        let instance = Self::create_instance(&entry, app_name, enable_validation, display_handle)?;

        // Step 3: Setup debug messenger if validation enabled
        let debug_utils = if enable_validation {
            match Self::setup_debug_messenger(&entry, &instance) {
                Ok(debug_utils) => Some(debug_utils),
                Err(e) => {
                    log::warn!("Debug messenger unavailable: {:?}", e);
                    None
                }
            }
        } else {
            None
        };

        // Step 4: Create surface (needed to pick a device that can present to it)
        let surface_loader = khr::Surface::new(&entry, &instance);
        let surface = match unsafe {
            ash_window::create_surface(&entry, &instance, display_handle, window_handle, HOST_ALLOCATOR)
        } {
            Ok(surface) => surface,
            Err(e) => {
                Self::destroy_partial(&instance, &surface_loader, None, debug_utils);
                return Err(e).context("Failed to create window surface");
            }
        };

        // Step 5: Pick physical device + Step 6: Create logical device
        let selected = Self::pick_physical_device(&instance, &surface_loader, surface).and_then(
            |(physical_device, queue_family)| {
                let device = Self::create_logical_device(&instance, physical_device, queue_family)?;
                Ok((physical_device, queue_family, device))
            },
        );
        let (physical_device, queue_family, device) = match selected {
            Ok(selected) => selected,
            Err(e) => {
                Self::destroy_partial(&instance, &surface_loader, Some(surface), debug_utils);
                return Err(e);
            }
        };

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{} (vendor {:#x}, driver {})",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version),
            properties.vendor_id,
            properties.driver_version
        );

        let swapchain_loader = khr::Swapchain::new(&instance, &device);

        Ok((
            Arc::new(Self {
                device,
                physical_device,
                instance,
                _entry: entry,
                surface_loader,
                swapchain_loader,
                queue_family,
                debug_utils,
                properties,
            }),
            surface,
        ))
    }

    fn validation_available(entry: &Entry) -> bool {
        let layers = entry.enumerate_instance_layer_properties().unwrap_or_default();
        let found = layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);
        if !found {
            log::warn!("Validation layers requested but {:?} is not installed", VALIDATION_LAYER);
        }
        found
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
        display_handle: rwh_05::RawDisplayHandle,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("render-context")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        // Surface extensions for whatever window system the handle came from
        let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display_handle)
            .context("Window system has no Vulkan surface support")?
            .to_vec();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let available = entry
            .enumerate_instance_extension_properties(None)
            .context("Failed to enumerate instance extensions")?;
        for &name in &extensions {
            let name = unsafe { CStr::from_ptr(name) };
            log::info!("Instance extension: {}", name.to_string_lossy());
            if !has_extension(&available, name) {
                anyhow::bail!("Required instance extension {:?} is not available", name);
            }
        }

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, HOST_ALLOCATOR) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, HOST_ALLOCATOR) }?;

        Ok((debug_utils, messenger))
    }

    /// First device that can present to `surface` from a graphics queue and
    /// exposes the swapchain extension.
    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }
        log::info!("Found {} physical device(s)", devices.len());

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };
            let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();

            let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
                .unwrap_or_default();
            if !required_device_extensions()
                .iter()
                .all(|required| has_extension(&extensions, required))
            {
                log::debug!("Skipping {}: no swapchain support", name);
                continue;
            }

            let queue_families =
                unsafe { instance.get_physical_device_queue_family_properties(device) };
            let family = select_queue_family(&queue_families, |index| {
                unsafe { surface_loader.get_physical_device_surface_support(device, index, surface) }
                    .unwrap_or(false)
            });

            match family {
                Some(family) => {
                    log::info!("Using GPU {} with queue family {}", name, family);
                    return Ok((device, family));
                }
                None => log::debug!("Skipping {}: no graphics queue that can present", name),
            }
        }

        anyhow::bail!("No suitable GPU found (graphics + present queue and VK_KHR_swapchain required)")
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let extensions: Vec<*const c_char> = required_device_extensions()
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions);

        let device = unsafe { instance.create_device(physical_device, &create_info, HOST_ALLOCATOR) }
            .context("Failed to create logical device")?;

        Ok(device)
    }

    /// Release what `new` created before failing part-way
    fn destroy_partial(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: Option<vk::SurfaceKHR>,
        debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    ) {
        unsafe {
            if let Some(surface) = surface {
                surface_loader.destroy_surface(surface, HOST_ALLOCATOR);
            }
            if let Some((debug_utils, messenger)) = debug_utils {
                debug_utils.destroy_debug_utils_messenger(messenger, HOST_ALLOCATOR);
            }
            instance.destroy_instance(HOST_ALLOCATOR);
        }
    }

    /// Raw `ash` device for renderer code that records its own commands
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }
}

impl DeviceOps for VulkanDevice {
    fn handle(&self) -> vk::Device {
        self.device.handle()
    }

    fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    fn queue_family(&self) -> u32 {
        self.queue_family
    }

    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    fn surface_capabilities(&self, surface: vk::SurfaceKHR) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, surface)
        }
    }

    fn surface_formats(&self, surface: vk::SurfaceKHR) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.physical_device, surface)
        }
    }

    fn surface_present_modes(&self, surface: vk::SurfaceKHR) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.physical_device, surface)
        }
    }

    fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        unsafe { self.surface_loader.destroy_surface(surface, HOST_ALLOCATOR) }
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR> {
        unsafe { self.swapchain_loader.create_swapchain(info, HOST_ALLOCATOR) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, HOST_ALLOCATOR) }
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        unsafe { self.device.create_image_view(info, HOST_ALLOCATOR) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, HOST_ALLOCATOR) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout, semaphore, vk::Fence::null())
        }
    }

    fn queue_present(&self, queue: vk::Queue, info: &vk::PresentInfoKHR) -> VkResult<bool> {
        unsafe { self.swapchain_loader.queue_present(queue, info) }
    }

    fn device_queue(&self, family_index: u32, queue_index: u32) -> vk::Queue {
        unsafe { self.device.get_device_queue(family_index, queue_index) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.device.create_semaphore(&info, HOST_ALLOCATOR) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, HOST_ALLOCATOR) }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device.create_fence(&info, HOST_ALLOCATOR) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, HOST_ALLOCATOR) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn queue_submit(&self, queue: vk::Queue, submits: &[vk::SubmitInfo], fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.queue_submit(queue, submits, fence) }
    }

    fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()> {
        unsafe { self.device.queue_wait_idle(queue) }
    }

    fn create_descriptor_pool(&self, info: &vk::DescriptorPoolCreateInfo) -> VkResult<vk::DescriptorPool> {
        unsafe { self.device.create_descriptor_pool(info, HOST_ALLOCATOR) }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, HOST_ALLOCATOR) }
    }

    fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        unsafe { self.device.allocate_descriptor_sets(info) }
    }

    fn create_pipeline_cache(&self, info: &vk::PipelineCacheCreateInfo) -> VkResult<vk::PipelineCache> {
        unsafe { self.device.create_pipeline_cache(info, HOST_ALLOCATOR) }
    }

    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache) {
        unsafe { self.device.destroy_pipeline_cache(cache, HOST_ALLOCATOR) }
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass> {
        unsafe { self.device.create_render_pass(info, HOST_ALLOCATOR) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, HOST_ALLOCATOR) }
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer> {
        unsafe { self.device.create_framebuffer(info, HOST_ALLOCATOR) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, HOST_ALLOCATOR) }
    }

    fn create_command_pool(&self, info: &vk::CommandPoolCreateInfo) -> VkResult<vk::CommandPool> {
        unsafe { self.device.create_command_pool(info, HOST_ALLOCATOR) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, HOST_ALLOCATOR) }
    }

    fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        unsafe { self.device.allocate_command_buffers(info) }
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, buffers) }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, info: &vk::CommandBufferBeginInfo) -> VkResult<()> {
        unsafe { self.device.begin_command_buffer(cmd, info) }
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        }
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo) {
        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, info, vk::SubpassContents::INLINE)
        }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(cmd) }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        // Cleanup in reverse order
        unsafe {
            self.device.destroy_device(HOST_ALLOCATOR);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, HOST_ALLOCATOR);
            }

            self.instance.destroy_instance(HOST_ALLOCATOR);
        }
    }
}

fn has_extension(available: &[vk::ExtensionProperties], name: &CStr) -> bool {
    available
        .iter()
        .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == name)
}

/// Index of the first queue family with graphics support that can also
/// present, per `supports_present`.
pub(crate) fn select_queue_family(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> Option<u32> {
    families.iter().enumerate().find_map(|(index, props)| {
        let index = index as u32;
        let usable = props.queue_count > 0
            && props.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            && supports_present(index);
        usable.then_some(index)
    })
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan {:?}] {}", message_type, message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan {:?}] {}", message_type, message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan {:?}] {}", message_type, message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, queue_count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count,
            ..Default::default()
        }
    }

    #[test]
    fn picks_first_graphics_family_that_presents() {
        let families = [
            family(vk::QueueFlags::COMPUTE, 1),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];

        assert_eq!(select_queue_family(&families, |_| true), Some(1));
        // Family 1 cannot present, family 2 can
        assert_eq!(select_queue_family(&families, |index| index == 2), Some(2));
    }

    #[test]
    fn no_family_when_present_is_unsupported() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1)];
        assert_eq!(select_queue_family(&families, |_| false), None);
    }

    #[test]
    fn skips_families_without_queues() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::GRAPHICS, 2),
        ];
        assert_eq!(select_queue_family(&families, |_| true), Some(1));
    }

    #[test]
    fn extension_lookup_matches_by_name() {
        let mut props = vk::ExtensionProperties::default();
        for (dst, src) in props
            .extension_name
            .iter_mut()
            .zip(b"VK_KHR_swapchain\0".iter())
        {
            *dst = *src as c_char;
        }

        assert!(has_extension(&[props], khr::Swapchain::name()));
        assert!(!has_extension(&[props], DebugUtils::name()));
    }
}
