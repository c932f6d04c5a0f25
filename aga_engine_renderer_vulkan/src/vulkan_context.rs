/// DeviceContext - instance, surface, physical/logical device and queues
///
/// Created once at startup and destroyed once at shutdown, after every
/// dependent object. Implements `DeviceApi` on top of `ash`, so it is the
/// only place in the crate that issues raw Vulkan calls.

use std::ffi::{CStr, CString};

use aga_engine::aga::render::Config;
use aga_engine::aga::{Error, Result};
use aga_engine::{engine_debug, engine_error, engine_info, engine_warn};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::debug;
use crate::vulkan_device::{
    AcquireOutcome, DescriptorBinding, DescriptorWrite, DeviceApi, GraphicsPipelineDesc,
    ImageBarrier, ImageDesc, PresentOutcome, QueueFamilyIndices, RenderPassDesc, SamplerDesc,
    SubmitDesc, SwapchainDesc,
};

const SOURCE: &str = "aga::vulkan::Device";

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Log a failed Vulkan call and convert it to an engine error
pub(crate) fn vk_error(operation: &str, result: vk::Result) -> Error {
    engine_error!(SOURCE, "{} failed: {:?}", operation, result);
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => Error::OutOfMemory,
        _ => Error::BackendError(format!("{} failed: {:?}", operation, result)),
    }
}

fn init_error(message: String) -> Error {
    engine_error!(SOURCE, "{}", message);
    Error::InitializationFailed(message)
}

// ===== DEVICE SELECTION =====

/// What device selection needs to know about one physical device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub queue_families: Option<QueueFamilyIndices>,
    pub supports_swapchain: bool,
    pub has_surface_formats: bool,
    pub has_present_modes: bool,
    pub sampler_anisotropy: bool,
}

impl DeviceCandidate {
    /// Graphics + present queues, swapchain extension, usable surface, anisotropy
    pub fn is_suitable(&self) -> bool {
        self.queue_families.is_some()
            && self.supports_swapchain
            && self.has_surface_formats
            && self.has_present_modes
            && self.sampler_anisotropy
    }
}

/// Graphics and present families, preferring one family that does both
pub fn find_queue_families<F>(families: &[vk::QueueFamilyProperties], supports_present: F) -> Option<QueueFamilyIndices>
where
    F: Fn(u32) -> bool,
{
    let mut graphics = None;
    let mut present = None;

    for (i, family) in families.iter().enumerate() {
        let index = i as u32;
        let has_graphics = family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let has_present = supports_present(index);

        if has_graphics && has_present {
            return Some(QueueFamilyIndices { graphics: index, present: index });
        }
        if has_graphics && graphics.is_none() {
            graphics = Some(index);
        }
        if has_present && present.is_none() {
            present = Some(index);
        }
    }

    match (graphics, present) {
        (Some(graphics), Some(present)) => Some(QueueFamilyIndices { graphics, present }),
        _ => None,
    }
}

/// Index of the device to use: the first suitable discrete GPU when
/// preferred, otherwise the first suitable device
pub fn pick_device(candidates: &[DeviceCandidate], prefer_discrete: bool) -> Option<usize> {
    if prefer_discrete {
        let discrete = candidates
            .iter()
            .position(|c| c.is_suitable() && c.device_type == vk::PhysicalDeviceType::DISCRETE_GPU);
        if discrete.is_some() {
            return discrete;
        }
    }
    candidates.iter().position(DeviceCandidate::is_suitable)
}

// ===== INSTANCE =====

/// Instance-level objects, destroyed after the logical device
struct InstanceContext {
    // Keeps the Vulkan library loaded while the instance lives
    _entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
}

impl InstanceContext {
    fn destroy(&mut self) {
        unsafe {
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
                self.surface = vk::SurfaceKHR::null();
            }
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug::cleanup_debug_config();
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn validation_layer_available(entry: &ash::Entry) -> bool {
    unsafe { entry.enumerate_instance_layer_properties() }
        .map(|layers| {
            layers
                .iter()
                .any(|layer| layer.layer_name_as_c_str().map(|name| name == VALIDATION_LAYER).unwrap_or(false))
        })
        .unwrap_or(false)
}

fn create_instance_context<W: HasDisplayHandle + HasWindowHandle>(
    window: &W,
    config: &Config,
    enable_validation: bool,
    entry: ash::Entry,
) -> Result<InstanceContext> {
    let display_handle = window
        .display_handle()
        .map_err(|e| init_error(format!("Failed to get display handle: {}", e)))?;
    let window_handle = window
        .window_handle()
        .map_err(|e| init_error(format!("Failed to get window handle: {}", e)))?;

    let app_name = CString::new(config.app_name.as_str())
        .map_err(|e| init_error(format!("Invalid application name: {}", e)))?;
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(c"AGA")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_0);

    let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
        .map_err(|e| init_error(format!("Failed to get required extensions: {:?}", e)))?
        .to_vec();
    if enable_validation {
        extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    let layer_names = if enable_validation { vec![VALIDATION_LAYER.as_ptr()] } else { vec![] };

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layer_names)
        .enabled_extension_names(&extension_names);

    let instance = unsafe { entry.create_instance(&create_info, None) }
        .map_err(|e| init_error(format!("Failed to create instance: {:?}", e)))?;

    let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
    let mut parts = InstanceContext {
        _entry: entry,
        instance,
        debug_utils: None,
        surface_loader,
        surface: vk::SurfaceKHR::null(),
    };

    if enable_validation {
        let debug_utils = ash::ext::debug_utils::Instance::new(&parts._entry, &parts.instance);
        debug::init_debug_config(config.debug_severity);

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(debug::severity_flags(config.debug_severity))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug::vulkan_debug_callback));

        match unsafe { debug_utils.create_debug_utils_messenger(&debug_info, None) } {
            Ok(messenger) => parts.debug_utils = Some((debug_utils, messenger)),
            Err(e) => {
                parts.destroy();
                return Err(init_error(format!("Failed to create debug messenger: {:?}", e)));
            }
        }
    }

    let surface = unsafe {
        ash_window::create_surface(
            &parts._entry,
            &parts.instance,
            display_handle.as_raw(),
            window_handle.as_raw(),
            None,
        )
    };
    match surface {
        Ok(surface) => parts.surface = surface,
        Err(e) => {
            parts.destroy();
            return Err(init_error(format!("Failed to create surface: {:?}", e)));
        }
    }

    Ok(parts)
}

fn describe_device(parts: &InstanceContext, physical_device: vk::PhysicalDevice) -> DeviceCandidate {
    unsafe {
        let instance = &parts.instance;
        let properties = instance.get_physical_device_properties(physical_device);
        let name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Unknown device".to_string());

        let families = instance.get_physical_device_queue_family_properties(physical_device);
        let queue_families = find_queue_families(&families, |index| {
            parts
                .surface_loader
                .get_physical_device_surface_support(physical_device, index, parts.surface)
                .unwrap_or(false)
        });

        let supports_swapchain = instance
            .enumerate_device_extension_properties(physical_device)
            .map(|extensions| {
                extensions.iter().any(|ext| {
                    ext.extension_name_as_c_str()
                        .map(|name| name == ash::khr::swapchain::NAME)
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false);

        let (has_surface_formats, has_present_modes) = if supports_swapchain {
            let formats = parts
                .surface_loader
                .get_physical_device_surface_formats(physical_device, parts.surface)
                .unwrap_or_default();
            let modes = parts
                .surface_loader
                .get_physical_device_surface_present_modes(physical_device, parts.surface)
                .unwrap_or_default();
            (!formats.is_empty(), !modes.is_empty())
        } else {
            (false, false)
        };

        let features = instance.get_physical_device_features(physical_device);

        DeviceCandidate {
            name,
            device_type: properties.device_type,
            queue_families,
            supports_swapchain,
            has_surface_formats,
            has_present_modes,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
        }
    }
}

// ===== DEVICE CONTEXT =====

/// Vulkan device owner and `DeviceApi` implementation
pub struct DeviceContext {
    parts: InstanceContext,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    swapchain_loader: ash::khr::swapchain::Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    max_sampler_anisotropy: f32,
    device_name: String,
    destroyed: bool,
}

impl DeviceContext {
    /// Bring up instance, surface and device for a window
    ///
    /// Fails with `Error::NoSuitableDevice` when no GPU satisfies the
    /// suitability predicate; every object created before a failure is
    /// released.
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &Config) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| init_error(format!("Failed to load Vulkan library: {}", e)))?;

        let mut enable_validation = config.enable_validation || cfg!(feature = "vulkan-validation");
        if enable_validation && !validation_layer_available(&entry) {
            engine_warn!(SOURCE, "Validation requested but VK_LAYER_KHRONOS_validation is not installed; continuing without it");
            enable_validation = false;
        }

        let mut parts = create_instance_context(window, config, enable_validation, entry)?;
        match Self::create_device(&parts, config) {
            Ok((physical_device, candidate, device)) => {
                Ok(Self::assemble(parts, physical_device, candidate, device))
            }
            Err(e) => {
                parts.destroy();
                Err(e)
            }
        }
    }

    fn create_device(
        parts: &InstanceContext,
        config: &Config,
    ) -> Result<(vk::PhysicalDevice, DeviceCandidate, ash::Device)> {
        let physical_devices = unsafe { parts.instance.enumerate_physical_devices() }
            .map_err(|e| vk_error("vkEnumeratePhysicalDevices", e))?;
        if physical_devices.is_empty() {
            engine_error!(SOURCE, "No Vulkan-capable GPU found");
            return Err(Error::NoSuitableDevice);
        }

        let candidates: Vec<DeviceCandidate> =
            physical_devices.iter().map(|&pd| describe_device(parts, pd)).collect();
        for candidate in &candidates {
            engine_debug!(
                SOURCE,
                "Found {} ({:?}), suitable: {}",
                candidate.name,
                candidate.device_type,
                candidate.is_suitable()
            );
        }

        let index = pick_device(&candidates, config.prefer_discrete_gpu).ok_or_else(|| {
            engine_error!(SOURCE, "No suitable GPU among {} device(s)", candidates.len());
            Error::NoSuitableDevice
        })?;
        let physical_device = physical_devices[index];
        let candidate = candidates[index].clone();
        let families = candidate.queue_families.ok_or(Error::NoSuitableDevice)?;

        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];
        let device_features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_extension_names)
            .enabled_features(&device_features);

        let device = unsafe { parts.instance.create_device(physical_device, &device_create_info, None) }
            .map_err(|e| init_error(format!("Failed to create logical device: {:?}", e)))?;

        Ok((physical_device, candidate, device))
    }

    fn assemble(
        parts: InstanceContext,
        physical_device: vk::PhysicalDevice,
        candidate: DeviceCandidate,
        device: ash::Device,
    ) -> Self {
        unsafe {
            let queue_families = candidate.queue_families.unwrap_or(QueueFamilyIndices { graphics: 0, present: 0 });
            let graphics_queue = device.get_device_queue(queue_families.graphics, 0);
            let present_queue = device.get_device_queue(queue_families.present, 0);
            let memory_properties = parts.instance.get_physical_device_memory_properties(physical_device);
            let limits = parts.instance.get_physical_device_properties(physical_device).limits;
            let swapchain_loader = ash::khr::swapchain::Device::new(&parts.instance, &device);

            engine_info!(
                SOURCE,
                "Using {} ({:?}), graphics family {}, present family {}",
                candidate.name,
                candidate.device_type,
                queue_families.graphics,
                queue_families.present
            );

            Self {
                parts,
                physical_device,
                device,
                swapchain_loader,
                graphics_queue,
                present_queue,
                queue_families,
                memory_properties,
                max_sampler_anisotropy: limits.max_sampler_anisotropy,
                device_name: candidate.name,
                destroyed: false,
            }
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn validation_enabled(&self) -> bool {
        self.parts.debug_utils.is_some()
    }
}

impl DeviceApi for DeviceContext {
    // ===== PHYSICAL DEVICE SNAPSHOT =====

    fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        self.memory_properties
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.parts
                .instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    fn max_sampler_anisotropy(&self) -> f32 {
        self.max_sampler_anisotropy
    }

    // ===== SURFACE =====

    fn surface_capabilities(&self) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.parts
                .surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.parts.surface)
                .map_err(|e| vk_error("vkGetPhysicalDeviceSurfaceCapabilitiesKHR", e))
        }
    }

    fn surface_formats(&self) -> Result<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.parts
                .surface_loader
                .get_physical_device_surface_formats(self.physical_device, self.parts.surface)
                .map_err(|e| vk_error("vkGetPhysicalDeviceSurfaceFormatsKHR", e))
        }
    }

    fn surface_present_modes(&self) -> Result<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.parts
                .surface_loader
                .get_physical_device_surface_present_modes(self.physical_device, self.parts.surface)
                .map_err(|e| vk_error("vkGetPhysicalDeviceSurfacePresentModesKHR", e))
        }
    }

    // ===== SWAPCHAIN =====

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR> {
        let families = desc.queue_families.unique();
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.parts.surface)
            .min_image_count(desc.image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(desc.sharing_mode())
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true);
        if desc.sharing_mode() == vk::SharingMode::CONCURRENT {
            create_info = create_info.queue_family_indices(&families);
        }

        unsafe {
            self.swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|e| vk_error("vkCreateSwapchainKHR", e))
        }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
        unsafe {
            self.swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(|e| vk_error("vkGetSwapchainImagesKHR", e))
        }
    }

    fn acquire_next_image(&self, swapchain: vk::SwapchainKHR, signal: vk::Semaphore) -> Result<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, u64::MAX, signal, vk::Fence::null())
        };
        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(vk_error("vkAcquireNextImageKHR", e)),
        }
    }

    fn queue_present(&self, swapchain: vk::SwapchainKHR, image_index: u32, wait: vk::Semaphore) -> Result<PresentOutcome> {
        let wait_semaphores = [wait];
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(self.present_queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(vk_error("vkQueuePresentKHR", e)),
        }
    }

    // ===== IMAGES AND SAMPLERS =====

    fn create_image(&self, desc: &ImageDesc) -> Result<vk::Image> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D { width: desc.extent.width, height: desc.extent.height, depth: 1 })
            .mip_levels(1)
            .array_layers(1)
            .format(desc.format)
            .tiling(desc.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        unsafe {
            self.device
                .create_image(&create_info, None)
                .map_err(|e| vk_error("vkCreateImage", e))
        }
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.device.get_image_memory_requirements(image) }
    }

    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory) -> Result<()> {
        unsafe {
            self.device
                .bind_image_memory(image, memory, 0)
                .map_err(|e| vk_error("vkBindImageMemory", e))
        }
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format, aspect_mask: vk::ImageAspectFlags) -> Result<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe {
            self.device
                .create_image_view(&create_info, None)
                .map_err(|e| vk_error("vkCreateImageView", e))
        }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<vk::Sampler> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.filter)
            .min_filter(desc.filter)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .anisotropy_enable(desc.max_anisotropy.is_some())
            .max_anisotropy(desc.max_anisotropy.unwrap_or(1.0))
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(desc.mipmap_mode)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(0.0);

        unsafe {
            self.device
                .create_sampler(&create_info, None)
                .map_err(|e| vk_error("vkCreateSampler", e))
        }
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) }
    }

    // ===== BUFFERS AND MEMORY =====

    fn create_buffer(&self, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Result<vk::Buffer> {
        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        unsafe {
            self.device
                .create_buffer(&create_info, None)
                .map_err(|e| vk_error("vkCreateBuffer", e))
        }
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        unsafe { self.device.get_buffer_memory_requirements(buffer) }
    }

    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory) -> Result<()> {
        unsafe {
            self.device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(|e| vk_error("vkBindBufferMemory", e))
        }
    }

    fn allocate_memory(&self, size: vk::DeviceSize, memory_type_index: u32) -> Result<vk::DeviceMemory> {
        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(memory_type_index);

        unsafe {
            self.device
                .allocate_memory(&allocate_info, None)
                .map_err(|e| vk_error("vkAllocateMemory", e))
        }
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) }
    }

    fn write_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        unsafe {
            let ptr = self
                .device
                .map_memory(memory, offset, data.len() as vk::DeviceSize, vk::MemoryMapFlags::empty())
                .map_err(|e| vk_error("vkMapMemory", e))?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
            self.device.unmap_memory(memory);
        }
        Ok(())
    }

    // ===== RENDER PASS AND FRAMEBUFFERS =====

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<vk::RenderPass> {
        let attachments = [desc.color, desc.depth];
        let color_attachment_ref = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let depth_attachment_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(std::slice::from_ref(&color_attachment_ref))
            .depth_stencil_attachment(&depth_attachment_ref);

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(std::slice::from_ref(&desc.dependency));

        unsafe {
            self.device
                .create_render_pass(&create_info, None)
                .map_err(|e| vk_error("vkCreateRenderPass", e))
        }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(&self, render_pass: vk::RenderPass, attachments: &[vk::ImageView], extent: vk::Extent2D) -> Result<vk::Framebuffer> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        unsafe {
            self.device
                .create_framebuffer(&create_info, None)
                .map_err(|e| vk_error("vkCreateFramebuffer", e))
        }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    // ===== SHADERS AND PIPELINES =====

    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        unsafe {
            self.device
                .create_shader_module(&create_info, None)
                .map_err(|e| vk_error("vkCreateShaderModule", e))
        }
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) }
    }

    fn create_descriptor_set_layout(&self, bindings: &[DescriptorBinding]) -> Result<vk::DescriptorSetLayout> {
        let layout_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(binding.descriptor_type)
                    .descriptor_count(1)
                    .stage_flags(binding.stage_flags)
            })
            .collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&layout_bindings);

        unsafe {
            self.device
                .create_descriptor_set_layout(&create_info, None)
                .map_err(|e| vk_error("vkCreateDescriptorSetLayout", e))
        }
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_pipeline_layout(&self, set_layouts: &[vk::DescriptorSetLayout], push_constants: &[vk::PushConstantRange]) -> Result<vk::PipelineLayout> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constants);

        unsafe {
            self.device
                .create_pipeline_layout(&create_info, None)
                .map_err(|e| vk_error("vkCreatePipelineLayout", e))
        }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<vk::Pipeline> {
        let entry_point = c"main";
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(desc.vertex_module)
                .name(entry_point),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(desc.fragment_module)
                .name(entry_point),
        ];

        let vertex_bindings = [desc.vertex_binding];
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Static viewport and scissor covering the swapchain
        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: desc.extent.width as f32,
            height: desc.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent: desc.extent }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(desc.cull_mode)
            .front_face(desc.front_face)
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(desc.depth_compare_op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(desc.blend_enable)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(0);

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&create_info), None)
                .map_err(|(_, e)| vk_error("vkCreateGraphicsPipelines", e))?
        };
        pipelines
            .first()
            .copied()
            .ok_or_else(|| Error::BackendError("vkCreateGraphicsPipelines returned no pipeline".to_string()))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    // ===== DESCRIPTORS =====

    fn create_descriptor_pool(&self, pool_sizes: &[vk::DescriptorPoolSize], max_sets: u32) -> Result<vk::DescriptorPool> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(pool_sizes)
            .max_sets(max_sets);

        unsafe {
            self.device
                .create_descriptor_pool(&create_info, None)
                .map_err(|e| vk_error("vkCreateDescriptorPool", e))
        }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_sets(&self, pool: vk::DescriptorPool, layouts: &[vk::DescriptorSetLayout]) -> Result<Vec<vk::DescriptorSet>> {
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(layouts);

        unsafe {
            self.device
                .allocate_descriptor_sets(&allocate_info)
                .map_err(|e| vk_error("vkAllocateDescriptorSets", e))
        }
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        for write in writes {
            match *write {
                DescriptorWrite::UniformBuffer { binding, buffer, range } => {
                    let buffer_info = [vk::DescriptorBufferInfo { buffer, offset: 0, range }];
                    let descriptor_write = vk::WriteDescriptorSet::default()
                        .dst_set(set)
                        .dst_binding(binding)
                        .dst_array_element(0)
                        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                        .buffer_info(&buffer_info);
                    unsafe { self.device.update_descriptor_sets(&[descriptor_write], &[]) };
                }
                DescriptorWrite::CombinedImageSampler { binding, image_view, sampler } => {
                    let image_info = [vk::DescriptorImageInfo {
                        sampler,
                        image_view,
                        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    }];
                    let descriptor_write = vk::WriteDescriptorSet::default()
                        .dst_set(set)
                        .dst_binding(binding)
                        .dst_array_element(0)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(&image_info);
                    unsafe { self.device.update_descriptor_sets(&[descriptor_write], &[]) };
                }
            }
        }
    }

    // ===== COMMAND BUFFERS =====

    fn create_command_pool(&self, queue_family: u32) -> Result<vk::CommandPool> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        unsafe {
            self.device
                .create_command_pool(&create_info, None)
                .map_err(|e| vk_error("vkCreateCommandPool", e))
        }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(&self, pool: vk::CommandPool, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| vk_error("vkAllocateCommandBuffers", e))
        }
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, buffers) }
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, one_time_submit: bool) -> Result<()> {
        let flags = if one_time_submit {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::empty()
        };
        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);

        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(|e| vk_error("vkBeginCommandBuffer", e))
        }
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        unsafe {
            self.device
                .end_command_buffer(command_buffer)
                .map_err(|e| vk_error("vkEndCommandBuffer", e))
        }
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent })
            .clear_values(clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(command_buffer, &begin_info, vk::SubpassContents::INLINE)
        }
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(command_buffer) }
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline)
        }
    }

    fn cmd_bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe { self.device.cmd_bind_vertex_buffers(command_buffer, 0, &[buffer], &[0]) }
    }

    fn cmd_bind_index_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer, index_type: vk::IndexType) {
        unsafe { self.device.cmd_bind_index_buffer(command_buffer, buffer, 0, index_type) }
    }

    fn cmd_bind_descriptor_set(&self, command_buffer: vk::CommandBuffer, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            )
        }
    }

    fn cmd_draw_indexed(&self, command_buffer: vk::CommandBuffer, index_count: u32) {
        unsafe { self.device.cmd_draw_indexed(command_buffer, index_count, 1, 0, 0, 0) }
    }

    fn cmd_copy_buffer(&self, command_buffer: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size };
        unsafe { self.device.cmd_copy_buffer(command_buffer, src, dst, &[region]) }
    }

    fn cmd_copy_buffer_to_image(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer, image: vk::Image, extent: vk::Extent2D) {
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D { width: extent.width, height: extent.height, depth: 1 },
        };
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                command_buffer,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        }
    }

    fn cmd_image_barrier(&self, command_buffer: vk::CommandBuffer, barrier: &ImageBarrier) {
        let image_barrier = vk::ImageMemoryBarrier::default()
            .old_layout(barrier.old_layout)
            .new_layout(barrier.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(barrier.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: barrier.aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(barrier.src_access_mask)
            .dst_access_mask(barrier.dst_access_mask);

        unsafe {
            self.device.cmd_pipeline_barrier(
                command_buffer,
                barrier.src_stage_mask,
                barrier.dst_stage_mask,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[image_barrier],
            )
        }
    }

    // ===== SYNCHRONIZATION =====

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(|e| vk_error("vkCreateSemaphore", e))
        }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        unsafe {
            self.device
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
                .map_err(|e| vk_error("vkCreateFence", e))
        }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe {
            self.device
                .wait_for_fences(&[fence], true, u64::MAX)
                .map_err(|e| vk_error("vkWaitForFences", e))
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe {
            self.device
                .reset_fences(&[fence])
                .map_err(|e| vk_error("vkResetFences", e))
        }
    }

    // ===== QUEUES =====

    fn queue_submit(&self, submit: &SubmitDesc) -> Result<()> {
        let (wait_semaphores, wait_stages): (Vec<vk::Semaphore>, Vec<vk::PipelineStageFlags>) =
            submit.wait.into_iter().unzip();
        let signal_semaphores: Vec<vk::Semaphore> = submit.signal.into_iter().collect();
        let command_buffers = [submit.command_buffer];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], submit.fence)
                .map_err(|e| vk_error("vkQueueSubmit", e))
        }
    }

    fn queue_wait_idle(&self) -> Result<()> {
        unsafe {
            self.device
                .queue_wait_idle(self.graphics_queue)
                .map_err(|e| vk_error("vkQueueWaitIdle", e))
        }
    }

    fn device_wait_idle(&self) -> Result<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| vk_error("vkDeviceWaitIdle", e))
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);
        }
        self.parts.destroy();
        self.destroyed = true;
        engine_debug!(SOURCE, "Device and instance destroyed");
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        DeviceApi::destroy(self);
    }
}

#[cfg(test)]
#[path = "vulkan_context_tests.rs"]
mod tests;
