/// DeviceApi - explicit Vulkan device primitives used by the rendering core
///
/// The swapchain manager, pipeline builder, frame synchronizer and resource
/// set never touch `ash::Device` directly; they go through this trait so the
/// whole lifecycle can be driven against a recording mock.

use aga_engine::aga::Result;
use ash::vk;

/// Queue family indices chosen at device selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Graphics and present run on the same family
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices (one entry when the family is shared)
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Result of a swapchain image acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image acquired; `suboptimal` means the swapchain still works but no longer matches the surface
    Acquired { image_index: u32, suboptimal: bool },
    /// The surface changed and the swapchain must be rebuilt before acquiring again
    OutOfDate,
}

/// Result of a queue presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// Swapchain creation parameters
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub queue_families: QueueFamilyIndices,
}

impl SwapchainDesc {
    /// Concurrent sharing when graphics and present families differ
    pub fn sharing_mode(&self) -> vk::SharingMode {
        if self.queue_families.is_shared() {
            vk::SharingMode::EXCLUSIVE
        } else {
            vk::SharingMode::CONCURRENT
        }
    }
}

/// 2D image creation parameters (single mip, single layer, one sample)
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
}

/// Single-subpass render pass with one color and one depth attachment
#[derive(Debug, Clone, Copy)]
pub struct RenderPassDesc {
    pub color: vk::AttachmentDescription,
    pub depth: vk::AttachmentDescription,
    pub dependency: vk::SubpassDependency,
}

/// One descriptor-set layout binding (descriptor count 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stage_flags: vk::ShaderStageFlags,
}

/// Descriptor update for a single binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorWrite {
    UniformBuffer {
        binding: u32,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    },
    CombinedImageSampler {
        binding: u32,
        image_view: vk::ImageView,
        sampler: vk::Sampler,
    },
}

/// Sampler parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    pub mipmap_mode: vk::SamplerMipmapMode,
    /// Anisotropic filtering level, disabled when None
    pub max_anisotropy: Option<f32>,
}

/// Fixed-function state and shader modules for a graphics pipeline
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDesc {
    pub vertex_module: vk::ShaderModule,
    pub fragment_module: vk::ShaderModule,
    pub vertex_binding: vk::VertexInputBindingDescription,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    /// Static viewport and scissor size
    pub extent: vk::Extent2D,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_compare_op: vk::CompareOp,
    pub blend_enable: bool,
}

/// Image memory barrier recorded with a pipeline barrier command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub aspect_mask: vk::ImageAspectFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_access_mask: vk::AccessFlags,
    pub dst_access_mask: vk::AccessFlags,
    pub src_stage_mask: vk::PipelineStageFlags,
    pub dst_stage_mask: vk::PipelineStageFlags,
}

/// One command buffer submission to the graphics queue
#[derive(Debug, Clone, Copy)]
pub struct SubmitDesc {
    pub command_buffer: vk::CommandBuffer,
    /// Semaphore waited on before the given stage
    pub wait: Option<(vk::Semaphore, vk::PipelineStageFlags)>,
    pub signal: Option<vk::Semaphore>,
    /// Fence signaled on completion (`vk::Fence::null()` for none)
    pub fence: vk::Fence,
}

/// Explicit device, queue, command-buffer and synchronization primitives
///
/// All waits block without timeout.
pub trait DeviceApi {
    // ===== PHYSICAL DEVICE SNAPSHOT =====

    fn queue_families(&self) -> QueueFamilyIndices;
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties;
    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties;
    fn max_sampler_anisotropy(&self) -> f32;

    // ===== SURFACE =====

    fn surface_capabilities(&self) -> Result<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(&self) -> Result<Vec<vk::SurfaceFormatKHR>>;
    fn surface_present_modes(&self) -> Result<Vec<vk::PresentModeKHR>>;

    // ===== SWAPCHAIN =====

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>>;
    fn acquire_next_image(&self, swapchain: vk::SwapchainKHR, signal: vk::Semaphore) -> Result<AcquireOutcome>;
    fn queue_present(&self, swapchain: vk::SwapchainKHR, image_index: u32, wait: vk::Semaphore) -> Result<PresentOutcome>;

    // ===== IMAGES AND SAMPLERS =====

    fn create_image(&self, desc: &ImageDesc) -> Result<vk::Image>;
    fn destroy_image(&self, image: vk::Image);
    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;
    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory) -> Result<()>;
    fn create_image_view(&self, image: vk::Image, format: vk::Format, aspect_mask: vk::ImageAspectFlags) -> Result<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_sampler(&self, desc: &SamplerDesc) -> Result<vk::Sampler>;
    fn destroy_sampler(&self, sampler: vk::Sampler);

    // ===== BUFFERS AND MEMORY =====

    fn create_buffer(&self, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Result<vk::Buffer>;
    fn destroy_buffer(&self, buffer: vk::Buffer);
    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory) -> Result<()>;
    fn allocate_memory(&self, size: vk::DeviceSize, memory_type_index: u32) -> Result<vk::DeviceMemory>;
    fn free_memory(&self, memory: vk::DeviceMemory);
    /// Map, copy and unmap host-visible memory
    fn write_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, data: &[u8]) -> Result<()>;

    // ===== RENDER PASS AND FRAMEBUFFERS =====

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_framebuffer(&self, render_pass: vk::RenderPass, attachments: &[vk::ImageView], extent: vk::Extent2D) -> Result<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // ===== SHADERS AND PIPELINES =====

    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);
    fn create_descriptor_set_layout(&self, bindings: &[DescriptorBinding]) -> Result<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    fn create_pipeline_layout(&self, set_layouts: &[vk::DescriptorSetLayout], push_constants: &[vk::PushConstantRange]) -> Result<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    // ===== DESCRIPTORS =====

    fn create_descriptor_pool(&self, pool_sizes: &[vk::DescriptorPoolSize], max_sets: u32) -> Result<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    fn allocate_descriptor_sets(&self, pool: vk::DescriptorPool, layouts: &[vk::DescriptorSetLayout]) -> Result<Vec<vk::DescriptorSet>>;
    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]);

    // ===== COMMAND BUFFERS =====

    fn create_command_pool(&self, queue_family: u32) -> Result<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffers(&self, pool: vk::CommandPool, count: u32) -> Result<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, one_time_submit: bool) -> Result<()>;
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()>;
    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, render_pass: vk::RenderPass, framebuffer: vk::Framebuffer, extent: vk::Extent2D, clear_values: &[vk::ClearValue]);
    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);
    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer);
    fn cmd_bind_index_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer, index_type: vk::IndexType);
    fn cmd_bind_descriptor_set(&self, command_buffer: vk::CommandBuffer, layout: vk::PipelineLayout, set: vk::DescriptorSet);
    fn cmd_draw_indexed(&self, command_buffer: vk::CommandBuffer, index_count: u32);
    fn cmd_copy_buffer(&self, command_buffer: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize);
    fn cmd_copy_buffer_to_image(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer, image: vk::Image, extent: vk::Extent2D);
    fn cmd_image_barrier(&self, command_buffer: vk::CommandBuffer, barrier: &ImageBarrier);

    // ===== SYNCHRONIZATION =====

    fn create_semaphore(&self) -> Result<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool) -> Result<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn wait_for_fence(&self, fence: vk::Fence) -> Result<()>;
    fn reset_fence(&self, fence: vk::Fence) -> Result<()>;

    // ===== QUEUES =====

    fn queue_submit(&self, submit: &SubmitDesc) -> Result<()>;
    fn queue_wait_idle(&self) -> Result<()>;
    fn device_wait_idle(&self) -> Result<()>;

    /// Release the logical device, surface and instance
    ///
    /// Every object created through this trait must already be destroyed.
    fn destroy(&mut self);
}
