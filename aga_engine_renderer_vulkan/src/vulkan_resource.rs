/// ResourceSet - GPU buffers, images and samplers
///
/// Every resource goes through the same allocate + bind routine: create the
/// handle, query its memory requirements, pick a memory type by linear scan,
/// allocate, bind. Device-local data is uploaded through a host-visible
/// staging buffer with a one-shot command buffer.

use aga_engine::aga::{Error, Result};
use aga_engine::{engine_debug, engine_error};
use ash::vk;

use crate::vulkan_device::{DeviceApi, ImageBarrier, ImageDesc, SamplerDesc, SubmitDesc};
use crate::vulkan_scene::SceneDesc;

/// Buffer handle with its backing memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

impl GpuBuffer {
    /// Destroy the buffer, then free its memory
    pub fn destroy<D: DeviceApi>(&mut self, device: &D) {
        if self.buffer != vk::Buffer::null() {
            device.destroy_buffer(self.buffer);
            self.buffer = vk::Buffer::null();
        }
        if self.memory != vk::DeviceMemory::null() {
            device.free_memory(self.memory);
            self.memory = vk::DeviceMemory::null();
        }
    }
}

/// 2D image with its backing memory and optional view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Default for GpuImage {
    fn default() -> Self {
        Self {
            image: vk::Image::null(),
            memory: vk::DeviceMemory::null(),
            view: vk::ImageView::null(),
            format: vk::Format::UNDEFINED,
            extent: vk::Extent2D::default(),
        }
    }
}

impl GpuImage {
    /// Destroy view, image, then memory (null handles are skipped)
    pub fn destroy<D: DeviceApi>(&mut self, device: &D) {
        if self.view != vk::ImageView::null() {
            device.destroy_image_view(self.view);
        }
        if self.image != vk::Image::null() {
            device.destroy_image(self.image);
        }
        if self.memory != vk::DeviceMemory::null() {
            device.free_memory(self.memory);
        }
        *self = Self::default();
    }
}

// ===== MEMORY TYPE SELECTION =====

/// Lowest-indexed memory type whose bit is set in `type_bits` and whose
/// property flags contain all of `required`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = (memory_properties.memory_type_count as usize).min(memory_properties.memory_types.len());
    memory_properties.memory_types[..count]
        .iter()
        .enumerate()
        .find(|&(i, memory_type)| {
            (type_bits & (1u32 << i)) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(i, _)| i as u32)
}

fn allocate_for<D: DeviceApi>(
    device: &D,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> Result<vk::DeviceMemory> {
    let memory_type = find_memory_type(&device.memory_properties(), requirements.memory_type_bits, properties)
        .ok_or_else(|| {
            engine_error!(
                "aga::vulkan::Resource",
                "No memory type with {:?} in type bits {:#b}",
                properties,
                requirements.memory_type_bits
            );
            Error::MemoryTypeNotFound {
                type_bits: requirements.memory_type_bits,
                properties: properties.as_raw(),
            }
        })?;
    device.allocate_memory(requirements.size, memory_type)
}

// ===== BUFFERS =====

/// Create a buffer and bind freshly allocated memory with the given properties
pub fn create_buffer<D: DeviceApi>(
    device: &D,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
) -> Result<GpuBuffer> {
    let buffer = device.create_buffer(size, usage)?;
    let requirements = device.buffer_memory_requirements(buffer);

    let memory = match allocate_for(device, requirements, properties) {
        Ok(memory) => memory,
        Err(e) => {
            device.destroy_buffer(buffer);
            return Err(e);
        }
    };

    if let Err(e) = device.bind_buffer_memory(buffer, memory) {
        device.destroy_buffer(buffer);
        device.free_memory(memory);
        return Err(e);
    }

    Ok(GpuBuffer { buffer, memory, size, usage })
}

/// Host-visible, host-coherent buffer filled with `data`
pub fn create_staging_buffer<D: DeviceApi>(device: &D, data: &[u8]) -> Result<GpuBuffer> {
    let mut staging = create_buffer(
        device,
        data.len() as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    if let Err(e) = device.write_memory(staging.memory, 0, data) {
        staging.destroy(device);
        return Err(e);
    }
    Ok(staging)
}

/// Device-local buffer initialized from `data` through a staging buffer
pub fn create_device_local_buffer<D: DeviceApi>(
    device: &D,
    command_pool: vk::CommandPool,
    data: &[u8],
    usage: vk::BufferUsageFlags,
) -> Result<GpuBuffer> {
    let size = data.len() as vk::DeviceSize;
    let mut staging = create_staging_buffer(device, data)?;

    let result = create_buffer(
        device,
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )
    .and_then(|mut buffer| match copy_buffer(device, command_pool, staging.buffer, buffer.buffer, size) {
        Ok(()) => Ok(buffer),
        Err(e) => {
            buffer.destroy(device);
            Err(e)
        }
    });

    staging.destroy(device);
    result
}

// ===== ONE-SHOT COMMANDS =====

/// Record and run a command buffer synchronously
///
/// Allocate, begin, record, end, submit, wait for the queue to go idle, free.
pub fn one_shot_commands<D, F>(device: &D, command_pool: vk::CommandPool, record: F) -> Result<()>
where
    D: DeviceApi,
    F: FnOnce(vk::CommandBuffer),
{
    let command_buffers = device.allocate_command_buffers(command_pool, 1)?;
    let command_buffer = match command_buffers.first() {
        Some(command_buffer) => *command_buffer,
        None => return Err(Error::BackendError("No command buffer allocated".to_string())),
    };

    let result = device
        .begin_command_buffer(command_buffer, true)
        .and_then(|()| {
            record(command_buffer);
            device.end_command_buffer(command_buffer)
        })
        .and_then(|()| {
            device.queue_submit(&SubmitDesc {
                command_buffer,
                wait: None,
                signal: None,
                fence: vk::Fence::null(),
            })
        })
        .and_then(|()| device.queue_wait_idle());

    device.free_command_buffers(command_pool, &command_buffers);
    result
}

/// Copy `size` bytes between buffers
pub fn copy_buffer<D: DeviceApi>(
    device: &D,
    command_pool: vk::CommandPool,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> Result<()> {
    one_shot_commands(device, command_pool, |command_buffer| {
        device.cmd_copy_buffer(command_buffer, src, dst, size);
    })
}

/// Copy tightly packed texels into mip 0 / layer 0 of an image in TRANSFER_DST_OPTIMAL
pub fn copy_buffer_to_image<D: DeviceApi>(
    device: &D,
    command_pool: vk::CommandPool,
    buffer: vk::Buffer,
    image: vk::Image,
    extent: vk::Extent2D,
) -> Result<()> {
    one_shot_commands(device, command_pool, |command_buffer| {
        device.cmd_copy_buffer_to_image(command_buffer, buffer, image, extent);
    })
}

// ===== IMAGES =====

/// Formats carrying a stencil component
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::S8_UINT
    )
}

/// Barrier for one of the supported layout transitions
///
/// | old                  | new                      | access                     | stages                        |
/// |----------------------|--------------------------|----------------------------|-------------------------------|
/// | UNDEFINED            | TRANSFER_DST_OPTIMAL     | none -> TRANSFER_WRITE     | TOP_OF_PIPE -> TRANSFER       |
/// | TRANSFER_DST_OPTIMAL | SHADER_READ_ONLY_OPTIMAL | TRANSFER_WRITE -> SHADER_READ | TRANSFER -> FRAGMENT_SHADER |
/// | UNDEFINED            | DEPTH_STENCIL_ATTACHMENT_OPTIMAL | none -> DEPTH_STENCIL_ATTACHMENT_READ/WRITE | TOP_OF_PIPE -> EARLY_FRAGMENT_TESTS |
pub fn layout_transition_barrier(
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<ImageBarrier> {
    let (src_access_mask, dst_access_mask, src_stage_mask, dst_stage_mask) = match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        ),
        _ => {
            engine_error!(
                "aga::vulkan::Resource",
                "Unsupported layout transition {:?} -> {:?}",
                old_layout,
                new_layout
            );
            return Err(Error::UnsupportedLayoutTransition {
                from: format!("{:?}", old_layout),
                to: format!("{:?}", new_layout),
            });
        }
    };

    Ok(ImageBarrier {
        image,
        aspect_mask,
        old_layout,
        new_layout,
        src_access_mask,
        dst_access_mask,
        src_stage_mask,
        dst_stage_mask,
    })
}

/// Transition an image layout with a one-shot command buffer
pub fn transition_image_layout<D: DeviceApi>(
    device: &D,
    command_pool: vk::CommandPool,
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<()> {
    let barrier = layout_transition_barrier(image, aspect_mask, old_layout, new_layout)?;
    one_shot_commands(device, command_pool, |command_buffer| {
        device.cmd_image_barrier(command_buffer, &barrier);
    })
}

/// Create a 2D image and bind freshly allocated memory (no view)
pub fn create_image<D: DeviceApi>(
    device: &D,
    desc: &ImageDesc,
    properties: vk::MemoryPropertyFlags,
) -> Result<GpuImage> {
    let image = device.create_image(desc)?;
    let requirements = device.image_memory_requirements(image);

    let memory = match allocate_for(device, requirements, properties) {
        Ok(memory) => memory,
        Err(e) => {
            device.destroy_image(image);
            return Err(e);
        }
    };

    if let Err(e) = device.bind_image_memory(image, memory) {
        device.destroy_image(image);
        device.free_memory(memory);
        return Err(e);
    }

    Ok(GpuImage {
        image,
        memory,
        view: vk::ImageView::null(),
        format: desc.format,
        extent: desc.extent,
    })
}

/// Sampled RGBA8 texture uploaded through a staging buffer
///
/// Ends in SHADER_READ_ONLY_OPTIMAL with a color view.
pub fn create_texture<D: DeviceApi>(
    device: &D,
    command_pool: vk::CommandPool,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Result<GpuImage> {
    let expected = width as usize * height as usize * 4;
    if width == 0 || height == 0 || pixels.len() != expected {
        return Err(Error::InvalidResource(format!(
            "Texture {}x{} needs {} RGBA8 bytes, got {}",
            width, height, expected, pixels.len()
        )));
    }

    let format = vk::Format::R8G8B8A8_SRGB;
    let extent = vk::Extent2D { width, height };
    let mut staging = create_staging_buffer(device, pixels)?;

    let desc = ImageDesc {
        extent,
        format,
        tiling: vk::ImageTiling::OPTIMAL,
        usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
    };
    let mut texture = match create_image(device, &desc, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
        Ok(texture) => texture,
        Err(e) => {
            staging.destroy(device);
            return Err(e);
        }
    };

    let upload = transition_image_layout(
        device,
        command_pool,
        texture.image,
        vk::ImageAspectFlags::COLOR,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    )
    .and_then(|()| copy_buffer_to_image(device, command_pool, staging.buffer, texture.image, extent))
    .and_then(|()| {
        transition_image_layout(
            device,
            command_pool,
            texture.image,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
    })
    .and_then(|()| device.create_image_view(texture.image, format, vk::ImageAspectFlags::COLOR));

    staging.destroy(device);

    match upload {
        Ok(view) => {
            texture.view = view;
            engine_debug!("aga::vulkan::Resource", "Uploaded {}x{} texture", width, height);
            Ok(texture)
        }
        Err(e) => {
            texture.destroy(device);
            Err(e)
        }
    }
}

/// Linear, repeating sampler with anisotropy clamped to the device limit
pub fn texture_sampler_desc(requested_anisotropy: f32, device_limit: f32) -> SamplerDesc {
    let anisotropy = requested_anisotropy.min(device_limit);
    SamplerDesc {
        filter: vk::Filter::LINEAR,
        address_mode: vk::SamplerAddressMode::REPEAT,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        max_anisotropy: if anisotropy >= 1.0 { Some(anisotropy) } else { None },
    }
}

// ===== RESOURCE SET =====

/// Scene-lifetime resources: survive swapchain recreation
pub struct ResourceSet {
    pub vertex_buffer: GpuBuffer,
    pub index_buffer: GpuBuffer,
    pub index_count: u32,
    pub texture: GpuImage,
    pub sampler: vk::Sampler,
}

impl ResourceSet {
    /// Upload geometry and texture, create the sampler
    ///
    /// Anything created before a failure is released before returning.
    pub fn create<D: DeviceApi>(
        device: &D,
        command_pool: vk::CommandPool,
        scene: &SceneDesc,
        max_anisotropy: f32,
    ) -> Result<Self> {
        let mut set = Self::empty();
        match set.fill(device, command_pool, scene, max_anisotropy) {
            Ok(()) => Ok(set),
            Err(e) => {
                set.destroy(device);
                Err(e)
            }
        }
    }

    /// Set with every handle null
    pub fn empty() -> Self {
        let null_buffer = GpuBuffer {
            buffer: vk::Buffer::null(),
            memory: vk::DeviceMemory::null(),
            size: 0,
            usage: vk::BufferUsageFlags::empty(),
        };
        Self {
            vertex_buffer: null_buffer,
            index_buffer: null_buffer,
            index_count: 0,
            texture: GpuImage::default(),
            sampler: vk::Sampler::null(),
        }
    }

    fn fill<D: DeviceApi>(
        &mut self,
        device: &D,
        command_pool: vk::CommandPool,
        scene: &SceneDesc,
        max_anisotropy: f32,
    ) -> Result<()> {
        if scene.vertices.is_empty() || scene.indices.is_empty() {
            return Err(Error::InvalidResource("Scene has no geometry".to_string()));
        }

        self.vertex_buffer = create_device_local_buffer(
            device,
            command_pool,
            bytemuck::cast_slice(&scene.vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        self.index_buffer = create_device_local_buffer(
            device,
            command_pool,
            bytemuck::cast_slice(&scene.indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;
        self.index_count = scene.indices.len() as u32;

        let texture = &scene.texture;
        self.texture = create_texture(device, command_pool, texture.width, texture.height, &texture.pixels)?;
        self.sampler = device.create_sampler(&texture_sampler_desc(
            max_anisotropy,
            device.max_sampler_anisotropy(),
        ))?;
        engine_debug!(
            "aga::vulkan::Resource",
            "Scene resources ready ({} vertices, {} indices)",
            scene.vertices.len(),
            scene.indices.len()
        );
        Ok(())
    }

    /// Destroy in reverse creation order
    pub fn destroy<D: DeviceApi>(&mut self, device: &D) {
        if self.sampler != vk::Sampler::null() {
            device.destroy_sampler(self.sampler);
            self.sampler = vk::Sampler::null();
        }
        self.texture.destroy(device);
        self.index_buffer.destroy(device);
        self.vertex_buffer.destroy(device);
        self.index_count = 0;
    }
}

#[cfg(test)]
#[path = "vulkan_resource_tests.rs"]
mod tests;
