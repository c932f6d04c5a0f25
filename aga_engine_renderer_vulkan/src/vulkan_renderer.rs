/// VulkanRenderer - composes device, swapchain, pipeline, resources and frame sync
///
/// Ownership is explicit: the renderer owns the device for its whole life,
/// the scene resources survive swapchain recreation, and everything sized
/// from the swapchain image count lives in the swapchain group and is
/// rebuilt with it.
///
/// Frame loop:
///
/// ```text
/// begin_render  wait slot fence -> acquire -> wait image fence
/// render_frame  write uniform buffer -> reset fence -> submit
/// end_render    present -> advance slot -> recreate if stale or resized
/// ```

use std::time::Instant;

use aga_engine::aga::platform::{FileSystem, WindowSystem};
use aga_engine::aga::render::Config;
use aga_engine::aga::Result;
use aga_engine::{engine_debug, engine_err, engine_info, engine_warn};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::vulkan_context::DeviceContext;
use crate::vulkan_device::{DescriptorWrite, DeviceApi, PresentOutcome};
use crate::vulkan_frame_sync::{BeginFrame, FrameSynchronizer};
use crate::vulkan_pipeline::{scene_descriptor_bindings, PipelineBuilder};
use crate::vulkan_resource::{create_buffer, transition_image_layout, ResourceSet};
use crate::vulkan_scene::{SceneDesc, UniformBufferObject};
use crate::vulkan_swapchain::{SwapchainGroup, SwapchainManager};

const SOURCE: &str = "aga::vulkan::Renderer";

/// Everything the swapchain-dependent objects are built from
struct GroupDependencies<'a> {
    pipeline_builder: &'a PipelineBuilder,
    descriptor_set_layout: vk::DescriptorSetLayout,
    command_pool: vk::CommandPool,
    resources: &'a ResourceSet,
    clear_color: [f32; 4],
    clear_depth: f32,
}

/// Depth layout, pipeline, uniform buffers, descriptor sets and pre-recorded command
/// buffers for a freshly built swapchain group
///
/// Handles are stored in the group as soon as they exist, so a failure part
/// way leaves a group that `destroy_swapchain` can still tear down.
fn build_dependents<D: DeviceApi>(device: &D, group: &mut SwapchainGroup, deps: &GroupDependencies) -> Result<()> {
    let image_count = group.image_count() as u32;

    transition_image_layout(
        device,
        deps.command_pool,
        group.depth.image,
        group.depth_aspect_mask(),
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    )?;

    group.pipeline = deps.pipeline_builder.build(device, group.render_pass, group.extent())?;

    // One uniform buffer per swapchain image
    let ubo_size = std::mem::size_of::<UniformBufferObject>() as vk::DeviceSize;
    for _ in 0..image_count {
        let buffer = create_buffer(
            device,
            ubo_size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        group.uniform_buffers.push(buffer);
    }

    let pool_sizes = [
        vk::DescriptorPoolSize { ty: vk::DescriptorType::UNIFORM_BUFFER, descriptor_count: image_count },
        vk::DescriptorPoolSize { ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER, descriptor_count: image_count },
    ];
    group.descriptor_pool = device.create_descriptor_pool(&pool_sizes, image_count)?;

    let layouts = vec![deps.descriptor_set_layout; image_count as usize];
    group.descriptor_sets = device.allocate_descriptor_sets(group.descriptor_pool, &layouts)?;
    for (set, buffer) in group.descriptor_sets.iter().zip(&group.uniform_buffers) {
        device.update_descriptor_set(
            *set,
            &[
                DescriptorWrite::UniformBuffer { binding: 0, buffer: buffer.buffer, range: ubo_size },
                DescriptorWrite::CombinedImageSampler {
                    binding: 1,
                    image_view: deps.resources.texture.view,
                    sampler: deps.resources.sampler,
                },
            ],
        );
    }

    group.command_buffers = device.allocate_command_buffers(deps.command_pool, image_count)?;
    record_command_buffers(device, group, deps)
}

/// Record the scene draw into every per-image command buffer
fn record_command_buffers<D: DeviceApi>(device: &D, group: &SwapchainGroup, deps: &GroupDependencies) -> Result<()> {
    let clear_values = [
        vk::ClearValue { color: vk::ClearColorValue { float32: deps.clear_color } },
        vk::ClearValue { depth_stencil: vk::ClearDepthStencilValue { depth: deps.clear_depth, stencil: 0 } },
    ];
    let extent = group.extent();

    let targets = group.command_buffers.iter().zip(&group.framebuffers).zip(&group.descriptor_sets);
    for ((&command_buffer, &framebuffer), &descriptor_set) in targets {
        device.begin_command_buffer(command_buffer, false)?;
        device.cmd_begin_render_pass(command_buffer, group.render_pass, framebuffer, extent, &clear_values);
        device.cmd_bind_pipeline(command_buffer, group.pipeline.pipeline);
        device.cmd_bind_vertex_buffer(command_buffer, deps.resources.vertex_buffer.buffer);
        device.cmd_bind_index_buffer(command_buffer, deps.resources.index_buffer.buffer, vk::IndexType::UINT16);
        device.cmd_bind_descriptor_set(command_buffer, group.pipeline.layout, descriptor_set);
        device.cmd_draw_indexed(command_buffer, deps.resources.index_count);
        device.cmd_end_render_pass(command_buffer);
        device.end_command_buffer(command_buffer)?;
    }
    Ok(())
}

/// Vulkan rendering core
pub struct VulkanRenderer<D: DeviceApi = DeviceContext> {
    device: D,
    config: Config,
    pipeline_builder: PipelineBuilder,
    descriptor_set_layout: vk::DescriptorSetLayout,
    command_pool: vk::CommandPool,
    resources: ResourceSet,
    swapchain: SwapchainManager,
    frames: FrameSynchronizer,
    /// Resize notification, read and cleared at `end_render`
    framebuffer_resized: bool,
    /// Last acquire reported a suboptimal swapchain
    acquire_suboptimal: bool,
    start_time: Instant,
    destroyed: bool,
}

impl VulkanRenderer<DeviceContext> {
    /// Bring up the device for `window` and build everything needed to draw `scene`
    ///
    /// Shaders are read through `fs` from the paths in `config`.
    pub fn initialize<W>(window: &mut W, fs: &dyn FileSystem, config: Config, scene: &SceneDesc) -> Result<Self>
    where
        W: WindowSystem + HasDisplayHandle + HasWindowHandle,
    {
        let device = DeviceContext::new(&*window, &config)?;
        Self::with_device(device, window, fs, config, scene)
    }
}

impl<D: DeviceApi> VulkanRenderer<D> {
    /// Build the renderer on an existing device
    ///
    /// The renderer takes ownership of `device` and destroys it on failure.
    pub fn with_device(
        device: D,
        window: &mut dyn WindowSystem,
        fs: &dyn FileSystem,
        config: Config,
        scene: &SceneDesc,
    ) -> Result<Self> {
        let pipeline_builder = match PipelineBuilder::from_files(fs, &config.vertex_shader_path, &config.fragment_shader_path) {
            Ok(builder) => builder.cull_mode(config.cull_mode),
            Err(e) => {
                let mut device = device;
                device.destroy();
                return Err(e);
            }
        };

        let mut renderer = Self {
            device,
            config,
            pipeline_builder,
            descriptor_set_layout: vk::DescriptorSetLayout::null(),
            command_pool: vk::CommandPool::null(),
            resources: ResourceSet::empty(),
            swapchain: SwapchainManager::new(),
            frames: FrameSynchronizer::default(),
            framebuffer_resized: false,
            acquire_suboptimal: false,
            start_time: Instant::now(),
            destroyed: false,
        };
        // On error the partially built renderer is dropped, which destroys it
        renderer.build(window, scene)?;
        Ok(renderer)
    }

    fn build(&mut self, window: &mut dyn WindowSystem, scene: &SceneDesc) -> Result<()> {
        let families = self.device.queue_families();
        self.command_pool = self.device.create_command_pool(families.graphics)?;

        self.descriptor_set_layout = self.device.create_descriptor_set_layout(&scene_descriptor_bindings())?;
        self.pipeline_builder = self
            .pipeline_builder
            .clone()
            .descriptor_set_layouts(&[self.descriptor_set_layout]);

        self.resources = ResourceSet::create(&self.device, self.command_pool, scene, self.config.max_anisotropy)?;

        self.swapchain.build(&self.device, &*window)?;
        let deps = GroupDependencies {
            pipeline_builder: &self.pipeline_builder,
            descriptor_set_layout: self.descriptor_set_layout,
            command_pool: self.command_pool,
            resources: &self.resources,
            clear_color: self.config.clear_color,
            clear_depth: self.config.clear_depth,
        };
        build_dependents(&self.device, self.swapchain.group_mut(), &deps)?;

        let image_count = self.swapchain.group().image_count();
        self.frames = FrameSynchronizer::new(&self.device, self.config.frames_in_flight, image_count)?;

        engine_info!(
            SOURCE,
            "Renderer initialized: {} swapchain images, {} frames in flight",
            image_count,
            self.config.frames_in_flight
        );
        Ok(())
    }

    // ===== ACCESSORS =====

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn swapchain(&self) -> &SwapchainManager {
        &self.swapchain
    }

    pub fn frames(&self) -> &FrameSynchronizer {
        &self.frames
    }

    /// Latch a resize; the swapchain is rebuilt after the next present
    pub fn set_framebuffer_resized(&mut self) {
        self.framebuffer_resized = true;
    }

    // ===== FRAME LOOP =====

    /// Start a frame
    ///
    /// Returns false when the surface was out of date: the swapchain has
    /// been rebuilt, nothing was acquired, and the caller skips this frame.
    pub fn begin_render(&mut self, window: &mut dyn WindowSystem) -> Result<bool> {
        let swapchain = self.swapchain.group().swapchain;
        match self.frames.begin_frame(&self.device, swapchain)? {
            BeginFrame::Ready { suboptimal, .. } => {
                self.acquire_suboptimal = suboptimal;
                Ok(true)
            }
            BeginFrame::OutOfDate => {
                engine_debug!(SOURCE, "Swapchain out of date at acquire, skipping frame");
                self.recreate_swapchain(window)?;
                Ok(false)
            }
        }
    }

    /// Update the uniform buffer of the acquired image and submit its commands
    pub fn render_frame(&mut self) -> Result<()> {
        let image_index = match self.frames.image_index() {
            Some(index) => index as usize,
            None => return Err(engine_err!(SOURCE, "render_frame called without an acquired image")),
        };

        let group = self.swapchain.group();
        let (uniform_buffer, command_buffer) =
            match (group.uniform_buffers.get(image_index), group.command_buffers.get(image_index)) {
                (Some(buffer), Some(command_buffer)) => (buffer.memory, *command_buffer),
                _ => {
                    self.frames.abort_frame();
                    return Err(engine_err!(SOURCE, "No per-image resources for image {}", image_index));
                }
            };

        // The image fence was waited on in begin_render, so nothing reads this buffer
        let ubo = UniformBufferObject::at_time(self.start_time.elapsed().as_secs_f32(), group.extent());
        let result = self
            .device
            .write_memory(uniform_buffer, 0, bytemuck::bytes_of(&ubo))
            .and_then(|()| self.frames.submit(&self.device, command_buffer));
        if result.is_err() {
            self.frames.abort_frame();
        }
        result
    }

    /// Present the frame, move to the next slot and rebuild the swapchain if needed
    pub fn end_render(&mut self, window: &mut dyn WindowSystem) -> Result<()> {
        let swapchain = self.swapchain.group().swapchain;
        let outcome = match self.frames.present(&self.device, swapchain) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.frames.abort_frame();
                return Err(e);
            }
        };
        self.frames.advance();

        let resized = std::mem::take(&mut self.framebuffer_resized);
        let suboptimal = std::mem::take(&mut self.acquire_suboptimal);
        if resized || suboptimal || outcome != PresentOutcome::Presented {
            engine_debug!(
                SOURCE,
                "Rebuilding swapchain after present ({:?}, resized: {}, acquire suboptimal: {})",
                outcome,
                resized,
                suboptimal
            );
            self.recreate_swapchain(window)?;
        }
        Ok(())
    }

    /// One full frame; a frame skipped for an out-of-date surface is not an error
    pub fn draw_frame(&mut self, window: &mut dyn WindowSystem) -> Result<()> {
        if !self.begin_render(window)? {
            return Ok(());
        }
        self.render_frame()?;
        self.end_render(window)
    }

    /// Tear down and rebuild the swapchain group, pipeline and command buffers
    pub fn recreate_swapchain(&mut self, window: &mut dyn WindowSystem) -> Result<()> {
        let deps = GroupDependencies {
            pipeline_builder: &self.pipeline_builder,
            descriptor_set_layout: self.descriptor_set_layout,
            command_pool: self.command_pool,
            resources: &self.resources,
            clear_color: self.config.clear_color,
            clear_depth: self.config.clear_depth,
        };
        self.swapchain
            .recreate_swapchain(&self.device, window, self.command_pool, |device, group| {
                build_dependents(device, group, &deps)
            })?;

        // The device went idle during the rebuild, so no image is in flight
        self.frames.reset_images(self.swapchain.group().image_count());
        Ok(())
    }

    // ===== SHUTDOWN =====

    /// Destroy every object, then the device; safe to call more than once
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        // 1. Nothing may still be executing
        if let Err(e) = self.device.device_wait_idle() {
            engine_warn!(SOURCE, "device_wait_idle failed during shutdown: {}", e);
        }

        // 2. Frame slots, then the swapchain group and its dependents
        self.frames.destroy(&self.device);
        self.swapchain.destroy_swapchain(&self.device, self.command_pool);

        // 3. Scene resources and the objects they were built with
        self.resources.destroy(&self.device);
        if self.descriptor_set_layout != vk::DescriptorSetLayout::null() {
            self.device.destroy_descriptor_set_layout(self.descriptor_set_layout);
            self.descriptor_set_layout = vk::DescriptorSetLayout::null();
        }
        if self.command_pool != vk::CommandPool::null() {
            self.device.destroy_command_pool(self.command_pool);
            self.command_pool = vk::CommandPool::null();
        }

        // 4. Device last
        self.device.destroy();
        engine_info!(SOURCE, "Renderer destroyed");
    }
}

impl<D: DeviceApi> Drop for VulkanRenderer<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
#[path = "vulkan_renderer_tests.rs"]
mod tests;
