/*!
# AGA Engine - Vulkan Rendering Core

Vulkan renderer for the AGA engine, built on `ash`.

The core is split along the lifetime of the objects it owns:

- **DeviceContext**: instance, surface, physical/logical device, queues, validation
- **SwapchainManager**: swapchain, image views, depth attachment, render pass,
  framebuffers and everything sized from the image count, rebuilt as one unit
- **PipelineBuilder**: graphics pipeline from pre-compiled SPIR-V
- **FrameSynchronizer**: frame slots, image-in-flight fences, frame rotation
- **ResourceSet**: buffers, images and samplers that survive swapchain rebuilds
- **VulkanRenderer**: composes the above into the begin/render/end frame loop

Every component talks to the GPU through the `DeviceApi` trait, implemented
by `DeviceContext` on top of `ash`.

```no_run
use aga_engine::aga::platform::{NativeFileSystem, WinitWindow};
use aga_engine::aga::render::Config;
use aga_engine_renderer_vulkan::{SceneDesc, VulkanRenderer};

# fn main() -> aga_engine::aga::Result<()> {
let mut window = WinitWindow::new("AGA", 800, 600, true)?;
let fs = NativeFileSystem::current_dir();
let mut renderer = VulkanRenderer::initialize(&mut window, &fs, Config::default(), &SceneDesc::default())?;
renderer.draw_frame(&mut window)?;
# Ok(())
# }
```
*/

// Vulkan implementation modules
mod debug;
mod vulkan_device;
mod vulkan_context;
mod vulkan_resource;
mod vulkan_scene;
mod vulkan_pipeline;
mod vulkan_swapchain;
mod vulkan_frame_sync;
mod vulkan_renderer;

#[cfg(test)]
mod mock_device;

pub use vulkan_renderer::VulkanRenderer;
pub use vulkan_context::{find_queue_families, pick_device, DeviceCandidate, DeviceContext};
pub use vulkan_device::{
    AcquireOutcome, DescriptorBinding, DescriptorWrite, DeviceApi, GraphicsPipelineDesc,
    ImageBarrier, ImageDesc, PresentOutcome, QueueFamilyIndices, RenderPassDesc, SamplerDesc,
    SubmitDesc, SwapchainDesc,
};
pub use vulkan_swapchain::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format,
    select_depth_format, SurfaceDescriptor, SwapchainGroup, SwapchainManager,
    DEPTH_FORMAT_CANDIDATES,
};
pub use vulkan_pipeline::{
    cull_mode_to_vk, load_spirv, scene_descriptor_bindings, PipelineBuilder, PipelineState,
    SPIRV_MAGIC,
};
pub use vulkan_frame_sync::{BeginFrame, FrameSlot, FrameState, FrameSynchronizer};
pub use vulkan_resource::{
    copy_buffer, copy_buffer_to_image, create_buffer, create_device_local_buffer, create_image,
    create_staging_buffer, create_texture, find_memory_type, has_stencil_component,
    layout_transition_barrier, one_shot_commands, texture_sampler_desc, transition_image_layout,
    GpuBuffer, GpuImage, ResourceSet,
};
pub use vulkan_scene::{SceneDesc, TextureData, UniformBufferObject, Vertex};

// Re-export debug utilities
pub use debug::{get_validation_stats, log_validation_stats_report};
