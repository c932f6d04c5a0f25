/// PipelineBuilder - graphics pipeline from pre-compiled SPIR-V
///
/// Holds validated shader words and the fixed-function choices. Shader
/// modules only live for the duration of `build`; the resulting
/// `PipelineState` is owned by the swapchain group and rebuilt with it.

use std::path::Path;

use aga_engine::aga::platform::FileSystem;
use aga_engine::aga::render::CullMode;
use aga_engine::aga::{Error, Result};
use aga_engine::{engine_debug, engine_error};
use ash::vk;

use crate::vulkan_device::{DescriptorBinding, DeviceApi, GraphicsPipelineDesc};
use crate::vulkan_scene::Vertex;

/// First word of every SPIR-V module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode a SPIR-V blob into words and check its header
pub fn load_spirv(bytes: &[u8], label: &str) -> Result<Vec<u32>> {
    let words = ash::util::read_spv(&mut std::io::Cursor::new(bytes)).map_err(|e| {
        engine_error!("aga::vulkan::Pipeline", "Invalid SPIR-V for {}: {}", label, e);
        Error::InvalidResource(format!("Invalid SPIR-V for {}: {}", label, e))
    })?;

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        _ => {
            engine_error!("aga::vulkan::Pipeline", "{} is not a SPIR-V module (bad magic)", label);
            Err(Error::InvalidResource(format!("{} is not a SPIR-V module", label)))
        }
    }
}

/// Map the configured cull mode to Vulkan flags
pub fn cull_mode_to_vk(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

/// Descriptor layout used by the scene shaders
///
/// Binding 0: uniform block (vertex). Binding 1: combined image sampler (fragment).
pub fn scene_descriptor_bindings() -> [DescriptorBinding; 2] {
    [
        DescriptorBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            stage_flags: vk::ShaderStageFlags::VERTEX,
        },
        DescriptorBinding {
            binding: 1,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
        },
    ]
}

/// Pipeline plus its layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineState {
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

impl PipelineState {
    pub fn destroy<D: DeviceApi>(&mut self, device: &D) {
        if self.pipeline != vk::Pipeline::null() {
            device.destroy_pipeline(self.pipeline);
            self.pipeline = vk::Pipeline::null();
        }
        if self.layout != vk::PipelineLayout::null() {
            device.destroy_pipeline_layout(self.layout);
            self.layout = vk::PipelineLayout::null();
        }
    }
}

/// Builder for the scene graphics pipeline
///
/// Fixed state: triangle list, filled polygons, counter-clockwise front
/// faces, one sample, depth test LESS with writes, static viewport and
/// scissor covering the swapchain extent.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    vertex_code: Vec<u32>,
    fragment_code: Vec<u32>,
    vertex_binding: vk::VertexInputBindingDescription,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    push_constant_ranges: Vec<vk::PushConstantRange>,
    cull_mode: vk::CullModeFlags,
    blend_enable: bool,
}

impl PipelineBuilder {
    /// Builder from raw SPIR-V blobs, using the scene vertex layout
    pub fn new(vertex_spv: &[u8], fragment_spv: &[u8]) -> Result<Self> {
        Ok(Self {
            vertex_code: load_spirv(vertex_spv, "vertex shader")?,
            fragment_code: load_spirv(fragment_spv, "fragment shader")?,
            vertex_binding: Vertex::binding_description(),
            vertex_attributes: Vertex::attribute_descriptions().to_vec(),
            set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
            cull_mode: vk::CullModeFlags::BACK,
            blend_enable: false,
        })
    }

    /// Builder from SPIR-V files read through the file system
    pub fn from_files(fs: &dyn FileSystem, vertex_path: &Path, fragment_path: &Path) -> Result<Self> {
        let vertex_spv = fs.read_binary_file(vertex_path)?;
        let fragment_spv = fs.read_binary_file(fragment_path)?;
        Self::new(&vertex_spv, &fragment_spv)
    }

    pub fn vertex_layout(
        mut self,
        binding: vk::VertexInputBindingDescription,
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.vertex_binding = binding;
        self.vertex_attributes = attributes.to_vec();
        self
    }

    pub fn descriptor_set_layouts(mut self, layouts: &[vk::DescriptorSetLayout]) -> Self {
        self.set_layouts = layouts.to_vec();
        self
    }

    pub fn push_constant_ranges(mut self, ranges: &[vk::PushConstantRange]) -> Self {
        self.push_constant_ranges = ranges.to_vec();
        self
    }

    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = cull_mode_to_vk(mode);
        self
    }

    pub fn blend(mut self, enable: bool) -> Self {
        self.blend_enable = enable;
        self
    }

    /// Create the pipeline layout and graphics pipeline for a render pass
    ///
    /// Shader modules are destroyed before returning, on success or failure.
    pub fn build<D: DeviceApi>(
        &self,
        device: &D,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
    ) -> Result<PipelineState> {
        let vertex_module = device.create_shader_module(&self.vertex_code)?;
        let fragment_module = match device.create_shader_module(&self.fragment_code) {
            Ok(module) => module,
            Err(e) => {
                device.destroy_shader_module(vertex_module);
                return Err(e);
            }
        };

        let result = self.build_with_modules(device, vertex_module, fragment_module, render_pass, extent);

        device.destroy_shader_module(fragment_module);
        device.destroy_shader_module(vertex_module);

        if result.is_ok() {
            engine_debug!(
                "aga::vulkan::Pipeline",
                "Graphics pipeline created ({}x{}, cull {:?})",
                extent.width,
                extent.height,
                self.cull_mode
            );
        }
        result
    }

    fn build_with_modules<D: DeviceApi>(
        &self,
        device: &D,
        vertex_module: vk::ShaderModule,
        fragment_module: vk::ShaderModule,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
    ) -> Result<PipelineState> {
        let layout = device.create_pipeline_layout(&self.set_layouts, &self.push_constant_ranges)?;

        let desc = GraphicsPipelineDesc {
            vertex_module,
            fragment_module,
            vertex_binding: self.vertex_binding,
            vertex_attributes: self.vertex_attributes.clone(),
            layout,
            render_pass,
            extent,
            cull_mode: self.cull_mode,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_compare_op: vk::CompareOp::LESS,
            blend_enable: self.blend_enable,
        };

        match device.create_graphics_pipeline(&desc) {
            Ok(pipeline) => Ok(PipelineState { layout, pipeline }),
            Err(e) => {
                device.destroy_pipeline_layout(layout);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "vulkan_pipeline_tests.rs"]
mod tests;
