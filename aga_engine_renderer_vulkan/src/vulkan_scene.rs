/// Scene data consumed by the renderer: vertex format, uniform block, mesh and texture

use aga_engine::glam::{Mat4, Vec2, Vec3};
use ash::vk;
use bytemuck::{Pod, Zeroable};

/// Interleaved vertex: position, color, texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    pub const fn new(position: [f32; 3], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position: Vec3::from_array(position),
            color: Vec3::from_array(color),
            tex_coord: Vec2::from_array(tex_coord),
        }
    }

    /// Single per-vertex binding at slot 0
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Locations 0, 1, 2: position, color, tex_coord
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, tex_coord) as u32,
            },
        ]
    }
}

/// Per-image uniform block (binding 0, vertex stage)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl UniformBufferObject {
    /// Degrees per second around +Z
    pub const ROTATION_SPEED: f32 = 30.0;

    /// Transforms for the spinning scene `seconds` after start
    pub fn at_time(seconds: f32, extent: vk::Extent2D) -> Self {
        let model = Mat4::from_rotation_z(seconds * Self::ROTATION_SPEED.to_radians());
        let view = Mat4::look_at_rh(Vec3::new(2.0, 2.0, 2.0), Vec3::ZERO, Vec3::Z);
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let mut projection = Mat4::perspective_rh(45.0_f32.to_radians(), aspect, 0.1, 10.0);
        // Vulkan clip space has Y pointing down
        projection.y_axis.y *= -1.0;
        Self { model, view, projection }
    }
}

/// RGBA8 texels, row-major, tightly packed
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Two-tone checkerboard with square cells of `cell` pixels
    pub fn checkerboard(size: u32, cell: u32, light: [u8; 4], dark: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
        for y in 0..size {
            for x in 0..size {
                let texel = if ((x / cell) + (y / cell)) % 2 == 0 { light } else { dark };
                pixels.extend_from_slice(&texel);
            }
        }
        Self { width: size, height: size, pixels }
    }
}

/// Mesh and texture drawn every frame
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDesc {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
    pub texture: TextureData,
}

impl Default for SceneDesc {
    /// Two stacked textured quads, half a unit apart
    fn default() -> Self {
        let vertices = vec![
            Vertex::new([-0.5, -0.5, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0]),
            Vertex::new([0.5, -0.5, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0]),
            Vertex::new([0.5, 0.5, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0]),
            Vertex::new([-0.5, 0.5, 0.0], [1.0, 1.0, 1.0], [0.0, 1.0]),
            Vertex::new([-0.5, -0.5, -0.5], [1.0, 0.0, 0.0], [0.0, 0.0]),
            Vertex::new([0.5, -0.5, -0.5], [0.0, 1.0, 0.0], [1.0, 0.0]),
            Vertex::new([0.5, 0.5, -0.5], [0.0, 0.0, 1.0], [1.0, 1.0]),
            Vertex::new([-0.5, 0.5, -0.5], [1.0, 1.0, 1.0], [0.0, 1.0]),
        ];
        let indices = vec![0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4];
        let texture = TextureData::checkerboard(256, 32, [230, 230, 230, 255], [40, 40, 40, 255]);
        Self { vertices, indices, texture }
    }
}

#[cfg(test)]
#[path = "vulkan_scene_tests.rs"]
mod tests;
