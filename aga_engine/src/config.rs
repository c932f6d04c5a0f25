//! Renderer configuration
//!
//! Plain data handed to the renderer at construction. Every field has a
//! usable default, so applications usually override only what they need.

use std::path::PathBuf;

/// Which validation messages reach the logger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    /// Errors only
    ErrorsOnly,
    /// Errors and warnings
    ErrorsAndWarnings,
    /// Everything, including info and verbose
    All,
}

/// Face culling applied by the graphics pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    /// Both faces rasterized
    None,
    /// Back faces discarded
    Back,
}

/// Validation message counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    /// Total number of messages received
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Renderer configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Application name reported to the driver
    pub app_name: String,

    /// Request the Khronos validation layer and install a debug messenger
    pub enable_validation: bool,

    /// Validation message filter
    pub debug_severity: DebugSeverity,

    /// Number of frames the CPU may record ahead of the GPU (F)
    pub frames_in_flight: usize,

    /// Compiled SPIR-V vertex shader, resolved by the file system
    pub vertex_shader_path: PathBuf,

    /// Compiled SPIR-V fragment shader, resolved by the file system
    pub fragment_shader_path: PathBuf,

    /// Color attachment clear value (RGBA)
    pub clear_color: [f32; 4],

    /// Depth attachment clear value
    pub clear_depth: f32,

    pub cull_mode: CullMode,

    /// Requested sampler anisotropy, clamped to the device limit
    pub max_anisotropy: f32,

    /// Pick a discrete GPU when one is suitable
    pub prefer_discrete_gpu: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "AGA Application".to_string(),
            enable_validation: cfg!(debug_assertions),
            debug_severity: DebugSeverity::ErrorsAndWarnings,
            frames_in_flight: 2,
            vertex_shader_path: PathBuf::from("data/shaders/shader_base.vert.spv"),
            fragment_shader_path: PathBuf::from("data/shaders/shader_base.frag.spv"),
            clear_color: [0.01, 0.01, 0.01, 1.0],
            clear_depth: 1.0,
            cull_mode: CullMode::Back,
            max_anisotropy: 16.0,
            prefer_discrete_gpu: true,
        }
    }
}
