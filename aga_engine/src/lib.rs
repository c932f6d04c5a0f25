/*!
# AGA Engine

Core types shared by the AGA rendering backends.

This crate holds everything the renderer consumes but does not own:

- **Error**: the engine-wide error enum and `Result` alias
- **Logging**: replaceable `Logger` sink, `engine_*!` macros
- **Config**: renderer configuration
- **Platform**: `WindowSystem` capability and the winit window
- **File system**: `FileSystem` capability for shader blobs

The Vulkan rendering core lives in `aga_engine_renderer_vulkan`.
*/

// Internal modules
mod error;
mod engine;
mod config;
pub mod log;
pub mod platform;
pub mod filesystem;

// Main aga namespace module
pub mod aga {
    // Error types
    pub use crate::error::{Error, Result};

    // Process-wide logging sink
    pub use crate::engine::Engine;

    // Logging sub-module (types only; engine_* macros live at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Render configuration
    pub mod render {
        pub use crate::config::{Config, CullMode, DebugSeverity, ValidationStats};
    }

    // Collaborator capabilities
    pub mod platform {
        pub use crate::platform::{WindowSystem, WinitWindow};
        pub use crate::filesystem::{FileSystem, NativeFileSystem, MemoryFileSystem};
    }
}

// Re-export math library at crate root
pub use glam;
