//! Error types for the AGA engine
//!
//! This module defines the error types used throughout the engine,
//! including device bring-up, swapchain management and resource allocation.

use std::fmt;

/// Result type for AGA engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// AGA engine errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Backend API call failed (Vulkan result code in the message)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (buffer, image, shader blob, etc.)
    InvalidResource(String),

    /// Initialization failed (instance, device, window, subsystems)
    InitializationFailed(String),

    /// No physical device satisfies the suitability predicate
    NoSuitableDevice,

    /// No memory type matches the requirement mask and property flags
    MemoryTypeNotFound {
        /// Memory type bits reported by the resource requirements
        type_bits: u32,
        /// Requested property flags (raw bits)
        properties: u32,
    },

    /// None of the candidate formats is supported by the device
    UnsupportedFormat(String),

    /// Image layout transition pair with no barrier mapping
    UnsupportedLayoutTransition {
        /// Old layout (debug name)
        from: String,
        /// New layout (debug name)
        to: String,
    },

    /// The window was closed while the renderer was waiting on it
    WindowClosed,

    /// File system error
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::NoSuitableDevice => write!(f, "No suitable GPU found"),
            Error::MemoryTypeNotFound { type_bits, properties } => write!(
                f,
                "No memory type found (type bits: {:#b}, properties: {:#x})",
                type_bits, properties
            ),
            Error::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            Error::UnsupportedLayoutTransition { from, to } => {
                write!(f, "Unsupported layout transition: {} -> {}", from, to)
            }
            Error::WindowClosed => write!(f, "Window closed"),
            Error::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
