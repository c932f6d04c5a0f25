//! File-system capability
//!
//! Used to load pre-compiled shader byte code. Injected into the renderer so
//! tests and embedded builds can serve blobs from memory.

use std::path::{Path, PathBuf};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

/// Read-only access to binary files
pub trait FileSystem {
    /// Read a whole file as raw bytes
    fn read_binary_file(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Files on disk, resolved relative to a root directory
#[derive(Debug, Clone)]
pub struct NativeFileSystem {
    root: PathBuf,
}

impl NativeFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Rooted at the process working directory
    pub fn current_dir() -> Self {
        Self::new(".")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileSystem for NativeFileSystem {
    fn read_binary_file(&self, path: &Path) -> Result<Vec<u8>> {
        let full_path = if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) };
        std::fs::read(&full_path).map_err(|e| {
            crate::engine_error!("aga::fs", "Failed to read '{}': {}", full_path.display(), e);
            Error::Io(format!("{}: {}", full_path.display(), e))
        })
    }
}

/// Blobs held in memory, keyed by path
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: FxHashMap<PathBuf, Vec<u8>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn insert(&mut self, path: impl Into<PathBuf>, bytes: Vec<u8>) {
        self.files.insert(path.into(), bytes);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_binary_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Io(format!("{}: not found", path.display())))
    }
}

#[cfg(test)]
#[path = "filesystem_tests.rs"]
mod tests;
