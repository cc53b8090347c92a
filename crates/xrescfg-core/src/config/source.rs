//! Where table and descriptor bytes come from.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Reads a named file's bytes
pub trait DataSource: Send + Sync {
    /// Returns the full contents of `name`
    fn read(&self, name: &str) -> Result<Vec<u8>>;
}

impl<F> DataSource for F
where
    F: Fn(&str) -> Result<Vec<u8>> + Send + Sync,
{
    fn read(&self, name: &str) -> Result<Vec<u8>> {
        self(name)
    }
}

/// Reads from disk, optionally below a root directory
#[derive(Debug, Clone, Default)]
pub struct FsSource {
    root: Option<PathBuf>,
}

impl FsSource {
    /// Resolves names against the working directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves names against `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Full path of a logical file name
    pub fn resolve(&self, name: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(name),
            None => Path::new(name).to_path_buf(),
        }
    }
}

impl DataSource for FsSource {
    fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name);
        std::fs::read(&path).map_err(|e| Error::file_read(path, e))
    }
}

/// In-memory files, keyed by name
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    /// Creates an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file
    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        self.files.insert(name.into(), data.into());
        self
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(name, data);
        self
    }
}

impl DataSource for MemorySource {
    fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.files.get(name).cloned().ok_or_else(|| {
            Error::file_read(
                name,
                io::Error::new(io::ErrorKind::NotFound, "no such in-memory file"),
            )
        })
    }
}
