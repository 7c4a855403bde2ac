//! In-memory storage with fault injection

use super::Storage;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Storage kept entirely in memory
///
/// Useful for previewing an expansion without touching disk, and for
/// exercising failure paths: writes, directory creation and permission
/// changes can each be made to fail, and writes can be delayed per path to
/// control completion order.
#[derive(Debug)]
pub struct MemoryStorage {
    directories: DashSet<PathBuf>,
    files: DashMap<PathBuf, Vec<u8>>,
    modes: DashMap<PathBuf, u32>,
    write_failures: DashMap<PathBuf, io::ErrorKind>,
    directory_failures: DashMap<PathBuf, io::ErrorKind>,
    write_delays: DashMap<PathBuf, Duration>,
    fail_permissions: AtomicBool,
    local: AtomicBool,
    operations: AtomicUsize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create an empty storage that reports itself as local
    pub fn new() -> Self {
        Self {
            directories: DashSet::new(),
            files: DashMap::new(),
            modes: DashMap::new(),
            write_failures: DashMap::new(),
            directory_failures: DashMap::new(),
            write_delays: DashMap::new(),
            fail_permissions: AtomicBool::new(false),
            local: AtomicBool::new(true),
            operations: AtomicUsize::new(0),
        }
    }

    /// Make writes to `path` fail with `kind`
    pub fn fail_write(&self, path: impl Into<PathBuf>, kind: io::ErrorKind) {
        self.write_failures.insert(path.into(), kind);
    }

    /// Make creating `path` (or anything beneath it) fail with `kind`
    pub fn fail_directory(&self, path: impl Into<PathBuf>, kind: io::ErrorKind) {
        self.directory_failures.insert(path.into(), kind);
    }

    /// Delay writes to `path` by `delay`
    pub fn delay_write(&self, path: impl Into<PathBuf>, delay: Duration) {
        self.write_delays.insert(path.into(), delay);
    }

    /// Make every permission change fail
    pub fn fail_permissions(&self, fail: bool) {
        self.fail_permissions.store(fail, Ordering::SeqCst);
    }

    /// Choose whether paths report as local
    pub fn set_local(&self, local: bool) {
        self.local.store(local, Ordering::SeqCst);
    }

    /// Pre-create a directory and its parents
    pub fn add_directory(&self, path: impl AsRef<Path>) {
        for ancestor in path.as_ref().ancestors() {
            if !ancestor.as_os_str().is_empty() {
                self.directories.insert(ancestor.to_path_buf());
            }
        }
    }

    /// Contents of a file
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files.get(path.as_ref()).map(|entry| entry.value().clone())
    }

    /// Contents of a file as UTF-8
    pub fn read_to_string(&self, path: impl AsRef<Path>) -> Option<String> {
        self.contents(path)
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }

    /// Whether a directory exists
    pub fn has_directory(&self, path: impl AsRef<Path>) -> bool {
        self.directories.contains(path.as_ref())
    }

    /// Permission bits last applied to a file
    pub fn mode(&self, path: impl AsRef<Path>) -> Option<u32> {
        self.modes.get(path.as_ref()).map(|entry| *entry.value())
    }

    /// Every file path, sorted
    pub fn file_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.files.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Number of storage calls made so far
    pub fn operation_count(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }

    fn parent_exists(&self, path: &Path) -> bool {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.directories.contains(parent),
            _ => true,
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.touch();

        for ancestor in path.ancestors() {
            if let Some(kind) = self.directory_failures.get(ancestor) {
                return Err(io::Error::new(
                    *kind.value(),
                    format!("injected failure creating '{}'", path.display()),
                ));
            }
        }

        if self.files.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("'{}' exists and is not a directory", path.display()),
            ));
        }

        self.add_directory(path);
        Ok(())
    }

    async fn replace_contents(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.touch();

        let delay = self.write_delays.get(path).map(|entry| *entry.value());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(kind) = self.write_failures.get(path) {
            return Err(io::Error::new(
                *kind.value(),
                format!("injected failure writing '{}'", path.display()),
            ));
        }

        if !self.parent_exists(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("parent of '{}' does not exist", path.display()),
            ));
        }

        if self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' is a directory", path.display()),
            ));
        }

        self.files.insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.touch();

        if self.fail_permissions.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected failure setting mode on '{}'", path.display()),
            ));
        }
        if !self.files.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("'{}' does not exist", path.display()),
            ));
        }

        self.modes.insert(path.to_path_buf(), mode);
        Ok(())
    }

    fn is_local(&self, _path: &Path) -> bool {
        self.local.load(Ordering::SeqCst)
    }
}
