//! Storage backends for expanded files
//!
//! The pipeline only needs four things from storage: recursive directory
//! creation, whole-file atomic replacement, best-effort permission bits, and
//! knowing whether a path lives on a local filesystem.
//!
//! - [`LocalStorage`] - the native filesystem
//! - [`MemoryStorage`] - an in-memory tree with fault injection, used for
//!   dry runs and tests

mod local;
mod memory;

pub use local::LocalStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use std::io;
use std::path::Path;

/// Storage abstraction consumed by the expansion pipeline
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Create `path` and any missing parents
    ///
    /// Called from a blocking worker. Implementations may report an
    /// existing directory as `ErrorKind::AlreadyExists`; callers treat that
    /// as success.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Replace the contents of `path` with `contents`
    ///
    /// Readers must observe either the old or the new contents, never a
    /// partial write.
    async fn replace_contents(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Set POSIX permission bits on `path`
    fn set_permissions(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Whether `path` is on a local filesystem that honours permission bits
    fn is_local(&self, path: &Path) -> bool;
}
