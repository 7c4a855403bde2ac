//! Directory preparation phase
//!
//! Every destination's parent must exist before any write is issued. Parents
//! are collected once, deduplicated in first-seen order, and created on the
//! blocking pool.

use crate::error::{PipelineError, Result};
use crate::record::FileExpansionRecord;
use crate::storage::Storage;
use indexmap::IndexSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

/// Distinct parent directories of `records`, in registration order
pub fn parent_directories(records: &[FileExpansionRecord]) -> Vec<PathBuf> {
    records
        .iter()
        .filter_map(|record| record.parent_directory())
        .map(|parent| parent.to_path_buf())
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// Creates destination parent directories
#[derive(Debug, Clone)]
pub struct DirectoryPreparer {
    storage: Arc<dyn Storage>,
}

impl DirectoryPreparer {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Create every directory in `directories`, blocking the calling thread
    ///
    /// A directory that already exists is not an error.
    pub fn prepare(&self, directories: &[PathBuf], cancel: &CancellationToken) -> Result<()> {
        for directory in directories {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            match self.storage.create_dir_all(directory) {
                Ok(()) => trace!("created {}", directory.display()),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    trace!("{} already exists", directory.display())
                }
                Err(e) => return Err(PipelineError::directory_creation(directory, e)),
            }
        }
        Ok(())
    }

    /// Run [`DirectoryPreparer::prepare`] on the blocking pool
    #[instrument(skip_all, fields(directories = directories.len()))]
    pub async fn prepare_in_background(
        &self,
        directories: Vec<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let preparer = self.clone();
        tokio::task::spawn_blocking(move || preparer.prepare(&directories, &cancel)).await??;
        debug!("destination directories ready");
        Ok(())
    }
}
