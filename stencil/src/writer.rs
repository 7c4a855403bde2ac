//! Parallel write phase
//!
//! One replace-write is spawned per record. Completions are drained on the
//! driving task into a [`CompletionBarrier`], which decides the phase outcome
//! exactly once: the first failure, or success when every write has landed.

use crate::error::{PipelineError, Result};
use crate::record::FileExpansionRecord;
use crate::storage::Storage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

/// Everything one write task needs, detached from the record
#[derive(Debug, Clone)]
pub struct WriteJob {
    pub index: usize,
    pub destination: PathBuf,
    pub contents: Arc<str>,
    pub mode: u32,
}

impl WriteJob {
    /// Build a job from an expanded record
    pub fn from_record(index: usize, record: &FileExpansionRecord) -> Result<Self> {
        let contents = record.shared_result().ok_or_else(|| {
            PipelineError::expansion_failed(
                record.destination(),
                stencil_templating::TemplatingError::render("record was never expanded"),
            )
        })?;
        Ok(Self {
            index,
            destination: record.destination().to_path_buf(),
            contents,
            mode: record.mode(),
        })
    }
}

/// Fan-in barrier that yields exactly one outcome
#[derive(Debug)]
pub struct CompletionBarrier {
    total: usize,
    completed: usize,
    finished: bool,
}

impl CompletionBarrier {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            finished: false,
        }
    }

    /// Record one completion
    ///
    /// Returns the phase outcome the first time it is decided and `None`
    /// otherwise. Failures arriving after the outcome are dropped.
    pub fn record(&mut self, outcome: Result<()>) -> Option<Result<()>> {
        self.completed += 1;

        if self.finished {
            if let Err(e) = outcome {
                trace!("discarding write failure after completion: {}", e);
            }
            return None;
        }

        match outcome {
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
            Ok(()) if self.completed >= self.total => {
                self.finished = true;
                Some(Ok(()))
            }
            Ok(()) => None,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Spawns and collects the replace-writes
#[derive(Debug, Clone)]
pub struct WriteCoordinator {
    storage: Arc<dyn Storage>,
}

impl WriteCoordinator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Write every job concurrently and return the barrier's outcome
    ///
    /// Writes still in flight when a failure decides the outcome are left to
    /// finish on their own.
    #[instrument(skip_all, fields(jobs = jobs.len()))]
    pub async fn write_all(&self, jobs: Vec<WriteJob>, cancel: &CancellationToken) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let mut barrier = CompletionBarrier::new(jobs.len());
        let mut tasks = JoinSet::new();
        for job in jobs {
            tasks.spawn(write_one(self.storage.clone(), job, cancel.clone()));
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(PipelineError::from).and_then(|result| result);
            if let Some(result) = barrier.record(outcome) {
                if !tasks.is_empty() {
                    debug!("{} writes still in flight after outcome", tasks.len());
                }
                tasks.detach_all();
                return result;
            }
        }

        Ok(())
    }
}

async fn write_one(
    storage: Arc<dyn Storage>,
    job: WriteJob,
    cancel: CancellationToken,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    storage
        .replace_contents(&job.destination, job.contents.as_bytes())
        .await
        .map_err(|e| PipelineError::write_failed(&job.destination, e))?;
    trace!(index = job.index, "wrote {}", job.destination.display());

    if job.mode != 0 && !cancel.is_cancelled() && storage.is_local(&job.destination) {
        if let Err(e) = storage.set_permissions(&job.destination, job.mode) {
            warn!(
                "failed to set mode {:o} on '{}': {}",
                job.mode,
                job.destination.display(),
                e
            );
        }
    }

    Ok(())
}
