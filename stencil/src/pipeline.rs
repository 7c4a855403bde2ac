//! The expansion pipeline controller
//!
//! [`TemplateBase`] collects records, then runs them through four strictly
//! ordered phases exactly once:
//!
//! 1. create destination parent directories (blocking pool)
//! 2. read and parse template sources (blocking pool)
//! 3. expand templates in budgeted ticks (driving task)
//! 4. write every result concurrently
//!
//! The first failure from any phase is the terminal result.

use crate::clock::{Clock, MonotonicClock};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::mkdirs::{parent_directories, DirectoryPreparer};
use crate::parse::{ParseJob, TemplateParser};
use crate::record::{FileExpansionRecord, TemplateSource};
use crate::resources::{NoResources, ResourceProvider};
use crate::scheduler::{ExpansionScheduler, ExpansionStats};
use crate::storage::{LocalStorage, Storage};
use crate::writer::{WriteCoordinator, WriteJob};
use std::path::PathBuf;
use std::sync::Arc;
use stencil_templating::{LiquidEngine, Scope, SharedLocator, TemplateEngine};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Lifecycle of a [`TemplateBase`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing registered yet
    Created,
    /// At least one record or locator registered
    Registering,
    /// `expand_all` has been called and has not finished
    Running,
    /// `expand_all` reached a terminal result
    Done,
}

/// Single-shot template expansion pipeline
///
/// ```rust,ignore
/// use stencil::{Scope, TemplateBase};
/// use tokio_util::sync::CancellationToken;
///
/// let mut base = TemplateBase::new();
/// base.add_path("a.tmpl", "/out/a.txt", Some(Scope::new().with("name", "X")), 0)?;
/// base.add_path("run.tmpl", "/out/bin/run", None, 0o755)?;
/// base.expand_all(&CancellationToken::new()).await?;
/// ```
#[derive(Debug)]
pub struct TemplateBase {
    records: Vec<FileExpansionRecord>,
    locator: Option<SharedLocator>,
    state: PipelineState,
    engine: Option<Arc<dyn TemplateEngine>>,
    storage: Arc<dyn Storage>,
    resources: Arc<dyn ResourceProvider>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
    stats: Option<ExpansionStats>,
}

impl Default for TemplateBase {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateBase {
    /// Create a pipeline writing to the local filesystem
    ///
    /// Uses the Liquid engine, no embedded resources, the monotonic clock
    /// and default timing.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            locator: None,
            state: PipelineState::Created,
            engine: None,
            storage: Arc::new(LocalStorage::new()),
            resources: Arc::new(NoResources),
            clock: Arc::new(MonotonicClock::new()),
            config: PipelineConfig::default(),
            stats: None,
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn TemplateEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceProvider>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a template read from an embedded resource
    ///
    /// Fails without changing anything once `expand_all` has been called.
    pub fn add_resource(
        &mut self,
        resource_id: impl Into<String>,
        destination: impl Into<PathBuf>,
        scope: Option<Scope>,
        mode: u32,
    ) -> Result<()> {
        self.ensure_registering("add_resource")?;
        let record = FileExpansionRecord::new(
            TemplateSource::Resource(resource_id.into()),
            destination,
            scope,
            mode,
        )?;
        self.push(record);
        Ok(())
    }

    /// Register a template read from a filesystem path
    ///
    /// Fails without changing anything once `expand_all` has been called.
    pub fn add_path(
        &mut self,
        path: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        scope: Option<Scope>,
        mode: u32,
    ) -> Result<()> {
        self.ensure_registering("add_path")?;
        let record =
            FileExpansionRecord::new(TemplateSource::Path(path.into()), destination, scope, mode)?;
        self.push(record);
        Ok(())
    }

    /// Set the locator used to resolve includes while parsing
    pub fn set_locator(&mut self, locator: SharedLocator) -> Result<()> {
        self.ensure_registering("set_locator")?;
        self.locator = Some(locator);
        self.state = PipelineState::Registering;
        Ok(())
    }

    pub fn locator(&self) -> Option<&SharedLocator> {
        self.locator.as_ref()
    }

    pub fn records(&self) -> &[FileExpansionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Whether `expand_all` has been called
    pub fn has_started(&self) -> bool {
        matches!(self.state, PipelineState::Running | PipelineState::Done)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Expansion counters, once the expansion phase has finished
    pub fn stats(&self) -> Option<ExpansionStats> {
        self.stats
    }

    /// Run every phase and write the results
    ///
    /// May be called once. Later calls fail with
    /// [`PipelineError::AlreadyStarted`], including after a call whose
    /// future was dropped before finishing.
    #[instrument(skip_all, fields(records = self.records.len()))]
    pub async fn expand_all(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.has_started() {
            warn!("expand_all() called more than once");
            return Err(PipelineError::AlreadyStarted);
        }
        self.state = PipelineState::Running;

        let result = self.run(cancel).await;
        self.state = PipelineState::Done;

        match &result {
            Ok(()) => info!("expanded {} templates", self.records.len()),
            Err(e) => debug!("expansion failed: {}", e),
        }
        result
    }

    async fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.records.is_empty() {
            debug!("no records registered, nothing to expand");
            return Ok(());
        }

        self.config.validate().map_err(PipelineError::InvalidConfig)?;
        ensure_not_cancelled(cancel)?;
        DirectoryPreparer::new(self.storage.clone())
            .prepare_in_background(parent_directories(&self.records), cancel.clone())
            .await?;

        ensure_not_cancelled(cancel)?;
        let parser = TemplateParser::new(
            self.engine()?,
            self.resources.clone(),
            self.locator.clone(),
        );
        let jobs = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| !record.is_parsed())
            .map(|(index, record)| ParseJob::new(index, record.source().clone()))
            .collect();
        for (index, template) in parser.parse_in_background(jobs, cancel.clone()).await? {
            if self.records[index].set_parsed(template).is_err() {
                debug!(index, "record already parsed, keeping existing template");
            }
        }

        ensure_not_cancelled(cancel)?;
        let scheduler = ExpansionScheduler::new(
            self.config.tick_interval(),
            self.config.tick_budget(),
            self.clock.clone(),
        );
        let stats = scheduler.run(&mut self.records, cancel).await?;
        debug!(ticks = stats.ticks, "expanded {}", stats);
        self.stats = Some(stats);

        ensure_not_cancelled(cancel)?;
        let jobs = self
            .records
            .iter()
            .enumerate()
            .map(|(index, record)| WriteJob::from_record(index, record))
            .collect::<Result<Vec<_>>>()?;
        WriteCoordinator::new(self.storage.clone())
            .write_all(jobs, cancel)
            .await
    }

    fn engine(&mut self) -> Result<Arc<dyn TemplateEngine>> {
        if let Some(engine) = &self.engine {
            return Ok(engine.clone());
        }
        let engine: Arc<dyn TemplateEngine> =
            Arc::new(LiquidEngine::new().map_err(PipelineError::Engine)?);
        self.engine = Some(engine.clone());
        Ok(engine)
    }

    fn ensure_registering(&self, operation: &'static str) -> Result<()> {
        if self.has_started() {
            let err = PipelineError::RegistrationClosed { operation };
            warn!("{}", err);
            return Err(err);
        }
        Ok(())
    }

    fn push(&mut self, record: FileExpansionRecord) {
        debug!(
            "registered {} -> {}",
            record.source(),
            record.destination().display()
        );
        self.records.push(record);
        self.state = PipelineState::Registering;
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::MapResources;
    use crate::storage::MemoryStorage;
    use std::time::Duration;
    use stencil_templating::MapLocator;

    fn pipeline(storage: &Arc<MemoryStorage>) -> TemplateBase {
        let resources = MapResources::new()
            .with("/templates/a.tmpl", "Hello {{name}}")
            .with("/templates/b.tmpl", "Bye {{name}}");
        TemplateBase::new()
            .with_storage(storage.clone())
            .with_resources(Arc::new(resources))
    }

    #[test]
    fn test_state_transitions_on_registration() {
        let storage = Arc::new(MemoryStorage::new());
        let mut base = pipeline(&storage);
        assert_eq!(base.state(), PipelineState::Created);
        assert!(base.is_empty());

        base.set_locator(Arc::new(MapLocator::empty())).unwrap();
        assert_eq!(base.state(), PipelineState::Registering);

        base.add_resource("/templates/a.tmpl", "/out/a.txt", None, 0)
            .unwrap();
        assert_eq!(base.len(), 1);
        assert!(base.locator().is_some());
        assert!(!base.has_started());
    }

    #[test]
    fn test_invalid_record_leaves_records_untouched() {
        let storage = Arc::new(MemoryStorage::new());
        let mut base = pipeline(&storage);

        let err = base.add_resource("/templates/a.tmpl", "", None, 0).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRecord { .. }));
        assert!(base.is_empty());
        assert_eq!(base.state(), PipelineState::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expand_all_runs_every_phase() {
        let storage = Arc::new(MemoryStorage::new());
        let mut base = pipeline(&storage);
        base.add_resource(
            "/templates/a.tmpl",
            "/out/a.txt",
            Some(Scope::new().with("name", "X")),
            0,
        )
        .unwrap();
        base.add_resource(
            "/templates/b.tmpl",
            "/out/sub/b.txt",
            Some(Scope::new().with("name", "Y")),
            0o644,
        )
        .unwrap();

        base.expand_all(&CancellationToken::new()).await.unwrap();

        assert_eq!(base.state(), PipelineState::Done);
        assert_eq!(storage.read_to_string("/out/a.txt").unwrap(), "Hello X");
        assert_eq!(storage.read_to_string("/out/sub/b.txt").unwrap(), "Bye Y");
        assert_eq!(storage.mode("/out/sub/b.txt"), Some(0o644));
        assert_eq!(base.records()[0].result(), Some("Hello X"));
        assert_eq!(base.stats().unwrap().expanded, 2);
    }

    #[tokio::test]
    async fn test_second_call_is_rejected() {
        let storage = Arc::new(MemoryStorage::new());
        let mut base = pipeline(&storage);

        base.expand_all(&CancellationToken::new()).await.unwrap();
        let err = base.expand_all(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyStarted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_run_still_counts_as_started() {
        let storage = Arc::new(MemoryStorage::new());
        let mut base = pipeline(&storage);
        base.add_resource("/templates/a.tmpl", "/out/a.txt", None, 0)
            .unwrap();

        {
            let cancel = CancellationToken::new();
            let run = base.expand_all(&cancel);
            let _ = tokio::time::timeout(Duration::from_millis(1), run).await;
        }

        assert_eq!(base.state(), PipelineState::Running);
        let err = base.expand_all(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyStarted));
    }

    #[tokio::test]
    async fn test_registration_after_start_is_rejected() {
        let storage = Arc::new(MemoryStorage::new());
        let mut base = pipeline(&storage);
        base.expand_all(&CancellationToken::new()).await.unwrap();

        let err = base
            .add_resource("/templates/a.tmpl", "/out/a.txt", None, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RegistrationClosed {
                operation: "add_resource"
            }
        ));
        assert!(base
            .add_path("a.tmpl", "/out/a.txt", None, 0)
            .is_err());
        assert!(base.set_locator(Arc::new(MapLocator::empty())).is_err());
        assert!(base.is_empty());
        assert!(base.locator().is_none());
    }

    #[tokio::test]
    async fn test_zero_interval_config_is_an_error() {
        let storage = Arc::new(MemoryStorage::new());
        let mut base = pipeline(&storage).with_config(PipelineConfig {
            tick_interval_ms: 0,
            tick_budget_ms: 0,
        });
        base.add_resource("/templates/a.tmpl", "/out/a.txt", None, 0)
            .unwrap();

        let err = base.expand_all(&CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, PipelineError::InvalidConfig(_)));
        assert_eq!(base.state(), PipelineState::Done);
        assert_eq!(storage.operation_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let storage = Arc::new(MemoryStorage::new());
        let mut base = pipeline(&storage);
        base.add_resource("/templates/a.tmpl", "/out/a.txt", None, 0)
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = base.expand_all(&cancel).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(base.state(), PipelineState::Done);
        assert_eq!(storage.operation_count(), 0);
    }
}
