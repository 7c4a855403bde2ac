//! Pipeline behaviour against injected storage faults and slow templates

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stencil::{
    Clock, ManualClock, MapResources, MemoryStorage, ParsedTemplate, PipelineConfig,
    PipelineError, PipelineState, Scope, SharedLocator, TemplateBase, TemplateEngine,
};
use tokio_util::sync::CancellationToken;

/// Engine whose templates echo their source text and cost manual-clock time
#[derive(Debug)]
struct CostlyEngine {
    clock: Arc<ManualClock>,
    cost: Duration,
}

#[derive(Debug)]
struct CostlyTemplate {
    clock: Arc<ManualClock>,
    cost: Duration,
    text: String,
}

impl TemplateEngine for CostlyEngine {
    fn parse(
        &self,
        _name: &str,
        text: &str,
        _locator: Option<&SharedLocator>,
    ) -> stencil_templating::Result<Box<dyn ParsedTemplate>> {
        Ok(Box::new(CostlyTemplate {
            clock: self.clock.clone(),
            cost: self.cost,
            text: text.to_string(),
        }))
    }
}

impl ParsedTemplate for CostlyTemplate {
    fn expand(&self, _scope: &Scope) -> stencil_templating::Result<String> {
        self.clock.advance(self.cost);
        Ok(self.text.clone())
    }
}

fn resources(count: usize) -> Arc<MapResources> {
    let mut resources = MapResources::new();
    for i in 1..=count {
        resources.insert(format!("/templates/{i}.tmpl"), format!("file {{{{ n }}}} of {i}"));
    }
    Arc::new(resources)
}

fn pipeline(storage: &Arc<MemoryStorage>, count: usize) -> TemplateBase {
    let mut base = TemplateBase::new()
        .with_storage(storage.clone())
        .with_resources(resources(count));
    for i in 1..=count {
        base.add_resource(
            format!("/templates/{i}.tmpl"),
            format!("/out/{i}.txt"),
            Some(Scope::new().with("n", i as u64)),
            0,
        )
        .unwrap();
    }
    base
}

#[tokio::test(start_paused = true)]
async fn test_one_failed_write_among_five() {
    let storage = Arc::new(MemoryStorage::new());
    storage.fail_write("/out/3.txt", io::ErrorKind::PermissionDenied);
    let mut base = pipeline(&storage, 5);

    let err = base.expand_all(&CancellationToken::new()).await.unwrap_err();

    match err {
        PipelineError::WriteFailed { path, source } => {
            assert_eq!(path, Path::new("/out/3.txt"));
            assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(base.state(), PipelineState::Done);
}

#[tokio::test(start_paused = true)]
async fn test_two_failed_writes_report_one_error() {
    let storage = Arc::new(MemoryStorage::new());
    storage.fail_write("/out/2.txt", io::ErrorKind::Other);
    storage.fail_write("/out/4.txt", io::ErrorKind::Other);
    let mut base = pipeline(&storage, 5);

    let err = base.expand_all(&CancellationToken::new()).await.unwrap_err();
    match err {
        PipelineError::WriteFailed { path, .. } => {
            assert!(path == Path::new("/out/2.txt") || path == Path::new("/out/4.txt"))
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_permission_failure_keeps_success() {
    let storage = Arc::new(MemoryStorage::new());
    storage.fail_permissions(true);

    let mut base = TemplateBase::new()
        .with_storage(storage.clone())
        .with_resources(resources(1));
    base.add_resource(
        "/templates/1.tmpl",
        "/out/bin/run",
        Some(Scope::new().with("n", 1)),
        0o755,
    )
    .unwrap();

    base.expand_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        storage.read_to_string("/out/bin/run").unwrap(),
        "file 1 of 1"
    );
    assert_eq!(storage.mode("/out/bin/run"), None);
}

#[tokio::test(start_paused = true)]
async fn test_mode_skipped_for_non_local_storage() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set_local(false);

    let mut base = TemplateBase::new()
        .with_storage(storage.clone())
        .with_resources(resources(1));
    base.add_resource(
        "/templates/1.tmpl",
        "/out/run",
        Some(Scope::new().with("n", 1)),
        0o755,
    )
    .unwrap();

    base.expand_all(&CancellationToken::new()).await.unwrap();
    assert!(storage.contents("/out/run").is_some());
    assert_eq!(storage.mode("/out/run"), None);
}

#[tokio::test]
async fn test_zero_records_never_touch_storage() {
    let storage = Arc::new(MemoryStorage::new());
    let mut base = TemplateBase::new().with_storage(storage.clone());

    base.expand_all(&CancellationToken::new()).await.unwrap();

    assert_eq!(storage.operation_count(), 0);
    assert_eq!(base.state(), PipelineState::Done);
    assert!(matches!(
        base.expand_all(&CancellationToken::new()).await,
        Err(PipelineError::AlreadyStarted)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_second_call_rejected_after_failure() {
    let storage = Arc::new(MemoryStorage::new());
    storage.fail_write("/out/1.txt", io::ErrorKind::Other);
    let mut base = pipeline(&storage, 1);

    assert!(base.expand_all(&CancellationToken::new()).await.is_err());
    assert!(matches!(
        base.expand_all(&CancellationToken::new()).await,
        Err(PipelineError::AlreadyStarted)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_add_after_start_leaves_records_alone() {
    let storage = Arc::new(MemoryStorage::new());
    let mut base = pipeline(&storage, 2);
    base.expand_all(&CancellationToken::new()).await.unwrap();

    let result = base.add_resource("/templates/1.tmpl", "/out/late.txt", None, 0);

    assert!(matches!(
        result,
        Err(PipelineError::RegistrationClosed { .. })
    ));
    assert_eq!(base.len(), 2);
    assert!(storage.contents("/out/late.txt").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_directory_failure_stops_before_parsing() {
    let storage = Arc::new(MemoryStorage::new());
    storage.fail_directory("/out", io::ErrorKind::PermissionDenied);
    let mut base = pipeline(&storage, 3);

    let err = base.expand_all(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, PipelineError::DirectoryCreationFailed { .. }));
    assert!(base.records().iter().all(|r| !r.is_parsed()));
    assert!(storage.file_paths().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_costly_expansion_spreads_over_ticks() {
    let storage = Arc::new(MemoryStorage::new());
    let clock = Arc::new(ManualClock::new());
    let engine = Arc::new(CostlyEngine {
        clock: clock.clone(),
        cost: Duration::from_millis(3),
    });

    let mut base = pipeline(&storage, 4)
        .with_engine(engine)
        .with_clock(clock.clone());
    base.expand_all(&CancellationToken::new()).await.unwrap();

    let stats = base.stats().unwrap();
    assert!(stats.ticks > 1, "expected several ticks, got {stats:?}");
    assert_eq!(stats.ticks, 4);
    assert_eq!(stats.expanded, 4);
    assert_eq!(clock.now(), Duration::from_millis(12));
    assert_eq!(storage.file_paths().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_cheap_expansion_fits_one_tick() {
    let storage = Arc::new(MemoryStorage::new());
    let clock = Arc::new(ManualClock::new());
    let engine = Arc::new(CostlyEngine {
        clock: clock.clone(),
        cost: Duration::ZERO,
    });

    let mut base = pipeline(&storage, 10)
        .with_engine(engine)
        .with_clock(clock)
        .with_config(PipelineConfig {
            tick_interval_ms: 17,
            tick_budget_ms: 2,
        });
    base.expand_all(&CancellationToken::new()).await.unwrap();

    assert_eq!(base.stats().unwrap().ticks, 1);
}

/// Template that cancels the run once a number of expansions have happened
#[derive(Debug)]
struct CancellingEngine {
    cancel: CancellationToken,
    after: usize,
    expanded: Arc<AtomicUsize>,
}

#[derive(Debug)]
struct CancellingTemplate {
    cancel: CancellationToken,
    after: usize,
    expanded: Arc<AtomicUsize>,
}

impl TemplateEngine for CancellingEngine {
    fn parse(
        &self,
        _name: &str,
        _text: &str,
        _locator: Option<&SharedLocator>,
    ) -> stencil_templating::Result<Box<dyn ParsedTemplate>> {
        Ok(Box::new(CancellingTemplate {
            cancel: self.cancel.clone(),
            after: self.after,
            expanded: self.expanded.clone(),
        }))
    }
}

impl ParsedTemplate for CancellingTemplate {
    fn expand(&self, _scope: &Scope) -> stencil_templating::Result<String> {
        if self.expanded.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
            self.cancel.cancel();
        }
        Ok(String::from("expanded"))
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_expansion() {
    let storage = Arc::new(MemoryStorage::new());
    let cancel = CancellationToken::new();
    let engine = Arc::new(CancellingEngine {
        cancel: cancel.clone(),
        after: 3,
        expanded: Arc::new(AtomicUsize::new(0)),
    });
    let mut base = pipeline(&storage, 10).with_engine(engine);

    let err = base.expand_all(&cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(storage.file_paths().is_empty());
    let expanded = base.records().iter().filter(|r| r.result().is_some()).count();
    assert_eq!(expanded, 3);
}
