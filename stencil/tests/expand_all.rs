//! End-to-end expansion against the real filesystem

use include_dir::{include_dir, Dir};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stencil::{
    DirectoryLocator, EmbeddedResources, PipelineConfig, PipelineError, PipelineState,
    ResourceLocator, ResourceProvider, Scope, TemplateBase,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

static RESOURCES: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/tests/fixtures/resources");

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/templates")
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        tick_interval_ms: 1,
        tick_budget_ms: 1,
    }
}

#[test_log::test(tokio::test)]
async fn test_two_files_with_their_own_scopes() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out");

    let mut base = TemplateBase::new().with_config(fast_config());
    base.add_path(
        fixtures().join("a.tmpl"),
        out.join("a.txt"),
        Some(Scope::new().with("name", "X")),
        0,
    )
    .unwrap();
    base.add_path(
        fixtures().join("b.tmpl"),
        out.join("sub/b.txt"),
        Some(Scope::new().with("name", "Y")),
        0,
    )
    .unwrap();

    base.expand_all(&CancellationToken::new()).await.unwrap();

    assert!(out.is_dir());
    assert!(out.join("sub").is_dir());
    assert_eq!(fs::read_to_string(out.join("a.txt")).unwrap(), "Hello X");
    assert_eq!(fs::read_to_string(out.join("sub/b.txt")).unwrap(), "Bye Y");
    assert_eq!(base.state(), PipelineState::Done);
}

#[test_log::test(tokio::test)]
async fn test_includes_resolve_through_directory_locator() {
    let temp = TempDir::new().unwrap();
    let destination = temp.path().join("README.md");

    let mut base = TemplateBase::new().with_config(fast_config());
    base.set_locator(Arc::new(DirectoryLocator::new([fixtures()])))
        .unwrap();
    base.add_path(
        fixtures().join("with-include.tmpl"),
        &destination,
        Some(Scope::new().with("title", "Stencil").with("body", "text")),
        0,
    )
    .unwrap();

    base.expand_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        fs::read_to_string(&destination).unwrap(),
        "# Stencil\ntext\n"
    );
}

#[test_log::test(tokio::test)]
async fn test_embedded_resources_with_resource_locator() {
    let temp = TempDir::new().unwrap();
    let provider: Arc<dyn ResourceProvider> = Arc::new(EmbeddedResources::new(&RESOURCES));

    let mut base = TemplateBase::new()
        .with_config(fast_config())
        .with_resources(provider.clone());
    base.set_locator(Arc::new(ResourceLocator::new(provider, "shared")))
        .unwrap();
    base.add_resource(
        "/greeting.tmpl",
        temp.path().join("greeting.txt"),
        Some(Scope::new().with("name", "World")),
        0,
    )
    .unwrap();

    base.expand_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        fs::read_to_string(temp.path().join("greeting.txt")).unwrap(),
        "Hello World\n"
    );
}

#[test_log::test(tokio::test)]
async fn test_shared_and_existing_parents() {
    let temp = TempDir::new().unwrap();
    let shared = temp.path().join("shared");
    fs::create_dir_all(&shared).unwrap();

    let mut base = TemplateBase::new().with_config(fast_config());
    for name in ["one", "two", "three"] {
        base.add_path(
            fixtures().join("a.tmpl"),
            shared.join(format!("{name}.txt")),
            Some(Scope::new().with("name", name)),
            0,
        )
        .unwrap();
    }

    base.expand_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        fs::read_to_string(shared.join("two.txt")).unwrap(),
        "Hello two"
    );
}

#[test_log::test(tokio::test)]
async fn test_existing_file_is_replaced() {
    let temp = TempDir::new().unwrap();
    let destination = temp.path().join("a.txt");
    fs::write(&destination, "stale contents that are longer").unwrap();

    let mut base = TemplateBase::new().with_config(fast_config());
    base.add_path(
        fixtures().join("a.tmpl"),
        &destination,
        Some(Scope::new().with("name", "X")),
        0,
    )
    .unwrap();

    base.expand_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(fs::read_to_string(&destination).unwrap(), "Hello X");
}

#[cfg(unix)]
#[test_log::test(tokio::test)]
async fn test_mode_applied_on_disk() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let script = temp.path().join("bin/run");

    let mut base = TemplateBase::new().with_config(fast_config());
    base.add_path(
        fixtures().join("a.tmpl"),
        &script,
        Some(Scope::new().with("name", "X")),
        0o750,
    )
    .unwrap();

    base.expand_all(&CancellationToken::new()).await.unwrap();
    let mode = fs::metadata(&script).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o750);
}

#[test_log::test(tokio::test)]
async fn test_missing_source_file() {
    let temp = TempDir::new().unwrap();

    let mut base = TemplateBase::new().with_config(fast_config());
    base.add_path(
        temp.path().join("missing.tmpl"),
        temp.path().join("out.txt"),
        None,
        0,
    )
    .unwrap();

    let err = base.expand_all(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    assert!(!temp.path().join("out.txt").exists());
}

#[test_log::test(tokio::test)]
async fn test_undefined_variable_fails_expansion() {
    let temp = TempDir::new().unwrap();
    let destination = temp.path().join("a.txt");

    let mut base = TemplateBase::new().with_config(fast_config());
    base.add_path(fixtures().join("a.tmpl"), &destination, None, 0)
        .unwrap();

    let err = base.expand_all(&CancellationToken::new()).await.unwrap_err();
    match err {
        PipelineError::ExpansionFailed { destination: path, .. } => {
            assert_eq!(path, destination)
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!destination.exists());
}
