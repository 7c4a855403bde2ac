//! # Stencil
//!
//! Incremental, non-blocking template expansion. A [`TemplateBase`] takes a
//! set of template sources and destinations, then in a single `expand_all`
//! call:
//!
//! 1. creates every destination's parent directory on the blocking pool
//! 2. reads and parses every source on the blocking pool
//! 3. expands templates on the calling task in short budgeted ticks, so the
//!    task's event loop is never held for long
//! 4. writes every result concurrently and reports the first failure
//!
//! ## Modules
//!
//! - [`pipeline`] - the controller and its lifecycle
//! - [`record`] - per-file units of work
//! - [`mkdirs`], [`parse`], [`scheduler`], [`writer`] - the four phases
//! - [`storage`] - where files land
//! - [`resources`] - embedded template sources
//! - [`project`] - manifest-driven project scaffolds
//! - [`config`] - tick timing
//!
//! ## Example
//!
//! ```rust,no_run
//! use stencil::{Scope, TemplateBase};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> stencil::Result<()> {
//! let mut base = TemplateBase::new();
//! base.add_path(
//!     "templates/a.tmpl",
//!     "/out/a.txt",
//!     Some(Scope::new().with("name", "X")),
//!     0,
//! )?;
//! base.expand_all(&CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod mkdirs;
pub mod parse;
pub mod pipeline;
pub mod project;
pub mod record;
pub mod resources;
pub mod scheduler;
pub mod storage;
pub mod writer;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ConfigError, PipelineConfig};
pub use error::{PipelineError, Result};
pub use pipeline::{PipelineState, TemplateBase};
pub use project::{
    Manifest, ManifestFile, ManifestTemplate, ProjectError, ProjectParams, ProjectTemplate,
    ProjectTemplateRegistry,
};
pub use record::{FileExpansionRecord, TemplateSource};
pub use resources::{
    EmbeddedResources, MapResources, NoResources, ResourceLocator, ResourceProvider,
};
pub use scheduler::{ExpansionScheduler, ExpansionStats};
pub use storage::{LocalStorage, MemoryStorage, Storage};
pub use writer::{CompletionBarrier, WriteCoordinator};

pub use stencil_templating::{
    DirectoryLocator, LiquidEngine, MapLocator, ParsedTemplate, Scope, SharedLocator,
    TemplateEngine, TemplateLocator, TemplatingError,
};
