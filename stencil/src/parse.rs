//! Template parsing phase
//!
//! Sources are read and parsed on the blocking pool. Parsed templates are
//! handed back by record index so the controller stores them on its own task.

use crate::error::{PipelineError, Result};
use crate::record::TemplateSource;
use crate::resources::ResourceProvider;
use std::sync::Arc;
use stencil_templating::{ParsedTemplate, SharedLocator, TemplateEngine};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

/// One source to parse, tagged with the index of its record
#[derive(Debug, Clone)]
pub struct ParseJob {
    pub index: usize,
    pub source: TemplateSource,
}

impl ParseJob {
    pub fn new(index: usize, source: TemplateSource) -> Self {
        Self { index, source }
    }
}

/// Reads and parses template sources
#[derive(Debug, Clone)]
pub struct TemplateParser {
    engine: Arc<dyn TemplateEngine>,
    resources: Arc<dyn ResourceProvider>,
    locator: Option<SharedLocator>,
}

impl TemplateParser {
    /// Create a parser; includes resolve through `locator` when given
    pub fn new(
        engine: Arc<dyn TemplateEngine>,
        resources: Arc<dyn ResourceProvider>,
        locator: Option<SharedLocator>,
    ) -> Self {
        Self {
            engine,
            resources,
            locator,
        }
    }

    /// Read the text of one source
    pub fn read_source(&self, source: &TemplateSource) -> Result<String> {
        let text = match source {
            TemplateSource::Path(path) => std::fs::read_to_string(path),
            TemplateSource::Resource(id) => self.resources.read(id),
        };
        text.map_err(|e| PipelineError::source_unavailable(source.name(), e))
    }

    /// Read and parse one source
    pub fn parse(&self, source: &TemplateSource) -> Result<Box<dyn ParsedTemplate>> {
        let name = source.name();
        let text = self.read_source(source)?;
        let template = self
            .engine
            .parse(&name, &text, self.locator.as_ref())
            .map_err(|e| PipelineError::parse_failed(&name, e))?;
        trace!("parsed {}", source);
        Ok(template)
    }

    /// Parse every job in order, stopping at the first failure
    pub fn parse_all(
        &self,
        jobs: Vec<ParseJob>,
        cancel: &CancellationToken,
    ) -> Result<Vec<(usize, Box<dyn ParsedTemplate>)>> {
        let mut parsed = Vec::with_capacity(jobs.len());
        for job in jobs {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            parsed.push((job.index, self.parse(&job.source)?));
        }
        Ok(parsed)
    }

    /// Run [`TemplateParser::parse_all`] on the blocking pool
    #[instrument(skip_all, fields(jobs = jobs.len()))]
    pub async fn parse_in_background(
        &self,
        jobs: Vec<ParseJob>,
        cancel: CancellationToken,
    ) -> Result<Vec<(usize, Box<dyn ParsedTemplate>)>> {
        let parser = self.clone();
        let parsed =
            tokio::task::spawn_blocking(move || parser.parse_all(jobs, &cancel)).await??;
        debug!("parsed {} templates", parsed.len());
        Ok(parsed)
    }
}
