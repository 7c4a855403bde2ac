//! File expansion records
//!
//! A record is one template-source-to-destination unit of work. Sources,
//! destinations, scopes and modes are fixed at registration; the parsed
//! template and expanded text are each filled in exactly once as the
//! pipeline advances.

use crate::error::{PipelineError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stencil_templating::{ParsedTemplate, Scope};

/// Where a record's template text comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateSource {
    /// A file on the local filesystem
    Path(PathBuf),
    /// An embedded resource identifier such as `/templates/a.tmpl`
    Resource(String),
}

impl TemplateSource {
    /// Name used when parsing and in error messages
    pub fn name(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Resource(id) => id.clone(),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Path(path) => path.as_os_str().is_empty(),
            Self::Resource(id) => id.trim_start_matches('/').is_empty(),
        }
    }
}

impl fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Resource(id) if id.starts_with('/') => write!(f, "resource://{}", id),
            Self::Resource(id) => write!(f, "resource:///{}", id),
        }
    }
}

/// One template source, its destination and everything produced for it
#[derive(Debug)]
pub struct FileExpansionRecord {
    source: TemplateSource,
    destination: PathBuf,
    scope: Scope,
    mode: u32,
    parsed: Option<Box<dyn ParsedTemplate>>,
    result: Option<Arc<str>>,
}

impl FileExpansionRecord {
    /// Create a record, taking ownership of `scope` or starting from an empty one
    ///
    /// A `mode` of zero leaves permissions untouched.
    pub fn new(
        source: TemplateSource,
        destination: impl Into<PathBuf>,
        scope: Option<Scope>,
        mode: u32,
    ) -> Result<Self> {
        let destination = destination.into();
        if source.is_empty() {
            return Err(PipelineError::invalid_record("template source is empty"));
        }
        if destination.as_os_str().is_empty() {
            return Err(PipelineError::invalid_record(format!(
                "destination for '{}' is empty",
                source
            )));
        }

        Ok(Self {
            source,
            destination,
            scope: scope.unwrap_or_default(),
            mode,
            parsed: None,
            result: None,
        })
    }

    pub fn source(&self) -> &TemplateSource {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Permission bits applied after writing, zero for none
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Directory that must exist before the destination can be written
    ///
    /// `None` when the destination has no parent, such as a bare root.
    pub fn parent_directory(&self) -> Option<&Path> {
        self.destination
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
    }

    pub fn parsed(&self) -> Option<&dyn ParsedTemplate> {
        self.parsed.as_deref()
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed.is_some()
    }

    /// Store the parsed template
    ///
    /// Returns the template back if one was already stored.
    pub fn set_parsed(
        &mut self,
        template: Box<dyn ParsedTemplate>,
    ) -> std::result::Result<(), Box<dyn ParsedTemplate>> {
        if self.parsed.is_some() {
            return Err(template);
        }
        self.parsed = Some(template);
        Ok(())
    }

    /// Expanded text, once expansion has run
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Shared handle to the expanded text for write tasks
    pub fn shared_result(&self) -> Option<Arc<str>> {
        self.result.clone()
    }

    /// Store the expanded text
    ///
    /// Returns the text back if a result was already stored.
    pub fn set_result(&mut self, text: impl Into<Arc<str>>) -> std::result::Result<(), Arc<str>> {
        let text = text.into();
        if self.result.is_some() {
            return Err(text);
        }
        self.result = Some(text);
        Ok(())
    }
}
