//! Project templates
//!
//! A project template describes a whole project scaffold: identity shown to
//! the user, plus an `expand` operation that writes every file. The
//! manifest-driven [`ManifestTemplate`] reads a YAML description and feeds
//! its files through a [`TemplateBase`].

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::TemplateBase;
use crate::storage::{LocalStorage, Storage};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use stencil_templating::{DirectoryLocator, LiquidEngine, Scope, TemplatingError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use walkdir::WalkDir;

/// File names recognised as project template manifests
pub const MANIFEST_FILE_NAMES: &[&str] = &["template.yaml", "template.yml"];

/// Parameter naming the directory a project is expanded into
pub const DIRECTORY_PARAM: &str = "directory";

/// Parameters passed to [`ProjectTemplate::expand`]
pub type ProjectParams = BTreeMap<String, Value>;

/// Errors from loading or expanding project templates
#[derive(Error, Debug)]
pub enum ProjectError {
    /// The manifest file could not be read
    #[error("failed to read manifest '{path}': {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid YAML or is missing fields
    #[error("invalid manifest '{path}': {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    /// A required expansion parameter was not supplied
    #[error("missing required parameter '{name}'")]
    MissingParameter { name: String },

    /// A file destination escapes the project directory or is empty
    #[error("invalid destination '{destination}' in template '{template}': {reason}")]
    InvalidDestination {
        template: String,
        destination: String,
        reason: String,
    },

    /// Two templates share an id
    #[error("duplicate project template id '{id}'")]
    DuplicateId { id: String },

    /// Walking a template directory failed
    #[error("failed to scan template directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// A destination path could not be expanded
    #[error(transparent)]
    Templating(#[from] TemplatingError),

    /// The expansion pipeline failed
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// A project scaffold offered to the user
#[async_trait]
pub trait ProjectTemplate: Send + Sync + std::fmt::Debug {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Languages the generated project uses
    fn languages(&self) -> &[String];

    fn icon_name(&self) -> Option<&str>;

    /// Write the project described by `params`
    async fn expand(
        &self,
        params: &ProjectParams,
        cancel: &CancellationToken,
    ) -> Result<(), ProjectError>;
}

/// Manifest describing a project template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub icon_name: Option<String>,
    #[serde(default)]
    pub files: Vec<ManifestFile>,
}

/// One file written by a manifest template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Template path relative to the manifest directory
    pub source: PathBuf,
    /// Destination relative to the project directory; expanded as a template
    pub destination: String,
    /// Permission bits, zero to leave them alone
    #[serde(default, deserialize_with = "deserialize_mode")]
    pub mode: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModeRepr {
    Number(u32),
    Text(String),
}

/// Accept `0o755` (a YAML octal integer) or an octal string such as `"755"`
fn deserialize_mode<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match ModeRepr::deserialize(deserializer)? {
        ModeRepr::Number(mode) => check_mode_range(mode, &format!("{:o}", mode)),
        ModeRepr::Text(text) => parse_octal_mode(&text),
    }
    .map_err(serde::de::Error::custom)
}

fn check_mode_range(mode: u32, written: &str) -> Result<u32, String> {
    if mode > 0o7777 {
        return Err(format!("mode '{}' is out of range", written));
    }
    Ok(mode)
}

fn parse_octal_mode(text: &str) -> Result<u32, String> {
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
    let mode =
        u32::from_str_radix(digits, 8).map_err(|_| format!("'{}' is not an octal mode", text))?;
    check_mode_range(mode, text)
}

/// Project template defined by a YAML manifest
#[derive(Debug, Clone)]
pub struct ManifestTemplate {
    manifest: Manifest,
    root: PathBuf,
    storage: Arc<dyn Storage>,
    config: PipelineConfig,
}

impl ManifestTemplate {
    /// Load a manifest file; sources resolve relative to its directory
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ProjectError::ManifestRead {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: Manifest =
            serde_yaml_ng::from_str(&text).map_err(|source| ProjectError::ManifestParse {
                path: path.to_path_buf(),
                source,
            })?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        debug!("loaded project template '{}' from {}", manifest.id, path.display());
        Ok(Self::new(manifest, root))
    }

    /// Wrap an already parsed manifest rooted at `root`
    pub fn new(manifest: Manifest, root: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            root: root.into(),
            storage: Arc::new(LocalStorage::new()),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Directory template sources and includes resolve against
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build the pipeline for `params` without running it
    pub fn pipeline(&self, params: &ProjectParams) -> Result<TemplateBase, ProjectError> {
        let directory = params
            .get(DIRECTORY_PARAM)
            .and_then(Value::as_str)
            .filter(|directory| !directory.is_empty())
            .ok_or_else(|| ProjectError::MissingParameter {
                name: DIRECTORY_PARAM.to_string(),
            })?;
        let directory = PathBuf::from(directory);

        let scope = Scope::from(params.clone());
        let engine = LiquidEngine::new()?;
        let mut base = TemplateBase::new()
            .with_storage(self.storage.clone())
            .with_config(self.config);
        base.set_locator(Arc::new(DirectoryLocator::new([self.root.clone()])))?;

        for file in &self.manifest.files {
            let rendered = engine.render(&file.destination, &scope)?;
            let relative = self.checked_destination(&rendered)?;
            base.add_path(
                self.root.join(&file.source),
                directory.join(relative),
                Some(scope.clone()),
                file.mode,
            )?;
        }

        Ok(base)
    }

    fn checked_destination(&self, rendered: &str) -> Result<PathBuf, ProjectError> {
        let invalid = |reason: &str| ProjectError::InvalidDestination {
            template: self.manifest.id.clone(),
            destination: rendered.to_string(),
            reason: reason.to_string(),
        };

        let path = Path::new(rendered.trim());
        if path.as_os_str().is_empty() {
            return Err(invalid("destination is empty"));
        }

        let mut relative = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => relative.push(part),
                Component::CurDir => {}
                _ => return Err(invalid("destination must stay inside the project directory")),
            }
        }
        if relative.as_os_str().is_empty() {
            return Err(invalid("destination does not name a file"));
        }
        Ok(relative)
    }
}

#[async_trait]
impl ProjectTemplate for ManifestTemplate {
    fn id(&self) -> &str {
        &self.manifest.id
    }

    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn description(&self) -> &str {
        &self.manifest.description
    }

    fn languages(&self) -> &[String] {
        &self.manifest.languages
    }

    fn icon_name(&self) -> Option<&str> {
        self.manifest.icon_name.as_deref()
    }

    async fn expand(
        &self,
        params: &ProjectParams,
        cancel: &CancellationToken,
    ) -> Result<(), ProjectError> {
        let mut base = self.pipeline(params)?;
        base.expand_all(cancel).await?;
        info!("expanded project template '{}'", self.manifest.id);
        Ok(())
    }
}

/// Collection of project templates, ordered by display name
#[derive(Debug, Default)]
pub struct ProjectTemplateRegistry {
    templates: Vec<Arc<dyn ProjectTemplate>>,
}

impl ProjectTemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template; ids must be unique
    pub fn register(&mut self, template: Arc<dyn ProjectTemplate>) -> Result<(), ProjectError> {
        if self.get(template.id()).is_some() {
            return Err(ProjectError::DuplicateId {
                id: template.id().to_string(),
            });
        }
        let position = self
            .templates
            .partition_point(|existing| existing.name() <= template.name());
        self.templates.insert(position, template);
        Ok(())
    }

    /// Load every manifest found under `directory`, returning how many loaded
    pub fn load_directory(&mut self, directory: impl AsRef<Path>) -> Result<usize, ProjectError> {
        let mut loaded = 0;
        for entry in WalkDir::new(directory.as_ref()).sort_by_file_name() {
            let entry = entry?;
            let is_manifest = entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| MANIFEST_FILE_NAMES.contains(&name));
            if is_manifest {
                self.register(Arc::new(ManifestTemplate::load(entry.path())?))?;
                loaded += 1;
            }
        }
        debug!(
            "loaded {} project templates from {}",
            loaded,
            directory.as_ref().display()
        );
        Ok(loaded)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ProjectTemplate>> {
        self.templates
            .iter()
            .find(|template| template.id() == id)
            .cloned()
    }

    /// Templates sorted by name
    pub fn list(&self) -> &[Arc<dyn ProjectTemplate>] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
