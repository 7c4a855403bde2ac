//! Embedded template resources
//!
//! Records registered with `add_resource` name their template by resource
//! identifier rather than filesystem path. A [`ResourceProvider`] turns those
//! identifiers into template text. Identifiers are `/`-separated and a leading
//! `/` is ignored, so `/templates/a.tmpl` and `templates/a.tmpl` are the same
//! resource.

use include_dir::Dir;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use stencil_templating::{normalize_include_name, TemplateLocator};

/// Source of embedded template text keyed by resource identifier
pub trait ResourceProvider: Send + Sync + std::fmt::Debug {
    /// Read the resource as UTF-8 text
    fn read(&self, id: &str) -> io::Result<String>;

    /// Whether the resource exists
    fn contains(&self, id: &str) -> bool;

    /// Every resource identifier this provider knows
    fn ids(&self) -> Vec<String>;
}

fn normalize_id(id: &str) -> &str {
    id.trim_start_matches('/')
}

fn not_found(id: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("resource '{}' does not exist", id),
    )
}

/// Provider with no resources; every lookup fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResources;

impl ResourceProvider for NoResources {
    fn read(&self, id: &str) -> io::Result<String> {
        Err(not_found(id))
    }

    fn contains(&self, _id: &str) -> bool {
        false
    }

    fn ids(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Provider backed by an in-memory map
#[derive(Debug, Clone, Default)]
pub struct MapResources {
    resources: HashMap<String, String>,
}

impl MapResources {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, replacing any previous one with the same id
    pub fn insert(&mut self, id: impl AsRef<str>, content: impl Into<String>) {
        self.resources
            .insert(normalize_id(id.as_ref()).to_string(), content.into());
    }

    /// Builder-style variant of [`MapResources::insert`]
    pub fn with(mut self, id: impl AsRef<str>, content: impl Into<String>) -> Self {
        self.insert(id, content);
        self
    }
}

impl ResourceProvider for MapResources {
    fn read(&self, id: &str) -> io::Result<String> {
        self.resources
            .get(normalize_id(id))
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(normalize_id(id))
    }

    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.resources.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Provider backed by a directory embedded with `include_dir!`
///
/// ```rust,ignore
/// use include_dir::{include_dir, Dir};
/// use stencil::EmbeddedResources;
///
/// static TEMPLATES: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/templates");
/// let resources = EmbeddedResources::new(&TEMPLATES);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedResources {
    dir: &'static Dir<'static>,
}

impl EmbeddedResources {
    /// Wrap an embedded directory
    pub fn new(dir: &'static Dir<'static>) -> Self {
        Self { dir }
    }
}

impl ResourceProvider for EmbeddedResources {
    fn read(&self, id: &str) -> io::Result<String> {
        let file = self.dir.get_file(normalize_id(id)).ok_or_else(|| not_found(id))?;
        file.contents_utf8().map(str::to_string).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("resource '{}' is not valid UTF-8", id),
            )
        })
    }

    fn contains(&self, id: &str) -> bool {
        self.dir.get_file(normalize_id(id)).is_some()
    }

    fn ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        collect_files(self.dir, &mut ids);
        ids.sort();
        ids
    }
}

fn collect_files(dir: &Dir<'_>, ids: &mut Vec<String>) {
    for file in dir.files() {
        ids.push(file.path().to_string_lossy().replace('\\', "/"));
    }
    for child in dir.dirs() {
        collect_files(child, ids);
    }
}

/// Locator resolving includes from a [`ResourceProvider`] under a prefix
///
/// `{% include "license" %}` with prefix `shared` looks for
/// `shared/license`, `shared/license.liquid`, and so on.
#[derive(Debug, Clone)]
pub struct ResourceLocator {
    provider: Arc<dyn ResourceProvider>,
    prefix: String,
}

impl ResourceLocator {
    /// Create a locator reading from `provider` under `prefix`
    pub fn new(provider: Arc<dyn ResourceProvider>, prefix: impl AsRef<str>) -> Self {
        Self {
            provider,
            prefix: normalize_id(prefix.as_ref()).trim_end_matches('/').to_string(),
        }
    }

    fn qualify(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            normalize_id(name).to_string()
        } else {
            format!("{}/{}", self.prefix, normalize_id(name))
        }
    }
}

impl TemplateLocator for ResourceLocator {
    fn contains(&self, name: &str) -> bool {
        normalize_include_name(name)
            .iter()
            .any(|candidate| self.provider.contains(&self.qualify(candidate)))
    }

    fn names(&self) -> Vec<String> {
        if self.prefix.is_empty() {
            return self.provider.ids();
        }
        let prefix = format!("{}/", self.prefix);
        self.provider
            .ids()
            .into_iter()
            .filter_map(|id| id.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    fn try_get(&self, name: &str) -> Option<Cow<'_, str>> {
        normalize_include_name(name)
            .iter()
            .find_map(|candidate| self.provider.read(&self.qualify(candidate)).ok())
            .map(Cow::Owned)
    }
}
