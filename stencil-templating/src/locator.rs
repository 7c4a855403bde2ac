//! Include resolution for templates
//!
//! Templates may pull in other templates with `{% include "name" %}`. A
//! [`TemplateLocator`] decides where those names come from. Locators are
//! shared between the pipeline and the engine, so they are handed around as
//! [`SharedLocator`] and must be `Send + Sync`.
//!
//! ## Name normalization
//!
//! Include names are tried as written first, then with each of
//! [`TEMPLATE_EXTENSIONS`] added or swapped, so `{% include "header" %}` finds
//! `header.liquid` or `header.tmpl`.

use crate::error::{Result, TemplatingError};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Template file extensions tried when resolving include names
pub const TEMPLATE_EXTENSIONS: &[&str] = &[".liquid", ".tmpl", ".in"];

/// Locator shared between the pipeline and parse workers
pub type SharedLocator = Arc<dyn TemplateLocator>;

/// Trait for resolving include names to template text
pub trait TemplateLocator: Send + Sync + std::fmt::Debug {
    /// Check if a template with the given name exists
    fn contains(&self, name: &str) -> bool;

    /// Names of all templates this locator can resolve
    fn names(&self) -> Vec<String>;

    /// Try to load a template by name
    fn try_get(&self, name: &str) -> Option<Cow<'_, str>>;

    /// Load a template by name, returning an error if not found
    fn get(&self, name: &str) -> Result<String> {
        self.try_get(name)
            .map(|s| s.into_owned())
            .ok_or_else(|| TemplatingError::Include(format!("Template '{}' not found", name)))
    }
}

/// Candidate names to try for an include, in lookup order, without duplicates
pub fn normalize_include_name(requested_name: &str) -> Vec<String> {
    let mut candidates = vec![requested_name.to_string()];

    for ext in TEMPLATE_EXTENSIONS {
        candidates.push(format!("{requested_name}{ext}"));
    }

    for ext in TEMPLATE_EXTENSIONS {
        if let Some(stem) = requested_name.strip_suffix(ext) {
            candidates.push(stem.to_string());
            for other_ext in TEMPLATE_EXTENSIONS {
                if ext != other_ext {
                    candidates.push(format!("{stem}{other_ext}"));
                }
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Locator backed by an in-memory map of name to template text
///
/// # Example
///
/// ```rust
/// use stencil_templating::{MapLocator, TemplateLocator};
///
/// let mut locator = MapLocator::empty();
/// locator.add("license.liquid", "SPDX-License-Identifier: {{ license }}");
///
/// assert!(locator.contains("license"));
/// assert!(locator.get("license").is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MapLocator {
    templates: HashMap<String, String>,
}

impl MapLocator {
    /// Create a locator from a map of templates
    pub fn new(templates: HashMap<String, String>) -> Self {
        Self { templates }
    }

    /// Create an empty locator
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a template
    pub fn add(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.templates.insert(name.into(), content.into());
    }

    /// Number of templates
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the locator holds no templates
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateLocator for MapLocator {
    fn contains(&self, name: &str) -> bool {
        normalize_include_name(name)
            .iter()
            .any(|c| self.templates.contains_key(c))
    }

    fn names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    fn try_get(&self, name: &str) -> Option<Cow<'_, str>> {
        normalize_include_name(name)
            .into_iter()
            .find_map(|candidate| self.templates.get(&candidate))
            .map(|content| Cow::Borrowed(content.as_str()))
    }
}

/// Locator that searches a list of directories in order
///
/// Earlier search paths shadow later ones. Include names are treated as
/// relative paths and may not escape their search path.
#[derive(Debug, Clone, Default)]
pub struct DirectoryLocator {
    search_paths: Vec<PathBuf>,
}

impl DirectoryLocator {
    /// Create a locator searching `paths` in order
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            search_paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Search `path` before every existing search path
    pub fn prepend_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.insert(0, path.into());
    }

    /// Search `path` after every existing search path
    pub fn append_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    /// Current search paths in lookup order
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let candidates = normalize_include_name(name);
        for root in &self.search_paths {
            for candidate in &candidates {
                let relative = Path::new(candidate);
                if !is_contained(relative) {
                    tracing::warn!("Rejecting include outside search path: '{}'", name);
                    return None;
                }
                let path = root.join(relative);
                if path.is_file() {
                    tracing::trace!("Resolved include '{}' to {}", name, path.display());
                    return Some(path);
                }
            }
        }
        None
    }
}

/// Relative path made only of normal components
fn is_contained(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

impl TemplateLocator for DirectoryLocator {
    fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for root in &self.search_paths {
            for entry in WalkDir::new(root)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                if let Ok(relative) = entry.path().strip_prefix(root) {
                    let name = relative.to_string_lossy().replace('\\', "/");
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        names
    }

    fn try_get(&self, name: &str) -> Option<Cow<'_, str>> {
        let path = self.resolve(name)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(Cow::Owned(content)),
            Err(e) => {
                tracing::warn!("Failed to read include {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Adapter exposing a [`SharedLocator`] to Liquid's partial system
#[derive(Debug, Clone)]
pub(crate) struct LocatorSource {
    locator: SharedLocator,
}

impl LocatorSource {
    pub(crate) fn new(locator: SharedLocator) -> Self {
        Self { locator }
    }
}

impl liquid::partials::PartialSource for LocatorSource {
    fn contains(&self, name: &str) -> bool {
        let found = self.locator.contains(name);
        if !found {
            tracing::debug!("No template found for include '{}'", name);
        }
        found
    }

    fn names(&self) -> Vec<&str> {
        // Only consulted by eager compilers; includes are compiled lazily
        Vec::new()
    }

    fn try_get<'a>(&'a self, name: &str) -> Option<Cow<'a, str>> {
        self.locator.try_get(name)
    }
}
