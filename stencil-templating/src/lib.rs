//! Template engine seam for Stencil
//!
//! This crate defines what the expansion pipeline needs from a template
//! engine, and ships a Liquid-backed implementation:
//!
//! - [`TemplateEngine`] / [`ParsedTemplate`] - parse once, expand later
//! - [`LiquidEngine`] - the default engine
//! - [`Scope`] - per-template variable bindings
//! - [`TemplateLocator`] - resolution of `{% include %}` names
//!
//! # Example
//!
//! ```rust
//! use stencil_templating::{LiquidEngine, Scope, TemplateEngine};
//!
//! let engine = LiquidEngine::new()?;
//! let template = engine.parse("greeting", "Hello {{ name }}", None)?;
//! let scope = Scope::new().with("name", "World");
//! assert_eq!(template.expand(&scope)?, "Hello World");
//! # Ok::<(), stencil_templating::TemplatingError>(())
//! ```

mod engine;
mod error;
mod locator;
mod scope;

pub use engine::{LiquidEngine, LiquidTemplate, ParsedTemplate, TemplateEngine};
pub use error::{Result, TemplatingError};
pub use locator::{
    normalize_include_name, DirectoryLocator, MapLocator, SharedLocator, TemplateLocator,
    TEMPLATE_EXTENSIONS,
};
pub use scope::Scope;
