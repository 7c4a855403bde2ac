//! Template engines
//!
//! The expansion pipeline treats the engine as an opaque service: it parses
//! template text into a [`ParsedTemplate`] and later expands that template
//! against a [`Scope`]. [`LiquidEngine`] is the default implementation.

use crate::error::{Result, TemplatingError};
use crate::locator::{LocatorSource, SharedLocator};
use crate::scope::Scope;

/// A template that has been parsed and can be expanded any number of times
pub trait ParsedTemplate: Send + Sync + std::fmt::Debug {
    /// Expand the template against `scope`
    fn expand(&self, scope: &Scope) -> Result<String>;
}

/// Service that turns template text into [`ParsedTemplate`]s
///
/// `name` identifies the template in error messages. When `locator` is given,
/// include directives resolve against it; otherwise includes fail.
pub trait TemplateEngine: Send + Sync + std::fmt::Debug {
    /// Parse `text` into a template
    fn parse(
        &self,
        name: &str,
        text: &str,
        locator: Option<&SharedLocator>,
    ) -> Result<Box<dyn ParsedTemplate>>;
}

/// Template engine with Liquid configuration
#[derive(Clone)]
pub struct LiquidEngine {
    parser: liquid::Parser,
}

impl std::fmt::Debug for LiquidEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiquidEngine").finish_non_exhaustive()
    }
}

impl LiquidEngine {
    /// Create a new engine with the Liquid standard library
    pub fn new() -> Result<Self> {
        Ok(Self {
            parser: Self::default_parser()?,
        })
    }

    /// Create a new engine with a custom parser
    pub fn with_parser(parser: liquid::Parser) -> Self {
        Self { parser }
    }

    /// Create a default parser
    pub fn default_parser() -> Result<liquid::Parser> {
        liquid::ParserBuilder::with_stdlib()
            .build()
            .map_err(TemplatingError::parse)
    }

    /// Create a parser whose includes resolve through `locator`
    pub fn parser_with_locator(locator: SharedLocator) -> Result<liquid::Parser> {
        let compiler = liquid::partials::LazyCompiler::new(LocatorSource::new(locator));
        liquid::ParserBuilder::with_stdlib()
            .partials(compiler)
            .build()
            .map_err(TemplatingError::parse)
    }

    /// Parse and expand `text` in one step, without include support
    pub fn render(&self, text: &str, scope: &Scope) -> Result<String> {
        let template = self.parser.parse(text).map_err(TemplatingError::parse)?;
        template
            .render(scope.as_object())
            .map_err(TemplatingError::render)
    }

    /// Get a reference to the underlying parser
    pub fn parser(&self) -> &liquid::Parser {
        &self.parser
    }
}

impl TemplateEngine for LiquidEngine {
    fn parse(
        &self,
        name: &str,
        text: &str,
        locator: Option<&SharedLocator>,
    ) -> Result<Box<dyn ParsedTemplate>> {
        let template = match locator {
            Some(locator) => Self::parser_with_locator(locator.clone())?.parse(text),
            None => self.parser.parse(text),
        }
        .map_err(TemplatingError::parse)?;

        tracing::trace!("Parsed liquid template '{}'", name);
        Ok(Box::new(LiquidTemplate {
            name: name.to_string(),
            template,
        }))
    }
}

/// A parsed Liquid template
pub struct LiquidTemplate {
    name: String,
    template: liquid::Template,
}

impl LiquidTemplate {
    /// Name the template was parsed under
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for LiquidTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiquidTemplate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ParsedTemplate for LiquidTemplate {
    fn expand(&self, scope: &Scope) -> Result<String> {
        self.template
            .render(scope.as_object())
            .map_err(TemplatingError::render)
    }
}
