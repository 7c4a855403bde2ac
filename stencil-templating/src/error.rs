//! Error types for template parsing and expansion

use thiserror::Error;

/// Result type alias using TemplatingError
pub type Result<T> = std::result::Result<T, TemplatingError>;

/// Errors produced by template engines and locators
#[derive(Error, Debug)]
pub enum TemplatingError {
    /// The template text could not be parsed
    #[error("Template parse error: {0}")]
    Parse(String),

    /// The template parsed but could not be expanded against its scope
    #[error("Template render error: {0}")]
    Render(String),

    /// An include directive could not be resolved
    #[error("Include error: {0}")]
    Include(String),

    /// Reading template content failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TemplatingError {
    /// Create a Parse error from any displayable message
    pub fn parse(message: impl std::fmt::Display) -> Self {
        Self::Parse(message.to_string())
    }

    /// Create a Render error from any displayable message
    pub fn render(message: impl std::fmt::Display) -> Self {
        Self::Render(message.to_string())
    }
}
