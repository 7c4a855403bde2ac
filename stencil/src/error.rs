//! Error types for the expansion pipeline

use crate::config::ConfigError;
use std::io;
use std::path::PathBuf;
use stencil_templating::TemplatingError;
use thiserror::Error;

/// Result type alias using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can terminate an expansion run, or reject a registration
///
/// Every variant except [`PipelineError::RegistrationClosed`] and
/// [`PipelineError::InvalidRecord`] is terminal for the pipeline instance.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// `expand_all` was called on a pipeline that already ran
    #[error("expand_all() has already been called on this pipeline")]
    AlreadyStarted,

    /// A registration call arrived after `expand_all`
    #[error("{operation}() called after expand_all(); request ignored")]
    RegistrationClosed { operation: &'static str },

    /// A record was rejected at registration time
    #[error("invalid record: {message}")]
    InvalidRecord { message: String },

    /// A destination's parent directory could not be created
    #[error("failed to create directory '{path}': {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A template source could not be read
    #[error("failed to read template '{name}': {source}")]
    SourceUnavailable {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A template source could not be parsed
    #[error("failed to parse template '{name}': {source}")]
    ParseFailed {
        name: String,
        #[source]
        source: TemplatingError,
    },

    /// A parsed template could not be expanded against its scope
    #[error("failed to expand template for '{destination}': {source}")]
    ExpansionFailed {
        destination: PathBuf,
        #[source]
        source: TemplatingError,
    },

    /// Writing an expanded file failed
    #[error("failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The timing configuration cannot drive the expansion phase
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(#[source] ConfigError),

    /// The default template engine could not be constructed
    #[error("failed to initialise template engine: {0}")]
    Engine(#[source] TemplatingError),

    /// The run was cancelled
    #[error("template expansion was cancelled")]
    Cancelled,

    /// A background worker panicked or was aborted
    #[error("background worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// Create an InvalidRecord error
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Create a DirectoryCreationFailed error
    pub fn directory_creation(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::DirectoryCreationFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a SourceUnavailable error
    pub fn source_unavailable(name: impl Into<String>, source: io::Error) -> Self {
        Self::SourceUnavailable {
            name: name.into(),
            source,
        }
    }

    /// Create a ParseFailed error
    pub fn parse_failed(name: impl Into<String>, source: TemplatingError) -> Self {
        Self::ParseFailed {
            name: name.into(),
            source,
        }
    }

    /// Create an ExpansionFailed error
    pub fn expansion_failed(destination: impl Into<PathBuf>, source: TemplatingError) -> Self {
        Self::ExpansionFailed {
            destination: destination.into(),
            source,
        }
    }

    /// Create a WriteFailed error
    pub fn write_failed(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::WriteFailed {
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this error ends the pipeline instance
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::RegistrationClosed { .. } | Self::InvalidRecord { .. }
        )
    }
}
