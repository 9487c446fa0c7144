//! CLI error types with exit code handling
//!
//! Library errors are folded into [`CliError`] at the command boundary so
//! every failure is reported as one `miette` diagnostic with an exit code.

use std::time::Duration;

use kinflate_engine::{EngineError, TemplateError};
use kinflate_kube::KubeError;
use kinflate_repo::RepoError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Configuration document or flags failed validation
    #[error("{message}")]
    #[diagnostic(code(kinflate::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A template failed to compile or render
    #[error("render chart {chart}")]
    #[diagnostic(code(kinflate::cli::template))]
    Template {
        chart: String,
        #[source]
        #[diagnostic_source]
        source: TemplateError,
    },

    /// Chart resolution, loading or value loading failed
    #[error("{message}")]
    #[diagnostic(code(kinflate::cli::chart))]
    Chart { message: String },

    /// Repository configuration errors
    #[error("{message}")]
    #[diagnostic(code(kinflate::cli::repository))]
    Repository { message: String },

    /// Transformation policy violations
    #[error("{message}")]
    #[diagnostic(code(kinflate::cli::manifest))]
    Manifest { message: String },

    /// Writing output failed
    #[error("{message}")]
    #[diagnostic(code(kinflate::cli::output))]
    Output { message: String },

    #[error("rendering timed out after {}s", .after.as_secs())]
    #[diagnostic(
        code(kinflate::cli::timeout),
        help("raise --timeout or check that the chart repositories are reachable")
    )]
    Timeout { after: Duration },

    #[error("rendering cancelled")]
    #[diagnostic(code(kinflate::cli::cancelled))]
    Cancelled,

    #[error("IO error: {message}")]
    #[diagnostic(code(kinflate::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("internal error: {message}")]
    #[diagnostic(code(kinflate::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Template { .. } => exit_codes::TEMPLATE_ERROR,
            CliError::Chart { .. } => exit_codes::CHART_ERROR,
            CliError::Repository { .. } => exit_codes::ERROR,
            CliError::Manifest { .. } => exit_codes::MANIFEST_ERROR,
            CliError::Output { .. } | CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Timeout { .. } => exit_codes::TIMEOUT,
            CliError::Cancelled => exit_codes::INTERRUPTED,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// All validation problems as one error
    pub fn invalid_config(errors: &[String]) -> Self {
        Self::Config {
            message: format!("invalid chart renderer config:\n * {}", errors.join("\n * ")),
            help: Some("fix every listed field; nothing has been fetched or written".to_string()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn output(err: KubeError) -> Self {
        Self::Output {
            message: err.to_string(),
        }
    }

    /// Repository management failures outside of chart resolution
    pub fn repository(err: RepoError) -> Self {
        Self::Repository {
            message: err.to_string(),
        }
    }

    /// Chart resolution failure with the chart reference as context
    pub fn load_chart(chart: &str, err: RepoError) -> Self {
        Self::Chart {
            message: format!("load chart {}: {}", chart, err),
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Render { chart, source } => match *source {
                EngineError::Template(source) => CliError::Template { chart, source },
                other => CliError::Chart {
                    message: format!("render chart {}: {}", chart, other),
                },
            },
            EngineError::Template(source) => CliError::Template {
                chart: source.template.clone(),
                source,
            },
            other => CliError::Chart {
                message: other.to_string(),
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        CliError::Manifest {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
