//! Engine error types

use kinflate_core::CoreError;
use kinflate_repo::RepoError;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Rendering errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("chart {chart}: dependency {dependency} is enabled but missing from charts/")]
    MissingSubchart { chart: String, dependency: String },

    #[error("value file {file}: {message}")]
    ValueFile { file: String, message: String },

    #[error("fetch value file {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: RepoError,
    },

    #[error("load values for chart {chart}: {source}")]
    Values {
        chart: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("render chart {chart}: {source}")]
    Render {
        chart: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Error categories reported by MiniJinja
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    TypeError,
    InvalidOperation,
    Other,
}

impl TemplateErrorKind {
    fn of(err: &minijinja::Error) -> Self {
        use minijinja::ErrorKind;
        match err.kind() {
            ErrorKind::UndefinedError => Self::UndefinedVariable,
            ErrorKind::UnknownFilter => Self::UnknownFilter,
            ErrorKind::UnknownFunction => Self::UnknownFunction,
            ErrorKind::SyntaxError => Self::SyntaxError,
            ErrorKind::InvalidOperation => Self::InvalidOperation,
            ErrorKind::CannotUnpack | ErrorKind::MissingArgument | ErrorKind::TooManyArguments => {
                Self::TypeError
            }
            _ => Self::Other,
        }
    }
}

/// A template failed to compile or render
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("template {template}: {message}")]
#[diagnostic(code(kinflate::template::render))]
pub struct TemplateError {
    /// Path of the template inside the chart
    pub template: String,

    pub message: String,

    pub kind: TemplateErrorKind,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub help: Option<String>,
}

impl TemplateError {
    pub fn from_minijinja(err: minijinja::Error, template: &str, source: &str) -> Self {
        let kind = TemplateErrorKind::of(&err);
        let message = match err.detail() {
            Some(detail) => format!("{}: {}", err.kind(), detail),
            None => err.kind().to_string(),
        };
        let help = match kind {
            TemplateErrorKind::UnknownFilter => Some(format!(
                "available filters: {}",
                crate::engine::FILTERS.join(", ")
            )),
            TemplateErrorKind::UnknownFunction => Some(format!(
                "available functions: {}",
                crate::engine::FUNCTIONS.join(", ")
            )),
            TemplateErrorKind::UndefinedVariable => {
                Some("use `| default(...)` or check the key exists in values".to_string())
            }
            _ => None,
        };

        Self {
            template: template.to_string(),
            message,
            kind,
            span: err.line().and_then(|line| line_span(source, line)),
            src: NamedSource::new(template, source.to_string()),
            help,
        }
    }
}

/// Byte span of a 1-based line
fn line_span(source: &str, line: usize) -> Option<SourceSpan> {
    let mut offset = 0;
    for (i, text) in source.split_inclusive('\n').enumerate() {
        if i + 1 == line {
            let len = text.trim_end_matches(['\n', '\r']).len();
            return Some(SourceSpan::new(offset.into(), len));
        }
        offset += text.len();
    }
    None
}
