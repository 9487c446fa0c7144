//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("chart not found: {path}")]
    ChartNotFound { path: String },

    #[error("chart {path} has no metadata (Chart.yaml is missing)")]
    MissingMetadata { path: String },

    #[error("invalid chart {path}: {message}")]
    InvalidChart { path: String, message: String },

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),

    #[error("values: {message}")]
    ValuesMerge { message: String },

    #[error("archive: {message}")]
    Archive { message: String },

    #[error("path {path} is outside the root directory {root}")]
    PathOutsideRoot { path: String, root: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
