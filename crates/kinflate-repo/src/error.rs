//! Error types for repository operations and chart resolution

use kinflate_core::CoreError;
use thiserror::Error;

/// Repository and resolution errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Configuration Errors ============
    #[error("repository not found: {name}")]
    RepositoryNotFound { name: String },

    #[error("repository already exists: {name}")]
    RepositoryAlreadyExists { name: String },

    #[error("invalid repository URL {url:?}: {reason}")]
    InvalidRepositoryUrl { url: String, reason: String },

    #[error("invalid repository configuration: {message}")]
    InvalidConfig { message: String },

    #[error(
        "repository {url} is not configured\nHint: add it with `kinflate repo add` or enable trustAnyRepository"
    )]
    UntrustedRepository { url: String },

    // ============ Transport Errors ============
    #[error("no fetcher registered for scheme {scheme:?}")]
    UnsupportedScheme { scheme: String },

    #[error("HTTP {status} fetching {url}")]
    HttpError { status: u16, url: String },

    #[error("network error: {message}")]
    NetworkError { message: String },

    #[error("authentication required for {url}")]
    AuthRequired { url: String },

    #[error("authentication failed: {message}")]
    AuthFailed { message: String },

    // ============ Index Errors ============
    #[error("no cached index for repository {url}")]
    IndexNotFound { url: String },

    #[error("index parse error: {message}")]
    IndexParseError { message: String },

    /// The chart version is not listed in the cached repository index
    #[error("entry not found: chart {chart} version {version:?} in repository {repository}")]
    EntryNotFound {
        chart: String,
        version: String,
        repository: String,
    },

    #[error("integrity check failed for {name}: expected {expected}, got {actual}")]
    IntegrityCheckFailed {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("cannot verify {name}: the repository index has no digest for it")]
    MissingDigest { name: String },

    // ============ Resolution Errors ============
    #[error("chart directory {path:?} not found and no repository specified")]
    ChartNotFound { path: String },

    #[error("collect local charts recursively: max depth of {max} reached - cyclic dependency?")]
    DependencyDepthExceeded { max: usize },

    #[error(
        "{chart}: Chart.lock is out of sync with the dependencies in Chart.yaml\nHint: delete Chart.lock to resolve the dependencies again"
    )]
    LockFileOutdated { chart: String },

    #[error("dependency {name} {constraint:?} is not satisfied by {path} (version {version})")]
    LocalDependencyMismatch {
        name: String,
        constraint: String,
        path: String,
        version: String,
    },

    #[error("build chart {chart}: {source}")]
    Build {
        chart: String,
        #[source]
        source: Box<RepoError>,
    },

    #[error("failed reloading chart {chart} after dependency download: {source}")]
    Reload {
        chart: String,
        #[source]
        source: CoreError,
    },

    #[error("{context}: {source}")]
    Chart {
        context: String,
        #[source]
        source: CoreError,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    // ============ IO Errors ============
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl RepoError {
    /// Whether this is (or wraps) a missing index entry
    pub fn is_entry_not_found(&self) -> bool {
        match self {
            RepoError::EntryNotFound { .. } => true,
            RepoError::Build { source, .. } => source.is_entry_not_found(),
            _ => false,
        }
    }

    /// Wrap a chart loading error with positional context
    pub fn chart(context: impl Into<String>, source: CoreError) -> Self {
        RepoError::Chart {
            context: context.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            RepoError::HttpError {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else if e.is_connect() {
            RepoError::NetworkError {
                message: format!("connection failed: {}", e),
            }
        } else {
            RepoError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidRepositoryUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}
