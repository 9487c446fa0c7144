//! Error types for kinflate-kube

use thiserror::Error;

/// Result type for kinflate-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors raised while transforming or writing manifests
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// A rendered document could not be parsed as YAML
    #[error("process chart output: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A document does not carry usable identity metadata
    #[error("invalid resource metadata: {message}\n  provided resource:\n  {content}")]
    InvalidMetadata { message: String, content: String },

    /// Cluster-scoped resources found while only namespaced ones are allowed
    #[error(
        "manifests should only include namespace-scoped resources but the following cluster-scoped (or unknown) resources have been found:\n * {}\nPlease exclude cluster-scoped resources or enable their usage",
        resources.join("\n * ")
    )]
    ClusterScopedResources { resources: Vec<String> },

    /// Selectors that did not match any resource
    #[error(
        "the following selectors did not match any resource:\n * {}",
        selectors.join("\n * ")
    )]
    UnmatchedSelectors { selectors: Vec<String> },

    /// The chart rendered no resources at all
    #[error("chart {chart} does not contain any manifests")]
    NoManifests { chart: String },

    /// Every resource was dropped by the exclusion rules
    #[error("no output since all resources were excluded")]
    AllResourcesExcluded,

    /// Output file exists and replacing is disabled
    #[error("output file {path} already exists\nHint: use --output-replace to replace it")]
    OutputFileExists { path: String },

    /// Output directory is not empty and replacing is disabled
    #[error("output directory {path:?} already contains files\nHint: use --output-replace to delete and recreate the directory")]
    OutputDirNotEmpty { path: String },

    /// A resource cannot be written to a directory without a name
    #[error("output resource has no name:\n  {content}")]
    ResourceWithoutName { content: String },

    /// A resource name that would leave the output directory
    #[error("output resource {kind}/{name:?} has a name containing a path separator")]
    UnsafeResourceName { kind: String, name: String },

    /// Invalid output configuration
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// IO error
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Error with positional context (template file, selector set)
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<KubeError>,
    },
}

impl KubeError {
    /// Wrap the error with positional context
    pub fn context(self, context: impl Into<String>) -> Self {
        KubeError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        KubeError::Io {
            context: context.into(),
            source,
        }
    }

    /// The innermost error, skipping context wrappers
    pub fn root(&self) -> &KubeError {
        match self {
            KubeError::Context { source, .. } => source.root(),
            other => other,
        }
    }
}
