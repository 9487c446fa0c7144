//! kinflate kube - Kubernetes manifest handling
//!
//! This crate turns rendered chart output into the final resource list:
//! - **Resources**: multi-document YAML parsing with identity extraction
//! - **Selectors**: include/exclude matching with hook detection
//! - **Scope**: namespaced vs cluster-scoped lookup for built-in kinds
//! - **Transform**: filtering, namespace injection, label cleanup and ordering
//! - **Output**: stream, file, directory and kustomization sinks

pub mod annotations;
pub mod error;
pub mod matcher;
pub mod order;
pub mod output;
pub mod resource;
pub mod scope;
pub mod transform;

pub use error::{KubeError, Result};
pub use matcher::{AnyMatcher, ChartHookMatcher, ResourceMatchers, SelectorMatchers};
pub use order::{ResourceCategory, sort_for_output};
pub use output::{OutputTarget, marshal};
pub use resource::{Resource, ResourceMeta, parse_documents};
pub use scope::{Scope, scope_of};
pub use transform::{ManifestTransformer, TransformOptions};
