//! kinflate repository handling and chart resolution
//!
//! This crate provides:
//!
//! - **Transport**: [`Getters`] dispatches URLs to [`Fetcher`]s by scheme
//!   (`http`, `https`, `file`)
//! - **Repositories**: the persisted `repositories.yaml` and its credentials,
//!   index caching and chart downloads ([`RepositoryManager`])
//! - **Dependencies**: building `charts/` and `Chart.lock` ([`DependencyBuilder`])
//! - **Resolution**: local, `alias/name` and remote charts ([`ChartResolver`])
//!
//! ## Security Notes
//!
//! - Credentials are never sent after cross-origin redirects
//! - Repositories missing from the configuration are rejected unless trusted
//!   explicitly

pub mod build;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fetch;
pub mod index;
pub mod manager;
pub mod resolver;

pub use build::DependencyBuilder;
pub use config::{Repository, RepositoryConfig, RepositorySettings};
pub use credentials::{Credentials, ResolvedCredentials};
pub use error::{RepoError, Result};
pub use fetch::{Fetcher, FileFetcher, Getters, HttpFetcher};
pub use index::{ChartVersion, RepositoryIndex};
pub use manager::{RepositoryEntry, RepositoryManager, is_version_range};
pub use resolver::{ChartResolver, ChartSource, MAX_DEPENDENCY_DEPTH};
