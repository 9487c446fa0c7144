//! Repository index (`index.yaml`)

use chrono::{DateTime, Utc};
use kinflate_core::VersionConstraint;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{RepoError, Result};

/// Repository index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default)]
    pub generated: Option<DateTime<Utc>>,

    /// Chart versions by chart name
    #[serde(default)]
    pub entries: HashMap<String, Vec<ChartVersion>>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl Default for RepositoryIndex {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            generated: None,
            entries: HashMap::new(),
        }
    }
}

impl RepositoryIndex {
    /// Parse index from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RepoError::IndexParseError {
            message: e.to_string(),
        })
    }

    /// Parse index from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| RepoError::IndexParseError {
            message: format!("invalid UTF-8: {}", e),
        })?;
        Self::from_yaml(yaml)
    }

    /// Load a cached index file
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Get all versions of a chart
    pub fn get(&self, name: &str) -> Option<&Vec<ChartVersion>> {
        self.entries.get(name)
    }

    /// Best version of a chart for a constraint.
    ///
    /// An empty constraint selects the latest stable version. An exact
    /// version string matches only that version.
    pub fn find(&self, name: &str, constraint: &str) -> Option<&ChartVersion> {
        let versions = self.entries.get(name)?;
        let constraint = constraint.trim();

        if constraint.is_empty() {
            return versions
                .iter()
                .filter_map(|e| e.parsed_version().map(|v| (v, e)))
                .filter(|(v, _)| v.pre.is_empty())
                .max_by(|(a, _), (b, _)| a.cmp(b))
                .map(|(_, e)| e);
        }

        if let Some(exact) = versions.iter().find(|e| e.version == constraint) {
            return Some(exact);
        }

        if !crate::manager::is_version_range(constraint) {
            let exact = Version::parse(constraint).ok()?;
            return versions
                .iter()
                .find(|e| e.parsed_version().as_ref() == Some(&exact));
        }

        let req = VersionConstraint::parse(constraint).ok()?;
        versions
            .iter()
            .filter_map(|e| e.parsed_version().map(|v| (v, e)))
            .filter(|(v, _)| req.matches(v))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, e)| e)
    }

    /// List all chart names
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }
}

/// A chart version listed in the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartVersion {
    pub name: String,

    pub version: String,

    #[serde(default)]
    pub app_version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Archive URLs, absolute or relative to the repository URL
    #[serde(default)]
    pub urls: Vec<String>,

    /// SHA256 digest of the archive
    #[serde(default)]
    pub digest: Option<String>,

    #[serde(default)]
    pub created: Option<DateTime<Utc>>,

    #[serde(default)]
    pub deprecated: bool,
}

impl ChartVersion {
    /// Get the primary download URL
    pub fn download_url(&self) -> Option<&str> {
        self.urls.first().map(|s| s.as_str())
    }

    /// Parse version as semver
    pub fn parsed_version(&self) -> Option<Version> {
        Version::parse(self.version.trim_start_matches('v')).ok()
    }
}

/// Resolve an archive URL listed in an index against the repository URL
pub fn resolve_chart_url(repo_url: &str, chart_url: &str) -> Result<String> {
    if chart_url.contains("://") {
        return Ok(chart_url.to_string());
    }
    let base = url::Url::parse(&format!("{}/", repo_url.trim_end_matches('/')))?;
    Ok(base.join(chart_url)?.to_string())
}
