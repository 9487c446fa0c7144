//! Renderer configuration document
//!
//! ```yaml
//! apiVersion: kinflate.dev/v1
//! kind: ChartRenderer
//! metadata:
//!   name: cert-manager
//! repository: https://charts.jetstack.io
//! chart: cert-manager
//! version: 1.14.4
//! namespace: cert-manager
//! valueFiles: [values/cert-manager.yaml]
//! values:
//!   installCRDs: true
//! exclude:
//! - kind: Secret
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::error::{CoreError, Result};

pub const CONFIG_API_VERSION: &str = "kinflate.dev/v1";
pub const CONFIG_KIND: &str = "ChartRenderer";

/// Kubernetes version assumed when none is configured
pub const DEFAULT_KUBE_VERSION: &str = "v1.31.0";

/// Maximum length of a release name
const MAX_RELEASE_NAME_LEN: usize = 53;

/// The configuration document read in plugin mode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorConfig {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(flatten)]
    pub chart: ChartConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
}

impl GeneratorConfig {
    /// Parse a configuration document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate the document envelope and the chart configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.api_version.is_empty() && self.api_version != CONFIG_API_VERSION {
            errors.push(format!(
                "unsupported apiVersion {:?}, expected {:?}",
                self.api_version, CONFIG_API_VERSION
            ));
        }
        if !self.kind.is_empty() && self.kind != CONFIG_KIND {
            errors.push(format!(
                "unsupported kind {:?}, expected {:?}",
                self.kind, CONFIG_KIND
            ));
        }
        errors.extend(self.chart.validate());
        errors
    }
}

/// Chart lookup and render configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    /// Repository URL or `@alias`; empty for local charts
    #[serde(default)]
    pub repository: String,

    /// Chart name, `alias/name` or local path
    #[serde(default)]
    pub chart: String,

    /// Exact version or semver range; empty means latest
    #[serde(default)]
    pub version: String,

    /// Verify digests of downloaded archives
    #[serde(default)]
    pub verify: bool,

    /// Release name; defaults to the chart name
    #[serde(default)]
    pub release_name: String,

    /// Release namespace
    #[serde(default)]
    pub namespace: String,

    /// Value files (local paths or URLs), applied in order
    #[serde(default)]
    pub value_files: Vec<String>,

    /// Inline values, applied after the value files
    #[serde(default)]
    pub values: serde_json::Map<String, serde_json::Value>,

    /// Resources to keep; empty keeps everything
    #[serde(default)]
    pub include: Vec<ResourceSelector>,

    /// Resources to drop
    #[serde(default)]
    pub exclude: Vec<ResourceSelector>,

    /// Namespace set on every namespaced (or unknown) resource
    #[serde(default)]
    pub force_namespace: String,

    /// Fail on cluster-scoped resources without a namespace
    #[serde(default)]
    pub namespaced_only: bool,

    /// Drop chart hooks from the output (default: true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_hooks: Option<bool>,

    #[serde(default)]
    pub kube_version: String,

    #[serde(default)]
    pub api_versions: Vec<String>,

    /// Directory relative paths are resolved against; defaults to the working directory
    #[serde(default)]
    pub base_dir: String,

    /// Local files must not escape this directory; defaults to the working directory
    #[serde(default)]
    pub root_dir: String,

    /// Accept repositories missing from the repository configuration
    #[serde(default)]
    pub trust_any_repository: Option<bool>,
}

impl ChartConfig {
    /// Validate the configuration, reporting every problem found
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.chart.trim().is_empty() {
            errors.push("chart not specified".to_string());
        }
        if !self.repository.is_empty() && self.chart.contains('/') {
            errors.push(format!(
                "chart {:?} must be a plain name when a repository is specified",
                self.chart
            ));
        }
        if self.repository.starts_with('@') && self.repository.len() == 1 {
            errors.push("repository alias is empty".to_string());
        }
        if self.release_name.len() > MAX_RELEASE_NAME_LEN {
            errors.push(format!(
                "releaseName {:?} is longer than {} characters",
                self.release_name, MAX_RELEASE_NAME_LEN
            ));
        }
        for (i, file) in self.value_files.iter().enumerate() {
            if file.trim().is_empty() {
                errors.push(format!("valueFiles[{}]: empty path", i));
            }
        }
        for (field, selectors) in [("include", &self.include), ("exclude", &self.exclude)] {
            for (i, selector) in selectors.iter().enumerate() {
                if let Err(e) = selector.validate() {
                    errors.push(format!("{}[{}]: {}", field, i, e));
                }
            }
        }
        if !self.kube_version.is_empty() && parse_kube_version(&self.kube_version).is_none() {
            errors.push(format!(
                "kubeVersion {:?} is not a valid version",
                self.kube_version
            ));
        }
        for (i, api) in self.api_versions.iter().enumerate() {
            if api.trim().is_empty() {
                errors.push(format!("apiVersions[{}]: empty", i));
            }
        }

        errors
    }

    /// Make `base_dir` and `root_dir` absolute, defaulting to `cwd`
    pub fn resolve_dirs(&mut self, cwd: &Path) {
        let base = if self.base_dir.is_empty() {
            cwd.to_path_buf()
        } else {
            absolute_path(Path::new(&self.base_dir), cwd)
        };
        let root = if self.root_dir.is_empty() {
            cwd.to_path_buf()
        } else {
            absolute_path(Path::new(&self.root_dir), cwd)
        };
        self.base_dir = base.to_string_lossy().into_owned();
        self.root_dir = root.to_string_lossy().into_owned();
    }

    /// Path of the chart when it refers to the local filesystem
    pub fn local_chart_path(&self) -> PathBuf {
        absolute_path(Path::new(&self.chart), Path::new(&self.base_dir))
    }

    /// Resolve a local value file and make sure it stays within the root directory
    pub fn value_file_path(&self, file: &str) -> Result<PathBuf> {
        let path = absolute_path(Path::new(file), Path::new(&self.base_dir));
        ensure_within(&path, Path::new(&self.root_dir))?;
        Ok(path)
    }

    /// Check every local value file against the root directory
    pub fn check_value_files(&self) -> Result<()> {
        for file in self.value_files.iter().filter(|f| !is_url(f)) {
            self.value_file_path(file)?;
        }
        Ok(())
    }

    /// Whether chart hooks are dropped from the output
    pub fn excludes_hooks(&self) -> bool {
        self.exclude_hooks.unwrap_or(true)
    }

    /// Kubernetes version to render against
    pub fn effective_kube_version(&self) -> &str {
        if self.kube_version.is_empty() {
            DEFAULT_KUBE_VERSION
        } else {
            &self.kube_version
        }
    }
}

/// Selects resources by identity; unset fields match anything.
///
/// Fields support `*` wildcards (e.g. `apiVersion: "apps/*"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSelector {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl ResourceSelector {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.api_version.is_empty()
            && self.kind.is_empty()
            && self.namespace.is_empty()
            && self.name.is_empty()
        {
            return Err(
                "selector must specify at least one of apiVersion, kind, namespace or name"
                    .to_string(),
            );
        }
        for field in [&self.api_version, &self.kind, &self.namespace, &self.name] {
            if field.chars().any(char::is_whitespace) {
                return Err(format!("selector field {:?} contains whitespace", field));
            }
        }
        Ok(())
    }

    /// Compile a field pattern; `None` matches anything
    pub fn pattern(field: &str) -> Option<Regex> {
        if field.is_empty() || field == "*" {
            return None;
        }
        let escaped = regex::escape(field).replace(r"\*", ".*");
        Regex::new(&format!("^{}$", escaped)).ok()
    }
}

impl std::fmt::Display for ResourceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        for (key, value) in [
            ("apiVersion", &self.api_version),
            ("kind", &self.kind),
            ("namespace", &self.namespace),
            ("name", &self.name),
        ] {
            if !value.is_empty() {
                parts.push(format!("{}={}", key, value));
            }
        }
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Whether a reference points at a remote location
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Parse `v1.28`, `1.28.3` or `v1.28.0-gke.1` into (major, minor)
pub fn parse_kube_version(version: &str) -> Option<(u64, u64)> {
    let version = version.trim().trim_start_matches('v');
    let mut parts = version.split(['.', '-', '+']);
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

/// Join `path` onto `base` (unless absolute) and normalize it lexically
pub fn absolute_path(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Fail unless `path` is `root` or below it, following symlinks where they exist
pub fn ensure_within(path: &Path, root: &Path) -> Result<()> {
    if resolve_existing(path).starts_with(resolve_existing(root)) {
        Ok(())
    } else {
        Err(CoreError::PathOutsideRoot {
            path: path.display().to_string(),
            root: root.display().to_string(),
        })
    }
}

/// Canonicalize the longest existing prefix of `path` and re-append the rest
fn resolve_existing(path: &Path) -> PathBuf {
    let mut rest = Vec::new();
    let mut current = path;
    loop {
        if let Ok(resolved) = current.canonicalize() {
            return rest.iter().rev().fold(resolved, |acc, part| acc.join(part));
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                current = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}
