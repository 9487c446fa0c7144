//! Chart definition and loading
//!
//! A chart is a directory (or a `.tgz` archive of one) holding `Chart.yaml`,
//! optional `values.yaml`, `templates/`, subcharts below `charts/` and,
//! once its dependencies were built, a `Chart.lock`.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::archive;
use crate::error::{CoreError, Result};
use crate::values::Values;
use crate::version::VersionConstraint;

pub const CHART_FILE: &str = "Chart.yaml";
pub const LOCK_FILE: &str = "Chart.lock";
pub const VALUES_FILE: &str = "values.yaml";
pub const CHARTS_DIR: &str = "charts";
pub const TEMPLATES_DIR: &str = "templates";

/// Scheme marking a dependency that lives on the local filesystem
pub const FILE_SCHEME: &str = "file://";

/// Chart metadata (`Chart.yaml`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    pub name: String,

    #[serde(with = "version_serde")]
    pub version: Version,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    /// Kubernetes version constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_version: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
}

fn default_api_version() -> String {
    "v2".to_string()
}

impl ChartMetadata {
    /// `name version`, used to identify a chart in logs and errors
    pub fn display_name(&self) -> String {
        format!("{} {}", self.name, self.version)
    }
}

/// A dependency declared in `Chart.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub name: String,

    /// Version constraint (semver); empty means any
    #[serde(default)]
    pub version: String,

    /// `https://...`, `http://...`, `file://...` or `@alias`
    #[serde(default)]
    pub repository: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Dotted values path that enables the subchart when truthy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Dependency {
    /// Alias if set, otherwise name
    #[inline]
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn is_local(&self) -> bool {
        self.repository.starts_with(FILE_SCHEME)
    }

    pub fn is_remote(&self) -> bool {
        self.repository.starts_with("https://") || self.repository.starts_with("http://")
    }

    /// Directory of a `file://` dependency, relative to the declaring chart
    pub fn local_path(&self, chart_dir: &Path) -> Option<PathBuf> {
        let rel = self.repository.strip_prefix(FILE_SCHEME)?;
        Some(crate::config::absolute_path(Path::new(rel), chart_dir))
    }

    /// Whether `version` satisfies this dependency's constraint
    pub fn accepts(&self, version: &Version) -> bool {
        if self.version.trim().is_empty() {
            return true;
        }
        match VersionConstraint::parse(&self.version) {
            Ok(constraint) => constraint.matches(version),
            Err(_) => Version::parse(&self.version).is_ok_and(|v| &v == version),
        }
    }

    /// Evaluate the dependency condition against parent values
    pub fn is_enabled(&self, values: &Values) -> bool {
        let Some(condition) = self.condition.as_deref() else {
            return true;
        };
        // Helm accepts a comma separated list; the first existing path wins
        for path in condition.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if let Some(v) = values.get(path) {
                return truthy(v);
            }
        }
        true
    }
}

fn truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Null => false,
        serde_json::Value::String(s) => !s.is_empty() && s != "false" && s != "0",
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

/// `Chart.lock`: exact versions of the built dependencies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartLock {
    pub dependencies: Vec<LockedDependency>,

    /// Digest of the dependency declarations the lock was generated from
    pub digest: String,

    pub generated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedDependency {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub repository: String,
}

impl ChartLock {
    /// Lock `dependencies` resolved from `declared`
    pub fn new(declared: &[Dependency], dependencies: Vec<LockedDependency>) -> Self {
        Self {
            dependencies,
            digest: dependencies_digest(declared),
            generated: Utc::now(),
        }
    }

    /// Whether the lock was generated from exactly these declarations
    pub fn is_in_sync(&self, declared: &[Dependency]) -> bool {
        self.digest == dependencies_digest(declared)
    }

    pub fn get(&self, name: &str) -> Option<&LockedDependency> {
        self.dependencies.iter().find(|d| d.name == name)
    }

    pub fn save(&self, chart_dir: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(chart_dir.join(LOCK_FILE), content)?;
        Ok(())
    }
}

/// sha256 over the serialized dependency declarations
pub fn dependencies_digest(declared: &[Dependency]) -> String {
    let serialized = serde_json::to_vec(declared).unwrap_or_default();
    format!("sha256:{}", hex::encode(Sha256::digest(&serialized)))
}

/// A template file of a chart
#[derive(Debug, Clone)]
pub struct TemplateFile {
    /// Path relative to the chart root, `/`-separated (`templates/cm.yaml`)
    pub name: String,
    pub content: String,
}

/// A chart loaded into memory, including its subcharts
#[derive(Debug, Clone)]
pub struct LoadedChart {
    pub metadata: ChartMetadata,

    /// Default values from `values.yaml`
    pub values: Values,

    pub templates: Vec<TemplateFile>,

    /// Subcharts found below `charts/`
    pub dependencies: Vec<LoadedChart>,

    pub lock: Option<ChartLock>,

    /// Directory or archive the chart was loaded from
    pub source: PathBuf,
}

impl LoadedChart {
    /// Load a chart from a directory or a `.tgz` archive
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CoreError::ChartNotFound {
                path: path.display().to_string(),
            });
        }
        tracing::debug!(path = %path.display(), "loading chart");
        if path.is_dir() {
            Self::load_dir(path)
        } else {
            let bytes = std::fs::read(path)?;
            Self::load_archive(&bytes, path)
        }
    }

    /// Load a chart from a directory
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut files = BTreeMap::new();
        let walker = walkdir::WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() != 1 || e.file_name() != "tmpcharts");
        for entry in walker {
            let entry = entry.map_err(|e| CoreError::InvalidChart {
                path: dir.display().to_string(),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.insert(name, std::fs::read(entry.path())?);
        }
        Self::from_files(files, dir.to_path_buf())
    }

    /// Load a chart from archive bytes
    pub fn load_archive(bytes: &[u8], source: &Path) -> Result<Self> {
        let entries = archive::read_archive(bytes).map_err(|e| CoreError::InvalidChart {
            path: source.display().to_string(),
            message: e.to_string(),
        })?;

        // Strip the single top-level chart directory
        let mut files = BTreeMap::new();
        for (name, data) in entries {
            if let Some((_, rest)) = name.split_once('/') {
                files.insert(rest.to_string(), data);
            }
        }
        Self::from_files(files, source.to_path_buf())
    }

    fn from_files(mut files: BTreeMap<String, Vec<u8>>, source: PathBuf) -> Result<Self> {
        let invalid = |message: String| CoreError::InvalidChart {
            path: source.display().to_string(),
            message,
        };

        let chart_yaml = files
            .remove(CHART_FILE)
            .ok_or_else(|| CoreError::MissingMetadata {
                path: source.display().to_string(),
            })?;
        let metadata: ChartMetadata = serde_yaml::from_slice(&chart_yaml)
            .map_err(|e| invalid(format!("{}: {}", CHART_FILE, e)))?;
        if metadata.name.trim().is_empty() {
            return Err(invalid(format!("{}: name is empty", CHART_FILE)));
        }

        let values = match files.remove(VALUES_FILE) {
            Some(data) => Values::from_yaml(&String::from_utf8_lossy(&data))
                .map_err(|e| invalid(format!("{}: {}", VALUES_FILE, e)))?,
            None => Values::new(),
        };

        let lock = match files.remove(LOCK_FILE) {
            Some(data) => Some(
                serde_yaml::from_slice::<ChartLock>(&data)
                    .map_err(|e| invalid(format!("{}: {}", LOCK_FILE, e)))?,
            ),
            None => None,
        };

        let mut templates = Vec::new();
        let mut subchart_dirs: BTreeMap<String, BTreeMap<String, Vec<u8>>> = BTreeMap::new();
        let mut subchart_archives = Vec::new();

        for (name, data) in files {
            if name.starts_with("templates/") {
                let content = String::from_utf8(data)
                    .map_err(|_| invalid(format!("{} is not valid UTF-8", name)))?;
                templates.push(TemplateFile { name, content });
            } else if let Some(rest) = name.strip_prefix("charts/") {
                match rest.split_once('/') {
                    Some((dir, inner)) => {
                        subchart_dirs
                            .entry(dir.to_string())
                            .or_default()
                            .insert(inner.to_string(), data);
                    }
                    None if rest.ends_with(".tgz") || rest.ends_with(".tar.gz") => {
                        subchart_archives.push((rest.to_string(), data));
                    }
                    None => {}
                }
            }
        }

        let mut dependencies = Vec::new();
        for (dir, sub_files) in subchart_dirs {
            if dir.starts_with('.') || !sub_files.contains_key(CHART_FILE) {
                continue;
            }
            dependencies.push(Self::from_files(sub_files, source.join(CHARTS_DIR).join(&dir))?);
        }
        for (file, data) in subchart_archives {
            let sub_source = source.join(CHARTS_DIR).join(&file);
            dependencies.push(Self::load_archive(&data, &sub_source)?);
        }

        Ok(Self {
            metadata,
            values,
            templates,
            dependencies,
            lock,
            source,
        })
    }

    /// `name version` of this chart
    pub fn display_name(&self) -> String {
        self.metadata.display_name()
    }

    /// Declared dependencies without a matching subchart in `charts/`
    pub fn missing_dependencies(&self) -> Vec<String> {
        self.metadata
            .dependencies
            .iter()
            .filter(|dep| {
                !self
                    .dependencies
                    .iter()
                    .any(|sub| sub.metadata.name == dep.name && dep.accepts(&sub.metadata.version))
            })
            .map(|dep| {
                if dep.version.is_empty() {
                    dep.name.clone()
                } else {
                    format!("{} ({})", dep.name, dep.version)
                }
            })
            .collect()
    }

    /// Whether all declared dependencies are present in `charts/`
    pub fn dependencies_satisfied(&self) -> bool {
        self.missing_dependencies().is_empty()
    }

    /// Find the subchart for a declared dependency
    pub fn subchart(&self, dep: &Dependency) -> Option<&LoadedChart> {
        self.dependencies
            .iter()
            .find(|sub| sub.metadata.name == dep.name && dep.accepts(&sub.metadata.version))
    }
}

mod version_serde {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(version: &Version, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&version.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Version, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Version::parse(s.trim_start_matches('v')).map_err(serde::de::Error::custom)
    }
}
