//! Repository configuration management
//!
//! Repositories are stored in `<config dir>/kinflate/repositories.yaml`.
//! Where that file and the index cache live is carried by
//! [`RepositorySettings`], passed explicitly to every operation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::credentials::Credentials;
use crate::error::{RepoError, Result};

/// Environment variable overriding the repository configuration path
pub const REPOSITORY_CONFIG_ENV: &str = "KINFLATE_REPOSITORY_CONFIG";
/// Environment variable overriding the repository cache directory
pub const REPOSITORY_CACHE_ENV: &str = "KINFLATE_REPOSITORY_CACHE";

/// Locations used by repository operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySettings {
    /// Path of `repositories.yaml`
    pub config_path: PathBuf,
    /// Directory holding cached indices and chart archives
    pub cache_dir: PathBuf,
}

impl RepositorySettings {
    pub fn new(config_path: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Settings from the environment, falling back to the user directories
    pub fn from_env() -> Result<Self> {
        let config_path = match std::env::var_os(REPOSITORY_CONFIG_ENV) {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => dirs::config_dir()
                .ok_or_else(|| RepoError::InvalidConfig {
                    message: "could not determine config directory".to_string(),
                })?
                .join("kinflate")
                .join("repositories.yaml"),
        };
        let cache_dir = match std::env::var_os(REPOSITORY_CACHE_ENV) {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => dirs::cache_dir()
                .ok_or_else(|| RepoError::InvalidConfig {
                    message: "could not determine cache directory".to_string(),
                })?
                .join("kinflate")
                .join("repository"),
        };
        Ok(Self {
            config_path,
            cache_dir,
        })
    }

    /// Cached index file of a repository URL
    pub fn index_path(&self, url: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(normalize_url(url).as_bytes()));
        self.cache_dir.join(format!("{}-index.yaml", &digest[..16]))
    }

    /// Directory of downloaded chart archives
    pub fn chart_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("charts")
    }
}

/// Repository configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default)]
    pub repositories: Vec<Repository>,
}

fn default_api_version() -> String {
    "kinflate.dev/v1".to_string()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            repositories: Vec::new(),
        }
    }
}

impl RepositoryConfig {
    /// Load configuration; a missing file yields an empty configuration
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration; readable by the owner only since it may hold credentials
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut options = std::fs::OpenOptions::new();
            options.write(true).create(true).truncate(true).mode(0o600);
            std::io::Write::write_all(&mut options.open(path)?, content.as_bytes())?;
            Ok(())
        }

        #[cfg(not(unix))]
        {
            std::fs::write(path, content)?;
            Ok(())
        }
    }

    /// Get a repository by name
    pub fn get(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Get a repository by URL, ignoring a trailing slash
    pub fn get_by_url(&self, url: &str) -> Option<&Repository> {
        let url = normalize_url(url);
        self.repositories
            .iter()
            .find(|r| normalize_url(&r.url) == url)
    }

    /// Add a repository
    pub fn add(&mut self, repo: Repository) -> Result<()> {
        if self.get(&repo.name).is_some() {
            return Err(RepoError::RepositoryAlreadyExists {
                name: repo.name.clone(),
            });
        }
        self.repositories.push(repo);
        Ok(())
    }

    /// Remove a repository by name
    pub fn remove(&mut self, name: &str) -> Result<Repository> {
        let idx = self
            .repositories
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| RepoError::RepositoryNotFound {
                name: name.to_string(),
            })?;
        Ok(self.repositories.remove(idx))
    }
}

/// Repository definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Unique name, referenced as `@name`
    pub name: String,

    /// Repository URL
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

impl Repository {
    /// Create a repository; the URL must be HTTP(S)
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let url = url.into();
        if name.is_empty() || name.contains('/') {
            return Err(RepoError::InvalidConfig {
                message: format!("invalid repository name {:?}", name),
            });
        }
        validate_url(&url)?;
        Ok(Self {
            name,
            url,
            credentials: None,
        })
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// URL of the repository index
    pub fn index_url(&self) -> String {
        index_url(&self.url)
    }
}

/// Repository URL without trailing slashes
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// `<url>/index.yaml`
pub fn index_url(url: &str) -> String {
    format!("{}/index.yaml", normalize_url(url))
}

/// Accept only absolute HTTP(S) URLs
pub fn validate_url(url: &str) -> Result<()> {
    let parsed = url::Url::parse(url).map_err(|e| RepoError::InvalidRepositoryUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(RepoError::InvalidRepositoryUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme {:?}, expected http or https", other),
        }),
    }
}
