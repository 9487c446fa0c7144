//! Repository Manager
//!
//! Holds the repositories a single resolution needs, keyed by URL, with
//! their credentials and cached index locations.

use indexmap::IndexMap;
use kinflate_core::VersionConstraint;
use semver::Version;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{RepositoryConfig, RepositorySettings, index_url, normalize_url, validate_url};
use crate::credentials::{Credentials, ResolvedCredentials, same_origin};
use crate::error::{RepoError, Result};
use crate::fetch::Getters;
use crate::index::{ChartVersion, RepositoryIndex, resolve_chart_url};

/// A repository taking part in a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryEntry {
    /// Configured name, or the URL for ad-hoc repositories
    pub name: String,
    pub url: String,
    pub credentials: Option<Credentials>,
    pub index_path: PathBuf,
}

impl RepositoryEntry {
    fn resolved_credentials(&self) -> Result<Option<ResolvedCredentials>> {
        self.credentials.as_ref().map(Credentials::resolve).transpose()
    }
}

/// Working set of repositories for one request
#[derive(Debug, Clone)]
pub struct RepositoryManager {
    settings: RepositorySettings,
    getters: Getters,
    entries: IndexMap<String, RepositoryEntry>,
}

impl RepositoryManager {
    /// Build the working set for `urls`.
    ///
    /// `@name` references are looked up in the persisted configuration. Plain
    /// URLs pick up the credentials of a configured repository with the same
    /// URL; unknown URLs are rejected unless `trust_any` is set. Entries are
    /// deduplicated by URL.
    pub fn resolve<'a>(
        urls: impl IntoIterator<Item = &'a str>,
        trust_any: bool,
        settings: &RepositorySettings,
        getters: &Getters,
    ) -> Result<Self> {
        let config = RepositoryConfig::load_from(&settings.config_path)?;
        let mut entries = IndexMap::new();

        for reference in urls {
            let (name, url, credentials) = if let Some(alias) = reference.strip_prefix('@') {
                let repo = config
                    .get(alias)
                    .ok_or_else(|| RepoError::RepositoryNotFound {
                        name: alias.to_string(),
                    })?;
                (repo.name.clone(), repo.url.clone(), repo.credentials.clone())
            } else {
                validate_url(reference)?;
                match config.get_by_url(reference) {
                    Some(repo) => (repo.name.clone(), repo.url.clone(), repo.credentials.clone()),
                    None if trust_any => (reference.to_string(), reference.to_string(), None),
                    None => {
                        return Err(RepoError::UntrustedRepository {
                            url: reference.to_string(),
                        });
                    }
                }
            };

            let key = normalize_url(&url);
            entries.entry(key).or_insert_with(|| RepositoryEntry {
                name,
                index_path: settings.index_path(&url),
                url,
                credentials,
            });
        }

        Ok(Self {
            settings: settings.clone(),
            getters: getters.clone(),
            entries,
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = &RepositoryEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn settings(&self) -> &RepositorySettings {
        &self.settings
    }

    pub fn getters(&self) -> &Getters {
        &self.getters
    }

    /// Look up an entry by `@name` or URL
    pub fn entry(&self, reference: &str) -> Result<&RepositoryEntry> {
        let found = match reference.strip_prefix('@') {
            Some(alias) => self.entries.values().find(|e| e.name == alias),
            None => self.entries.get(&normalize_url(reference)),
        };
        found.ok_or_else(|| RepoError::RepositoryNotFound {
            name: reference.to_string(),
        })
    }

    /// Refresh every cached index.
    ///
    /// A failing repository does not stop the others; the first error is
    /// returned after all repositories were tried.
    pub async fn update_index(&self) -> Result<()> {
        let mut first_error = None;
        for entry in self.entries.values() {
            if let Err(e) = self.download_index(entry).await {
                warn!(repository = %entry.url, "failed to update index: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Download indices that are not cached yet
    pub async fn download_index_if_missing(&self) -> Result<()> {
        for entry in self.entries.values() {
            if entry.index_path.exists() {
                debug!(repository = %entry.url, "using cached index");
                continue;
            }
            self.download_index(entry).await?;
        }
        Ok(())
    }

    async fn download_index(&self, entry: &RepositoryEntry) -> Result<()> {
        let url = index_url(&entry.url);
        info!(repository = %entry.name, "downloading index {}", url);
        let credentials = entry.resolved_credentials()?;
        let bytes = self.getters.get(&url, credentials.as_ref()).await?;
        RepositoryIndex::from_bytes(&bytes)?;
        write_atomic(&entry.index_path, &bytes)
    }

    /// Read the cached index of an entry
    pub fn load_index(&self, entry: &RepositoryEntry) -> Result<RepositoryIndex> {
        if !entry.index_path.exists() {
            return Err(RepoError::IndexNotFound {
                url: entry.url.clone(),
            });
        }
        RepositoryIndex::load(&entry.index_path)
    }

    /// Find a chart version in the cached index of a repository
    pub fn find_chart(
        &self,
        repository: &str,
        name: &str,
        version: &str,
    ) -> Result<(&RepositoryEntry, ChartVersion)> {
        let entry = self.entry(repository)?;
        let index = self.load_index(entry)?;
        let chart = index
            .find(name, version)
            .cloned()
            .ok_or_else(|| RepoError::EntryNotFound {
                chart: name.to_string(),
                version: version.to_string(),
                repository: entry.url.clone(),
            })?;
        Ok((entry, chart))
    }

    /// Download a chart archive, checking its digest when the index has one
    pub async fn download_chart(
        &self,
        entry: &RepositoryEntry,
        chart: &ChartVersion,
        verify: bool,
    ) -> Result<Vec<u8>> {
        let url = chart
            .download_url()
            .ok_or_else(|| RepoError::EntryNotFound {
                chart: chart.name.clone(),
                version: chart.version.clone(),
                repository: entry.url.clone(),
            })?;
        let url = resolve_chart_url(&entry.url, url)?;

        let credentials = if same_origin(&entry.url, &url) {
            entry.resolved_credentials()?
        } else {
            None
        };
        debug!(chart = %chart.name, version = %chart.version, "downloading {}", url);
        let data = self.getters.get(&url, credentials.as_ref()).await?;

        match &chart.digest {
            Some(expected) => {
                let actual = compute_digest(&data);
                if !digest_matches(expected, &actual) {
                    return Err(RepoError::IntegrityCheckFailed {
                        name: format!("{}-{}", chart.name, chart.version),
                        expected: expected.clone(),
                        actual,
                    });
                }
            }
            None if verify => {
                return Err(RepoError::MissingDigest {
                    name: format!("{}-{}", chart.name, chart.version),
                });
            }
            None => {}
        }
        Ok(data)
    }

    /// Path of a local archive for a remote chart, downloading it if needed.
    ///
    /// An exact version that is already cached is used without contacting
    /// the repository.
    pub async fn locate_chart(
        &self,
        repository: &str,
        name: &str,
        version: &str,
        verify: bool,
    ) -> Result<PathBuf> {
        let cache_dir = self.settings.chart_cache_dir();
        if !is_version_range(version) {
            let cached = cache_dir.join(format!("{}-{}.tgz", name, version));
            if cached.exists() {
                debug!(chart = %name, %version, "using cached chart {}", cached.display());
                return Ok(cached);
            }
        }

        self.download_index_if_missing().await?;
        let (entry, chart) = self.find_chart(repository, name, version)?;
        let data = self.download_chart(entry, &chart, verify).await?;

        let path = cache_dir.join(format!("{}-{}.tgz", chart.name, chart.version));
        write_atomic(&path, &data)?;
        info!(chart = %name, version = %chart.version, "downloaded chart to {}", path.display());
        Ok(path)
    }
}

/// Whether a version constraint may match more than one version.
///
/// Only a plain exact version (`1.2.3`, `1.2.3-rc.1`) is not a range;
/// anything unparseable counts as a range.
pub fn is_version_range(version: &str) -> bool {
    let version = version.trim();
    if version.is_empty() || VersionConstraint::parse(version).is_err() {
        return true;
    }
    Version::parse(version).is_err()
}

/// Compute SHA256 digest of data
fn compute_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Check if two digests match (supports various formats)
fn digest_matches(expected: &str, actual: &str) -> bool {
    let normalize = |d: &str| {
        d.trim()
            .to_lowercase()
            .replace("sha256:", "")
            .replace("sha256-", "")
    };
    normalize(expected) == normalize(actual)
}

/// Write through a temporary file so readers never see partial content
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
