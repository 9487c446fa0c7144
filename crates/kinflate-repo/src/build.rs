//! Dependency building
//!
//! Materializes the declared dependencies of a chart as archives below its
//! `charts/` directory and records the resolved versions in `Chart.lock`.
//! Local (`file://`) dependencies are packed from their source directory,
//! remote ones are fetched through the [`RepositoryManager`].

use kinflate_core::chart::{CHARTS_DIR, LOCK_FILE};
use kinflate_core::{ChartLock, Dependency, LoadedChart, LockedDependency, archive};
use semver::Version;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{RepoError, Result};
use crate::manager::RepositoryManager;

/// Staging directory, swapped into `charts/` once every archive is in place
const TMP_CHARTS_DIR: &str = "tmpcharts";

/// Builds the `charts/` directory of a chart
pub struct DependencyBuilder<'a> {
    repos: &'a RepositoryManager,
    verify: bool,
}

impl<'a> DependencyBuilder<'a> {
    pub fn new(repos: &'a RepositoryManager, verify: bool) -> Self {
        Self { repos, verify }
    }

    /// Download or pack every dependency of `chart` into `chart_dir/charts`.
    ///
    /// A `Chart.lock` in sync with the declarations pins the remote versions;
    /// one out of sync is an error. Without a lock the versions are resolved
    /// against the cached indices and a new lock is written.
    pub async fn build(&self, chart: &LoadedChart, chart_dir: &Path) -> Result<()> {
        let declared = &chart.metadata.dependencies;
        let tmp_dir = chart_dir.join(TMP_CHARTS_DIR);
        remove_dir_if_exists(&tmp_dir)?;

        let lock = match &chart.lock {
            Some(lock) if lock.is_in_sync(declared) => Some(lock),
            Some(_) => {
                return Err(RepoError::LockFileOutdated {
                    chart: chart.display_name(),
                });
            }
            None => None,
        };

        std::fs::create_dir_all(&tmp_dir)?;
        let result = self.fetch_all(declared, lock, chart_dir, &tmp_dir).await;
        let resolved = match result {
            Ok(resolved) => resolved,
            Err(e) => {
                remove_dir_if_exists(&tmp_dir)?;
                return Err(e);
            }
        };

        replace_archives(chart_dir, &tmp_dir, declared)?;

        let changed = lock.is_none_or(|l| l.dependencies != resolved);
        if changed {
            debug!(chart = %chart.display_name(), "writing {}", LOCK_FILE);
            ChartLock::new(declared, resolved).save(chart_dir)?;
        }
        Ok(())
    }

    async fn fetch_all(
        &self,
        declared: &[Dependency],
        lock: Option<&ChartLock>,
        chart_dir: &Path,
        tmp_dir: &Path,
    ) -> Result<Vec<LockedDependency>> {
        let mut resolved = Vec::with_capacity(declared.len());

        for (i, dep) in declared.iter().enumerate() {
            let locked = lock.and_then(|l| l.dependencies.get(i));

            if let Some(path) = dep.local_path(chart_dir) {
                let version = self.pack_local(dep, &path, tmp_dir)?;
                resolved.push(LockedDependency {
                    name: dep.name.clone(),
                    version: version.to_string(),
                    repository: dep.repository.clone(),
                });
            } else if is_repository_reference(&dep.repository) {
                let version = match locked {
                    Some(l) => l.version.clone(),
                    None => {
                        let (_, found) =
                            self.repos
                                .find_chart(&dep.repository, &dep.name, &dep.version)?;
                        found.version
                    }
                };
                let cached = self
                    .repos
                    .locate_chart(&dep.repository, &dep.name, &version, self.verify)
                    .await?;
                let target = tmp_dir.join(archive_name(&dep.name, &version));
                std::fs::copy(&cached, &target)?;
                info!(dependency = %dep.name, version = %version, "fetched {}", dep.repository);
                resolved.push(LockedDependency {
                    name: dep.name.clone(),
                    version,
                    repository: dep.repository.clone(),
                });
            } else {
                // vendored below charts/ by the chart author
                resolved.push(LockedDependency {
                    name: dep.name.clone(),
                    version: dep.version.clone(),
                    repository: String::new(),
                });
            }
        }

        Ok(resolved)
    }

    fn pack_local(&self, dep: &Dependency, path: &Path, tmp_dir: &Path) -> Result<Version> {
        let sub = LoadedChart::load_dir(path).map_err(|e| {
            RepoError::chart(
                format!("load dependency {} from {}", dep.name, path.display()),
                e,
            )
        })?;
        let version = sub.metadata.version.clone();
        if !dep.accepts(&version) {
            return Err(RepoError::LocalDependencyMismatch {
                name: dep.name.clone(),
                constraint: dep.version.clone(),
                path: path.display().to_string(),
                version: version.to_string(),
            });
        }

        let bytes = archive::pack_directory(path, &sub.metadata.name)?;
        let target = tmp_dir.join(archive_name(&sub.metadata.name, &version.to_string()));
        std::fs::write(&target, bytes)?;
        debug!(dependency = %dep.name, version = %version, "packed {}", path.display());
        Ok(version)
    }
}

/// Whether a dependency repository is served through an index
pub fn is_repository_reference(repository: &str) -> bool {
    repository.starts_with("https://")
        || repository.starts_with("http://")
        || (repository.starts_with('@') && repository.len() > 1)
}

fn archive_name(name: &str, version: &str) -> String {
    format!("{}-{}.tgz", name, version)
}

/// `<name>-<semver>.tgz`
fn is_archive_of(file_name: &str, name: &str) -> bool {
    file_name
        .strip_suffix(".tgz")
        .and_then(|stem| stem.strip_prefix(name))
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|version| Version::parse(version).is_ok())
}

/// Drop previous archives of the built dependencies and move the staged ones in
fn replace_archives(chart_dir: &Path, tmp_dir: &Path, declared: &[Dependency]) -> Result<()> {
    let charts_dir = chart_dir.join(CHARTS_DIR);
    std::fs::create_dir_all(&charts_dir)?;

    let staged: Vec<PathBuf> = std::fs::read_dir(tmp_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;

    for entry in std::fs::read_dir(&charts_dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file() && declared.iter().any(|d| is_archive_of(file_name, &d.name)) {
            std::fs::remove_file(&path)?;
        }
    }

    for path in staged {
        if let Some(file_name) = path.file_name() {
            std::fs::rename(&path, charts_dir.join(file_name))?;
        }
    }
    remove_dir_if_exists(tmp_dir)
}

fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
