//! Chart Resolver
//!
//! Turns a [`ChartConfig`] into a [`LoadedChart`] whose dependencies are
//! materialized on disk:
//!
//! - a chart found below the base directory is loaded locally, its `file://`
//!   dependency tree is walked and every chart in it gets its dependencies
//!   built;
//! - `alias/name` refers to chart `name` in the configured repository `alias`;
//! - anything else with a repository is fetched from that repository.

use kinflate_core::{ChartConfig, Dependency, LoadedChart};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::build::{DependencyBuilder, is_repository_reference};
use crate::config::RepositorySettings;
use crate::error::{RepoError, Result};
use crate::fetch::Getters;
use crate::manager::{RepositoryManager, is_version_range};

/// Maximum nesting of local chart dependencies
pub const MAX_DEPENDENCY_DEPTH: usize = 20;

/// Where a chart comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartSource {
    /// Chart directory or archive on the local filesystem
    Local(PathBuf),
    /// Chart served by a repository (URL or `@alias`)
    Remote {
        repository: String,
        name: String,
        version: String,
    },
}

impl ChartSource {
    /// Classify the chart reference of a configuration
    pub fn classify(cfg: &ChartConfig) -> Result<Self> {
        if cfg.chart.is_empty() {
            return Err(RepoError::InvalidConfig {
                message: "no chart specified".to_string(),
            });
        }

        if !cfg.repository.is_empty() {
            return Ok(ChartSource::Remote {
                repository: cfg.repository.clone(),
                name: cfg.chart.clone(),
                version: cfg.version.clone(),
            });
        }

        let local = cfg.local_chart_path();
        if local.exists() {
            return Ok(ChartSource::Local(local));
        }

        match cfg.chart.split('/').collect::<Vec<_>>().as_slice() {
            [alias, name]
                if !alias.is_empty() && !name.is_empty() && *alias != "." && *alias != ".." =>
            {
                Ok(ChartSource::Remote {
                    repository: format!("@{}", alias),
                    name: name.to_string(),
                    version: cfg.version.clone(),
                })
            }
            _ => Err(RepoError::ChartNotFound {
                path: cfg.chart.clone(),
            }),
        }
    }
}

/// A chart of the local dependency tree
#[derive(Debug)]
struct LocalChart {
    chart: LoadedChart,
    path: PathBuf,
    has_local_dependencies: bool,
}

/// Resolves chart references to loaded charts
#[derive(Debug, Clone)]
pub struct ChartResolver {
    settings: RepositorySettings,
    getters: Getters,
    trust_any_repository: bool,
}

impl ChartResolver {
    pub fn new(settings: RepositorySettings, getters: Getters) -> Self {
        Self {
            settings,
            getters,
            trust_any_repository: false,
        }
    }

    /// Default for configurations that do not set `trustAnyRepository`
    pub fn trust_any_repository(mut self, trust: bool) -> Self {
        self.trust_any_repository = trust;
        self
    }

    pub fn getters(&self) -> &Getters {
        &self.getters
    }

    /// Load the configured chart, building its dependencies where needed
    pub async fn resolve(&self, cfg: &ChartConfig) -> Result<LoadedChart> {
        let trust = cfg.trust_any_repository.unwrap_or(self.trust_any_repository);
        match ChartSource::classify(cfg)? {
            ChartSource::Local(path) => self.build_and_load_local(&path, cfg, trust).await,
            ChartSource::Remote {
                repository,
                name,
                version,
            } => {
                self.load_remote(&repository, &name, &version, cfg.verify, trust)
                    .await
            }
        }
    }

    async fn load_remote(
        &self,
        repository: &str,
        name: &str,
        version: &str,
        verify: bool,
        trust: bool,
    ) -> Result<LoadedChart> {
        let repos = RepositoryManager::resolve([repository], trust, &self.settings, &self.getters)?;
        if is_version_range(version) {
            repos.update_index().await?;
        }
        let path = repos.locate_chart(repository, name, version, verify).await?;
        LoadedChart::load(&path)
            .map_err(|e| RepoError::chart(format!("load chart {}", path.display()), e))
    }

    async fn build_and_load_local(
        &self,
        path: &Path,
        cfg: &ChartConfig,
        trust: bool,
    ) -> Result<LoadedChart> {
        let chart = LoadedChart::load(path)
            .map_err(|e| RepoError::chart(format!("load chart {}", path.display()), e))?;

        let mut local_charts = Vec::new();
        let mut remote_dependencies = Vec::new();
        let needs_index_update = collect_charts(
            chart,
            path.to_path_buf(),
            &mut local_charts,
            &mut remote_dependencies,
            0,
        )?;

        let repos = RepositoryManager::resolve(
            remote_dependencies.iter().map(|d| d.repository.as_str()),
            trust,
            &self.settings,
            &self.getters,
        )?;
        if needs_index_update {
            repos.update_index().await?;
        } else {
            repos.download_index_if_missing().await?;
        }

        let needs_reload = self.build_local_charts(&local_charts, &repos, cfg.verify).await?;
        if needs_reload {
            return LoadedChart::load(path).map_err(|e| RepoError::Reload {
                chart: cfg.chart.clone(),
                source: e,
            });
        }

        // the requested chart is appended last
        local_charts
            .pop()
            .map(|lc| lc.chart)
            .ok_or_else(|| RepoError::ChartNotFound {
                path: path.display().to_string(),
            })
    }

    async fn build_local_charts(
        &self,
        local_charts: &[LocalChart],
        repos: &RepositoryManager,
        verify: bool,
    ) -> Result<bool> {
        let mut needs_reload = false;
        for lc in local_charts {
            if lc.chart.dependencies_satisfied() && !lc.has_local_dependencies {
                debug!(chart = %lc.chart.display_name(), "dependencies satisfied");
                continue;
            }
            needs_reload = true;
            let name = lc.chart.display_name();
            info!("building/fetching chart {} dependencies", name);
            build_chart_dependencies(lc, repos, verify)
                .await
                .map_err(|e| RepoError::Build {
                    chart: name,
                    source: Box::new(e),
                })?;
        }
        Ok(needs_reload)
    }
}

/// Build once; on a missing index entry refresh the indices and build again
async fn build_chart_dependencies(
    lc: &LocalChart,
    repos: &RepositoryManager,
    verify: bool,
) -> Result<()> {
    let builder = DependencyBuilder::new(repos, verify);
    match builder.build(&lc.chart, &lc.path).await {
        Err(e) if e.is_entry_not_found() => {
            info!(chart = %lc.chart.display_name(), "{}; updating repository indices", e);
            repos.update_index().await?;
            builder.build(&lc.chart, &lc.path).await
        }
        other => other,
    }
}

/// Walk the local dependency tree depth first.
///
/// Every chart is appended to `local_charts` after its local dependencies;
/// remote dependencies are collected into `remote`. Returns whether a chart
/// declares remote dependencies without a lock, which requires fresh indices.
fn collect_charts(
    chart: LoadedChart,
    path: PathBuf,
    local_charts: &mut Vec<LocalChart>,
    remote: &mut Vec<Dependency>,
    depth: usize,
) -> Result<bool> {
    if depth > MAX_DEPENDENCY_DEPTH {
        return Err(RepoError::DependencyDepthExceeded {
            max: MAX_DEPENDENCY_DEPTH,
        });
    }

    let name = chart.display_name();
    let mut needs_index_update = false;
    let mut has_local_dependencies = false;

    for dep in &chart.metadata.dependencies {
        if let Some(dep_path) = dep.local_path(&path) {
            has_local_dependencies = true;
            let dep_chart = LoadedChart::load_dir(&dep_path).map_err(|e| {
                RepoError::chart(
                    format!(
                        "load chart {} dependency {} from dir {}",
                        name,
                        dep.name,
                        dep_path.display()
                    ),
                    e,
                )
            })?;
            if collect_charts(dep_chart, dep_path, local_charts, remote, depth + 1)? {
                needs_index_update = true;
            }
        } else if is_repository_reference(&dep.repository) {
            remote.push(dep.clone());
            if chart.lock.is_none() {
                needs_index_update = true;
            }
        }
    }

    local_charts.push(LocalChart {
        chart,
        path,
        has_local_dependencies,
    });
    Ok(needs_index_update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Repository, RepositoryConfig};
    use kinflate_core::{ChartLock, LockedDependency, archive};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_chart(dir: &Path, name: &str, version: &str, deps: &str) {
        std::fs::create_dir_all(dir.join("templates")).unwrap();
        std::fs::write(
            dir.join("Chart.yaml"),
            format!("apiVersion: v2\nname: {}\nversion: {}\n{}", name, version, deps),
        )
        .unwrap();
        std::fs::write(
            dir.join("templates/cm.yaml"),
            format!("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {}\n", name),
        )
        .unwrap();
    }

    fn packed_chart(tmp: &TempDir, name: &str, version: &str) -> Vec<u8> {
        let dir = tmp.path().join("src").join(format!("{}-{}", name, version));
        write_chart(&dir, name, version, "");
        archive::pack_directory(&dir, name).unwrap()
    }

    fn resolver(tmp: &TempDir) -> ChartResolver {
        ChartResolver::new(
            RepositorySettings::new(
                tmp.path().join("repositories.yaml"),
                tmp.path().join("cache"),
            ),
            Getters::new().unwrap(),
        )
    }

    fn config(tmp: &TempDir, chart: &str) -> ChartConfig {
        ChartConfig {
            chart: chart.to_string(),
            base_dir: tmp.path().display().to_string(),
            root_dir: tmp.path().display().to_string(),
            ..Default::default()
        }
    }

    fn index_yaml(versions: &[&str]) -> String {
        let mut yaml = "apiVersion: v1\nentries:\n  redis:\n".to_string();
        for v in versions {
            yaml.push_str(&format!(
                "    - name: redis\n      version: {v}\n      urls: [charts/redis-{v}.tgz]\n"
            ));
        }
        yaml
    }

    #[test]
    fn test_classify() {
        let tmp = TempDir::new().unwrap();
        write_chart(&tmp.path().join("app"), "app", "1.0.0", "");

        assert_eq!(
            ChartSource::classify(&config(&tmp, "app")).unwrap(),
            ChartSource::Local(tmp.path().join("app"))
        );
        assert_eq!(
            ChartSource::classify(&config(&tmp, "stable/redis")).unwrap(),
            ChartSource::Remote {
                repository: "@stable".into(),
                name: "redis".into(),
                version: String::new(),
            }
        );

        let mut remote = config(&tmp, "app");
        remote.repository = "https://charts.example.com".into();
        remote.version = "1.0.0".into();
        assert!(matches!(
            ChartSource::classify(&remote).unwrap(),
            ChartSource::Remote { .. }
        ));

        for missing in ["missing", "./missing", "../missing", "a/b/c", "/redis"] {
            assert!(
                matches!(
                    ChartSource::classify(&config(&tmp, missing)),
                    Err(RepoError::ChartNotFound { .. })
                ),
                "{missing}"
            );
        }
    }

    #[tokio::test]
    async fn test_cyclic_dependency_hits_depth_limit() {
        let tmp = TempDir::new().unwrap();
        write_chart(
            &tmp.path().join("loop"),
            "loop",
            "1.0.0",
            "dependencies:\n- name: loop\n  repository: file://.\n",
        );

        let err = resolver(&tmp)
            .resolve(&config(&tmp, "loop"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::DependencyDepthExceeded { max: 20 }));
        assert!(err.to_string().contains("cyclic dependency"));
    }

    #[test]
    fn test_collect_depth_boundary() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("leaf");
        write_chart(&dir, "leaf", "1.0.0", "");
        let chart = LoadedChart::load(&dir).unwrap();

        let (mut charts, mut remote) = (Vec::new(), Vec::new());
        assert!(!collect_charts(chart.clone(), dir.clone(), &mut charts, &mut remote, 20).unwrap());
        assert!(matches!(
            collect_charts(chart, dir, &mut charts, &mut remote, 21),
            Err(RepoError::DependencyDepthExceeded { .. })
        ));
    }

    #[test]
    fn test_collect_remote_without_lock_needs_update() {
        let tmp = TempDir::new().unwrap();
        write_chart(
            &tmp.path().join("lib"),
            "lib",
            "0.1.0",
            "dependencies:\n- name: redis\n  version: ^1.0.0\n  repository: https://charts.example.com\n",
        );
        let app = tmp.path().join("app");
        write_chart(
            &app,
            "app",
            "1.0.0",
            "dependencies:\n- name: lib\n  repository: file://../lib\n",
        );

        let (mut charts, mut remote) = (Vec::new(), Vec::new());
        let needs_update =
            collect_charts(LoadedChart::load(&app).unwrap(), app, &mut charts, &mut remote, 0)
                .unwrap();
        assert!(needs_update);
        assert_eq!(remote.len(), 1);
        let names: Vec<_> = charts.iter().map(|c| c.chart.metadata.name.as_str()).collect();
        assert_eq!(names, ["lib", "app"]);
        assert!(charts[1].has_local_dependencies);
        assert!(!charts[0].has_local_dependencies);
    }

    #[tokio::test]
    async fn test_resolve_local_builds_nested_dependencies() {
        let tmp = TempDir::new().unwrap();
        write_chart(&tmp.path().join("base"), "base", "0.2.0", "");
        write_chart(
            &tmp.path().join("lib"),
            "lib",
            "0.1.0",
            "dependencies:\n- name: base\n  version: ^0.2.0\n  repository: file://../base\n",
        );
        write_chart(
            &tmp.path().join("app"),
            "app",
            "1.0.0",
            "dependencies:\n- name: lib\n  version: 0.1.0\n  repository: file://../lib\n",
        );

        let resolver = resolver(&tmp);
        let cfg = config(&tmp, "app");
        let chart = resolver.resolve(&cfg).await.unwrap();
        assert_eq!(chart.metadata.name, "app");
        assert!(chart.dependencies_satisfied());
        assert!(chart.lock.is_some());
        assert!(tmp.path().join("lib/charts/base-0.2.0.tgz").exists());
        assert!(tmp.path().join("app/charts/lib-0.1.0.tgz").exists());

        let lib = &chart.dependencies[0];
        assert_eq!(lib.metadata.name, "lib");
        assert_eq!(lib.dependencies[0].metadata.name, "base");

        // local dependencies are rebuilt on every resolution
        let again = resolver.resolve(&cfg).await.unwrap();
        assert_eq!(again.dependencies.len(), 1);
    }

    #[tokio::test]
    async fn test_entry_not_found_refreshes_index_once() {
        let server = MockServer::start().await;
        let tmp = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(url_path("/index.yaml"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(index_yaml(&["1.0.0", "1.1.0"])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/charts/redis-1.1.0.tgz"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(packed_chart(&tmp, "redis", "1.1.0")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let resolver = resolver(&tmp).trust_any_repository(true);
        // stale cached index that does not list the locked version yet
        let index_path = resolver.settings.index_path(&server.uri());
        std::fs::create_dir_all(index_path.parent().unwrap()).unwrap();
        std::fs::write(&index_path, index_yaml(&["1.0.0"])).unwrap();

        let app = tmp.path().join("app");
        write_chart(
            &app,
            "app",
            "1.0.0",
            &format!(
                "dependencies:\n- name: redis\n  version: ^1.0.0\n  repository: {}\n",
                server.uri()
            ),
        );
        let declared = LoadedChart::load(&app).unwrap().metadata.dependencies;
        ChartLock::new(
            &declared,
            vec![LockedDependency {
                name: "redis".into(),
                version: "1.1.0".into(),
                repository: server.uri(),
            }],
        )
        .save(&app)
        .unwrap();

        let chart = resolver.resolve(&config(&tmp, "app")).await.unwrap();
        assert!(chart.dependencies_satisfied());
        assert_eq!(chart.dependencies[0].metadata.version.to_string(), "1.1.0");
        assert!(app.join("charts/redis-1.1.0.tgz").exists());
    }

    #[tokio::test]
    async fn test_entry_not_found_after_refresh_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/index.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index_yaml(&["1.0.0"])))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let resolver = resolver(&tmp).trust_any_repository(true);
        let index_path = resolver.settings.index_path(&server.uri());
        std::fs::create_dir_all(index_path.parent().unwrap()).unwrap();
        std::fs::write(&index_path, index_yaml(&["1.0.0"])).unwrap();

        let app = tmp.path().join("app");
        write_chart(
            &app,
            "app",
            "1.0.0",
            &format!(
                "dependencies:\n- name: redis\n  version: ^2.0.0\n  repository: {}\n",
                server.uri()
            ),
        );
        let declared = LoadedChart::load(&app).unwrap().metadata.dependencies;
        ChartLock::new(
            &declared,
            vec![LockedDependency {
                name: "redis".into(),
                version: "2.0.0".into(),
                repository: server.uri(),
            }],
        )
        .save(&app)
        .unwrap();

        let err = resolver.resolve(&config(&tmp, "app")).await.unwrap_err();
        assert!(matches!(
            &err,
            RepoError::Build { source, .. } if matches!(**source, RepoError::EntryNotFound { .. })
        ));
        assert!(err.to_string().starts_with("build chart app 1.0.0: entry not found"));
    }

    #[tokio::test]
    async fn test_resolve_remote_by_alias() {
        let server = MockServer::start().await;
        let tmp = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(url_path("/index.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index_yaml(&["1.1.0"])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/charts/redis-1.1.0.tgz"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(packed_chart(&tmp, "redis", "1.1.0")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let resolver = resolver(&tmp);
        let mut repos = RepositoryConfig::default();
        repos
            .add(Repository::new("mine", server.uri()).unwrap())
            .unwrap();
        repos.save_to(&resolver.settings.config_path).unwrap();

        let mut cfg = config(&tmp, "mine/redis");
        cfg.version = "1.1.0".into();
        let chart = resolver.resolve(&cfg).await.unwrap();
        assert_eq!(chart.display_name(), "redis 1.1.0");

        // the exact version is now served from the cache
        let cached = resolver.resolve(&cfg).await.unwrap();
        assert_eq!(cached.display_name(), "redis 1.1.0");
    }

    #[tokio::test]
    async fn test_untrusted_remote_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = config(&tmp, "redis");
        cfg.repository = "https://charts.example.com".into();
        assert!(matches!(
            resolver(&tmp).resolve(&cfg).await,
            Err(RepoError::UntrustedRepository { .. })
        ));
    }
}
