//! Top-level render pipeline
//!
//! Resolving, rendering and transforming run as one spawned task that is
//! raced against an interrupt (timeout or Ctrl-C). When the interrupt wins the
//! task is detached, not aborted; nothing is written until the race is over.

use std::future::Future;
use std::time::Duration;

use kinflate_core::ChartConfig;
use kinflate_engine::{Engine, Renderer};
use kinflate_kube::{ManifestTransformer, Resource, TransformOptions};
use kinflate_repo::{ChartResolver, Getters, RepositorySettings};
use tracing::debug;

use crate::error::{CliError, Result};

/// Why a render stopped before completing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Timeout(Duration),
    Signal,
}

impl From<Interrupt> for CliError {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Timeout(after) => CliError::Timeout { after },
            Interrupt::Signal => CliError::Cancelled,
        }
    }
}

/// Resolves when the timeout elapses or Ctrl-C is pressed
pub async fn interrupted(timeout: Option<Duration>) -> Interrupt {
    let deadline = async {
        match timeout {
            Some(after) => {
                tokio::time::sleep(after).await;
                Interrupt::Timeout(after)
            }
            None => std::future::pending().await,
        }
    };
    let signal = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // no handler could be installed; only the deadline applies
            std::future::pending::<()>().await;
        }
        Interrupt::Signal
    };

    tokio::select! {
        interrupt = deadline => interrupt,
        interrupt = signal => interrupt,
    }
}

/// Chart reference in, ordered resources out
#[derive(Debug, Clone)]
pub struct Pipeline {
    resolver: ChartResolver,
    renderer: Renderer,
}

impl Pipeline {
    pub fn new(settings: RepositorySettings, getters: Getters, trust_any_repository: bool) -> Self {
        Self {
            resolver: ChartResolver::new(settings, getters.clone())
                .trust_any_repository(trust_any_repository),
            renderer: Renderer::new(getters),
        }
    }

    /// Fail on undefined template variables
    pub fn strict(mut self, strict: bool) -> Self {
        let getters = self.resolver.getters().clone();
        self.renderer = Renderer::with_engine(Engine::new().strict(strict), getters);
        self
    }

    /// Validate `cfg`, then race the render against `interrupt`.
    ///
    /// Configuration errors are reported before any network or disk access.
    pub async fn run<F>(self, cfg: ChartConfig, interrupt: F) -> Result<Vec<Resource>>
    where
        F: Future<Output = Interrupt>,
    {
        let errors = cfg.validate();
        if !errors.is_empty() {
            return Err(CliError::invalid_config(&errors));
        }
        cfg.check_value_files()
            .map_err(|e| CliError::invalid_config(&[e.to_string()]))?;

        let task = tokio::spawn(self.execute(cfg));
        tokio::select! {
            joined = task => {
                joined.map_err(|e| CliError::internal(format!("render task failed: {}", e)))?
            }
            interrupt = interrupt => {
                debug!(?interrupt, "render interrupted, detaching the render task");
                Err(interrupt.into())
            }
        }
    }

    async fn execute(self, cfg: ChartConfig) -> Result<Vec<Resource>> {
        let chart = self
            .resolver
            .resolve(&cfg)
            .await
            .map_err(|e| CliError::load_chart(&cfg.chart, e))?;
        let documents = self.renderer.render(&chart, &cfg).await?;

        let mut transformer = ManifestTransformer::new(TransformOptions {
            force_namespace: cfg.force_namespace.clone(),
            namespaced_only: cfg.namespaced_only,
            exclude_hooks: cfg.excludes_hooks(),
            include: cfg.include.clone(),
            exclude: cfg.exclude.clone(),
        });
        Ok(transformer.transform(&chart.display_name(), &documents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinflate_core::ResourceSelector;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_chart(dir: &Path) {
        fs::create_dir_all(dir.join("templates")).unwrap();
        fs::write(dir.join("Chart.yaml"), "apiVersion: v2\nname: demo\nversion: 0.1.0\n").unwrap();
        fs::write(dir.join("values.yaml"), "replicas: 1\n").unwrap();
        fs::write(
            dir.join("templates/deploy.yaml"),
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: {{ release.name }}\nspec:\n  replicas: {{ values.replicas }}\n",
        )
        .unwrap();
        fs::write(
            dir.join("templates/cm.yaml"),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {{ release.name }}-cfg\n",
        )
        .unwrap();
        fs::write(dir.join("templates/blank.yaml"), "\n  \n").unwrap();
    }

    fn pipeline(dir: &TempDir) -> Pipeline {
        let settings = RepositorySettings::new(
            dir.path().join("repositories.yaml"),
            dir.path().join("cache"),
        );
        Pipeline::new(settings, Getters::new().unwrap(), false)
    }

    fn config(dir: &TempDir) -> ChartConfig {
        let mut cfg = ChartConfig {
            chart: "demo".into(),
            release_name: "web".into(),
            namespace: "apps".into(),
            force_namespace: "apps".into(),
            ..Default::default()
        };
        cfg.resolve_dirs(dir.path());
        cfg
    }

    #[tokio::test]
    async fn test_renders_local_chart() {
        let dir = TempDir::new().unwrap();
        write_chart(&dir.path().join("demo"));

        let mut cfg = config(&dir);
        cfg.exclude = vec![ResourceSelector {
            kind: "ConfigMap".into(),
            ..Default::default()
        }];
        cfg.values.insert("replicas".into(), serde_json::json!(3));

        let resources = pipeline(&dir)
            .run(cfg, std::future::pending())
            .await
            .unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].meta.kind, "Deployment");
        assert_eq!(resources[0].meta.name, "web");
        assert_eq!(resources[0].meta.namespace, "apps");
        assert_eq!(resources[0].document["spec"]["replicas"], 3);
    }

    #[tokio::test]
    async fn test_reports_all_config_errors_first() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.chart = String::new();
        cfg.include = vec![ResourceSelector::default()];

        let err = pipeline(&dir)
            .run(cfg, std::future::pending())
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with(
            "invalid chart renderer config:\n * chart not specified\n * include[0]"
        ));
        assert!(!dir.path().join("cache").exists());
    }

    #[tokio::test]
    async fn test_value_file_outside_root_is_config_error() {
        let dir = TempDir::new().unwrap();
        write_chart(&dir.path().join("demo"));
        let mut cfg = config(&dir);
        cfg.value_files = vec!["../elsewhere.yaml".into()];

        let err = pipeline(&dir)
            .run(cfg, std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
    }

    #[tokio::test]
    async fn test_interrupt_wins_race() {
        let dir = TempDir::new().unwrap();
        write_chart(&dir.path().join("demo"));

        let err = pipeline(&dir)
            .run(config(&dir), async { Interrupt::Timeout(Duration::from_millis(5)) })
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Timeout { .. }));

        let err = pipeline(&dir)
            .run(config(&dir), async { Interrupt::Signal })
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Cancelled));
    }

    #[tokio::test]
    async fn test_template_error_surfaces_as_diagnostic() {
        let dir = TempDir::new().unwrap();
        write_chart(&dir.path().join("demo"));
        fs::write(dir.path().join("demo/templates/bad.yaml"), "{{ fail('broken') }}").unwrap();

        let err = pipeline(&dir)
            .run(config(&dir), std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Template { ref chart, .. } if chart == "demo 0.1.0"));
    }

    #[tokio::test]
    async fn test_missing_chart() {
        let dir = TempDir::new().unwrap();
        let err = pipeline(&dir)
            .run(config(&dir), std::future::pending())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("load chart demo: "));
    }
}
