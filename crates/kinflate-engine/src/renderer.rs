//! Chart rendering from a renderer configuration

use kinflate_core::config::is_url;
use kinflate_core::{
    Capabilities, ChartConfig, LoadedChart, ReleaseOptions, RenderedDocument, Values,
};
use kinflate_repo::Getters;
use tracing::{debug, info};

use crate::engine::{Engine, TemplateEngine};
use crate::error::{EngineError, Result};

/// Renders a loaded chart with the values and release settings of a [`ChartConfig`]
#[derive(Debug, Clone)]
pub struct Renderer<E = Engine> {
    engine: E,
    getters: Getters,
}

impl Renderer<Engine> {
    pub fn new(getters: Getters) -> Self {
        Self::with_engine(Engine::new(), getters)
    }
}

impl<E: TemplateEngine> Renderer<E> {
    pub fn with_engine(engine: E, getters: Getters) -> Self {
        Self { engine, getters }
    }

    pub async fn render(
        &self,
        chart: &LoadedChart,
        cfg: &ChartConfig,
    ) -> Result<Vec<RenderedDocument>> {
        let chart_name = chart.display_name();
        let values = self
            .load_values(chart, cfg)
            .await
            .map_err(|e| EngineError::Values {
                chart: chart_name.clone(),
                source: Box::new(e),
            })?;

        let release_name = if cfg.release_name.is_empty() {
            chart.metadata.name.as_str()
        } else {
            cfg.release_name.as_str()
        };
        let release = ReleaseOptions::for_install(release_name, cfg.namespace.as_str());
        let capabilities = Capabilities::new(cfg.effective_kube_version(), &cfg.api_versions);

        info!(
            "Rendering chart {} with name {:?} and namespace {:?}",
            chart_name, release.name, release.namespace
        );

        let documents = self
            .engine
            .render(chart, &values, &release, &capabilities)
            .map_err(|e| EngineError::Render {
                chart: chart_name,
                source: Box::new(e),
            })?;
        debug!(documents = documents.len(), "chart rendered");
        Ok(documents)
    }

    /// Chart defaults, then each value file in order, then the inline values
    pub async fn load_values(&self, chart: &LoadedChart, cfg: &ChartConfig) -> Result<Values> {
        let mut overlays = Vec::with_capacity(cfg.value_files.len() + 1);
        for file in &cfg.value_files {
            overlays.push(self.load_value_file(cfg, file).await?);
        }
        if !cfg.values.is_empty() {
            overlays.push(Values::from_json_value(serde_json::Value::Object(
                cfg.values.clone(),
            ))?);
        }
        Ok(Values::merge_all(chart.values.clone(), &overlays))
    }

    async fn load_value_file(&self, cfg: &ChartConfig, file: &str) -> Result<Values> {
        if !is_url(file) {
            let path = cfg.value_file_path(file)?;
            debug!(path = %path.display(), "loading value file");
            return Ok(Values::from_file(&path)?);
        }

        debug!(url = %file, "fetching value file");
        let bytes = self
            .getters
            .get(file, None)
            .await
            .map_err(|source| EngineError::Fetch {
                url: file.to_string(),
                source,
            })?;
        let text = String::from_utf8(bytes).map_err(|e| EngineError::ValueFile {
            file: file.to_string(),
            message: e.to_string(),
        })?;
        Values::from_yaml(&text).map_err(|e| EngineError::ValueFile {
            file: file.to_string(),
            message: e.to_string(),
        })
    }
}
