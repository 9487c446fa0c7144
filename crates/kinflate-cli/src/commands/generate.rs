//! Generate command - kustomize plugin mode
//!
//! Reads a `ChartRenderer` document from a file or stdin and writes the
//! rendered resources.

use std::io::Read;

use kinflate_core::GeneratorConfig;
use tracing::debug;

use super::{pipeline, write_output};
use crate::error::{CliError, Result};
use crate::pipeline::interrupted;
use crate::{Global, OutputArgs};

pub async fn run(global: &Global, config: &str, output: &OutputArgs) -> Result<()> {
    let text = read_config(config)?;
    let document = GeneratorConfig::from_yaml(&text)
        .map_err(|e| CliError::config(format!("parse config {}: {}", config, e)))?;

    let errors = document.validate();
    if !errors.is_empty() {
        return Err(CliError::invalid_config(&errors));
    }
    debug!(name = %document.metadata.name, "loaded generator config");

    let mut cfg = document.chart;
    cfg.resolve_dirs(&global.cwd);

    let resources = pipeline(global)?
        .run(cfg, interrupted(global.timeout))
        .await?;
    write_output(&resources, output)
}

fn read_config(source: &str) -> Result<String> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| CliError::config(format!("read config from stdin: {}", e)))?;
        return Ok(text);
    }
    std::fs::read_to_string(source)
        .map_err(|e| CliError::config(format!("read config {}: {}", source, e)))
}
