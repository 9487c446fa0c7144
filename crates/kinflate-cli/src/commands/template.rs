//! Template command - render a chart configured from flags

use clap::Args;
use kinflate_core::{ChartConfig, ResourceSelector, parse_set_values};
use serde_json::Value as JsonValue;

use super::{pipeline, write_output};
use crate::error::{CliError, Result};
use crate::pipeline::interrupted;
use crate::{Global, OutputArgs};

#[derive(Args, Debug)]
pub struct TemplateArgs {
    /// Chart directory, `repo/chart`, or a chart name together with --repo
    chart: String,

    /// Repository URL or `@name` of a configured repository
    #[arg(long)]
    repo: Option<String>,

    /// Chart version or semver range
    #[arg(long)]
    chart_version: Option<String>,

    /// Verify the chart digest against the repository index
    #[arg(long)]
    verify: bool,

    /// Release name (defaults to the chart name)
    #[arg(long = "name")]
    release_name: Option<String>,

    /// Release namespace
    #[arg(short, long)]
    namespace: Option<String>,

    /// Value files (paths or URLs), merged in order
    #[arg(short = 'f', long = "values")]
    value_files: Vec<String>,

    /// Set values on the command line (key=value)
    #[arg(long = "set")]
    set: Vec<String>,

    /// Keep only matching resources, e.g. `kind=Deployment,name=web`
    #[arg(long, value_parser = parse_selector)]
    include: Vec<ResourceSelector>,

    /// Drop matching resources, e.g. `apiVersion=v1,kind=Secret`
    #[arg(long, value_parser = parse_selector)]
    exclude: Vec<ResourceSelector>,

    /// Set this namespace on every namespaced resource
    #[arg(long)]
    force_namespace: Option<String>,

    /// Fail when cluster-scoped resources are rendered
    #[arg(long)]
    namespaced_only: bool,

    /// Keep chart hooks in the output
    #[arg(long)]
    include_hooks: bool,

    /// Kubernetes version templates render against
    #[arg(long)]
    kube_version: Option<String>,

    /// Additional API versions available to templates
    #[arg(long = "api-versions", value_delimiter = ',')]
    api_versions: Vec<String>,

    /// Directory local value files must stay within
    #[arg(long)]
    root_dir: Option<String>,

    /// Fail on undefined template variables
    #[arg(long)]
    strict: bool,

    #[command(flatten)]
    output: OutputArgs,
}

impl TemplateArgs {
    fn into_config(self, global: &Global) -> Result<(ChartConfig, OutputArgs, bool)> {
        let values = if self.set.is_empty() {
            serde_json::Map::new()
        } else {
            match parse_set_values(&self.set)
                .map_err(|e| CliError::config(format!("parse --set values: {}", e)))?
                .into_inner()
            {
                JsonValue::Object(map) => map,
                _ => serde_json::Map::new(),
            }
        };

        let mut cfg = ChartConfig {
            repository: self.repo.unwrap_or_default(),
            chart: self.chart,
            version: self.chart_version.unwrap_or_default(),
            verify: self.verify,
            release_name: self.release_name.unwrap_or_default(),
            namespace: self.namespace.unwrap_or_default(),
            value_files: self.value_files,
            values,
            include: self.include,
            exclude: self.exclude,
            force_namespace: self.force_namespace.unwrap_or_default(),
            namespaced_only: self.namespaced_only,
            exclude_hooks: Some(!self.include_hooks),
            kube_version: self.kube_version.unwrap_or_default(),
            api_versions: self.api_versions,
            root_dir: self.root_dir.unwrap_or_default(),
            trust_any_repository: Some(global.trust_any_repo),
            ..Default::default()
        };
        cfg.resolve_dirs(&global.cwd);
        Ok((cfg, self.output, self.strict))
    }
}

pub async fn run(global: &Global, args: TemplateArgs) -> Result<()> {
    let (cfg, output, strict) = args.into_config(global)?;
    let resources = pipeline(global)?
        .strict(strict)
        .run(cfg, interrupted(global.timeout))
        .await?;
    write_output(&resources, &output)
}

/// Parse `key=value` pairs separated by commas into a selector
fn parse_selector(s: &str) -> std::result::Result<ResourceSelector, String> {
    let mut selector = ResourceSelector::default();
    for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got {:?}", pair))?;
        let field = match key.trim() {
            "apiVersion" => &mut selector.api_version,
            "kind" => &mut selector.kind,
            "namespace" => &mut selector.namespace,
            "name" => &mut selector.name,
            other => {
                return Err(format!(
                    "unknown selector field {:?}, expected apiVersion, kind, namespace or name",
                    other
                ));
            }
        };
        *field = value.trim().to_string();
    }
    selector.validate()?;
    Ok(selector)
}
