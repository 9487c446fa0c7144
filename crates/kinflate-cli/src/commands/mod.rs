//! CLI commands

pub mod generate;
pub mod repo;
pub mod template;

use kinflate_kube::{OutputTarget, Resource};
use kinflate_repo::{Getters, RepositorySettings};
use tracing::debug;

use crate::error::{CliError, Result};
use crate::pipeline::Pipeline;
use crate::{Global, OutputArgs};

/// Repository settings from the environment
pub fn settings() -> Result<RepositorySettings> {
    RepositorySettings::from_env().map_err(CliError::repository)
}

fn pipeline(global: &Global) -> Result<Pipeline> {
    Ok(Pipeline::new(
        settings()?,
        Getters::new().map_err(CliError::repository)?,
        global.trust_any_repo,
    ))
}

/// Write rendered resources to the sink selected by `--output`
fn write_output(resources: &[Resource], args: &OutputArgs) -> Result<()> {
    let target = OutputTarget::from_path(
        &args.output,
        args.output_replace,
        Some(Box::new(std::io::stdout())),
    )
    .map_err(CliError::output)?;
    debug!(?target, resources = resources.len(), "writing output");
    target.write(resources).map_err(CliError::output)
}
