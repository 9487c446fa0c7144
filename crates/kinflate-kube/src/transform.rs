//! Turns rendered chart templates into the final resource list

use tracing::{debug, warn};

use kinflate_core::{RenderedDocument, ResourceSelector};

use crate::annotations::labels;
use crate::error::{KubeError, Result};
use crate::matcher::{ChartHookMatcher, ResourceMatchers, SelectorMatchers, include_matchers};
use crate::order::sort_for_output;
use crate::resource::{Resource, parse_documents};
use crate::scope::{self, Scope};

/// Settings that control filtering and namespace handling
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    /// Namespace set on namespaced (or unknown-scope) resources; empty to keep
    pub force_namespace: String,
    /// Reject cluster-scoped and unknown resources
    pub namespaced_only: bool,
    /// Drop resources carrying the hook annotation
    pub exclude_hooks: bool,
    pub include: Vec<ResourceSelector>,
    pub exclude: Vec<ResourceSelector>,
}

/// Filters, rewrites and orders the resources produced by a render
pub struct ManifestTransformer {
    force_namespace: String,
    namespaced_only: bool,
    includes: Box<dyn ResourceMatchers + Send>,
    excludes: ChartHookMatcher<SelectorMatchers>,
}

impl ManifestTransformer {
    pub fn new(options: TransformOptions) -> Self {
        Self {
            force_namespace: options.force_namespace,
            namespaced_only: options.namespaced_only,
            includes: include_matchers(&options.include),
            excludes: ChartHookMatcher::new(
                SelectorMatchers::new(&options.exclude),
                options.exclude_hooks,
            ),
        }
    }

    /// Hooks seen while transforming, excluded or not
    pub fn found_hooks(&self) -> &[String] {
        self.excludes.found_hooks()
    }

    /// Transform the rendered templates of `chart` into ordered resources
    pub fn transform(
        &mut self,
        chart: &str,
        documents: &[RenderedDocument],
    ) -> Result<Vec<Resource>> {
        let mut parsed = 0usize;
        let mut kept = Vec::new();
        let mut cluster_scoped = Vec::new();

        for document in documents {
            let base_name = document.base_name();
            if base_name == "NOTES.txt"
                || base_name.starts_with('_')
                || document.content.trim().is_empty()
            {
                continue;
            }

            let resources =
                parse_documents(&document.content).map_err(|e| e.context(base_name))?;
            parsed += resources.len();

            for mut resource in resources {
                if self.excludes.match_any(&resource.meta) {
                    debug!(resource = %resource.meta.short_id(), "excluding resource");
                    continue;
                }
                if !self.includes.match_any(&resource.meta) {
                    debug!(resource = %resource.meta.short_id(), "resource not included");
                    continue;
                }

                let scope = scope::scope_of(&resource.meta);
                if !self.force_namespace.is_empty() && scope != Some(Scope::Cluster) {
                    resource.set_namespace(&self.force_namespace);
                } else if self.namespaced_only
                    && scope != Some(Scope::Namespaced)
                    && resource.meta.namespace.is_empty()
                {
                    cluster_scoped.push(resource.meta.to_string());
                }

                resource.remove_field(&["metadata", "labels"], labels::MANAGED_BY);
                resource.remove_field(
                    &["spec", "template", "metadata", "labels"],
                    labels::MANAGED_BY,
                );
                kept.push(resource);
            }
        }

        if !cluster_scoped.is_empty() {
            return Err(KubeError::ClusterScopedResources {
                resources: cluster_scoped,
            });
        }

        self.includes
            .require_all_matched()
            .map_err(|e| e.context("resource inclusion"))?;
        self.excludes
            .require_all_matched()
            .map_err(|e| e.context("resource exclusion"))?;

        if parsed == 0 {
            return Err(KubeError::NoManifests {
                chart: chart.to_string(),
            });
        }
        if kept.is_empty() {
            return Err(KubeError::AllResourcesExcluded);
        }

        if !self.excludes.excludes_hooks() && !self.found_hooks().is_empty() {
            warn!(
                "the chart output contains the following hooks: {}",
                self.found_hooks().join(", ")
            );
        }

        sort_for_output(&mut kept);
        Ok(kept)
    }
}
