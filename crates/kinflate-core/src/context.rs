//! Template rendering context

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::chart::ChartMetadata;
use crate::config::{DEFAULT_KUBE_VERSION, parse_kube_version};
use crate::values::Values;

/// Render-time release parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseOptions {
    pub name: String,
    pub namespace: String,
    pub is_install: bool,
    pub is_upgrade: bool,
    pub revision: u32,
    pub service: String,
}

impl ReleaseOptions {
    /// Options for a fresh install rendering
    pub fn for_install(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            is_install: true,
            is_upgrade: false,
            revision: 1,
            service: "kinflate".to_string(),
        }
    }
}

/// Chart information for templates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartInfo {
    pub name: String,
    pub version: String,
    pub app_version: Option<String>,
    pub description: Option<String>,
}

impl From<&ChartMetadata> for ChartInfo {
    fn from(meta: &ChartMetadata) -> Self {
        Self {
            name: meta.name.clone(),
            version: meta.version.to_string(),
            app_version: meta.app_version.clone(),
            description: meta.description.clone(),
        }
    }
}

/// Cluster capabilities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub kube_version: KubeVersion,

    /// Available API versions
    pub api_versions: Vec<String>,
}

impl Capabilities {
    /// Capabilities for the given kube version and extra API versions.
    ///
    /// When API versions are given, the core `v1` group is always added.
    pub fn new(kube_version: &str, api_versions: &[String]) -> Self {
        let mut apis = api_versions.to_vec();
        if !apis.is_empty() && !apis.iter().any(|a| a == "v1") {
            apis.push("v1".to_string());
        }
        Self {
            kube_version: KubeVersion::new(kube_version),
            api_versions: apis,
        }
    }
}

/// Kubernetes version info
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeVersion {
    pub version: String,
    pub major: String,
    pub minor: String,
}

impl Default for KubeVersion {
    fn default() -> Self {
        Self::new(DEFAULT_KUBE_VERSION)
    }
}

impl KubeVersion {
    pub fn new(version: &str) -> Self {
        let trimmed = version.trim().trim_start_matches('v');
        let (major, minor) = parse_kube_version(trimmed).unwrap_or((1, 31));
        let version = if trimmed.matches('.').count() >= 2 {
            format!("v{}", trimmed)
        } else {
            format!("v{}.{}.0", major, minor)
        };

        Self {
            version,
            major: major.to_string(),
            minor: minor.to_string(),
        }
    }
}

/// Current template information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInfo {
    pub name: String,
    pub base_path: String,
}

/// Context available to all templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateContext {
    pub values: JsonValue,
    pub release: ReleaseOptions,
    pub chart: ChartInfo,
    pub capabilities: Capabilities,
    pub template: TemplateInfo,
}

impl TemplateContext {
    pub fn new(values: Values, release: ReleaseOptions, chart: &ChartMetadata) -> Self {
        Self {
            values: values.into_inner(),
            release,
            chart: ChartInfo::from(chart),
            capabilities: Capabilities::default(),
            template: TemplateInfo::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_template(mut self, name: &str, base_path: &str) -> Self {
        self.template = TemplateInfo {
            name: name.to_string(),
            base_path: base_path.to_string(),
        };
        self
    }
}

/// One rendered template: its path inside the chart and its text output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    /// e.g. `mychart/templates/service.yaml` or `mychart/charts/sub/templates/cm.yaml`
    pub path: String,
    pub content: String,
}

impl RenderedDocument {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Last path component
    pub fn base_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    #[test]
    fn test_rendered_document_base_name() {
        let doc = RenderedDocument::new("chart/templates/_helpers.tpl", "");
        assert_eq!(doc.base_name(), "_helpers.tpl");
        assert_eq!(RenderedDocument::new("NOTES.txt", "").base_name(), "NOTES.txt");
    }

    fn metadata() -> ChartMetadata {
        ChartMetadata {
            api_version: "v2".to_string(),
            name: "mychart".to_string(),
            version: Version::new(1, 0, 0),
            description: None,
            app_version: Some("2.0.0".to_string()),
            kube_version: None,
            dependencies: vec![],
        }
    }

    #[test]
    fn test_template_context() {
        let values = Values::from_yaml("replicas: 3").unwrap();
        let release = ReleaseOptions::for_install("myapp", "default");
        let ctx = TemplateContext::new(values, release, &metadata());

        assert_eq!(ctx.chart.name, "mychart");
        assert_eq!(ctx.release.name, "myapp");
        assert!(ctx.release.is_install);
        assert_eq!(ctx.capabilities.kube_version.version, DEFAULT_KUBE_VERSION);
    }

    #[test]
    fn test_capabilities_append_core_api() {
        let caps = Capabilities::new("1.29", &["monitoring.coreos.com/v1".to_string()]);
        assert_eq!(caps.api_versions, vec!["monitoring.coreos.com/v1", "v1"]);
        assert_eq!(caps.kube_version.version, "v1.29.0");
        assert_eq!(caps.kube_version.minor, "29");

        let none = Capabilities::new("v1.28.3", &[]);
        assert!(none.api_versions.is_empty());
        assert_eq!(none.kube_version.version, "v1.28.3");
    }
}
