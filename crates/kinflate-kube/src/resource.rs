//! Kubernetes resources parsed from rendered chart output

use kube::core::GroupVersionKind;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

use crate::annotations;
use crate::error::{KubeError, Result};

/// Identity of a resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMeta {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub annotations: BTreeMap<String, String>,
}

impl ResourceMeta {
    /// Group/version/kind split out of `apiVersion`
    pub fn gvk(&self) -> GroupVersionKind {
        let (group, version) = match self.api_version.rsplit_once('/') {
            Some((g, v)) => (g, v),
            None => ("", self.api_version.as_str()),
        };
        GroupVersionKind::gvk(group, version, &self.kind)
    }

    /// Whether the resource is a chart lifecycle hook
    pub fn is_hook(&self) -> bool {
        self.annotations.contains_key(annotations::helm::HOOK)
    }

    /// `kind/name`, used when listing hooks
    pub fn short_id(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

impl std::fmt::Display for ResourceMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "apiVersion: {}, kind: {}, name: {}",
            self.api_version, self.kind, self.name
        )
    }
}

/// A parsed resource: identity plus the full document tree
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub meta: ResourceMeta,
    pub document: Value,
}

impl Resource {
    /// Build a resource from a parsed YAML document
    pub fn from_value(document: Value) -> Result<Self> {
        let meta = extract_meta(&document).map_err(|message| KubeError::InvalidMetadata {
            message,
            content: indent(&serde_yaml::to_string(&document).unwrap_or_default()),
        })?;
        Ok(Self { meta, document })
    }

    /// Set `metadata.namespace`, creating `metadata` if needed
    pub fn set_namespace(&mut self, namespace: &str) {
        if let Some(root) = self.document.as_mapping_mut() {
            let metadata = root
                .entry(Value::from("metadata"))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if !metadata.is_mapping() {
                *metadata = Value::Mapping(Mapping::new());
            }
            if let Some(metadata) = metadata.as_mapping_mut() {
                metadata.insert(Value::from("namespace"), Value::from(namespace));
            }
        }
        self.meta.namespace = namespace.to_string();
    }

    /// Remove a key from the mapping found at `path`, if any
    pub fn remove_field(&mut self, path: &[&str], key: &str) {
        let mut current = &mut self.document;
        for segment in path {
            match current.get_mut(*segment) {
                Some(next) => current = next,
                None => return,
            }
        }
        if let Some(map) = current.as_mapping_mut() {
            map.remove(key);
        }
    }

    /// Serialize the document as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.document)?)
    }
}

/// Parse a (multi-document) YAML stream into resources.
///
/// Null and empty documents are dropped.
pub fn parse_documents(content: &str) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = <Value as serde::Deserialize>::deserialize(document)?;
        if is_nil_or_empty(&value) {
            continue;
        }
        resources.push(Resource::from_value(value)?);
    }
    Ok(resources)
}

fn is_nil_or_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Mapping(m) => m.is_empty(),
        Value::Sequence(s) => s.is_empty(),
        _ => false,
    }
}

fn string_field(map: &Mapping, key: &str, path: &str) -> std::result::Result<String, String> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(format!("{} is not a string", path)),
    }
}

fn extract_meta(document: &Value) -> std::result::Result<ResourceMeta, String> {
    let root = document
        .as_mapping()
        .ok_or_else(|| "resource is not a mapping".to_string())?;

    let api_version = string_field(root, "apiVersion", "apiVersion")?;
    let kind = string_field(root, "kind", "kind")?;
    if api_version.is_empty() {
        return Err("missing apiVersion".to_string());
    }
    if kind.is_empty() {
        return Err("missing kind".to_string());
    }

    let mut meta = ResourceMeta {
        api_version,
        kind,
        ..Default::default()
    };

    match root.get("metadata") {
        None | Some(Value::Null) => {}
        Some(Value::Mapping(metadata)) => {
            meta.name = string_field(metadata, "name", "metadata.name")?;
            meta.namespace = string_field(metadata, "namespace", "metadata.namespace")?;
            match metadata.get("annotations") {
                None | Some(Value::Null) => {}
                Some(Value::Mapping(annotations)) => {
                    for (k, v) in annotations {
                        let (Some(k), Some(v)) = (k.as_str(), scalar_string(v)) else {
                            return Err("metadata.annotations must map strings to strings".into());
                        };
                        meta.annotations.insert(k.to_string(), v);
                    }
                }
                Some(_) => return Err("metadata.annotations is not a mapping".to_string()),
            }
        }
        Some(_) => return Err("metadata is not a mapping".to_string()),
    }

    Ok(meta)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Indent every line after the first for embedding in error messages
fn indent(raw: &str) -> String {
    raw.trim_end().replace('\n', "\n  ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multi_document() {
        let content = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: a
  namespace: ns1
---
---
# only a comment
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: b
  annotations:
    helm.sh/hook: pre-install
"#;
        let resources = parse_documents(content).unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].meta.name, "a");
        assert_eq!(resources[0].meta.namespace, "ns1");
        assert!(!resources[0].meta.is_hook());
        assert_eq!(resources[1].meta.kind, "Deployment");
        assert!(resources[1].meta.is_hook());
        assert_eq!(resources[1].meta.short_id(), "Deployment/b");
    }

    #[test]
    fn test_invalid_metadata_includes_content() {
        let err = parse_documents("kind: ConfigMap\nmetadata:\n  name: x\n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("invalid resource metadata: missing apiVersion"));
        assert!(message.contains("kind: ConfigMap"));

        let err = parse_documents("apiVersion: v1\nkind: ConfigMap\nmetadata: [1]\n").unwrap_err();
        assert!(err.to_string().contains("metadata is not a mapping"));

        assert!(parse_documents("- a\n- b\n").is_err());
    }

    #[test]
    fn test_gvk() {
        let meta = ResourceMeta {
            api_version: "apps/v1".into(),
            kind: "Deployment".into(),
            ..Default::default()
        };
        let gvk = meta.gvk();
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");

        let core = ResourceMeta {
            api_version: "v1".into(),
            kind: "Service".into(),
            ..Default::default()
        };
        assert_eq!(core.gvk().group, "");
        assert_eq!(core.gvk().version, "v1");
    }

    #[test]
    fn test_set_namespace_creates_metadata() {
        let mut resources = parse_documents("apiVersion: v1\nkind: ConfigMap\n").unwrap();
        let r = &mut resources[0];
        r.set_namespace("target");
        assert_eq!(r.meta.namespace, "target");
        assert_eq!(r.document["metadata"]["namespace"].as_str(), Some("target"));
    }

    #[test]
    fn test_remove_field() {
        let mut resources = parse_documents(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n  labels:\n    x: y\n    z: w\n",
        )
        .unwrap();
        let r = &mut resources[0];
        r.remove_field(&["metadata", "labels"], "x");
        r.remove_field(&["spec", "template"], "x");
        let labels = r.document["metadata"]["labels"].as_mapping().unwrap();
        assert_eq!(labels.len(), 1);
        assert!(labels.contains_key("z"));
    }
}
