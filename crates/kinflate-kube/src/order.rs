//! Output ordering by kind
//!
//! Resources are emitted in the order a cluster can accept them: CRDs and
//! namespaces first, then configuration, storage, networking and workloads,
//! with admission webhooks and API registrations last.

use crate::resource::Resource;
use crate::scope;

/// Resource category used for output ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ResourceCategory {
    /// CustomResourceDefinition
    Crd = 0,
    /// Namespace
    Namespace = 1,
    /// ResourceQuota, LimitRange, PodSecurityPolicy, PriorityClass
    NamespaceConfig = 2,
    /// ClusterRole, ClusterRoleBinding
    ClusterRbac = 10,
    /// Role, RoleBinding, ServiceAccount
    NamespacedRbac = 11,
    /// ConfigMap, Secret
    Config = 20,
    /// PersistentVolume, PersistentVolumeClaim, StorageClass
    Storage = 21,
    /// Service, Endpoints, Ingress, IngressClass
    Network = 30,
    /// Deployment, StatefulSet, DaemonSet, ReplicaSet, Pod
    Workload = 40,
    /// Job, CronJob
    Batch = 50,
    /// HorizontalPodAutoscaler, VerticalPodAutoscaler
    Autoscaling = 60,
    /// Resources of custom API groups
    CustomResource = 70,
    /// PodDisruptionBudget, NetworkPolicy
    Policy = 80,
    /// Webhook configurations, admission policies, APIService
    ClusterExtension = 90,
    /// Everything else
    Other = 100,
}

impl ResourceCategory {
    /// Categorize a resource by its kind
    pub fn of(resource: &Resource) -> Self {
        match resource.meta.kind.as_str() {
            "CustomResourceDefinition" => Self::Crd,
            "Namespace" => Self::Namespace,
            "ResourceQuota" | "LimitRange" | "PodSecurityPolicy" | "PriorityClass" => {
                Self::NamespaceConfig
            }
            "ClusterRole" | "ClusterRoleBinding" => Self::ClusterRbac,
            "Role" | "RoleBinding" | "ServiceAccount" => Self::NamespacedRbac,
            "ConfigMap" | "Secret" => Self::Config,
            "PersistentVolume" | "PersistentVolumeClaim" | "StorageClass" => Self::Storage,
            "Service" | "Endpoints" | "Ingress" | "IngressClass" => Self::Network,
            "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" | "ReplicationController"
            | "Pod" => Self::Workload,
            "Job" | "CronJob" => Self::Batch,
            "HorizontalPodAutoscaler" | "VerticalPodAutoscaler" => Self::Autoscaling,
            "PodDisruptionBudget" | "NetworkPolicy" => Self::Policy,
            "MutatingWebhookConfiguration"
            | "ValidatingWebhookConfiguration"
            | "ValidatingAdmissionPolicy"
            | "ValidatingAdmissionPolicyBinding"
            | "APIService" => Self::ClusterExtension,
            _ if scope::scope_of(&resource.meta).is_none() => Self::CustomResource,
            _ => Self::Other,
        }
    }
}

/// Stable sort by category; equal kinds keep their rendered order
pub fn sort_for_output(resources: &mut [Resource]) {
    resources.sort_by_key(ResourceCategory::of);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::parse_documents;

    fn resources(kinds: &[(&str, &str, &str)]) -> Vec<Resource> {
        let yaml = kinds
            .iter()
            .map(|(api, kind, name)| {
                format!("apiVersion: {api}\nkind: {kind}\nmetadata:\n  name: {name}\n")
            })
            .collect::<Vec<_>>()
            .join("---\n");
        parse_documents(&yaml).unwrap()
    }

    fn names(resources: &[Resource]) -> Vec<&str> {
        resources.iter().map(|r| r.meta.name.as_str()).collect()
    }

    #[test]
    fn test_sort_order() {
        let mut list = resources(&[
            ("admissionregistration.k8s.io/v1", "ValidatingWebhookConfiguration", "hook"),
            ("apps/v1", "Deployment", "web"),
            ("example.com/v1", "Widget", "w"),
            ("v1", "ConfigMap", "cfg"),
            ("policy/v1", "PodDisruptionBudget", "pdb"),
            ("v1", "Namespace", "ns"),
            ("apiextensions.k8s.io/v1", "CustomResourceDefinition", "crd"),
            ("v1", "Service", "svc"),
        ]);
        sort_for_output(&mut list);
        assert_eq!(
            names(&list),
            ["crd", "ns", "cfg", "svc", "web", "w", "pdb", "hook"]
        );
    }

    #[test]
    fn test_sort_is_stable() {
        let mut list = resources(&[
            ("v1", "ConfigMap", "b"),
            ("v1", "Secret", "s"),
            ("v1", "ConfigMap", "a"),
            ("v1", "ConfigMap", "c"),
        ]);
        sort_for_output(&mut list);
        assert_eq!(names(&list), ["b", "s", "a", "c"]);
    }

    #[test]
    fn test_custom_vs_other() {
        let list = resources(&[
            ("monitoring.coreos.com/v1", "ServiceMonitor", "m"),
            ("coordination.k8s.io/v1", "Lease", "l"),
        ]);
        assert_eq!(ResourceCategory::of(&list[0]), ResourceCategory::CustomResource);
        assert_eq!(ResourceCategory::of(&list[1]), ResourceCategory::Other);
    }
}
