//! Resource scope lookup
//!
//! Built-in kinds are read from the `k8s-openapi` type definitions. Anything
//! not in the table (custom resources, removed APIs) has an unknown scope.

use k8s_openapi::{NamespaceResourceScope, Resource as K8sResource};
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::collections::HashMap;

use k8s_openapi::api::{
    admissionregistration::v1 as admission, apps::v1 as apps, autoscaling::v2 as autoscaling,
    batch::v1 as batch, certificates::v1 as certificates, coordination::v1 as coordination,
    core::v1 as core, discovery::v1 as discovery, events::v1 as events,
    flowcontrol::v1 as flowcontrol, networking::v1 as networking, node::v1 as node,
    policy::v1 as policy, rbac::v1 as rbac, scheduling::v1 as scheduling, storage::v1 as storage,
};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::APIService;

use crate::resource::ResourceMeta;

/// Where a kind lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Namespaced,
    Cluster,
}

type ScopeTable = HashMap<(&'static str, &'static str), Scope>;

fn entry<K>() -> ((&'static str, &'static str), Scope)
where
    K: K8sResource,
    K::Scope: 'static,
{
    let scope = if TypeId::of::<K::Scope>() == TypeId::of::<NamespaceResourceScope>() {
        Scope::Namespaced
    } else {
        Scope::Cluster
    };
    ((K::GROUP, K::KIND), scope)
}

// Keyed by (group, kind): scope does not change between API versions.
static SCOPES: Lazy<ScopeTable> = Lazy::new(|| {
    let mut table: ScopeTable = [
        entry::<core::Namespace>(),
        entry::<core::Node>(),
        entry::<core::PersistentVolume>(),
        entry::<core::ComponentStatus>(),
        entry::<core::ConfigMap>(),
        entry::<core::Secret>(),
        entry::<core::Service>(),
        entry::<core::ServiceAccount>(),
        entry::<core::Pod>(),
        entry::<core::PodTemplate>(),
        entry::<core::ReplicationController>(),
        entry::<core::PersistentVolumeClaim>(),
        entry::<core::Endpoints>(),
        entry::<core::Event>(),
        entry::<core::LimitRange>(),
        entry::<core::ResourceQuota>(),
        entry::<apps::Deployment>(),
        entry::<apps::StatefulSet>(),
        entry::<apps::DaemonSet>(),
        entry::<apps::ReplicaSet>(),
        entry::<apps::ControllerRevision>(),
        entry::<batch::Job>(),
        entry::<batch::CronJob>(),
        entry::<autoscaling::HorizontalPodAutoscaler>(),
        entry::<policy::PodDisruptionBudget>(),
        entry::<networking::Ingress>(),
        entry::<networking::IngressClass>(),
        entry::<networking::NetworkPolicy>(),
        entry::<rbac::Role>(),
        entry::<rbac::RoleBinding>(),
        entry::<rbac::ClusterRole>(),
        entry::<rbac::ClusterRoleBinding>(),
        entry::<storage::StorageClass>(),
        entry::<storage::CSIDriver>(),
        entry::<storage::CSINode>(),
        entry::<storage::CSIStorageCapacity>(),
        entry::<storage::VolumeAttachment>(),
        entry::<scheduling::PriorityClass>(),
        entry::<node::RuntimeClass>(),
        entry::<admission::MutatingWebhookConfiguration>(),
        entry::<admission::ValidatingWebhookConfiguration>(),
        entry::<admission::ValidatingAdmissionPolicy>(),
        entry::<admission::ValidatingAdmissionPolicyBinding>(),
        entry::<certificates::CertificateSigningRequest>(),
        entry::<coordination::Lease>(),
        entry::<discovery::EndpointSlice>(),
        entry::<events::Event>(),
        entry::<flowcontrol::FlowSchema>(),
        entry::<flowcontrol::PriorityLevelConfiguration>(),
        entry::<CustomResourceDefinition>(),
        entry::<APIService>(),
    ]
    .into_iter()
    .collect();

    // Kinds served by API groups that newer clusters no longer have
    for (group, kind, scope) in [
        ("extensions", "Deployment", Scope::Namespaced),
        ("extensions", "DaemonSet", Scope::Namespaced),
        ("extensions", "ReplicaSet", Scope::Namespaced),
        ("extensions", "Ingress", Scope::Namespaced),
        ("extensions", "NetworkPolicy", Scope::Namespaced),
        ("extensions", "PodSecurityPolicy", Scope::Cluster),
        ("policy", "PodSecurityPolicy", Scope::Cluster),
    ] {
        table.entry((group, kind)).or_insert(scope);
    }
    table
});

/// Scope of a resource kind; `None` when unknown
pub fn scope_of(meta: &ResourceMeta) -> Option<Scope> {
    let gvk = meta.gvk();
    SCOPES.get(&(gvk.group.as_str(), gvk.kind.as_str())).copied()
}

/// Whether the resource is known to be namespaced
pub fn is_namespaced(meta: &ResourceMeta) -> bool {
    scope_of(meta) == Some(Scope::Namespaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(api_version: &str, kind: &str) -> ResourceMeta {
        ResourceMeta {
            api_version: api_version.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_builtin_scopes() {
        assert_eq!(scope_of(&meta("v1", "ConfigMap")), Some(Scope::Namespaced));
        assert_eq!(scope_of(&meta("apps/v1", "Deployment")), Some(Scope::Namespaced));
        assert_eq!(scope_of(&meta("v1", "Namespace")), Some(Scope::Cluster));
        assert_eq!(
            scope_of(&meta("rbac.authorization.k8s.io/v1", "ClusterRole")),
            Some(Scope::Cluster)
        );
        assert_eq!(
            scope_of(&meta("apiextensions.k8s.io/v1", "CustomResourceDefinition")),
            Some(Scope::Cluster)
        );
    }

    #[test]
    fn test_version_independent() {
        assert!(is_namespaced(&meta("autoscaling/v1", "HorizontalPodAutoscaler")));
        assert!(is_namespaced(&meta("extensions/v1beta1", "Ingress")));
        assert_eq!(
            scope_of(&meta("policy/v1beta1", "PodSecurityPolicy")),
            Some(Scope::Cluster)
        );
    }

    #[test]
    fn test_unknown_kind() {
        assert_eq!(scope_of(&meta("cert-manager.io/v1", "Certificate")), None);
        assert!(!is_namespaced(&meta("cert-manager.io/v1", "Certificate")));
    }
}
