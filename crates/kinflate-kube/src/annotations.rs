//! Well-known annotation and label keys found in chart output

/// Keys set by charts written for Helm
pub mod helm {
    /// Hook phase annotation
    pub const HOOK: &str = "helm.sh/hook";
}

/// Recommended Kubernetes labels
pub mod labels {
    /// Tool managing the resource; removed from rendered output
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
}
