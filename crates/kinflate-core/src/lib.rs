//! kinflate core - chart, values and configuration types
//!
//! This crate provides the foundational types used throughout kinflate:
//! - `LoadedChart`: a chart loaded from a directory or archive
//! - `Values`: value documents with the layered merge
//! - `ChartConfig`: the renderer configuration and its validation
//! - `TemplateContext`: what templates see while rendering

pub mod archive;
pub mod chart;
pub mod config;
pub mod context;
pub mod error;
pub mod values;
pub mod version;

pub use chart::{ChartLock, ChartMetadata, Dependency, LoadedChart, LockedDependency, TemplateFile};
pub use config::{ChartConfig, GeneratorConfig, ResourceSelector};
pub use context::{
    Capabilities, ChartInfo, KubeVersion, ReleaseOptions, RenderedDocument, TemplateContext,
};
pub use error::{CoreError, Result};
pub use values::{Values, parse_set_values};
pub use version::VersionConstraint;
