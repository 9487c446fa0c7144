//! kinflate engine - chart templating with MiniJinja
//!
//! This crate provides:
//! - [`Engine`]: renders a chart and its enabled subcharts into documents
//! - [`Renderer`]: loads layered values for a [`kinflate_core::ChartConfig`]
//!   and drives an engine
//! - Chart-oriented filters and functions (`toyaml`, `nindent`, `tpl`, ...)
//! - Template errors with source spans for `miette` reports

pub mod engine;
pub mod error;
pub mod filters;
pub mod functions;
pub mod renderer;

pub use engine::{Engine, FILTERS, FUNCTIONS, TemplateEngine};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use renderer::Renderer;
