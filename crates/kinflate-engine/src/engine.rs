//! Template engine based on MiniJinja

use kinflate_core::{
    Capabilities, LoadedChart, ReleaseOptions, RenderedDocument, TemplateContext, Values,
};
use minijinja::{Environment, UndefinedBehavior};
use tracing::debug;

use crate::error::{EngineError, Result, TemplateError};
use crate::{filters, functions};

/// Filters registered on top of the MiniJinja builtins
pub const FILTERS: &[&str] = &[
    "toyaml", "tojson", "b64encode", "b64decode", "quote", "squote", "indent", "nindent",
    "required", "empty", "haskey", "trunc", "trimprefix", "trimsuffix", "sha256",
];

/// Global functions available to templates
pub const FUNCTIONS: &[&str] = &[
    "fail", "dict", "list", "get", "coalesce", "ternary", "printf", "tpl",
];

/// Expands the templates of a chart and its enabled subcharts
pub trait TemplateEngine: Send + Sync {
    /// One document per rendered template, parent chart first
    fn render(
        &self,
        chart: &LoadedChart,
        values: &Values,
        release: &ReleaseOptions,
        capabilities: &Capabilities,
    ) -> Result<Vec<RenderedDocument>>;
}

/// MiniJinja template engine
#[derive(Debug, Clone, Default)]
pub struct Engine {
    strict: bool,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail on undefined variables; by default missing keys chain to undefined and render empty
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(if self.strict {
            UndefinedBehavior::Strict
        } else {
            UndefinedBehavior::Chainable
        });
        env.set_keep_trailing_newline(true);

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("b64decode", filters::b64decode);
        env.add_filter("quote", filters::quote);
        env.add_filter("squote", filters::squote);
        env.add_filter("indent", filters::indent);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("required", filters::required);
        env.add_filter("empty", filters::empty);
        env.add_filter("haskey", filters::haskey);
        env.add_filter("trunc", filters::trunc);
        env.add_filter("trimprefix", filters::trimprefix);
        env.add_filter("trimsuffix", filters::trimsuffix);
        env.add_filter("sha256", filters::sha256sum);

        env.add_function("fail", functions::fail);
        env.add_function("dict", functions::dict);
        env.add_function("list", functions::list);
        env.add_function("get", functions::get);
        env.add_function("coalesce", functions::coalesce);
        env.add_function("ternary", functions::ternary);
        env.add_function("printf", functions::printf);
        env.add_function("tpl", functions::tpl);

        env
    }

    /// Render a single template string
    pub fn render_string(
        &self,
        template: &str,
        context: &TemplateContext,
        name: &str,
    ) -> Result<String> {
        self.environment()
            .render_str(template, context)
            .map_err(|e| TemplateError::from_minijinja(e, name, template).into())
    }

    fn render_chart(
        &self,
        chart: &LoadedChart,
        path: &str,
        values: &Values,
        release: &ReleaseOptions,
        capabilities: &Capabilities,
        out: &mut Vec<RenderedDocument>,
    ) -> Result<()> {
        let mut env = self.environment();
        for template in &chart.templates {
            let key = template_key(&template.name).to_string();
            env.add_template_owned(key, template.content.clone())
                .map_err(|e| {
                    TemplateError::from_minijinja(
                        e,
                        &format!("{}/{}", path, template.name),
                        &template.content,
                    )
                })?;
        }

        let mut context = TemplateContext::new(values.clone(), release.clone(), &chart.metadata)
            .with_capabilities(capabilities.clone());
        let base_path = format!("{}/templates", path);

        for template in &chart.templates {
            let key = template_key(&template.name);
            // partials are only reachable through include/import
            if key.rsplit('/').next().is_some_and(|f| f.starts_with('_')) {
                continue;
            }
            let full_name = format!("{}/{}", path, template.name);
            context = context.with_template(&full_name, &base_path);

            let rendered = env
                .get_template(key)
                .and_then(|t| t.render(&context))
                .map_err(|e| TemplateError::from_minijinja(e, &full_name, &template.content))?;
            out.push(RenderedDocument::new(full_name, rendered));
        }

        for (scope, subchart) in enabled_subcharts(chart, values)? {
            debug!(chart = %chart.display_name(), subchart = %scope, "rendering subchart");
            let sub_values = Values::for_subchart(&subchart.values, values, &scope);
            let sub_path = format!("{}/charts/{}", path, scope);
            self.render_chart(subchart, &sub_path, &sub_values, release, capabilities, out)?;
        }
        Ok(())
    }
}

impl TemplateEngine for Engine {
    fn render(
        &self,
        chart: &LoadedChart,
        values: &Values,
        release: &ReleaseOptions,
        capabilities: &Capabilities,
    ) -> Result<Vec<RenderedDocument>> {
        let mut documents = Vec::new();
        self.render_chart(
            chart,
            &chart.metadata.name,
            values,
            release,
            capabilities,
            &mut documents,
        )?;
        Ok(documents)
    }
}

/// Name of a template within its chart's environment (`templates/` stripped)
fn template_key(name: &str) -> &str {
    name.strip_prefix("templates/").unwrap_or(name)
}

/// Subcharts to render with the name their values are scoped under.
///
/// Declared dependencies whose condition is off are skipped; subcharts in
/// `charts/` without a declaration are always rendered.
fn enabled_subcharts<'c>(
    chart: &'c LoadedChart,
    values: &Values,
) -> Result<Vec<(String, &'c LoadedChart)>> {
    let mut result = Vec::new();
    for dep in &chart.metadata.dependencies {
        if !dep.is_enabled(values) {
            debug!(dependency = %dep.effective_name(), "subchart disabled by condition");
            continue;
        }
        let subchart = chart
            .subchart(dep)
            .ok_or_else(|| EngineError::MissingSubchart {
                chart: chart.display_name(),
                dependency: dep.effective_name().to_string(),
            })?;
        result.push((dep.effective_name().to_string(), subchart));
    }
    for subchart in &chart.dependencies {
        let declared = chart
            .metadata
            .dependencies
            .iter()
            .any(|d| d.name == subchart.metadata.name);
        if !declared {
            result.push((subchart.metadata.name.clone(), subchart));
        }
    }
    Ok(result)
}
