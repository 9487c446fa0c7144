//! Resource selection
//!
//! A [`ResourceMatchers`] set answers "does any selector match this resource?"
//! and remembers which selectors matched, so that selectors which never matched
//! anything can be reported afterwards.

use regex::Regex;

use kinflate_core::ResourceSelector;

use crate::error::{KubeError, Result};
use crate::resource::ResourceMeta;

/// A set of matchers consulted for every resource
pub trait ResourceMatchers {
    /// Whether any matcher in the set matches; every matcher is evaluated
    fn match_any(&mut self, meta: &ResourceMeta) -> bool;

    /// Fails listing every matcher that never matched
    fn require_all_matched(&self) -> Result<()>;
}

/// Matches every resource
#[derive(Debug, Default, Clone, Copy)]
pub struct AnyMatcher;

impl ResourceMatchers for AnyMatcher {
    fn match_any(&mut self, _meta: &ResourceMeta) -> bool {
        true
    }

    fn require_all_matched(&self) -> Result<()> {
        Ok(())
    }
}

/// Matches nothing and never complains
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneMatcher;

impl ResourceMatchers for NoneMatcher {
    fn match_any(&mut self, _meta: &ResourceMeta) -> bool {
        false
    }

    fn require_all_matched(&self) -> Result<()> {
        Ok(())
    }
}

/// A compiled selector plus its match count
#[derive(Debug, Clone)]
struct SelectorMatcher {
    selector: ResourceSelector,
    api_version: Option<Regex>,
    kind: Option<Regex>,
    namespace: Option<Regex>,
    name: Option<Regex>,
    matched: usize,
}

impl SelectorMatcher {
    fn new(selector: ResourceSelector) -> Self {
        Self {
            api_version: ResourceSelector::pattern(&selector.api_version),
            kind: ResourceSelector::pattern(&selector.kind),
            namespace: ResourceSelector::pattern(&selector.namespace),
            name: ResourceSelector::pattern(&selector.name),
            selector,
            matched: 0,
        }
    }

    fn matches(&self, meta: &ResourceMeta) -> bool {
        let field = |pattern: &Option<Regex>, value: &str| {
            pattern.as_ref().is_none_or(|re| re.is_match(value))
        };
        field(&self.api_version, &meta.api_version)
            && field(&self.kind, &meta.kind)
            && field(&self.namespace, &meta.namespace)
            && field(&self.name, &meta.name)
    }
}

/// Matchers built from configured selectors
#[derive(Debug, Clone, Default)]
pub struct SelectorMatchers {
    matchers: Vec<SelectorMatcher>,
}

impl SelectorMatchers {
    pub fn new(selectors: &[ResourceSelector]) -> Self {
        Self {
            matchers: selectors.iter().cloned().map(SelectorMatcher::new).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl ResourceMatchers for SelectorMatchers {
    fn match_any(&mut self, meta: &ResourceMeta) -> bool {
        let mut any = false;
        for matcher in &mut self.matchers {
            if matcher.matches(meta) {
                matcher.matched += 1;
                any = true;
            }
        }
        any
    }

    fn require_all_matched(&self) -> Result<()> {
        let unmatched: Vec<String> = self
            .matchers
            .iter()
            .filter(|m| m.matched == 0)
            .map(|m| format!("selector {} did not match any resource", m.selector))
            .collect();
        if unmatched.is_empty() {
            Ok(())
        } else {
            Err(KubeError::UnmatchedSelectors {
                selectors: unmatched,
            })
        }
    }
}

/// Include matchers: every resource when no selector is configured
pub fn include_matchers(selectors: &[ResourceSelector]) -> Box<dyn ResourceMatchers + Send> {
    if selectors.is_empty() {
        Box::new(AnyMatcher)
    } else {
        Box::new(SelectorMatchers::new(selectors))
    }
}

/// Exclusion matchers extended with chart hook detection.
///
/// Hooks are recorded whether or not they end up excluded.
pub struct ChartHookMatcher<M> {
    inner: M,
    exclude_hooks: bool,
    found_hooks: Vec<String>,
}

impl<M: ResourceMatchers> ChartHookMatcher<M> {
    pub fn new(inner: M, exclude_hooks: bool) -> Self {
        Self {
            inner,
            exclude_hooks,
            found_hooks: Vec::new(),
        }
    }

    /// `kind/name` of every hook seen so far
    pub fn found_hooks(&self) -> &[String] {
        &self.found_hooks
    }

    pub fn excludes_hooks(&self) -> bool {
        self.exclude_hooks
    }
}

impl<M: ResourceMatchers> ResourceMatchers for ChartHookMatcher<M> {
    fn match_any(&mut self, meta: &ResourceMeta) -> bool {
        let explicit = self.inner.match_any(meta);
        if meta.is_hook() {
            self.found_hooks.push(meta.short_id());
            return explicit || self.exclude_hooks;
        }
        explicit
    }

    fn require_all_matched(&self) -> Result<()> {
        self.inner.require_all_matched()
    }
}
