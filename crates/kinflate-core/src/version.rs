//! Chart version constraints
//!
//! Charts write constraints in Helm syntax: comparators separated by spaces
//! or commas (`>=1.0.0 <2.0.0`), alternatives separated by `||`, hyphen
//! ranges (`1.0.0 - 2.0.0`) and bare versions meaning exactly that version.
//! Each alternative is translated into a [`semver::VersionReq`].

use semver::{Version, VersionReq};
use std::fmt;
use std::str::FromStr;

/// A parsed version constraint; matches when any alternative matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    alternatives: Vec<VersionReq>,
}

impl VersionConstraint {
    pub fn parse(constraint: &str) -> Result<Self, semver::Error> {
        let alternatives = constraint
            .split("||")
            .map(parse_alternative)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { alternatives })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

impl FromStr for VersionConstraint {
    type Err = semver::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, req) in self.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str(" || ")?;
            }
            write!(f, "{}", req)?;
        }
        Ok(())
    }
}

fn parse_alternative(alternative: &str) -> Result<VersionReq, semver::Error> {
    let tokens: Vec<&str> = alternative
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();

    let mut comparators = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        // `>= 1.0.0`
        if is_operator(token) && i + 1 < tokens.len() {
            comparators.push(format!("{}{}", token, tokens[i + 1]));
            i += 2;
        } else if tokens.get(i + 1) == Some(&"-") && i + 2 < tokens.len() {
            comparators.push(format!(">={}", token));
            comparators.push(format!("<={}", tokens[i + 2]));
            i += 3;
        } else if is_bare_version(token) {
            comparators.push(format!("={}", token));
            i += 1;
        } else {
            comparators.push(token.to_string());
            i += 1;
        }
    }

    VersionReq::parse(&comparators.join(", "))
}

fn is_operator(token: &str) -> bool {
    token.chars().all(|c| matches!(c, '=' | '<' | '>' | '~' | '^'))
}

/// `1.2.3` or `1.2`, but not wildcards like `1.x`
fn is_bare_version(token: &str) -> bool {
    let core = token.split(['-', '+']).next().unwrap_or_default();
    core.starts_with(|c: char| c.is_ascii_digit())
        && core.chars().all(|c| c.is_ascii_digit() || c == '.')
}
