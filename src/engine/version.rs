// src/engine/version.rs

//! Version resolution policy.

use std::cmp::Ordering;

use regex::Regex;
use tracing::debug;

/// Chooses the concrete definition version a run executes.
pub trait VersionResolver: Send + Sync {
    /// `available` lists the versions stored for the run's pipeline.
    /// `None` means no version can be chosen yet.
    fn resolve(&self, pattern: &str, available: &[String]) -> Option<String>;
}

/// Concrete versions are taken verbatim; `*` matches any run of characters
/// and picks the highest matching stored version.
#[derive(Debug, Clone)]
pub struct PatternVersionResolver {
    default_version: String,
}

impl Default for PatternVersionResolver {
    fn default() -> Self {
        Self::new("1.0.0")
    }
}

impl PatternVersionResolver {
    /// `default_version` is used for runs without a pattern.
    pub fn new(default_version: impl Into<String>) -> Self {
        Self {
            default_version: default_version.into(),
        }
    }
}

impl VersionResolver for PatternVersionResolver {
    fn resolve(&self, pattern: &str, available: &[String]) -> Option<String> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Some(self.default_version.clone());
        }
        if !pattern.contains('*') {
            return Some(pattern.to_string());
        }

        let matcher = pattern_regex(pattern)?;
        let chosen = available
            .iter()
            .filter(|v| matcher.is_match(v))
            .max_by(|a, b| compare_versions(a, b))
            .cloned();
        debug!(pattern, ?chosen, candidates = available.len(), "resolved version pattern");
        chosen
    }
}

fn pattern_regex(pattern: &str) -> Option<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$")).ok()
}

/// Dot-separated comparison; numeric segments compare as numbers.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}
