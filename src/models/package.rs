//! Package identity and manifest record models.

use serde::{Deserialize, Serialize};

/// Normalize a package name for use as a graph, map, or cache key.
///
/// Package-naming conventions vary in case between the manifest, the
/// resolver output, and the dependency-tree listing, so every subsystem
/// compares names through this single canonical form.
pub fn canonical_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A resolved package in the transitive dependency closure.
///
/// Created during resolution; immutable once placed in the resolved set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Package name as reported by the resolver (original casing)
    pub name: String,

    /// Exact resolved version
    pub version: String,

    /// Version constraint from the manifest, if the package is a direct
    /// dependency (normalized specifier string)
    #[serde(default)]
    pub constraint: Option<String>,

    /// Package author, from an external metadata lookup
    #[serde(default)]
    pub author: Option<String>,

    /// Serialized origin paths ("rootA -> mid -> pkg; rootB -> pkg"),
    /// or the "direct" sentinel
    #[serde(default)]
    pub origin: Option<String>,
}

impl PackageRecord {
    /// Create a record with just the resolved identity.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            constraint: None,
            author: None,
            origin: None,
        }
    }

    /// Canonical (case-insensitive) key for this package.
    pub fn key(&self) -> String {
        canonical_name(&self.name)
    }
}

/// A direct dependency parsed from one manifest line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementRecord {
    /// Package name (extras stripped)
    pub name: String,

    /// Normalized version specifier, empty if unconstrained
    pub specifier: String,

    /// Original line text
    pub line: String,
}

/// A manifest line that could not be parsed.
///
/// Malformed lines are skipped, not fatal; warnings are surfaced so callers
/// can report them out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    /// 1-indexed line number in the manifest
    pub line_no: usize,

    /// Offending line text
    pub line: String,

    /// Why the line was rejected
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_lowercases_and_trims() {
        assert_eq!(canonical_name("  Flask "), "flask");
        assert_eq!(canonical_name("PyYAML"), "pyyaml");
        assert_eq!(canonical_name(canonical_name("Requests").as_str()), "requests");
    }

    #[test]
    fn package_key_is_case_insensitive() {
        let a = PackageRecord::new("Jinja2", "3.1.2");
        let b = PackageRecord::new("jinja2", "3.1.2");
        assert_eq!(a.key(), b.key());
    }
}
