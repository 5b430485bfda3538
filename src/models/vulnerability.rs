//! Vulnerability data models and severity normalization.

use serde::{Deserialize, Serialize};

/// Ordinal severity scale for advisories.
///
/// `Unknown` covers advisories without a usable CVSS v3 score; it sorts
/// below every scored level so severity filters never hide scored findings
/// behind unscored ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Map a CVSS v3 base score onto the ordinal scale.
    ///
    /// Thresholds: `< 4.0` low, `< 7.0` medium, `< 9.0` high, otherwise
    /// critical.
    pub fn from_cvss(score: f64) -> Self {
        if score < 4.0 {
            Severity::Low
        } else if score < 7.0 {
            Severity::Medium
        } else if score < 9.0 {
            Severity::High
        } else {
            Severity::Critical
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Unknown => "UNKNOWN",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        write!(f, "{}", s)
    }
}

/// Source database an advisory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VulnerabilitySource {
    Osv,
}

/// A normalized vulnerability advisory for one package version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    /// Advisory identifier (e.g. GHSA-xxxx, PYSEC-xxxx, CVE-xxxx)
    pub id: String,

    /// Short summary
    pub summary: String,

    /// Normalized severity
    pub severity: Severity,

    /// CVSS v3 base score, when one was present and numeric
    pub cvss_score: Option<f64>,

    /// Reference URLs, in advisory order
    pub references: Vec<String>,

    /// Source database tag
    pub source: VulnerabilitySource,
}
