//! The terminal report aggregate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{LicenseRecord, PackageRecord, Severity, Vulnerability};

/// A static-analysis finding carried through the pipeline.
///
/// Produced by an external code scanner; the pipeline stores and renders
/// these but never interprets them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisFinding {
    /// Source file the finding points at
    pub filename: String,

    /// 1-indexed line number
    pub line_number: usize,

    /// Scanner-specific check identifier
    pub check_id: String,

    /// Human-readable message
    pub message: String,
}

/// The consolidated audit report.
///
/// Write-once: assembled from fully computed stage outputs, then only read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Report generation timestamp
    pub generated_at: chrono::DateTime<chrono::Utc>,

    /// Full resolved dependency closure, with constraints/authors/origins
    pub dependencies: Vec<PackageRecord>,

    /// Canonical package name -> advisories affecting its resolved version
    pub vulnerabilities: HashMap<String, Vec<Vulnerability>>,

    /// Classified license records
    pub licenses: Vec<LicenseRecord>,

    /// Opaque static-analysis findings
    pub findings: Vec<AnalysisFinding>,
}

impl Report {
    /// Merge fully computed stage outputs into a report.
    ///
    /// Pure with respect to its inputs apart from stamping the generation
    /// time; performs no I/O and no external calls.
    pub fn assemble(
        dependencies: Vec<PackageRecord>,
        vulnerabilities: HashMap<String, Vec<Vulnerability>>,
        licenses: Vec<LicenseRecord>,
        findings: Vec<AnalysisFinding>,
    ) -> Self {
        Self {
            generated_at: chrono::Utc::now(),
            dependencies,
            vulnerabilities,
            licenses,
            findings,
        }
    }

    /// Canonical names of packages with at least one advisory.
    pub fn vulnerable_packages(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .vulnerabilities
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.clone())
            .collect();
        names.sort();
        names
    }

    /// Count advisories at or above the given severity.
    pub fn count_at_or_above(&self, floor: Severity) -> usize {
        self.vulnerabilities
            .values()
            .flatten()
            .filter(|v| v.severity >= floor)
            .count()
    }

    /// Drop advisories below the given severity floor.
    ///
    /// Packages whose advisory list becomes empty keep their (now empty)
    /// entry so "queried, nothing above the floor" stays distinguishable
    /// from "never queried".
    pub fn retain_at_or_above(&mut self, floor: Severity) {
        for vulns in self.vulnerabilities.values_mut() {
            vulns.retain(|v| v.severity >= floor);
        }
    }
}
