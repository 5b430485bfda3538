//! License records and permissiveness classification.

use serde::{Deserialize, Serialize};

/// License families treated as permissive.
const PERMISSIVE_KEYWORDS: &[&str] = &["MIT", "BSD", "Apache", "ISC"];

/// License families treated as restrictive (copyleft).
const RESTRICTIVE_KEYWORDS: &[&str] = &["GPL", "AGPL", "LGPL"];

/// Permissiveness classification of a declared license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permissivity {
    Permissive,
    Restrictive,
    Unknown,
    None,
}

impl std::fmt::Display for Permissivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Permissivity::Permissive => "permissive",
            Permissivity::Restrictive => "restrictive",
            Permissivity::Unknown => "unknown",
            Permissivity::None => "none",
        };
        write!(f, "{}", s)
    }
}

/// Classify a raw license-declaration string.
///
/// Substring match against two fixed keyword sets. The permissive check runs
/// first, so a dual-licensed string matching both families resolves to
/// `Permissive`. This is a best-effort heuristic over declared metadata, not
/// a legal determination.
pub fn classify_license(license: &str) -> Permissivity {
    if PERMISSIVE_KEYWORDS.iter().any(|k| license.contains(k)) {
        Permissivity::Permissive
    } else if RESTRICTIVE_KEYWORDS.iter().any(|k| license.contains(k)) {
        Permissivity::Restrictive
    } else if !license.trim().is_empty() {
        Permissivity::Unknown
    } else {
        Permissivity::None
    }
}

/// A license row as emitted by the external license-enumeration tool.
///
/// Field names follow the tool's JSON output; absent columns default to
/// empty strings rather than failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLicenseRecord {
    #[serde(rename = "Name", default)]
    pub name: String,

    #[serde(rename = "License", default)]
    pub license: String,

    #[serde(rename = "Author", default)]
    pub author: String,

    #[serde(rename = "LicenseFile", default)]
    pub license_file: String,

    #[serde(rename = "NoticeFile", default)]
    pub notice_file: String,
}

/// A classified license record for the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// Package name
    pub name: String,

    /// Raw declared license string
    pub license: String,

    /// Declared author
    pub author: String,

    /// Path to the bundled license file, if any
    pub license_file: String,

    /// Path to the bundled notice file, if any
    pub notice_file: String,

    /// Derived permissiveness
    pub permissivity: Permissivity,
}

impl LicenseRecord {
    /// Classify a raw tool row into a report record.
    pub fn from_raw(raw: RawLicenseRecord) -> Self {
        let permissivity = classify_license(&raw.license);
        Self {
            name: raw.name,
            license: raw.license,
            author: raw.author,
            license_file: raw.license_file,
            notice_file: raw.notice_file,
            permissivity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_known_families() {
        assert_eq!(classify_license("MIT License"), Permissivity::Permissive);
        assert_eq!(classify_license("BSD-3-Clause"), Permissivity::Permissive);
        assert_eq!(classify_license("Apache-2.0"), Permissivity::Permissive);
        assert_eq!(classify_license("GPL-3.0"), Permissivity::Restrictive);
        assert_eq!(classify_license("GNU LGPL v2.1"), Permissivity::Restrictive);
    }

    #[test]
    fn permissive_wins_on_dual_license() {
        assert_eq!(
            classify_license("MIT OR GPL-2.0"),
            Permissivity::Permissive
        );
    }

    #[test]
    fn empty_and_unmatched_strings() {
        assert_eq!(classify_license(""), Permissivity::None);
        assert_eq!(classify_license("   "), Permissivity::None);
        assert_eq!(
            classify_license("Custom-Proprietary"),
            Permissivity::Unknown
        );
    }

    #[test]
    fn raw_record_classification() {
        let raw = RawLicenseRecord {
            name: "requests".to_string(),
            license: "Apache Software License".to_string(),
            author: "Kenneth Reitz".to_string(),
            license_file: String::new(),
            notice_file: String::new(),
        };
        let rec = LicenseRecord::from_raw(raw);
        assert_eq!(rec.permissivity, Permissivity::Permissive);
        assert_eq!(rec.name, "requests");
    }

    #[test]
    fn raw_record_tolerates_missing_columns() {
        let rec: RawLicenseRecord =
            serde_json::from_str(r#"{"Name": "flask", "License": "BSD License"}"#).unwrap();
        assert_eq!(rec.author, "");
        assert_eq!(rec.notice_file, "");
    }
}
