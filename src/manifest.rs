//! Manifest (requirements file) parsing.
//!
//! One dependency specifier per line; `#` comment lines and blank lines are
//! ignored. Input encoding is sniffed before decoding so manifests saved by
//! legacy tooling (latin-1, UTF-16) still parse. Malformed lines are skipped
//! with a recorded warning; a bad line never aborts the parse.

use std::path::Path;
use std::str::FromStr;

use once_cell::sync::Lazy;
use pep440_rs::VersionSpecifiers;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{ParseWarning, RequirementRecord};

/// `name[extras] specifier` with an optional extras bracket. The remainder
/// after the name/extras is handed to the PEP 440 specifier parser.
static REQUIREMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)\s*(\[[^\]]*\])?\s*(.*)$")
        .expect("requirement pattern is valid")
});

/// Result of parsing a manifest: the accepted records plus warnings for
/// every rejected line.
#[derive(Debug, Clone, Default)]
pub struct ParsedManifest {
    /// Direct dependencies, in declaration order
    pub requirements: Vec<RequirementRecord>,

    /// One warning per skipped line
    pub warnings: Vec<ParseWarning>,
}

/// Sniff the encoding of raw manifest bytes.
///
/// Detection looks at the first 4 KiB; an empty input falls back to UTF-8.
fn detect_encoding(bytes: &[u8]) -> &'static encoding_rs::Encoding {
    if bytes.is_empty() {
        return encoding_rs::UTF_8;
    }
    let mut detector = chardetng::EncodingDetector::new();
    let sample_len = bytes.len().min(4096);
    detector.feed(&bytes[..sample_len], sample_len == bytes.len());
    detector.guess(None, true)
}

/// Decode raw manifest bytes with encoding auto-detection.
///
/// Undecodable sequences are replaced rather than failing the parse.
pub fn decode_manifest(bytes: &[u8]) -> String {
    let encoding = detect_encoding(bytes);
    debug!("Detected manifest encoding: {}", encoding.name());
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!(
            "Manifest contained byte sequences invalid for {}; replaced",
            encoding.name()
        );
    }
    text.into_owned()
}

/// Parse a manifest file from disk.
///
/// Only I/O failure is fatal; every content-level problem degrades to a
/// recorded warning.
pub fn parse_file(path: &Path) -> Result<ParsedManifest> {
    let bytes = std::fs::read(path)?;
    Ok(parse_str(&decode_manifest(&bytes)))
}

/// Parse manifest text into requirement records.
pub fn parse_str(content: &str) -> ParsedManifest {
    let mut parsed = ParsedManifest::default();

    for (idx, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match parse_line(line) {
            Ok(record) => parsed.requirements.push(record),
            Err(reason) => {
                warn!("Skipping manifest line {}: '{}' ({})", idx + 1, line, reason);
                parsed.warnings.push(ParseWarning {
                    line_no: idx + 1,
                    line: line.to_string(),
                    reason,
                });
            }
        }
    }

    parsed
}

/// Parse one requirement line.
fn parse_line(line: &str) -> std::result::Result<RequirementRecord, String> {
    // Environment markers are accepted but not evaluated here
    let spec_part = line.split(';').next().unwrap_or(line);

    let caps = REQUIREMENT_RE
        .captures(spec_part)
        .ok_or_else(|| "not a package specifier".to_string())?;

    let name = caps
        .get(1)
        .map(|m| m.as_str().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| "missing package name".to_string())?;

    let rest = caps.get(3).map(|m| m.as_str().trim()).unwrap_or("");
    let specifier = if rest.is_empty() {
        String::new()
    } else {
        VersionSpecifiers::from_str(rest)
            .map_err(|e| format!("invalid version specifier: {}", e))?
            .to_string()
    };

    Ok(RequirementRecord {
        name,
        specifier,
        line: line.to_string(),
    })
}
