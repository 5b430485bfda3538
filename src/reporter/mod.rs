//! Reporting module for rendering audit reports.
//!
//! The report model itself is the external contract; these reporters are
//! the terminal-boundary renderings (document and graph emitters consume
//! the same `Report` shape out of process).

mod text;

pub use text::*;

use crate::config::OutputFormat;
use crate::models::Report;

/// Report renderer trait.
pub trait Reporter {
    /// Render a report to a string.
    fn generate(&self, report: &Report) -> String;
}

/// Create a reporter based on output format.
pub fn create_reporter(format: OutputFormat) -> Box<dyn Reporter> {
    match format {
        OutputFormat::Json => Box::new(JsonReporter::new()),
        OutputFormat::Text => Box::new(TextReporter::new()),
    }
}

/// JSON reporter for structured output.
pub struct JsonReporter;

impl JsonReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for JsonReporter {
    fn generate(&self, report: &Report) -> String {
        serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PackageRecord, Report};
    use std::collections::HashMap;

    #[test]
    fn json_reporter_emits_parseable_output() {
        let report = Report::assemble(
            vec![PackageRecord::new("requests", "2.28.1")],
            HashMap::new(),
            vec![],
            vec![],
        );
        let json = JsonReporter::new().generate(&report);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["dependencies"][0]["name"], "requests");
    }
}
