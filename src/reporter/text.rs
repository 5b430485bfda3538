//! Human-readable text reporter.

use super::Reporter;
use crate::models::{Permissivity, Report, Severity};

/// Text format reporter for terminal output.
pub struct TextReporter {
    /// Use colors in output
    use_colors: bool,

    /// Show origin paths in the dependency listing
    show_origins: bool,
}

impl TextReporter {
    /// Create a new text reporter.
    pub fn new() -> Self {
        Self {
            use_colors: true,
            show_origins: true,
        }
    }

    /// Disable colors.
    pub fn without_colors(mut self) -> Self {
        self.use_colors = false;
        self
    }

    /// Hide origin paths.
    pub fn without_origins(mut self) -> Self {
        self.show_origins = false;
        self
    }

    /// Get severity color code.
    fn severity_color(&self, severity: Severity) -> &'static str {
        if !self.use_colors {
            return "";
        }
        match severity {
            Severity::Critical => "\x1b[91m", // Bright red
            Severity::High => "\x1b[31m",     // Red
            Severity::Medium => "\x1b[33m",   // Yellow
            Severity::Low => "\x1b[36m",      // Cyan
            Severity::Unknown => "\x1b[37m",  // White
        }
    }

    /// Reset color.
    fn reset(&self) -> &'static str {
        if self.use_colors {
            "\x1b[0m"
        } else {
            ""
        }
    }

    /// Bold text.
    fn bold(&self) -> &'static str {
        if self.use_colors {
            "\x1b[1m"
        } else {
            ""
        }
    }

    /// Dim text.
    fn dim(&self) -> &'static str {
        if self.use_colors {
            "\x1b[2m"
        } else {
            ""
        }
    }
}

impl Default for TextReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for TextReporter {
    fn generate(&self, report: &Report) -> String {
        let mut output = String::new();

        // Header
        output.push_str(&format!(
            "\n{}=== Dependency Audit Report ==={}\n\n",
            self.bold(),
            self.reset()
        ));
        output.push_str(&format!(
            "{}Generated:{} {}\n",
            self.bold(),
            self.reset(),
            report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        output.push_str(&format!(
            "{}Dependencies:{} {}\n\n",
            self.bold(),
            self.reset(),
            report.dependencies.len()
        ));

        // Dependency listing
        if !report.dependencies.is_empty() {
            output.push_str(&format!(
                "{}--- Dependencies ---{}\n",
                self.bold(),
                self.reset()
            ));
            for pkg in &report.dependencies {
                let vulnerable = report
                    .vulnerabilities
                    .get(&pkg.key())
                    .map(|v| !v.is_empty())
                    .unwrap_or(false);
                let marker = if vulnerable {
                    format!("{}!{}", self.severity_color(Severity::High), self.reset())
                } else {
                    " ".to_string()
                };

                output.push_str(&format!("{} {} {}", marker, pkg.name, pkg.version));
                if let Some(ref constraint) = pkg.constraint {
                    output.push_str(&format!(" {}({}){}", self.dim(), constraint, self.reset()));
                }
                if let Some(ref author) = pkg.author {
                    if !author.is_empty() {
                        output.push_str(&format!(" {}by {}{}", self.dim(), author, self.reset()));
                    }
                }
                output.push('\n');

                if self.show_origins {
                    if let Some(ref origin) = pkg.origin {
                        output.push_str(&format!(
                            "    {}origin: {}{}\n",
                            self.dim(),
                            origin,
                            self.reset()
                        ));
                    }
                }
            }
            output.push('\n');
        }

        // Vulnerability summary
        let all_vulns: Vec<_> = report.vulnerabilities.values().flatten().collect();
        let count_of = |s: Severity| all_vulns.iter().filter(|v| v.severity == s).count();
        let critical = count_of(Severity::Critical);
        let high = count_of(Severity::High);

        output.push_str(&format!(
            "{}--- Vulnerabilities ---{}\n",
            self.bold(),
            self.reset()
        ));
        output.push_str(&format!(
            "  {}CRITICAL:{} {}\n",
            self.severity_color(Severity::Critical),
            self.reset(),
            critical
        ));
        output.push_str(&format!(
            "  {}HIGH:{} {}\n",
            self.severity_color(Severity::High),
            self.reset(),
            high
        ));
        output.push_str(&format!(
            "  {}MEDIUM:{} {}\n",
            self.severity_color(Severity::Medium),
            self.reset(),
            count_of(Severity::Medium)
        ));
        output.push_str(&format!(
            "  {}LOW:{} {}\n",
            self.severity_color(Severity::Low),
            self.reset(),
            count_of(Severity::Low)
        ));
        output.push_str(&format!(
            "  {}UNKNOWN:{} {}\n\n",
            self.severity_color(Severity::Unknown),
            self.reset(),
            count_of(Severity::Unknown)
        ));

        // Per-package advisory detail
        let mut affected: Vec<_> = report
            .vulnerabilities
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .collect();
        affected.sort_by(|a, b| a.0.cmp(b.0));

        if affected.is_empty() {
            output.push_str(&format!(
                "{}No known vulnerabilities.{}\n\n",
                self.dim(),
                self.reset()
            ));
        } else {
            for (name, vulns) in affected {
                output.push_str(&format!(
                    "{}{}{} ({} advisories)\n",
                    self.bold(),
                    name,
                    self.reset(),
                    vulns.len()
                ));
                for vuln in vulns {
                    output.push_str(&format!(
                        "  {}[{}]{} {} ",
                        self.severity_color(vuln.severity),
                        vuln.severity,
                        self.reset(),
                        vuln.id
                    ));
                    if let Some(score) = vuln.cvss_score {
                        output.push_str(&format!("{}(CVSS {}){} ", self.dim(), score, self.reset()));
                    }
                    output.push_str(&vuln.summary);
                    output.push('\n');
                }
            }
            output.push('\n');
        }

        // License summary
        if !report.licenses.is_empty() {
            let perm_count = |p: Permissivity| {
                report
                    .licenses
                    .iter()
                    .filter(|l| l.permissivity == p)
                    .count()
            };
            output.push_str(&format!(
                "{}--- Licenses ---{}\n",
                self.bold(),
                self.reset()
            ));
            output.push_str(&format!(
                "  permissive: {}  restrictive: {}  unknown: {}  none: {}\n",
                perm_count(Permissivity::Permissive),
                perm_count(Permissivity::Restrictive),
                perm_count(Permissivity::Unknown),
                perm_count(Permissivity::None)
            ));
            for lic in report
                .licenses
                .iter()
                .filter(|l| l.permissivity == Permissivity::Restrictive)
            {
                output.push_str(&format!(
                    "  {}restrictive:{} {} ({})\n",
                    self.severity_color(Severity::Medium),
                    self.reset(),
                    lic.name,
                    lic.license
                ));
            }
            output.push('\n');
        }

        // Static-analysis findings
        if !report.findings.is_empty() {
            output.push_str(&format!(
                "{}--- Code Findings ---{}\n",
                self.bold(),
                self.reset()
            ));
            for finding in &report.findings {
                output.push_str(&format!(
                    "  {}:{} - {} {}\n",
                    finding.filename, finding.line_number, finding.check_id, finding.message
                ));
            }
            output.push('\n');
        }

        if critical > 0 || high > 0 {
            output.push_str(&format!(
                "{}WARNING: Critical or high severity vulnerabilities found. Review required.{}\n",
                if self.use_colors { "\x1b[31m" } else { "" },
                self.reset()
            ));
        }

        output
    }
}
