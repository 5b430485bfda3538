//! Configuration management for the dependency auditor.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::concurrency::LimiterConfig;
use crate::graph::OriginLimits;
use crate::models::Severity;

/// Main configuration for the audit pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// External resolver (package manager) configuration
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// OSV API configuration
    #[serde(default)]
    pub osv: OsvConfig,

    /// PyPI metadata API configuration
    #[serde(default)]
    pub pypi: PyPiConfig,

    /// Audit stage toggles and limits
    #[serde(default)]
    pub audit: AuditConfig,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Concurrency settings for vulnerability queries
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

/// External resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Host interpreter used to create the ephemeral environment
    #[serde(default = "default_python")]
    pub python: String,

    /// Timeout for each external-tool invocation, in seconds
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// License-enumeration executable
    #[serde(default = "default_license_tool")]
    pub license_tool: String,
}

/// OSV API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsvConfig {
    /// API base URL
    #[serde(default = "default_osv_api_url")]
    pub api_url: String,

    /// Per-request timeout, in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

/// PyPI metadata API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PyPiConfig {
    /// API base URL
    #[serde(default = "default_pypi_api_url")]
    pub api_url: String,

    /// Per-request timeout, in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

/// Audit stage toggles and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Correlate packages against the vulnerability database
    #[serde(default = "default_true")]
    pub enable_cve: bool,

    /// Collect and classify licenses
    #[serde(default = "default_true")]
    pub enable_licenses: bool,

    /// Look up package authors on PyPI
    #[serde(default)]
    pub enable_authors: bool,

    /// Cache-only operation: no network, no subprocess license enumeration
    #[serde(default)]
    pub offline: bool,

    /// Minimum severity shown in rendered reports (the pipeline itself
    /// always reports everything it found)
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,

    /// Ceiling on origin-path length
    #[serde(default = "default_max_path_depth")]
    pub max_path_depth: usize,

    /// Ceiling on recorded origin paths per package
    #[serde(default = "default_max_paths_per_node")]
    pub max_paths_per_node: usize,

    /// Cache directory (platform cache dir if not specified)
    pub cache_dir: Option<PathBuf>,
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Output file path (stdout if not specified)
    pub output_path: Option<PathBuf>,
}

/// Concurrency settings for vulnerability queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Starting number of concurrent queries
    #[serde(default = "default_initial_queries")]
    pub initial_queries: usize,

    /// Lower bound on concurrent queries
    #[serde(default = "default_min_queries")]
    pub min_queries: usize,

    /// Upper bound on concurrent queries
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,

    /// Average query latency (ms) above which concurrency backs off
    #[serde(default = "default_latency_threshold_ms")]
    pub latency_threshold_ms: u64,
}

/// Output format enumeration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

// Default value functions

fn default_python() -> String {
    "python3".to_string()
}

fn default_tool_timeout() -> u64 {
    600
}

fn default_license_tool() -> String {
    "pip-licenses".to_string()
}

fn default_osv_api_url() -> String {
    "https://api.osv.dev/v1".to_string()
}

fn default_pypi_api_url() -> String {
    "https://pypi.org".to_string()
}

fn default_http_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_min_severity() -> Severity {
    Severity::Unknown
}

fn default_max_path_depth() -> usize {
    64
}

fn default_max_paths_per_node() -> usize {
    1024
}

fn default_initial_queries() -> usize {
    8
}

fn default_min_queries() -> usize {
    1
}

fn default_max_queries() -> usize {
    64
}

fn default_latency_threshold_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            osv: OsvConfig::default(),
            pypi: PyPiConfig::default(),
            audit: AuditConfig::default(),
            output: OutputConfig::default(),
            concurrency: ConcurrencyConfig::default(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            tool_timeout_secs: default_tool_timeout(),
            license_tool: default_license_tool(),
        }
    }
}

impl Default for OsvConfig {
    fn default() -> Self {
        Self {
            api_url: default_osv_api_url(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl Default for PyPiConfig {
    fn default() -> Self {
        Self {
            api_url: default_pypi_api_url(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enable_cve: true,
            enable_licenses: true,
            enable_authors: false,
            offline: false,
            min_severity: default_min_severity(),
            max_path_depth: default_max_path_depth(),
            max_paths_per_node: default_max_paths_per_node(),
            cache_dir: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            output_path: None,
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            initial_queries: default_initial_queries(),
            min_queries: default_min_queries(),
            max_queries: default_max_queries(),
            latency_threshold_ms: default_latency_threshold_ms(),
        }
    }
}

impl ResolverConfig {
    /// Tool timeout as a duration.
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

impl AuditConfig {
    /// Origin-enumeration ceilings from this configuration.
    pub fn origin_limits(&self) -> OriginLimits {
        OriginLimits {
            max_path_depth: self.max_path_depth,
            max_paths_per_node: self.max_paths_per_node,
        }
    }
}

impl ConcurrencyConfig {
    /// Query-limiter configuration from these settings.
    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            initial_limit: self.initial_queries,
            min_limit: self.min_queries,
            max_limit: self.max_queries,
            latency_threshold: Duration::from_millis(self.latency_threshold_ms),
            ..LimiterConfig::default()
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Create a configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for creating configurations programmatically.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn enable_cve(mut self, enable: bool) -> Self {
        self.config.audit.enable_cve = enable;
        self
    }

    pub fn enable_licenses(mut self, enable: bool) -> Self {
        self.config.audit.enable_licenses = enable;
        self
    }

    pub fn enable_authors(mut self, enable: bool) -> Self {
        self.config.audit.enable_authors = enable;
        self
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.config.audit.offline = offline;
        self
    }

    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.config.audit.min_severity = severity;
        self
    }

    pub fn cache_dir(mut self, dir: PathBuf) -> Self {
        self.config.audit.cache_dir = Some(dir);
        self
    }

    pub fn python(mut self, python: impl Into<String>) -> Self {
        self.config.resolver.python = python.into();
        self
    }

    pub fn osv_api_url(mut self, url: impl Into<String>) -> Self {
        self.config.osv.api_url = url.into();
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output.format = format;
        self
    }

    pub fn output_path(mut self, path: PathBuf) -> Self {
        self.config.output.output_path = Some(path);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
