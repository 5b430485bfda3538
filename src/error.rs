//! Error types for the dependency auditor.

use thiserror::Error;

/// Main error type for the dependency auditor.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Dependency resolution failed: {0}")]
    Resolver(String),

    #[error("{tool} is not installed or not on PATH: {hint}")]
    ToolMissing { tool: String, hint: String },

    #[error("{tool} timed out after {seconds}s")]
    ToolTimeout { tool: String, seconds: u64 },

    #[error("OSV query failed: {0}")]
    Osv(String),

    #[error("Metadata lookup failed: {0}")]
    Metadata(String),

    #[error("License enumeration failed: {0}")]
    License(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for auditor operations.
pub type Result<T> = std::result::Result<T, AuditError>;

impl AuditError {
    /// Build a tool-missing error with an install hint.
    pub fn tool_missing(tool: &str, hint: &str) -> Self {
        AuditError::ToolMissing {
            tool: tool.to_string(),
            hint: hint.to_string(),
        }
    }
}
