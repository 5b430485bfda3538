//! License collection and classification.
//!
//! Raw license rows come from an external enumeration tool over the
//! materialized environment; classification itself is pure (see
//! [`crate::models::classify_license`]). The full dataset is cached as one
//! entry so offline runs can still classify.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::cache::AuditCache;
use crate::error::{AuditError, Result};
use crate::models::{LicenseRecord, RawLicenseRecord};

/// External license-enumeration capability.
#[async_trait]
pub trait LicenseSource: Send + Sync {
    /// Enumerate raw license rows for every installed package.
    async fn collect(&self) -> Result<Vec<RawLicenseRecord>>;
}

/// Production source driving the `pip-licenses` tool.
pub struct PipLicensesSource {
    program: String,
    tool_timeout: Duration,
}

impl PipLicensesSource {
    /// Create a source running the given executable.
    pub fn new(program: impl Into<String>, tool_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            tool_timeout,
        }
    }
}

#[async_trait]
impl LicenseSource for PipLicensesSource {
    async fn collect(&self) -> Result<Vec<RawLicenseRecord>> {
        debug!("Running {} for license enumeration", self.program);

        let mut command = Command::new(&self.program);
        command.args([
            "--format=json",
            "--with-authors",
            "--with-license-file",
            "--with-notice",
        ]);

        let output = match tokio::time::timeout(self.tool_timeout, command.output()).await {
            Err(_) => {
                return Err(AuditError::ToolTimeout {
                    tool: self.program.clone(),
                    seconds: self.tool_timeout.as_secs(),
                })
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuditError::tool_missing(
                    &self.program,
                    "install it with `pip install pip-licenses`",
                ))
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuditError::License(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let rows: Vec<RawLicenseRecord> = serde_json::from_slice(&output.stdout)
            .map_err(|e| AuditError::License(format!("unreadable tool output: {}", e)))?;
        Ok(rows)
    }
}

/// In-memory source over fixed rows, for tests and offline replays.
#[derive(Debug, Clone, Default)]
pub struct StaticLicenseSource {
    rows: Vec<RawLicenseRecord>,
}

impl StaticLicenseSource {
    /// Create a source that always reports the given rows.
    pub fn new(rows: Vec<RawLicenseRecord>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl LicenseSource for StaticLicenseSource {
    async fn collect(&self) -> Result<Vec<RawLicenseRecord>> {
        Ok(self.rows.clone())
    }
}

/// Collects and classifies license records, caching the raw dataset.
pub struct LicenseAuditor {
    source: Box<dyn LicenseSource>,
    cache: Arc<AuditCache>,
    offline: bool,
}

impl LicenseAuditor {
    /// Create an auditor over an injected source and cache.
    pub fn new(source: Box<dyn LicenseSource>, cache: Arc<AuditCache>, offline: bool) -> Self {
        Self {
            source,
            cache,
            offline,
        }
    }

    /// Collect and classify the license dataset.
    ///
    /// Offline mode reads the cached dataset; a missing or corrupt cache
    /// yields an empty (but valid) result with a warning. Online mode
    /// refreshes the cache with whatever the tool reported.
    pub async fn collect(&self) -> Result<Vec<LicenseRecord>> {
        let rows = if self.offline {
            match self.cache.get_license_dataset() {
                Some(rows) => rows,
                None => {
                    warn!("No cached license dataset available in offline mode");
                    Vec::new()
                }
            }
        } else {
            let rows = self.source.collect().await?;
            self.cache.put_license_dataset(rows.clone());
            rows
        };

        let records: Vec<LicenseRecord> =
            rows.into_iter().map(LicenseRecord::from_raw).collect();
        info!("Classified {} license records", records.len());
        Ok(records)
    }
}
