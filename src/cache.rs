//! Persistent audit cache.
//!
//! An explicit capability object handed to the correlator and license
//! auditor (opened at pipeline start, flushed at pipeline end) rather than
//! ambient global state. Three sections, one JSON file each:
//!
//! - vulnerability responses, keyed by a stable hash of `name==version`
//! - the full license dataset (a single entry)
//! - PyPI author metadata, keyed by canonical package name
//!
//! Entries are raw payloads; a section or entry that fails to deserialize
//! is treated as a cache miss, never as a fatal error. A cache hit is
//! authoritative: refresh policy is an external concern.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{canonical_name, RawLicenseRecord};

/// Persist the vulnerability section every N inserts, so interrupted runs
/// keep what they already paid for.
const VULN_PERSIST_INTERVAL: usize = 16;

#[derive(Debug, Default)]
struct CacheInner {
    /// hash(name==version) -> raw vulnerability-query response
    vulns: HashMap<String, serde_json::Value>,

    /// Raw license dataset from the enumeration tool
    licenses: Option<Vec<RawLicenseRecord>>,

    /// canonical package name -> author string
    authors: HashMap<String, String>,
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub vuln_entries: usize,
    pub author_entries: usize,
    pub has_license_dataset: bool,
    pub cache_dir: PathBuf,
}

/// Persistent key-value cache shared across pipeline stages.
///
/// Interior mutability so one `Arc<AuditCache>` serves concurrent
/// vulnerability queries; writers never target the same key in correct
/// operation, and last-write-wins is acceptable when they do.
pub struct AuditCache {
    cache_dir: PathBuf,
    vuln_path: PathBuf,
    license_path: PathBuf,
    author_path: PathBuf,
    inner: RwLock<CacheInner>,
}

impl AuditCache {
    /// Open (creating if needed) a cache rooted at the given directory.
    pub fn open(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir)?;

        let cache = Self {
            vuln_path: cache_dir.join("osv_cache.json"),
            license_path: cache_dir.join("licenses.json"),
            author_path: cache_dir.join("pypi_metadata.json"),
            cache_dir,
            inner: RwLock::new(CacheInner::default()),
        };

        {
            let mut inner = cache.inner.write();
            inner.vulns = load_section(&cache.vuln_path).unwrap_or_default();
            inner.licenses = load_section(&cache.license_path);
            inner.authors = load_section(&cache.author_path).unwrap_or_default();

            info!(
                "Cache opened: {} vulnerability entries, {} author entries, license dataset {}",
                inner.vulns.len(),
                inner.authors.len(),
                if inner.licenses.is_some() {
                    "present"
                } else {
                    "absent"
                }
            );
        }

        Ok(cache)
    }

    /// Open the cache in the default location (`~/.cache/dep_auditor`).
    pub fn default_cache() -> Result<Self> {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self::open(base.join("dep_auditor"))
    }

    /// Stable cache key for a `(package, version)` pair.
    ///
    /// SHA-256 of `name==version` with the name case-normalized, so the
    /// key survives casing drift between data sources.
    pub fn vulnerability_key(name: &str, version: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}=={}", canonical_name(name), version).as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Cached raw vulnerability response for a package version.
    pub fn get_vulnerabilities(&self, name: &str, version: &str) -> Option<serde_json::Value> {
        let key = Self::vulnerability_key(name, version);
        self.inner.read().vulns.get(&key).cloned()
    }

    /// Store the raw vulnerability response for a package version.
    pub fn put_vulnerabilities(&self, name: &str, version: &str, raw: serde_json::Value) {
        let key = Self::vulnerability_key(name, version);
        let len = {
            let mut inner = self.inner.write();
            inner.vulns.insert(key, raw);
            inner.vulns.len()
        };

        if len % VULN_PERSIST_INTERVAL == 0 {
            if let Err(e) = self.persist_vulns() {
                warn!("Failed to persist vulnerability cache: {}", e);
            }
        }
    }

    /// Cached license dataset, if one was stored.
    pub fn get_license_dataset(&self) -> Option<Vec<RawLicenseRecord>> {
        self.inner.read().licenses.clone()
    }

    /// Store the full license dataset.
    pub fn put_license_dataset(&self, dataset: Vec<RawLicenseRecord>) {
        self.inner.write().licenses = Some(dataset);
    }

    /// Cached author string for a package.
    pub fn get_author(&self, name: &str) -> Option<String> {
        self.inner.read().authors.get(&canonical_name(name)).cloned()
    }

    /// Store an author string (empty string is a valid, cachable answer).
    pub fn put_author(&self, name: &str, author: &str) {
        self.inner
            .write()
            .authors
            .insert(canonical_name(name), author.to_string());
    }

    /// Persist every section to disk.
    pub fn flush(&self) -> Result<()> {
        self.persist_vulns()?;

        let inner = self.inner.read();
        if let Some(ref dataset) = inner.licenses {
            write_section(&self.license_path, dataset)?;
        }
        write_section(&self.author_path, &inner.authors)?;

        debug!("Cache flushed to {}", self.cache_dir.display());
        Ok(())
    }

    fn persist_vulns(&self) -> Result<()> {
        let inner = self.inner.read();
        write_section(&self.vuln_path, &inner.vulns)
    }

    /// Drop every entry and remove the backing files.
    pub fn clear(&self) -> Result<()> {
        {
            let mut inner = self.inner.write();
            inner.vulns.clear();
            inner.licenses = None;
            inner.authors.clear();
        }
        for path in [&self.vuln_path, &self.license_path, &self.author_path] {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        info!("Cache cleared");
        Ok(())
    }

    /// Current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        CacheStats {
            vuln_entries: inner.vulns.len(),
            author_entries: inner.authors.len(),
            has_license_dataset: inner.licenses.is_some(),
            cache_dir: self.cache_dir.clone(),
        }
    }
}

impl Drop for AuditCache {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush cache on shutdown: {}", e);
        }
    }
}

/// Load one cache section; any read or parse failure is a miss.
fn load_section<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Unreadable cache file {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                "Corrupted cache file {} treated as empty: {}",
                path.display(),
                e
            );
            None
        }
    }
}

fn write_section<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}
