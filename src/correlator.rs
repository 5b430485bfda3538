//! Vulnerability correlation against the OSV database.
//!
//! Each resolved `(package, version)` pair is checked against OSV. Raw query
//! responses are cached keyed by a stable hash of `name==version`; a cache
//! hit is authoritative. Batch correlation is a local concurrency
//! optimization over the same per-package query primitive, so batch results
//! are identical to querying each package individually.
//!
//! Availability beats completeness here: a failed query is logged, counted,
//! and reported as zero vulnerabilities. Callers that need to distinguish
//! "clean" from "query failed" consult [`VulnerabilityCorrelator::stats`]
//! and the log channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cache::AuditCache;
use crate::concurrency::{LimiterConfig, QueryLimiter};
use crate::error::{AuditError, Result};
use crate::models::{canonical_name, PackageRecord, Severity, Vulnerability, VulnerabilitySource};

/// OSV ecosystem tag for this pipeline.
const OSV_ECOSYSTEM: &str = "PyPI";

// OSV API request/response types

#[derive(Debug, Serialize)]
struct OsvQueryRequest {
    package: OsvPackage,
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OsvPackage {
    name: String,
    ecosystem: String,
}

#[derive(Debug, Default, Deserialize)]
struct OsvQueryResponse {
    #[serde(default)]
    vulns: Vec<OsvAdvisory>,
}

#[derive(Debug, Deserialize)]
struct OsvAdvisory {
    id: String,
    summary: Option<String>,
    #[serde(default)]
    severity: Vec<OsvSeverity>,
    #[serde(default)]
    references: Vec<OsvReference>,
}

#[derive(Debug, Deserialize)]
struct OsvSeverity {
    #[serde(rename = "type")]
    severity_type: Option<String>,
    score: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsvReference {
    url: Option<String>,
}

/// HTTP client for the OSV query endpoint.
#[derive(Debug, Clone)]
pub struct OsvClient {
    client: Client,
    base_url: String,
}

impl OsvClient {
    /// Create a client against the given API base URL.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .user_agent(concat!("dep_auditor/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.into(),
        }
    }

    /// Query OSV for one package version; returns the raw response body.
    pub async fn query_raw(&self, name: &str, version: &str) -> Result<serde_json::Value> {
        debug!("Querying OSV for {}=={}", name, version);

        let request = OsvQueryRequest {
            package: OsvPackage {
                name: name.to_string(),
                ecosystem: OSV_ECOSYSTEM.to_string(),
            },
            version: version.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/query", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuditError::Osv(format!(
                "OSV API returned {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

/// Counters for distinguishing "no vulnerabilities" from "query failed".
#[derive(Debug, Default)]
pub struct CorrelatorStats {
    /// Packages answered from cache
    pub cache_hits: AtomicU64,

    /// Network queries issued
    pub queries: AtomicU64,

    /// Queries that failed and were reported as empty
    pub failures: AtomicU64,
}

/// Correlates resolved packages with known vulnerabilities.
#[derive(Clone)]
pub struct VulnerabilityCorrelator {
    client: OsvClient,
    cache: Arc<AuditCache>,
    limiter: Arc<QueryLimiter>,
    offline: bool,
    stats: Arc<CorrelatorStats>,
}

impl VulnerabilityCorrelator {
    /// Create a correlator over an injected cache.
    pub fn new(
        client: OsvClient,
        cache: Arc<AuditCache>,
        limiter_config: LimiterConfig,
        offline: bool,
    ) -> Self {
        Self {
            client,
            cache,
            limiter: Arc::new(QueryLimiter::new(limiter_config)),
            offline,
            stats: Arc::new(CorrelatorStats::default()),
        }
    }

    /// Query counters.
    pub fn stats(&self) -> &CorrelatorStats {
        &self.stats
    }

    /// Vulnerabilities for one package version.
    ///
    /// Never fails: cache miss in offline mode and any transport failure
    /// both yield an empty list.
    pub async fn query(&self, name: &str, version: &str) -> Vec<Vulnerability> {
        if let Some(raw) = self.cache.get_vulnerabilities(name, version) {
            match parse_response(&raw) {
                Some(vulns) => {
                    self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return vulns;
                }
                None => {
                    // Corrupted entry: fall through to a fresh query
                    warn!("Corrupted cache entry for {}=={}, ignoring", name, version);
                }
            }
        }

        if self.offline {
            debug!("Offline mode, no cache entry for {}=={}", name, version);
            return Vec::new();
        }

        let permit = self.limiter.acquire().await;
        self.stats.queries.fetch_add(1, Ordering::Relaxed);

        match self.client.query_raw(name, version).await {
            Ok(raw) => {
                permit.success();
                let vulns = parse_response(&raw).unwrap_or_default();
                self.cache.put_vulnerabilities(name, version, raw);
                vulns
            }
            Err(e) => {
                permit.failure();
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                error!("OSV query failed for {}=={}: {}", name, version, e);
                Vec::new()
            }
        }
    }

    /// Correlate a whole package set concurrently.
    ///
    /// Returns a map from canonical package name to its vulnerability list
    /// (empty lists included). One package's failure never aborts the rest;
    /// completion order is irrelevant because the result is keyed.
    pub async fn correlate_all(
        &self,
        packages: &[PackageRecord],
    ) -> HashMap<String, Vec<Vulnerability>> {
        let mut handles = Vec::with_capacity(packages.len());

        for pkg in packages {
            let correlator = self.clone();
            let name = pkg.name.clone();
            let version = pkg.version.clone();
            handles.push(tokio::spawn(async move {
                let vulns = correlator.query(&name, &version).await;
                (canonical_name(&name), vulns)
            }));
        }

        let mut results = HashMap::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok((name, vulns)) => {
                    results.insert(name, vulns);
                }
                Err(e) => {
                    error!("Vulnerability query task panicked: {}", e);
                }
            }
        }

        let affected = results.values().filter(|v| !v.is_empty()).count();
        info!(
            "Correlated {} packages: {} with known vulnerabilities",
            results.len(),
            affected
        );
        results
    }
}

/// Parse a raw OSV response into normalized vulnerabilities.
///
/// `None` means the payload does not look like an OSV response at all
/// (a corrupted cache entry); individual malformed advisory fields degrade
/// to sentinels instead.
fn parse_response(raw: &serde_json::Value) -> Option<Vec<Vulnerability>> {
    let response: OsvQueryResponse = serde_json::from_value(raw.clone()).ok()?;
    Some(response.vulns.into_iter().map(normalize_advisory).collect())
}

/// Normalize one raw advisory.
fn normalize_advisory(adv: OsvAdvisory) -> Vulnerability {
    let cvss_score = extract_cvss_v3(&adv);
    let severity = cvss_score
        .map(Severity::from_cvss)
        .unwrap_or(Severity::Unknown);

    // Only well-formed reference entries carry a URL; the rest are dropped
    let references = adv
        .references
        .into_iter()
        .filter_map(|r| r.url)
        .collect();

    Vulnerability {
        id: adv.id,
        summary: adv
            .summary
            .unwrap_or_else(|| "No summary available".to_string()),
        severity,
        cvss_score,
        references,
        source: VulnerabilitySource::Osv,
    }
}

/// First CVSS v3 entry with a numeric score, if any.
fn extract_cvss_v3(adv: &OsvAdvisory) -> Option<f64> {
    adv.severity
        .iter()
        .filter(|s| s.severity_type.as_deref() == Some("CVSS_V3"))
        .find_map(|s| s.score.as_deref().and_then(|score| score.parse::<f64>().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advisory_json(id: &str, score: Option<&str>) -> serde_json::Value {
        let severity = match score {
            Some(s) => serde_json::json!([{"type": "CVSS_V3", "score": s}]),
            None => serde_json::json!([]),
        };
        serde_json::json!({
            "id": id,
            "summary": "test advisory",
            "severity": severity,
            "references": [
                {"type": "WEB", "url": "https://example.com/advisory"},
                {"type": "WEB"}
            ]
        })
    }

    fn offline_correlator(cache: Arc<AuditCache>) -> VulnerabilityCorrelator {
        VulnerabilityCorrelator::new(
            OsvClient::new("http://localhost:9", Duration::from_secs(1)),
            cache,
            LimiterConfig::default(),
            true,
        )
    }

    #[test]
    fn normalizes_scored_advisory() {
        let raw = serde_json::json!({"vulns": [advisory_json("PYSEC-0001", Some("9.8"))]});
        let vulns = parse_response(&raw).unwrap();

        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].id, "PYSEC-0001");
        assert_eq!(vulns[0].severity, Severity::Critical);
        assert_eq!(vulns[0].cvss_score, Some(9.8));
        // The url-less reference entry is dropped
        assert_eq!(vulns[0].references, vec!["https://example.com/advisory"]);
    }

    #[test]
    fn missing_score_yields_unknown_severity() {
        let raw = serde_json::json!({"vulns": [advisory_json("PYSEC-0002", None)]});
        let vulns = parse_response(&raw).unwrap();

        assert_eq!(vulns[0].severity, Severity::Unknown);
        assert_eq!(vulns[0].cvss_score, None);
    }

    #[test]
    fn non_numeric_score_yields_unknown_severity() {
        let raw = serde_json::json!({
            "vulns": [{
                "id": "PYSEC-0003",
                "severity": [{"type": "CVSS_V3", "score": "CVSS:3.1/AV:N/AC:L"}]
            }]
        });
        let vulns = parse_response(&raw).unwrap();
        assert_eq!(vulns[0].severity, Severity::Unknown);
        assert_eq!(vulns[0].cvss_score, None);
    }

    #[test]
    fn first_parseable_cvss_v3_entry_wins() {
        let raw = serde_json::json!({
            "vulns": [{
                "id": "PYSEC-0004",
                "severity": [
                    {"type": "CVSS_V2", "score": "5.0"},
                    {"type": "CVSS_V3", "score": "not-a-number"},
                    {"type": "CVSS_V3", "score": "7.5"}
                ]
            }]
        });
        let vulns = parse_response(&raw).unwrap();
        assert_eq!(vulns[0].cvss_score, Some(7.5));
        assert_eq!(vulns[0].severity, Severity::High);
    }

    #[test]
    fn missing_summary_gets_placeholder() {
        let raw = serde_json::json!({"vulns": [{"id": "PYSEC-0005"}]});
        let vulns = parse_response(&raw).unwrap();
        assert_eq!(vulns[0].summary, "No summary available");
    }

    #[test]
    fn empty_response_parses_to_no_vulns() {
        assert!(parse_response(&serde_json::json!({})).unwrap().is_empty());
        assert!(parse_response(&serde_json::json!({"vulns": []}))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn garbage_payload_is_rejected() {
        assert!(parse_response(&serde_json::json!({"vulns": "nope"})).is_none());
        assert!(parse_response(&serde_json::json!("just a string")).is_none());
    }

    #[tokio::test]
    async fn offline_with_empty_cache_returns_empty_never_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(AuditCache::open(dir.path()).unwrap());
        let correlator = offline_correlator(cache);

        for (name, version) in [("requests", "2.19.0"), ("flask", "2.1.0")] {
            assert!(correlator.query(name, version).await.is_empty());
        }
        assert_eq!(correlator.stats().queries.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn offline_serves_cached_responses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(AuditCache::open(dir.path()).unwrap());
        cache.put_vulnerabilities(
            "requests",
            "2.19.0",
            serde_json::json!({"vulns": [advisory_json("PYSEC-0006", Some("6.1"))]}),
        );

        let correlator = offline_correlator(cache);
        let vulns = correlator.query("Requests", "2.19.0").await;

        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].severity, Severity::Medium);
        assert_eq!(correlator.stats().cache_hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn corrupted_cache_entry_is_empty_in_offline_mode() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(AuditCache::open(dir.path()).unwrap());
        cache.put_vulnerabilities("requests", "2.19.0", serde_json::json!({"vulns": 42}));

        let correlator = offline_correlator(cache);
        assert!(correlator.query("requests", "2.19.0").await.is_empty());
    }

    #[tokio::test]
    async fn batch_matches_per_package_queries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(AuditCache::open(dir.path()).unwrap());
        cache.put_vulnerabilities(
            "requests",
            "2.19.0",
            serde_json::json!({"vulns": [advisory_json("PYSEC-0007", Some("8.1"))]}),
        );

        let correlator = offline_correlator(cache);
        let packages = vec![
            PackageRecord::new("Requests", "2.19.0"),
            PackageRecord::new("flask", "2.1.0"),
        ];

        let batch = correlator.correlate_all(&packages).await;
        assert_eq!(batch.len(), 2);

        for pkg in &packages {
            let individual = correlator.query(&pkg.name, &pkg.version).await;
            let from_batch = &batch[&pkg.key()];
            assert_eq!(from_batch.len(), individual.len());
            for (a, b) in from_batch.iter().zip(individual.iter()) {
                assert_eq!(a.id, b.id);
                assert_eq!(a.severity, b.severity);
            }
        }
    }
}
