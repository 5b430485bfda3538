//! dep_auditor - Dependency Security Auditing Pipeline
//!
//! Audits a package manifest end to end: resolves the full transitive
//! dependency set through an external package manager, computes every
//! root-to-package origin path over the dependency graph, correlates each
//! resolved version against the OSV vulnerability database, classifies
//! license permissiveness, and merges everything into one queryable report.
//!
//! # Architecture
//!
//! Stages run in order, each completing before the next:
//!
//! ```text
//! manifest -> resolver -> graph/origins -> {OSV correlation, licenses} -> report
//! ```
//!
//! External tools (package manager, tree inspection, license enumeration)
//! sit behind narrow capability traits so the pipeline is testable with
//! in-memory substitutes. Vulnerability queries fan out concurrently under
//! an adaptive limit; results land in a name-keyed map, so completion order
//! never matters.
//!
//! # Example Usage
//!
//! ```no_run
//! use dep_auditor::{AuditPipeline, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = AuditPipeline::new(Config::default())?;
//!     let report = pipeline.run(std::path::Path::new("requirements.txt")).await?;
//!     println!("{} dependencies audited", report.dependencies.len());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod concurrency;
pub mod config;
pub mod correlator;
pub mod error;
pub mod graph;
pub mod licenses;
pub mod manifest;
pub mod models;
pub mod pypi;
pub mod reporter;
pub mod resolver;

// Re-export commonly used types
pub use config::{Config, OutputFormat};
pub use error::{AuditError, Result};
pub use graph::{DependencyGraph, OriginMap};
pub use models::{
    LicenseRecord, PackageRecord, Permissivity, Report, RequirementRecord, Severity,
    Vulnerability,
};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use cache::AuditCache;
use correlator::{OsvClient, VulnerabilityCorrelator};
use licenses::{LicenseAuditor, LicenseSource, PipLicensesSource};
use models::{canonical_name, AnalysisFinding};
use pypi::PyPiMetadataClient;
use resolver::{DependencyResolver, PipResolver};

/// Main pipeline orchestrating all audit stages.
pub struct AuditPipeline {
    /// Configuration
    config: Config,

    /// Shared persistent cache
    cache: Arc<AuditCache>,

    /// External dependency-resolution capability
    resolver: Box<dyn DependencyResolver>,

    /// Vulnerability correlator
    correlator: VulnerabilityCorrelator,

    /// License auditor
    licenses: LicenseAuditor,

    /// PyPI metadata client
    metadata: PyPiMetadataClient,
}

impl AuditPipeline {
    /// Create a pipeline with the production capabilities.
    pub fn new(config: Config) -> Result<Self> {
        let resolver = Box::new(PipResolver::new(
            config.resolver.python.clone(),
            config.resolver.tool_timeout(),
        ));
        let license_source = Box::new(PipLicensesSource::new(
            config.resolver.license_tool.clone(),
            config.resolver.tool_timeout(),
        ));
        Self::with_capabilities(config, resolver, license_source)
    }

    /// Create a pipeline with injected external capabilities.
    ///
    /// Lets tests and replays substitute in-memory implementations for the
    /// package manager and the license tool.
    pub fn with_capabilities(
        config: Config,
        resolver: Box<dyn DependencyResolver>,
        license_source: Box<dyn LicenseSource>,
    ) -> Result<Self> {
        let cache = Arc::new(match config.audit.cache_dir {
            Some(ref dir) => AuditCache::open(dir)?,
            None => AuditCache::default_cache()?,
        });

        let correlator = VulnerabilityCorrelator::new(
            OsvClient::new(
                config.osv.api_url.clone(),
                Duration::from_secs(config.osv.timeout_secs),
            ),
            Arc::clone(&cache),
            config.concurrency.limiter_config(),
            config.audit.offline,
        );

        let licenses = LicenseAuditor::new(
            license_source,
            Arc::clone(&cache),
            config.audit.offline,
        );

        let metadata = PyPiMetadataClient::new(
            config.pypi.api_url.clone(),
            Duration::from_secs(config.pypi.timeout_secs),
            Arc::clone(&cache),
            config.audit.offline,
        );

        Ok(Self {
            config,
            cache,
            resolver,
            correlator,
            licenses,
            metadata,
        })
    }

    /// The pipeline's shared cache.
    pub fn cache(&self) -> &Arc<AuditCache> {
        &self.cache
    }

    /// Run the full audit.
    pub async fn run(&self, manifest: &Path) -> Result<Report> {
        self.run_with_findings(manifest, Vec::new()).await
    }

    /// Run the full audit, carrying externally produced static-analysis
    /// findings into the report untouched.
    pub async fn run_with_findings(
        &self,
        manifest: &Path,
        findings: Vec<AnalysisFinding>,
    ) -> Result<Report> {
        let start = Instant::now();
        info!("Starting audit of {}", manifest.display());

        // Stage 1: parse the manifest
        let parsed = manifest::parse_file(manifest)?;
        info!(
            "Parsed {} direct dependencies ({} lines skipped)",
            parsed.requirements.len(),
            parsed.warnings.len()
        );

        // Stage 2: resolve the transitive closure (fatal on failure)
        let mut packages = self.resolver.install_and_list(manifest).await?;

        // Stage 3: build the graph and compute origins
        let tree = self.resolver.dependency_tree().await?;
        let graph = DependencyGraph::from_tree(&tree);
        let roots: Vec<String> = parsed
            .requirements
            .iter()
            .map(|r| r.name.clone())
            .collect();
        let origins = graph.compute_origins_with(&roots, self.config.audit.origin_limits());

        let constraints: HashMap<String, String> = parsed
            .requirements
            .iter()
            .map(|r| (canonical_name(&r.name), r.specifier.clone()))
            .collect();

        for pkg in &mut packages {
            let key = pkg.key();
            pkg.constraint = constraints.get(&key).cloned().filter(|s| !s.is_empty());
            pkg.origin = Some(origins.render(&key));
            if self.config.audit.enable_authors {
                pkg.author = Some(self.metadata.author(&pkg.name).await);
            }
        }

        // Stage 4: vulnerability correlation
        let vulnerabilities = if self.config.audit.enable_cve {
            self.correlator.correlate_all(&packages).await
        } else {
            HashMap::new()
        };

        // Stage 5: license classification
        let licenses = if self.config.audit.enable_licenses {
            match self.licenses.collect().await {
                Ok(records) => records,
                Err(e) => {
                    warn!("License collection failed: {}", e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        // Stage 6: aggregate. The report carries everything found; severity
        // floors are applied by renderers so exit-status checks see the
        // unfiltered correlation result.
        let report = Report::assemble(packages, vulnerabilities, licenses, findings);

        if let Err(e) = self.cache.flush() {
            warn!("Failed to flush cache: {}", e);
        }

        info!(
            "Audit complete: {} dependencies, {} vulnerable, in {}ms",
            report.dependencies.len(),
            report.vulnerable_packages().len(),
            start.elapsed().as_millis()
        );

        Ok(report)
    }

    /// Resolve the manifest and return `(package, serialized origin)` pairs
    /// for every package in the closure, without querying any database.
    pub async fn origin_map(&self, manifest: &Path) -> Result<Vec<(String, String)>> {
        let parsed = manifest::parse_file(manifest)?;
        let packages = self.resolver.install_and_list(manifest).await?;

        let tree = self.resolver.dependency_tree().await?;
        let graph = DependencyGraph::from_tree(&tree);
        let roots: Vec<String> = parsed
            .requirements
            .iter()
            .map(|r| r.name.clone())
            .collect();
        let origins = graph.compute_origins_with(&roots, self.config.audit.origin_limits());

        let mut rows: Vec<(String, String)> = packages
            .iter()
            .map(|pkg| (pkg.name.clone(), origins.render(&pkg.key())))
            .collect();
        rows.sort();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use licenses::StaticLicenseSource;
    use models::RawLicenseRecord;
    use resolver::{StaticResolver, TreeEntry};

    fn test_tree() -> Vec<TreeEntry> {
        serde_json::from_str(
            r#"[
                {"package": {"package_name": "Flask", "installed_version": "2.1.0"},
                 "dependencies": [{"package_name": "click"}, {"package_name": "Jinja2"}]},
                {"package": {"package_name": "click", "installed_version": "8.1.3"},
                 "dependencies": []},
                {"package": {"package_name": "Jinja2", "installed_version": "3.1.2"},
                 "dependencies": [{"package_name": "MarkupSafe"}]},
                {"package": {"package_name": "MarkupSafe", "installed_version": "2.1.1"},
                 "dependencies": []}
            ]"#,
        )
        .unwrap()
    }

    fn test_packages() -> Vec<PackageRecord> {
        vec![
            PackageRecord::new("Flask", "2.1.0"),
            PackageRecord::new("click", "8.1.3"),
            PackageRecord::new("Jinja2", "3.1.2"),
            PackageRecord::new("MarkupSafe", "2.1.1"),
        ]
    }

    fn test_pipeline(cache_dir: &std::path::Path) -> AuditPipeline {
        let config = Config::builder()
            .offline(true)
            .cache_dir(cache_dir.to_path_buf())
            .build();

        AuditPipeline::with_capabilities(
            config,
            Box::new(StaticResolver::new(test_packages(), test_tree())),
            Box::new(StaticLicenseSource::new(vec![RawLicenseRecord {
                name: "Flask".to_string(),
                license: "BSD License".to_string(),
                author: String::new(),
                license_file: String::new(),
                notice_file: String::new(),
            }])),
        )
        .unwrap()
    }

    fn write_manifest(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("requirements.txt");
        std::fs::write(&path, "flask>=2.1\n").unwrap();
        path
    }

    #[tokio::test]
    async fn full_offline_run_produces_annotated_report() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_manifest(dir.path());
        let pipeline = test_pipeline(dir.path());

        let report = pipeline.run(&manifest).await.unwrap();

        assert_eq!(report.dependencies.len(), 4);

        let flask = report
            .dependencies
            .iter()
            .find(|p| p.name == "Flask")
            .unwrap();
        assert_eq!(flask.constraint.as_deref(), Some(">=2.1"));
        assert_eq!(flask.origin.as_deref(), Some("flask"));

        // Root segments keep the manifest's casing, children the listing's
        let markupsafe = report
            .dependencies
            .iter()
            .find(|p| p.name == "MarkupSafe")
            .unwrap();
        assert_eq!(
            markupsafe.origin.as_deref(),
            Some("flask -> Jinja2 -> MarkupSafe")
        );

        // Offline with an empty cache: every package queried, none vulnerable
        assert_eq!(report.vulnerabilities.len(), 4);
        assert!(report.vulnerable_packages().is_empty());
    }

    #[tokio::test]
    async fn disabled_stages_leave_empty_sections() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_manifest(dir.path());

        let config = Config::builder()
            .offline(true)
            .enable_cve(false)
            .enable_licenses(false)
            .cache_dir(dir.path().to_path_buf())
            .build();
        let pipeline = AuditPipeline::with_capabilities(
            config,
            Box::new(StaticResolver::new(test_packages(), test_tree())),
            Box::new(StaticLicenseSource::default()),
        )
        .unwrap();

        let report = pipeline.run(&manifest).await.unwrap();
        assert!(report.vulnerabilities.is_empty());
        assert!(report.licenses.is_empty());
    }

    #[tokio::test]
    async fn packages_missing_from_tree_get_direct_origin() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_manifest(dir.path());

        let mut packages = test_packages();
        packages.push(PackageRecord::new("setuptools", "65.5.0"));

        let config = Config::builder()
            .offline(true)
            .cache_dir(dir.path().to_path_buf())
            .build();
        let pipeline = AuditPipeline::with_capabilities(
            config,
            Box::new(StaticResolver::new(packages, test_tree())),
            Box::new(StaticLicenseSource::default()),
        )
        .unwrap();

        let report = pipeline.run(&manifest).await.unwrap();
        let setuptools = report
            .dependencies
            .iter()
            .find(|p| p.name == "setuptools")
            .unwrap();
        assert_eq!(setuptools.origin.as_deref(), Some("direct"));
    }

    #[tokio::test]
    async fn cyclic_tree_does_not_hang_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("requirements.txt");
        std::fs::write(&manifest, "a==1.0\n").unwrap();

        let tree: Vec<TreeEntry> = serde_json::from_str(
            r#"[
                {"package": {"package_name": "a"}, "dependencies": [{"package_name": "b"}]},
                {"package": {"package_name": "b"}, "dependencies": [{"package_name": "a"}]}
            ]"#,
        )
        .unwrap();

        let config = Config::builder()
            .offline(true)
            .cache_dir(dir.path().to_path_buf())
            .build();
        let pipeline = AuditPipeline::with_capabilities(
            config,
            Box::new(StaticResolver::new(
                vec![
                    PackageRecord::new("a", "1.0"),
                    PackageRecord::new("b", "0.1"),
                ],
                tree,
            )),
            Box::new(StaticLicenseSource::default()),
        )
        .unwrap();

        let report = pipeline.run(&manifest).await.unwrap();
        let b = report.dependencies.iter().find(|p| p.name == "b").unwrap();
        assert_eq!(b.origin.as_deref(), Some("a -> b"));
    }

    #[tokio::test]
    async fn severity_floor_does_not_filter_the_pipeline_report() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_manifest(dir.path());

        // Seed the cache with a HIGH advisory for a resolved package
        {
            let seed = AuditCache::open(dir.path()).unwrap();
            seed.put_vulnerabilities(
                "flask",
                "2.1.0",
                serde_json::json!({
                    "vulns": [{
                        "id": "PYSEC-TEST-1",
                        "summary": "test advisory",
                        "severity": [{"type": "CVSS_V3", "score": "8.1"}]
                    }]
                }),
            );
            seed.flush().unwrap();
        }

        let config = Config::builder()
            .offline(true)
            .min_severity(Severity::Critical)
            .cache_dir(dir.path().to_path_buf())
            .build();
        let pipeline = AuditPipeline::with_capabilities(
            config,
            Box::new(StaticResolver::new(test_packages(), test_tree())),
            Box::new(StaticLicenseSource::default()),
        )
        .unwrap();

        // The HIGH advisory survives a CRITICAL floor: floors are a
        // rendering concern, and exit-status checks need the full result
        let report = pipeline.run(&manifest).await.unwrap();
        assert_eq!(report.vulnerabilities["flask"].len(), 1);
        assert_eq!(report.count_at_or_above(Severity::High), 1);
    }

    #[tokio::test]
    async fn origin_map_lists_every_resolved_package() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_manifest(dir.path());
        let pipeline = test_pipeline(dir.path());

        let rows = pipeline.origin_map(&manifest).await.unwrap();
        assert_eq!(rows.len(), 4);
        let click = rows.iter().find(|(name, _)| name == "click").unwrap();
        assert_eq!(click.1, "flask -> click");
    }
}
