//! dep_auditor - Dependency Security Audit CLI
//!
//! Audits a requirements manifest: transitive resolution, origin paths,
//! OSV vulnerability correlation, and license classification.

use clap::{Parser, Subcommand, ValueEnum};
use dep_auditor::{
    cache::AuditCache,
    config::{Config, OutputFormat},
    reporter::create_reporter,
    AuditPipeline, Severity,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Parse a severity string into a Severity enum.
fn parse_severity(s: &str) -> Severity {
    match s.to_lowercase().as_str() {
        "critical" => Severity::Critical,
        "high" => Severity::High,
        "medium" => Severity::Medium,
        "low" => Severity::Low,
        _ => Severity::Unknown, // Report everything
    }
}

/// Dependency security auditing for Python manifests
#[derive(Parser)]
#[command(name = "dep_auditor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,

    /// Output format
    #[arg(short = 'f', long, default_value = "text")]
    format: OutputFormatArg,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy)]
enum OutputFormatArg {
    Text,
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Text => OutputFormat::Text,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full audit over a requirements manifest
    Scan {
        /// Path to the requirements file
        manifest: PathBuf,

        /// Correlate packages against the vulnerability database
        #[arg(long, default_value = "true")]
        cve: bool,

        /// Collect and classify licenses
        #[arg(long, default_value = "true")]
        licenses: bool,

        /// Look up package authors on PyPI
        #[arg(long)]
        authors: bool,

        /// Cache-only operation (no network, no license tool)
        #[arg(long)]
        offline: bool,

        /// Minimum severity to report
        #[arg(long, default_value = "unknown")]
        min_severity: String,

        /// Cache directory override
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// Resolve the manifest and print origin paths only
    Origins {
        /// Path to the requirements file
        manifest: PathBuf,
    },

    /// Show or clear the audit cache
    Cache {
        /// Remove all cached entries
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 if cli.quiet => Level::ERROR,
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_level.to_string())),
        )
        .init();

    // Set up graceful shutdown handling
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }

        warn!("Received interrupt signal, initiating graceful shutdown...");
        shutdown_flag_clone.store(true, Ordering::SeqCst);

        // If we get a second signal, force exit
        if let Ok(()) = tokio::signal::ctrl_c().await {
            error!("Received second interrupt, forcing shutdown");
            std::process::exit(130); // Standard exit code for SIGINT
        }
    });

    // Load configuration
    let mut config = if let Some(ref config_path) = cli.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    config.output.format = cli.format.into();
    config.output.output_path = cli.output.clone();

    if shutdown_flag.load(Ordering::SeqCst) {
        warn!("Shutdown requested before audit started");
        return Ok(());
    }

    match cli.command {
        Commands::Scan {
            manifest,
            cve,
            licenses,
            authors,
            offline,
            min_severity,
            cache_dir,
        } => {
            config.audit.enable_cve = cve;
            config.audit.enable_licenses = licenses;
            config.audit.enable_authors = authors;
            config.audit.offline = offline;
            config.audit.min_severity = parse_severity(&min_severity);
            if cache_dir.is_some() {
                config.audit.cache_dir = cache_dir;
            }

            let pipeline = AuditPipeline::new(config.clone())?;
            let mut report = pipeline.run(&manifest).await?;

            // Exit status must see the full result, before the severity
            // floor trims the map for display
            let actionable = report.count_at_or_above(Severity::High);

            if config.audit.min_severity > Severity::Unknown {
                report.retain_at_or_above(config.audit.min_severity);
            }

            let reporter = create_reporter(config.output.format);
            let rendered = reporter.generate(&report);

            if let Some(ref output_path) = config.output.output_path {
                std::fs::write(output_path, &rendered)?;
                info!("Report written to: {}", output_path.display());
            } else {
                println!("{}", rendered);
            }

            // Exit with non-zero code if critical/high vulnerabilities
            if actionable > 0 {
                std::process::exit(1);
            }
        }

        Commands::Origins { manifest } => {
            let pipeline = AuditPipeline::new(config)?;
            let rows = pipeline.origin_map(&manifest).await?;
            for (name, origin) in rows {
                println!("{}: {}", name, origin);
            }
        }

        Commands::Cache { clear } => {
            let cache = match config.audit.cache_dir {
                Some(ref dir) => AuditCache::open(dir)?,
                None => AuditCache::default_cache()?,
            };

            if clear {
                cache.clear()?;
                println!("Cache cleared.");
            } else {
                let stats = cache.stats();
                println!("Cache directory: {}", stats.cache_dir.display());
                println!("  Vulnerability entries: {}", stats.vuln_entries);
                println!("  Author entries: {}", stats.author_entries);
                println!(
                    "  License dataset: {}",
                    if stats.has_license_dataset {
                        "present"
                    } else {
                        "absent"
                    }
                );
            }
        }
    }

    Ok(())
}
