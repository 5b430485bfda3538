//! Dependency resolution via an external package manager.
//!
//! Version solving is not reimplemented here. The [`DependencyResolver`]
//! capability materializes the transitive closure in an ephemeral
//! environment and reports what got installed; the rest of the pipeline only
//! consumes its output. Substituting [`StaticResolver`] keeps the pipeline
//! testable without subprocesses.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{AuditError, Result};
use crate::models::PackageRecord;

/// One entry in the flat dependency-tree listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry {
    /// The package this entry describes
    pub package: PackageRef,

    /// Its declared runtime dependencies
    #[serde(default)]
    pub dependencies: Vec<PackageRef>,
}

/// A package reference in the tree listing.
///
/// Tool versions disagree on field naming: the name may arrive under
/// `package_name` or `key`. Both are accepted; `package_name` wins when both
/// are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageRef {
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub package_name: Option<String>,

    #[serde(default)]
    pub installed_version: Option<String>,
}

impl PackageRef {
    /// The package name, whichever field carried it.
    pub fn name(&self) -> Option<&str> {
        self.package_name.as_deref().or(self.key.as_deref())
    }
}

/// `pip list --format json` row.
#[derive(Debug, Clone, Deserialize)]
struct InstalledPackage {
    name: String,
    version: String,
}

/// External dependency-resolution capability.
///
/// `install_and_list` must complete before `dependency_tree`; the tree is
/// read out of the environment the install materialized.
#[async_trait]
pub trait DependencyResolver: Send + Sync {
    /// Install the manifest into an isolated environment and return every
    /// package that ended up installed, pinned to its exact version.
    ///
    /// Installer failure is fatal: there is no partial-resolution fallback.
    async fn install_and_list(&self, manifest: &Path) -> Result<Vec<PackageRecord>>;

    /// Flat adjacency listing of the materialized environment.
    async fn dependency_tree(&self) -> Result<Vec<TreeEntry>>;
}

/// State of the materialized environment between resolver calls.
struct ResolvedEnv {
    /// Keeps the temporary directory alive for the resolver's lifetime
    _dir: tempfile::TempDir,

    /// Interpreter inside the venv
    python: PathBuf,
}

/// Production resolver: ephemeral venv + pip + pipdeptree.
pub struct PipResolver {
    /// Host interpreter used to create the venv
    python: String,

    /// Ceiling for each external-tool invocation
    tool_timeout: Duration,

    env: parking_lot::Mutex<Option<ResolvedEnv>>,
}

impl PipResolver {
    /// Create a resolver driving the given host interpreter.
    pub fn new(python: impl Into<String>, tool_timeout: Duration) -> Self {
        Self {
            python: python.into(),
            tool_timeout,
            env: parking_lot::Mutex::new(None),
        }
    }

    /// Run one external tool invocation with a timeout.
    async fn run_tool(&self, tool: &str, program: &Path, args: &[&str]) -> Result<Output> {
        debug!("Running {}: {} {:?}", tool, program.display(), args);

        let mut command = Command::new(program);
        command.args(args);

        let output = match tokio::time::timeout(self.tool_timeout, command.output()).await {
            Err(_) => {
                return Err(AuditError::ToolTimeout {
                    tool: tool.to_string(),
                    seconds: self.tool_timeout.as_secs(),
                })
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuditError::tool_missing(
                    tool,
                    "install Python 3 and ensure the interpreter is on PATH",
                ))
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuditError::Resolver(format!(
                "{} exited with {}: {}",
                tool,
                output.status,
                stderr.trim()
            )));
        }

        Ok(output)
    }

    fn venv_python(dir: &Path) -> PathBuf {
        if cfg!(windows) {
            dir.join("venv").join("Scripts").join("python.exe")
        } else {
            dir.join("venv").join("bin").join("python")
        }
    }
}

#[async_trait]
impl DependencyResolver for PipResolver {
    async fn install_and_list(&self, manifest: &Path) -> Result<Vec<PackageRecord>> {
        let dir = tempfile::tempdir()?;
        let venv_dir = dir.path().join("venv");

        info!("Creating ephemeral environment in {}", venv_dir.display());
        self.run_tool(
            "python",
            Path::new(&self.python),
            &["-m", "venv", &venv_dir.display().to_string()],
        )
        .await?;

        let python = Self::venv_python(dir.path());

        info!("Installing manifest {}", manifest.display());
        self.run_tool(
            "pip",
            &python,
            &[
                "-m",
                "pip",
                "install",
                "--quiet",
                "-r",
                &manifest.display().to_string(),
            ],
        )
        .await?;

        // The tree-inspection tool must live inside the environment it reads
        self.run_tool(
            "pip",
            &python,
            &["-m", "pip", "install", "--quiet", "pipdeptree"],
        )
        .await?;

        let output = self
            .run_tool("pip", &python, &["-m", "pip", "list", "--format", "json"])
            .await?;
        let installed: Vec<InstalledPackage> = serde_json::from_slice(&output.stdout)
            .map_err(|e| AuditError::Resolver(format!("unreadable pip list output: {}", e)))?;

        *self.env.lock() = Some(ResolvedEnv {
            _dir: dir,
            python,
        });

        info!("Resolved {} packages", installed.len());
        Ok(installed
            .into_iter()
            .map(|p| PackageRecord::new(p.name, p.version))
            .collect())
    }

    async fn dependency_tree(&self) -> Result<Vec<TreeEntry>> {
        let python = {
            let env = self.env.lock();
            match env.as_ref() {
                Some(env) => env.python.clone(),
                None => {
                    return Err(AuditError::Resolver(
                        "no environment has been materialized; run install_and_list first"
                            .to_string(),
                    ))
                }
            }
        };

        let output = self
            .run_tool("pipdeptree", &python, &["-m", "pipdeptree", "--json"])
            .await?;

        let entries: Vec<TreeEntry> = serde_json::from_slice(&output.stdout)
            .map_err(|e| AuditError::Resolver(format!("unreadable pipdeptree output: {}", e)))?;

        debug!("Dependency tree lists {} entries", entries.len());
        Ok(entries)
    }
}

/// In-memory resolver over fixed data, for tests and offline replays.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    packages: Vec<PackageRecord>,
    tree: Vec<TreeEntry>,
}

impl StaticResolver {
    /// Create a resolver that always reports the given closure and tree.
    pub fn new(packages: Vec<PackageRecord>, tree: Vec<TreeEntry>) -> Self {
        Self { packages, tree }
    }
}

#[async_trait]
impl DependencyResolver for StaticResolver {
    async fn install_and_list(&self, _manifest: &Path) -> Result<Vec<PackageRecord>> {
        Ok(self.packages.clone())
    }

    async fn dependency_tree(&self) -> Result<Vec<TreeEntry>> {
        Ok(self.tree.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_ref_prefers_package_name_over_key() {
        let r: PackageRef = serde_json::from_str(
            r#"{"key": "flask", "package_name": "Flask", "installed_version": "2.1.0"}"#,
        )
        .unwrap();
        assert_eq!(r.name(), Some("Flask"));
    }

    #[test]
    fn package_ref_falls_back_to_key() {
        let r: PackageRef = serde_json::from_str(r#"{"key": "click"}"#).unwrap();
        assert_eq!(r.name(), Some("click"));

        let empty: PackageRef = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.name(), None);
    }

    #[test]
    fn tree_entry_tolerates_missing_dependencies() {
        let entry: TreeEntry =
            serde_json::from_str(r#"{"package": {"package_name": "flask"}}"#).unwrap();
        assert!(entry.dependencies.is_empty());
    }

    #[tokio::test]
    async fn static_resolver_round_trip() {
        let resolver = StaticResolver::new(
            vec![PackageRecord::new("requests", "2.28.1")],
            vec![],
        );
        let packages = resolver
            .install_and_list(Path::new("requirements.txt"))
            .await
            .unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "requests");
        assert!(resolver.dependency_tree().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pip_resolver_requires_install_before_tree() {
        let resolver = PipResolver::new("python3", Duration::from_secs(5));
        let err = resolver.dependency_tree().await.unwrap_err();
        assert!(matches!(err, AuditError::Resolver(_)));
    }
}
