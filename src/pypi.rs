//! Package author lookup via the PyPI JSON API.
//!
//! Best-effort metadata enrichment: any failure yields an empty author
//! string, and answers (including empty ones) are cached so a package is
//! looked up at most once across runs.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::cache::AuditCache;

#[derive(Debug, Default, Deserialize)]
struct PyPiProject {
    #[serde(default)]
    info: PyPiInfo,
}

#[derive(Debug, Default, Deserialize)]
struct PyPiInfo {
    author: Option<String>,
    maintainer: Option<String>,
}

impl PyPiInfo {
    /// Author field, falling back to maintainer.
    fn author_or_maintainer(&self) -> String {
        self.author
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.maintainer.as_deref())
            .unwrap_or("")
            .to_string()
    }
}

/// PyPI metadata client with a cached author lookup.
pub struct PyPiMetadataClient {
    client: Client,
    base_url: String,
    cache: Arc<AuditCache>,
    offline: bool,
}

impl PyPiMetadataClient {
    /// Create a client against the given API base URL.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        cache: Arc<AuditCache>,
        offline: bool,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .user_agent(concat!("dep_auditor/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.into(),
            cache,
            offline,
        }
    }

    /// Author string for a package; empty when unavailable.
    pub async fn author(&self, name: &str) -> String {
        if let Some(author) = self.cache.get_author(name) {
            return author;
        }

        if self.offline {
            debug!("Offline mode, no cached author for {}", name);
            return String::new();
        }

        let author = match self.fetch(name).await {
            Ok(project) => project.info.author_or_maintainer(),
            Err(e) => {
                warn!("PyPI metadata lookup failed for {}: {}", name, e);
                String::new()
            }
        };

        self.cache.put_author(name, &author);
        author
    }

    async fn fetch(&self, name: &str) -> crate::error::Result<PyPiProject> {
        let url = format!("{}/pypi/{}/json", self.base_url, name);
        debug!("Fetching PyPI metadata: {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(crate::error::AuditError::Metadata(format!(
                "PyPI API returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}
