//! Single-repository manifest retrieval.

use std::time::Duration;

use async_trait::async_trait;
use extcat_types::RemoteExtensionEntry;
use thiserror::Error;

use crate::manifest::parse_extension_manifest;
use crate::repo_url::normalize_repo_url;

pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 8_000;
pub const DEFAULT_USER_AGENT: &str = "extcat/catalog-refresh";

/// Per-repository fetch failure. Recovered by the aggregator.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to construct HTTP client for catalog refresh")]
    Client(#[source] reqwest::Error),
    #[error("failed to fetch extension manifest from '{url}'")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("extension manifest request to '{url}' returned status {status}")]
    Status { url: String, status: u16 },
    #[error("failed to read extension manifest response from '{url}'")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to parse extension manifest from '{url}'")]
    Manifest {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("repository '{repo}' did not respond within {timeout_ms}ms")]
    Timeout { repo: String, timeout_ms: u64 },
}

/// Retrieves and parses the manifest of exactly one repository.
#[async_trait]
pub trait RemoteCatalogFetcher: Send + Sync {
    /// `repo` is the repository as configured; implementations normalize it.
    async fn fetch(&self, repo: &str) -> Result<Vec<RemoteExtensionEntry>, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFetcherOptions {
    pub request_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for HttpFetcherOptions {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// `reqwest`-backed fetcher sharing one connection pool across repositories.
#[derive(Debug, Clone)]
pub struct HttpCatalogFetcher {
    client: reqwest::Client,
}

impl HttpCatalogFetcher {
    pub fn new(options: &HttpFetcherOptions) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(options.request_timeout_ms))
            .user_agent(options.user_agent.clone())
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteCatalogFetcher for HttpCatalogFetcher {
    async fn fetch(&self, repo: &str) -> Result<Vec<RemoteExtensionEntry>, FetchError> {
        let url = normalize_repo_url(repo);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Network {
                url: url.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url,
                status: response.status().as_u16(),
            });
        }
        let payload = response.text().await.map_err(|source| FetchError::Body {
            url: url.clone(),
            source,
        })?;
        parse_extension_manifest(&payload, repo, &url)
            .map_err(|source| FetchError::Manifest { url, source })
    }
}
