//! Concurrent fan-out across repositories with per-repository failure isolation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use extcat_types::RemoteExtensionEntry;
use tokio::task::JoinSet;

use crate::fetcher::{FetchError, RemoteCatalogFetcher};

/// Diagnostics for one aggregation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationReport {
    pub repos_total: usize,
    pub repos_failed: usize,
    pub entries_fetched: usize,
    pub entries_unique: usize,
}

/// Fetches every configured repository concurrently and merges the results.
#[derive(Clone)]
pub struct CatalogAggregator {
    fetcher: Arc<dyn RemoteCatalogFetcher>,
    fetch_timeout: Duration,
}

impl CatalogAggregator {
    /// `fetch_timeout` bounds each repository independently.
    pub fn new(fetcher: Arc<dyn RemoteCatalogFetcher>, fetch_timeout: Duration) -> Self {
        Self {
            fetcher,
            fetch_timeout,
        }
    }

    /// Returns the deduplicated entries of every repository that answered.
    pub async fn aggregate(&self, repos: &[String]) -> Vec<RemoteExtensionEntry> {
        self.aggregate_with_report(repos).await.0
    }

    pub async fn aggregate_with_report(
        &self,
        repos: &[String],
    ) -> (Vec<RemoteExtensionEntry>, AggregationReport) {
        let mut tasks = JoinSet::new();
        for (position, repo) in repos.iter().enumerate() {
            let fetcher = self.fetcher.clone();
            let repo = repo.clone();
            let timeout = self.fetch_timeout;
            tasks.spawn(async move {
                let outcome = match tokio::time::timeout(timeout, fetcher.fetch(&repo)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(FetchError::Timeout {
                        repo: repo.clone(),
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    }),
                };
                (position, repo, outcome)
            });
        }

        let mut per_repo: Vec<Option<Vec<RemoteExtensionEntry>>> = vec![None; repos.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, _, Ok(entries))) => per_repo[position] = Some(entries),
                Ok((_, repo, Err(error))) => {
                    tracing::warn!(
                        repo = %repo,
                        error = %error,
                        "failed to fetch extensions for repository"
                    );
                }
                Err(error) => {
                    tracing::warn!(error = %error, "repository fetch task aborted");
                }
            }
        }

        let repos_failed = per_repo.iter().filter(|slot| slot.is_none()).count();
        let fetched = per_repo.into_iter().flatten().flatten().collect::<Vec<_>>();
        let entries_fetched = fetched.len();
        let unique = dedupe_by_package(fetched);

        let report = AggregationReport {
            repos_total: repos.len(),
            repos_failed,
            entries_fetched,
            entries_unique: unique.len(),
        };
        tracing::debug!(
            repos_total = report.repos_total,
            repos_failed = report.repos_failed,
            entries_fetched = report.entries_fetched,
            entries_unique = report.entries_unique,
            "aggregated remote extension catalog"
        );
        (unique, report)
    }
}

/// Keeps one entry per package: the highest version code, first-seen on ties.
/// Output order follows the first sighting of each package.
pub fn dedupe_by_package(
    entries: impl IntoIterator<Item = RemoteExtensionEntry>,
) -> Vec<RemoteExtensionEntry> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<RemoteExtensionEntry> = Vec::new();
    for entry in entries {
        match positions.get(&entry.pkg_name) {
            Some(&position) => {
                if entry.version_code > unique[position].version_code {
                    unique[position] = entry;
                }
            }
            None => {
                positions.insert(entry.pkg_name.clone(), unique.len());
                unique.push(entry);
            }
        }
    }
    unique
}
