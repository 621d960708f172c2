use std::collections::HashSet;
use std::time::Duration;

use extcat_remote::{DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_USER_AGENT};

/// Runtime settings for [`crate::CatalogService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogServiceConfig {
    /// Repository URLs as configured, deduplicated in first-seen order.
    pub repositories: Vec<String>,
    /// Bounds each repository fetch independently.
    pub fetch_timeout: Duration,
    pub user_agent: String,
}

impl Default for CatalogServiceConfig {
    fn default() -> Self {
        Self {
            repositories: Vec::new(),
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CatalogServiceConfig {
    pub fn with_repositories<I, S>(repositories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            repositories: dedupe_repositories(repositories),
            ..Self::default()
        }
    }
}

/// Trims repository URLs, drops blanks, and removes repeats keeping order.
pub fn dedupe_repositories<I, S>(repositories: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    repositories
        .into_iter()
        .map(|repo| repo.as_ref().trim().to_string())
        .filter(|repo| !repo.is_empty() && seen.insert(repo.clone()))
        .collect()
}
