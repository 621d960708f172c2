//! Remote extension repositories: URL normalization, manifest fetching, and
//! fan-out aggregation across every configured repository.
//!
//! Each repository is fetched independently; one failing or slow repository
//! only removes its own contribution from the aggregated batch.

pub mod aggregator;
pub mod fetcher;
pub mod manifest;
pub mod repo_url;

pub use aggregator::{dedupe_by_package, AggregationReport, CatalogAggregator};
pub use fetcher::{
    FetchError, HttpCatalogFetcher, HttpFetcherOptions, RemoteCatalogFetcher,
    DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_USER_AGENT,
};
pub use manifest::{
    extension_lib_version, parse_extension_manifest, LIB_VERSION_MAX, LIB_VERSION_MIN,
};
pub use repo_url::{normalize_repo_url, DEFAULT_MANIFEST_FILE, DEFAULT_REPO_REF};
