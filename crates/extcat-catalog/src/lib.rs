//! Extension catalog engine.
//!
//! Ties the remote aggregation to the persisted catalog: a TTL refresh gate
//! decides when to fetch, the reconciler diffs and applies each remote batch
//! in one store transaction, and newer versions of installed extensions are
//! collected in the pending-update index for the install pipeline.

pub mod config;
pub mod pending_updates;
pub mod planner;
pub mod reconciler;
pub mod refresh_gate;
pub mod service;

use extcat_remote::FetchError;
use extcat_store::CatalogStoreError;
use thiserror::Error;

pub use config::{dedupe_repositories, CatalogServiceConfig};
pub use pending_updates::PendingUpdateIndex;
pub use planner::plan_reconciliation;
pub use reconciler::CatalogReconciler;
pub use refresh_gate::{RefreshGate, REFRESH_TTL_MS};
pub use service::{CatalogService, CatalogSnapshot, Clock, RefreshReport};

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Store(#[from] CatalogStoreError),
    #[error(transparent)]
    Fetcher(#[from] FetchError),
}
