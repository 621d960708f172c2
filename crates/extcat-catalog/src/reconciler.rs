use std::sync::Arc;

use extcat_remote::dedupe_by_package;
use extcat_store::{CatalogStore, CatalogStoreError};
use extcat_types::{PersistedExtensionRecord, ReconcileSummary, RemoteExtensionEntry};
use tokio::sync::Mutex;

use crate::pending_updates::PendingUpdateIndex;
use crate::planner::plan_reconciliation;

/// Applies remote batches to the persisted catalog, one pass at a time.
pub struct CatalogReconciler {
    store: Arc<dyn CatalogStore>,
    pending: Arc<PendingUpdateIndex>,
    lock: Arc<Mutex<()>>,
}

impl CatalogReconciler {
    pub fn new(store: Arc<dyn CatalogStore>, pending: Arc<PendingUpdateIndex>) -> Self {
        Self {
            store,
            pending,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Runs one read-modify-write pass under the catalog reconciliation lock.
    ///
    /// Once the lock is held, the pass runs on a detached task: the commit and
    /// the pending-update registration that follows it complete together even
    /// if the caller drops this future.
    pub async fn reconcile(
        &self,
        remote: Vec<RemoteExtensionEntry>,
    ) -> Result<ReconcileSummary, CatalogStoreError> {
        let guard = self.lock.clone().lock_owned().await;
        let store = self.store.clone();
        let pending = self.pending.clone();
        let remote = dedupe_by_package(remote);

        tokio::spawn(async move {
            let _guard = guard;
            let plan = store
                .read_modify_write(Box::new(move |persisted: &[PersistedExtensionRecord]| {
                    plan_reconciliation(persisted, &remote)
                }))
                .await?;

            let summary = plan.summary();
            let newly_pending = plan
                .pending_updates
                .into_iter()
                .filter(|entry| pending.record_if_absent(entry.clone()))
                .count();
            tracing::debug!(
                summary = %summary,
                newly_pending,
                "reconciled extension catalog"
            );
            Ok::<_, CatalogStoreError>(summary)
        })
        .await
        .map_err(|error| CatalogStoreError::Join(error.to_string()))?
    }
}
