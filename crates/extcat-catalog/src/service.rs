use std::sync::{Arc, Mutex, PoisonError};

use extcat_core::{current_unix_timestamp_ms, elapsed_ms_since};
use extcat_remote::{
    AggregationReport, CatalogAggregator, HttpCatalogFetcher, HttpFetcherOptions,
    RemoteCatalogFetcher,
};
use extcat_store::CatalogStore;
use extcat_types::{ExtensionView, PersistedExtensionRecord, ReconcileSummary};
use serde::Serialize;

use crate::config::CatalogServiceConfig;
use crate::pending_updates::PendingUpdateIndex;
use crate::reconciler::CatalogReconciler;
use crate::refresh_gate::RefreshGate;
use crate::CatalogResult;

/// Millisecond wall clock consulted by the refresh gate.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Outcome of one fetch-aggregate-reconcile cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub aggregation: AggregationReport,
    pub reconcile: ReconcileSummary,
}

/// Catalog as served to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    pub extensions: Vec<ExtensionView>,
    /// Set when this call attempted a refresh that failed; `extensions` is
    /// then the last persisted catalog. Status only, never serialized with
    /// the catalog.
    #[serde(skip)]
    pub refresh_error: Option<String>,
    /// Set when this call completed a refresh.
    #[serde(skip)]
    pub refresh: Option<RefreshReport>,
}

impl CatalogSnapshot {
    fn from_records(
        records: Vec<PersistedExtensionRecord>,
        refresh: Option<RefreshReport>,
        refresh_error: Option<String>,
    ) -> Self {
        Self {
            extensions: records
                .iter()
                .filter(|record| !record.is_local_source())
                .map(PersistedExtensionRecord::to_view)
                .collect(),
            refresh_error,
            refresh,
        }
    }

    pub fn installed(&self) -> impl Iterator<Item = &ExtensionView> {
        self.extensions.iter().filter(|view| view.installed)
    }

    pub fn with_updates(&self) -> impl Iterator<Item = &ExtensionView> {
        self.extensions.iter().filter(|view| view.has_update)
    }
}

/// Extension catalog engine: TTL-gated refresh in front of the persisted catalog.
///
/// Owns the refresh gate and the pending-update index; both start empty for
/// every service instance.
pub struct CatalogService {
    config: CatalogServiceConfig,
    store: Arc<dyn CatalogStore>,
    aggregator: CatalogAggregator,
    reconciler: CatalogReconciler,
    gate: RefreshGate,
    pending: Arc<PendingUpdateIndex>,
    clock: Clock,
    last_refresh_error: Mutex<Option<String>>,
}

impl CatalogService {
    /// Builds a service fetching over HTTP with the configured timeout and user agent.
    pub fn new(config: CatalogServiceConfig, store: Arc<dyn CatalogStore>) -> CatalogResult<Self> {
        let fetcher = HttpCatalogFetcher::new(&HttpFetcherOptions {
            request_timeout_ms: u64::try_from(config.fetch_timeout.as_millis())
                .unwrap_or(u64::MAX),
            user_agent: config.user_agent.clone(),
        })?;
        Ok(Self::with_fetcher(config, store, Arc::new(fetcher)))
    }

    pub fn with_fetcher(
        config: CatalogServiceConfig,
        store: Arc<dyn CatalogStore>,
        fetcher: Arc<dyn RemoteCatalogFetcher>,
    ) -> Self {
        let pending = Arc::new(PendingUpdateIndex::new());
        Self {
            aggregator: CatalogAggregator::new(fetcher, config.fetch_timeout),
            reconciler: CatalogReconciler::new(store.clone(), pending.clone()),
            config,
            store,
            gate: RefreshGate::new(),
            pending,
            clock: Arc::new(current_unix_timestamp_ms),
            last_refresh_error: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn refresh_gate(&self) -> &RefreshGate {
        &self.gate
    }

    pub fn pending_updates(&self) -> Arc<PendingUpdateIndex> {
        self.pending.clone()
    }

    /// Error of the most recent refresh attempt, cleared by the next success.
    pub fn last_refresh_error(&self) -> Option<String> {
        self.last_refresh_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Serves the catalog, refreshing first when the TTL has expired.
    ///
    /// A failed refresh still serves the persisted catalog. The failure is
    /// reported out of band through `refresh_error`, the warn log and
    /// `last_refresh_error`. Only a failure to read the store is returned as `Err`.
    pub async fn get_catalog(&self) -> CatalogResult<CatalogSnapshot> {
        let now_ms = (self.clock)();
        let last_check_ms = self.gate.last_check_ms();
        if !self.gate.try_begin(now_ms) {
            tracing::debug!(
                age_ms = elapsed_ms_since(last_check_ms, now_ms),
                "catalog cache hit; serving persisted catalog"
            );
            return self.snapshot(None, None).await;
        }

        tracing::debug!(
            last_check_ms,
            now_ms,
            "catalog cache miss; refreshing from repositories"
        );
        match self.refresh().await {
            Ok(report) => self.snapshot(Some(report), None).await,
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    "catalog refresh failed; serving persisted catalog"
                );
                self.snapshot(None, Some(error.to_string())).await
            }
        }
    }

    /// Refreshes regardless of the TTL and propagates refresh failures.
    pub async fn force_refresh(&self) -> CatalogResult<CatalogSnapshot> {
        self.gate.mark((self.clock)());
        let report = self.refresh().await?;
        self.snapshot(Some(report), None).await
    }

    #[tracing::instrument(
        name = "extcat_catalog.refresh",
        skip(self),
        fields(repos = self.config.repositories.len())
    )]
    async fn refresh(&self) -> CatalogResult<RefreshReport> {
        let (remote, aggregation) = self
            .aggregator
            .aggregate_with_report(&self.config.repositories)
            .await;
        let outcome = self.reconciler.reconcile(remote).await;
        self.set_last_refresh_error(outcome.as_ref().err().map(ToString::to_string));
        let reconcile = outcome?;
        tracing::debug!(
            repos_failed = aggregation.repos_failed,
            entries_unique = aggregation.entries_unique,
            summary = %reconcile,
            "completed catalog refresh"
        );
        Ok(RefreshReport {
            aggregation,
            reconcile,
        })
    }

    async fn snapshot(
        &self,
        refresh: Option<RefreshReport>,
        refresh_error: Option<String>,
    ) -> CatalogResult<CatalogSnapshot> {
        let records = self.store.load_records().await?;
        Ok(CatalogSnapshot::from_records(records, refresh, refresh_error))
    }

    fn set_last_refresh_error(&self, error: Option<String>) {
        *self
            .last_refresh_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use extcat_remote::FetchError;
    use extcat_store::{
        CatalogStoreError, InMemoryCatalogStore, ReconcilePlan, ReconcilePlanner, StoreResult,
    };
    use extcat_types::{RemoteExtensionEntry, LOCAL_SOURCE_NAME, LOCAL_SOURCE_PKG_NAME};
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    const START_MS: u64 = 1_700_000_000_000;

    fn remote(pkg: &str, code: i64) -> RemoteExtensionEntry {
        RemoteExtensionEntry {
            pkg_name: pkg.to_string(),
            name: pkg.to_string(),
            repo: "repo-a".to_string(),
            version_name: format!("1.4.{code}"),
            version_code: code,
            lang: "en".to_string(),
            is_nsfw: false,
            apk_name: format!("{pkg}.apk"),
            icon_url: String::new(),
        }
    }

    struct CountingFetcher {
        calls: AtomicUsize,
        entries: Mutex<Vec<RemoteExtensionEntry>>,
    }

    impl CountingFetcher {
        fn new(entries: Vec<RemoteExtensionEntry>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                entries: Mutex::new(entries),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteCatalogFetcher for CountingFetcher {
        async fn fetch(&self, _repo: &str) -> Result<Vec<RemoteExtensionEntry>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.entries.lock().expect("entries lock").clone())
        }
    }

    /// In-memory store whose transactional writes can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryCatalogStore,
        failing: AtomicBool,
    }

    #[async_trait]
    impl CatalogStore for FlakyStore {
        async fn load_records(&self) -> StoreResult<Vec<PersistedExtensionRecord>> {
            self.inner.load_records().await
        }

        async fn get_record(
            &self,
            pkg_name: &str,
        ) -> StoreResult<Option<PersistedExtensionRecord>> {
            self.inner.get_record(pkg_name).await
        }

        async fn upsert_record(
            &self,
            record: PersistedExtensionRecord,
        ) -> StoreResult<PersistedExtensionRecord> {
            self.inner.upsert_record(record).await
        }

        async fn read_modify_write(
            &self,
            planner: ReconcilePlanner,
        ) -> StoreResult<ReconcilePlan> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(CatalogStoreError::Join("store offline".to_string()));
            }
            self.inner.read_modify_write(planner).await
        }
    }

    struct StalledFetcher;

    #[async_trait]
    impl RemoteCatalogFetcher for StalledFetcher {
        async fn fetch(&self, _repo: &str) -> Result<Vec<RemoteExtensionEntry>, FetchError> {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(vec![remote("late", 1)])
        }
    }

    fn manual_clock() -> (Clock, Arc<AtomicU64>) {
        let now = Arc::new(AtomicU64::new(START_MS));
        let handle = now.clone();
        (Arc::new(move || handle.load(Ordering::SeqCst)), now)
    }

    fn service(
        store: Arc<dyn CatalogStore>,
        fetcher: Arc<CountingFetcher>,
    ) -> (CatalogService, Arc<AtomicU64>) {
        let (clock, now) = manual_clock();
        let service = CatalogService::with_fetcher(
            CatalogServiceConfig::with_repositories(["repo-a"]),
            store,
            fetcher,
        )
        .with_clock(clock);
        (service, now)
    }

    #[tokio::test]
    async fn functional_get_catalog_aggregates_once_within_ttl_window() {
        let fetcher = CountingFetcher::new(vec![remote("a", 1)]);
        let (service, now) = service(Arc::new(InMemoryCatalogStore::new()), fetcher.clone());

        let first = service.get_catalog().await.expect("first");
        assert!(first.refresh.is_some());
        now.fetch_add(30_000, Ordering::SeqCst);
        let second = service.get_catalog().await.expect("second");
        assert!(second.refresh.is_none());
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(first.extensions, second.extensions);

        now.fetch_add(30_001, Ordering::SeqCst);
        service.get_catalog().await.expect("third");
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn functional_force_refresh_bypasses_ttl_and_records_check() {
        let fetcher = CountingFetcher::new(vec![remote("a", 1)]);
        let (service, _now) = service(Arc::new(InMemoryCatalogStore::new()), fetcher.clone());

        service.get_catalog().await.expect("initial");
        let forced = service.force_refresh().await.expect("forced");
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(forced.refresh.map(|report| report.aggregation.repos_total), Some(1));
        assert_eq!(service.refresh_gate().last_check_ms(), START_MS);
    }

    #[tokio::test]
    async fn functional_catalog_hides_local_source_and_exposes_pending_updates() {
        let store = Arc::new(InMemoryCatalogStore::new());
        let mut local = PersistedExtensionRecord::from_remote(0, &remote(LOCAL_SOURCE_PKG_NAME, 1));
        local.name = LOCAL_SOURCE_NAME.to_string();
        local.repo = None;
        local.is_installed = true;
        store.upsert_record(local).await.expect("seed local");
        let mut installed = PersistedExtensionRecord::from_remote(0, &remote("a", 1));
        installed.is_installed = true;
        store.upsert_record(installed).await.expect("seed a");

        let fetcher = CountingFetcher::new(vec![remote("a", 2), remote("b", 1)]);
        let (service, _now) = service(store.clone(), fetcher);
        let snapshot = service.get_catalog().await.expect("catalog");

        let pkgs: Vec<_> = snapshot.extensions.iter().map(|view| view.pkg_name.as_str()).collect();
        assert_eq!(pkgs, vec!["a", "b"]);
        assert_eq!(snapshot.installed().count(), 1);
        assert_eq!(snapshot.with_updates().count(), 1);
        assert_eq!(
            service.pending_updates().get("a").map(|entry| entry.version_code),
            Some(2)
        );
        assert!(store
            .get_record(LOCAL_SOURCE_PKG_NAME)
            .await
            .expect("get")
            .is_some());
    }

    #[tokio::test]
    async fn regression_failed_refresh_serves_last_known_good_catalog() {
        let store = Arc::new(FlakyStore::default());
        let fetcher = CountingFetcher::new(vec![remote("a", 1)]);
        let (service, now) = service(store.clone(), fetcher.clone());
        let good = service.get_catalog().await.expect("initial");
        assert_eq!(good.extensions.len(), 1);

        store.failing.store(true, Ordering::SeqCst);
        *fetcher.entries.lock().expect("entries lock") = vec![remote("b", 1)];
        now.fetch_add(60_001, Ordering::SeqCst);
        let stale = service.get_catalog().await.expect("stale catalog");
        assert_eq!(stale.extensions, good.extensions);
        assert!(stale.refresh_error.is_some());
        assert!(service.last_refresh_error().is_some());

        let forced = service.force_refresh().await;
        assert!(forced.is_err());

        store.failing.store(false, Ordering::SeqCst);
        let recovered = service.force_refresh().await.expect("recovered");
        assert_eq!(recovered.extensions[0].pkg_name, "b");
        assert!(service.last_refresh_error().is_none());
    }

    #[tokio::test]
    async fn regression_first_refresh_failure_reports_error_out_of_band() {
        let store = Arc::new(FlakyStore::default());
        store.failing.store(true, Ordering::SeqCst);
        let (service, _now) = service(store, CountingFetcher::new(vec![remote("a", 1)]));

        let snapshot = service.get_catalog().await.expect("catalog");
        assert!(snapshot.extensions.is_empty());
        let error = snapshot.refresh_error.clone().expect("refresh error");
        assert!(error.contains("store offline"));

        assert_eq!(service.last_refresh_error().as_deref(), Some(error.as_str()));

        let json = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(json, serde_json::json!({ "extensions": [] }));
    }

    #[tokio::test]
    async fn regression_refresh_dropped_during_fetch_leaves_catalog_untouched() {
        let store = Arc::new(InMemoryCatalogStore::new());
        let mut record = PersistedExtensionRecord::from_remote(0, &remote("kept", 1));
        record.is_installed = false;
        store.upsert_record(record).await.expect("seed");
        let seeded = store.load_records().await.expect("load");

        let service = CatalogService::with_fetcher(
            CatalogServiceConfig::with_repositories(["repo-a"]),
            store.clone(),
            Arc::new(StalledFetcher),
        );
        let dropped =
            tokio::time::timeout(std::time::Duration::from_millis(50), service.force_refresh())
                .await;
        assert!(dropped.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(store.load_records().await.expect("load"), seeded);
        assert!(service.pending_updates().is_empty());
        assert!(service.last_refresh_error().is_none());
    }
}
