//! Catalog store abstractions and in-memory backend.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::RwLock;

mod sqlite;

pub use extcat_types::{
    InstalledExtensionUpdate, PersistedExtensionRecord, ReconcilePlan, RemoteExtensionEntry,
};
pub use sqlite::SqliteCatalogStore;

/// Result type for catalog store operations.
pub type StoreResult<T> = Result<T, CatalogStoreError>;

/// Decision function evaluated inside a store transaction against the current records.
pub type ReconcilePlanner = Box<dyn FnOnce(&[PersistedExtensionRecord]) -> ReconcilePlan + Send>;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum CatalogStoreError {
    #[error("package '{0}' already exists in the catalog")]
    DuplicatePackage(String),
    #[error("catalog store task failed: {0}")]
    Join(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Persisted catalog contract used by the reconciler and the install pipeline.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Returns every persisted record ordered by id.
    async fn load_records(&self) -> StoreResult<Vec<PersistedExtensionRecord>>;

    async fn get_record(&self, pkg_name: &str) -> StoreResult<Option<PersistedExtensionRecord>>;

    /// Inserts or replaces the record with the same `pkg_name`, keeping an existing id.
    ///
    /// This is the write surface of the install pipeline and of side-loading;
    /// reconciliation goes through [`CatalogStore::read_modify_write`].
    async fn upsert_record(
        &self,
        record: PersistedExtensionRecord,
    ) -> StoreResult<PersistedExtensionRecord>;

    /// Loads all records, runs `planner`, and applies the resulting plan as one
    /// atomic transaction. On error nothing is written.
    async fn read_modify_write(&self, planner: ReconcilePlanner) -> StoreResult<ReconcilePlan>;
}

/// In-memory implementation for tests and local experimentation.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Clone, Default)]
struct StoreInner {
    records: BTreeMap<String, PersistedExtensionRecord>,
    last_id: i64,
}

impl StoreInner {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn sorted_records(&self) -> Vec<PersistedExtensionRecord> {
        let mut records: Vec<_> = self.records.values().cloned().collect();
        records.sort_by_key(|record| record.id);
        records
    }

    fn apply_plan(&mut self, plan: &ReconcilePlan) -> StoreResult<()> {
        for update in &plan.to_update_installed {
            if let Some(record) = self.records.get_mut(&update.pkg_name) {
                record.icon_url = update.icon_url.clone();
                record.repo = Some(update.repo.clone());
                record.has_update = update.has_update;
                record.is_obsolete = update.is_obsolete;
            }
        }
        for entry in &plan.to_update_not_installed {
            if let Some(record) = self.records.get_mut(&entry.pkg_name) {
                record.overwrite_descriptive(entry);
            }
        }
        for entry in &plan.to_insert {
            if self.records.contains_key(&entry.pkg_name) {
                return Err(CatalogStoreError::DuplicatePackage(entry.pkg_name.clone()));
            }
            let id = self.next_id();
            self.records.insert(
                entry.pkg_name.clone(),
                PersistedExtensionRecord::from_remote(id, entry),
            );
        }
        for pkg_name in &plan.to_obsolete {
            if let Some(record) = self.records.get_mut(pkg_name) {
                record.is_obsolete = true;
            }
        }
        for pkg_name in &plan.to_delete {
            self.records.remove(pkg_name);
        }
        Ok(())
    }
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn load_records(&self) -> StoreResult<Vec<PersistedExtensionRecord>> {
        Ok(self.inner.read().await.sorted_records())
    }

    async fn get_record(&self, pkg_name: &str) -> StoreResult<Option<PersistedExtensionRecord>> {
        Ok(self.inner.read().await.records.get(pkg_name).cloned())
    }

    async fn upsert_record(
        &self,
        mut record: PersistedExtensionRecord,
    ) -> StoreResult<PersistedExtensionRecord> {
        let mut inner = self.inner.write().await;
        record.id = match inner.records.get(&record.pkg_name) {
            Some(existing) => existing.id,
            None => inner.next_id(),
        };
        inner
            .records
            .insert(record.pkg_name.clone(), record.clone());
        Ok(record)
    }

    async fn read_modify_write(&self, planner: ReconcilePlanner) -> StoreResult<ReconcilePlan> {
        let mut inner = self.inner.write().await;
        let plan = planner(&inner.sorted_records());

        // Apply to a scratch copy and swap, so a failed plan leaves the store untouched.
        let mut staged = inner.clone();
        staged.apply_plan(&plan)?;
        *inner = staged;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CatalogStore, CatalogStoreError, InMemoryCatalogStore, InstalledExtensionUpdate,
        PersistedExtensionRecord, ReconcilePlan, RemoteExtensionEntry,
    };

    fn remote(pkg: &str, code: i64) -> RemoteExtensionEntry {
        RemoteExtensionEntry {
            pkg_name: pkg.to_string(),
            name: pkg.to_uppercase(),
            repo: "repo-a".to_string(),
            version_name: format!("1.4.{code}"),
            version_code: code,
            lang: "en".to_string(),
            is_nsfw: false,
            apk_name: format!("{pkg}.apk"),
            icon_url: format!("https://icons.test/{pkg}.png"),
        }
    }

    fn installed(pkg: &str, code: i64) -> PersistedExtensionRecord {
        let mut record = PersistedExtensionRecord::from_remote(0, &remote(pkg, code));
        record.is_installed = true;
        record
    }

    #[tokio::test]
    async fn unit_upsert_assigns_ids_and_keeps_existing_identity() {
        let store = InMemoryCatalogStore::new();
        let first = store.upsert_record(installed("a", 1)).await.expect("insert a");
        let second = store.upsert_record(installed("b", 1)).await.expect("insert b");
        let replaced = store.upsert_record(installed("a", 5)).await.expect("replace a");

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(replaced.id, 1);
        let loaded = store.get_record("a").await.expect("get").expect("record");
        assert_eq!(loaded.version_code, 5);
    }

    #[tokio::test]
    async fn functional_read_modify_write_applies_every_decision_kind() {
        let store = InMemoryCatalogStore::new();
        store.upsert_record(installed("keep", 1)).await.expect("seed keep");
        store.upsert_record(installed("gone-installed", 1)).await.expect("seed");
        let mut plain = installed("gone-plain", 1);
        plain.is_installed = false;
        store.upsert_record(plain).await.expect("seed plain");

        let plan = store
            .read_modify_write(Box::new(|records: &[PersistedExtensionRecord]| {
                assert_eq!(records.len(), 3);
                ReconcilePlan {
                    to_insert: vec![remote("fresh", 1)],
                    to_update_installed: vec![InstalledExtensionUpdate {
                        pkg_name: "keep".to_string(),
                        icon_url: "https://icons.test/new.png".to_string(),
                        repo: "repo-b".to_string(),
                        has_update: true,
                        is_obsolete: false,
                    }],
                    to_obsolete: vec!["gone-installed".to_string()],
                    to_delete: vec!["gone-plain".to_string()],
                    ..ReconcilePlan::default()
                }
            }))
            .await
            .expect("apply plan");
        assert_eq!(plan.summary().inserted, 1);

        let records = store.load_records().await.expect("load");
        let names: Vec<_> = records.iter().map(|item| item.pkg_name.as_str()).collect();
        assert_eq!(names, vec!["keep", "gone-installed", "fresh"]);

        let keep = &records[0];
        assert!(keep.has_update);
        assert_eq!(keep.repo.as_deref(), Some("repo-b"));
        assert_eq!(keep.version_code, 1);
        assert!(records[1].is_obsolete);
        assert!(records[1].is_installed);
        assert!(!records[2].is_installed);
    }

    #[tokio::test]
    async fn regression_failed_plan_leaves_store_unchanged() {
        let store = InMemoryCatalogStore::new();
        let mut plain = installed("a", 1);
        plain.is_installed = false;
        store.upsert_record(plain).await.expect("seed");

        let error = store
            .read_modify_write(Box::new(|_: &[PersistedExtensionRecord]| ReconcilePlan {
                to_update_not_installed: vec![remote("a", 9)],
                to_insert: vec![remote("a", 9)],
                ..ReconcilePlan::default()
            }))
            .await
            .expect_err("duplicate insert must fail");
        assert!(matches!(error, CatalogStoreError::DuplicatePackage(pkg) if pkg == "a"));

        let record = store.get_record("a").await.expect("get").expect("record");
        assert_eq!(record.version_code, 1);
    }
}
