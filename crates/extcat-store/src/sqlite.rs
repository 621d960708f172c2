//! SQLite-backed `CatalogStore` implementation with durable persistence.

use crate::{
    CatalogStore, CatalogStoreError, PersistedExtensionRecord, ReconcilePlan, ReconcilePlanner,
    StoreResult,
};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on `IN (...)` list size per statement.
const IN_LIST_CHUNK: usize = 500;

const RECORD_COLUMNS: &str = r#"
    id, pkg_name, name, repo, version_name, version_code, lang, is_nsfw, apk_name, icon_url,
    is_installed, has_update, is_obsolete
"#;

/// Persistent SQLite catalog backend.
#[derive(Debug, Clone)]
pub struct SqliteCatalogStore {
    db_path: PathBuf,
}

impl SqliteCatalogStore {
    /// Creates a SQLite-backed store at `path`, creating schema if needed.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self { db_path };
        let connection = open_connection(&store.db_path)?;
        initialize_schema(&connection)?;
        Ok(store)
    }

    /// Runs `task` on the blocking pool with a fresh connection.
    ///
    /// The spawned task is detached from the caller's future, so a transaction
    /// that has started always commits or rolls back even if the caller is dropped.
    async fn run_blocking<T, F>(&self, task: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = open_connection(&db_path)?;
            task(&mut connection)
        })
        .await
        .map_err(|error| CatalogStoreError::Join(error.to_string()))?
    }
}

fn open_connection(db_path: &Path) -> StoreResult<Connection> {
    let connection = Connection::open(db_path)?;
    connection.busy_timeout(Duration::from_secs(5))?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        "#,
    )?;
    Ok(connection)
}

fn initialize_schema(connection: &Connection) -> StoreResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS extensions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pkg_name TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            repo TEXT NULL,
            version_name TEXT NOT NULL,
            version_code INTEGER NOT NULL,
            lang TEXT NOT NULL,
            is_nsfw INTEGER NOT NULL DEFAULT 0,
            apk_name TEXT NOT NULL,
            icon_url TEXT NOT NULL,
            is_installed INTEGER NOT NULL DEFAULT 0,
            has_update INTEGER NOT NULL DEFAULT 0,
            is_obsolete INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )?;
    Ok(())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<PersistedExtensionRecord> {
    Ok(PersistedExtensionRecord {
        id: row.get(0)?,
        pkg_name: row.get(1)?,
        name: row.get(2)?,
        repo: row.get(3)?,
        version_name: row.get(4)?,
        version_code: row.get(5)?,
        lang: row.get(6)?,
        is_nsfw: row.get(7)?,
        apk_name: row.get(8)?,
        icon_url: row.get(9)?,
        is_installed: row.get(10)?,
        has_update: row.get(11)?,
        is_obsolete: row.get(12)?,
    })
}

fn load_records_in(connection: &Connection) -> StoreResult<Vec<PersistedExtensionRecord>> {
    let mut statement =
        connection.prepare(&format!("SELECT {RECORD_COLUMNS} FROM extensions ORDER BY id"))?;
    let records = statement
        .query_map([], record_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

fn get_record_in(
    connection: &Connection,
    pkg_name: &str,
) -> StoreResult<Option<PersistedExtensionRecord>> {
    let record = connection
        .query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM extensions WHERE pkg_name = ?1"),
            params![pkg_name],
            record_from_row,
        )
        .optional()?;
    Ok(record)
}

/// Applies `plan` with one prepared statement per decision kind.
fn apply_plan_in(connection: &Connection, plan: &ReconcilePlan) -> StoreResult<()> {
    if !plan.to_update_installed.is_empty() {
        let mut statement = connection.prepare(
            r#"
            UPDATE extensions
            SET icon_url = ?1, repo = ?2, has_update = ?3, is_obsolete = ?4
            WHERE pkg_name = ?5
            "#,
        )?;
        for update in &plan.to_update_installed {
            statement.execute(params![
                update.icon_url,
                update.repo,
                update.has_update,
                update.is_obsolete,
                update.pkg_name
            ])?;
        }
    }

    if !plan.to_update_not_installed.is_empty() {
        let mut statement = connection.prepare(
            r#"
            UPDATE extensions
            SET repo = ?1, name = ?2, version_name = ?3, version_code = ?4, lang = ?5,
                is_nsfw = ?6, apk_name = ?7, icon_url = ?8
            WHERE pkg_name = ?9
            "#,
        )?;
        for entry in &plan.to_update_not_installed {
            statement.execute(params![
                entry.repo,
                entry.name,
                entry.version_name,
                entry.version_code,
                entry.lang,
                entry.is_nsfw,
                entry.apk_name,
                entry.icon_url,
                entry.pkg_name
            ])?;
        }
    }

    if !plan.to_insert.is_empty() {
        let mut statement = connection.prepare(
            r#"
            INSERT INTO extensions (
                pkg_name, name, repo, version_name, version_code, lang, is_nsfw, apk_name,
                icon_url, is_installed, has_update, is_obsolete
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 0, 0)
            "#,
        )?;
        for entry in &plan.to_insert {
            statement
                .execute(params![
                    entry.pkg_name,
                    entry.name,
                    entry.repo,
                    entry.version_name,
                    entry.version_code,
                    entry.lang,
                    entry.is_nsfw,
                    entry.apk_name,
                    entry.icon_url
                ])
                .map_err(|error| match error {
                    rusqlite::Error::SqliteFailure(code, _)
                        if code.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        CatalogStoreError::DuplicatePackage(entry.pkg_name.clone())
                    }
                    other => CatalogStoreError::Sqlite(other),
                })?;
        }
    }

    for chunk in plan.to_obsolete.chunks(IN_LIST_CHUNK) {
        connection.execute(
            &format!(
                "UPDATE extensions SET is_obsolete = 1 WHERE pkg_name IN ({})",
                placeholders(chunk.len())
            ),
            params_from_iter(chunk.iter()),
        )?;
    }

    for chunk in plan.to_delete.chunks(IN_LIST_CHUNK) {
        connection.execute(
            &format!(
                "DELETE FROM extensions WHERE pkg_name IN ({})",
                placeholders(chunk.len())
            ),
            params_from_iter(chunk.iter()),
        )?;
    }

    Ok(())
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn load_records(&self) -> StoreResult<Vec<PersistedExtensionRecord>> {
        self.run_blocking(|connection| load_records_in(connection))
            .await
    }

    async fn get_record(&self, pkg_name: &str) -> StoreResult<Option<PersistedExtensionRecord>> {
        let pkg_name = pkg_name.to_string();
        self.run_blocking(move |connection| get_record_in(connection, &pkg_name))
            .await
    }

    async fn upsert_record(
        &self,
        record: PersistedExtensionRecord,
    ) -> StoreResult<PersistedExtensionRecord> {
        self.run_blocking(move |connection| {
            let transaction = connection.transaction()?;
            transaction.execute(
                r#"
                INSERT INTO extensions (
                    pkg_name, name, repo, version_name, version_code, lang, is_nsfw, apk_name,
                    icon_url, is_installed, has_update, is_obsolete
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ON CONFLICT(pkg_name) DO UPDATE SET
                    name = excluded.name,
                    repo = excluded.repo,
                    version_name = excluded.version_name,
                    version_code = excluded.version_code,
                    lang = excluded.lang,
                    is_nsfw = excluded.is_nsfw,
                    apk_name = excluded.apk_name,
                    icon_url = excluded.icon_url,
                    is_installed = excluded.is_installed,
                    has_update = excluded.has_update,
                    is_obsolete = excluded.is_obsolete
                "#,
                params![
                    record.pkg_name,
                    record.name,
                    record.repo,
                    record.version_name,
                    record.version_code,
                    record.lang,
                    record.is_nsfw,
                    record.apk_name,
                    record.icon_url,
                    record.is_installed,
                    record.has_update,
                    record.is_obsolete
                ],
            )?;
            let stored = get_record_in(&transaction, &record.pkg_name)?;
            transaction.commit()?;
            stored.ok_or_else(|| {
                CatalogStoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows)
            })
        })
        .await
    }

    async fn read_modify_write(&self, planner: ReconcilePlanner) -> StoreResult<ReconcilePlan> {
        self.run_blocking(move |connection| {
            let transaction =
                connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let records = load_records_in(&transaction)?;
            let plan = planner(&records);
            if plan.is_empty() {
                transaction.commit()?;
                return Ok(plan);
            }
            // Dropping the transaction on error rolls it back.
            apply_plan_in(&transaction, &plan)?;
            transaction.commit()?;
            tracing::debug!(
                summary = %plan.summary(),
                "committed catalog reconciliation"
            );
            Ok(plan)
        })
        .await
    }
}
