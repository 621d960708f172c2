//! Shared data types for the extension catalog.
//!
//! Remote entries are transient values produced by the fetch pipeline,
//! persisted records are owned by the catalog store, and a `ReconcilePlan`
//! is the typed decision set computed between the two before any write.

use serde::{Deserialize, Serialize};

/// Package name reserved for the built-in local source; never served to callers.
pub const LOCAL_SOURCE_PKG_NAME: &str = "localsource";
/// Display name of the built-in local source record.
pub const LOCAL_SOURCE_NAME: &str = "Local source";

/// Extension metadata as offered by one remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteExtensionEntry {
    pub pkg_name: String,
    pub name: String,
    /// Repository as configured by the user, before URL normalization.
    pub repo: String,
    pub version_name: String,
    pub version_code: i64,
    pub lang: String,
    pub is_nsfw: bool,
    pub apk_name: String,
    pub icon_url: String,
}

/// Durable catalog row keyed by `pkg_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedExtensionRecord {
    pub id: i64,
    pub pkg_name: String,
    pub name: String,
    /// `None` for side-loaded records that did not come from a repository.
    pub repo: Option<String>,
    pub version_name: String,
    pub version_code: i64,
    pub lang: String,
    pub is_nsfw: bool,
    pub apk_name: String,
    pub icon_url: String,
    /// Owned by the install pipeline; reconciliation never writes it.
    pub is_installed: bool,
    pub has_update: bool,
    pub is_obsolete: bool,
}

impl PersistedExtensionRecord {
    /// Builds the record inserted on first sighting of a remote package.
    pub fn from_remote(id: i64, entry: &RemoteExtensionEntry) -> Self {
        Self {
            id,
            pkg_name: entry.pkg_name.clone(),
            name: entry.name.clone(),
            repo: Some(entry.repo.clone()),
            version_name: entry.version_name.clone(),
            version_code: entry.version_code,
            lang: entry.lang.clone(),
            is_nsfw: entry.is_nsfw,
            apk_name: entry.apk_name.clone(),
            icon_url: entry.icon_url.clone(),
            is_installed: false,
            has_update: false,
            is_obsolete: false,
        }
    }

    /// Overwrites every descriptive field from `entry`, keeping identity and flags.
    pub fn overwrite_descriptive(&mut self, entry: &RemoteExtensionEntry) {
        self.repo = Some(entry.repo.clone());
        self.name = entry.name.clone();
        self.version_name = entry.version_name.clone();
        self.version_code = entry.version_code;
        self.lang = entry.lang.clone();
        self.is_nsfw = entry.is_nsfw;
        self.apk_name = entry.apk_name.clone();
        self.icon_url = entry.icon_url.clone();
    }

    pub fn is_local_source(&self) -> bool {
        self.pkg_name == LOCAL_SOURCE_PKG_NAME
    }

    pub fn to_view(&self) -> ExtensionView {
        ExtensionView {
            pkg_name: self.pkg_name.clone(),
            name: self.name.clone(),
            repo: self.repo.clone(),
            version_name: self.version_name.clone(),
            version_code: self.version_code,
            lang: self.lang.clone(),
            is_nsfw: self.is_nsfw,
            apk_name: self.apk_name.clone(),
            icon_url: self.icon_url.clone(),
            installed: self.is_installed,
            has_update: self.has_update,
            obsolete: self.is_obsolete,
        }
    }
}

/// Externally-facing catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionView {
    pub pkg_name: String,
    pub name: String,
    pub repo: Option<String>,
    pub version_name: String,
    pub version_code: i64,
    pub lang: String,
    pub is_nsfw: bool,
    pub apk_name: String,
    pub icon_url: String,
    pub installed: bool,
    pub has_update: bool,
    pub obsolete: bool,
}

/// Batched write for an installed record: only icon, repo and the derived flags change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledExtensionUpdate {
    pub pkg_name: String,
    pub icon_url: String,
    pub repo: String,
    pub has_update: bool,
    pub is_obsolete: bool,
}

/// Decision set for one reconciliation pass, computed before any write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_insert: Vec<RemoteExtensionEntry>,
    pub to_update_installed: Vec<InstalledExtensionUpdate>,
    /// Full descriptive overwrite, matched by `pkg_name`.
    pub to_update_not_installed: Vec<RemoteExtensionEntry>,
    pub to_obsolete: Vec<String>,
    pub to_delete: Vec<String>,
    /// Newer remote entries for installed packages, registered after commit.
    pub pending_updates: Vec<RemoteExtensionEntry>,
}

impl ReconcilePlan {
    /// Returns true when the plan carries no store writes.
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty()
            && self.to_update_installed.is_empty()
            && self.to_update_not_installed.is_empty()
            && self.to_obsolete.is_empty()
            && self.to_delete.is_empty()
    }

    pub fn summary(&self) -> ReconcileSummary {
        ReconcileSummary {
            inserted: self.to_insert.len(),
            updated_installed: self.to_update_installed.len(),
            updated_not_installed: self.to_update_not_installed.len(),
            obsoleted: self.to_obsolete.len(),
            deleted: self.to_delete.len(),
            pending_updates: self.pending_updates.len(),
        }
    }
}

/// Per-kind counts for one applied reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub inserted: usize,
    pub updated_installed: usize,
    pub updated_not_installed: usize,
    pub obsoleted: usize,
    pub deleted: usize,
    pub pending_updates: usize,
}

impl std::fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "inserted={} updated_installed={} updated_not_installed={} obsoleted={} deleted={} pending_updates={}",
            self.inserted,
            self.updated_installed,
            self.updated_not_installed,
            self.obsoleted,
            self.deleted,
            self.pending_updates
        )
    }
}
