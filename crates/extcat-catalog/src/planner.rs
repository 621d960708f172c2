//! Pure decision step of a reconciliation pass.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use extcat_types::{
    InstalledExtensionUpdate, PersistedExtensionRecord, ReconcilePlan, RemoteExtensionEntry,
};

/// Diffs the persisted catalog against a deduplicated remote batch.
///
/// Decisions that would not change a row are left out, so planning twice
/// against the state produced by the first plan yields a plan with no writes.
/// Newer entries for installed packages are always reported in
/// `pending_updates`.
pub fn plan_reconciliation(
    persisted: &[PersistedExtensionRecord],
    remote: &[RemoteExtensionEntry],
) -> ReconcilePlan {
    let by_pkg: HashMap<&str, &PersistedExtensionRecord> = persisted
        .iter()
        .map(|record| (record.pkg_name.as_str(), record))
        .collect();
    let offered: HashSet<&str> = remote.iter().map(|entry| entry.pkg_name.as_str()).collect();

    let mut plan = ReconcilePlan::default();

    for record in persisted {
        // Side-loaded records have no repo and are never retired here.
        if record.repo.is_none() || offered.contains(record.pkg_name.as_str()) {
            continue;
        }
        if !record.is_installed {
            plan.to_delete.push(record.pkg_name.clone());
        } else if !record.is_obsolete {
            plan.to_obsolete.push(record.pkg_name.clone());
        }
    }

    for entry in remote {
        match by_pkg.get(entry.pkg_name.as_str()) {
            None => plan.to_insert.push(entry.clone()),
            Some(record) if record.is_installed => {
                let update = installed_update(record, entry);
                if update.version_code_newer {
                    plan.pending_updates.push(entry.clone());
                }
                if update.changes(record) {
                    plan.to_update_installed.push(update.write);
                }
            }
            // Status flags stay with the row; only descriptive fields follow the remote.
            Some(record) => {
                let mut overwritten = (*record).clone();
                overwritten.overwrite_descriptive(entry);
                if &overwritten != *record {
                    plan.to_update_not_installed.push(entry.clone());
                }
            }
        }
    }

    plan
}

struct PlannedInstalledUpdate {
    write: InstalledExtensionUpdate,
    version_code_newer: bool,
}

impl PlannedInstalledUpdate {
    fn changes(&self, record: &PersistedExtensionRecord) -> bool {
        self.write.icon_url != record.icon_url
            || record.repo.as_deref() != Some(self.write.repo.as_str())
            || self.write.has_update != record.has_update
            || self.write.is_obsolete != record.is_obsolete
    }
}

fn installed_update(
    record: &PersistedExtensionRecord,
    entry: &RemoteExtensionEntry,
) -> PlannedInstalledUpdate {
    let mut has_update = record.has_update;
    let mut is_obsolete = record.is_obsolete;
    if is_obsolete && entry.version_code >= record.version_code {
        is_obsolete = false;
    }

    let ordering = entry.version_code.cmp(&record.version_code);
    match ordering {
        Ordering::Greater => has_update = true,
        Ordering::Less => is_obsolete = true,
        Ordering::Equal => {}
    }

    PlannedInstalledUpdate {
        write: InstalledExtensionUpdate {
            pkg_name: record.pkg_name.clone(),
            icon_url: entry.icon_url.clone(),
            repo: entry.repo.clone(),
            has_update,
            is_obsolete,
        },
        version_code_newer: ordering == Ordering::Greater,
    }
}
