use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use extcat_catalog::{CatalogService, CatalogServiceConfig, Clock, REFRESH_TTL_MS};
use extcat_store::{CatalogStore, SqliteCatalogStore};
use extcat_types::{PersistedExtensionRecord, LOCAL_SOURCE_NAME, LOCAL_SOURCE_PKG_NAME};
use httpmock::prelude::*;
use serde_json::{json, Value};
use tempfile::tempdir;

const START_MS: u64 = 1_700_000_000_000;

fn manifest_entry(pkg: &str, code: i64) -> Value {
    json!({
        "name": format!("Tachiyomi: {pkg}"),
        "pkg": pkg,
        "apk": format!("{pkg}-v1.4.{code}.apk"),
        "lang": "en",
        "code": code,
        "version": format!("1.4.{code}"),
        "nsfw": 0
    })
}

fn manual_clock() -> (Clock, Arc<AtomicU64>) {
    let now = Arc::new(AtomicU64::new(START_MS));
    let handle = now.clone();
    (Arc::new(move || handle.load(Ordering::SeqCst)), now)
}

fn service_for(
    repos: Vec<String>,
    store: Arc<dyn CatalogStore>,
) -> (CatalogService, Arc<AtomicU64>) {
    let (clock, now) = manual_clock();
    let config = CatalogServiceConfig {
        fetch_timeout: Duration::from_secs(2),
        ..CatalogServiceConfig::with_repositories(repos)
    };
    let service = CatalogService::new(config, store)
        .expect("build service")
        .with_clock(clock);
    (service, now)
}

#[tokio::test]
async fn integration_multi_repository_refresh_dedupes_and_persists() {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(GET).path("/one/index.min.json");
        then.status(200)
            .json_body(json!([manifest_entry("pkg.shared", 3), manifest_entry("pkg.one", 1)]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/two/index.min.json");
        then.status(200)
            .json_body(json!([manifest_entry("pkg.shared", 5), manifest_entry("pkg.two", 1)]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/broken/index.min.json");
        then.status(404);
    });

    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("catalog.sqlite");
    let store: Arc<dyn CatalogStore> =
        Arc::new(SqliteCatalogStore::new(&db_path).expect("open store"));
    let repos = vec![
        format!("{}/one/index.min.json", server.base_url()),
        format!("{}/broken/index.min.json", server.base_url()),
        format!("{}/two/index.min.json", server.base_url()),
    ];
    let (service, now) = service_for(repos.clone(), store);

    let snapshot = service.get_catalog().await.expect("catalog");
    let report = snapshot.refresh.expect("refresh ran");
    assert_eq!(report.aggregation.repos_failed, 1);
    assert_eq!(report.reconcile.inserted, 3);
    assert!(snapshot.refresh_error.is_none());

    let shared = snapshot
        .extensions
        .iter()
        .find(|view| view.pkg_name == "pkg.shared")
        .expect("shared package");
    assert_eq!(shared.version_code, 5);
    assert_eq!(shared.repo.as_deref(), Some(repos[2].as_str()));

    now.fetch_add(REFRESH_TTL_MS, Ordering::SeqCst);
    service.get_catalog().await.expect("cached catalog");
    first.assert_calls(1);

    let reopened = SqliteCatalogStore::new(&db_path).expect("reopen");
    assert_eq!(reopened.load_records().await.expect("load").len(), 3);
}

#[tokio::test]
async fn integration_installed_extension_lifecycle_across_refreshes() {
    let server = MockServer::start();
    let mut v1 = server.mock(|when, then| {
        when.method(GET).path("/index.min.json");
        then.status(200).json_body(json!([
            manifest_entry("pkg.reader", 1),
            manifest_entry("pkg.browse", 1)
        ]));
    });

    let dir = tempdir().expect("tempdir");
    let store: Arc<dyn CatalogStore> =
        Arc::new(SqliteCatalogStore::new(dir.path().join("catalog.sqlite")).expect("store"));
    let mut local = PersistedExtensionRecord {
        id: 0,
        pkg_name: LOCAL_SOURCE_PKG_NAME.to_string(),
        name: LOCAL_SOURCE_NAME.to_string(),
        repo: None,
        version_name: "1.2".to_string(),
        version_code: 0,
        lang: "localsourcelang".to_string(),
        is_nsfw: false,
        apk_name: "localSource".to_string(),
        icon_url: String::new(),
        is_installed: true,
        has_update: false,
        is_obsolete: false,
    };
    local = store.upsert_record(local).await.expect("seed local source");
    let repo = format!("{}/index.min.json", server.base_url());
    let (service, _now) = service_for(vec![repo], store.clone());

    service.force_refresh().await.expect("first refresh");
    let mut reader = store
        .get_record("pkg.reader")
        .await
        .expect("get")
        .expect("reader");
    reader.is_installed = true;
    store.upsert_record(reader).await.expect("install reader");

    v1.delete();
    server.mock(|when, then| {
        when.method(GET).path("/index.min.json");
        then.status(200).json_body(json!([manifest_entry("pkg.reader", 2)]));
    });
    let snapshot = service.force_refresh().await.expect("second refresh");

    let pkgs: Vec<_> = snapshot
        .extensions
        .iter()
        .map(|view| view.pkg_name.as_str())
        .collect();
    assert_eq!(pkgs, vec!["pkg.reader"]);
    let reader = &snapshot.extensions[0];
    assert!(reader.installed);
    assert!(reader.has_update);
    assert_eq!(reader.version_code, 1);
    assert_eq!(
        service
            .pending_updates()
            .get("pkg.reader")
            .map(|entry| entry.version_code),
        Some(2)
    );

    let local_after = store
        .get_record(LOCAL_SOURCE_PKG_NAME)
        .await
        .expect("get")
        .expect("local source kept");
    assert_eq!(local_after, local);
}
