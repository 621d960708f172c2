use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use extcat_catalog::{dedupe_repositories, CatalogService, CatalogServiceConfig, CatalogSnapshot};
use extcat_remote::normalize_repo_url;
use extcat_store::SqliteCatalogStore;
use extcat_types::{ExtensionView, RemoteExtensionEntry};
use serde::Serialize;
use serde_json::json;

use crate::cli_args::{Cli, CliCommand, RepoCommand};
use crate::config_file::{load_catalog_config, save_catalog_config};

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    match &cli.command {
        CliCommand::Normalize { url } => {
            println!("{}", normalize_repo_url(url));
            Ok(())
        }
        CliCommand::Repo { command } => execute_repo_command(&cli.config, command),
        CliCommand::List {
            json,
            installed,
            updates,
        } => {
            let service = build_catalog_service(&cli)?;
            let snapshot = service.get_catalog().await?;
            if let Some(error) = &snapshot.refresh_error {
                eprintln!("warning: catalog refresh failed: {error}");
            }
            let filter = ListFilter {
                installed: *installed,
                updates: *updates,
            };
            if *json {
                println!("{}", render_list_json(&snapshot, filter)?);
            } else {
                print!("{}", render_list_text(&snapshot, filter));
            }
            Ok(())
        }
        CliCommand::Refresh { json } => {
            let service = build_catalog_service(&cli)?;
            let snapshot = service
                .force_refresh()
                .await
                .context("catalog refresh failed")?;
            let pending = service.pending_updates().snapshot();
            if *json {
                println!("{}", render_refresh_json(&snapshot, &pending)?);
            } else {
                print!("{}", render_refresh_text(&snapshot, &pending));
            }
            Ok(())
        }
    }
}

fn build_catalog_service(cli: &Cli) -> Result<CatalogService> {
    let file = load_catalog_config(&cli.config)?;
    let database_path = cli
        .database
        .clone()
        .unwrap_or_else(|| file.database_path.clone());
    let fetch_timeout_ms = cli.fetch_timeout_ms.unwrap_or(file.fetch_timeout_ms);
    let config = CatalogServiceConfig {
        repositories: dedupe_repositories(file.repositories.iter().chain(cli.repos.iter())),
        fetch_timeout: Duration::from_millis(fetch_timeout_ms),
        ..CatalogServiceConfig::default()
    };
    tracing::debug!(
        repos = config.repositories.len(),
        database = %database_path.display(),
        fetch_timeout_ms,
        "starting catalog service"
    );

    let store = SqliteCatalogStore::new(&database_path)
        .with_context(|| format!("failed to open catalog database {}", database_path.display()))?;
    Ok(CatalogService::new(config, Arc::new(store))?)
}

fn execute_repo_command(config_path: &Path, command: &RepoCommand) -> Result<()> {
    let mut config = load_catalog_config(config_path)?;
    match command {
        RepoCommand::List => {
            println!("catalog repos: count={}", config.repositories.len());
            for repo in &config.repositories {
                println!(
                    "repository: url={} manifest={}",
                    repo,
                    normalize_repo_url(repo)
                );
            }
        }
        RepoCommand::Add { url } => {
            let added = config.add_repository(url)?;
            if added {
                save_catalog_config(config_path, &config)?;
            }
            println!(
                "catalog repo add: url={} manifest={} added={} count={}",
                url.trim(),
                normalize_repo_url(url),
                added,
                config.repositories.len()
            );
        }
        RepoCommand::Remove { url } => {
            let removed = config.remove_repository(url);
            if removed {
                save_catalog_config(config_path, &config)?;
            }
            println!(
                "catalog repo remove: url={} removed={} count={}",
                url.trim(),
                removed,
                config.repositories.len()
            );
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
struct ListFilter {
    installed: bool,
    updates: bool,
}

impl ListFilter {
    fn matches(self, view: &ExtensionView) -> bool {
        (!self.installed || view.installed) && (!self.updates || view.has_update)
    }
}

fn filtered<'a>(snapshot: &'a CatalogSnapshot, filter: ListFilter) -> Vec<&'a ExtensionView> {
    snapshot
        .extensions
        .iter()
        .filter(|view| filter.matches(view))
        .collect()
}

fn render_extension_line(view: &ExtensionView) -> String {
    format!(
        "extension: pkg={} name={} version={} code={} lang={} nsfw={} installed={} has_update={} obsolete={} repo={}",
        view.pkg_name,
        view.name,
        view.version_name,
        view.version_code,
        view.lang,
        view.is_nsfw,
        view.installed,
        view.has_update,
        view.obsolete,
        view.repo.as_deref().unwrap_or("none")
    )
}

fn render_list_text(snapshot: &CatalogSnapshot, filter: ListFilter) -> String {
    let shown = filtered(snapshot, filter);
    let mut lines = vec![format!(
        "catalog list: total={} shown={} installed={} updates={} refreshed={}",
        snapshot.extensions.len(),
        shown.len(),
        snapshot.installed().count(),
        snapshot.with_updates().count(),
        snapshot.refresh.is_some()
    )];
    lines.extend(shown.into_iter().map(render_extension_line));
    let mut rendered = lines.join("\n");
    rendered.push('\n');
    rendered
}

fn render_list_json(snapshot: &CatalogSnapshot, filter: ListFilter) -> Result<String> {
    let payload = json!({
        "total": snapshot.extensions.len(),
        "refreshed": snapshot.refresh.is_some(),
        "extensions": filtered(snapshot, filter),
    });
    serde_json::to_string_pretty(&payload).context("failed to encode catalog list")
}

fn render_refresh_text(snapshot: &CatalogSnapshot, pending: &[RemoteExtensionEntry]) -> String {
    let mut lines = Vec::new();
    if let Some(report) = snapshot.refresh {
        lines.push(format!(
            "catalog refresh: repos={} repos_failed={} entries_fetched={} entries_unique={} {}",
            report.aggregation.repos_total,
            report.aggregation.repos_failed,
            report.aggregation.entries_fetched,
            report.aggregation.entries_unique,
            report.reconcile
        ));
    }
    lines.push(format!(
        "catalog: total={} installed={} updates={}",
        snapshot.extensions.len(),
        snapshot.installed().count(),
        snapshot.with_updates().count()
    ));
    lines.extend(pending.iter().map(|entry| {
        format!(
            "pending update: pkg={} version={} code={} repo={}",
            entry.pkg_name, entry.version_name, entry.version_code, entry.repo
        )
    }));
    let mut rendered = lines.join("\n");
    rendered.push('\n');
    rendered
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PendingUpdateView<'a> {
    pkg_name: &'a str,
    name: &'a str,
    repo: &'a str,
    version_name: &'a str,
    version_code: i64,
    apk_name: &'a str,
}

impl<'a> From<&'a RemoteExtensionEntry> for PendingUpdateView<'a> {
    fn from(entry: &'a RemoteExtensionEntry) -> Self {
        Self {
            pkg_name: &entry.pkg_name,
            name: &entry.name,
            repo: &entry.repo,
            version_name: &entry.version_name,
            version_code: entry.version_code,
            apk_name: &entry.apk_name,
        }
    }
}

fn render_refresh_json(
    snapshot: &CatalogSnapshot,
    pending: &[RemoteExtensionEntry],
) -> Result<String> {
    let refresh = snapshot.refresh.map(|report| {
        json!({
            "reposTotal": report.aggregation.repos_total,
            "reposFailed": report.aggregation.repos_failed,
            "entriesFetched": report.aggregation.entries_fetched,
            "entriesUnique": report.aggregation.entries_unique,
            "summary": report.reconcile,
        })
    });
    let pending_views: Vec<PendingUpdateView<'_>> =
        pending.iter().map(PendingUpdateView::from).collect();
    let payload = json!({
        "refresh": refresh,
        "total": snapshot.extensions.len(),
        "pendingUpdates": pending_views,
        "extensions": snapshot.extensions,
    });
    serde_json::to_string_pretty(&payload).context("failed to encode refresh outcome")
}
