use std::path::PathBuf;

use clap::{Parser, Subcommand};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "extcat",
    about = "Extension catalog: fetch repositories and reconcile the local catalog",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "EXTCAT_CONFIG",
        default_value = ".extcat/config.json",
        global = true,
        help = "Path to the repository configuration file"
    )]
    pub(crate) config: PathBuf,

    #[arg(
        long,
        env = "EXTCAT_DATABASE",
        global = true,
        help = "SQLite catalog path. Overrides database_path from the config file"
    )]
    pub(crate) database: Option<PathBuf>,

    #[arg(
        long = "fetch-timeout-ms",
        env = "EXTCAT_FETCH_TIMEOUT_MS",
        global = true,
        value_parser = parse_positive_u64,
        help = "Per-repository fetch timeout in milliseconds. Overrides fetch_timeout_ms from the config file"
    )]
    pub(crate) fetch_timeout_ms: Option<u64>,

    #[arg(
        long = "repo",
        env = "EXTCAT_REPO",
        value_delimiter = ',',
        global = true,
        help = "Additional repository URLs appended to the configured ones for this run"
    )]
    pub(crate) repos: Vec<String>,

    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub(crate) enum CliCommand {
    /// Show the catalog, refreshing it when the cache has expired
    List {
        #[arg(long, help = "Print the catalog as JSON")]
        json: bool,
        #[arg(long, help = "Only show installed extensions")]
        installed: bool,
        #[arg(long, help = "Only show extensions with an update available")]
        updates: bool,
    },
    /// Refresh the catalog from every repository now
    Refresh {
        #[arg(long, help = "Print the refresh outcome as JSON")]
        json: bool,
    },
    /// Manage configured repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommand,
    },
    /// Print the manifest URL a repository URL resolves to
    Normalize { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub(crate) enum RepoCommand {
    /// List configured repositories
    List,
    /// Add a repository URL
    Add { url: String },
    /// Remove a repository URL
    Remove { url: String },
}
