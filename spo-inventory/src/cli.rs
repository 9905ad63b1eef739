///
/// This module implements the CLI interface for spo-inventory: command parsing,
/// flag handling and the async entrypoint shared by `main` and the integration tests.
///
/// All inventory logic (records, sink, pipeline) lives in the [`spo-inventory-core`] crate.
/// This module only builds the run configuration, wires the REST client and reports the outcome.
///
/// ## How To Use
/// - For command-line users: run `spo-inventory scan --help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`spo-inventory-core`]: ../../spo-inventory-core/
use crate::client::SharePointClient;
use crate::load_config::{load_config, resolve, FileConfig};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use spo_inventory_core::inventory::run_inventory;
use spo_inventory_core::sink::{OutputSink, SinkPaths};
use std::path::PathBuf;

/// CLI for spo-inventory: inventory SharePoint Online document libraries.
#[derive(Parser)]
#[clap(
    name = "spo-inventory",
    version,
    about = "Inventory files across SharePoint Online sites and OneDrive personal sites"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enumerate sites, walk each Documents library and write the inventory
    Scan(ScanArgs),
}

#[derive(Debug, Default, Args)]
pub struct ScanArgs {
    /// Optional YAML run file; flags override its values
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Tenant name, e.g. `contoso` for contoso.sharepoint.com
    #[clap(long)]
    pub tenant: Option<String>,

    /// Print the site and file tables
    #[clap(long, conflicts_with = "no_console")]
    pub console: bool,
    #[clap(long)]
    pub no_console: bool,

    /// Write the CSV exports to the log directory
    #[clap(long, conflicts_with = "no_persist")]
    pub persist: bool,
    #[clap(long)]
    pub no_persist: bool,

    /// Include OneDrive personal sites
    #[clap(long)]
    pub include_personal: bool,

    /// Request one-time tenant management consent before connecting
    #[clap(long)]
    pub register_consent: bool,

    /// Server-side site filter, e.g. "Url -like '/sites/'"
    #[clap(long)]
    pub filter: Option<String>,

    /// Directory for the execution log and CSV exports
    #[clap(long)]
    pub log_dir: Option<PathBuf>,

    #[clap(long)]
    pub log_file: Option<String>,
    #[clap(long)]
    pub failures_file: Option<String>,
    #[clap(long)]
    pub files_file: Option<String>,
    #[clap(long)]
    pub sites_file: Option<String>,

    /// Tenant admin endpoint; defaults to https://<tenant>-admin.sharepoint.com
    #[clap(long)]
    pub admin_url: Option<String>,
}

impl ScanArgs {
    pub fn console(&self) -> Option<bool> {
        toggle(self.console, self.no_console)
    }

    pub fn persist(&self) -> Option<bool> {
        toggle(self.persist, self.no_persist)
    }
}

fn toggle(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Scan(args) => {
            let file_config = match &args.config {
                Some(path) => load_config(path)?,
                None => FileConfig::default(),
            };
            let config = resolve(file_config, &args);
            config.trace_loaded();
            tracing::info!(command = "scan", "Starting inventory");

            let client = SharePointClient::from_env();
            let mut sink = OutputSink::stdout(SinkPaths::from_config(&config));
            match run_inventory(&config, &client, &client, &mut sink).await {
                Ok(report) => tracing::info!(
                    command = "scan",
                    sites = report.sites.len(),
                    files = report.files.len(),
                    failures = report.failures.len(),
                    "Inventory complete"
                ),
                // Already in the execution log.
                Err(e) => tracing::warn!(command = "scan", error = %e, "Inventory aborted"),
            }
            Ok(())
        }
    }
}
