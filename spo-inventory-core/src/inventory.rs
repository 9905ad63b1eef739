//! Inventory pipeline: connect → enumerate sites → list each document library → report.
//!
//! [`run_inventory`] is the single entrypoint used by the CLI and the integration tests.
//! It drives a [`Connector`] and a [`Lister`] strictly one call at a time and funnels every
//! observable result through an [`OutputSink`].
//!
//! # Error Handling
//! Three conditions abort the run: the log directory cannot be created, no tenant is
//! configured, or the tenant admin connection fails. Each is logged once and returned as an
//! [`InventoryError`]. Everything that goes wrong per site (connecting, listing) becomes a
//! [`FailureRecord`] and the run moves on to the next site.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::config::{RunConfig, DOCUMENT_LIBRARY, PAGE_SIZE, PERSONAL_SITE_FILTER};
use crate::contract::{Connector, Lister, PlatformError, SiteQuery, TenantConnection};
use crate::records::{FailureRecord, FileRecord, SiteRecord};
use crate::sink::{Output, OutputSink};
use crate::timestamp::now_stamp;

/// What a completed run found.
#[derive(Debug, Default)]
pub struct InventoryReport {
    pub sites: Vec<SiteRecord>,
    pub files: Vec<FileRecord>,
    pub failures: Vec<FailureRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("log directory {} could not be created: {source}", path.display())]
    LogDirectory { path: PathBuf, source: io::Error },
    #[error("tenant name is not set")]
    MissingTenant,
    #[error("could not connect to {admin_url}: {source}")]
    Connect {
        admin_url: String,
        source: PlatformError,
    },
}

pub async fn run_inventory<C, L, W>(
    config: &RunConfig,
    connector: &C,
    lister: &L,
    sink: &mut OutputSink<W>,
) -> Result<InventoryReport, InventoryError>
where
    C: Connector + ?Sized,
    L: Lister + ?Sized,
    W: Write,
{
    info!(log_dir = %config.log_dir.display(), "[INVENTORY] Starting inventory run");

    if let Err(source) = fs::create_dir_all(&config.log_dir) {
        error!(error = %source, path = %config.log_dir.display(), "[INVENTORY][ERROR] Log directory unavailable");
        let err = InventoryError::LogDirectory {
            path: config.log_dir.clone(),
            source,
        };
        log_error(sink, &err.to_string());
        return Err(err);
    }
    log(sink, "Starting SharePoint Online inventory");

    match (config.register_consent, config.tenant_name()) {
        (false, _) => {}
        (true, None) => warn!("[INVENTORY] Skipping management consent: tenant name is not set"),
        (true, Some(tenant)) => match connector.request_management_consent(tenant).await {
            Ok(message) => {
                info!("[INVENTORY] Management consent requested");
                log(sink, &message);
            }
            Err(e) => {
                warn!(error = %e, "[INVENTORY] Management consent request failed");
                log_error(sink, &format!("Management consent request failed: {e}"));
            }
        },
    }

    let Some(tenant) = config.tenant_name() else {
        error!("[INVENTORY][ERROR] Tenant name is not set");
        let err = InventoryError::MissingTenant;
        log_error(sink, "Tenant name is not set; configure the tenant before running");
        return Err(err);
    };

    let admin_url = config.admin_url(tenant);
    let tenant_conn = match connector.connect_admin(tenant, &admin_url).await {
        Ok(conn) => {
            info!(admin_url = %admin_url, "[INVENTORY] Connected to tenant admin");
            log(sink, &format!("Connected to {admin_url}"));
            conn
        }
        Err(source) => {
            error!(error = %source, admin_url = %admin_url, "[INVENTORY][ERROR] Tenant connection failed");
            let err = InventoryError::Connect { admin_url, source };
            log_error(sink, &err.to_string());
            return Err(err);
        }
    };

    let mut report = InventoryReport::default();

    if config.include_personal {
        let query = SiteQuery {
            filter: PERSONAL_SITE_FILTER.to_string(),
            personal: true,
        };
        collect_sites(lister, &tenant_conn, &query, &mut report).await;
    }
    let query = SiteQuery {
        filter: config.site_filter.clone(),
        personal: false,
    };
    collect_sites(lister, &tenant_conn, &query, &mut report).await;
    log(sink, &format!("Found {} sites", report.sites.len()));

    let sites = report.sites.clone();
    for site in &sites {
        collect_files(connector, lister, &tenant_conn, site, &mut report).await;
    }
    log(
        sink,
        &format!(
            "Found {} files across {} sites",
            report.files.len(),
            report.sites.len()
        ),
    );

    if config.console {
        if config.include_personal {
            sink.show_sites(&report.sites);
        }
        sink.show_files(&report.files);
    }

    if !report.failures.is_empty() {
        warn!(count = report.failures.len(), "[INVENTORY] Operations failed during the run");
        log(
            sink,
            &format!(
                "[WARNING] {} operations failed; see {}",
                report.failures.len(),
                config.files.failures
            ),
        );
        if config.persist {
            sink.emit("", Output::Failures(&report.failures));
        }
    }

    if config.persist {
        if config.include_personal {
            sink.emit("", Output::Sites(&report.sites));
        }
        sink.emit("", Output::Files(&report.files));
        info!(
            files = report.files.len(),
            path = %config.files_path().display(),
            "[INVENTORY] Persisted results"
        );
    }

    log(sink, "Inventory complete");
    info!(
        sites = report.sites.len(),
        files = report.files.len(),
        failures = report.failures.len(),
        "[INVENTORY] Finished"
    );
    Ok(report)
}

async fn collect_sites<L>(
    lister: &L,
    tenant: &TenantConnection,
    query: &SiteQuery,
    report: &mut InventoryReport,
) where
    L: Lister + ?Sized,
{
    match lister.list_sites(tenant, query).await {
        Ok(sites) => {
            info!(filter = %query.filter, personal = query.personal, count = sites.len(), "[INVENTORY] Listed sites");
            report.sites.extend(sites);
        }
        Err(e) => {
            warn!(error = %e, filter = %query.filter, "[INVENTORY] Site enumeration failed");
            let action = if query.personal {
                format!("List personal sites ({})", query.filter)
            } else {
                format!("List sites ({})", query.filter)
            };
            report.failures.push(FailureRecord::now(action, e.to_string()));
        }
    }
}

async fn collect_files<C, L>(
    connector: &C,
    lister: &L,
    tenant: &TenantConnection,
    site: &SiteRecord,
    report: &mut InventoryReport,
) where
    C: Connector + ?Sized,
    L: Lister + ?Sized,
{
    let site_conn = match connector.connect_site(tenant, &site.url).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, site = %site.url, "[INVENTORY] Site connection failed");
            report.failures.push(FailureRecord::now(
                format!("Connect to {}", site.url),
                e.to_string(),
            ));
            return;
        }
    };

    match lister
        .list_items(&site_conn, DOCUMENT_LIBRARY, PAGE_SIZE)
        .await
    {
        Ok(items) => {
            let before = report.files.len();
            report.files.extend(
                items
                    .iter()
                    .filter(|item| item.is_file())
                    .map(FileRecord::from_item),
            );
            debug!(
                site = %site.url,
                items = items.len(),
                files = report.files.len() - before,
                "[INVENTORY] Listed library items"
            );
        }
        Err(e) => {
            warn!(error = %e, site = %site.url, "[INVENTORY] Library listing failed");
            report.failures.push(FailureRecord::now(
                format!("List {DOCUMENT_LIBRARY} in {}", site.url),
                e.to_string(),
            ));
        }
    }
}

fn log<W: Write>(sink: &mut OutputSink<W>, message: &str) {
    sink.emit(&format!("{} {message}", now_stamp()), Output::Plain);
}

fn log_error<W: Write>(sink: &mut OutputSink<W>, message: &str) {
    sink.emit(&format!("{} [ERROR] {message}", now_stamp()), Output::Plain);
}
