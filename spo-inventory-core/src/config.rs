use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Placeholder tenant; a run refuses to start while it is still set.
pub const TENANT_PLACEHOLDER: &str = "<tenant>";

/// Server-side filter selecting OneDrive personal sites.
pub const PERSONAL_SITE_FILTER: &str = "Url -like '-my.sharepoint.com/personal/'";

/// Document library walked on every site.
pub const DOCUMENT_LIBRARY: &str = "Documents";

/// Items requested per listing page.
pub const PAGE_SIZE: u32 = 1000;

/// Names of the files written under the log directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFiles {
    pub execution_log: String,
    pub failures: String,
    pub files_found: String,
    pub sites_found: String,
}

impl Default for OutputFiles {
    fn default() -> Self {
        Self {
            execution_log: "Execution.log".to_string(),
            failures: "Failures.csv".to_string(),
            files_found: "FilesFound.csv".to_string(),
            sites_found: "SitesFound.csv".to_string(),
        }
    }
}

/// Everything one inventory run needs. Built once, never mutated during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub tenant: String,
    pub console: bool,
    pub persist: bool,
    pub include_personal: bool,
    pub register_consent: bool,
    pub site_filter: String,
    pub log_dir: PathBuf,
    pub files: OutputFiles,
    /// Overrides the admin endpoint derived from the tenant name.
    pub admin_url: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tenant: TENANT_PLACEHOLDER.to_string(),
            console: true,
            persist: true,
            include_personal: false,
            register_consent: false,
            site_filter: "Url -like '/sites/'".to_string(),
            log_dir: PathBuf::from("logs"),
            files: OutputFiles::default(),
            admin_url: None,
        }
    }
}

impl RunConfig {
    /// The tenant name, if one was actually configured.
    pub fn tenant_name(&self) -> Option<&str> {
        let tenant = self.tenant.trim();
        if tenant.is_empty() || tenant == TENANT_PLACEHOLDER {
            None
        } else {
            Some(tenant)
        }
    }

    pub fn admin_url(&self, tenant: &str) -> String {
        match &self.admin_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{tenant}-admin.sharepoint.com"),
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.files.execution_log)
    }

    pub fn failures_path(&self) -> PathBuf {
        self.log_dir.join(&self.files.failures)
    }

    pub fn files_path(&self) -> PathBuf {
        self.log_dir.join(&self.files.files_found)
    }

    pub fn sites_path(&self) -> PathBuf {
        self.log_dir.join(&self.files.sites_found)
    }

    pub fn trace_loaded(&self) {
        info!(
            tenant = %self.tenant,
            console = self.console,
            persist = self.persist,
            include_personal = self.include_personal,
            log_dir = %self.log_dir.display(),
            "Loaded RunConfig"
        );
        debug!(?self, "RunConfig loaded (full debug)");
    }
}
