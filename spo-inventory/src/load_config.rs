/// `load_config` module: reads the optional YAML run file and merges command-line flags over it
/// into the immutable [`RunConfig`].
///
/// # Responsibilities
/// - Parse the user-supplied YAML file into [`FileConfig`], where every key is optional
/// - Reject unknown keys so typos surface instead of silently falling back to defaults
/// - Resolve the final [`RunConfig`]: flag beats file beats default
///
/// Secrets never live in this file; the REST client reads them from the environment.
///
/// # Errors
/// Read and parse failures are `anyhow::Error`s surfaced at the CLI boundary.
use anyhow::Result;
use serde::Deserialize;
use spo_inventory_core::config::{OutputFiles, RunConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::cli::ScanArgs;

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub tenant: Option<String>,
    pub console: Option<bool>,
    pub persist: Option<bool>,
    pub include_personal: Option<bool>,
    pub register_consent: Option<bool>,
    pub site_filter: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub admin_url: Option<String>,
    pub files: FilesSection,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FilesSection {
    pub execution_log: Option<String>,
    pub failures: Option<String>,
    pub files_found: Option<String>,
    pub sites_found: Option<String>,
}

/// Loads a YAML run file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    match serde_yaml::from_str::<Option<FileConfig>>(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf.unwrap_or_default())
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

/// Merges flags over the file values over the defaults.
pub fn resolve(file: FileConfig, args: &ScanArgs) -> RunConfig {
    let defaults = RunConfig::default();
    let default_files = OutputFiles::default();

    RunConfig {
        tenant: args
            .tenant
            .clone()
            .or(file.tenant)
            .unwrap_or(defaults.tenant),
        console: args.console().or(file.console).unwrap_or(defaults.console),
        persist: args.persist().or(file.persist).unwrap_or(defaults.persist),
        include_personal: args.include_personal
            || file.include_personal.unwrap_or(defaults.include_personal),
        register_consent: args.register_consent
            || file.register_consent.unwrap_or(defaults.register_consent),
        site_filter: args
            .filter
            .clone()
            .or(file.site_filter)
            .unwrap_or(defaults.site_filter),
        log_dir: args
            .log_dir
            .clone()
            .or(file.log_dir)
            .unwrap_or(defaults.log_dir),
        files: OutputFiles {
            execution_log: args
                .log_file
                .clone()
                .or(file.files.execution_log)
                .unwrap_or(default_files.execution_log),
            failures: args
                .failures_file
                .clone()
                .or(file.files.failures)
                .unwrap_or(default_files.failures),
            files_found: args
                .files_file
                .clone()
                .or(file.files.files_found)
                .unwrap_or(default_files.files_found),
            sites_found: args
                .sites_file
                .clone()
                .or(file.files.sites_found)
                .unwrap_or(default_files.sites_found),
        },
        admin_url: args.admin_url.clone().or(file.admin_url),
    }
}
