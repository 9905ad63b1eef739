//! Output sink: the single funnel for console lines, the execution log and the CSV exports.
//!
//! Callers pick the destination with an [`Output`] variant. Every write is append-only;
//! CSV exports get their header row only when the file is new or empty.
//!
//! The sink never returns an error. A failed write is reported as an `[ERROR]` line through
//! the plain path; if that also fails, the error goes to `tracing` and the call returns.

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::config::RunConfig;
use crate::records::{FailureRecord, FileRecord, SiteRecord};
use crate::timestamp::now_stamp;

/// What a single [`OutputSink::emit`] call writes.
#[derive(Debug, Clone, Copy)]
pub enum Output<'a> {
    /// Console plus execution log.
    Plain,
    /// Failures CSV.
    Failures(&'a [FailureRecord]),
    /// Sites CSV.
    Sites(&'a [SiteRecord]),
    /// Files CSV.
    Files(&'a [FileRecord]),
}

#[derive(Debug, thiserror::Error)]
enum SinkError {
    #[error("failed to write {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to write records to {}: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },
}

/// Destination files of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkPaths {
    pub log: PathBuf,
    pub failures: PathBuf,
    pub sites: PathBuf,
    pub files: PathBuf,
}

impl SinkPaths {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            log: config.log_path(),
            failures: config.failures_path(),
            sites: config.sites_path(),
            files: config.files_path(),
        }
    }
}

pub struct OutputSink<W: Write = io::Stdout> {
    paths: SinkPaths,
    console: W,
}

impl OutputSink<io::Stdout> {
    pub fn stdout(paths: SinkPaths) -> Self {
        Self::new(paths, io::stdout())
    }
}

impl<W: Write> OutputSink<W> {
    pub fn new(paths: SinkPaths, console: W) -> Self {
        Self { paths, console }
    }

    pub fn into_console(self) -> W {
        self.console
    }

    /// Writes `text` or a record batch, depending on `output`.
    pub fn emit(&mut self, text: &str, output: Output<'_>) {
        let result = match output {
            Output::Plain => {
                self.write_plain(text, false);
                return;
            }
            Output::Failures(records) => append_csv(&self.paths.failures, records),
            Output::Sites(records) => append_csv(&self.paths.sites, records),
            Output::Files(records) => append_csv(&self.paths.files, records),
        };
        if let Err(e) = result {
            self.write_plain(&format!("{} [ERROR] {e}", now_stamp()), true);
        }
    }

    /// Console-only report lines; not mirrored to the execution log.
    pub fn show(&mut self, text: &str) {
        if let Err(e) = writeln!(self.console, "{text}") {
            error!(error = %e, "Failed to write to console");
        }
    }

    pub fn show_sites(&mut self, sites: &[SiteRecord]) {
        let rows = sites
            .iter()
            .map(|s| vec![s.url.clone(), s.personal.to_string()])
            .collect();
        let table = build_table(&["Url", "Personal"], rows);
        self.show(&table.to_string());
    }

    pub fn show_files(&mut self, files: &[FileRecord]) {
        let rows = files
            .iter()
            .map(|f| {
                vec![
                    f.unique_id.clone(),
                    f.name.clone(),
                    f.leaf_name.clone(),
                    f.file_type.clone(),
                    format!("{:.2}", f.size_kb),
                    f.created.clone(),
                    f.created_by.clone(),
                    f.modified.clone(),
                    f.modified_by.clone(),
                    f.checkout_user.clone(),
                    f.shared_with_users.clone(),
                    f.is_current_version.to_string(),
                    f.checked_out_locally.to_string(),
                    f.relative_url.clone(),
                ]
            })
            .collect();
        let table = build_table(
            &[
                "UniqueId",
                "Name",
                "FileLeafRef",
                "FileType",
                "FileSizeKB",
                "Created",
                "CreatedBy",
                "Modified",
                "ModifiedBy",
                "CheckoutUser",
                "SharedWithUsers",
                "IsCurrentVersion",
                "CheckedOutLocally",
                "RelativeUrl",
            ],
            rows,
        );
        self.show(&table.to_string());
    }

    fn write_plain(&mut self, text: &str, reporting_error: bool) {
        if let Err(e) = writeln!(self.console, "{text}") {
            error!(error = %e, "Failed to write to console");
        }
        if let Err(e) = append_line(&self.paths.log, text) {
            if reporting_error {
                error!(error = %e, line = text, "Failed to write error line to execution log");
            } else {
                self.write_plain(&format!("{} [ERROR] {e}", now_stamp()), true);
            }
        }
    }
}

fn append_line(path: &Path, text: &str) -> Result<(), SinkError> {
    let io_err = |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    writeln!(file, "{text}").map_err(io_err)
}

fn append_csv<T: Serialize>(path: &Path, records: &[T]) -> Result<(), SinkError> {
    let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let csv_err = |source| SinkError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    for record in records {
        writer.serialize(record).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), count = records.len(), header = needs_header, "Appended CSV records");
    Ok(())
}

/// Console table in the same preset for every report.
fn build_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        table.add_row(row);
    }
    table
}
