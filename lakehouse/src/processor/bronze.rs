use crate::warehouse::{BulkIngestOptions, Warehouse, WarehouseSession, in_transaction, validate_identifier};
use common::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Succeeded,
    Failed,
}

/// Result of ingesting one file.
#[derive(Debug, Clone, Serialize)]
pub struct LoadOutcome {
    pub file: PathBuf,
    pub status: LoadStatus,
    pub rows: u64,
    pub error: Option<String>,
}

/// Aggregate of one loader run. Individual failures never fail the run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub table: String,
    pub outcomes: Vec<LoadOutcome>,
}

impl LoadReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == LoadStatus::Succeeded)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn rows_loaded(&self) -> u64 {
        self.outcomes.iter().map(|o| o.rows).sum()
    }

    pub fn failed_files(&self) -> impl Iterator<Item = &LoadOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == LoadStatus::Failed)
    }
}

/// Bulk-loads extract files into the raw table, one transaction per file.
///
/// Reprocessing a file appends its rows again unless the table enforces a
/// uniqueness key; files are neither moved nor deleted after loading.
pub struct BronzeLoader {
    warehouse: Arc<dyn Warehouse>,
    table: String,
    extension: String,
    options: BulkIngestOptions,
}

impl BronzeLoader {
    pub fn new(warehouse: Arc<dyn Warehouse>, table: &str, extension: &str) -> Result<Self> {
        validate_identifier(table)?;
        Ok(Self {
            warehouse,
            table: table.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
            options: BulkIngestOptions::default(),
        })
    }

    pub fn with_options(mut self, options: BulkIngestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Files in `dir` with the loader's extension, sorted by file name.
    pub fn discover_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
        let mut files: Vec<PathBuf> = entries
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .map(|ext| ext.eq_ignore_ascii_case(self.extension.as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    fn ingest_file(&self, session: &mut dyn WarehouseSession, file: &Path) -> LoadOutcome {
        let started = Instant::now();
        info!(file = %file.display(), table = %self.table, "Loading file");

        let result = in_transaction(session, |s| s.bulk_ingest(&self.table, file, &self.options))
            .map_err(|e| Error::FileIngest {
                file: file.display().to_string(),
                detail: e.to_string(),
            });

        match result {
            Ok(rows) => {
                info!(
                    file = %file.display(),
                    rows,
                    duration_ms = started.elapsed().as_millis() as u64,
                    status = "succeeded",
                    "File loaded"
                );
                LoadOutcome {
                    file: file.to_path_buf(),
                    status: LoadStatus::Succeeded,
                    rows,
                    error: None,
                }
            }
            Err(e) => {
                error!(file = %file.display(), status = "failed", error = %e, "File load rolled back");
                LoadOutcome {
                    file: file.to_path_buf(),
                    status: LoadStatus::Failed,
                    rows: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Loads every discovered file in `dir`, continuing past failed files.
    ///
    /// Only an unavailable warehouse or an unreadable directory fails the run.
    pub fn load_directory(&self, dir: &Path) -> Result<LoadReport> {
        let mut session = self.warehouse.connect()?;
        info!(table = %self.table, source_dir = %dir.display(), "Connected to warehouse");

        let files = self.discover_files(dir)?;
        if files.is_empty() {
            warn!(source_dir = %dir.display(), extension = %self.extension, "No files to load");
        }

        let outcomes = files
            .iter()
            .map(|file| self.ingest_file(session.as_mut(), file))
            .collect();

        let report = LoadReport {
            table: self.table.clone(),
            outcomes,
        };

        info!(
            table = %self.table,
            succeeded = report.succeeded(),
            failed = report.failed(),
            rows = report.rows_loaded(),
            "All files processed"
        );
        Ok(report)
    }
}
