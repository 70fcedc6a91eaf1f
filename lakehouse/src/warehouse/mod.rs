pub mod sqlite;

use common::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::warn;

pub use sqlite::SqliteWarehouse;

static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("Invalid identifier regex")
});

/// Checks a `name` or `schema.name` identifier before it is spliced into SQL.
pub fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("invalid table identifier: '{}'", name)))
    }
}

/// Layout of a delimited file handed to a bulk ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkIngestOptions {
    pub skip_header: bool,
    pub field_separator: u8,
    pub row_separator: u8,
}

impl Default for BulkIngestOptions {
    fn default() -> Self {
        Self {
            skip_header: true,
            field_separator: b',',
            row_separator: b'\n',
        }
    }
}

/// A single database session. Dropping it releases the connection and rolls
/// back any transaction still open.
pub trait WarehouseSession: Send {
    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;

    /// Loads every row of `source` into `table`; returns the rows inserted.
    fn bulk_ingest(&mut self, table: &str, source: &Path, options: &BulkIngestOptions) -> Result<u64>;

    /// Runs a named, parameterless procedure.
    fn execute_procedure(&mut self, name: &str) -> Result<()>;

    fn row_count(&mut self, table: &str) -> Result<u64>;
}

pub trait Warehouse: Send + Sync {
    /// Opens a session; failures are `Error::Connection`.
    fn connect(&self) -> Result<Box<dyn WarehouseSession>>;
}

/// Runs `work` inside a transaction: commit on success, roll back on error.
///
/// A failed commit is rolled back too, so the session is reusable afterwards.
pub fn in_transaction<T, F>(session: &mut dyn WarehouseSession, work: F) -> Result<T>
where
    F: FnOnce(&mut dyn WarehouseSession) -> Result<T>,
{
    session.begin()?;
    let result = work(&mut *session).and_then(|value| session.commit().map(|()| value));
    if result.is_err() {
        if let Err(rollback_err) = session.rollback() {
            warn!(error = %rollback_err, "Rollback failed");
        }
    }
    result
}
