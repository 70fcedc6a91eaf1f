//! SQLite implementation of the warehouse.
//!
//! SQLite has no stored procedures, so procedures are named SQL scripts
//! registered on the warehouse and run with `execute_batch`.

use super::{BulkIngestOptions, Warehouse, WarehouseSession, validate_identifier};
use arrow::array::{Array, StringArray};
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use common::config::WarehouseConfig;
use common::{Error, Result};
use rusqlite::{Connection, OpenFlags, params_from_iter};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct SqliteWarehouse {
    path: PathBuf,
    procedures: Arc<HashMap<String, String>>,
}

impl SqliteWarehouse {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            procedures: Arc::new(HashMap::new()),
        }
    }

    /// Registers `sql` as the body of procedure `name`.
    pub fn with_procedure(mut self, name: &str, sql: &str) -> Self {
        Arc::make_mut(&mut self.procedures).insert(name.to_string(), sql.to_string());
        self
    }

    /// Warehouse for the configured database, with procedure scripts read
    /// from disk.
    pub fn from_config(config: &WarehouseConfig) -> Result<Self> {
        let mut warehouse = Self::new(&config.database);
        for procedure in &config.procedures {
            let sql = std::fs::read_to_string(&procedure.script).map_err(|e| {
                Error::InvalidInput(format!(
                    "cannot read script {} for procedure {}: {}",
                    procedure.script.display(),
                    procedure.name,
                    e
                ))
            })?;
            info!(procedure = %procedure.name, script = %procedure.script.display(), "Registered procedure");
            warehouse = warehouse.with_procedure(&procedure.name, &sql);
        }
        Ok(warehouse)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Warehouse for SqliteWarehouse {
    fn connect(&self) -> Result<Box<dyn WarehouseSession>> {
        let connection_error =
            |e: rusqlite::Error| Error::Connection(format!("cannot open {}: {}", self.path.display(), e));

        // Never create the database here; a missing file is a connection failure.
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(connection_error)?;
        conn.busy_timeout(Duration::from_secs(30))
            .map_err(connection_error)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(connection_error)?;

        debug!(database = %self.path.display(), "Warehouse session opened");
        Ok(Box::new(SqliteSession {
            conn,
            procedures: Arc::clone(&self.procedures),
        }))
    }
}

pub struct SqliteSession {
    conn: Connection,
    procedures: Arc<HashMap<String, String>>,
}

impl SqliteSession {
    /// Column names of `table` in declaration order.
    fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let (schema, name) = match table.split_once('.') {
            Some((schema, name)) => (schema, name),
            None => ("main", table),
        };

        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1, ?2) ORDER BY cid")?;
        let columns = stmt
            .query_map([name, schema], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if columns.is_empty() {
            return Err(Error::InvalidInput(format!("table '{}' does not exist", table)));
        }
        Ok(columns)
    }
}

impl WarehouseSession for SqliteSession {
    fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn bulk_ingest(&mut self, table: &str, source: &Path, options: &BulkIngestOptions) -> Result<u64> {
        validate_identifier(table)?;
        let columns = self.table_columns(table)?;

        // Fields map positionally onto the table; the engine does the typing.
        let schema = Arc::new(Schema::new(
            columns
                .iter()
                .map(|c| Field::new(c, DataType::Utf8, true))
                .collect::<Vec<_>>(),
        ));
        let reader = ReaderBuilder::new(schema)
            .with_header(options.skip_header)
            .with_delimiter(options.field_separator)
            .with_terminator(options.row_separator)
            .build(File::open(source)?)?;

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns
                .iter()
                .map(|c| format!("\"{}\"", c.replace('"', "\"\"")))
                .collect::<Vec<_>>()
                .join(", "),
            (1..=columns.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let mut inserted = 0u64;
        for batch in reader {
            let batch = batch?;
            let arrays = batch
                .columns()
                .iter()
                .map(|c| {
                    c.as_any()
                        .downcast_ref::<StringArray>()
                        .ok_or_else(|| Error::Other("expected text columns from CSV reader".to_string()))
                })
                .collect::<Result<Vec<_>>>()?;

            for row in 0..batch.num_rows() {
                let values = arrays
                    .iter()
                    .map(|a| (!a.is_null(row)).then(|| a.value(row)));
                stmt.execute(params_from_iter(values))?;
                inserted += 1;
            }
        }

        debug!(table, source = %source.display(), rows = inserted, "Bulk ingest staged");
        Ok(inserted)
    }

    fn execute_procedure(&mut self, name: &str) -> Result<()> {
        let sql = self
            .procedures
            .get(name)
            .ok_or_else(|| Error::InvalidInput(format!("procedure '{}' is not registered", name)))?;
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn row_count(&mut self, table: &str) -> Result<u64> {
        validate_identifier(table)?;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        if !self.conn.is_autocommit() {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
        debug!("Warehouse session closed");
    }
}
