//! Uniform database driver layer.
//!
//! Each backend implements three small traits:
//!
//! - [`Driver`]: the factory. Knows its display name and how to open a
//!   native connection from host/port/user/password/database.
//! - [`NativeConnection`]: cursor creation, commit, rollback, close.
//! - [`NativeCursor`]: execute, fetch, and optional metadata overrides.
//!
//! Callers never see those directly. They work with the [`Connection`] and
//! [`Cursor`] wrappers, which carry the row count and column description of
//! the last execute and log every statement. Backend failures surface only as
//! [`DbError`] (warning or error).

pub mod dummy;
pub mod metadata;
pub mod mysql;
pub mod postgresql;
pub mod registry;
pub mod sqlite;

pub use dummy::{DummyDriver, DummyJournal, Scripted};
pub use metadata::{classify_column, probe_table_metadata};
pub use mysql::MysqlDriver;
pub use postgresql::PostgresDriver;
pub use registry::{DriverDescriptor, DriverRegistry, builtin_factory};
pub use sqlite::SqliteDriver;

use crate::core::{ColumnDescription, ColumnMetadata, DbError, DbResult, IndexMetadata, Row, Value};

/// Connection parameters, borrowed from a connection configuration.
#[derive(Debug, Clone, Copy)]
pub struct ConnectParams<'a> {
    pub host: &'a str,
    pub port: Option<u16>,
    pub user: &'a str,
    pub password: &'a str,
    pub database: &'a str,
}

/// Backend factory. One implementation per supported database.
pub trait Driver {
    /// Human-readable backend name, e.g. "PostgreSQL".
    fn display_name(&self) -> &str;

    fn connect(&self, params: &ConnectParams<'_>) -> DbResult<Box<dyn NativeConnection>>;
}

pub trait NativeConnection {
    fn cursor(&mut self) -> DbResult<Box<dyn NativeCursor + '_>>;
    fn commit(&mut self) -> DbResult<()>;
    fn rollback(&mut self) -> DbResult<()>;
    fn close(&mut self) -> DbResult<()>;
}

pub trait NativeCursor {
    fn execute(&mut self, statement: &str, params: &[Value]) -> DbResult<()>;

    fn fetch_one(&mut self) -> DbResult<Option<Row>>;

    /// `None` (or a negative count) when the backend cannot report one.
    fn row_count(&self) -> Option<i64>;

    /// `None` when the last statement produced no result set.
    fn description(&self) -> Option<Vec<ColumnDescription>>;

    fn close(&mut self) -> DbResult<()> {
        Ok(())
    }

    /// Column metadata for `table`. The default runs a zero-row probe.
    fn table_metadata(&mut self, table: &str) -> DbResult<Vec<ColumnMetadata>> {
        probe_table_metadata(self, table)
    }

    /// Index metadata for `table`; `Ok(None)` means "not supported".
    fn index_metadata(&mut self, _table: &str) -> DbResult<Option<Vec<IndexMetadata>>> {
        Ok(None)
    }
}

/// An open connection to one backend.
pub struct Connection {
    native: Box<dyn NativeConnection>,
    driver_key: String,
}

impl Connection {
    pub fn open(driver_key: &str, driver: &dyn Driver, params: &ConnectParams<'_>) -> DbResult<Self> {
        tracing::info!(
            driver = driver_key,
            host = params.host,
            database = params.database,
            "connecting"
        );
        let native = driver.connect(params)?;
        Ok(Self {
            native,
            driver_key: driver_key.to_string(),
        })
    }

    #[must_use]
    pub fn driver_key(&self) -> &str {
        &self.driver_key
    }

    pub fn cursor(&mut self) -> DbResult<Cursor<'_>> {
        let native = self.native.cursor()?;
        Ok(Cursor::new(native))
    }

    pub fn commit(&mut self) -> DbResult<()> {
        tracing::debug!(driver = %self.driver_key, "commit");
        self.native.commit()
    }

    pub fn rollback(&mut self) -> DbResult<()> {
        tracing::debug!(driver = %self.driver_key, "rollback");
        self.native.rollback()
    }

    pub fn close(mut self) -> DbResult<()> {
        tracing::info!(driver = %self.driver_key, "closing connection");
        self.native.close()
    }
}

/// Statement execution handle.
///
/// `row_count()` and `description()` describe the most recent successful
/// [`execute`](Cursor::execute); before that, or after a failed execute,
/// both are `None`.
pub struct Cursor<'c> {
    native: Box<dyn NativeCursor + 'c>,
    row_count: Option<i64>,
    description: Option<Vec<ColumnDescription>>,
    executed: bool,
}

impl<'c> Cursor<'c> {
    #[must_use]
    pub fn new(native: Box<dyn NativeCursor + 'c>) -> Self {
        Self {
            native,
            row_count: None,
            description: None,
            executed: false,
        }
    }

    pub fn execute(&mut self, statement: &str, params: &[Value]) -> DbResult<()> {
        self.reset();
        tracing::debug!(target: "sql", "{statement}");
        self.native.execute(statement, params)?;
        self.row_count = self.native.row_count();
        self.description = self.native.description();
        self.executed = true;
        Ok(())
    }

    /// Runs `statement` once per parameter set. The row count is the sum of
    /// the individual counts, or unknown if any of them is.
    pub fn execute_many(&mut self, statement: &str, param_sets: &[Vec<Value>]) -> DbResult<()> {
        self.reset();
        tracing::debug!(target: "sql", sets = param_sets.len(), "{statement}");
        let mut total = Some(0_i64);
        for params in param_sets {
            self.native.execute(statement, params)?;
            total = match (total, self.native.row_count()) {
                (Some(sum), Some(n)) if n >= 0 => Some(sum + n),
                _ => None,
            };
        }
        self.row_count = total;
        self.description = self.native.description();
        self.executed = true;
        Ok(())
    }

    pub fn fetch_one(&mut self) -> DbResult<Option<Row>> {
        self.ensure_executed()?;
        self.native.fetch_one()
    }

    pub fn fetch_many(&mut self, n: usize) -> DbResult<Vec<Row>> {
        self.ensure_executed()?;
        let mut rows = Vec::with_capacity(n.min(1024));
        while rows.len() < n {
            match self.native.fetch_one()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    pub fn fetch_all(&mut self) -> DbResult<Vec<Row>> {
        self.ensure_executed()?;
        let mut rows = Vec::new();
        while let Some(row) = self.native.fetch_one()? {
            rows.push(row);
        }
        Ok(rows)
    }

    #[must_use]
    pub const fn row_count(&self) -> Option<i64> {
        self.row_count
    }

    #[must_use]
    pub fn description(&self) -> Option<&[ColumnDescription]> {
        self.description.as_deref()
    }

    pub fn table_metadata(&mut self, table: &str) -> DbResult<Vec<ColumnMetadata>> {
        self.reset();
        self.native.table_metadata(table)
    }

    pub fn index_metadata(&mut self, table: &str) -> DbResult<Option<Vec<IndexMetadata>>> {
        self.reset();
        self.native.index_metadata(table)
    }

    pub fn close(mut self) -> DbResult<()> {
        self.native.close()
    }

    fn reset(&mut self) {
        self.row_count = None;
        self.description = None;
        self.executed = false;
    }

    fn ensure_executed(&self) -> DbResult<()> {
        if self.executed {
            Ok(())
        } else {
            Err(DbError::error("No statement has been executed on this cursor"))
        }
    }
}

/// Statements that must not be wrapped in an implicit transaction.
pub(crate) fn needs_implicit_begin(statement: &str) -> bool {
    let mut words = statement.split_whitespace().map(str::to_ascii_lowercase);
    let first = words.next().unwrap_or_default();
    match first.as_str() {
        "" | "begin" | "start" | "commit" | "end" | "rollback" | "abort" | "vacuum" | "attach"
        | "detach" => false,
        "create" | "drop" => !matches!(
            words.next().as_deref(),
            Some("database" | "tablespace")
        ),
        _ => true,
    }
}

/// Whether a statement opens (`Some(true)`) or closes (`Some(false)`) a
/// transaction explicitly.
pub(crate) fn transaction_effect(statement: &str) -> Option<bool> {
    let first = statement.split_whitespace().next()?.to_ascii_lowercase();
    match first.trim_end_matches(';') {
        "begin" | "start" => Some(true),
        "commit" | "end" | "rollback" | "abort" => Some(false),
        _ => None,
    }
}
