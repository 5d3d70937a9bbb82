//! In-memory driver that records what it is asked to do and replays
//! scripted results. Used by the test suite and selectable as `dummy`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::{ConnectParams, Driver, NativeConnection, NativeCursor};
use crate::core::{ColumnDescription, DbError, DbResult, IndexMetadata, Row, Value};

/// Outcome of the next `execute` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Scripted {
    Rows {
        columns: Vec<ColumnDescription>,
        rows: Vec<Row>,
    },
    Count(Option<i64>),
    Error(String),
    Warning(String),
}

impl Scripted {
    #[must_use]
    pub const fn rows(columns: Vec<ColumnDescription>, rows: Vec<Row>) -> Self {
        Self::Rows { columns, rows }
    }

    #[must_use]
    pub const fn count(count: Option<i64>) -> Self {
        Self::Count(count)
    }
}

/// Everything the dummy backend has observed, shared between the driver
/// and every connection and cursor it hands out.
#[derive(Debug, Default)]
pub struct DummyJournal {
    pub executed: Vec<String>,
    pub params: Vec<Vec<Value>>,
    pub commits: usize,
    pub rollbacks: usize,
    pub connects: usize,
    pub closed: usize,
    /// Returned by `index_metadata`; `None` reports "not supported".
    pub indexes: Option<Vec<IndexMetadata>>,
    scripted: VecDeque<Scripted>,
}

impl DummyJournal {
    /// Queues the result of a future `execute`. Unscripted executes succeed
    /// with no result set and an unknown row count.
    pub fn push(&mut self, next: Scripted) {
        self.scripted.push_back(next);
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.scripted.len()
    }
}

#[derive(Debug, Clone)]
pub struct DummyDriver {
    journal: Rc<RefCell<DummyJournal>>,
}

impl DummyDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::with_journal(Rc::new(RefCell::new(DummyJournal::default())))
    }

    #[must_use]
    pub const fn with_journal(journal: Rc<RefCell<DummyJournal>>) -> Self {
        Self { journal }
    }

    #[must_use]
    pub fn journal(&self) -> Rc<RefCell<DummyJournal>> {
        Rc::clone(&self.journal)
    }
}

impl Default for DummyDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for DummyDriver {
    fn display_name(&self) -> &str {
        "Dummy (no database)"
    }

    fn connect(&self, params: &ConnectParams<'_>) -> DbResult<Box<dyn NativeConnection>> {
        tracing::trace!(database = params.database, "dummy connect");
        self.journal.borrow_mut().connects += 1;
        Ok(Box::new(DummyConnection {
            journal: Rc::clone(&self.journal),
            open: true,
        }))
    }
}

struct DummyConnection {
    journal: Rc<RefCell<DummyJournal>>,
    open: bool,
}

impl DummyConnection {
    fn check_open(&self) -> DbResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(DbError::error("connection is closed"))
        }
    }
}

impl NativeConnection for DummyConnection {
    fn cursor(&mut self) -> DbResult<Box<dyn NativeCursor + '_>> {
        self.check_open()?;
        Ok(Box::new(DummyCursor {
            journal: Rc::clone(&self.journal),
            rows: VecDeque::new(),
            description: None,
            row_count: None,
        }))
    }

    fn commit(&mut self) -> DbResult<()> {
        self.check_open()?;
        self.journal.borrow_mut().commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.check_open()?;
        self.journal.borrow_mut().rollbacks += 1;
        Ok(())
    }

    fn close(&mut self) -> DbResult<()> {
        self.check_open()?;
        self.open = false;
        self.journal.borrow_mut().closed += 1;
        Ok(())
    }
}

struct DummyCursor {
    journal: Rc<RefCell<DummyJournal>>,
    rows: VecDeque<Row>,
    description: Option<Vec<ColumnDescription>>,
    row_count: Option<i64>,
}

impl NativeCursor for DummyCursor {
    fn execute(&mut self, statement: &str, params: &[Value]) -> DbResult<()> {
        self.rows.clear();
        self.description = None;
        self.row_count = None;

        let next = {
            let mut journal = self.journal.borrow_mut();
            journal.executed.push(statement.to_string());
            journal.params.push(params.to_vec());
            journal.scripted.pop_front()
        };

        match next {
            None => Ok(()),
            Some(Scripted::Rows { columns, rows }) => {
                self.row_count = i64::try_from(rows.len()).ok();
                self.description = Some(columns);
                self.rows = rows.into();
                Ok(())
            }
            Some(Scripted::Count(count)) => {
                self.row_count = count;
                Ok(())
            }
            Some(Scripted::Error(message)) => Err(DbError::error(message)),
            Some(Scripted::Warning(message)) => Err(DbError::warning(message)),
        }
    }

    fn fetch_one(&mut self) -> DbResult<Option<Row>> {
        Ok(self.rows.pop_front())
    }

    fn row_count(&self) -> Option<i64> {
        self.row_count
    }

    fn description(&self) -> Option<Vec<ColumnDescription>> {
        self.description.clone()
    }

    fn index_metadata(&mut self, _table: &str) -> DbResult<Option<Vec<IndexMetadata>>> {
        Ok(self.journal.borrow().indexes.clone())
    }
}
