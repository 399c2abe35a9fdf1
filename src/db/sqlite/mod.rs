//! SQLite session implementation.
//!
//! sqlx opens and owns the connection. Statements run on the locked raw
//! handle instead of through sqlx's executor: its multi-statement stream
//! neither says whether a statement has columns nor resets the change count
//! between statements, and both decide what a result is.

mod statement;

use self::statement::{changes_since, total_changes, RawStatement, ResultCode, Step, StoredCell};
use super::chain::{closed_connection, multiple_statements, not_a_query, UNBOUNDED_DISPLAY_SIZE};
use super::{
    BufferedRows, DriverResult, DriverValue, ResultChain, ResultMetadata, RowSource, Session,
    Value,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::sqlite::{LockedSqliteHandle, SqliteConnection};
use sqlx::Connection;
use tracing::{debug, warn};

/// SQLite session over a single connection.
pub struct SqliteSession {
    conn: Option<SqliteConnection>,
}

impl SqliteSession {
    /// Opens the database file (or in-memory database) named by `target`.
    pub async fn connect(target: &str) -> DriverResult<Self> {
        let conn = SqliteConnection::connect(target).await?;
        debug!("Opened SQLite database");
        Ok(Self { conn: Some(conn) })
    }

    fn connection(&mut self) -> DriverResult<&mut SqliteConnection> {
        self.conn.as_mut().ok_or_else(closed_connection)
    }
}

#[async_trait]
impl Session for SqliteSession {
    async fn execute<'s>(&'s mut self, sql: &'s str) -> DriverResult<Box<dyn ResultChain + 's>> {
        let handle = self.connection()?.lock_handle().await?;
        let mut chain = StatementChain::new(handle, sql);
        chain.advance()?;
        Ok(Box::new(chain))
    }

    async fn query(&mut self, sql: &str) -> DriverResult<BufferedRows> {
        let mut handle = self.connection()?.lock_handle().await?;
        let db = handle.as_raw_handle();

        let prepared = RawStatement::prepare_next(db, sql).map_err(|rc| failure(&mut handle, rc))?;
        let Some((mut statement, rest)) = prepared else {
            return Err(not_a_query());
        };
        if statement.column_count() == 0 {
            return Err(not_a_query());
        }
        // Nothing has run yet; a second statement is refused before any
        // side effect.
        let next = RawStatement::prepare_next(db, rest).map_err(|rc| failure(&mut handle, rc))?;
        if next.is_some() {
            return Err(multiple_statements());
        }

        let mut cells = Vec::new();
        while statement.step().map_err(|rc| failure(&mut handle, rc))? == Step::Row {
            cells.push(statement.row());
        }

        let columns = describe_columns(&statement, cells.first().map(Vec::as_slice));
        let rows = cells
            .into_iter()
            .map(|row| Box::new(decode_row(&columns, row)) as Box<dyn RowSource + Send>)
            .collect::<Vec<_>>();

        debug!("Buffered {} rows over {} columns", rows.len(), columns.len());
        Ok(BufferedRows {
            metadata: Box::new(SqliteColumns(columns)),
            rows,
        })
    }

    async fn close(&mut self) -> DriverResult<()> {
        match self.conn.take() {
            Some(conn) => conn.close().await,
            None => {
                warn!("SQLite session closed twice");
                Ok(())
            }
        }
    }
}

/// Turns a failed result code into sqlx's SQLite error, message included.
fn failure(handle: &mut LockedSqliteHandle<'_>, rc: ResultCode) -> sqlx::Error {
    match handle.last_error() {
        Some(error) => sqlx::Error::Database(Box::new(error)),
        None => sqlx::Error::Protocol(statement::describe(rc)),
    }
}

#[derive(Debug, Clone)]
struct SqliteColumn {
    label: String,
    declared: Option<String>,
    type_name: String,
}

/// Describes the columns of a statement.
///
/// Expression columns have no declared type; they take the storage class of
/// their value in `first_row`, or `NULL` when there is no row.
fn describe_columns(statement: &RawStatement, first_row: Option<&[StoredCell]>) -> Vec<SqliteColumn> {
    (0..statement.column_count())
        .map(|index| {
            let declared = statement.declared_type(index).map(|t| t.to_uppercase());
            let type_name = declared.clone().unwrap_or_else(|| {
                first_row
                    .and_then(|row| row.get(index))
                    .map_or("NULL", StoredCell::storage_class)
                    .to_string()
            });
            SqliteColumn {
                label: statement.column_name(index),
                declared,
                type_name,
            }
        })
        .collect()
}

struct SqliteColumns(Vec<SqliteColumn>);

impl SqliteColumns {
    fn column(&self, index: usize) -> DriverResult<&SqliteColumn> {
        self.0.get(index).ok_or(sqlx::Error::ColumnIndexOutOfBounds {
            index,
            len: self.0.len(),
        })
    }
}

impl ResultMetadata for SqliteColumns {
    fn column_count(&self) -> DriverResult<usize> {
        Ok(self.0.len())
    }

    fn type_name(&self, index: usize) -> DriverResult<String> {
        Ok(self.column(index)?.type_name.clone())
    }

    fn label(&self, index: usize) -> DriverResult<String> {
        Ok(self.column(index)?.label.clone())
    }

    fn display_size(&self, index: usize) -> DriverResult<u32> {
        Ok(display_size(&self.column(index)?.type_name))
    }
}

/// A row read off a statement, already decoded.
struct SqliteValues(Vec<DriverValue>);

impl RowSource for SqliteValues {
    fn get(&self, index: usize) -> DriverResult<DriverValue> {
        self.0
            .get(index)
            .cloned()
            .ok_or(sqlx::Error::ColumnIndexOutOfBounds {
                index,
                len: self.0.len(),
            })
    }
}

fn decode_row(columns: &[SqliteColumn], row: Vec<StoredCell>) -> SqliteValues {
    SqliteValues(
        row.into_iter()
            .enumerate()
            .map(|(index, cell)| {
                let declared = columns.get(index).and_then(|c| c.declared.as_deref());
                decode_cell(declared, cell)
            })
            .collect(),
    )
}

/// Decodes a cell, using the declared type where it carries more meaning
/// than the stored value (dates and booleans are stored as text or integers).
fn decode_cell(declared: Option<&str>, cell: StoredCell) -> DriverValue {
    if let Some(value) = declared.and_then(|declared| decode_declared(declared, &cell)) {
        return value;
    }

    match cell {
        StoredCell::Null => DriverValue::null(),
        StoredCell::Integer(i) => Value::Long(i).into(),
        StoredCell::Float(f) => Value::Float(f).into(),
        StoredCell::Text(s) => Value::String(s).into(),
        StoredCell::Blob(b) => Value::Bytes(b).into(),
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

fn decode_declared(declared: &str, cell: &StoredCell) -> Option<DriverValue> {
    let base = declared.split('(').next().unwrap_or(declared).trim();

    match (base, cell) {
        ("DATETIME" | "TIMESTAMP", StoredCell::Text(text)) => DATETIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
            .map(DriverValue::Timestamp),
        ("DATETIME" | "TIMESTAMP", StoredCell::Integer(secs)) => DateTime::from_timestamp(*secs, 0)
            .map(|instant| DriverValue::Timestamp(instant.naive_utc())),
        ("DATE", StoredCell::Text(text)) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .map(DriverValue::Date),
        ("TIME", StoredCell::Text(text)) => NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
            .ok()
            .map(DriverValue::Time),
        ("BOOLEAN" | "BOOL", StoredCell::Integer(i)) => Some(Value::Bool(*i != 0).into()),
        _ => None,
    }
}

fn display_size(type_name: &str) -> u32 {
    let upper = type_name.to_uppercase();
    match upper.split('(').next().unwrap_or_default().trim() {
        "BOOLEAN" | "BOOL" => 1,
        "INTEGER" | "INT" | "INT8" | "BIGINT" => 20,
        "REAL" | "FLOAT" | "DOUBLE" => 25,
        "DATE" => 10,
        "TIME" => 15,
        "DATETIME" | "TIMESTAMP" => 29,
        _ => UNBOUNDED_DISPLAY_SIZE,
    }
}

/// Where the chain currently stands.
enum Position {
    /// A row-set; `pending` holds the row that announced it until fetched.
    RowSet {
        columns: Vec<SqliteColumn>,
        pending: Option<SqliteValues>,
        drained: bool,
    },
    Update(u64),
    Finished,
}

/// Cursor over the statements of one SQL text.
///
/// Holds the connection lock until dropped.
struct StatementChain<'s> {
    // Finalized before the lock is released.
    statement: Option<RawStatement>,
    position: Position,
    rest: &'s str,
    handle: LockedSqliteHandle<'s>,
}

impl<'s> StatementChain<'s> {
    fn new(handle: LockedSqliteHandle<'s>, sql: &'s str) -> Self {
        Self {
            statement: None,
            position: Position::Finished,
            rest: sql,
            handle,
        }
    }

    /// Runs the next statement up to its first row, or to completion if it
    /// has no columns.
    fn advance(&mut self) -> DriverResult<bool> {
        self.statement = None;
        self.position = Position::Finished;

        let db = self.handle.as_raw_handle();
        let prepared =
            RawStatement::prepare_next(db, self.rest).map_err(|rc| failure(&mut self.handle, rc))?;
        let Some((mut statement, rest)) = prepared else {
            return Ok(false);
        };
        self.rest = rest;

        let total_before = total_changes(db);

        if statement.column_count() == 0 {
            while statement.step().map_err(|rc| failure(&mut self.handle, rc))? == Step::Row {}
            self.position = Position::Update(changes_since(db, total_before));
            return Ok(false);
        }

        let first = match statement.step().map_err(|rc| failure(&mut self.handle, rc))? {
            Step::Row => Some(statement.row()),
            Step::Done => None,
        };
        let columns = describe_columns(&statement, first.as_deref());
        self.position = Position::RowSet {
            drained: first.is_none(),
            pending: first.map(|row| decode_row(&columns, row)),
            columns,
        };
        self.statement = Some(statement);
        Ok(true)
    }
}

#[async_trait]
impl ResultChain for StatementChain<'_> {
    fn is_row_set(&self) -> bool {
        matches!(self.position, Position::RowSet { .. })
    }

    fn update_count(&self) -> Option<u64> {
        match self.position {
            Position::Update(count) => Some(count),
            _ => None,
        }
    }

    fn metadata(&self) -> DriverResult<Box<dyn ResultMetadata + Send>> {
        match &self.position {
            Position::RowSet { columns, .. } => Ok(Box::new(SqliteColumns(columns.clone()))),
            _ => Err(sqlx::Error::Protocol("no result set is open".into())),
        }
    }

    async fn next_row(&mut self) -> DriverResult<Option<Box<dyn RowSource + Send>>> {
        let Position::RowSet {
            columns,
            pending,
            drained,
        } = &mut self.position
        else {
            return Ok(None);
        };

        if let Some(row) = pending.take() {
            return Ok(Some(Box::new(row)));
        }
        let Some(statement) = self.statement.as_mut().filter(|_| !*drained) else {
            return Ok(None);
        };

        match statement.step() {
            Ok(Step::Row) => Ok(Some(Box::new(decode_row(columns, statement.row())))),
            Ok(Step::Done) => {
                *drained = true;
                Ok(None)
            }
            Err(rc) => Err(failure(&mut self.handle, rc)),
        }
    }

    async fn more_results(&mut self) -> DriverResult<bool> {
        // Finalizing the current statement discards its unread rows.
        self.advance()
    }
}
