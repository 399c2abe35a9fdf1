//! Mock database connector for testing.
//!
//! Provides an in-memory implementation of the session seam that replays a
//! scripted sequence of results, with failures injectable at every step the
//! execution driver goes through.

use super::{
    BufferedRows, Connector, DriverResult, DriverValue, ResultChain, ResultMetadata, RowSource,
    Session,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn mock_error(message: &str) -> sqlx::Error {
    sqlx::Error::Protocol(message.to_string())
}

/// Column description used by scripted row-sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockColumn {
    pub type_name: String,
    pub label: String,
    pub display_size: u32,
}

impl MockColumn {
    pub fn new(type_name: impl Into<String>, label: impl Into<String>, display_size: u32) -> Self {
        Self {
            type_name: type_name.into(),
            label: label.into(),
            display_size,
        }
    }
}

/// One scripted row.
#[derive(Debug, Clone, PartialEq)]
pub enum MockRow {
    /// A row whose columns read back as these values.
    Values(Vec<DriverValue>),
    /// A row that is fetched, but whose column reads fail.
    Unreadable(String),
    /// Fetching this row fails.
    Unfetchable(String),
}

/// One scripted result of an execution.
#[derive(Debug, Clone, PartialEq)]
pub enum MockResult {
    RowSet {
        columns: Vec<MockColumn>,
        rows: Vec<MockRow>,
    },
    Update(u64),
    /// A row-set whose column metadata cannot be read.
    BrokenMetadata(String),
    /// Moving onto this result fails.
    Fail(String),
}

impl MockResult {
    /// A row-set of readable rows.
    pub fn rows(columns: Vec<MockColumn>, rows: Vec<Vec<DriverValue>>) -> Self {
        MockResult::RowSet {
            columns,
            rows: rows.into_iter().map(MockRow::Values).collect(),
        }
    }
}

/// A connector whose sessions replay a fixed script.
///
/// Every session opened from one connector (or its clones) shares the same
/// close counter and execution log.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    script: Vec<MockResult>,
    connect_error: Option<String>,
    execute_error: Option<String>,
    closed: Arc<AtomicUsize>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl MockConnector {
    /// Creates a connector whose executions produce `script`, in order.
    pub fn new(script: Vec<MockResult>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// Makes every `open` fail with `message`.
    pub fn with_connect_error(mut self, message: impl Into<String>) -> Self {
        self.connect_error = Some(message.into());
        self
    }

    /// Makes every `execute` and `query` fail with `message`.
    pub fn with_execute_error(mut self, message: impl Into<String>) -> Self {
        self.execute_error = Some(message.into());
        self
    }

    /// Number of sessions closed so far.
    pub fn closed_sessions(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// SQL texts executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, _target: &str) -> DriverResult<Box<dyn Session>> {
        if let Some(message) = &self.connect_error {
            return Err(mock_error(message));
        }

        Ok(Box::new(MockSession {
            connector: self.clone(),
            closed: false,
        }))
    }
}

/// A session opened from a [`MockConnector`].
struct MockSession {
    connector: MockConnector,
    closed: bool,
}

impl MockSession {
    fn begin(&self, sql: &str) -> DriverResult<()> {
        if self.closed {
            return Err(mock_error("connection already closed"));
        }
        if let Ok(mut log) = self.connector.executed.lock() {
            log.push(sql.to_string());
        }
        match &self.connector.execute_error {
            Some(message) => Err(mock_error(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Session for MockSession {
    async fn execute<'s>(&'s mut self, sql: &'s str) -> DriverResult<Box<dyn ResultChain + 's>> {
        self.begin(sql)?;

        let mut results: VecDeque<MockResult> = self.connector.script.iter().cloned().collect();
        let current = Position::next(&mut results)?;
        Ok(Box::new(MockChain { results, current }))
    }

    async fn query(&mut self, sql: &str) -> DriverResult<BufferedRows> {
        self.begin(sql)?;

        let (columns, rows, metadata_error) = match self.connector.script.first() {
            Some(MockResult::RowSet { columns, rows }) => (columns.clone(), rows.clone(), None),
            Some(MockResult::BrokenMetadata(message)) => {
                (Vec::new(), Vec::new(), Some(message.clone()))
            }
            Some(MockResult::Fail(message)) => return Err(mock_error(message)),
            Some(MockResult::Update(_)) | None => {
                return Err(mock_error("statement does not return a result set"))
            }
        };

        let rows = rows
            .into_iter()
            .map(|row| match row {
                MockRow::Unfetchable(message) => Err(mock_error(&message)),
                row => Ok(Box::new(MockRowSource(row)) as Box<dyn RowSource + Send>),
            })
            .collect::<DriverResult<Vec<_>>>()?;

        Ok(BufferedRows {
            metadata: Box::new(MockMetadata {
                columns,
                error: metadata_error,
            }),
            rows,
        })
    }

    async fn close(&mut self) -> DriverResult<()> {
        if !self.closed {
            self.closed = true;
            self.connector.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

enum Position {
    RowSet {
        columns: Vec<MockColumn>,
        rows: VecDeque<MockRow>,
        metadata_error: Option<String>,
    },
    Update(u64),
    Finished,
}

impl Position {
    fn next(results: &mut VecDeque<MockResult>) -> DriverResult<Self> {
        Ok(match results.pop_front() {
            Some(MockResult::RowSet { columns, rows }) => Position::RowSet {
                columns,
                rows: rows.into(),
                metadata_error: None,
            },
            Some(MockResult::BrokenMetadata(message)) => Position::RowSet {
                columns: Vec::new(),
                rows: VecDeque::new(),
                metadata_error: Some(message),
            },
            Some(MockResult::Update(count)) => Position::Update(count),
            Some(MockResult::Fail(message)) => return Err(mock_error(&message)),
            None => Position::Finished,
        })
    }
}

struct MockChain {
    results: VecDeque<MockResult>,
    current: Position,
}

#[async_trait]
impl ResultChain for MockChain {
    fn is_row_set(&self) -> bool {
        matches!(self.current, Position::RowSet { .. })
    }

    fn update_count(&self) -> Option<u64> {
        match self.current {
            Position::Update(count) => Some(count),
            _ => None,
        }
    }

    fn metadata(&self) -> DriverResult<Box<dyn ResultMetadata + Send>> {
        match &self.current {
            Position::RowSet {
                columns,
                metadata_error,
                ..
            } => Ok(Box::new(MockMetadata {
                columns: columns.clone(),
                error: metadata_error.clone(),
            })),
            _ => Err(mock_error("no result set is open")),
        }
    }

    async fn next_row(&mut self) -> DriverResult<Option<Box<dyn RowSource + Send>>> {
        let Position::RowSet { rows, .. } = &mut self.current else {
            return Ok(None);
        };

        match rows.pop_front() {
            Some(MockRow::Unfetchable(message)) => Err(mock_error(&message)),
            Some(row) => Ok(Some(Box::new(MockRowSource(row)))),
            None => Ok(None),
        }
    }

    async fn more_results(&mut self) -> DriverResult<bool> {
        self.current = Position::next(&mut self.results)?;
        Ok(self.is_row_set())
    }
}

struct MockMetadata {
    columns: Vec<MockColumn>,
    error: Option<String>,
}

impl MockMetadata {
    fn column(&self, index: usize) -> DriverResult<&MockColumn> {
        if let Some(message) = &self.error {
            return Err(mock_error(message));
        }
        self.columns
            .get(index)
            .ok_or(sqlx::Error::ColumnIndexOutOfBounds {
                index,
                len: self.columns.len(),
            })
    }
}

impl ResultMetadata for MockMetadata {
    fn column_count(&self) -> DriverResult<usize> {
        match &self.error {
            Some(message) => Err(mock_error(message)),
            None => Ok(self.columns.len()),
        }
    }

    fn type_name(&self, index: usize) -> DriverResult<String> {
        Ok(self.column(index)?.type_name.clone())
    }

    fn label(&self, index: usize) -> DriverResult<String> {
        Ok(self.column(index)?.label.clone())
    }

    fn display_size(&self, index: usize) -> DriverResult<u32> {
        Ok(self.column(index)?.display_size)
    }
}

struct MockRowSource(MockRow);

impl RowSource for MockRowSource {
    fn get(&self, index: usize) -> DriverResult<DriverValue> {
        match &self.0 {
            MockRow::Values(values) => {
                values
                    .get(index)
                    .cloned()
                    .ok_or(sqlx::Error::ColumnIndexOutOfBounds {
                        index,
                        len: values.len(),
                    })
            }
            MockRow::Unreadable(message) | MockRow::Unfetchable(message) => {
                Err(mock_error(message))
            }
        }
    }
}
