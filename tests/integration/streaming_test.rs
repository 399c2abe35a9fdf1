//! Streaming execution integration tests.
//!
//! Runs multi-statement SQL against in-memory SQLite databases and checks the
//! exact sequence of sink calls.

use db_sqlrun::db::{ColumnSet, RowSnapshot, Value};
use db_sqlrun::error::SqlRunError;
use db_sqlrun::query::{execute_streaming, ResultSink};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

const TARGET: &str = "sqlite::memory:";

/// One recorded sink call, tagged with the ordinal of its sink.
#[derive(Debug, Clone, PartialEq)]
enum Call {
    Columns(usize, Vec<String>),
    Row(usize, Vec<String>),
    UpdateCount(usize, u64),
    Error(usize),
}

struct RecordingSink {
    ordinal: usize,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl ResultSink for RecordingSink {
    fn accept_columns(&mut self, columns: ColumnSet) {
        let names = columns.names().into_iter().map(String::from).collect();
        self.calls
            .lock()
            .unwrap()
            .push(Call::Columns(self.ordinal, names));
    }

    fn accept_row(&mut self, row: RowSnapshot) {
        let cells = row.values().iter().map(Value::to_display_string).collect();
        self.calls.lock().unwrap().push(Call::Row(self.ordinal, cells));
    }

    fn accept_update_count(&mut self, count: u64) {
        self.calls
            .lock()
            .unwrap()
            .push(Call::UpdateCount(self.ordinal, count));
    }

    fn accept_error(&mut self, _error: SqlRunError) {
        self.calls.lock().unwrap().push(Call::Error(self.ordinal));
    }
}

/// Runs `sql` and returns the recorded calls plus the summary's error.
async fn run(sql: &str) -> (Vec<Call>, Option<SqlRunError>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let factory_calls = Arc::clone(&calls);

    let summary = execute_streaming(TARGET, sql, move |ordinal| RecordingSink {
        ordinal,
        calls: Arc::clone(&factory_calls),
    })
    .await;

    let calls = calls.lock().unwrap().clone();
    (calls, summary.error)
}

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Scenario: Single query
/// Given the text `SELECT 1 AS one`
/// When it is executed
/// Then one sink receives the columns and a single row
#[tokio::test]
async fn test_single_select() {
    let (calls, error) = run("SELECT 1 AS one").await;

    assert_eq!(error, None);
    assert_eq!(
        calls,
        vec![
            Call::Columns(0, names(&["one"])),
            Call::Row(0, names(&["1"])),
        ]
    );
}

/// Scenario: Unnamed expression column
/// Given the text `SELECT 1`
/// When it is executed
/// Then the column is labelled `1`
/// And no second sink is requested
#[tokio::test]
async fn test_select_literal_column_label() {
    let (calls, error) = run("SELECT 1").await;

    assert_eq!(error, None);
    assert_eq!(
        calls,
        vec![Call::Columns(0, names(&["1"])), Call::Row(0, names(&["1"]))]
    );
}

/// Scenario: Updates followed by a query
/// Given a text that creates, fills and updates a table, then selects from it
/// When it is executed
/// Then every statement gets its own ordinal, in order
#[tokio::test]
async fn test_updates_then_row_set() {
    let (calls, error) = run(
        "CREATE TABLE t (x INTEGER); \
         INSERT INTO t VALUES (1), (2); \
         UPDATE t SET x = x + 10; \
         SELECT x FROM t ORDER BY x",
    )
    .await;

    assert_eq!(error, None);
    assert_eq!(
        calls,
        vec![
            Call::UpdateCount(0, 0),
            Call::UpdateCount(1, 2),
            Call::UpdateCount(2, 2),
            Call::Columns(3, names(&["x"])),
            Call::Row(3, names(&["11"])),
            Call::Row(3, names(&["12"])),
        ]
    );
}

/// Scenario: Update followed by a query
/// Given a table with one row
/// When `UPDATE t SET x=1; SELECT * FROM t` is executed
/// Then ordinal 0 gets the update count
/// And ordinal 1 gets the columns and the updated row
#[tokio::test]
async fn test_update_then_select() {
    let (calls, error) = run(
        "CREATE TABLE t (x INTEGER); \
         INSERT INTO t VALUES (5); \
         UPDATE t SET x=1; \
         SELECT * FROM t",
    )
    .await;

    assert_eq!(error, None);
    assert_eq!(
        calls,
        vec![
            Call::UpdateCount(0, 0),
            Call::UpdateCount(1, 1),
            Call::UpdateCount(2, 1),
            Call::Columns(3, names(&["x"])),
            Call::Row(3, names(&["1"])),
        ]
    );
}

/// Scenario: Query that matches nothing after an insert
/// Given a text that fills a table and then selects no rows from it
/// When it is executed
/// Then the select still gets its columns and no rows
/// And no update count is reported for it
#[tokio::test]
async fn test_empty_select_after_insert() {
    let (calls, error) = run(
        "CREATE TABLE t (x INTEGER); \
         INSERT INTO t VALUES (1), (2), (3); \
         SELECT x FROM t WHERE x > 100",
    )
    .await;

    assert_eq!(error, None);
    assert_eq!(
        calls,
        vec![
            Call::UpdateCount(0, 0),
            Call::UpdateCount(1, 3),
            Call::Columns(2, names(&["x"])),
        ]
    );
}

/// Scenario: Always-false filter
/// Given an insert followed by `SELECT ... WHERE 0`
/// When it is executed
/// Then the select is a row-set without rows
#[tokio::test]
async fn test_where_false_select_is_row_set() {
    let (calls, error) = run(
        "CREATE TABLE t (x INTEGER, y TEXT); \
         INSERT INTO t VALUES (1, 'a'); \
         SELECT x, y FROM t WHERE 0",
    )
    .await;

    assert_eq!(error, None);
    assert_eq!(
        calls,
        vec![
            Call::UpdateCount(0, 0),
            Call::UpdateCount(1, 1),
            Call::Columns(2, names(&["x", "y"])),
        ]
    );
}

/// Scenario: DDL after DML
/// Given an insert of three rows followed by a CREATE TABLE
/// When it is executed
/// Then the CREATE TABLE reports 0, not the insert's count
#[tokio::test]
async fn test_ddl_after_insert_counts_zero() {
    let (calls, error) = run(
        "CREATE TABLE t (x INTEGER); \
         INSERT INTO t VALUES (1), (2), (3); \
         CREATE TABLE u (y INTEGER)",
    )
    .await;

    assert_eq!(error, None);
    assert_eq!(
        calls,
        vec![
            Call::UpdateCount(0, 0),
            Call::UpdateCount(1, 3),
            Call::UpdateCount(2, 0),
        ]
    );
}

/// Scenario: Several row-sets
/// Given two queries in one text
/// When it is executed
/// Then each row-set is delivered to its own sink
#[tokio::test]
async fn test_two_row_sets() {
    let (calls, error) = run("SELECT 'a' AS first; SELECT 2.5 AS second, NULL AS third").await;

    assert_eq!(error, None);
    assert_eq!(
        calls,
        vec![
            Call::Columns(0, names(&["first"])),
            Call::Row(0, names(&["a"])),
            Call::Columns(1, names(&["second", "third"])),
            Call::Row(1, names(&["2.5", "NULL"])),
        ]
    );
}

/// Scenario: Execution fails immediately
/// Given a query against a table that does not exist
/// When it is executed
/// Then a single sink receives a single error
#[tokio::test]
async fn test_missing_table_is_single_error() {
    let (calls, error) = run("SELECT * FROM does_not_exist").await;

    assert!(matches!(error, Some(SqlRunError::Execution(_))));
    assert_eq!(calls, vec![Call::Error(0)]);
}

/// Scenario: A later statement fails
/// Given a valid insert followed by an invalid statement
/// When it is executed
/// Then the insert's update count is delivered first
/// And the error lands on the next ordinal
/// And nothing follows it
#[tokio::test]
async fn test_failure_mid_chain() {
    let (calls, error) = run(
        "CREATE TABLE t (x INTEGER); \
         SELECT * FROM missing; \
         INSERT INTO t VALUES (1)",
    )
    .await;

    assert!(error.is_some());
    assert_eq!(calls.first(), Some(&Call::UpdateCount(0, 0)));
    assert_eq!(calls.last(), Some(&Call::Error(1)));
    assert_eq!(calls.len(), 2);
}

/// Scenario: Connection fails
/// Given a target no driver supports
/// When it is executed
/// Then the first sink receives a connection error
#[tokio::test]
async fn test_unsupported_target_is_connection_error() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let factory_calls = Arc::clone(&calls);

    let summary = execute_streaming("mysql://localhost/db", "SELECT 1", move |ordinal| {
        RecordingSink {
            ordinal,
            calls: Arc::clone(&factory_calls),
        }
    })
    .await;

    assert!(matches!(summary.error, Some(SqlRunError::Connection(_))));
    assert_eq!(summary.results, 1);
    assert_eq!(*calls.lock().unwrap(), vec![Call::Error(0)]);
}
