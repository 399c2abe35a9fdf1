//! Buffered execution integration tests.

use db_sqlrun::db::Value;
use db_sqlrun::error::SqlRunError;
use db_sqlrun::query::{execute_all, fetch_result, ExecutionOutcome};
use pretty_assertions::assert_eq;

const TARGET: &str = "sqlite::memory:";

/// Scenario: Buffered query
/// Given a query returning two rows
/// When fetch_result is called
/// Then the snapshot holds the columns and both rows
#[tokio::test]
async fn test_fetch_result() {
    let result = fetch_result(TARGET, "SELECT 1 AS id, 'a' AS name UNION ALL SELECT 2, 'b'")
        .await
        .unwrap();

    assert_eq!(result.columns().names(), vec!["id", "name"]);
    assert_eq!(result.row_count(), 2);
    assert_eq!(
        result.rows()[1].values(),
        &[Value::Long(2), Value::String("b".to_string())]
    );
}

/// Scenario: Buffered query without rows
/// Given a query that matches nothing
/// When fetch_result is called
/// Then the snapshot is empty but still carries its columns
#[tokio::test]
async fn test_fetch_result_without_rows() {
    let result = fetch_result(TARGET, "SELECT 1 AS one WHERE 1 = 0")
        .await
        .unwrap();

    assert!(result.is_empty());
    assert_eq!(result.columns().names(), vec!["one"]);
}

/// Scenario: Buffered non-query
/// Given a statement that returns no result set
/// When fetch_result is called
/// Then it fails with an execution error
#[tokio::test]
async fn test_fetch_result_rejects_update() {
    let error = fetch_result(TARGET, "CREATE TABLE t (x INTEGER)")
        .await
        .unwrap_err();

    assert!(matches!(error, SqlRunError::Execution(_)));
}

/// Scenario: Buffered text with several statements
/// Given a file database holding two rows
/// When fetch_result is called with a query, a delete and another query
/// Then it fails
/// And the delete never ran
#[tokio::test]
async fn test_fetch_result_refuses_several_statements() {
    let dir = tempfile::tempdir().unwrap();
    let target = format!("sqlite://{}?mode=rwc", dir.path().join("data.db").display());

    let setup = execute_all(&target, "CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1), (2)").await;
    assert!(setup.iter().all(|outcome| !outcome.is_error()));

    let error = fetch_result(&target, "SELECT count(*) AS n FROM t; DELETE FROM t; SELECT 'a', 'b'")
        .await
        .unwrap_err();
    assert!(matches!(error, SqlRunError::Execution(_)));

    let remaining = fetch_result(&target, "SELECT count(*) AS n FROM t").await.unwrap();
    assert_eq!(remaining.rows()[0].values(), &[Value::Long(2)]);
}

/// Scenario: Buffered connection failure
/// Given an unsupported target
/// When fetch_result is called
/// Then it fails with a connection error
#[tokio::test]
async fn test_fetch_result_connection_error() {
    let error = fetch_result("mysql://localhost/db", "SELECT 1")
        .await
        .unwrap_err();

    assert!(matches!(error, SqlRunError::Connection(_)));
}

/// Scenario: All outcomes at once
/// Given a text with updates, a query and a failing statement
/// When execute_all is called
/// Then the outcomes come back in order, ending with the error
#[tokio::test]
async fn test_execute_all() {
    let outcomes = execute_all(
        TARGET,
        "CREATE TABLE t (x INTEGER); \
         INSERT INTO t VALUES (7); \
         SELECT x FROM t; \
         SELECT * FROM missing",
    )
    .await;

    assert_eq!(outcomes.len(), 4);
    assert_eq!(outcomes[0], ExecutionOutcome::UpdateCount(0));
    assert_eq!(outcomes[1], ExecutionOutcome::UpdateCount(1));

    let ExecutionOutcome::RowSet(result) = &outcomes[2] else {
        panic!("expected a row-set, got {:?}", outcomes[2]);
    };
    assert_eq!(result.columns().names(), vec!["x"]);
    assert_eq!(result.rows()[0].values(), &[Value::Long(7)]);

    assert!(outcomes[3].is_error());
}
