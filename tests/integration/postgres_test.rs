//! PostgreSQL integration tests.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL environment variable to run them.

use db_sqlrun::db::Value;
use db_sqlrun::query::{execute_all, fetch_result, ExecutionOutcome};

/// Helper to get test database URL from environment.
fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL")
        .ok()
        .filter(|url| url.starts_with("postgres"))
}

#[tokio::test]
async fn test_multi_statement_outcomes() {
    let Some(url) = get_test_database_url() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let outcomes = execute_all(
        &url,
        "CREATE TEMP TABLE sqlrun_it (id INT4, label TEXT); \
         INSERT INTO sqlrun_it VALUES (1, 'one'), (2, NULL); \
         SELECT id, label FROM sqlrun_it ORDER BY id",
    )
    .await;

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[1], ExecutionOutcome::UpdateCount(2));

    let ExecutionOutcome::RowSet(result) = &outcomes[2] else {
        panic!("expected a row-set, got {:?}", outcomes[2]);
    };
    assert_eq!(result.columns().names(), vec!["id", "label"]);
    assert_eq!(result.columns().get(0).unwrap().display_size(), 11);
    assert_eq!(result.rows()[1].values(), &[Value::Int(2), Value::Null]);
}

#[tokio::test]
async fn test_error_message_has_detail() {
    let Some(url) = get_test_database_url() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let outcomes = execute_all(&url, "SELECT * FROM sqlrun_table_that_does_not_exist").await;

    assert_eq!(outcomes.len(), 1);
    let ExecutionOutcome::Error(error) = &outcomes[0] else {
        panic!("expected an error, got {:?}", outcomes[0]);
    };
    assert!(error.message().contains("does not exist"));
}

#[tokio::test]
async fn test_fetch_result_decodes_types() {
    let Some(url) = get_test_database_url() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = fetch_result(
        &url,
        "SELECT 42::int8 AS big, 1.50::numeric AS amount, true AS flag, DATE '2024-01-15' AS day",
    )
    .await
    .unwrap();

    let cells: Vec<String> = result.rows()[0]
        .values()
        .iter()
        .map(Value::to_display_string)
        .collect();
    assert_eq!(cells, vec!["42", "1.50", "true", "2024-01-15"]);
}
