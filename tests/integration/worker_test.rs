//! Query worker integration tests.

use db_sqlrun::db::SqlxConnector;
use db_sqlrun::query::{collect_outcomes, ExecutionOutcome, QueryWorker, WorkerEvent};
use std::sync::Arc;

/// Scenario: Submissions share nothing
/// Given two submissions against separate in-memory databases
/// When both run on the worker
/// Then each finishes, in submission order, with its own results
#[tokio::test]
async fn test_worker_runs_submissions_in_order() {
    let (mut worker, mut events) = QueryWorker::spawn(Arc::new(SqlxConnector));

    let first = worker
        .submit("sqlite::memory:", "CREATE TABLE t (x INTEGER); SELECT COUNT(*) AS n FROM t")
        .await
        .unwrap();
    let second = worker
        .submit("sqlite::memory:", "SELECT * FROM t")
        .await
        .unwrap();

    worker.shutdown().await.unwrap();

    let mut results = Vec::new();
    let mut finished = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            WorkerEvent::Result(event) => results.push(event),
            WorkerEvent::Finished {
                submission,
                summary,
            } => finished.push((submission, summary.is_success())),
        }
    }

    assert_eq!(finished, vec![(first, true), (second, false)]);

    let first_outcomes =
        collect_outcomes(results.iter().filter(|e| e.submission == first).cloned());
    assert_eq!(first_outcomes.len(), 2);
    assert!(matches!(first_outcomes[1], ExecutionOutcome::RowSet(_)));

    let second_outcomes =
        collect_outcomes(results.iter().filter(|e| e.submission == second).cloned());
    assert_eq!(second_outcomes.len(), 1);
    assert!(second_outcomes[0].is_error());
}
