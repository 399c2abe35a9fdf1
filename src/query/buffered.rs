//! Buffered execution.
//!
//! Two eager alternatives to the streaming driver: [`fetch_result`] reads one
//! row-returning statement into a [`ResultSnapshot`], and [`execute_all`]
//! runs a multi-statement text and returns all of its outcomes at once.

use super::executor::execute_streaming_with;
use super::outcome::{collect_outcomes, ExecutionOutcome};
use super::sink::{ChannelSink, ResultEvent};
use crate::db::{
    format_driver_error, redact_target, ColumnSet, Connector, ResultSnapshot, RowSnapshot, Session,
    SqlxConnector,
};
use crate::error::{Result, SqlRunError};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Runs one row-returning statement and reads its whole result.
///
/// The statement is prepared first, so a result without rows still carries
/// its columns. Text that does not return a result set is rejected before it
/// runs. Multi-statement text is not supported here.
pub async fn fetch_result(target: &str, sql: &str) -> Result<ResultSnapshot> {
    fetch_result_with(&SqlxConnector, target, sql).await
}

/// Like [`fetch_result`], opening the connection through `connector`.
pub async fn fetch_result_with(
    connector: &dyn Connector,
    target: &str,
    sql: &str,
) -> Result<ResultSnapshot> {
    info!("Fetching result from {}", redact_target(target));

    let mut session = connector
        .open(target)
        .await
        .map_err(|e| SqlRunError::connection(format_driver_error(&e)))?;

    let result = read_result(session.as_mut(), sql).await;

    if let Err(e) = session.close().await {
        warn!("Failed to close connection: {}", format_driver_error(&e));
    }

    result
}

async fn read_result(session: &mut dyn Session, sql: &str) -> Result<ResultSnapshot> {
    let buffered = session
        .query(sql)
        .await
        .map_err(|e| SqlRunError::execution(format_driver_error(&e)))?;

    let columns = ColumnSet::read(buffered.metadata.as_ref())?;
    let rows = buffered
        .rows
        .iter()
        .map(|row| RowSnapshot::read(row.as_ref(), columns.len()))
        .collect::<Result<Vec<_>>>()?;

    Ok(ResultSnapshot::new(columns, rows))
}

/// Runs a (possibly multi-statement) text and returns every outcome in
/// order, a terminal error included.
pub async fn execute_all(target: &str, sql: &str) -> Vec<ExecutionOutcome> {
    execute_all_with(&SqlxConnector, target, sql).await
}

/// Like [`execute_all`], opening the connection through `connector`.
pub async fn execute_all_with(
    connector: &dyn Connector,
    target: &str,
    sql: &str,
) -> Vec<ExecutionOutcome> {
    let (sender, mut receiver) = mpsc::unbounded_channel::<ResultEvent>();

    execute_streaming_with(connector, target, sql, ChannelSink::factory(0, sender)).await;

    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    collect_outcomes(events)
}
