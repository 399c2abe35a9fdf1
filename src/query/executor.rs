//! Multi-result execution driver.
//!
//! Executes one SQL text, which may hold several statements, and walks the
//! chain of results it produces. Each result is pushed into its own sink as
//! soon as it is available; nothing is buffered.

use crate::db::{
    format_driver_error, redact_target, ColumnSet, Connector, ResultChain, RowSnapshot, Session,
    SqlxConnector,
};
use crate::error::{Result, SqlRunError};
use tracing::{debug, info, warn};

/// Consumer of one result of an execution.
///
/// A sink sees exactly one of: column metadata followed by zero or more
/// rows, a single update count, or a single error. A row-set that fails
/// part-way ends with the error instead.
pub trait ResultSink {
    /// Column metadata of a row-set, before any row.
    fn accept_columns(&mut self, columns: ColumnSet);

    /// One row of a row-set, in order.
    fn accept_row(&mut self, row: RowSnapshot);

    /// The update count of a non-row-returning statement.
    fn accept_update_count(&mut self, count: u64);

    /// Terminal error; always the last call the sink receives.
    fn accept_error(&mut self, error: SqlRunError);
}

impl<S: ResultSink + ?Sized> ResultSink for Box<S> {
    fn accept_columns(&mut self, columns: ColumnSet) {
        (**self).accept_columns(columns);
    }

    fn accept_row(&mut self, row: RowSnapshot) {
        (**self).accept_row(row);
    }

    fn accept_update_count(&mut self, count: u64) {
        (**self).accept_update_count(count);
    }

    fn accept_error(&mut self, error: SqlRunError) {
        (**self).accept_error(error);
    }
}

/// How an execution ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// Number of sinks requested, i.e. results produced (an error counts).
    pub results: usize,
    /// The error that ended the execution, if any.
    pub error: Option<SqlRunError>,
}

impl ExecutionSummary {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Executes `sql` against `target`, streaming every result into a sink
/// obtained from `factory` for its 0-based ordinal.
///
/// Errors never escape: they are delivered to the sink of the ordinal where
/// they happened and reported in the returned summary.
pub async fn execute_streaming<S, F>(target: &str, sql: &str, factory: F) -> ExecutionSummary
where
    S: ResultSink + Send,
    F: FnMut(usize) -> S + Send,
{
    execute_streaming_with(&SqlxConnector, target, sql, factory).await
}

/// Like [`execute_streaming`], opening the connection through `connector`.
pub async fn execute_streaming_with<S, F>(
    connector: &dyn Connector,
    target: &str,
    sql: &str,
    mut factory: F,
) -> ExecutionSummary
where
    S: ResultSink + Send,
    F: FnMut(usize) -> S + Send,
{
    info!("Executing SQL against {}", redact_target(target));

    let mut dispatch = Dispatch::new(&mut factory);

    let mut session = match connector.open(target).await {
        Ok(session) => session,
        Err(e) => {
            let error = SqlRunError::connection(format_driver_error(&e));
            return dispatch.fail(error);
        }
    };

    let summary = match dispatch.run(session.as_mut(), sql).await {
        Ok(()) => dispatch.finish(),
        Err(error) => dispatch.fail(error),
    };

    if let Err(e) = session.close().await {
        warn!("Failed to close connection: {}", format_driver_error(&e));
    }

    summary
}

/// Hands results to sinks, requesting each ordinal's sink at most once.
struct Dispatch<'f, S, F> {
    factory: &'f mut F,
    ordinal: usize,
    current: Option<S>,
    requested: usize,
}

impl<'f, S, F> Dispatch<'f, S, F>
where
    S: ResultSink + Send,
    F: FnMut(usize) -> S + Send,
{
    fn new(factory: &'f mut F) -> Self {
        Self {
            factory,
            ordinal: 0,
            current: None,
            requested: 0,
        }
    }

    /// The sink of the current ordinal, requesting it on first use.
    fn sink(&mut self) -> &mut S {
        let Self {
            factory,
            ordinal,
            current,
            requested,
        } = self;

        current.get_or_insert_with(|| {
            debug!("Requesting sink for result {}", ordinal);
            *requested += 1;
            factory(*ordinal)
        })
    }

    /// Moves on to the next ordinal, releasing the current sink.
    fn advance(&mut self) {
        self.current = None;
        self.ordinal += 1;
    }

    async fn run(&mut self, session: &mut dyn Session, sql: &str) -> Result<()> {
        let mut chain = session
            .execute(sql)
            .await
            .map_err(|e| SqlRunError::execution(format_driver_error(&e)))?;

        let mut has_row_set = chain.is_row_set();
        loop {
            if has_row_set {
                self.stream_row_set(chain.as_mut()).await?;
            } else if let Some(count) = chain.update_count() {
                debug!("Result {} updated {} rows", self.ordinal, count);
                self.sink().accept_update_count(count);
            } else {
                return Ok(());
            }

            self.advance();
            has_row_set = chain
                .more_results()
                .await
                .map_err(|e| SqlRunError::more_results(format_driver_error(&e)))?;
        }
    }

    async fn stream_row_set(&mut self, chain: &mut (dyn ResultChain + '_)) -> Result<()> {
        self.sink();

        let columns = {
            let metadata = chain
                .metadata()
                .map_err(|e| SqlRunError::metadata_read(format_driver_error(&e)))?;
            ColumnSet::read(metadata.as_ref())?
        };
        let width = columns.len();
        self.sink().accept_columns(columns);

        let mut rows = 0usize;
        while let Some(row) = chain
            .next_row()
            .await
            .map_err(|e| SqlRunError::row_read(format_driver_error(&e)))?
        {
            let snapshot = RowSnapshot::read(row.as_ref(), width)?;
            self.sink().accept_row(snapshot);
            rows += 1;
        }

        debug!("Result {} streamed {} rows", self.ordinal, rows);
        Ok(())
    }

    fn finish(self) -> ExecutionSummary {
        ExecutionSummary {
            results: self.requested,
            error: None,
        }
    }

    /// Delivers `error` to the current ordinal's sink and ends the execution.
    fn fail(mut self, error: SqlRunError) -> ExecutionSummary {
        warn!("Result {} failed: {}", self.ordinal, error);
        self.sink().accept_error(error.clone());
        ExecutionSummary {
            results: self.requested,
            error: Some(error),
        }
    }
}
