//! sqlx implementation of the result-chain seam, used by PostgreSQL.
//!
//! sqlx reports a multi-statement execution as one stream of rows and
//! per-statement completions. [`SqlxResultChain`] folds that stream back into
//! a cursor positioned on one result at a time: a run of rows followed by
//! its completion is a row-set. A completion with no rows before it is an
//! update count, unless the statement was described up front with columns.

use super::{BufferedRows, DriverResult, DriverValue, ResultChain, ResultMetadata, RowSource};
use async_trait::async_trait;
use futures::stream::{BoxStream, Fuse};
use futures::{StreamExt, TryStreamExt};
use sqlx::{Column, Database, Either, TypeInfo};
use tracing::debug;

/// Display size reported for types without a natural bound.
pub(crate) const UNBOUNDED_DISPLAY_SIZE: u32 = i32::MAX as u32;

/// Per-backend cell decoding for a sqlx row type.
pub(crate) trait DecodeCell: sqlx::Row {
    /// Reads the column at `index` into its driver value.
    fn decode_cell(&self, index: usize) -> DriverResult<DriverValue>;

    /// Display width for a column of the given type.
    fn display_size(type_name: &str) -> u32;
}

/// Access to the affected-row count of a per-statement completion.
pub(crate) trait AffectedRows {
    fn affected_rows(&self) -> u64;
}

/// Builds the buffered result of a prepared single-statement query.
///
/// `columns` come from the prepared statement, so a query that returns no
/// rows still reports its columns.
pub(crate) fn buffered_rows<DB>(
    columns: Vec<DB::Column>,
    rows: Vec<DB::Row>,
) -> DriverResult<BufferedRows>
where
    DB: Database,
    DB::Row: DecodeCell,
{
    debug!("Buffered {} rows over {} columns", rows.len(), columns.len());
    Ok(BufferedRows {
        metadata: Box::new(ColumnsMetadata::<DB>::new(columns)),
        rows: rows
            .into_iter()
            .map(|row| Box::new(SqlxRow(row)) as Box<dyn RowSource + Send>)
            .collect(),
    })
}

/// Error returned when a buffered query is not row-returning.
pub(crate) fn not_a_query() -> sqlx::Error {
    sqlx::Error::Protocol("statement does not return a result set".into())
}

/// Error returned when a buffered query holds more than one statement.
pub(crate) fn multiple_statements() -> sqlx::Error {
    sqlx::Error::Protocol("query must be a single statement".into())
}

/// Error returned by a session whose connection was already closed.
pub(crate) fn closed_connection() -> sqlx::Error {
    sqlx::Error::Protocol("connection already closed".into())
}

pub(crate) type ResultStream<'c, DB> = BoxStream<
    'c,
    Result<Either<<DB as Database>::QueryResult, <DB as Database>::Row>, sqlx::Error>,
>;

/// Where the chain currently stands.
enum Position<DB: Database> {
    /// A row-set; `pending` holds the row that announced it until fetched.
    RowSet {
        pending: Option<DB::Row>,
        columns: Vec<DB::Column>,
        drained: bool,
    },
    Update(u64),
    Finished,
}

/// Cursor over the results of one `raw_sql` execution.
pub(crate) struct SqlxResultChain<'c, DB: Database> {
    stream: Fuse<ResultStream<'c, DB>>,
    position: Position<DB>,
    /// Columns of the first statement, when known before it ran.
    described: Option<Vec<DB::Column>>,
}

impl<'c, DB> SqlxResultChain<'c, DB>
where
    DB: Database,
    DB::Column: Clone,
    DB::QueryResult: AffectedRows,
{
    pub(crate) fn new(stream: ResultStream<'c, DB>) -> Self {
        Self {
            stream: stream.fuse(),
            position: Position::Finished,
            described: None,
        }
    }

    /// Sets the columns of the first statement, so that it is reported as a
    /// row-set even when it returns no rows.
    pub(crate) fn with_described(mut self, columns: Vec<DB::Column>) -> Self {
        self.described = Some(columns).filter(|columns| !columns.is_empty());
        self
    }

    /// Moves onto the next result in the stream.
    pub(crate) async fn advance(&mut self) -> DriverResult<bool> {
        let described = self.described.take();

        self.position = match self.stream.try_next().await? {
            Some(Either::Right(row)) => {
                let columns = sqlx::Row::columns(&row).to_vec();
                Position::RowSet {
                    pending: Some(row),
                    columns,
                    drained: false,
                }
            }
            Some(Either::Left(done)) => match described {
                Some(columns) => Position::RowSet {
                    pending: None,
                    columns,
                    drained: true,
                },
                None => Position::Update(done.affected_rows()),
            },
            None => Position::Finished,
        };
        Ok(matches!(self.position, Position::RowSet { .. }))
    }
}

#[async_trait]
impl<'c, DB> ResultChain for SqlxResultChain<'c, DB>
where
    DB: Database,
    DB::Row: DecodeCell,
    DB::Column: Clone,
    DB::QueryResult: AffectedRows,
{
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
            Position::RowSet { columns, .. } => {
                Ok(Box::new(ColumnsMetadata::<DB>::new(columns.clone())))
            }
            _ => Err(sqlx::Error::Protocol("no result set is open".into())),
        }
    }

    async fn next_row(&mut self) -> DriverResult<Option<Box<dyn RowSource + Send>>> {
        let Position::RowSet {
            pending, drained, ..
        } = &mut self.position
        else {
            return Ok(None);
        };

        if let Some(row) = pending.take() {
            return Ok(Some(Box::new(SqlxRow(row))));
        }
        if *drained {
            return Ok(None);
        }

        match self.stream.try_next().await? {
            Some(Either::Right(row)) => Ok(Some(Box::new(SqlxRow(row)))),
            // The completion that follows the rows belongs to this row-set.
            Some(Either::Left(_)) | None => {
                *drained = true;
                Ok(None)
            }
        }
    }

    async fn more_results(&mut self) -> DriverResult<bool> {
        while self.is_row_set() && self.next_row().await?.is_some() {}
        self.advance().await
    }
}

/// Column metadata taken from sqlx column descriptions.
struct ColumnsMetadata<DB: Database> {
    columns: Vec<DB::Column>,
}

impl<DB: Database> ColumnsMetadata<DB> {
    fn new(columns: Vec<DB::Column>) -> Self {
        Self { columns }
    }

    fn column(&self, index: usize) -> DriverResult<&DB::Column> {
        self.columns
            .get(index)
            .ok_or(sqlx::Error::ColumnIndexOutOfBounds {
                index,
                len: self.columns.len(),
            })
    }
}

impl<DB> ResultMetadata for ColumnsMetadata<DB>
where
    DB: Database,
    DB::Row: DecodeCell,
{
    fn column_count(&self) -> DriverResult<usize> {
        Ok(self.columns.len())
    }

    fn type_name(&self, index: usize) -> DriverResult<String> {
        Ok(self.column(index)?.type_info().name().to_string())
    }

    fn label(&self, index: usize) -> DriverResult<String> {
        Ok(self.column(index)?.name().to_string())
    }

    fn display_size(&self, index: usize) -> DriverResult<u32> {
        let type_name = self.column(index)?.type_info().name();
        Ok(<DB::Row as DecodeCell>::display_size(type_name))
    }
}

/// A fetched sqlx row.
struct SqlxRow<R>(R);

impl<R: DecodeCell> RowSource for SqlxRow<R> {
    fn get(&self, index: usize) -> DriverResult<DriverValue> {
        self.0.decode_cell(index)
    }
}
