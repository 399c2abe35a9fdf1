//! Database abstraction layer for sqlrun.
//!
//! Provides a trait-based seam modelled on the connection / statement /
//! result-set split of a database-access layer. The execution driver only
//! talks to these traits; sqlx backs them for real databases and
//! [`MockConnector`] backs them in tests.

mod chain;
mod mock;
mod normalize;
mod postgres;
mod snapshot;
mod sqlite;
mod types;

pub use mock::{MockColumn, MockConnector, MockResult, MockRow};
pub use normalize::normalize;
pub use postgres::PostgresSession;
pub use sqlite::SqliteSession;
pub use types::{ColumnDescriptor, ColumnSet, DriverValue, ResultSnapshot, RowSnapshot, Value};

use async_trait::async_trait;
use tracing::debug;

/// Result type for calls that cross into the database driver.
pub type DriverResult<T> = std::result::Result<T, sqlx::Error>;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Postgres,
    Sqlite,
}

impl DatabaseBackend {
    /// Picks the backend from the scheme of a connection target.
    ///
    /// Only the scheme is inspected; the rest of the target is handed to the
    /// driver verbatim.
    pub fn from_target(target: &str) -> Option<Self> {
        let scheme = target.split_once(':')?.0.to_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Returns the backend as a string for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Opens sessions against a connection target.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establishes one connection scoped to the returned session.
    async fn open(&self, target: &str) -> DriverResult<Box<dyn Session>>;
}

/// One open connection.
#[async_trait]
pub trait Session: Send {
    /// Executes a (possibly multi-statement) SQL text and positions the
    /// returned chain on its first result.
    async fn execute<'s>(&'s mut self, sql: &'s str) -> DriverResult<Box<dyn ResultChain + 's>>;

    /// Prepares and runs a single row-returning statement, reading every row.
    async fn query(&mut self, sql: &str) -> DriverResult<BufferedRows>;

    /// Closes the connection. Further calls on the session fail.
    async fn close(&mut self) -> DriverResult<()>;
}

/// The sequence of results produced by one execution.
///
/// Mirrors a statement cursor: it is always positioned on one result, which
/// is a row-set, an update count, or the end of the chain.
#[async_trait]
pub trait ResultChain: Send {
    /// True if the current result is a row-set.
    fn is_row_set(&self) -> bool;

    /// The update count of the current result, `None` for row-sets and at the end.
    fn update_count(&self) -> Option<u64>;

    /// Column metadata of the current row-set.
    fn metadata(&self) -> DriverResult<Box<dyn ResultMetadata + Send>>;

    /// Fetches the next row of the current row-set, `None` once it is exhausted.
    async fn next_row(&mut self) -> DriverResult<Option<Box<dyn RowSource + Send>>>;

    /// Closes the current row-set and moves to the next result.
    ///
    /// Returns true if the new current result is a row-set.
    async fn more_results(&mut self) -> DriverResult<bool>;
}

/// Column metadata as exposed by the driver. Indexes are 0-based.
pub trait ResultMetadata {
    fn column_count(&self) -> DriverResult<usize>;
    fn type_name(&self, index: usize) -> DriverResult<String>;
    fn label(&self, index: usize) -> DriverResult<String>;
    fn display_size(&self, index: usize) -> DriverResult<u32>;
}

/// A positioned row whose columns can be read by index (0-based).
pub trait RowSource {
    fn get(&self, index: usize) -> DriverResult<DriverValue>;
}

/// Everything a single buffered query returned.
pub struct BufferedRows {
    pub metadata: Box<dyn ResultMetadata + Send>,
    pub rows: Vec<Box<dyn RowSource + Send>>,
}

/// The sqlx-backed connector, choosing the backend from the target's scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxConnector;

#[async_trait]
impl Connector for SqlxConnector {
    async fn open(&self, target: &str) -> DriverResult<Box<dyn Session>> {
        let backend = DatabaseBackend::from_target(target).ok_or_else(|| {
            sqlx::Error::Configuration(
                format!(
                    "unsupported connection target '{}'; expected a postgres:// or sqlite: URL",
                    redact_target(target)
                )
                .into(),
            )
        })?;

        debug!("Opening {} connection", backend.as_str());
        match backend {
            DatabaseBackend::Postgres => {
                Ok(Box::new(PostgresSession::connect(target).await?))
            }
            DatabaseBackend::Sqlite => {
                Ok(Box::new(SqliteSession::connect(target).await?))
            }
        }
    }
}

/// Renders a driver error for display, with PostgreSQL detail and hint lines
/// when the server sent them.
pub fn format_driver_error(error: &sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }

        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}

/// Returns the target with any password replaced, for logs and messages.
pub fn redact_target(target: &str) -> String {
    match url::Url::parse(target) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("****"));
            url.to_string()
        }
        _ => target.to_string(),
    }
}
