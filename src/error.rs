//! Error types for sqlrun.
//!
//! Defines the error enum shared by the execution driver, the database seam
//! and the command-line front end.

use thiserror::Error;

/// Main error type for sqlrun operations.
///
/// Every variant carries the rendered message of the underlying failure so
/// the value can be cloned into sinks and across channels.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SqlRunError {
    /// The connection could not be established (bad target, host unreachable, auth failed).
    #[error("Connection error: {0}")]
    Connection(String),

    /// The SQL text could not be executed (syntax errors, missing tables, etc.)
    #[error("Execution error: {0}")]
    Execution(String),

    /// Reading a result set's column metadata failed.
    #[error("Metadata read error: {0}")]
    MetadataRead(String),

    /// Fetching a row or reading one of its columns failed.
    #[error("Row read error: {0}")]
    RowRead(String),

    /// Asking the database for the next result failed.
    #[error("More results error: {0}")]
    MoreResults(String),

    /// Configuration errors (invalid config file, missing connection target, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (worker stopped, unexpected states).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SqlRunError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates an execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Creates a metadata read error with the given message.
    pub fn metadata_read(msg: impl Into<String>) -> Self {
        Self::MetadataRead(msg.into())
    }

    /// Creates a row read error with the given message.
    pub fn row_read(msg: impl Into<String>) -> Self {
        Self::RowRead(msg.into())
    }

    /// Creates a more-results error with the given message.
    pub fn more_results(msg: impl Into<String>) -> Self {
        Self::MoreResults(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Execution(_) => "Execution Error",
            Self::MetadataRead(_) => "Metadata Read Error",
            Self::RowRead(_) => "Row Read Error",
            Self::MoreResults(_) => "More Results Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Connection(msg)
            | Self::Execution(msg)
            | Self::MetadataRead(msg)
            | Self::RowRead(msg)
            | Self::MoreResults(msg)
            | Self::Config(msg)
            | Self::Internal(msg) => msg,
        }
    }
}

/// Result type alias using SqlRunError.
pub type Result<T> = std::result::Result<T, SqlRunError>;
