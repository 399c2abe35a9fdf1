//! Integration tests for sqlrun.

pub mod buffered_test;
pub mod postgres_test;
pub mod streaming_test;
pub mod worker_test;
