//! sqlrun - run multi-statement SQL and stream every result as it arrives.
//!
//! This library exposes the core modules for use by the binary and the
//! integration tests.

pub mod config;
pub mod db;
pub mod error;
pub mod output;
pub mod query;
