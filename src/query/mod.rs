//! Query execution for sqlrun.
//!
//! The streaming driver lives in [`executor`]; the other modules build on it:
//! channel sinks, outcome collection, buffered execution and the background
//! worker.

pub mod buffered;
pub mod executor;
pub mod outcome;
pub mod sink;
pub mod worker;

pub use buffered::{execute_all, execute_all_with, fetch_result, fetch_result_with};
pub use executor::{execute_streaming, execute_streaming_with, ExecutionSummary, ResultSink};
pub use outcome::{collect_outcomes, ExecutionOutcome};
pub use sink::{ChannelSink, ResultEvent, SinkEvent};
pub use worker::{QueryWorker, WorkerEvent};
