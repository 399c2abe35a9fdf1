//! Channel-backed result sinks.
//!
//! The execution driver calls sinks synchronously on the task that runs it.
//! [`ChannelSink`] turns each call into a [`ResultEvent`] and hands it to an
//! unbounded channel, so another task can render or collect the results.

use super::executor::ResultSink;
use crate::db::{ColumnSet, RowSnapshot};
use crate::error::SqlRunError;
use tokio::sync::mpsc;
use tracing::debug;

/// One sink call.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Columns(ColumnSet),
    Row(RowSnapshot),
    UpdateCount(u64),
    Error(SqlRunError),
}

/// A sink call tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEvent {
    /// Submission the result belongs to.
    pub submission: u64,
    /// 0-based ordinal of the result within its submission.
    pub ordinal: usize,
    pub payload: SinkEvent,
}

/// Sink that forwards every call over a channel.
///
/// Calls made after the receiver is gone are dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink<E = ResultEvent> {
    submission: u64,
    ordinal: usize,
    sender: mpsc::UnboundedSender<E>,
}

impl<E: From<ResultEvent>> ChannelSink<E> {
    pub fn new(submission: u64, ordinal: usize, sender: mpsc::UnboundedSender<E>) -> Self {
        Self {
            submission,
            ordinal,
            sender,
        }
    }

    /// Returns a sink factory that opens one channel sink per ordinal.
    pub fn factory(
        submission: u64,
        sender: mpsc::UnboundedSender<E>,
    ) -> impl FnMut(usize) -> ChannelSink<E> + Send
    where
        E: Send,
    {
        move |ordinal| ChannelSink::new(submission, ordinal, sender.clone())
    }

    fn send(&self, payload: SinkEvent) {
        let event = ResultEvent {
            submission: self.submission,
            ordinal: self.ordinal,
            payload,
        };
        if self.sender.send(E::from(event)).is_err() {
            debug!(
                "Dropping result {} of submission {}: receiver closed",
                self.ordinal, self.submission
            );
        }
    }
}

impl<E: From<ResultEvent>> ResultSink for ChannelSink<E> {
    fn accept_columns(&mut self, columns: ColumnSet) {
        self.send(SinkEvent::Columns(columns));
    }

    fn accept_row(&mut self, row: RowSnapshot) {
        self.send(SinkEvent::Row(row));
    }

    fn accept_update_count(&mut self, count: u64) {
        self.send(SinkEvent::UpdateCount(count));
    }

    fn accept_error(&mut self, error: SqlRunError) {
        self.send(SinkEvent::Error(error));
    }
}
