//! Background query worker.
//!
//! Runs submissions one at a time, in the order they were submitted, on a
//! single background task. Results travel back over a channel as
//! [`WorkerEvent`]s, so the submitting side never blocks on the database.

use super::executor::{execute_streaming_with, ExecutionSummary};
use super::sink::{ChannelSink, ResultEvent};
use crate::db::Connector;
use crate::error::{Result, SqlRunError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Maximum number of submissions waiting to run.
const QUEUE_DEPTH: usize = 32;

/// Event sent by the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A sink call of a running submission.
    Result(ResultEvent),
    /// A submission has run to completion; no further events follow for it.
    Finished {
        submission: u64,
        summary: ExecutionSummary,
    },
}

impl From<ResultEvent> for WorkerEvent {
    fn from(event: ResultEvent) -> Self {
        WorkerEvent::Result(event)
    }
}

struct Submission {
    id: u64,
    target: String,
    sql: String,
}

/// Handle to the background task that runs submissions.
pub struct QueryWorker {
    sender: Option<mpsc::Sender<Submission>>,
    next_id: AtomicU64,
    task: Option<JoinHandle<()>>,
}

impl QueryWorker {
    /// Starts the worker. Its events arrive on the returned receiver.
    pub fn spawn(connector: Arc<dyn Connector>) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (sender, receiver) = mpsc::channel(QUEUE_DEPTH);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run(connector, receiver, events_tx));

        let worker = Self {
            sender: Some(sender),
            next_id: AtomicU64::new(1),
            task: Some(task),
        };

        (worker, events_rx)
    }

    /// Queues `sql` for execution against `target` and returns its
    /// submission id. Waits only if the queue is full.
    pub async fn submit(&self, target: impl Into<String>, sql: impl Into<String>) -> Result<u64> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| SqlRunError::internal("Query worker has shut down"))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        sender
            .send(Submission {
                id,
                target: target.into(),
                sql: sql.into(),
            })
            .await
            .map_err(|_| SqlRunError::internal("Query worker has stopped"))?;

        debug!("Queued submission {}", id);
        Ok(id)
    }

    /// Stops accepting submissions and waits for the queued ones to finish.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.sender = None;

        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| SqlRunError::internal(format!("Query worker failed: {e}")))?;
        }
        Ok(())
    }
}

async fn run(
    connector: Arc<dyn Connector>,
    mut submissions: mpsc::Receiver<Submission>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    while let Some(submission) = submissions.recv().await {
        info!("Running submission {}", submission.id);

        let summary = execute_streaming_with(
            connector.as_ref(),
            &submission.target,
            &submission.sql,
            ChannelSink::factory(submission.id, events.clone()),
        )
        .await;

        let finished = WorkerEvent::Finished {
            submission: submission.id,
            summary,
        };
        if events.send(finished).is_err() {
            warn!("Worker event receiver closed; results of submission {} lost", submission.id);
        }
    }

    debug!("Query worker stopped");
}
