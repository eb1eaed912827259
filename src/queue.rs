//! In-process report queue between the bot and the scrape worker.
//!
//! Two unbounded channels: tasks flow bot -> worker, results flow worker ->
//! result processor. The sender side is cheap to clone; the receiver halves
//! are handed to their single consumers at startup. Nothing is persisted:
//! tasks still in flight die with the process.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use ulid::Ulid;

/// A queued comparison request.
#[derive(Debug, Clone)]
pub struct ReportTask {
    pub id: Ulid,
    /// Row in `reports` tracking this task.
    pub report_id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub articles: Vec<i64>,
    /// Loading sticker to clean up when the result lands.
    pub loading_message_id: Option<i64>,
}

impl ReportTask {
    pub fn new(
        report_id: i64,
        user_id: i64,
        chat_id: i64,
        articles: Vec<i64>,
        loading_message_id: Option<i64>,
    ) -> Self {
        Self {
            id: Ulid::new(),
            report_id,
            user_id,
            chat_id,
            articles,
            loading_message_id,
        }
    }
}

/// What the worker produced for a task.
#[derive(Debug)]
pub struct ReportResult {
    pub task_id: Ulid,
    pub report_id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub loading_message_id: Option<i64>,
    /// Path to the merged archive, or a user-facing error description.
    pub outcome: Result<PathBuf, String>,
}

/// Cloneable sender side of the queue.
#[derive(Clone)]
pub struct ReportQueue {
    tasks_tx: mpsc::UnboundedSender<ReportTask>,
    results_tx: mpsc::UnboundedSender<ReportResult>,
    pending: Arc<AtomicUsize>,
}

/// Receiver halves, consumed once by the worker and the result processor.
pub struct ReportQueueReceivers {
    pub tasks_rx: mpsc::UnboundedReceiver<ReportTask>,
    pub results_rx: mpsc::UnboundedReceiver<ReportResult>,
}

pub fn channel() -> (ReportQueue, ReportQueueReceivers) {
    let (tasks_tx, tasks_rx) = mpsc::unbounded_channel();
    let (results_tx, results_rx) = mpsc::unbounded_channel();
    (
        ReportQueue {
            tasks_tx,
            results_tx,
            pending: Arc::new(AtomicUsize::new(0)),
        },
        ReportQueueReceivers {
            tasks_rx,
            results_rx,
        },
    )
}

impl ReportQueue {
    /// Enqueue a task, returning its 1-based position in line.
    pub fn enqueue(&self, task: ReportTask) -> Result<usize, mpsc::error::SendError<ReportTask>> {
        let position = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        self.tasks_tx.send(task)?;
        Ok(position)
    }

    /// Called by the worker once it picks a task up.
    pub fn task_started(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn push_result(
        &self,
        result: ReportResult,
    ) -> Result<(), mpsc::error::SendError<ReportResult>> {
        self.results_tx.send(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(report_id: i64) -> ReportTask {
        ReportTask::new(report_id, 42, 42, vec![111, 222], Some(9))
    }

    #[tokio::test]
    async fn positions_count_waiting_tasks() {
        let (queue, mut receivers) = channel();
        assert_eq!(queue.enqueue(task(1)).expect("enqueue"), 1);
        assert_eq!(queue.enqueue(task(2)).expect("enqueue"), 2);
        assert_eq!(queue.pending(), 2);

        let first = receivers.tasks_rx.recv().await.expect("task");
        queue.task_started();
        assert_eq!(first.report_id, 1);
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.enqueue(task(3)).expect("enqueue"), 2);
    }

    #[tokio::test]
    async fn results_round_trip() {
        let (queue, mut receivers) = channel();
        let t = task(7);
        queue
            .push_result(ReportResult {
                task_id: t.id,
                report_id: t.report_id,
                user_id: t.user_id,
                chat_id: t.chat_id,
                loading_message_id: t.loading_message_id,
                outcome: Err("браузер недоступен".to_string()),
            })
            .expect("push");
        let result = receivers.results_rx.recv().await.expect("result");
        assert_eq!(result.report_id, 7);
        assert!(result.outcome.is_err());
    }
}
