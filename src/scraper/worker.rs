//! Report generation worker and result delivery.
//!
//! The worker consumes queued tasks one at a time, drives the browser (or
//! the mock path) and pushes the outcome onto the results channel. The
//! result processor owns everything user-facing: sending the archive,
//! deducting the balance and recording the final report state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bot::loading::delete_loading_sticker;
use crate::data::models::ReportState;
use crate::data::{flags, reports, users};
use crate::queue::{ReportQueue, ReportResult, ReportTask};
use crate::scraper::WbClient;
use crate::scraper::reports::batch_id;
use crate::telegram::TelegramClient;
use crate::utils::fmt_duration;

/// Hard cap on a single report run. A full pass over every filter
/// combination takes minutes; anything past this is a wedged browser.
const REPORT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Successful runs slower than this still get flagged.
const SLOW_REPORT: Duration = Duration::from_secs(10 * 60);

/// Static document sent instead of a real report when the mock flag is on.
const MOCK_FIXTURE: &str = "storage/test_report.txt";

pub struct ReportWorker {
    db: PgPool,
    client: Arc<WbClient>,
    queue: ReportQueue,
    tasks_rx: mpsc::UnboundedReceiver<ReportTask>,
    downloads_path: PathBuf,
}

impl ReportWorker {
    pub fn new(
        db: PgPool,
        client: Arc<WbClient>,
        queue: ReportQueue,
        tasks_rx: mpsc::UnboundedReceiver<ReportTask>,
        downloads_path: PathBuf,
    ) -> Self {
        Self {
            db,
            client,
            queue,
            tasks_rx,
            downloads_path,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("report worker started");
        loop {
            let task = tokio::select! {
                _ = cancel.cancelled() => break,
                task = self.tasks_rx.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };
            self.queue.task_started();
            info!(
                task_id = %task.id,
                report_id = task.report_id,
                user_id = task.user_id,
                articles = ?task.articles,
                "task picked up"
            );
            let started = Instant::now();
            if let Err(e) =
                reports::set_state(&self.db, task.report_id, ReportState::Processing).await
            {
                warn!(report_id = task.report_id, error = ?e, "failed to mark report processing");
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(task_id = %task.id, "shutdown requested mid-task");
                    Err("сервис перезапускается, попробуйте позже".to_string())
                }
                outcome = time::timeout(REPORT_TIMEOUT, self.process(&task)) => match outcome {
                    Ok(outcome) => outcome,
                    Err(_elapsed) => {
                        error!(
                            task_id = %task.id,
                            timeout = fmt_duration(REPORT_TIMEOUT),
                            "report run timed out"
                        );
                        Err(format!("report timed out after {}s", REPORT_TIMEOUT.as_secs()))
                    }
                },
            };

            if let Ok(path) = &outcome {
                let elapsed = started.elapsed();
                info!(
                    task_id = %task.id,
                    path = %path.display(),
                    duration = fmt_duration(elapsed),
                    "report generated"
                );
                if elapsed > SLOW_REPORT {
                    warn!(
                        task_id = %task.id,
                        duration = fmt_duration(elapsed),
                        "report run was unusually slow"
                    );
                }
            }

            let delivered = self.queue.push_result(ReportResult {
                task_id: task.id,
                report_id: task.report_id,
                user_id: task.user_id,
                chat_id: task.chat_id,
                loading_message_id: task.loading_message_id,
                outcome,
            });
            if delivered.is_err() {
                error!("result channel closed, stopping worker");
                break;
            }
            if cancel.is_cancelled() {
                break;
            }
        }
        info!("report worker stopped");
    }

    /// The mock flag is read per task so it can be flipped without a restart.
    async fn process(&self, task: &ReportTask) -> Result<PathBuf, String> {
        if flags::wb_use_mock(&self.db).await {
            self.process_mock(task).await
        } else {
            self.process_real(task).await
        }
    }

    /// Copy the fixture under a task-unique name; delivery deletes the file
    /// it sent, and the fixture itself has to survive that.
    async fn process_mock(&self, task: &ReportTask) -> Result<PathBuf, String> {
        info!(task_id = %task.id, "generating mock report");
        debug!("mock: collecting card data");
        time::sleep(Duration::from_secs(1)).await;
        debug!("mock: building report");
        time::sleep(Duration::from_secs(1)).await;

        let target = self.downloads_path.join(format!("test-report-{}.txt", task.id));
        let copy = async {
            tokio::fs::create_dir_all(&self.downloads_path).await?;
            tokio::fs::copy(MOCK_FIXTURE, &target).await?;
            std::io::Result::Ok(())
        };
        match copy.await {
            Ok(()) => Ok(target),
            Err(e) => {
                warn!(task_id = %task.id, error = ?e, "mock fixture copy failed");
                Err(format!("mock report fixture unavailable: {e}"))
            }
        }
    }

    async fn process_real(&self, task: &ReportTask) -> Result<PathBuf, String> {
        let fake = flags::compare_cards_mock(&self.db).await;
        let run = async {
            self.client.compare_cards(&task.articles, fake).await?;
            let batch = batch_id(&task.articles);
            let exported = self.client.process_filters(batch).await?;
            self.client.download_documents(batch, exported).await
        };
        match run.await {
            Ok(path) => Ok(path),
            Err(e) if e.is_recoverable() => {
                warn!(task_id = %task.id, error = %e, "scrape failed with a transient error, a retry may succeed");
                Err(e.to_string())
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "scrape failed, retrying will not help");
                Err(e.to_string())
            }
        }
    }
}

pub struct ResultProcessor {
    db: PgPool,
    telegram: Arc<TelegramClient>,
    results_rx: mpsc::UnboundedReceiver<ReportResult>,
}

impl ResultProcessor {
    pub fn new(
        db: PgPool,
        telegram: Arc<TelegramClient>,
        results_rx: mpsc::UnboundedReceiver<ReportResult>,
    ) -> Self {
        Self {
            db,
            telegram,
            results_rx,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("result processor started");
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.results_rx.recv() => match result {
                    Some(result) => result,
                    None => break,
                },
            };
            self.deliver(result).await;
        }
        // The worker pushes a failure result for a task cut short by
        // shutdown; drain so that notice still reaches the user.
        while let Ok(result) = self.results_rx.try_recv() {
            self.deliver(result).await;
        }
        info!("result processor stopped");
    }

    async fn deliver(&self, result: ReportResult) {
        delete_loading_sticker(&self.telegram, result.chat_id, result.loading_message_id).await;

        let path = match &result.outcome {
            Ok(path) => path,
            Err(error) => {
                error!(
                    task_id = %result.task_id,
                    report_id = result.report_id,
                    error = error.as_str(),
                    "report generation failed"
                );
                self.mark_failed(result.report_id).await;
                self.send_failure(result.chat_id, error).await;
                return;
            }
        };

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            error!(
                task_id = %result.task_id,
                path = %path.display(),
                "report file missing at delivery"
            );
            self.mark_failed(result.report_id).await;
            self.send_failure(result.chat_id, "файл отчета не найден").await;
            return;
        }

        if let Err(e) = self
            .telegram
            .send_document(result.chat_id, path, "✅ <b>Отчет готов!</b>")
            .await
        {
            error!(task_id = %result.task_id, error = ?e, "failed to send report document");
            self.mark_failed(result.report_id).await;
            self.send_failure(result.chat_id, "не удалось отправить файл отчета")
                .await;
            return;
        }
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = ?e, "failed to delete delivered report");
        }

        // Deduction happens only after the document went out, so a failed
        // run never costs the user a report.
        match users::adjust_balance(&self.db, result.user_id, -1).await {
            Ok(balance) => {
                let text = format!("💰 Осталось отчетов: <b>{balance}</b>");
                if let Err(e) = self.telegram.send_message(result.chat_id, &text, None).await {
                    warn!(chat_id = result.chat_id, error = ?e, "failed to send balance notice");
                }
            }
            Err(e) => {
                error!(user_id = result.user_id, error = ?e, "failed to deduct balance after delivery");
            }
        }

        if let Err(e) = reports::set_state(&self.db, result.report_id, ReportState::Done).await {
            warn!(report_id = result.report_id, error = ?e, "failed to mark report done");
        }
        info!(task_id = %result.task_id, report_id = result.report_id, "report delivered");
    }

    async fn mark_failed(&self, report_id: i64) {
        if let Err(e) = reports::set_state(&self.db, report_id, ReportState::Failed).await {
            warn!(report_id, error = ?e, "failed to mark report failed");
        }
    }

    async fn send_failure(&self, chat_id: i64, error: &str) {
        let text = format!(
            "❌ <b>Ошибка при генерации отчета</b>\n\n\
             <code>{}</code>\n\n\
             Баланс не был списан. Попробуйте позже.",
            html_escape::encode_text(error)
        );
        if let Err(e) = self.telegram.send_message(chat_id, &text, None).await {
            warn!(chat_id, error = ?e, "failed to send failure notice");
        }
    }
}
