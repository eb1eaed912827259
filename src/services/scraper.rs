//! Report generation service: browser worker, result delivery, state saver.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::data::flags;
use crate::queue::ReportQueueReceivers;
use crate::scraper::auth::AuthContext;
use crate::scraper::saver::StateSaver;
use crate::scraper::worker::{ReportWorker, ResultProcessor};
use crate::services::Service;
use crate::state::{AppState, ServiceStatus};

/// How long an interrupted report task gets to wind down on shutdown.
const WORKER_DRAIN: Duration = Duration::from_secs(5);

pub struct ScraperService {
    state: AppState,
    receivers: ReportQueueReceivers,
}

impl ScraperService {
    pub fn new(state: AppState, receivers: ReportQueueReceivers) -> Self {
        Self { state, receivers }
    }
}

#[async_trait]
impl Service for ScraperService {
    async fn run(self: Box<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let state = self.state;
        let receivers = self.receivers;
        let statuses = state.service_statuses.clone();
        statuses.set("scraper", ServiceStatus::Starting);

        let worker_cancel = CancellationToken::new();
        let processor_cancel = CancellationToken::new();
        let saver_cancel = CancellationToken::new();

        let worker = ReportWorker::new(
            state.db_pool.clone(),
            state.wb_client.clone(),
            state.queue.clone(),
            receivers.tasks_rx,
            state.config.wb_downloads_path.clone(),
        );
        let worker_handle = tokio::spawn(worker.run(worker_cancel.clone()));

        let processor = ResultProcessor::new(
            state.db_pool.clone(),
            state.telegram.clone(),
            receivers.results_rx,
        );
        let processor_handle = tokio::spawn(processor.run(processor_cancel.clone()));

        let saver = StateSaver::new(
            state.db_pool.clone(),
            state.wb_client.clone(),
            state.config.wb_state_save_interval,
        );
        let saver_handle = tokio::spawn(saver.run(saver_cancel.clone()));

        // Warm up the browser session shortly after start so the first report
        // does not pay the login cost.
        let warmup_state = state.clone();
        let warmup_statuses = statuses.clone();
        let warmup = tokio::spawn(async move {
            time::sleep(Duration::from_secs(2)).await;
            if flags::wb_use_mock(&warmup_state.db_pool).await {
                info!("mock mode, skipping browser warmup");
                warmup_statuses.set("scraper", ServiceStatus::Active);
                return;
            }
            let ctx = AuthContext {
                telegram: warmup_state.telegram.as_ref(),
                admin_id: warmup_state.config.admin_telegram_id,
                phone: &warmup_state.config.wb_phone,
                gateway: &warmup_state.auth_gateway,
            };
            match warmup_state.wb_client.ensure_authorized(&ctx).await {
                Ok(()) => {
                    info!("browser session authorized");
                    warmup_statuses.set("scraper", ServiceStatus::Connected);
                }
                Err(e) => {
                    error!(error = %e, "browser warmup failed, reports will retry the login");
                    warmup_statuses.set("scraper", ServiceStatus::Error);
                }
            }
        });

        let _ = shutdown_rx.recv().await;
        info!("scraper service shutting down");
        warmup.abort();

        // The worker pushes a failure result for any interrupted task, so it
        // has to exit before the result processor stops draining.
        worker_cancel.cancel();
        if time::timeout(WORKER_DRAIN, worker_handle).await.is_err() {
            warn!("report worker did not stop in time, abandoning it");
        }
        processor_cancel.cancel();
        if let Err(e) = processor_handle.await {
            warn!(error = ?e, "result processor task failed");
        }
        saver_cancel.cancel();
        if let Err(e) = saver_handle.await {
            warn!(error = ?e, "state saver task failed");
        }

        if !flags::wb_use_mock(&state.db_pool).await {
            match state.wb_client.save_current_state().await {
                Ok(true) => info!("final session state saved"),
                Ok(false) => info!("final session state save skipped"),
                Err(e) => warn!(error = %e, "final session state save failed"),
            }
        }
        state.wb_client.disconnect().await;

        statuses.set("scraper", ServiceStatus::Disabled);
        info!("scraper service stopped");
        Ok(())
    }
}
