//! Telegram long-polling service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time;
use tracing::{info, warn};

use crate::bot::Bot;
use crate::services::Service;
use crate::state::{AppState, ServiceStatus};
use crate::telegram::POLL_TIMEOUT_SECS;

/// Backoff after a failed poll so a Telegram outage does not spin the loop.
const POLL_RETRY_PAUSE: Duration = Duration::from_secs(5);

pub struct BotService {
    state: AppState,
}

impl BotService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Service for BotService {
    async fn run(self: Box<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let statuses = self.state.service_statuses.clone();
        statuses.set("bot", ServiceStatus::Starting);

        let me = self
            .state
            .telegram
            .get_me()
            .await
            .context("getMe failed, check BOT_TOKEN")?;
        info!(
            bot_id = me.id,
            username = me.username.as_deref().unwrap_or(""),
            "bot identity confirmed"
        );

        // Confirm and discard whatever backlog piled up while the bot was
        // down; stale /compare commands must not fire minutes later.
        let mut offset: Option<i64> = None;
        match self.state.telegram.get_updates(Some(-1), 0).await {
            Ok(backlog) => {
                if let Some(last) = backlog.last() {
                    offset = Some(last.update_id + 1);
                    info!(dropped_through = last.update_id, "pending updates dropped");
                }
            }
            Err(e) => warn!(error = %e, "failed to drop pending updates"),
        }

        let bot = Arc::new(Bot::new(self.state.clone()));
        statuses.set("bot", ServiceStatus::Connected);
        info!("bot polling started");

        loop {
            let polled = tokio::select! {
                _ = shutdown_rx.recv() => break,
                result = self.state.telegram.get_updates(offset, POLL_TIMEOUT_SECS) => result,
            };
            let updates = match polled {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "polling failed, backing off");
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = time::sleep(POLL_RETRY_PAUSE) => {}
                    }
                    continue;
                }
            };
            for update in updates {
                offset = Some(update.update_id + 1);
                // Updates are handled concurrently; a slow broadcast must not
                // stall the poll loop.
                let bot = bot.clone();
                tokio::spawn(async move {
                    bot.dispatch(update).await;
                });
            }
        }

        statuses.set("bot", ServiceStatus::Disabled);
        info!("bot polling stopped");
        Ok(())
    }
}
