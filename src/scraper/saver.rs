//! Periodic persistence of the browser session.
//!
//! Cookies and localStorage are written to disk on an interval so a restart
//! can resume the authorized session instead of asking the admin for a new
//! code. The last successful save is timestamped in the KV store and the
//! first tick after a restart is scheduled against it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::data::kv;
use crate::scraper::WbClient;
use crate::utils::fmt_duration;

/// KV key holding the time of the last successful session save.
pub const KV_STATE_SAVE: &str = "scraper.state_save";

pub struct StateSaver {
    db: PgPool,
    client: Arc<WbClient>,
    interval: Duration,
}

impl StateSaver {
    pub fn new(db: PgPool, client: Arc<WbClient>, interval: Duration) -> Self {
        Self {
            db,
            client,
            interval,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let persisted = match kv::get_timestamp(&self.db, KV_STATE_SAVE).await {
            Ok(ts) => ts,
            Err(e) => {
                warn!(error = ?e, "failed to read last save time, starting fresh");
                None
            }
        };
        let first_in = initial_delay(persisted, self.interval);
        info!(
            interval = fmt_duration(self.interval),
            first_in = fmt_duration(first_in),
            "state saver started"
        );

        let mut next = Instant::now() + first_in;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = time::sleep_until(next) => {}
            }
            next = Instant::now() + self.interval;

            if !self.client.is_connected().await {
                debug!("browser not connected, skipping state save");
                continue;
            }
            match self.client.save_current_state().await {
                Ok(true) => {
                    if let Err(e) = kv::set_timestamp(&self.db, KV_STATE_SAVE, Utc::now()).await {
                        warn!(error = ?e, "failed to record state save time");
                    }
                }
                Ok(false) => debug!("state save skipped"),
                Err(e) => error!(error = ?e, "state save failed"),
            }
        }
        info!("state saver stopped");
    }
}

/// Delay before the first save after startup: the remainder of the interval
/// measured from the persisted save time, or zero when there is none.
fn initial_delay(persisted: Option<DateTime<Utc>>, interval: Duration) -> Duration {
    let Some(persisted) = persisted else {
        return Duration::ZERO;
    };
    match Utc::now().signed_duration_since(persisted).to_std() {
        Ok(elapsed) => interval.saturating_sub(elapsed),
        // persisted time is in the future (clock moved), wait a full interval
        Err(_) => interval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    const INTERVAL: Duration = Duration::from_secs(600);

    #[test]
    fn missing_timestamp_saves_immediately() {
        assert_eq!(initial_delay(None, INTERVAL), Duration::ZERO);
    }

    #[test]
    fn recent_save_waits_out_the_remainder() {
        let persisted = Utc::now() - TimeDelta::seconds(200);
        let delay = initial_delay(Some(persisted), INTERVAL);
        assert!(delay > Duration::from_secs(395) && delay <= Duration::from_secs(400));
    }

    #[test]
    fn overdue_save_fires_immediately() {
        let persisted = Utc::now() - TimeDelta::seconds(6000);
        assert_eq!(initial_delay(Some(persisted), INTERVAL), Duration::ZERO);
    }

    #[test]
    fn future_timestamp_falls_back_to_full_interval() {
        let persisted = Utc::now() + TimeDelta::seconds(3600);
        assert_eq!(initial_delay(Some(persisted), INTERVAL), INTERVAL);
    }
}
