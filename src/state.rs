//! Application state shared across components (bot, web, scraper).

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use sqlx::PgPool;

use crate::config::Config;
use crate::payment::PaymentService;
use crate::queue::ReportQueue;
use crate::scraper::{AuthCodeGateway, WbClient};
use crate::telegram::TelegramClient;
use dashmap::DashMap;

/// Health status of a service.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Starting,
    Active,
    Connected,
    Disabled,
    Error,
}

/// A timestamped status entry for a service.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub status: ServiceStatus,
    #[allow(dead_code)]
    pub updated_at: Instant,
}

/// Thread-safe registry for services to self-report their health status.
#[derive(Debug, Clone, Default)]
pub struct ServiceStatusRegistry {
    inner: Arc<DashMap<String, StatusEntry>>,
}

impl ServiceStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates the status for a named service.
    pub fn set(&self, name: &str, status: ServiceStatus) {
        self.inner.insert(
            name.to_owned(),
            StatusEntry {
                status,
                updated_at: Instant::now(),
            },
        );
    }

    /// Returns a snapshot of all service statuses.
    pub fn all(&self) -> Vec<(String, ServiceStatus)> {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status.clone()))
            .collect()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub config: Arc<Config>,
    pub telegram: Arc<TelegramClient>,
    pub queue: ReportQueue,
    pub payments: Arc<PaymentService>,
    pub wb_client: Arc<WbClient>,
    pub auth_gateway: AuthCodeGateway,
    pub service_statuses: ServiceStatusRegistry,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_pool: PgPool,
        config: Arc<Config>,
        telegram: Arc<TelegramClient>,
        queue: ReportQueue,
        payments: Arc<PaymentService>,
        wb_client: Arc<WbClient>,
        auth_gateway: AuthCodeGateway,
    ) -> Self {
        Self {
            db_pool,
            config,
            telegram,
            queue,
            payments,
            wb_client,
            auth_gateway,
            service_statuses: ServiceStatusRegistry::new(),
        }
    }

    /// Spawn a background task that evicts expired invoice cache entries
    /// every `interval`. The task runs until the process exits.
    pub fn spawn_invoice_cache_sweep(&self, interval: std::time::Duration) {
        let payments = self.payments.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                let removed = payments.cache().cleanup_expired();
                if removed > 0 {
                    tracing::debug!(removed, "expired payment links evicted");
                }
            }
        });
    }
}
