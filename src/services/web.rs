//! Axum server wrapper with graceful shutdown.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

use crate::services::Service;
use crate::state::{AppState, ServiceStatus};
use crate::web::create_router;

pub struct WebService {
    port: u16,
    app_state: AppState,
}

impl WebService {
    pub fn new(port: u16, app_state: AppState) -> Self {
        Self { port, app_state }
    }
}

#[async_trait]
impl Service for WebService {
    async fn run(self: Box<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let router = create_router(self.app_state.clone());
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!(%addr, "webhook server listening");
        self.app_state
            .service_statuses
            .set("web", ServiceStatus::Active);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("webhook server shutting down");
            })
            .await
            .context("webhook server failed")?;

        self.app_state
            .service_statuses
            .set("web", ServiceStatus::Disabled);
        Ok(())
    }
}
