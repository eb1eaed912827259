//! Long-running services and their lifecycle plumbing.
//!
//! Each service owns its resources and runs until it finishes or the shared
//! shutdown channel fires. The [`manager::ServiceManager`] spawns them and
//! [`signals::handle_shutdown_signals`] turns OS signals (or a service dying
//! on its own) into an orderly stop.

pub mod bot;
pub mod manager;
pub mod scraper;
pub mod signals;
pub mod web;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// A long-running unit of the application.
#[async_trait]
pub trait Service: Send {
    /// Run to completion. Must return promptly once `shutdown_rx` fires.
    async fn run(self: Box<Self>, shutdown_rx: broadcast::Receiver<()>) -> Result<()>;
}
