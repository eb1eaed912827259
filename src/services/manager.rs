//! Registration and supervision of [`Service`] tasks.

use anyhow::Result;
use futures::future;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

use crate::services::Service;

pub struct ServiceManager {
    shutdown_tx: broadcast::Sender<()>,
    registered: Vec<(&'static str, Box<dyn Service>)>,
    running: Vec<(&'static str, JoinHandle<Result<()>>)>,
}

impl ServiceManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            registered: Vec::new(),
            running: Vec::new(),
        }
    }

    pub fn register_service(&mut self, name: &'static str, service: Box<dyn Service>) {
        info!(service = name, "service registered");
        self.registered.push((name, service));
    }

    pub fn has_services(&self) -> bool {
        !self.registered.is_empty() || !self.running.is_empty()
    }

    /// Spawn every registered service with its own shutdown receiver.
    pub fn spawn_all(&mut self) {
        for (name, service) in self.registered.drain(..) {
            let shutdown_rx = self.shutdown_tx.subscribe();
            info!(service = name, "starting service");
            let handle = tokio::spawn(service.run(shutdown_rx));
            self.running.push((name, handle));
        }
    }

    /// Tell every running service to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Wait until any one service finishes, removing it from the running set.
    /// Pends forever if nothing is running.
    pub async fn wait_any(&mut self) -> (&'static str, Result<Result<()>, JoinError>) {
        if self.running.is_empty() {
            return future::pending().await;
        }
        let (result, index, _) = {
            let handles: Vec<_> = self.running.iter_mut().map(|(_, handle)| handle).collect();
            future::select_all(handles).await
        };
        let (name, _) = self.running.remove(index);
        (name, result)
    }

    /// Wait for every remaining service. Returns `false` if any of them ended
    /// with an error or a panic.
    pub async fn join_all(&mut self) -> bool {
        let mut clean = true;
        for (name, handle) in self.running.drain(..) {
            match handle.await {
                Ok(Ok(())) => info!(service = name, "service stopped"),
                Ok(Err(e)) => {
                    clean = false;
                    error!(service = name, error = ?e, "service stopped with error");
                }
                Err(e) => {
                    clean = false;
                    error!(service = name, error = ?e, "service panicked");
                }
            }
        }
        clean
    }
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}
