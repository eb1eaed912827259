//! Process shutdown: signals in, services drained, exit code out.

use std::process::ExitCode;
use std::time::Duration;

use futures::future;
use tokio::signal;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::services::manager::ServiceManager;
use crate::utils::fmt_duration;

/// Wait for a shutdown trigger, then give services `shutdown_timeout` to
/// finish before the process exits anyway.
///
/// A service finishing on its own (success or failure) also triggers
/// shutdown: none of them is optional, so the process restarts as a whole.
pub async fn handle_shutdown_signals(
    mut manager: ServiceManager,
    shutdown_timeout: Duration,
) -> ExitCode {
    let mut failed = false;

    tokio::select! {
        _ = ctrl_c() => info!("interrupt received, shutting down"),
        _ = sigterm() => info!("SIGTERM received, shutting down"),
        (name, result) = manager.wait_any() => match result {
            Ok(Ok(())) => warn!(service = name, "service exited early, shutting down"),
            Ok(Err(e)) => {
                failed = true;
                error!(service = name, error = ?e, "service failed, shutting down");
            }
            Err(e) => {
                failed = true;
                error!(service = name, error = ?e, "service panicked, shutting down");
            }
        },
    }

    manager.shutdown();
    match timeout(shutdown_timeout, manager.join_all()).await {
        Ok(clean) => {
            if !clean {
                failed = true;
            }
            info!("all services stopped");
        }
        Err(_) => {
            failed = true;
            error!(
                timeout = fmt_duration(shutdown_timeout),
                "services did not stop in time, exiting anyway"
            );
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = ?e, "failed to listen for interrupt");
        future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            error!(error = ?e, "failed to listen for SIGTERM");
            future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    future::pending::<()>().await;
}
