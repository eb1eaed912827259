//! Health and status handlers.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::trace;

use crate::data::health;
use crate::state::{AppState, ServiceStatus};

#[derive(Serialize)]
pub struct ServiceInfo {
    name: String,
    status: ServiceStatus,
}

#[derive(Serialize)]
pub struct DatabaseInfo {
    reachable: bool,
    pool_size: u32,
    pool_idle: usize,
}

#[derive(Serialize)]
pub struct StatusResponse {
    status: ServiceStatus,
    version: String,
    commit: String,
    queue_pending: usize,
    database: DatabaseInfo,
    services: BTreeMap<String, ServiceInfo>,
}

/// Liveness probe, also answered during deploys before services settle.
pub(super) async fn health() -> Json<Value> {
    trace!("health check requested");
    Json(json!({
        "status": "ok",
        "service": "card-compare-webhook"
    }))
}

/// Per-service status rollup plus queue depth and pool occupancy.
pub(super) async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let mut services = BTreeMap::new();
    for (name, svc_status) in state.service_statuses.all() {
        services.insert(
            name.clone(),
            ServiceInfo {
                name,
                status: svc_status,
            },
        );
    }

    let overall = if services
        .values()
        .any(|s| matches!(s.status, ServiceStatus::Error))
    {
        ServiceStatus::Error
    } else if services
        .values()
        .any(|s| matches!(s.status, ServiceStatus::Starting))
    {
        ServiceStatus::Starting
    } else if services.is_empty() {
        ServiceStatus::Disabled
    } else {
        ServiceStatus::Active
    };

    let reachable = health::ping(&state.db_pool).await.is_ok();
    let pool = health::pool_stats(&state.db_pool);

    Json(StatusResponse {
        status: overall,
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("GIT_COMMIT_HASH").to_string(),
        queue_pending: state.queue.pending(),
        database: DatabaseInfo {
            reachable,
            pool_size: pool.size,
            pool_idle: pool.idle,
        },
        services,
    })
}
