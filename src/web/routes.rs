//! Router construction for the webhook server.

use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tower_http::timeout::TimeoutLayer;

use crate::state::AppState;
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::{status, webhook};

/// Build the public router: a health probe, a status rollup, and the
/// YooKassa notification endpoint.
pub fn create_router(app_state: AppState) -> Router {
    let api_router = Router::new()
        .route("/status", get(status::status))
        .route("/payment/yookassa", post(webhook::yookassa_notification));

    Router::new()
        .route("/health", get(status::health))
        .nest("/api", api_router)
        .with_state(app_state)
        .layer((
            // Outermost: per-request ID span + severity-proportional response logging.
            RequestIdLayer,
            TimeoutLayer::new(Duration::from_secs(60)),
        ))
}
