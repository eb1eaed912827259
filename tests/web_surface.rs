//! HTTP surface tests: the health and status probes plus the YooKassa
//! webhook contract. YooKassa retries any non-200 response for hours, so
//! every notification shape, including garbage, must come back 200.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use cardcompare::web::create_router;

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    let router = create_router(helpers::test_state());
    let response = router.oneshot(request).await.expect("router response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    let body = serde_json::from_slice(&bytes).expect("json body");
    (status, body)
}

async fn get(path: &str) -> (StatusCode, Value) {
    send(
        Request::builder()
            .uri(path)
            .body(Body::empty())
            .expect("request"),
    )
    .await
}

async fn notify(payload: String) -> (StatusCode, Value) {
    send(
        Request::builder()
            .method("POST")
            .uri("/api/payment/yookassa")
            .header("content-type", "application/json")
            .body(Body::from(payload))
            .expect("request"),
    )
    .await
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "card-compare-webhook");
}

#[tokio::test]
async fn status_survives_unreachable_database() {
    let (status, body) = get("/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["queue_pending"], 0);
    assert_eq!(body["database"]["reachable"], false);
    // Nothing has registered a service status, so the rollup is "disabled".
    assert_eq!(body["status"], "disabled");
}

#[tokio::test]
async fn webhook_answers_200_to_malformed_json() {
    let (status, body) = notify("not json at all".to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn webhook_flags_missing_order_id() {
    let payload = json!({
        "event": "payment.succeeded",
        "object": {}
    });
    let (status, body) = notify(payload.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "missing_order_id");
}

#[tokio::test]
async fn webhook_flags_missing_user_id() {
    let payload = json!({
        "event": "payment.succeeded",
        "object": {
            "metadata": { "order_id": "01K37TXH8GJ4M0000000000000" }
        }
    });
    let (status, body) = notify(payload.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "missing_user_id");
}

#[tokio::test]
async fn webhook_flags_unparseable_user_id() {
    let payload = json!({
        "event": "payment.succeeded",
        "object": {
            "metadata": {
                "order_id": "01K37TXH8GJ4M0000000000000",
                "user_id": "not-a-number"
            }
        }
    });
    let (status, body) = notify(payload.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "invalid_user_id");
}

#[tokio::test]
async fn webhook_flags_cancellation_without_order_id() {
    let payload = json!({
        "event": "payment.canceled",
        "object": {}
    });
    let (status, body) = notify(payload.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "missing_order_id");
}

#[tokio::test]
async fn webhook_acknowledges_unknown_events() {
    let payload = json!({
        "event": "refund.succeeded",
        "object": {
            "metadata": {
                "order_id": "01K37TXH8GJ4M0000000000000",
                "user_id": "42"
            }
        }
    });
    let (status, body) = notify(payload.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["error"].is_null());
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let router = create_router(helpers::test_state());
    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/nope")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
