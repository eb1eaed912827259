//! YooKassa payment notification endpoint.
//!
//! YooKassa keeps retrying any non-200 response for hours, so every outcome
//! here maps to 200 with a JSON body. Failures are flagged in an `error`
//! field for the delivery log and written to tracing.

use axum::extract::State;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::data::events;
use crate::data::models::EventType;
use crate::json::parse_json;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(default)]
    event: String,
    #[serde(default)]
    object: PaymentObject,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentObject {
    #[serde(default)]
    metadata: Metadata,
}

/// Metadata round-trips untouched from payment creation, so the order id
/// here is the ULID recorded on the payment row.
#[derive(Debug, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    user_id: Option<Value>,
}

fn ok() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn ok_with_error(error: impl AsRef<str>) -> Json<Value> {
    Json(json!({ "status": "ok", "error": error.as_ref() }))
}

/// `POST /api/payment/yookassa`
pub(super) async fn yookassa_notification(
    State(state): State<AppState>,
    body: String,
) -> Json<Value> {
    let notification: Notification = match parse_json(&body) {
        Ok(notification) => notification,
        Err(e) => {
            warn!(error = %e, "unparseable payment notification");
            return ok_with_error(e.to_string());
        }
    };

    match notification.event.as_str() {
        "payment.succeeded" => handle_succeeded(&state, notification.object).await,
        "payment.canceled" => handle_canceled(&state, notification.object).await,
        other => {
            info!(event = other, "ignoring payment notification event");
            ok()
        }
    }
}

async fn handle_succeeded(state: &AppState, object: PaymentObject) -> Json<Value> {
    let Some(order_id) = object.metadata.order_id else {
        warn!("payment.succeeded without an order id");
        return ok_with_error("missing_order_id");
    };
    let Some(raw_user_id) = object.metadata.user_id else {
        warn!(%order_id, "payment.succeeded without user id metadata");
        return ok_with_error("missing_user_id");
    };
    let Some(user_id) = parse_user_id(&raw_user_id) else {
        warn!(%order_id, raw = %raw_user_id, "payment.succeeded with malformed user id");
        return ok_with_error("invalid_user_id");
    };

    info!(%order_id, user_id, "payment succeeded notification");
    match state.payments.complete_payment(&order_id).await {
        Ok(credited) => {
            if credited {
                // The event row is bookkeeping; failing it must not make
                // YooKassa re-deliver an already-credited payment.
                if let Err(e) =
                    events::create(&state.db_pool, user_id, EventType::PayForOption).await
                {
                    warn!(user_id, error = %e, "failed to record payment event");
                }
            }
            ok()
        }
        Err(e) => {
            error!(%order_id, user_id, error = %e, "payment completion failed");
            ok_with_error(e.to_string())
        }
    }
}

async fn handle_canceled(state: &AppState, object: PaymentObject) -> Json<Value> {
    let Some(order_id) = object.metadata.order_id else {
        warn!("payment.canceled without an order id");
        return ok_with_error("missing_order_id");
    };
    info!(%order_id, "payment canceled notification");
    match state.payments.cancel_payment(&order_id).await {
        Ok(_) => ok(),
        Err(e) => {
            error!(%order_id, error = %e, "payment cancellation failed");
            ok_with_error(e.to_string())
        }
    }
}

/// Metadata values round-trip through YooKassa as strings, but a bare number
/// is accepted too.
fn parse_user_id(raw: &Value) -> Option<i64> {
    match raw {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_accepts_strings_and_numbers() {
        assert_eq!(parse_user_id(&json!("123456")), Some(123456));
        assert_eq!(parse_user_id(&json!(" 42 ")), Some(42));
        assert_eq!(parse_user_id(&json!(987)), Some(987));
    }

    #[test]
    fn user_id_rejects_other_shapes() {
        assert_eq!(parse_user_id(&json!("12x")), None);
        assert_eq!(parse_user_id(&json!(3.5)), None);
        assert_eq!(parse_user_id(&json!({"id": 1})), None);
        assert_eq!(parse_user_id(&json!(null)), None);
    }

    #[test]
    fn notification_tolerates_missing_fields() {
        let n: Notification = parse_json(r#"{"event": "payment.succeeded", "object": {}}"#)
            .expect("minimal notification should parse");
        assert_eq!(n.event, "payment.succeeded");
        assert!(n.object.metadata.order_id.is_none());
        assert!(n.object.metadata.user_id.is_none());
    }
}
