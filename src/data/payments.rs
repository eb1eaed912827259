//! Payment rows backing the top-up flow.
//!
//! A payment is created as `NEW` before the provider is contacted, moves to
//! `PENDING` once an invoice exists, and lands in `SUCCESS` / `FAILED` /
//! `CANCELED` from the webhook or the provider error path.

use anyhow::Result;
use sqlx::PgPool;

use crate::data::models::{Payment, PaymentStatus, ProductOption};

const PAYMENT_COLUMNS: &str =
    "id, user_id, total_price, option, status, external_invoice_id, confirmation_url, created_at, updated_at";

pub async fn create(
    pool: &PgPool,
    user_id: i64,
    total_price: i32,
    option: ProductOption,
) -> Result<Payment> {
    let payment = sqlx::query_as::<_, Payment>(&format!(
        "INSERT INTO payments (user_id, total_price, option)
         VALUES ($1, $2, $3)
         RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(user_id)
    .bind(total_price)
    .bind(option)
    .fetch_one(pool)
    .await?;
    Ok(payment)
}

/// Look up a payment by the order id echoed back in provider metadata.
pub async fn get_by_external_id(pool: &PgPool, external_id: &str) -> Result<Option<Payment>> {
    let payment = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE external_invoice_id = $1"
    ))
    .bind(external_id)
    .fetch_optional(pool)
    .await?;
    Ok(payment)
}

/// Attach provider invoice data and move the payment to `PENDING`.
pub async fn record_invoice(
    pool: &PgPool,
    payment_id: i64,
    external_invoice_id: &str,
    confirmation_url: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE payments
         SET external_invoice_id = $2, confirmation_url = $3, status = 'PENDING', updated_at = now()
         WHERE id = $1",
    )
    .bind(payment_id)
    .bind(external_invoice_id)
    .bind(confirmation_url)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_status(pool: &PgPool, payment_id: i64, status: PaymentStatus) -> Result<bool> {
    let result = sqlx::query("UPDATE payments SET status = $2, updated_at = now() WHERE id = $1")
        .bind(payment_id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
