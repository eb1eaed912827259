//! YooKassa v3 payments client.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use ulid::Ulid;

use crate::json::parse_json;

const BASE_URL: &str = "https://api.yookassa.ru/v3";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Unpaid invoices stay valid this long before YooKassa expires them.
const INVOICE_LIFETIME_HOURS: i64 = 12;

/// The slice of a created payment this service cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct YookassaPayment {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub confirmation: Option<Confirmation>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Confirmation {
    #[serde(default)]
    pub confirmation_url: Option<String>,
}

pub struct YookassaClient {
    http: reqwest::Client,
    shop_id: String,
    secret_key: String,
    return_url: String,
    receipt_email: String,
}

impl YookassaClient {
    pub fn new(shop_id: String, secret_key: String, return_url: String, receipt_email: String) -> Self {
        let key_prefix: String = secret_key.chars().take(8).collect();
        info!(shop_id = %shop_id, key = format!("{key_prefix}..."), "YooKassa client initialized");
        Self {
            http: reqwest::Client::new(),
            shop_id,
            secret_key,
            return_url,
            receipt_email,
        }
    }

    /// Create a redirect payment. Succeeds only when YooKassa reports the
    /// fresh payment as `pending`; anything else is an error.
    #[tracing::instrument(skip_all, fields(order_id = order_id, user_id = user_id))]
    pub async fn create_payment(
        &self,
        amount_rub: i32,
        order_id: &str,
        user_id: i64,
        description: &str,
    ) -> Result<YookassaPayment> {
        let expires_at =
            (Utc::now() + chrono::Duration::hours(INVOICE_LIFETIME_HOURS)).to_rfc3339_opts(SecondsFormat::Millis, true);
        let amount = json!({
            "value": format!("{:.2}", amount_rub as f64),
            "currency": "RUB",
        });
        let body = json!({
            "amount": amount,
            "description": description,
            "locale": "ru_RU",
            "expires_at": expires_at,
            "metadata": {
                "order_id": order_id,
                "user_id": user_id.to_string(),
            },
            "confirmation": {
                "type": "redirect",
                "return_url": self.return_url,
            },
            "capture": true,
            "receipt": {
                "customer": { "email": self.receipt_email },
                "items": [{
                    "description": "Услуги ИП",
                    "amount": amount,
                    "vat_code": 1,
                    "quantity": 1,
                }],
            },
        });

        debug!(amount = amount_rub, "creating YooKassa payment");
        let resp = self
            .http
            .post(format!("{BASE_URL}/payments"))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", Ulid::new().to_string())
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("YooKassa create payment failed ({status}): {text}");
        }

        let payment: YookassaPayment =
            parse_json(&text).context("Failed to parse YooKassa payment response")?;
        if payment.status != "pending" {
            anyhow::bail!(
                "YooKassa returned payment in unexpected status '{}': {}",
                payment.status,
                payment.description.as_deref().unwrap_or("no description")
            );
        }

        info!(payment_id = %payment.id, "YooKassa payment created");
        Ok(payment)
    }
}
