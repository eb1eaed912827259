//! Payment orchestration: invoice creation and webhook-driven settlement.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::bot::loading::{delete_loading_sticker, send_loading_sticker};
use crate::data::models::{Payment, PaymentStatus, ProductOption};
use crate::data::{payments, prices, users};
use crate::payment::cache::{INVOICE_TTL, InvoiceCache};
use crate::payment::yookassa::YookassaClient;
use crate::telegram::TelegramClient;

pub struct PaymentService {
    db: PgPool,
    yookassa: YookassaClient,
    telegram: Arc<TelegramClient>,
    cache: InvoiceCache,
}

enum Credit {
    AlreadyDone,
    Failed,
    Credited { reports_amount: i32, new_balance: i32 },
}

impl PaymentService {
    pub fn new(db: PgPool, yookassa: YookassaClient, telegram: Arc<TelegramClient>) -> Self {
        Self {
            db,
            yookassa,
            telegram,
            cache: InvoiceCache::new(),
        }
    }

    pub fn cache(&self) -> &InvoiceCache {
        &self.cache
    }

    /// Create (or reuse) a confirmation link for the given product.
    pub async fn generate_payment_link(
        &self,
        user_id: i64,
        option: ProductOption,
    ) -> Result<String> {
        if let Some(cached) = self.cache.get(user_id, option) {
            info!(
                user_id,
                option = option.as_str(),
                external_invoice_id = %cached.external_invoice_id,
                "reusing cached invoice"
            );
            return Ok(cached.confirmation_url);
        }

        let price = prices::get_by_option(&self.db, option)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No price configured for {}", option.as_str()))?;

        let order_id = Ulid::new().to_string();

        // DB row first so a fast webhook always finds something to settle.
        let payment = payments::create(&self.db, user_id, price.price, option)
            .await
            .context("Failed to create payment row")?;

        let description = format!("Пополнение баланса: {} отчет(ов)", price.reports_amount);
        let created = self
            .yookassa
            .create_payment(price.price, &order_id, user_id, &description)
            .await
            .and_then(|resp| {
                resp.confirmation
                    .and_then(|c| c.confirmation_url)
                    .ok_or_else(|| anyhow::anyhow!("No confirmation_url in YooKassa response"))
            });

        let confirmation_url = match created {
            Ok(url) => url,
            Err(e) => {
                if let Err(mark_err) =
                    payments::set_status(&self.db, payment.id, PaymentStatus::Failed).await
                {
                    warn!(payment_id = payment.id, error = ?mark_err, "failed to mark payment as failed");
                }
                return Err(e.context("Failed to create YooKassa invoice"));
            }
        };

        match payments::record_invoice(&self.db, payment.id, &order_id, &confirmation_url).await {
            Ok(true) => {}
            Ok(false) => warn!(payment_id = payment.id, "payment row missing while recording invoice"),
            Err(e) => {
                warn!(payment_id = payment.id, error = ?e, "failed to record invoice data, continuing")
            }
        }

        self.cache.set(
            user_id,
            option,
            order_id.clone(),
            confirmation_url.clone(),
            INVOICE_TTL,
        );

        info!(user_id, payment_id = payment.id, order_id = %order_id, "payment link generated");
        Ok(confirmation_url)
    }

    /// Settle a payment reported as succeeded. Idempotent: a duplicate
    /// webhook for an already-settled payment returns `true` without
    /// crediting twice.
    pub async fn complete_payment(&self, external_invoice_id: &str) -> Result<bool> {
        let Some(payment) = payments::get_by_external_id(&self.db, external_invoice_id).await?
        else {
            error!(external_invoice_id, "payment not found for completion");
            return Ok(false);
        };
        info!(
            payment_id = payment.id,
            user_id = payment.user_id,
            status = ?payment.status,
            option = payment.option.as_str(),
            "completing payment"
        );

        let loading_message_id = send_loading_sticker(&self.telegram, payment.user_id).await;
        let outcome = self.credit(&payment).await;
        delete_loading_sticker(&self.telegram, payment.user_id, loading_message_id).await;

        match outcome? {
            Credit::AlreadyDone => Ok(true),
            Credit::Failed => Ok(false),
            Credit::Credited {
                reports_amount,
                new_balance,
            } => {
                let text = format!(
                    "✅ <b>Платеж успешно выполнен!</b>\n\n\
                     Зачислено отчетов: <b>{reports_amount}</b>\n\
                     Текущий баланс: <b>{new_balance}</b> отчетов\n\n\
                     Спасибо за покупку! 💚"
                );
                if let Err(e) = self
                    .telegram
                    .send_message(payment.user_id, &text, None)
                    .await
                {
                    // The balance is already credited at this point.
                    error!(user_id = payment.user_id, error = ?e, "failed to notify user about completed payment");
                }
                self.cache.invalidate(payment.user_id, payment.option);
                info!(
                    payment_id = payment.id,
                    user_id = payment.user_id,
                    reports_added = reports_amount,
                    "payment completed"
                );
                Ok(true)
            }
        }
    }

    async fn credit(&self, payment: &Payment) -> Result<Credit> {
        let Some(price) = prices::get_by_option(&self.db, payment.option).await? else {
            error!(option = payment.option.as_str(), "no price configured for paid option");
            return Ok(Credit::Failed);
        };

        if payment.status == PaymentStatus::Success {
            warn!(
                payment_id = payment.id,
                "payment already processed, skipping duplicate webhook"
            );
            return Ok(Credit::AlreadyDone);
        }

        if !payments::set_status(&self.db, payment.id, PaymentStatus::Success).await? {
            error!(payment_id = payment.id, "failed to mark payment successful");
            return Ok(Credit::Failed);
        }

        let new_balance =
            users::adjust_balance(&self.db, payment.user_id, price.reports_amount).await?;
        Ok(Credit::Credited {
            reports_amount: price.reports_amount,
            new_balance,
        })
    }

    /// Mark a payment canceled. Succeeded payments cannot be canceled.
    pub async fn cancel_payment(&self, external_invoice_id: &str) -> Result<bool> {
        let Some(payment) = payments::get_by_external_id(&self.db, external_invoice_id).await?
        else {
            error!(external_invoice_id, "payment not found for cancellation");
            return Ok(false);
        };

        match payment.status {
            PaymentStatus::Canceled => {
                info!(payment_id = payment.id, "payment already canceled");
                return Ok(true);
            }
            PaymentStatus::Success => {
                warn!(
                    payment_id = payment.id,
                    "refusing to cancel a successful payment"
                );
                return Ok(false);
            }
            _ => {}
        }

        if !payments::set_status(&self.db, payment.id, PaymentStatus::Canceled).await? {
            error!(payment_id = payment.id, "failed to mark payment canceled");
            return Ok(false);
        }
        self.cache.invalidate(payment.user_id, payment.option);
        info!(payment_id = payment.id, user_id = payment.user_id, "payment canceled");
        Ok(true)
    }
}
