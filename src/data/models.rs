//! Database models and enums shared across the data layer.

use chrono::{DateTime, Utc};

/// Balance top-up products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "product_option", rename_all = "UPPERCASE")]
pub enum ProductOption {
    /// One report.
    Single,
    /// A bundle of reports at a discount.
    Packet,
}

impl ProductOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductOption::Single => "SINGLE",
            ProductOption::Packet => "PACKET",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    New,
    Pending,
    Success,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "report_state", rename_all = "UPPERCASE")]
pub enum ReportState {
    New,
    Processing,
    Done,
    Failed,
}

/// User activity events, stored as plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    PayForOption,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PayForOption => "PAY_FOR_OPTION",
        }
    }
}

/// A bot user. `id` is the Telegram user id.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub reports_balance: i32,
    pub created_at: DateTime<Utc>,
    pub last_active_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Price {
    pub option: ProductOption,
    /// Price in whole rubles.
    pub price: i32,
    /// Reports credited when the payment succeeds.
    pub reports_amount: i32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    pub total_price: i32,
    pub option: ProductOption,
    pub status: PaymentStatus,
    /// Order id round-tripped through the provider's metadata.
    pub external_invoice_id: Option<String>,
    pub confirmation_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Report {
    pub id: i64,
    pub user_id: i64,
    pub articles: Vec<i64>,
    pub state: ReportState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
