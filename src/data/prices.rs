//! Product price lookups.

use anyhow::Result;
use sqlx::PgPool;

use crate::data::models::{Price, ProductOption};

pub async fn get_by_option(pool: &PgPool, option: ProductOption) -> Result<Option<Price>> {
    let price = sqlx::query_as::<_, Price>(
        "SELECT option, price, reports_amount FROM prices WHERE option = $1",
    )
    .bind(option)
    .fetch_optional(pool)
    .await?;
    Ok(price)
}
