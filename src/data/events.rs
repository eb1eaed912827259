//! User activity events for audience segmentation.

use anyhow::Result;
use sqlx::PgPool;

use crate::data::models::EventType;
use crate::data::users;

/// Record an event and bump the user's last-active timestamp.
pub async fn create(pool: &PgPool, user_id: i64, event_type: EventType) -> Result<()> {
    sqlx::query("INSERT INTO events (user_id, event_type) VALUES ($1, $2)")
        .bind(user_id)
        .bind(event_type.as_str())
        .execute(pool)
        .await?;
    users::touch_last_active(pool, user_id).await?;
    Ok(())
}
