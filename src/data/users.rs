//! User accounts and the broadcast audience segments built over them.

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

use crate::data::models::User;

const USER_COLUMNS: &str = "id, username, reports_balance, created_at, last_active_at";

/// New users start with one free report.
const TRIAL_BALANCE: i32 = 1;

pub async fn get(pool: &PgPool, id: i64) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn create(pool: &PgPool, id: i64, username: Option<&str>) -> Result<User> {
    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (id, username, reports_balance)
         VALUES ($1, $2, $3)
         ON CONFLICT (id) DO UPDATE SET username = COALESCE(EXCLUDED.username, users.username)
         RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(username)
    .bind(TRIAL_BALANCE)
    .fetch_one(pool)
    .await?;
    Ok(user)
}

/// Fetch a user, creating the row (with the trial balance) on first contact.
pub async fn get_or_create(pool: &PgPool, id: i64, username: Option<&str>) -> Result<User> {
    if let Some(user) = get(pool, id).await? {
        return Ok(user);
    }
    let user = create(pool, id, username).await?;
    info!(user_id = id, "new user registered");
    Ok(user)
}

/// Current report balance; missing users read as zero.
pub async fn balance(pool: &PgPool, id: i64) -> Result<i32> {
    let balance = sqlx::query_scalar::<_, i32>("SELECT reports_balance FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(balance.unwrap_or(0))
}

/// Apply a balance delta, clamped at zero. Returns the new balance.
pub async fn adjust_balance(pool: &PgPool, id: i64, delta: i32) -> Result<i32> {
    let new_balance = sqlx::query_scalar::<_, i32>(
        "UPDATE users
         SET reports_balance = GREATEST(reports_balance + $2, 0)
         WHERE id = $1
         RETURNING reports_balance",
    )
    .bind(id)
    .bind(delta)
    .fetch_one(pool)
    .await?;
    info!(user_id = id, delta, new_balance, "balance adjusted");
    Ok(new_balance)
}

pub async fn touch_last_active(pool: &PgPool, id: i64) -> Result<()> {
    sqlx::query("UPDATE users SET last_active_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

// -- Broadcast audience segments --

/// Pressed /start but never generated a report or paid.
pub async fn segment_no_activity(pool: &PgPool) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM users
         WHERE id NOT IN (SELECT user_id FROM reports)
           AND id NOT IN (SELECT user_id FROM payments WHERE status = 'SUCCESS')
         ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Used the trial report exactly once and never paid.
pub async fn segment_used_trial(pool: &PgPool) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT user_id FROM reports
         GROUP BY user_id
         HAVING COUNT(*) = 1
         EXCEPT
         SELECT user_id FROM payments WHERE status = 'SUCCESS'
         ORDER BY user_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Bought exactly one single report and nothing since.
pub async fn segment_bought_single(pool: &PgPool) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT user_id FROM payments
         WHERE option = 'SINGLE' AND status = 'SUCCESS'
         GROUP BY user_id
         HAVING COUNT(*) = 1
         ORDER BY user_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(ids)
}
