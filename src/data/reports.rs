//! Report rows tracking each comparison request through the queue.

use anyhow::Result;
use sqlx::PgPool;

use crate::data::models::{Report, ReportState};

const REPORT_COLUMNS: &str = "id, user_id, articles, state, created_at, updated_at";

pub async fn create(pool: &PgPool, user_id: i64, articles: &[i64]) -> Result<Report> {
    let report = sqlx::query_as::<_, Report>(&format!(
        "INSERT INTO reports (user_id, articles)
         VALUES ($1, $2)
         RETURNING {REPORT_COLUMNS}"
    ))
    .bind(user_id)
    .bind(articles)
    .fetch_one(pool)
    .await?;
    Ok(report)
}

pub async fn set_state(pool: &PgPool, report_id: i64, state: ReportState) -> Result<()> {
    sqlx::query("UPDATE reports SET state = $2, updated_at = now() WHERE id = $1")
        .bind(report_id)
        .bind(state)
        .execute(pool)
        .await?;
    Ok(())
}
