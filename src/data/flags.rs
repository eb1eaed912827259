//! Feature flags stored in the database.
//!
//! Flags are read per use rather than cached so flipping a row takes effect
//! on the next task without a restart.

use sqlx::PgPool;
use tracing::{debug, warn};

/// Route report generation through the mock path (no browser).
pub const FLAG_WB_USE_MOCK: &str = "IS_WB_USE_MOCK";
/// Replace the comparison flow with a single table click.
pub const FLAG_COMPARE_CARDS_MOCK: &str = "IS_COMPARE_CARDS_MOCK";

/// Read a flag, falling back to `default` when missing or unreadable.
pub async fn get_feature_flag(pool: &PgPool, name: &str, default: bool) -> bool {
    let lookup = sqlx::query_scalar::<_, bool>("SELECT enabled FROM feature_flags WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await;
    match lookup {
        Ok(Some(enabled)) => {
            debug!(flag = name, enabled, "feature flag read");
            enabled
        }
        Ok(None) => {
            debug!(flag = name, default, "feature flag missing, using default");
            default
        }
        Err(e) => {
            warn!(flag = name, error = ?e, default, "feature flag lookup failed, using default");
            default
        }
    }
}

pub async fn wb_use_mock(pool: &PgPool) -> bool {
    get_feature_flag(pool, FLAG_WB_USE_MOCK, true).await
}

pub async fn compare_cards_mock(pool: &PgPool) -> bool {
    get_feature_flag(pool, FLAG_COMPARE_CARDS_MOCK, true).await
}
