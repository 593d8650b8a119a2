use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

use crate::model::clock_action::ClockAction;

/// Append-only log of clock attempts rejected by the network check.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct FailedClockAttempt {
    pub id: u64,
    pub user_id: u64,
    pub username: String,
    pub location_id: u64,
    pub location_code: String,
    pub action: String,
    pub ip_address: String,
    #[schema(value_type = String, format = "date-time")]
    pub attempted_at: DateTime<Utc>,
}

pub async fn record(
    pool: &MySqlPool,
    user_id: u64,
    location_id: u64,
    action: ClockAction,
    ip_address: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO failed_clock_attempts (user_id, location_id, action, ip_address, attempted_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(location_id)
    .bind(action.as_ref())
    .bind(ip_address)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list(
    pool: &MySqlPool,
    limit: u32,
    offset: u64,
) -> Result<Vec<FailedClockAttempt>, sqlx::Error> {
    sqlx::query_as::<_, FailedClockAttempt>(
        r#"
        SELECT f.id, f.user_id, u.username, f.location_id, l.code AS location_code,
               f.action, f.ip_address, f.attempted_at
        FROM failed_clock_attempts f
        JOIN users u ON u.id = f.user_id
        JOIN locations l ON l.id = f.location_id
        ORDER BY f.attempted_at DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(pool)
    .await
}

pub async fn count(pool: &MySqlPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM failed_clock_attempts")
        .fetch_one(pool)
        .await
}
