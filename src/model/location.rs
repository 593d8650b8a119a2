use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{MySqlConnection, MySqlPool};
use utoipa::ToSchema;

/// A workplace where employees clock in. The `code` is what the printed QR carries.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "code": "LOCAL_01",
    "name": "Main Shop",
    "allowed_ips": ["85.123.45.67", "192.168.1.0/24"],
    "is_active": true,
    "created_at": "2026-01-01T08:00:00Z",
    "updated_at": "2026-01-01T08:00:00Z"
}))]
pub struct Location {
    pub id: u64,
    pub code: String,
    pub name: String,
    #[schema(value_type = Vec<String>)]
    pub allowed_ips: Json<Vec<String>>,
    pub is_active: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

const LOCATION_COLUMNS: &str = "id, code, name, allowed_ips, is_active, created_at, updated_at";

impl Location {
    pub async fn find_by_code(pool: &MySqlPool, code: &str) -> Result<Option<Location>, sqlx::Error> {
        sqlx::query_as::<_, Location>(&format!(
            "SELECT {LOCATION_COLUMNS} FROM locations WHERE code = ?"
        ))
        .bind(code)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_id(
        conn: &mut MySqlConnection,
        id: u64,
    ) -> Result<Option<Location>, sqlx::Error> {
        sqlx::query_as::<_, Location>(&format!(
            "SELECT {LOCATION_COLUMNS} FROM locations WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    pub async fn list(pool: &MySqlPool) -> Result<Vec<Location>, sqlx::Error> {
        sqlx::query_as::<_, Location>(&format!(
            "SELECT {LOCATION_COLUMNS} FROM locations ORDER BY code"
        ))
        .fetch_all(pool)
        .await
    }

    /// Short allow-list summary for list views: the first two entries plus a count of the rest.
    pub fn ips_summary(&self) -> String {
        let ips = &self.allowed_ips.0;
        if ips.is_empty() {
            return "Not configured".to_string();
        }

        let mut display = ips.iter().take(2).cloned().collect::<Vec<_>>().join(", ");
        if ips.len() > 2 {
            display.push_str(&format!(" (+{})", ips.len() - 2));
        }
        display
    }
}

#[cfg(test)]
pub(crate) fn sample_location(allowed_ips: &[&str]) -> Location {
    let now = Utc::now();
    Location {
        id: 1,
        code: "LOCAL_01".to_string(),
        name: "Main Shop".to_string(),
        allowed_ips: Json(allowed_ips.iter().map(|s| s.to_string()).collect()),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
