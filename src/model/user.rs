use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, sqlx::FromRow)]
pub struct User {
    pub id: u64, // BIGINT UNSIGNED
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub role_id: u8,
    pub is_active: bool,
}

/// Returns the full name, falling back to the username when it is blank.
pub fn display_name<'a>(full_name: &'a str, username: &'a str) -> &'a str {
    let trimmed = full_name.trim();
    if trimmed.is_empty() { username } else { trimmed }
}

impl User {
    pub fn display_name(&self) -> &str {
        display_name(&self.full_name, &self.username)
    }
}

/// Row for the admin user list, `present` is true while the user has an open entry.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct UserPresence {
    pub id: u64,
    pub username: String,
    pub full_name: String,
    pub role_id: u8,
    pub is_active: bool,
    pub present: bool,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_login_at: Option<DateTime<Utc>>,
}
