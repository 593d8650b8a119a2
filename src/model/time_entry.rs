use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::MySqlConnection;
use utoipa::ToSchema;

use crate::model::user::display_name;

/// Minutes above which a closed entry is flagged as overtime.
pub const OVERTIME_MINUTES: i64 = 8 * 60;

/// IP markers stored in place of a source address for admin-made changes.
pub const IP_ADMIN: &str = "ADMIN";
pub const IP_ADMIN_CLOSED: &str = "ADMIN_CLOSED";
pub const IP_AUTO_CLOSED: &str = "AUTO_CLOSED";

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct TimeEntry {
    pub id: u64,
    pub user_id: u64,
    pub location_id: u64,
    #[schema(value_type = String, format = "date-time")]
    pub check_in: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out: Option<DateTime<Utc>>,
    pub check_in_ip: String,
    pub check_out_ip: Option<String>,
    pub is_manual: bool,
    pub notes: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub modified_at: DateTime<Utc>,
    pub modified_by: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryBadge {
    Manual,
    Open,
    Overtime,
    Ok,
}

impl TimeEntry {
    pub fn is_open(&self) -> bool {
        self.check_out.is_none()
    }

    /// Whole minutes worked, `None` while the entry is still open.
    pub fn duration_minutes(&self) -> Option<i64> {
        self.check_out
            .map(|out| (out - self.check_in).num_seconds().div_euclid(60))
    }

    pub fn duration_display(&self) -> String {
        format_duration(self.duration_minutes())
    }

    pub fn is_overtime(&self) -> bool {
        self.duration_minutes()
            .is_some_and(|minutes| minutes > OVERTIME_MINUTES)
    }

    pub fn badge(&self) -> EntryBadge {
        if self.is_manual {
            EntryBadge::Manual
        } else if self.is_open() {
            EntryBadge::Open
        } else if self.is_overtime() {
            EntryBadge::Overtime
        } else {
            EntryBadge::Ok
        }
    }
}

/// `90 -> "1h 30m"`, `5 -> "0h 05m"`, open entries read "In progress".
pub fn format_duration(minutes: Option<i64>) -> String {
    match minutes {
        Some(minutes) => format!("{}h {:02}m", minutes / 60, minutes % 60),
        None => "In progress".to_string(),
    }
}

pub const ENTRY_COLUMNS: &str = "e.id, e.user_id, e.location_id, e.check_in, e.check_out, \
     e.check_in_ip, e.check_out_ip, e.is_manual, e.notes, e.created_at, e.modified_at, e.modified_by";

/// Entry joined with the employee and location it belongs to.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct TimeEntryDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub entry: TimeEntry,
    pub username: String,
    pub full_name: String,
    pub location_name: String,
}

impl TimeEntryDetail {
    pub fn employee_name(&self) -> &str {
        display_name(&self.full_name, &self.username)
    }
}

/// Join behind every detail query, aliased `e`, `u` and `l`.
pub const DETAIL_FROM: &str = "FROM time_entries e \
     JOIN users u ON u.id = e.user_id \
     JOIN locations l ON l.id = e.location_id";

/// `SELECT` prefix for [`TimeEntryDetail`] rows; callers append `WHERE`/`ORDER BY`.
pub fn detail_select() -> String {
    format!("SELECT {ENTRY_COLUMNS}, u.username, u.full_name, l.name AS location_name {DETAIL_FROM}")
}

/// JSON shape for entry listings: the row plus derived duration and status.
#[derive(Debug, Serialize, ToSchema)]
pub struct EntryView {
    #[serde(flatten)]
    pub detail: TimeEntryDetail,
    pub employee: String,
    pub duration_minutes: Option<i64>,
    pub duration: String,
    pub badge: EntryBadge,
}

impl From<TimeEntryDetail> for EntryView {
    fn from(detail: TimeEntryDetail) -> Self {
        EntryView {
            employee: detail.employee_name().to_string(),
            duration_minutes: detail.entry.duration_minutes(),
            duration: detail.entry.duration_display(),
            badge: detail.entry.badge(),
            detail,
        }
    }
}

impl TimeEntry {
    pub async fn find(conn: &mut MySqlConnection, id: u64) -> Result<Option<TimeEntry>, sqlx::Error> {
        sqlx::query_as::<_, TimeEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM time_entries e WHERE e.id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Row-locking variant for read-modify-write inside a transaction.
    pub async fn find_for_update(
        conn: &mut MySqlConnection,
        id: u64,
    ) -> Result<Option<TimeEntry>, sqlx::Error> {
        sqlx::query_as::<_, TimeEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM time_entries e WHERE e.id = ? FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    pub async fn find_open_for_user(
        conn: &mut MySqlConnection,
        user_id: u64,
    ) -> Result<Option<TimeEntry>, sqlx::Error> {
        sqlx::query_as::<_, TimeEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM time_entries e \
             WHERE e.user_id = ? AND e.check_out IS NULL \
             ORDER BY e.check_in DESC LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
    }
}

#[cfg(test)]
pub(crate) fn sample_entry(minutes: Option<i64>) -> TimeEntry {
    use chrono::{Duration, TimeZone};

    let check_in = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
    TimeEntry {
        id: 7,
        user_id: 3,
        location_id: 1,
        check_in,
        check_out: minutes.map(|m| check_in + Duration::minutes(m)),
        check_in_ip: "192.168.1.50".to_string(),
        check_out_ip: minutes.map(|_| "192.168.1.50".to_string()),
        is_manual: false,
        notes: String::new(),
        created_at: check_in,
        modified_at: check_in,
        modified_by: None,
    }
}
