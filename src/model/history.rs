use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::MySqlConnection;
use strum_macros::AsRefStr;
use utoipa::ToSchema;

use crate::model::time_entry::TimeEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ChangeKind {
    CheckedIn,
    CheckedOut,
    ManualCreated,
    Edited,
    Closed,
}

/// One version of a time entry, written after every change to it.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct TimeEntryHistory {
    pub id: u64,
    pub entry_id: u64,
    pub change_kind: String,
    #[schema(value_type = String, format = "date-time")]
    pub changed_at: DateTime<Utc>,
    pub changed_by: Option<u64>,
    pub location_id: u64,
    #[schema(value_type = String, format = "date-time")]
    pub check_in: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out: Option<DateTime<Utc>>,
    pub check_in_ip: String,
    pub check_out_ip: Option<String>,
    pub is_manual: bool,
    pub notes: String,
}

pub async fn record_version(
    conn: &mut MySqlConnection,
    entry: &TimeEntry,
    kind: ChangeKind,
    changed_by: Option<u64>,
    changed_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO time_entry_history
            (entry_id, change_kind, changed_at, changed_by, location_id,
             check_in, check_out, check_in_ip, check_out_ip, is_manual, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.id)
    .bind(kind.as_ref())
    .bind(changed_at)
    .bind(changed_by)
    .bind(entry.location_id)
    .bind(entry.check_in)
    .bind(entry.check_out)
    .bind(&entry.check_in_ip)
    .bind(&entry.check_out_ip)
    .bind(entry.is_manual)
    .bind(&entry.notes)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn list_for_entry(
    conn: &mut MySqlConnection,
    entry_id: u64,
) -> Result<Vec<TimeEntryHistory>, sqlx::Error> {
    sqlx::query_as::<_, TimeEntryHistory>(
        r#"
        SELECT id, entry_id, change_kind, changed_at, changed_by, location_id,
               check_in, check_out, check_in_ip, check_out_ip, is_manual, notes
        FROM time_entry_history
        WHERE entry_id = ?
        ORDER BY changed_at DESC, id DESC
        "#,
    )
    .bind(entry_id)
    .fetch_all(&mut *conn)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_kinds_are_snake_case() {
        assert_eq!(ChangeKind::CheckedIn.as_ref(), "checked_in");
        assert_eq!(ChangeKind::ManualCreated.as_ref(), "manual_created");
        assert_eq!(ChangeKind::Closed.as_ref(), "closed");
    }
}
