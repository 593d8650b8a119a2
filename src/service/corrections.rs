//! Administrative changes to time entries. Every change marks the entry as
//! manual, records who made it and writes a history version.

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Deserialize;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::ToSchema;

use crate::error::ClockError;
use crate::model::history::{ChangeKind, record_version};
use crate::model::location::Location;
use crate::model::time_entry::{IP_ADMIN, TimeEntry};
use crate::service::attendance::{already_open, ensure_can_check_in, lock_employee, now};
use crate::utils::db_utils::is_duplicate_key;
use crate::utils::time_utils::end_of_local_day;

pub const MIN_NOTE_CHARS: usize = 10;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ManualEntry {
    #[schema(example = 3)]
    pub user_id: u64,
    #[schema(example = 1)]
    pub location_id: u64,
    #[schema(value_type = String, format = "date-time", example = "2026-03-02T08:00:00Z")]
    pub check_in: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time", example = "2026-03-02T16:00:00Z")]
    pub check_out: Option<DateTime<Utc>>,
    #[schema(example = "Badge reader was down, times confirmed by manager")]
    pub notes: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EntryEdit {
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out: Option<DateTime<Utc>>,
    pub location_id: Option<u64>,
    /// Replaces the entry's notes; must explain the change
    #[schema(example = "Employee forgot to clock out, left at 17:00")]
    pub notes: String,
}

/// Which open entries a bulk close applies to.
#[derive(Debug, Clone)]
pub enum CloseTarget {
    /// Open entries whose check-in is before this instant
    StartedBefore(DateTime<Utc>),
    Ids(Vec<u64>),
}

pub fn validate_note(notes: &str) -> Result<String, ClockError> {
    let notes = notes.trim();
    if notes.chars().count() < MIN_NOTE_CHARS {
        return Err(ClockError::NotesRequired);
    }
    Ok(notes.to_string())
}

pub fn validate_times(
    check_in: DateTime<Utc>,
    check_out: Option<DateTime<Utc>>,
) -> Result<(), ClockError> {
    match check_out {
        Some(out) if out < check_in => Err(ClockError::Validation(
            "Check-out cannot be earlier than check-in".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Adds a `[Closed by admin dd/mm/YYYY HH:MM]` line to existing notes.
pub fn append_close_note<Tz: TimeZone>(notes: &str, closed_at: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let stamp = format!("[Closed by admin {}]", closed_at.format("%d/%m/%Y %H:%M"));
    let notes = notes.trim_end();
    if notes.is_empty() {
        stamp
    } else {
        format!("{notes}\n{stamp}")
    }
}

async fn require_location(conn: &mut MySqlConnection, id: u64) -> Result<Location, ClockError> {
    Location::find_by_id(conn, id)
        .await?
        .ok_or(ClockError::NotFound("Location"))
}

pub async fn create_manual(
    pool: &MySqlPool,
    admin_id: u64,
    input: ManualEntry,
) -> Result<TimeEntry, ClockError> {
    let notes = validate_note(&input.notes)?;
    validate_times(input.check_in, input.check_out)?;

    let mut tx = pool.begin().await?;
    lock_employee(&mut tx, input.user_id).await?;
    require_location(&mut tx, input.location_id).await?;

    if input.check_out.is_none() {
        let open = TimeEntry::find_open_for_user(&mut tx, input.user_id).await?;
        ensure_can_check_in(open.as_ref())?;
    }

    let now = now();
    let inserted = sqlx::query(
        r#"
        INSERT INTO time_entries
            (user_id, location_id, check_in, check_out, check_in_ip, check_out_ip,
             is_manual, notes, created_at, modified_at, modified_by)
        VALUES (?, ?, ?, ?, ?, ?, TRUE, ?, ?, ?, ?)
        "#,
    )
    .bind(input.user_id)
    .bind(input.location_id)
    .bind(input.check_in)
    .bind(input.check_out)
    .bind(IP_ADMIN)
    .bind(input.check_out.map(|_| IP_ADMIN))
    .bind(&notes)
    .bind(now)
    .bind(now)
    .bind(admin_id)
    .execute(&mut *tx)
    .await;

    let entry_id = match inserted {
        Ok(result) => result.last_insert_id(),
        Err(e) if is_duplicate_key(&e) => {
            drop(tx);
            return Err(already_open(pool, input.user_id, input.check_in).await);
        }
        Err(e) => return Err(e.into()),
    };

    let entry = TimeEntry::find(&mut tx, entry_id)
        .await?
        .ok_or(ClockError::NotFound("Time entry"))?;
    record_version(&mut tx, &entry, ChangeKind::ManualCreated, Some(admin_id), now).await?;
    tx.commit().await?;

    info!(admin_id, entry_id, user_id = entry.user_id, "Manual entry created");
    Ok(entry)
}

pub async fn edit_entry(
    pool: &MySqlPool,
    admin_id: u64,
    entry_id: u64,
    edit: EntryEdit,
) -> Result<TimeEntry, ClockError> {
    let notes = validate_note(&edit.notes)?;

    let mut tx = pool.begin().await?;
    let mut entry = TimeEntry::find_for_update(&mut tx, entry_id)
        .await?
        .ok_or(ClockError::NotFound("Time entry"))?;

    if let Some(location_id) = edit.location_id {
        require_location(&mut tx, location_id).await?;
        entry.location_id = location_id;
    }
    if let Some(check_in) = edit.check_in {
        entry.check_in = check_in;
    }
    if let Some(check_out) = edit.check_out {
        if entry.check_out.is_none() {
            entry.check_out_ip = Some(IP_ADMIN.to_string());
        }
        entry.check_out = Some(check_out);
    }
    validate_times(entry.check_in, entry.check_out)?;

    let now = now();
    entry.notes = notes;
    entry.is_manual = true;
    entry.modified_by = Some(admin_id);
    entry.modified_at = now;

    sqlx::query(
        r#"
        UPDATE time_entries
        SET location_id = ?, check_in = ?, check_out = ?, check_out_ip = ?,
            is_manual = TRUE, notes = ?, modified_at = ?, modified_by = ?
        WHERE id = ?
        "#,
    )
    .bind(entry.location_id)
    .bind(entry.check_in)
    .bind(entry.check_out)
    .bind(&entry.check_out_ip)
    .bind(&entry.notes)
    .bind(now)
    .bind(admin_id)
    .bind(entry.id)
    .execute(&mut *tx)
    .await?;

    record_version(&mut tx, &entry, ChangeKind::Edited, Some(admin_id), now).await?;
    tx.commit().await?;

    info!(admin_id, entry_id, "Entry edited");
    Ok(entry)
}

/// Closes each targeted open entry at the end of its local check-in day.
/// Returns the number of entries closed.
pub async fn close_open_entries(
    pool: &MySqlPool,
    admin_id: u64,
    target: CloseTarget,
    ip_marker: &str,
) -> Result<u64, ClockError> {
    let mut tx = pool.begin().await?;

    let entries = match &target {
        CloseTarget::StartedBefore(before) => {
            sqlx::query_as::<_, TimeEntry>(&format!(
                "SELECT {} FROM time_entries e \
                 WHERE e.check_out IS NULL AND e.check_in < ? FOR UPDATE",
                crate::model::time_entry::ENTRY_COLUMNS
            ))
            .bind(*before)
            .fetch_all(&mut *tx)
            .await?
        }
        CloseTarget::Ids(ids) if ids.is_empty() => Vec::new(),
        CloseTarget::Ids(ids) => {
            let mut qb = sqlx::QueryBuilder::<sqlx::MySql>::new(format!(
                "SELECT {} FROM time_entries e WHERE e.check_out IS NULL AND e.id IN (",
                crate::model::time_entry::ENTRY_COLUMNS
            ));
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(") FOR UPDATE");
            qb.build_query_as::<TimeEntry>().fetch_all(&mut *tx).await?
        }
    };

    let now = now();
    let mut closed = 0u64;
    for mut entry in entries {
        entry.check_out = Some(end_of_local_day(&Local, entry.check_in));
        entry.check_out_ip = Some(ip_marker.to_string());
        entry.is_manual = true;
        entry.notes = append_close_note(&entry.notes, now.with_timezone(&Local));
        entry.modified_by = Some(admin_id);
        entry.modified_at = now;

        sqlx::query(
            r#"
            UPDATE time_entries
            SET check_out = ?, check_out_ip = ?, is_manual = TRUE, notes = ?,
                modified_at = ?, modified_by = ?
            WHERE id = ?
            "#,
        )
        .bind(entry.check_out)
        .bind(&entry.check_out_ip)
        .bind(&entry.notes)
        .bind(now)
        .bind(admin_id)
        .bind(entry.id)
        .execute(&mut *tx)
        .await?;

        record_version(&mut tx, &entry, ChangeKind::Closed, Some(admin_id), now).await?;
        closed += 1;
    }

    tx.commit().await?;

    info!(admin_id, closed, marker = ip_marker, "Closed open entries");
    Ok(closed)
}
