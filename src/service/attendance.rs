//! Check-in / check-out state machine.
//!
//! An employee has at most one open entry (no check-out) at a time. Both
//! transitions run in a transaction that first locks the employee's `users`
//! row, so two concurrent requests from the same employee are serialised and
//! the second one sees the first one's result. The `uniq_one_open_entry`
//! index rejects a second open row even if a caller skips the lock.

use chrono::{DateTime, Local, SubsecRound, Utc};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;

use crate::error::ClockError;
use crate::model::history::{ChangeKind, record_version};
use crate::model::location::Location;
use crate::model::time_entry::TimeEntry;
use crate::utils::db_utils::is_duplicate_key;
use crate::utils::time_utils::local_hm;

/// Current time at the precision `DATETIME(6)` stores.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn ensure_can_check_in(open: Option<&TimeEntry>) -> Result<(), ClockError> {
    match open {
        Some(entry) => Err(ClockError::AlreadyOpen {
            since: local_hm(&Local, entry.check_in),
        }),
        None => Ok(()),
    }
}

pub fn ensure_open(open: Option<TimeEntry>) -> Result<TimeEntry, ClockError> {
    open.ok_or(ClockError::NoOpenEntry)
}

/// Disabled accounts may not clock, even while their session token is still valid.
pub fn ensure_active(is_active: bool) -> Result<(), ClockError> {
    if is_active {
        Ok(())
    } else {
        Err(ClockError::AccountDisabled)
    }
}

/// Takes the per-employee lock for the rest of the transaction and returns
/// the account's active flag.
pub async fn lock_employee(conn: &mut MySqlConnection, user_id: u64) -> Result<bool, ClockError> {
    sqlx::query_scalar::<_, bool>("SELECT is_active FROM users WHERE id = ? FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ClockError::NotFound("User"))
}

/// `AlreadyOpen` for a check-in that lost a race on the unique index; reads
/// the winner's check-in time with a fresh connection.
pub(crate) async fn already_open(pool: &MySqlPool, user_id: u64, fallback: DateTime<Utc>) -> ClockError {
    let open = match pool.acquire().await {
        Ok(mut conn) => TimeEntry::find_open_for_user(&mut conn, user_id).await.ok().flatten(),
        Err(_) => None,
    };

    ClockError::AlreadyOpen {
        since: local_hm(&Local, open.map_or(fallback, |entry| entry.check_in)),
    }
}

pub async fn check_in(
    pool: &MySqlPool,
    user_id: u64,
    location: &Location,
    source_ip: &str,
) -> Result<TimeEntry, ClockError> {
    let mut tx = pool.begin().await?;
    ensure_active(lock_employee(&mut tx, user_id).await?)?;

    let open = TimeEntry::find_open_for_user(&mut tx, user_id).await?;
    ensure_can_check_in(open.as_ref())?;

    let now = now();
    let inserted = sqlx::query(
        r#"
        INSERT INTO time_entries
            (user_id, location_id, check_in, check_in_ip, is_manual, notes, created_at, modified_at)
        VALUES (?, ?, ?, ?, FALSE, '', ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(location.id)
    .bind(now)
    .bind(source_ip)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await;

    let entry_id = match inserted {
        Ok(result) => result.last_insert_id(),
        Err(e) if is_duplicate_key(&e) => {
            drop(tx);
            return Err(already_open(pool, user_id, now).await);
        }
        Err(e) => return Err(e.into()),
    };

    let entry = TimeEntry::find(&mut tx, entry_id)
        .await?
        .ok_or(ClockError::NotFound("Time entry"))?;
    record_version(&mut tx, &entry, ChangeKind::CheckedIn, Some(user_id), now).await?;
    tx.commit().await?;

    info!(
        user_id,
        location = %location.code,
        ip = source_ip,
        entry_id,
        "Check-in"
    );
    Ok(entry)
}

pub async fn check_out(
    pool: &MySqlPool,
    user_id: u64,
    source_ip: &str,
) -> Result<TimeEntry, ClockError> {
    let mut tx = pool.begin().await?;
    ensure_active(lock_employee(&mut tx, user_id).await?)?;

    let mut entry = ensure_open(TimeEntry::find_open_for_user(&mut tx, user_id).await?)?;

    let now = now();
    sqlx::query(
        r#"
        UPDATE time_entries
        SET check_out = ?, check_out_ip = ?, modified_at = ?
        WHERE id = ?
        AND check_out IS NULL
        "#,
    )
    .bind(now)
    .bind(source_ip)
    .bind(now)
    .bind(entry.id)
    .execute(&mut *tx)
    .await?;

    entry.check_out = Some(now);
    entry.check_out_ip = Some(source_ip.to_string());
    entry.modified_at = now;

    record_version(&mut tx, &entry, ChangeKind::CheckedOut, Some(user_id), now).await?;
    tx.commit().await?;

    info!(
        user_id,
        ip = source_ip,
        entry_id = entry.id,
        duration = %entry.duration_display(),
        "Check-out"
    );
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::time_entry::sample_entry;
    use crate::service::test_support::{
        history_kinds, insert_location, insert_user, load_entry, open_entry_count,
    };
    use chrono::Duration;

    #[test]
    fn first_check_in_is_allowed() {
        assert!(ensure_can_check_in(None).is_ok());
    }

    #[test]
    fn second_check_in_fails_while_open() {
        let open = sample_entry(None);
        assert!(matches!(
            ensure_can_check_in(Some(&open)),
            Err(ClockError::AlreadyOpen { .. })
        ));
    }

    #[test]
    fn check_out_requires_an_open_entry() {
        assert!(matches!(ensure_open(None), Err(ClockError::NoOpenEntry)));

        let open = sample_entry(None);
        assert_eq!(ensure_open(Some(open)).unwrap().id, 7);
    }

    #[test]
    fn disabled_accounts_cannot_clock() {
        assert!(ensure_active(true).is_ok());
        assert!(matches!(ensure_active(false), Err(ClockError::AccountDisabled)));
    }

    #[test]
    fn now_is_truncated_to_microseconds() {
        assert_eq!(now().timestamp_subsec_nanos() % 1_000, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at a MySQL server"]
    async fn check_in_twice_keeps_one_open_entry(pool: MySqlPool) {
        let user = insert_user(&pool, "jdoe", true).await;
        let location = insert_location(&pool, "LOCAL_01").await;

        let first = check_in(&pool, user, &location, "192.168.1.50").await.unwrap();
        assert!(first.is_open());
        assert_eq!(first.check_in_ip, "192.168.1.50");

        let err = check_in(&pool, user, &location, "192.168.1.51").await.unwrap_err();
        match err {
            ClockError::AlreadyOpen { since } => {
                assert_eq!(since, local_hm(&Local, first.check_in));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(open_entry_count(&pool, user).await, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at a MySQL server"]
    async fn lost_race_reports_the_winning_check_in(pool: MySqlPool) {
        let user = insert_user(&pool, "jdoe", true).await;
        let location = insert_location(&pool, "LOCAL_01").await;
        let attempted = now() + Duration::minutes(90);

        let err = already_open(&pool, user, attempted).await;
        assert!(matches!(err, ClockError::AlreadyOpen { ref since } if *since == local_hm(&Local, attempted)));

        let winner = check_in(&pool, user, &location, "192.168.1.50").await.unwrap();
        let err = already_open(&pool, user, attempted).await;
        assert!(matches!(err, ClockError::AlreadyOpen { ref since } if *since == local_hm(&Local, winner.check_in)));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at a MySQL server"]
    async fn check_out_without_open_entry_fails(pool: MySqlPool) {
        let user = insert_user(&pool, "jdoe", true).await;

        let err = check_out(&pool, user, "192.168.1.50").await.unwrap_err();
        assert!(matches!(err, ClockError::NoOpenEntry));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at a MySQL server"]
    async fn check_in_then_out_writes_history(pool: MySqlPool) {
        let user = insert_user(&pool, "jdoe", true).await;
        let location = insert_location(&pool, "LOCAL_01").await;

        let entry = check_in(&pool, user, &location, "192.168.1.50").await.unwrap();
        let closed = check_out(&pool, user, "192.168.1.60").await.unwrap();
        assert_eq!(closed.id, entry.id);

        let stored = load_entry(&pool, entry.id).await;
        assert!(!stored.is_open());
        assert_eq!(stored.check_out_ip.as_deref(), Some("192.168.1.60"));
        assert!(!stored.is_manual);
        assert_eq!(open_entry_count(&pool, user).await, 0);
        assert_eq!(history_kinds(&pool, entry.id).await, ["checked_in", "checked_out"]);

        // a new shift can start once the previous one is closed
        assert!(check_in(&pool, user, &location, "192.168.1.50").await.is_ok());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at a MySQL server"]
    async fn disabled_account_is_refused(pool: MySqlPool) {
        let user = insert_user(&pool, "gone", false).await;
        let location = insert_location(&pool, "LOCAL_01").await;

        let err = check_in(&pool, user, &location, "192.168.1.50").await.unwrap_err();
        assert!(matches!(err, ClockError::AccountDisabled));
        assert_eq!(open_entry_count(&pool, user).await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at a MySQL server"]
    async fn unique_index_rejects_a_second_open_row(pool: MySqlPool) {
        let user = insert_user(&pool, "jdoe", true).await;
        let location = insert_location(&pool, "LOCAL_01").await;
        check_in(&pool, user, &location, "192.168.1.50").await.unwrap();

        // bypasses the service lock, only the index stands in the way
        let err = sqlx::query(
            "INSERT INTO time_entries (user_id, location_id, check_in, check_in_ip, notes) \
             VALUES (?, ?, ?, 'x', '')",
        )
        .bind(user)
        .bind(location.id)
        .bind(now())
        .execute(&pool)
        .await
        .unwrap_err();
        assert!(is_duplicate_key(&err));

        // an unknown location is a foreign-key failure, not a duplicate
        let err = sqlx::query(
            "INSERT INTO time_entries (user_id, location_id, check_in, check_out, check_in_ip, notes) \
             VALUES (?, 9999, ?, ?, 'x', '')",
        )
        .bind(user)
        .bind(now())
        .bind(now())
        .execute(&pool)
        .await
        .unwrap_err();
        assert!(!is_duplicate_key(&err));
    }
}
