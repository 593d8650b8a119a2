//! Fixture rows for tests that run against a real MySQL database.
//!
//! Those tests use `#[sqlx::test]`, which creates a scratch database per test
//! from `DATABASE_URL` and applies `./migrations`. They are ignored by default:
//! `DATABASE_URL=mysql://root@localhost cargo test -- --ignored`.

use sqlx::MySqlPool;
use sqlx::types::Json;

use crate::model::location::Location;
use crate::model::time_entry::TimeEntry;

pub(crate) async fn insert_user(pool: &MySqlPool, username: &str, is_active: bool) -> u64 {
    sqlx::query("INSERT INTO users (username, password, full_name, is_active) VALUES (?, 'x', '', ?)")
        .bind(username)
        .bind(is_active)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_id()
}

pub(crate) async fn insert_location(pool: &MySqlPool, code: &str) -> Location {
    let id = sqlx::query("INSERT INTO locations (code, name, allowed_ips) VALUES (?, 'Main Shop', ?)")
        .bind(code)
        .bind(Json(vec!["192.168.1.0/24".to_string()]))
        .execute(pool)
        .await
        .unwrap()
        .last_insert_id();

    let mut conn = pool.acquire().await.unwrap();
    Location::find_by_id(&mut conn, id).await.unwrap().unwrap()
}

pub(crate) async fn load_entry(pool: &MySqlPool, id: u64) -> TimeEntry {
    let mut conn = pool.acquire().await.unwrap();
    TimeEntry::find(&mut conn, id).await.unwrap().unwrap()
}

pub(crate) async fn open_entry_count(pool: &MySqlPool, user_id: u64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM time_entries WHERE user_id = ? AND check_out IS NULL")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub(crate) async fn history_kinds(pool: &MySqlPool, entry_id: u64) -> Vec<String> {
    sqlx::query_scalar("SELECT change_kind FROM time_entry_history WHERE entry_id = ? ORDER BY id")
        .bind(entry_id)
        .fetch_all(pool)
        .await
        .unwrap()
}
