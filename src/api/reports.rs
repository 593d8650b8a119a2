use crate::{
    auth::auth::AuthUser,
    error::ClockError,
    model::{
        failed_attempt::{self, FailedClockAttempt},
        time_entry::{EntryView, IP_AUTO_CLOSED, TimeEntryDetail, detail_select},
        user::display_name,
    },
    service::corrections::{CloseTarget, close_open_entries},
    utils::{
        db_utils::paginate,
        time_utils::{day_start, round_hours, start_of_month, start_of_week},
    },
};
use actix_web::{HttpResponse, web};
use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use std::collections::{BTreeMap, HashSet};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct TodayStats {
    pub total: i64,
    pub completed: i64,
    pub open: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WeekStats {
    pub total_entries: i64,
    /// Rounded to one decimal
    pub total_hours: f64,
}

#[derive(Serialize, ToSchema)]
pub struct DashboardResponse {
    #[schema(value_type = String, format = "date-time")]
    pub now: DateTime<Utc>,
    pub open_entries: Vec<EntryView>,
    pub today_stats: TodayStats,
    pub week_stats: WeekStats,
    /// Open entries from previous days
    pub forgotten_entries: Vec<EntryView>,
}

async fn fetch_details(
    pool: &MySqlPool,
    where_sql: &str,
    bind: Option<DateTime<Utc>>,
) -> Result<Vec<EntryView>, sqlx::Error> {
    let sql = format!("{} {} ORDER BY e.check_in DESC", detail_select(), where_sql);
    let mut query = sqlx::query_as::<_, TimeEntryDetail>(&sql);
    if let Some(value) = bind {
        query = query.bind(value);
    }
    let rows = query.fetch_all(pool).await?;
    Ok(rows.into_iter().map(EntryView::from).collect())
}

async fn forgotten_entries(
    pool: &MySqlPool,
    today_start: DateTime<Utc>,
) -> Result<Vec<EntryView>, sqlx::Error> {
    fetch_details(
        pool,
        "WHERE e.check_out IS NULL AND e.check_in < ?",
        Some(today_start),
    )
    .await
}

/// Admin dashboard
#[utoipa::path(
    get,
    path = "/admin/dashboard",
    responses(
        (status = 200, body = DashboardResponse),
        (status = 401), (status = 403)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn dashboard(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let now = Utc::now();
    let today = now.with_timezone(&Local).date_naive();
    let today_start = day_start(&Local, today);
    let tomorrow_start = day_start(&Local, today + Duration::days(1));
    let week_start = day_start(&Local, start_of_week(today));

    let open_entries = fetch_details(pool.get_ref(), "WHERE e.check_out IS NULL", None).await?;

    let today_stats = sqlx::query_as::<_, TodayStats>(
        r#"
        SELECT
            COUNT(*) AS total,
            CAST(COALESCE(SUM(check_out IS NOT NULL), 0) AS SIGNED) AS completed,
            CAST(COALESCE(SUM(check_out IS NULL), 0) AS SIGNED) AS `open`
        FROM time_entries
        WHERE check_in >= ? AND check_in < ?
        "#,
    )
    .bind(today_start)
    .bind(tomorrow_start)
    .fetch_one(pool.get_ref())
    .await?;

    let (week_entries, week_minutes) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT
            COUNT(*),
            CAST(COALESCE(SUM(TIMESTAMPDIFF(MINUTE, check_in, check_out)), 0) AS SIGNED)
        FROM time_entries
        WHERE check_in >= ? AND check_out IS NOT NULL
        "#,
    )
    .bind(week_start)
    .fetch_one(pool.get_ref())
    .await?;

    let forgotten_entries = forgotten_entries(pool.get_ref(), today_start).await?;

    Ok(HttpResponse::Ok().json(DashboardResponse {
        now,
        open_entries,
        today_stats,
        week_stats: WeekStats {
            total_entries: week_entries,
            total_hours: round_hours(week_minutes, 1),
        },
        forgotten_entries,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SummaryPeriod {
    #[default]
    Week,
    Month,
}

impl SummaryPeriod {
    pub fn start(self, today: NaiveDate) -> NaiveDate {
        match self {
            SummaryPeriod::Week => start_of_week(today),
            SummaryPeriod::Month => start_of_month(today),
        }
    }

    pub fn label(self, today: NaiveDate) -> String {
        match self {
            SummaryPeriod::Week => format!("Week of {}", self.start(today).format("%d/%m")),
            SummaryPeriod::Month => today.format("%B %Y").to_string(),
        }
    }
}

#[derive(Deserialize, IntoParams)]
pub struct SummaryQuery {
    /// `week` (default) or `month`
    pub period: Option<SummaryPeriod>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ActiveEmployee {
    pub id: u64,
    pub username: String,
    pub full_name: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ClosedSpan {
    pub user_id: u64,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema, PartialEq)]
pub struct EmployeeHours {
    pub user_id: u64,
    pub employee: String,
    /// Rounded to two decimals
    pub total_hours: f64,
    pub total_entries: i64,
    pub days_worked: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SummaryTotals {
    pub hours: f64,
    pub entries: i64,
}

#[derive(Serialize, ToSchema)]
pub struct HoursSummaryResponse {
    #[schema(value_type = String)]
    pub period: &'static str,
    pub period_name: String,
    pub employee_data: Vec<EmployeeHours>,
    pub totals: SummaryTotals,
}

/// Per-employee totals over closed entries; days are counted on the local calendar.
/// Sorted by hours, highest first; ties keep the employee order given.
pub fn summarize_hours<Tz: TimeZone>(
    employees: &[ActiveEmployee],
    spans: &[ClosedSpan],
    tz: &Tz,
) -> Vec<EmployeeHours> {
    let mut per_user: BTreeMap<u64, (i64, i64, HashSet<NaiveDate>)> = BTreeMap::new();
    for span in spans {
        let slot = per_user.entry(span.user_id).or_default();
        slot.0 += (span.check_out - span.check_in).num_seconds().div_euclid(60);
        slot.1 += 1;
        slot.2.insert(span.check_in.with_timezone(tz).date_naive());
    }

    let mut rows: Vec<EmployeeHours> = employees
        .iter()
        .map(|emp| {
            let (minutes, entries, days) = per_user
                .get(&emp.id)
                .map(|(m, e, d)| (*m, *e, d.len() as i64))
                .unwrap_or((0, 0, 0));
            EmployeeHours {
                user_id: emp.id,
                employee: display_name(&emp.full_name, &emp.username).to_string(),
                total_hours: round_hours(minutes, 2),
                total_entries: entries,
                days_worked: days,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.total_hours.total_cmp(&a.total_hours));
    rows
}

/// Hours worked per employee this week or month
#[utoipa::path(
    get,
    path = "/admin/hours-summary",
    params(SummaryQuery),
    responses((status = 200, body = HoursSummaryResponse), (status = 401), (status = 403)),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn hours_summary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<SummaryQuery>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let period = query.period.unwrap_or_default();
    let today = Local::now().date_naive();
    let start = day_start(&Local, period.start(today));

    let employees = sqlx::query_as::<_, ActiveEmployee>(
        r#"
        SELECT id, username, full_name
        FROM users
        WHERE is_active = TRUE
        ORDER BY full_name, username
        "#,
    )
    .fetch_all(pool.get_ref())
    .await?;

    let spans = sqlx::query_as::<_, ClosedSpan>(
        r#"
        SELECT user_id, check_in, check_out
        FROM time_entries
        WHERE check_in >= ? AND check_out IS NOT NULL
        "#,
    )
    .bind(start)
    .fetch_all(pool.get_ref())
    .await?;

    let employee_data = summarize_hours(&employees, &spans, &Local);
    let totals = SummaryTotals {
        hours: round_hours_sum(&employee_data),
        entries: employee_data.iter().map(|e| e.total_entries).sum(),
    };

    Ok(HttpResponse::Ok().json(HoursSummaryResponse {
        period: match period {
            SummaryPeriod::Week => "week",
            SummaryPeriod::Month => "month",
        },
        period_name: period.label(today),
        employee_data,
        totals,
    }))
}

fn round_hours_sum(rows: &[EmployeeHours]) -> f64 {
    (rows.iter().map(|e| e.total_hours).sum::<f64>() * 100.0).round() / 100.0
}

/// Preview open entries left from previous days
#[utoipa::path(
    get,
    path = "/admin/close-forgotten",
    responses((status = 200, body = Object, example = json!({ "count": 1, "forgotten": [] }))),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn forgotten_preview(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let today_start = day_start(&Local, Local::now().date_naive());
    let forgotten = forgotten_entries(pool.get_ref(), today_start).await?;

    Ok(HttpResponse::Ok().json(json!({
        "count": forgotten.len(),
        "forgotten": forgotten,
    })))
}

/// Close every open entry from a previous day at the end of its day
#[utoipa::path(
    post,
    path = "/admin/close-forgotten",
    responses((status = 200, body = Object, example = json!({
        "message": "2 forgotten entries closed.", "closed": 2
    }))),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn close_forgotten(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let today_start = day_start(&Local, Local::now().date_naive());
    let closed = close_open_entries(
        pool.get_ref(),
        auth.user_id,
        CloseTarget::StartedBefore(today_start),
        IP_AUTO_CLOSED,
    )
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("{closed} forgotten entries closed."),
        "closed": closed,
    })))
}

#[derive(Deserialize, IntoParams)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct FailedAttemptList {
    pub data: Vec<FailedClockAttempt>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

/// Clock attempts rejected by the IP check, newest first
#[utoipa::path(
    get,
    path = "/admin/failed-attempts",
    params(PageQuery),
    responses((status = 200, body = FailedAttemptList), (status = 401), (status = 403)),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn failed_attempts(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let (page, per_page, offset) = paginate(query.page, query.per_page, 50, 200);
    let total = failed_attempt::count(pool.get_ref()).await?;
    let data = failed_attempt::list(pool.get_ref(), per_page, offset).await?;

    Ok(HttpResponse::Ok().json(FailedAttemptList {
        data,
        page,
        per_page,
        total,
    }))
}
