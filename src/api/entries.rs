use crate::{
    auth::auth::AuthUser,
    error::ClockError,
    model::{
        history,
        time_entry::{
            DETAIL_FROM, EntryView, IP_ADMIN_CLOSED, TimeEntry, TimeEntryDetail, detail_select,
        },
    },
    service::corrections::{self, CloseTarget, EntryEdit, ManualEntry},
    utils::{
        db_utils::paginate,
        entry_filter::EntryFilter,
        export::{CsvExport, XlsxExport},
    },
};
use actix_web::{HttpResponse, http::header, web};
use chrono::{DateTime, Local};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::{debug, error, info};
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct EntryListResponse {
    pub data: Vec<EntryView>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 50)]
    pub per_page: u32,
    #[schema(example = 120)]
    pub total: i64,
}

#[derive(Deserialize, ToSchema)]
pub struct CloseSelected {
    #[schema(example = json!([12, 15]))]
    pub ids: Vec<u64>,
}

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Every entry matching the filter, newest first, for the exports.
fn export_query(filter: &EntryFilter, now: &DateTime<Local>) -> QueryBuilder<'static, MySql> {
    let bounds = filter.check_in_bounds(&Local, now.date_naive());
    let mut qb = QueryBuilder::<MySql>::new(detail_select());
    filter.push_where(&mut qb, bounds);
    qb.push(" ORDER BY e.check_in DESC");
    qb
}

fn attachment(content_type: &str, filename: String, body: Vec<u8>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(content_type)
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ))
        .body(body)
}

/// List time entries with filters
#[utoipa::path(
    get,
    path = "/admin/entries",
    params(EntryFilter),
    responses(
        (status = 200, description = "Paginated entries, newest first", body = EntryListResponse),
        (status = 401), (status = 403)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn list_entries(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EntryFilter>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let (page, per_page, offset) = paginate(query.page, query.per_page, 50, 200);
    let bounds = query.check_in_bounds(&Local, Local::now().date_naive());

    let mut count_q = QueryBuilder::<MySql>::new(format!("SELECT COUNT(*) {DETAIL_FROM}"));
    query.push_where(&mut count_q, bounds);
    debug!(sql = %count_q.sql(), "Counting entries");
    let total = count_q
        .build_query_scalar::<i64>()
        .fetch_one(pool.get_ref())
        .await?;

    let mut data_q = QueryBuilder::<MySql>::new(detail_select());
    query.push_where(&mut data_q, bounds);
    data_q
        .push(" ORDER BY e.check_in DESC LIMIT ")
        .push_bind(per_page as i64)
        .push(" OFFSET ")
        .push_bind(offset as i64);

    let rows = data_q
        .build_query_as::<TimeEntryDetail>()
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(EntryListResponse {
        data: rows.into_iter().map(EntryView::from).collect(),
        page,
        per_page,
        total,
    }))
}

/// Export filtered entries as CSV
#[utoipa::path(
    get,
    path = "/admin/entries/export.csv",
    params(EntryFilter),
    responses(
        (status = 200, description = "Semicolon separated CSV with UTF-8 BOM", content_type = "text/csv"),
        (status = 401), (status = 403)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn export_csv(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EntryFilter>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let now = Local::now();
    let mut qb = export_query(&query, &now);

    let csv_failed = |e: csv::Error| {
        error!(error = %e, "CSV export failed");
        ClockError::Internal
    };

    let mut export = CsvExport::new(Local).map_err(csv_failed)?;
    let mut rows = qb.build_query_as::<TimeEntryDetail>().fetch(pool.get_ref());
    let mut count = 0usize;
    while let Some(row) = rows.try_next().await? {
        export.push(&row).map_err(csv_failed)?;
        count += 1;
    }
    drop(rows);
    let body = export.finish().map_err(csv_failed)?;

    info!(admin = %auth.username, rows = count, "CSV export");

    Ok(attachment(
        "text/csv; charset=utf-8",
        format!("time_entries_{}.csv", now.format("%Y%m%d")),
        body,
    ))
}

/// Export filtered entries as an Excel workbook
#[utoipa::path(
    get,
    path = "/admin/entries/export.xlsx",
    params(EntryFilter),
    responses(
        (status = 200, description = "Workbook with a styled header row",
            content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        (status = 401), (status = 403)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn export_xlsx(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EntryFilter>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let now = Local::now();
    let mut qb = export_query(&query, &now);

    let xlsx_failed = |e: rust_xlsxwriter::XlsxError| {
        error!(error = %e, "Excel export failed");
        ClockError::Internal
    };

    let mut export = XlsxExport::new(Local).map_err(xlsx_failed)?;
    let mut rows = qb.build_query_as::<TimeEntryDetail>().fetch(pool.get_ref());
    while let Some(row) = rows.try_next().await? {
        export.push(&row).map_err(xlsx_failed)?;
    }
    drop(rows);
    let count = export.rows();
    let body = export.finish().map_err(xlsx_failed)?;

    info!(admin = %auth.username, rows = count, "Excel export");

    Ok(attachment(
        XLSX_CONTENT_TYPE,
        format!("time_entries_{}.xlsx", now.format("%Y%m%d")),
        body,
    ))
}

/// Create a manual entry
#[utoipa::path(
    post,
    path = "/admin/entries",
    request_body = ManualEntry,
    responses(
        (status = 201, description = "Entry created", body = TimeEntry),
        (status = 400, description = "Notes missing or times inconsistent"),
        (status = 404, description = "Unknown user or location"),
        (status = 409, description = "Employee already has an open entry")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn create_entry(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<ManualEntry>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let entry = corrections::create_manual(pool.get_ref(), auth.user_id, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(entry))
}

/// Correct an entry; a note explaining the change is mandatory
#[utoipa::path(
    put,
    path = "/admin/entries/{entry_id}",
    params(("entry_id" = u64, Path, description = "Time entry ID")),
    request_body = EntryEdit,
    responses(
        (status = 200, description = "Entry updated", body = TimeEntry),
        (status = 400, description = "Notes missing or times inconsistent"),
        (status = 404, description = "Entry or location not found")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn update_entry(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<EntryEdit>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let entry = corrections::edit_entry(
        pool.get_ref(),
        auth.user_id,
        path.into_inner(),
        payload.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(entry))
}

/// Close the selected open entries at the end of their day
#[utoipa::path(
    post,
    path = "/admin/entries/close",
    request_body = CloseSelected,
    responses((status = 200, body = Object, example = json!({
        "message": "Closed 2 entries.", "closed": 2
    }))),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn close_selected(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CloseSelected>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let closed = corrections::close_open_entries(
        pool.get_ref(),
        auth.user_id,
        CloseTarget::Ids(payload.into_inner().ids),
        IP_ADMIN_CLOSED,
    )
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Closed {closed} entries."),
        "closed": closed,
    })))
}

/// Every recorded version of an entry, newest first
#[utoipa::path(
    get,
    path = "/admin/entries/{entry_id}/history",
    params(("entry_id" = u64, Path, description = "Time entry ID")),
    responses(
        (status = 200, body = [crate::model::history::TimeEntryHistory]),
        (status = 404, description = "Entry not found")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn entry_history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let entry_id = path.into_inner();
    let mut conn = pool.acquire().await?;
    TimeEntry::find(&mut conn, entry_id)
        .await?
        .ok_or(ClockError::NotFound("Time entry"))?;

    let versions = history::list_for_entry(&mut conn, entry_id).await?;
    Ok(HttpResponse::Ok().json(versions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::generate_access_token;
    use crate::auth::middleware::auth_middleware;
    use crate::config::Config;
    use crate::model::role::Role;
    use actix_web::{App, http::StatusCode, middleware::from_fn, test};
    use sqlx::mysql::MySqlPoolOptions;

    #[actix_web::test]
    async fn employees_cannot_reach_admin_endpoints() {
        let config = Config::for_tests();
        let token = generate_access_token(
            3,
            "jdoe".to_string(),
            Role::Employee.id(),
            &config.jwt_secret,
            60,
        )
        .unwrap();
        let pool = MySqlPoolOptions::new()
            .connect_lazy("mysql://root@localhost/timeclock_test")
            .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pool))
                .app_data(web::Data::new(config))
                .service(
                    web::scope("/admin")
                        .wrap(from_fn(auth_middleware))
                        .route("/entries", web::get().to(list_entries))
                        .route("/entries/export.csv", web::get().to(export_csv))
                        .route("/entries/export.xlsx", web::get().to(export_xlsx)),
                ),
        )
        .await;

        for uri in [
            "/admin/entries",
            "/admin/entries/export.csv",
            "/admin/entries/export.xlsx",
        ] {
            let req = test::TestRequest::get()
                .uri(uri)
                .insert_header(("Authorization", format!("Bearer {token}")))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{uri}");
        }
    }
}
