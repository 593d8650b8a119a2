use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::ClockError,
    model::{clock_action::ClockAction, failed_attempt, location::Location, time_entry::TimeEntry},
    service::attendance,
    utils::{
        ip_utils::{client_ip, validate_location_access},
        time_utils::local_hm,
    },
};
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{error, warn};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct ClockForm {
    /// `in` or `out`
    #[serde(default)]
    #[schema(example = "in")]
    pub action: String,
    /// Location code from the QR
    #[serde(default)]
    #[schema(example = "LOCAL_01")]
    pub location: String,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct OpenEntryStatus {
    #[schema(value_type = String, format = "date-time")]
    pub check_in: DateTime<Utc>,
    /// Location display name
    pub location: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[schema(example = json!({
    "has_open_entry": true,
    "server_time": "2026-03-02T10:15:00Z",
    "open_entry": { "check_in": "2026-03-02T08:00:00Z", "location": "Main Shop" }
}))]
pub struct StatusResponse {
    pub has_open_entry: bool,
    #[schema(value_type = String, format = "date-time")]
    pub server_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_entry: Option<OpenEntryStatus>,
}

impl StatusResponse {
    pub fn new(open_entry: Option<OpenEntryStatus>, server_time: DateTime<Utc>) -> Self {
        StatusResponse {
            has_open_entry: open_entry.is_some(),
            server_time,
            open_entry,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClockResponse {
    #[schema(example = "Check-in recorded at 08:00")]
    pub message: String,
    pub entry: TimeEntry,
    pub status: StatusResponse,
}

#[derive(Deserialize, IntoParams)]
pub struct ClockPageQuery {
    /// Location code prefilled from a scanned QR
    pub location: Option<String>,
}

async fn open_entry_status(
    pool: &MySqlPool,
    user_id: u64,
) -> Result<Option<OpenEntryStatus>, sqlx::Error> {
    sqlx::query_as::<_, OpenEntryStatus>(
        r#"
        SELECT e.check_in, l.name AS location
        FROM time_entries e
        JOIN locations l ON l.id = e.location_id
        WHERE e.user_id = ? AND e.check_out IS NULL
        ORDER BY e.check_in DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub fn normalize_location_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_uppercase();
    if code.is_empty() { None } else { Some(code) }
}

/// Current clock state for the signed-in employee
#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "Clock status", body = StatusResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Clock"
)]
pub async fn status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, ClockError> {
    let open_entry = open_entry_status(pool.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(StatusResponse::new(open_entry, Utc::now())))
}

/// Clock page data; echoes a scanned location code back for the form
#[utoipa::path(
    get,
    path = "/clock",
    params(ClockPageQuery),
    responses(
        (status = 200, description = "Clock status plus the prefilled location", body = Object, example = json!({
            "location": "LOCAL_01",
            "has_open_entry": false,
            "server_time": "2026-03-02T10:15:00Z"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Clock"
)]
pub async fn clock_page(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ClockPageQuery>,
) -> Result<HttpResponse, ClockError> {
    let open_entry = open_entry_status(pool.get_ref(), auth.user_id).await?;
    let status = StatusResponse::new(open_entry, Utc::now());

    let mut body = serde_json::to_value(&status).unwrap_or_default();
    if let Some(code) = query.location.as_deref().and_then(normalize_location_code) {
        body["location"] = serde_json::Value::String(code);
    }
    Ok(HttpResponse::Ok().json(body))
}

/// Check in or out at a location
#[utoipa::path(
    post,
    path = "/clock",
    request_body(content = ClockForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Action recorded", body = ClockResponse),
        (status = 400, description = "Missing location code or invalid action"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Location inactive, no IPs configured, or IP not allowed (attempt recorded)"),
        (status = 404, description = "Unknown location code"),
        (status = 409, description = "Already checked in / no open entry")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Clock"
)]
pub async fn clock_action(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    form: web::Form<ClockForm>,
) -> Result<HttpResponse, ClockError> {
    let code = normalize_location_code(&form.location).ok_or(ClockError::MissingLocation)?;
    let action: ClockAction = form
        .action
        .trim()
        .parse()
        .map_err(|_: strum::ParseError| ClockError::InvalidAction)?;

    let location = Location::find_by_code(pool.get_ref(), &code)
        .await?
        .ok_or_else(|| ClockError::LocationNotFound(code.clone()))?;

    let ip = client_ip(&req, config.trust_proxy_headers);

    if let Err(e) = validate_location_access(&location, &ip) {
        warn!(
            username = %auth.username,
            %ip,
            location = %location.code,
            action = action.as_ref(),
            "IP validation failed"
        );
        if matches!(e, ClockError::IpNotAllowed { .. }) {
            if let Err(db_err) =
                failed_attempt::record(pool.get_ref(), auth.user_id, location.id, action, &ip).await
            {
                error!(error = %db_err, "Failed to record failed clock attempt");
            }
        }
        return Err(e);
    }

    let (entry, message) = match action {
        ClockAction::In => {
            let entry = attendance::check_in(pool.get_ref(), auth.user_id, &location, &ip).await?;
            let message = format!("Check-in recorded at {}", local_hm(&Local, entry.check_in));
            (entry, message)
        }
        ClockAction::Out => {
            let entry = attendance::check_out(pool.get_ref(), auth.user_id, &ip).await?;
            let message = format!(
                "Check-out recorded at {} (duration: {})",
                entry.check_out.map(|out| local_hm(&Local, out)).unwrap_or_default(),
                entry.duration_display()
            );
            (entry, message)
        }
    };

    let status = match action {
        ClockAction::In => StatusResponse::new(
            Some(OpenEntryStatus {
                check_in: entry.check_in,
                location: location.name.clone(),
            }),
            Utc::now(),
        ),
        ClockAction::Out => StatusResponse::new(None, Utc::now()),
    };

    Ok(HttpResponse::Ok().json(ClockResponse {
        message,
        entry,
        status,
    }))
}
