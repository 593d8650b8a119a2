use crate::{
    api::clock::normalize_location_code,
    auth::auth::AuthUser,
    config::Config,
    error::ClockError,
    model::location::Location,
    utils::{db_utils::is_duplicate_key, ip_utils::validate_allow_list},
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use qrcode::{QrCode, render::svg};
use sqlx::types::Json;
use tracing::{error, info};
use utoipa::ToSchema;

const MAX_CODE_LEN: usize = 20;
const QR_MIN_SIZE: u32 = 256;

#[derive(Serialize, ToSchema)]
pub struct LocationView {
    #[serde(flatten)]
    pub location: Location,
    #[schema(example = "85.123.45.67, 192.168.1.0/24")]
    pub ips_summary: String,
}

impl From<Location> for LocationView {
    fn from(location: Location) -> Self {
        let ips_summary = location.ips_summary();
        LocationView {
            location,
            ips_summary,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateLocation {
    #[schema(example = "local_01")]
    pub code: String,
    #[schema(example = "Main Shop")]
    pub name: String,
    #[serde(default)]
    #[schema(example = json!(["85.123.45.67", "192.168.1.0/24"]))]
    pub allowed_ips: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateLocation {
    pub code: Option<String>,
    pub name: Option<String>,
    pub allowed_ips: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[derive(Serialize, ToSchema)]
#[schema(example = json!({
    "code": "LOCAL_01",
    "name": "Main Shop",
    "url": "https://clock.example.com/clock?location=LOCAL_01"
}))]
pub struct QrPayload {
    pub code: String,
    pub name: String,
    /// What the printed QR encodes
    pub url: String,
}

impl QrPayload {
    pub fn for_location(location: &Location, base_url: &str) -> Self {
        QrPayload {
            code: location.code.clone(),
            name: location.name.clone(),
            url: format!("{}/clock?location={}", base_url, location.code),
        }
    }
}

fn validate_code(raw: &str) -> Result<String, ClockError> {
    let code = normalize_location_code(raw)
        .ok_or_else(|| ClockError::Validation("Location code is required".to_string()))?;
    if code.chars().count() > MAX_CODE_LEN {
        return Err(ClockError::Validation(format!(
            "Location code must be at most {MAX_CODE_LEN} characters"
        )));
    }
    // Codes go into the QR url unescaped.
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(ClockError::Validation(
            "Location code may only contain letters, digits, '_' and '-'".to_string(),
        ));
    }
    Ok(code)
}

fn validate_name(raw: &str) -> Result<String, ClockError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ClockError::Validation("Location name is required".to_string()));
    }
    Ok(name.to_string())
}

fn map_duplicate(e: sqlx::Error) -> ClockError {
    if is_duplicate_key(&e) {
        ClockError::Validation("Location code already exists".to_string())
    } else {
        ClockError::Database(e)
    }
}

/// List locations
#[utoipa::path(
    get,
    path = "/admin/locations",
    responses((status = 200, body = [LocationView]), (status = 401), (status = 403)),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Locations"
)]
pub async fn list_locations(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let locations = Location::list(pool.get_ref()).await?;
    let data: Vec<LocationView> = locations.into_iter().map(LocationView::from).collect();
    Ok(HttpResponse::Ok().json(data))
}

/// Create a location
#[utoipa::path(
    post,
    path = "/admin/locations",
    request_body = CreateLocation,
    responses(
        (status = 201, body = Location),
        (status = 400, description = "Invalid code, name or allow-list entry")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Locations"
)]
pub async fn create_location(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLocation>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let code = validate_code(&payload.code)?;
    let name = validate_name(&payload.name)?;
    let allowed_ips = validate_allow_list(&payload.allowed_ips)?;

    let result = sqlx::query(
        "INSERT INTO locations (code, name, allowed_ips, is_active) VALUES (?, ?, ?, ?)",
    )
    .bind(&code)
    .bind(&name)
    .bind(Json(&allowed_ips))
    .bind(payload.is_active)
    .execute(pool.get_ref())
    .await
    .map_err(map_duplicate)?;

    let mut conn = pool.acquire().await?;
    let location = Location::find_by_id(&mut conn, result.last_insert_id())
        .await?
        .ok_or(ClockError::NotFound("Location"))?;

    info!(admin = %auth.username, code = %location.code, "Location created");
    Ok(HttpResponse::Created().json(location))
}

/// Update a location; omitted fields keep their value
#[utoipa::path(
    put,
    path = "/admin/locations/{location_id}",
    params(("location_id" = u64, Path, description = "Location ID")),
    request_body = UpdateLocation,
    responses(
        (status = 200, body = Location),
        (status = 400, description = "Invalid code, name or allow-list entry"),
        (status = 404, description = "Location not found")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Locations"
)]
pub async fn update_location(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateLocation>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let location_id = path.into_inner();
    let payload = payload.into_inner();
    let mut conn = pool.acquire().await?;

    let current = Location::find_by_id(&mut conn, location_id)
        .await?
        .ok_or(ClockError::NotFound("Location"))?;

    let code = match payload.code.as_deref() {
        Some(raw) => validate_code(raw)?,
        None => current.code,
    };
    let name = match payload.name.as_deref() {
        Some(raw) => validate_name(raw)?,
        None => current.name,
    };
    let allowed_ips = match payload.allowed_ips.as_deref() {
        Some(entries) => validate_allow_list(entries)?,
        None => current.allowed_ips.0,
    };
    let is_active = payload.is_active.unwrap_or(current.is_active);

    sqlx::query(
        r#"
        UPDATE locations
        SET code = ?, name = ?, allowed_ips = ?, is_active = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&code)
    .bind(&name)
    .bind(Json(&allowed_ips))
    .bind(is_active)
    .bind(location_id)
    .execute(&mut *conn)
    .await
    .map_err(map_duplicate)?;

    let location = Location::find_by_id(&mut conn, location_id)
        .await?
        .ok_or(ClockError::NotFound("Location"))?;

    info!(admin = %auth.username, code = %location.code, active = location.is_active, "Location updated");
    Ok(HttpResponse::Ok().json(location))
}

/// QR payload for printing at the location
#[utoipa::path(
    get,
    path = "/admin/locations/{location_id}/qr",
    params(("location_id" = u64, Path, description = "Location ID")),
    responses((status = 200, body = QrPayload), (status = 404, description = "Location not found")),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Locations"
)]
pub async fn location_qr(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;
    let qr = load_qr(&pool, &config, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(qr))
}

/// Printable QR code image for the location
#[utoipa::path(
    get,
    path = "/admin/locations/{location_id}/qr.svg",
    params(("location_id" = u64, Path, description = "Location ID")),
    responses(
        (status = 200, description = "SVG image encoding the clock url", content_type = "image/svg+xml"),
        (status = 404, description = "Location not found")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Locations"
)]
pub async fn location_qr_svg(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;
    let qr = load_qr(&pool, &config, path.into_inner()).await?;
    let image = render_svg(&qr.url)?;
    Ok(HttpResponse::Ok().content_type("image/svg+xml").body(image))
}

async fn load_qr(pool: &MySqlPool, config: &Config, location_id: u64) -> Result<QrPayload, ClockError> {
    let mut conn = pool.acquire().await?;
    let location = Location::find_by_id(&mut conn, location_id)
        .await?
        .ok_or(ClockError::NotFound("Location"))?;
    Ok(QrPayload::for_location(&location, &config.public_base_url))
}

fn render_svg(url: &str) -> Result<String, ClockError> {
    let code = QrCode::new(url.as_bytes()).map_err(|e| {
        error!(error = %e, url, "QR encoding failed");
        ClockError::Internal
    })?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(QR_MIN_SIZE, QR_MIN_SIZE)
        .build())
}
