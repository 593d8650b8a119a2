use crate::{
    auth::{
        auth::{AuthUser, token_from_request},
        jwt::generate_access_token,
        password::verify_password,
    },
    config::Config,
    error::ClockError,
    model::{role::Role, user::User},
    models::{ACCESS_COOKIE, LoginForm},
    utils::ip_utils::client_ip,
};
use actix_web::{
    HttpRequest, HttpResponse,
    cookie::{Cookie, SameSite, time::Duration},
    web,
};
use chrono::Utc;
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    #[schema(example = "Logged in")]
    pub message: String,
    #[schema(example = "jdoe")]
    pub username: String,
    /// Full name, or the username when none is stored
    #[schema(example = "Jane Doe")]
    pub display_name: String,
    pub is_admin: bool,
}

fn session_cookie(token: String, config: &Config) -> Cookie<'static> {
    Cookie::build(ACCESS_COOKIE, token)
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(config.access_token_ttl as i64))
        .finish()
}

/// Login with username and password (form encoded)
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Logged in, session cookie set", body = LoginResponse),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Invalid credentials or disabled account"),
        (status = 429, description = "Too many attempts")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(req, form, pool, config),
    fields(username = %form.username)
)]
pub async fn login(
    req: HttpRequest,
    form: web::Form<LoginForm>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ClockError> {
    let username = form.username.trim();
    let ip = client_ip(&req, config.trust_proxy_headers);

    if username.is_empty() || form.password.is_empty() {
        return Err(ClockError::Validation(
            "Enter your username and password".to_string(),
        ));
    }

    debug!("Fetching user from database");

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password, full_name, role_id, is_active
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(username)
    .fetch_optional(pool.get_ref())
    .await?;

    let user = match user {
        Some(user) => user,
        None => {
            warn!(%ip, "Failed login: unknown user");
            return Err(ClockError::InvalidCredentials);
        }
    };

    if let Err(e) = verify_password(&form.password, &user.password) {
        warn!(%ip, error = %e, "Failed login: password mismatch");
        return Err(ClockError::InvalidCredentials);
    }

    if !user.is_active {
        info!(%ip, "Login refused: account disabled");
        return Err(ClockError::AccountDisabled);
    }

    let role = Role::from_id(user.role_id).unwrap_or(Role::Employee);
    let token = generate_access_token(
        user.id,
        user.username.clone(),
        role.id(),
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(|e| {
        error!(error = %e, "Failed to sign access token");
        ClockError::Internal
    })?;

    // non-fatal
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!(%ip, user_id = user.id, "Login successful");

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(token, &config))
        .json(LoginResponse {
            message: "Logged in".to_string(),
            display_name: user.display_name().to_string(),
            username: user.username,
            is_admin: role == Role::Admin,
        }))
}

/// Clear the session cookie
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out")),
    tag = "Auth"
)]
pub async fn logout(req: HttpRequest, config: web::Data<Config>) -> HttpResponse {
    if let Some(token) = token_from_request(&req) {
        if let Ok(user) = AuthUser::from_token(&token, &config.jwt_secret) {
            info!(username = %user.username, "User logged out");
        }
    }

    let mut cookie = session_cookie(String::new(), &config);
    cookie.make_removal();

    HttpResponse::NoContent().cookie(cookie).finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};
    use sqlx::mysql::MySqlPoolOptions;

    fn lazy_pool() -> MySqlPool {
        MySqlPoolOptions::new()
            .connect_lazy("mysql://root@localhost/timeclock_test")
            .unwrap()
    }

    #[actix_web::test]
    async fn empty_credentials_are_rejected_before_touching_the_database() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Config::for_tests()))
                .route("/auth/login", web::post().to(login)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_form([("username", "  "), ("password", "x")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Enter your username and password");
    }

    #[actix_web::test]
    async fn logout_expires_the_cookie() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(Config::for_tests()))
                .route("/auth/logout", web::post().to(logout)),
        )
        .await;

        let req = test::TestRequest::post().uri("/auth/logout").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let cookie = resp
            .response()
            .cookies()
            .find(|c| c.name() == ACCESS_COOKIE)
            .expect("removal cookie");
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    }
}
