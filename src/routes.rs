use crate::{
    api::{clock, entries, locations, reports, users},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::{Context, Result};
use std::sync::Arc;

fn build_limiter(
    requests_per_min: u32,
) -> Result<GovernorConfig<PeerIpKeyExtractor, NoOpMiddleware>> {
    let requests_per_min = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(60_000 / u64::from(requests_per_min))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .context("Invalid login rate limit")?;
    Ok(cfg)
}

/// Validated at startup so a bad rate setting fails before the server binds.
#[derive(Clone)]
pub struct Limiters {
    login: Arc<GovernorConfig<PeerIpKeyExtractor, NoOpMiddleware>>,
}

impl Limiters {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Limiters {
            login: Arc::new(build_limiter(config.rate_login_per_min)?),
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, limiters: &Limiters) {
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(Governor::new(&limiters.login))
                    .route(web::post().to(handlers::login)),
            )
            .service(web::resource("/logout").route(web::post().to(handlers::logout))),
    );

    // Employee clock
    cfg.service(
        web::resource("/clock")
            .wrap(from_fn(auth_middleware))
            .route(web::get().to(clock::clock_page))
            .route(web::post().to(clock::clock_action)),
    );
    cfg.service(
        web::scope("/api")
            .wrap(from_fn(auth_middleware))
            .route("/status", web::get().to(clock::status)),
    );

    // Admin, role checked per handler
    cfg.service(
        web::scope("/admin")
            .wrap(from_fn(auth_middleware))
            .route("/dashboard", web::get().to(reports::dashboard))
            .route("/hours-summary", web::get().to(reports::hours_summary))
            .service(
                web::resource("/close-forgotten")
                    .route(web::get().to(reports::forgotten_preview))
                    .route(web::post().to(reports::close_forgotten)),
            )
            .route("/failed-attempts", web::get().to(reports::failed_attempts))
            .service(
                web::scope("/entries")
                    .service(
                        web::resource("")
                            .route(web::get().to(entries::list_entries))
                            .route(web::post().to(entries::create_entry)),
                    )
                    // fixed segments before /{id}
                    .route("/export.csv", web::get().to(entries::export_csv))
                    .route("/export.xlsx", web::get().to(entries::export_xlsx))
                    .route("/close", web::post().to(entries::close_selected))
                    .route("/{id}", web::put().to(entries::update_entry))
                    .route("/{id}/history", web::get().to(entries::entry_history)),
            )
            .service(
                web::scope("/locations")
                    .service(
                        web::resource("")
                            .route(web::get().to(locations::list_locations))
                            .route(web::post().to(locations::create_location)),
                    )
                    .route("/{id}", web::put().to(locations::update_location))
                    .route("/{id}/qr", web::get().to(locations::location_qr))
                    .route("/{id}/qr.svg", web::get().to(locations::location_qr_svg)),
            )
            .service(
                web::resource("/users")
                    .route(web::get().to(users::list_users))
                    .route(web::post().to(users::create_user)),
            )
            .service(web::resource("/users/{id}").route(web::put().to(users::update_user))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};
    use sqlx::mysql::MySqlPoolOptions;

    #[actix_web::test]
    async fn protected_routes_require_a_session() {
        let config = Config::for_tests();
        let limiters = Limiters::from_config(&config).unwrap();
        let pool = MySqlPoolOptions::new()
            .connect_lazy("mysql://root@localhost/timeclock_test")
            .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pool))
                .app_data(web::Data::new(config))
                .configure(|cfg| configure(cfg, &limiters)),
        )
        .await;

        for uri in [
            "/api/status",
            "/clock",
            "/admin/dashboard",
            "/admin/entries",
            "/admin/entries/export.csv",
            "/admin/entries/export.xlsx",
            "/admin/locations",
            "/admin/locations/1/qr.svg",
            "/admin/users",
        ] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }

        let req = test::TestRequest::put()
            .uri("/admin/users/1")
            .set_json(serde_json::json!({ "is_active": false }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn logout_is_public() {
        let config = Config::for_tests();
        let limiters = Limiters::from_config(&config).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .configure(|cfg| configure(cfg, &limiters)),
        )
        .await;

        let req = test::TestRequest::post().uri("/auth/logout").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
