use crate::auth::auth::{AuthUser, token_from_request};
use crate::config::Config;
use crate::error::ClockError;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};

/// Rejects requests without a valid token and stores the decoded [`AuthUser`]
/// in request extensions for handlers.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    let auth_user = token_from_request(req.request())
        .ok_or(ClockError::Unauthorized)
        .and_then(|token| AuthUser::from_token(&token, &config.jwt_secret));

    match auth_user {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.call(req).await
        }
        Err(e) => {
            tracing::debug!(path = %req.path(), "Rejected unauthenticated request");
            Ok(req.into_response(e.error_response()))
        }
    }
}
