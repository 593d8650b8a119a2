use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

/// Every recoverable failure a request can hit. Rendered as `{"error": "..."}`.
#[derive(Debug, Display)]
pub enum ClockError {
    #[display(fmt = "Invalid username or password")]
    InvalidCredentials,

    #[display(fmt = "Your account is disabled")]
    AccountDisabled,

    #[display(fmt = "Authentication required")]
    Unauthorized,

    #[display(fmt = "Admin only")]
    Forbidden,

    #[display(fmt = "Scan the QR code or enter the location code")]
    MissingLocation,

    #[display(fmt = "Unknown location code: {}", _0)]
    LocationNotFound(String),

    #[display(fmt = "This location is not active")]
    LocationInactive,

    #[display(fmt = "No IP addresses are configured for this location")]
    NoAllowedIps,

    #[display(
        fmt = "You cannot clock from outside the workplace. Make sure you are connected to the workplace Wi-Fi."
    )]
    IpNotAllowed { ip: String },

    #[display(fmt = "Invalid action")]
    InvalidAction,

    #[display(fmt = "You already have an open entry since {}", since)]
    AlreadyOpen { since: String },

    #[display(fmt = "You have no open entry")]
    NoOpenEntry,

    #[display(fmt = "Notes are required for manual changes (at least 10 characters explaining why)")]
    NotesRequired,

    #[display(fmt = "{}", _0)]
    Validation(String),

    #[display(fmt = "{} not found", _0)]
    NotFound(&'static str),

    #[display(fmt = "Internal Server Error")]
    Database(sqlx::Error),

    /// Server-side failure outside the database; details are logged where it happens
    #[display(fmt = "Internal Server Error")]
    Internal,
}

impl From<sqlx::Error> for ClockError {
    fn from(e: sqlx::Error) -> Self {
        ClockError::Database(e)
    }
}

impl ResponseError for ClockError {
    fn status_code(&self) -> StatusCode {
        match self {
            ClockError::InvalidCredentials
            | ClockError::AccountDisabled
            | ClockError::Unauthorized => StatusCode::UNAUTHORIZED,
            ClockError::Forbidden
            | ClockError::IpNotAllowed { .. }
            | ClockError::LocationInactive
            | ClockError::NoAllowedIps => StatusCode::FORBIDDEN,
            ClockError::LocationNotFound(_) | ClockError::NotFound(_) => StatusCode::NOT_FOUND,
            ClockError::AlreadyOpen { .. } | ClockError::NoOpenEntry => StatusCode::CONFLICT,
            ClockError::MissingLocation
            | ClockError::InvalidAction
            | ClockError::NotesRequired
            | ClockError::Validation(_) => StatusCode::BAD_REQUEST,
            ClockError::Database(_) | ClockError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ClockError::Database(e) = self {
            tracing::error!(error = %e, "Database error");
        }

        HttpResponse::build(self.status_code()).json(json!({
            "error": self.to_string()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn conflict_errors_render_as_json_messages() {
        let err = ClockError::AlreadyOpen {
            since: "08:15".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "You already have an open entry since 08:15");
    }

    #[actix_web::test]
    async fn database_errors_hide_details() {
        let err = ClockError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "Internal Server Error");
    }

    #[actix_web::test]
    async fn internal_failures_are_server_errors() {
        let err = ClockError::Internal;
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "Internal Server Error");
    }

    #[test]
    fn ip_rejection_is_forbidden() {
        let err = ClockError::IpNotAllowed {
            ip: "10.1.2.3".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ClockError::NoOpenEntry.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ClockError::LocationNotFound("X".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }
}
