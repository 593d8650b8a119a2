use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::ClockError;
use crate::model::role::Role;
use crate::models::ACCESS_COOKIE;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};
use sqlx::MySqlPool;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
}

/// Bearer header first (API clients), then the session cookie (browser forms).
pub fn token_from_request(req: &HttpRequest) -> Option<String> {
    let bearer = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);

    bearer.or_else(|| req.cookie(ACCESS_COOKIE).map(|c| c.value().to_string()))
}

impl AuthUser {
    pub fn from_token(token: &str, secret: &str) -> Result<Self, ClockError> {
        let claims = verify_token(token, secret).map_err(|_| ClockError::Unauthorized)?;
        let role = Role::from_id(claims.role).ok_or(ClockError::Unauthorized)?;

        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
        })
    }

    /// Checks the role carried by the token only.
    pub fn require_admin(&self) -> Result<(), ClockError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ClockError::Forbidden)
        }
    }

    /// Token role first, then the stored account, so a disabled or demoted
    /// admin loses access before the token expires.
    pub async fn authorize_admin(&self, pool: &MySqlPool) -> Result<(), ClockError> {
        self.require_admin()?;

        let row = sqlx::query_as::<_, (u8, bool)>("SELECT role_id, is_active FROM users WHERE id = ?")
            .bind(self.user_id)
            .fetch_optional(pool)
            .await?;

        match check_account(row)? {
            Role::Admin => Ok(()),
            Role::Employee => {
                tracing::warn!(user_id = self.user_id, "Token role is stale, admin access refused");
                Err(ClockError::Forbidden)
            }
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Current role of a stored `(role_id, is_active)` account row.
pub fn check_account(row: Option<(u8, bool)>) -> Result<Role, ClockError> {
    match row {
        None => Err(ClockError::Unauthorized),
        Some((_, false)) => Err(ClockError::AccountDisabled),
        Some((role_id, true)) => Role::from_id(role_id).ok_or(ClockError::Unauthorized),
    }
}

impl FromRequest for AuthUser {
    type Error = ClockError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // already decoded by auth_middleware
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match token_from_request(req) {
            Some(t) => t,
            None => return ready(Err(ClockError::Unauthorized)),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => {
                tracing::error!("Config missing from app data");
                return ready(Err(ClockError::Unauthorized));
            }
        };

        ready(AuthUser::from_token(&token, &config.jwt_secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::generate_access_token;
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer header-token"))
            .cookie(Cookie::new(ACCESS_COOKIE, "cookie-token"))
            .to_http_request();
        assert_eq!(token_from_request(&req).as_deref(), Some("header-token"));

        let req = TestRequest::default()
            .cookie(Cookie::new(ACCESS_COOKIE, "cookie-token"))
            .to_http_request();
        assert_eq!(token_from_request(&req).as_deref(), Some("cookie-token"));

        assert!(token_from_request(&TestRequest::default().to_http_request()).is_none());
    }

    #[actix_web::test]
    async fn extracts_user_from_cookie() {
        let config = Config::for_tests();
        let token =
            generate_access_token(4, "admin".to_string(), Role::Admin.id(), &config.jwt_secret, 60)
                .unwrap();
        let (req, mut payload) = TestRequest::default()
            .app_data(Data::new(config))
            .cookie(Cookie::new(ACCESS_COOKIE, token))
            .to_http_parts();

        let user = AuthUser::from_request(&req, &mut payload).await.unwrap();
        assert_eq!(user.user_id, 4);
        assert!(user.is_admin());
        assert!(user.require_admin().is_ok());
    }

    #[test]
    fn unknown_role_is_unauthorized() {
        let token = generate_access_token(4, "x".to_string(), 99, "s", 60).unwrap();
        assert!(matches!(
            AuthUser::from_token(&token, "s"),
            Err(ClockError::Unauthorized)
        ));
    }

    #[test]
    fn employees_are_not_admins() {
        let user = AuthUser {
            user_id: 1,
            username: "e".to_string(),
            role: Role::Employee,
        };
        assert!(matches!(user.require_admin(), Err(ClockError::Forbidden)));
    }

    #[test]
    fn stored_account_overrides_token() {
        assert!(matches!(check_account(None), Err(ClockError::Unauthorized)));
        assert!(matches!(
            check_account(Some((Role::Admin.id(), false))),
            Err(ClockError::AccountDisabled)
        ));
        assert_eq!(check_account(Some((Role::Employee.id(), true))).unwrap(), Role::Employee);
        assert_eq!(check_account(Some((Role::Admin.id(), true))).unwrap(), Role::Admin);
        assert!(matches!(check_account(Some((42, true))), Err(ClockError::Unauthorized)));
    }
}
