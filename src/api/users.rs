use crate::{
    auth::{auth::AuthUser, password::hash_password},
    error::ClockError,
    model::{role::Role, user::UserPresence},
    utils::db_utils::is_duplicate_key,
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::ToSchema;

const MIN_PASSWORD_CHARS: usize = 8;

const PRESENCE_SELECT: &str = "SELECT u.id, u.username, u.full_name, u.role_id, u.is_active, \
     u.last_login_at, \
     EXISTS(SELECT 1 FROM time_entries e WHERE e.user_id = u.id AND e.check_out IS NULL) AS present \
     FROM users u";

async fn fetch_presence(pool: &MySqlPool, user_id: u64) -> Result<Option<UserPresence>, sqlx::Error> {
    sqlx::query_as::<_, UserPresence>(&format!("{PRESENCE_SELECT} WHERE u.id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

#[derive(Deserialize, ToSchema)]
pub struct CreateUser {
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "correct horse battery")]
    pub password: String,
    #[serde(default)]
    #[schema(example = "Jane Doe")]
    pub full_name: String,
    /// Defaults to employee
    pub role: Option<Role>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateUser {
    #[schema(example = "Jane Doe")]
    pub full_name: Option<String>,
    pub role: Option<Role>,
    /// Disabled accounts can neither log in nor clock
    pub is_active: Option<bool>,
    /// New password; omitted keeps the current one
    pub password: Option<String>,
}

fn validate_password(password: &str) -> Result<(), ClockError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ClockError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}

fn hash(password: &str) -> Result<String, ClockError> {
    hash_password(password).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        ClockError::Internal
    })
}

impl UpdateUser {
    /// Admins cannot lock themselves out.
    fn validate(&self, target_id: u64, admin_id: u64) -> Result<(), ClockError> {
        if let Some(password) = self.password.as_deref() {
            validate_password(password)?;
        }
        if target_id == admin_id
            && (self.is_active == Some(false) || self.role == Some(Role::Employee))
        {
            return Err(ClockError::Validation(
                "You cannot disable or demote your own account".to_string(),
            ));
        }
        Ok(())
    }
}

impl CreateUser {
    fn validate(&self) -> Result<(), ClockError> {
        let username = self.username.trim();
        if username.is_empty() || username.chars().count() > 150 {
            return Err(ClockError::Validation(
                "Username must be between 1 and 150 characters".to_string(),
            ));
        }
        validate_password(&self.password)
    }
}

/// Users with their current presence
#[utoipa::path(
    get,
    path = "/admin/users",
    responses((status = 200, body = [UserPresence]), (status = 401), (status = 403)),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let users = sqlx::query_as::<_, UserPresence>(&format!("{PRESENCE_SELECT} ORDER BY u.username"))
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(users))
}

/// Create a user account
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = CreateUser,
    responses(
        (status = 201, body = Object, example = json!({"id": 4, "username": "jdoe"})),
        (status = 400, description = "Invalid or duplicate username, short password")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateUser>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;
    payload.validate()?;

    let hashed = hash(&payload.password)?;
    let username = payload.username.trim();
    let role = payload.role.unwrap_or(Role::Employee);

    let result = sqlx::query(
        "INSERT INTO users (username, password, full_name, role_id) VALUES (?, ?, ?, ?)",
    )
    .bind(username)
    .bind(&hashed)
    .bind(payload.full_name.trim())
    .bind(role.id())
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        if is_duplicate_key(&e) {
            ClockError::Validation("Username already exists".to_string())
        } else {
            ClockError::Database(e)
        }
    })?;

    info!(admin = %auth.username, username, role = ?role, "User created");
    Ok(HttpResponse::Created().json(json!({
        "id": result.last_insert_id(),
        "username": username,
    })))
}

/// Update name, role, active flag or password
#[utoipa::path(
    put,
    path = "/admin/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, body = UserPresence),
        (status = 400, description = "Short password or self lock-out"),
        (status = 404, description = "User not found")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateUser>,
) -> Result<HttpResponse, ClockError> {
    auth.authorize_admin(pool.get_ref()).await?;

    let user_id = path.into_inner();
    let payload = payload.into_inner();
    payload.validate(user_id, auth.user_id)?;

    let hashed = match payload.password.as_deref() {
        Some(password) => Some(hash(password)?),
        None => None,
    };

    let result = sqlx::query(
        r#"
        UPDATE users
        SET full_name = COALESCE(?, full_name),
            role_id = COALESCE(?, role_id),
            is_active = COALESCE(?, is_active),
            password = COALESCE(?, password)
        WHERE id = ?
        "#,
    )
    .bind(payload.full_name.as_deref().map(str::trim))
    .bind(payload.role.map(Role::id))
    .bind(payload.is_active)
    .bind(hashed)
    .bind(user_id)
    .execute(pool.get_ref())
    .await?;

    let user = fetch_presence(pool.get_ref(), user_id)
        .await?
        .ok_or(ClockError::NotFound("User"))?;
    if result.rows_affected() > 0 {
        info!(
            admin = %auth.username,
            user_id,
            active = user.is_active,
            role_id = user.role_id,
            password_changed = payload.password.is_some(),
            "User updated"
        );
    }

    Ok(HttpResponse::Ok().json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(username: &str, password: &str) -> CreateUser {
        CreateUser {
            username: username.to_string(),
            password: password.to_string(),
            full_name: String::new(),
            role: None,
        }
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(form("jdoe", "short").validate().is_err());
        assert!(form("jdoe", "long enough").validate().is_ok());
    }

    #[test]
    fn blank_usernames_are_rejected() {
        assert!(form("  ", "long enough").validate().is_err());
    }

    #[test]
    fn admins_cannot_lock_themselves_out() {
        let disable = UpdateUser {
            full_name: None,
            role: None,
            is_active: Some(false),
            password: None,
        };
        assert!(disable.validate(4, 4).is_err());
        assert!(disable.validate(5, 4).is_ok());

        let demote = UpdateUser {
            full_name: None,
            role: Some(Role::Employee),
            is_active: None,
            password: None,
        };
        assert!(demote.validate(4, 4).is_err());
    }

    #[test]
    fn password_changes_are_length_checked() {
        let update = UpdateUser {
            full_name: None,
            role: None,
            is_active: None,
            password: Some("short".to_string()),
        };
        assert!(matches!(update.validate(5, 4), Err(ClockError::Validation(_))));
    }

    #[test]
    fn role_is_read_by_name() {
        let user: CreateUser = serde_json::from_str(
            r#"{"username":"boss","password":"long enough","role":"admin"}"#,
        )
        .unwrap();
        assert_eq!(user.role, Some(Role::Admin));
    }
}
