use crate::commands::audit::{self, AuditAction, AuditEntry, AuditModule};
use crate::commands::utils::from_body;
use crate::db::User;
use crate::error::{RsbsaError, RsbsaResult};
use crate::middleware::auth::{issue_token, Actor, Claims};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use bcrypt::{hash, verify, DEFAULT_COST};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Technician,
    Jo,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Technician => "technician",
            UserRole::Jo => "jo",
        }
    }

    /// Username suffix a role must carry, if any.
    pub fn required_suffix(self) -> Option<&'static str> {
        match self {
            UserRole::Admin => None,
            UserRole::Technician => Some(".tech"),
            UserRole::Jo => Some(".jo"),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = RsbsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "technician" => Ok(UserRole::Technician),
            "jo" => Ok(UserRole::Jo),
            _ => Err(RsbsaError::validation(
                "Invalid role. Must be one of: admin, technician, jo",
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
}

fn filled(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn validate_registration(req: &RegisterRequest) -> RsbsaResult<NewUser> {
    let (Some(username), Some(email), Some(password), Some(role)) = (
        filled(&req.username),
        filled(&req.email),
        req.password.clone().filter(|p| !p.is_empty()),
        filled(&req.role),
    ) else {
        return Err(RsbsaError::validation("All fields are required"));
    };

    let role: UserRole = role.parse()?;
    if let Some(suffix) = role.required_suffix() {
        if !username.to_ascii_lowercase().ends_with(suffix) {
            return Err(RsbsaError::validation(format!(
                "{} usernames must end with {}",
                match role {
                    UserRole::Technician => "Technician",
                    _ => "JO",
                },
                suffix
            )));
        }
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(RsbsaError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if !email.contains('@') {
        return Err(RsbsaError::validation("Invalid email address"));
    }

    Ok(NewUser {
        username,
        email: email.to_lowercase(),
        password,
        role,
    })
}

pub async fn register(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<Value>,
) -> RsbsaResult<(StatusCode, Json<Value>)> {
    let payload: RegisterRequest = from_body(body)?;
    let new_user = validate_registration(&payload)?;

    let taken: Option<(String, String)> = sqlx::query_as(
        "SELECT username, email FROM users WHERE LOWER(username) = LOWER($1) OR LOWER(email) = $2 LIMIT 1",
    )
    .bind(&new_user.username)
    .bind(&new_user.email)
    .fetch_optional(&state.pool)
    .await?;
    if let Some((username, _)) = taken {
        let what = if username.eq_ignore_ascii_case(&new_user.username) {
            "Username"
        } else {
            "Email"
        };
        return Err(RsbsaError::Conflict(format!("{} already exists", what)));
    }

    let hashed = hash(&new_user.password, DEFAULT_COST)?;
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, email, password_hash, role) VALUES ($1, $2, $3, $4)
         RETURNING id, username, email, password_hash, role, created_at, updated_at",
    )
    .bind(&new_user.username)
    .bind(&new_user.email)
    .bind(hashed)
    .bind(new_user.role.as_str())
    .fetch_one(&state.pool)
    .await
    .map_err(|e| RsbsaError::conflict_on_unique(e, "Username or email already exists"))?;

    audit::record_detached(
        &state.pool,
        AuditEntry::new(
            &actor,
            AuditAction::Register,
            AuditModule::Auth,
            format!("Registered {} account {}", user.role, user.username),
        )
        .record_id(user.id)
        .new_values(serde_json::to_value(&user)?),
    )
    .await;

    tracing::info!("User {} registered as {}", user.username, user.role);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "user": user,
        })),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub user: User,
    pub token: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> RsbsaResult<Json<LoginResponse>> {
    let payload: LoginRequest = from_body(body)?;
    let (Some(username), Some(password)) = (
        filled(&payload.username),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(RsbsaError::validation("Username and password are required"));
    };

    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, email, password_hash, role, created_at, updated_at
         FROM users WHERE username = $1 OR LOWER(email) = LOWER($1)",
    )
    .bind(&username)
    .fetch_optional(&state.pool)
    .await?;

    let verified = match &user {
        Some(u) => match u.password_hash.as_deref() {
            Some(stored) => verify(&password, stored).unwrap_or_else(|e| {
                tracing::warn!("Password hash for {} could not be checked: {}", u.username, e);
                false
            }),
            None => false,
        },
        None => false,
    };

    let user = match (user, verified) {
        (Some(user), true) => user,
        _ => {
            audit::record_detached(
                &state.pool,
                AuditEntry::new(
                    &Actor {
                        username: username.clone(),
                        role: None,
                    },
                    AuditAction::LoginFailed,
                    AuditModule::Auth,
                    format!("Failed login for {}", username),
                ),
            )
            .await;
            return Err(RsbsaError::Auth("Invalid username or password".to_string()));
        }
    };

    let token = issue_token(
        &Claims::new(user.id, &user.username, &user.role),
        &state.config.jwt_secret,
    )?;

    audit::record_detached(
        &state.pool,
        AuditEntry::new(
            &Actor {
                username: user.username.clone(),
                role: Some(user.role.clone()),
            },
            AuditAction::Login,
            AuditModule::Auth,
            format!("{} logged in", user.username),
        )
        .record_id(user.id),
    )
    .await;

    tracing::info!("User {} logged in", user.username);
    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        user,
        token,
    }))
}

pub async fn get_users(State(state): State<AppState>) -> RsbsaResult<Json<Vec<User>>> {
    let users = sqlx::query_as::<_, User>(
        "SELECT id, username, email, password_hash, role, created_at, updated_at FROM users ORDER BY id",
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(users))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(username: &str, email: &str, password: &str, role: &str) -> RegisterRequest {
        RegisterRequest {
            username: Some(username.into()),
            email: Some(email.into()),
            password: Some(password.into()),
            role: Some(role.into()),
        }
    }

    #[test]
    fn missing_fields_are_rejected() {
        let err = validate_registration(&RegisterRequest::default()).unwrap_err();
        assert_eq!(err.to_string(), "All fields are required");

        let err = validate_registration(&req("admin2", " ", "secret1", "admin")).unwrap_err();
        assert_eq!(err.to_string(), "All fields are required");
    }

    #[test]
    fn technician_and_jo_need_suffixes() {
        let err = validate_registration(&req("juan", "juan@da.gov.ph", "secret1", "technician"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Technician usernames must end with .tech");

        let err = validate_registration(&req("ana", "ana@da.gov.ph", "secret1", "jo")).unwrap_err();
        assert_eq!(err.to_string(), "JO usernames must end with .jo");

        let ok = validate_registration(&req("juan.tech", "Juan@DA.gov.ph", "secret1", "Technician"))
            .unwrap();
        assert_eq!(ok.role, UserRole::Technician);
        assert_eq!(ok.email, "juan@da.gov.ph");
    }

    #[test]
    fn role_and_password_rules() {
        assert!(validate_registration(&req("boss", "b@x.ph", "secret1", "owner")).is_err());
        let err = validate_registration(&req("boss", "b@x.ph", "12345", "admin")).unwrap_err();
        assert_eq!(err.to_string(), "Password must be at least 6 characters");
        assert!(validate_registration(&req("boss", "not-an-email", "secret1", "admin")).is_err());
    }
}
