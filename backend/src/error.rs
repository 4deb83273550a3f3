use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RsbsaError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Auth(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RsbsaResult<T> = Result<T, RsbsaError>;

impl RsbsaError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RsbsaError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        RsbsaError::NotFound(msg.into())
    }

    /// Unique-constraint violations become a 409 with `msg`; anything else stays a database error.
    pub fn conflict_on_unique(err: sqlx::Error, msg: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RsbsaError::Conflict(msg.into())
            }
            _ => RsbsaError::Database(err),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RsbsaError::Validation(_) => StatusCode::BAD_REQUEST,
            RsbsaError::NotFound(_) => StatusCode::NOT_FOUND,
            RsbsaError::Conflict(_) => StatusCode::CONFLICT,
            RsbsaError::Auth(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RsbsaError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            RsbsaError::Validation(msg)
            | RsbsaError::NotFound(msg)
            | RsbsaError::Conflict(msg)
            | RsbsaError::Auth(msg) => msg,
            RsbsaError::Database(ref e) => {
                tracing::error!("Database Error: {:?}", e);
                "A database error occurred".to_string()
            }
            RsbsaError::Internal(ref msg) => {
                tracing::error!("Internal Error: {}", msg);
                "Internal server error".to_string()
            }
            other => {
                tracing::error!("Unhandled Error: {:?}", other);
                "Internal server error".to_string()
            }
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
