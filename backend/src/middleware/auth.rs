use crate::error::RsbsaResult;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

const TOKEN_TTL_HOURS: i64 = 12;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub user_id: Option<i32>,
    pub username: Option<String>,
    pub role: Option<String>,
    pub exp: usize,
}

impl Claims {
    pub fn new(user_id: i32, username: &str, role: &str) -> Self {
        let exp = chrono::Utc::now() + chrono::Duration::hours(TOKEN_TTL_HOURS);
        Claims {
            sub: username.to_string(),
            user_id: Some(user_id),
            username: Some(username.to_string()),
            role: Some(role.to_string()),
            exp: usize::try_from(exp.timestamp()).unwrap_or(usize::MAX),
        }
    }
}

pub fn issue_token(claims: &Claims, secret: &str) -> RsbsaResult<String> {
    Ok(encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

pub fn decode_token(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// Attaches `Claims` when a valid bearer token is present. Requests without one
/// still go through; the frontend handles role routing on its own.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let claims = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| decode_token(token.trim(), &state.config.jwt_secret));

    if let Some(claims) = claims {
        request.extensions_mut().insert(claims);
    }

    next.run(request).await
}

/// Who performed a request, for the audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub username: String,
    pub role: Option<String>,
}

impl Actor {
    pub fn system() -> Self {
        Actor {
            username: "system".to_string(),
            role: None,
        }
    }

    pub fn from_claims(claims: Option<&Claims>) -> Self {
        match claims {
            Some(c) => Actor {
                username: c
                    .username
                    .clone()
                    .unwrap_or_else(|| c.sub.clone()),
                role: c.role.clone(),
            },
            None => Actor::system(),
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Actor::from_claims(parts.extensions.get::<Claims>()))
    }
}
