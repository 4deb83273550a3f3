use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/register", post(commands::auth::register))
        .route("/api/login", post(commands::auth::login))
        .route("/api/users", get(commands::auth::get_users))
}
