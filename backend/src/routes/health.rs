use crate::commands;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(commands::health::health))
        .route("/api/test-db", get(commands::health::test_db))
}
