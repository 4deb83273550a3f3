use crate::middleware::auth::optional_auth_middleware;
use crate::state::AppState;
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

pub mod audit;
pub mod auth;
pub mod distribution;
pub mod health;
pub mod rsbsa;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(rsbsa::router())
        .merge(distribution::router())
        .merge(audit::router())
}

/// The full application: API routes, uploaded files and the built frontend
/// as a fallback for client-side routes.
pub fn build_app(state: AppState) -> Router {
    let frontend = ServeDir::new(&state.config.frontend_dir)
        .not_found_service(ServeFile::new(state.config.frontend_dir.join("index.html")));

    create_router()
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        .fallback_service(frontend)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            optional_auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
