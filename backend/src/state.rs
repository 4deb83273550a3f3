use crate::config::AppConfig;
use crate::db::DbPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<AppConfig>,
}

impl axum::extract::FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

#[cfg(test)]
pub fn test_state() -> AppState {
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
    use std::path::PathBuf;
    use std::time::Duration;

    // Never connects unless a handler reaches the database.
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(1))
        .connect_lazy_with(
            PgConnectOptions::new()
                .host("127.0.0.1")
                .port(1)
                .database("rsbsa_test"),
        );

    AppState {
        pool,
        config: Arc::new(AppConfig {
            database_url: String::new(),
            port: 0,
            frontend_dir: PathBuf::from("does-not-exist"),
            upload_dir: PathBuf::from("does-not-exist"),
            jwt_secret: "test-secret".to_string(),
            admin_username: "admin".to_string(),
            admin_password: "admin123".to_string(),
        }),
    }
}
