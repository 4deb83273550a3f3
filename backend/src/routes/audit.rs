use crate::commands::audit;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/audit/logs", get(audit::get_audit_logs))
        .route("/api/audit/stats", get(audit::get_audit_stats))
        .route("/api/audit/actions", get(audit::get_audit_actions))
        .route("/api/audit/modules", get(audit::get_audit_modules))
        .route("/api/audit/export", get(audit::export_audit_logs))
}
