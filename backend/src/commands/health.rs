use crate::error::RsbsaResult;
use crate::state::AppState;
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "message": "RSBSA backend is running",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Round-trips a trivial query so operators can tell the pool is live.
pub async fn test_db(State(state): State<AppState>) -> RsbsaResult<Json<Value>> {
    let (now,): (DateTime<Utc>,) = sqlx::query_as("SELECT NOW()")
        .fetch_one(&state.pool)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Database connection successful",
        "time": now.to_rfc3339(),
    })))
}
