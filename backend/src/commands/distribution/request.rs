use super::catalog::{parse_quantities, quantity, zero_quantities, Season, COMMODITIES};
use crate::commands::audit::{self, AuditAction, AuditEntry, AuditModule};
use crate::commands::rsbsa::shape::SubmissionShape;
use crate::commands::rsbsa::submission::load_submission;
use crate::commands::utils::{body_field, body_id, into_object, optional_date, parse_id, value_text};
use crate::db::FarmerRequest;
use crate::error::{RsbsaError, RsbsaResult};
use crate::middleware::auth::Actor;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{PgExecutor, Postgres, QueryBuilder};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Distributed,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Distributed => "distributed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = RsbsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            "distributed" => Ok(RequestStatus::Distributed),
            _ => Err(RsbsaError::validation(
                "Invalid status. Must be one of: pending, approved, rejected, distributed",
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestFilter {
    pub season: Option<String>,
    pub status: Option<String>,
    pub barangay: Option<String>,
}

/// Checked filter values, ready to push into a WHERE clause.
#[derive(Debug, Default, PartialEq)]
pub struct RequestQuery {
    pub season: Option<Season>,
    pub status: Option<RequestStatus>,
    pub barangay: Option<String>,
}

impl RequestFilter {
    pub fn validate(&self) -> RsbsaResult<RequestQuery> {
        let non_blank = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Ok(RequestQuery {
            season: non_blank(&self.season).map(|s| s.parse()).transpose()?,
            status: non_blank(&self.status).map(|s| s.parse()).transpose()?,
            barangay: non_blank(&self.barangay),
        })
    }
}

pub async fn find_requests<'e, E: PgExecutor<'e>>(
    executor: E,
    query: &RequestQuery,
) -> RsbsaResult<Vec<FarmerRequest>> {
    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT * FROM farmer_requests WHERE 1 = 1");
    if let Some(season) = &query.season {
        qb.push(" AND season = ").push_bind(season.to_string());
    }
    if let Some(status) = query.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(barangay) = &query.barangay {
        qb.push(" AND barangay ILIKE ").push_bind(barangay.clone());
    }
    qb.push(" ORDER BY created_at DESC, id DESC");

    let requests = qb
        .build_query_as::<FarmerRequest>()
        .fetch_all(executor)
        .await?;
    Ok(requests)
}

pub async fn get_requests(
    State(state): State<AppState>,
    Query(filter): Query<RequestFilter>,
) -> RsbsaResult<Json<Vec<FarmerRequest>>> {
    let query = filter.validate()?;
    Ok(Json(find_requests(&state.pool, &query).await?))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> RsbsaResult<Json<FarmerRequest>> {
    let id = parse_id(&id)?;
    sqlx::query_as::<_, FarmerRequest>("SELECT * FROM farmer_requests WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .map(Json)
        .ok_or_else(|| RsbsaError::not_found("Request not found"))
}

pub async fn create_request(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<Value>,
) -> RsbsaResult<(StatusCode, Json<FarmerRequest>)> {
    let body = into_object(body)?;
    let season: Season = value_text(body.get("season"))
        .ok_or_else(|| RsbsaError::validation("Season is required"))?
        .parse()?;
    let farmer_id = body_id(body_field(&body, "farmer_id", "farmerId"), "Farmer")?;
    let mut quantities = zero_quantities();
    quantities.extend(parse_quantities(&body)?);
    if quantities.values().all(|q| *q <= Decimal::ZERO) {
        return Err(RsbsaError::validation(
            "Request must include at least one fertilizer or seed quantity",
        ));
    }
    let status = match value_text(body.get("status")) {
        Some(raw) => raw.parse::<RequestStatus>()?,
        None => RequestStatus::Pending,
    };
    let request_date = optional_date(
        body_field(&body, "request_date", "requestDate"),
        "request date",
    )?
    .unwrap_or_else(|| chrono::Local::now().date_naive());
    let notes = value_text(body.get("notes"));

    let shape = SubmissionShape::detect(&state.pool).await?;
    let farmer = load_submission(&state.pool, &shape, farmer_id)
        .await?
        .ok_or_else(|| RsbsaError::not_found("Farmer not found"))?;

    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO farmer_requests (season, farmer_id, farmer_name, barangay, ");
    {
        let mut cols = qb.separated(", ");
        for c in COMMODITIES {
            cols.push(c.column);
        }
    }
    qb.push(", status, notes, request_date, created_by) VALUES (");
    {
        let mut values = qb.separated(", ");
        values.push_bind(season.to_string());
        values.push_bind(farmer.id);
        values.push_bind(farmer.farmer_name.clone());
        values.push_bind(farmer.barangay.clone());
        for c in COMMODITIES {
            values.push_bind(quantity(&quantities, c));
        }
        values.push_bind(status.as_str());
        values.push_bind(notes);
        values.push_bind(request_date);
        values.push_bind(actor.username.clone());
    }
    qb.push(") RETURNING *");

    let mut tx = state.pool.begin().await?;
    let created = qb
        .build_query_as::<FarmerRequest>()
        .fetch_one(&mut *tx)
        .await?;
    audit::record(
        &mut *tx,
        &AuditEntry::new(
            &actor,
            AuditAction::Create,
            AuditModule::Request,
            format!("Filed {} request for {}", season, created.farmer_name),
        )
        .record_id(created.id)
        .new_values(serde_json::to_value(&created)?),
    )
    .await?;
    tx.commit().await?;

    tracing::info!("Request {} filed for farmer {} ({})", created.id, farmer_id, season);
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_request(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> RsbsaResult<Json<FarmerRequest>> {
    let id = parse_id(&id)?;
    let body = into_object(body)?;

    let quantities = parse_quantities(&body)?;
    let status = match value_text(body.get("status")) {
        Some(raw) => Some(raw.parse::<RequestStatus>()?),
        None => None,
    };
    let notes = body.get("notes").map(|v| value_text(Some(v)));

    if quantities.is_empty() && status.is_none() && notes.is_none() {
        return Err(RsbsaError::validation("No valid fields to update"));
    }

    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE farmer_requests SET ");
    {
        let mut sets = qb.separated(", ");
        for (column, value) in &quantities {
            sets.push(format!("{} = ", column));
            sets.push_bind_unseparated(*value);
        }
        if let Some(status) = status {
            sets.push("status = ");
            sets.push_bind_unseparated(status.as_str());
        }
        if let Some(notes) = notes {
            sets.push("notes = ");
            sets.push_bind_unseparated(notes);
        }
        sets.push("updated_at = NOW()");
    }
    qb.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

    let mut tx = state.pool.begin().await?;
    let before = sqlx::query_as::<_, FarmerRequest>("SELECT * FROM farmer_requests WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RsbsaError::not_found("Request not found"))?;
    let updated = qb
        .build_query_as::<FarmerRequest>()
        .fetch_one(&mut *tx)
        .await?;

    let description = match status {
        Some(s) if before.status != s.as_str() => format!(
            "Request {} for {} moved from {} to {}",
            id, updated.farmer_name, before.status, s
        ),
        _ => format!("Updated request {} for {}", id, updated.farmer_name),
    };
    audit::record(
        &mut *tx,
        &AuditEntry::new(&actor, AuditAction::Update, AuditModule::Request, description)
            .record_id(id)
            .old_values(serde_json::to_value(&before)?)
            .new_values(serde_json::to_value(&updated)?),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(updated))
}

pub async fn delete_request(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> RsbsaResult<Json<Value>> {
    let id = parse_id(&id)?;

    let mut tx = state.pool.begin().await?;
    let deleted = sqlx::query_as::<_, FarmerRequest>(
        "DELETE FROM farmer_requests WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| RsbsaError::not_found("Request not found"))?;

    let snapshot = serde_json::to_value(&deleted)?;
    audit::record(
        &mut *tx,
        &AuditEntry::new(
            &actor,
            AuditAction::Delete,
            AuditModule::Request,
            format!("Deleted request {} for {}", id, deleted.farmer_name),
        )
        .record_id(id)
        .old_values(snapshot.clone()),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(json!({
        "message": "Request deleted successfully",
        "deletedRequest": snapshot,
    })))
}
