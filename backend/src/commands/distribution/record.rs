use super::catalog::{parse_quantities, quantity, Quantities, Season, COMMODITIES};
use super::request::RequestStatus;
use crate::commands::audit::{self, AuditAction, AuditEntry, AuditModule};
use crate::commands::utils::{body_field, body_id, into_object, optional_date, value_text};
use crate::db::{DistributionRecord, FarmerRequest};
use crate::error::{RsbsaError, RsbsaResult};
use crate::middleware::auth::Actor;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};

#[derive(Debug, Default, Deserialize)]
pub struct RecordFilter {
    pub season: Option<String>,
    pub barangay: Option<String>,
}

pub async fn get_records(
    State(state): State<AppState>,
    Query(filter): Query<RecordFilter>,
) -> RsbsaResult<Json<Vec<DistributionRecord>>> {
    let season = match filter.season.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<Season>()?),
        None => None,
    };

    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT * FROM distribution_records WHERE 1 = 1");
    if let Some(season) = season {
        qb.push(" AND season = ").push_bind(season.to_string());
    }
    if let Some(barangay) = filter.barangay.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        qb.push(" AND barangay ILIKE ").push_bind(barangay.to_string());
    }
    qb.push(" ORDER BY distribution_date DESC NULLS LAST, id DESC");

    let records = qb
        .build_query_as::<DistributionRecord>()
        .fetch_all(&state.pool)
        .await?;
    Ok(Json(records))
}

/// What actually gets released: explicit quantities when the body has any,
/// otherwise everything the farmer asked for.
pub fn released_quantities(request: &FarmerRequest, given: Quantities) -> Quantities {
    if given.is_empty() {
        request.quantities.clone()
    } else {
        COMMODITIES
            .iter()
            .map(|c| (c.column.to_string(), quantity(&given, c)))
            .collect()
    }
}

pub fn check_distributable(request: &FarmerRequest) -> RsbsaResult<()> {
    match request.status.parse::<RequestStatus>() {
        Ok(RequestStatus::Rejected) => Err(RsbsaError::validation(
            "Cannot distribute to a rejected request",
        )),
        Ok(RequestStatus::Distributed) => Err(RsbsaError::Conflict(
            "Request has already been distributed".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Records a release against a request and marks the request distributed.
pub async fn create_record(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<Value>,
) -> RsbsaResult<(StatusCode, Json<DistributionRecord>)> {
    let body = into_object(body)?;
    let request_id = body_id(body_field(&body, "request_id", "requestId"), "Request")?;
    let given = parse_quantities(&body)?;
    let distribution_date = optional_date(
        body_field(&body, "distribution_date", "distributionDate"),
        "distribution date",
    )?
    .unwrap_or_else(|| chrono::Local::now().date_naive());
    let notes = value_text(body_field(&body, "verification_notes", "verificationNotes"));

    let mut tx = state.pool.begin().await?;
    let request = sqlx::query_as::<_, FarmerRequest>(
        "SELECT * FROM farmer_requests WHERE id = $1 FOR UPDATE",
    )
    .bind(request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| RsbsaError::not_found("Request not found"))?;
    check_distributable(&request)?;

    let released = released_quantities(&request, given);
    if released.values().all(|q| *q <= Decimal::ZERO) {
        return Err(RsbsaError::validation("Nothing to distribute for this request"));
    }

    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO distribution_records (request_id, season, farmer_id, farmer_name, barangay, ",
    );
    {
        let mut cols = qb.separated(", ");
        for c in COMMODITIES {
            cols.push(c.column);
        }
    }
    qb.push(", distribution_date, distributed_by, verification_notes) VALUES (");
    {
        let mut values = qb.separated(", ");
        values.push_bind(request.id);
        values.push_bind(request.season.clone());
        values.push_bind(request.farmer_id);
        values.push_bind(request.farmer_name.clone());
        values.push_bind(request.barangay.clone());
        for c in COMMODITIES {
            values.push_bind(quantity(&released, c));
        }
        values.push_bind(distribution_date);
        values.push_bind(actor.username.clone());
        values.push_bind(notes);
    }
    qb.push(") RETURNING *");

    let record = qb
        .build_query_as::<DistributionRecord>()
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query("UPDATE farmer_requests SET status = $1, updated_at = NOW() WHERE id = $2")
        .bind(RequestStatus::Distributed.as_str())
        .bind(request.id)
        .execute(&mut *tx)
        .await?;

    audit::record(
        &mut *tx,
        &AuditEntry::new(
            &actor,
            AuditAction::Distribute,
            AuditModule::Distribution,
            format!(
                "Released {} inputs to {} for request {}",
                request.season, request.farmer_name, request.id
            ),
        )
        .record_id(record.id)
        .old_values(serde_json::to_value(&request)?)
        .new_values(serde_json::to_value(&record)?),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        "Distribution {} recorded for request {} by {}",
        record.id,
        request.id,
        actor.username
    );
    Ok((StatusCode::CREATED, Json(record)))
}
