use super::catalog::{parse_quantities, quantity, zero_quantities, Season, COMMODITIES};
use crate::commands::audit::{self, AuditAction, AuditEntry, AuditModule};
use crate::commands::utils::{body_field, into_object, optional_date, parse_id, value_text};
use crate::db::RegionalAllocation;
use crate::error::{RsbsaError, RsbsaResult};
use crate::middleware::auth::Actor;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use sqlx::{PgExecutor, Postgres, QueryBuilder};

pub async fn find_allocation<'e, E: PgExecutor<'e>>(
    executor: E,
    season: &Season,
) -> RsbsaResult<Option<RegionalAllocation>> {
    let allocation = sqlx::query_as::<_, RegionalAllocation>(
        "SELECT * FROM regional_allocations WHERE season = $1",
    )
    .bind(season.to_string())
    .fetch_optional(executor)
    .await?;
    Ok(allocation)
}

pub async fn get_allocations(
    State(state): State<AppState>,
) -> RsbsaResult<Json<Vec<RegionalAllocation>>> {
    let mut allocations = sqlx::query_as::<_, RegionalAllocation>(
        "SELECT * FROM regional_allocations ORDER BY id DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    // newest season first; unparseable legacy keys go last
    allocations.sort_by(|a, b| {
        let (sa, sb) = (a.season.parse::<Season>().ok(), b.season.parse::<Season>().ok());
        sb.cmp(&sa)
    });
    Ok(Json(allocations))
}

/// `key` is either a season such as `wet_2025` or a numeric allocation id.
pub async fn get_allocation(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> RsbsaResult<Json<RegionalAllocation>> {
    let found = if key.trim().bytes().all(|b| b.is_ascii_digit()) {
        let id = parse_id(&key)?;
        sqlx::query_as::<_, RegionalAllocation>("SELECT * FROM regional_allocations WHERE id = $1")
            .bind(id)
            .fetch_optional(&state.pool)
            .await?
    } else {
        let season: Season = key.parse()?;
        find_allocation(&state.pool, &season).await?
    };

    found
        .map(Json)
        .ok_or_else(|| RsbsaError::not_found(format!("No allocation found for {}", key.trim())))
}

pub async fn create_allocation(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<Value>,
) -> RsbsaResult<(StatusCode, Json<RegionalAllocation>)> {
    let body = into_object(body)?;
    let season: Season = value_text(body.get("season"))
        .ok_or_else(|| RsbsaError::validation("Season is required"))?
        .parse()?;
    let allocation_date = optional_date(
        body_field(&body, "allocation_date", "allocationDate"),
        "allocation date",
    )?
    .unwrap_or_else(|| chrono::Local::now().date_naive());
    let mut quantities = zero_quantities();
    quantities.extend(parse_quantities(&body)?);
    let notes = value_text(body.get("notes"));

    if find_allocation(&state.pool, &season).await?.is_some() {
        return Err(RsbsaError::Conflict(format!(
            "An allocation for {} already exists",
            season
        )));
    }

    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO regional_allocations (season, allocation_date, ");
    {
        let mut cols = qb.separated(", ");
        for c in COMMODITIES {
            cols.push(c.column);
        }
    }
    qb.push(", notes, created_by) VALUES (");
    {
        let mut values = qb.separated(", ");
        values.push_bind(season.to_string());
        values.push_bind(allocation_date);
        for c in COMMODITIES {
            values.push_bind(quantity(&quantities, c));
        }
        values.push_bind(notes);
        values.push_bind(actor.username.clone());
    }
    qb.push(") RETURNING *");

    let mut tx = state.pool.begin().await?;
    let created = qb
        .build_query_as::<RegionalAllocation>()
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            RsbsaError::conflict_on_unique(e, format!("An allocation for {} already exists", season))
        })?;

    audit::record(
        &mut *tx,
        &AuditEntry::new(
            &actor,
            AuditAction::Create,
            AuditModule::Allocation,
            format!("Recorded regional allocation for {}", season),
        )
        .record_id(created.id)
        .new_values(serde_json::to_value(&created)?),
    )
    .await?;
    tx.commit().await?;

    tracing::info!("Allocation {} created for {}", created.id, season);
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_allocation(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> RsbsaResult<Json<RegionalAllocation>> {
    let id = parse_id(&id)?;
    let body = into_object(body)?;

    let season = match value_text(body.get("season")) {
        Some(raw) => Some(raw.parse::<Season>()?),
        None => None,
    };
    let allocation_date = optional_date(
        body_field(&body, "allocation_date", "allocationDate"),
        "allocation date",
    )?;
    let quantities = parse_quantities(&body)?;
    let notes = body.get("notes").map(|v| value_text(Some(v)));

    if season.is_none() && allocation_date.is_none() && quantities.is_empty() && notes.is_none() {
        return Err(RsbsaError::validation("No valid fields to update"));
    }

    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE regional_allocations SET ");
    {
        let mut sets = qb.separated(", ");
        if let Some(season) = &season {
            sets.push("season = ");
            sets.push_bind_unseparated(season.to_string());
        }
        if let Some(date) = allocation_date {
            sets.push("allocation_date = ");
            sets.push_bind_unseparated(date);
        }
        for (column, value) in &quantities {
            // keys come from the commodity catalog only
            sets.push(format!("{} = ", column));
            sets.push_bind_unseparated(*value);
        }
        if let Some(notes) = notes {
            sets.push("notes = ");
            sets.push_bind_unseparated(notes);
        }
        sets.push("updated_at = NOW()");
    }
    qb.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

    let mut tx = state.pool.begin().await?;
    let before = sqlx::query_as::<_, RegionalAllocation>(
        "SELECT * FROM regional_allocations WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| RsbsaError::not_found("Allocation not found"))?;

    let updated = qb
        .build_query_as::<RegionalAllocation>()
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            RsbsaError::conflict_on_unique(e, "Another allocation already uses that season")
        })?;

    audit::record(
        &mut *tx,
        &AuditEntry::new(
            &actor,
            AuditAction::Update,
            AuditModule::Allocation,
            format!("Updated regional allocation for {}", updated.season),
        )
        .record_id(id)
        .old_values(serde_json::to_value(&before)?)
        .new_values(serde_json::to_value(&updated)?),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(updated))
}

pub async fn delete_allocation(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> RsbsaResult<Json<Value>> {
    let id = parse_id(&id)?;

    let mut tx = state.pool.begin().await?;
    let deleted = sqlx::query_as::<_, RegionalAllocation>(
        "DELETE FROM regional_allocations WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| RsbsaError::not_found("Allocation not found"))?;

    let snapshot = serde_json::to_value(&deleted)?;
    audit::record(
        &mut *tx,
        &AuditEntry::new(
            &actor,
            AuditAction::Delete,
            AuditModule::Allocation,
            format!("Deleted regional allocation for {}", deleted.season),
        )
        .record_id(id)
        .old_values(snapshot.clone()),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(json!({
        "message": "Allocation deleted successfully",
        "deletedAllocation": snapshot,
    })))
}
