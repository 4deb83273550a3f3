use super::allocation::find_allocation;
use super::analysis::{
    barangay_shortages, gap_analysis, historical_comparison, recommendations, BarangayShortage,
    Demand, GapAnalysis, Recommendations, SeasonComparison, SeasonTotals,
};
use super::catalog::{read_quantities, sum_columns, Quantities, Season};
use super::request::{find_requests, RequestQuery};
use crate::db::{DbPool, RegionalAllocation};
use crate::error::RsbsaResult;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use sqlx::Row;
use std::collections::BTreeMap;

async fn season_demand(pool: &DbPool, season: &Season) -> RsbsaResult<Demand> {
    let sql = format!(
        "SELECT {}, COUNT(*) AS request_count, COUNT(DISTINCT farmer_id) AS farmer_count
         FROM farmer_requests WHERE season = $1 AND status <> 'rejected'",
        sum_columns()
    );
    let row = sqlx::query(&sql)
        .bind(season.to_string())
        .fetch_one(pool)
        .await?;
    Ok(Demand {
        requested: read_quantities(&row)?,
        request_count: row.try_get("request_count")?,
        farmer_count: row.try_get("farmer_count")?,
    })
}

async fn season_distributed(pool: &DbPool, season: &Season) -> RsbsaResult<Quantities> {
    let sql = format!(
        "SELECT {} FROM distribution_records WHERE season = $1",
        sum_columns()
    );
    let row = sqlx::query(&sql)
        .bind(season.to_string())
        .fetch_one(pool)
        .await?;
    Ok(read_quantities(&row)?)
}

async fn analyse(pool: &DbPool, season: &Season) -> RsbsaResult<GapAnalysis> {
    let allocation = find_allocation(pool, season).await?;
    let demand = season_demand(pool, season).await?;
    let distributed = season_distributed(pool, season).await?;
    Ok(gap_analysis(
        season,
        allocation.as_ref().map(|a| &a.quantities),
        &demand,
        &distributed,
    ))
}

pub async fn get_gap_analysis(
    State(state): State<AppState>,
    Path(season): Path<String>,
) -> RsbsaResult<Json<GapAnalysis>> {
    let season: Season = season.parse()?;
    Ok(Json(analyse(&state.pool, &season).await?))
}

pub async fn get_recommendations(
    State(state): State<AppState>,
    Path(season): Path<String>,
) -> RsbsaResult<Json<Recommendations>> {
    let season: Season = season.parse()?;
    let analysis = analyse(&state.pool, &season).await?;
    Ok(Json(recommendations(&analysis)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BarangayShortageReport {
    pub season: String,
    pub has_allocation: bool,
    pub barangays: Vec<BarangayShortage>,
}

pub async fn get_barangay_shortages(
    State(state): State<AppState>,
    Path(season): Path<String>,
) -> RsbsaResult<Json<BarangayShortageReport>> {
    let season: Season = season.parse()?;
    let analysis = analyse(&state.pool, &season).await?;
    let requests = find_requests(
        &state.pool,
        &RequestQuery {
            season: Some(season),
            ..RequestQuery::default()
        },
    )
    .await?;

    Ok(Json(BarangayShortageReport {
        season: analysis.season.clone(),
        has_allocation: analysis.has_allocation,
        barangays: barangay_shortages(&analysis, &requests),
    }))
}

async fn sums_by_season(
    pool: &DbPool,
    table: &str,
    filter: &str,
) -> RsbsaResult<Vec<(String, Quantities)>> {
    let sql = format!(
        "SELECT season, {} FROM {} {} GROUP BY season",
        sum_columns(),
        table,
        filter
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push((row.try_get::<String, _>("season")?, read_quantities(&row)?));
    }
    Ok(out)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalReport {
    pub has_data: bool,
    pub seasons: Vec<SeasonComparison>,
}

pub async fn get_historical_comparison(
    State(state): State<AppState>,
) -> RsbsaResult<Json<HistoricalReport>> {
    let allocations =
        sqlx::query_as::<_, RegionalAllocation>("SELECT * FROM regional_allocations")
            .fetch_all(&state.pool)
            .await?;
    let requested =
        sums_by_season(&state.pool, "farmer_requests", "WHERE status <> 'rejected'").await?;
    let distributed = sums_by_season(&state.pool, "distribution_records", "").await?;

    let mut totals: BTreeMap<String, SeasonTotals> = BTreeMap::new();
    for a in allocations {
        totals.entry(a.season).or_default().allocated = Some(a.quantities);
    }
    for (season, q) in requested {
        totals.entry(season).or_default().requested = q;
    }
    for (season, q) in distributed {
        totals.entry(season).or_default().distributed = q;
    }

    let seasons = historical_comparison(totals);
    Ok(Json(HistoricalReport {
        has_data: !seasons.is_empty(),
        seasons,
    }))
}
