use super::submission::{load_submissions, SubmissionRecord};
use super::shape::SubmissionShape;
use crate::commands::audit::{self, AuditAction, AuditEntry, AuditModule};
use crate::commands::utils::{
    into_object, max_area, parse_decimal, parse_id, value_flag, value_text, yes_no,
};
use crate::db::{DbPool, FarmParcel};
use crate::error::{RsbsaError, RsbsaResult};
use crate::middleware::auth::Actor;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{PgConnection, PgExecutor, Postgres, QueryBuilder};
use std::collections::HashMap;

/// One farmland parcel as the registration form sends it.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParcelInput {
    pub parcel_number: Option<Value>,
    pub farm_location_barangay: Option<Value>,
    pub farm_location_municipality: Option<Value>,
    pub total_farm_area_ha: Option<Value>,
    pub within_ancestral_domain: Option<Value>,
    pub ownership_document_no: Option<Value>,
    pub agrarian_reform_beneficiary: Option<Value>,
    pub ownership_type_registered_owner: Option<Value>,
    pub ownership_type_tenant: Option<Value>,
    pub ownership_type_lessee: Option<Value>,
    pub ownership_type_others: Option<Value>,
    pub tenant_land_owner_name: Option<Value>,
    pub lessee_land_owner_name: Option<Value>,
    pub ownership_others_specify: Option<Value>,
}

impl ParcelInput {
    pub fn has_ownership_type(&self) -> bool {
        value_flag(self.ownership_type_registered_owner.as_ref())
            || value_flag(self.ownership_type_tenant.as_ref())
            || value_flag(self.ownership_type_lessee.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewParcel {
    pub parcel_number: String,
    pub barangay: Option<String>,
    pub municipality: Option<String>,
    pub area: Option<Decimal>,
    pub within_ancestral_domain: &'static str,
    pub ownership_document_no: Option<String>,
    pub agrarian_reform_beneficiary: &'static str,
    pub registered_owner: bool,
    pub tenant: bool,
    pub lessee: bool,
    pub others: bool,
    pub tenant_land_owner_name: Option<String>,
    pub lessee_land_owner_name: Option<String>,
    pub ownership_others_specify: Option<String>,
}

impl NewParcel {
    /// `index` is zero-based; messages and default parcel numbers are one-based.
    pub fn from_input(index: usize, input: &ParcelInput) -> RsbsaResult<Self> {
        let number = index + 1;
        let area = match parse_decimal(input.total_farm_area_ha.as_ref()) {
            Ok(Some(a)) if a < Decimal::ZERO || a > max_area() => None,
            Ok(a) => Some(a),
            Err(()) => None,
        }
        .ok_or_else(|| {
            RsbsaError::validation(format!(
                "Parcel {}: farm area must be a non-negative number",
                number
            ))
        })?;

        Ok(NewParcel {
            parcel_number: value_text(input.parcel_number.as_ref())
                .unwrap_or_else(|| number.to_string()),
            barangay: value_text(input.farm_location_barangay.as_ref()),
            municipality: value_text(input.farm_location_municipality.as_ref()),
            area,
            within_ancestral_domain: yes_no(input.within_ancestral_domain.as_ref()),
            ownership_document_no: value_text(input.ownership_document_no.as_ref()),
            agrarian_reform_beneficiary: yes_no(input.agrarian_reform_beneficiary.as_ref()),
            registered_owner: value_flag(input.ownership_type_registered_owner.as_ref()),
            tenant: value_flag(input.ownership_type_tenant.as_ref()),
            lessee: value_flag(input.ownership_type_lessee.as_ref()),
            others: value_flag(input.ownership_type_others.as_ref()),
            tenant_land_owner_name: value_text(input.tenant_land_owner_name.as_ref()),
            lessee_land_owner_name: value_text(input.lessee_land_owner_name.as_ref()),
            ownership_others_specify: value_text(input.ownership_others_specify.as_ref()),
        })
    }

    pub fn location(&self) -> Option<String> {
        let parts: Vec<&str> = [self.barangay.as_deref(), self.municipality.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

pub async fn insert_parcel(
    conn: &mut PgConnection,
    submission_id: i64,
    parcel: &NewParcel,
) -> RsbsaResult<i64> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO rsbsa_farm_parcels (
            submission_id, parcel_number, farm_location_barangay, farm_location_municipality,
            total_farm_area_ha, within_ancestral_domain, ownership_document_no, agrarian_reform_beneficiary,
            ownership_type_registered_owner, ownership_type_tenant, ownership_type_lessee, ownership_type_others,
            tenant_land_owner_name, lessee_land_owner_name, ownership_others_specify
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING id",
    )
    .bind(submission_id)
    .bind(&parcel.parcel_number)
    .bind(&parcel.barangay)
    .bind(&parcel.municipality)
    .bind(parcel.area)
    .bind(parcel.within_ancestral_domain)
    .bind(&parcel.ownership_document_no)
    .bind(parcel.agrarian_reform_beneficiary)
    .bind(parcel.registered_owner)
    .bind(parcel.tenant)
    .bind(parcel.lessee)
    .bind(parcel.others)
    .bind(&parcel.tenant_land_owner_name)
    .bind(&parcel.lessee_land_owner_name)
    .bind(&parcel.ownership_others_specify)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

pub async fn load_parcels<'e, E: PgExecutor<'e>>(
    executor: E,
    submission_id: Option<i64>,
) -> RsbsaResult<Vec<FarmParcel>> {
    let parcels = match submission_id {
        Some(id) => {
            sqlx::query_as::<_, FarmParcel>(
                "SELECT * FROM rsbsa_farm_parcels WHERE submission_id = $1 ORDER BY id ASC",
            )
            .bind(id)
            .fetch_all(executor)
            .await?
        }
        None => {
            sqlx::query_as::<_, FarmParcel>(
                "SELECT * FROM rsbsa_farm_parcels ORDER BY submission_id ASC, id ASC",
            )
            .fetch_all(executor)
            .await?
        }
    };
    Ok(parcels)
}

async fn submission_exists(pool: &DbPool, id: i64) -> RsbsaResult<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM rsbsa_submission WHERE id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

pub async fn get_submission_parcels(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> RsbsaResult<Json<Vec<FarmParcel>>> {
    let id = parse_id(&id)?;
    if !submission_exists(&state.pool, id).await? {
        return Err(RsbsaError::not_found("Submission not found"));
    }
    Ok(Json(load_parcels(&state.pool, Some(id)).await?))
}

#[derive(Debug, Serialize)]
pub struct ParcelWithOwner {
    #[serde(flatten)]
    pub parcel: FarmParcel,
    pub farmer_name: Option<String>,
    pub farmer_barangay: Option<String>,
    pub farmer_status: Option<String>,
}

pub fn attach_owners(
    parcels: Vec<FarmParcel>,
    records: &[SubmissionRecord],
) -> Vec<ParcelWithOwner> {
    let by_id: HashMap<i64, &SubmissionRecord> = records.iter().map(|r| (r.id, r)).collect();
    parcels
        .into_iter()
        .map(|parcel| {
            let owner = by_id.get(&parcel.submission_id);
            ParcelWithOwner {
                farmer_name: owner.map(|r| r.farmer_name.clone()),
                farmer_barangay: owner.and_then(|r| r.barangay.clone()),
                farmer_status: owner.map(|r| r.status.clone()),
                parcel,
            }
        })
        .collect()
}

pub async fn get_all_parcels(
    State(state): State<AppState>,
) -> RsbsaResult<Json<Vec<ParcelWithOwner>>> {
    let shape = SubmissionShape::detect(&state.pool).await?;
    let records = load_submissions(&state.pool, &shape).await?;
    let parcels = load_parcels(&state.pool, None).await?;
    Ok(Json(attach_owners(parcels, &records)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmerParcels {
    pub submission_id: i64,
    pub farmer_name: String,
    pub barangay: Option<String>,
    pub status: String,
    pub parcel_count: usize,
    pub total_area: Decimal,
    pub parcels: Vec<FarmParcel>,
}

/// Groups parcels under their farmer. Farmers without parcels are listed with none.
pub fn group_by_farmer(records: &[SubmissionRecord], parcels: Vec<FarmParcel>) -> Vec<FarmerParcels> {
    let mut grouped: HashMap<i64, Vec<FarmParcel>> = HashMap::new();
    for parcel in parcels {
        grouped.entry(parcel.submission_id).or_default().push(parcel);
    }

    let mut out: Vec<FarmerParcels> = records
        .iter()
        .map(|r| {
            let parcels = grouped.remove(&r.id).unwrap_or_default();
            FarmerParcels {
                submission_id: r.id,
                farmer_name: r.farmer_name.clone(),
                barangay: r.barangay.clone(),
                status: r.status.clone(),
                parcel_count: parcels.len(),
                total_area: parcels.iter().map(FarmParcel::area).sum(),
                parcels,
            }
        })
        .collect();
    out.sort_by(|a, b| a.farmer_name.to_lowercase().cmp(&b.farmer_name.to_lowercase()));
    out
}

pub async fn get_parcels_by_farmer(
    State(state): State<AppState>,
) -> RsbsaResult<Json<Vec<FarmerParcels>>> {
    let shape = SubmissionShape::detect(&state.pool).await?;
    let records = load_submissions(&state.pool, &shape).await?;
    let parcels = load_parcels(&state.pool, None).await?;
    Ok(Json(group_by_farmer(&records, parcels)))
}

const PARCEL_TEXT_FIELDS: &[(&str, &str)] = &[
    ("parcelNumber", "parcel_number"),
    ("farmLocationBarangay", "farm_location_barangay"),
    ("farmLocationMunicipality", "farm_location_municipality"),
    ("ownershipDocumentNo", "ownership_document_no"),
    ("tenantLandOwnerName", "tenant_land_owner_name"),
    ("lesseeLandOwnerName", "lessee_land_owner_name"),
    ("ownershipOthersSpecify", "ownership_others_specify"),
];

const PARCEL_FLAG_FIELDS: &[(&str, &str)] = &[
    ("ownershipTypeRegisteredOwner", "ownership_type_registered_owner"),
    ("ownershipTypeTenant", "ownership_type_tenant"),
    ("ownershipTypeLessee", "ownership_type_lessee"),
    ("ownershipTypeOthers", "ownership_type_others"),
];

const PARCEL_YES_NO_FIELDS: &[(&str, &str)] = &[
    ("withinAncestralDomain", "within_ancestral_domain"),
    ("agrarianReformBeneficiary", "agrarian_reform_beneficiary"),
];

fn patch_value<'a>(patch: &'a Map<String, Value>, json_key: &str, column: &str) -> Option<&'a Value> {
    patch.get(json_key).or_else(|| patch.get(column))
}

pub async fn update_parcel(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> RsbsaResult<Json<FarmParcel>> {
    let id = parse_id(&id)?;
    let patch = into_object(body)?;

    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE rsbsa_farm_parcels SET ");
    let mut touched = 0usize;
    {
        let mut sep = qb.separated(", ");
        for (key, column) in PARCEL_TEXT_FIELDS {
            if let Some(v) = patch_value(&patch, key, column) {
                sep.push(format!("{} = ", column));
                sep.push_bind_unseparated(value_text(Some(v)));
                touched += 1;
            }
        }
        for (key, column) in PARCEL_FLAG_FIELDS {
            if let Some(v) = patch_value(&patch, key, column) {
                sep.push(format!("{} = ", column));
                sep.push_bind_unseparated(value_flag(Some(v)));
                touched += 1;
            }
        }
        for (key, column) in PARCEL_YES_NO_FIELDS {
            if let Some(v) = patch_value(&patch, key, column) {
                sep.push(format!("{} = ", column));
                sep.push_bind_unseparated(yes_no(Some(v)));
                touched += 1;
            }
        }
        if let Some(v) = patch_value(&patch, "totalFarmAreaHa", "total_farm_area_ha") {
            let area = match parse_decimal(Some(v)) {
                Ok(a) if a.map_or(true, |a| a >= Decimal::ZERO && a <= max_area()) => a,
                _ => {
                    return Err(RsbsaError::validation(
                        "Farm area must be a non-negative number",
                    ))
                }
            };
            sep.push("total_farm_area_ha = ");
            sep.push_bind_unseparated(area);
            touched += 1;
        }
        if touched == 0 {
            return Err(RsbsaError::validation("No valid fields to update"));
        }
        sep.push("updated_at = NOW()");
    }
    qb.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

    let mut tx = state.pool.begin().await?;
    let before = sqlx::query_as::<_, FarmParcel>("SELECT * FROM rsbsa_farm_parcels WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RsbsaError::not_found("Parcel not found"))?;

    let updated = qb
        .build_query_as::<FarmParcel>()
        .fetch_one(&mut *tx)
        .await?;

    let still_owned = updated.ownership_type_registered_owner
        || updated.ownership_type_tenant
        || updated.ownership_type_lessee;
    if !still_owned {
        let others_owned: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM rsbsa_farm_parcels WHERE submission_id = $1 AND id <> $2
             AND (ownership_type_registered_owner OR ownership_type_tenant OR ownership_type_lessee))",
        )
        .bind(updated.submission_id)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if !others_owned {
            return Err(RsbsaError::validation(
                "At least one farmland parcel must have an ownership type (registered owner, tenant, or lessee)",
            ));
        }
    }

    audit::record(
        &mut *tx,
        &AuditEntry::new(
            &actor,
            AuditAction::Update,
            AuditModule::FarmParcels,
            format!("Updated parcel {} of submission {}", id, updated.submission_id),
        )
        .record_id(id)
        .old_values(serde_json::to_value(&before)?)
        .new_values(serde_json::to_value(&updated)?),
    )
    .await?;
    tx.commit().await?;

    tracing::info!("Parcel {} updated by {}", id, actor.username);
    Ok(Json(updated))
}
