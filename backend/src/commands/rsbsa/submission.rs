use super::parcel::{insert_parcel, load_parcels, NewParcel, ParcelInput};
use super::shape::{
    farmer_field, lookup_field, plan_update, FieldColumn, FieldValue, SubmissionShape, UpdatePlan,
    BARANGAY, BIRTHDATE, EXT_NAME, FARMER_FIELDS, FARM_LOCATION, FIRST_NAME, GENDER, LAST_NAME,
    MIDDLE_NAME, MUNICIPALITY, OWNER_LESSEE, OWNER_REGISTERED, OWNER_TENANT, PARCEL_AREA,
    SUBMISSION_TABLE, TOTAL_FARM_AREA,
};
use crate::commands::audit::{self, AuditAction, AuditEntry, AuditModule};
use crate::commands::utils::{
    max_area, parse_date_safe, parse_decimal, parse_id, value_flag, value_text,
};
use crate::db::FarmParcel;
use crate::error::{RsbsaError, RsbsaResult};
use crate::middleware::auth::Actor;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sqlx::query_builder::Separated;
use sqlx::{FromRow, PgConnection, PgExecutor, Postgres, QueryBuilder};
use std::fmt;
use std::str::FromStr;

/// One query for both layouts: the row as a JSON document plus a parcel aggregate.
const SUBMISSION_SELECT: &str = "
    SELECT s.id::BIGINT AS id,
           to_jsonb(s) AS doc,
           COALESCE(p.parcel_count, 0) AS parcel_count,
           p.total_area,
           p.parcel_areas,
           COALESCE(p.any_registered_owner, FALSE) AS any_registered_owner,
           COALESCE(p.any_tenant, FALSE) AS any_tenant,
           COALESCE(p.any_lessee, FALSE) AS any_lessee
    FROM rsbsa_submission s
    LEFT JOIN LATERAL (
        SELECT COUNT(*) AS parcel_count,
               SUM(fp.total_farm_area_ha) AS total_area,
               string_agg(fp.total_farm_area_ha::TEXT, ', ' ORDER BY fp.id) AS parcel_areas,
               bool_or(fp.ownership_type_registered_owner) AS any_registered_owner,
               bool_or(fp.ownership_type_tenant) AS any_tenant,
               bool_or(fp.ownership_type_lessee) AS any_lessee
        FROM rsbsa_farm_parcels fp
        WHERE fp.submission_id = s.id
    ) p ON TRUE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    #[serde(rename = "Submitted")]
    Submitted,
    #[serde(rename = "Active Farmer")]
    ActiveFarmer,
    #[serde(rename = "Not Active")]
    NotActive,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Submitted => "Submitted",
            SubmissionStatus::ActiveFarmer => "Active Farmer",
            SubmissionStatus::NotActive => "Not Active",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = RsbsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "submitted" => Ok(SubmissionStatus::Submitted),
            "active farmer" | "active" => Ok(SubmissionStatus::ActiveFarmer),
            "not active" | "inactive" => Ok(SubmissionStatus::NotActive),
            _ => Err(RsbsaError::validation(
                "Invalid status. Must be one of: Submitted, Active Farmer, Not Active",
            )),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct SubmissionRow {
    pub id: i64,
    pub doc: Value,
    pub parcel_count: i64,
    pub total_area: Option<Decimal>,
    pub parcel_areas: Option<String>,
    pub any_registered_owner: bool,
    pub any_tenant: bool,
    pub any_lessee: bool,
}

/// A farmer registration as every reader sees it, whatever the table layout.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRecord {
    pub id: i64,
    #[serde(rename = "referenceNumber")]
    pub reference_number: String,
    #[serde(rename = "farmerName")]
    pub farmer_name: String,
    #[serde(rename = "LAST NAME")]
    pub last_name: Option<String>,
    #[serde(rename = "FIRST NAME")]
    pub first_name: Option<String>,
    #[serde(rename = "MIDDLE NAME")]
    pub middle_name: Option<String>,
    #[serde(rename = "EXT NAME")]
    pub ext_name: Option<String>,
    #[serde(rename = "GENDER")]
    pub gender: Option<String>,
    #[serde(rename = "BIRTHDATE")]
    pub birthdate: Option<NaiveDate>,
    #[serde(rename = "BARANGAY")]
    pub barangay: Option<String>,
    #[serde(rename = "MUNICIPALITY")]
    pub municipality: Option<String>,
    #[serde(rename = "FARM LOCATION")]
    pub farm_location: Option<String>,
    #[serde(rename = "PARCEL AREA")]
    pub parcel_area: Option<String>,
    #[serde(rename = "TOTAL FARM AREA")]
    pub total_farm_area: Decimal,
    #[serde(rename = "PARCEL COUNT")]
    pub parcel_count: i64,
    #[serde(rename = "OWNERSHIP_TYPE_REGISTERED_OWNER")]
    pub registered_owner: bool,
    #[serde(rename = "OWNERSHIP_TYPE_TENANT")]
    pub tenant: bool,
    #[serde(rename = "OWNERSHIP_TYPE_LESSEE")]
    pub lessee: bool,
    pub status: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parcels: Option<Vec<FarmParcel>>,
}

fn json_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

/// `"1.5000, 2.0000"` from the aggregate reads back as `"1.5, 2"`.
fn normalise_areas(raw: &str) -> String {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Decimal::from_str(s)
                .map(|d| d.normalize().to_string())
                .unwrap_or_else(|_| s.to_string())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn display_name(
    last: Option<&str>,
    first: Option<&str>,
    middle: Option<&str>,
    ext: Option<&str>,
) -> String {
    let given: Vec<&str> = [first, middle, ext].into_iter().flatten().collect();
    match (last, given.is_empty()) {
        (Some(last), false) => format!("{}, {}", last, given.join(" ")),
        (Some(last), true) => last.to_string(),
        (None, _) => given.join(" "),
    }
}

impl SubmissionRecord {
    pub fn from_row(shape: &SubmissionShape, row: SubmissionRow) -> Self {
        let doc = &row.doc;
        let raw = |column: &str| farmer_field(column).and_then(|f| shape.field(doc, f));
        let text = |column: &str| value_text(raw(column));
        let flag = |column: &str| value_flag(raw(column));

        let last_name = text(LAST_NAME);
        let first_name = text(FIRST_NAME);
        let middle_name = text(MIDDLE_NAME);
        let ext_name = text(EXT_NAME);

        let stored_total = parse_decimal(raw(TOTAL_FARM_AREA)).ok().flatten();
        let total_farm_area = if row.parcel_count > 0 {
            row.total_area.unwrap_or(Decimal::ZERO)
        } else {
            stored_total.unwrap_or(Decimal::ZERO)
        };

        let created_at = json_timestamp(shape.meta(doc, "created_at", "createdAt"));

        SubmissionRecord {
            id: row.id,
            reference_number: format!("RSBSA-{:06}", row.id),
            farmer_name: display_name(
                last_name.as_deref(),
                first_name.as_deref(),
                middle_name.as_deref(),
                ext_name.as_deref(),
            ),
            gender: text(GENDER),
            birthdate: text(BIRTHDATE).and_then(|s| parse_date_safe(&s)),
            barangay: text(BARANGAY),
            municipality: text(MUNICIPALITY),
            farm_location: text(FARM_LOCATION),
            parcel_area: row
                .parcel_areas
                .as_deref()
                .map(normalise_areas)
                .filter(|s| !s.is_empty())
                .or_else(|| text(PARCEL_AREA)),
            total_farm_area,
            parcel_count: row.parcel_count,
            registered_owner: flag(OWNER_REGISTERED) || row.any_registered_owner,
            tenant: flag(OWNER_TENANT) || row.any_tenant,
            lessee: flag(OWNER_LESSEE) || row.any_lessee,
            status: value_text(shape.meta(doc, "status", "status"))
                .unwrap_or_else(|| SubmissionStatus::Submitted.to_string()),
            submitted_at: json_timestamp(shape.meta(doc, "submitted_at", "submittedAt"))
                .or(created_at),
            created_at,
            updated_at: json_timestamp(shape.meta(doc, "updated_at", "updatedAt")),
            last_name,
            first_name,
            middle_name,
            ext_name,
            parcels: None,
        }
    }
}

pub async fn load_submissions<'e, E: PgExecutor<'e>>(
    executor: E,
    shape: &SubmissionShape,
) -> RsbsaResult<Vec<SubmissionRecord>> {
    let sql = format!("{} ORDER BY s.id DESC", SUBMISSION_SELECT);
    let rows = sqlx::query_as::<_, SubmissionRow>(&sql)
        .fetch_all(executor)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| SubmissionRecord::from_row(shape, row))
        .collect())
}

pub async fn load_submission<'e, E: PgExecutor<'e>>(
    executor: E,
    shape: &SubmissionShape,
    id: i64,
) -> RsbsaResult<Option<SubmissionRecord>> {
    let sql = format!("{} WHERE s.id = $1", SUBMISSION_SELECT);
    let row = sqlx::query_as::<_, SubmissionRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(|row| SubmissionRecord::from_row(shape, row)))
}

pub async fn get_submissions(
    State(state): State<AppState>,
) -> RsbsaResult<Json<Vec<SubmissionRecord>>> {
    let shape = SubmissionShape::detect(&state.pool).await?;
    Ok(Json(load_submissions(&state.pool, &shape).await?))
}

pub async fn get_submission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> RsbsaResult<Json<SubmissionRecord>> {
    let id = parse_id(&id)?;
    let shape = SubmissionShape::detect(&state.pool).await?;
    let mut record = load_submission(&state.pool, &shape, id)
        .await?
        .ok_or_else(|| RsbsaError::not_found("Submission not found"))?;
    record.parcels = Some(load_parcels(&state.pool, Some(id)).await?);
    Ok(Json(record))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub draft_id: Option<Value>,
    pub data: FarmerForm,
}

/// The registration form: camelCase farmer fields plus the parcel list.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmerForm {
    #[serde(default)]
    pub farmland_parcels: Option<Vec<ParcelInput>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A validated registration with its derived columns filled in.
#[derive(Debug)]
pub struct NewSubmission {
    pub values: Vec<(&'static FieldColumn, FieldValue)>,
    pub parcels: Vec<NewParcel>,
}

impl NewSubmission {
    pub fn value(&self, column: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(f, _)| f.column == column)
            .map(|(_, v)| v)
    }

    fn text(&self, column: &str) -> Option<&str> {
        match self.value(column) {
            Some(FieldValue::Text(v)) => v.as_deref(),
            _ => None,
        }
    }

    pub fn farmer_name(&self) -> String {
        display_name(
            self.text(LAST_NAME),
            self.text(FIRST_NAME),
            self.text(MIDDLE_NAME),
            self.text(EXT_NAME),
        )
    }

    pub fn total_area(&self) -> Decimal {
        match self.value(TOTAL_FARM_AREA) {
            Some(FieldValue::Numeric(Some(d))) => *d,
            _ => Decimal::ZERO,
        }
    }

    /// The legacy JSONB document form of the registration.
    pub fn to_document(&self) -> Value {
        let mut doc: Map<String, Value> = self
            .values
            .iter()
            .map(|(f, v)| (f.json_key.to_string(), v.to_json()))
            .collect();
        doc.insert(
            "parcelCount".to_string(),
            Value::from(self.parcels.len() as u64),
        );
        Value::Object(doc)
    }
}

pub fn validate_submission(form: &FarmerForm) -> RsbsaResult<NewSubmission> {
    let inputs: &[ParcelInput] = form.farmland_parcels.as_deref().unwrap_or(&[]);
    if inputs.is_empty() {
        return Err(RsbsaError::validation(
            "At least one farmland parcel is required",
        ));
    }
    if !inputs.iter().any(ParcelInput::has_ownership_type) {
        return Err(RsbsaError::validation(
            "At least one farmland parcel must have an ownership type (registered owner, tenant, or lessee)",
        ));
    }
    let parcels = inputs
        .iter()
        .enumerate()
        .map(|(i, p)| NewParcel::from_input(i, p))
        .collect::<RsbsaResult<Vec<_>>>()?;

    let total: Decimal = parcels.iter().filter_map(|p| p.area).sum();
    if total > max_area() {
        return Err(RsbsaError::validation("Total farm area is too large"));
    }
    let areas: Vec<String> = parcels
        .iter()
        .filter_map(|p| p.area.map(|a| a.normalize().to_string()))
        .collect();

    let mut values = Vec::with_capacity(FARMER_FIELDS.len());
    for f in FARMER_FIELDS {
        let value = match f.column {
            FARM_LOCATION => FieldValue::Text(parcels[0].location()),
            PARCEL_AREA => FieldValue::Text((!areas.is_empty()).then(|| areas.join(", "))),
            TOTAL_FARM_AREA => FieldValue::Numeric(Some(total)),
            OWNER_REGISTERED => FieldValue::Bool(parcels.iter().any(|p| p.registered_owner)),
            OWNER_TENANT => FieldValue::Bool(parcels.iter().any(|p| p.tenant)),
            OWNER_LESSEE => FieldValue::Bool(parcels.iter().any(|p| p.lessee)),
            _ => {
                let raw = form
                    .fields
                    .get(f.json_key)
                    .or_else(|| form.fields.get(f.column))
                    .unwrap_or(&Value::Null);
                FieldValue::parse(f, raw)?
            }
        };
        values.push((f, value));
    }

    let submission = NewSubmission { values, parcels };
    if submission.text(LAST_NAME).is_none() || submission.text(FIRST_NAME).is_none() {
        return Err(RsbsaError::validation(
            "Last name and first name are required",
        ));
    }
    Ok(submission)
}

fn push_field_value(sep: &mut Separated<'_, '_, Postgres, &'static str>, value: FieldValue, joined: bool) {
    match (value, joined) {
        (FieldValue::Text(v), true) => sep.push_bind(v),
        (FieldValue::Text(v), false) => sep.push_bind_unseparated(v),
        (FieldValue::Date(v), true) => sep.push_bind(v),
        (FieldValue::Date(v), false) => sep.push_bind_unseparated(v),
        (FieldValue::Numeric(v), true) => sep.push_bind(v),
        (FieldValue::Numeric(v), false) => sep.push_bind_unseparated(v),
        (FieldValue::Bool(v), true) => sep.push_bind(v),
        (FieldValue::Bool(v), false) => sep.push_bind_unseparated(v),
    };
}

async fn insert_submission(
    conn: &mut PgConnection,
    shape: &SubmissionShape,
    submission: &NewSubmission,
    submitted_at: DateTime<Utc>,
) -> RsbsaResult<i64> {
    let columns = shape.columns();
    let status = SubmissionStatus::Submitted.as_str();
    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("INSERT INTO {} (", SUBMISSION_TABLE));

    match shape {
        SubmissionShape::Structured(_) => {
            let present: Vec<&(&'static FieldColumn, FieldValue)> = submission
                .values
                .iter()
                .filter(|(f, _)| columns.has(f.column))
                .collect();
            {
                let mut names = qb.separated(", ");
                for (f, _) in &present {
                    names.push(format!("\"{}\"", f.column));
                }
                if columns.has("status") {
                    names.push("status");
                }
                if columns.has("submitted_at") {
                    names.push("submitted_at");
                }
            }
            qb.push(") VALUES (");
            {
                let mut binds = qb.separated(", ");
                for (_, value) in &present {
                    push_field_value(&mut binds, value.clone(), true);
                }
                if columns.has("status") {
                    binds.push_bind(status);
                }
                if columns.has("submitted_at") {
                    binds.push_bind(submitted_at);
                }
            }
        }
        SubmissionShape::Jsonb(_) => {
            let mut doc = submission.to_document();
            if let Value::Object(map) = &mut doc {
                if !columns.has("status") {
                    map.insert("status".into(), Value::from(status));
                }
                if !columns.has("submitted_at") {
                    map.insert("submittedAt".into(), Value::from(submitted_at.to_rfc3339()));
                }
            }
            {
                let mut names = qb.separated(", ");
                names.push("data");
                if columns.has("status") {
                    names.push("status");
                }
                if columns.has("submitted_at") {
                    names.push("submitted_at");
                }
            }
            qb.push(") VALUES (");
            {
                let mut binds = qb.separated(", ");
                binds.push_bind(doc);
                if columns.has("status") {
                    binds.push_bind(status);
                }
                if columns.has("submitted_at") {
                    binds.push_bind(submitted_at);
                }
            }
        }
    }
    qb.push(") RETURNING id::BIGINT");

    let id: i64 = qb.build_query_scalar::<i64>().fetch_one(&mut *conn).await?;
    Ok(id)
}

pub async fn create_submission(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<Value>,
) -> RsbsaResult<(StatusCode, Json<Value>)> {
    let payload: SubmissionPayload = serde_json::from_value(body)
        .map_err(|e| RsbsaError::validation(format!("Invalid submission payload: {}", e)))?;
    let submission = validate_submission(&payload.data)?;

    let shape = SubmissionShape::detect(&state.pool).await?;
    let submitted_at = Utc::now();

    let mut tx = state.pool.begin().await?;
    let id = insert_submission(&mut tx, &shape, &submission, submitted_at).await?;
    for parcel in &submission.parcels {
        insert_parcel(&mut tx, id, parcel).await?;
    }
    audit::record(
        &mut *tx,
        &AuditEntry::new(
            &actor,
            AuditAction::Create,
            AuditModule::Rsbsa,
            format!(
                "Registered farmer {} with {} parcel(s)",
                submission.farmer_name(),
                submission.parcels.len()
            ),
        )
        .record_id(id)
        .new_values(submission.to_document()),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        "RSBSA submission {} saved ({} layout, {} parcels, draft {:?})",
        id,
        shape.name(),
        submission.parcels.len(),
        payload.draft_id
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "RSBSA submission saved successfully",
            "submissionId": id,
            "submittedAt": submitted_at,
            "totalFarmArea": submission.total_area(),
            "parcelCount": submission.parcels.len(),
        })),
    ))
}

async fn apply_update(conn: &mut PgConnection, id: i64, plan: UpdatePlan) -> RsbsaResult<u64> {
    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("UPDATE {} SET ", SUBMISSION_TABLE));
    {
        let mut sets = qb.separated(", ");
        match plan {
            UpdatePlan::Structured {
                assignments,
                status,
                touch_updated_at,
            } => {
                for (column, value) in assignments {
                    sets.push(format!("\"{}\" = ", column));
                    push_field_value(&mut sets, value, false);
                }
                if let Some(status) = status {
                    sets.push("status = ");
                    sets.push_bind_unseparated(status);
                }
                if touch_updated_at {
                    sets.push("updated_at = NOW()");
                }
            }
            UpdatePlan::Jsonb {
                data_patch,
                status_column,
                touch_updated_at,
            } => {
                if !data_patch.is_empty() {
                    sets.push("data = COALESCE(data::jsonb, '{}'::jsonb) || ");
                    sets.push_bind_unseparated(Value::Object(data_patch));
                }
                if let Some(status) = status_column {
                    sets.push("status = ");
                    sets.push_bind_unseparated(status);
                }
                if touch_updated_at {
                    sets.push("updated_at = NOW()");
                }
            }
        }
    }
    qb.push(" WHERE id = ").push_bind(id);

    let result = qb.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

pub async fn update_submission(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> RsbsaResult<Json<SubmissionRecord>> {
    let id = parse_id(&id)?;
    let mut patch = match body {
        Value::Object(map) => map,
        _ => return Err(RsbsaError::validation("Request body must be a JSON object")),
    };

    let status = match patch.remove("status") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(
            value_text(Some(&raw))
                .unwrap_or_default()
                .parse::<SubmissionStatus>()?
                .to_string(),
        ),
    };
    if status.is_none() && !patch.keys().any(|k| lookup_field(k).is_some()) {
        return Err(RsbsaError::validation("No valid fields to update"));
    }

    let shape = SubmissionShape::detect(&state.pool).await?;
    let plan = plan_update(&shape, &patch, status)?;

    let mut tx = state.pool.begin().await?;
    let before = load_submission(&mut *tx, &shape, id)
        .await?
        .ok_or_else(|| RsbsaError::not_found("Submission not found"))?;
    apply_update(&mut tx, id, plan).await?;
    let after = load_submission(&mut *tx, &shape, id)
        .await?
        .ok_or_else(|| RsbsaError::not_found("Submission not found"))?;

    audit::record(
        &mut *tx,
        &AuditEntry::new(
            &actor,
            AuditAction::Update,
            AuditModule::Rsbsa,
            format!("Updated RSBSA submission of {}", after.farmer_name),
        )
        .record_id(id)
        .old_values(serde_json::to_value(&before)?)
        .new_values(serde_json::to_value(&after)?),
    )
    .await?;
    tx.commit().await?;

    tracing::info!("RSBSA submission {} updated by {}", id, actor.username);
    Ok(Json(after))
}

pub async fn delete_submission(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> RsbsaResult<Json<Value>> {
    let id = parse_id(&id)?;
    let shape = SubmissionShape::detect(&state.pool).await?;

    let mut tx = state.pool.begin().await?;
    let mut deleted = load_submission(&mut *tx, &shape, id)
        .await?
        .ok_or_else(|| RsbsaError::not_found("Submission not found"))?;
    deleted.parcels = Some(load_parcels(&mut *tx, Some(id)).await?);

    sqlx::query("DELETE FROM rsbsa_farm_parcels WHERE submission_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!("DELETE FROM {} WHERE id = $1", SUBMISSION_TABLE))
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let snapshot = serde_json::to_value(&deleted)?;
    audit::record(
        &mut *tx,
        &AuditEntry::new(
            &actor,
            AuditAction::Delete,
            AuditModule::Rsbsa,
            format!("Deleted RSBSA submission of {}", deleted.farmer_name),
        )
        .record_id(id)
        .old_values(snapshot.clone()),
    )
    .await?;
    tx.commit().await?;

    tracing::info!("RSBSA submission {} deleted by {}", id, actor.username);
    Ok(Json(json!({
        "message": "RSBSA submission deleted successfully",
        "deletedRecord": snapshot,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(v: Value) -> FarmerForm {
        serde_json::from_value(v).unwrap()
    }

    fn structured() -> SubmissionShape {
        SubmissionShape::from_columns(
            ["id", "status", "submitted_at", "created_at", "updated_at"]
                .into_iter()
                .chain(FARMER_FIELDS.iter().map(|f| f.column)),
        )
    }

    #[test]
    fn zero_parcels_are_rejected_first() {
        let err = validate_submission(&form(json!({ "lastName": "Santos" }))).unwrap_err();
        assert_eq!(err.to_string(), "At least one farmland parcel is required");

        let err = validate_submission(&form(json!({ "farmlandParcels": null }))).unwrap_err();
        assert_eq!(err.to_string(), "At least one farmland parcel is required");
    }

    #[test]
    fn oversized_total_area_is_rejected() {
        let err = validate_submission(&form(json!({
            "lastName": "Santos",
            "firstName": "Maria",
            "farmlandParcels": [
                { "totalFarmAreaHa": 60000000, "ownershipTypeRegisteredOwner": true },
                { "totalFarmAreaHa": 60000000, "ownershipTypeTenant": true }
            ]
        })))
        .unwrap_err();
        assert_eq!(err.to_string(), "Total farm area is too large");
    }

    #[test]
    fn parcels_without_ownership_are_rejected() {
        let err = validate_submission(&form(json!({
            "lastName": "Santos",
            "firstName": "Maria",
            "farmlandParcels": [{ "totalFarmAreaHa": 1, "ownershipTypeOthers": true }]
        })))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "At least one farmland parcel must have an ownership type (registered owner, tenant, or lessee)"
        );
    }

    #[test]
    fn derived_fields_come_from_parcels() {
        let s = validate_submission(&form(json!({
            "lastName": "Santos",
            "firstName": "Maria",
            "middleName": "Reyes",
            "birthdate": "1985-03-14",
            "barangay": "Poblacion",
            "farmlandParcels": [
                {
                    "farmLocationBarangay": "Calao",
                    "farmLocationMunicipality": "Dumangas",
                    "totalFarmAreaHa": 1.5,
                    "ownershipTypeRegisteredOwner": true
                },
                { "totalFarmAreaHa": "2.0", "ownershipTypeTenant": true }
            ]
        })))
        .unwrap();

        assert_eq!(s.total_area(), Decimal::new(35, 1));
        assert_eq!(s.farmer_name(), "Santos, Maria Reyes");
        assert_eq!(
            s.value(FARM_LOCATION),
            Some(&FieldValue::Text(Some("Calao, Dumangas".into())))
        );
        assert_eq!(
            s.value(PARCEL_AREA),
            Some(&FieldValue::Text(Some("1.5, 2".into())))
        );
        assert_eq!(s.value(OWNER_REGISTERED), Some(&FieldValue::Bool(true)));
        assert_eq!(s.value(OWNER_TENANT), Some(&FieldValue::Bool(true)));
        assert_eq!(s.value(OWNER_LESSEE), Some(&FieldValue::Bool(false)));
        assert_eq!(
            s.value(BIRTHDATE),
            Some(&FieldValue::Date(NaiveDate::from_ymd_opt(1985, 3, 14)))
        );

        let doc = s.to_document();
        assert_eq!(doc["lastName"], json!("Santos"));
        assert_eq!(doc["parcelCount"], json!(2));
    }

    #[test]
    fn names_are_required_after_parcel_checks() {
        let err = validate_submission(&form(json!({
            "farmlandParcels": [{ "ownershipTypeLessee": true }]
        })))
        .unwrap_err();
        assert_eq!(err.to_string(), "Last name and first name are required");
    }

    #[test]
    fn record_prefers_parcel_totals_over_stored_total() {
        let row = SubmissionRow {
            id: 12,
            doc: json!({
                "id": 12,
                "LAST NAME": "Cruz",
                "FIRST NAME": "Pedro",
                "TOTAL FARM AREA": 9,
                "OWNERSHIP_TYPE_TENANT": false,
                "status": "Active Farmer",
                "submitted_at": "2025-02-01T08:00:00+08:00"
            }),
            parcel_count: 2,
            total_area: Some(Decimal::new(35000, 4)),
            parcel_areas: Some("1.5000, 2.0000".into()),
            any_registered_owner: false,
            any_tenant: true,
            any_lessee: false,
        };

        let record = SubmissionRecord::from_row(&structured(), row);
        assert_eq!(record.reference_number, "RSBSA-000012");
        assert_eq!(record.farmer_name, "Cruz, Pedro");
        assert_eq!(record.total_farm_area, Decimal::new(35, 1));
        assert_eq!(record.parcel_area.as_deref(), Some("1.5, 2"));
        assert!(record.tenant);
        assert_eq!(record.status, "Active Farmer");
        assert!(record.submitted_at.is_some());

        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["TOTAL FARM AREA"], json!(3.5));
        assert_eq!(out["PARCEL COUNT"], json!(2));
        assert!(out.get("parcels").is_none());
    }

    #[test]
    fn legacy_record_reads_from_document() {
        let legacy = SubmissionShape::from_columns(["id", "data", "created_at"]);
        let row = SubmissionRow {
            id: 3,
            doc: json!({
                "id": 3,
                "created_at": "2024-06-01T00:00:00+00:00",
                "data": { "lastName": "Reyes", "firstName": "Ana", "totalFarmArea": "0.75" }
            }),
            parcel_count: 0,
            total_area: None,
            parcel_areas: None,
            any_registered_owner: false,
            any_tenant: false,
            any_lessee: false,
        };

        let record = SubmissionRecord::from_row(&legacy, row);
        assert_eq!(record.total_farm_area, Decimal::new(75, 2));
        assert_eq!(record.status, "Submitted");
        assert_eq!(record.submitted_at, record.created_at);
    }

    #[test]
    fn status_parsing() {
        assert_eq!(
            "active farmer".parse::<SubmissionStatus>().unwrap(),
            SubmissionStatus::ActiveFarmer
        );
        assert_eq!(SubmissionStatus::NotActive.to_string(), "Not Active");
        assert!("Archived".parse::<SubmissionStatus>().is_err());
    }
}
