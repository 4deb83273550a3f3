//! Runtime detection of the physical layout of `rsbsa_submission`.
//!
//! Two layouts are live: the legacy one keeps the whole form in a `data` JSONB
//! column, the structured one has one quoted mixed-case column per field. Every
//! handler detects the layout per request and maps either into the same record.

use crate::commands::utils::{max_area, parse_date_safe, parse_decimal, value_flag, value_text};
use crate::db::DbPool;
use crate::error::{RsbsaError, RsbsaResult};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::collections::HashSet;

pub const SUBMISSION_TABLE: &str = "rsbsa_submission";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Date,
    Numeric,
    Bool,
}

/// A farmer field: its structured column and its key inside the JSONB document.
#[derive(Debug)]
pub struct FieldColumn {
    pub column: &'static str,
    pub json_key: &'static str,
    pub kind: ColumnKind,
}

const fn field(column: &'static str, json_key: &'static str, kind: ColumnKind) -> FieldColumn {
    FieldColumn {
        column,
        json_key,
        kind,
    }
}

pub const LAST_NAME: &str = "LAST NAME";
pub const FIRST_NAME: &str = "FIRST NAME";
pub const MIDDLE_NAME: &str = "MIDDLE NAME";
pub const EXT_NAME: &str = "EXT NAME";
pub const GENDER: &str = "GENDER";
pub const BIRTHDATE: &str = "BIRTHDATE";
pub const BARANGAY: &str = "BARANGAY";
pub const MUNICIPALITY: &str = "MUNICIPALITY";
pub const PROVINCE: &str = "PROVINCE";
pub const MAIN_LIVELIHOOD: &str = "MAIN LIVELIHOOD";
pub const FARM_LOCATION: &str = "FARM LOCATION";
pub const PARCEL_AREA: &str = "PARCEL AREA";
pub const TOTAL_FARM_AREA: &str = "TOTAL FARM AREA";
pub const OWNER_REGISTERED: &str = "OWNERSHIP_TYPE_REGISTERED_OWNER";
pub const OWNER_TENANT: &str = "OWNERSHIP_TYPE_TENANT";
pub const OWNER_LESSEE: &str = "OWNERSHIP_TYPE_LESSEE";

pub const FARMER_FIELDS: &[FieldColumn] = &[
    field(LAST_NAME, "lastName", ColumnKind::Text),
    field(FIRST_NAME, "firstName", ColumnKind::Text),
    field(MIDDLE_NAME, "middleName", ColumnKind::Text),
    field(EXT_NAME, "extName", ColumnKind::Text),
    field(GENDER, "gender", ColumnKind::Text),
    field(BIRTHDATE, "birthdate", ColumnKind::Date),
    field(BARANGAY, "barangay", ColumnKind::Text),
    field(MUNICIPALITY, "municipality", ColumnKind::Text),
    field(PROVINCE, "province", ColumnKind::Text),
    field(MAIN_LIVELIHOOD, "mainLivelihood", ColumnKind::Text),
    field(FARM_LOCATION, "farmLocation", ColumnKind::Text),
    field(PARCEL_AREA, "parcelArea", ColumnKind::Text),
    field(TOTAL_FARM_AREA, "totalFarmArea", ColumnKind::Numeric),
    field(OWNER_REGISTERED, "ownershipTypeRegisteredOwner", ColumnKind::Bool),
    field(OWNER_TENANT, "ownershipTypeTenant", ColumnKind::Bool),
    field(OWNER_LESSEE, "ownershipTypeLessee", ColumnKind::Bool),
];

pub fn farmer_field(column: &str) -> Option<&'static FieldColumn> {
    FARMER_FIELDS.iter().find(|f| f.column == column)
}

/// Finds the field a patch key refers to, by column name or JSON key.
pub fn lookup_field(key: &str) -> Option<&'static FieldColumn> {
    FARMER_FIELDS
        .iter()
        .find(|f| f.column == key || f.json_key == key)
}

/// A typed value ready to bind against a structured column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(Option<String>),
    Date(Option<NaiveDate>),
    Numeric(Option<Decimal>),
    Bool(bool),
}

impl FieldValue {
    pub fn parse(field: &FieldColumn, raw: &Value) -> RsbsaResult<Self> {
        match field.kind {
            ColumnKind::Text => Ok(FieldValue::Text(value_text(Some(raw)))),
            ColumnKind::Bool => Ok(FieldValue::Bool(value_flag(Some(raw)))),
            ColumnKind::Date => match value_text(Some(raw)) {
                None => Ok(FieldValue::Date(None)),
                Some(s) => parse_date_safe(&s)
                    .map(|d| FieldValue::Date(Some(d)))
                    .ok_or_else(|| {
                        RsbsaError::validation(format!("Invalid date for {}", field.column))
                    }),
            },
            ColumnKind::Numeric => match parse_decimal(Some(raw)) {
                Ok(Some(d)) if d < Decimal::ZERO => Err(RsbsaError::validation(format!(
                    "{} must not be negative",
                    field.column
                ))),
                Ok(Some(d)) if d > max_area() => Err(RsbsaError::validation(format!(
                    "{} is too large",
                    field.column
                ))),
                Ok(v) => Ok(FieldValue::Numeric(v)),
                Err(()) => Err(RsbsaError::validation(format!(
                    "{} must be a number",
                    field.column
                ))),
            },
        }
    }

    /// The JSONB-document form of the value.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(v) => v.clone().map(Value::String).unwrap_or(Value::Null),
            FieldValue::Date(v) => v
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null),
            FieldValue::Numeric(v) => v
                .map(|d| serde_json::to_value(d).unwrap_or(Value::Null))
                .unwrap_or(Value::Null),
            FieldValue::Bool(b) => Value::Bool(*b),
        }
    }
}

/// Column names of the live table.
#[derive(Debug, Clone, Default)]
pub struct SubmissionColumns(HashSet<String>);

impl SubmissionColumns {
    pub fn has(&self, column: &str) -> bool {
        self.0.contains(column)
    }
}

impl<S: Into<String>> FromIterator<S> for SubmissionColumns {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        SubmissionColumns(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone)]
pub enum SubmissionShape {
    Jsonb(SubmissionColumns),
    Structured(SubmissionColumns),
}

impl SubmissionShape {
    pub async fn detect(pool: &DbPool) -> RsbsaResult<Self> {
        let columns: Vec<String> = sqlx::query_scalar(
            "SELECT column_name::TEXT FROM information_schema.columns WHERE table_schema = current_schema() AND table_name = $1",
        )
        .bind(SUBMISSION_TABLE)
        .fetch_all(pool)
        .await?;

        if columns.is_empty() {
            return Err(RsbsaError::Internal(format!(
                "Table {} does not exist",
                SUBMISSION_TABLE
            )));
        }

        let shape = SubmissionShape::from_columns(columns);
        tracing::debug!("rsbsa_submission shape: {}", shape.name());
        Ok(shape)
    }

    pub fn from_columns<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        let columns: SubmissionColumns = columns.into_iter().collect();
        if columns.has("data") && !columns.has(LAST_NAME) {
            SubmissionShape::Jsonb(columns)
        } else {
            SubmissionShape::Structured(columns)
        }
    }

    pub fn columns(&self) -> &SubmissionColumns {
        match self {
            SubmissionShape::Jsonb(c) | SubmissionShape::Structured(c) => c,
        }
    }

    pub fn is_jsonb(&self) -> bool {
        matches!(self, SubmissionShape::Jsonb(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            SubmissionShape::Jsonb(_) => "jsonb",
            SubmissionShape::Structured(_) => "structured",
        }
    }

    /// Reads a farmer field out of a `to_jsonb(row)` document.
    pub fn field<'a>(&self, doc: &'a Value, field: &FieldColumn) -> Option<&'a Value> {
        let found = match self {
            SubmissionShape::Structured(_) => doc.get(field.column),
            SubmissionShape::Jsonb(_) => doc
                .get("data")
                .and_then(|d| d.get(field.json_key).or_else(|| d.get(field.column))),
        };
        found.filter(|v| !v.is_null())
    }

    /// Reads a lowercase bookkeeping column (`status`, `submitted_at`, ...),
    /// falling back to the camelCase key inside the JSONB document.
    pub fn meta<'a>(&self, doc: &'a Value, column: &str, json_key: &str) -> Option<&'a Value> {
        doc.get(column)
            .filter(|v| !v.is_null())
            .or_else(|| match self {
                SubmissionShape::Jsonb(_) => doc
                    .get("data")
                    .and_then(|d| d.get(json_key))
                    .filter(|v| !v.is_null()),
                SubmissionShape::Structured(_) => None,
            })
    }
}

/// Result of matching an update body against the live layout.
#[derive(Debug, PartialEq)]
pub enum UpdatePlan {
    Structured {
        assignments: Vec<(&'static str, FieldValue)>,
        status: Option<String>,
        touch_updated_at: bool,
    },
    Jsonb {
        data_patch: Map<String, Value>,
        status_column: Option<String>,
        touch_updated_at: bool,
    },
}

/// Builds the whitelist-only update for a partial body. Unknown keys are
/// ignored; a body with no recognised key is rejected.
pub fn plan_update(
    shape: &SubmissionShape,
    patch: &Map<String, Value>,
    status: Option<String>,
) -> RsbsaResult<UpdatePlan> {
    let columns = shape.columns();
    let touch_updated_at = columns.has("updated_at");

    let mut parsed = Vec::new();
    for (key, raw) in patch {
        if let Some(f) = lookup_field(key) {
            parsed.push((f, FieldValue::parse(f, raw)?));
        }
    }

    let plan = match shape {
        SubmissionShape::Structured(_) => {
            let assignments: Vec<(&'static str, FieldValue)> = parsed
                .into_iter()
                .filter(|(f, _)| {
                    let present = columns.has(f.column);
                    if !present {
                        tracing::debug!("Skipping update of missing column {}", f.column);
                    }
                    present
                })
                .map(|(f, v)| (f.column, v))
                .collect();
            let status = status.filter(|_| columns.has("status"));
            if assignments.is_empty() && status.is_none() {
                return Err(RsbsaError::validation("No valid fields to update"));
            }
            UpdatePlan::Structured {
                assignments,
                status,
                touch_updated_at,
            }
        }
        SubmissionShape::Jsonb(_) => {
            let mut data_patch: Map<String, Value> = parsed
                .into_iter()
                .map(|(f, v)| (f.json_key.to_string(), v.to_json()))
                .collect();
            let status_column = if columns.has("status") {
                status
            } else {
                if let Some(s) = status {
                    data_patch.insert("status".to_string(), Value::String(s));
                }
                None
            };
            if data_patch.is_empty() && status_column.is_none() {
                return Err(RsbsaError::validation("No valid fields to update"));
            }
            UpdatePlan::Jsonb {
                data_patch,
                status_column,
                touch_updated_at,
            }
        }
    };
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn structured() -> SubmissionShape {
        SubmissionShape::from_columns(
            ["id", "status", "updated_at", "created_at", "submitted_at"]
                .into_iter()
                .chain(FARMER_FIELDS.iter().map(|f| f.column)),
        )
    }

    fn legacy() -> SubmissionShape {
        SubmissionShape::from_columns(["id", "data", "created_at", "updated_at"])
    }

    #[test]
    fn detects_jsonb_only_without_structured_columns() {
        assert!(legacy().is_jsonb());
        assert!(!structured().is_jsonb());

        // a table mid-migration that already has structured columns is structured
        let mixed = SubmissionShape::from_columns(["id", "data", LAST_NAME]);
        assert!(!mixed.is_jsonb());
    }

    #[test]
    fn reads_fields_from_either_document() {
        let f = farmer_field(LAST_NAME).unwrap();
        let structured_doc = json!({ "id": 1, "LAST NAME": "Santos" });
        let legacy_doc = json!({ "id": 1, "data": { "lastName": "Reyes" } });

        assert_eq!(structured().field(&structured_doc, f), Some(&json!("Santos")));
        assert_eq!(legacy().field(&legacy_doc, f), Some(&json!("Reyes")));
        assert_eq!(legacy().field(&structured_doc, f), None);
    }

    #[test]
    fn meta_falls_back_to_jsonb_document() {
        let doc = json!({ "id": 1, "data": { "status": "Not Active" } });
        assert_eq!(
            legacy().meta(&doc, "status", "status"),
            Some(&json!("Not Active"))
        );
        assert_eq!(structured().meta(&doc, "status", "status"), None);
    }

    #[test]
    fn status_only_update_touches_only_status() {
        let plan = plan_update(&structured(), &Map::new(), Some("Active Farmer".into())).unwrap();
        assert_eq!(
            plan,
            UpdatePlan::Structured {
                assignments: vec![],
                status: Some("Active Farmer".into()),
                touch_updated_at: true,
            }
        );
    }

    #[test]
    fn update_ignores_unknown_keys_and_rejects_empty() {
        let patch = json!({ "DROP TABLE": "x", "nickname": "y" });
        let err = plan_update(&structured(), patch.as_object().unwrap(), None).unwrap_err();
        assert_eq!(err.to_string(), "No valid fields to update");
    }

    #[test]
    fn update_accepts_json_keys_and_column_names() {
        let patch = json!({ "lastName": "Cruz", "BIRTHDATE": "1990-01-02" });
        let plan = plan_update(&structured(), patch.as_object().unwrap(), None).unwrap();
        match plan {
            UpdatePlan::Structured { assignments, status, .. } => {
                assert!(status.is_none());
                assert!(assignments.contains(&(LAST_NAME, FieldValue::Text(Some("Cruz".into())))));
                assert!(assignments.contains(&(
                    BIRTHDATE,
                    FieldValue::Date(NaiveDate::from_ymd_opt(1990, 1, 2))
                )));
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn update_skips_columns_missing_from_live_table() {
        let shape = SubmissionShape::from_columns(["id", LAST_NAME, "status"]);
        let patch = json!({ "lastName": "Cruz", "province": "Nueva Ecija" });
        match plan_update(&shape, patch.as_object().unwrap(), None).unwrap() {
            UpdatePlan::Structured {
                assignments,
                touch_updated_at,
                ..
            } => {
                assert_eq!(assignments.len(), 1);
                assert!(!touch_updated_at);
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn jsonb_update_moves_status_into_document_without_status_column() {
        let plan = plan_update(&legacy(), &Map::new(), Some("Not Active".into())).unwrap();
        match plan {
            UpdatePlan::Jsonb {
                data_patch,
                status_column,
                touch_updated_at,
            } => {
                assert_eq!(data_patch.get("status"), Some(&json!("Not Active")));
                assert!(status_column.is_none());
                assert!(touch_updated_at);
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn invalid_date_is_rejected() {
        let patch = json!({ "birthdate": "yesterday" });
        assert!(plan_update(&structured(), patch.as_object().unwrap(), None).is_err());
    }
}
