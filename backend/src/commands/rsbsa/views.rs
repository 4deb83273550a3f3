//! Read-only views derived from submissions and their parcels.

use super::parcel::load_parcels;
use super::shape::SubmissionShape;
use super::submission::{load_submissions, SubmissionRecord};
use crate::db::FarmParcel;
use crate::error::RsbsaResult;
use crate::state::AppState;
use axum::{extract::State, Json};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Landowner {
    pub name: String,
    pub is_registered_farmer: bool,
    pub owned_parcels: usize,
    pub tenanted_parcels: usize,
    pub leased_parcels: usize,
    pub total_area: Decimal,
    pub farmers: Vec<String>,
}

#[derive(Default)]
struct LandownerAcc {
    name: String,
    registered: bool,
    owned: usize,
    tenanted: usize,
    leased: usize,
    area: Decimal,
    farmers: BTreeSet<String>,
}

fn name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn owner_entry<'a>(
    owners: &'a mut BTreeMap<String, LandownerAcc>,
    name: &str,
) -> Option<&'a mut LandownerAcc> {
    let key = name_key(name);
    if key.is_empty() {
        return None;
    }
    let acc = owners.entry(key).or_default();
    if acc.name.is_empty() {
        acc.name = name.trim().to_string();
    }
    Some(acc)
}

/// Everyone who owns land: registered-owner farmers plus the owners named
/// on tenant and lessee parcels.
pub fn landowners(records: &[SubmissionRecord], parcels: &[FarmParcel]) -> Vec<Landowner> {
    let by_id: HashMap<i64, &SubmissionRecord> = records.iter().map(|r| (r.id, r)).collect();
    let mut owners: BTreeMap<String, LandownerAcc> = BTreeMap::new();

    for parcel in parcels {
        let Some(farmer) = by_id.get(&parcel.submission_id) else {
            continue;
        };
        if parcel.ownership_type_registered_owner {
            if let Some(acc) = owner_entry(&mut owners, &farmer.farmer_name) {
                acc.registered = true;
                acc.owned += 1;
                acc.area += parcel.area();
            }
        }
        if parcel.ownership_type_tenant {
            let named = parcel.tenant_land_owner_name.as_deref();
            if let Some(acc) = named.and_then(|n| owner_entry(&mut owners, n)) {
                acc.tenanted += 1;
                acc.area += parcel.area();
                acc.farmers.insert(farmer.farmer_name.clone());
            }
        }
        if parcel.ownership_type_lessee {
            let named = parcel.lessee_land_owner_name.as_deref();
            if let Some(acc) = named.and_then(|n| owner_entry(&mut owners, n)) {
                acc.leased += 1;
                acc.area += parcel.area();
                acc.farmers.insert(farmer.farmer_name.clone());
            }
        }
    }

    owners
        .into_values()
        .map(|acc| Landowner {
            name: acc.name,
            is_registered_farmer: acc.registered,
            owned_parcels: acc.owned,
            tenanted_parcels: acc.tenanted,
            leased_parcels: acc.leased,
            total_area: acc.area,
            farmers: acc.farmers.into_iter().collect(),
        })
        .collect()
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredOwner {
    pub submission_id: i64,
    pub reference_number: String,
    pub farmer_name: String,
    pub barangay: Option<String>,
    pub status: String,
    pub owned_parcels: usize,
    pub owned_area: Decimal,
}

pub fn registered_owners(
    records: &[SubmissionRecord],
    parcels: &[FarmParcel],
) -> Vec<RegisteredOwner> {
    let mut owned: HashMap<i64, (usize, Decimal)> = HashMap::new();
    for parcel in parcels.iter().filter(|p| p.ownership_type_registered_owner) {
        let acc = owned.entry(parcel.submission_id).or_default();
        acc.0 += 1;
        acc.1 += parcel.area();
    }

    let mut out: Vec<RegisteredOwner> = records
        .iter()
        .filter_map(|r| {
            let (count, area) = match owned.get(&r.id) {
                Some(&(count, area)) => (count, area),
                // older registrations carry the flag without parcel rows
                None if r.registered_owner && r.parcel_count == 0 => (0, r.total_farm_area),
                None => return None,
            };
            Some(RegisteredOwner {
                submission_id: r.id,
                reference_number: r.reference_number.clone(),
                farmer_name: r.farmer_name.clone(),
                barangay: r.barangay.clone(),
                status: r.status.clone(),
                owned_parcels: count,
                owned_area: area,
            })
        })
        .collect();
    out.sort_by_key(|o| o.farmer_name.to_lowercase());
    out
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BarangayFarmers {
    pub barangay: String,
    pub farmers: usize,
    pub total_area: Decimal,
}

#[derive(Debug, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipCounts {
    pub registered_owner: usize,
    pub tenant: usize,
    pub lessee: usize,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FarmerSummary {
    pub total_farmers: usize,
    pub by_status: BTreeMap<String, usize>,
    pub total_parcels: i64,
    pub total_area: Decimal,
    pub ownership: OwnershipCounts,
    pub by_barangay: Vec<BarangayFarmers>,
}

pub fn farmer_summary(records: &[SubmissionRecord]) -> FarmerSummary {
    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_barangay: BTreeMap<String, (usize, Decimal)> = BTreeMap::new();
    let mut ownership = OwnershipCounts::default();

    for r in records {
        *by_status.entry(r.status.clone()).or_default() += 1;
        let barangay = r
            .barangay
            .clone()
            .unwrap_or_else(|| "Unspecified".to_string());
        let acc = by_barangay.entry(barangay).or_default();
        acc.0 += 1;
        acc.1 += r.total_farm_area;

        ownership.registered_owner += usize::from(r.registered_owner);
        ownership.tenant += usize::from(r.tenant);
        ownership.lessee += usize::from(r.lessee);
    }

    let mut by_barangay: Vec<BarangayFarmers> = by_barangay
        .into_iter()
        .map(|(barangay, (farmers, total_area))| BarangayFarmers {
            barangay,
            farmers,
            total_area,
        })
        .collect();
    by_barangay.sort_by(|a, b| b.farmers.cmp(&a.farmers).then(a.barangay.cmp(&b.barangay)));

    FarmerSummary {
        total_farmers: records.len(),
        by_status,
        total_parcels: records.iter().map(|r| r.parcel_count).sum(),
        total_area: records.iter().map(|r| r.total_farm_area).sum(),
        ownership,
        by_barangay,
    }
}

async fn load_all(state: &AppState) -> RsbsaResult<(Vec<SubmissionRecord>, Vec<FarmParcel>)> {
    let shape = SubmissionShape::detect(&state.pool).await?;
    let records = load_submissions(&state.pool, &shape).await?;
    let parcels = load_parcels(&state.pool, None).await?;
    Ok((records, parcels))
}

pub async fn get_landowners(State(state): State<AppState>) -> RsbsaResult<Json<Vec<Landowner>>> {
    let (records, parcels) = load_all(&state).await?;
    Ok(Json(landowners(&records, &parcels)))
}

pub async fn get_registered_owners(
    State(state): State<AppState>,
) -> RsbsaResult<Json<Vec<RegisteredOwner>>> {
    let (records, parcels) = load_all(&state).await?;
    Ok(Json(registered_owners(&records, &parcels)))
}

pub async fn get_farmer_summary(
    State(state): State<AppState>,
) -> RsbsaResult<Json<FarmerSummary>> {
    let shape = SubmissionShape::detect(&state.pool).await?;
    let records = load_submissions(&state.pool, &shape).await?;
    Ok(Json(farmer_summary(&records)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::rsbsa::submission::SubmissionRow;
    use serde_json::json;

    fn record(id: i64, last: &str, first: &str, barangay: &str, status: &str) -> SubmissionRecord {
        let shape = SubmissionShape::from_columns(["id", "LAST NAME", "FIRST NAME", "BARANGAY", "status"]);
        SubmissionRecord::from_row(
            &shape,
            SubmissionRow {
                id,
                doc: json!({
                    "id": id,
                    "LAST NAME": last,
                    "FIRST NAME": first,
                    "BARANGAY": barangay,
                    "status": status
                }),
                parcel_count: 1,
                total_area: Some(Decimal::ONE),
                parcel_areas: Some("1".into()),
                any_registered_owner: false,
                any_tenant: false,
                any_lessee: false,
            },
        )
    }

    fn parcel(id: i64, submission_id: i64, area: i64) -> FarmParcel {
        FarmParcel {
            id,
            submission_id,
            parcel_number: Some(id.to_string()),
            farm_location_barangay: None,
            farm_location_municipality: None,
            total_farm_area_ha: Some(Decimal::from(area)),
            within_ancestral_domain: Some("No".into()),
            ownership_document_no: None,
            agrarian_reform_beneficiary: Some("No".into()),
            ownership_type_registered_owner: false,
            ownership_type_tenant: false,
            ownership_type_lessee: false,
            ownership_type_others: false,
            tenant_land_owner_name: None,
            lessee_land_owner_name: None,
            ownership_others_specify: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn landowners_merge_owner_names_case_insensitively() {
        let records = vec![
            record(1, "Santos", "Maria", "Calao", "Submitted"),
            record(2, "Cruz", "Pedro", "Calao", "Submitted"),
        ];
        let mut owned = parcel(10, 1, 2);
        owned.ownership_type_registered_owner = true;
        let mut tenanted = parcel(11, 2, 1);
        tenanted.ownership_type_tenant = true;
        tenanted.tenant_land_owner_name = Some("santos,  maria".into());
        let mut leased = parcel(12, 2, 3);
        leased.ownership_type_lessee = true;
        leased.lessee_land_owner_name = Some("Don Lopez".into());

        let owners = landowners(&records, &[owned, tenanted, leased]);
        assert_eq!(owners.len(), 2);

        let santos = owners.iter().find(|o| o.is_registered_farmer).unwrap();
        assert_eq!(santos.name, "Santos, Maria");
        assert_eq!(santos.owned_parcels, 1);
        assert_eq!(santos.tenanted_parcels, 1);
        assert_eq!(santos.total_area, Decimal::from(3));
        assert_eq!(santos.farmers, vec!["Cruz, Pedro".to_string()]);

        let lopez = owners.iter().find(|o| o.name == "Don Lopez").unwrap();
        assert_eq!(lopez.leased_parcels, 1);
        assert!(!lopez.is_registered_farmer);
    }

    #[test]
    fn registered_owners_sum_owned_parcels_only() {
        let records = vec![
            record(1, "Santos", "Maria", "Calao", "Submitted"),
            record(2, "Abad", "Jose", "Calao", "Submitted"),
        ];
        let mut a = parcel(10, 1, 2);
        a.ownership_type_registered_owner = true;
        let mut b = parcel(11, 1, 5);
        b.ownership_type_registered_owner = true;
        let mut c = parcel(12, 2, 4);
        c.ownership_type_tenant = true;

        let owners = registered_owners(&records, &[a, b, c]);
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].owned_parcels, 2);
        assert_eq!(owners[0].owned_area, Decimal::from(7));
    }

    #[test]
    fn summary_counts_status_and_barangays() {
        let records = vec![
            record(1, "Santos", "Maria", "Calao", "Active Farmer"),
            record(2, "Cruz", "Pedro", "Calao", "Submitted"),
            record(3, "Abad", "Jose", "Poblacion", "Submitted"),
        ];
        let summary = farmer_summary(&records);
        assert_eq!(summary.total_farmers, 3);
        assert_eq!(summary.by_status.get("Submitted"), Some(&2));
        assert_eq!(summary.total_parcels, 3);
        assert_eq!(summary.total_area, Decimal::from(3));
        assert_eq!(summary.by_barangay[0].barangay, "Calao");
        assert_eq!(summary.by_barangay[0].farmers, 2);
    }
}
