use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow, PgSslMode};
use sqlx::{FromRow, Pool, Postgres, Row};
use std::str::FromStr;

use crate::commands::distribution::catalog::{read_quantities, Quantities};
use crate::config::AppConfig;
use crate::error::{RsbsaError, RsbsaResult};

pub type DbPool = Pool<Postgres>;

pub fn init_pool_with_options(opts: PgConnectOptions) -> DbPool {
    // connect_lazy_with returns the pool immediately. It does not validate connection.
    PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .idle_timeout(std::time::Duration::from_secs(120))
        .max_lifetime(std::time::Duration::from_secs(300))
        .connect_lazy_with(opts)
}

pub fn init_pool(database_url: &str) -> RsbsaResult<DbPool> {
    let opts = PgConnectOptions::from_str(database_url)
        .map_err(|e| RsbsaError::Internal(format!("Invalid DB URL: {}", e)))?
        .ssl_mode(PgSslMode::Prefer);

    Ok(init_pool_with_options(opts))
}

pub async fn init_database(pool: &DbPool, config: &AppConfig) -> RsbsaResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    ensure_seeds(pool, config).await?;
    tracing::info!("Database ready");
    Ok(())
}

async fn ensure_seeds(pool: &DbPool, config: &AppConfig) -> RsbsaResult<()> {
    let admin_exists: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = $1")
        .bind(&config.admin_username)
        .fetch_one(pool)
        .await?;

    if admin_exists.0 == 0 {
        let hash = bcrypt::hash(&config.admin_password, bcrypt::DEFAULT_COST)?;
        sqlx::query(
            "INSERT INTO users (username, email, password_hash, role) VALUES ($1, $2, $3, 'admin') ON CONFLICT DO NOTHING",
        )
        .bind(&config.admin_username)
        .bind(format!("{}@rsbsa.local", config.admin_username))
        .bind(hash)
        .execute(pool)
        .await?;
        tracing::info!("Seeded admin user '{}'", config.admin_username);
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: String,
    pub created_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FarmParcel {
    pub id: i64,
    pub submission_id: i64,
    pub parcel_number: Option<String>,
    pub farm_location_barangay: Option<String>,
    pub farm_location_municipality: Option<String>,
    pub total_farm_area_ha: Option<Decimal>,
    pub within_ancestral_domain: Option<String>,
    pub ownership_document_no: Option<String>,
    pub agrarian_reform_beneficiary: Option<String>,
    pub ownership_type_registered_owner: bool,
    pub ownership_type_tenant: bool,
    pub ownership_type_lessee: bool,
    pub ownership_type_others: bool,
    pub tenant_land_owner_name: Option<String>,
    pub lessee_land_owner_name: Option<String>,
    pub ownership_others_specify: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl FarmParcel {
    pub fn area(&self) -> Decimal {
        self.total_farm_area_ha.unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug, Serialize)]
pub struct RegionalAllocation {
    pub id: i64,
    pub season: String,
    pub allocation_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub quantities: Quantities,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for RegionalAllocation {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RegionalAllocation {
            id: row.try_get("id")?,
            season: row.try_get("season")?,
            allocation_date: row.try_get("allocation_date")?,
            quantities: read_quantities(row)?,
            notes: row.try_get("notes")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct FarmerRequest {
    pub id: i64,
    pub season: String,
    pub farmer_id: i64,
    pub farmer_name: String,
    pub barangay: Option<String>,
    #[serde(flatten)]
    pub quantities: Quantities,
    pub status: String,
    pub notes: Option<String>,
    pub request_date: Option<NaiveDate>,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for FarmerRequest {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(FarmerRequest {
            id: row.try_get("id")?,
            season: row.try_get("season")?,
            farmer_id: row.try_get("farmer_id")?,
            farmer_name: row.try_get("farmer_name")?,
            barangay: row.try_get("barangay")?,
            quantities: read_quantities(row)?,
            status: row.try_get("status")?,
            notes: row.try_get("notes")?,
            request_date: row.try_get("request_date")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DistributionRecord {
    pub id: i64,
    pub request_id: i64,
    pub season: String,
    pub farmer_id: i64,
    pub farmer_name: String,
    pub barangay: Option<String>,
    #[serde(flatten)]
    pub quantities: Quantities,
    pub distribution_date: Option<NaiveDate>,
    pub distributed_by: Option<String>,
    pub verification_notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for DistributionRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(DistributionRecord {
            id: row.try_get("id")?,
            request_id: row.try_get("request_id")?,
            season: row.try_get("season")?,
            farmer_id: row.try_get("farmer_id")?,
            farmer_name: row.try_get("farmer_name")?,
            barangay: row.try_get("barangay")?,
            quantities: read_quantities(row)?,
            distribution_date: row.try_get("distribution_date")?,
            distributed_by: row.try_get("distributed_by")?,
            verification_notes: row.try_get("verification_notes")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_name: String,
    pub user_role: Option<String>,
    pub action: String,
    pub module: String,
    pub record_id: Option<String>,
    pub description: Option<String>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
}
