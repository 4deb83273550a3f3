use crate::commands::utils::parse_date_safe;
use crate::db::{AuditLog, DbPool};
use crate::error::{RsbsaError, RsbsaResult};
use crate::middleware::auth::Actor;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{PgExecutor, Postgres, QueryBuilder};

const MAX_PAGE: i64 = 500;
const DEFAULT_PAGE: i64 = 100;
const MAX_EXPORT: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
    LoginFailed,
    Register,
    Distribute,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Login => "LOGIN",
            AuditAction::LoginFailed => "LOGIN_FAILED",
            AuditAction::Register => "REGISTER",
            AuditAction::Distribute => "DISTRIBUTE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditModule {
    Auth,
    Rsbsa,
    FarmParcels,
    Allocation,
    Request,
    Distribution,
}

impl AuditModule {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditModule::Auth => "AUTH",
            AuditModule::Rsbsa => "RSBSA",
            AuditModule::FarmParcels => "FARM_PARCELS",
            AuditModule::Allocation => "ALLOCATION",
            AuditModule::Request => "REQUEST",
            AuditModule::Distribution => "DISTRIBUTION",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor: Actor,
    pub action: AuditAction,
    pub module: AuditModule,
    pub record_id: Option<String>,
    pub description: String,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
}

impl AuditEntry {
    pub fn new(
        actor: &Actor,
        action: AuditAction,
        module: AuditModule,
        description: impl Into<String>,
    ) -> Self {
        AuditEntry {
            actor: actor.clone(),
            action,
            module,
            record_id: None,
            description: description.into(),
            old_values: None,
            new_values: None,
        }
    }

    pub fn record_id(mut self, id: impl ToString) -> Self {
        self.record_id = Some(id.to_string());
        self
    }

    pub fn old_values(mut self, values: Value) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn new_values(mut self, values: Value) -> Self {
        self.new_values = Some(values);
        self
    }
}

/// Writes one audit row. Pass the open transaction so the log commits or
/// rolls back together with the change it describes.
pub async fn record<'e, E: PgExecutor<'e>>(executor: E, entry: &AuditEntry) -> RsbsaResult<()> {
    sqlx::query(
        "INSERT INTO audit_logs (user_name, user_role, action, module, record_id, description, old_values, new_values)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(&entry.actor.username)
    .bind(&entry.actor.role)
    .bind(entry.action.as_str())
    .bind(entry.module.as_str())
    .bind(&entry.record_id)
    .bind(&entry.description)
    .bind(&entry.old_values)
    .bind(&entry.new_values)
    .execute(executor)
    .await?;
    Ok(())
}

/// For events with no surrounding transaction (logins). A failed audit write
/// is logged, not surfaced.
pub async fn record_detached(pool: &DbPool, entry: AuditEntry) {
    if let Err(e) = record(pool, &entry).await {
        tracing::warn!(
            "Failed to write audit log {}/{}: {}",
            entry.module.as_str(),
            entry.action.as_str(),
            e
        );
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditFilter {
    pub module: Option<String>,
    pub action: Option<String>,
    pub user: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AuditFilter {
    fn page(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) -> RsbsaResult<()> {
        qb.push(" WHERE TRUE");
        if let Some(module) = non_blank(&self.module) {
            qb.push(" AND module = ").push_bind(module.to_ascii_uppercase());
        }
        if let Some(action) = non_blank(&self.action) {
            qb.push(" AND action = ").push_bind(action.to_ascii_uppercase());
        }
        if let Some(user) = non_blank(&self.user) {
            qb.push(" AND user_name = ").push_bind(user.to_string());
        }
        if let Some(from) = non_blank(&self.from) {
            let date = parse_date_safe(from)
                .ok_or_else(|| RsbsaError::validation("Invalid 'from' date"))?;
            qb.push(" AND \"timestamp\" >= ").push_bind(date);
        }
        if let Some(to) = non_blank(&self.to) {
            let date = parse_date_safe(to)
                .ok_or_else(|| RsbsaError::validation("Invalid 'to' date"))?;
            // inclusive of the whole end day
            qb.push(" AND \"timestamp\" < (")
                .push_bind(date)
                .push("::date + INTERVAL '1 day')");
        }
        if let Some(search) = non_blank(&self.search) {
            let pattern = contains_pattern(search);
            qb.push(" AND (description ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR user_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR record_id ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        Ok(())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

async fn fetch_logs(pool: &DbPool, filter: &AuditFilter, limit: i64, offset: i64) -> RsbsaResult<Vec<AuditLog>> {
    let mut qb = QueryBuilder::new("SELECT * FROM audit_logs");
    filter.push_where(&mut qb)?;
    qb.push(" ORDER BY \"timestamp\" DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    Ok(qb.build_query_as::<AuditLog>().fetch_all(pool).await?)
}

#[derive(Serialize)]
pub struct AuditLogPage {
    pub logs: Vec<AuditLog>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

pub async fn get_audit_logs(
    State(state): State<AppState>,
    Query(filter): Query<AuditFilter>,
) -> RsbsaResult<Json<AuditLogPage>> {
    let (limit, offset) = filter.page();

    let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM audit_logs");
    filter.push_where(&mut count_qb)?;
    let total = count_qb
        .build_query_scalar::<i64>()
        .fetch_one(&state.pool)
        .await?;

    let logs = fetch_logs(&state.pool, &filter, limit, offset).await?;

    Ok(Json(AuditLogPage {
        logs,
        total,
        limit,
        offset,
    }))
}

#[derive(Serialize, sqlx::FromRow)]
pub struct CountBy {
    pub name: String,
    pub count: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total: i64,
    pub today: i64,
    pub last_7_days: i64,
    pub by_action: Vec<CountBy>,
    pub by_module: Vec<CountBy>,
    pub top_users: Vec<CountBy>,
}

pub async fn get_audit_stats(State(state): State<AppState>) -> RsbsaResult<Json<AuditStats>> {
    let (total, today, last_7_days): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COUNT(*) FILTER (WHERE "timestamp" >= CURRENT_DATE),
            COUNT(*) FILTER (WHERE "timestamp" >= CURRENT_DATE - INTERVAL '6 days')
        FROM audit_logs
        "#,
    )
    .fetch_one(&state.pool)
    .await?;

    let by_action = sqlx::query_as::<_, CountBy>(
        "SELECT action AS name, COUNT(*) AS count FROM audit_logs GROUP BY action ORDER BY count DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    let by_module = sqlx::query_as::<_, CountBy>(
        "SELECT module AS name, COUNT(*) AS count FROM audit_logs GROUP BY module ORDER BY count DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    let top_users = sqlx::query_as::<_, CountBy>(
        "SELECT user_name AS name, COUNT(*) AS count FROM audit_logs GROUP BY user_name ORDER BY count DESC LIMIT 5",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(AuditStats {
        total,
        today,
        last_7_days,
        by_action,
        by_module,
        top_users,
    }))
}

pub async fn get_audit_actions(State(state): State<AppState>) -> RsbsaResult<Json<Vec<String>>> {
    let actions: Vec<String> =
        sqlx::query_scalar("SELECT DISTINCT action FROM audit_logs ORDER BY action")
            .fetch_all(&state.pool)
            .await?;
    Ok(Json(actions))
}

pub async fn get_audit_modules(State(state): State<AppState>) -> RsbsaResult<Json<Vec<String>>> {
    let modules: Vec<String> =
        sqlx::query_scalar("SELECT DISTINCT module FROM audit_logs ORDER BY module")
            .fetch_all(&state.pool)
            .await?;
    Ok(Json(modules))
}

pub async fn export_audit_logs(
    State(state): State<AppState>,
    Query(filter): Query<AuditFilter>,
) -> RsbsaResult<impl IntoResponse> {
    let logs = fetch_logs(&state.pool, &filter, MAX_EXPORT, 0).await?;
    let filename = format!(
        "attachment; filename=\"audit_logs_{}.json\"",
        chrono::Local::now().format("%Y%m%d")
    );

    let body = json!({
        "exportedAt": chrono::Utc::now(),
        "count": logs.len(),
        "logs": logs,
    });

    Ok(([(header::CONTENT_DISPOSITION, filename)], Json(body)))
}

/// `%text%` for ILIKE with the wildcard characters in `text` matched literally.
fn contains_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}
