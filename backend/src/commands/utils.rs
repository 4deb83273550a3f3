use crate::error::{RsbsaError, RsbsaResult};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::str::FromStr;

pub fn parse_date_safe(date_str: &str) -> Option<NaiveDate> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }
    // ISO timestamps coming back from the browser carry a time part.
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y%m%d"))
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%m/%d/%Y"))
        .ok()
}

/// Path ids arrive as strings so a bad id gets our own 400 instead of axum's rejection.
pub fn parse_id(raw: &str) -> RsbsaResult<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| RsbsaError::validation("Invalid ID format"))
}

/// Accepts JSON numbers and numeric strings. `Ok(None)` for null or blank.
pub fn parse_decimal(value: Option<&Value>) -> Result<Option<Decimal>, ()> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => decimal_from_str(&n.to_string()).map(Some),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => decimal_from_str(s.trim()).map(Some),
        Some(_) => Err(()),
    }
}

fn decimal_from_str(raw: &str) -> Result<Decimal, ()> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| ())
}

/// Largest value a `NUMERIC(12, 2)` quantity column holds.
pub fn max_quantity() -> Decimal {
    Decimal::new(999_999_999_999, 2)
}

/// Largest value a `NUMERIC(12, 4)` area column holds.
pub fn max_area() -> Decimal {
    Decimal::new(999_999_999_999, 4)
}

pub fn parse_non_negative(value: Option<&Value>, label: &str) -> RsbsaResult<Decimal> {
    match parse_decimal(value) {
        Ok(Some(d)) if d >= Decimal::ZERO && d <= max_quantity() => Ok(d),
        Ok(None) => Ok(Decimal::ZERO),
        _ => Err(RsbsaError::validation(format!(
            "{} must be a non-negative number",
            label
        ))),
    }
}

/// Trimmed text; numbers and booleans are stringified, blanks become `None`.
pub fn value_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Booleans as the forms send them: `true`, `"true"`, `"Yes"`, `"1"`, `1`.
pub fn value_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "y" | "1"
        ),
        Some(Value::Number(n)) => n.as_i64().map_or(false, |v| v != 0),
        _ => false,
    }
}

/// Ancestral-domain and agrarian-reform flags are stored as `'Yes'`/`'No'` strings.
pub fn yes_no(value: Option<&Value>) -> &'static str {
    if value_flag(value) {
        "Yes"
    } else {
        "No"
    }
}

pub fn round2(value: Decimal) -> Decimal {
    value.round_dp(2)
}

/// Typed view of a JSON body; shape errors become a 400 instead of axum's 422.
pub fn from_body<T: DeserializeOwned>(body: Value) -> RsbsaResult<T> {
    serde_json::from_value(body)
        .map_err(|e| RsbsaError::validation(format!("Invalid request body: {}", e)))
}

pub fn into_object(body: Value) -> RsbsaResult<Map<String, Value>> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(RsbsaError::validation("Request body must be a JSON object")),
    }
}

/// Reads a body field sent either as `snake_case` or `camelCase`.
pub fn body_field<'a>(body: &'a Map<String, Value>, snake: &str, camel: &str) -> Option<&'a Value> {
    body.get(snake).or_else(|| body.get(camel))
}

pub fn optional_date(value: Option<&Value>, label: &str) -> RsbsaResult<Option<NaiveDate>> {
    match value_text(value) {
        None => Ok(None),
        Some(raw) => parse_date_safe(&raw)
            .map(Some)
            .ok_or_else(|| RsbsaError::validation(format!("Invalid {}", label))),
    }
}

/// Positive integer ids sent in a body as a number or a numeric string.
pub fn body_id(value: Option<&Value>, label: &str) -> RsbsaResult<i64> {
    let id = match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    id.filter(|id| *id > 0)
        .ok_or_else(|| RsbsaError::validation(format!("{} is required", label)))
}
