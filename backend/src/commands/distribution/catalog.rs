//! Commodities handed out per season and the season identifier itself.
//!
//! Allocation, request and distribution tables all carry one NUMERIC column per
//! commodity. Every dynamically built column list comes from [`COMMODITIES`].

use crate::commands::utils::parse_non_negative;
use crate::error::{RsbsaError, RsbsaResult};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Fertilizer,
    Seed,
}

impl Category {
    pub fn unit(self) -> &'static str {
        match self {
            Category::Fertilizer => "bags",
            Category::Seed => "kg",
        }
    }
}

#[derive(Debug)]
pub struct Commodity {
    pub key: &'static str,
    pub label: &'static str,
    pub column: &'static str,
    pub category: Category,
}

pub const COMMODITIES: &[Commodity] = &[
    Commodity {
        key: "urea_46_0_0",
        label: "Urea (46-0-0)",
        column: "urea_46_0_0_bags",
        category: Category::Fertilizer,
    },
    Commodity {
        key: "complete_14_14_14",
        label: "Complete (14-14-14)",
        column: "complete_14_14_14_bags",
        category: Category::Fertilizer,
    },
    Commodity {
        key: "ammonium_sulfate_21_0_0",
        label: "Ammonium Sulfate (21-0-0)",
        column: "ammonium_sulfate_21_0_0_bags",
        category: Category::Fertilizer,
    },
    Commodity {
        key: "muriate_potash_0_0_60",
        label: "Muriate of Potash (0-0-60)",
        column: "muriate_potash_0_0_60_bags",
        category: Category::Fertilizer,
    },
    Commodity {
        key: "jackpot",
        label: "Jackpot",
        column: "jackpot_kg",
        category: Category::Seed,
    },
    Commodity {
        key: "us88",
        label: "US88",
        column: "us88_kg",
        category: Category::Seed,
    },
    Commodity {
        key: "th82",
        label: "TH82",
        column: "th82_kg",
        category: Category::Seed,
    },
    Commodity {
        key: "rh9000",
        label: "RH9000",
        column: "rh9000_kg",
        category: Category::Seed,
    },
    Commodity {
        key: "lumping143",
        label: "Lumping 143",
        column: "lumping143_kg",
        category: Category::Seed,
    },
    Commodity {
        key: "lp296",
        label: "LP296",
        column: "lp296_kg",
        category: Category::Seed,
    },
];

/// Quantities keyed by commodity column name.
pub type Quantities = BTreeMap<String, Decimal>;

pub fn zero_quantities() -> Quantities {
    COMMODITIES
        .iter()
        .map(|c| (c.column.to_string(), Decimal::ZERO))
        .collect()
}

pub fn quantity(q: &Quantities, commodity: &Commodity) -> Decimal {
    q.get(commodity.column).copied().unwrap_or(Decimal::ZERO)
}

pub fn category_total(q: &Quantities, category: Category) -> Decimal {
    COMMODITIES
        .iter()
        .filter(|c| c.category == category)
        .map(|c| quantity(q, c))
        .sum()
}

/// Picks catalog quantities out of a request body. Both `urea_46_0_0_bags` and
/// `urea_46_0_0` are accepted; anything else in the body is ignored.
/// Returns only the commodities that were present.
pub fn parse_quantities(body: &Map<String, Value>) -> RsbsaResult<Quantities> {
    let mut out = Quantities::new();
    for c in COMMODITIES {
        let raw = body.get(c.column).or_else(|| body.get(c.key));
        if raw.is_some() {
            out.insert(c.column.to_string(), parse_non_negative(raw, c.label)?);
        }
    }
    Ok(out)
}

pub fn read_quantities(row: &PgRow) -> Result<Quantities, sqlx::Error> {
    let mut out = Quantities::new();
    for c in COMMODITIES {
        let value: Option<Decimal> = row.try_get(c.column)?;
        out.insert(c.column.to_string(), value.unwrap_or(Decimal::ZERO));
    }
    Ok(out)
}

/// `COALESCE(SUM(col), 0) AS col, ...` for aggregate queries.
pub fn sum_columns() -> String {
    COMMODITIES
        .iter()
        .map(|c| format!("COALESCE(SUM({0}), 0) AS {0}", c.column))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SeasonKind {
    Dry,
    Wet,
}

/// Allocation period such as `wet_2025`. Orders chronologically, dry before wet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Season {
    pub year: i32,
    pub kind: SeasonKind,
}

impl FromStr for Season {
    type Err = RsbsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            RsbsaError::validation(format!(
                "Invalid season '{}'. Expected wet_YYYY or dry_YYYY",
                s
            ))
        };
        let lowered = s.trim().to_ascii_lowercase();
        let (kind, year) = lowered.split_once('_').ok_or_else(invalid)?;
        let kind = match kind {
            "wet" => SeasonKind::Wet,
            "dry" => SeasonKind::Dry,
            _ => return Err(invalid()),
        };
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        Ok(Season { year, kind })
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            SeasonKind::Dry => "dry",
            SeasonKind::Wet => "wet",
        };
        write!(f, "{}_{}", kind, self.year)
    }
}

impl Serialize for Season {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn catalog_columns_are_unique_and_suffixed_by_unit() {
        let mut seen = std::collections::HashSet::new();
        for c in COMMODITIES {
            assert!(seen.insert(c.column), "duplicate column {}", c.column);
            assert!(c.column.starts_with(c.key));
            assert!(c.column.ends_with(c.category.unit()));
        }
    }

    #[test]
    fn season_parses_and_round_trips_display() {
        let s: Season = "WET_2025".parse().unwrap();
        assert_eq!(s.kind, SeasonKind::Wet);
        assert_eq!(s.year, 2025);
        assert_eq!(s.to_string(), "wet_2025");
    }

    #[test]
    fn season_rejects_malformed_input() {
        for bad in ["", "wet", "summer_2025", "wet_25", "dry_20x5", "wet-2025"] {
            assert!(bad.parse::<Season>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn seasons_order_chronologically() {
        let mut seasons: Vec<Season> = ["wet_2025", "dry_2024", "dry_2025", "wet_2024"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        seasons.sort();
        let ordered: Vec<String> = seasons.iter().map(|s| s.to_string()).collect();
        assert_eq!(ordered, ["dry_2024", "wet_2024", "dry_2025", "wet_2025"]);
    }

    #[test]
    fn parse_quantities_accepts_column_or_key_names() {
        let body = json!({ "urea_46_0_0_bags": 120, "jackpot": "35.5", "unknown": 9 });
        let q = parse_quantities(body.as_object().unwrap()).unwrap();
        assert_eq!(q.len(), 2);
        assert_eq!(q["urea_46_0_0_bags"], Decimal::from(120));
        assert_eq!(q["jackpot_kg"], Decimal::new(355, 1));
    }

    #[test]
    fn parse_quantities_rejects_negative() {
        let body = json!({ "us88_kg": -4 });
        let err = parse_quantities(body.as_object().unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "US88 must be a non-negative number");
    }

    #[test]
    fn category_totals_split_fertilizer_and_seed() {
        let mut q = zero_quantities();
        q.insert("urea_46_0_0_bags".into(), Decimal::from(10));
        q.insert("complete_14_14_14_bags".into(), Decimal::from(5));
        q.insert("rh9000_kg".into(), Decimal::from(40));
        assert_eq!(category_total(&q, Category::Fertilizer), Decimal::from(15));
        assert_eq!(category_total(&q, Category::Seed), Decimal::from(40));
    }
}
