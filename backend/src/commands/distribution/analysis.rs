//! Supply versus demand arithmetic for a season. Everything here is pure;
//! the handlers in `report` only load the sums.

use super::catalog::{quantity, Category, Commodity, Quantities, Season, COMMODITIES};
use crate::commands::utils::round2;
use crate::db::FarmerRequest;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

const CRITICAL_PERCENT: i64 = 100;
const WARNING_PERCENT: i64 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

/// `part / whole * 100`, or `None` when `whole` is zero.
pub fn percent(part: Decimal, whole: Decimal) -> Option<Decimal> {
    if whole.is_zero() {
        None
    } else {
        Some(round2(part / whole * Decimal::from(100)))
    }
}

/// Requested share of the allocation. Demand against a zero allocation is
/// critical with no percentage; no demand at all is ok.
pub fn usage(allocated: Decimal, requested: Decimal) -> (Option<Decimal>, Severity) {
    if allocated.is_zero() {
        return if requested > Decimal::ZERO {
            (None, Severity::Critical)
        } else {
            (Some(Decimal::ZERO), Severity::Ok)
        };
    }
    let pct = percent(requested, allocated).unwrap_or(Decimal::ZERO);
    // thresholds compare the exact share, the reported percentage is rounded
    let share = requested * Decimal::from(100);
    let severity = if share >= allocated * Decimal::from(CRITICAL_PERCENT) {
        Severity::Critical
    } else if share >= allocated * Decimal::from(WARNING_PERCENT) {
        Severity::Warning
    } else {
        Severity::Ok
    };
    (Some(pct), severity)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommodityGap {
    pub key: &'static str,
    pub label: &'static str,
    pub column: &'static str,
    pub category: Category,
    pub unit: &'static str,
    pub allocated: Decimal,
    pub requested: Decimal,
    pub distributed: Decimal,
    pub gap: Decimal,
    pub remaining_stock: Decimal,
    pub percentage_used: Option<Decimal>,
    pub status: Severity,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotals {
    pub allocated: Decimal,
    pub requested: Decimal,
    pub distributed: Decimal,
    pub gap: Decimal,
    pub percentage_used: Option<Decimal>,
    pub status: Severity,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GapAnalysis {
    pub season: String,
    pub has_allocation: bool,
    pub request_count: i64,
    pub farmer_count: i64,
    pub commodities: Vec<CommodityGap>,
    pub fertilizer: CategoryTotals,
    pub seed: CategoryTotals,
}

impl GapAnalysis {
    pub fn commodity(&self, column: &str) -> Option<&CommodityGap> {
        self.commodities.iter().find(|c| c.column == column)
    }
}

/// Season-wide demand: totals over non-rejected requests.
#[derive(Debug, Clone, Default)]
pub struct Demand {
    pub requested: Quantities,
    pub request_count: i64,
    pub farmer_count: i64,
}

fn commodity_gap(
    c: &'static Commodity,
    allocated: Decimal,
    requested: Decimal,
    distributed: Decimal,
) -> CommodityGap {
    let (percentage_used, status) = usage(allocated, requested);
    CommodityGap {
        key: c.key,
        label: c.label,
        column: c.column,
        category: c.category,
        unit: c.category.unit(),
        allocated,
        requested,
        distributed,
        gap: allocated - requested,
        remaining_stock: allocated - distributed,
        percentage_used,
        status,
    }
}

fn category_totals(commodities: &[CommodityGap], category: Category) -> CategoryTotals {
    let of_kind = || commodities.iter().filter(move |c| c.category == category);
    let allocated: Decimal = of_kind().map(|c| c.allocated).sum();
    let requested: Decimal = of_kind().map(|c| c.requested).sum();
    let distributed: Decimal = of_kind().map(|c| c.distributed).sum();
    let (percentage_used, status) = usage(allocated, requested);
    CategoryTotals {
        allocated,
        requested,
        distributed,
        gap: allocated - requested,
        percentage_used,
        status,
    }
}

pub fn gap_analysis(
    season: &Season,
    allocation: Option<&Quantities>,
    demand: &Demand,
    distributed: &Quantities,
) -> GapAnalysis {
    let commodities: Vec<CommodityGap> = COMMODITIES
        .iter()
        .map(|c| {
            commodity_gap(
                c,
                allocation.map_or(Decimal::ZERO, |a| quantity(a, c)),
                quantity(&demand.requested, c),
                quantity(distributed, c),
            )
        })
        .collect();

    GapAnalysis {
        season: season.to_string(),
        has_allocation: allocation.is_some(),
        request_count: demand.request_count,
        farmer_count: demand.farmer_count,
        fertilizer: category_totals(&commodities, Category::Fertilizer),
        seed: category_totals(&commodities, Category::Seed),
        commodities,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub severity: Severity,
    pub commodity: Option<&'static str>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct SeverityCounts {
    pub critical: usize,
    pub warning: usize,
    pub ok: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendations {
    pub season: String,
    pub has_allocation: bool,
    pub counts: SeverityCounts,
    pub summary: String,
    pub recommendations: Vec<Recommendation>,
}

fn recommend(c: &CommodityGap) -> Option<Recommendation> {
    let message = match (c.status, c.percentage_used) {
        (_, None) => format!(
            "{}: {} {} requested but none allocated. Request supply from the regional office.",
            c.label,
            c.requested.normalize(),
            c.unit
        ),
        (Severity::Critical, Some(pct)) => format!(
            "{}: requests reach {}% of the allocation with a shortfall of {} {}. Prioritize farmers or request additional supply.",
            c.label,
            pct.normalize(),
            (c.requested - c.allocated).max(Decimal::ZERO).normalize(),
            c.unit
        ),
        (Severity::Warning, Some(pct)) => format!(
            "{}: {}% of the allocation is already requested. Only {} {} remain.",
            c.label,
            pct.normalize(),
            c.gap.normalize(),
            c.unit
        ),
        (Severity::Ok, Some(_)) if c.allocated.is_zero() => return None,
        (Severity::Ok, Some(pct)) => format!(
            "{}: allocation is sufficient ({}% requested, {} {} available).",
            c.label,
            pct.normalize(),
            c.gap.normalize(),
            c.unit
        ),
    };
    Some(Recommendation {
        severity: c.status,
        commodity: Some(c.label),
        message,
    })
}

/// Templated advice ordered critical, then warning, then ok.
pub fn recommendations(analysis: &GapAnalysis) -> Recommendations {
    let mut items: Vec<Recommendation> = Vec::new();
    if !analysis.has_allocation {
        items.push(Recommendation {
            severity: Severity::Critical,
            commodity: None,
            message: format!(
                "No regional allocation is recorded for {}. Record the allocation before approving requests.",
                analysis.season
            ),
        });
    }
    items.extend(analysis.commodities.iter().filter_map(recommend));
    // stable, so catalog order is kept within a severity
    items.sort_by(|a, b| b.severity.cmp(&a.severity));

    let mut counts = SeverityCounts::default();
    for item in items.iter().filter(|i| i.commodity.is_some()) {
        match item.severity {
            Severity::Critical => counts.critical += 1,
            Severity::Warning => counts.warning += 1,
            Severity::Ok => counts.ok += 1,
        }
    }

    let summary = if items.is_empty() {
        format!("No allocations or requests recorded for {}.", analysis.season)
    } else if counts.critical == 0 && counts.warning == 0 && analysis.has_allocation {
        format!("All requested commodities for {} are within allocation.", analysis.season)
    } else {
        format!(
            "{}: {} critical and {} warning commodities need attention.",
            analysis.season, counts.critical, counts.warning
        )
    };

    Recommendations {
        season: analysis.season.clone(),
        has_allocation: analysis.has_allocation,
        counts,
        summary,
        recommendations: items,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BarangayShortage {
    pub barangay: String,
    pub farmer_count: usize,
    pub request_count: usize,
    pub requested: Quantities,
    pub projected_shortfall: Quantities,
    pub requested_fertilizer: Decimal,
    pub requested_seed: Decimal,
    pub shortfall_fertilizer: Decimal,
    pub shortfall_seed: Decimal,
    pub severity: Severity,
}

/// Share of season-wide demand the allocation can cover, capped at 1.
pub fn fill_ratio(c: &CommodityGap) -> Decimal {
    if c.requested.is_zero() {
        Decimal::ONE
    } else {
        (c.allocated / c.requested).min(Decimal::ONE)
    }
}

/// Projects each commodity's season fill ratio onto every barangay's demand.
/// A barangay is as severe as the worst commodity it asked for.
pub fn barangay_shortages(analysis: &GapAnalysis, requests: &[FarmerRequest]) -> Vec<BarangayShortage> {
    struct Acc {
        farmers: std::collections::BTreeSet<i64>,
        requests: usize,
        requested: Quantities,
    }

    let mut by_barangay: BTreeMap<String, Acc> = BTreeMap::new();
    for r in requests.iter().filter(|r| r.status != "rejected") {
        let name = r
            .barangay
            .clone()
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| "Unspecified".to_string());
        let acc = by_barangay.entry(name).or_insert_with(|| Acc {
            farmers: Default::default(),
            requests: 0,
            requested: Quantities::new(),
        });
        acc.farmers.insert(r.farmer_id);
        acc.requests += 1;
        for c in COMMODITIES {
            *acc.requested.entry(c.column.to_string()).or_default() += quantity(&r.quantities, c);
        }
    }

    let mut out: Vec<BarangayShortage> = by_barangay
        .into_iter()
        .map(|(barangay, acc)| {
            let mut shortfall = Quantities::new();
            let mut severity = Severity::Ok;
            let mut short_fert = Decimal::ZERO;
            let mut short_seed = Decimal::ZERO;
            for gap in &analysis.commodities {
                let asked = acc.requested.get(gap.column).copied().unwrap_or_default();
                let short = round2(asked * (Decimal::ONE - fill_ratio(gap)));
                if asked > Decimal::ZERO {
                    severity = severity.max(gap.status);
                }
                match gap.category {
                    Category::Fertilizer => short_fert += short,
                    Category::Seed => short_seed += short,
                }
                shortfall.insert(gap.column.to_string(), short);
            }
            BarangayShortage {
                requested_fertilizer: super::catalog::category_total(&acc.requested, Category::Fertilizer),
                requested_seed: super::catalog::category_total(&acc.requested, Category::Seed),
                barangay,
                farmer_count: acc.farmers.len(),
                request_count: acc.requests,
                requested: acc.requested,
                projected_shortfall: shortfall,
                shortfall_fertilizer: short_fert,
                shortfall_seed: short_seed,
                severity,
            }
        })
        .collect();

    out.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then((b.shortfall_fertilizer + b.shortfall_seed).cmp(&(a.shortfall_fertilizer + a.shortfall_seed)))
            .then(a.barangay.cmp(&b.barangay))
    });
    out
}

/// Raw per-season sums as loaded from the three tables.
#[derive(Debug, Clone, Default)]
pub struct SeasonTotals {
    pub allocated: Option<Quantities>,
    pub requested: Quantities,
    pub distributed: Quantities,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeasonComparison {
    pub season: String,
    pub has_allocation: bool,
    pub allocated_fertilizer: Decimal,
    pub allocated_seed: Decimal,
    pub requested_fertilizer: Decimal,
    pub requested_seed: Decimal,
    pub distributed_fertilizer: Decimal,
    pub distributed_seed: Decimal,
    /// Allocation as a percentage of demand.
    pub fertilizer_coverage: Option<Decimal>,
    pub seed_coverage: Option<Decimal>,
    /// Released quantities as a percentage of demand.
    pub fertilizer_fill_rate: Option<Decimal>,
    pub seed_fill_rate: Option<Decimal>,
}

/// One row per season that has any data, oldest first. Season keys that do
/// not parse sort after the valid ones.
pub fn historical_comparison(totals: BTreeMap<String, SeasonTotals>) -> Vec<SeasonComparison> {
    use super::catalog::category_total;

    let mut rows: Vec<(Option<Season>, SeasonComparison)> = totals
        .into_iter()
        .map(|(season, t)| {
            let allocated = t.allocated.clone().unwrap_or_default();
            let af = category_total(&allocated, Category::Fertilizer);
            let as_ = category_total(&allocated, Category::Seed);
            let rf = category_total(&t.requested, Category::Fertilizer);
            let rs = category_total(&t.requested, Category::Seed);
            let df = category_total(&t.distributed, Category::Fertilizer);
            let ds = category_total(&t.distributed, Category::Seed);
            (
                season.parse::<Season>().ok(),
                SeasonComparison {
                    has_allocation: t.allocated.is_some(),
                    allocated_fertilizer: af,
                    allocated_seed: as_,
                    requested_fertilizer: rf,
                    requested_seed: rs,
                    distributed_fertilizer: df,
                    distributed_seed: ds,
                    fertilizer_coverage: percent(af, rf),
                    seed_coverage: percent(as_, rs),
                    fertilizer_fill_rate: percent(df, rf),
                    seed_fill_rate: percent(ds, rs),
                    season,
                },
            )
        })
        .collect();

    rows.sort_by(|(a, ra), (b, rb)| match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => ra.season.cmp(&rb.season),
    });
    rows.into_iter().map(|(_, row)| row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::distribution::catalog::zero_quantities;

    fn q(pairs: &[(&str, i64)]) -> Quantities {
        let mut out = zero_quantities();
        for (col, v) in pairs {
            out.insert(col.to_string(), Decimal::from(*v));
        }
        out
    }

    fn season() -> Season {
        "wet_2025".parse().unwrap()
    }

    fn request(id: i64, farmer: i64, barangay: &str, status: &str, qty: Quantities) -> FarmerRequest {
        FarmerRequest {
            id,
            season: "wet_2025".into(),
            farmer_id: farmer,
            farmer_name: format!("Farmer {}", farmer),
            barangay: Some(barangay.into()),
            quantities: qty,
            status: status.into(),
            notes: None,
            request_date: None,
            created_by: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn usage_thresholds() {
        assert_eq!(usage(d(100), d(100)), (Some(d(100)), Severity::Critical));
        assert_eq!(usage(d(100), d(75)), (Some(d(75)), Severity::Warning));
        assert_eq!(usage(d(100), d(74)), (Some(d(74)), Severity::Ok));
        assert_eq!(usage(d(0), d(5)), (None, Severity::Critical));
        assert_eq!(usage(d(0), d(0)), (Some(d(0)), Severity::Ok));
    }

    #[test]
    fn thresholds_ignore_display_rounding() {
        let (pct, severity) = usage(d(100_000), Decimal::new(9_999_999, 2));
        assert_eq!(pct, Some(d(100)));
        assert_eq!(severity, Severity::Warning);

        let (pct, severity) = usage(d(100_000), Decimal::new(7_499_999, 2));
        assert_eq!(pct, Some(d(75)));
        assert_eq!(severity, Severity::Ok);
    }

    #[test]
    fn gap_analysis_per_commodity_and_category() {
        let allocation = q(&[("urea_46_0_0_bags", 100), ("jackpot_kg", 200)]);
        let demand = Demand {
            requested: q(&[("urea_46_0_0_bags", 80), ("jackpot_kg", 250), ("us88_kg", 10)]),
            request_count: 3,
            farmer_count: 2,
        };
        let distributed = q(&[("urea_46_0_0_bags", 30)]);

        let g = gap_analysis(&season(), Some(&allocation), &demand, &distributed);
        assert!(g.has_allocation);

        let urea = g.commodity("urea_46_0_0_bags").unwrap();
        assert_eq!(urea.gap, Decimal::from(20));
        assert_eq!(urea.remaining_stock, Decimal::from(70));
        assert_eq!(urea.status, Severity::Warning);

        let jackpot = g.commodity("jackpot_kg").unwrap();
        assert_eq!(jackpot.gap, Decimal::from(-50));
        assert_eq!(jackpot.status, Severity::Critical);

        let us88 = g.commodity("us88_kg").unwrap();
        assert_eq!(us88.percentage_used, None);
        assert_eq!(us88.status, Severity::Critical);

        assert_eq!(g.fertilizer.allocated, Decimal::from(100));
        assert_eq!(g.seed.requested, Decimal::from(260));
        assert_eq!(g.seed.status, Severity::Critical);
    }

    #[test]
    fn recommendations_are_ordered_by_severity() {
        let allocation = q(&[("urea_46_0_0_bags", 100), ("complete_14_14_14_bags", 100)]);
        let demand = Demand {
            requested: q(&[("urea_46_0_0_bags", 10), ("complete_14_14_14_bags", 90), ("th82_kg", 5)]),
            ..Demand::default()
        };
        let g = gap_analysis(&season(), Some(&allocation), &demand, &zero_quantities());
        let r = recommendations(&g);

        let severities: Vec<Severity> = r.recommendations.iter().map(|x| x.severity).collect();
        assert_eq!(severities, vec![Severity::Critical, Severity::Warning, Severity::Ok]);
        assert_eq!(r.recommendations[0].commodity, Some("TH82"));
        assert_eq!(r.counts, SeverityCounts { critical: 1, warning: 1, ok: 1 });
        assert!(r.summary.contains("1 critical"));
    }

    #[test]
    fn missing_allocation_leads_recommendations() {
        let g = gap_analysis(&season(), None, &Demand::default(), &zero_quantities());
        let r = recommendations(&g);
        assert_eq!(r.recommendations.len(), 1);
        assert!(r.recommendations[0].commodity.is_none());
        assert_eq!(r.recommendations[0].severity, Severity::Critical);
    }

    #[test]
    fn barangay_shortfall_uses_season_fill_ratio() {
        let allocation = q(&[("urea_46_0_0_bags", 50)]);
        let requests = vec![
            request(1, 1, "Calao", "pending", q(&[("urea_46_0_0_bags", 60)])),
            request(2, 2, "Poblacion", "approved", q(&[("urea_46_0_0_bags", 40)])),
            request(3, 3, "Poblacion", "rejected", q(&[("urea_46_0_0_bags", 500)])),
            request(4, 4, "Bantud", "pending", q(&[("complete_14_14_14_bags", 0)])),
        ];
        let demand = Demand {
            requested: q(&[("urea_46_0_0_bags", 100)]),
            ..Demand::default()
        };
        let g = gap_analysis(&season(), Some(&allocation), &demand, &zero_quantities());
        let rows = barangay_shortages(&g, &requests);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].barangay, "Calao");
        assert_eq!(rows[0].projected_shortfall["urea_46_0_0_bags"], Decimal::from(30));
        assert_eq!(rows[0].severity, Severity::Critical);
        assert_eq!(rows[1].barangay, "Poblacion");
        assert_eq!(rows[1].request_count, 1);
        assert_eq!(rows[1].shortfall_fertilizer, Decimal::from(20));
        assert_eq!(rows[2].barangay, "Bantud");
        assert_eq!(rows[2].severity, Severity::Ok);
    }

    #[test]
    fn history_sorts_seasons_and_computes_rates() {
        let mut totals = BTreeMap::new();
        totals.insert(
            "wet_2024".to_string(),
            SeasonTotals {
                allocated: Some(q(&[("urea_46_0_0_bags", 50)])),
                requested: q(&[("urea_46_0_0_bags", 100)]),
                distributed: q(&[("urea_46_0_0_bags", 40)]),
            },
        );
        totals.insert(
            "dry_2025".to_string(),
            SeasonTotals {
                requested: q(&[("rh9000_kg", 10)]),
                ..SeasonTotals::default()
            },
        );
        totals.insert("dry_2024".to_string(), SeasonTotals::default());

        let rows = historical_comparison(totals);
        let seasons: Vec<&str> = rows.iter().map(|r| r.season.as_str()).collect();
        assert_eq!(seasons, ["dry_2024", "wet_2024", "dry_2025"]);

        let wet = &rows[1];
        assert_eq!(wet.fertilizer_coverage, Some(Decimal::from(50)));
        assert_eq!(wet.fertilizer_fill_rate, Some(Decimal::from(40)));
        assert_eq!(wet.seed_fill_rate, None);
        assert!(!rows[2].has_allocation);
    }
}
