use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::series::NEAR_ZERO;

/// Point-in-time statement values keyed by concept, e.g. `current_assets`.
pub type Snapshot = HashMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioGroup {
    Liquidity,
    Profitability,
    Leverage,
    Efficiency,
    Valuation,
}

impl RatioGroup {
    pub const ALL: [RatioGroup; 5] = [
        RatioGroup::Liquidity,
        RatioGroup::Profitability,
        RatioGroup::Leverage,
        RatioGroup::Efficiency,
        RatioGroup::Valuation,
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatioReport {
    pub ratios: BTreeMap<String, f64>,
    /// Data-quality annotations, e.g. a negative value in a normally-positive
    /// concept. Never a hard failure; upstream data quality is not ours.
    pub warnings: Vec<String>,
}

/// Concepts that are negative only when the upstream extraction went wrong.
const NORMALLY_POSITIVE: [&str; 8] = [
    "revenue",
    "total_assets",
    "current_assets",
    "current_liabilities",
    "inventory",
    "cash",
    "market_cap",
    "book_value",
];

/// Computes the requested ratio groups over a snapshot. A ratio is emitted
/// only when its denominator is meaningfully non-zero; undefined ratios are
/// omitted rather than reported as Inf or NaN.
pub fn compute_ratios(snapshot: &Snapshot, groups: &[RatioGroup]) -> RatioReport {
    let mut report = RatioReport::default();
    flag_anomalies(snapshot, &mut report.warnings);
    for group in groups {
        match group {
            RatioGroup::Liquidity => liquidity(snapshot, &mut report.ratios),
            RatioGroup::Profitability => profitability(snapshot, &mut report.ratios),
            RatioGroup::Leverage => leverage(snapshot, &mut report.ratios),
            RatioGroup::Efficiency => efficiency(snapshot, &mut report.ratios),
            RatioGroup::Valuation => valuation(snapshot, &mut report.ratios),
        }
    }
    report
}

fn value(snapshot: &Snapshot, concept: &str) -> f64 {
    snapshot.get(concept).copied().unwrap_or(0.0)
}

fn ratio(out: &mut BTreeMap<String, f64>, name: &str, numerator: f64, denominator: f64) {
    if denominator.abs() > NEAR_ZERO {
        out.insert(name.to_string(), numerator / denominator);
    }
}

fn liquidity(s: &Snapshot, out: &mut BTreeMap<String, f64>) {
    let current_liabilities = value(s, "current_liabilities");
    ratio(out, "current_ratio", value(s, "current_assets"), current_liabilities);
    ratio(
        out,
        "quick_ratio",
        value(s, "current_assets") - value(s, "inventory"),
        current_liabilities,
    );
    ratio(out, "cash_ratio", value(s, "cash"), current_liabilities);
}

fn profitability(s: &Snapshot, out: &mut BTreeMap<String, f64>) {
    let revenue = value(s, "revenue");
    let net_income = value(s, "net_income");
    ratio(out, "gross_margin", value(s, "gross_profit"), revenue);
    ratio(out, "net_margin", net_income, revenue);
    ratio(out, "return_on_assets", net_income, value(s, "total_assets"));
    ratio(
        out,
        "return_on_equity",
        net_income,
        value(s, "shareholders_equity"),
    );
}

fn leverage(s: &Snapshot, out: &mut BTreeMap<String, f64>) {
    let total_debt = value(s, "total_debt");
    ratio(out, "debt_ratio", total_debt, value(s, "total_assets"));
    ratio(
        out,
        "debt_to_equity",
        total_debt,
        value(s, "shareholders_equity"),
    );
    ratio(
        out,
        "interest_coverage",
        value(s, "ebit"),
        value(s, "interest_expense"),
    );
}

fn efficiency(s: &Snapshot, out: &mut BTreeMap<String, f64>) {
    let revenue = value(s, "revenue");
    ratio(out, "asset_turnover", revenue, value(s, "total_assets"));
    ratio(
        out,
        "inventory_turnover",
        value(s, "cost_of_goods_sold"),
        value(s, "inventory"),
    );
    ratio(
        out,
        "receivables_turnover",
        revenue,
        value(s, "accounts_receivable"),
    );
}

fn valuation(s: &Snapshot, out: &mut BTreeMap<String, f64>) {
    let market_cap = value(s, "market_cap");
    ratio(out, "price_to_earnings", market_cap, value(s, "net_income"));
    ratio(out, "price_to_book", market_cap, value(s, "book_value"));
    ratio(
        out,
        "ev_to_ebitda",
        value(s, "enterprise_value"),
        value(s, "ebitda"),
    );
}

fn flag_anomalies(snapshot: &Snapshot, warnings: &mut Vec<String>) {
    for concept in NORMALLY_POSITIVE {
        if let Some(v) = snapshot.get(concept) {
            if *v < 0.0 {
                warnings.push(format!(
                    "{concept} is negative ({v}); ratios involving it may be unreliable"
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pairs: &[(&str, f64)]) -> Snapshot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    #[test]
    fn current_ratio_matches_hand_computation() {
        let s = snapshot(&[("current_assets", 500_000.0), ("current_liabilities", 200_000.0)]);
        let report = compute_ratios(&s, &[RatioGroup::Liquidity]);
        assert_eq!(report.ratios.get("current_ratio"), Some(&2.5));
    }

    #[test]
    fn zero_denominator_omits_the_ratio() {
        let s = snapshot(&[("current_assets", 500_000.0), ("current_liabilities", 0.0)]);
        let report = compute_ratios(&s, &[RatioGroup::Liquidity]);
        assert!(report.ratios.get("current_ratio").is_none());
        assert!(report.ratios.values().all(|v| v.is_finite()));
    }

    #[test]
    fn full_group_set_on_reference_snapshot() {
        let s = snapshot(&[
            ("revenue", 1_000_000.0),
            ("gross_profit", 400_000.0),
            ("net_income", 150_000.0),
            ("total_assets", 2_000_000.0),
            ("current_assets", 500_000.0),
            ("current_liabilities", 200_000.0),
            ("total_debt", 800_000.0),
            ("shareholders_equity", 1_200_000.0),
            ("inventory", 100_000.0),
            ("cash", 200_000.0),
            ("accounts_receivable", 150_000.0),
            ("cost_of_goods_sold", 600_000.0),
            ("ebit", 200_000.0),
            ("interest_expense", 50_000.0),
        ]);
        let report = compute_ratios(&s, &RatioGroup::ALL);
        assert_eq!(report.ratios.get("gross_margin"), Some(&0.4));
        assert_eq!(report.ratios.get("quick_ratio"), Some(&2.0));
        assert_eq!(report.ratios.get("interest_coverage"), Some(&4.0));
        let dte = report.ratios.get("debt_to_equity").copied().unwrap();
        assert!((dte - 800_000.0 / 1_200_000.0).abs() < 1e-12);
        // Valuation inputs are absent, so none of its ratios appear.
        assert!(report.ratios.get("price_to_earnings").is_none());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn negative_total_assets_is_a_warning_not_an_error() {
        let s = snapshot(&[("total_assets", -5.0), ("net_income", 1.0)]);
        let report = compute_ratios(&s, &[RatioGroup::Profitability]);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("total_assets"));
        // The ratio is still computed; the warning annotates it.
        assert!(report.ratios.contains_key("return_on_assets"));
    }
}
