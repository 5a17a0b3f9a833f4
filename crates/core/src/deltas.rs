use serde::{Deserialize, Serialize};

use crate::series::{MetricSeries, Period, SeriesSet, NEAR_ZERO};

pub const CONCEPT_REVENUE: &str = "Revenue";
pub const CONCEPT_GROSS_PROFIT: &str = "GrossProfit";

/// Period-over-period movement of one concept. Percentage fields are `None`
/// (never NaN or Inf) when the required prior period is missing or its value
/// is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaMetric {
    pub concept: String,
    pub period: Period,
    pub qoq_pct: Option<f64>,
    pub yoy_pct: Option<f64>,
    pub derived_ratio: Option<f64>,
}

/// `(current - previous) / previous * 100`, undefined for a (near-)zero base.
pub fn pct_change(current: f64, previous: f64) -> Option<f64> {
    if previous.abs() <= NEAR_ZERO {
        None
    } else {
        Some((current - previous) / previous * 100.0)
    }
}

/// QoQ compares against the immediately preceding point in period order; YoY
/// against the same quarter of the prior year, so a gapped series yields
/// `None` rather than a mismatched pairing.
pub fn compute_deltas(series: &MetricSeries) -> Vec<DeltaMetric> {
    let points: Vec<(Period, f64)> = series.iter().collect();
    points
        .iter()
        .enumerate()
        .map(|(i, (period, value))| {
            let qoq_pct = if i > 0 {
                pct_change(*value, points[i - 1].1)
            } else {
                None
            };
            let yoy_pct = series
                .get(period.prior_year())
                .and_then(|prior| pct_change(*value, prior));
            DeltaMetric {
                concept: series.concept.clone(),
                period: *period,
                qoq_pct,
                yoy_pct,
                derived_ratio: None,
            }
        })
        .collect()
}

/// Deltas for every concept a company reports. GrossProfit rows additionally
/// carry the per-period gross margin when Revenue exists for that period.
pub fn compute_kpis(set: &SeriesSet, company: &str) -> Vec<DeltaMetric> {
    let revenue = set.get(company, CONCEPT_REVENUE);
    let mut out = Vec::new();
    for series in set.company_series(company) {
        let mut deltas = compute_deltas(series);
        if series.concept == CONCEPT_GROSS_PROFIT {
            for delta in &mut deltas {
                delta.derived_ratio = gross_margin(series, revenue, delta.period);
            }
        }
        out.extend(deltas);
    }
    out
}

fn gross_margin(
    gross_profit: &MetricSeries,
    revenue: Option<&MetricSeries>,
    period: Period,
) -> Option<f64> {
    let gp = gross_profit.get(period)?;
    let rev = revenue?.get(period)?;
    if rev.abs() > NEAR_ZERO {
        Some(gp / rev)
    } else {
        None
    }
}
