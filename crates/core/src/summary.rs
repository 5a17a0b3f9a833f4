use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::deltas::{compute_kpis, DeltaMetric};
use crate::ratios::{compute_ratios, RatioGroup, Snapshot};
use crate::series::{SeriesSet, TimeSeriesPoint};
use crate::trend::{analyze_trend, TrendResult};

/// The metrics payload handed to narrative generation, alongside the
/// retrieval evidence bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub company: String,
    pub ratios: BTreeMap<String, f64>,
    pub warnings: Vec<String>,
    pub deltas: Vec<DeltaMetric>,
    pub trends: Vec<TrendResult>,
    pub generated_at: DateTime<Utc>,
}

/// Stateless over its inputs; safe to share across threads.
pub struct MetricsEngine {
    groups: Vec<RatioGroup>,
}

impl Default for MetricsEngine {
    fn default() -> Self {
        Self {
            groups: RatioGroup::ALL.to_vec(),
        }
    }
}

impl MetricsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_groups(groups: Vec<RatioGroup>) -> Self {
        Self { groups }
    }

    pub fn summarize(
        &self,
        company: &str,
        snapshot: &Snapshot,
        points: Vec<TimeSeriesPoint>,
    ) -> FinancialSummary {
        let report = compute_ratios(snapshot, &self.groups);
        let set = SeriesSet::from_points(points);
        let deltas = compute_kpis(&set, company);
        let trends = set.company_series(company).map(analyze_trend).collect();
        FinancialSummary {
            company: company.to_string(),
            ratios: report.ratios,
            warnings: report.warnings,
            deltas,
            trends,
            generated_at: Utc::now(),
        }
    }
}
