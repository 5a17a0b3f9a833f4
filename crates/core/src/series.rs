use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{FinError, Result};

/// Denominators smaller than this are treated as zero.
pub(crate) const NEAR_ZERO: f64 = 1e-9;

static PERIOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?P<year_a>\d{4})\s*[-_ ]?\s*q(?P<q_a>[1-4])|q(?P<q_b>[1-4])\s*[-_ ]?\s*(?P<year_b>\d{4}))\s*$",
    )
    .expect("valid regex")
});

/// A fiscal quarter. Ordering follows calendar order, so `2023Q4 < 2024Q1`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Period {
    pub year: i32,
    pub quarter: u8,
}

impl Period {
    pub fn new(year: i32, quarter: u8) -> Result<Self> {
        if !(1..=4).contains(&quarter) {
            return Err(FinError::InvalidPeriod(format!(
                "quarter must be 1-4, got {quarter}"
            )));
        }
        Ok(Self { year, quarter })
    }

    pub fn next(self) -> Self {
        if self.quarter == 4 {
            Self {
                year: self.year + 1,
                quarter: 1,
            }
        } else {
            Self {
                year: self.year,
                quarter: self.quarter + 1,
            }
        }
    }

    /// Same quarter, one year back. Used for YoY lookups.
    pub fn prior_year(self) -> Self {
        Self {
            year: self.year - 1,
            quarter: self.quarter,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.year, self.quarter)
    }
}

impl FromStr for Period {
    type Err = FinError;

    /// Accepts `2023Q1`, `2023-Q1`, `2023 Q1` and `Q1 2023` style labels.
    fn from_str(label: &str) -> Result<Self> {
        let caps = PERIOD_RE
            .captures(label)
            .ok_or_else(|| FinError::InvalidPeriod(label.to_string()))?;
        let (year, quarter) = if let Some(year) = caps.name("year_a") {
            (year.as_str(), caps.name("q_a").map(|m| m.as_str()))
        } else {
            (
                caps.name("year_b").map(|m| m.as_str()).unwrap_or(""),
                caps.name("q_b").map(|m| m.as_str()),
            )
        };
        let year: i32 = year
            .parse()
            .map_err(|_| FinError::InvalidPeriod(label.to_string()))?;
        let quarter: u8 = quarter
            .and_then(|q| q.parse().ok())
            .ok_or_else(|| FinError::InvalidPeriod(label.to_string()))?;
        Period::new(year, quarter)
    }
}

/// One observation of one concept for one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub company: String,
    pub period: Period,
    pub concept: String,
    pub value: f64,
}

/// Period-ordered values of one concept for one company. Duplicate periods
/// are summed on insert, matching how duplicate statement tags are folded
/// upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub company: String,
    pub concept: String,
    points: BTreeMap<Period, f64>,
}

impl MetricSeries {
    pub fn new(company: impl Into<String>, concept: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            concept: concept.into(),
            points: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, period: Period, value: f64) {
        *self.points.entry(period).or_insert(0.0) += value;
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, period: Period) -> Option<f64> {
        self.points.get(&period).copied()
    }

    pub fn last_period(&self) -> Option<Period> {
        self.points.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Period, f64)> + '_ {
        self.points.iter().map(|(p, v)| (*p, *v))
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.values().copied().collect()
    }
}

/// All series of a corpus, keyed by (company, concept).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesSet {
    series: BTreeMap<(String, String), MetricSeries>,
}

impl SeriesSet {
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = TimeSeriesPoint>,
    {
        let mut set = Self::default();
        for point in points {
            set.push(point);
        }
        set
    }

    pub fn push(&mut self, point: TimeSeriesPoint) {
        let key = (point.company.clone(), point.concept.clone());
        self.series
            .entry(key)
            .or_insert_with(|| MetricSeries::new(point.company, point.concept))
            .push(point.period, point.value);
    }

    pub fn get(&self, company: &str, concept: &str) -> Option<&MetricSeries> {
        self.series
            .get(&(company.to_string(), concept.to_string()))
    }

    pub fn company_series<'a>(
        &'a self,
        company: &'a str,
    ) -> impl Iterator<Item = &'a MetricSeries> + 'a {
        self.series
            .values()
            .filter(move |series| series.company == company)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSeries> {
        self.series.values()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(label: &str) -> Period {
        label.parse().unwrap()
    }

    #[test]
    fn parses_common_period_labels() {
        assert_eq!(p("2023Q1"), Period::new(2023, 1).unwrap());
        assert_eq!(p("2023-Q4"), Period::new(2023, 4).unwrap());
        assert_eq!(p("q2 2024"), Period::new(2024, 2).unwrap());
        assert_eq!(p(" 2022 Q3 "), Period::new(2022, 3).unwrap());
        assert!("2023Q5".parse::<Period>().is_err());
        assert!("FY2023".parse::<Period>().is_err());
    }

    #[test]
    fn periods_order_across_year_boundaries() {
        assert!(p("2023Q4") < p("2024Q1"));
        assert_eq!(p("2023Q4").next(), p("2024Q1"));
        assert_eq!(p("2024Q2").prior_year(), p("2023Q2"));
    }

    #[test]
    fn duplicate_periods_are_summed() {
        let mut series = MetricSeries::new("ACME", "Revenue");
        series.push(p("2023Q1"), 100.0);
        series.push(p("2023Q1"), 50.0);
        assert_eq!(series.len(), 1);
        assert_eq!(series.get(p("2023Q1")), Some(150.0));
    }

    #[test]
    fn series_set_groups_by_company_and_concept() {
        let set = SeriesSet::from_points(vec![
            TimeSeriesPoint {
                company: "ACME".into(),
                period: p("2023Q1"),
                concept: "Revenue".into(),
                value: 100.0,
            },
            TimeSeriesPoint {
                company: "ACME".into(),
                period: p("2023Q2"),
                concept: "Revenue".into(),
                value: 110.0,
            },
            TimeSeriesPoint {
                company: "OTHER".into(),
                period: p("2023Q1"),
                concept: "Revenue".into(),
                value: 5.0,
            },
        ]);
        assert_eq!(set.get("ACME", "Revenue").unwrap().len(), 2);
        assert_eq!(set.company_series("ACME").count(), 1);
        assert_eq!(set.company_series("OTHER").count(), 1);
    }
}
