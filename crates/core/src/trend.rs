use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::series::{MetricSeries, NEAR_ZERO};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    Unknown,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
            TrendDirection::Unknown => "unknown",
        }
    }
}

/// Ordinary-least-squares trend over the period index of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub concept: String,
    pub direction: TrendDirection,
    /// |r|: how tightly the series hugs the fitted line.
    pub strength: f64,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub p_value: f64,
    /// slope * N + intercept, the fit evaluated one step past the data.
    pub forecast_next: f64,
    /// Standard deviation of the residuals.
    pub volatility: f64,
}

impl TrendResult {
    fn unknown(concept: String) -> Self {
        Self {
            concept,
            direction: TrendDirection::Unknown,
            strength: 0.0,
            slope: 0.0,
            intercept: 0.0,
            r_squared: 0.0,
            p_value: 1.0,
            forecast_next: 0.0,
            volatility: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r: f64,
    pub residual_std: f64,
}

/// Fits value against index 0..N-1. Callers guarantee `values.len() >= 2`.
pub(crate) fn linear_fit(values: &[f64]) -> LinearFit {
    let n = values.len() as f64;
    let mean_x = (values.len() - 1) as f64 / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let intercept = mean_y - slope * mean_x;
    let r = if sxx > NEAR_ZERO && syy > NEAR_ZERO {
        sxy / (sxx * syy).sqrt()
    } else {
        0.0
    };
    let ss_res: f64 = values
        .iter()
        .enumerate()
        .map(|(i, y)| {
            let predicted = slope * i as f64 + intercept;
            (y - predicted).powi(2)
        })
        .sum();
    LinearFit {
        slope,
        intercept,
        r,
        residual_std: (ss_res / n).sqrt(),
    }
}

/// Two-sided p-value of the slope under the t-distribution with n-2 degrees
/// of freedom.
fn slope_p_value(r: f64, n: usize) -> f64 {
    if n < 3 {
        return 1.0;
    }
    let df = (n - 2) as f64;
    let denom = 1.0 - r * r;
    if denom <= f64::EPSILON {
        return 0.0;
    }
    let t = r * (df / denom).sqrt();
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

/// With fewer than 3 points the result is degenerate (`Unknown`, zeroed
/// statistics) rather than an error, so callers can narrate "not enough
/// history".
pub fn analyze_trend(series: &MetricSeries) -> TrendResult {
    let values = series.values();
    if values.len() < 3 {
        return TrendResult::unknown(series.concept.clone());
    }
    let fit = linear_fit(&values);
    let direction = if fit.slope > 0.0 {
        TrendDirection::Increasing
    } else if fit.slope < 0.0 {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };
    TrendResult {
        concept: series.concept.clone(),
        direction,
        strength: fit.r.abs(),
        slope: fit.slope,
        intercept: fit.intercept,
        r_squared: fit.r * fit.r,
        p_value: slope_p_value(fit.r, values.len()),
        forecast_next: fit.slope * values.len() as f64 + fit.intercept,
        volatility: fit.residual_std,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Period;

    fn series(values: &[f64]) -> MetricSeries {
        let mut s = MetricSeries::new("ACME", "Revenue");
        let mut period = Period::new(2022, 1).unwrap();
        for v in values {
            s.push(period, *v);
            period = period.next();
        }
        s
    }

    #[test]
    fn strictly_increasing_series_trends_up() {
        let result = analyze_trend(&series(&[100.0, 110.0, 120.0, 130.0]));
        assert_eq!(result.direction, TrendDirection::Increasing);
        assert!(result.slope > 0.0);
        assert!((result.r_squared - 1.0).abs() < 1e-9);
        assert!(result.p_value < 0.01);
        assert!((result.forecast_next - 140.0).abs() < 1e-9);
        assert!(result.volatility < 1e-9);
    }

    #[test]
    fn decreasing_series_trends_down() {
        let result = analyze_trend(&series(&[130.0, 120.0, 110.0]));
        assert_eq!(result.direction, TrendDirection::Decreasing);
        assert!(result.slope < 0.0);
    }

    #[test]
    fn constant_series_is_stable_with_zero_r_squared() {
        let result = analyze_trend(&series(&[50.0, 50.0, 50.0, 50.0]));
        assert_eq!(result.direction, TrendDirection::Stable);
        assert_eq!(result.slope, 0.0);
        assert_eq!(result.r_squared, 0.0);
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn short_series_is_unknown_without_panicking() {
        let result = analyze_trend(&series(&[100.0, 120.0]));
        assert_eq!(result.direction, TrendDirection::Unknown);
        assert_eq!(result.slope, 0.0);
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn noisy_series_has_pvalue_between_zero_and_one() {
        let result = analyze_trend(&series(&[100.0, 90.0, 130.0, 95.0, 140.0, 100.0]));
        assert!(result.p_value > 0.0 && result.p_value <= 1.0);
        assert!(result.r_squared >= 0.0 && result.r_squared < 1.0);
        assert!(result.volatility > 0.0);
    }
}
