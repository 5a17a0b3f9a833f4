use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::series::{MetricSeries, Period};
use crate::trend::linear_fit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    Linear,
    Seasonal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub period: Period,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub concept: String,
    pub method: ForecastMethod,
    pub points: Vec<ForecastPoint>,
    pub confidence_score: f64,
}

/// External seasonal/time-series capability. Implementations may be
/// unavailable or fail at runtime; the forecaster then degrades to the
/// closed-form linear strategy instead of surfacing the failure.
pub trait SeasonalModel: Send + Sync {
    fn forecast(&self, series: &MetricSeries, horizon: usize) -> Result<Vec<ForecastPoint>>;
}

pub struct Forecaster {
    seasonal: Option<Box<dyn SeasonalModel>>,
}

impl Forecaster {
    pub fn linear() -> Self {
        Self { seasonal: None }
    }

    pub fn with_seasonal(model: Box<dyn SeasonalModel>) -> Self {
        Self {
            seasonal: Some(model),
        }
    }

    /// Seasonal strategy when present and healthy (confidence 0.9), linear
    /// extrapolation with 95% residual bands otherwise (confidence 0.8).
    /// Fewer than 2 points is a result state: an empty forecast with
    /// confidence 0.0.
    pub fn forecast(&self, series: &MetricSeries, horizon: usize) -> Forecast {
        if series.len() < 2 || horizon == 0 {
            return Forecast {
                concept: series.concept.clone(),
                method: ForecastMethod::Linear,
                points: Vec::new(),
                confidence_score: 0.0,
            };
        }
        if let Some(model) = &self.seasonal {
            match model.forecast(series, horizon) {
                Ok(points) => {
                    return Forecast {
                        concept: series.concept.clone(),
                        method: ForecastMethod::Seasonal,
                        points,
                        confidence_score: 0.9,
                    }
                }
                Err(err) => {
                    warn!(
                        concept = %series.concept,
                        error = %err,
                        "seasonal forecast failed, falling back to linear"
                    );
                }
            }
        }
        Forecast {
            concept: series.concept.clone(),
            method: ForecastMethod::Linear,
            points: linear_points(series, horizon),
            confidence_score: 0.8,
        }
    }
}

fn linear_points(series: &MetricSeries, horizon: usize) -> Vec<ForecastPoint> {
    let Some(last) = series.last_period() else {
        return Vec::new();
    };
    let values = series.values();
    let fit = linear_fit(&values);
    let band = 1.96 * fit.residual_std;
    let mut period = last;
    (0..horizon)
        .map(|step| {
            period = period.next();
            let x = (values.len() + step) as f64;
            let value = fit.slope * x + fit.intercept;
            ForecastPoint {
                period,
                value,
                lower: value - band,
                upper: value + band,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FinError;

    fn series(values: &[f64]) -> MetricSeries {
        let mut s = MetricSeries::new("ACME", "Revenue");
        let mut period = Period::new(2023, 1).unwrap();
        for v in values {
            s.push(period, *v);
            period = period.next();
        }
        s
    }

    struct FailingSeasonal;

    impl SeasonalModel for FailingSeasonal {
        fn forecast(&self, _: &MetricSeries, _: usize) -> Result<Vec<ForecastPoint>> {
            Err(FinError::Other("model not loaded".to_string()))
        }
    }

    struct FlatSeasonal;

    impl SeasonalModel for FlatSeasonal {
        fn forecast(&self, series: &MetricSeries, horizon: usize) -> Result<Vec<ForecastPoint>> {
            let last = series.last_period().unwrap();
            let value = series.get(last).unwrap();
            let mut period = last;
            Ok((0..horizon)
                .map(|_| {
                    period = period.next();
                    ForecastPoint {
                        period,
                        value,
                        lower: value,
                        upper: value,
                    }
                })
                .collect())
        }
    }

    #[test]
    fn linear_extrapolation_continues_the_line() {
        let forecast = Forecaster::linear().forecast(&series(&[100.0, 110.0, 120.0]), 2);
        assert_eq!(forecast.method, ForecastMethod::Linear);
        assert_eq!(forecast.confidence_score, 0.8);
        assert_eq!(forecast.points.len(), 2);
        assert!((forecast.points[0].value - 130.0).abs() < 1e-9);
        assert!((forecast.points[1].value - 140.0).abs() < 1e-9);
        assert_eq!(forecast.points[0].period, Period::new(2023, 4).unwrap());
        assert_eq!(forecast.points[1].period, Period::new(2024, 1).unwrap());
    }

    #[test]
    fn degrades_to_linear_when_seasonal_fails() {
        let forecaster = Forecaster::with_seasonal(Box::new(FailingSeasonal));
        let forecast = forecaster.forecast(&series(&[100.0, 110.0, 120.0]), 1);
        assert_eq!(forecast.method, ForecastMethod::Linear);
        assert_eq!(forecast.confidence_score, 0.8);
        assert!(!forecast.points.is_empty());
    }

    #[test]
    fn healthy_seasonal_model_wins() {
        let forecaster = Forecaster::with_seasonal(Box::new(FlatSeasonal));
        let forecast = forecaster.forecast(&series(&[100.0, 110.0, 120.0]), 3);
        assert_eq!(forecast.method, ForecastMethod::Seasonal);
        assert_eq!(forecast.confidence_score, 0.9);
        assert_eq!(forecast.points.len(), 3);
        assert_eq!(forecast.points[0].value, 120.0);
    }

    #[test]
    fn too_little_history_is_an_empty_forecast() {
        let forecast = Forecaster::linear().forecast(&series(&[100.0]), 4);
        assert!(forecast.points.is_empty());
        assert_eq!(forecast.confidence_score, 0.0);
    }

    #[test]
    fn residual_bands_are_symmetric() {
        let forecast = Forecaster::linear().forecast(&series(&[100.0, 90.0, 130.0, 95.0]), 1);
        let point = &forecast.points[0];
        assert!(point.lower < point.value && point.value < point.upper);
        assert!(((point.value - point.lower) - (point.upper - point.value)).abs() < 1e-9);
    }
}
