mod chunk;
mod deltas;
mod embedding;
mod error;
mod forecast;
mod ratios;
mod series;
mod summary;
mod trend;

pub use chunk::{chunk_id, Chunk, ChunkConfig, Chunker};
pub use deltas::{
    compute_deltas, compute_kpis, pct_change, DeltaMetric, CONCEPT_GROSS_PROFIT, CONCEPT_REVENUE,
};
pub use embedding::{HashEmbedder, HashEmbedderConfig};
pub use error::{FinError, Result};
pub use forecast::{Forecast, ForecastMethod, ForecastPoint, Forecaster, SeasonalModel};
pub use ratios::{compute_ratios, RatioGroup, RatioReport, Snapshot};
pub use series::{MetricSeries, Period, SeriesSet, TimeSeriesPoint};
pub use summary::{FinancialSummary, MetricsEngine};
pub use trend::{analyze_trend, TrendDirection, TrendResult};
