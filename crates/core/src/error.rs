use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),
    #[error("invalid period label: {0}")]
    InvalidPeriod(String),
    #[error("other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, FinError>;

impl From<anyhow::Error> for FinError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}
