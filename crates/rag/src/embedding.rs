use reqwest::blocking::Client;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use finmda_core::{FinError, HashEmbedder, HashEmbedderConfig, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// The embedding port. Implementations must return one vector per input, in
/// input order, with a fixed dimensionality per model.
pub trait Embedder: Send + Sync {
    fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut output = self.embed_batch(&[text.to_string()])?;
        output
            .pop()
            .ok_or_else(|| FinError::EmbeddingUnavailable("backend returned no vectors".into()))
    }
}

#[derive(Clone)]
pub enum EmbeddingBackend {
    Hash(HashEmbedder),
    OpenAi(OpenAiEmbeddingClient),
}

#[derive(Clone)]
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
}

impl EmbeddingClient {
    /// `EMBEDDING_PROVIDER=openai` selects the HTTP backend (model from
    /// `EMBEDDING_MODEL`); anything else falls back to the deterministic
    /// hash embedder sized by `HASH_EMBED_DIMENSIONS`.
    pub fn from_env() -> Result<Self> {
        match env::var("EMBEDDING_PROVIDER")
            .unwrap_or_else(|_| "hash".to_string())
            .to_lowercase()
            .as_str()
        {
            "openai" => {
                let model = env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-small".to_string());
                let timeout = env::var("EMBEDDING_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS);
                Ok(Self {
                    backend: EmbeddingBackend::OpenAi(OpenAiEmbeddingClient::new(
                        &model,
                        Duration::from_secs(timeout),
                    )?),
                })
            }
            _ => {
                let dims = env::var("HASH_EMBED_DIMENSIONS")
                    .ok()
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(64);
                Ok(Self::hash_with(HashEmbedderConfig {
                    dimensions: dims,
                    seed: 1337,
                }))
            }
        }
    }

    pub fn hash() -> Self {
        Self::hash_with(HashEmbedderConfig::default())
    }

    pub fn hash_with(config: HashEmbedderConfig) -> Self {
        Self {
            backend: EmbeddingBackend::Hash(HashEmbedder::new(config)),
        }
    }
}

impl Embedder for EmbeddingClient {
    fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => Ok(embedder.embed_batch(inputs)),
            EmbeddingBackend::OpenAi(client) => client.embed_batch(inputs),
        }
    }
}

/// Blocking OpenAI embeddings client with a bounded request timeout. A
/// timeout or transport failure surfaces as `EmbeddingUnavailable` so the
/// retriever fails closed instead of returning partial results.
#[derive(Clone)]
pub struct OpenAiEmbeddingClient {
    http: Client,
    model: String,
    api_key: String,
}

impl OpenAiEmbeddingClient {
    pub fn new(model: &str, timeout: Duration) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            FinError::InvalidConfig("OPENAI_API_KEY is required for openai embeddings".into())
        })?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FinError::EmbeddingUnavailable(e.to_string()))?;
        Ok(Self {
            http,
            model: model.to_string(),
            api_key,
        })
    }

    pub fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let url = "https://api.openai.com/v1/embeddings";
        let payload = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .map_err(|e| FinError::EmbeddingUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FinError::EmbeddingUnavailable(format!(
                "openai embeddings request failed: {}",
                response.status()
            )));
        }
        let parsed: OpenAiEmbeddingResponse = response
            .json()
            .map_err(|e| FinError::EmbeddingUnavailable(e.to_string()))?;
        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        if vectors.len() != inputs.len() {
            return Err(FinError::EmbeddingUnavailable(format!(
                "expected {} vectors, got {}",
                inputs.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
}
