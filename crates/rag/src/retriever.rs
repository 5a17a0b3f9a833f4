use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use finmda_core::{ChunkConfig, Chunker, FinError, Result};

use crate::embedding::Embedder;
use crate::evidence::{snippet, Citation, EvidenceBundle};
use crate::index::{IndexFilter, IndexHit, IndexItem, VectorIndex, META_DOCUMENT_ID};

pub const META_CHUNK_INDEX: &str = "chunk_index";
pub const META_CHUNK_LENGTH: &str = "chunk_length";
pub const META_COMPANY: &str = "company";
pub const META_PERIOD: &str = "period";

#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub top_k: usize,
    pub chunking: ChunkConfig,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            chunking: ChunkConfig::default(),
        }
    }
}

/// One ranked query result. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub relevance_score: f32,
    pub rank: usize,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMatch {
    pub chunk_id: String,
    pub text: String,
    pub relevance_score: f32,
}

/// Per-document aggregate for "which documents are relevant" queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMatch {
    pub document_id: String,
    pub max_relevance: f32,
    pub chunks: Vec<ChunkMatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_chunks: usize,
}

/// Chunk/embed/upsert pipeline plus ranked retrieval over an abstract
/// vector index. Stateless apart from the injected ports, so one instance
/// serves concurrent callers.
pub struct Retriever {
    embeddings: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chunker: Chunker,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        embeddings: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: RetrieverConfig,
    ) -> Result<Self> {
        let chunker = Chunker::new(config.chunking)?;
        Ok(Self {
            embeddings,
            index,
            chunker,
            top_k: config.top_k.max(1),
        })
    }

    /// Chunks and embeds a document, then applies the whole batch in one
    /// upsert so a partially-indexed document is never retrievable. Chunk
    /// ids are deterministic, so re-running for the same content replaces
    /// rather than duplicates.
    pub fn index_document(
        &self,
        document_id: &str,
        text: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<usize> {
        let chunks = self.chunker.chunk(document_id, text);
        if chunks.is_empty() {
            debug!(document_id, "no indexable text in document");
            return Ok(0);
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embeddings.embed_batch(&texts)?;
        if embeddings.len() != chunks.len() {
            return Err(FinError::EmbeddingUnavailable(format!(
                "expected {} vectors, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }
        let items: Vec<IndexItem> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                let mut meta = metadata.clone();
                meta.insert(META_DOCUMENT_ID.to_string(), document_id.to_string());
                meta.insert(META_CHUNK_INDEX.to_string(), chunk.index.to_string());
                meta.insert(
                    META_CHUNK_LENGTH.to_string(),
                    chunk.text.chars().count().to_string(),
                );
                IndexItem {
                    id: chunk.id,
                    embedding,
                    text: chunk.text,
                    metadata: meta,
                }
            })
            .collect();
        let count = items.len();
        self.index.upsert(items)?;
        info!(document_id, chunks = count, "indexed document");
        Ok(count)
    }

    /// Barrier semantics: when this returns, the document's chunks are no
    /// longer retrievable.
    pub fn delete_document(&self, document_id: &str) -> Result<usize> {
        let deleted = self.index.delete(&IndexFilter::document(document_id))?;
        info!(document_id, deleted, "deleted document chunks");
        Ok(deleted)
    }

    /// Lifecycle hook for the external persistence layer.
    pub fn on_document_added(&self, document_id: &str, text: &str) -> Result<usize> {
        self.index_document(document_id, text, &HashMap::new())
    }

    /// Lifecycle hook for the external persistence layer.
    pub fn on_document_deleted(&self, document_id: &str) -> Result<usize> {
        self.delete_document(document_id)
    }

    /// Embeds the query once, ranks the nearest chunks and assembles the
    /// evidence bundle. No hits is a valid outcome (empty bundle); a failed
    /// embedding or index call fails closed.
    pub fn retrieve(
        &self,
        query: &str,
        document_id: Option<&str>,
        top_k: Option<usize>,
    ) -> Result<EvidenceBundle> {
        let hits = self.ranked_hits(query, document_id, top_k)?;
        let mut context_parts = Vec::with_capacity(hits.len());
        let mut citations = Vec::with_capacity(hits.len());
        for hit in &hits {
            context_parts.push(format!("[Context {}]: {}", hit.rank, hit.text));
            citations.push(Citation {
                index: hit.rank,
                company: hit.metadata.get(META_COMPANY).cloned(),
                period: hit.metadata.get(META_PERIOD).cloned(),
                snippet: snippet(&hit.text),
                relevance_score: hit.relevance_score,
            });
        }
        debug!(query, hits = hits.len(), "retrieved context");
        Ok(EvidenceBundle {
            context: context_parts.join("\n\n"),
            citations,
        })
    }

    /// Degraded mode: embedding or index unavailability yields an empty
    /// bundle instead of an error, for callers that prefer a gap in the
    /// narrative over a failed request.
    pub fn retrieve_best_effort(
        &self,
        query: &str,
        document_id: Option<&str>,
        top_k: Option<usize>,
    ) -> EvidenceBundle {
        match self.retrieve(query, document_id, top_k) {
            Ok(bundle) => bundle,
            Err(err) => {
                warn!(query, error = %err, "retrieval degraded to empty evidence");
                EvidenceBundle::default()
            }
        }
    }

    /// Ranked hits without bundle assembly, for callers that post-process.
    pub fn ranked_hits(
        &self,
        query: &str,
        document_id: Option<&str>,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievalHit>> {
        let vector = self.embeddings.embed(query)?;
        let filter = document_id.map(IndexFilter::document);
        let k = top_k.unwrap_or(self.top_k);
        let hits = self.index.query(&vector, k, filter.as_ref())?;
        Ok(rank(hits))
    }

    /// Groups chunk hits by source document and reports each document's
    /// best relevance, sorted descending.
    pub fn search_similar_documents(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<DocumentMatch>> {
        let hits = self.ranked_hits(query, None, Some(top_k))?;
        let mut by_document: HashMap<String, DocumentMatch> = HashMap::new();
        for hit in hits {
            let entry = by_document
                .entry(hit.document_id.clone())
                .or_insert_with(|| DocumentMatch {
                    document_id: hit.document_id.clone(),
                    max_relevance: hit.relevance_score,
                    chunks: Vec::new(),
                });
            entry.max_relevance = entry.max_relevance.max(hit.relevance_score);
            entry.chunks.push(ChunkMatch {
                chunk_id: hit.chunk_id,
                text: hit.text,
                relevance_score: hit.relevance_score,
            });
        }
        let mut matches: Vec<DocumentMatch> = by_document.into_values().collect();
        matches.sort_by(|a, b| {
            b.max_relevance
                .partial_cmp(&a.max_relevance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        Ok(matches)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            total_chunks: self.index.len()?,
        })
    }
}

/// Distances become clamped relevance scores; ranks are 1..N in score
/// order with an id tie-break for determinism.
fn rank(hits: Vec<IndexHit>) -> Vec<RetrievalHit> {
    let mut ranked: Vec<RetrievalHit> = hits
        .into_iter()
        .map(|hit| {
            let relevance = (1.0 - hit.distance).clamp(0.0, 1.0);
            let document_id = hit
                .metadata
                .get(META_DOCUMENT_ID)
                .cloned()
                .unwrap_or_default();
            RetrievalHit {
                chunk_id: hit.id,
                document_id,
                text: hit.text,
                relevance_score: relevance,
                rank: 0,
                metadata: hit.metadata,
            }
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    for (i, hit) in ranked.iter_mut().enumerate() {
        hit.rank = i + 1;
    }
    ranked
}
