use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use finmda_core::Result;

pub const META_DOCUMENT_ID: &str = "document_id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexItem {
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub id: String,
    pub text: String,
    pub metadata: HashMap<String, String>,
    /// Cosine distance; `relevance = 1 - distance`.
    pub distance: f32,
}

/// Metadata predicate for deletes and filtered queries. All listed pairs
/// must match; `document_id` is a shortcut for the canonical metadata key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexFilter {
    pub document_id: Option<String>,
    pub metadata: Vec<(String, String)>,
}

impl IndexFilter {
    pub fn document(id: impl Into<String>) -> Self {
        Self {
            document_id: Some(id.into()),
            metadata: Vec::new(),
        }
    }

    pub fn matches(&self, metadata: &HashMap<String, String>) -> bool {
        if let Some(doc) = &self.document_id {
            if metadata.get(META_DOCUMENT_ID) != Some(doc) {
                return false;
            }
        }
        self.metadata
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

/// Storage contract for chunk vectors. Upserts replace by id and are atomic
/// per batch; queries return ascending distance with an id tie-break and an
/// empty result (not an error) on an empty index.
pub trait VectorIndex: Send + Sync {
    fn upsert(&self, items: Vec<IndexItem>) -> Result<()>;
    fn delete(&self, filter: &IndexFilter) -> Result<usize>;
    fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&IndexFilter>,
    ) -> Result<Vec<IndexHit>>;
    fn len(&self) -> Result<usize>;
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut a_norm = 0.0f32;
    let mut b_norm = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    dot / (a_norm.sqrt() * b_norm.sqrt())
}

pub(crate) fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

pub(crate) fn sort_and_truncate(hits: &mut Vec<IndexHit>, top_k: usize) {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    if hits.len() > top_k {
        hits.truncate(top_k);
    }
}

/// Process-local backend. The whole map sits behind one RwLock, so a batch
/// upsert is atomic and concurrent readers never observe a torn record.
#[derive(Default)]
pub struct MemoryIndex {
    items: RwLock<BTreeMap<String, IndexItem>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for MemoryIndex {
    fn upsert(&self, items: Vec<IndexItem>) -> Result<()> {
        let mut guard = self.items.write();
        for item in items {
            guard.insert(item.id.clone(), item);
        }
        Ok(())
    }

    fn delete(&self, filter: &IndexFilter) -> Result<usize> {
        let mut guard = self.items.write();
        let before = guard.len();
        guard.retain(|_, item| !filter.matches(&item.metadata));
        Ok(before - guard.len())
    }

    fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&IndexFilter>,
    ) -> Result<Vec<IndexHit>> {
        let guard = self.items.read();
        let mut hits: Vec<IndexHit> = guard
            .values()
            .filter(|item| filter.map_or(true, |f| f.matches(&item.metadata)))
            .map(|item| IndexHit {
                id: item.id.clone(),
                text: item.text.clone(),
                metadata: item.metadata.clone(),
                distance: cosine_distance(vector, &item.embedding),
            })
            .collect();
        sort_and_truncate(&mut hits, top_k);
        Ok(hits)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.items.read().len())
    }
}
