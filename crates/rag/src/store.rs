use bytemuck::{cast_slice, try_cast_slice};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use finmda_core::{FinError, Result};

use crate::index::{
    cosine_distance, sort_and_truncate, IndexFilter, IndexHit, IndexItem, VectorIndex,
    META_DOCUMENT_ID,
};

/// On-disk backend. One row per chunk, embeddings as little-endian f32
/// blobs, metadata as a JSON column. A fresh connection per operation keeps
/// the handle `Send + Sync`-free of shared statement state.
#[derive(Clone)]
pub struct SqliteIndex {
    path: PathBuf,
}

impl SqliteIndex {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let index = Self {
            path: path.as_ref().to_path_buf(),
        };
        index.init()?;
        Ok(index)
    }

    fn connection(&self) -> Result<Connection> {
        Connection::open(&self.path).map_err(db_unavailable)
    }

    fn init(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
            "#,
        )
        .map_err(db_unavailable)?;
        Ok(())
    }
}

impl VectorIndex for SqliteIndex {
    fn upsert(&self, items: Vec<IndexItem>) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn.transaction().map_err(db_unavailable)?;
        for item in &items {
            let document_id = item
                .metadata
                .get(META_DOCUMENT_ID)
                .cloned()
                .unwrap_or_default();
            let metadata = serde_json::to_string(&item.metadata)?;
            let embedding_blob = cast_slice::<f32, u8>(&item.embedding);
            tx.execute(
                "INSERT INTO chunks (chunk_id, document_id, text, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(chunk_id) DO UPDATE SET
                     document_id = excluded.document_id,
                     text = excluded.text,
                     metadata = excluded.metadata,
                     embedding = excluded.embedding",
                params![item.id, document_id, item.text, metadata, embedding_blob],
            )
            .map_err(db_unavailable)?;
        }
        tx.commit().map_err(db_unavailable)?;
        Ok(())
    }

    fn delete(&self, filter: &IndexFilter) -> Result<usize> {
        let mut conn = self.connection()?;
        if filter.metadata.is_empty() {
            if let Some(document_id) = &filter.document_id {
                let deleted = conn
                    .execute("DELETE FROM chunks WHERE document_id = ?1", [document_id])
                    .map_err(db_unavailable)?;
                return Ok(deleted);
            }
        }
        // Generic metadata predicates are evaluated in process.
        let ids: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT chunk_id, metadata FROM chunks")
                .map_err(db_unavailable)?;
            let mut rows = stmt.query([]).map_err(db_unavailable)?;
            let mut matched = Vec::new();
            while let Some(row) = rows.next().map_err(db_unavailable)? {
                let id: String = row.get(0).map_err(db_unavailable)?;
                let metadata: String = row.get(1).map_err(db_unavailable)?;
                let metadata: HashMap<String, String> = serde_json::from_str(&metadata)?;
                if filter.matches(&metadata) {
                    matched.push(id);
                }
            }
            matched
        };
        let tx = conn.transaction().map_err(db_unavailable)?;
        for id in &ids {
            tx.execute("DELETE FROM chunks WHERE chunk_id = ?1", [id])
                .map_err(db_unavailable)?;
        }
        tx.commit().map_err(db_unavailable)?;
        Ok(ids.len())
    }

    fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&IndexFilter>,
    ) -> Result<Vec<IndexHit>> {
        let conn = self.connection()?;
        let (sql, doc_param) = match filter.and_then(|f| f.document_id.as_ref()) {
            Some(doc) => (
                "SELECT chunk_id, text, metadata, embedding FROM chunks WHERE document_id = ?1",
                Some(doc.clone()),
            ),
            None => (
                "SELECT chunk_id, text, metadata, embedding FROM chunks",
                None,
            ),
        };
        let mut stmt = conn.prepare(sql).map_err(db_unavailable)?;
        let mut rows = match &doc_param {
            Some(doc) => stmt.query([doc]).map_err(db_unavailable)?,
            None => stmt.query([]).map_err(db_unavailable)?,
        };
        let mut hits = Vec::new();
        while let Some(row) = rows.next().map_err(db_unavailable)? {
            let id: String = row.get(0).map_err(db_unavailable)?;
            let text: String = row.get(1).map_err(db_unavailable)?;
            let metadata: String = row.get(2).map_err(db_unavailable)?;
            let metadata: HashMap<String, String> = serde_json::from_str(&metadata)?;
            if let Some(f) = filter {
                if !f.matches(&metadata) {
                    continue;
                }
            }
            let blob: Vec<u8> = row.get(3).map_err(db_unavailable)?;
            let embedding: &[f32] = try_cast_slice(&blob)
                .map_err(|_| FinError::IndexUnavailable(format!("corrupt embedding for {id}")))?;
            hits.push(IndexHit {
                distance: cosine_distance(vector, embedding),
                id,
                text,
                metadata,
            });
        }
        sort_and_truncate(&mut hits, top_k);
        Ok(hits)
    }

    fn len(&self) -> Result<usize> {
        let conn = self.connection()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(db_unavailable)?;
        Ok(count as usize)
    }
}

fn db_unavailable(err: rusqlite::Error) -> FinError {
    FinError::IndexUnavailable(err.to_string())
}
