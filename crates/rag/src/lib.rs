pub mod embedding;
pub mod evidence;
pub mod index;
pub mod retriever;
pub mod store;

pub use embedding::{Embedder, EmbeddingBackend, EmbeddingClient, OpenAiEmbeddingClient};
pub use evidence::{snippet, Citation, EvidenceBuilder, EvidenceBundle, Footnote, SNIPPET_MAX_CHARS};
pub use index::{IndexFilter, IndexHit, IndexItem, MemoryIndex, VectorIndex, META_DOCUMENT_ID};
pub use retriever::{
    ChunkMatch, DocumentMatch, IndexStats, RetrievalHit, Retriever, RetrieverConfig,
    META_CHUNK_INDEX, META_CHUNK_LENGTH, META_COMPANY, META_PERIOD,
};
pub use store::SqliteIndex;
