//! Vector store abstraction shared by the pipeline and its backends.
//!
//! A store holds one collection of chunk records. Records carry string metadata; every record
//! written by the ingest flow has a `source` entry naming its document, which is what
//! delete-by-document and whole-document retrieval filter on.

pub mod memory;

use crate::qdrant::QdrantError;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub use memory::InMemoryVectorStore;

/// Metadata key naming the document a chunk belongs to.
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding a chunk's position within its document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// String key-value metadata attached to a chunk.
pub type Metadata = BTreeMap<String, String>;

/// Errors raised by vector store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Qdrant rejected or failed a request.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
    /// Vector length differs from the collection's dimension.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of vectors already in the collection.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
}

/// A chunk ready to be written to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    /// Chunk identifier, `{filename}_{index}` for ingested documents.
    pub id: String,
    /// Embedding of `document`.
    pub vector: Vec<f32>,
    /// Chunk text.
    pub document: String,
    /// Chunk metadata.
    pub metadata: Metadata,
}

/// A chunk read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    /// Chunk identifier.
    pub id: String,
    /// Chunk text.
    pub document: String,
    /// Chunk metadata.
    pub metadata: Metadata,
    /// Similarity to the query vector; `None` for unranked reads.
    pub score: Option<f32>,
}

impl RetrievedChunk {
    /// Position of the chunk within its document, when recorded.
    pub fn chunk_index(&self) -> Option<usize> {
        self.metadata
            .get(CHUNK_INDEX_KEY)
            .and_then(|value| value.parse().ok())
    }
}

/// Exact-match filter on a single metadata key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    /// Metadata key to compare.
    pub key: String,
    /// Required value.
    pub value: String,
}

impl MetadataFilter {
    /// Filter selecting every chunk of one document.
    pub fn source(filename: &str) -> Self {
        Self {
            key: SOURCE_KEY.to_string(),
            value: filename.to_string(),
        }
    }

    /// Whether the metadata satisfies this filter.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        metadata.get(&self.key) == Some(&self.value)
    }
}

/// Storage backend for chunk vectors with similarity search and metadata filtering.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert records, overwriting any existing record with the same id.
    async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<(), StoreError>;

    /// Remove every record matching the filter. Matching nothing is not an error.
    async fn delete(&self, filter: &MetadataFilter) -> Result<(), StoreError>;

    /// Return up to `k` records ordered by descending similarity to `vector`.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, StoreError>;

    /// Return every record matching the filter, in no particular order.
    async fn get(&self, filter: &MetadataFilter) -> Result<Vec<RetrievedChunk>, StoreError>;

    /// Distinct `source` values across the collection.
    async fn list_sources(&self) -> Result<BTreeSet<String>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_filter_matches_only_its_document() {
        let filter = MetadataFilter::source("cv.pdf");
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.into(), "cv.pdf".into());
        assert!(filter.matches(&metadata));

        metadata.insert(SOURCE_KEY.into(), "other.pdf".into());
        assert!(!filter.matches(&metadata));
        assert!(!filter.matches(&Metadata::new()));
    }

    #[test]
    fn chunk_index_parses_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert(CHUNK_INDEX_KEY.into(), "7".into());
        let chunk = RetrievedChunk {
            id: "cv.pdf_7".into(),
            document: "text".into(),
            metadata,
            score: None,
        };
        assert_eq!(chunk.chunk_index(), Some(7));
    }
}
