//! Core data types and error definitions for the processing pipeline.

use crate::{
    embedding::EmbeddingClientError, extraction::ExtractionError,
    generation::GenerationClientError, store::StoreError,
};
use anyhow::Error as TokenizerError;
use serde::Serialize;
use thiserror::Error;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible chunk budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap would leave no room for new content in each chunk.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    InvalidOverlap {
        /// Configured overlap.
        overlap: usize,
        /// Configured chunk size.
        chunk_size: usize,
    },
    /// Tokenizer resources were unavailable for token-based lengths.
    #[error("failed to initialize tokenizer '{encoding}': {source}")]
    Tokenizer {
        /// Encoding we attempted to load.
        encoding: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Coarse failure category reported alongside error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Uploaded document could not be read.
    Extraction,
    /// Chunking configuration or tokenizer failure.
    Chunking,
    /// Embedding provider failure.
    Embedding,
    /// Generation provider failure.
    Generation,
    /// Vector store operation failure.
    Store,
    /// Document contained no text to index.
    EmptyDocument,
    /// Request was rejected before any work started.
    InvalidRequest,
}

/// Errors emitted by the ingest, query, and summarize flows.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Text extraction failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Generation provider failed to produce text.
    #[error(transparent)]
    Generation(#[from] GenerationClientError),
    /// Vector store rejected an operation.
    #[error("Vector store request failed: {0}")]
    Store(#[from] StoreError),
    /// Document yielded no chunks.
    #[error("document contains no extractable text")]
    EmptyDocument,
    /// Embedding count did not match the number of chunks.
    #[error("Embedding provider returned {actual} vectors for {expected} chunks")]
    EmbeddingCountMismatch {
        /// Number of chunks submitted.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// Query embedding dimension does not match configuration.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured embedding dimension.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
    /// Request input was unusable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl PipelineError {
    /// Category used in error payloads.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Extraction(_) => ErrorKind::Extraction,
            Self::Chunking(_) => ErrorKind::Chunking,
            Self::Embedding(_)
            | Self::EmbeddingCountMismatch { .. }
            | Self::DimensionMismatch { .. } => ErrorKind::Embedding,
            Self::Generation(_) => ErrorKind::Generation,
            Self::Store(_) => ErrorKind::Store,
            Self::EmptyDocument => ErrorKind::EmptyDocument,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

/// Result of a completed ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Filename used as the document's `source`.
    pub filename: String,
    /// Number of chunks produced from the document.
    pub chunk_count: usize,
    /// Number of vectors written to the store.
    pub vectors_stored: usize,
}

/// Result of a completed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutcome {
    /// Query text as received.
    pub query: String,
    /// Generated answer, or the fallback phrase when nothing was retrieved.
    pub answer: String,
    /// Retrieved chunk texts in rank order.
    pub relevant_chunks: Vec<String>,
}

/// Result of a summarize request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// Summary generated from the document's chunks.
    Summarized {
        /// Summarized document.
        filename: String,
        /// Generated summary.
        summary: String,
    },
    /// No chunks are stored for the requested filename.
    NotFound {
        /// Requested filename.
        filename: String,
    },
}
