//! Pipeline service coordinating extraction, chunking, embedding, retrieval, and generation.

use crate::{
    config::{Config, VectorStoreBackend},
    embedding::{EmbeddingClient, build_embedding_client},
    extraction::extract_pdf,
    generation::{GenerationClient, GenerationRequest, build_generation_client},
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::{ChunkingOptions, chunk_text},
        context::assemble_context,
        locks::KeyedLocks,
        prompts::{NOT_FOUND_ANSWER, build_query_prompt, build_summary_prompt},
        types::{IngestOutcome, PipelineError, QueryOutcome, SummaryOutcome},
    },
    qdrant::QdrantStore,
    store::{
        CHUNK_INDEX_KEY, ChunkRecord, InMemoryVectorStore, Metadata, MetadataFilter,
        RetrievedChunk, SOURCE_KEY, StoreError, VectorStore,
    },
};
use async_trait::async_trait;
use std::sync::Arc;

/// Tunables for the three flows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Chunk sizing used at ingest.
    pub chunking: ChunkingOptions,
    /// Number of chunks retrieved per query.
    pub top_k: usize,
    /// Generation budget for query answers.
    pub query_max_new_tokens: usize,
    /// Generation budget for summaries.
    pub summary_max_new_tokens: usize,
    /// Expected embedding length; `None` skips the check.
    pub embedding_dimension: Option<usize>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunking: ChunkingOptions::default(),
            top_k: 3,
            query_max_new_tokens: 50,
            summary_max_new_tokens: 150,
            embedding_dimension: None,
        }
    }
}

impl PipelineSettings {
    /// Derive settings from runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunking: config.chunking_options(),
            top_k: config.query_top_k,
            query_max_new_tokens: config.query_max_new_tokens,
            summary_max_new_tokens: config.summary_max_new_tokens,
            embedding_dimension: Some(config.embedding_dimension),
        }
    }
}

/// Application context owning the model clients and the vector store.
///
/// Construct it once at startup and share it through an `Arc`; every HTTP handler works
/// against the same instance.
pub struct RagService {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn GenerationClient>,
    settings: PipelineSettings,
    metrics: Arc<PipelineMetrics>,
    ingest_locks: KeyedLocks,
}

/// Abstraction over the pipeline used by the HTTP surface.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Extract, chunk, embed, and store a PDF, replacing earlier chunks for the filename.
    async fn ingest_pdf(&self, filename: &str, bytes: Vec<u8>)
    -> Result<IngestOutcome, PipelineError>;

    /// Answer a question from the most similar stored chunks.
    async fn query(&self, query_text: &str) -> Result<QueryOutcome, PipelineError>;

    /// Summarize every stored chunk of one document.
    async fn summarize(&self, filename: &str) -> Result<SummaryOutcome, PipelineError>;

    /// Filenames with at least one stored chunk.
    async fn list_documents(&self) -> Result<Vec<String>, PipelineError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl RagService {
    /// Build the service from configuration, connecting to the configured backends.
    pub async fn from_config(config: &Config) -> Result<Self, PipelineError> {
        tracing::info!("Initializing embedding client");
        let embedder = build_embedding_client(config)?;
        let generator = build_generation_client(config)?;

        let store: Arc<dyn VectorStore> = match config.vector_store {
            VectorStoreBackend::Memory => {
                tracing::info!("Using in-memory vector store");
                Arc::new(InMemoryVectorStore::new())
            }
            VectorStoreBackend::Qdrant => {
                let qdrant = QdrantStore::new(
                    &config.qdrant_url,
                    config.qdrant_api_key.clone(),
                    &config.qdrant_collection_name,
                )
                .map_err(StoreError::from)?;
                tracing::debug!(
                    collection = %config.qdrant_collection_name,
                    vector_size = config.embedding_dimension,
                    "Ensuring primary collection"
                );
                qdrant
                    .ensure_collection(config.embedding_dimension)
                    .await
                    .map_err(StoreError::from)?;
                tracing::info!(collection = %config.qdrant_collection_name, "Qdrant collection ready");
                Arc::new(qdrant)
            }
        };

        Ok(Self::with_components(
            embedder,
            store,
            generator,
            PipelineSettings::from_config(config),
        ))
    }

    /// Assemble a service from already constructed components.
    pub fn with_components(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn GenerationClient>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            settings,
            metrics: Arc::new(PipelineMetrics::new()),
            ingest_locks: KeyedLocks::new(),
        }
    }

    /// Settings the service was built with.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Chunk, embed, and store already extracted text under `filename`.
    pub async fn ingest_text(
        &self,
        filename: &str,
        text: &str,
    ) -> Result<IngestOutcome, PipelineError> {
        let filename = require_non_blank(filename, "filename")?;
        let _guard = self.ingest_locks.acquire(filename).await;
        self.index_document(filename, text).await
    }

    async fn ingest_pdf_inner(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, PipelineError> {
        let filename = require_non_blank(filename, "filename")?;
        tracing::info!(filename, bytes = bytes.len(), "Processing upload");
        let _guard = self.ingest_locks.acquire(filename).await;

        let document = extract_pdf(bytes).await?;
        tracing::debug!(filename, pages = document.page_count(), "Text extracted");
        self.index_document(filename, &document.text()).await
    }

    async fn index_document(
        &self,
        filename: &str,
        text: &str,
    ) -> Result<IngestOutcome, PipelineError> {
        let chunks = chunk_text(text, &self.settings.chunking)?;
        if chunks.is_empty() {
            return Err(PipelineError::EmptyDocument);
        }
        tracing::debug!(filename, chunks = chunks.len(), "Document chunked");

        let vectors = self.embedder.generate_embeddings(chunks.clone()).await?;
        if vectors.len() != chunks.len() {
            return Err(PipelineError::EmbeddingCountMismatch {
                expected: chunks.len(),
                actual: vectors.len(),
            });
        }
        for vector in &vectors {
            self.check_dimension(vector)?;
        }
        tracing::debug!(filename, vectors = vectors.len(), "Chunks embedded");

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (document, vector))| {
                let mut metadata = Metadata::new();
                metadata.insert(SOURCE_KEY.to_string(), filename.to_string());
                metadata.insert(CHUNK_INDEX_KEY.to_string(), index.to_string());
                ChunkRecord {
                    id: format!("{filename}_{index}"),
                    vector,
                    document,
                    metadata,
                }
            })
            .collect();
        let chunk_count = records.len();

        self.store.delete(&MetadataFilter::source(filename)).await?;
        tracing::debug!(filename, "Previous chunks removed");
        self.store.upsert(records).await?;

        self.metrics.record_document(chunk_count as u64);
        tracing::info!(filename, chunks = chunk_count, "Document indexed");

        Ok(IngestOutcome {
            filename: filename.to_string(),
            chunk_count,
            vectors_stored: chunk_count,
        })
    }

    async fn query_inner(&self, query_text: &str) -> Result<QueryOutcome, PipelineError> {
        let question = require_non_blank(query_text, "query_text")?.trim();
        tracing::info!(query = question, "Processing query");

        let vector = self
            .embedder
            .generate_embedding(question.to_string())
            .await?;
        self.check_dimension(&vector)?;

        let hits = self.store.query(&vector, self.settings.top_k).await?;
        tracing::debug!(hits = hits.len(), top_k = self.settings.top_k, "Chunks retrieved");
        let relevant_chunks: Vec<String> = hits.into_iter().map(|hit| hit.document).collect();

        let Some(context) = assemble_context(&relevant_chunks) else {
            self.metrics.record_query(false);
            tracing::info!(query = question, hits = relevant_chunks.len(), "No context found for query");
            return Ok(QueryOutcome {
                query: query_text.to_string(),
                answer: NOT_FOUND_ANSWER.to_string(),
                relevant_chunks: Vec::new(),
            });
        };

        let answer = self
            .generator
            .generate(GenerationRequest {
                prompt: build_query_prompt(&context, question),
                max_new_tokens: self.settings.query_max_new_tokens,
            })
            .await?;

        self.metrics.record_query(true);
        tracing::info!(
            query = question,
            chunks = relevant_chunks.len(),
            answer_chars = answer.chars().count(),
            "Query answered"
        );

        Ok(QueryOutcome {
            query: query_text.to_string(),
            answer,
            relevant_chunks,
        })
    }

    async fn summarize_inner(&self, filename: &str) -> Result<SummaryOutcome, PipelineError> {
        let filename = require_non_blank(filename, "filename")?;
        tracing::info!(filename, "Processing summarization");

        let mut chunks = self.store.get(&MetadataFilter::source(filename)).await?;
        sort_by_position(&mut chunks);
        let texts: Vec<String> = chunks.into_iter().map(|chunk| chunk.document).collect();
        tracing::debug!(filename, chunks = texts.len(), "Document chunks loaded");

        let Some(context) = assemble_context(&texts) else {
            tracing::info!(filename, "Document not found for summarization");
            return Ok(SummaryOutcome::NotFound {
                filename: filename.to_string(),
            });
        };

        let summary = self
            .generator
            .generate(GenerationRequest {
                prompt: build_summary_prompt(&context),
                max_new_tokens: self.settings.summary_max_new_tokens,
            })
            .await?;

        self.metrics.record_summary();
        tracing::info!(filename, summary_chars = summary.chars().count(), "Document summarized");

        Ok(SummaryOutcome::Summarized {
            filename: filename.to_string(),
            summary,
        })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), PipelineError> {
        match self.settings.embedding_dimension {
            Some(expected) if expected != vector.len() => Err(PipelineError::DimensionMismatch {
                expected,
                actual: vector.len(),
            }),
            _ => Ok(()),
        }
    }

    fn record_failure(&self, operation: &'static str, error: &PipelineError) {
        self.metrics.record_failure();
        tracing::warn!(operation, kind = ?error.kind(), error = %error, "Request failed");
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest_pdf(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, PipelineError> {
        self.ingest_pdf_inner(filename, bytes)
            .await
            .inspect_err(|error| self.record_failure("ingest", error))
    }

    async fn query(&self, query_text: &str) -> Result<QueryOutcome, PipelineError> {
        self.query_inner(query_text)
            .await
            .inspect_err(|error| self.record_failure("query", error))
    }

    async fn summarize(&self, filename: &str) -> Result<SummaryOutcome, PipelineError> {
        self.summarize_inner(filename)
            .await
            .inspect_err(|error| self.record_failure("summarize", error))
    }

    async fn list_documents(&self) -> Result<Vec<String>, PipelineError> {
        let sources = self
            .store
            .list_sources()
            .await
            .map_err(PipelineError::from)
            .inspect_err(|error| self.record_failure("list_documents", error))?;
        Ok(sources.into_iter().collect())
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Reject blank input; the value itself is returned untouched.
fn require_non_blank<'a>(value: &'a str, field: &str) -> Result<&'a str, PipelineError> {
    if value.trim().is_empty() {
        return Err(PipelineError::InvalidRequest(format!("{field} must not be empty")));
    }
    Ok(value)
}

/// Restore document order; chunks without a recorded position go last, by id.
fn sort_by_position(chunks: &mut [RetrievedChunk]) {
    chunks.sort_by(|a, b| {
        let key_a = (a.chunk_index().is_none(), a.chunk_index(), &a.id);
        let key_b = (b.chunk_index().is_none(), b.chunk_index(), &b.id);
        key_a.cmp(&key_b)
    });
}
