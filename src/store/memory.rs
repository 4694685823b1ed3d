//! In-memory vector store using cosine similarity.
//!
//! Records live in a `BTreeMap` keyed by chunk id behind a `tokio::sync::RwLock`. Contents
//! are lost when the process exits; use it for development, tests, and single-run demos.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ChunkRecord, MetadataFilter, RetrievedChunk, SOURCE_KEY, StoreError, VectorStore};

/// An in-memory vector store ranking by cosine similarity.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    records: RwLock<BTreeMap<String, ChunkRecord>>,
}

impl InMemoryVectorStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently stored.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn retrieved(record: &ChunkRecord, score: Option<f32>) -> RetrievedChunk {
    RetrievedChunk {
        id: record.id.clone(),
        document: record.document.clone(),
        metadata: record.metadata.clone(),
        score,
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<(), StoreError> {
        let mut store = self.records.write().await;
        let mut expected = store.values().next().map(|record| record.vector.len());
        for record in &records {
            let actual = record.vector.len();
            match expected {
                Some(expected) if expected != actual => {
                    return Err(StoreError::DimensionMismatch { expected, actual });
                }
                _ => expected = Some(actual),
            }
        }

        let count = records.len();
        for record in records {
            store.insert(record.id.clone(), record);
        }
        tracing::debug!(records = count, total = store.len(), "Upserted records in memory");
        Ok(())
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<(), StoreError> {
        let mut store = self.records.write().await;
        let before = store.len();
        store.retain(|_, record| !filter.matches(&record.metadata));
        tracing::debug!(
            key = %filter.key,
            value = %filter.value,
            removed = before - store.len(),
            "Deleted records from memory"
        );
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, StoreError> {
        let store = self.records.read().await;
        if let Some(record) = store.values().next()
            && record.vector.len() != vector.len()
        {
            return Err(StoreError::DimensionMismatch {
                expected: record.vector.len(),
                actual: vector.len(),
            });
        }

        let mut scored: Vec<RetrievedChunk> = store
            .values()
            .map(|record| retrieved(record, Some(cosine_similarity(&record.vector, vector))))
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn get(&self, filter: &MetadataFilter) -> Result<Vec<RetrievedChunk>, StoreError> {
        let store = self.records.read().await;
        Ok(store
            .values()
            .filter(|record| filter.matches(&record.metadata))
            .map(|record| retrieved(record, None))
            .collect())
    }

    async fn list_sources(&self) -> Result<BTreeSet<String>, StoreError> {
        let store = self.records.read().await;
        Ok(store
            .values()
            .filter_map(|record| record.metadata.get(SOURCE_KEY).cloned())
            .collect())
    }
}
