//! Mapping between chunk records and Qdrant points.
//!
//! Metadata entries are stored as top-level string fields next to the reserved fields below, so
//! `source` can carry a keyword index and be matched directly in filters.

use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

use super::types::QdrantError;
use crate::store::{ChunkRecord, Metadata, RetrievedChunk};

pub(crate) const CHUNK_ID_FIELD: &str = "chunk_id";
pub(crate) const TEXT_FIELD: &str = "text";
pub(crate) const CHUNK_HASH_FIELD: &str = "chunk_hash";
pub(crate) const INGESTED_AT_FIELD: &str = "ingested_at";

const RESERVED_FIELDS: [&str; 4] = [CHUNK_ID_FIELD, TEXT_FIELD, CHUNK_HASH_FIELD, INGESTED_AT_FIELD];

/// Deterministic point id for a chunk id.
///
/// Qdrant only accepts unsigned integers or UUIDs as ids, so chunk ids are mapped through UUIDv5;
/// re-ingesting a chunk id always targets the same point.
pub fn point_id(chunk_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes())
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Serialize a record into the JSON point body accepted by the upsert endpoint.
pub(crate) fn build_point(record: &ChunkRecord, timestamp_rfc3339: &str) -> Value {
    let mut payload = Map::new();
    for (key, value) in &record.metadata {
        payload.insert(key.clone(), Value::String(value.clone()));
    }
    payload.insert(CHUNK_ID_FIELD.into(), Value::String(record.id.clone()));
    payload.insert(TEXT_FIELD.into(), Value::String(record.document.clone()));
    payload.insert(
        CHUNK_HASH_FIELD.into(),
        Value::String(compute_chunk_hash(&record.document)),
    );
    payload.insert(
        INGESTED_AT_FIELD.into(),
        Value::String(timestamp_rfc3339.to_string()),
    );

    json!({
        "id": point_id(&record.id).to_string(),
        "vector": record.vector,
        "payload": payload,
    })
}

/// Rebuild a retrieved chunk from a stored payload.
pub(crate) fn chunk_from_payload(
    point_id: String,
    payload: Map<String, Value>,
    score: Option<f32>,
) -> Result<RetrievedChunk, QdrantError> {
    let text = match payload.get(TEXT_FIELD) {
        Some(Value::String(text)) => text.clone(),
        _ => {
            return Err(QdrantError::MalformedPayload {
                point_id,
                field: TEXT_FIELD,
            });
        }
    };
    let id = match payload.get(CHUNK_ID_FIELD) {
        Some(Value::String(id)) => id.clone(),
        _ => point_id,
    };

    let metadata: Metadata = payload
        .into_iter()
        .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()))
        .filter_map(|(key, value)| match value {
            Value::String(text) => Some((key, text)),
            Value::Number(number) => Some((key, number.to_string())),
            Value::Bool(flag) => Some((key, flag.to_string())),
            _ => None,
        })
        .collect();

    Ok(RetrievedChunk {
        id,
        document: text,
        metadata,
        score,
    })
}
