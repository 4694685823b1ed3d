//! Filter helpers for Qdrant requests and payload accumulation.

use std::collections::BTreeSet;

use serde_json::{Map, Value, json};

use crate::store::{MetadataFilter, SOURCE_KEY};

/// Compose an exact-match Qdrant filter for one metadata key.
pub fn build_match_filter(filter: &MetadataFilter) -> Value {
    json!({
        "must": [
            {
                "key": filter.key,
                "match": { "value": filter.value }
            }
        ]
    })
}

/// Accumulate document sources from Qdrant payloads.
pub fn accumulate_source(payload: &Map<String, Value>, sources: &mut BTreeSet<String>) {
    if let Some(Value::String(source)) = payload.get(SOURCE_KEY) {
        let trimmed = source.trim();
        if !trimmed.is_empty() {
            sources.insert(trimmed.to_string());
        }
    }
}
