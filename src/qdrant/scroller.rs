//! Streaming helpers for iterating Qdrant scroll endpoints without manual loops.

use async_stream::try_stream;
use futures_core::Stream;
use reqwest::Method;
use serde_json::{Map, Value, json};

use super::client::{QdrantStore, stringify_point_id};
use super::types::{QdrantError, ScrollResponse};

const DEFAULT_SCROLL_LIMIT: usize = 512;

/// Stream payloads of the store's collection along with their point identifiers.
///
/// Pages are fetched lazily until Qdrant stops returning a `next_page_offset`.
pub fn stream_points<'a>(
    store: &'a QdrantStore,
    with_payload: Value,
    filter: Option<Value>,
) -> impl Stream<Item = Result<(String, Map<String, Value>), QdrantError>> + 'a {
    try_stream! {
        let mut offset = Value::Null;
        let filter_body = filter.unwrap_or_else(|| json!({ "must": [] }));
        let path = format!("collections/{}/points/scroll", store.collection);

        loop {
            let body = json!({
                "with_payload": with_payload.clone(),
                "with_vector": false,
                "limit": DEFAULT_SCROLL_LIMIT,
                "filter": filter_body.clone(),
                "offset": offset,
            });

            let response = store.request(Method::POST, &path).json(&body).send().await?;

            let status = response.status();
            if status.is_success() {
                let ScrollResponse { result } = response.json().await?;
                for point in result.points {
                    if let (Some(id), Some(payload)) = (point.id, point.payload) {
                        yield (stringify_point_id(id), payload);
                    }
                }

                match result.next_page_offset {
                    Some(next) if !next.is_null() => offset = next,
                    _ => break,
                }
            } else {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(collection = %store.collection, status = %status, "Failed to scroll points via stream");
                Err(QdrantError::UnexpectedStatus { status, body })?;
            }
        }
    }
}
