//! HTTP client wrapper for storing document chunks in Qdrant.

use std::collections::BTreeSet;

use async_trait::async_trait;
use futures_util::{pin_mut, stream::StreamExt};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};

use crate::qdrant::{
    filters::{accumulate_source, build_match_filter},
    payload::{build_point, chunk_from_payload, current_timestamp_rfc3339},
    scroller::stream_points,
    types::{QdrantError, QueryResponse},
};
use crate::store::{
    ChunkRecord, MetadataFilter, RetrievedChunk, SOURCE_KEY, StoreError, VectorStore,
};

/// Vector store backed by a single Qdrant collection.
pub struct QdrantStore {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) collection: String,
}

impl QdrantStore {
    /// Construct a client for `collection` on the Qdrant instance at `url`.
    pub fn new(url: &str, api_key: Option<String>, collection: &str) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("ragdesk/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            collection,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
            collection: collection.to_string(),
        })
    }

    /// Name of the backing collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection when missing and make sure `source` is indexed for filtering.
    pub async fn ensure_collection(&self, vector_size: usize) -> Result<(), QdrantError> {
        match self.collection_info().await? {
            None => self.create_collection(vector_size).await?,
            Some(info) => {
                // Named-vector collections report no single size.
                let existing = info
                    .pointer("/result/config/params/vectors/size")
                    .and_then(Value::as_u64);
                if let Some(existing) = existing
                    && existing as usize != vector_size
                {
                    tracing::warn!(
                        collection = %self.collection,
                        existing,
                        configured = vector_size,
                        "Collection vector size differs from configured embedding dimension"
                    );
                }
            }
        }
        self.ensure_source_index().await
    }

    async fn create_collection(&self, vector_size: usize) -> Result<(), QdrantError> {
        tracing::debug!(collection = %self.collection, vector_size, "Creating collection");
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{}", self.collection))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::info!(collection = %self.collection, "Collection created");
        })
        .await
    }

    /// Collection description, or `None` when it does not exist.
    async fn collection_info(&self) -> Result<Option<Value>, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    async fn ensure_source_index(&self) -> Result<(), QdrantError> {
        let body = json!({
            "field_name": SOURCE_KEY,
            "field_schema": "keyword",
        });

        let response = self
            .request(Method::PUT, &format!("collections/{}/index", self.collection))
            .query(&[("wait", true)])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            tracing::debug!(collection = %self.collection, field = SOURCE_KEY, "Payload index ensured");
        } else {
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::warn!(collection = %self.collection, error = %error, "Failed to ensure payload index");
        }
        Ok(())
    }

    async fn upsert_points(&self, records: &[ChunkRecord]) -> Result<(), QdrantError> {
        if records.is_empty() {
            return Ok(());
        }

        let now = current_timestamp_rfc3339();
        let points: Vec<Value> = records
            .iter()
            .map(|record| build_point(record, &now))
            .collect();

        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/points", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = %self.collection,
                points = records.len(),
                "Points upserted"
            );
        })
        .await
    }

    async fn delete_points(&self, filter: &MetadataFilter) -> Result<(), QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "filter": build_match_filter(filter) }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = %self.collection,
                key = %filter.key,
                value = %filter.value,
                "Points deleted by filter"
            );
        })
        .await
    }

    async fn query_points(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, QdrantError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        payload
            .result
            .into_points()
            .into_iter()
            .map(|point| {
                chunk_from_payload(
                    stringify_point_id(point.id),
                    point.payload.unwrap_or_default(),
                    Some(point.score),
                )
            })
            .collect()
    }

    async fn scroll_all(
        &self,
        with_payload: Value,
        filter: Option<Value>,
    ) -> Result<Vec<(String, Map<String, Value>)>, QdrantError> {
        let stream = stream_points(self, with_payload, filter);
        pin_mut!(stream);
        let mut points = Vec::new();
        while let Some(point) = stream.next().await {
            points.push(point?);
        }
        Ok(points)
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<(), StoreError> {
        Ok(self.upsert_points(&records).await?)
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<(), StoreError> {
        Ok(self.delete_points(filter).await?)
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, StoreError> {
        Ok(self.query_points(vector, k).await?)
    }

    async fn get(&self, filter: &MetadataFilter) -> Result<Vec<RetrievedChunk>, StoreError> {
        let points = self
            .scroll_all(json!(true), Some(build_match_filter(filter)))
            .await?;
        let chunks = points
            .into_iter()
            .map(|(id, payload)| chunk_from_payload(id, payload, None))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chunks)
    }

    async fn list_sources(&self) -> Result<BTreeSet<String>, StoreError> {
        let points = self.scroll_all(json!([SOURCE_KEY]), None).await?;
        let mut sources = BTreeSet::new();
        for (_, payload) in &points {
            accumulate_source(payload, &mut sources);
        }
        Ok(sources)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

pub(crate) fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qdrant::payload::point_id;
    use crate::store::{CHUNK_INDEX_KEY, Metadata};
    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };

    fn store(server: &MockServer) -> QdrantStore {
        QdrantStore::new(&server.base_url(), None, "documents").expect("store")
    }

    fn record(index: usize) -> ChunkRecord {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.into(), "cv.pdf".into());
        metadata.insert(CHUNK_INDEX_KEY.into(), index.to_string());
        ChunkRecord {
            id: format!("cv.pdf_{index}"),
            vector: vec![0.1, 0.2],
            document: format!("chunk {index}"),
            metadata,
        }
    }

    #[tokio::test]
    async fn ensure_collection_creates_missing_collection_and_index() {
        let server = MockServer::start_async().await;
        let exists = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/documents");
                then.status(404).body("not found");
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/documents")
                    .json_body(json!({ "vectors": { "size": 384, "distance": "Cosine" } }));
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let index = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/documents/index")
                    .body_contains("\"field_name\":\"source\"");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        store(&server).ensure_collection(384).await.expect("ensure");

        exists.assert();
        create.assert();
        index.assert();
    }

    #[tokio::test]
    async fn ensure_collection_keeps_existing_collection() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/documents");
                then.status(200).json_body(json!({
                    "result": { "config": { "params": { "vectors": { "size": 384, "distance": "Cosine" } } } }
                }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/documents");
                then.status(200);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/documents/index");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        store(&server).ensure_collection(384).await.expect("ensure");
        create.assert_hits(0);
    }

    #[tokio::test]
    async fn upsert_sends_deterministic_point_ids() {
        let server = MockServer::start_async().await;
        let expected_id = point_id("cv.pdf_0").to_string();
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/documents/points")
                    .query_param("wait", "true")
                    .body_contains(expected_id.as_str())
                    .body_contains("\"chunk_id\":\"cv.pdf_0\"");
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        store(&server)
            .upsert(vec![record(0)])
            .await
            .expect("upsert");
        mock.assert();
    }

    #[tokio::test]
    async fn upsert_of_nothing_skips_the_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/documents/points");
                then.status(200);
            })
            .await;

        store(&server).upsert(Vec::new()).await.expect("upsert");
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn delete_filters_by_source() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/documents/points/delete")
                    .query_param("wait", "true")
                    .json_body(json!({
                        "filter": { "must": [ { "key": "source", "match": { "value": "cv.pdf" } } ] }
                    }));
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        store(&server)
            .delete(&MetadataFilter::source("cv.pdf"))
            .await
            .expect("delete");
        mock.assert();
    }

    #[tokio::test]
    async fn delete_failure_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/documents/points/delete");
                then.status(503).body("unavailable");
            })
            .await;

        let error = store(&server)
            .delete(&MetadataFilter::source("cv.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            StoreError::Qdrant(QdrantError::UnexpectedStatus { .. })
        ));
    }

    #[tokio::test]
    async fn query_maps_scored_points() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/documents/points/query")
                    .body_contains("\"limit\":3");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": {
                        "points": [
                            {
                                "id": "5c56c793-69f3-4fbf-87e6-c4bf54c28c26",
                                "score": 0.42,
                                "payload": {
                                    "chunk_id": "cv.pdf_0",
                                    "text": "Alice has 5 years of experience.",
                                    "source": "cv.pdf",
                                    "chunk_index": "0",
                                    "chunk_hash": "abc",
                                    "ingested_at": "2025-01-01T00:00:00Z"
                                }
                            }
                        ]
                    }
                }));
            })
            .await;

        let hits = store(&server).query(&[0.1, 0.2], 3).await.expect("query");
        mock.assert();

        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.id, "cv.pdf_0");
        assert_eq!(hit.document, "Alice has 5 years of experience.");
        assert_eq!(hit.chunk_index(), Some(0));
        assert_eq!(hit.metadata.get("source").map(String::as_str), Some("cv.pdf"));
        assert!(!hit.metadata.contains_key("chunk_hash"));
        assert!((hit.score.expect("score") - 0.42).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn get_and_list_sources_scroll_the_collection() {
        let server = MockServer::start_async().await;
        let filtered = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/documents/points/scroll")
                    .body_contains("\"value\":\"cv.pdf\"");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [
                            { "id": "p1", "payload": { "chunk_id": "cv.pdf_1", "text": "second", "source": "cv.pdf", "chunk_index": "1" } },
                            { "id": "p0", "payload": { "chunk_id": "cv.pdf_0", "text": "first", "source": "cv.pdf", "chunk_index": "0" } }
                        ],
                        "next_page_offset": null
                    }
                }));
            })
            .await;

        let chunks = store(&server)
            .get(&MetadataFilter::source("cv.pdf"))
            .await
            .expect("get");
        filtered.assert();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|chunk| chunk.score.is_none()));

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/documents/points/scroll");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [
                            { "id": "p0", "payload": { "source": "cv.pdf" } },
                            { "id": "p1", "payload": { "source": "cv.pdf" } },
                            { "id": "p2", "payload": { "source": "notes.pdf" } }
                        ],
                        "next_page_offset": null
                    }
                }));
            })
            .await;
        let sources = store(&server).list_sources().await.expect("sources");
        assert_eq!(
            sources.into_iter().collect::<Vec<_>>(),
            vec!["cv.pdf".to_string(), "notes.pdf".to_string()]
        );
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(
            normalize_base_url("http://localhost:6333/").expect("url"),
            "http://localhost:6333/"
        );
        assert!(normalize_base_url("not a url").is_err());
        assert_eq!(
            format_endpoint("http://localhost:6333/", "/collections/documents"),
            "http://localhost:6333/collections/documents"
        );
    }
}
