//! HTTP surface for Ragdesk.
//!
//! This module exposes a compact Axum router:
//!
//! - `GET /` – Liveness message.
//! - `POST /upload` – Multipart PDF upload (field `file`); extracts, chunks, embeds, and stores
//!   the document, replacing any chunks previously stored under the same filename.
//! - `POST /query` – Answer `query_text` from the most similar stored chunks.
//! - `POST /summarize` – Summarize every stored chunk of `filename`.
//! - `GET /documents` – Filenames currently stored.
//! - `GET /metrics` – Pipeline counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Flow failures are reported with HTTP 200 and `"status": "error"` so clients can branch on the
//! `status` field alone; the payload also carries the failure `kind` and a message.

use crate::metrics::MetricsSnapshot;
use crate::processing::{
    ErrorKind, PipelineError, RagApi, SummaryOutcome, prompts::DOCUMENT_NOT_FOUND,
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, rejection::JsonRejection},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const UPLOAD_FIELD: &str = "file";

/// Build the HTTP router exposing the pipeline.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: RagApi + 'static,
{
    Router::new()
        .route("/", get(root))
        .route("/upload", post(upload_document::<S>))
        .route("/query", post(query_documents::<S>))
        .route("/summarize", post(summarize_document::<S>))
        .route("/documents", get(list_documents::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

/// Response body for `GET /`.
#[derive(Serialize)]
struct RootResponse {
    status: &'static str,
    message: &'static str,
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "success",
        message: "Backend server is running!",
    })
}

/// Response body for `POST /upload`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum UploadResponse {
    Success {
        filename: String,
        chunk_count: usize,
        vectors_stored: usize,
    },
    Error {
        filename: String,
        kind: ErrorKind,
        message: String,
    },
}

impl UploadResponse {
    fn failed(filename: String, error: &PipelineError) -> Self {
        Self::Error {
            filename,
            kind: error.kind(),
            message: format!("Could not process PDF file. Error: {error}"),
        }
    }
}

/// Ingest a PDF uploaded as multipart field `file`.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    multipart: Multipart,
) -> Json<UploadResponse>
where
    S: RagApi,
{
    let (filename, bytes) = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err((filename, error)) => {
            tracing::warn!(filename, error = %error, "Rejected upload");
            return Json(UploadResponse::failed(filename, &error));
        }
    };

    match service.ingest_pdf(&filename, bytes).await {
        Ok(outcome) => Json(UploadResponse::Success {
            filename: outcome.filename,
            chunk_count: outcome.chunk_count,
            vectors_stored: outcome.vectors_stored,
        }),
        Err(error) => Json(UploadResponse::failed(filename, &error)),
    }
}

/// Pull the `file` field out of the multipart body.
///
/// On failure the filename seen so far (possibly empty) is returned with the error.
async fn read_upload(mut multipart: Multipart) -> Result<(String, Vec<u8>), (String, PipelineError)> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => {
                return Err((
                    String::new(),
                    PipelineError::InvalidRequest(format!(
                        "multipart field '{UPLOAD_FIELD}' is missing"
                    )),
                ));
            }
            Err(error) => {
                return Err((
                    String::new(),
                    PipelineError::InvalidRequest(error.body_text()),
                ));
            }
        };

        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.trim().is_empty() {
            return Err((
                filename,
                PipelineError::InvalidRequest("uploaded file has no filename".into()),
            ));
        }

        return match field.bytes().await {
            Ok(bytes) => Ok((filename, bytes.to_vec())),
            Err(error) => Err((filename, PipelineError::InvalidRequest(error.body_text()))),
        };
    }
}

/// Request body for `POST /query`.
#[derive(Deserialize)]
struct QueryRequest {
    query_text: String,
}

/// Response body for `POST /query`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum QueryResponse {
    Success {
        query: String,
        answer: String,
        relevant_chunks: Vec<String>,
    },
    Error {
        query: String,
        kind: ErrorKind,
        message: String,
    },
}

impl QueryResponse {
    fn failed(query: String, error: &PipelineError) -> Self {
        Self::Error {
            query,
            kind: error.kind(),
            message: format!("Error processing query. Error: {error}"),
        }
    }
}

/// Answer a question against the stored documents.
async fn query_documents<S>(
    State(service): State<Arc<S>>,
    request: Result<Json<QueryRequest>, JsonRejection>,
) -> Json<QueryResponse>
where
    S: RagApi,
{
    let query_text = match request {
        Ok(Json(request)) => request.query_text,
        Err(rejection) => {
            let error = PipelineError::InvalidRequest(rejection.body_text());
            return Json(QueryResponse::failed(String::new(), &error));
        }
    };

    match service.query(&query_text).await {
        Ok(outcome) => Json(QueryResponse::Success {
            query: outcome.query,
            answer: outcome.answer,
            relevant_chunks: outcome.relevant_chunks,
        }),
        Err(error) => Json(QueryResponse::failed(query_text, &error)),
    }
}

/// Request body for `POST /summarize`.
#[derive(Deserialize)]
struct SummarizeRequest {
    filename: String,
}

/// Response body for `POST /summarize`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum SummarizeResponse {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        summary: String,
    },
    Error {
        filename: String,
        kind: ErrorKind,
        message: String,
    },
}

impl SummarizeResponse {
    fn failed(filename: String, error: &PipelineError) -> Self {
        Self::Error {
            filename,
            kind: error.kind(),
            message: format!("Error processing summarization. Error: {error}"),
        }
    }
}

/// Summarize one stored document.
async fn summarize_document<S>(
    State(service): State<Arc<S>>,
    request: Result<Json<SummarizeRequest>, JsonRejection>,
) -> Json<SummarizeResponse>
where
    S: RagApi,
{
    let filename = match request {
        Ok(Json(request)) => request.filename,
        Err(rejection) => {
            let error = PipelineError::InvalidRequest(rejection.body_text());
            return Json(SummarizeResponse::failed(String::new(), &error));
        }
    };

    match service.summarize(&filename).await {
        Ok(SummaryOutcome::Summarized { filename, summary }) => Json(SummarizeResponse::Success {
            filename: Some(filename),
            summary,
        }),
        Ok(SummaryOutcome::NotFound { .. }) => Json(SummarizeResponse::Success {
            filename: None,
            summary: DOCUMENT_NOT_FOUND.to_string(),
        }),
        Err(error) => Json(SummarizeResponse::failed(filename, &error)),
    }
}

/// Response body for `GET /documents`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum DocumentsResponse {
    Success { documents: Vec<String> },
    Error { kind: ErrorKind, message: String },
}

/// List filenames with stored chunks.
async fn list_documents<S>(State(service): State<Arc<S>>) -> Json<DocumentsResponse>
where
    S: RagApi,
{
    match service.list_documents().await {
        Ok(documents) => Json(DocumentsResponse::Success { documents }),
        Err(error) => Json(DocumentsResponse::Error {
            kind: error.kind(),
            message: format!("Error listing documents. Error: {error}"),
        }),
    }
}

/// Return the pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: RagApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/upload",
                description: "Upload a PDF as multipart field 'file'. Re-uploading a filename replaces its chunks. Response returns { \"filename\", \"chunk_count\", \"vectors_stored\" }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "query",
                method: "POST",
                path: "/query",
                description: "Answer a question from the most similar stored chunks. Response returns { \"query\", \"answer\", \"relevant_chunks\" }.",
                request_example: Some(json!({
                    "query_text": "How many years of experience does Alice have?"
                })),
            },
            CommandDescriptor {
                name: "summarize",
                method: "POST",
                path: "/summarize",
                description: "Summarize every stored chunk of one uploaded document.",
                request_example: Some(json!({ "filename": "resume.pdf" })),
            },
            CommandDescriptor {
                name: "documents",
                method: "GET",
                path: "/documents",
                description: "Return the filenames that currently have stored chunks.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion, query, and failure counters.",
                request_example: None,
            },
        ],
    })
}
