//! End-to-end flows against the in-memory store with deterministic model clients.

use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{Method, Request},
};
use ragdesk::{
    api::create_router,
    embedding::HashEmbeddingClient,
    generation::{
        ExtractiveGenerationClient, GenerationClient, GenerationClientError, GenerationRequest,
    },
    processing::{
        ErrorKind, PipelineError, PipelineSettings, RagApi, RagService, SummaryOutcome,
        prompts::NOT_FOUND_ANSWER,
    },
    store::{InMemoryVectorStore, MetadataFilter, VectorStore},
};
use serde_json::Value;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tower::ServiceExt;

const DIMENSION: usize = 256;
const ALICE: &str = "Alice has 5 years of experience in backend engineering.";
const ALICE_PDF: &[u8] = include_bytes!("fixtures/alice_cv.pdf");

/// Extractive generator that also counts invocations.
#[derive(Default)]
struct CountingGenerator {
    calls: AtomicUsize,
}

impl CountingGenerator {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationClient for CountingGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ExtractiveGenerationClient.generate(request).await
    }
}

struct Harness {
    service: Arc<RagService>,
    store: Arc<InMemoryVectorStore>,
    generator: Arc<CountingGenerator>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryVectorStore::new());
    let generator = Arc::new(CountingGenerator::default());
    let settings = PipelineSettings {
        embedding_dimension: Some(DIMENSION),
        ..PipelineSettings::default()
    };
    let service = RagService::with_components(
        Arc::new(HashEmbeddingClient::new(DIMENSION)),
        store.clone(),
        generator.clone(),
        settings,
    );
    Harness {
        service: Arc::new(service),
        store,
        generator,
    }
}

fn long_document(topic: &str, sentences: usize) -> String {
    (0..sentences)
        .map(|index| format!("Section {index} of the {topic} handbook describes one more procedure in detail."))
        .collect::<Vec<_>>()
        .join(" ")
}

async fn records_for(store: &InMemoryVectorStore, filename: &str) -> usize {
    store
        .get(&MetadataFilter::source(filename))
        .await
        .expect("get")
        .len()
}

#[tokio::test]
async fn reingesting_same_document_is_idempotent() {
    let h = harness();
    let text = long_document("onboarding", 20);

    let first = h.service.ingest_text("handbook.pdf", &text).await.expect("first");
    let second = h.service.ingest_text("handbook.pdf", &text).await.expect("second");

    assert_eq!(first.chunk_count, second.chunk_count);
    assert!(first.chunk_count > 1);
    assert_eq!(records_for(&h.store, "handbook.pdf").await, second.chunk_count);
    assert_eq!(h.store.len().await, second.chunk_count);
}

#[tokio::test]
async fn reupload_replaces_previous_chunks() {
    let h = harness();
    let long = h
        .service
        .ingest_text("report.pdf", &long_document("security", 30))
        .await
        .expect("long");
    h.service
        .ingest_text("other.pdf", ALICE)
        .await
        .expect("other");

    let short = h
        .service
        .ingest_text("report.pdf", &long_document("security", 3))
        .await
        .expect("short");

    assert!(long.chunk_count > short.chunk_count);
    assert_eq!(records_for(&h.store, "report.pdf").await, short.chunk_count);
    assert_eq!(records_for(&h.store, "other.pdf").await, 1);
}

#[tokio::test]
async fn concurrent_uploads_of_one_filename_leave_a_single_version() {
    let h = harness();
    let texts = [long_document("alpha", 25), long_document("beta", 5)];

    let tasks: Vec<_> = texts
        .iter()
        .cloned()
        .map(|text| {
            let service = h.service.clone();
            tokio::spawn(async move { service.ingest_text("race.pdf", &text).await })
        })
        .collect();

    let mut counts = Vec::new();
    for task in tasks {
        counts.push(task.await.expect("join").expect("ingest").chunk_count);
    }

    let stored = records_for(&h.store, "race.pdf").await;
    assert!(counts.contains(&stored), "stored {stored}, outcomes {counts:?}");
}

#[tokio::test]
async fn query_on_empty_store_skips_generation() {
    let h = harness();
    let outcome = h
        .service
        .query("What is the refund policy?")
        .await
        .expect("query");

    assert_eq!(outcome.answer, NOT_FOUND_ANSWER);
    assert!(outcome.relevant_chunks.is_empty());
    assert_eq!(h.generator.calls(), 0);
    assert_eq!(h.service.metrics_snapshot().queries_without_context, 1);
}

#[tokio::test]
async fn summarize_unknown_document_reports_not_found() {
    let h = harness();
    h.service.ingest_text("cv.pdf", ALICE).await.expect("ingest");

    let outcome = h.service.summarize("missing.pdf").await.expect("summarize");
    assert_eq!(
        outcome,
        SummaryOutcome::NotFound {
            filename: "missing.pdf".into()
        }
    );
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn question_is_answered_from_ingested_document() {
    let h = harness();
    h.service.ingest_text("cv.pdf", ALICE).await.expect("ingest");
    h.service
        .ingest_text(
            "report.pdf",
            "The quarterly revenue report covers sales in Europe and Asia.",
        )
        .await
        .expect("ingest");

    let outcome = h
        .service
        .query("How many years of experience does Alice have?")
        .await
        .expect("query");

    assert_eq!(outcome.relevant_chunks.first().map(String::as_str), Some(ALICE));
    assert!(!outcome.answer.trim().is_empty());
    assert!(outcome.answer.contains('5'));
    assert!(!outcome.answer.contains("Context:"));
    assert!(!outcome.answer.contains("*only*"));
    assert_eq!(h.generator.calls(), 1);
}

#[tokio::test]
async fn summary_covers_document_in_order() {
    let h = harness();
    let text = long_document("release", 12);
    h.service.ingest_text("notes.pdf", &text).await.expect("ingest");

    let SummaryOutcome::Summarized { summary, .. } =
        h.service.summarize("notes.pdf").await.expect("summarize")
    else {
        panic!("document should be summarized");
    };

    assert!(summary.starts_with("Section 0 of the release handbook"));
    assert!(summary.split_whitespace().count() <= 150);
}

#[tokio::test]
async fn uploaded_pdf_is_indexed_and_answers_questions() {
    let h = harness();
    let outcome = h
        .service
        .ingest_pdf("alice_cv.pdf", ALICE_PDF.to_vec())
        .await
        .expect("ingest");
    assert_eq!(outcome.chunk_count, 1);

    let stored = h
        .store
        .get(&MetadataFilter::source("alice_cv.pdf"))
        .await
        .expect("get");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].document, ALICE);

    let answer = h
        .service
        .query("How many years of experience does Alice have?")
        .await
        .expect("query");
    assert_eq!(answer.relevant_chunks, vec![ALICE.to_string()]);
    assert!(answer.answer.contains("5 years"));
}

#[tokio::test]
async fn cjk_document_without_spaces_is_indexed() {
    let h = harness();
    let text = "爱丽丝在后端工程方面有五年经验".repeat(30);
    let service = h.service.clone();
    let result = tokio::spawn(async move { service.ingest_text("cv_zh.pdf", &text).await })
        .await
        .expect("ingest task must not panic");

    let outcome = result.expect("ingest");
    assert!(outcome.chunk_count >= 2);
    assert_eq!(records_for(&h.store, "cv_zh.pdf").await, outcome.chunk_count);
}

#[tokio::test]
async fn malformed_pdf_fails_without_storing_records() {
    let h = harness();
    let error = h
        .service
        .ingest_pdf("broken.pdf", b"this is not a pdf".to_vec())
        .await
        .unwrap_err();

    assert!(matches!(error, PipelineError::Extraction(_)));
    assert_eq!(error.kind(), ErrorKind::Extraction);
    assert_eq!(records_for(&h.store, "broken.pdf").await, 0);
    assert_eq!(h.service.metrics_snapshot().failed_requests, 1);
}

#[tokio::test]
async fn router_reports_malformed_upload_and_lists_documents() {
    let h = harness();
    h.service.ingest_text("cv.pdf", ALICE).await.expect("ingest");
    let app = create_router(h.service.clone(), 1024 * 1024);

    let boundary = "flow-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"broken.pdf\"\r\nContent-Type: application/pdf\r\n\r\nnot a pdf\r\n--{boundary}--\r\n"
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .expect("request");
    let json = response_json(app.clone().oneshot(request).await.expect("response")).await;

    assert_eq!(json["status"], "error");
    assert_eq!(json["filename"], "broken.pdf");
    assert_eq!(json["kind"], "extraction");
    assert!(
        json["message"]
            .as_str()
            .expect("message")
            .starts_with("Could not process PDF file. Error: ")
    );

    let request = Request::builder()
        .uri("/documents")
        .body(Body::empty())
        .expect("request");
    let json = response_json(app.oneshot(request).await.expect("response")).await;
    assert_eq!(json["documents"], serde_json::json!(["cv.pdf"]));
}

async fn response_json(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&body).expect("json body")
}
