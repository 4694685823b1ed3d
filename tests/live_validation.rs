use ragdesk::{
    config::Config,
    embedding::build_embedding_client,
    generation::{GenerationRequest, build_generation_client},
    processing::{RagApi, RagService},
};

/// Live configuration: process environment with local-service defaults and a scratch collection.
fn live_config() -> Config {
    Config::from_lookup(|key| {
        let value = std::env::var(key).ok().filter(|value| !value.trim().is_empty());
        value.or_else(|| match key {
            "QDRANT_COLLECTION_NAME" => Some("ragdesk-live".into()),
            "VECTOR_STORE" => Some("qdrant".into()),
            _ => None,
        })
    })
    .expect("live configuration")
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings"]
async fn live_ollama_embedding_roundtrip() {
    let config = live_config();
    let client = build_embedding_client(&config).expect("embedding client");
    let vectors = client
        .generate_embeddings(vec!["ragdesk live embedding".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input chunk");
    assert_eq!(
        vectors[0].len(),
        config.embedding_dimension,
        "embedding dimension mismatch"
    );
}

#[tokio::test]
#[ignore = "Requires live Ollama generation"]
async fn live_ollama_generation_respects_budget() {
    let config = live_config();
    let client = build_generation_client(&config).expect("generation client");
    let text = client
        .generate(GenerationRequest {
            prompt: "Reply with the single word: ready".into(),
            max_new_tokens: 10,
        })
        .await
        .expect("generation");
    assert!(!text.trim().is_empty());
}

#[tokio::test]
#[ignore = "Requires live Qdrant and Ollama"]
async fn live_ingest_query_and_summarize() {
    let config = live_config();
    let service = RagService::from_config(&config)
        .await
        .expect("service against live backends");

    let outcome = service
        .ingest_text(
            "live-cv.pdf",
            "Alice has 5 years of experience in backend engineering.",
        )
        .await
        .expect("ingest");
    assert_eq!(outcome.chunk_count, 1);

    let answer = service
        .query("How many years of experience does Alice have?")
        .await
        .expect("query");
    assert!(
        answer
            .relevant_chunks
            .iter()
            .any(|chunk| chunk.contains("Alice"))
    );
    assert!(!answer.answer.trim().is_empty());

    service.summarize("live-cv.pdf").await.expect("summarize");
    let documents = service.list_documents().await.expect("documents");
    assert!(documents.contains(&"live-cv.pdf".to_string()));
}
