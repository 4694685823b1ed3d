//! Text generation clients used to answer queries and write summaries.
//!
//! The Ollama client issues a single non-streaming `/api/generate` request per call with the
//! token budget mapped to `num_predict`. The extractive client needs no model: it reads the
//! context back out of the rendered prompt and answers with sentences taken verbatim from it.

use crate::config::{Config, GenerationProvider};
use crate::processing::prompts::{NOT_FOUND_ANSWER, PromptSections};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while generating text.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Provider was unreachable.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate text: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Prompt and token budget for one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Fully rendered prompt.
    pub prompt: String,
    /// Upper bound on newly generated tokens.
    pub max_new_tokens: usize,
}

/// Interface implemented by text generation providers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a completion for the prompt within the token budget.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError>;
}

/// Build a generation client based on configuration.
pub fn build_generation_client(
    config: &Config,
) -> Result<Arc<dyn GenerationClient>, GenerationClientError> {
    let client: Arc<dyn GenerationClient> = match config.generation_provider {
        GenerationProvider::Ollama => {
            let http = Client::builder()
                .user_agent("ragdesk/generation")
                .build()
                .map_err(|error| GenerationClientError::ProviderUnavailable(error.to_string()))?;
            Arc::new(OllamaGenerationClient::new(
                http,
                config.ollama_url.clone(),
                config.generation_model.clone(),
            ))
        }
        GenerationProvider::Extractive => Arc::new(ExtractiveGenerationClient),
    };
    tracing::info!(
        provider = ?config.generation_provider,
        model = %config.generation_model,
        "Generation client initialized"
    );
    Ok(client)
}

/// Generation client backed by the Ollama `/api/generate` endpoint.
pub struct OllamaGenerationClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerationClient {
    /// Create a client for the given Ollama base URL and model.
    pub fn new(http: Client, base_url: String, model: String) -> Self {
        Self {
            http,
            base_url,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl GenerationClient for OllamaGenerationClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        let payload = json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "num_predict": request.max_new_tokens,
                "temperature": 0.1,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404: {body}",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(GenerationClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

/// Model-free generator that answers with sentences copied from the prompt context.
///
/// For a question it returns the context sentence sharing the most words with the question,
/// or the fixed fallback phrase when no sentence shares any. For a summary it returns the
/// leading sentences. Output is capped at `max_new_tokens` words.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveGenerationClient;

impl ExtractiveGenerationClient {
    fn answer(context: &str, question: &str) -> String {
        let question_terms = terms(question);
        let best = split_sentences(context)
            .into_iter()
            .map(|sentence| {
                let overlap = terms(sentence).intersection(&question_terms).count();
                (overlap, sentence)
            })
            .filter(|(overlap, _)| *overlap > 0)
            // Earliest sentence wins ties.
            .fold(None::<(usize, &str)>, |best, candidate| match best {
                Some((score, _)) if score >= candidate.0 => best,
                _ => Some(candidate),
            });

        match best {
            Some((_, sentence)) => sentence.to_string(),
            None => NOT_FOUND_ANSWER.to_string(),
        }
    }

    fn summarize(context: &str) -> String {
        split_sentences(context).join(" ")
    }
}

#[async_trait]
impl GenerationClient for ExtractiveGenerationClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        let sections = PromptSections::parse(&request.prompt);
        let context = sections.context.ok_or_else(|| {
            GenerationClientError::GenerationFailed("prompt has no context section".into())
        })?;

        let text = match sections.question {
            Some(question) => Self::answer(context, question),
            None => Self::summarize(context),
        };
        Ok(truncate_words(&text, request.max_new_tokens))
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for (index, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let end = index + c.len_utf8();
            let next_is_boundary = text[end..]
                .chars()
                .next()
                .is_none_or(char::is_whitespace);
            if next_is_boundary {
                sentences.push(text[start..end].trim());
                start = end;
            }
        }
    }
    sentences.push(text[start..].trim());
    sentences.retain(|sentence| !sentence.is_empty());
    sentences
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() > 2)
        .map(str::to_lowercase)
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "what", "which", "who", "whom", "how", "many",
    "much", "does", "did", "have", "has", "had", "with", "from", "that", "this", "into", "about",
    "when", "where", "why", "there", "their", "they", "you", "your",
];

fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}
