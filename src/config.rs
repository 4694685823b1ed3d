use std::env;
use thiserror::Error;

use crate::processing::chunking::{ChunkingOptions, LengthUnit};

const DEFAULT_SERVER_PORT: u16 = 8000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const DEFAULT_QDRANT_URL: &str = "http://127.0.0.1:6333";
const DEFAULT_COLLECTION_NAME: &str = "documents";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
const DEFAULT_GENERATION_MODEL: &str = "llama3.2";
const DEFAULT_CHUNK_SIZE: usize = 350;
const DEFAULT_CHUNK_OVERLAP: usize = 50;
const DEFAULT_QUERY_TOP_K: usize = 3;
const DEFAULT_QUERY_MAX_NEW_TOKENS: usize = 50;
const DEFAULT_SUMMARY_MAX_NEW_TOKENS: usize = 150;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Ragdesk server.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP port the server binds to.
    pub server_port: u16,
    /// Largest accepted multipart upload, in bytes.
    pub max_upload_bytes: usize,
    /// Vector store backend holding chunk records.
    pub vector_store: VectorStoreBackend,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the collection used for document storage.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the local Ollama runtime.
    pub ollama_url: String,
    /// Base URL of the OpenAI-compatible embeddings API.
    pub openai_base_url: String,
    /// API key for the OpenAI-compatible embeddings API.
    pub openai_api_key: Option<String>,
    /// Generation provider used to answer queries and write summaries.
    pub generation_provider: GenerationProvider,
    /// Generation model identifier passed to the provider.
    pub generation_model: String,
    /// Maximum chunk length measured in `text_splitter_length_unit`.
    pub text_splitter_chunk_size: usize,
    /// Overlap carried between consecutive chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Unit used to measure chunk length.
    pub text_splitter_length_unit: LengthUnit,
    /// Number of chunks retrieved for a query.
    pub query_top_k: usize,
    /// Token budget for query answers.
    pub query_max_new_tokens: usize,
    /// Token budget for document summaries.
    pub summary_max_new_tokens: usize,
}

/// Supported vector store backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorStoreBackend {
    /// Remote Qdrant collection over HTTP.
    Qdrant,
    /// Process-local store; contents are lost on restart.
    Memory,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI embeddings API or a compatible server.
    OpenAI,
    /// Deterministic feature-hashing embeddings computed in process.
    Hash,
}

/// Supported text generation backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic sentence extraction from the prompt context.
    Extractive,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load `.env` (when present) and then read the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            server_port = config.server_port,
            vector_store = ?config.vector_store,
            collection = %config.qdrant_collection_name,
            embedding_provider = ?config.embedding_provider,
            embedding_model = %config.embedding_model,
            generation_provider = ?config.generation_provider,
            generation_model = %config.generation_model,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let embedding_provider = vars.parse_or("EMBEDDING_PROVIDER", EmbeddingProvider::Ollama)?;
        let openai_api_key = vars.optional("OPENAI_API_KEY");
        if embedding_provider == EmbeddingProvider::OpenAI && openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".into()));
        }

        let text_splitter_chunk_size = vars
            .parse_or("TEXT_SPLITTER_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)
            .and_then(|value| non_zero("TEXT_SPLITTER_CHUNK_SIZE", value))?;
        let text_splitter_chunk_overlap =
            vars.parse_or("TEXT_SPLITTER_CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?;
        // Every chunk must have room for content beyond the carried overlap.
        if text_splitter_chunk_overlap >= text_splitter_chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP".into(),
            ));
        }

        Ok(Self {
            server_port: vars.parse_or("SERVER_PORT", DEFAULT_SERVER_PORT)?,
            max_upload_bytes: vars.parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            vector_store: vars.parse_or("VECTOR_STORE", VectorStoreBackend::Qdrant)?,
            qdrant_url: vars.string_or("QDRANT_URL", DEFAULT_QDRANT_URL),
            qdrant_collection_name: vars.string_or("QDRANT_COLLECTION_NAME", DEFAULT_COLLECTION_NAME),
            qdrant_api_key: vars.optional("QDRANT_API_KEY"),
            embedding_provider,
            embedding_model: vars.string_or("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            embedding_dimension: vars
                .parse_or("EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)
                .and_then(|value| non_zero("EMBEDDING_DIMENSION", value))?,
            ollama_url: vars.string_or("OLLAMA_URL", DEFAULT_OLLAMA_URL),
            openai_base_url: vars.string_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            openai_api_key,
            generation_provider: vars.parse_or("GENERATION_PROVIDER", GenerationProvider::Ollama)?,
            generation_model: vars.string_or("GENERATION_MODEL", DEFAULT_GENERATION_MODEL),
            text_splitter_chunk_size,
            text_splitter_chunk_overlap,
            text_splitter_length_unit: vars
                .parse_or("TEXT_SPLITTER_LENGTH_UNIT", LengthUnit::Characters)?,
            query_top_k: vars
                .parse_or("QUERY_TOP_K", DEFAULT_QUERY_TOP_K)
                .and_then(|value| non_zero("QUERY_TOP_K", value))?,
            query_max_new_tokens: vars
                .parse_or("QUERY_MAX_NEW_TOKENS", DEFAULT_QUERY_MAX_NEW_TOKENS)?,
            summary_max_new_tokens: vars
                .parse_or("SUMMARY_MAX_NEW_TOKENS", DEFAULT_SUMMARY_MAX_NEW_TOKENS)?,
        })
    }

    /// Chunking options derived from the text splitter settings.
    pub fn chunking_options(&self) -> ChunkingOptions {
        ChunkingOptions {
            chunk_size: self.text_splitter_chunk_size,
            chunk_overlap: self.text_splitter_chunk_overlap,
            length_unit: self.text_splitter_length_unit,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_SERVER_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            vector_store: VectorStoreBackend::Qdrant,
            qdrant_url: DEFAULT_QDRANT_URL.into(),
            qdrant_collection_name: DEFAULT_COLLECTION_NAME.into(),
            qdrant_api_key: None,
            embedding_provider: EmbeddingProvider::Ollama,
            embedding_model: DEFAULT_EMBEDDING_MODEL.into(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            ollama_url: DEFAULT_OLLAMA_URL.into(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.into(),
            openai_api_key: None,
            generation_provider: GenerationProvider::Ollama,
            generation_model: DEFAULT_GENERATION_MODEL.into(),
            text_splitter_chunk_size: DEFAULT_CHUNK_SIZE,
            text_splitter_chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            text_splitter_length_unit: LengthUnit::Characters,
            query_top_k: DEFAULT_QUERY_TOP_K,
            query_max_new_tokens: DEFAULT_QUERY_MAX_NEW_TOKENS,
            summary_max_new_tokens: DEFAULT_SUMMARY_MAX_NEW_TOKENS,
        }
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string())),
            None => Ok(default),
        }
    }
}

fn non_zero(key: &str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        Err(ConfigError::InvalidValue(key.to_string()))
    } else {
        Ok(value)
    }
}

impl std::str::FromStr for VectorStoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "memory" | "in-memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "extractive" => Ok(Self::Extractive),
            _ => Err(()),
        }
    }
}
