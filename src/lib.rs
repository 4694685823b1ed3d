#![deny(missing_docs)]

//! Core library for the Ragdesk retrieval-augmented PDF question answering backend.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// PDF text extraction.
pub mod extraction;
/// Text generation client abstraction and adapters.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Document processing pipeline and flow orchestration.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Vector store abstraction and in-memory backend.
pub mod store;
