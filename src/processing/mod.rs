//! Document pipeline: chunking, context assembly, prompting, and flow orchestration.

pub mod chunking;
pub mod context;
pub mod locks;
pub mod prompts;
mod service;
pub mod types;

pub use service::{PipelineSettings, RagApi, RagService};
pub use types::{
    ChunkingError, ErrorKind, IngestOutcome, PipelineError, QueryOutcome, SummaryOutcome,
};
