//! Retrieval fusion for Temporal Graph Retrieval
//!
//! Merges ranked candidate lists from independent retrievers with Reciprocal
//! Rank Fusion, optionally refines the pool with a cross-encoder, and returns a
//! truncated ranking with provenance.

pub mod assembler;
pub mod fusion;
pub mod pipeline;
pub mod rerank;
pub mod retriever;

pub use assembler::{DegradedStage, RankedHit, ResultAssembler, SearchResponse};
pub use fusion::{fuse, FusedResult, RrfConfig, SourceContribution};
pub use pipeline::{RetrieverSource, SearchPipeline};
pub use rerank::{CrossEncoder, RerankConfig, RerankStrategy, RerankedResult, Reranker};
pub use retriever::{Candidate, RankedList, RetrievedHit, Retriever, SearchFilters};
pub use tokio_util::sync::CancellationToken;

/// Search errors
#[derive(thiserror::Error, Debug)]
pub enum SearchError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Retriever {name} unavailable: {reason}")]
    RetrieverUnavailable { name: String, reason: String },

    #[error("Rerank unavailable: {0}")]
    RerankUnavailable(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Search cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, SearchError>;
