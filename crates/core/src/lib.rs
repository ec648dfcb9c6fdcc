//! Core data structures for Temporal Graph Retrieval

pub mod contradiction;
pub mod graph;
pub mod types;

pub use contradiction::{
    AuditEntry, Claim, ContradictionRecord, ContradictionStatus, ResolutionStrategy,
};
pub use graph::{EdgeProposal, EdgeState, Entity, TemporalEdge};
pub use types::{ContradictionId, EdgeId, EdgeKey, EntityId, SourceId};

/// Core error types
#[derive(thiserror::Error, Debug)]
pub enum TgrError {
    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, TgrError>;
