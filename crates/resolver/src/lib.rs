//! Temporal contradiction engine
//!
//! Detects conflicting facts at ingestion time and resolves them with an
//! explicit strategy. Every applied resolution is atomic with its audit entry
//! and idempotent on re-application.

pub mod audit;
pub mod detector;
pub mod locks;
pub mod resolver;
pub mod similarity;
pub mod strategies;
pub mod types;

#[cfg(test)]
mod testing;

pub use audit::{AuditError, AuditLog, InMemoryAuditLog};
pub use detector::ContradictionDetector;
pub use locks::{KeyGuard, KeyLocks};
pub use resolver::ContradictionResolver;
pub use similarity::{NormalizedLevenshtein, ObjectSimilarity, DEFAULT_SIMILARITY_THRESHOLD};
pub use strategies::{handler_for, ClaimPair, ResolutionPlan, StrategyHandler};
pub use types::{Detection, ResolutionOutcome, ResolutionStats};

use tgr_core::{ContradictionId, EdgeId, EdgeState, ResolutionStrategy};
use tgr_storage::StorageError;

/// Resolver errors
#[derive(thiserror::Error, Debug)]
pub enum ResolverError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("Resolution conflict on contradiction {contradiction}")]
    ResolutionConflict { contradiction: ContradictionId },

    #[error("Storage write failed while resolving {contradiction}: {reason}")]
    StorageWriteFailure {
        contradiction: ContradictionId,
        reason: String,
    },

    #[error("Contradiction {contradiction} already resolved with {strategy}")]
    AlreadyResolved {
        contradiction: ContradictionId,
        strategy: ResolutionStrategy,
    },

    #[error("Strategy not applicable to {contradiction}: {reason}")]
    Inapplicable {
        contradiction: ContradictionId,
        reason: String,
    },

    #[error("Resolving {contradiction} would move edge {edge} from {from:?} to {to:?}")]
    InvalidTransition {
        contradiction: ContradictionId,
        edge: EdgeId,
        from: EdgeState,
        to: EdgeState,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ResolverError {
    /// The contradiction a resolution failure refers to, if any
    pub fn contradiction_id(&self) -> Option<ContradictionId> {
        match self {
            Self::ResolutionConflict { contradiction }
            | Self::StorageWriteFailure { contradiction, .. }
            | Self::AlreadyResolved { contradiction, .. }
            | Self::Inapplicable { contradiction, .. }
            | Self::InvalidTransition { contradiction, .. } => Some(*contradiction),
            Self::Storage(StorageError::ContradictionNotFound(id))
            | Self::Storage(StorageError::ContradictionClosed(id)) => Some(*id),
            _ => None,
        }
    }

    /// Whether a later attempt could succeed without operator action
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResolutionConflict { .. } | Self::StorageWriteFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, ResolverError>;
