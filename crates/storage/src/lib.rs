//! Storage layer for Temporal Graph Retrieval
//!
//! The temporal graph store is an external collaborator. This crate defines the
//! accessor contract the contradiction engine relies on and provides:
//! - `GraphStore`: entities, time-versioned edges and contradiction records
//! - In-memory: HashMap-based storage for testing and the CLI

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tgr_core::{
    ContradictionId, ContradictionRecord, EdgeId, EdgeKey, Entity, EntityId, TemporalEdge,
};

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("Contradiction not found: {0}")]
    ContradictionNotFound(ContradictionId),

    #[error("Edge already exists: {0}")]
    DuplicateEdge(EdgeId),

    #[error("Version conflict on edge {edge}: expected {expected}, found {actual}")]
    VersionConflict {
        edge: EdgeId,
        expected: u64,
        actual: u64,
    },

    #[error("Contradiction {0} is no longer open")]
    ContradictionClosed(ContradictionId),

    #[error("Write failed: {0}")]
    WriteFailed(String),
}

impl StorageError {
    /// Whether re-reading state and retrying could succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. } | Self::ContradictionClosed(_))
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// An edge write guarded by the version the writer last read
#[derive(Debug, Clone)]
pub struct EdgeWrite {
    pub edge: TemporalEdge,
    pub expected_version: u64,
}

/// Everything one resolution changes, applied as a single atomic unit
#[derive(Debug, Clone)]
pub struct ResolutionCommit {
    pub edges: Vec<EdgeWrite>,
    pub record: ContradictionRecord,

    /// Sibling records closed alongside `record`; each must still be open
    pub superseded: Vec<ContradictionRecord>,

    pub multi_valued: Option<EdgeKey>,
}

/// Pre-images captured before a commit, used to undo it
#[derive(Debug, Clone)]
pub struct ResolutionSnapshot {
    pub edges: Vec<TemporalEdge>,
    pub records: Vec<ContradictionRecord>,
    pub multi_valued: Option<(EdgeKey, bool)>,
}

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub total_entities: u64,
    pub total_edges: u64,
    pub total_contradictions: u64,
    pub open_contradictions: u64,
}

/// Accessor for the time-versioned knowledge graph
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create or replace an entity
    async fn create_entity(&self, entity: Entity) -> Result<()>;

    async fn get_entity(&self, id: &EntityId) -> Result<Entity>;

    /// Insert a new edge. Edges are never deleted.
    async fn insert_edge(&self, edge: TemporalEdge) -> Result<()>;

    async fn get_edge(&self, id: &EdgeId) -> Result<TemporalEdge>;

    /// Every edge stored for a key in any state, ordered by `valid_from`
    async fn edges_for(&self, key: &EdgeKey) -> Result<Vec<TemporalEdge>>;

    /// Compare-and-swap write of a single edge. Returns the stored edge with
    /// its bumped version.
    async fn update_edge(&self, edge: TemporalEdge, expected_version: u64) -> Result<TemporalEdge>;

    async fn is_multi_valued(&self, key: &EdgeKey) -> Result<bool>;

    async fn insert_contradiction(&self, record: ContradictionRecord) -> Result<()>;

    /// Insert a proposed edge together with the records it opens. Either the
    /// edge and every record are stored or none of them is.
    async fn insert_proposal(&self, edge: TemporalEdge, records: Vec<ContradictionRecord>) -> Result<()>;

    async fn get_contradiction(&self, id: &ContradictionId) -> Result<ContradictionRecord>;

    async fn list_open_contradictions(&self) -> Result<Vec<ContradictionRecord>>;

    /// Apply edge writes, the record update and the multi-valued flag
    /// atomically. Either everything is applied or nothing is.
    async fn commit_resolution(&self, commit: ResolutionCommit) -> Result<()>;

    /// Put edges, record and flag back to the captured pre-images
    async fn restore(&self, snapshot: ResolutionSnapshot) -> Result<()>;

    async fn stats(&self) -> Result<StorageStats>;

    /// Edges whose validity window covers `at`
    async fn valid_edges_at(&self, key: &EdgeKey, at: DateTime<Utc>) -> Result<Vec<TemporalEdge>> {
        Ok(self
            .edges_for(key)
            .await?
            .into_iter()
            .filter(|edge| edge.was_valid_at(at))
            .collect())
    }

    /// Open records on one key
    async fn open_contradictions_for(&self, key: &EdgeKey) -> Result<Vec<ContradictionRecord>> {
        Ok(self
            .list_open_contradictions()
            .await?
            .into_iter()
            .filter(|record| record.key == *key)
            .collect())
    }

    /// Edges currently holding a live value for the key
    async fn live_edges(&self, key: &EdgeKey) -> Result<Vec<TemporalEdge>> {
        Ok(self
            .edges_for(key)
            .await?
            .into_iter()
            .filter(|edge| edge.state.is_live())
            .collect())
    }
}
