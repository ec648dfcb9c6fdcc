//! Store double shared by the detector and resolver tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tgr_core::{ContradictionId, ContradictionRecord, EdgeId, EdgeKey, Entity, EntityId, TemporalEdge};
use tgr_storage::memory::InMemoryGraphStore;
use tgr_storage::{GraphStore, ResolutionCommit, ResolutionSnapshot, Result, StorageError, StorageStats};

/// In-memory store whose next writes can be made to fail or lose a version race
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: InMemoryGraphStore,
    failing_commits: Arc<AtomicU32>,
    conflicting_commits: Arc<AtomicU32>,
    conflicting_updates: Arc<AtomicU32>,
    failing_proposals: Arc<AtomicU32>,
}

impl FlakyStore {
    pub fn fail_next_commits(&self, n: u32) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    pub fn conflict_next_commits(&self, n: u32) {
        self.conflicting_commits.store(n, Ordering::SeqCst);
    }

    pub fn conflict_next_updates(&self, n: u32) {
        self.conflicting_updates.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_proposals(&self, n: u32) {
        self.failing_proposals.store(n, Ordering::SeqCst);
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl GraphStore for FlakyStore {
    async fn create_entity(&self, entity: Entity) -> Result<()> {
        self.inner.create_entity(entity).await
    }

    async fn get_entity(&self, id: &EntityId) -> Result<Entity> {
        self.inner.get_entity(id).await
    }

    async fn insert_edge(&self, edge: TemporalEdge) -> Result<()> {
        self.inner.insert_edge(edge).await
    }

    async fn get_edge(&self, id: &EdgeId) -> Result<TemporalEdge> {
        self.inner.get_edge(id).await
    }

    async fn edges_for(&self, key: &EdgeKey) -> Result<Vec<TemporalEdge>> {
        self.inner.edges_for(key).await
    }

    async fn update_edge(&self, edge: TemporalEdge, expected_version: u64) -> Result<TemporalEdge> {
        if Self::take(&self.conflicting_updates) {
            return Err(StorageError::VersionConflict {
                edge: edge.id,
                expected: expected_version,
                actual: expected_version + 1,
            });
        }
        self.inner.update_edge(edge, expected_version).await
    }

    async fn is_multi_valued(&self, key: &EdgeKey) -> Result<bool> {
        self.inner.is_multi_valued(key).await
    }

    async fn insert_contradiction(&self, record: ContradictionRecord) -> Result<()> {
        self.inner.insert_contradiction(record).await
    }

    async fn insert_proposal(&self, edge: TemporalEdge, records: Vec<ContradictionRecord>) -> Result<()> {
        if Self::take(&self.failing_proposals) {
            return Err(StorageError::WriteFailed("disk full".to_string()));
        }
        self.inner.insert_proposal(edge, records).await
    }

    async fn get_contradiction(&self, id: &ContradictionId) -> Result<ContradictionRecord> {
        self.inner.get_contradiction(id).await
    }

    async fn list_open_contradictions(&self) -> Result<Vec<ContradictionRecord>> {
        self.inner.list_open_contradictions().await
    }

    async fn commit_resolution(&self, commit: ResolutionCommit) -> Result<()> {
        if Self::take(&self.failing_commits) {
            return Err(StorageError::WriteFailed("disk full".to_string()));
        }
        if Self::take(&self.conflicting_commits) {
            let edge = commit.edges.first().map(|w| w.edge.id).unwrap_or_default();
            return Err(StorageError::VersionConflict {
                edge,
                expected: 0,
                actual: 1,
            });
        }
        self.inner.commit_resolution(commit).await
    }

    async fn restore(&self, snapshot: ResolutionSnapshot) -> Result<()> {
        self.inner.restore(snapshot).await
    }

    async fn stats(&self) -> Result<StorageStats> {
        self.inner.stats().await
    }
}
