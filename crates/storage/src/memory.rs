//! In-memory storage implementation for testing and development
//!
//! Provides simple HashMap-based storage without external dependencies. All
//! tables live behind one lock so a resolution commit is atomic.

use crate::{GraphStore, ResolutionCommit, ResolutionSnapshot, Result, StorageError, StorageStats};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tgr_core::{
    ContradictionId, ContradictionRecord, EdgeId, EdgeKey, Entity, EntityId, TemporalEdge,
};

#[derive(Default)]
struct GraphTables {
    entities: HashMap<EntityId, Entity>,
    edges: HashMap<EdgeId, TemporalEdge>,
    by_key: HashMap<EdgeKey, Vec<EdgeId>>,
    contradictions: HashMap<ContradictionId, ContradictionRecord>,
    multi_valued: HashSet<EdgeKey>,
}

impl GraphTables {
    fn check_version(&self, id: &EdgeId, expected: u64) -> Result<()> {
        let current = self.edges.get(id).ok_or(StorageError::EdgeNotFound(*id))?;
        if current.version != expected {
            return Err(StorageError::VersionConflict {
                edge: *id,
                expected,
                actual: current.version,
            });
        }
        Ok(())
    }
}

/// In-memory temporal graph store
#[derive(Clone, Default)]
pub struct InMemoryGraphStore {
    tables: Arc<RwLock<GraphTables>>,
}

impl InMemoryGraphStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get number of stored edges
    pub fn edge_count(&self) -> usize {
        self.tables.read().edges.len()
    }

    /// Get number of stored contradiction records
    pub fn contradiction_count(&self) -> usize {
        self.tables.read().contradictions.len()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn create_entity(&self, entity: Entity) -> Result<()> {
        self.tables.write().entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    async fn get_entity(&self, id: &EntityId) -> Result<Entity> {
        self.tables
            .read()
            .entities
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::EntityNotFound(id.clone()))
    }

    async fn insert_edge(&self, edge: TemporalEdge) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.edges.contains_key(&edge.id) {
            return Err(StorageError::DuplicateEdge(edge.id));
        }
        tables.by_key.entry(edge.key()).or_default().push(edge.id);
        tables.edges.insert(edge.id, edge);
        Ok(())
    }

    async fn get_edge(&self, id: &EdgeId) -> Result<TemporalEdge> {
        self.tables
            .read()
            .edges
            .get(id)
            .cloned()
            .ok_or(StorageError::EdgeNotFound(*id))
    }

    async fn edges_for(&self, key: &EdgeKey) -> Result<Vec<TemporalEdge>> {
        let tables = self.tables.read();
        let mut edges: Vec<TemporalEdge> = tables
            .by_key
            .get(key)
            .map(|ids| ids.iter().filter_map(|id| tables.edges.get(id).cloned()).collect())
            .unwrap_or_default();

        edges.sort_by(|a, b| a.valid_from.cmp(&b.valid_from).then_with(|| a.id.cmp(&b.id)));
        Ok(edges)
    }

    async fn update_edge(&self, mut edge: TemporalEdge, expected_version: u64) -> Result<TemporalEdge> {
        let mut tables = self.tables.write();
        tables.check_version(&edge.id, expected_version)?;

        edge.version = expected_version + 1;
        tables.edges.insert(edge.id, edge.clone());
        Ok(edge)
    }

    async fn is_multi_valued(&self, key: &EdgeKey) -> Result<bool> {
        Ok(self.tables.read().multi_valued.contains(key))
    }

    async fn insert_contradiction(&self, record: ContradictionRecord) -> Result<()> {
        self.tables.write().contradictions.insert(record.id, record);
        Ok(())
    }

    async fn insert_proposal(&self, edge: TemporalEdge, records: Vec<ContradictionRecord>) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.edges.contains_key(&edge.id) {
            return Err(StorageError::DuplicateEdge(edge.id));
        }

        for record in records {
            tables.contradictions.insert(record.id, record);
        }
        tables.by_key.entry(edge.key()).or_default().push(edge.id);
        tables.edges.insert(edge.id, edge);
        Ok(())
    }

    async fn get_contradiction(&self, id: &ContradictionId) -> Result<ContradictionRecord> {
        self.tables
            .read()
            .contradictions
            .get(id)
            .cloned()
            .ok_or(StorageError::ContradictionNotFound(*id))
    }

    async fn list_open_contradictions(&self) -> Result<Vec<ContradictionRecord>> {
        let mut open: Vec<ContradictionRecord> = self
            .tables
            .read()
            .contradictions
            .values()
            .filter(|record| record.is_open())
            .cloned()
            .collect();

        open.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(open)
    }

    async fn commit_resolution(&self, commit: ResolutionCommit) -> Result<()> {
        let mut tables = self.tables.write();

        // Validate everything before touching anything
        for write in &commit.edges {
            tables.check_version(&write.edge.id, write.expected_version)?;
        }
        for record in std::iter::once(&commit.record).chain(&commit.superseded) {
            let stored = tables
                .contradictions
                .get(&record.id)
                .ok_or(StorageError::ContradictionNotFound(record.id))?;
            if !stored.is_open() {
                return Err(StorageError::ContradictionClosed(record.id));
            }
        }

        for write in commit.edges {
            let mut edge = write.edge;
            edge.version = write.expected_version + 1;
            tables.edges.insert(edge.id, edge);
        }
        for record in std::iter::once(commit.record).chain(commit.superseded) {
            tables.contradictions.insert(record.id, record);
        }
        if let Some(key) = commit.multi_valued {
            tables.multi_valued.insert(key);
        }

        Ok(())
    }

    async fn restore(&self, snapshot: ResolutionSnapshot) -> Result<()> {
        let mut tables = self.tables.write();

        for mut edge in snapshot.edges {
            // Keep versions moving forward so stale readers still fail their CAS
            let current = tables
                .edges
                .get(&edge.id)
                .map(|e| e.version)
                .ok_or(StorageError::EdgeNotFound(edge.id))?;
            edge.version = current + 1;
            tables.edges.insert(edge.id, edge);
        }
        for record in snapshot.records {
            tables.contradictions.insert(record.id, record);
        }
        match snapshot.multi_valued {
            Some((key, true)) => {
                tables.multi_valued.insert(key);
            }
            Some((key, false)) => {
                tables.multi_valued.remove(&key);
            }
            None => {}
        }

        tracing::debug!("Restored resolution snapshot");
        Ok(())
    }

    async fn stats(&self) -> Result<StorageStats> {
        let tables = self.tables.read();
        Ok(StorageStats {
            total_entities: tables.entities.len() as u64,
            total_edges: tables.edges.len() as u64,
            total_contradictions: tables.contradictions.len() as u64,
            open_contradictions: tables.contradictions.values().filter(|r| r.is_open()).count() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EdgeWrite;
    use chrono::{DateTime, TimeZone, Utc};
    use tgr_core::{Claim, EdgeProposal, EdgeState, ResolutionStrategy, SourceId};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn edge(to: &str, secs: i64, state: EdgeState) -> TemporalEdge {
        let mut edge = TemporalEdge::from_proposal(&EdgeProposal {
            from: EntityId::new("alice"),
            predicate: "works_at".to_string(),
            to: to.to_string(),
            timestamp: at(secs),
            source_id: SourceId::new("hr-feed"),
            confidence: 0.9,
        });
        edge.state = state;
        edge
    }

    fn record_for(a: &TemporalEdge, b: &TemporalEdge) -> ContradictionRecord {
        let claim = |e: &TemporalEdge| Claim {
            edge_id: e.id,
            source_id: e.source_id.clone(),
            content: e.to.clone(),
            timestamp: e.valid_from,
        };
        ContradictionRecord::open(a.key(), claim(a), claim(b))
    }

    #[tokio::test]
    async fn test_entity_create_get() {
        let store = InMemoryGraphStore::new();
        let entity = Entity::new(EntityId::new("alice"), "Alice", "Person");

        store.create_entity(entity).await.unwrap();

        let fetched = store.get_entity(&EntityId::new("alice")).await.unwrap();
        assert_eq!(fetched.entity_type, "Person");
        assert!(store.get_entity(&EntityId::new("bob")).await.is_err());
    }

    #[tokio::test]
    async fn test_edges_for_key_sorted_by_valid_from() {
        let store = InMemoryGraphStore::new();
        store.insert_edge(edge("Globex", 2, EdgeState::Valid)).await.unwrap();
        store.insert_edge(edge("Acme", 1, EdgeState::Valid)).await.unwrap();

        let key = EdgeKey::new(EntityId::new("alice"), "works_at");
        let edges = store.edges_for(&key).await.unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].to, "Acme");
        assert_eq!(edges[1].to, "Globex");

        let other = EdgeKey::new(EntityId::new("alice"), "lives_in");
        assert!(store.edges_for(&other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_edge_rejected() {
        let store = InMemoryGraphStore::new();
        let e = edge("Acme", 1, EdgeState::Valid);
        store.insert_edge(e.clone()).await.unwrap();
        assert!(matches!(store.insert_edge(e).await, Err(StorageError::DuplicateEdge(_))));
    }

    #[tokio::test]
    async fn test_update_edge_compare_and_swap() {
        let store = InMemoryGraphStore::new();
        let mut e = edge("Acme", 1, EdgeState::Valid);
        store.insert_edge(e.clone()).await.unwrap();

        e.confidence = 0.5;
        let updated = store.update_edge(e.clone(), 0).await.unwrap();
        assert_eq!(updated.version, 1);

        // Stale version loses
        let result = store.update_edge(e, 0).await;
        assert!(matches!(
            result,
            Err(StorageError::VersionConflict { expected: 0, actual: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let store = InMemoryGraphStore::new();
        let a = edge("Acme", 1, EdgeState::Valid);
        let b = edge("Globex", 2, EdgeState::Proposed);
        store.insert_edge(a.clone()).await.unwrap();
        store.insert_edge(b.clone()).await.unwrap();
        let record = record_for(&a, &b);
        store.insert_contradiction(record.clone()).await.unwrap();

        let mut loser = a.clone();
        loser.state = EdgeState::Invalidated;
        let mut winner = b.clone();
        winner.state = EdgeState::Valid;
        let mut resolved = record.clone();
        resolved.mark_resolved(ResolutionStrategy::NewestWins, Utc::now());

        // Second write carries a stale version: nothing may be applied
        let commit = ResolutionCommit {
            edges: vec![
                EdgeWrite { edge: loser.clone(), expected_version: 0 },
                EdgeWrite { edge: winner.clone(), expected_version: 7 },
            ],
            record: resolved.clone(),
            superseded: Vec::new(),
            multi_valued: None,
        };
        assert!(store.commit_resolution(commit).await.is_err());
        assert_eq!(store.get_edge(&a.id).await.unwrap().state, EdgeState::Valid);
        assert!(store.get_contradiction(&record.id).await.unwrap().is_open());

        let commit = ResolutionCommit {
            edges: vec![
                EdgeWrite { edge: loser, expected_version: 0 },
                EdgeWrite { edge: winner, expected_version: 0 },
            ],
            record: resolved,
            superseded: Vec::new(),
            multi_valued: None,
        };
        store.commit_resolution(commit).await.unwrap();
        assert_eq!(store.get_edge(&a.id).await.unwrap().state, EdgeState::Invalidated);
        assert_eq!(store.get_edge(&b.id).await.unwrap().version, 1);
        assert!(store.list_open_contradictions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_proposal_is_all_or_nothing() {
        let store = InMemoryGraphStore::new();
        let a = edge("Acme", 1, EdgeState::Valid);
        let b = edge("Globex", 2, EdgeState::Proposed);
        store.insert_edge(a.clone()).await.unwrap();

        store.insert_proposal(b.clone(), vec![record_for(&a, &b)]).await.unwrap();
        assert_eq!(store.edge_count(), 2);
        assert_eq!(store.open_contradictions_for(&a.key()).await.unwrap().len(), 1);

        // Same edge again: neither the edge nor the new record lands
        let result = store.insert_proposal(b.clone(), vec![record_for(&a, &b)]).await;
        assert!(matches!(result, Err(StorageError::DuplicateEdge(_))));
        assert_eq!(store.edge_count(), 2);
        assert_eq!(store.contradiction_count(), 1);
    }

    #[tokio::test]
    async fn test_commit_rejects_closed_sibling() {
        let store = InMemoryGraphStore::new();
        let a = edge("Acme", 1, EdgeState::Valid);
        let b = edge("Globex", 2, EdgeState::Proposed);
        let c = edge("Initech", 3, EdgeState::Proposed);
        store.insert_edge(a.clone()).await.unwrap();
        store.insert_proposal(b.clone(), vec![record_for(&a, &b)]).await.unwrap();
        let main = record_for(&b, &c);
        let sibling = record_for(&a, &c);
        store.insert_proposal(c.clone(), vec![main.clone(), sibling.clone()]).await.unwrap();

        let mut closed_sibling = sibling.clone();
        closed_sibling.mark_resolved(ResolutionStrategy::NewestWins, Utc::now());
        store
            .commit_resolution(ResolutionCommit {
                edges: Vec::new(),
                record: closed_sibling.clone(),
                superseded: Vec::new(),
                multi_valued: None,
            })
            .await
            .unwrap();

        let mut resolved = main.clone();
        resolved.mark_resolved(ResolutionStrategy::NewestWins, Utc::now());
        let result = store
            .commit_resolution(ResolutionCommit {
                edges: Vec::new(),
                record: resolved,
                superseded: vec![closed_sibling],
                multi_valued: None,
            })
            .await;
        assert!(matches!(result, Err(StorageError::ContradictionClosed(id)) if id == sibling.id));
        assert!(store.get_contradiction(&main.id).await.unwrap().is_open());
    }

    #[tokio::test]
    async fn test_restore_rolls_back_and_bumps_version() {
        let store = InMemoryGraphStore::new();
        let a = edge("Acme", 1, EdgeState::Valid);
        let b = edge("Globex", 2, EdgeState::Valid);
        store.insert_edge(a.clone()).await.unwrap();
        store.insert_edge(b.clone()).await.unwrap();
        let record = record_for(&a, &b);
        store.insert_contradiction(record.clone()).await.unwrap();

        let mut merged_a = a.clone();
        merged_a.state = EdgeState::MergedValid;
        let mut resolved = record.clone();
        resolved.mark_resolved(ResolutionStrategy::Merge, Utc::now());
        store
            .commit_resolution(ResolutionCommit {
                edges: vec![EdgeWrite { edge: merged_a, expected_version: 0 }],
                record: resolved,
                superseded: Vec::new(),
                multi_valued: Some(a.key()),
            })
            .await
            .unwrap();
        assert!(store.is_multi_valued(&a.key()).await.unwrap());

        store
            .restore(ResolutionSnapshot {
                edges: vec![a.clone()],
                records: vec![record.clone()],
                multi_valued: Some((a.key(), false)),
            })
            .await
            .unwrap();

        let restored = store.get_edge(&a.id).await.unwrap();
        assert_eq!(restored.state, EdgeState::Valid);
        assert_eq!(restored.version, 2);
        assert!(!store.is_multi_valued(&a.key()).await.unwrap());
        assert!(store.get_contradiction(&record.id).await.unwrap().is_open());
    }

    #[tokio::test]
    async fn test_valid_edges_at() {
        let store = InMemoryGraphStore::new();
        let mut a = edge("Acme", 1, EdgeState::SplitValid);
        a.valid_to = Some(at(2));
        let b = edge("Globex", 2, EdgeState::Valid);
        store.insert_edge(a).await.unwrap();
        store.insert_edge(b).await.unwrap();

        let key = EdgeKey::new(EntityId::new("alice"), "works_at");
        let at_one = store.valid_edges_at(&key, at(1)).await.unwrap();
        assert_eq!(at_one.len(), 1);
        assert_eq!(at_one[0].to, "Acme");

        let at_three = store.valid_edges_at(&key, at(3)).await.unwrap();
        assert_eq!(at_three.len(), 1);
        assert_eq!(at_three[0].to, "Globex");

        let live = store.live_edges(&key).await.unwrap();
        assert_eq!(live.len(), 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = InMemoryGraphStore::new();
        let a = edge("Acme", 1, EdgeState::Valid);
        let b = edge("Globex", 2, EdgeState::Proposed);
        store.insert_edge(a.clone()).await.unwrap();
        store.insert_edge(b.clone()).await.unwrap();
        store.insert_contradiction(record_for(&a, &b)).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_edges, 2);
        assert_eq!(stats.open_contradictions, 1);
        assert_eq!(store.edge_count(), 2);
        assert_eq!(store.contradiction_count(), 1);
    }
}
