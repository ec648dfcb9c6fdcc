//! Strategy-driven contradiction resolution
//!
//! A resolution re-reads the record and both edges under the key lock, plans
//! the post-resolution edges with the strategy handler, commits edges and
//! record atomically with compare-and-swap on every edge version, then appends
//! the audit entry. If the audit append fails the commit is undone, so an
//! applied resolution always has exactly one audit entry.
//!
//! Resolutions may arrive in any order. A claim already settled by an earlier
//! resolution keeps its state; a single-valued key is left with one `Valid`
//! edge, and other open records on the key whose claims are all settled are
//! closed as superseded in the same commit.

use crate::audit::AuditLog;
use crate::locks::KeyLocks;
use crate::strategies::{close_superseded, handler_for, ClaimPair};
use crate::types::{ResolutionOutcome, ResolutionStats};
use crate::{ResolverError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tgr_core::{
    AuditEntry, ContradictionId, ContradictionRecord, EdgeId, EdgeState, ResolutionStrategy, TemporalEdge,
};
use tgr_storage::{EdgeWrite, GraphStore, ResolutionCommit, ResolutionSnapshot, StorageError};
use tracing::{debug, error, info, warn};

const MAX_ATTEMPTS: u32 = 2;

pub struct ContradictionResolver {
    store: Arc<dyn GraphStore>,
    audit: Arc<dyn AuditLog>,
    locks: Arc<KeyLocks>,
    stats: RwLock<ResolutionStats>,
}

impl ContradictionResolver {
    pub fn new(store: Arc<dyn GraphStore>, audit: Arc<dyn AuditLog>, locks: Arc<KeyLocks>) -> Self {
        Self {
            store,
            audit,
            locks,
            stats: RwLock::new(ResolutionStats::default()),
        }
    }

    /// Resolve an open contradiction with an explicit strategy
    pub async fn resolve(&self, id: &ContradictionId, strategy: ResolutionStrategy) -> Result<ResolutionOutcome> {
        let start_time = Instant::now();
        let result = self.resolve_locked(id, strategy).await;
        let duration = start_time.elapsed();

        let mut stats = self.stats.write();
        stats.record_resolution(strategy, result.as_ref().ok(), duration);
        match &result {
            Err(ResolverError::ResolutionConflict { .. }) => stats.conflicts += 1,
            Err(ResolverError::StorageWriteFailure { .. }) => stats.failures += 1,
            _ => {}
        }

        result
    }

    /// Administrative entry point taking the strategy by its configuration name
    pub async fn force_resolve(&self, id: &ContradictionId, strategy: &str) -> Result<ResolutionOutcome> {
        let strategy: ResolutionStrategy = strategy
            .parse()
            .map_err(|e: tgr_core::TgrError| ResolverError::Configuration(e.to_string()))?;
        warn!(contradiction = %id, strategy = %strategy, "Forcing resolution");
        self.resolve(id, strategy).await
    }

    pub async fn list_open(&self) -> Result<Vec<ContradictionRecord>> {
        Ok(self.store.list_open_contradictions().await?)
    }

    /// Resolve every open contradiction, oldest first. Failures are reported
    /// per record and do not stop the sweep.
    pub async fn resolve_all_open(
        &self,
        strategy: ResolutionStrategy,
    ) -> Result<Vec<(ContradictionId, Result<ResolutionOutcome>)>> {
        let open = self.list_open().await?;
        let mut results = Vec::with_capacity(open.len());
        for record in open {
            let outcome = self.resolve(&record.id, strategy).await;
            if let Err(err) = &outcome {
                warn!(contradiction = %record.id, error = %err, "Resolution failed during sweep");
            }
            results.push((record.id, outcome));
        }
        Ok(results)
    }

    pub async fn audit_trail(&self, id: &ContradictionId) -> Vec<AuditEntry> {
        self.audit.entries_for(id).await
    }

    pub fn get_stats(&self) -> ResolutionStats {
        self.stats.read().clone()
    }

    async fn resolve_locked(&self, id: &ContradictionId, strategy: ResolutionStrategy) -> Result<ResolutionOutcome> {
        let key = self.store.get_contradiction(id).await?.key;
        let _guard = self.locks.lock(&key).await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_resolve(id, strategy).await {
                Err(ResolverError::Storage(err)) if err.is_conflict() => {
                    if attempt < MAX_ATTEMPTS {
                        debug!(contradiction = %id, error = %err, "Version conflict, retrying with fresh state");
                        continue;
                    }
                    warn!(contradiction = %id, error = %err, "Version conflict persisted after retry");
                    return Err(ResolverError::ResolutionConflict { contradiction: *id });
                }
                other => return other,
            }
        }
    }

    async fn try_resolve(&self, id: &ContradictionId, strategy: ResolutionStrategy) -> Result<ResolutionOutcome> {
        let record = self.store.get_contradiction(id).await?;

        if !record.is_open() {
            return match record.resolution_strategy {
                Some(existing) if existing != strategy => Err(ResolverError::AlreadyResolved {
                    contradiction: *id,
                    strategy: existing,
                }),
                _ => {
                    debug!(contradiction = %id, strategy = %strategy, "Already resolved, nothing to do");
                    Ok(ResolutionOutcome::AlreadyResolved)
                }
            };
        }

        let (existing_id, incoming_id) = match record.claims.as_slice() {
            [existing, incoming] => (existing.edge_id, incoming.edge_id),
            claims => {
                return Err(ResolverError::Inapplicable {
                    contradiction: *id,
                    reason: format!("expected two claims, found {}", claims.len()),
                })
            }
        };
        let handler = handler_for(strategy)
            .ok_or_else(|| ResolverError::Configuration(format!("no handler registered for {}", strategy)))?;

        let edges = self.store.edges_for(&record.key).await?;
        let pair = ClaimPair::new(find_edge(&edges, existing_id)?, find_edge(&edges, incoming_id)?);
        let now = Utc::now();
        let mut resolved = record.clone();
        resolved.mark_resolved(strategy, now);

        if (handler.is_satisfied)(&pair) {
            let superseded = supersede(self.settled_siblings(&record, &edges).await?, strategy, now);
            let count = superseded.len();
            self.store
                .commit_resolution(ResolutionCommit {
                    edges: Vec::new(),
                    record: resolved,
                    superseded,
                    multi_valued: None,
                })
                .await
                .map_err(|e| write_failure(id, e))?;
            debug!(
                contradiction = %id,
                strategy = %strategy,
                superseded = count,
                "Edges already consistent, record closed"
            );
            return Ok(ResolutionOutcome::AlreadyConsistent);
        }

        let plan = (handler.plan)(&pair).map_err(|reason| ResolverError::Inapplicable {
            contradiction: *id,
            reason,
        })?;

        // Post-resolution view of every edge on the key
        let mut after = edges.clone();
        for planned in [plan.earlier, plan.later] {
            let Some(slot) = after.iter_mut().find(|edge| edge.id == planned.id) else {
                continue;
            };
            // Settled by an earlier resolution; the strategy applies to the other claim
            if slot.state.is_terminal() {
                continue;
            }
            if !slot.state.can_transition_to(planned.state) {
                return Err(ResolverError::InvalidTransition {
                    contradiction: *id,
                    edge: slot.id,
                    from: slot.state,
                    to: planned.state,
                });
            }
            *slot = planned;
        }

        let was_multi_valued = self.store.is_multi_valued(&record.key).await?;
        if !was_multi_valued && !plan.multi_valued {
            keep_single_valid(&mut after, pair.later.id, strategy);
        }

        let mut writes = Vec::new();
        let mut before_images = Vec::new();
        for (before, edge) in edges.iter().zip(&after) {
            if before == edge {
                continue;
            }
            before_images.push(before.clone());
            writes.push(EdgeWrite {
                expected_version: before.version,
                edge: edge.clone(),
            });
        }

        let siblings = self.settled_siblings(&record, &after).await?;
        let superseded_ids: Vec<ContradictionId> = siblings.iter().map(|r| r.id).collect();

        let multi_valued = plan.multi_valued.then(|| (record.key.clone(), was_multi_valued));
        let mut edge_ids = record.edge_ids();
        for write in &writes {
            if !edge_ids.contains(&write.edge.id) {
                edge_ids.push(write.edge.id);
            }
        }

        let mut before_records = vec![record.clone()];
        before_records.extend(siblings.iter().cloned());
        let snapshot = ResolutionSnapshot {
            edges: before_images,
            records: before_records,
            multi_valued: multi_valued.clone(),
        };
        let commit = ResolutionCommit {
            edges: writes,
            record: resolved,
            superseded: supersede(siblings, strategy, now),
            multi_valued: multi_valued.map(|(key, _)| key),
        };

        self.store
            .commit_resolution(commit)
            .await
            .map_err(|e| write_failure(id, e))?;

        let entry = AuditEntry::new(*id, edge_ids, strategy).with_superseded(superseded_ids);
        if let Err(err) = self.audit.append(entry.clone()).await {
            warn!(contradiction = %id, error = %err, "Audit append failed, rolling back resolution");
            if let Err(restore_err) = self.store.restore(snapshot).await {
                error!(contradiction = %id, error = %restore_err, "Rollback failed");
            }
            return Err(ResolverError::StorageWriteFailure {
                contradiction: *id,
                reason: err.to_string(),
            });
        }

        let edges = vec![
            self.store.get_edge(&pair.earlier.id).await?,
            self.store.get_edge(&pair.later.id).await?,
        ];

        info!(
            contradiction = %id,
            key = %record.key,
            strategy = %strategy,
            superseded = entry.superseded.len(),
            "Resolution applied"
        );

        Ok(ResolutionOutcome::Applied { audit: entry, edges })
    }

    /// Other open records on the key whose claims no longer wait on a resolution
    async fn settled_siblings(
        &self,
        record: &ContradictionRecord,
        edges: &[TemporalEdge],
    ) -> Result<Vec<ContradictionRecord>> {
        let siblings = self.store.open_contradictions_for(&record.key).await?;

        Ok(siblings
            .into_iter()
            .filter(|sibling| sibling.id != record.id)
            .filter(|sibling| {
                sibling.claims.iter().all(|claim| {
                    edges
                        .iter()
                        .find(|edge| edge.id == claim.edge_id)
                        .map_or(false, |edge| edge.state != EdgeState::Proposed)
                })
            })
            .collect())
    }
}

fn supersede(
    siblings: Vec<ContradictionRecord>,
    strategy: ResolutionStrategy,
    at: DateTime<Utc>,
) -> Vec<ContradictionRecord> {
    siblings
        .into_iter()
        .map(|mut sibling| {
            sibling.mark_superseded(strategy, at);
            sibling
        })
        .collect()
}

fn find_edge(edges: &[TemporalEdge], id: EdgeId) -> Result<TemporalEdge> {
    edges
        .iter()
        .find(|edge| edge.id == id)
        .cloned()
        .ok_or(ResolverError::Storage(StorageError::EdgeNotFound(id)))
}

/// A single-valued key holds at most one `Valid` edge: the newest one stays,
/// older ones are closed where the next surviving value starts
fn keep_single_valid(edges: &mut [TemporalEdge], preferred: EdgeId, strategy: ResolutionStrategy) {
    let Some(winner) = edges
        .iter()
        .filter(|edge| edge.state == EdgeState::Valid)
        .max_by(|a, b| {
            a.valid_from
                .cmp(&b.valid_from)
                .then_with(|| (a.id == preferred).cmp(&(b.id == preferred)))
                .then_with(|| a.id.cmp(&b.id))
        })
        .cloned()
    else {
        return;
    };

    let snapshot = edges.to_vec();
    for edge in edges.iter_mut() {
        if edge.state != EdgeState::Valid || edge.id == winner.id {
            continue;
        }
        let successor = snapshot
            .iter()
            .filter(|other| other.id != edge.id && other.valid_from > edge.valid_from)
            .filter(|other| {
                matches!(
                    other.state,
                    EdgeState::Valid | EdgeState::SplitValid | EdgeState::MergedValid
                )
            })
            .min_by(|a, b| a.valid_from.cmp(&b.valid_from))
            .unwrap_or(&winner);

        debug!(edge = %edge.id, successor = %successor.id, "Closing displaced value");
        *edge = close_superseded(edge, successor, strategy);
    }
}

/// Conflicts pass through for the retry loop; anything else is a write failure
fn write_failure(id: &ContradictionId, err: StorageError) -> ResolverError {
    if err.is_conflict() {
        ResolverError::Storage(err)
    } else {
        ResolverError::StorageWriteFailure {
            contradiction: *id,
            reason: err.to_string(),
        }
    }
}
