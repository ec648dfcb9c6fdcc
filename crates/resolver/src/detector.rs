//! Ingestion-time contradiction detection

use crate::locks::KeyLocks;
use crate::similarity::{NormalizedLevenshtein, ObjectSimilarity, DEFAULT_SIMILARITY_THRESHOLD};
use crate::types::Detection;
use crate::{ResolverError, Result};
use std::sync::Arc;
use tgr_core::{Claim, ContradictionRecord, EdgeProposal, EdgeState, TemporalEdge};
use tgr_storage::GraphStore;
use tracing::{debug, info};

const MAX_ATTEMPTS: u32 = 2;

/// Compares proposed facts against the claims already held for their key
pub struct ContradictionDetector {
    store: Arc<dyn GraphStore>,
    locks: Arc<KeyLocks>,
    similarity: Arc<dyn ObjectSimilarity>,
    threshold: f32,
}

impl ContradictionDetector {
    pub fn new(store: Arc<dyn GraphStore>, locks: Arc<KeyLocks>) -> Self {
        Self {
            store,
            locks,
            similarity: Arc::new(NormalizedLevenshtein),
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn ObjectSimilarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Check a proposed fact and persist whatever it turns into.
    ///
    /// Runs under the key lock so detection never interleaves with a
    /// resolution on the same (from, predicate).
    pub async fn detect(&self, proposal: &EdgeProposal) -> Result<Detection> {
        validate_proposal(proposal)?;

        let key = proposal.key();
        let _guard = self.locks.lock(&key).await;

        let mut attempt = 0;
        loop {
            attempt += 1;

            let edges = self.store.edges_for(&key).await?;
            // Live values plus claims still waiting on a resolution
            let claims: Vec<&TemporalEdge> = edges
                .iter()
                .filter(|edge| edge.state.is_live() || edge.state == EdgeState::Proposed)
                .collect();

            let best_match = claims
                .iter()
                .map(|edge| (*edge, self.similarity.similarity(&edge.to, &proposal.to)))
                .filter(|(_, score)| *score >= self.threshold)
                .max_by(|a, b| a.1.total_cmp(&b.1));

            if let Some((existing, score)) = best_match {
                let mut reinforced = existing.clone();
                reinforced.reinforce(proposal.confidence);

                match self.store.update_edge(reinforced, existing.version).await {
                    Ok(stored) => {
                        debug!(
                            key = %key,
                            edge = %stored.id,
                            similarity = score,
                            confidence = stored.confidence,
                            "Fact reinforced existing edge"
                        );
                        return Ok(Detection::Reinforced { edge: stored });
                    }
                    Err(err) if err.is_conflict() && attempt < MAX_ATTEMPTS => {
                        debug!(key = %key, error = %err, "Reinforcement lost a version race, retrying");
                        continue;
                    }
                    Err(err) => return Err(ResolverError::Storage(err)),
                }
            }

            let mut edge = TemporalEdge::from_proposal(proposal);

            if self.store.is_multi_valued(&key).await? {
                edge.state = EdgeState::MergedValid;
                self.store.insert_edge(edge.clone()).await?;
                debug!(key = %key, edge = %edge.id, "Fact accepted on multi-valued key");
                return Ok(Detection::Accepted { edge });
            }

            if claims.is_empty() {
                edge.state = EdgeState::Valid;
                self.store.insert_edge(edge.clone()).await?;
                debug!(key = %key, edge = %edge.id, "Fact accepted");
                return Ok(Detection::Accepted { edge });
            }

            let records: Vec<ContradictionRecord> = claims
                .iter()
                .map(|existing| ContradictionRecord::open(key.clone(), claim_of(existing), claim_of(&edge)))
                .collect();
            self.store.insert_proposal(edge.clone(), records.clone()).await?;

            info!(
                key = %key,
                edge = %edge.id,
                contradictions = records.len(),
                "Contradiction detected"
            );
            return Ok(Detection::Contradicted { edge, records });
        }
    }
}

fn claim_of(edge: &TemporalEdge) -> Claim {
    Claim {
        edge_id: edge.id,
        source_id: edge.source_id.clone(),
        content: edge.to.clone(),
        timestamp: edge.valid_from,
    }
}

fn validate_proposal(proposal: &EdgeProposal) -> Result<()> {
    if proposal.from.as_str().trim().is_empty() {
        return Err(ResolverError::InvalidProposal("empty subject".to_string()));
    }
    if proposal.predicate.trim().is_empty() {
        return Err(ResolverError::InvalidProposal("empty predicate".to_string()));
    }
    if !proposal.confidence.is_finite() {
        return Err(ResolverError::InvalidProposal(format!(
            "confidence must be finite, got {}",
            proposal.confidence
        )));
    }
    Ok(())
}
