//! Entities and time-versioned edges of the knowledge graph

use crate::types::{EdgeId, EdgeKey, EntityId, SourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A node of the knowledge graph. Owned by the store, read for context only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub entity_type: String,
    pub attributes: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(id: EntityId, name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            entity_type: entity_type.into(),
            attributes: HashMap::new(),
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle of a temporal edge.
///
/// `Proposed -> Valid -> {Invalidated | SplitValid | MergedValid}`. The three
/// terminal states never move into each other; reverting one is a manual
/// administrative operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeState {
    /// Stored during ingestion, waiting on a contradiction to be resolved
    Proposed,

    /// The single current value for its key
    Valid,

    /// Superseded by a newer fact; kept for history
    Invalidated,

    /// Valid for a closed window that ended when a later fact took over
    SplitValid,

    /// Co-valid with other values of a multi-valued key
    MergedValid,
}

impl EdgeState {
    /// States that count as a current value for contradiction checks
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Valid | Self::MergedValid)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalidated | Self::SplitValid | Self::MergedValid)
    }

    /// Whether `next` is reachable from `self` without a manual override.
    ///
    /// A proposed edge may be validated and moved to a terminal state within
    /// the same resolution commit, so `Proposed` reaches every other state.
    pub fn can_transition_to(&self, next: EdgeState) -> bool {
        if *self == next {
            return true;
        }
        match self {
            Self::Proposed => true,
            Self::Valid => next.is_terminal(),
            Self::Invalidated | Self::SplitValid | Self::MergedValid => false,
        }
    }
}

/// A fact proposed during ingestion, before it becomes an edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeProposal {
    pub from: EntityId,
    pub predicate: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
    pub source_id: SourceId,
    pub confidence: f32,
}

impl EdgeProposal {
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.from.clone(), self.predicate.clone())
    }
}

/// A relationship fact annotated with a half-open validity window
/// `[valid_from, valid_to)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalEdge {
    pub id: EdgeId,
    pub from: EntityId,
    pub predicate: String,
    pub to: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub invalidated_at: Option<DateTime<Utc>>,
    pub confidence: f32,
    pub source_id: SourceId,
    pub state: EdgeState,

    /// Bumped on every write; used for compare-and-swap updates
    pub version: u64,

    /// Number of observations folded into `confidence`
    pub evidence_count: u32,

    pub created_at: DateTime<Utc>,
}

impl TemporalEdge {
    /// Create a proposed edge from an ingestion proposal
    pub fn from_proposal(proposal: &EdgeProposal) -> Self {
        Self {
            id: EdgeId::new(),
            from: proposal.from.clone(),
            predicate: proposal.predicate.clone(),
            to: proposal.to.clone(),
            valid_from: proposal.timestamp,
            valid_to: None,
            invalidated_at: None,
            confidence: proposal.confidence.clamp(0.0, 1.0),
            source_id: proposal.source_id.clone(),
            state: EdgeState::Proposed,
            version: 0,
            evidence_count: 1,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.from.clone(), self.predicate.clone())
    }

    /// Earliest of `valid_to` and `invalidated_at`
    pub fn effective_end(&self) -> Option<DateTime<Utc>> {
        match (self.valid_to, self.invalidated_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Whether the fact held at `at`. Proposed edges never count.
    pub fn was_valid_at(&self, at: DateTime<Utc>) -> bool {
        if self.state == EdgeState::Proposed {
            return false;
        }
        self.valid_from <= at && self.effective_end().map_or(true, |end| at < end)
    }

    /// Whether the validity windows of two edges intersect
    pub fn overlaps(&self, other: &TemporalEdge) -> bool {
        let self_before_other = self.effective_end().map_or(false, |end| end <= other.valid_from);
        let other_before_self = other.effective_end().map_or(false, |end| end <= self.valid_from);
        !(self_before_other || other_before_self)
    }

    /// Fold a new observation into the confidence as an evidence-weighted mean
    pub fn reinforce(&mut self, confidence: f32) {
        let n = self.evidence_count as f32;
        self.confidence = ((self.confidence * n + confidence.clamp(0.0, 1.0)) / (n + 1.0)).clamp(0.0, 1.0);
        self.evidence_count += 1;
    }
}
