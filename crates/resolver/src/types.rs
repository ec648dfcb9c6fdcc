//! Types for contradiction detection and resolution

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tgr_core::{AuditEntry, ContradictionRecord, ResolutionStrategy, TemporalEdge};

/// What ingestion did with a proposed fact
#[derive(Debug, Clone)]
pub enum Detection {
    /// The fact restated a live edge; that edge's confidence was updated
    Reinforced { edge: TemporalEdge },

    /// The fact disagreed with existing claims; it is stored as `Proposed`
    Contradicted {
        edge: TemporalEdge,
        records: Vec<ContradictionRecord>,
    },

    /// No conflicting claim; the fact was stored as a live edge
    Accepted { edge: TemporalEdge },
}

impl Detection {
    pub fn edge(&self) -> &TemporalEdge {
        match self {
            Self::Reinforced { edge } | Self::Contradicted { edge, .. } | Self::Accepted { edge } => edge,
        }
    }

    pub fn records(&self) -> &[ContradictionRecord] {
        match self {
            Self::Contradicted { records, .. } => records,
            _ => &[],
        }
    }
}

/// Result of a resolve call
#[derive(Debug, Clone)]
pub enum ResolutionOutcome {
    /// Edges were rewritten and an audit entry appended
    Applied {
        audit: AuditEntry,
        edges: Vec<TemporalEdge>,
    },

    /// The record was already resolved with the requested strategy
    AlreadyResolved,

    /// Edge states already matched the strategy; the record was closed without
    /// touching edges or the audit log
    AlreadyConsistent,
}

impl ResolutionOutcome {
    pub fn is_noop(&self) -> bool {
        !matches!(self, Self::Applied { .. })
    }
}

/// Statistics about contradiction handling
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ResolutionStats {
    /// Resolve calls, whatever their outcome
    pub total_resolutions: u64,

    /// Resolutions that rewrote edges
    pub applied: u64,

    /// Resolutions that found nothing to do
    pub noops: u64,

    /// Resolutions that gave up after a lost compare-and-swap
    pub conflicts: u64,

    /// Resolutions rolled back after a write failure
    pub failures: u64,

    /// Average resolution time in microseconds
    pub avg_resolution_time_us: u64,

    /// Applied resolutions by strategy name
    pub by_strategy: HashMap<String, u64>,
}

impl ResolutionStats {
    pub(crate) fn record_resolution(
        &mut self,
        strategy: ResolutionStrategy,
        outcome: Option<&ResolutionOutcome>,
        duration: Duration,
    ) {
        self.total_resolutions += 1;

        match outcome {
            Some(ResolutionOutcome::Applied { .. }) => {
                self.applied += 1;
                *self.by_strategy.entry(strategy.to_string()).or_insert(0) += 1;
            }
            Some(_) => self.noops += 1,
            None => {}
        }

        let new_time = duration.as_micros() as u64;
        let total_time = self.avg_resolution_time_us * (self.total_resolutions - 1);
        self.avg_resolution_time_us = (total_time + new_time) / self.total_resolutions;
    }
}
