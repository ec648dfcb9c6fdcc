//! Contradiction records, resolution strategies and audit entries

use crate::types::{ContradictionId, EdgeId, EdgeKey, SourceId};
use crate::TgrError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Strategy for resolving a contradiction between two edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// The later fact is valid, the earlier one is invalidated
    NewestWins,

    /// Both facts are co-valid; the key becomes multi-valued
    Merge,

    /// The fact changed over time: the earlier window closes where the later opens
    SplitTimeline,
}

const STRATEGY_TABLE: &[(&str, ResolutionStrategy)] = &[
    ("newest_wins", ResolutionStrategy::NewestWins),
    ("merge", ResolutionStrategy::Merge),
    ("split_timeline", ResolutionStrategy::SplitTimeline),
];

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewestWins => "newest_wins",
            Self::Merge => "merge",
            Self::SplitTimeline => "split_timeline",
        }
    }

    /// All accepted configuration names
    pub fn names() -> impl Iterator<Item = &'static str> {
        STRATEGY_TABLE.iter().map(|(name, _)| *name)
    }
}

impl FromStr for ResolutionStrategy {
    type Err = TgrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        STRATEGY_TABLE
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, strategy)| *strategy)
            .ok_or_else(|| TgrError::Configuration(format!("unknown resolution strategy: {}", s)))
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContradictionStatus {
    Open,
    Resolved,

    /// Closed by another resolution on the same key that settled every claim
    Superseded,
}

/// One side of a contradiction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub edge_id: EdgeId,
    pub source_id: SourceId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Two edges sharing a key with dissimilar objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionRecord {
    pub id: ContradictionId,
    pub key: EdgeKey,

    /// Existing claim first, incoming claim second
    pub claims: Vec<Claim>,

    pub status: ContradictionStatus,
    pub resolution_strategy: Option<ResolutionStrategy>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ContradictionRecord {
    pub fn open(key: EdgeKey, existing: Claim, incoming: Claim) -> Self {
        Self {
            id: ContradictionId::new(),
            key,
            claims: vec![existing, incoming],
            status: ContradictionStatus::Open,
            resolution_strategy: None,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == ContradictionStatus::Open
    }

    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.claims.iter().map(|c| c.edge_id).collect()
    }

    pub fn mark_resolved(&mut self, strategy: ResolutionStrategy, at: DateTime<Utc>) {
        self.status = ContradictionStatus::Resolved;
        self.resolution_strategy = Some(strategy);
        self.resolved_at = Some(at);
    }

    pub fn mark_superseded(&mut self, strategy: ResolutionStrategy, at: DateTime<Utc>) {
        self.mark_resolved(strategy, at);
        self.status = ContradictionStatus::Superseded;
    }
}

/// Append-only record of an applied resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub contradiction_id: ContradictionId,
    pub edge_ids: Vec<EdgeId>,
    pub strategy: ResolutionStrategy,

    /// Sibling records on the same key closed by this resolution
    #[serde(default)]
    pub superseded: Vec<ContradictionId>,

    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(contradiction_id: ContradictionId, edge_ids: Vec<EdgeId>, strategy: ResolutionStrategy) -> Self {
        Self {
            id: Uuid::now_v7(),
            contradiction_id,
            edge_ids,
            strategy,
            superseded: Vec::new(),
            recorded_at: Utc::now(),
        }
    }

    pub fn with_superseded(mut self, superseded: Vec<ContradictionId>) -> Self {
        self.superseded = superseded;
        self
    }

    /// Whether this entry closed `id`, directly or as a sibling
    pub fn covers(&self, id: &ContradictionId) -> bool {
        self.contradiction_id == *id || self.superseded.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_lookup() {
        assert_eq!("newest_wins".parse::<ResolutionStrategy>().unwrap(), ResolutionStrategy::NewestWins);
        assert_eq!(" Merge ".parse::<ResolutionStrategy>().unwrap(), ResolutionStrategy::Merge);
        assert_eq!(
            "split_timeline".parse::<ResolutionStrategy>().unwrap(),
            ResolutionStrategy::SplitTimeline
        );
        assert!(matches!(
            "keep_oldest".parse::<ResolutionStrategy>(),
            Err(TgrError::Configuration(_))
        ));
    }

    #[test]
    fn test_strategy_names_round_trip() {
        for name in ResolutionStrategy::names() {
            let strategy: ResolutionStrategy = name.parse().unwrap();
            assert_eq!(strategy.as_str(), name);
        }
    }

    #[test]
    fn test_superseded_record_is_closed() {
        let claim = |content: &str| Claim {
            edge_id: EdgeId::new(),
            source_id: SourceId::new("hr-feed"),
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        let key = EdgeKey::new(crate::EntityId::new("alice"), "works_at");
        let mut record = ContradictionRecord::open(key, claim("Acme"), claim("Globex"));
        record.mark_superseded(ResolutionStrategy::NewestWins, Utc::now());

        assert!(!record.is_open());
        assert_eq!(record.status, ContradictionStatus::Superseded);
        assert_eq!(record.resolution_strategy, Some(ResolutionStrategy::NewestWins));

        let entry = AuditEntry::new(ContradictionId::new(), record.edge_ids(), ResolutionStrategy::NewestWins)
            .with_superseded(vec![record.id]);
        assert!(entry.covers(&record.id));
        assert!(entry.covers(&entry.contradiction_id));
    }

    #[test]
    fn test_strategy_serde_uses_config_names() {
        let json = serde_json::to_string(&ResolutionStrategy::SplitTimeline).unwrap();
        assert_eq!(json, "\"split_timeline\"");
    }
}
