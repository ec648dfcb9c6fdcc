//! Command implementations for the `tgr` administrative CLI
//!
//! Each command reads a JSON document, drives the engine, and returns a
//! serializable report that the binary prints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tgr_core::{
    AuditEntry, ContradictionId, ContradictionRecord, EdgeKey, EdgeProposal, EntityId,
    ResolutionStrategy, SourceId, TemporalEdge,
};
use tgr_manager::{EngineConfig, Result, TemporalEngine};
use tgr_resolver::{Detection, ResolutionOutcome};
use tgr_search::{fuse, FusedResult, RankedList, RerankStrategy, RetrievedHit};

fn default_weight() -> f64 {
    1.0
}

fn default_confidence() -> f32 {
    1.0
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HitDto {
    pub id: String,
    #[serde(default)]
    pub score: f32,
}

/// One retriever's output, best first
#[derive(Debug, Serialize, Deserialize)]
pub struct RankedListDto {
    pub source: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub min_score: Option<f32>,
    pub hits: Vec<HitDto>,
}

/// Input of `tgr fuse`: lists in priority order
#[derive(Debug, Serialize, Deserialize)]
pub struct FuseRequest {
    pub lists: Vec<RankedListDto>,
}

/// A fact to replay through ingestion
#[derive(Debug, Serialize, Deserialize)]
pub struct FactDto {
    pub from: String,
    pub predicate: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

impl From<FactDto> for EdgeProposal {
    fn from(fact: FactDto) -> Self {
        EdgeProposal {
            from: EntityId::new(fact.from),
            predicate: fact.predicate,
            to: fact.to,
            timestamp: fact.timestamp,
            source_id: SourceId::new(fact.source_id),
            confidence: fact.confidence,
        }
    }
}

/// Input of `tgr ingest`: facts in arrival order
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestRequest {
    pub facts: Vec<FactDto>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionKind {
    Accepted,
    Reinforced,
    Contradicted,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub key: EdgeKey,
    pub to: String,
    pub edge_id: String,
    pub kind: DetectionKind,
    pub contradictions: Vec<ContradictionId>,
}

impl From<&Detection> for DetectionSummary {
    fn from(detection: &Detection) -> Self {
        let edge = detection.edge();
        let kind = match detection {
            Detection::Accepted { .. } => DetectionKind::Accepted,
            Detection::Reinforced { .. } => DetectionKind::Reinforced,
            Detection::Contradicted { .. } => DetectionKind::Contradicted,
        };
        Self {
            key: edge.key(),
            to: edge.to.clone(),
            edge_id: edge.id.to_string(),
            kind,
            contradictions: detection.records().iter().map(|r| r.id).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolutionSummary {
    pub contradiction: ContradictionId,
    pub strategy: ResolutionStrategy,

    /// `applied`, `already_resolved`, `already_consistent`, or `failed`
    pub outcome: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output of `tgr ingest`
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestReport {
    pub detections: Vec<DetectionSummary>,
    pub resolutions: Vec<ResolutionSummary>,
    pub edges: Vec<TemporalEdge>,
    pub open_contradictions: Vec<ContradictionRecord>,
    pub audit: Vec<AuditEntry>,
}

/// Output of `tgr strategies`
#[derive(Debug, Serialize, Deserialize)]
pub struct StrategyListing {
    pub resolution: Vec<String>,
    pub rerank: Vec<String>,
}

/// Fuse the lists with the configured RRF parameters
pub fn run_fuse(config: &EngineConfig, request: FuseRequest) -> Result<Vec<FusedResult>> {
    let rrf = config.rrf_config()?;
    let lists: Vec<RankedList> = request
        .lists
        .into_iter()
        .map(|list| {
            let hits = list.hits.into_iter().map(|h| RetrievedHit::new(h.id, h.score));
            RankedList::from_hits(list.source, hits, list.min_score).with_weight(list.weight)
        })
        .collect();

    Ok(fuse(&lists, &rrf)?)
}

/// Replay facts into a fresh in-memory engine, optionally resolving every
/// contradiction they raise with one strategy
pub async fn run_ingest(
    config: EngineConfig,
    request: IngestRequest,
    strategy: Option<ResolutionStrategy>,
) -> Result<IngestReport> {
    let engine = TemporalEngine::in_memory(config)?;

    let mut keys: Vec<EdgeKey> = Vec::new();
    let mut detections = Vec::with_capacity(request.facts.len());
    for fact in request.facts {
        let proposal = EdgeProposal::from(fact);
        let key = proposal.key();
        if !keys.contains(&key) {
            keys.push(key);
        }
        let detection = engine.ingest(proposal).await?;
        detections.push(DetectionSummary::from(&detection));
    }

    let mut resolutions = Vec::new();
    if let Some(strategy) = strategy {
        for (contradiction, result) in engine.resolve_all_open(strategy).await? {
            let (outcome, error) = match result {
                Ok(ResolutionOutcome::Applied { .. }) => ("applied", None),
                Ok(ResolutionOutcome::AlreadyResolved) => ("already_resolved", None),
                Ok(ResolutionOutcome::AlreadyConsistent) => ("already_consistent", None),
                Err(e) => ("failed", Some(e.to_string())),
            };
            resolutions.push(ResolutionSummary {
                contradiction,
                strategy,
                outcome: outcome.to_string(),
                error,
            });
        }
    }

    let mut edges = Vec::new();
    for key in &keys {
        edges.extend(engine.edges_for(key).await?);
    }

    Ok(IngestReport {
        detections,
        resolutions,
        edges,
        open_contradictions: engine.list_open_contradictions().await?,
        audit: engine.audit_log().await,
    })
}

pub fn strategy_listing() -> StrategyListing {
    StrategyListing {
        resolution: ResolutionStrategy::names().map(String::from).collect(),
        rerank: RerankStrategy::names().map(String::from).collect(),
    }
}
