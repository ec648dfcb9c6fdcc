//! Cross-encoder reranking
//!
//! Scores every (query, candidate) pair in one batch and blends the
//! cross-encoder score with the fused score. A scorer that fails, times out or
//! answers with the wrong number of scores never fails the query: the fused
//! order is handed back untouched.

use crate::fusion::{FusedResult, SourceContribution};
use crate::{Result, SearchError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_RERANK_WEIGHT: f64 = 0.5;
pub const DEFAULT_RERANK_TIMEOUT: Duration = Duration::from_millis(2000);

/// External (query, document) relevance model
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// One score per document, in input order
    async fn score_batch(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>>;
}

/// How the cross-encoder score combines with the fused score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankStrategy {
    Replace,
    Weighted,
    Max,
    Min,
}

const RERANK_STRATEGY_TABLE: &[(&str, RerankStrategy)] = &[
    ("replace", RerankStrategy::Replace),
    ("weighted", RerankStrategy::Weighted),
    ("max", RerankStrategy::Max),
    ("min", RerankStrategy::Min),
];

impl RerankStrategy {
    pub fn names() -> impl Iterator<Item = &'static str> {
        RERANK_STRATEGY_TABLE.iter().map(|(name, _)| *name)
    }

    /// Final score for one candidate; `weight` applies to `Weighted` only
    pub fn blend(&self, cross_encoder: f64, original: f64, weight: f64) -> f64 {
        match self {
            Self::Replace => cross_encoder,
            Self::Weighted => weight * cross_encoder + (1.0 - weight) * original,
            Self::Max => cross_encoder.max(original),
            Self::Min => cross_encoder.min(original),
        }
    }
}

impl FromStr for RerankStrategy {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        RERANK_STRATEGY_TABLE
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, strategy)| *strategy)
            .ok_or_else(|| SearchError::Configuration(format!("unknown rerank strategy: {}", s)))
    }
}

/// Reranker parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankConfig {
    pub strategy: RerankStrategy,
    pub weight: f64,
    pub timeout: Duration,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            strategy: RerankStrategy::Weighted,
            weight: DEFAULT_RERANK_WEIGHT,
            timeout: DEFAULT_RERANK_TIMEOUT,
        }
    }
}

impl RerankConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.weight) {
            return Err(SearchError::Configuration(format!(
                "rerank weight must be within [0, 1], got {}",
                self.weight
            )));
        }
        if self.timeout.is_zero() {
            return Err(SearchError::Configuration(
                "rerank timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// A candidate after the rerank stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedResult {
    pub id: String,
    pub final_score: f64,

    /// `None` when the stage was skipped
    pub cross_encoder_score: Option<f64>,

    pub original_score: f64,
    pub original_rank: usize,
    pub sources: Vec<SourceContribution>,
}

impl From<FusedResult> for RerankedResult {
    fn from(fused: FusedResult) -> Self {
        Self {
            id: fused.id,
            final_score: fused.rrf_score,
            cross_encoder_score: None,
            original_score: fused.rrf_score,
            original_rank: fused.rank,
            sources: fused.sources,
        }
    }
}

/// Result of the rerank stage
#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub results: Vec<RerankedResult>,

    /// Why the stage was skipped, if it was
    pub skipped: Option<String>,
}

/// The fused order, carried through unchanged
pub fn passthrough(fused: Vec<FusedResult>) -> Vec<RerankedResult> {
    fused.into_iter().map(RerankedResult::from).collect()
}

/// Cross-encoder reranking stage
#[derive(Clone)]
pub struct Reranker {
    encoder: Arc<dyn CrossEncoder>,
    config: RerankConfig,
}

impl Reranker {
    pub fn new(encoder: Arc<dyn CrossEncoder>, config: RerankConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { encoder, config })
    }

    pub fn config(&self) -> &RerankConfig {
        &self.config
    }

    /// Rerank the fused candidates. Never fails; degrades to the fused order.
    pub async fn rerank(
        &self,
        query: &str,
        fused: Vec<FusedResult>,
        texts: &HashMap<String, String>,
    ) -> RerankOutcome {
        if fused.is_empty() {
            return RerankOutcome {
                results: Vec::new(),
                skipped: None,
            };
        }

        let documents: Vec<&str> = fused
            .iter()
            .map(|f| texts.get(&f.id).map(String::as_str).unwrap_or(""))
            .collect();

        let scored = tokio::time::timeout(
            self.config.timeout,
            self.encoder.score_batch(query, &documents),
        )
        .await;

        let scores = match scored {
            Ok(Ok(scores)) if scores.len() != fused.len() => {
                return self.degrade(
                    fused,
                    format!("expected {} scores, got {}", documents.len(), scores.len()),
                )
            }
            Ok(Ok(scores)) => match scores.iter().position(|s| !s.is_finite()) {
                Some(index) => {
                    return self.degrade(
                        fused,
                        format!("non-finite score {} at position {}", scores[index], index),
                    )
                }
                None => scores,
            },
            Ok(Err(e)) => return self.degrade(fused, e.to_string()),
            Err(_) => {
                return self.degrade(
                    fused,
                    format!("timed out after {}ms", self.config.timeout.as_millis()),
                )
            }
        };

        let mut results: Vec<RerankedResult> = fused
            .into_iter()
            .zip(scores)
            .map(|(f, ce)| {
                let ce = f64::from(ce);
                let mut result = RerankedResult::from(f);
                result.final_score = self.config.strategy.blend(ce, result.original_score, self.config.weight);
                result.cross_encoder_score = Some(ce);
                result
            })
            .collect();

        results.sort_by(|a, b| {
            b.final_score
                .total_cmp(&a.final_score)
                .then_with(|| a.original_rank.cmp(&b.original_rank))
        });

        debug!(
            "Reranked {} candidates with {:?} strategy",
            results.len(),
            self.config.strategy
        );

        RerankOutcome {
            results,
            skipped: None,
        }
    }

    fn degrade(&self, fused: Vec<FusedResult>, reason: String) -> RerankOutcome {
        warn!("Rerank unavailable, keeping fused order: {}", reason);
        RerankOutcome {
            results: passthrough(fused),
            skipped: Some(reason),
        }
    }
}
