//! Reciprocal Rank Fusion
//!
//! RRF(d) = Σᵢ wᵢ / (k + rankᵢ(d)), rank 1-indexed, k = 60 by default.
//!
//! Lists are given in priority order. Ties on the fused score are broken by
//! the best rank in the highest-priority list that contains either candidate,
//! falling through to later lists, then to id order.

use crate::retriever::RankedList;
use crate::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

pub const DEFAULT_RRF_K: f64 = 60.0;
pub const DEFAULT_INITIAL_K: usize = 50;

/// Fusion parameters, validated on construction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RrfConfig {
    k: f64,
    initial_k: usize,
}

impl RrfConfig {
    pub fn new(k: f64, initial_k: usize) -> Result<Self> {
        let config = Self { k, initial_k };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.k.is_finite() || self.k <= 0.0 {
            return Err(SearchError::Configuration(format!(
                "RRF constant k must be positive, got {}",
                self.k
            )));
        }
        if self.initial_k == 0 {
            return Err(SearchError::Configuration(
                "initial_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    pub fn initial_k(&self) -> usize {
        self.initial_k
    }
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_RRF_K,
            initial_k: DEFAULT_INITIAL_K,
        }
    }
}

/// Where a fused candidate came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceContribution {
    pub source: String,
    pub rank: usize,
    pub raw_score: f32,
}

/// A candidate after fusion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub id: String,
    pub rrf_score: f64,

    /// Contributing sources in list priority order
    pub sources: Vec<SourceContribution>,

    /// 1-indexed position in the fused ranking
    pub rank: usize,
}

/// Contribution of a single rank
pub fn rrf_contribution(rank: usize, k: f64) -> f64 {
    1.0 / (k + rank as f64)
}

struct Accumulator {
    /// (list index, rank, weighted term)
    hits: Vec<(usize, usize, f64)>,
    sources: Vec<SourceContribution>,
}

impl Accumulator {
    /// Sum terms largest first so equal rank multisets give identical sums
    fn score(&self) -> f64 {
        let mut terms: Vec<f64> = self.hits.iter().map(|(_, _, term)| *term).collect();
        terms.sort_by(|a, b| b.total_cmp(a));
        terms.iter().sum()
    }

    fn rank_in(&self, list: usize) -> Option<usize> {
        self.hits.iter().find(|(l, _, _)| *l == list).map(|(_, rank, _)| *rank)
    }
}

fn priority_tie_break(a: &Accumulator, b: &Accumulator, list_count: usize) -> Ordering {
    for list in 0..list_count {
        let rank_a = a.rank_in(list).unwrap_or(usize::MAX);
        let rank_b = b.rank_in(list).unwrap_or(usize::MAX);
        match rank_a.cmp(&rank_b) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// A source weight must be positive and finite, or better ranks could score lower
pub fn validate_weight(source: &str, weight: f64) -> Result<()> {
    if !weight.is_finite() || weight <= 0.0 {
        return Err(SearchError::Configuration(format!(
            "weight of source {} must be positive, got {}",
            source, weight
        )));
    }
    Ok(())
}

/// Fuse ranked lists into a single ranking truncated to `initial_k`
pub fn fuse(lists: &[RankedList], config: &RrfConfig) -> Result<Vec<FusedResult>> {
    config.validate()?;
    for list in lists {
        validate_weight(&list.source, list.weight)?;
    }

    let mut pool: HashMap<&str, Accumulator> = HashMap::new();
    for (list_index, list) in lists.iter().enumerate() {
        for candidate in &list.candidates {
            let entry = pool.entry(candidate.id.as_str()).or_insert_with(|| Accumulator {
                hits: Vec::new(),
                sources: Vec::new(),
            });
            // A list counts once per candidate, at its best rank
            if entry.rank_in(list_index).is_some() {
                continue;
            }
            let term = list.weight * rrf_contribution(candidate.rank, config.k);
            entry.hits.push((list_index, candidate.rank, term));
            entry.sources.push(SourceContribution {
                source: list.source.clone(),
                rank: candidate.rank,
                raw_score: candidate.raw_score,
            });
        }
    }

    let mut scored: Vec<(&str, f64, Accumulator)> = pool
        .into_iter()
        .map(|(id, acc)| (id, acc.score(), acc))
        .collect();

    scored.sort_by(|(id_a, score_a, acc_a), (id_b, score_b, acc_b)| {
        score_b
            .total_cmp(score_a)
            .then_with(|| priority_tie_break(acc_a, acc_b, lists.len()))
            .then_with(|| id_a.cmp(id_b))
    });
    scored.truncate(config.initial_k);

    Ok(scored
        .into_iter()
        .enumerate()
        .map(|(i, (id, rrf_score, acc))| FusedResult {
            id: id.to_string(),
            rrf_score,
            sources: acc.sources,
            rank: i + 1,
        })
        .collect())
}
