//! Final result assembly: truncation, provenance, degraded-stage flags

use crate::fusion::SourceContribution;
use crate::rerank::RerankedResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_FINAL_K: usize = 10;

/// An optional stage that did not contribute to a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum DegradedStage {
    Retriever { name: String, reason: String },
    Rerank { reason: String },
}

/// One entry of the final ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub id: String,
    pub rank: usize,
    pub score: f64,
    pub fused_score: f64,
    pub cross_encoder_score: Option<f64>,
    pub provenance: Vec<SourceContribution>,
    pub text: Option<String>,
}

/// Best-effort answer to a query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub hits: Vec<RankedHit>,
    pub degraded: Vec<DegradedStage>,
}

impl SearchResponse {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.id.as_str()).collect()
    }
}

/// Truncates the reranked list and attaches provenance
#[derive(Debug, Clone, Copy)]
pub struct ResultAssembler {
    limit: usize,
}

impl ResultAssembler {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn assemble(
        &self,
        query: &str,
        results: Vec<RerankedResult>,
        mut texts: HashMap<String, String>,
        degraded: Vec<DegradedStage>,
    ) -> SearchResponse {
        let hits = results
            .into_iter()
            .take(self.limit)
            .enumerate()
            .map(|(i, r)| RankedHit {
                text: texts.remove(&r.id),
                id: r.id,
                rank: i + 1,
                score: r.final_score,
                fused_score: r.original_score,
                cross_encoder_score: r.cross_encoder_score,
                provenance: r.sources,
            })
            .collect();

        SearchResponse {
            query: query.to_string(),
            hits,
            degraded,
        }
    }
}

impl Default for ResultAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_FINAL_K)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reranked(id: &str, score: f64) -> RerankedResult {
        RerankedResult {
            id: id.to_string(),
            final_score: score,
            cross_encoder_score: None,
            original_score: score,
            original_rank: 1,
            sources: vec![SourceContribution {
                source: "lexical".to_string(),
                rank: 1,
                raw_score: 3.2,
            }],
        }
    }

    #[test]
    fn test_truncates_and_ranks() {
        let assembler = ResultAssembler::new(2);
        let response = assembler.assemble(
            "q",
            vec![reranked("a", 0.3), reranked("b", 0.2), reranked("c", 0.1)],
            HashMap::new(),
            Vec::new(),
        );

        assert_eq!(response.ids(), vec!["a", "b"]);
        assert_eq!(response.hits[1].rank, 2);
        assert_eq!(response.hits[0].provenance[0].source, "lexical");
        assert!(!response.is_degraded());
    }

    #[test]
    fn test_attaches_text_and_flags() {
        let mut texts = HashMap::new();
        texts.insert("a".to_string(), "alpha".to_string());
        let response = ResultAssembler::default().assemble(
            "q",
            vec![reranked("a", 0.3)],
            texts,
            vec![DegradedStage::Rerank {
                reason: "timed out".to_string(),
            }],
        );

        assert_eq!(response.hits[0].text.as_deref(), Some("alpha"));
        assert!(response.is_degraded());
    }
}
