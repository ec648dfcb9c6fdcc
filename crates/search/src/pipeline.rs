//! Query pipeline: Retrievers (parallel) -> Fusion -> Rerank -> Assembler
//!
//! Each query is independent and read-only. Retrievers run concurrently, each
//! under its own timeout; fusion waits for all of them. A retriever that fails
//! or times out is dropped from the fusion and reported as a degraded stage.

use crate::assembler::{DegradedStage, ResultAssembler, SearchResponse};
use crate::fusion::{fuse, validate_weight, RrfConfig};
use crate::rerank::{passthrough, CrossEncoder, RerankConfig, Reranker};
use crate::retriever::{RankedList, Retriever, SearchFilters};
use crate::{Result, SearchError};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_RETRIEVER_TIMEOUT: Duration = Duration::from_millis(1000);

/// A registered retriever with its per-source settings
#[derive(Clone)]
pub struct RetrieverSource {
    pub name: String,
    pub retriever: Arc<dyn Retriever>,

    /// Hits scoring under this floor are dropped before ranking
    pub min_score: Option<f32>,

    pub weight: f64,
    pub timeout: Duration,
}

impl RetrieverSource {
    pub fn new(name: impl Into<String>, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            name: name.into(),
            retriever,
            min_score: None,
            weight: 1.0,
            timeout: DEFAULT_RETRIEVER_TIMEOUT,
        }
    }

    pub fn with_min_score(mut self, floor: f32) -> Self {
        self.min_score = Some(floor);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Retrieval fusion pipeline
pub struct SearchPipeline {
    /// Priority order: earlier sources win fusion ties
    sources: Vec<RetrieverSource>,
    rrf: RrfConfig,
    reranker: Option<Reranker>,
    assembler: ResultAssembler,
}

impl SearchPipeline {
    pub fn new(rrf: RrfConfig, final_k: usize) -> Result<Self> {
        rrf.validate()?;
        if final_k == 0 {
            return Err(SearchError::Configuration(
                "final_k must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            sources: Vec::new(),
            rrf,
            reranker: None,
            assembler: ResultAssembler::new(final_k),
        })
    }

    /// Register a retriever. Registration order is fusion priority order.
    pub fn with_source(mut self, source: RetrieverSource) -> Result<Self> {
        if self.sources.iter().any(|s| s.name == source.name) {
            return Err(SearchError::Configuration(format!(
                "retriever {} registered twice",
                source.name
            )));
        }
        validate_weight(&source.name, source.weight)?;
        if source.timeout.is_zero() {
            return Err(SearchError::Configuration(format!(
                "retriever {} timeout must be non-zero",
                source.name
            )));
        }
        self.sources.push(source);
        Ok(self)
    }

    pub fn with_reranker(mut self, encoder: Arc<dyn CrossEncoder>, config: RerankConfig) -> Result<Self> {
        self.reranker = Some(Reranker::new(encoder, config)?);
        Ok(self)
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name.as_str()).collect()
    }

    /// Run a query. Optional stages degrade; only cancellation fails the call.
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Query cancelled: {}", query);
                Err(SearchError::Cancelled)
            }
            response = self.run(query, filters) => Ok(response),
        }
    }

    async fn run(&self, query: &str, filters: &SearchFilters) -> SearchResponse {
        let limit = self.rrf.initial_k();
        let mut degraded = Vec::new();

        let calls = self.sources.iter().map(|source| async move {
            let outcome = tokio::time::timeout(
                source.timeout,
                source.retriever.search(query, filters, limit),
            )
            .await;
            (source, outcome)
        });

        let mut lists = Vec::with_capacity(self.sources.len());
        let mut texts: HashMap<String, String> = HashMap::new();

        for (source, outcome) in join_all(calls).await {
            let hits = match outcome {
                Ok(Ok(hits)) => hits,
                Ok(Err(e)) => {
                    let err = SearchError::RetrieverUnavailable {
                        name: source.name.clone(),
                        reason: e.to_string(),
                    };
                    warn!("{}", err);
                    degraded.push(DegradedStage::Retriever {
                        name: source.name.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
                Err(_) => {
                    let reason = format!("timed out after {}ms", source.timeout.as_millis());
                    warn!("Retriever {} unavailable: {}", source.name, reason);
                    degraded.push(DegradedStage::Retriever {
                        name: source.name.clone(),
                        reason,
                    });
                    continue;
                }
            };

            // Higher-priority sources keep their text
            for hit in &hits {
                if let Some(text) = &hit.text {
                    texts.entry(hit.id.clone()).or_insert_with(|| text.clone());
                }
            }

            lists.push(
                RankedList::from_hits(source.name.clone(), hits, source.min_score)
                    .with_weight(source.weight),
            );
        }

        let fused = match fuse(&lists, &self.rrf) {
            Ok(fused) => fused,
            // Config is validated at construction
            Err(e) => {
                warn!("Fusion failed: {}", e);
                Vec::new()
            }
        };

        let results = match &self.reranker {
            Some(reranker) => {
                let outcome = reranker.rerank(query, fused, &texts).await;
                if let Some(reason) = outcome.skipped {
                    degraded.push(DegradedStage::Rerank { reason });
                }
                outcome.results
            }
            None => passthrough(fused),
        };

        let kept: HashSet<&str> = results
            .iter()
            .take(self.assembler.limit())
            .map(|r| r.id.as_str())
            .collect();
        texts.retain(|id, _| kept.contains(id.as_str()));

        info!(
            "Query answered from {}/{} retrievers, {} results{}",
            lists.len(),
            self.sources.len(),
            results.len().min(self.assembler.limit()),
            if degraded.is_empty() { "" } else { " (degraded)" }
        );

        self.assembler.assemble(query, results, texts, degraded)
    }
}
