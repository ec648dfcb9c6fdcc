use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tgr_core::{EdgeKey, EdgeProposal, EdgeState, EntityId, ResolutionStrategy, SourceId};
use tgr_manager::{EngineConfig, TemporalEngine};
use tgr_resolver::{Detection, ResolutionOutcome};
use tgr_search::{
    CancellationToken, CrossEncoder, DegradedStage, RetrievedHit, Retriever, RetrieverSource,
    SearchError, SearchFilters,
};

struct FixedRetriever {
    hits: Vec<(&'static str, f32, &'static str)>,
}

#[async_trait]
impl Retriever for FixedRetriever {
    async fn search(
        &self,
        _query: &str,
        _filters: &SearchFilters,
        limit: usize,
    ) -> tgr_search::Result<Vec<RetrievedHit>> {
        Ok(self
            .hits
            .iter()
            .take(limit)
            .map(|(id, score, text)| RetrievedHit::new(*id, *score).with_text(*text))
            .collect())
    }
}

struct DownRetriever;

#[async_trait]
impl Retriever for DownRetriever {
    async fn search(
        &self,
        _query: &str,
        _filters: &SearchFilters,
        _limit: usize,
    ) -> tgr_search::Result<Vec<RetrievedHit>> {
        Err(SearchError::Backend("connection refused".to_string()))
    }
}

/// Longer documents score higher
struct LengthEncoder;

#[async_trait]
impl CrossEncoder for LengthEncoder {
    async fn score_batch(&self, _query: &str, documents: &[&str]) -> tgr_search::Result<Vec<f32>> {
        Ok(documents.iter().map(|d| d.len() as f32).collect())
    }
}

fn lexical() -> Arc<FixedRetriever> {
    Arc::new(FixedRetriever {
        hits: vec![("d1", 9.0, "a"), ("d2", 7.0, "bbb"), ("d3", 5.0, "cc")],
    })
}

fn vector() -> Arc<FixedRetriever> {
    Arc::new(FixedRetriever {
        hits: vec![("d2", 0.9, "bbb"), ("d1", 0.8, "a")],
    })
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn works_at(to: &str, secs: i64) -> EdgeProposal {
    EdgeProposal {
        from: EntityId::new("alice"),
        predicate: "works_at".to_string(),
        to: to.to_string(),
        timestamp: at(secs),
        source_id: SourceId::new(format!("doc-{}", secs)),
        confidence: 0.8,
    }
}

fn works_at_key() -> EdgeKey {
    EdgeKey::new(EntityId::new("alice"), "works_at")
}

#[tokio::test]
async fn test_fused_search_breaks_ties_by_priority() {
    let engine = TemporalEngine::builder(EngineConfig::default())
        .with_retriever("lexical", lexical())
        .with_retriever("vector", vector())
        .build()
        .unwrap();

    let response = engine
        .search("who", &SearchFilters::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.ids(), vec!["d1", "d2", "d3"]);
    assert_eq!(response.hits[0].fused_score, response.hits[1].fused_score);
    assert_eq!(response.hits[0].provenance.len(), 2);
    assert_eq!(response.hits[2].provenance[0].source, "lexical");
    assert!(!response.is_degraded());
}

#[tokio::test]
async fn test_rerank_reorders_and_down_retriever_degrades() {
    let config = EngineConfig::new()
        .with_rerank(true)
        .with_rerank_strategy("replace")
        .with_final_k(2);
    let engine = TemporalEngine::builder(config)
        .with_retriever("lexical", lexical())
        .with_source(RetrieverSource::new("graph", Arc::new(DownRetriever)))
        .with_retriever("vector", vector())
        .with_cross_encoder(Arc::new(LengthEncoder))
        .build()
        .unwrap();

    let response = engine
        .search("who", &SearchFilters::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.ids(), vec!["d2", "d3"]);
    assert_eq!(response.hits[0].cross_encoder_score, Some(3.0));
    assert_eq!(response.hits[0].text.as_deref(), Some("bbb"));
    assert!(matches!(
        &response.degraded[..],
        [DegradedStage::Retriever { name, .. }] if name == "graph"
    ));

    let stats = engine.get_stats();
    assert_eq!(stats.total_searches, 1);
    assert_eq!(stats.degraded_searches, 1);
}

#[tokio::test]
async fn test_cancelled_search_returns_no_results() {
    let engine = TemporalEngine::builder(EngineConfig::default())
        .with_retriever("lexical", lexical())
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = engine.search("who", &SearchFilters::new(), &cancel).await;
    assert!(matches!(result, Err(tgr_manager::ManagerError::Search(SearchError::Cancelled))));
}

#[tokio::test]
async fn test_duplicate_retriever_names_are_rejected() {
    let result = TemporalEngine::builder(EngineConfig::default())
        .with_retriever("lexical", lexical())
        .with_retriever("lexical", vector())
        .build();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_contradiction_lifecycle_newest_wins() {
    let engine = TemporalEngine::in_memory(EngineConfig::default()).unwrap();

    engine.ingest(works_at("Acme", 1)).await.unwrap();
    let detection = engine.ingest(works_at("Globex", 2)).await.unwrap();
    let Detection::Contradicted { records, .. } = detection else {
        panic!("expected a contradiction");
    };
    let id = records[0].id;

    let open = engine.list_open_contradictions().await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].claims.len(), 2);

    let outcome = engine.resolve(&id, ResolutionStrategy::NewestWins).await.unwrap();
    assert!(matches!(outcome, ResolutionOutcome::Applied { .. }));

    // Second application is a no-op
    let again = engine.resolve(&id, ResolutionStrategy::NewestWins).await.unwrap();
    assert!(again.is_noop());
    assert_eq!(engine.audit_trail(&id).await.len(), 1);

    let edges = engine.edges_for(&works_at_key()).await.unwrap();
    assert_eq!(edges.len(), 2);
    assert_eq!(edges[0].state, EdgeState::Invalidated);
    assert_eq!(edges[1].state, EdgeState::Valid);

    let now = engine.valid_edges_at(&works_at_key(), at(5)).await.unwrap();
    assert_eq!(now.len(), 1);
    assert_eq!(now[0].to, "Globex");
    let before = engine.valid_edges_at(&works_at_key(), at(1)).await.unwrap();
    assert_eq!(before[0].to, "Acme");

    assert!(engine.list_open_contradictions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_merge_then_query_returns_both() {
    let engine = TemporalEngine::in_memory(EngineConfig::default()).unwrap();

    engine.ingest(works_at("Acme", 1)).await.unwrap();
    let detection = engine.ingest(works_at("Globex", 2)).await.unwrap();
    let id = detection.records()[0].id;

    engine.force_resolve(&id, "merge").await.unwrap();

    let mut objects: Vec<String> = engine
        .valid_edges_at(&works_at_key(), at(3))
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.to)
        .collect();
    objects.sort();
    assert_eq!(objects, vec!["Acme".to_string(), "Globex".to_string()]);

    let stats = engine.get_stats();
    assert_eq!(stats.contradictions_detected, 1);
    assert_eq!(stats.resolution.applied, 1);
    assert_eq!(stats.resolution.by_strategy.get("merge"), Some(&1));
}

#[tokio::test]
async fn test_split_timeline_windows_do_not_overlap() {
    let engine = TemporalEngine::in_memory(EngineConfig::default()).unwrap();

    engine.ingest(works_at("Acme", 1)).await.unwrap();
    engine.ingest(works_at("Globex", 2)).await.unwrap();

    let results = engine
        .resolve_all_open(ResolutionStrategy::SplitTimeline)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].1.is_ok());

    let edges = engine.edges_for(&works_at_key()).await.unwrap();
    assert_eq!(edges[0].valid_to, Some(at(2)));
    assert_eq!(edges[1].valid_from, at(2));
    assert!(!edges[0].overlaps(&edges[1]));
}

#[tokio::test]
async fn test_tight_similarity_threshold_raises_more_contradictions() {
    let config = EngineConfig::new().with_similarity_threshold(1.0);
    let engine = TemporalEngine::in_memory(config).unwrap();

    engine.ingest(works_at("Acme Corporation", 1)).await.unwrap();
    let detection = engine.ingest(works_at("Acme Corporation.", 2)).await.unwrap();
    assert_eq!(detection.records().len(), 1);

    let storage = engine.storage_stats().await.unwrap();
    assert_eq!(storage.total_edges, 2);
    assert_eq!(storage.open_contradictions, 1);
    assert!(Duration::from_millis(engine.config().fusion.retriever_timeout_ms) > Duration::ZERO);
}
