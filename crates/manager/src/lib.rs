//! Temporal Graph Retrieval engine - unified interface over retrieval and the knowledge graph
//!
//! Integrates the search pipeline, contradiction detection, resolution and the
//! audit trail behind one facade.

pub mod config;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tgr_core::{
    AuditEntry, ContradictionId, ContradictionRecord, EdgeKey, EdgeProposal, Entity, EntityId,
    ResolutionStrategy, TemporalEdge,
};
use tgr_resolver::{
    AuditLog, ContradictionDetector, ContradictionResolver, Detection, InMemoryAuditLog, KeyLocks,
    ObjectSimilarity, ResolutionOutcome, ResolutionStats, ResolverError,
};
use tgr_search::{
    CancellationToken, CrossEncoder, Retriever, RetrieverSource, SearchError, SearchFilters,
    SearchPipeline, SearchResponse,
};
use tgr_storage::memory::InMemoryGraphStore;
use tgr_storage::{GraphStore, StorageError, StorageStats};

pub use config::{DetectionSettings, EngineConfig, FusionSettings, RerankSettings};

/// Engine errors
#[derive(thiserror::Error, Debug)]
pub enum ManagerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ManagerError>;

/// Statistics about engine operations
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub total_searches: u64,
    pub degraded_searches: u64,
    pub total_ingested: u64,
    pub accepted: u64,
    pub reinforcements: u64,
    pub contradictions_detected: u64,
    pub resolution: ResolutionStats,
}

/// Assembles a [`TemporalEngine`]. Store and audit log default to the in-memory
/// implementations.
pub struct EngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn GraphStore>>,
    audit: Option<Arc<dyn AuditLog>>,
    sources: Vec<RetrieverSource>,
    cross_encoder: Option<Arc<dyn CrossEncoder>>,
    similarity: Option<Arc<dyn ObjectSimilarity>>,
}

impl EngineBuilder {
    pub fn with_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Register a retriever with the configured timeout. Registration order is
    /// fusion priority order.
    pub fn with_retriever(mut self, name: impl Into<String>, retriever: Arc<dyn Retriever>) -> Self {
        let source = RetrieverSource::new(name, retriever).with_timeout(self.config.retriever_timeout());
        self.sources.push(source);
        self
    }

    /// Register a retriever with its own floor, weight and timeout
    pub fn with_source(mut self, source: RetrieverSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_cross_encoder(mut self, encoder: Arc<dyn CrossEncoder>) -> Self {
        self.cross_encoder = Some(encoder);
        self
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn ObjectSimilarity>) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn build(self) -> Result<TemporalEngine> {
        self.config.validate()?;

        let mut pipeline = SearchPipeline::new(self.config.rrf_config()?, self.config.fusion.final_k)?;
        for source in self.sources {
            pipeline = pipeline.with_source(source)?;
        }
        if self.config.rerank.enabled {
            let encoder = self.cross_encoder.ok_or_else(|| {
                ManagerError::Configuration("rerank enabled but no cross-encoder registered".to_string())
            })?;
            pipeline = pipeline.with_reranker(encoder, self.config.rerank_config()?)?;
        } else if self.cross_encoder.is_some() {
            tracing::debug!("Cross-encoder registered but rerank is disabled");
        }

        let store: Arc<dyn GraphStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryGraphStore::new()),
        };
        let audit: Arc<dyn AuditLog> = match self.audit {
            Some(audit) => audit,
            None => Arc::new(InMemoryAuditLog::new()),
        };
        let locks = Arc::new(KeyLocks::new());

        let mut detector = ContradictionDetector::new(store.clone(), locks.clone())
            .with_threshold(self.config.detection.similarity_threshold);
        if let Some(similarity) = self.similarity {
            detector = detector.with_similarity(similarity);
        }
        let resolver = ContradictionResolver::new(store.clone(), audit.clone(), locks);

        tracing::info!(
            retrievers = ?pipeline.source_names(),
            rerank = self.config.rerank.enabled,
            "Engine ready"
        );

        Ok(TemporalEngine {
            config: self.config,
            pipeline,
            store,
            audit,
            detector,
            resolver,
            stats: Arc::new(DashMap::new()),
        })
    }
}

/// The engine coordinating retrieval and the temporal knowledge graph
pub struct TemporalEngine {
    config: EngineConfig,
    pipeline: SearchPipeline,
    store: Arc<dyn GraphStore>,
    audit: Arc<dyn AuditLog>,
    detector: ContradictionDetector,
    resolver: ContradictionResolver,

    /// Operation counters
    stats: Arc<DashMap<String, u64>>,
}

impl TemporalEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            store: None,
            audit: None,
            sources: Vec::new(),
            cross_encoder: None,
            similarity: None,
        }
    }

    /// Engine over in-memory storage with no retrievers
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Run a query through retrieval, fusion, rerank and assembly
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        self.increment_stat("total_searches");

        let response = self.pipeline.search(query, filters, cancel).await?;
        if response.is_degraded() {
            self.increment_stat("degraded_searches");
            tracing::warn!(
                query = %query,
                degraded = response.degraded.len(),
                "Search answered with degraded stages"
            );
        }
        Ok(response)
    }

    /// Register an entity for context
    pub async fn add_entity(&self, entity: Entity) -> Result<()> {
        self.store.create_entity(entity).await?;
        Ok(())
    }

    pub async fn get_entity(&self, id: &EntityId) -> Result<Entity> {
        Ok(self.store.get_entity(id).await?)
    }

    /// Ingest a fact, raising contradictions where it disagrees with the graph
    pub async fn ingest(&self, proposal: EdgeProposal) -> Result<Detection> {
        let detection = self.detector.detect(&proposal).await?;

        self.increment_stat("total_ingested");
        match &detection {
            Detection::Accepted { .. } => self.increment_stat("accepted"),
            Detection::Reinforced { .. } => self.increment_stat("reinforcements"),
            Detection::Contradicted { records, .. } => {
                self.add_stat("contradictions_detected", records.len() as u64)
            }
        }

        Ok(detection)
    }

    pub async fn resolve(&self, id: &ContradictionId, strategy: ResolutionStrategy) -> Result<ResolutionOutcome> {
        Ok(self.resolver.resolve(id, strategy).await?)
    }

    /// Administrative resolution by strategy name
    pub async fn force_resolve(&self, id: &ContradictionId, strategy: &str) -> Result<ResolutionOutcome> {
        Ok(self.resolver.force_resolve(id, strategy).await?)
    }

    /// Resolve every open contradiction with one strategy, oldest first
    pub async fn resolve_all_open(
        &self,
        strategy: ResolutionStrategy,
    ) -> Result<Vec<(ContradictionId, tgr_resolver::Result<ResolutionOutcome>)>> {
        Ok(self.resolver.resolve_all_open(strategy).await?)
    }

    pub async fn list_open_contradictions(&self) -> Result<Vec<ContradictionRecord>> {
        Ok(self.resolver.list_open().await?)
    }

    pub async fn get_contradiction(&self, id: &ContradictionId) -> Result<ContradictionRecord> {
        Ok(self.store.get_contradiction(id).await?)
    }

    pub async fn audit_trail(&self, id: &ContradictionId) -> Vec<AuditEntry> {
        self.resolver.audit_trail(id).await
    }

    /// The whole audit log in append order
    pub async fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit.entries().await
    }

    /// Every edge for a key in any state, ordered by `valid_from`
    pub async fn edges_for(&self, key: &EdgeKey) -> Result<Vec<TemporalEdge>> {
        Ok(self.store.edges_for(key).await?)
    }

    /// Edges whose validity window covers `at`
    pub async fn valid_edges_at(&self, key: &EdgeKey, at: DateTime<Utc>) -> Result<Vec<TemporalEdge>> {
        Ok(self.store.valid_edges_at(key, at).await?)
    }

    pub async fn storage_stats(&self) -> Result<StorageStats> {
        Ok(self.store.stats().await?)
    }

    pub fn get_stats(&self) -> EngineStats {
        EngineStats {
            total_searches: self.get_stat("total_searches"),
            degraded_searches: self.get_stat("degraded_searches"),
            total_ingested: self.get_stat("total_ingested"),
            accepted: self.get_stat("accepted"),
            reinforcements: self.get_stat("reinforcements"),
            contradictions_detected: self.get_stat("contradictions_detected"),
            resolution: self.resolver.get_stats(),
        }
    }

    fn increment_stat(&self, key: &str) {
        self.add_stat(key, 1);
    }

    fn add_stat(&self, key: &str, n: u64) {
        *self.stats.entry(key.to_string()).or_insert(0) += n;
    }

    fn get_stat(&self, key: &str) -> u64 {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}
