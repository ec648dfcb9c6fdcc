//! Configuration for the Temporal Graph Retrieval engine

use crate::{ManagerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tgr_resolver::DEFAULT_SIMILARITY_THRESHOLD;
use tgr_search::assembler::DEFAULT_FINAL_K;
use tgr_search::fusion::{DEFAULT_INITIAL_K, DEFAULT_RRF_K};
use tgr_search::rerank::{DEFAULT_RERANK_TIMEOUT, DEFAULT_RERANK_WEIGHT};
use tgr_search::{RerankConfig, RerankStrategy, RrfConfig};

/// Rank fusion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    /// RRF smoothing constant
    pub rrf_k: f64,

    /// Fused pool size handed to the reranker
    pub initial_k: usize,

    /// Hits returned to the caller
    pub final_k: usize,

    /// Per-retriever timeout in milliseconds
    pub retriever_timeout_ms: u64,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            initial_k: DEFAULT_INITIAL_K,
            final_k: DEFAULT_FINAL_K,
            retriever_timeout_ms: 1000,
        }
    }
}

/// Cross-encoder rerank settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    pub enabled: bool,

    /// One of `replace`, `weighted`, `max`, `min`
    pub strategy: String,

    /// Cross-encoder share for the `weighted` strategy
    pub weight: f64,

    pub timeout_ms: u64,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: "weighted".to_string(),
            weight: DEFAULT_RERANK_WEIGHT,
            timeout_ms: DEFAULT_RERANK_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Object similarity at or above which a fact reinforces instead of contradicting
    pub similarity_threshold: f32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fusion: FusionSettings,
    pub rerank: RerankSettings,
    pub detection: DetectionSettings,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ManagerError::Configuration(e.to_string()))
    }

    pub fn with_rrf_k(mut self, k: f64) -> Self {
        self.fusion.rrf_k = k;
        self
    }

    pub fn with_initial_k(mut self, initial_k: usize) -> Self {
        self.fusion.initial_k = initial_k;
        self
    }

    pub fn with_final_k(mut self, final_k: usize) -> Self {
        self.fusion.final_k = final_k;
        self
    }

    pub fn with_retriever_timeout(mut self, timeout: Duration) -> Self {
        self.fusion.retriever_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_rerank(mut self, enabled: bool) -> Self {
        self.rerank.enabled = enabled;
        self
    }

    pub fn with_rerank_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.rerank.strategy = strategy.into();
        self
    }

    pub fn with_rerank_weight(mut self, weight: f64) -> Self {
        self.rerank.weight = weight.clamp(0.0, 1.0);
        self
    }

    pub fn with_rerank_timeout(mut self, timeout: Duration) -> Self {
        self.rerank.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.detection.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn retriever_timeout(&self) -> Duration {
        Duration::from_millis(self.fusion.retriever_timeout_ms)
    }

    pub fn rrf_config(&self) -> Result<RrfConfig> {
        Ok(RrfConfig::new(self.fusion.rrf_k, self.fusion.initial_k)?)
    }

    pub fn rerank_config(&self) -> Result<RerankConfig> {
        let strategy: RerankStrategy = self.rerank.strategy.parse()?;
        let config = RerankConfig {
            strategy,
            weight: self.rerank.weight,
            timeout: Duration::from_millis(self.rerank.timeout_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject unusable values before any engine is built
    pub fn validate(&self) -> Result<()> {
        self.rrf_config()?;
        self.rerank_config()?;

        if self.fusion.final_k == 0 {
            return Err(ManagerError::Configuration("final_k must be at least 1".to_string()));
        }
        if self.fusion.retriever_timeout_ms == 0 {
            return Err(ManagerError::Configuration(
                "retriever_timeout_ms must be non-zero".to_string(),
            ));
        }
        let threshold = self.detection.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ManagerError::Configuration(format!(
                "similarity_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        Ok(())
    }
}
