//! Benchmarks for Temporal Graph Retrieval
//!
//! Fixture builders shared by the criterion benches in `benches/`.

pub use tgr_core;
pub use tgr_resolver;
pub use tgr_search;
pub use tgr_storage;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tgr_core::{EdgeProposal, EntityId, SourceId};
use tgr_search::{CrossEncoder, RankedList, RetrievedHit, Retriever, SearchFilters};

/// `lists` ranked lists of `len` ids drawn from a shared pool, each list a
/// different rotation of the pool so ids overlap across lists
pub fn rotated_lists(lists: usize, len: usize) -> Vec<RankedList> {
    let pool = len * 2;
    (0..lists)
        .map(|l| {
            let ids = (0..len).map(|i| format!("doc-{}", (i + l * 7) % pool));
            RankedList::from_ids(format!("source-{}", l), ids)
        })
        .collect()
}

/// Retriever returning a fixed rotation of the pool, one document per second
/// of publication time
pub struct StaticRetriever {
    hits: Vec<(RetrievedHit, DateTime<Utc>)>,
}

impl StaticRetriever {
    pub fn new(offset: usize, len: usize) -> Self {
        let hits = (0..len)
            .map(|i| {
                let id = format!("doc-{}", (i + offset) % (len * 2));
                let hit = RetrievedHit::new(id.clone(), 1.0 / (i + 1) as f32).with_text(id);
                (hit, at(i as i64))
            })
            .collect();
        Self { hits }
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn search(
        &self,
        _query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> tgr_search::Result<Vec<RetrievedHit>> {
        Ok(self
            .hits
            .iter()
            .filter(|(_, published)| filters.admits(*published))
            .take(limit)
            .map(|(hit, _)| hit.clone())
            .collect())
    }
}

/// Cross-encoder scoring documents by length
pub struct LengthEncoder;

#[async_trait]
impl CrossEncoder for LengthEncoder {
    async fn score_batch(&self, _query: &str, documents: &[&str]) -> tgr_search::Result<Vec<f32>> {
        Ok(documents.iter().map(|d| d.len() as f32).collect())
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

/// A fact about `subject` asserting `object` at `secs`
pub fn fact(subject: &str, predicate: &str, object: &str, secs: i64) -> EdgeProposal {
    EdgeProposal {
        from: EntityId::new(subject),
        predicate: predicate.to_string(),
        to: object.to_string(),
        timestamp: at(secs),
        source_id: SourceId::new("bench"),
        confidence: 0.8,
    }
}
