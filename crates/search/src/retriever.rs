//! Retriever capability contract and per-source ranked lists

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Filters passed through to every retriever untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub tags: HashMap<String, String>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Whether `at` falls inside the optional time bounds
    pub fn admits(&self, at: DateTime<Utc>) -> bool {
        match (self.since, self.until) {
            (Some(s), Some(u)) => at >= s && at <= u,
            (Some(s), None) => at >= s,
            (None, Some(u)) => at <= u,
            (None, None) => true,
        }
    }
}

/// A single (id, score) pair returned by a retriever
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedHit {
    pub id: String,
    pub score: f32,

    /// Document text, when the backend has it; fed to the cross-encoder
    pub text: Option<String>,
}

impl RetrievedHit {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// A source of ranked candidates: lexical index, vector index, graph
/// traversal, tag index.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `limit` hits, best first
    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<RetrievedHit>>;
}

/// A hit positioned within one source's list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub source: String,
    pub raw_score: f32,

    /// 1-indexed position within the source list
    pub rank: usize,
}

/// One source's ranked candidates, ready for fusion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedList {
    pub source: String,
    pub weight: f64,
    pub candidates: Vec<Candidate>,
}

impl RankedList {
    /// Build a list from ids in rank order (best first)
    pub fn from_ids<I, S>(source: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let source = source.into();
        let hits = ids.into_iter().map(|id| RetrievedHit::new(id, 0.0));
        Self::from_hits(source, hits, None)
    }

    /// Drop hits under the score floor, drop repeated ids, then assign ranks
    pub fn from_hits<I>(source: impl Into<String>, hits: I, min_score: Option<f32>) -> Self
    where
        I: IntoIterator<Item = RetrievedHit>,
    {
        let source = source.into();
        let mut seen = HashSet::new();
        let candidates = hits
            .into_iter()
            .filter(|hit| min_score.map_or(true, |floor| hit.score >= floor))
            .filter(|hit| seen.insert(hit.id.clone()))
            .enumerate()
            .map(|(i, hit)| Candidate {
                id: hit.id,
                source: source.clone(),
                raw_score: hit.score,
                rank: i + 1,
            })
            .collect();

        Self {
            source,
            weight: 1.0,
            candidates,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_score_floor_applied_before_ranking() {
        let hits = vec![
            RetrievedHit::new("d1", 0.9),
            RetrievedHit::new("d2", 0.2),
            RetrievedHit::new("d3", 0.7),
        ];
        let list = RankedList::from_hits("vector", hits, Some(0.5));

        assert_eq!(list.len(), 2);
        assert_eq!(list.candidates[0].id, "d1");
        assert_eq!(list.candidates[1].id, "d3");
        assert_eq!(list.candidates[1].rank, 2);
    }

    #[test]
    fn test_repeated_ids_keep_best_rank() {
        let list = RankedList::from_ids("lexical", ["d1", "d2", "d1", "d3"]);
        let ids: Vec<_> = list.candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2", "d3"]);
        assert_eq!(list.candidates[2].rank, 3);
    }

    #[test]
    fn test_filters_time_bounds() {
        let t = |s| Utc.timestamp_opt(s, 0).unwrap();
        let filters = SearchFilters::new().with_since(t(10)).with_until(t(20));
        assert!(filters.admits(t(10)));
        assert!(filters.admits(t(20)));
        assert!(!filters.admits(t(21)));
        assert!(SearchFilters::new().admits(t(0)));
    }
}
