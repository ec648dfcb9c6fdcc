//! Similarity between edge objects

use strsim::normalized_levenshtein;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.85;

/// Scores how alike two edge objects are, in [0, 1]
pub trait ObjectSimilarity: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f32;
}

/// Normalized Levenshtein over case-folded, whitespace-collapsed text
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedLevenshtein;

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl ObjectSimilarity for NormalizedLevenshtein {
    fn similarity(&self, a: &str, b: &str) -> f32 {
        let (a, b) = (normalize(a), normalize(b));
        if a == b {
            return 1.0;
        }
        normalized_levenshtein(&a, &b) as f32
    }
}
