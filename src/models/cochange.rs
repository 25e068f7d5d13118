use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::record::Neighbor;

/// A pair of files that change together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoChangeEntry {
    /// Lexicographically smaller path of the pair
    pub file_a: String,
    pub file_b: String,
    /// Number of commits where both files changed
    pub co_changes: u32,
    /// Total counted changes for file_a
    pub total_changes_a: u32,
    /// Total counted changes for file_b
    pub total_changes_b: u32,
    /// Jaccard score: co_changes / (total_a + total_b - co_changes)
    pub score: f64,
}

/// Result of co-change analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoChangeResult {
    pub entries: Vec<CoChangeEntry>,
    /// Number of commits inside the window that took part in pair counting
    pub commits_analyzed: usize,
    /// Commits inside the window dropped for touching too many files
    #[serde(default)]
    pub commits_skipped_fanout: usize,
}

impl CoChangeResult {
    /// Score of the unordered pair; 0 when the pair was not emitted.
    pub fn score(&self, a: &str, b: &str) -> f64 {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        self.entries
            .iter()
            .find(|e| e.file_a == lo && e.file_b == hi)
            .map_or(0.0, |e| e.score)
    }

    /// Per-file adjacency, each list sorted by score descending then path.
    pub fn neighbors(&self) -> BTreeMap<String, Vec<Neighbor>> {
        let mut adjacency: BTreeMap<String, Vec<Neighbor>> = BTreeMap::new();
        for entry in &self.entries {
            adjacency
                .entry(entry.file_a.clone())
                .or_default()
                .push(Neighbor {
                    path: entry.file_b.clone(),
                    score: entry.score,
                });
            adjacency
                .entry(entry.file_b.clone())
                .or_default()
                .push(Neighbor {
                    path: entry.file_a.clone(),
                    score: entry.score,
                });
        }
        for list in adjacency.values_mut() {
            list.sort_by(|x, y| {
                y.score
                    .partial_cmp(&x.score)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| x.path.cmp(&y.path))
            });
        }
        adjacency
    }
}
