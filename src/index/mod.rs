//! Search index contract and text analysis shared by its implementations.

pub mod memory;
pub mod store;

use anyhow::Result;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use crate::models::commit::CommitDoc;
use crate::models::record::FileImpactRecord;
use crate::models::search::RetrieverHit;

/// Immutable view of every record of one repository, keyed by file path.
pub type RecordSnapshot = Arc<BTreeMap<String, FileImpactRecord>>;

/// Everything one ingestion pass publishes. Applied as a unit.
#[derive(Debug, Clone, Default)]
pub struct PublishBatch {
    pub records: Vec<FileImpactRecord>,
    pub commits: Vec<CommitDoc>,
}

impl PublishBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.commits.is_empty()
    }
}

/// The external search index the engine reads from and publishes to.
///
/// A batch is the complete record and commit set of a repository: publishing
/// it replaces everything previously held for that repository, so files or
/// commits absent from the batch disappear. Retrieval methods return hits
/// with 1-indexed ranks, best first, at most `size` of them, restricted to
/// commits at or after `since` when given.
pub trait SearchIndex: Send + Sync {
    fn upsert_batch(
        &self,
        repo_id: &str,
        batch: &PublishBatch,
    ) -> impl Future<Output = Result<()>> + Send;

    fn get_record(
        &self,
        repo_id: &str,
        file_path: &str,
    ) -> impl Future<Output = Result<Option<FileImpactRecord>>> + Send;

    fn records(&self, repo_id: &str) -> impl Future<Output = Result<RecordSnapshot>> + Send;

    /// Commit documents for `ids`, in the order given; unknown ids are skipped.
    fn commits(
        &self,
        repo_id: &str,
        ids: &[String],
    ) -> impl Future<Output = Result<Vec<CommitDoc>>> + Send;

    /// Commits touching `file_path`, newest first.
    fn history(
        &self,
        repo_id: &str,
        file_path: &str,
        size: usize,
    ) -> impl Future<Output = Result<Vec<CommitDoc>>> + Send;

    fn lexical(
        &self,
        repo_id: &str,
        text: &str,
        size: usize,
        since: Option<i64>,
    ) -> impl Future<Output = Result<Vec<RetrieverHit>>> + Send;

    fn dense(
        &self,
        repo_id: &str,
        vector: &[f32],
        size: usize,
        since: Option<i64>,
    ) -> impl Future<Output = Result<Vec<RetrieverHit>>> + Send;

    fn sparse(
        &self,
        repo_id: &str,
        text: &str,
        size: usize,
        since: Option<i64>,
    ) -> impl Future<Output = Result<Vec<RetrieverHit>>> + Send;
}

/// Lowercased alphanumeric runs. Paths split on separators and dots.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "it",
    "of", "on", "or", "the", "this", "to", "with",
];

/// Groups of interchangeable software terms, in stemmed form.
const SYNONYM_GROUPS: &[&[&str]] = &[
    &["auth", "authentication", "login", "credential", "session"],
    &["bug", "fix", "defect", "error", "fault"],
    &["crash", "panic", "failure", "abort"],
    &["perf", "performance", "latency", "slow"],
    &["config", "configuration", "setting"],
    &["db", "database", "sql", "query"],
    &["dependency", "dep", "upgrade", "bump"],
    &["doc", "documentation", "readme"],
    &["test", "spec"],
];

/// Weight given to a synonym relative to the term that triggered it.
const EXPANSION_WEIGHT: f64 = 0.5;

/// Strip common English suffixes. Deliberately light; only used for matching.
pub fn stem(token: &str) -> String {
    let len = token.len();
    if len > 4 && token.ends_with("ies") {
        return format!("{}y", &token[..len - 3]);
    }
    for (suffix, min_len) in [("ing", 6), ("ed", 5), ("es", 5)] {
        if len >= min_len && token.ends_with(suffix) {
            return token[..len - suffix.len()].to_string();
        }
    }
    if len > 3 && token.ends_with('s') && !token.ends_with("ss") {
        return token[..len - 1].to_string();
    }
    token.to_string()
}

/// Stemmed terms of `text` with stopwords removed.
pub fn terms(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .map(|t| stem(&t))
        .collect()
}

/// Weighted query terms: each term at 1.0 plus its synonyms at a reduced weight.
pub fn expand(text: &str) -> BTreeMap<String, f64> {
    let mut weights: BTreeMap<String, f64> = BTreeMap::new();
    for term in terms(text) {
        for group in SYNONYM_GROUPS.iter().filter(|g| g.contains(&term.as_str())) {
            for synonym in group.iter().filter(|s| **s != term) {
                let w = weights.entry((*synonym).to_string()).or_insert(0.0);
                *w = w.max(EXPANSION_WEIGHT);
            }
        }
        weights.insert(term, 1.0);
    }
    weights
}
