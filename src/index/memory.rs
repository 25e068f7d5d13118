//! In-process `SearchIndex` with optional on-disk snapshots.

use ahash::AHashMap;
use anyhow::{Result, anyhow, bail};
use lru::LruCache;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::embed::cosine;
use crate::error::RadarError;
use crate::index::store::{SnapshotData, SnapshotStore};
use crate::index::{PublishBatch, RecordSnapshot, SearchIndex, expand, terms, tokenize};
use crate::models::commit::CommitDoc;
use crate::models::record::FileImpactRecord;
use crate::models::search::{Retriever, RetrieverHit};

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

const MESSAGE_BOOST: f64 = 3.0;
const AUTHOR_BOOST: f64 = 2.0;
const PATH_BOOST: f64 = 1.0;

/// One BM25 field: postings of `(doc, term frequency)` plus document lengths.
struct FieldIndex {
    boost: f64,
    postings: AHashMap<String, Vec<(u32, u32)>>,
    lengths: Vec<u32>,
    avg_len: f64,
}

impl FieldIndex {
    fn build(boost: f64, docs: impl Iterator<Item = Vec<String>>) -> Self {
        let mut postings: AHashMap<String, Vec<(u32, u32)>> = AHashMap::new();
        let mut lengths = Vec::new();
        for (idx, tokens) in docs.enumerate() {
            lengths.push(tokens.len() as u32);
            let mut tf: AHashMap<String, u32> = AHashMap::new();
            for token in tokens {
                *tf.entry(token).or_insert(0) += 1;
            }
            for (term, count) in tf {
                postings.entry(term).or_default().push((idx as u32, count));
            }
        }
        let total: u64 = lengths.iter().map(|&l| u64::from(l)).sum();
        let avg_len = if lengths.is_empty() {
            0.0
        } else {
            total as f64 / lengths.len() as f64
        };
        Self {
            boost,
            postings,
            lengths,
            avg_len,
        }
    }

    fn accumulate(&self, query: &[String], scores: &mut [f64]) {
        let n = self.lengths.len() as f64;
        for term in query {
            let Some(list) = self.postings.get(term) else {
                continue;
            };
            let df = list.len() as f64;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            for &(doc, tf) in list {
                let tf = f64::from(tf);
                let len_norm = if self.avg_len > 0.0 {
                    f64::from(self.lengths[doc as usize]) / self.avg_len
                } else {
                    1.0
                };
                let denom = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * len_norm);
                scores[doc as usize] += self.boost * idf * tf * (BM25_K1 + 1.0) / denom;
            }
        }
    }
}

/// Searchable state of one repository. Rebuilt on every publish, never mutated.
struct RepoSnapshot {
    records: RecordSnapshot,
    commits: BTreeMap<String, CommitDoc>,
    /// Commit ids and timestamps in `commits` order; postings index into this.
    docs: Vec<(String, i64)>,
    lexical: [FieldIndex; 3],
    sparse: AHashMap<String, Vec<(u32, f64)>>,
}

impl RepoSnapshot {
    fn build(
        records: BTreeMap<String, FileImpactRecord>,
        commits: BTreeMap<String, CommitDoc>,
    ) -> Self {
        let docs: Vec<(String, i64)> = commits
            .values()
            .map(|c| (c.id.clone(), c.timestamp))
            .collect();

        let lexical = [
            FieldIndex::build(MESSAGE_BOOST, commits.values().map(|c| tokenize(&c.message))),
            FieldIndex::build(AUTHOR_BOOST, commits.values().map(|c| tokenize(&c.author))),
            FieldIndex::build(
                PATH_BOOST,
                commits
                    .values()
                    .map(|c| c.files.iter().flat_map(|f| tokenize(f)).collect()),
            ),
        ];

        let mut sparse: AHashMap<String, Vec<(u32, f64)>> = AHashMap::new();
        for (idx, commit) in commits.values().enumerate() {
            let mut tf: AHashMap<String, u32> = AHashMap::new();
            for term in terms(&commit.message) {
                *tf.entry(term).or_insert(0) += 1;
            }
            if tf.is_empty() {
                continue;
            }
            let norm = (tf.len() as f64).sqrt();
            for (term, count) in tf {
                let weight = (1.0 + f64::from(count).ln()) / norm;
                sparse.entry(term).or_default().push((idx as u32, weight));
            }
        }

        Self {
            records: Arc::new(records),
            commits,
            docs,
            lexical,
            sparse,
        }
    }

    fn from_data(data: SnapshotData) -> Self {
        Self::build(data.records, data.commits)
    }

    fn empty() -> Self {
        Self::build(BTreeMap::new(), BTreeMap::new())
    }

    /// Rank docs by score (desc), newer first, then id. Drops docs without a
    /// score and docs older than `since`.
    fn rank(
        &self,
        scored: impl Iterator<Item = (usize, f64)>,
        size: usize,
        since: Option<i64>,
    ) -> Vec<RetrieverHit> {
        let mut scored: Vec<(usize, f64)> = scored
            .filter(|&(doc, _)| since.is_none_or(|t| self.docs[doc].1 >= t))
            .collect();
        scored.sort_by(|&(a, sa), &(b, sb)| {
            sb.partial_cmp(&sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.docs[b].1.cmp(&self.docs[a].1))
                .then_with(|| self.docs[a].0.cmp(&self.docs[b].0))
        });
        scored
            .into_iter()
            .take(size)
            .enumerate()
            .map(|(i, (doc, score))| RetrieverHit {
                doc_id: self.docs[doc].0.clone(),
                rank: i + 1,
                raw_score: score,
                timestamp: self.docs[doc].1,
            })
            .collect()
    }

    fn lexical(&self, text: &str, size: usize, since: Option<i64>) -> Vec<RetrieverHit> {
        let query = tokenize(text);
        let mut scores = vec![0.0; self.docs.len()];
        for field in &self.lexical {
            field.accumulate(&query, &mut scores);
        }
        self.rank(
            scores.into_iter().enumerate().filter(|&(_, s)| s > 0.0),
            size,
            since,
        )
    }

    fn dense(&self, vector: &[f32], size: usize, since: Option<i64>) -> Result<Vec<RetrieverHit>> {
        let mut scored = Vec::new();
        for (idx, commit) in self.commits.values().enumerate() {
            let Some(embedding) = &commit.embedding else {
                continue;
            };
            if embedding.len() != vector.len() {
                bail!(RadarError::retriever_unavailable(
                    Retriever::Dense,
                    &format!(
                        "query has {} dimensions, index has {}",
                        vector.len(),
                        embedding.len()
                    ),
                ));
            }
            scored.push((idx, cosine(vector, embedding)));
        }
        Ok(self.rank(scored.into_iter(), size, since))
    }

    fn sparse(&self, text: &str, size: usize, since: Option<i64>) -> Vec<RetrieverHit> {
        let mut scores = vec![0.0; self.docs.len()];
        for (term, q_weight) in expand(text) {
            if let Some(list) = self.sparse.get(&term) {
                for &(doc, d_weight) in list {
                    scores[doc as usize] += q_weight * d_weight;
                }
            }
        }
        self.rank(
            scores.into_iter().enumerate().filter(|&(_, s)| s > 0.0),
            size,
            since,
        )
    }
}

impl RepoSnapshot {
    fn history(&self, file_path: &str, size: usize) -> Vec<CommitDoc> {
        let mut touching: Vec<&CommitDoc> = self
            .commits
            .values()
            .filter(|c| c.files.iter().any(|f| f == file_path))
            .collect();
        touching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        touching.into_iter().take(size).cloned().collect()
    }
}

/// Score on the blocking pool. The three retrievers of a search then overlap,
/// and a caller's deadline can fire while scoring is still running.
async fn retrieve<F>(retriever: Retriever, work: F) -> Result<Vec<RetrieverHit>>
where
    F: FnOnce() -> Result<Vec<RetrieverHit>> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RadarError::retriever_unavailable(retriever, &e.to_string()))?
}

/// Reference index. Snapshots live in an LRU; with a store attached, every
/// publish is persisted and evicted repositories are reloaded from disk.
pub struct MemoryIndex {
    snapshots: Mutex<LruCache<String, Arc<RepoSnapshot>>>,
    store: Option<SnapshotStore>,
    /// Serializes publishers so the store and the cache agree on the last write
    publishing: tokio::sync::Mutex<()>,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndex {
    /// Purely in-memory index; nothing is evicted.
    pub fn new() -> Self {
        Self {
            snapshots: Mutex::new(LruCache::unbounded()),
            store: None,
            publishing: tokio::sync::Mutex::new(()),
        }
    }

    /// Index backed by `store`, keeping at most `capacity` repositories in memory.
    pub fn with_store(store: SnapshotStore, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            snapshots: Mutex::new(LruCache::new(capacity)),
            store: Some(store),
            publishing: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<String, Arc<RepoSnapshot>>>> {
        self.snapshots
            .lock()
            .map_err(|_| anyhow!("index snapshot cache lock poisoned"))
    }

    fn load_locked(
        &self,
        cache: &mut LruCache<String, Arc<RepoSnapshot>>,
        repo_id: &str,
    ) -> Result<Arc<RepoSnapshot>> {
        if let Some(snapshot) = cache.get(repo_id) {
            return Ok(Arc::clone(snapshot));
        }
        let snapshot = match &self.store {
            Some(store) => match store.load(repo_id)? {
                Some(data) => {
                    debug!(repo_id, records = data.records.len(), "snapshot loaded from store");
                    Arc::new(RepoSnapshot::from_data(data))
                }
                None => return Ok(Arc::new(RepoSnapshot::empty())),
            },
            None => return Ok(Arc::new(RepoSnapshot::empty())),
        };
        cache.put(repo_id.to_string(), Arc::clone(&snapshot));
        Ok(snapshot)
    }

    fn snapshot(&self, repo_id: &str) -> Result<Arc<RepoSnapshot>> {
        let mut cache = self.lock()?;
        self.load_locked(&mut cache, repo_id)
    }
}

impl SearchIndex for MemoryIndex {
    async fn upsert_batch(&self, repo_id: &str, batch: &PublishBatch) -> Result<()> {
        if let Some(stray) = batch.records.iter().find(|r| r.repo_id != repo_id) {
            bail!(RadarError::index_write(
                repo_id,
                format!("record {} belongs to {}", stray.file_path, stray.repo_id),
            ));
        }
        let records: BTreeMap<String, FileImpactRecord> = batch
            .records
            .iter()
            .map(|r| (r.file_path.clone(), r.clone()))
            .collect();
        let commits: BTreeMap<String, CommitDoc> = batch
            .commits
            .iter()
            .map(|d| (d.id.clone(), d.clone()))
            .collect();

        let _publishing = self.publishing.lock().await;
        let store = self.store.clone();
        let owned_repo = repo_id.to_string();
        let next = tokio::task::spawn_blocking(move || -> Result<Arc<RepoSnapshot>> {
            if let Some(store) = store {
                store.save(&owned_repo, &records, &commits)?;
            }
            Ok(Arc::new(RepoSnapshot::build(records, commits)))
        })
        .await
        .map_err(|e| RadarError::index_write(repo_id, e))??;

        debug!(
            repo_id,
            records = next.records.len(),
            commits = next.commits.len(),
            "snapshot published"
        );
        self.lock()?.put(repo_id.to_string(), next);
        Ok(())
    }

    async fn get_record(&self, repo_id: &str, file_path: &str) -> Result<Option<FileImpactRecord>> {
        let snapshot = self.snapshot(repo_id)?;
        Ok(snapshot.records.get(file_path).cloned())
    }

    async fn records(&self, repo_id: &str) -> Result<RecordSnapshot> {
        let snapshot = self.snapshot(repo_id)?;
        Ok(Arc::clone(&snapshot.records))
    }

    async fn commits(&self, repo_id: &str, ids: &[String]) -> Result<Vec<CommitDoc>> {
        let snapshot = self.snapshot(repo_id)?;
        Ok(ids
            .iter()
            .filter_map(|id| snapshot.commits.get(id).cloned())
            .collect())
    }

    async fn history(&self, repo_id: &str, file_path: &str, size: usize) -> Result<Vec<CommitDoc>> {
        let snapshot = self.snapshot(repo_id)?;
        let file_path = file_path.to_string();
        let history = tokio::task::spawn_blocking(move || snapshot.history(&file_path, size))
            .await
            .map_err(|e| RadarError::index_read(repo_id, e))?;
        Ok(history)
    }

    async fn lexical(
        &self,
        repo_id: &str,
        text: &str,
        size: usize,
        since: Option<i64>,
    ) -> Result<Vec<RetrieverHit>> {
        let snapshot = self.snapshot(repo_id)?;
        let text = text.to_string();
        retrieve(Retriever::Lexical, move || {
            Ok(snapshot.lexical(&text, size, since))
        })
        .await
    }

    async fn dense(
        &self,
        repo_id: &str,
        vector: &[f32],
        size: usize,
        since: Option<i64>,
    ) -> Result<Vec<RetrieverHit>> {
        let snapshot = self.snapshot(repo_id)?;
        let vector = vector.to_vec();
        retrieve(Retriever::Dense, move || snapshot.dense(&vector, size, since)).await
    }

    async fn sparse(
        &self,
        repo_id: &str,
        text: &str,
        size: usize,
        since: Option<i64>,
    ) -> Result<Vec<RetrieverHit>> {
        let snapshot = self.snapshot(repo_id)?;
        let text = text.to_string();
        retrieve(Retriever::Sparse, move || {
            Ok(snapshot.sparse(&text, size, since))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::{Embedder, HashEmbedder};
    use crate::models::commit::Commit;

    fn doc(
        embedder: &HashEmbedder,
        id: &str,
        ts: i64,
        author: &str,
        msg: &str,
        files: &[&str],
    ) -> CommitDoc {
        let commit = Commit::new(id, ts, author, msg, files.iter().copied());
        CommitDoc::from_commit(&commit, embedder.embed(msg).ok())
    }

    fn corpus(embedder: &HashEmbedder) -> PublishBatch {
        PublishBatch {
            records: vec![FileImpactRecord::empty("acme", "src/auth.rs")],
            commits: vec![
                doc(embedder, "c1", 100, "alice", "Fix authentication bug", &["src/auth.rs"]),
                doc(embedder, "c2", 200, "bob", "Update readme badges", &["README.md"]),
                doc(embedder, "c3", 300, "carol", "Improve login performance", &["src/login.rs"]),
                doc(embedder, "c4", 400, "dave", "Fix parser bug", &["src/parser.rs"]),
            ],
        }
    }

    async fn seeded() -> (MemoryIndex, HashEmbedder) {
        let embedder = HashEmbedder::default();
        let index = MemoryIndex::new();
        index.upsert_batch("acme", &corpus(&embedder)).await.unwrap();
        (index, embedder)
    }

    #[tokio::test]
    async fn exact_phrase_ranks_first_in_all_retrievers() {
        let (index, embedder) = seeded().await;
        let query = "authentication bug";

        let lexical = index.lexical("acme", query, 10, None).await.unwrap();
        let sparse = index.sparse("acme", query, 10, None).await.unwrap();
        let vector = embedder.embed(query).unwrap();
        let dense = index.dense("acme", &vector, 10, None).await.unwrap();

        for hits in [&lexical, &dense, &sparse] {
            assert_eq!(hits[0].doc_id, "c1");
            assert_eq!(hits[0].rank, 1);
        }
    }

    #[tokio::test]
    async fn lexical_matches_author_and_paths() {
        let (index, _) = seeded().await;

        let by_author = index.lexical("acme", "carol", 10, None).await.unwrap();
        assert_eq!(by_author.len(), 1);
        assert_eq!(by_author[0].doc_id, "c3");

        let by_path = index.lexical("acme", "parser.rs", 10, None).await.unwrap();
        assert_eq!(by_path[0].doc_id, "c4");
    }

    #[tokio::test]
    async fn sparse_expands_synonyms() {
        let (index, _) = seeded().await;
        // "auth" appears in no message; its synonyms do
        let hits = index.sparse("acme", "auth", 10, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.doc_id.as_str()).collect();
        assert!(ids.contains(&"c1"));
        assert!(ids.contains(&"c3"));
        assert!(!ids.contains(&"c2"));
    }

    #[tokio::test]
    async fn results_are_capped_and_ranked_from_one() {
        let (index, _) = seeded().await;
        let hits = index.lexical("acme", "fix bug", 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rank, 1);
    }

    #[tokio::test]
    async fn dense_rejects_wrong_dimension() {
        let (index, _) = seeded().await;
        let err = index.dense("acme", &[1.0, 0.0], 10, None).await.unwrap_err();
        assert_eq!(
            crate::error::code_of(&err),
            Some(crate::error::ErrorCode::RetrieverUnavailable)
        );
    }

    #[tokio::test]
    async fn unknown_repo_is_empty_not_error() {
        let index = MemoryIndex::new();
        assert!(index.records("ghost").await.unwrap().is_empty());
        assert!(index.get_record("ghost", "a.rs").await.unwrap().is_none());
        assert!(index.lexical("ghost", "anything", 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_replaces_the_whole_repository() {
        let (index, embedder) = seeded().await;
        let mut updated = FileImpactRecord::empty("acme", "src/login.rs");
        updated.churn = 9;
        let batch = PublishBatch {
            records: vec![updated.clone()],
            commits: vec![doc(&embedder, "c9", 900, "erin", "Rework login", &["src/login.rs"])],
        };
        index.upsert_batch("acme", &batch).await.unwrap();

        let records = index.records("acme").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records.get("src/login.rs"), Some(&updated));
        assert!(index.get_record("acme", "src/auth.rs").await.unwrap().is_none());
        // commits of the earlier batch are gone too
        assert!(index.lexical("acme", "readme", 5, None).await.unwrap().is_empty());
        assert_eq!(index.lexical("acme", "login", 5, None).await.unwrap()[0].doc_id, "c9");
    }

    #[tokio::test]
    async fn publishing_one_repo_leaves_others_alone() {
        let (index, _) = seeded().await;
        let batch = PublishBatch {
            records: vec![FileImpactRecord::empty("beta", "b.rs")],
            commits: Vec::new(),
        };
        index.upsert_batch("beta", &batch).await.unwrap();
        assert_eq!(index.records("acme").await.unwrap().len(), 1);
        assert_eq!(index.records("beta").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn held_snapshot_is_not_affected_by_later_publish() {
        let (index, _) = seeded().await;
        let before = index.records("acme").await.unwrap();

        let batch = PublishBatch {
            records: vec![
                FileImpactRecord::empty("acme", "src/auth.rs"),
                FileImpactRecord::empty("acme", "src/new.rs"),
            ],
            commits: Vec::new(),
        };
        index.upsert_batch("acme", &batch).await.unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(index.records("acme").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn since_bounds_every_retriever() {
        let (index, embedder) = seeded().await;
        let vector = embedder.embed("fix bug").unwrap();

        let lexical = index.lexical("acme", "fix bug", 10, Some(300)).await.unwrap();
        let sparse = index.sparse("acme", "fix bug", 10, Some(300)).await.unwrap();
        let dense = index.dense("acme", &vector, 10, Some(300)).await.unwrap();
        for hits in [&lexical, &dense, &sparse] {
            assert!(!hits.is_empty());
            assert!(hits.iter().all(|h| h.timestamp >= 300));
            assert_eq!(hits[0].rank, 1);
        }
        assert_eq!(lexical[0].doc_id, "c4");
    }

    #[tokio::test]
    async fn history_lists_commits_touching_a_file_newest_first() {
        let embedder = HashEmbedder::default();
        let index = MemoryIndex::new();
        let batch = PublishBatch {
            records: Vec::new(),
            commits: vec![
                doc(&embedder, "h1", 100, "a", "one", &["lib.rs", "main.rs"]),
                doc(&embedder, "h2", 300, "b", "two", &["lib.rs"]),
                doc(&embedder, "h3", 200, "c", "three", &["main.rs"]),
                doc(&embedder, "h4", 300, "d", "four", &["lib.rs"]),
            ],
        };
        index.upsert_batch("acme", &batch).await.unwrap();

        let ids = |docs: Vec<CommitDoc>| docs.into_iter().map(|d| d.id).collect::<Vec<_>>();
        assert_eq!(ids(index.history("acme", "lib.rs", 10).await.unwrap()), vec!["h2", "h4", "h1"]);
        assert_eq!(ids(index.history("acme", "lib.rs", 1).await.unwrap()), vec!["h2"]);
        assert!(index.history("acme", "nope.rs", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scoring_panic_marks_retriever_unavailable() {
        let err = retrieve(Retriever::Sparse, || panic!("scorer crashed"))
            .await
            .unwrap_err();
        assert_eq!(
            crate::error::code_of(&err),
            Some(crate::error::ErrorCode::RetrieverUnavailable)
        );
    }

    #[tokio::test]
    async fn slow_scoring_yields_to_caller_deadline() {
        let slow = retrieve(Retriever::Lexical, || {
            std::thread::sleep(std::time::Duration::from_millis(300));
            Ok(Vec::new())
        });
        let outcome = tokio::time::timeout(std::time::Duration::from_millis(20), slow).await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn rejects_record_for_other_repo() {
        let index = MemoryIndex::new();
        let batch = PublishBatch {
            records: vec![FileImpactRecord::empty("other", "a.rs")],
            commits: Vec::new(),
        };
        let err = index.upsert_batch("acme", &batch).await.unwrap_err();
        assert_eq!(
            crate::error::code_of(&err),
            Some(crate::error::ErrorCode::IndexWriteFailure)
        );
    }

    #[tokio::test]
    async fn store_backed_index_survives_restart_and_eviction() {
        let dir = tempfile::TempDir::new().unwrap();
        let embedder = HashEmbedder::default();
        {
            let index = MemoryIndex::with_store(SnapshotStore::new(dir.path()).unwrap(), 1);
            index.upsert_batch("acme", &corpus(&embedder)).await.unwrap();
            // evicts "acme" from the cache
            let other = PublishBatch {
                records: vec![FileImpactRecord::empty("beta", "b.rs")],
                commits: Vec::new(),
            };
            index.upsert_batch("beta", &other).await.unwrap();
            assert_eq!(index.records("acme").await.unwrap().len(), 1);
        }

        let reopened = MemoryIndex::with_store(SnapshotStore::new(dir.path()).unwrap(), 4);
        let hits = reopened.lexical("acme", "authentication", 5, None).await.unwrap();
        assert_eq!(hits[0].doc_id, "c1");
    }
}
