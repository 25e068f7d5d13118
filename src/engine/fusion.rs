use anyhow::{Result, bail};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::FusionConfig;
use crate::error::RadarError;
use crate::index::SearchIndex;
use crate::models::search::{
    ContributingRanks, FusedResult, RankedList, Retriever, RetrieverHit, SearchOutcome,
    UnavailableRetriever,
};

/// Reciprocal Rank Fusion of the given ranked lists.
///
/// A document at rank `r` in a list contributes `1 / (rank_constant + r)`;
/// lists that do not contain it contribute nothing. Results are ordered by
/// fused score, then most recent timestamp, then doc id, and cut to `k`.
pub fn fuse(lists: &[RankedList], rank_constant: f64, k: usize) -> Vec<FusedResult> {
    let mut merged: BTreeMap<&str, (ContributingRanks, i64)> = BTreeMap::new();
    for list in lists {
        for hit in &list.hits {
            let (ranks, timestamp) = merged
                .entry(hit.doc_id.as_str())
                .or_insert((ContributingRanks::default(), hit.timestamp));
            ranks.record(list.retriever, hit.rank);
            *timestamp = (*timestamp).max(hit.timestamp);
        }
    }

    let mut results: Vec<FusedResult> = merged
        .into_iter()
        .map(|(doc_id, (ranks, timestamp))| {
            let fused_score = Retriever::ALL
                .iter()
                .filter_map(|&r| ranks.get(r))
                .map(|rank| 1.0 / (rank_constant + rank as f64))
                .sum();
            FusedResult {
                doc_id: doc_id.to_string(),
                fused_score,
                contributing_ranks: ranks,
                timestamp,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    results.truncate(k);
    results
}

#[derive(Debug, Clone, Copy)]
pub struct FusionParams {
    pub rank_constant: f64,
    /// Hits requested from each retriever
    pub candidate_pool: usize,
    /// Per-retriever deadline
    pub timeout: Duration,
}

impl From<&FusionConfig> for FusionParams {
    fn from(config: &FusionConfig) -> Self {
        Self {
            rank_constant: config.rank_constant,
            candidate_pool: config.candidate_pool,
            timeout: Duration::from_millis(config.retriever_timeout_ms),
        }
    }
}

/// Issues the three retriever queries concurrently and fuses what comes back.
pub struct HybridSearcher<'a, I> {
    index: &'a I,
    params: FusionParams,
}

impl<'a, I: SearchIndex> HybridSearcher<'a, I> {
    pub fn new(index: &'a I, params: FusionParams) -> Self {
        Self { index, params }
    }

    /// Search one repository, optionally only commits at or after `since`.
    /// A missing `vector` makes the dense retriever unavailable. Fails only
    /// when no retriever answered.
    pub async fn search(
        &self,
        repo_id: &str,
        text: &str,
        vector: Option<&[f32]>,
        k: usize,
        since: Option<i64>,
    ) -> Result<SearchOutcome> {
        let pool = self.params.candidate_pool;
        let timeout = self.params.timeout;

        let lexical = bounded(
            Retriever::Lexical,
            timeout,
            self.index.lexical(repo_id, text, pool, since),
        );
        let sparse = bounded(
            Retriever::Sparse,
            timeout,
            self.index.sparse(repo_id, text, pool, since),
        );
        let dense = async {
            match vector {
                Some(v) => {
                    bounded(
                        Retriever::Dense,
                        timeout,
                        self.index.dense(repo_id, v, pool, since),
                    )
                    .await
                }
                None => Err(UnavailableRetriever {
                    retriever: Retriever::Dense,
                    reason: "no query embedding".to_string(),
                }),
            }
        };

        let (lexical, dense, sparse) = tokio::join!(lexical, dense, sparse);

        let mut lists = Vec::with_capacity(3);
        let mut unavailable = Vec::new();
        for outcome in [lexical, dense, sparse] {
            match outcome {
                Ok(list) => lists.push(list),
                Err(down) => {
                    warn!(
                        repo_id,
                        retriever = %down.retriever,
                        reason = %down.reason,
                        "retriever unavailable, fusing without it"
                    );
                    unavailable.push(down);
                }
            }
        }

        if lists.is_empty() {
            bail!(RadarError::all_retrievers_unavailable());
        }

        let results = fuse(&lists, self.params.rank_constant, k);
        debug!(
            repo_id,
            lexical = hit_count(&lists, Retriever::Lexical),
            dense = hit_count(&lists, Retriever::Dense),
            sparse = hit_count(&lists, Retriever::Sparse),
            fused = results.len(),
            "hybrid search fused"
        );
        Ok(SearchOutcome {
            results,
            unavailable,
        })
    }
}

async fn bounded<F>(
    retriever: Retriever,
    timeout: Duration,
    query: F,
) -> Result<RankedList, UnavailableRetriever>
where
    F: Future<Output = Result<Vec<RetrieverHit>>>,
{
    match tokio::time::timeout(timeout, query).await {
        Ok(Ok(hits)) => Ok(RankedList { retriever, hits }),
        Ok(Err(e)) => Err(UnavailableRetriever {
            retriever,
            reason: e.to_string(),
        }),
        Err(_) => Err(UnavailableRetriever {
            retriever,
            reason: format!("timed out after {} ms", timeout.as_millis()),
        }),
    }
}

fn hit_count(lists: &[RankedList], retriever: Retriever) -> Option<usize> {
    lists
        .iter()
        .find(|l| l.retriever == retriever)
        .map(|l| l.hits.len())
}
