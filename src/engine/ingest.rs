//! Ingestion: one analysis pass per repository, then one atomic publish.

use anyhow::{Result, bail};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{Config, IndexConfig};
use crate::embed::Embedder;
use crate::engine::builder;
use crate::engine::classify::TestClassifier;
use crate::engine::cochange::{CoChangeAccumulator, CoChangeParams};
use crate::engine::ownership::{OwnershipAccumulator, OwnershipParams};
use crate::engine::risk::{self, RiskParams};
use crate::error::{ErrorBody, RadarError};
use crate::index::{PublishBatch, SearchIndex};
use crate::models::commit::{CommitDoc, LedgerRead};

/// Output of the analysis pass, ready to publish.
#[derive(Debug, Clone)]
pub struct IngestAnalysis {
    pub repo_id: String,
    pub batch: PublishBatch,
    pub commits_read: usize,
    pub commits_skipped: usize,
    pub pairs_scored: usize,
    pub embed_failures: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub repo_id: String,
    pub commits_read: usize,
    pub commits_skipped: usize,
    pub files_indexed: usize,
    pub pairs_scored: usize,
    /// Publish attempts used, including the successful one
    pub attempts: u32,
}

/// A repository that could not be read or published.
#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    pub repo_id: String,
    pub error: ErrorBody,
}

/// Result of ingesting one repository. A failure never hides the outcome of
/// the other repositories in the same call.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum IngestOutcome {
    Published(IngestReport),
    Failed(IngestFailure),
}

impl IngestOutcome {
    pub fn failed(repo_id: &str, error: &anyhow::Error) -> Self {
        Self::Failed(IngestFailure {
            repo_id: repo_id.to_string(),
            error: ErrorBody::from(error),
        })
    }

    pub fn repo_id(&self) -> &str {
        match self {
            Self::Published(report) => &report.repo_id,
            Self::Failed(failure) => &failure.repo_id,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    /// Delay before the first retry; doubles each time
    pub backoff: Duration,
}

impl From<&IndexConfig> for RetryPolicy {
    fn from(config: &IndexConfig) -> Self {
        Self {
            retries: config.publish_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Build every record and commit document for one repository.
///
/// Both windows end at the newest commit, so the output depends only on the
/// commit stream and not on when ingestion runs.
pub fn analyze<E>(
    repo_id: &str,
    read: LedgerRead,
    embedder: &E,
    classifier: &TestClassifier,
    config: &Config,
) -> IngestAnalysis
where
    E: Embedder + ?Sized,
{
    let LedgerRead {
        mut commits,
        skipped,
    } = read;
    commits.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

    let commits_read = commits.len();
    let Some(as_of) = commits.last().map(|c| c.timestamp) else {
        return IngestAnalysis {
            repo_id: repo_id.to_string(),
            batch: PublishBatch::default(),
            commits_read: 0,
            commits_skipped: skipped,
            pairs_scored: 0,
            embed_failures: 0,
        };
    };

    let mut co_change =
        CoChangeAccumulator::new(CoChangeParams::from_config(&config.cochange, as_of));
    let mut ownership =
        OwnershipAccumulator::new(OwnershipParams::from_config(&config.ownership, as_of));
    for commit in &commits {
        co_change.observe(commit);
        ownership.observe(commit);
    }
    let co_change = co_change.finish();
    let ownership = ownership.finish();

    let mut records = builder::build(
        repo_id,
        &co_change,
        &ownership,
        |path| classifier.is_test(path),
        config.index.top_k_neighbors,
    );
    let risk_params = RiskParams::from(&config.risk);
    for record in &mut records {
        let score = risk::file_score(&record.file_path, Some(&*record), None, risk_params).score;
        record.risk_score = score;
    }

    let mut embed_failures = 0;
    let mut docs: BTreeMap<&str, CommitDoc> = BTreeMap::new();
    for commit in &commits {
        if docs.contains_key(commit.id.as_str()) {
            continue;
        }
        let embedding = match embedder.embed(&commit.message) {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(
                    repo_id,
                    commit = %commit.id,
                    error = %e,
                    "embedding failed, commit stays lexical-only"
                );
                embed_failures += 1;
                None
            }
        };
        docs.insert(commit.id.as_str(), CommitDoc::from_commit(commit, embedding));
    }

    debug!(
        repo_id,
        commits = commits_read,
        skipped,
        files = records.len(),
        pairs = co_change.entries.len(),
        skipped_fanout = co_change.commits_skipped_fanout,
        embed_failures,
        "ingest analysis done"
    );

    IngestAnalysis {
        repo_id: repo_id.to_string(),
        batch: PublishBatch {
            records,
            commits: docs.into_values().collect(),
        },
        commits_read,
        commits_skipped: skipped,
        pairs_scored: co_change.entries.len(),
        embed_failures,
    }
}

/// Analyze independent repositories in parallel.
pub fn analyze_many<E>(
    inputs: Vec<(String, LedgerRead)>,
    embedder: &E,
    classifier: &TestClassifier,
    config: &Config,
) -> Vec<IngestAnalysis>
where
    E: Embedder + ?Sized,
{
    inputs
        .into_par_iter()
        .map(|(repo_id, read)| analyze(&repo_id, read, embedder, classifier, config))
        .collect()
}

/// Publish the whole batch in one call, retrying the whole batch on failure.
pub async fn publish<I: SearchIndex>(
    index: &I,
    analysis: &IngestAnalysis,
    retry: RetryPolicy,
) -> Result<IngestReport> {
    let repo_id = analysis.repo_id.as_str();
    let mut backoff = retry.backoff;
    let mut attempt: u32 = 1;

    loop {
        match index.upsert_batch(repo_id, &analysis.batch).await {
            Ok(()) => break,
            Err(e) if attempt > retry.retries => {
                bail!(RadarError::index_write(
                    repo_id,
                    format!("{e} (gave up after {attempt} attempts)"),
                ));
            }
            Err(e) => {
                warn!(
                    repo_id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "publish failed, retrying batch"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
        }
    }

    let report = IngestReport {
        repo_id: repo_id.to_string(),
        commits_read: analysis.commits_read,
        commits_skipped: analysis.commits_skipped,
        files_indexed: analysis.batch.records.len(),
        pairs_scored: analysis.pairs_scored,
        attempts: attempt,
    };
    info!(
        repo_id,
        files = report.files_indexed,
        commits = report.commits_read,
        attempts = report.attempts,
        "ingest published"
    );
    Ok(report)
}

/// Publish each analysis in turn. A repository that exhausts its retries is
/// reported as failed and the remaining ones are still published.
pub async fn publish_all<I: SearchIndex>(
    index: &I,
    analyses: &[IngestAnalysis],
    retry: RetryPolicy,
) -> Vec<IngestOutcome> {
    let mut outcomes = Vec::with_capacity(analyses.len());
    for analysis in analyses {
        let outcome = match publish(index, analysis, retry).await {
            Ok(report) => IngestOutcome::Published(report),
            Err(e) => {
                warn!(repo_id = %analysis.repo_id, error = %e, "publish failed, skipping repository");
                IngestOutcome::failed(&analysis.repo_id, &e)
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}
