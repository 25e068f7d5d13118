use ahash::AHashMap;
use anyhow::{Result, bail};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::Config;
use crate::embed::{Embedder, HashEmbedder};
use crate::engine::classify::TestClassifier;
use crate::engine::fusion::{FusionParams, HybridSearcher};
use crate::engine::graph::{self, GraphLimits};
use crate::engine::ingest::{self, IngestOutcome, RetryPolicy};
use crate::engine::risk::{self, RiskParams};
use crate::error::RadarError;
use crate::index::SearchIndex;
use crate::index::memory::MemoryIndex;
use crate::index::store::SnapshotStore;
use crate::ledger;
use crate::models::cochange::CoChangeResult;
use crate::models::commit::LedgerRead;
use crate::models::graph::ImpactGraph;
use crate::models::record::FileImpactRecord;
use crate::models::risk::RiskReport;
use crate::models::search::{AuthorCount, FileHistory, PathCount, RankedCommit, SearchResult};

const MAX_K: usize = 1_000;
const MAX_LOOKBACK: usize = 10_000;
const MAX_HISTORY: usize = 10_000;
const DEFAULT_HISTORY: usize = 50;
const SECONDS_PER_MONTH: i64 = 30 * 86_400;
const IMPACTED_FILES_LIMIT: usize = 50;
const TOP_AUTHORS_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// AppService: unified core logic for CLI / Session / MCP
// ---------------------------------------------------------------------------

pub struct AppService {
    config: Config,
    index: MemoryIndex,
    embedder: HashEmbedder,
    classifier: TestClassifier,
}

/// Where an ingestion reads its commits from.
#[derive(Debug, Clone)]
pub enum CommitSource {
    /// A git working tree; the last `lookback` commits are read
    Git { dir: PathBuf, lookback: usize },
    /// A file with one commit JSON object per line
    Ndjson { path: PathBuf },
}

impl AppService {
    /// Service whose index is persisted under `config.store_path`.
    pub fn new(config: Config) -> Result<Self> {
        let store = SnapshotStore::new(&config.store_path)?;
        let index = MemoryIndex::with_store(store, config.index.snapshot_cache);
        Self::with_index(config, index)
    }

    /// Service with a process-local index (nothing is written to disk).
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::with_index(config, MemoryIndex::new())
    }

    fn with_index(config: Config, index: MemoryIndex) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            embedder: HashEmbedder::new(config.embedding.dim),
            classifier: TestClassifier::new()?,
            index,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Validation helpers
    // -----------------------------------------------------------------------

    fn validate_repo(repo_id: &str) -> Result<()> {
        if repo_id.trim().is_empty() {
            bail!(RadarError::invalid_request("repo_id must not be empty"));
        }
        Ok(())
    }

    fn validate_score(name: &str, value: f64) -> Result<()> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            bail!(RadarError::invalid_request(format!(
                "{name} must be a finite value in [0.0, 1.0], got {value}"
            )));
        }
        Ok(())
    }

    fn validate_lookback(lookback: usize) -> Result<()> {
        if lookback == 0 || lookback > MAX_LOOKBACK {
            bail!(RadarError::invalid_request(format!(
                "lookback must be 1..={MAX_LOOKBACK}, got {lookback}"
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Core operations
    // -----------------------------------------------------------------------

    /// Hybrid search over the commits of `repo_id`, optionally limited to
    /// commits from the last `time_range_months` months (30 days each).
    pub async fn search(
        &self,
        query: &str,
        repo_id: &str,
        k: Option<usize>,
        time_range_months: Option<u32>,
    ) -> Result<SearchResult> {
        let since = match time_range_months {
            None => None,
            Some(0) => bail!(RadarError::invalid_request(
                "time_range_months must be at least 1"
            )),
            Some(months) => {
                let now = time::OffsetDateTime::now_utc().unix_timestamp();
                Some(now.saturating_sub(i64::from(months) * SECONDS_PER_MONTH))
            }
        };
        self.search_since(query, repo_id, k, since).await
    }

    async fn search_since(
        &self,
        query: &str,
        repo_id: &str,
        k: Option<usize>,
        since: Option<i64>,
    ) -> Result<SearchResult> {
        let k = k.unwrap_or(self.config.fusion.default_k);
        debug!(query, repo_id, k, since = ?since, "search called");
        Self::validate_repo(repo_id)?;
        if query.trim().is_empty() {
            bail!(RadarError::invalid_request("query must not be empty"));
        }
        if k == 0 || k > MAX_K {
            bail!(RadarError::invalid_request(format!(
                "k must be 1..={MAX_K}, got {k}"
            )));
        }

        let vector = match self.embedder.embed(query) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(query, error = %e, "query embedding failed");
                None
            }
        };

        let searcher = HybridSearcher::new(&self.index, FusionParams::from(&self.config.fusion));
        let outcome = searcher
            .search(repo_id, query, vector.as_deref(), k, since)
            .await?;

        let ids: Vec<String> = outcome.results.iter().map(|r| r.doc_id.clone()).collect();
        let mut docs: AHashMap<String, _> = self
            .index
            .commits(repo_id, &ids)
            .await?
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();

        let results: Vec<RankedCommit> = outcome
            .results
            .into_iter()
            .filter_map(|fused| {
                let doc = docs.remove(&fused.doc_id)?;
                Some(RankedCommit {
                    fused,
                    message: doc.message,
                    author: doc.author,
                    files: doc.files,
                })
            })
            .collect();

        let result = SearchResult {
            query: query.to_string(),
            repo_id: repo_id.to_string(),
            impacted_files: impacted_files(&results),
            top_authors: top_authors(&results),
            results,
            unavailable: outcome.unavailable,
        };
        debug!(
            repo_id,
            results = result.results.len(),
            unavailable = result.unavailable.len(),
            "search completed"
        );
        Ok(result)
    }

    /// The impact record of one file; an unindexed file yields an empty record.
    pub async fn get_impact(
        &self,
        file_path: &str,
        repo_id: &str,
        min_score: Option<f64>,
    ) -> Result<FileImpactRecord> {
        debug!(file_path, repo_id, min_score = ?min_score, "get_impact called");
        Self::validate_repo(repo_id)?;
        if let Some(min) = min_score {
            Self::validate_score("min_score", min)?;
        }

        let Some(mut record) = self.index.get_record(repo_id, file_path).await? else {
            debug!(file_path, repo_id, "get_impact: file not indexed");
            return Ok(FileImpactRecord::empty(repo_id, file_path));
        };
        if let Some(min) = min_score {
            record.co_change.retain(|n| n.score >= min);
            let kept = &record.co_change;
            record
                .test_neighbors
                .retain(|t| kept.iter().any(|n| &n.path == t));
        }
        debug!(
            file_path,
            neighbors = record.co_change.len(),
            owners = record.owners.len(),
            "get_impact completed"
        );
        Ok(record)
    }

    /// Commits that touched `file_path`, newest first.
    pub async fn history(
        &self,
        file_path: &str,
        repo_id: &str,
        size: Option<usize>,
    ) -> Result<FileHistory> {
        let size = size.unwrap_or(DEFAULT_HISTORY);
        debug!(file_path, repo_id, size, "history called");
        Self::validate_repo(repo_id)?;
        if file_path.trim().is_empty() {
            bail!(RadarError::invalid_request("file must not be empty"));
        }
        if size == 0 || size > MAX_HISTORY {
            bail!(RadarError::invalid_request(format!(
                "size must be 1..={MAX_HISTORY}, got {size}"
            )));
        }

        let commits = self.index.history(repo_id, file_path, size).await?;
        debug!(file_path, commits = commits.len(), "history completed");
        Ok(FileHistory {
            repo_id: repo_id.to_string(),
            file_path: file_path.to_string(),
            commits: commits.into_iter().map(Into::into).collect(),
        })
    }

    /// Bounded co-change graph around `seeds`.
    pub async fn explore_graph(
        &self,
        seeds: &[String],
        repo_id: &str,
        max_depth: Option<usize>,
        max_vertices: Option<usize>,
    ) -> Result<ImpactGraph> {
        debug!(seeds = seeds.len(), repo_id, "explore_graph called");
        Self::validate_repo(repo_id)?;
        if seeds.is_empty() {
            bail!(RadarError::invalid_request("at least one seed file is required"));
        }
        let mut limits = GraphLimits::from(&self.config.graph);
        if let Some(depth) = max_depth {
            limits.max_depth = depth;
        }
        if let Some(vertices) = max_vertices {
            if vertices == 0 {
                bail!(RadarError::invalid_request("max_vertices must be at least 1"));
            }
            limits.max_vertices = vertices;
        }

        let records = self.index.records(repo_id).await?;
        let graph = graph::explore(seeds.iter().map(String::as_str), &records, limits);
        debug!(
            repo_id,
            vertices = graph.vertices.len(),
            edges = graph.edges.len(),
            truncated = graph.truncated,
            "explore_graph completed"
        );
        Ok(graph)
    }

    /// Risk of a candidate file set.
    pub async fn get_risk(
        &self,
        paths: &[String],
        repo_id: &str,
        flakes: Option<&BTreeMap<String, f64>>,
    ) -> Result<RiskReport> {
        debug!(files = paths.len(), repo_id, "get_risk called");
        Self::validate_repo(repo_id)?;

        let records = self.index.records(repo_id).await?;
        let report = risk::score(
            paths.iter().map(String::as_str),
            &records,
            flakes,
            RiskParams::from(&self.config.risk),
        );
        debug!(
            repo_id,
            score = report.score,
            riskiest = ?report.riskiest,
            "get_risk completed"
        );
        Ok(report)
    }

    /// Read, analyze and publish each repository. Reading and analysis run in
    /// parallel; each repository is then published as one batch.
    ///
    /// Every repository gets its own outcome, in input order. Only a malformed
    /// request as a whole is an error.
    pub async fn ingest(&self, sources: Vec<(String, CommitSource)>) -> Result<Vec<IngestOutcome>> {
        debug!(repos = sources.len(), "ingest called");
        if sources.is_empty() {
            bail!(RadarError::invalid_request("no repositories to ingest"));
        }
        for (repo_id, _) in &sources {
            Self::validate_repo(repo_id)?;
        }

        let reads: Vec<(String, Result<LedgerRead>)> = sources
            .into_par_iter()
            .map(|(repo_id, source)| {
                let read = read_source(&source);
                (repo_id, read)
            })
            .collect();

        let mut slots: Vec<Option<IngestOutcome>> = Vec::with_capacity(reads.len());
        let mut readable = Vec::new();
        for (repo_id, read) in reads {
            match read {
                Ok(read) => {
                    slots.push(None);
                    readable.push((repo_id, read));
                }
                Err(e) => {
                    warn!(repo_id, error = %e, "reading commits failed, skipping repository");
                    slots.push(Some(IngestOutcome::failed(&repo_id, &e)));
                }
            }
        }

        let analyses =
            ingest::analyze_many(readable, &self.embedder, &self.classifier, &self.config);
        let retry = RetryPolicy::from(&self.config.index);
        let mut published = ingest::publish_all(&self.index, &analyses, retry)
            .await
            .into_iter();

        let outcomes: Vec<IngestOutcome> = slots
            .into_iter()
            .filter_map(|slot| slot.or_else(|| published.next()))
            .collect();
        debug!(
            repos = outcomes.len(),
            failed = outcomes.iter().filter(|o| !o.is_published()).count(),
            "ingest completed"
        );
        Ok(outcomes)
    }

    /// Ad-hoc co-change analysis of a git repository (nothing is indexed).
    pub fn analyze_cochange(
        &self,
        dir: &str,
        lookback: usize,
        min_score: f64,
        filter_file: Option<&str>,
    ) -> Result<CoChangeResult> {
        debug!(
            dir,
            lookback,
            min_score,
            filter_file = ?filter_file,
            "analyze_cochange called"
        );
        Self::validate_lookback(lookback)?;
        Self::validate_score("min_score", min_score)?;
        let dir = validate_dir(dir)?;

        let result = crate::engine::cochange::analyze_cochange(
            &dir,
            lookback,
            &self.config.cochange,
            min_score,
            filter_file,
        )?;
        debug!(
            entries = result.entries.len(),
            commits_analyzed = result.commits_analyzed,
            "analyze_cochange completed"
        );
        Ok(result)
    }
}

fn validate_dir(dir: &str) -> Result<PathBuf> {
    let canonical = std::fs::canonicalize(dir).map_err(|_| {
        RadarError::invalid_request(format!("Directory not found: {dir}"))
    })?;
    if !canonical.is_dir() {
        bail!(RadarError::invalid_request(format!(
            "Not a directory: {dir}"
        )));
    }
    Ok(canonical)
}

fn read_source(source: &CommitSource) -> Result<LedgerRead> {
    match source {
        CommitSource::Git { dir, lookback } => {
            AppService::validate_lookback(*lookback)?;
            let dir = validate_dir(&dir.to_string_lossy())?;
            ledger::read_git_log(&dir, *lookback)
        }
        CommitSource::Ndjson { path } => ledger::read_ndjson(Path::new(path)),
    }
}

// ---------------------------------------------------------------------------
// Search aggregations
// ---------------------------------------------------------------------------

fn impacted_files(results: &[RankedCommit]) -> Vec<PathCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for commit in results {
        for file in &commit.files {
            *counts.entry(file.as_str()).or_insert(0) += 1;
        }
    }
    let mut files: Vec<PathCount> = counts
        .into_iter()
        .map(|(path, count)| PathCount {
            path: path.to_string(),
            count,
        })
        .collect();
    // stable sort keeps path order among equal counts
    files.sort_by(|a, b| b.count.cmp(&a.count));
    files.truncate(IMPACTED_FILES_LIMIT);
    files
}

fn top_authors(results: &[RankedCommit]) -> Vec<AuthorCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for commit in results {
        *counts.entry(commit.author.as_str()).or_insert(0) += 1;
    }
    let mut authors: Vec<AuthorCount> = counts
        .into_iter()
        .map(|(author, count)| AuthorCount {
            author: author.to_string(),
            count,
        })
        .collect();
    authors.sort_by(|a, b| b.count.cmp(&a.count));
    authors.truncate(TOP_AUTHORS_LIMIT);
    authors
}
