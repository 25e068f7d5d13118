use ahash::{AHashMap, AHashSet};
use anyhow::{Result, bail};
use std::cmp::Ordering;
use std::path::Path;
use tracing::debug;

use crate::config::CoChangeConfig;
use crate::error::RadarError;
use crate::ledger;
use crate::models::cochange::{CoChangeEntry, CoChangeResult};
use crate::models::commit::Commit;

/// Trailing time window ending at `as_of`, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoChangeWindow {
    pub as_of: i64,
    pub span_secs: i64,
}

impl CoChangeWindow {
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp <= self.as_of && timestamp >= self.as_of.saturating_sub(self.span_secs)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CoChangeParams {
    pub window: CoChangeWindow,
    /// Pairs sharing fewer commits than this are not emitted
    pub min_co_occurrence: u32,
    /// Commits touching more files than this are not counted
    pub max_fanout: usize,
}

impl CoChangeParams {
    pub fn from_config(config: &CoChangeConfig, as_of: i64) -> Self {
        Self {
            window: CoChangeWindow {
                as_of,
                span_secs: config.window_secs(),
            },
            min_co_occurrence: config.min_co_occurrence,
            max_fanout: config.max_fanout,
        }
    }
}

/// Single-pass pair counter. Paths are interned so pair keys stay small.
pub struct CoChangeAccumulator {
    params: CoChangeParams,
    ids: AHashMap<String, u32>,
    paths: Vec<String>,
    file_counts: Vec<u32>,
    pair_counts: AHashMap<(u32, u32), u32>,
    seen_commits: AHashSet<String>,
    commits_analyzed: usize,
    commits_skipped_fanout: usize,
}

impl CoChangeAccumulator {
    pub fn new(params: CoChangeParams) -> Self {
        Self {
            params,
            ids: AHashMap::new(),
            paths: Vec::new(),
            file_counts: Vec::new(),
            pair_counts: AHashMap::new(),
            seen_commits: AHashSet::new(),
            commits_analyzed: 0,
            commits_skipped_fanout: 0,
        }
    }

    fn intern(&mut self, path: &str) -> u32 {
        if let Some(&id) = self.ids.get(path) {
            return id;
        }
        let id = self.paths.len() as u32;
        self.ids.insert(path.to_string(), id);
        self.paths.push(path.to_string());
        self.file_counts.push(0);
        id
    }

    pub fn observe(&mut self, commit: &Commit) {
        if !self.params.window.contains(commit.timestamp) || commit.files.is_empty() {
            return;
        }
        if !self.seen_commits.insert(commit.id.clone()) {
            return;
        }
        if commit.files.len() > self.params.max_fanout {
            self.commits_skipped_fanout += 1;
            return;
        }
        self.commits_analyzed += 1;

        let ids: Vec<u32> = commit.files.iter().map(|f| self.intern(f)).collect();
        for &id in &ids {
            self.file_counts[id as usize] += 1;
        }
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                let key = if a < b { (a, b) } else { (b, a) };
                *self.pair_counts.entry(key).or_insert(0) += 1;
            }
        }
    }

    pub fn finish(self) -> CoChangeResult {
        let mut entries: Vec<CoChangeEntry> = self
            .pair_counts
            .iter()
            .filter_map(|(&(a, b), &co)| {
                let total_a = self.file_counts[a as usize];
                let total_b = self.file_counts[b as usize];
                // a file seen in one commit has no meaningful co-change signal
                if co < self.params.min_co_occurrence || total_a < 2 || total_b < 2 {
                    return None;
                }
                let union = total_a + total_b - co;
                let (file_a, file_b, total_a, total_b) =
                    if self.paths[a as usize] < self.paths[b as usize] {
                        (&self.paths[a as usize], &self.paths[b as usize], total_a, total_b)
                    } else {
                        (&self.paths[b as usize], &self.paths[a as usize], total_b, total_a)
                    };
                Some(CoChangeEntry {
                    file_a: file_a.clone(),
                    file_b: file_b.clone(),
                    co_changes: co,
                    total_changes_a: total_a,
                    total_changes_b: total_b,
                    score: f64::from(co) / f64::from(union),
                })
            })
            .collect();

        entries.sort_by(|x, y| {
            y.score
                .partial_cmp(&x.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| x.file_a.cmp(&y.file_a))
                .then_with(|| x.file_b.cmp(&y.file_b))
        });

        CoChangeResult {
            entries,
            commits_analyzed: self.commits_analyzed,
            commits_skipped_fanout: self.commits_skipped_fanout,
        }
    }
}

/// Compute Jaccard co-change scores for every qualifying file pair.
pub fn compute(commits: &[Commit], params: CoChangeParams) -> CoChangeResult {
    let mut acc = CoChangeAccumulator::new(params);
    for commit in commits {
        acc.observe(commit);
    }
    acc.finish()
}

/// Ad-hoc analysis of a git repository's recent history.
///
/// - `dir`: the git repository directory
/// - `lookback`: number of recent commits to read
/// - `min_score`: drop pairs scoring below this (0.0 to 1.0)
/// - `filter_file`: only keep pairs containing this file
pub fn analyze_cochange(
    dir: &Path,
    lookback: usize,
    config: &CoChangeConfig,
    min_score: f64,
    filter_file: Option<&str>,
) -> Result<CoChangeResult> {
    if !min_score.is_finite() || !(0.0..=1.0).contains(&min_score) {
        bail!(RadarError::invalid_request(format!(
            "min_score must be a finite value in [0.0, 1.0], got {min_score}"
        )));
    }

    let read = ledger::read_git_log(dir, lookback)?;
    let Some(as_of) = read.commits.iter().map(|c| c.timestamp).max() else {
        return Ok(CoChangeResult::default());
    };

    let mut result = compute(&read.commits, CoChangeParams::from_config(config, as_of));
    result.entries.retain(|e| {
        e.score >= min_score
            && filter_file.is_none_or(|f| e.file_a == f || e.file_b == f)
    });
    debug!(
        dir = %dir.display(),
        entries = result.entries.len(),
        commits_analyzed = result.commits_analyzed,
        "co-change analysis done"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 86_400;

    fn params(as_of: i64) -> CoChangeParams {
        CoChangeParams {
            window: CoChangeWindow {
                as_of,
                span_secs: 180 * DAY,
            },
            min_co_occurrence: 2,
            max_fanout: 200,
        }
    }

    fn commit(id: &str, ts: i64, files: &[&str]) -> Commit {
        Commit::new(id, ts, "dev", "", files.iter().copied())
    }

    #[test]
    fn two_of_three_scenario() {
        let commits = vec![
            commit("c1", 1, &["a.py", "b.py"]),
            commit("c2", 2, &["a.py", "b.py"]),
            commit("c3", 3, &["a.py"]),
        ];
        let result = compute(&commits, params(3));

        assert_eq!(result.entries.len(), 1);
        let entry = &result.entries[0];
        assert_eq!((entry.file_a.as_str(), entry.file_b.as_str()), ("a.py", "b.py"));
        assert_eq!(entry.co_changes, 2);
        assert_eq!(entry.total_changes_a, 3);
        assert_eq!(entry.total_changes_b, 2);
        assert!((entry.score - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(result.commits_analyzed, 3);
    }

    #[test]
    fn score_is_symmetric_and_bounded() {
        let commits = vec![
            commit("c1", 1, &["x.rs", "y.rs", "z.rs"]),
            commit("c2", 2, &["x.rs", "y.rs"]),
            commit("c3", 3, &["y.rs", "z.rs"]),
            commit("c4", 4, &["x.rs", "z.rs"]),
            commit("c5", 5, &["x.rs", "y.rs", "z.rs"]),
        ];
        let result = compute(&commits, params(5));
        assert!(!result.entries.is_empty());

        for a in ["x.rs", "y.rs", "z.rs"] {
            for b in ["x.rs", "y.rs", "z.rs"] {
                let s = result.score(a, b);
                assert_eq!(s, result.score(b, a));
                assert!((0.0..=1.0).contains(&s));
            }
        }
        for entry in &result.entries {
            assert!(entry.file_a < entry.file_b);
        }
    }

    #[test]
    fn score_is_one_iff_identical_membership() {
        let commits = vec![
            commit("c1", 1, &["a.rs", "b.rs", "c.rs"]),
            commit("c2", 2, &["a.rs", "b.rs", "c.rs"]),
            commit("c3", 3, &["a.rs", "b.rs"]),
        ];
        let result = compute(&commits, params(3));

        assert_eq!(result.score("a.rs", "b.rs"), 1.0);
        assert!(result.score("a.rs", "c.rs") < 1.0);
        assert!(result.score("b.rs", "c.rs") < 1.0);
    }

    #[test]
    fn single_commit_file_has_no_neighbors() {
        let commits = vec![
            commit("c1", 1, &["a.py", "b.py", "once.py"]),
            commit("c2", 2, &["a.py", "b.py"]),
        ];
        let result = compute(&commits, params(2));

        assert_eq!(result.score("a.py", "once.py"), 0.0);
        assert!(!result.neighbors().contains_key("once.py"));
        assert!(result.neighbors().contains_key("a.py"));
    }

    #[test]
    fn pairs_below_min_co_occurrence_are_dropped() {
        let commits = vec![
            commit("c1", 1, &["a.rs", "b.rs"]),
            commit("c2", 2, &["a.rs"]),
            commit("c3", 3, &["b.rs"]),
        ];
        let result = compute(&commits, params(3));
        assert!(result.entries.is_empty());

        let mut loose = params(3);
        loose.min_co_occurrence = 1;
        let result = compute(&commits, loose);
        assert!((result.score("a.rs", "b.rs") - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn fanout_commits_are_excluded() {
        let wide: Vec<String> = (0..5).map(|i| format!("gen/{i}.rs")).collect();
        let mut commits = vec![
            commit("c1", 1, &["a.rs", "b.rs"]),
            commit("c2", 2, &["a.rs", "b.rs"]),
        ];
        let mut big = wide.clone();
        big.push("a.rs".into());
        commits.push(Commit::new("c3", 3, "bot", "bulk rename", big));
        commits.push(Commit::new("c4", 4, "bot", "bulk rename", wide));

        let mut p = params(4);
        p.max_fanout = 4;
        let result = compute(&commits, p);

        assert_eq!(result.commits_skipped_fanout, 2);
        assert_eq!(result.commits_analyzed, 2);
        // c3 does not dilute a.rs's count
        assert_eq!(result.score("a.rs", "b.rs"), 1.0);
        assert_eq!(result.score("gen/0.rs", "gen/1.rs"), 0.0);
    }

    #[test]
    fn commits_outside_window_are_ignored() {
        let commits = vec![
            commit("old1", 0, &["a.rs", "b.rs"]),
            commit("old2", DAY, &["a.rs", "b.rs"]),
            commit("new1", 400 * DAY, &["a.rs", "c.rs"]),
            commit("new2", 401 * DAY, &["a.rs", "c.rs"]),
        ];
        let result = compute(&commits, params(401 * DAY));

        assert_eq!(result.commits_analyzed, 2);
        assert_eq!(result.score("a.rs", "b.rs"), 0.0);
        assert_eq!(result.score("a.rs", "c.rs"), 1.0);
    }

    #[test]
    fn duplicate_commit_ids_count_once() {
        let commits = vec![
            commit("c1", 1, &["a.py", "b.py"]),
            commit("c1", 1, &["a.py", "b.py"]),
            commit("c2", 2, &["a.py", "b.py"]),
            commit("c3", 3, &["a.py"]),
        ];
        let result = compute(&commits, params(3));
        assert_eq!(result.commits_analyzed, 3);
        assert!((result.score("a.py", "b.py") - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn result_does_not_depend_on_commit_order() {
        let commits = vec![
            commit("c1", 1, &["a.rs", "b.rs", "c.rs"]),
            commit("c2", 2, &["a.rs", "b.rs"]),
            commit("c3", 3, &["b.rs", "c.rs"]),
            commit("c4", 4, &["a.rs", "c.rs"]),
        ];
        let mut reversed = commits.clone();
        reversed.reverse();

        let forward = compute(&commits, params(4));
        let backward = compute(&reversed, params(4));
        assert_eq!(forward.entries, backward.entries);
    }

    #[test]
    fn neighbors_are_sorted_by_score_then_path() {
        let commits = vec![
            commit("c1", 1, &["hub.rs", "b.rs", "a.rs"]),
            commit("c2", 2, &["hub.rs", "b.rs", "a.rs"]),
            commit("c3", 3, &["hub.rs", "c.rs"]),
            commit("c4", 4, &["hub.rs", "c.rs"]),
            commit("c5", 5, &["hub.rs"]),
        ];
        let neighbors = compute(&commits, params(5)).neighbors();
        let hub: Vec<&str> = neighbors["hub.rs"].iter().map(|n| n.path.as_str()).collect();
        // a.rs and b.rs tie at 2/5 and c.rs also scores 2/5
        assert_eq!(hub, vec!["a.rs", "b.rs", "c.rs"]);
    }
}
