use ahash::{AHashMap, AHashSet};
use std::collections::BTreeMap;

use crate::config::OwnershipConfig;
use crate::models::commit::Commit;
use crate::models::record::Owner;

#[derive(Debug, Clone, Copy)]
pub struct OwnershipParams {
    /// End of the churn window; later commits are ignored
    pub as_of: i64,
    pub churn_window_secs: i64,
    pub max_owners: usize,
}

impl OwnershipParams {
    pub fn from_config(config: &OwnershipConfig, as_of: i64) -> Self {
        Self {
            as_of,
            churn_window_secs: config.churn_window_secs(),
            max_owners: config.max_owners,
        }
    }
}

/// Ownership and change-velocity facts for one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileOwnership {
    pub owners: Vec<Owner>,
    pub churn: u32,
    pub total_commits: u32,
    pub first_seen: Option<i64>,
    pub last_modified: Option<i64>,
}

#[derive(Default)]
struct FileStats {
    /// author -> (commit count, last touched)
    authors: AHashMap<String, (u32, i64)>,
    churn: u32,
    total: u32,
    first_seen: i64,
    last_modified: i64,
}

pub struct OwnershipAccumulator {
    params: OwnershipParams,
    files: AHashMap<String, FileStats>,
    seen_commits: AHashSet<String>,
}

impl OwnershipAccumulator {
    pub fn new(params: OwnershipParams) -> Self {
        Self {
            params,
            files: AHashMap::new(),
            seen_commits: AHashSet::new(),
        }
    }

    pub fn observe(&mut self, commit: &Commit) {
        if commit.timestamp > self.params.as_of || !self.seen_commits.insert(commit.id.clone()) {
            return;
        }
        let in_churn_window =
            commit.timestamp >= self.params.as_of.saturating_sub(self.params.churn_window_secs);

        for path in &commit.files {
            let stats = self.files.entry(path.clone()).or_insert_with(|| FileStats {
                first_seen: commit.timestamp,
                last_modified: commit.timestamp,
                ..FileStats::default()
            });
            stats.total += 1;
            stats.first_seen = stats.first_seen.min(commit.timestamp);
            stats.last_modified = stats.last_modified.max(commit.timestamp);
            if in_churn_window {
                stats.churn += 1;
            }
            let author = stats
                .authors
                .entry(commit.author.clone())
                .or_insert((0, commit.timestamp));
            author.0 += 1;
            author.1 = author.1.max(commit.timestamp);
        }
    }

    pub fn finish(self) -> BTreeMap<String, FileOwnership> {
        let max_owners = self.params.max_owners;
        self.files
            .into_iter()
            .map(|(path, stats)| {
                let mut owners: Vec<Owner> = stats
                    .authors
                    .into_iter()
                    .map(|(author, (commit_count, last_touched))| Owner {
                        author,
                        commit_count,
                        last_touched,
                    })
                    .collect();
                owners.sort_by(|a, b| {
                    b.commit_count
                        .cmp(&a.commit_count)
                        .then_with(|| b.last_touched.cmp(&a.last_touched))
                        .then_with(|| a.author.cmp(&b.author))
                });
                owners.truncate(max_owners);
                let ownership = FileOwnership {
                    owners,
                    churn: stats.churn,
                    total_commits: stats.total,
                    first_seen: Some(stats.first_seen),
                    last_modified: Some(stats.last_modified),
                };
                (path, ownership)
            })
            .collect()
    }
}

/// Resolve owners, churn and activity span for every file in `commits`.
pub fn resolve(commits: &[Commit], params: OwnershipParams) -> BTreeMap<String, FileOwnership> {
    let mut acc = OwnershipAccumulator::new(params);
    for commit in commits {
        acc.observe(commit);
    }
    acc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 86_400;

    fn params(as_of: i64) -> OwnershipParams {
        OwnershipParams {
            as_of,
            churn_window_secs: 30 * DAY,
            max_owners: 3,
        }
    }

    fn commit(id: &str, ts: i64, author: &str, files: &[&str]) -> Commit {
        Commit::new(id, ts, author, "", files.iter().copied())
    }

    #[test]
    fn owners_ranked_by_count_then_recency_then_name() {
        let commits = vec![
            commit("1", 10, "zoe", &["f.rs"]),
            commit("2", 20, "zoe", &["f.rs"]),
            commit("3", 30, "amy", &["f.rs"]),
            commit("4", 40, "bob", &["f.rs"]),
            commit("5", 40, "cat", &["f.rs"]),
            commit("6", 5, "dan", &["f.rs"]),
        ];
        let resolved = resolve(&commits, params(40));
        let owners: Vec<&str> = resolved["f.rs"]
            .owners
            .iter()
            .map(|o| o.author.as_str())
            .collect();
        // zoe has 2; bob and cat tie on count and recency, so name decides
        assert_eq!(owners, vec!["zoe", "bob", "cat"]);
        assert_eq!(resolved["f.rs"].owners[0].commit_count, 2);
        assert_eq!(resolved["f.rs"].owners[0].last_touched, 20);
    }

    #[test]
    fn single_contributor_yields_one_owner() {
        let commits = vec![commit("1", 1, "solo", &["a.rs"]), commit("2", 2, "solo", &["a.rs"])];
        let resolved = resolve(&commits, params(2));
        assert_eq!(resolved["a.rs"].owners.len(), 1);
        assert_eq!(resolved["a.rs"].owners[0].commit_count, 2);
    }

    #[test]
    fn churn_counts_only_the_trailing_window() {
        let as_of = 100 * DAY;
        let commits = vec![
            commit("old", 10 * DAY, "x", &["a.rs"]),
            commit("edge", as_of - 30 * DAY, "x", &["a.rs"]),
            commit("new", as_of, "y", &["a.rs"]),
        ];
        let resolved = resolve(&commits, params(as_of));
        let a = &resolved["a.rs"];
        assert_eq!(a.churn, 2);
        assert_eq!(a.total_commits, 3);
        assert_eq!(a.first_seen, Some(10 * DAY));
        assert_eq!(a.last_modified, Some(as_of));
    }

    #[test]
    fn wide_commits_still_count_toward_churn() {
        let files: Vec<String> = (0..500).map(|i| format!("f{i}.rs")).collect();
        let commits = vec![Commit::new("bulk", 1, "bot", "reformat", files)];
        let resolved = resolve(&commits, params(1));
        assert_eq!(resolved.len(), 500);
        assert_eq!(resolved["f0.rs"].churn, 1);
    }

    #[test]
    fn duplicate_commits_are_counted_once() {
        let commits = vec![commit("1", 1, "x", &["a.rs"]), commit("1", 1, "x", &["a.rs"])];
        let resolved = resolve(&commits, params(1));
        assert_eq!(resolved["a.rs"].total_commits, 1);
        assert_eq!(resolved["a.rs"].owners[0].commit_count, 1);
    }
}
