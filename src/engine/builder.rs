use std::collections::{BTreeMap, BTreeSet};

use crate::engine::classify::{file_stem, tested_stem};
use crate::engine::ownership::FileOwnership;
use crate::models::cochange::CoChangeResult;
use crate::models::record::FileImpactRecord;

/// Merge co-change neighbors and ownership facts into one record per file.
///
/// Records come out sorted by path with `risk_score` left at 0; scoring is
/// the caller's job. `top_k` bounds the neighbor list of every record and
/// `test_neighbors` is drawn from those kept neighbors. Test files are also
/// paired with the files they are named after, independent of co-change.
pub fn build<F>(
    repo_id: &str,
    co_change: &CoChangeResult,
    ownership: &BTreeMap<String, FileOwnership>,
    is_test: F,
    top_k: usize,
) -> Vec<FileImpactRecord>
where
    F: Fn(&str) -> bool,
{
    let mut neighbors = co_change.neighbors();
    let paths: BTreeSet<String> = ownership
        .keys()
        .chain(neighbors.keys())
        .cloned()
        .collect();

    let mut tests_by_stem: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut sources_by_stem: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for path in &paths {
        let (stem, by_stem) = if is_test(path) {
            (tested_stem(path), &mut tests_by_stem)
        } else {
            (file_stem(path), &mut sources_by_stem)
        };
        if let Some(stem) = stem {
            by_stem.entry(stem).or_default().push(path.clone());
        }
    }

    paths
        .into_iter()
        .map(|path| {
            let mut record = FileImpactRecord::empty(repo_id, &path);
            let mut co_change = neighbors.remove(&path).unwrap_or_default();
            co_change.truncate(top_k);

            let mut test_neighbors: Vec<String> = co_change
                .iter()
                .filter(|n| is_test(&n.path))
                .map(|n| n.path.clone())
                .collect();
            test_neighbors.sort();

            record.co_change = co_change;
            record.test_neighbors = test_neighbors;
            record.is_test_file = is_test(&path);
            let named = if record.is_test_file {
                tested_stem(&path).and_then(|stem| sources_by_stem.get(&stem))
            } else {
                file_stem(&path).and_then(|stem| tests_by_stem.get(&stem))
            };
            let named = named.cloned().unwrap_or_default();
            if record.is_test_file {
                record.tested_files = named;
            } else {
                record.named_tests = named;
            }
            if let Some(facts) = ownership.get(&path) {
                record.owners = facts.owners.clone();
                record.churn = facts.churn;
                record.total_commits = facts.total_commits;
                record.first_seen = facts.first_seen;
                record.last_modified = facts.last_modified;
            }
            record
        })
        .collect()
}
