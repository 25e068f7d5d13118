use serde::{Deserialize, Serialize};

/// A ranked contributor of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub author: String,
    pub commit_count: u32,
    /// Most recent commit by this author on the file, unix seconds
    pub last_touched: i64,
}

/// A co-change neighbor and its Jaccard score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub path: String,
    pub score: f64,
}

/// Per-file impact document, keyed by `(repo_id, file_path)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileImpactRecord {
    pub repo_id: String,
    pub file_path: String,
    pub owners: Vec<Owner>,
    /// Sorted by score descending, then path
    pub co_change: Vec<Neighbor>,
    pub test_neighbors: Vec<String>,
    /// Test files named after this file, co-changed or not
    #[serde(default)]
    pub named_tests: Vec<String>,
    /// For a test file, the files it is named after
    #[serde(default)]
    pub tested_files: Vec<String>,
    pub churn: u32,
    pub risk_score: f64,
    #[serde(default)]
    pub is_test_file: bool,
    #[serde(default)]
    pub total_commits: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub first_seen: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_modified: Option<i64>,
}

impl FileImpactRecord {
    /// The record returned for a file that has never been indexed.
    pub fn empty(repo_id: &str, file_path: &str) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            file_path: file_path.to_string(),
            owners: Vec::new(),
            co_change: Vec::new(),
            test_neighbors: Vec::new(),
            named_tests: Vec::new(),
            tested_files: Vec::new(),
            churn: 0,
            risk_score: 0.0,
            is_test_file: false,
            total_commits: 0,
            first_seen: None,
            last_modified: None,
        }
    }
}
