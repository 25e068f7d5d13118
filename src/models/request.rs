use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A request to the change-radar engine (session mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarRequest {
    pub command: Command,
    #[serde(default)]
    pub repo_id: String,
    /// Natural-language query (for search)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Number of results (for search)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
    /// Only commits from the last N months (for search)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range_months: Option<u32>,
    /// Number of commits to list (for history)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    /// Single file path (for impact / history)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// File set (seeds for graph, candidates for risk)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    /// Minimum co-change score (for impact / cochange)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_vertices: Option<usize>,
    /// Per-file flake density in [0, 1] (for risk)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flakes: Option<BTreeMap<String, f64>>,
    /// Git repository directory (for ingest / cochange)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// NDJSON commit file (for ingest, instead of `dir`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commits: Option<String>,
    /// Number of recent commits to read from git
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookback: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Search,
    Impact,
    Graph,
    Risk,
    Ingest,
    Cochange,
    History,
}
