use serde::{Deserialize, Serialize};

/// Risk breakdown for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRisk {
    pub path: String,
    pub score: f64,
    pub churn_score: f64,
    pub ownership_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flake_score: Option<f64>,
    pub churn: u32,
    pub owner_count: usize,
}

/// Risk of a candidate file set: the maximum of its members.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub riskiest: Option<String>,
    pub files: Vec<FileRisk>,
}
