use std::collections::{BTreeMap, BTreeSet};

use crate::config::RiskConfig;
use crate::models::record::FileImpactRecord;
use crate::models::risk::{FileRisk, RiskReport};

const CHURN_WEIGHT: f64 = 0.4;
const OWNERSHIP_WEIGHT: f64 = 0.4;
const FLAKE_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, Copy)]
pub struct RiskParams {
    /// Churn that maps to a full churn sub-score
    pub churn_reference: f64,
}

impl From<&RiskConfig> for RiskParams {
    fn from(config: &RiskConfig) -> Self {
        Self {
            churn_reference: config.churn_reference,
        }
    }
}

impl Default for RiskParams {
    fn default() -> Self {
        Self::from(&RiskConfig::default())
    }
}

/// `min(churn / reference, 1) * 100`
pub fn churn_score(churn: u32, params: RiskParams) -> f64 {
    (f64::from(churn) / params.churn_reference).min(1.0) * 100.0
}

/// Fewer owners is riskier: one owner scores 100, two 50, and unowned code
/// counts as maximal risk.
pub fn ownership_score(owner_count: usize) -> f64 {
    if owner_count == 0 {
        100.0
    } else {
        100.0 / owner_count as f64
    }
}

/// Score one file. A missing record is treated as unowned with no churn.
pub fn file_score(
    path: &str,
    record: Option<&FileImpactRecord>,
    flake_density: Option<f64>,
    params: RiskParams,
) -> FileRisk {
    let churn = record.map_or(0, |r| r.churn);
    let owner_count = record.map_or(0, |r| r.owners.len());

    let churn_score = churn_score(churn, params);
    let ownership_score = ownership_score(owner_count);
    let flake_score = flake_density
        .filter(|d| d.is_finite())
        .map(|d| d.clamp(0.0, 1.0) * 100.0);

    let score = match flake_score {
        Some(flake) => {
            CHURN_WEIGHT * churn_score + OWNERSHIP_WEIGHT * ownership_score + FLAKE_WEIGHT * flake
        }
        None => {
            let total = CHURN_WEIGHT + OWNERSHIP_WEIGHT;
            (CHURN_WEIGHT * churn_score + OWNERSHIP_WEIGHT * ownership_score) / total
        }
    };

    FileRisk {
        path: path.to_string(),
        score,
        churn_score,
        ownership_score,
        flake_score,
        churn,
        owner_count,
    }
}

/// Risk of a file set: the maximum of its members, so one risky file is
/// never averaged away. Files are reported in path order.
pub fn score<'a, I>(
    paths: I,
    records: &BTreeMap<String, FileImpactRecord>,
    flakes: Option<&BTreeMap<String, f64>>,
    params: RiskParams,
) -> RiskReport
where
    I: IntoIterator<Item = &'a str>,
{
    let unique: BTreeSet<&str> = paths.into_iter().collect();
    let files: Vec<FileRisk> = unique
        .into_iter()
        .map(|path| {
            let flake = flakes.and_then(|f| f.get(path).copied());
            file_score(path, records.get(path), flake, params)
        })
        .collect();

    let riskiest = files
        .iter()
        .fold(None::<&FileRisk>, |best, f| match best {
            Some(b) if b.score >= f.score => Some(b),
            _ => Some(f),
        });

    RiskReport {
        score: riskiest.map_or(0.0, |f| f.score),
        riskiest: riskiest.map(|f| f.path.clone()),
        files,
    }
}
