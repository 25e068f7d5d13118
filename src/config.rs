//! Configuration loading and generation.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::RadarError;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enable debug logging to file
    pub debug: bool,

    /// Path to log directory
    pub log_path: PathBuf,

    /// Directory holding per-repository index snapshots
    pub store_path: PathBuf,

    pub cochange: CoChangeConfig,
    pub ownership: OwnershipConfig,
    pub index: IndexConfig,
    pub fusion: FusionConfig,
    pub graph: GraphConfig,
    pub risk: RiskConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoChangeConfig {
    /// Trailing window for pair counting, in days
    pub window_days: u32,
    /// Minimum number of shared commits before a pair is scored
    pub min_co_occurrence: u32,
    /// Commits touching more files than this are left out of pair counting
    pub max_fanout: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OwnershipConfig {
    /// Trailing window for churn, in days
    pub churn_window_days: u32,
    pub max_owners: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Co-change neighbors kept per file record
    pub top_k_neighbors: usize,
    /// Batch-level publish retries after the first attempt
    pub publish_retries: u32,
    /// Initial backoff between publish attempts (doubles each retry)
    pub retry_backoff_ms: u64,
    /// Repository snapshots kept in memory
    pub snapshot_cache: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub rank_constant: f64,
    /// Hits requested from each retriever before fusion
    pub candidate_pool: usize,
    pub retriever_timeout_ms: u64,
    pub default_k: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub max_depth: usize,
    pub max_vertices: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Churn (commits per churn window) that maps to a full churn sub-score
    pub churn_reference: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dim: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            log_path: default_log_path(),
            store_path: default_store_path(),
            cochange: CoChangeConfig::default(),
            ownership: OwnershipConfig::default(),
            index: IndexConfig::default(),
            fusion: FusionConfig::default(),
            graph: GraphConfig::default(),
            risk: RiskConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for CoChangeConfig {
    fn default() -> Self {
        Self {
            window_days: 180,
            min_co_occurrence: 2,
            max_fanout: 200,
        }
    }
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            churn_window_days: 30,
            max_owners: 3,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            top_k_neighbors: 20,
            publish_retries: 3,
            retry_backoff_ms: 200,
            snapshot_cache: 16,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rank_constant: 60.0,
            candidate_pool: 100,
            retriever_timeout_ms: 3000,
            default_k: 10,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_vertices: 50,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            churn_reference: 10.0,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dim: 384 }
    }
}

impl CoChangeConfig {
    pub fn window_secs(&self) -> i64 {
        i64::from(self.window_days) * SECS_PER_DAY
    }
}

impl OwnershipConfig {
    pub fn churn_window_secs(&self) -> i64 {
        i64::from(self.churn_window_days) * SECS_PER_DAY
    }
}

impl Config {
    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.cochange.window_days == 0 || self.ownership.churn_window_days == 0 {
            bail!(RadarError::invalid_request(
                "window_days and churn_window_days must be at least 1",
            ));
        }
        if self.cochange.min_co_occurrence == 0 {
            bail!(RadarError::invalid_request(
                "min_co_occurrence must be at least 1",
            ));
        }
        if self.cochange.max_fanout < 2 {
            bail!(RadarError::invalid_request("max_fanout must be at least 2"));
        }
        if self.ownership.max_owners == 0 {
            bail!(RadarError::invalid_request("max_owners must be at least 1"));
        }
        if !self.fusion.rank_constant.is_finite() || self.fusion.rank_constant < 0.0 {
            bail!(RadarError::invalid_request(format!(
                "rank_constant must be a finite non-negative value, got {}",
                self.fusion.rank_constant
            )));
        }
        if self.fusion.candidate_pool == 0 || self.fusion.default_k == 0 {
            bail!(RadarError::invalid_request(
                "candidate_pool and default_k must be at least 1",
            ));
        }
        if !self.risk.churn_reference.is_finite() || self.risk.churn_reference <= 0.0 {
            bail!(RadarError::invalid_request(format!(
                "churn_reference must be a finite positive value, got {}",
                self.risk.churn_reference
            )));
        }
        if self.embedding.dim == 0 {
            bail!(RadarError::invalid_request("embedding dim must be at least 1"));
        }
        Ok(())
    }
}

fn config_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("change-radar")
}

/// Default log path: ~/.config/change-radar/logs
fn default_log_path() -> PathBuf {
    config_root().join("logs")
}

/// Default store path: <cache dir>/change-radar/index
fn default_store_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("change-radar")
        .join("index")
}

/// Configuration service.
pub struct ConfigService;

impl ConfigService {
    /// Get the default configuration file path.
    pub fn default_path() -> PathBuf {
        config_root().join("config.toml")
    }

    /// Load configuration from file.
    ///
    /// If `path` is `None`, uses the default path.
    /// If the file doesn't exist, returns default configuration.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = path.map(PathBuf::from).unwrap_or_else(Self::default_path);
        let config_dir = path.parent();

        if !path.exists() {
            // Return defaults, don't auto-create
            let mut config = Config::default();
            if let Some(dir) = config_dir {
                config.log_path = dir.join("logs");
            }
            return Ok(config);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        // If log_path was not explicitly set, use config file's directory/logs
        if config.log_path == default_log_path()
            && let Some(dir) = config_dir
        {
            config.log_path = dir.join("logs");
        }

        config.validate()?;
        Ok(config)
    }

    /// Generate default configuration file at the default path.
    pub fn generate_default() -> Result<()> {
        Self::generate_at(&Self::default_path())
    }

    /// Generate default configuration file at the specified path.
    pub fn generate_at(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = Self::default_config_content();
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Generate default configuration content with comments.
    fn default_config_content() -> String {
        r#"# change-radar configuration file
# https://github.com/owayo/change-radar

# Enable debug logging to file (default: false)
debug = false

# Path to log directory (default: ~/.config/change-radar/logs)
# log_path = "~/.config/change-radar/logs"

# Directory for per-repository index snapshots (default: <cache dir>/change-radar/index)
# store_path = "~/.cache/change-radar/index"

[cochange]
# Trailing window for co-change pair counting, in days
window_days = 180
# Pairs sharing fewer commits than this are not scored
min_co_occurrence = 2
# Commits touching more files than this are left out of pair counting
max_fanout = 200

[ownership]
# Trailing window for churn, in days
churn_window_days = 30
max_owners = 3

[index]
top_k_neighbors = 20
publish_retries = 3
retry_backoff_ms = 200
snapshot_cache = 16

[fusion]
rank_constant = 60.0
candidate_pool = 100
retriever_timeout_ms = 3000
default_k = 10

[graph]
max_depth = 2
max_vertices = 50

[risk]
churn_reference = 10.0

[embedding]
dim = 384
"#
        .to_string()
    }
}
