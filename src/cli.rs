use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "change-radar",
    version,
    about = "Change impact and retrieval engine over commit history"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Pretty-print JSON output (default: compact)
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read commit history, build impact records and publish them to the index
    Ingest {
        /// Git repository to ingest as ID=DIR (repeatable; repositories run in parallel)
        #[arg(short, long = "repo", value_name = "ID=DIR")]
        repos: Vec<String>,

        /// NDJSON commit file, one commit object per line
        #[arg(long, requires = "repo_id", conflicts_with = "repos")]
        commits: Option<String>,

        /// Repository identifier for --commits
        #[arg(long)]
        repo_id: Option<String>,

        /// Number of recent commits to read from git (default: 200)
        #[arg(short, long, default_value = "200")]
        lookback: usize,
    },

    /// Hybrid search over a repository's commits
    Search {
        /// Natural-language query
        #[arg(short, long)]
        query: String,

        /// Repository identifier
        #[arg(short, long)]
        repo_id: String,

        /// Number of results (default from config)
        #[arg(short)]
        k: Option<usize>,

        /// Only commits from the last N months
        #[arg(long)]
        months: Option<u32>,
    },

    /// Commits that touched one file, newest first
    History {
        /// Repository-relative file path
        #[arg(short, long)]
        file: String,

        /// Repository identifier
        #[arg(short, long)]
        repo_id: String,

        /// Number of commits to list
        #[arg(short, long, default_value = "50")]
        size: usize,
    },

    /// Owners, churn and co-change neighbors of one file
    Impact {
        /// Repository-relative file path
        #[arg(short, long)]
        file: String,

        /// Repository identifier
        #[arg(short, long)]
        repo_id: String,

        /// Drop neighbors scoring below this (0.0 to 1.0)
        #[arg(short, long)]
        min_score: Option<f64>,
    },

    /// Bounded co-change graph around seed files
    Graph {
        /// Comma-separated seed file paths
        #[arg(short, long, value_delimiter = ',', required = true)]
        files: Vec<String>,

        /// Repository identifier
        #[arg(short, long)]
        repo_id: String,

        /// Maximum hops from a seed (default from config)
        #[arg(long)]
        max_depth: Option<usize>,

        /// Maximum number of vertices (default from config)
        #[arg(long)]
        max_vertices: Option<usize>,
    },

    /// Risk score of a candidate file set
    Risk {
        /// Comma-separated file paths
        #[arg(short, long, value_delimiter = ',', required = true)]
        files: Vec<String>,

        /// Repository identifier
        #[arg(short, long)]
        repo_id: String,

        /// JSON file mapping path to flake density in [0, 1]
        #[arg(long)]
        flakes: Option<String>,
    },

    /// Analyze co-change patterns from git history (nothing is indexed)
    Cochange {
        /// Git repository directory
        #[arg(short, long, default_value = ".")]
        dir: String,

        /// Number of recent commits to analyze (default: 200)
        #[arg(short, long, default_value = "200")]
        lookback: usize,

        /// Minimum Jaccard score (0.0 to 1.0, default: 0.3)
        #[arg(short, long, default_value = "0.3")]
        min_score: f64,

        /// Filter to pairs containing this file
        #[arg(short, long)]
        file: Option<String>,
    },

    /// NDJSON streaming session (stdin → stdout)
    Session,

    /// Start MCP (Model Context Protocol) server over stdio
    Mcp,

    /// Generate default configuration file
    Init {
        /// Path to write the configuration file (default: ~/.config/change-radar/config.toml)
        #[arg(short, long)]
        path: Option<std::path::PathBuf>,
    },
}
