use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::schemars;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};

use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{ErrorCode, RadarError, code_of};
use crate::service::{AppService, CommitSource};

// ---------------------------------------------------------------------------
// Tool parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ImpactSearchParams {
    /// Natural-language description of the change or incident
    pub query: String,
    /// Repository identifier used at ingestion
    pub repo_id: String,
    /// Number of commits to return (default from config, usually 10)
    #[serde(default)]
    pub k: Option<usize>,
    /// Only commits from the last N months
    #[serde(default)]
    pub time_range_months: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FileHistoryParams {
    /// Repository-relative file path
    pub file: String,
    /// Repository identifier used at ingestion
    pub repo_id: String,
    /// Number of commits to list (default: 50)
    #[serde(default)]
    pub size: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct OwnerLookupParams {
    /// Repository-relative file path
    pub file: String,
    /// Repository identifier used at ingestion
    pub repo_id: String,
    /// Drop co-change neighbors scoring below this (0.0 to 1.0)
    #[serde(default)]
    pub min_score: Option<f64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RiskGraphParams {
    /// Seed file paths
    pub files: Vec<String>,
    /// Repository identifier used at ingestion
    pub repo_id: String,
    /// Maximum hops from a seed (default: 2)
    #[serde(default)]
    pub max_depth: Option<usize>,
    /// Maximum number of vertices (default: 50)
    #[serde(default)]
    pub max_vertices: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RiskScoreParams {
    /// Candidate file set (e.g. the files of a pull request)
    pub files: Vec<String>,
    /// Repository identifier used at ingestion
    pub repo_id: String,
    /// Per-file flake density in [0, 1]
    #[serde(default)]
    pub flakes: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CochangeAnalyzeParams {
    /// Git repository directory
    pub dir: String,
    /// Number of recent commits to analyze (default: 200)
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    /// Minimum Jaccard score (default: 0.3)
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Filter to pairs containing this file
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IngestRepoParams {
    /// Identifier to index the repository under
    pub repo_id: String,
    /// Git repository directory
    #[serde(default)]
    pub dir: Option<String>,
    /// NDJSON commit file, one commit object per line (instead of dir)
    #[serde(default)]
    pub commits: Option<String>,
    /// Number of recent commits to read from git (default: 200)
    #[serde(default = "default_lookback")]
    pub lookback: usize,
}

fn default_lookback() -> usize {
    200
}

fn default_min_score() -> f64 {
    0.3
}

// ---------------------------------------------------------------------------
// MCP Server
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ChangeRadarServer {
    tool_router: ToolRouter<Self>,
    service: Arc<AppService>,
}

#[tool_router]
impl ChangeRadarServer {
    pub fn new(service: Arc<AppService>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            service,
        }
    }

    #[tool(
        name = "impact_search",
        description = "Hybrid search over commit history: the commits most related to a description, with the files and authors they involve"
    )]
    async fn impact_search(
        &self,
        params: Parameters<ImpactSearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        Self::to_tool_result(
            self.service
                .search(&p.query, &p.repo_id, p.k, p.time_range_months)
                .await,
        )
    }

    #[tool(
        name = "file_history",
        description = "Commits that touched a file, newest first"
    )]
    async fn file_history(
        &self,
        params: Parameters<FileHistoryParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        Self::to_tool_result(self.service.history(&p.file, &p.repo_id, p.size).await)
    }

    #[tool(
        name = "owner_lookup",
        description = "Owners, churn, co-change neighbors and related tests of a file"
    )]
    async fn owner_lookup(
        &self,
        params: Parameters<OwnerLookupParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        Self::to_tool_result(
            self.service
                .get_impact(&p.file, &p.repo_id, p.min_score)
                .await,
        )
    }

    #[tool(
        name = "risk_graph",
        description = "Bounded co-change graph around a set of files"
    )]
    async fn risk_graph(
        &self,
        params: Parameters<RiskGraphParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        Self::to_tool_result(
            self.service
                .explore_graph(&p.files, &p.repo_id, p.max_depth, p.max_vertices)
                .await,
        )
    }

    #[tool(
        name = "risk_score",
        description = "Risk score (0-100) of a file set from churn, ownership concentration and flakiness"
    )]
    async fn risk_score(
        &self,
        params: Parameters<RiskScoreParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        Self::to_tool_result(
            self.service
                .get_risk(&p.files, &p.repo_id, p.flakes.as_ref())
                .await,
        )
    }

    #[tool(
        name = "cochange_analyze",
        description = "Analyze co-change patterns from git history to find files that frequently change together"
    )]
    async fn cochange_analyze(
        &self,
        params: Parameters<CochangeAnalyzeParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        Self::to_tool_result(self.service.analyze_cochange(
            &p.dir,
            p.lookback,
            p.min_score,
            p.file.as_deref(),
        ))
    }

    #[tool(
        name = "ingest_repo",
        description = "Index a repository's history (git directory or NDJSON commit file) for the other tools"
    )]
    async fn ingest_repo(
        &self,
        params: Parameters<IngestRepoParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let source = match (p.dir, p.commits) {
            (Some(dir), None) => CommitSource::Git {
                dir: PathBuf::from(dir),
                lookback: p.lookback,
            },
            (None, Some(path)) => CommitSource::Ndjson {
                path: PathBuf::from(path),
            },
            _ => {
                return Self::to_tool_result::<()>(Err(RadarError::invalid_request(
                    "exactly one of dir or commits is required",
                )
                .into()));
            }
        };
        let outcomes = self.service.ingest(vec![(p.repo_id, source)]).await;
        let failed = outcomes
            .as_ref()
            .is_ok_and(|o| o.iter().any(|o| !o.is_published()));
        let mut result = Self::to_tool_result(outcomes)?;
        if failed {
            result.is_error = Some(true);
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

impl ChangeRadarServer {
    fn to_tool_result<T: serde::Serialize>(
        result: anyhow::Result<T>,
    ) -> Result<CallToolResult, McpError> {
        match result {
            Ok(value) => {
                let json = serde_json::to_string(&value)
                    .map_err(|e| McpError::internal_error(e.to_string(), None))?;
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Err(e) => match code_of(&e) {
                Some(ErrorCode::InvalidRequest) => {
                    Err(McpError::invalid_params(e.to_string(), None))
                }
                _ => Err(McpError::internal_error(e.to_string(), None)),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// ServerHandler implementation
// ---------------------------------------------------------------------------

#[tool_handler]
impl ServerHandler for ChangeRadarServer {
    fn get_info(&self) -> ServerInfo {
        let mut capabilities = ServerCapabilities::default();
        capabilities.tools = Some(ToolsCapability::default());
        let mut server_info = Implementation::default();
        server_info.name = "change-radar".into();
        server_info.version = env!("CARGO_PKG_VERSION").into();
        let mut info = ServerInfo::default();
        info.protocol_version = ProtocolVersion::V_2024_11_05;
        info.capabilities = capabilities;
        info.server_info = server_info;
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn server() -> ChangeRadarServer {
        let service = AppService::in_memory(Config::default()).unwrap();
        ChangeRadarServer::new(Arc::new(service))
    }

    #[test]
    fn server_info_names_the_binary() {
        let info = server().get_info();
        assert_eq!(info.server_info.name, "change-radar");
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn all_tools_are_routed() {
        let names: Vec<String> = server()
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        for expected in [
            "impact_search",
            "owner_lookup",
            "risk_graph",
            "risk_score",
            "cochange_analyze",
            "ingest_repo",
            "file_history",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn ingest_requires_exactly_one_source() {
        let err = server()
            .ingest_repo(Parameters(IngestRepoParams {
                repo_id: "acme".into(),
                dir: None,
                commits: None,
                lookback: 10,
            }))
            .await
            .unwrap_err();
        assert!(err.message.contains("exactly one"));
    }

    #[tokio::test]
    async fn owner_lookup_of_unindexed_file_succeeds() {
        let result = server()
            .owner_lookup(Parameters(OwnerLookupParams {
                file: "src/lib.rs".into(),
                repo_id: "acme".into(),
                min_score: None,
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));
    }

    #[tokio::test]
    async fn failed_ingest_is_an_error_result_with_the_reason() {
        let result = server()
            .ingest_repo(Parameters(IngestRepoParams {
                repo_id: "acme".into(),
                dir: None,
                commits: Some("/no/such/commits.ndjson".into()),
                lookback: 10,
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        let text = serde_json::to_string(&result.content).unwrap();
        assert!(text.contains("IO_ERROR"), "{text}");
    }

    #[tokio::test]
    async fn file_history_rejects_zero_size() {
        let err = server()
            .file_history(Parameters(FileHistoryParams {
                file: "src/lib.rs".into(),
                repo_id: "acme".into(),
                size: Some(0),
            }))
            .await
            .unwrap_err();
        assert!(err.message.contains("size"));
    }
}
