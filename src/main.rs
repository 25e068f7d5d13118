use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use change_radar::cli::{Cli, Commands};
use change_radar::config::ConfigService;
use change_radar::error::{ErrorBody, ErrorCode, RadarError};
use change_radar::models::request::{Command, RadarRequest};
use change_radar::service::{AppService, CommitSource};
use change_radar::session;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        // the output already describes what failed
        Ok(false) => std::process::exit(1),
        Err(e) => {
            println!("{}", make_error_line(&e));
            std::process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn serialize_output(value: &impl serde::Serialize, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}

fn print_output(value: &impl serde::Serialize, pretty: bool) -> Result<()> {
    let output = serialize_output(value, pretty)?;
    println!("{output}");
    Ok(())
}

fn make_error_line(e: &anyhow::Error) -> String {
    let body = ErrorBody::from(e);
    session::error_value(&body.code, &body.message).to_string()
}

/// Parse `ID=DIR` ingest arguments.
fn parse_repo_arg(arg: &str, lookback: usize) -> Result<(String, CommitSource)> {
    let Some((id, dir)) = arg.split_once('=') else {
        return Err(RadarError::new(
            ErrorCode::InvalidRequest,
            format!("--repo expects ID=DIR, got '{arg}'"),
        )
        .into());
    };
    Ok((
        id.trim().to_string(),
        CommitSource::Git {
            dir: PathBuf::from(dir.trim()),
            lookback,
        },
    ))
}

fn read_flakes(path: &str) -> Result<BTreeMap<String, f64>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read flake file: {path}"))?;
    serde_json::from_str(&content).map_err(|e| {
        RadarError::invalid_request(format!("Invalid flake file {path}: {e}")).into()
    })
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Run one command. `Ok(false)` means the output was printed but reports a
/// failure, such as a repository that could not be ingested.
fn run(cli: Cli) -> Result<bool> {
    let pretty = cli.pretty;

    // Load configuration
    let config = ConfigService::load(cli.config.as_deref())?;

    // Initialize logging if debug mode (CLI flag or config); the guard flushes on drop
    let _log_guard = if cli.debug || config.debug {
        Some(change_radar::logger::init(&config)?)
    } else {
        None
    };

    // Handle early-exit commands before creating AppService
    if let Commands::Init { path } = &cli.command {
        let config_path = if let Some(p) = path {
            ConfigService::generate_at(p)?;
            p.clone()
        } else {
            ConfigService::generate_default()?;
            ConfigService::default_path()
        };
        eprintln!("Configuration file created at: {}", config_path.display());
        return Ok(true);
    }

    let service = Arc::new(AppService::new(config)?);
    let rt = tokio::runtime::Runtime::new()?;

    let result = match cli.command {
        Commands::Ingest {
            repos,
            commits,
            repo_id,
            lookback,
        } => {
            let sources = match (commits, repo_id) {
                (Some(path), Some(id)) => vec![(
                    id,
                    CommitSource::Ndjson {
                        path: PathBuf::from(path),
                    },
                )],
                _ => repos
                    .iter()
                    .map(|arg| parse_repo_arg(arg, lookback))
                    .collect::<Result<Vec<_>>>()?,
            };
            let outcomes = rt.block_on(service.ingest(sources))?;
            print_output(&outcomes, pretty)?;
            return Ok(outcomes.iter().all(|o| o.is_published()));
        }
        Commands::Search {
            query,
            repo_id,
            k,
            months,
        } => {
            let result = rt.block_on(service.search(&query, &repo_id, k, months))?;
            print_output(&result, pretty)
        }
        Commands::History {
            file,
            repo_id,
            size,
        } => {
            let history = rt.block_on(service.history(&file, &repo_id, Some(size)))?;
            print_output(&history, pretty)
        }
        Commands::Impact {
            file,
            repo_id,
            min_score,
        } => {
            let record = rt.block_on(service.get_impact(&file, &repo_id, min_score))?;
            print_output(&record, pretty)
        }
        Commands::Graph {
            files,
            repo_id,
            max_depth,
            max_vertices,
        } => {
            let graph =
                rt.block_on(service.explore_graph(&files, &repo_id, max_depth, max_vertices))?;
            print_output(&graph, pretty)
        }
        Commands::Risk {
            files,
            repo_id,
            flakes,
        } => {
            let flakes = flakes.as_deref().map(read_flakes).transpose()?;
            let report = rt.block_on(service.get_risk(&files, &repo_id, flakes.as_ref()))?;
            print_output(&report, pretty)
        }
        Commands::Cochange {
            dir,
            lookback,
            min_score,
            file,
        } => {
            let result = service.analyze_cochange(&dir, lookback, min_score, file.as_deref())?;
            print_output(&result, pretty)
        }
        Commands::Session => {
            session::run_session(|req| rt.block_on(handle_request(&service, req)))
        }
        Commands::Mcp => rt.block_on(cmd_mcp(service)),
        Commands::Init { .. } => unreachable!("handled above"),
    };
    result.map(|()| true)
}

async fn cmd_mcp(service: Arc<AppService>) -> Result<()> {
    use rmcp::ServiceExt;
    let server = change_radar::mcp::ChangeRadarServer::new(service);
    let transport = rmcp::transport::io::stdio();
    let running = server
        .serve(transport)
        .await
        .map_err(|e| anyhow::anyhow!("MCP server initialization failed: {e}"))?;
    running
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Session handler
// ---------------------------------------------------------------------------

fn required<T>(value: Option<T>, field: &str, command: &str) -> Result<T> {
    value.ok_or_else(|| {
        RadarError::invalid_request(format!("{command} requires '{field}'")).into()
    })
}

async fn handle_request(service: &AppService, req: RadarRequest) -> Result<serde_json::Value> {
    match req.command {
        Command::Search => {
            let query = required(req.query, "query", "search")?;
            let result = service
                .search(&query, &req.repo_id, req.k, req.time_range_months)
                .await?;
            Ok(serde_json::to_value(result)?)
        }
        Command::Impact => {
            let file = required(req.file, "file", "impact")?;
            let record = service
                .get_impact(&file, &req.repo_id, req.min_score)
                .await?;
            Ok(serde_json::to_value(record)?)
        }
        Command::History => {
            let file = required(req.file, "file", "history")?;
            let history = service.history(&file, &req.repo_id, req.size).await?;
            Ok(serde_json::to_value(history)?)
        }
        Command::Graph => {
            let files = required(req.files, "files", "graph")?;
            let graph = service
                .explore_graph(&files, &req.repo_id, req.max_depth, req.max_vertices)
                .await?;
            Ok(serde_json::to_value(graph)?)
        }
        Command::Risk => {
            let files = required(req.files, "files", "risk")?;
            let report = service
                .get_risk(&files, &req.repo_id, req.flakes.as_ref())
                .await?;
            Ok(serde_json::to_value(report)?)
        }
        Command::Ingest => {
            let source = match (req.dir, req.commits) {
                (Some(dir), None) => CommitSource::Git {
                    dir: PathBuf::from(dir),
                    lookback: req.lookback.unwrap_or(200),
                },
                (None, Some(path)) => CommitSource::Ndjson {
                    path: PathBuf::from(path),
                },
                _ => {
                    return Err(RadarError::invalid_request(
                        "ingest requires exactly one of 'dir' or 'commits'",
                    )
                    .into());
                }
            };
            let outcomes = service.ingest(vec![(req.repo_id, source)]).await?;
            Ok(serde_json::to_value(outcomes)?)
        }
        Command::Cochange => {
            let dir = req.dir.as_deref().unwrap_or(".");
            let result = service.analyze_cochange(
                dir,
                req.lookback.unwrap_or(200),
                req.min_score.unwrap_or(0.3),
                req.file.as_deref(),
            )?;
            Ok(serde_json::to_value(result)?)
        }
    }
}
