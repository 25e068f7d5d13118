//! Commit ledger adapters: `git log` and NDJSON files.

use anyhow::{Context, Result, bail};
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

use crate::error::{ErrorCode, RadarError};
use crate::models::commit::{Commit, LedgerRead};

const RECORD_SEP: char = '\x1e';
const FIELD_SEP: char = '\x1f';
const HEADER_END: char = '\x1d';

/// Read the last `lookback` non-merge commits of the repository at `dir`.
/// Commits are returned oldest first.
pub fn read_git_log(dir: &Path, lookback: usize) -> Result<LedgerRead> {
    let output = Command::new("git")
        .args([
            "log",
            "--no-merges",
            "--name-only",
            "--pretty=format:%x1e%H%x1f%ct%x1f%ae%x1f%B%x1d",
            "-n",
            &lookback.to_string(),
        ])
        .current_dir(dir)
        .output()
        .map_err(|e| RadarError::new(ErrorCode::IoError, format!("Failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(RadarError::new(
            ErrorCode::IoError,
            format!("git log failed: {}", stderr.trim()),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut read = parse_git_log(&stdout);
    // git prints newest first
    read.commits.reverse();
    debug!(
        dir = %dir.display(),
        commits = read.commits.len(),
        skipped = read.skipped,
        "git log read"
    );
    Ok(read)
}

/// Parse the output of the `git log` format used by `read_git_log`, in log order.
pub fn parse_git_log(output: &str) -> LedgerRead {
    let mut read = LedgerRead::default();

    for chunk in output.split(RECORD_SEP) {
        if chunk.trim().is_empty() {
            continue;
        }
        let Some((header, names)) = chunk.split_once(HEADER_END) else {
            warn!("git log entry without header terminator, skipping");
            read.skipped += 1;
            continue;
        };

        let mut fields = header.splitn(4, FIELD_SEP);
        let (Some(id), Some(ts), Some(author), Some(message)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            warn!("git log entry with missing fields, skipping");
            read.skipped += 1;
            continue;
        };
        let Ok(timestamp) = ts.trim().parse::<i64>() else {
            warn!(commit = id, timestamp = ts, "unparseable commit timestamp, skipping");
            read.skipped += 1;
            continue;
        };

        let files = names.lines().map(str::trim).filter(|l| !l.is_empty());
        let commit = Commit::new(id.trim(), timestamp, author.trim(), message.trim(), files);
        accept(&mut read, commit);
    }

    read
}

/// Read commits from an NDJSON file, one `Commit` object per line.
pub fn read_ndjson(path: &Path) -> Result<LedgerRead> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read commit file: {}", path.display()))?;
    let read = parse_ndjson(&content);
    debug!(
        path = %path.display(),
        commits = read.commits.len(),
        skipped = read.skipped,
        "commit file read"
    );
    Ok(read)
}

pub fn parse_ndjson(content: &str) -> LedgerRead {
    let mut read = LedgerRead::default();
    for (lineno, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Commit>(trimmed) {
            Ok(commit) => accept(&mut read, commit),
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "malformed commit line, skipping");
                read.skipped += 1;
            }
        }
    }
    read
}

fn accept(read: &mut LedgerRead, commit: Commit) {
    match commit.validate() {
        None => read.commits.push(commit),
        Some(reason) => {
            warn!(commit = %commit.id, reason, "invalid commit, skipping");
            read.skipped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, ts: &str, author: &str, message: &str, files: &[&str]) -> String {
        let mut s = format!("\x1e{id}\x1f{ts}\x1f{author}\x1f{message}\x1d\n");
        for f in files {
            s.push_str(f);
            s.push('\n');
        }
        s.push('\n');
        s
    }

    #[test]
    fn parses_git_log_entries() {
        let output = [
            entry("bbb", "200", "bob@x.io", "Second\n\nbody text", &["a.py", "b.py"]),
            entry("aaa", "100", "alice@x.io", "First", &["a.py"]),
        ]
        .concat();

        let read = parse_git_log(&output);
        assert_eq!(read.skipped, 0);
        assert_eq!(read.commits.len(), 2);
        let first = &read.commits[0];
        assert_eq!(first.id, "bbb");
        assert_eq!(first.timestamp, 200);
        assert_eq!(first.author, "bob@x.io");
        assert_eq!(first.message, "Second\n\nbody text");
        assert_eq!(
            first.files.iter().collect::<Vec<_>>(),
            vec!["a.py", "b.py"]
        );
    }

    #[test]
    fn git_log_skips_bad_timestamp_and_empty_commits() {
        let output = [
            entry("bad", "yesterday", "x@x.io", "msg", &["a.py"]),
            entry("empty", "100", "x@x.io", "no files", &[]),
            entry("ok", "100", "x@x.io", "fine", &["a.py"]),
        ]
        .concat();

        let read = parse_git_log(&output);
        assert_eq!(read.skipped, 2);
        assert_eq!(read.commits.len(), 1);
        assert_eq!(read.commits[0].id, "ok");
    }

    #[test]
    fn parses_ndjson_and_skips_malformed_lines() {
        let content = r#"{"id":"c1","timestamp":10,"author":"x","message":"m","files":["a.rs"]}

not json
{"id":"c2","timestamp":20,"author":"y","files":["a.rs","b.rs"]}
{"id":"","timestamp":30,"author":"z","files":["a.rs"]}
{"id":"c4","timestamp":40,"author":"z","files":[]}
"#;
        let read = parse_ndjson(content);
        assert_eq!(read.commits.len(), 2);
        assert_eq!(read.skipped, 3);
        assert_eq!(read.commits[1].id, "c2");
        assert!(read.commits[1].message.is_empty());
    }

    #[test]
    fn read_ndjson_missing_file_is_error() {
        let result = read_ndjson(Path::new("/nonexistent/commits.ndjson"));
        assert!(result.is_err());
    }
}
