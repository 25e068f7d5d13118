//! File logging with daily rotation in local time.

use anyhow::{Context, Result};
use logroller::{LogRollerBuilder, Rotation, RotationAge, TimeZone};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::prelude::*;

use crate::config::Config;

/// Log file prefix; rotated files are named `change-radar.YYYY-MM-DD`.
const LOG_PREFIX: &str = "change-radar";
const RETENTION_DAYS: u64 = 3;
/// Used when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVE: &str = "change_radar=debug,info";

/// Flushes buffered log lines when dropped. Hold it for the life of the process.
pub struct LogGuard {
    _worker: WorkerGuard,
}

/// Install the global subscriber writing to `config.log_path`.
pub fn init(config: &Config) -> Result<LogGuard> {
    fs::create_dir_all(&config.log_path).with_context(|| {
        format!(
            "Failed to create log directory: {}",
            config.log_path.display()
        )
    })?;

    let removed = cleanup_old_logs(&config.log_path, RETENTION_DAYS)?;

    let appender = LogRollerBuilder::new(config.log_path.as_path(), Path::new(LOG_PREFIX))
        .rotation(Rotation::AgeBased(RotationAge::Daily))
        .time_zone(TimeZone::Local)
        .max_keep_files(RETENTION_DAYS as _)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create log roller: {e}"))?;

    let (writer, worker) = tracing_appender::non_blocking(appender);

    let time_format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = OffsetTime::new(local_offset, time_format);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(timer),
    );

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global subscriber: {e}"))?;

    tracing::debug!(
        log_path = %config.log_path.display(),
        removed_old_logs = removed,
        "logging initialized"
    );
    Ok(LogGuard { _worker: worker })
}

/// Delete rotated log files older than `retention_days`. Returns how many were removed.
pub fn cleanup_old_logs(log_path: &Path, retention_days: u64) -> Result<usize> {
    if !log_path.exists() {
        return Ok(0);
    }

    let cutoff = SystemTime::now() - Duration::from_secs(retention_days * 24 * 60 * 60);
    let mut removed = 0;

    for entry in fs::read_dir(log_path)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let is_ours = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_PREFIX));
        if !is_ours {
            continue;
        }

        if let Ok(metadata) = entry.metadata()
            && let Ok(modified) = metadata.modified()
            && modified < cutoff
            && fs::remove_file(&path).is_ok()
        {
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_file_modified_time(path: &Path, time: SystemTime) -> std::io::Result<()> {
        let secs = time.duration_since(SystemTime::UNIX_EPOCH).unwrap().as_secs();
        let stamp = libc::timespec {
            tv_sec: secs as libc::time_t,
            tv_nsec: 0,
        };
        let times = [stamp, stamp];
        let c_path = std::ffi::CString::new(path.to_str().unwrap()).unwrap();
        let ret = unsafe { libc::utimensat(libc::AT_FDCWD, c_path.as_ptr(), times.as_ptr(), 0) };
        if ret == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    fn days_ago(days: u64) -> SystemTime {
        SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60)
    }

    #[test]
    fn cleanup_removes_expired_logs_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_path = dir.path();

        let old_file = log_path.join("change-radar.2020-01-01");
        fs::write(&old_file, "old log").unwrap();
        set_file_modified_time(&old_file, days_ago(4)).unwrap();

        let recent_file = log_path.join("change-radar.2026-10-18");
        fs::write(&recent_file, "recent log").unwrap();

        let removed = cleanup_old_logs(log_path, RETENTION_DAYS).unwrap();

        assert_eq!(removed, 1);
        assert!(!old_file.exists());
        assert!(recent_file.exists());
    }

    #[test]
    fn cleanup_respects_retention_argument() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("change-radar.2026-10-10");
        fs::write(&file, "log").unwrap();
        set_file_modified_time(&file, days_ago(4)).unwrap();

        assert_eq!(cleanup_old_logs(dir.path(), 7).unwrap(), 0);
        assert!(file.exists());
    }

    #[test]
    fn cleanup_ignores_foreign_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let other_file = dir.path().join("other-app.log");
        fs::write(&other_file, "other log").unwrap();
        set_file_modified_time(&other_file, days_ago(10)).unwrap();

        cleanup_old_logs(dir.path(), RETENTION_DAYS).unwrap();

        assert!(other_file.exists());
    }

    #[test]
    fn cleanup_missing_dir_is_ok() {
        let result = cleanup_old_logs(Path::new("/tmp/nonexistent_change_radar_logs"), 3);
        assert_eq!(result.unwrap(), 0);
    }

    #[test]
    fn cleanup_ignores_subdirectories() {
        let dir = tempfile::TempDir::new().unwrap();
        let subdir = dir.path().join("change-radar.subdir");
        fs::create_dir(&subdir).unwrap();

        cleanup_old_logs(dir.path(), RETENTION_DAYS).unwrap();

        assert!(subdir.exists());
    }
}
