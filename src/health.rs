//! Liveness signaling and health metrics.
//!
//! A heartbeat file's mtime is refreshed on a fixed interval; the container
//! supervisor's probe treats a fresh mtime as healthy. The monitor also
//! tracks process start and last-success times for `!status`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::error;

/// Interval between heartbeat touches.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// Tracks liveness and run metrics. Cheap to share behind an `Arc`.
pub struct HealthMonitor {
    heartbeat_path: PathBuf,
    started_at: DateTime<Utc>,
    last_heartbeat: Mutex<Option<DateTime<Utc>>>,
    last_success: Mutex<Option<DateTime<Utc>>>,
}

/// Point-in-time health summary for status rendering.
#[derive(Debug, Clone)]
pub struct HealthSummary {
    pub uptime_seconds: i64,
    pub last_success: Option<DateTime<Utc>>,
    pub heartbeat_active: bool,
}

impl HealthMonitor {
    pub fn new(heartbeat_path: impl Into<PathBuf>) -> Self {
        Self {
            heartbeat_path: heartbeat_path.into(),
            started_at: Utc::now(),
            last_heartbeat: Mutex::new(None),
            last_success: Mutex::new(None),
        }
    }

    /// Default heartbeat location expected by the health probe.
    pub fn default_path() -> PathBuf {
        PathBuf::from("/tmp/heartbeat")
    }

    pub fn heartbeat_path(&self) -> &Path {
        &self.heartbeat_path
    }

    /// Refresh the heartbeat file. Failures are logged, not fatal: a broken
    /// probe must not take the daemon down.
    pub fn touch(&self) {
        match self.write_stamp() {
            Ok(()) => {
                *self.last_heartbeat.lock().expect("health lock poisoned") = Some(Utc::now());
            }
            Err(e) => error!(error = %e, path = %self.heartbeat_path.display(), "Heartbeat write failed"),
        }
    }

    fn write_stamp(&self) -> Result<()> {
        if let Some(parent) = self.heartbeat_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.heartbeat_path, Utc::now().timestamp().to_string())
            .with_context(|| format!("Failed to write {}", self.heartbeat_path.display()))
    }

    /// Record a successful build.
    pub fn mark_success(&self) {
        *self.last_success.lock().expect("health lock poisoned") = Some(Utc::now());
    }

    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
            last_success: *self.last_success.lock().expect("health lock poisoned"),
            heartbeat_active: self
                .last_heartbeat
                .lock()
                .expect("health lock poisoned")
                .is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heartbeat");
        let monitor = HealthMonitor::new(&path);

        assert!(!monitor.summary().heartbeat_active);
        monitor.touch();

        assert!(path.is_file());
        assert!(monitor.summary().heartbeat_active);
    }

    #[test]
    fn test_touch_refreshes_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heartbeat");
        let monitor = HealthMonitor::new(&path);

        monitor.touch();
        // Backdate the file, then confirm a touch moves mtime forward.
        let stale = filetime::FileTime::from_unix_time(1_000_000, 0);
        filetime::set_file_mtime(&path, stale).unwrap();

        monitor.touch();
        let mtime = filetime::FileTime::from_last_modification_time(
            &std::fs::metadata(&path).unwrap(),
        );
        assert!(mtime.unix_seconds() > 1_000_000);
    }

    #[test]
    fn test_mark_success_shows_in_summary() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = HealthMonitor::new(dir.path().join("heartbeat"));

        assert!(monitor.summary().last_success.is_none());
        monitor.mark_success();
        assert!(monitor.summary().last_success.is_some());
    }
}
