//! Activity log: JSON lines, one per sync event.
//!
//! Optional (enabled by `[log] path`). Each line is a self-contained object
//! with an RFC 3339 timestamp, so the file can be tailed, grepped, or fed to
//! `jq` while a watch session runs.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::debug;

use crate::model::{ServiceAction, ServiceTarget};
use crate::reconcile::EditSummary;

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// A timestamped activity record.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    #[serde(flatten)]
    pub event: LogEvent,
}

/// Everything the coordinator records.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    /// A snapshot query was dispatched to a worker.
    RefreshStarted { token: u64 },
    /// A snapshot was reconciled into the display list.
    SnapshotApplied {
        token: u64,
        services: usize,
        #[serde(flatten)]
        summary: EditSummary,
    },
    /// A snapshot arrived after a newer refresh had been issued.
    RefreshDiscarded { token: u64, latest: u64 },
    /// A snapshot query failed.
    RefreshFailed { token: u64, reason: String },
    /// A control command was dispatched.
    ControlIssued {
        target: ServiceTarget,
        action: ServiceAction,
        elevated: bool,
    },
    /// A control command's process exited (or could not be started).
    ControlFinished {
        target: ServiceTarget,
        action: ServiceAction,
        success: bool,
        exit_code: Option<i32>,
    },
}

/// Append-only JSON lines writer.
pub struct ActivityLog {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl ActivityLog {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file: {}", path.display()))?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    pub fn log(&self, event: LogEvent) -> Result<()> {
        let entry = LogEntry {
            timestamp: now_rfc3339(),
            event,
        };

        let json = serde_json::to_string(&entry).context("failed to serialize log entry")?;
        debug!(event = %json, "activity log");

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("activity log writer poisoned"))?;
        writeln!(writer, "{json}").context("failed to write log entry")?;
        writer.flush().context("failed to flush log")?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
