//! Per-pool command history.
//!
//! Format: <state_root>/<pool>/history, one JSON object per line:
//!   {"ts_ms":1760781895123,"pool":"tank","command":"zzzfs create tank/a","user":"me","host":"box"}
//!
//! Policy:
//! - Append-only; file order is the order of record.
//! - Timestamps per pool never go backwards: a record taking a clock reading
//!   older than the last one reuses the last timestamp.
//! - Callers hold the pool lock while appending.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::metrics::record_history_append;
use crate::util::{current_host, current_user, format_history_time, now_unix_ms};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub ts_ms: i64,
    pub pool: String,
    pub command: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub host: String,
}

impl HistoryRecord {
    /// `zpool history` line: "2026-10-18.12:04:55 zzzfs create tank/a".
    pub fn short_line(&self) -> String {
        format!("{} {}", format_history_time(self.ts_ms), self.command)
    }

    /// `zpool history -l` line with user and host.
    pub fn long_line(&self) -> String {
        format!(
            "{} {} [user {} on {}]",
            format_history_time(self.ts_ms),
            self.command,
            self.user,
            self.host
        )
    }
}

pub struct HistoryLog {
    path: PathBuf,
    pool: String,
}

impl HistoryLog {
    pub fn new(path: &Path, pool: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            pool: pool.to_string(),
        }
    }

    /// Append a record for `command`; returns what was written.
    pub fn record(&self, command: &str) -> Result<HistoryRecord> {
        let last = self.last_ts()?;
        let mut ts = now_unix_ms();
        if let Some(prev) = last {
            if ts < prev {
                debug!("history: clock went back ({} < {}), clamping", ts, prev);
                ts = prev;
            }
        }
        let rec = HistoryRecord {
            ts_ms: ts,
            pool: self.pool.clone(),
            command: command.to_string(),
            user: current_user(),
            host: current_host(),
        };
        let mut line = serde_json::to_string(&rec).context("serialize history record")?;
        line.push('\n');

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open history {}", self.path.display()))?;
        f.write_all(line.as_bytes())
            .with_context(|| format!("append history {}", self.path.display()))?;
        record_history_append();
        Ok(rec)
    }

    /// All records in file order. Unparseable lines are skipped with a warning.
    pub fn query(&self) -> Result<Vec<HistoryRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("read history {}", self.path.display()))?;
        let mut out = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryRecord>(line) {
                Ok(r) => out.push(r),
                Err(e) => warn!(
                    "history: skip malformed line {} in {}: {}",
                    i + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(out)
    }

    /// Timestamp of the last record, reading only the file tail.
    fn last_ts(&self) -> Result<Option<i64>> {
        let mut f = match OpenOptions::new().read(true).open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("open history {}", self.path.display()))
            }
        };
        let len = f.metadata()?.len();
        let start = len.saturating_sub(8192);
        f.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        let text = String::from_utf8_lossy(&buf);
        let last = text
            .lines()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .find_map(|l| serde_json::from_str::<HistoryRecord>(l).ok());
        match last {
            Some(r) => Ok(Some(r.ts_ms)),
            // tail did not hold a full record (very long command): fall back to a full read
            None if start > 0 => Ok(self.query()?.last().map(|r| r.ts_ms)),
            None => Ok(None),
        }
    }
}
