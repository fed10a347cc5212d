//! Append-only operation journal
//!
//! One line per operation, written to a well-known file in the temp
//! directory so failures of a console-less context-menu run can be diagnosed
//! afterwards.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat};

use crate::error::Result;

/// Terminal state recorded for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
    Cancelled,
    /// An input was dropped during collection
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Outcome::Succeeded => "succeeded",
            Outcome::Failed => "failed",
            Outcome::Cancelled => "cancelled",
            Outcome::Skipped => "skipped",
        };
        f.write_str(text)
    }
}

/// One journal line
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    /// `merge` or `collect`
    pub operation: &'static str,
    pub input_count: usize,
    pub outcome: Outcome,
    /// Error detail on failure, summary otherwise
    pub detail: Option<String>,
}

impl LogEntry {
    /// Entry stamped with the current local time
    pub fn now(operation: &'static str, input_count: usize, outcome: Outcome) -> Self {
        Self {
            timestamp: Local::now(),
            operation,
            input_count,
            outcome,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} inputs={} outcome={}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, false),
            self.operation,
            self.input_count,
            self.outcome
        )?;
        if let Some(detail) = &self.detail {
            write!(f, " detail={}", detail.replace('\r', "").replace('\n', "\\n"))?;
        }
        Ok(())
    }
}

/// Sink for journal entries
pub trait Journal: Send + Sync {
    fn record(&self, entry: &LogEntry) -> Result<()>;
}

/// Journal appending to a file, rotating once it reaches `max_bytes`
#[derive(Debug, Clone)]
pub struct FileJournal {
    path: PathBuf,
    max_bytes: u64,
}

impl FileJournal {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path the journal is rotated to
    pub fn rotated_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".1");
        self.path.with_file_name(name)
    }

    fn rotate_if_full(&self) -> Result<()> {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(()),
        };
        if size >= self.max_bytes {
            let rotated = self.rotated_path();
            if rotated.exists() {
                fs::remove_file(&rotated)?;
            }
            fs::rename(&self.path, &rotated)?;
        }
        Ok(())
    }
}

impl Journal for FileJournal {
    fn record(&self, entry: &LogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.rotate_if_full()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}
