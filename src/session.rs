//! Multi-select aggregation across invocations
//!
//! Some shells launch the verb once per selected file. Each of those processes
//! enqueues its file into a shared collection; once no new file has arrived
//! for a quiet period, exactly one of them claims the whole selection and runs
//! the merge while the others exit.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::error::Result;
use crate::lock::OutputLock;

const COLLECTION_FILE: &str = "pdf_merge_collection.txt";
const TIMESTAMP_FILE: &str = "pdf_merge_timestamp.txt";

/// Upper bound on waiting for a sibling invocation to finish its bookkeeping
pub const SESSION_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared selection state in one directory
pub struct SelectionSession<'a> {
    dir: PathBuf,
    lock: &'a dyn OutputLock,
}

impl<'a> SelectionSession<'a> {
    pub fn new(dir: impl Into<PathBuf>, lock: &'a dyn OutputLock) -> Self {
        Self {
            dir: dir.into(),
            lock,
        }
    }

    pub fn collection_path(&self) -> PathBuf {
        self.dir.join(COLLECTION_FILE)
    }

    pub fn timestamp_path(&self) -> PathBuf {
        self.dir.join(TIMESTAMP_FILE)
    }

    /// Add one file to the selection and mark the time of arrival
    pub fn enqueue(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let _guard = self
            .lock
            .acquire(&self.collection_path(), SESSION_LOCK_TIMEOUT)?;

        let mut collection = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.collection_path())?;
        writeln!(collection, "{}", path.display())?;

        fs::write(self.timestamp_path(), Utc::now().timestamp_millis().to_string())?;
        debug!(path = %path.display(), "enqueued selection entry");
        Ok(())
    }

    /// Take the whole selection if it has been quiet for at least `quiet`.
    ///
    /// Returns `None` when another invocation already claimed it or when
    /// files may still be arriving.
    pub fn claim(&self, quiet: Duration) -> Result<Option<Vec<String>>> {
        let _guard = self
            .lock
            .acquire(&self.collection_path(), SESSION_LOCK_TIMEOUT)?;

        let last_enqueue = match fs::read_to_string(self.timestamp_path()) {
            Ok(text) => match text.trim().parse::<i64>() {
                Ok(millis) => millis,
                Err(_) => return Ok(None),
            },
            Err(_) => return Ok(None),
        };

        let elapsed = Utc::now().timestamp_millis().saturating_sub(last_enqueue);
        if elapsed < quiet.as_millis() as i64 {
            debug!(elapsed_ms = elapsed, "selection still arriving");
            return Ok(None);
        }

        let entries: Vec<String> = fs::read_to_string(self.collection_path())
            .unwrap_or_default()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        // The timestamp marks an unclaimed selection; it goes first
        remove_if_present(&self.timestamp_path())?;
        remove_if_present(&self.collection_path())?;
        debug!(entries = entries.len(), "claimed selection");
        Ok(Some(entries))
    }

    /// Enqueue `paths`, wait `settle`, then try to claim the selection
    pub fn gather<P: AsRef<Path>>(
        &self,
        paths: &[P],
        settle: Duration,
        quiet: Duration,
    ) -> Result<Option<Vec<String>>> {
        for path in paths {
            self.enqueue(path.as_ref())?;
        }
        thread::sleep(settle);
        self.claim(quiet)
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
