//! Runtime settings for one merge invocation

use std::path::PathBuf;
use std::time::Duration;

use crate::collect::SplitStrategy;

/// File name of the journal inside the temp directory
pub const JOURNAL_FILE_NAME: &str = "merge_pdfs.log";

/// Settings resolved from the command line and environment
#[derive(Debug, Clone)]
pub struct MergeSettings {
    /// How long to wait for another invocation to release the output lock
    pub lock_timeout: Duration,
    /// Directory holding lock files
    pub lock_dir: PathBuf,
    /// Append-only journal file
    pub journal_path: PathBuf,
    /// Journal size at which it is rotated to `<name>.1`
    pub journal_max_bytes: u64,
    /// How raw shell arguments are split into paths
    pub split: SplitStrategy,
    /// Directory holding the multi-select session files
    pub session_dir: PathBuf,
    /// Pause after enqueueing before trying to claim the selection
    pub session_settle: Duration,
    /// Minimum time since the last enqueue before the selection is considered complete
    pub session_quiet: Duration,
}

impl Default for MergeSettings {
    fn default() -> Self {
        let temp_dir = std::env::temp_dir();
        Self {
            lock_timeout: Duration::from_secs(5),
            lock_dir: temp_dir.clone(),
            journal_path: temp_dir.join(JOURNAL_FILE_NAME),
            journal_max_bytes: 1024 * 1024,
            split: SplitStrategy::Auto,
            session_dir: temp_dir,
            session_settle: Duration::from_millis(600),
            session_quiet: Duration::from_millis(500),
        }
    }
}
