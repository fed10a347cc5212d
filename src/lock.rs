//! Exclusive, timed locks keyed by output path
//!
//! Two right-click merges into the same file must not race, so the pipeline
//! takes a lock before writing anything. [`FileLock`] coordinates separate
//! processes through advisory file locks; [`ProcessLock`] does the same within
//! one process.
//!
//! Lock files are left in place after release. Unlinking a file another
//! process may already have opened would let two holders lock different
//! inodes for the same output, so each distinct output keeps one small
//! `pdf-merge-<hash>.lock` in the lock directory.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::collect::normalize_key;
use crate::error::{Error, Result};

/// How often a contended file lock is retried
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A lock provider
pub trait OutputLock: Send + Sync {
    /// Acquire exclusive access to `target`, waiting at most `timeout`.
    ///
    /// Fails with [`Error::ConcurrentMerge`] when the wait runs out.
    fn acquire(&self, target: &Path, timeout: Duration) -> Result<LockHandle>;
}

/// Exclusive claim on one target, released when dropped
pub struct LockHandle {
    target: PathBuf,
    _release: Box<dyn Send>,
}

impl LockHandle {
    /// Wrap a guard whose `Drop` releases the lock
    pub fn new(target: PathBuf, release: impl Send + 'static) -> Self {
        Self {
            target,
            _release: Box::new(release),
        }
    }

    /// The path this lock protects
    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle").field("target", &self.target).finish()
    }
}

/// Lock file name derived from the normalized target path
pub fn lock_file_name(target: &Path) -> String {
    let digest = Sha256::digest(normalize_key(target).as_bytes());
    format!("pdf-merge-{}.lock", hex::encode(&digest[..8]))
}

/// Cross-process lock backed by `flock`/`LockFileEx` on a file in `lock_dir`
#[derive(Debug, Clone)]
pub struct FileLock {
    lock_dir: PathBuf,
}

impl FileLock {
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: lock_dir.into(),
        }
    }

    /// Where the lock for `target` lives
    pub fn lock_path(&self, target: &Path) -> PathBuf {
        self.lock_dir.join(lock_file_name(target))
    }
}

struct HeldFileLock {
    file: File,
}

impl Drop for HeldFileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl OutputLock for FileLock {
    fn acquire(&self, target: &Path, timeout: Duration) -> Result<LockHandle> {
        std::fs::create_dir_all(&self.lock_dir)?;
        let lock_path = self.lock_path(target);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;

        let contended = fs2::lock_contended_error().raw_os_error();
        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(lock = %lock_path.display(), "acquired output lock");
                    return Ok(LockHandle::new(target.to_path_buf(), HeldFileLock { file }));
                }
                Err(e) if e.raw_os_error() == contended || e.kind() == std::io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(Error::ConcurrentMerge {
                            output: target.to_path_buf(),
                            timeout,
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

/// In-process lock for long-running hosts that merge on several threads
#[derive(Debug, Clone, Default)]
pub struct ProcessLock {
    state: Arc<(Mutex<HashSet<String>>, Condvar)>,
}

impl ProcessLock {
    pub fn new() -> Self {
        Self::default()
    }
}

struct HeldProcessLock {
    key: String,
    state: Arc<(Mutex<HashSet<String>>, Condvar)>,
}

impl Drop for HeldProcessLock {
    fn drop(&mut self) {
        let (held, released) = &*self.state;
        held.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        released.notify_all();
    }
}

impl OutputLock for ProcessLock {
    fn acquire(&self, target: &Path, timeout: Duration) -> Result<LockHandle> {
        let key = normalize_key(target);
        let deadline = Instant::now() + timeout;
        let (held, released) = &*self.state;

        let mut keys = held.lock().unwrap_or_else(PoisonError::into_inner);
        while keys.contains(&key) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::ConcurrentMerge {
                    output: target.to_path_buf(),
                    timeout,
                });
            }
            keys = released
                .wait_timeout(keys, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        keys.insert(key.clone());

        Ok(LockHandle::new(
            target.to_path_buf(),
            HeldProcessLock {
                key,
                state: Arc::clone(&self.state),
            },
        ))
    }
}
