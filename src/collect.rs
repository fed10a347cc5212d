//! Argument collection
//!
//! Turns the raw strings handed over by the shell verb into a clean,
//! deduplicated list of existing PDF paths. The shell may pass one path per
//! argument or pack a whole multi-select into a single string, so splitting is
//! a configurable [`SplitStrategy`].

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use glob::glob;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// How a raw argument string is split into individual paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStrategy {
    /// Split on newlines, then break space-joined runs of `.pdf` paths apart
    /// when every piece exists on disk
    Auto,
    /// Every argument is exactly one path
    Verbatim,
    /// Split on a fixed delimiter character
    Delimiter(char),
}

impl FromStr for SplitStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(SplitStrategy::Auto),
            "none" | "verbatim" => Ok(SplitStrategy::Verbatim),
            "newline" => Ok(SplitStrategy::Delimiter('\n')),
            _ => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(SplitStrategy::Delimiter(c)),
                    _ => Err(Error::InvalidArgument(format!(
                        "unknown split strategy '{}' (expected auto, none, newline or a single character)",
                        s
                    ))),
                }
            }
        }
    }
}

/// Why an entry was left out of the merge set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Extension is not `.pdf`
    NotPdf,
    /// Not an existing regular file
    Missing,
    /// Glob pattern matched nothing
    NoGlobMatch,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NotPdf => write!(f, "not a PDF file"),
            RejectReason::Missing => write!(f, "file not found"),
            RejectReason::NoGlobMatch => write!(f, "pattern matched no files"),
        }
    }
}

/// An entry dropped from the merge set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// The entry as it was received, after trimming
    pub entry: String,
    pub reason: RejectReason,
}

/// Result of collecting the raw invocation arguments
#[derive(Debug, Clone, Default)]
pub struct Collected {
    /// Absolute PDF paths in first-seen order
    pub paths: Vec<PathBuf>,
    /// Entries that were dropped, for the journal
    pub rejected: Vec<Rejection>,
}

impl Collected {
    /// Fail unless there are enough inputs for a merge
    pub fn ensure_mergeable(&self) -> Result<()> {
        if self.paths.len() < 2 {
            return Err(Error::InsufficientInput {
                found: self.paths.len(),
            });
        }
        Ok(())
    }
}

/// Split, expand, filter and deduplicate raw arguments.
///
/// No minimum count is enforced here, so callers can record the rejections
/// before [`Collected::ensure_mergeable`] reports an insufficient selection.
pub fn gather_inputs<S: AsRef<str>>(raw: &[S], strategy: SplitStrategy) -> Result<Collected> {
    let mut collected = Collected::default();
    let mut seen = HashSet::new();

    for token in raw {
        for piece in split_token(token.as_ref(), strategy) {
            let entry = clean_entry(&piece);
            if entry.is_empty() {
                continue;
            }

            let path = PathBuf::from(entry);
            if !path.exists() && is_glob_pattern(entry) {
                let matches = expand_glob(entry)?;
                if matches.is_empty() {
                    reject(&mut collected, entry, RejectReason::NoGlobMatch);
                }
                for candidate in matches {
                    consider(&mut collected, &mut seen, candidate);
                }
            } else {
                consider(&mut collected, &mut seen, path);
            }
        }
    }

    Ok(collected)
}

fn consider(collected: &mut Collected, seen: &mut HashSet<String>, path: PathBuf) {
    if !has_pdf_extension(&path) {
        reject(collected, &path.display().to_string(), RejectReason::NotPdf);
        return;
    }
    if !path.is_file() {
        reject(collected, &path.display().to_string(), RejectReason::Missing);
        return;
    }

    if seen.insert(normalize_key(&path)) {
        collected.paths.push(absolute_path(&path));
    } else {
        debug!(path = %path.display(), "dropping duplicate input");
    }
}

fn reject(collected: &mut Collected, entry: &str, reason: RejectReason) {
    warn!(entry, %reason, "skipping input");
    collected.rejected.push(Rejection {
        entry: entry.to_string(),
        reason,
    });
}

/// Split one raw argument according to the strategy
fn split_token(token: &str, strategy: SplitStrategy) -> Vec<String> {
    match strategy {
        SplitStrategy::Verbatim => vec![token.to_string()],
        SplitStrategy::Delimiter(delimiter) => token.split(delimiter).map(str::to_string).collect(),
        SplitStrategy::Auto => token
            .split(['\n', '\r'])
            .flat_map(split_pdf_run)
            .collect(),
    }
}

/// Break "C:\a b.pdf C:\c.pdf" apart on `.pdf` boundaries followed by whitespace.
///
/// The split is only accepted when every piece names an existing file;
/// otherwise the line is kept whole.
fn split_pdf_run(line: &str) -> Vec<String> {
    let whole = clean_entry(line);
    let lower = line.to_ascii_lowercase();

    if Path::new(whole).exists()
        || !whole.contains(char::is_whitespace)
        || lower.matches(".pdf").count() < 2
    {
        return vec![line.to_string()];
    }

    // ASCII lowercasing keeps byte offsets identical to `line`.
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut cursor = 0;
    while let Some(pos) = lower[cursor..].find(".pdf") {
        let end = cursor + pos + ".pdf".len();
        if line[end..].starts_with(char::is_whitespace) {
            pieces.push(line[start..end].to_string());
            start = end;
        }
        cursor = end;
    }
    if !line[start..].trim().is_empty() {
        pieces.push(line[start..].to_string());
    }

    if pieces.len() > 1 && pieces.iter().all(|p| Path::new(clean_entry(p)).exists()) {
        pieces
    } else {
        vec![line.to_string()]
    }
}

fn clean_entry(piece: &str) -> &str {
    piece.trim().trim_matches('"').trim()
}

fn is_glob_pattern(entry: &str) -> bool {
    entry.contains('*') || entry.contains('?') || entry.contains('[')
}

/// Expand a glob pattern, sorted for consistent ordering
fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob(pattern).map_err(|e| Error::InvalidGlob(format!("{}: {}", pattern, e)))?;

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => paths.push(path),
            Err(e) => warn!(pattern, error = %e, "glob entry unreadable"),
        }
    }
    paths.sort();
    Ok(paths)
}

/// True when the extension is `.pdf`, ignoring case
pub(crate) fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Absolute form of a path without resolving symlinks
pub(crate) fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Comparison key for paths: canonical where possible, case-insensitive.
pub(crate) fn normalize_key(path: &Path) -> String {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| absolute_path(path));
    resolved.to_string_lossy().to_lowercase()
}
