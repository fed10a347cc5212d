//! Error types for the PDF merge library

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the PDF merge library
#[derive(Error, Debug)]
pub enum Error {
    /// Fewer than two usable PDF files were supplied
    #[error("Select 2 or more PDF files to merge (found {found})")]
    InsufficientInput { found: usize },

    /// Another invocation holds the lock on the output path
    #[error("Another merge into {} is in progress (waited {:.1}s)", .output.display(), .timeout.as_secs_f64())]
    ConcurrentMerge { output: PathBuf, timeout: Duration },

    /// An input could not be opened or parsed as PDF
    #[error("Failed to read '{}': {reason}", .path.display())]
    InputOpen { path: PathBuf, reason: String },

    /// Serializing or writing the merged document failed
    #[error("Failed to write '{}': {reason}", .path.display())]
    OutputWrite { path: PathBuf, reason: String },

    /// The chosen output would overwrite one of the inputs
    #[error("Output file is also an input: {}", .0.display())]
    OutputIsInput(PathBuf),

    /// No interactive surface is available to choose the output path
    #[error("Unable to show file save dialog; pass --output")]
    DialogUnavailable,

    /// Invalid glob pattern
    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    /// Invalid command line or configuration value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short, user-facing description of the error class.
    ///
    /// Notifications show this instead of the full detail, which goes to the journal.
    pub fn summary(&self) -> String {
        match self {
            Error::InsufficientInput { .. } => "Select 2 or more PDF files to merge".to_string(),
            Error::ConcurrentMerge { .. } => {
                "Another merge into the same file is running; try again".to_string()
            }
            Error::InputOpen { path, .. } => format!(
                "Could not read {}",
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            ),
            Error::OutputWrite { path, .. } => format!("Could not write {}", path.display()),
            Error::OutputIsInput(_) => "The output file cannot be one of the inputs".to_string(),
            Error::DialogUnavailable => "Unable to show file save dialog".to_string(),
            Error::InvalidGlob(_) | Error::InvalidArgument(_) => self.to_string(),
            Error::Pdf(_) | Error::Io(_) => "PDF merge failed".to_string(),
        }
    }

    /// Process exit code for this error class
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InsufficientInput { .. } => 2,
            Error::ConcurrentMerge { .. } => 3,
            Error::InputOpen { .. } => 4,
            Error::OutputWrite { .. } => 5,
            _ => 1,
        }
    }

    /// Re-tag a codec failure as belonging to a specific input file.
    pub(crate) fn into_input_open(self, path: &std::path::Path) -> Error {
        match self {
            err @ Error::InputOpen { .. } => err,
            other => Error::InputOpen {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        }
    }

    /// Re-tag a codec failure as an output write failure.
    pub(crate) fn into_output_write(self, path: &std::path::Path) -> Error {
        match self {
            err @ Error::OutputWrite { .. } => err,
            other => Error::OutputWrite {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        }
    }
}
