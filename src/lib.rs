//! PDF Merge Library
//!
//! Merges the PDF files selected in a file browser into one document.
//! This library provides:
//! - Collection of shell-supplied arguments into a clean list of PDF paths
//! - A merge pipeline that sorts inputs, locks the output and writes atomically
//! - Aggregation of multi-select invocations that arrive as separate processes
//! - Journal, notification, dialog and lock collaborators behind traits
//!
//! # Example
//!
//! ```no_run
//! use pdf_merge::config::MergeSettings;
//! use pdf_merge::pdf::LopdfCodec;
//! use pdf_merge::pipeline::{MergeOutcome, MergePipeline, MergeRequest};
//! use std::path::PathBuf;
//!
//! let pipeline = MergePipeline::new(LopdfCodec, MergeSettings::default());
//! let request = MergeRequest::new(
//!     vec![PathBuf::from("b.pdf"), PathBuf::from("a.pdf")],
//!     Some(PathBuf::from("merged.pdf")),
//! )?;
//!
//! if let MergeOutcome::Succeeded(result) = pipeline.run(request)? {
//!     println!("{} pages written", result.page_count);
//! }
//! # Ok::<(), pdf_merge::Error>(())
//! ```

pub mod collect;
pub mod config;
pub mod dialog;
pub mod error;
pub mod journal;
pub mod lock;
pub mod notify;
pub mod pdf;
pub mod pipeline;
pub mod session;

// Re-export commonly used items
pub use error::{Error, Result};
pub use pipeline::{exit_code, MergeOutcome, MergePipeline, MergeRequest, MergeResult};
