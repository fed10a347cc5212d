//! PDF codec boundary
//!
//! The merge pipeline only needs four capabilities from a PDF library: open a
//! file as a page sequence, append it to an accumulating document, count the
//! accumulated pages and serialize the result. [`PdfCodec`] names exactly
//! those, so the pipeline's control flow can be exercised without real PDF
//! bytes. [`LopdfCodec`] is the production implementation.

pub mod merge;

use std::path::Path;

use crate::error::Result;

pub use merge::{LopdfCodec, MergedDocument, PageSequence};

/// Narrow interface over a PDF library
pub trait PdfCodec: Send + Sync {
    /// Accumulating output document
    type Target;
    /// Pages of one opened source document
    type Pages;

    /// Start an empty output document
    fn create_target(&self) -> Self::Target;

    /// Open and parse one source file
    fn open_document(&self, path: &Path) -> Result<Self::Pages>;

    /// Append every page of `pages`, in order, to `target`
    fn append_pages(&self, target: &mut Self::Target, pages: Self::Pages) -> Result<()>;

    /// Pages accumulated so far
    fn page_count(&self, target: &Self::Target) -> usize;

    /// Write `target` to `path`, replacing any existing file
    fn serialize(&self, target: Self::Target, path: &Path) -> Result<()>;
}
