//! Devtwin patch — multi-file diff dialect with fuzzy context matching
//!
//! The dialect is envelope-framed (`*** Begin Patch` / `*** End Patch`) with
//! Add/Delete/Update actions. Update hunks locate themselves by context
//! lines; matching degrades through whitespace- and punctuation-tolerant
//! passes, each adding to an integer fuzz score. Application is atomic from
//! the engine's point of view: parsing and chunk resolution happen against
//! in-memory copies, so a patch that fails leaves the tree untouched.

pub mod apply;
pub mod canon;
pub mod parser;

pub use apply::{apply_commit, patch_to_commit, process_patch_in_repo, Change, ChangeKind, Commit};
pub use parser::{
    identify_files_added, identify_files_needed, text_to_patch, Chunk, Patch, PatchAction,
};

use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct DiffError(pub String);

impl DiffError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type DiffResult<T> = Result<T, DiffError>;
