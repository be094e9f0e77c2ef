//! Diff engine: tree-to-tree, tree-to-index and index-to-work-tree diffs,
//! rename and copy detection, patch generation with unified output, and
//! per-file status built on the two index diffs.
//!
//! A [`Diff`] is a list of file-level [`DiffDelta`]s. Line-level work is
//! deferred: [`Diff::patches`] yields one [`Patch`] at a time, and a patch
//! is only computed when the iterator reaches it.

pub mod algorithm;
pub mod binary;
mod delta;
mod diff;
mod index;
mod options;
mod patch;
mod pathspec;
mod rename;
mod status;
mod tree;
mod unified;
mod workdir;

pub use algorithm::{Edit, EditOp, Whitespace};
pub use delta::{DeltaStatus, DiffDelta, DiffFile, FileFlags};
pub use diff::{Diff, DiffStats, Patches};
pub use index::diff_tree_to_index;
pub use options::{DiffAlgorithm, DiffOptions, FindOptions};
pub use patch::{diff_blobs, diff_buffers, DiffLine, Hunk, LineOrigin, Patch};
pub use status::{is_clean, status, StatusEntry, StatusOptions, StatusShow};
pub use tree::diff_trees;
pub use workdir::{diff_index_to_workdir, IgnoreRules};

use bstr::BString;
use grove_hash::ObjectId;
use grove_utils::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("binary content in '{path}'")]
    BinaryContent { path: BString },

    #[error("delta index {index} out of range ({len} deltas)")]
    NoSuchDelta { index: usize, len: usize },

    #[error("object {oid} is a {actual}, expected a {expected}")]
    WrongObjectType {
        oid: ObjectId,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("invalid funcname pattern: {0}")]
    Funcname(#[from] regex::Error),

    #[error("invalid value '{value}' for {key}")]
    InvalidOption { key: &'static str, value: String },

    #[error(transparent)]
    Hash(#[from] grove_hash::HashError),

    #[error(transparent)]
    Odb(#[from] grove_odb::OdbError),

    #[error(transparent)]
    Object(#[from] grove_object::ObjectError),

    #[error(transparent)]
    Repo(#[from] grove_repository::RepoError),

    #[error(transparent)]
    Config(#[from] grove_config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DiffError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BinaryContent { .. } => ErrorKind::BinaryContent,
            Self::NoSuchDelta { .. }
            | Self::WrongObjectType { .. }
            | Self::Funcname(_)
            | Self::InvalidOption { .. } => ErrorKind::InvalidArgument,
            Self::Hash(e) => e.kind(),
            Self::Odb(e) => e.kind(),
            Self::Object(e) => e.kind(),
            Self::Repo(e) => e.kind(),
            Self::Config(e) => e.kind(),
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds() {
        let err = DiffError::BinaryContent { path: "img.png".into() };
        assert_eq!(err.kind(), ErrorKind::BinaryContent);
        assert_eq!(err.to_string(), "binary content in 'img.png'");
        assert_eq!(DiffError::NoSuchDelta { index: 3, len: 1 }.kind(), ErrorKind::InvalidArgument);
        let io = DiffError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io.kind(), ErrorKind::Io);
    }
}
