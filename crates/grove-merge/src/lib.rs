//! Merge engine: three-way file merge, rename-aware tree merge, commit
//! merge over the merge base, and merge analysis.
//!
//! Conflicts are results, not errors. A tree merge always returns a
//! [`TreeMergeOutcome`] whose index carries stages 1 to 3 for every
//! conflicted path; only failures to read or write objects are `Err`.

mod analysis;
mod commit;
mod conflict;
mod file;
mod options;
mod tree;

pub use analysis::{analyze, merge_heads, write_merge_heads, MergeAnalysis, MergePreference};
pub use commit::merge_commits;
pub use conflict::{merge_file_from_index, write_conflicts_to_index, ConflictKind, ConflictSide, MergeConflict};
pub use file::{merge_file, MergeFileInput, MergeFileResult};
pub use options::{ConflictStyle, FileFavor, MergeFileOptions, MergeOptions, DEFAULT_MARKER_SIZE};
pub use tree::{merge_trees, TreeMergeOutcome};

use grove_hash::ObjectId;
use grove_utils::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("no merge base found")]
    NoMergeBase,

    #[error("object {oid} is a {actual}, expected a {expected}")]
    WrongObjectType {
        oid: ObjectId,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("malformed MERGE_HEAD line: {0}")]
    MalformedMergeHead(String),

    #[error("invalid value '{value}' for {key}")]
    InvalidOption { key: &'static str, value: String },

    #[error(transparent)]
    Diff(#[from] grove_diff::DiffError),

    #[error(transparent)]
    RevWalk(#[from] grove_revwalk::RevWalkError),

    #[error(transparent)]
    Index(#[from] grove_index::IndexError),

    #[error(transparent)]
    Odb(#[from] grove_odb::OdbError),

    #[error(transparent)]
    Repo(#[from] grove_repository::RepoError),

    #[error(transparent)]
    Config(#[from] grove_config::ConfigError),

    #[error(transparent)]
    Util(#[from] grove_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MergeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoMergeBase => ErrorKind::NoMergeBase,
            Self::WrongObjectType { .. } | Self::InvalidOption { .. } => ErrorKind::InvalidArgument,
            Self::MalformedMergeHead(_) => ErrorKind::Corrupt,
            Self::Diff(e) => e.kind(),
            Self::RevWalk(e) => e.kind(),
            Self::Index(e) => e.kind(),
            Self::Odb(e) => e.kind(),
            Self::Repo(e) => e.kind(),
            Self::Config(e) => e.kind(),
            Self::Util(e) => e.kind(),
            Self::Io(_) => ErrorKind::Io,
        }
    }
}
