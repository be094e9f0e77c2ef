//! Commit traversal: the [`RevWalk`] iterator, revision ranges
//! (`A..B`, `A...B`, `^A`) and merge-base computation by painting
//! ancestors of both sides.

mod merge_base;
mod range;
mod walk;

pub use merge_base::{ahead_behind, is_ancestor, merge_base, merge_bases, unique_commits};
pub use range::RevisionRange;
pub use walk::{count_commits, count_head_commits, Commits, RevWalk, WalkState};

use grove_hash::ObjectId;
use grove_utils::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum RevWalkError {
    #[error("commit not found: {0}")]
    CommitNotFound(ObjectId),

    #[error("object {oid} is a {actual}, not a commit")]
    NotACommit { oid: ObjectId, actual: &'static str },

    #[error("invalid revision range: {0}")]
    InvalidRange(String),

    #[error("no merge base found")]
    NoMergeBase,

    #[error(transparent)]
    Odb(#[from] grove_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] grove_ref::RefError),

    #[error(transparent)]
    Repo(#[from] grove_repository::RepoError),
}

impl RevWalkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CommitNotFound(_) => ErrorKind::NotFound,
            Self::NotACommit { .. } | Self::InvalidRange(_) => ErrorKind::InvalidArgument,
            Self::NoMergeBase => ErrorKind::NoMergeBase,
            Self::Odb(e) => e.kind(),
            Self::Ref(e) => e.kind(),
            Self::Repo(e) => e.kind(),
        }
    }
}

bitflags::bitflags! {
    /// Output order of a [`RevWalk`]. Combine with `|`.
    ///
    /// With no flags set, commits come out in the order they are reached
    /// (breadth first from the tips). Children always precede their parents
    /// unless `REVERSE` is set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Sort: u8 {
        /// Newest committer date first.
        const TIME = 1;
        /// No parent before all of its children.
        const TOPOLOGICAL = 1 << 1;
        /// Emit the final order backwards.
        const REVERSE = 1 << 2;
    }
}

impl Sort {
    pub const NONE: Self = Self::empty();

    /// Whether the whole walk has to be collected before the first commit
    /// can be returned.
    pub(crate) fn needs_buffer(self) -> bool {
        self.intersects(Self::TOPOLOGICAL | Self::REVERSE)
    }
}

impl Default for Sort {
    fn default() -> Self {
        Self::TIME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_flags_combine() {
        let s = Sort::TOPOLOGICAL | Sort::REVERSE;
        assert!(s.contains(Sort::REVERSE));
        assert!(!s.contains(Sort::TIME));
        assert!(s.needs_buffer());
        assert!(!Sort::default().needs_buffer());
        assert!(Sort::NONE.contains(Sort::NONE));
    }

    #[test]
    fn error_kinds() {
        assert_eq!(RevWalkError::NoMergeBase.kind(), ErrorKind::NoMergeBase);
        let oid = grove_hash::HashAlgorithm::default().null_oid();
        assert_eq!(RevWalkError::CommitNotFound(oid).kind(), ErrorKind::NotFound);
        let err = RevWalkError::NotACommit { oid, actual: "blob" };
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
