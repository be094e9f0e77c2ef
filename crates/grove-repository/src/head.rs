use grove_hash::ObjectId;
use grove_ref::{RefName, Reference};
use tracing::debug;

use crate::{RepoError, Repository};

/// Where HEAD points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadState {
    /// On a branch that has commits.
    Attached { branch: RefName, oid: ObjectId },
    /// Directly at a commit.
    Detached(ObjectId),
    /// On a branch with no commits yet.
    Unborn(RefName),
}

impl HeadState {
    pub fn oid(&self) -> Option<ObjectId> {
        match self {
            Self::Attached { oid, .. } | Self::Detached(oid) => Some(*oid),
            Self::Unborn(_) => None,
        }
    }

    pub fn branch(&self) -> Option<&RefName> {
        match self {
            Self::Attached { branch, .. } | Self::Unborn(branch) => Some(branch),
            Self::Detached(_) => None,
        }
    }
}

/// An operation left in progress, detected from its marker files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryState {
    None,
    Merge,
    Revert,
    CherryPick,
    Rebase,
}

/// Files and directories whose presence marks an operation in progress.
const STATE_MARKERS: [&str; 9] = [
    "MERGE_HEAD",
    "MERGE_MSG",
    "MERGE_MODE",
    "REVERT_HEAD",
    "CHERRY_PICK_HEAD",
    "BISECT_LOG",
    "rebase-merge",
    "rebase-apply",
    "sequencer",
];

impl Repository {
    pub fn head(&self) -> Result<HeadState, RepoError> {
        match self.refs.lookup(&RefName::head())? {
            Reference::Direct { target, .. } => Ok(HeadState::Detached(target)),
            Reference::Symbolic { target, .. } => match self.refs.resolve_name(&target)? {
                Some(oid) => Ok(HeadState::Attached { branch: target, oid }),
                None => Ok(HeadState::Unborn(target)),
            },
        }
    }

    /// The commit HEAD points at; fails on an unborn branch.
    pub fn head_oid(&self) -> Result<ObjectId, RepoError> {
        match self.head()? {
            HeadState::Attached { oid, .. } | HeadState::Detached(oid) => Ok(oid),
            HeadState::Unborn(branch) => Err(RepoError::UnbornBranch(branch.to_string())),
        }
    }

    pub fn is_head_detached(&self) -> Result<bool, RepoError> {
        Ok(matches!(self.head()?, HeadState::Detached(_)))
    }

    pub fn is_head_unborn(&self) -> Result<bool, RepoError> {
        Ok(matches!(self.head()?, HeadState::Unborn(_)))
    }

    /// Point HEAD at `branch` (a full ref name), which need not exist yet.
    pub fn set_head(&self, branch: &RefName) -> Result<(), RepoError> {
        let message = format!("checkout: moving to {}", branch.short_name());
        self.refs.create_symbolic(&RefName::head(), branch, true, &message)?;
        Ok(())
    }

    /// Detach HEAD at `oid`, replacing it even when it is symbolic.
    pub fn set_head_detached(&self, oid: ObjectId) -> Result<(), RepoError> {
        let message = format!("checkout: moving to {oid}");
        self.refs.create(&RefName::head(), oid, true, &message)?;
        debug!(%oid, "detached HEAD");
        Ok(())
    }

    pub fn state(&self) -> RepositoryState {
        let has = |name: &str| self.git_dir.join(name).exists();
        if has("rebase-merge") || has("rebase-apply") {
            RepositoryState::Rebase
        } else if has("MERGE_HEAD") {
            RepositoryState::Merge
        } else if has("REVERT_HEAD") {
            RepositoryState::Revert
        } else if has("CHERRY_PICK_HEAD") {
            RepositoryState::CherryPick
        } else {
            RepositoryState::None
        }
    }

    /// Remove the marker files of any in-progress operation.
    pub fn cleanup_state(&self) -> Result<(), RepoError> {
        for marker in STATE_MARKERS {
            let path = self.git_dir.join(marker);
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}
