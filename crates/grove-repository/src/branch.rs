use grove_hash::ObjectId;
use grove_object::ObjectType;
use grove_ref::{Expected, RefFilter, RefName};
use tracing::debug;

use crate::{HeadState, RepoError, Repository};

/// Which namespace [`Repository::branches`] lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    /// `refs/heads/*`
    Local,
    /// `refs/remotes/*`
    Remote,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub name: RefName,
    /// What the branch resolves to; `None` for a dangling symbolic ref such
    /// as a stale `refs/remotes/origin/HEAD`.
    pub target: Option<ObjectId>,
    pub is_remote: bool,
}

impl Branch {
    /// `main` for `refs/heads/main`, `origin/main` for
    /// `refs/remotes/origin/main`.
    pub fn short_name(&self) -> &str {
        self.name.short_name()
    }
}

impl Repository {
    /// Create `refs/heads/<name>` at `target`, which must be a commit.
    ///
    /// With `force` an existing branch is moved, unless it is the branch
    /// checked out in a non-bare repository.
    pub fn create_branch(&self, name: &str, target: ObjectId, force: bool) -> Result<Branch, RepoError> {
        let refname = RefName::branch(name)?;
        self.expect_kind(&target, ObjectType::Commit)?;
        if force && !self.is_bare() && self.is_current_branch(&refname)? {
            return Err(RepoError::CurrentBranch {
                action: "force-update",
                name: name.to_owned(),
            });
        }

        let message = match self.refs.find(&refname)? {
            Some(_) if force => format!("branch: Reset to {target}"),
            _ => format!("branch: Created from {target}"),
        };
        self.refs.create(&refname, target, force, &message)?;
        debug!(branch = %refname, %target, "created branch");
        Ok(Branch {
            name: refname,
            target: Some(target),
            is_remote: false,
        })
    }

    pub fn find_branch(&self, name: &str, kind: BranchKind) -> Result<Branch, RepoError> {
        let candidates = match kind {
            BranchKind::Local => vec![format!("refs/heads/{name}")],
            BranchKind::Remote => vec![format!("refs/remotes/{name}")],
            BranchKind::All => vec![format!("refs/heads/{name}"), format!("refs/remotes/{name}")],
        };
        for candidate in candidates {
            let refname = RefName::new(candidate)?;
            if let Some(reference) = self.refs.find(&refname)? {
                return Ok(Branch {
                    is_remote: refname.is_remote(),
                    target: self.refs.resolve(&reference).ok(),
                    name: refname,
                });
            }
        }
        Err(RepoError::BranchNotFound(name.to_owned()))
    }

    /// Branches in `kind`, sorted by full name.
    pub fn branches(&self, kind: BranchKind) -> Result<Vec<Branch>, RepoError> {
        let prefixes: &[&str] = match kind {
            BranchKind::Local => &["refs/heads/"],
            BranchKind::Remote => &["refs/remotes/"],
            BranchKind::All => &["refs/heads/", "refs/remotes/"],
        };
        let mut out = Vec::new();
        for prefix in prefixes {
            for reference in self.refs.list(RefFilter::ALL, Some(prefix))? {
                out.push(Branch {
                    target: self.refs.resolve(&reference).ok(),
                    is_remote: reference.name().is_remote(),
                    name: reference.name().clone(),
                });
            }
        }
        Ok(out)
    }

    /// The branch HEAD is attached to, born or not. `None` when detached.
    pub fn current_branch(&self) -> Result<Option<Branch>, RepoError> {
        Ok(match self.head()? {
            HeadState::Attached { branch, oid } => Some(Branch {
                name: branch,
                target: Some(oid),
                is_remote: false,
            }),
            HeadState::Unborn(branch) => Some(Branch {
                name: branch,
                target: None,
                is_remote: false,
            }),
            HeadState::Detached(_) => None,
        })
    }

    fn is_current_branch(&self, name: &RefName) -> Result<bool, RepoError> {
        Ok(self.head()?.branch() == Some(name))
    }

    /// Delete a local branch together with its reflog. The checked-out
    /// branch cannot be deleted.
    pub fn delete_branch(&self, name: &str) -> Result<(), RepoError> {
        let refname = RefName::branch(name)?;
        if self.is_current_branch(&refname)? {
            return Err(RepoError::CurrentBranch {
                action: "delete",
                name: name.to_owned(),
            });
        }
        if self.refs.find(&refname)?.is_none() {
            return Err(RepoError::BranchNotFound(name.to_owned()));
        }
        self.refs.delete_checked(&refname, Expected::Any)?;
        debug!(branch = %refname, "deleted branch");
        Ok(())
    }

    /// Rename a local branch, carrying its reflog and HEAD along.
    pub fn rename_branch(&self, old: &str, new: &str, force: bool) -> Result<Branch, RepoError> {
        let from = RefName::branch(old)?;
        let to = RefName::branch(new)?;
        if self.refs.find(&from)?.is_none() {
            return Err(RepoError::BranchNotFound(old.to_owned()));
        }
        let message = format!("branch: renamed {from} to {to}");
        let reference = self.refs.rename(&from, &to, force, &message)?;
        Ok(Branch {
            target: reference.target_oid(),
            name: to,
            is_remote: false,
        })
    }

    /// The remote-tracking ref a local branch follows, from
    /// `branch.<name>.remote` and `branch.<name>.merge`.
    pub fn upstream(&self, name: &str) -> Result<Option<RefName>, RepoError> {
        let remote = self.config.get_string(&format!("branch.{name}.remote"))?;
        let merge = self.config.get_string(&format!("branch.{name}.merge"))?;
        let (Some(remote), Some(merge)) = (remote, merge) else {
            return Ok(None);
        };
        let branch = merge.strip_prefix("refs/heads/").unwrap_or(&merge);
        if remote == "." {
            return Ok(Some(RefName::branch(branch)?));
        }
        Ok(Some(RefName::new(format!("refs/remotes/{remote}/{branch}"))?))
    }

    /// Record `upstream` (a remote-tracking or local branch ref) as what
    /// `name` follows.
    pub fn set_upstream(&mut self, name: &str, upstream: &RefName) -> Result<(), RepoError> {
        let (remote, merge) = match upstream.as_str().strip_prefix("refs/remotes/") {
            Some(rest) => {
                let (remote, branch) = rest
                    .split_once('/')
                    .ok_or_else(|| RepoError::BranchNotFound(upstream.to_string()))?;
                (remote.to_owned(), format!("refs/heads/{branch}"))
            }
            None => (".".to_owned(), upstream.to_string()),
        };
        self.config.set(&format!("branch.{name}.remote"), &remote)?;
        self.config.set(&format!("branch.{name}.merge"), &merge)?;
        Ok(())
    }
}
