use std::path::{Path, PathBuf};

use crate::RepoError;

/// Where a repository lives before anything is loaded from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Located {
    pub git_dir: PathBuf,
    pub work_tree: Option<PathBuf>,
}

/// A directory is a git dir when it has `HEAD`, `objects/` and `refs/`.
pub fn is_git_dir(path: &Path) -> bool {
    path.join("HEAD").is_file() && path.join("objects").is_dir() && path.join("refs").is_dir()
}

/// Walk up from `start` looking for `.git` (directory or `gitdir:` file) or
/// a bare repository. The search never enters a directory listed in
/// `ceilings`.
pub(crate) fn discover(start: &Path, ceilings: &[PathBuf]) -> Result<Located, RepoError> {
    let start = std::fs::canonicalize(start).map_err(|_| RepoError::NotFound(start.to_path_buf()))?;
    let ceilings: Vec<PathBuf> = ceilings
        .iter()
        .filter_map(|p| std::fs::canonicalize(p).ok())
        .collect();

    let mut current = start.as_path();
    loop {
        if let Some(found) = probe(current)? {
            return Ok(found);
        }
        match current.parent() {
            Some(parent) if !ceilings.iter().any(|c| c == parent) => current = parent,
            _ => return Err(RepoError::NotFound(start)),
        }
    }
}

fn probe(dir: &Path) -> Result<Option<Located>, RepoError> {
    let dot_git = dir.join(".git");
    if dot_git.is_dir() && is_git_dir(&dot_git) {
        return Ok(Some(Located {
            git_dir: dot_git,
            work_tree: Some(dir.to_path_buf()),
        }));
    }
    if dot_git.is_file() {
        let target = follow_gitdir_file(&dot_git, dir)?;
        return Ok(Some(Located {
            git_dir: target,
            work_tree: Some(dir.to_path_buf()),
        }));
    }
    if is_git_dir(dir) {
        return Ok(Some(Located {
            git_dir: dir.to_path_buf(),
            work_tree: None,
        }));
    }
    Ok(None)
}

/// Open `path`, which is either a git dir or a work tree root, without
/// searching upwards.
pub(crate) fn open(path: &Path) -> Result<Located, RepoError> {
    let path = std::fs::canonicalize(path).map_err(|_| RepoError::NotFound(path.to_path_buf()))?;
    if is_git_dir(&path) {
        // `<work>/.git` opened directly still has its work tree.
        let work_tree = match path.parent() {
            Some(parent) if path.file_name().is_some_and(|n| n == ".git") => {
                Some(parent.to_path_buf())
            }
            _ => None,
        };
        return Ok(Located {
            git_dir: path,
            work_tree,
        });
    }
    probe(&path)?.ok_or(RepoError::NotFound(path))
}

/// Read a `.git` file of the form `gitdir: <path>`; relative targets are
/// taken from the directory holding the file.
fn follow_gitdir_file(file: &Path, base: &Path) -> Result<PathBuf, RepoError> {
    let invalid = |reason: String| RepoError::InvalidGitDir {
        path: file.to_path_buf(),
        reason,
    };
    let content = std::fs::read_to_string(file).map_err(|e| invalid(format!("cannot read: {e}")))?;
    let target = content
        .trim()
        .strip_prefix("gitdir:")
        .map(str::trim)
        .ok_or_else(|| invalid("expected 'gitdir: <path>'".into()))?;
    let target = base.join(target);
    let target = std::fs::canonicalize(&target)
        .map_err(|e| invalid(format!("cannot resolve {}: {e}", target.display())))?;
    if !is_git_dir(&target) {
        return Err(invalid(format!("{} is not a git directory", target.display())));
    }
    Ok(target)
}
