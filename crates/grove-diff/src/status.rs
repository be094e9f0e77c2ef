//! Per-file status: what `HEAD` to index and index to work tree each say
//! about a path, joined into one entry per path.

use std::collections::BTreeMap;

use bstr::BString;
use grove_index::Index;
use grove_repository::{Repository, Workdir};
use tracing::debug;

use crate::{diff_index_to_workdir, diff_tree_to_index, DeltaStatus, DiffDelta, DiffError, DiffOptions, FindOptions};

/// Which of the two comparisons to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusShow {
    #[default]
    IndexAndWorkdir,
    IndexOnly,
    WorkdirOnly,
}

#[derive(Debug, Clone, Default)]
pub struct StatusOptions {
    pub show: StatusShow,
    pub include_untracked: bool,
    pub include_ignored: bool,
    pub include_unmodified: bool,
    /// Path prefixes or globs; empty means every path.
    pub pathspec: Vec<BString>,
    pub renames_head_to_index: bool,
    pub renames_index_to_workdir: bool,
}

/// One path's status. A missing side means that comparison found nothing
/// to report.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEntry {
    /// The path as the index knows it.
    pub path: BString,
    pub head_to_index: Option<DiffDelta>,
    pub index_to_workdir: Option<DiffDelta>,
}

impl StatusEntry {
    pub fn index_status(&self) -> DeltaStatus {
        self.head_to_index.as_ref().map_or(DeltaStatus::Unmodified, |d| d.status)
    }

    pub fn workdir_status(&self) -> DeltaStatus {
        self.index_to_workdir.as_ref().map_or(DeltaStatus::Unmodified, |d| d.status)
    }

    /// Two-letter code as in `git status --short`.
    pub fn short_code(&self) -> String {
        let letter = |status: DeltaStatus| match status {
            DeltaStatus::Unmodified => ' ',
            other => other.as_char(),
        };
        match (self.index_status(), self.workdir_status()) {
            (_, DeltaStatus::Untracked) => "??".into(),
            (_, DeltaStatus::Ignored) => "!!".into(),
            (DeltaStatus::Conflicted, _) | (_, DeltaStatus::Conflicted) => "UU".into(),
            (index, workdir) => format!("{}{}", letter(index), letter(workdir)),
        }
    }
}

/// Status of every path that differs between `HEAD`, `index` and
/// `workdir`, sorted by path. An unborn `HEAD` counts as an empty tree.
pub fn status(
    repo: &Repository,
    index: &Index,
    workdir: &dyn Workdir,
    options: &StatusOptions,
) -> Result<Vec<StatusEntry>, DiffError> {
    let diff_options = DiffOptions {
        include_untracked: options.include_untracked,
        include_ignored: options.include_ignored,
        include_unmodified: options.include_unmodified,
        include_typechange: true,
        pathspec: options.pathspec.clone(),
        ..DiffOptions::default()
    };
    let mut staged = Vec::new();
    if options.show != StatusShow::WorkdirOnly {
        let head = if repo.is_head_unborn()? { None } else { Some(repo.head_tree()?) };
        let mut diff = diff_tree_to_index(repo, head.as_ref(), index, &diff_options)?;
        if options.renames_head_to_index {
            diff.find_similar(&FindOptions::default())?;
        }
        staged = diff.deltas().to_vec();
    }
    let mut unstaged = Vec::new();
    if options.show != StatusShow::IndexOnly {
        let mut diff = diff_index_to_workdir(repo, index, workdir, &diff_options)?;
        if options.renames_index_to_workdir {
            diff.find_similar(&FindOptions::default())?;
        }
        unstaged = diff.deltas().to_vec();
    }

    let mut entries: BTreeMap<BString, StatusEntry> = BTreeMap::new();
    // Keyed by the index side of each comparison, so a rename joins the
    // entry of the path it was staged under.
    for delta in staged {
        let path = delta.new_file.path.clone();
        entry(&mut entries, path).head_to_index = Some(delta);
    }
    for delta in unstaged {
        let path = delta.old_file.path.clone();
        entry(&mut entries, path).index_to_workdir = Some(delta);
    }

    let entries: Vec<StatusEntry> = entries.into_values().collect();
    debug!(entries = entries.len(), show = ?options.show, "computed status");
    Ok(entries)
}

fn entry(entries: &mut BTreeMap<BString, StatusEntry>, path: BString) -> &mut StatusEntry {
    entries.entry(path.clone()).or_insert_with(|| StatusEntry {
        path,
        head_to_index: None,
        index_to_workdir: None,
    })
}

/// Whether nothing is staged and no tracked file differs in the work tree.
/// Untracked files do not count.
pub fn is_clean(repo: &Repository, index: &Index, workdir: &dyn Workdir) -> Result<bool, DiffError> {
    let entries = status(repo, index, workdir, &StatusOptions::default())?;
    Ok(entries.is_empty())
}
