use bstr::ByteSlice;
use grove_hash::ObjectId;
use grove_index::{Index, IndexEntry};
use grove_object::{Blob, Object};
use grove_repository::Repository;
use grove_revwalk::{merge_bases, RevWalkError};
use tracing::debug;

use crate::tree::{merge_trees, TreeMergeOutcome};
use crate::{ConflictKind, ConflictStyle, FileFavor, MergeConflict, MergeError, MergeOptions};

/// Merge two commit-ish objects over their merge base.
///
/// Unrelated histories fail with [`MergeError::NoMergeBase`] unless
/// `allow_unrelated` is set, in which case the ancestor is an empty tree.
/// Several merge bases are first merged into one virtual base.
pub fn merge_commits(
    repo: &Repository,
    ours: &ObjectId,
    theirs: &ObjectId,
    options: &MergeOptions,
) -> Result<TreeMergeOutcome, MergeError> {
    let ours = repo.peel_to_commit(ours)?;
    let theirs = repo.peel_to_commit(theirs)?;
    let bases = match merge_bases(repo, &ours, &theirs) {
        Err(RevWalkError::NoMergeBase) => Vec::new(),
        other => other?,
    };
    let ancestor = match bases.as_slice() {
        [] if options.allow_unrelated => None,
        [] => return Err(MergeError::NoMergeBase),
        [base] => Some(*base),
        _ => Some(virtual_base(repo, &bases, options)?),
    };
    debug!(%ours, %theirs, bases = bases.len(), ?ancestor, "merging commits");
    merge_trees(repo, ancestor.as_ref(), &ours, &theirs, options)
}

/// Fold several merge bases into one commit by merging them pairwise.
fn virtual_base(repo: &Repository, bases: &[ObjectId], options: &MergeOptions) -> Result<ObjectId, MergeError> {
    let mut inner = options.clone();
    inner.allow_unrelated = true;
    inner.file.style = ConflictStyle::Merge;
    inner.file.favor = FileFavor::Normal;
    inner.file.our_label = Some("Temporary merge branch 1".into());
    inner.file.their_label = Some("Temporary merge branch 2".into());

    let mut current = bases[0];
    for next in &bases[1..] {
        let outcome = merge_commits(repo, &current, next, &inner)?;
        let tree = match outcome.tree {
            Some(tree) => tree,
            None => settle(repo, outcome)?,
        };

        let first = repo.find_commit(&current)?;
        let second = repo.find_commit(next)?;
        let mut committer = first.committer.clone();
        committer.date = std::cmp::max_by_key(first.committer.date, second.committer.date, |d| d.timestamp);
        current = repo.commit(
            &tree,
            &[current, *next],
            &committer,
            &committer,
            "merged common ancestors",
            None,
        )?;
        debug!(virtual_base = %current, "merged two merge bases");
    }
    Ok(current)
}

/// Write a tree for a conflicted merge of merge bases. A conflicted file
/// keeps its marked-up text, or else whichever side still has it.
fn settle(repo: &Repository, outcome: TreeMergeOutcome) -> Result<ObjectId, MergeError> {
    let mut index: Index = outcome.index;
    for conflict in &outcome.conflicts {
        let MergeConflict {
            kind,
            path,
            ancestor,
            ours,
            theirs,
            merged,
        } = conflict;
        if *kind == ConflictKind::RenameRename {
            for side in [ours, theirs].into_iter().flatten() {
                index.remove_all(side.path.as_bstr());
            }
            if let Some(ancestor) = ancestor {
                index.add(IndexEntry::new(path.clone(), ancestor.oid, ancestor.mode))?;
            }
            continue;
        }

        let survivor = ours.as_ref().or(theirs.as_ref());
        let entry = match (merged, survivor) {
            (Some(text), Some(side)) => {
                let oid = repo.odb().write(&Object::Blob(Blob::new(text.clone())))?;
                Some(IndexEntry::new(path.clone(), oid, side.mode))
            }
            (None, Some(side)) => Some(IndexEntry::new(path.clone(), side.oid, side.mode)),
            (_, None) => None,
        };
        index.remove_all(path.as_bstr());
        if let Some(entry) = entry {
            index.add(entry)?;
        }
    }
    Ok(index.write_tree(repo.odb())?)
}
