//! Conflicts as structured results and their index stages.

use bstr::{BStr, BString, ByteSlice};
use grove_hash::ObjectId;
use grove_index::{Index, IndexConflict, IndexEntry};
use grove_object::FileMode;
use grove_repository::Repository;
use tracing::trace;

use crate::file::{merge_file, MergeFileInput, MergeFileResult};
use crate::{MergeError, MergeFileOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Both sides changed the same lines, or changed a file that cannot be
    /// merged line by line.
    Content,
    /// One side changed the file, the other deleted it.
    ModifyDelete,
    /// Both sides put different files at a path the ancestor lacked.
    AddAdd,
    /// The sides renamed the file to different paths.
    RenameRename,
    /// One side renamed the file, the other deleted it.
    RenameDelete,
    /// A file on one side is a directory on the other; the file was moved
    /// aside to `path~side`.
    DirectoryFile,
}

/// One version of a conflicted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSide {
    /// Where this version lives in its own tree.
    pub path: BString,
    pub oid: ObjectId,
    pub mode: FileMode,
}

impl ConflictSide {
    fn entry(&self, path: &BStr) -> IndexEntry {
        IndexEntry::new(path, self.oid, self.mode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub kind: ConflictKind,
    /// Path the conflict is recorded under in the merged index.
    pub path: BString,
    pub ancestor: Option<ConflictSide>,
    pub ours: Option<ConflictSide>,
    pub theirs: Option<ConflictSide>,
    /// The merged text with conflict markers, for line conflicts.
    pub merged: Option<Vec<u8>>,
}

/// Record `conflicts` as stages 1 to 3. A rename/rename conflict is
/// recorded at both destinations, each with the ancestor and its own side.
pub fn write_conflicts_to_index(index: &mut Index, conflicts: &[MergeConflict]) -> Result<(), MergeError> {
    for conflict in conflicts {
        let ancestor_at = |path: &BStr| conflict.ancestor.as_ref().map(|side| side.entry(path));
        match (conflict.kind, &conflict.ours, &conflict.theirs) {
            (ConflictKind::RenameRename, Some(ours), Some(theirs)) if ours.path != theirs.path => {
                index.add_conflict(IndexConflict {
                    ancestor: ancestor_at(ours.path.as_bstr()),
                    ours: Some(ours.entry(ours.path.as_bstr())),
                    theirs: None,
                })?;
                index.add_conflict(IndexConflict {
                    ancestor: ancestor_at(theirs.path.as_bstr()),
                    ours: None,
                    theirs: Some(theirs.entry(theirs.path.as_bstr())),
                })?;
            }
            _ => {
                let path = conflict.path.as_bstr();
                index.add_conflict(IndexConflict {
                    ancestor: ancestor_at(path),
                    ours: conflict.ours.as_ref().map(|side| side.entry(path)),
                    theirs: conflict.theirs.as_ref().map(|side| side.entry(path)),
                })?;
            }
        }
        trace!(path = %conflict.path, kind = ?conflict.kind, "recorded conflict");
    }
    Ok(())
}

fn read_blob(repo: &Repository, entry: Option<&IndexEntry>) -> Result<Vec<u8>, MergeError> {
    let Some(entry) = entry else {
        return Ok(Vec::new());
    };
    crate::tree::read_blob(repo, &entry.oid)
}

fn input<'a>(content: &'a [u8], side: &'a Option<IndexEntry>) -> MergeFileInput<'a> {
    MergeFileInput {
        content,
        path: side.as_ref().map(|e| e.path.as_bstr()),
        mode: side.as_ref().map(|e| e.mode),
    }
}

/// Run a file merge over the stages of one index conflict.
pub fn merge_file_from_index(
    repo: &Repository,
    conflict: &IndexConflict,
    options: &MergeFileOptions,
) -> Result<MergeFileResult, MergeError> {
    let sides = [&conflict.ancestor, &conflict.ours, &conflict.theirs];
    let [ancestor, ours, theirs] = sides.map(|side| read_blob(repo, side.as_ref()));
    let (ancestor, ours, theirs) = (ancestor?, ours?, theirs?);
    Ok(merge_file(
        &input(&ancestor, &conflict.ancestor),
        &input(&ours, &conflict.ours),
        &input(&theirs, &conflict.theirs),
        options,
    ))
}
