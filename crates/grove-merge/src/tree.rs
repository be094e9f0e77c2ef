//! Three-way tree merge.
//!
//! The three trees are flattened to path maps. Renames found on each side
//! pair an ancestor path with the path the file moved to, so a file edited
//! on one side and moved on the other still merges as one file. Each
//! paired file is then decided on its own; path collisions between the
//! decided files are handled last.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use bstr::{BString, ByteVec};
use grove_diff::{diff_trees, DeltaStatus, DiffOptions};
use grove_hash::ObjectId;
use grove_index::{Index, IndexEntry};
use grove_object::{Blob, FileMode, Object};
use grove_repository::Repository;
use tracing::{debug, trace};

use crate::conflict::{write_conflicts_to_index, ConflictKind, ConflictSide, MergeConflict};
use crate::file::{merge_file, MergeFileInput};
use crate::{MergeError, MergeOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    oid: ObjectId,
    mode: FileMode,
}

type Flat = BTreeMap<BString, Entry>;

/// Result of [`merge_trees`].
#[derive(Debug, Clone)]
pub struct TreeMergeOutcome {
    /// Stage 0 for merged paths, stages 1 to 3 for conflicts.
    pub index: Index,
    pub conflicts: Vec<MergeConflict>,
    /// The merged tree; only written when there are no conflicts.
    pub tree: Option<ObjectId>,
}

impl TreeMergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Merge tree-ish `ours` and `theirs` relative to `ancestor`. An absent
/// ancestor merges as an empty tree.
pub fn merge_trees(
    repo: &Repository,
    ancestor: Option<&ObjectId>,
    ours: &ObjectId,
    theirs: &ObjectId,
    options: &MergeOptions,
) -> Result<TreeMergeOutcome, MergeError> {
    let ancestor = ancestor.map(|oid| repo.peel_to_tree(oid)).transpose()?;
    let (ours, theirs) = (repo.peel_to_tree(ours)?, repo.peel_to_tree(theirs)?);

    let ancestor_files = flatten(repo, ancestor.as_ref())?;
    let ours_files = flatten(repo, Some(&ours))?;
    let theirs_files = flatten(repo, Some(&theirs))?;
    let ours_renames = renames(repo, ancestor.as_ref(), &ours, options)?;
    let theirs_renames = renames(repo, ancestor.as_ref(), &theirs, options)?;

    let mut merger = TreeMerger {
        repo,
        options,
        clean: Vec::new(),
        conflicts: Vec::new(),
    };
    for file in pair(&ancestor_files, &ours_files, &theirs_files, &ours_renames, &theirs_renames) {
        merger.resolve(file)?;
    }
    let outcome = merger.finish()?;
    debug!(
        entries = outcome.index.len(),
        conflicts = outcome.conflicts.len(),
        renames = ours_renames.len() + theirs_renames.len(),
        "merged trees"
    );
    Ok(outcome)
}

fn flatten(repo: &Repository, tree: Option<&ObjectId>) -> Result<Flat, MergeError> {
    let Some(tree) = tree else {
        return Ok(Flat::new());
    };
    let mut index = Index::new();
    index.read_tree(repo.odb(), tree)?;
    Ok(index
        .iter()
        .map(|e| (e.path.clone(), Entry { oid: e.oid, mode: e.mode }))
        .collect())
}

/// Ancestor path to new path for every file `side` renamed.
fn renames(
    repo: &Repository,
    ancestor: Option<&ObjectId>,
    side: &ObjectId,
    options: &MergeOptions,
) -> Result<HashMap<BString, BString>, MergeError> {
    if ancestor.is_none() || !options.find.renames {
        return Ok(HashMap::new());
    }
    let mut diff = diff_trees(repo, ancestor, Some(side), &DiffOptions::default())?;
    diff.find_similar(&options.find)?;
    Ok(diff
        .deltas()
        .iter()
        .filter(|d| d.status == DeltaStatus::Renamed)
        .map(|d| (d.old_file.path.clone(), d.new_file.path.clone()))
        .collect())
}

/// One file followed through the three trees.
#[derive(Debug)]
struct Paired {
    ancestor_path: Option<BString>,
    ours_path: BString,
    theirs_path: BString,
    ancestor: Option<Entry>,
    ours: Option<Entry>,
    theirs: Option<Entry>,
}

fn pair(
    ancestor: &Flat,
    ours: &Flat,
    theirs: &Flat,
    ours_renames: &HashMap<BString, BString>,
    theirs_renames: &HashMap<BString, BString>,
) -> Vec<Paired> {
    let mut paired = Vec::with_capacity(ancestor.len());
    let mut ours_taken = HashSet::new();
    let mut theirs_taken = HashSet::new();
    for (path, entry) in ancestor {
        let ours_path = ours_renames.get(path).unwrap_or(path);
        let theirs_path = theirs_renames.get(path).unwrap_or(path);
        ours_taken.insert(ours_path);
        theirs_taken.insert(theirs_path);
        paired.push(Paired {
            ancestor_path: Some(path.clone()),
            ours_path: ours_path.clone(),
            theirs_path: theirs_path.clone(),
            ancestor: Some(*entry),
            ours: ours.get(ours_path).copied(),
            theirs: theirs.get(theirs_path).copied(),
        });
    }

    let added: BTreeSet<&BString> = ours
        .keys()
        .filter(|p| !ours_taken.contains(p))
        .chain(theirs.keys().filter(|p| !theirs_taken.contains(p)))
        .collect();
    for path in added {
        let ours = ours.get(path).filter(|_| !ours_taken.contains(path)).copied();
        let theirs = theirs.get(path).filter(|_| !theirs_taken.contains(path)).copied();
        paired.push(Paired {
            ancestor_path: None,
            ours_path: path.clone(),
            theirs_path: path.clone(),
            ancestor: None,
            ours,
            theirs,
        });
    }
    paired
}

/// Which side a merged entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Ours,
    Theirs,
    Both,
}

struct TreeMerger<'a> {
    repo: &'a Repository,
    options: &'a MergeOptions,
    clean: Vec<(BString, Entry, Origin)>,
    conflicts: Vec<MergeConflict>,
}

fn side(path: &BString, entry: Option<Entry>) -> Option<ConflictSide> {
    entry.map(|e| ConflictSide {
        path: path.clone(),
        oid: e.oid,
        mode: e.mode,
    })
}

impl TreeMerger<'_> {
    fn take(&mut self, path: BString, entry: Option<Entry>, origin: Origin) {
        if let Some(entry) = entry {
            self.clean.push((path, entry, origin));
        }
    }

    fn resolve(&mut self, file: Paired) -> Result<(), MergeError> {
        let renamed = |side_path: &BString| file.ancestor_path.as_ref().is_some_and(|a| a != side_path);
        let (ours_renamed, theirs_renamed) = (renamed(&file.ours_path), renamed(&file.theirs_path));
        let ancestor = file
            .ancestor_path
            .as_ref()
            .and_then(|path| side(path, file.ancestor));
        let (a, o, t) = (file.ancestor, file.ours, file.theirs);

        if ours_renamed && theirs_renamed && file.ours_path != file.theirs_path {
            let path = file.ancestor_path.clone().unwrap_or_default();
            self.conflict(ConflictKind::RenameRename, path, ancestor, &file, None);
            return Ok(());
        }
        let path = if ours_renamed {
            file.ours_path.clone()
        } else {
            file.theirs_path.clone()
        };
        if (ours_renamed && t.is_none()) || (theirs_renamed && o.is_none()) {
            self.conflict(ConflictKind::RenameDelete, path, ancestor, &file, None);
            return Ok(());
        }

        if o == t {
            self.take(path, o, Origin::Both);
            return Ok(());
        }
        if a == o {
            self.take(path, t, Origin::Theirs);
            return Ok(());
        }
        if a == t {
            self.take(path, o, Origin::Ours);
            return Ok(());
        }

        let kind = match (a, o, t) {
            (None, _, _) => ConflictKind::AddAdd,
            (_, None, _) | (_, _, None) => ConflictKind::ModifyDelete,
            _ => ConflictKind::Content,
        };
        let (Some(ours), Some(theirs)) = (o, t) else {
            self.conflict(kind, path, ancestor, &file, None);
            return Ok(());
        };
        let mergeable = ours.mode.is_blob() && theirs.mode.is_blob() && a.map_or(true, |a| a.mode.is_blob());
        if !mergeable {
            self.conflict(kind, path, ancestor, &file, None);
            return Ok(());
        }

        let ancestor_data = match a {
            Some(a) => read_blob(self.repo, &a.oid)?,
            None => Vec::new(),
        };
        let (ours_data, theirs_data) = (read_blob(self.repo, &ours.oid)?, read_blob(self.repo, &theirs.oid)?);
        let merged = merge_file(
            &MergeFileInput {
                content: &ancestor_data,
                path: None,
                mode: a.map(|a| a.mode),
            },
            &MergeFileInput::new(&ours_data).with_mode(ours.mode),
            &MergeFileInput::new(&theirs_data).with_mode(theirs.mode),
            &self.options.file,
        );
        match merged_mode(a.map(|a| a.mode), ours.mode, theirs.mode) {
            Some(mode) if merged.automergeable => {
                let oid = self.repo.odb().write(&Object::Blob(Blob::new(merged.content)))?;
                trace!(%path, %oid, "merged file content");
                self.take(path, Some(Entry { oid, mode }), Origin::Both);
            }
            _ => self.conflict(kind, path, ancestor, &file, Some(merged.content)),
        }
        Ok(())
    }

    fn conflict(
        &mut self,
        kind: ConflictKind,
        path: BString,
        ancestor: Option<ConflictSide>,
        file: &Paired,
        merged: Option<Vec<u8>>,
    ) {
        trace!(%path, ?kind, "conflict");
        self.conflicts.push(MergeConflict {
            kind,
            path,
            ancestor,
            ours: side(&file.ours_path, file.ours),
            theirs: side(&file.theirs_path, file.theirs),
            merged,
        });
    }

    /// Where a file goes when a directory holds its path.
    fn aside(&self, path: &BString, origin: Origin) -> BString {
        let file = &self.options.file;
        let label = match origin {
            Origin::Theirs => file.their_label.as_deref().unwrap_or("theirs"),
            Origin::Ours | Origin::Both => file.our_label.as_deref().unwrap_or("ours"),
        };
        let mut aside = path.clone();
        aside.push_str(format!("~{label}"));
        aside
    }

    /// Settle paths claimed twice and files in the way of directories,
    /// then build the index.
    fn finish(mut self) -> Result<TreeMergeOutcome, MergeError> {
        let mut by_path: BTreeMap<BString, Vec<(Entry, Origin)>> = BTreeMap::new();
        for (path, entry, origin) in std::mem::take(&mut self.clean) {
            let claims = by_path.entry(path).or_default();
            if !claims.iter().any(|(e, _)| *e == entry) {
                claims.push((entry, origin));
            }
        }

        let mut clean: Vec<(BString, Entry, Origin)> = Vec::with_capacity(by_path.len());
        for (path, claims) in by_path {
            match claims.as_slice() {
                [(entry, origin)] => clean.push((path, *entry, *origin)),
                _ => {
                    let pick = |want: Origin| {
                        claims
                            .iter()
                            .find(|(_, origin)| *origin == want)
                            .or(claims.iter().find(|(_, origin)| *origin == Origin::Both))
                            .map(|(e, _)| *e)
                    };
                    self.conflicts.push(MergeConflict {
                        kind: ConflictKind::AddAdd,
                        ours: side(&path, pick(Origin::Ours)),
                        theirs: side(&path, pick(Origin::Theirs)),
                        path,
                        ancestor: None,
                        merged: None,
                    });
                }
            }
        }

        let occupied: BTreeSet<BString> = clean
            .iter()
            .map(|(path, _, _)| path.clone())
            .chain(self.conflicts.iter().map(|c| c.path.clone()))
            .collect();
        let is_dir = |path: &BString| {
            let mut prefix = path.clone();
            prefix.push_byte(b'/');
            occupied.range(prefix.clone()..).next().is_some_and(|p| p.starts_with(&prefix))
        };

        let mut entries = Vec::with_capacity(clean.len());
        let mut moved = Vec::new();
        for (path, entry, origin) in clean {
            if !is_dir(&path) {
                entries.push(IndexEntry::new(path, entry.oid, entry.mode));
                continue;
            }
            let aside = self.aside(&path, origin);
            let sided = side(&path, Some(entry));
            let (ours, theirs) = match origin {
                Origin::Theirs => (None, sided),
                Origin::Ours | Origin::Both => (sided, None),
            };
            moved.push(MergeConflict {
                kind: ConflictKind::DirectoryFile,
                path: aside,
                ancestor: None,
                ours,
                theirs,
                merged: None,
            });
        }
        let mut conflicts = std::mem::take(&mut self.conflicts);
        for conflict in &mut conflicts {
            if conflict.kind != ConflictKind::RenameRename && is_dir(&conflict.path) {
                let origin = if conflict.ours.is_some() { Origin::Ours } else { Origin::Theirs };
                conflict.path = self.aside(&conflict.path, origin);
            }
        }
        conflicts.extend(moved);
        conflicts.sort_by(|a, b| a.path.cmp(&b.path));
        self.conflicts = conflicts;

        let mut index = Index::new();
        index.set_entries(entries)?;
        write_conflicts_to_index(&mut index, &self.conflicts)?;
        let tree = if self.conflicts.is_empty() {
            Some(index.write_tree(self.repo.odb())?)
        } else {
            None
        };
        Ok(TreeMergeOutcome {
            index,
            conflicts: self.conflicts,
            tree,
        })
    }
}

/// The mode a merged file keeps. Both sides changing it to different
/// values is a conflict, as is an add/add with different modes.
fn merged_mode(ancestor: Option<FileMode>, ours: FileMode, theirs: FileMode) -> Option<FileMode> {
    if ours == theirs || ancestor == Some(theirs) {
        Some(ours)
    } else if ancestor == Some(ours) {
        Some(theirs)
    } else {
        None
    }
}

pub(crate) fn read_blob(repo: &Repository, oid: &ObjectId) -> Result<Vec<u8>, MergeError> {
    match repo.odb().read(oid)? {
        Object::Blob(blob) => Ok(blob.data),
        other => Err(MergeError::WrongObjectType {
            oid: *oid,
            expected: "blob",
            actual: other.object_type().as_str(),
        }),
    }
}
