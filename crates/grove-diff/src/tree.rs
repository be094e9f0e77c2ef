//! Tree-to-tree diff: a merge join over the sorted entries of each level,
//! recursing into subtrees that differ.

use std::collections::BTreeMap;

use bstr::{BStr, BString, ByteSlice};
use grove_hash::{HashAlgorithm, ObjectId};
use grove_object::{FileMode, Object, Tree, TreeEntry};
use grove_odb::ObjectDatabase;
use grove_repository::Repository;
use tracing::debug;

use crate::delta::{DeltaStatus, DiffDelta, DiffFile, FileFlags};
use crate::diff::{blob_size, Diff};
use crate::pathspec::Pathspec;
use crate::{DiffError, DiffOptions};

/// Diff two trees. Commits are peeled to their trees; `None` is the empty
/// tree.
pub fn diff_trees<'r>(
    repo: &'r Repository,
    old: Option<&ObjectId>,
    new: Option<&ObjectId>,
    options: &DiffOptions,
) -> Result<Diff<'r>, DiffError> {
    let old = old.map(|oid| repo.peel_to_tree(oid)).transpose()?;
    let new = new.map(|oid| repo.peel_to_tree(oid)).transpose()?;
    let (old, new) = if options.reverse { (new, old) } else { (old, new) };

    let mut walker = TreeWalker {
        odb: repo.odb(),
        algo: repo.hash_algorithm(),
        options,
        pathspec: Pathspec::new(&options.pathspec),
        deltas: Vec::new(),
    };
    walker.walk(old.as_ref(), new.as_ref(), BStr::new(""))?;
    let mut deltas = walker.deltas;
    sort_deltas(&mut deltas);
    debug!(old = ?old, new = ?new, deltas = deltas.len(), "diffed trees");
    Diff::new(repo.odb(), Some(repo.filters()), None, deltas, options)
}

/// Path order, stable so a deletion stays ahead of an addition at the
/// same path.
pub(crate) fn sort_deltas(deltas: &mut [DiffDelta]) {
    deltas.sort_by(|a, b| a.path().cmp(b.path()));
}

pub(crate) fn join_path(prefix: &BStr, name: &BStr) -> BString {
    if prefix.is_empty() {
        return name.to_owned();
    }
    let mut path = prefix.to_owned();
    path.push(b'/');
    path.extend_from_slice(name);
    path
}

pub(crate) fn read_tree(odb: &ObjectDatabase, oid: &ObjectId) -> Result<Tree, DiffError> {
    match odb.read(oid)? {
        Object::Tree(tree) => Ok(tree),
        other => Err(DiffError::WrongObjectType {
            oid: *oid,
            expected: "tree",
            actual: other.object_type().as_str(),
        }),
    }
}

/// Classify two present, non-tree files at one path.
pub(crate) fn push_file_pair(old: DiffFile, mut new: DiffFile, options: &DiffOptions, algo: HashAlgorithm, out: &mut Vec<DiffDelta>) {
    let (Some(old_mode), Some(new_mode)) = (old.mode, new.mode) else {
        return;
    };
    if options.ignore_filemode && old_mode.is_blob() && new_mode.is_blob() {
        new.mode = Some(old_mode);
    }
    let both_known = old.flags.contains(FileFlags::VALID_ID) && new.flags.contains(FileFlags::VALID_ID);
    if both_known && old.oid == new.oid && old.mode == new.mode {
        if options.include_unmodified {
            out.push(DiffDelta::new(DeltaStatus::Unmodified, old, new));
        }
    } else if old_mode.kind_class() != new_mode.kind_class() {
        if options.include_typechange {
            out.push(DiffDelta::new(DeltaStatus::TypeChange, old, new));
        } else {
            out.push(DiffDelta::deleted(old, algo));
            out.push(DiffDelta::added(new, algo));
        }
    } else {
        out.push(DiffDelta::new(DeltaStatus::Modified, old, new));
    }
}

struct TreeWalker<'a> {
    odb: &'a ObjectDatabase,
    algo: HashAlgorithm,
    options: &'a DiffOptions,
    pathspec: Pathspec<'a>,
    deltas: Vec<DiffDelta>,
}

impl TreeWalker<'_> {
    fn file(&self, path: &BStr, entry: &TreeEntry) -> DiffFile {
        DiffFile::known(path, entry.oid, entry.mode, blob_size(self.odb, &entry.oid, entry.mode))
    }

    fn walk(&mut self, old: Option<&ObjectId>, new: Option<&ObjectId>, prefix: &BStr) -> Result<(), DiffError> {
        let old_tree = old.map(|oid| read_tree(self.odb, oid)).transpose()?;
        let new_tree = new.map(|oid| read_tree(self.odb, oid)).transpose()?;

        let mut names: BTreeMap<&BStr, (Option<&TreeEntry>, Option<&TreeEntry>)> = BTreeMap::new();
        for entry in old_tree.iter().flat_map(Tree::iter) {
            names.entry(entry.name.as_bstr()).or_default().0 = Some(entry);
        }
        for entry in new_tree.iter().flat_map(Tree::iter) {
            names.entry(entry.name.as_bstr()).or_default().1 = Some(entry);
        }

        for (name, pair) in names {
            let path = join_path(prefix, name);
            match pair {
                (Some(o), Some(n)) => self.both(path.as_bstr(), o, n)?,
                (Some(o), None) => self.one_side(path.as_bstr(), o, true)?,
                (None, Some(n)) => self.one_side(path.as_bstr(), n, false)?,
                (None, None) => {}
            }
        }
        Ok(())
    }

    fn both(&mut self, path: &BStr, old: &TreeEntry, new: &TreeEntry) -> Result<(), DiffError> {
        match (old.mode.is_tree(), new.mode.is_tree()) {
            (true, true) => {
                let descend = old.oid != new.oid || self.options.include_unmodified;
                if descend && self.pathspec.may_contain(path) {
                    self.walk(Some(&old.oid), Some(&new.oid), path)?;
                }
            }
            (false, false) => {
                if self.pathspec.matches(path) {
                    let (old, new) = (self.file(path, old), self.file(path, new));
                    push_file_pair(old, new, self.options, self.algo, &mut self.deltas);
                }
            }
            // A blob and a tree share the name.
            _ => {
                if self.options.include_typechange {
                    if self.pathspec.matches(path) {
                        let delta = DiffDelta::new(DeltaStatus::TypeChange, self.file(path, old), self.file(path, new));
                        self.deltas.push(delta);
                    }
                } else {
                    self.one_side(path, old, true)?;
                    self.one_side(path, new, false)?;
                }
            }
        }
        Ok(())
    }

    /// An entry present on one side only; `old` tells which.
    fn one_side(&mut self, path: &BStr, entry: &TreeEntry, old: bool) -> Result<(), DiffError> {
        if entry.mode.is_tree() {
            if self.pathspec.may_contain(path) {
                if old {
                    self.walk(Some(&entry.oid), None, path)?;
                } else {
                    self.walk(None, Some(&entry.oid), path)?;
                }
            }
        } else if self.pathspec.matches(path) {
            let file = self.file(path, entry);
            let delta = if old {
                DiffDelta::deleted(file, self.algo)
            } else {
                DiffDelta::added(file, self.algo)
            };
            self.deltas.push(delta);
        }
        Ok(())
    }
}

/// Every non-tree entry below `tree`, keyed by full path.
pub(crate) fn flatten_tree(
    odb: &ObjectDatabase,
    tree: &ObjectId,
    prefix: &BStr,
    pathspec: &Pathspec<'_>,
    out: &mut BTreeMap<BString, (FileMode, ObjectId)>,
) -> Result<(), DiffError> {
    for entry in read_tree(odb, tree)?.iter() {
        let path = join_path(prefix, entry.name.as_bstr());
        if entry.mode.is_tree() {
            if pathspec.may_contain(path.as_bstr()) {
                flatten_tree(odb, &entry.oid, path.as_bstr(), pathspec, out)?;
            }
        } else if pathspec.matches(path.as_bstr()) {
            out.insert(path, (entry.mode, entry.oid));
        }
    }
    Ok(())
}
