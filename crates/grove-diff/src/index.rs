use std::collections::{BTreeMap, BTreeSet};

use bstr::{BStr, BString, ByteSlice};
use grove_hash::ObjectId;
use grove_index::{Index, IndexEntry, Stage};
use grove_repository::Repository;
use tracing::debug;

use crate::delta::{DeltaStatus, DiffDelta, DiffFile};
use crate::diff::{blob_size, Diff};
use crate::pathspec::Pathspec;
use crate::tree::{flatten_tree, push_file_pair, sort_deltas};
use crate::{DiffError, DiffOptions};

pub(crate) fn index_file(entry: &IndexEntry) -> DiffFile {
    DiffFile::known(entry.path.clone(), entry.oid, entry.mode, u64::from(entry.stat.size))
}

/// Stage-0 entries and, separately, the "ours" side (or any side) of each
/// conflicted path, both filtered by pathspec.
pub(crate) fn split_index<'i>(
    index: &'i Index,
    pathspec: &Pathspec<'_>,
) -> (BTreeMap<&'i BStr, &'i IndexEntry>, BTreeMap<&'i BStr, Option<&'i IndexEntry>>) {
    let mut resolved = BTreeMap::new();
    let mut conflicted: BTreeMap<&BStr, Option<&IndexEntry>> = BTreeMap::new();
    for entry in index.iter().filter(|e| pathspec.matches(e.path.as_bstr())) {
        if entry.stage == Stage::Normal {
            resolved.insert(entry.path.as_bstr(), entry);
        } else {
            let slot = conflicted.entry(entry.path.as_bstr()).or_default();
            if entry.stage == Stage::Ours || slot.is_none() {
                *slot = Some(entry);
            }
        }
    }
    (resolved, conflicted)
}

/// Diff a tree (what `HEAD` has) against the index (what is staged).
/// Conflicted paths are reported once, as `Conflicted`.
pub fn diff_tree_to_index<'r>(
    repo: &'r Repository,
    tree: Option<&ObjectId>,
    index: &Index,
    options: &DiffOptions,
) -> Result<Diff<'r>, DiffError> {
    let odb = repo.odb();
    let algo = repo.hash_algorithm();
    let pathspec = Pathspec::new(&options.pathspec);

    let mut tree_files = BTreeMap::new();
    if let Some(tree) = tree {
        let tree = repo.peel_to_tree(tree)?;
        flatten_tree(odb, &tree, BStr::new(""), &pathspec, &mut tree_files)?;
    }
    let (resolved, conflicted) = split_index(index, &pathspec);

    let paths: BTreeSet<&BStr> = tree_files
        .keys()
        .map(|p: &BString| p.as_bstr())
        .chain(resolved.keys().copied())
        .chain(conflicted.keys().copied())
        .collect();

    let mut deltas = Vec::new();
    for path in paths {
        let tree_file = tree_files
            .get(path)
            .map(|&(mode, oid)| DiffFile::known(path, oid, mode, blob_size(odb, &oid, mode)));
        if let Some(ours) = conflicted.get(path) {
            let old = tree_file.unwrap_or_else(|| DiffFile::absent(path, algo));
            let new = ours.map_or_else(|| DiffFile::absent(path, algo), index_file);
            deltas.push(DiffDelta::new(DeltaStatus::Conflicted, old, new));
            continue;
        }
        match (tree_file, resolved.get(path)) {
            (Some(old), Some(entry)) => push_file_pair(old, index_file(entry), options, algo, &mut deltas),
            (Some(old), None) => deltas.push(DiffDelta::deleted(old, algo)),
            (None, Some(entry)) => deltas.push(DiffDelta::added(index_file(entry), algo)),
            (None, None) => {}
        }
    }

    if options.reverse {
        deltas = deltas.into_iter().map(DiffDelta::reversed).collect();
    }
    sort_deltas(&mut deltas);
    debug!(deltas = deltas.len(), "diffed tree to index");
    Diff::new(odb, Some(repo.filters()), None, deltas, options)
}
