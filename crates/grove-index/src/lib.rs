//! The index: the staged snapshot between the object database and the work
//! tree, stored in `.git/index`.
//!
//! Entries are unique per `(path, stage)` and kept sorted by path, then
//! stage. Stage 0 is a resolved path; stages 1, 2 and 3 hold the ancestor,
//! ours and theirs sides of a conflict.

mod entry;
mod error;
mod read;
mod tree;
mod write;

use std::path::Path;

use bstr::{BStr, ByteSlice};
use grove_hash::HashAlgorithm;
use tracing::debug;

pub use entry::{EntryFlags, IndexEntry, StatData};
pub use error::IndexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Normal,
    Ancestor,
    Ours,
    Theirs,
}

impl Stage {
    pub fn as_u8(self) -> u8 {
        match self {
            Stage::Normal => 0,
            Stage::Ancestor => 1,
            Stage::Ours => 2,
            Stage::Theirs => 3,
        }
    }

    pub fn from_u8(n: u8) -> Option<Self> {
        match n {
            0 => Some(Stage::Normal),
            1 => Some(Stage::Ancestor),
            2 => Some(Stage::Ours),
            3 => Some(Stage::Theirs),
            _ => None,
        }
    }
}

/// An extension block kept byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExtension {
    pub signature: [u8; 4],
    pub data: Vec<u8>,
}

impl RawExtension {
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.signature).into_owned()
    }
}

/// The three sides of one conflicted path. A missing side was absent
/// there (e.g. added on one side only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConflict {
    pub ancestor: Option<IndexEntry>,
    pub ours: Option<IndexEntry>,
    pub theirs: Option<IndexEntry>,
}

impl IndexConflict {
    pub fn path(&self) -> Option<&BStr> {
        self.ours
            .as_ref()
            .or(self.theirs.as_ref())
            .or(self.ancestor.as_ref())
            .map(|e| e.path.as_bstr())
    }
}

#[derive(Debug, Clone)]
pub struct Index {
    version: u32,
    algo: HashAlgorithm,
    entries: Vec<IndexEntry>,
    /// Extensions in file order, minus those invalidated by edits.
    extensions: Vec<RawExtension>,
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

/// Rejects paths git would refuse to track.
fn check_path(path: &[u8]) -> Result<(), IndexError> {
    let bad = path.is_empty()
        || path.contains(&0)
        || path.split(|&b| b == b'/').any(|c| {
            c.is_empty() || c == b"." || c == b".." || c.eq_ignore_ascii_case(b".git")
        });
    if bad {
        return Err(IndexError::InvalidPath(path.into()));
    }
    Ok(())
}

impl Index {
    pub fn new() -> Self {
        Self::with_algorithm(HashAlgorithm::Sha1)
    }

    pub fn with_algorithm(algo: HashAlgorithm) -> Self {
        Self {
            version: 2,
            algo,
            entries: Vec::new(),
            extensions: Vec::new(),
        }
    }

    /// Read a SHA-1 index file.
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        Self::read_with(path, HashAlgorithm::Sha1)
    }

    pub fn read_with(path: impl AsRef<Path>, algo: HashAlgorithm) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(IndexError::InvalidHeader("empty file".into()));
        }
        // SAFETY: the index is replaced by rename, never rewritten in place,
        // so the mapped bytes do not change under us.
        let data = unsafe { memmap2::Mmap::map(&file) }?;
        let index = read::parse(&data, algo)?;
        debug!(path = %path.display(), entries = index.len(), version = index.version, "read index");
        Ok(index)
    }

    /// Like [`read_with`](Self::read_with), but a missing file is an empty
    /// index.
    pub fn read_or_default(path: impl AsRef<Path>, algo: HashAlgorithm) -> Result<Self, IndexError> {
        match Self::read_with(path, algo) {
            Err(IndexError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::with_algorithm(algo))
            }
            other => other,
        }
    }

    /// Write as version 2, or 3 when an entry needs extended flags, through
    /// `<path>.lock`.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        write::write_file(self, path.as_ref())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        write::serialize(self)
    }

    /// Version of the file this was read from (2 for a fresh index).
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.algo
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IndexEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn extensions(&self) -> &[RawExtension] {
        &self.extensions
    }

    fn position(&self, path: &[u8], stage: Stage) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|e| e.path.as_slice().cmp(path).then(e.stage.cmp(&stage)))
    }

    /// Index range holding every stage of `path`.
    fn path_range(&self, path: &[u8]) -> std::ops::Range<usize> {
        let start = self.entries.partition_point(|e| e.path.as_slice() < path);
        let end = start + self.entries[start..].iter().take_while(|e| e.path.as_slice() == path).count();
        start..end
    }

    pub fn get(&self, path: &BStr, stage: Stage) -> Option<&IndexEntry> {
        self.position(path, stage).ok().map(|i| &self.entries[i])
    }

    pub fn get_all(&self, path: &BStr) -> &[IndexEntry] {
        &self.entries[self.path_range(path)]
    }

    /// The cached tree no longer matches once entries change.
    fn touched(&mut self) {
        self.extensions.retain(|ext| &ext.signature != b"TREE");
    }

    /// Insert or replace the entry for `(path, stage)`.
    ///
    /// A stage-0 entry resolves the path, dropping its conflict stages, and
    /// the reverse. A file replaces a directory of the same name and the
    /// other way round.
    pub fn add(&mut self, entry: IndexEntry) -> Result<(), IndexError> {
        check_path(&entry.path)?;
        self.touched();

        let path = entry.path.clone();
        if entry.stage == Stage::Normal {
            let range = self.path_range(&path);
            self.entries.drain(range);
        } else if let Ok(i) = self.position(&path, Stage::Normal) {
            self.entries.remove(i);
        }

        let mut dir = path.to_vec();
        dir.push(b'/');
        let start = self.entries.partition_point(|e| e.path.as_slice() < dir.as_slice());
        let end = start + self.entries[start..].iter().take_while(|e| e.path.starts_with(&dir)).count();
        self.entries.drain(start..end);
        for (i, _) in path.iter().enumerate().filter(|(_, &b)| b == b'/') {
            let range = self.path_range(&path[..i]);
            self.entries.drain(range);
        }

        match self.position(&path, entry.stage) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
        Ok(())
    }

    /// Remove the entry at `(path, stage)`.
    pub fn remove(&mut self, path: &BStr, stage: Stage) -> bool {
        match self.position(path, stage) {
            Ok(i) => {
                self.entries.remove(i);
                self.touched();
                true
            }
            Err(_) => false,
        }
    }

    /// Remove every stage of `path`. Returns how many entries went.
    pub fn remove_all(&mut self, path: &BStr) -> usize {
        let range = self.path_range(path);
        let n = range.len();
        if n > 0 {
            self.entries.drain(range);
            self.touched();
        }
        n
    }

    /// Replace every entry at once. A later duplicate of the same
    /// `(path, stage)` wins; a path that is also a directory is refused.
    pub fn set_entries(&mut self, mut entries: Vec<IndexEntry>) -> Result<(), IndexError> {
        for entry in &entries {
            check_path(&entry.path)?;
        }
        entries.sort_by(|a, b| (&a.path, a.stage).cmp(&(&b.path, b.stage)));
        entries.reverse();
        entries.dedup_by(|a, b| a.path == b.path && a.stage == b.stage);
        entries.reverse();

        for entry in &entries {
            let mut dir = entry.path.to_vec();
            dir.push(b'/');
            let next = entries.partition_point(|e| e.path.as_slice() < dir.as_slice());
            if entries.get(next).is_some_and(|e| e.path.starts_with(&dir)) {
                return Err(IndexError::PathCollision(entry.path.clone()));
            }
        }
        self.touched();
        self.entries = entries;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.touched();
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.iter().any(|e| e.stage != Stage::Normal)
    }

    /// The conflict recorded for `path`, if any.
    pub fn conflict(&self, path: &BStr) -> Option<IndexConflict> {
        let mut conflict = IndexConflict {
            ancestor: None,
            ours: None,
            theirs: None,
        };
        for e in self.get_all(path) {
            match e.stage {
                Stage::Normal => return None,
                Stage::Ancestor => conflict.ancestor = Some(e.clone()),
                Stage::Ours => conflict.ours = Some(e.clone()),
                Stage::Theirs => conflict.theirs = Some(e.clone()),
            }
        }
        conflict.path().is_some().then_some(conflict)
    }

    /// Every conflict, in path order.
    pub fn conflicts(&self) -> Vec<IndexConflict> {
        let mut paths: Vec<&BStr> = self
            .entries
            .iter()
            .filter(|e| e.stage != Stage::Normal)
            .map(|e| e.path.as_bstr())
            .collect();
        paths.dedup();
        paths.into_iter().filter_map(|p| self.conflict(p)).collect()
    }

    /// Record a conflict as stages 1 to 3, replacing whatever the path held.
    pub fn add_conflict(&mut self, conflict: IndexConflict) -> Result<(), IndexError> {
        let Some(path) = conflict.path().map(ToOwned::to_owned) else {
            return Ok(());
        };
        self.remove_all(path.as_bstr());
        let sides = [
            (conflict.ancestor, Stage::Ancestor),
            (conflict.ours, Stage::Ours),
            (conflict.theirs, Stage::Theirs),
        ];
        for (side, stage) in sides {
            if let Some(mut entry) = side {
                entry.path = path.clone();
                entry.stage = stage;
                self.add(entry)?;
            }
        }
        Ok(())
    }

    /// Replace the conflict stages of `path` with `resolution`, or with
    /// nothing (the path is deleted) when `None`.
    pub fn resolve_conflict(&mut self, path: &BStr, resolution: Option<IndexEntry>) -> Result<(), IndexError> {
        if self.conflict(path).is_none() {
            return Err(IndexError::NoConflict(path.to_owned()));
        }
        self.remove_all(path);
        if let Some(mut entry) = resolution {
            entry.path = path.to_owned();
            entry.stage = Stage::Normal;
            self.add(entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_hash::ObjectId;
    use grove_object::FileMode;

    fn oid(n: u8) -> ObjectId {
        ObjectId::from_bytes(&[n; 20], HashAlgorithm::Sha1).unwrap()
    }

    fn entry(path: &str, n: u8) -> IndexEntry {
        IndexEntry::new(path, oid(n), FileMode::Regular)
    }

    #[test]
    fn sorted_by_path_then_stage() {
        let mut index = Index::new();
        index.add(entry("b", 1)).unwrap();
        index.add(entry("a", 2).with_stage(Stage::Theirs)).unwrap();
        index.add(entry("a", 3).with_stage(Stage::Ours)).unwrap();
        let order: Vec<(String, u8)> = index
            .iter()
            .map(|e| (e.path.to_string(), e.stage.as_u8()))
            .collect();
        assert_eq!(order, [("a".into(), 2), ("a".into(), 3), ("b".into(), 0)]);
    }

    #[test]
    fn bad_paths() {
        let mut index = Index::new();
        for bad in ["", "/abs", "a//b", "a/./b", "../x", ".git/config", "dir/"] {
            let err = index.add(entry(bad, 1)).unwrap_err();
            assert_eq!(err.kind(), grove_utils::ErrorKind::InvalidArgument, "{bad}");
        }
    }

    #[test]
    fn file_and_directory_replace_each_other() {
        let mut index = Index::new();
        index.add(entry("d/x", 1)).unwrap();
        index.add(entry("d/y", 1)).unwrap();
        index.add(entry("d", 2)).unwrap();
        assert_eq!(index.len(), 1);
        index.add(entry("d/z", 3)).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.get(BStr::new("d/z"), Stage::Normal).is_some());
    }

    #[test]
    fn conflicts_and_resolution() {
        let mut index = Index::new();
        index.add(entry("clean", 1)).unwrap();
        index
            .add_conflict(IndexConflict {
                ancestor: Some(entry("f", 1)),
                ours: Some(entry("f", 2)),
                theirs: None,
            })
            .unwrap();
        assert!(index.has_conflicts());
        let all = index.conflicts();
        assert_eq!(all.len(), 1);
        assert!(all[0].theirs.is_none());
        assert_eq!(all[0].ours.as_ref().unwrap().stage, Stage::Ours);
        assert!(index.conflict(BStr::new("clean")).is_none());

        let err = index.resolve_conflict(BStr::new("clean"), None).unwrap_err();
        assert_eq!(err.kind(), grove_utils::ErrorKind::NotFound);

        index.resolve_conflict(BStr::new("f"), Some(entry("ignored", 9))).unwrap();
        assert!(!index.has_conflicts());
        assert_eq!(index.get(BStr::new("f"), Stage::Normal).unwrap().oid, oid(9));
    }

    #[test]
    fn stage_zero_resolves() {
        let mut index = Index::new();
        index.add(entry("f", 1).with_stage(Stage::Ancestor)).unwrap();
        index.add(entry("f", 2).with_stage(Stage::Ours)).unwrap();
        index.add(entry("f", 3)).unwrap();
        assert_eq!(index.get_all(BStr::new("f")).len(), 1);
        assert_eq!(index.remove_all(BStr::new("f")), 1);
        assert!(index.is_empty());
    }

    #[test]
    fn edits_drop_cached_tree() {
        let mut index = Index::new();
        index.extensions.push(RawExtension {
            signature: *b"TREE",
            data: vec![],
        });
        index.extensions.push(RawExtension {
            signature: *b"ZZZZ",
            data: vec![1],
        });
        index.add(entry("a", 1)).unwrap();
        let names: Vec<String> = index.extensions().iter().map(RawExtension::name).collect();
        assert_eq!(names, ["ZZZZ"]);
    }
}
