use std::cmp::Ordering;
use std::collections::BTreeMap;

use bstr::{BStr, BString, ByteSlice};
use grove_hash::{HashAlgorithm, ObjectId};

use crate::ObjectError;

/// Mode of a tree entry, which also decides what kind of object it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// 100644
    Regular,
    /// 100755
    Executable,
    /// 120000
    Symlink,
    /// 160000, a commit in another repository.
    Gitlink,
    /// 040000
    Tree,
    /// Anything else found on disk; kept so the tree re-encodes identically.
    Unknown(u32),
}

impl FileMode {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0o100644 => Self::Regular,
            0o100755 => Self::Executable,
            0o120000 => Self::Symlink,
            0o160000 => Self::Gitlink,
            0o040000 => Self::Tree,
            other => Self::Unknown(other),
        }
    }

    /// Parse the octal text used inside tree objects.
    pub fn from_octal(text: &[u8]) -> Result<Self, ObjectError> {
        let bad = || ObjectError::InvalidFileMode(String::from_utf8_lossy(text).into_owned());
        if text.is_empty() {
            return Err(bad());
        }
        let mut raw: u32 = 0;
        for &c in text {
            if !(b'0'..=b'7').contains(&c) {
                return Err(bad());
            }
            raw = raw
                .checked_mul(8)
                .and_then(|v| v.checked_add(u32::from(c - b'0')))
                .ok_or_else(bad)?;
        }
        Ok(Self::from_raw(raw))
    }

    pub fn raw(self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Gitlink => 0o160000,
            Self::Tree => 0o040000,
            Self::Unknown(v) => v,
        }
    }

    /// Octal text without leading zeros, as written into trees (`40000`).
    pub fn to_octal(self) -> String {
        format!("{:o}", self.raw())
    }

    pub fn is_tree(self) -> bool {
        matches!(self, Self::Tree)
    }

    /// Regular or executable file.
    pub fn is_blob(self) -> bool {
        matches!(self, Self::Regular | Self::Executable)
    }

    pub fn is_symlink(self) -> bool {
        matches!(self, Self::Symlink)
    }

    pub fn is_gitlink(self) -> bool {
        matches!(self, Self::Gitlink)
    }

    /// Coarse class used to detect type changes: files (any executable bit),
    /// symlinks, submodules and trees are mutually distinct.
    pub fn kind_class(self) -> u8 {
        match self {
            Self::Regular | Self::Executable | Self::Unknown(_) => 0,
            Self::Symlink => 1,
            Self::Gitlink => 2,
            Self::Tree => 3,
        }
    }
}

impl std::fmt::Display for FileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06o}", self.raw())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: BString,
    pub oid: ObjectId,
}

impl TreeEntry {
    pub fn new(name: impl Into<BString>, mode: FileMode, oid: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            oid,
        }
    }

    /// Canonical tree order: bytewise on names, with a subtree compared as if
    /// its name ended in `/`.
    pub fn cmp_entries(a: &TreeEntry, b: &TreeEntry) -> Ordering {
        compare_names(&a.name, a.mode.is_tree(), &b.name, b.mode.is_tree())
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::cmp_entries(self, other)
    }
}

/// Compare two entry names under the tree ordering rule.
pub fn compare_names(a: &[u8], a_is_tree: bool, b: &[u8], b_is_tree: bool) -> Ordering {
    let common = a.len().min(b.len());
    match a[..common].cmp(&b[..common]) {
        Ordering::Equal => {}
        other => return other,
    }
    let terminator = |name: &[u8], is_tree: bool| match name.get(common) {
        Some(&c) => c,
        None if is_tree => b'/',
        None => 0,
    };
    terminator(a, a_is_tree).cmp(&terminator(b, b_is_tree))
}

/// A directory listing, kept in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `<octal mode> <name>\0<raw oid>` records. `algo` fixes the
    /// width of the raw ids.
    pub fn parse(content: &[u8], algo: HashAlgorithm) -> Result<Self, ObjectError> {
        let width = algo.digest_len();
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < content.len() {
            let rest = &content[pos..];
            let space = rest.find_byte(b' ').ok_or(ObjectError::InvalidTreeEntry {
                offset: pos,
                reason: "mode not terminated by a space",
            })?;
            let mode = FileMode::from_octal(&rest[..space]).map_err(|_| {
                ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "mode is not octal",
                }
            })?;
            let after_mode = &rest[space + 1..];
            let nul = after_mode.find_byte(0).ok_or(ObjectError::InvalidTreeEntry {
                offset: pos + space + 1,
                reason: "name not terminated by NUL",
            })?;
            let name = &after_mode[..nul];
            if name.is_empty() {
                return Err(ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "empty name",
                });
            }
            let raw = after_mode
                .get(nul + 1..nul + 1 + width)
                .ok_or(ObjectError::InvalidTreeEntry {
                    offset: pos + space + 2 + nul,
                    reason: "object id truncated",
                })?;
            entries.push(TreeEntry {
                mode,
                name: BString::from(name),
                oid: ObjectId::from_bytes(raw, algo)?,
            });
            pos += space + 1 + nul + 1 + width;
        }
        Ok(Self { entries })
    }

    /// Encode in canonical order regardless of the order of `entries`.
    pub fn encode(&self) -> Vec<u8> {
        let mut refs: Vec<&TreeEntry> = self.entries.iter().collect();
        refs.sort();
        let mut out = Vec::with_capacity(self.entries.len() * 48);
        for e in refs {
            out.extend_from_slice(e.mode.to_octal().as_bytes());
            out.push(b' ');
            out.extend_from_slice(&e.name);
            out.push(0);
            out.extend_from_slice(e.oid.as_bytes());
        }
        out
    }

    pub fn sort(&mut self) {
        self.entries.sort();
    }

    pub fn find(&self, name: &BStr) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_bstr() == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TreeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a Tree {
    type Item = &'a TreeEntry;
    type IntoIter = std::slice::Iter<'a, TreeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Assembles a single tree level, rejecting names git would refuse to
/// check out and keeping at most one entry per name.
#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    entries: BTreeMap<BString, (FileMode, ObjectId)>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing tree's entries.
    pub fn from_tree(tree: &Tree) -> Self {
        let entries = tree
            .entries
            .iter()
            .map(|e| (e.name.clone(), (e.mode, e.oid)))
            .collect();
        Self { entries }
    }

    fn check_name(name: &[u8]) -> Result<(), ObjectError> {
        let bad = name.is_empty()
            || name == b"."
            || name == b".."
            || name.eq_ignore_ascii_case(b".git")
            || name.iter().any(|&b| b == b'/' || b == 0);
        if bad {
            return Err(ObjectError::InvalidEntryName(BString::from(name)));
        }
        Ok(())
    }

    /// Add a new entry. A name already present is an error.
    pub fn insert(
        &mut self,
        name: impl Into<BString>,
        mode: FileMode,
        oid: ObjectId,
    ) -> Result<(), ObjectError> {
        let name = name.into();
        Self::check_name(&name)?;
        if self.entries.contains_key(&name) {
            return Err(ObjectError::DuplicateEntry(name));
        }
        self.entries.insert(name, (mode, oid));
        Ok(())
    }

    /// Add or overwrite an entry.
    pub fn upsert(
        &mut self,
        name: impl Into<BString>,
        mode: FileMode,
        oid: ObjectId,
    ) -> Result<(), ObjectError> {
        let name = name.into();
        Self::check_name(&name)?;
        self.entries.insert(name, (mode, oid));
        Ok(())
    }

    pub fn remove(&mut self, name: &BStr) -> Option<TreeEntry> {
        self.entries
            .remove_entry(name)
            .map(|(name, (mode, oid))| TreeEntry { mode, name, oid })
    }

    pub fn get(&self, name: &BStr) -> Option<(FileMode, ObjectId)> {
        self.entries.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(&self) -> Tree {
        let mut tree = Tree {
            entries: self
                .entries
                .iter()
                .map(|(name, &(mode, oid))| TreeEntry {
                    mode,
                    name: name.clone(),
                    oid,
                })
                .collect(),
        };
        tree.sort();
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> ObjectId {
        let mut raw = [0u8; 20];
        raw[19] = n;
        ObjectId::Sha1(raw)
    }

    fn file(name: &str) -> TreeEntry {
        TreeEntry::new(name, FileMode::Regular, oid(1))
    }

    fn dir(name: &str) -> TreeEntry {
        TreeEntry::new(name, FileMode::Tree, oid(2))
    }

    #[test]
    fn subtree_sorts_with_implicit_slash() {
        assert_eq!(file("foo.c").cmp(&dir("foo")), Ordering::Less);
        assert_eq!(file("foo-bar").cmp(&dir("foo")), Ordering::Less);
        assert_eq!(dir("foo").cmp(&file("foo0")), Ordering::Less);
        assert_eq!(file("foo").cmp(&file("foo.c")), Ordering::Less);
    }

    #[test]
    fn encode_sorts_entries() {
        let tree = Tree {
            entries: vec![file("foo0"), dir("foo"), file("foo.c"), file("foo-bar")],
        };
        let parsed = Tree::parse(&tree.encode(), HashAlgorithm::Sha1).unwrap();
        let names: Vec<_> = parsed.iter().map(|e| e.name.to_string()).collect();
        assert_eq!(names, ["foo-bar", "foo.c", "foo", "foo0"]);
    }

    #[test]
    fn mode_text() {
        assert_eq!(FileMode::Tree.to_octal(), "40000");
        assert_eq!(FileMode::Tree.to_string(), "040000");
        assert_eq!(FileMode::from_octal(b"040000").unwrap(), FileMode::Tree);
        assert_eq!(FileMode::from_octal(b"100755").unwrap(), FileMode::Executable);
        assert_eq!(FileMode::from_octal(b"100664").unwrap(), FileMode::Unknown(0o100664));
        assert!(FileMode::from_octal(b"10064x").is_err());
        assert!(FileMode::from_octal(b"").is_err());
    }

    #[test]
    fn kind_class_separates_types() {
        assert_eq!(FileMode::Regular.kind_class(), FileMode::Executable.kind_class());
        assert_ne!(FileMode::Regular.kind_class(), FileMode::Symlink.kind_class());
        assert_ne!(FileMode::Regular.kind_class(), FileMode::Gitlink.kind_class());
    }

    #[test]
    fn parse_rejects_truncation() {
        let mut data = b"100644 a.txt\0".to_vec();
        data.extend_from_slice(&[0u8; 10]);
        assert!(Tree::parse(&data, HashAlgorithm::Sha1).is_err());
        assert!(Tree::parse(b"100644 a.txt", HashAlgorithm::Sha1).is_err());
        assert!(Tree::parse(b"100644a.txt\0", HashAlgorithm::Sha1).is_err());
    }

    #[test]
    fn unknown_mode_round_trips() {
        let tree = Tree {
            entries: vec![TreeEntry::new("odd", FileMode::Unknown(0o100664), oid(3))],
        };
        let bytes = tree.encode();
        assert!(bytes.starts_with(b"100664 odd\0"));
        assert_eq!(Tree::parse(&bytes, HashAlgorithm::Sha1).unwrap(), tree);
    }

    #[test]
    fn builder_rejects_duplicates_and_bad_names() {
        let mut b = TreeBuilder::new();
        b.insert("foo", FileMode::Regular, oid(1)).unwrap();
        let err = b.insert("foo", FileMode::Tree, oid(2)).unwrap_err();
        assert!(matches!(err, ObjectError::DuplicateEntry(_)));
        for bad in ["", ".", "..", ".git", "a/b", "nul\0"] {
            assert!(b.insert(bad, FileMode::Regular, oid(1)).is_err(), "{bad:?}");
        }
        b.upsert("foo", FileMode::Executable, oid(4)).unwrap();
        assert_eq!(b.get(BStr::new("foo")), Some((FileMode::Executable, oid(4))));
    }

    #[test]
    fn builder_output_is_canonical() {
        let mut b = TreeBuilder::new();
        b.insert("foo0", FileMode::Regular, oid(1)).unwrap();
        b.insert("foo", FileMode::Tree, oid(2)).unwrap();
        b.insert("foo.c", FileMode::Regular, oid(3)).unwrap();
        let tree = b.build();
        let names: Vec<_> = tree.iter().map(|e| e.name.to_string()).collect();
        assert_eq!(names, ["foo.c", "foo", "foo0"]);

        let mut again = TreeBuilder::from_tree(&tree);
        assert!(again.remove(BStr::new("foo")).is_some());
        assert_eq!(again.len(), 2);
    }
}
