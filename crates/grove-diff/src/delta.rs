
use bstr::{BStr, BString, ByteSlice};
use grove_hash::{HashAlgorithm, ObjectId};
use grove_object::FileMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaStatus {
    Unmodified,
    Added,
    Deleted,
    Modified,
    Renamed,
    Copied,
    TypeChange,
    Conflicted,
    Untracked,
    Ignored,
}

impl DeltaStatus {
    /// Status letter as printed by `--name-status`.
    pub fn as_char(self) -> char {
        match self {
            Self::Unmodified => ' ',
            Self::Added => 'A',
            Self::Deleted => 'D',
            Self::Modified => 'M',
            Self::Renamed => 'R',
            Self::Copied => 'C',
            Self::TypeChange => 'T',
            Self::Conflicted => 'U',
            Self::Untracked => '?',
            Self::Ignored => '!',
        }
    }
}

impl std::fmt::Display for DeltaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

bitflags::bitflags! {
    /// Flag bits on a [`DiffFile`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct FileFlags: u8 {
        const BINARY = 1;
        const NOT_BINARY = 1 << 1;
        /// The oid is known. Unset for work tree files that were never hashed.
        const VALID_ID = 1 << 2;
    }
}

/// One side of a delta. An absent side keeps the path of the present one,
/// a null oid and no mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFile {
    pub path: BString,
    pub oid: ObjectId,
    pub mode: Option<FileMode>,
    pub size: u64,
    pub flags: FileFlags,
}

impl DiffFile {
    pub fn absent(path: impl Into<BString>, algo: HashAlgorithm) -> Self {
        Self {
            path: path.into(),
            oid: algo.null_oid(),
            mode: None,
            size: 0,
            flags: FileFlags::empty(),
        }
    }

    /// A file whose oid is known.
    pub fn known(path: impl Into<BString>, oid: ObjectId, mode: FileMode, size: u64) -> Self {
        Self {
            path: path.into(),
            oid,
            mode: Some(mode),
            size,
            flags: FileFlags::VALID_ID,
        }
    }

    pub fn exists(&self) -> bool {
        self.mode.is_some()
    }

    pub fn path(&self) -> &BStr {
        self.path.as_bstr()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffDelta {
    pub status: DeltaStatus,
    pub old_file: DiffFile,
    pub new_file: DiffFile,
    /// In `[0, 1]`; set for renames and copies.
    pub similarity: f32,
}

impl DiffDelta {
    pub fn new(status: DeltaStatus, old_file: DiffFile, new_file: DiffFile) -> Self {
        Self {
            status,
            old_file,
            new_file,
            similarity: 0.0,
        }
    }

    pub(crate) fn added(file: DiffFile, algo: HashAlgorithm) -> Self {
        let old = DiffFile::absent(file.path.clone(), algo);
        Self::new(DeltaStatus::Added, old, file)
    }

    pub(crate) fn deleted(file: DiffFile, algo: HashAlgorithm) -> Self {
        let new = DiffFile::absent(file.path.clone(), algo);
        Self::new(DeltaStatus::Deleted, file, new)
    }

    /// The new path, or the old one when the file was deleted.
    pub fn path(&self) -> &BStr {
        if self.new_file.exists() || !self.old_file.exists() {
            self.new_file.path()
        } else {
            self.old_file.path()
        }
    }

    /// The same change seen from the other side.
    pub fn reversed(self) -> Self {
        let status = match self.status {
            DeltaStatus::Added => DeltaStatus::Deleted,
            DeltaStatus::Deleted => DeltaStatus::Added,
            other => other,
        };
        Self {
            status,
            old_file: self.new_file,
            new_file: self.old_file,
            similarity: self.similarity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(byte: u8) -> ObjectId {
        ObjectId::from_bytes(&[byte; 20], HashAlgorithm::Sha1).unwrap()
    }

    #[test]
    fn reversing_swaps_sides() {
        let algo = HashAlgorithm::default();
        let added = DiffDelta::new(
            DeltaStatus::Added,
            DiffFile::absent("a.txt", algo),
            DiffFile::known("a.txt", oid(1), FileMode::Regular, 3),
        );
        let deleted = added.clone().reversed();
        assert_eq!(deleted.status, DeltaStatus::Deleted);
        assert!(deleted.old_file.exists());
        assert!(!deleted.new_file.exists());
        assert_eq!(deleted.path(), "a.txt");
        assert_eq!(deleted.reversed(), added);
    }

    #[test]
    fn flags() {
        let mut flags = FileFlags::VALID_ID | FileFlags::BINARY;
        assert!(flags.contains(FileFlags::BINARY));
        flags.remove(FileFlags::BINARY);
        assert!(!flags.contains(FileFlags::BINARY));
        assert!(flags.contains(FileFlags::VALID_ID));
    }

    #[test]
    fn status_letters() {
        assert_eq!(DeltaStatus::Renamed.as_char(), 'R');
        assert_eq!(DeltaStatus::TypeChange.to_string(), "T");
        assert_eq!(DeltaStatus::Untracked.as_char(), '?');
    }
}
