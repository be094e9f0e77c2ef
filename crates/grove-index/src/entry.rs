use bstr::BString;
use grove_hash::ObjectId;
use grove_object::FileMode;

use crate::Stage;

/// One staged path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Slash-separated, relative to the work tree root.
    pub path: BString,
    pub oid: ObjectId,
    pub mode: FileMode,
    pub stage: Stage,
    pub stat: StatData,
    pub flags: EntryFlags,
}

impl IndexEntry {
    /// A stage-0 entry with zeroed stat data.
    pub fn new(path: impl Into<BString>, oid: ObjectId, mode: FileMode) -> Self {
        Self {
            path: path.into(),
            oid,
            mode,
            stage: Stage::Normal,
            stat: StatData::default(),
            flags: EntryFlags::default(),
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }
}

/// Cached `stat(2)` fields, truncated to 32 bits as on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatData {
    pub ctime_secs: u32,
    pub ctime_nsecs: u32,
    pub mtime_secs: u32,
    pub mtime_nsecs: u32,
    pub dev: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
}

impl StatData {
    #[cfg(unix)]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            ctime_secs: meta.ctime() as u32,
            ctime_nsecs: meta.ctime_nsec() as u32,
            mtime_secs: meta.mtime() as u32,
            mtime_nsecs: meta.mtime_nsec() as u32,
            dev: meta.dev() as u32,
            ino: meta.ino() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len() as u32,
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .unwrap_or_default();
        Self {
            ctime_secs: mtime.as_secs() as u32,
            ctime_nsecs: mtime.subsec_nanos(),
            mtime_secs: mtime.as_secs() as u32,
            mtime_nsecs: mtime.subsec_nanos(),
            size: meta.len() as u32,
            ..Self::default()
        }
    }

    /// Size and mtime agree. A zero field (never recorded) never matches.
    pub fn is_fresh(&self, other: &StatData) -> bool {
        self.mtime_secs != 0
            && self.size == other.size
            && self.mtime_secs == other.mtime_secs
            && self.mtime_nsecs == other.mtime_nsecs
    }
}

/// Per-entry flag bits. `intent_to_add` and `skip_worktree` live in the
/// extended flag word and force a version 3 file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFlags {
    pub assume_valid: bool,
    pub intent_to_add: bool,
    pub skip_worktree: bool,
}

impl EntryFlags {
    pub fn has_extended(&self) -> bool {
        self.intent_to_add || self.skip_worktree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_bits() {
        assert!(!EntryFlags::default().has_extended());
        let flags = EntryFlags {
            skip_worktree: true,
            ..Default::default()
        };
        assert!(flags.has_extended());
        let flags = EntryFlags {
            assume_valid: true,
            ..Default::default()
        };
        assert!(!flags.has_extended());
    }

    #[test]
    fn freshness_needs_recorded_stat() {
        let zero = StatData::default();
        assert!(!zero.is_fresh(&zero));
        let a = StatData {
            mtime_secs: 10,
            size: 3,
            ..Default::default()
        };
        assert!(a.is_fresh(&a));
        assert!(!a.is_fresh(&StatData { size: 4, ..a }));
    }

    #[test]
    fn stat_from_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"abc").unwrap();
        let stat = StatData::from_metadata(&std::fs::metadata(&path).unwrap());
        assert_eq!(stat.size, 3);
        assert!(stat.mtime_secs > 0);
    }
}
