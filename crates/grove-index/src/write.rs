//! Encoding to version 2, or version 3 when extended flags are needed.

use std::io::Write;
use std::path::Path;

use grove_hash::Hasher;
use grove_utils::lockfile::LockFile;
use tracing::debug;

use crate::entry::IndexEntry;
use crate::read::{
    padded_entry_len, EXT_INTENT_TO_ADD, EXT_SKIP_WORKTREE, FLAG_ASSUME_VALID, FLAG_EXTENDED, SIGNATURE,
};
use crate::{Index, IndexError};

/// Names longer than this store the cap and rely on the NUL terminator.
const NAME_LEN_MASK: usize = 0x0fff;

pub(crate) fn write_file(index: &Index, path: &Path) -> Result<(), IndexError> {
    let data = serialize(index)?;
    let mut lock = LockFile::acquire(path)?;
    lock.write_all(&data)?;
    lock.commit()?;
    debug!(path = %path.display(), entries = index.len(), bytes = data.len(), "wrote index");
    Ok(())
}

pub(crate) fn serialize(index: &Index) -> Result<Vec<u8>, IndexError> {
    let hash_len = index.algo.digest_len();
    let version: u32 = if index.entries.iter().any(|e| e.flags.has_extended()) {
        3
    } else {
        2
    };

    let mut buf = Vec::with_capacity(12 + index.entries.len() * 80);
    buf.extend_from_slice(SIGNATURE);
    buf.extend_from_slice(&version.to_be_bytes());
    buf.extend_from_slice(&(index.entries.len() as u32).to_be_bytes());

    for entry in &index.entries {
        put_entry(&mut buf, entry, hash_len);
    }
    for ext in &index.extensions {
        buf.extend_from_slice(&ext.signature);
        buf.extend_from_slice(&(ext.data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&ext.data);
    }

    let checksum = Hasher::digest(index.algo, &buf)?;
    buf.extend_from_slice(checksum.as_bytes());
    Ok(buf)
}

fn put_entry(buf: &mut Vec<u8>, entry: &IndexEntry, hash_len: usize) {
    let start = buf.len();
    let s = &entry.stat;
    for field in [
        s.ctime_secs,
        s.ctime_nsecs,
        s.mtime_secs,
        s.mtime_nsecs,
        s.dev,
        s.ino,
        entry.mode.raw(),
        s.uid,
        s.gid,
        s.size,
    ] {
        buf.extend_from_slice(&field.to_be_bytes());
    }
    buf.extend_from_slice(entry.oid.as_bytes());

    let extended = entry.flags.has_extended();
    let mut flags = entry.path.len().min(NAME_LEN_MASK) as u16;
    flags |= u16::from(entry.stage.as_u8()) << 12;
    if entry.flags.assume_valid {
        flags |= FLAG_ASSUME_VALID;
    }
    if extended {
        flags |= FLAG_EXTENDED;
    }
    buf.extend_from_slice(&flags.to_be_bytes());
    if extended {
        let mut ext = 0u16;
        if entry.flags.skip_worktree {
            ext |= EXT_SKIP_WORKTREE;
        }
        if entry.flags.intent_to_add {
            ext |= EXT_INTENT_TO_ADD;
        }
        buf.extend_from_slice(&ext.to_be_bytes());
    }

    buf.extend_from_slice(&entry.path);
    let end = start + padded_entry_len(hash_len, extended, entry.path.len());
    buf.resize(end, 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntryFlags;
    use grove_hash::{HashAlgorithm, ObjectId};
    use grove_object::FileMode;

    fn entry(path: &str) -> IndexEntry {
        IndexEntry::new(path, ObjectId::from_bytes(&[7; 20], HashAlgorithm::Sha1).unwrap(), FileMode::Regular)
    }

    #[test]
    fn entries_are_eight_byte_aligned() {
        let mut index = Index::new();
        for path in ["a", "ab", "abc", "abcdefgh", "abcdefghi"] {
            index.add(entry(path)).unwrap();
        }
        let mut one = Vec::new();
        put_entry(&mut one, &entry("abcdefgh"), 20);
        // 40 + 20 + 2 + 8 = 70, padded with at least one NUL to 72.
        assert_eq!(one.len(), 72);

        let bytes = index.to_bytes().unwrap();
        assert_eq!(&bytes[4..8], &2u32.to_be_bytes());
        let back = crate::read::parse(&bytes, HashAlgorithm::Sha1).unwrap();
        assert_eq!(back.entries(), index.entries());
    }

    #[test]
    fn extended_flags_select_version_three() {
        let mut index = Index::new();
        let mut e = entry("sparse/file");
        e.flags = EntryFlags {
            skip_worktree: true,
            intent_to_add: true,
            assume_valid: true,
        };
        index.add(e.clone()).unwrap();
        let bytes = index.to_bytes().unwrap();
        assert_eq!(&bytes[4..8], &3u32.to_be_bytes());
        let back = crate::read::parse(&bytes, HashAlgorithm::Sha1).unwrap();
        assert_eq!(back.entries()[0].flags, e.flags);
    }

    #[test]
    fn long_names_cap_the_length_field() {
        let long = "d/".repeat(2100) + "f";
        let mut index = Index::new();
        index.add(entry(&long)).unwrap();
        let bytes = index.to_bytes().unwrap();
        let flags = u16::from_be_bytes([bytes[12 + 60], bytes[12 + 61]]);
        assert_eq!(usize::from(flags) & NAME_LEN_MASK, NAME_LEN_MASK);
        let back = crate::read::parse(&bytes, HashAlgorithm::Sha1).unwrap();
        assert_eq!(back.entries()[0].path, long.as_str());
    }
}
