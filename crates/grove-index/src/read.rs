//! Decoding `DIRC` files, versions 2 to 4.

use bstr::BString;
use grove_hash::{HashAlgorithm, Hasher, ObjectId};
use grove_object::FileMode;

use crate::entry::{EntryFlags, IndexEntry, StatData};
use crate::{Index, IndexError, RawExtension, Stage};

pub(crate) const SIGNATURE: &[u8; 4] = b"DIRC";
/// ctime, mtime, dev, ino, mode, uid, gid, size.
pub(crate) const STAT_LEN: usize = 40;

pub(crate) const FLAG_ASSUME_VALID: u16 = 0x8000;
pub(crate) const FLAG_EXTENDED: u16 = 0x4000;
pub(crate) const EXT_SKIP_WORKTREE: u16 = 0x4000;
pub(crate) const EXT_INTENT_TO_ADD: u16 = 0x2000;

/// Extensions that describe byte offsets of this exact file and go stale on
/// rewrite.
const OFFSET_EXTENSIONS: [&[u8; 4]; 2] = [b"EOIE", b"IEOT"];

/// Padded on-disk size of a v2/v3 entry.
pub(crate) fn padded_entry_len(hash_len: usize, extended: bool, name_len: usize) -> usize {
    let flags = if extended { 4 } else { 2 };
    (STAT_LEN + hash_len + flags + name_len + 8) & !7
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], IndexError> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.data.len());
        let Some(end) = end else {
            return Err(IndexError::InvalidEntry {
                offset: self.pos,
                reason: format!("truncated {what}"),
            });
        };
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u32(&mut self, what: &str) -> Result<u32, IndexError> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u16(&mut self, what: &str) -> Result<u16, IndexError> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn until_nul(&mut self, what: &str) -> Result<&'a [u8], IndexError> {
        let rest = &self.data[self.pos..];
        let nul = rest.iter().position(|&b| b == 0).ok_or_else(|| IndexError::InvalidEntry {
            offset: self.pos,
            reason: format!("{what} is not NUL-terminated"),
        })?;
        self.pos += nul + 1;
        Ok(&rest[..nul])
    }

    /// The offset-encoded integer used for v4 path prefixes.
    fn varint(&mut self) -> Result<usize, IndexError> {
        let mut byte = self.take(1, "path prefix length")?[0];
        let mut value = usize::from(byte & 0x7f);
        while byte & 0x80 != 0 {
            byte = self.take(1, "path prefix length")?[0];
            value = value
                .checked_add(1)
                .and_then(|v| v.checked_mul(128))
                .map(|v| v + usize::from(byte & 0x7f))
                .ok_or_else(|| IndexError::InvalidEntry {
                    offset: self.pos,
                    reason: "path prefix length overflows".into(),
                })?;
        }
        Ok(value)
    }
}

fn verify_checksum(data: &[u8], algo: HashAlgorithm) -> Result<(), IndexError> {
    let split = data.len() - algo.digest_len();
    let (body, stored) = data.split_at(split);
    // `index.skipHash` writes zeros instead of a digest.
    if stored.iter().all(|&b| b == 0) {
        return Ok(());
    }
    if Hasher::digest(algo, body)?.as_bytes() != stored {
        return Err(IndexError::ChecksumMismatch);
    }
    Ok(())
}

pub(crate) fn parse(data: &[u8], algo: HashAlgorithm) -> Result<Index, IndexError> {
    let hash_len = algo.digest_len();
    if data.len() < 12 + hash_len {
        return Err(IndexError::InvalidHeader("file too short".into()));
    }
    if &data[..4] != SIGNATURE {
        return Err(IndexError::InvalidHeader("missing DIRC signature".into()));
    }
    verify_checksum(data, algo)?;

    let body = &data[..data.len() - hash_len];
    let mut r = Reader { data: body, pos: 4 };
    let version = r.u32("version")?;
    if !(2..=4).contains(&version) {
        return Err(IndexError::UnsupportedVersion(version));
    }
    let count = r.u32("entry count")? as usize;

    let mut entries: Vec<IndexEntry> = Vec::with_capacity(count.min(body.len() / 62));
    let mut previous = BString::default();
    for _ in 0..count {
        let entry = read_entry(&mut r, version, algo, &previous)?;
        previous = entry.path.clone();
        entries.push(entry);
    }

    let mut extensions = Vec::new();
    while r.pos < body.len() {
        let start = r.pos;
        let sig = r.take(4, "extension signature")?;
        let signature = [sig[0], sig[1], sig[2], sig[3]];
        let name = String::from_utf8_lossy(sig).into_owned();
        let len = r.u32("extension size")? as usize;
        let ext = r.take(len, "extension body").map_err(|_| IndexError::InvalidExtension {
            sig: name.clone(),
            reason: format!("{len} bytes at offset {start} run past the end"),
        })?;
        // Lower-case signatures are mandatory for correctness. `sdir` only
        // marks sparse directory entries, which are kept as they are.
        if !signature[0].is_ascii_uppercase() && &signature != b"sdir" {
            return Err(IndexError::UnsupportedExtension(name));
        }
        if OFFSET_EXTENSIONS.contains(&&signature) {
            continue;
        }
        extensions.push(RawExtension {
            signature,
            data: ext.to_vec(),
        });
    }

    // Readers elsewhere binary-search; a foreign writer may not have sorted.
    let sorted = entries
        .windows(2)
        .all(|w| (&w[0].path, w[0].stage) < (&w[1].path, w[1].stage));
    if !sorted {
        return Err(IndexError::InvalidEntry {
            offset: 12,
            reason: "entries are not sorted or contain duplicates".into(),
        });
    }

    Ok(Index {
        version,
        algo,
        entries,
        extensions,
    })
}

fn read_entry(r: &mut Reader<'_>, version: u32, algo: HashAlgorithm, previous: &BString) -> Result<IndexEntry, IndexError> {
    let start = r.pos;
    let ctime_secs = r.u32("ctime")?;
    let ctime_nsecs = r.u32("ctime")?;
    let mtime_secs = r.u32("mtime")?;
    let mtime_nsecs = r.u32("mtime")?;
    let dev = r.u32("dev")?;
    let ino = r.u32("ino")?;
    let mode = r.u32("mode")?;
    let uid = r.u32("uid")?;
    let gid = r.u32("gid")?;
    let size = r.u32("size")?;
    let stat = StatData {
        ctime_secs,
        ctime_nsecs,
        mtime_secs,
        mtime_nsecs,
        dev,
        ino,
        uid,
        gid,
        size,
    };
    let oid = ObjectId::from_bytes(r.take(algo.digest_len(), "object id")?, algo)?;

    let flags = r.u16("flags")?;
    let extended = flags & FLAG_EXTENDED != 0;
    let stage = Stage::from_u8(((flags >> 12) & 0x3) as u8).unwrap_or(Stage::Normal);
    let mut entry_flags = EntryFlags {
        assume_valid: flags & FLAG_ASSUME_VALID != 0,
        ..EntryFlags::default()
    };
    if extended {
        if version < 3 {
            return Err(IndexError::InvalidEntry {
                offset: start,
                reason: "extended flags in a version 2 index".into(),
            });
        }
        let ext = r.u16("extended flags")?;
        entry_flags.skip_worktree = ext & EXT_SKIP_WORKTREE != 0;
        entry_flags.intent_to_add = ext & EXT_INTENT_TO_ADD != 0;
    }

    let path = if version == 4 {
        let strip = r.varint()?;
        let keep = previous.len().checked_sub(strip).ok_or_else(|| IndexError::InvalidEntry {
            offset: start,
            reason: format!("strips {strip} bytes from a {}-byte path", previous.len()),
        })?;
        let suffix = r.until_nul("path")?;
        let mut path = BString::from(&previous[..keep]);
        path.extend_from_slice(suffix);
        path
    } else {
        let path = BString::from(r.until_nul("path")?);
        let end = start + padded_entry_len(algo.digest_len(), extended, path.len());
        if end > r.data.len() || r.data[r.pos..end].iter().any(|&b| b != 0) {
            return Err(IndexError::InvalidEntry {
                offset: start,
                reason: "bad padding after path".into(),
            });
        }
        r.pos = end;
        path
    };

    Ok(IndexEntry {
        path,
        oid,
        mode: FileMode::from_raw(mode),
        stage,
        stat,
        flags: entry_flags,
    })
}
