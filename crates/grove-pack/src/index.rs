//! `.idx` version 2: a 256-entry fan-out table, the sorted ids, their CRC32s,
//! 31-bit offsets (high bit set means "see the 64-bit table"), the 64-bit
//! offsets, then the pack checksum and the index checksum.

use std::cmp::Ordering;
use std::fs::File;
use std::path::{Path, PathBuf};

use grove_hash::{HashAlgorithm, Hasher, ObjectId, OidPrefix};
use memmap2::Mmap;

use crate::{be_u32, be_u64, PackError, IDX_SIGNATURE, IDX_VERSION};

const FANOUT_START: usize = 8;
const FANOUT_LEN: usize = 256 * 4;

pub struct PackIndex {
    map: Mmap,
    path: PathBuf,
    algo: HashAlgorithm,
    count: usize,
    ids_at: usize,
    crcs_at: usize,
    offsets_at: usize,
    large_offsets_at: usize,
}

fn invalid(msg: impl Into<String>) -> PackError {
    PackError::InvalidIndex(msg.into())
}

impl PackIndex {
    pub fn open(path: impl AsRef<Path>, algo: HashAlgorithm) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // SAFETY: pack indexes are immutable once written; they are replaced,
        // never rewritten in place.
        let map = unsafe { Mmap::map(&file)? };

        let width = algo.digest_len();
        if map.len() < FANOUT_START + FANOUT_LEN + 2 * width {
            return Err(invalid("file too short"));
        }
        if map[..4] != IDX_SIGNATURE {
            return Err(invalid("missing \\377tOc signature (version 1 indexes are not supported)"));
        }
        let version = be_u32(&map, 4);
        if version != IDX_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }

        let mut prev = 0;
        for i in 0..256 {
            let v = be_u32(&map, FANOUT_START + i * 4);
            if v < prev {
                return Err(invalid("fan-out table is not monotonic"));
            }
            prev = v;
        }
        let count = prev as usize;
        let ids_at = FANOUT_START + FANOUT_LEN;
        let crcs_at = ids_at + count * width;
        let offsets_at = crcs_at + count * 4;
        let large_offsets_at = offsets_at + count * 4;
        if map.len() < large_offsets_at + 2 * width {
            return Err(invalid(format!("{count} entries do not fit in {} bytes", map.len())));
        }

        Ok(Self {
            map,
            path,
            algo,
            count,
            ids_at,
            crcs_at,
            offsets_at,
            large_offsets_at,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn fanout(&self, byte: usize) -> usize {
        be_u32(&self.map, FANOUT_START + byte * 4) as usize
    }

    /// Index range of ids whose first byte is `first`.
    fn bucket(&self, first: u8) -> (usize, usize) {
        let hi = self.fanout(usize::from(first));
        let lo = if first == 0 { 0 } else { self.fanout(usize::from(first) - 1) };
        (lo, hi)
    }

    fn raw_id(&self, i: usize) -> &[u8] {
        let width = self.algo.digest_len();
        let at = self.ids_at + i * width;
        &self.map[at..at + width]
    }

    pub fn oid_at(&self, i: usize) -> Result<ObjectId, PackError> {
        Ok(ObjectId::from_bytes(self.raw_id(i), self.algo)?)
    }

    pub fn crc32_at(&self, i: usize) -> u32 {
        be_u32(&self.map, self.crcs_at + i * 4)
    }

    pub fn offset_at(&self, i: usize) -> Result<u64, PackError> {
        let small = be_u32(&self.map, self.offsets_at + i * 4);
        if small & 0x8000_0000 == 0 {
            return Ok(u64::from(small));
        }
        let slot = (small & 0x7fff_ffff) as usize;
        let at = self.large_offsets_at + slot * 8;
        if at + 8 > self.map.len() - 2 * self.algo.digest_len() {
            return Err(invalid("64-bit offset slot out of range"));
        }
        Ok(be_u64(&self.map, at))
    }

    /// Position of `oid` in the sorted table.
    pub fn position(&self, oid: &ObjectId) -> Option<usize> {
        let (mut lo, mut hi) = self.bucket(oid.first_byte());
        let needle = oid.as_bytes();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.raw_id(mid).cmp(needle) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Some(mid),
            }
        }
        None
    }

    pub fn lookup(&self, oid: &ObjectId) -> Result<Option<u64>, PackError> {
        match self.position(oid) {
            Some(i) => self.offset_at(i).map(Some),
            None => Ok(None),
        }
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.position(oid).is_some()
    }

    /// Every id in this index matching `prefix`.
    pub fn find_prefix(&self, prefix: &OidPrefix) -> Result<Vec<ObjectId>, PackError> {
        let (lo, hi) = self.bucket(prefix.first_byte());
        let mut out = Vec::new();
        for i in lo..hi {
            let oid = self.oid_at(i)?;
            if prefix.matches(&oid) {
                out.push(oid);
            }
        }
        Ok(out)
    }

    /// All ids in sorted order.
    pub fn oids(&self) -> impl Iterator<Item = Result<ObjectId, PackError>> + '_ {
        (0..self.count).map(move |i| self.oid_at(i))
    }

    /// Checksum of the pack this index describes.
    pub fn pack_checksum(&self) -> Result<ObjectId, PackError> {
        let width = self.algo.digest_len();
        let at = self.map.len() - 2 * width;
        Ok(ObjectId::from_bytes(&self.map[at..at + width], self.algo)?)
    }

    /// Recompute the trailing index checksum.
    pub fn verify(&self) -> Result<(), PackError> {
        let width = self.algo.digest_len();
        let body = self.map.len() - width;
        let actual = Hasher::digest(self.algo, &self.map[..body])?;
        let expected = ObjectId::from_bytes(&self.map[body..], self.algo)?;
        if actual != expected {
            return Err(PackError::ChecksumMismatch { expected, actual });
        }
        Ok(())
    }
}

/// One row of an index being written.
#[derive(Debug, Clone, Copy)]
pub struct IndexRecord {
    pub oid: ObjectId,
    pub offset: u64,
    pub crc32: u32,
}

/// Serialize a v2 index for `records` (any order) of a pack with
/// trailer `pack_checksum`.
pub fn encode_index(
    records: &mut [IndexRecord],
    pack_checksum: &ObjectId,
    algo: HashAlgorithm,
) -> Result<Vec<u8>, PackError> {
    records.sort_by(|a, b| a.oid.cmp(&b.oid));
    let width = algo.digest_len();
    let mut out = Vec::with_capacity(FANOUT_START + FANOUT_LEN + records.len() * (width + 8) + 2 * width);
    out.extend_from_slice(&IDX_SIGNATURE);
    out.extend_from_slice(&IDX_VERSION.to_be_bytes());

    let mut fanout = [0u32; 256];
    for r in records.iter() {
        fanout[usize::from(r.oid.first_byte())] += 1;
    }
    let mut running = 0u32;
    for slot in fanout.iter_mut() {
        running += *slot;
        *slot = running;
    }
    for v in fanout {
        out.extend_from_slice(&v.to_be_bytes());
    }
    for r in records.iter() {
        out.extend_from_slice(r.oid.as_bytes());
    }
    for r in records.iter() {
        out.extend_from_slice(&r.crc32.to_be_bytes());
    }
    let mut large = Vec::new();
    for r in records.iter() {
        if r.offset < 0x8000_0000 {
            out.extend_from_slice(&(r.offset as u32).to_be_bytes());
        } else {
            let slot = 0x8000_0000 | large.len() as u32;
            out.extend_from_slice(&slot.to_be_bytes());
            large.push(r.offset);
        }
    }
    for off in large {
        out.extend_from_slice(&off.to_be_bytes());
    }
    out.extend_from_slice(pack_checksum.as_bytes());
    let own = Hasher::digest(algo, &out)?;
    out.extend_from_slice(own.as_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(first: u8, last: u8) -> ObjectId {
        let mut raw = [0u8; 20];
        raw[0] = first;
        raw[19] = last;
        ObjectId::Sha1(raw)
    }

    fn write_index(records: &mut [IndexRecord]) -> (tempfile::TempDir, PackIndex) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pack-test.idx");
        let bytes = encode_index(records, &oid(0xaa, 0xbb), HashAlgorithm::Sha1).unwrap();
        std::fs::write(&path, bytes).unwrap();
        let idx = PackIndex::open(&path, HashAlgorithm::Sha1).unwrap();
        (dir, idx)
    }

    #[test]
    fn lookup_across_buckets() {
        let mut records = vec![
            IndexRecord { oid: oid(0xff, 1), offset: 12, crc32: 1 },
            IndexRecord { oid: oid(0x00, 2), offset: 40, crc32: 2 },
            IndexRecord { oid: oid(0x7f, 3), offset: 90, crc32: 3 },
            IndexRecord { oid: oid(0x7f, 4), offset: 120, crc32: 4 },
        ];
        let (_dir, idx) = write_index(&mut records);
        assert_eq!(idx.len(), 4);
        assert_eq!(idx.lookup(&oid(0x00, 2)).unwrap(), Some(40));
        assert_eq!(idx.lookup(&oid(0x7f, 4)).unwrap(), Some(120));
        assert_eq!(idx.lookup(&oid(0xff, 1)).unwrap(), Some(12));
        assert_eq!(idx.lookup(&oid(0x7f, 5)).unwrap(), None);
        assert_eq!(idx.crc32_at(idx.position(&oid(0x7f, 3)).unwrap()), 3);
        assert_eq!(idx.pack_checksum().unwrap(), oid(0xaa, 0xbb));
        idx.verify().unwrap();

        let sorted: Vec<_> = idx.oids().map(Result::unwrap).collect();
        assert!(sorted.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn large_offsets_use_second_table() {
        let big = 5u64 << 32;
        let mut records = vec![
            IndexRecord { oid: oid(1, 1), offset: big, crc32: 0 },
            IndexRecord { oid: oid(2, 2), offset: 12, crc32: 0 },
        ];
        let (_dir, idx) = write_index(&mut records);
        assert_eq!(idx.lookup(&oid(1, 1)).unwrap(), Some(big));
        assert_eq!(idx.lookup(&oid(2, 2)).unwrap(), Some(12));
    }

    #[test]
    fn prefix_search() {
        let a = ObjectId::from_hex("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391").unwrap();
        let b = ObjectId::from_hex("e69de2ffffffffffffffffffffffffffffffffff").unwrap();
        let mut records = vec![
            IndexRecord { oid: a, offset: 12, crc32: 0 },
            IndexRecord { oid: b, offset: 50, crc32: 0 },
        ];
        let (_dir, idx) = write_index(&mut records);
        assert_eq!(idx.find_prefix(&OidPrefix::new("e69de2").unwrap()).unwrap().len(), 2);
        assert_eq!(idx.find_prefix(&OidPrefix::new("e69de29b").unwrap()).unwrap(), vec![a]);
        assert!(idx.find_prefix(&OidPrefix::new("0000").unwrap()).unwrap().is_empty());
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.idx");
        std::fs::write(&path, [0xff, b't', b'O', b'c', 0, 0, 0, 2]).unwrap();
        assert!(PackIndex::open(&path, HashAlgorithm::Sha1).is_err());
    }
}
