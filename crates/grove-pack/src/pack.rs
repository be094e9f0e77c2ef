use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::bufread::ZlibDecoder;
use grove_hash::{HashAlgorithm, Hasher, ObjectId, OidPrefix};
use grove_object::ObjectType;
use memmap2::Mmap;
use tracing::trace;

use crate::delta::{apply_delta, delta_sizes};
use crate::entry::{parse_header, EntryHeader};
use crate::index::PackIndex;
use crate::{be_u32, EntryKind, PackError, MAX_DELTA_DEPTH, PACK_HEADER_LEN, PACK_SIGNATURE, PACK_VERSION};

/// Looks up delta bases that live outside this pack.
pub trait BaseResolver {
    fn resolve_base(&self, oid: &ObjectId) -> Option<(ObjectType, Vec<u8>)>;
}

/// Resolver that knows no external objects.
pub struct NoExternalBases;

impl BaseResolver for NoExternalBases {
    fn resolve_base(&self, _: &ObjectId) -> Option<(ObjectType, Vec<u8>)> {
        None
    }
}

/// A `.pack` with its `.idx`, both memory-mapped.
pub struct PackFile {
    map: Mmap,
    path: PathBuf,
    index: PackIndex,
    algo: HashAlgorithm,
}

impl PackFile {
    /// Open `pack-*.pack`; the index is the sibling `.idx`.
    pub fn open(path: impl AsRef<Path>, algo: HashAlgorithm) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let index = PackIndex::open(path.with_extension("idx"), algo)?;
        let file = File::open(&path)?;
        // SAFETY: pack files are immutable once renamed into place.
        let map = unsafe { Mmap::map(&file)? };

        if map.len() < PACK_HEADER_LEN + algo.digest_len() {
            return Err(PackError::InvalidHeader("file too short".into()));
        }
        if &map[..4] != PACK_SIGNATURE {
            return Err(PackError::InvalidHeader("missing PACK signature".into()));
        }
        let version = be_u32(&map, 4);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let count = be_u32(&map, 8) as usize;
        if count != index.len() {
            return Err(PackError::InvalidHeader(format!(
                "pack holds {count} objects, index lists {}",
                index.len()
            )));
        }
        let trailer = &map[map.len() - algo.digest_len()..];
        if trailer != index.pack_checksum()?.as_bytes() {
            return Err(PackError::InvalidHeader("index belongs to a different pack".into()));
        }
        trace!(path = %path.display(), objects = count, "opened pack");
        Ok(Self {
            map,
            path,
            index,
            algo,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.index.contains(oid)
    }

    pub fn find_prefix(&self, prefix: &OidPrefix) -> Result<Vec<ObjectId>, PackError> {
        self.index.find_prefix(prefix)
    }

    fn header_at(&self, offset: u64) -> Result<EntryHeader, PackError> {
        let start = usize::try_from(offset).ok().filter(|&s| s < self.data_end()).ok_or(
            PackError::CorruptEntry {
                offset,
                reason: "offset beyond end of pack".into(),
            },
        )?;
        parse_header(&self.map[start..self.data_end()], offset, self.algo)
    }

    fn data_end(&self) -> usize {
        self.map.len() - self.algo.digest_len()
    }

    fn inflate(&self, offset: u64, header: &EntryHeader) -> Result<Vec<u8>, PackError> {
        let start = offset as usize + header.header_len;
        let expected = usize::try_from(header.size).map_err(|_| PackError::CorruptEntry {
            offset,
            reason: "entry too large".into(),
        })?;
        let mut out = Vec::with_capacity(expected);
        ZlibDecoder::new(&self.map[start..self.data_end()])
            .take(header.size + 1)
            .read_to_end(&mut out)
            .map_err(|e| PackError::CorruptEntry {
                offset,
                reason: format!("zlib: {e}"),
            })?;
        if out.len() != expected {
            return Err(PackError::CorruptEntry {
                offset,
                reason: format!("inflated {} bytes, header says {expected}", out.len()),
            });
        }
        Ok(out)
    }

    /// Type and content of `oid`, or `None` if this pack does not hold it.
    pub fn read(
        &self,
        oid: &ObjectId,
        external: &dyn BaseResolver,
    ) -> Result<Option<(ObjectType, Vec<u8>)>, PackError> {
        match self.index.lookup(oid)? {
            Some(offset) => self.read_at(offset, external).map(Some),
            None => Ok(None),
        }
    }

    /// Materialize the entry at `offset`, following its delta chain down to
    /// a full object and then applying the deltas back up.
    pub fn read_at(
        &self,
        offset: u64,
        external: &dyn BaseResolver,
    ) -> Result<(ObjectType, Vec<u8>), PackError> {
        let mut deltas: Vec<Vec<u8>> = Vec::new();
        let mut at = offset;

        let (kind, mut data) = loop {
            if deltas.len() > MAX_DELTA_DEPTH {
                return Err(PackError::ChainTooDeep(offset));
            }
            let header = self.header_at(at)?;
            let body = self.inflate(at, &header)?;
            match header.kind {
                EntryKind::OfsDelta { base_offset } => {
                    deltas.push(body);
                    at = base_offset;
                }
                EntryKind::RefDelta { base } => {
                    deltas.push(body);
                    match self.index.lookup(&base)? {
                        Some(base_offset) => at = base_offset,
                        None => {
                            break external
                                .resolve_base(&base)
                                .ok_or(PackError::MissingBase(base))?
                        }
                    }
                }
                full => {
                    let kind = full.object_type().ok_or(PackError::CorruptEntry {
                        offset: at,
                        reason: "delta kind without base".into(),
                    })?;
                    break (kind, body);
                }
            }
        };

        for delta in deltas.iter().rev() {
            data = apply_delta(&data, delta)?;
        }
        Ok((kind, data))
    }

    /// Type and size without applying deltas: the type comes from the chain's
    /// base, the size from the outermost delta's header.
    pub fn read_header(
        &self,
        oid: &ObjectId,
        external: &dyn BaseResolver,
    ) -> Result<Option<(ObjectType, u64)>, PackError> {
        let Some(offset) = self.index.lookup(oid)? else {
            return Ok(None);
        };
        let first = self.header_at(offset)?;
        let size = match first.kind.object_type() {
            Some(kind) => return Ok(Some((kind, first.size))),
            None => delta_sizes(&self.inflate(offset, &first)?)?.1,
        };
        let mut at = offset;
        let mut header = first;
        for _ in 0..=MAX_DELTA_DEPTH {
            match header.kind {
                EntryKind::OfsDelta { base_offset } => at = base_offset,
                EntryKind::RefDelta { base } => match self.index.lookup(&base)? {
                    Some(o) => at = o,
                    None => {
                        let (kind, _) = external
                            .resolve_base(&base)
                            .ok_or(PackError::MissingBase(base))?;
                        return Ok(Some((kind, size)));
                    }
                },
                full => {
                    if let Some(kind) = full.object_type() {
                        return Ok(Some((kind, size)));
                    }
                }
            }
            header = self.header_at(at)?;
        }
        Err(PackError::ChainTooDeep(offset))
    }

    /// Recompute the pack trailer.
    pub fn verify_checksum(&self) -> Result<(), PackError> {
        let end = self.data_end();
        let actual = Hasher::digest(self.algo, &self.map[..end])?;
        let expected = ObjectId::from_bytes(&self.map[end..], self.algo)?;
        if actual != expected {
            return Err(PackError::ChecksumMismatch { expected, actual });
        }
        Ok(())
    }
}
