use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use grove_hash::{HashAlgorithm, Hasher, ObjectId};
use grove_object::ObjectType;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::entry::{encode_header, encode_ofs_distance};
use crate::index::{encode_index, IndexRecord};
use crate::{EntryKind, PackError, PACK_HEADER_LEN, PACK_SIGNATURE, PACK_VERSION};

/// Where [`PackWriter::finish`] put the pack.
#[derive(Debug, Clone)]
pub struct WrittenPack {
    pub pack_path: PathBuf,
    pub index_path: PathBuf,
    pub checksum: ObjectId,
    pub objects: usize,
}

/// Streams entries into a temporary file in the pack directory and, on
/// [`finish`](Self::finish), renames it to `pack-<checksum>.pack` next to a
/// freshly written `.idx`.
pub struct PackWriter {
    dir: PathBuf,
    algo: HashAlgorithm,
    level: Compression,
    out: NamedTempFile,
    position: u64,
    records: Vec<IndexRecord>,
}

impl PackWriter {
    pub fn new(pack_dir: impl AsRef<Path>, algo: HashAlgorithm) -> Result<Self, PackError> {
        let dir = pack_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let mut out = tempfile::Builder::new().prefix("tmp_pack_").tempfile_in(&dir)?;
        let mut header = [0u8; PACK_HEADER_LEN];
        header[..4].copy_from_slice(PACK_SIGNATURE);
        header[4..8].copy_from_slice(&PACK_VERSION.to_be_bytes());
        out.write_all(&header)?;
        Ok(Self {
            dir,
            algo,
            level: Compression::default(),
            out,
            position: PACK_HEADER_LEN as u64,
            records: Vec::new(),
        })
    }

    pub fn set_compression(&mut self, level: Compression) {
        self.level = level;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.records.iter().any(|r| r.oid == *oid)
    }

    fn push_entry(&mut self, oid: ObjectId, prefix: &[u8], body: &[u8]) -> Result<(), PackError> {
        let mut z = ZlibEncoder::new(Vec::with_capacity(body.len() / 2 + 16), self.level);
        z.write_all(body)?;
        let compressed = z.finish()?;

        let mut crc = crc32fast::Hasher::new();
        crc.update(prefix);
        crc.update(&compressed);

        self.out.write_all(prefix)?;
        self.out.write_all(&compressed)?;
        self.records.push(IndexRecord {
            oid,
            offset: self.position,
            crc32: crc.finalize(),
        });
        self.position += (prefix.len() + compressed.len()) as u64;
        Ok(())
    }

    /// Append a full object. Adding an id twice stores it once.
    pub fn add_object(&mut self, kind: ObjectType, data: &[u8]) -> Result<ObjectId, PackError> {
        let oid = Hasher::hash_object(self.algo, kind.as_str(), data)?;
        if !self.contains(&oid) {
            let prefix = encode_header(EntryKind::from_object_type(kind).type_code(), data.len() as u64);
            self.push_entry(oid, &prefix, data)?;
        }
        Ok(oid)
    }

    /// Append `result`, stored as an OFS_DELTA against `base`, which must
    /// already be in this pack. The caller vouches that `delta` applied to
    /// `base` yields the object named `result`.
    pub fn add_delta(&mut self, base: &ObjectId, result: ObjectId, delta: &[u8]) -> Result<(), PackError> {
        let base_offset = self
            .records
            .iter()
            .find(|r| r.oid == *base)
            .map(|r| r.offset)
            .ok_or(PackError::MissingBase(*base))?;
        let mut prefix = encode_header(6, delta.len() as u64);
        prefix.extend_from_slice(&encode_ofs_distance(self.position - base_offset));
        self.push_entry(result, &prefix, delta)
    }

    /// Fix up the object count, append the checksum and write the index.
    pub fn finish(mut self) -> Result<WrittenPack, PackError> {
        let count = u32::try_from(self.records.len())
            .map_err(|_| PackError::InvalidHeader("too many objects for one pack".into()))?;
        let file = self.out.as_file_mut();
        file.seek(SeekFrom::Start(8))?;
        file.write_all(&count.to_be_bytes())?;
        file.seek(SeekFrom::Start(0))?;
        let mut hasher = Hasher::new(self.algo);
        io::copy(&mut *file, &mut hasher)?;
        let checksum = hasher.finalize()?;
        file.seek(SeekFrom::End(0))?;
        file.write_all(checksum.as_bytes())?;
        file.sync_all()?;

        let stem = format!("pack-{}", checksum.to_hex());
        let pack_path = self.dir.join(format!("{stem}.pack"));
        let index_path = self.dir.join(format!("{stem}.idx"));
        let idx_bytes = encode_index(&mut self.records, &checksum, self.algo)?;

        self.out.persist(&pack_path).map_err(|e| e.error)?;
        let mut idx = tempfile::Builder::new().prefix("tmp_idx_").tempfile_in(&self.dir)?;
        idx.write_all(&idx_bytes)?;
        idx.as_file().sync_all()?;
        idx.persist(&index_path).map_err(|e| e.error)?;

        debug!(pack = %pack_path.display(), objects = count, "wrote pack");
        Ok(WrittenPack {
            pack_path,
            index_path,
            checksum,
            objects: count as usize,
        })
    }
}
