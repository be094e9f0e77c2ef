//! One object database over every place an object can live.
//!
//! Lookups go loose objects first, then packs, then alternates. Writes
//! always produce loose objects; [`ObjectDatabase::pack_loose_objects`]
//! folds them into a pack afterwards.

mod alternates;
mod search;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use grove_hash::{HashAlgorithm, Hasher, ObjectId, OidPrefix};
use grove_loose::LooseStore;
use grove_object::{Object, ObjectCache, ObjectType};
use grove_pack::{PackFile, PackWriter, WrittenPack};
use grove_utils::ErrorKind;
use tracing::{debug, warn};

/// What [`ObjectDatabase::read_header`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub kind: ObjectType,
    pub size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("no object matches prefix '{0}'")]
    PrefixNotFound(String),

    #[error("short object id '{prefix}' is ambiguous ({count} candidates)")]
    Ambiguous { prefix: String, count: usize },

    #[error("object {oid} is corrupt: {reason}")]
    Corrupt { oid: ObjectId, reason: String },

    #[error("invalid alternates entry: {0}")]
    Alternates(String),

    #[error(transparent)]
    Loose(#[from] grove_loose::LooseError),

    #[error(transparent)]
    Pack(#[from] grove_pack::PackError),

    #[error(transparent)]
    Object(#[from] grove_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] grove_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OdbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::PrefixNotFound(_) => ErrorKind::NotFound,
            Self::Ambiguous { .. } => ErrorKind::InvalidArgument,
            Self::Corrupt { .. } | Self::Alternates(_) => ErrorKind::Corrupt,
            Self::Loose(e) => e.kind(),
            Self::Pack(e) => e.kind(),
            Self::Object(e) => e.kind(),
            Self::Hash(e) => e.kind(),
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Loose store, packs and alternates behind a single read/write surface.
///
/// Safe to share between threads: the pack list sits behind an `RwLock` so
/// [`refresh`](Self::refresh) can swap it, and the parsed-object cache behind
/// a `Mutex`.
pub struct ObjectDatabase {
    loose: LooseStore,
    packs: RwLock<Vec<PackFile>>,
    alternates: Vec<ObjectDatabase>,
    cache: Mutex<ObjectCache>,
    objects_dir: PathBuf,
    algo: HashAlgorithm,
}

impl ObjectDatabase {
    /// Open `objects_dir` together with its packs and alternates.
    pub fn open(objects_dir: impl AsRef<Path>, algo: HashAlgorithm) -> Result<Self, OdbError> {
        let objects_dir = objects_dir.as_ref().to_path_buf();
        let alternates = alternates::load(&objects_dir, algo)?;
        let mut odb = Self::open_without_alternates(&objects_dir, algo)?;
        odb.alternates = alternates;
        Ok(odb)
    }

    pub(crate) fn open_without_alternates(
        objects_dir: &Path,
        algo: HashAlgorithm,
    ) -> Result<Self, OdbError> {
        let packs = discover_packs(objects_dir, algo)?;
        debug!(dir = %objects_dir.display(), packs = packs.len(), "opened object database");
        Ok(Self {
            loose: LooseStore::new(objects_dir, algo),
            packs: RwLock::new(packs),
            alternates: Vec::new(),
            cache: Mutex::new(ObjectCache::default()),
            objects_dir: objects_dir.to_path_buf(),
            algo,
        })
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.algo
    }

    /// zlib level for new loose objects (`core.compression`).
    pub fn set_compression(&mut self, level: i64) {
        self.loose.set_compression(level);
    }

    pub fn pack_count(&self) -> usize {
        self.packs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn alternate_dirs(&self) -> Vec<&Path> {
        self.alternates.iter().map(|a| a.objects_dir()).collect()
    }

    /// Rescan `objects/pack`, e.g. after another process added a pack.
    pub fn refresh(&self) -> Result<(), OdbError> {
        let found = discover_packs(&self.objects_dir, self.algo)?;
        let mut packs = self.packs.write().unwrap_or_else(PoisonError::into_inner);
        debug!(before = packs.len(), after = found.len(), "refreshed pack list");
        *packs = found;
        Ok(())
    }

    /// Fails with [`OdbError::NotFound`] when no source holds `oid`.
    pub fn read(&self, oid: &ObjectId) -> Result<Object, OdbError> {
        self.try_read(oid)?.ok_or(OdbError::NotFound(*oid))
    }

    pub fn try_read(&self, oid: &ObjectId) -> Result<Option<Object>, OdbError> {
        match self.read_raw(oid)? {
            Some((kind, content)) => Ok(Some(Object::parse_content(kind, &content, self.algo)?)),
            None => Ok(None),
        }
    }

    /// Type and undecoded content bytes.
    pub fn read_raw(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, OdbError> {
        search::find_raw(self, oid)
    }

    /// [`read`](Self::read) through the LRU cache of parsed objects.
    pub fn read_cached(&self, oid: &ObjectId) -> Result<Object, OdbError> {
        {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(obj) = cache.get(oid) {
                return Ok(obj.clone());
            }
        }
        let obj = self.read(oid)?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*oid, obj.clone());
        Ok(obj)
    }

    /// Read and rehash; a digest that does not match `oid` is
    /// [`OdbError::Corrupt`].
    pub fn read_verified(&self, oid: &ObjectId) -> Result<Object, OdbError> {
        let (kind, content) = self.read_raw(oid)?.ok_or(OdbError::NotFound(*oid))?;
        let actual = Hasher::hash_object(self.algo, kind.as_str(), &content)?;
        if actual != *oid {
            return Err(OdbError::Corrupt {
                oid: *oid,
                reason: format!("content hashes to {actual}"),
            });
        }
        Ok(Object::parse_content(kind, &content, self.algo)?)
    }

    /// Type and size. Loose objects inflate only their header and packed
    /// deltas only their size prefix.
    pub fn read_header(&self, oid: &ObjectId) -> Result<ObjectInfo, OdbError> {
        search::find_header(self, oid)?.ok_or(OdbError::NotFound(*oid))
    }

    /// Whether any source holds `oid`. Errors count as absence.
    pub fn exists(&self, oid: &ObjectId) -> bool {
        if self.loose.contains(oid) {
            return true;
        }
        let in_pack = self
            .packs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|p| p.contains(oid));
        in_pack || self.alternates.iter().any(|a| a.exists(oid))
    }

    /// The id `content` would get as a `kind` object; nothing is stored.
    pub fn hash_only(&self, content: &[u8], kind: ObjectType) -> Result<ObjectId, OdbError> {
        Ok(Hasher::hash_object(self.algo, kind.as_str(), content)?)
    }

    pub fn write(&self, object: &Object) -> Result<ObjectId, OdbError> {
        Ok(self.loose.write(object)?)
    }

    pub fn write_raw(&self, kind: ObjectType, content: &[u8]) -> Result<ObjectId, OdbError> {
        Ok(self.loose.write_raw(kind, content)?)
    }

    /// Expand an abbreviated hex id. A full-length id only has to exist.
    pub fn resolve_prefix(&self, hex: &str) -> Result<ObjectId, OdbError> {
        if hex.len() == self.algo.hex_len() {
            let oid = ObjectId::from_hex(hex)?;
            return if self.exists(&oid) {
                Ok(oid)
            } else {
                Err(OdbError::NotFound(oid))
            };
        }
        let prefix = OidPrefix::new(hex)?;
        let mut found = BTreeSet::new();
        self.collect_prefix(&prefix, &mut found)?;
        let mut iter = found.into_iter();
        match (iter.next(), iter.len()) {
            (None, _) => Err(OdbError::PrefixNotFound(prefix.as_str().to_owned())),
            (Some(oid), 0) => Ok(oid),
            (Some(_), rest) => Err(OdbError::Ambiguous {
                prefix: prefix.as_str().to_owned(),
                count: rest + 1,
            }),
        }
    }

    fn collect_prefix(&self, prefix: &OidPrefix, out: &mut BTreeSet<ObjectId>) -> Result<(), OdbError> {
        out.extend(self.loose.find_prefix(prefix)?);
        for pack in self.packs.read().unwrap_or_else(PoisonError::into_inner).iter() {
            out.extend(pack.find_prefix(prefix)?);
        }
        for alt in &self.alternates {
            alt.collect_prefix(prefix, out)?;
        }
        Ok(())
    }

    /// Every object id in the database, sorted and deduplicated.
    pub fn iter_oids(&self) -> Result<impl Iterator<Item = ObjectId>, OdbError> {
        let mut all = BTreeSet::new();
        self.collect_all(&mut all)?;
        Ok(all.into_iter())
    }

    fn collect_all(&self, out: &mut BTreeSet<ObjectId>) -> Result<(), OdbError> {
        for oid in self.loose.iter()? {
            out.insert(oid?);
        }
        for pack in self.packs.read().unwrap_or_else(PoisonError::into_inner).iter() {
            for oid in pack.index().oids() {
                out.insert(oid?);
            }
        }
        for alt in &self.alternates {
            alt.collect_all(out)?;
        }
        Ok(())
    }

    /// Copy every loose object into one new pack and rescan. With
    /// `prune`, the loose copies are deleted once the pack is in place.
    /// Returns `None` when there were no loose objects.
    pub fn pack_loose_objects(&self, prune: bool) -> Result<Option<WrittenPack>, OdbError> {
        let oids: Vec<ObjectId> = self.loose.iter()?.collect::<Result<_, _>>()?;
        if oids.is_empty() {
            return Ok(None);
        }
        let mut writer = PackWriter::new(self.objects_dir.join("pack"), self.algo)?;
        for oid in &oids {
            let (kind, content) = self
                .loose
                .read_raw(oid)?
                .ok_or(OdbError::NotFound(*oid))?;
            writer.add_object(kind, &content)?;
        }
        let written = writer.finish()?;
        self.refresh()?;
        debug!(objects = written.objects, pack = %written.checksum, "packed loose objects");

        if prune {
            for oid in &oids {
                let path = self.loose.object_path(oid);
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "could not prune loose object");
                }
            }
        }
        Ok(Some(written))
    }
}

/// Every `pack-*.pack` in `objects/pack` that has its `.idx`, newest first.
/// Packs that fail to open are skipped with a warning.
fn discover_packs(objects_dir: &Path, algo: HashAlgorithm) -> Result<Vec<PackFile>, OdbError> {
    let pack_dir = objects_dir.join("pack");
    let entries = match std::fs::read_dir(&pack_dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_idx = path.extension().is_some_and(|ext| ext == "idx");
        if is_idx && path.with_extension("pack").is_file() {
            let mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
            candidates.push((mtime, path.with_extension("pack")));
        }
    }
    candidates.sort_by(|a, b| b.cmp(a));

    let mut packs = Vec::with_capacity(candidates.len());
    for (_, path) in candidates {
        match PackFile::open(&path, algo) {
            Ok(pack) => packs.push(pack),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable pack"),
        }
    }
    Ok(packs)
}
