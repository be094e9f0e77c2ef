//! Loose objects: `objects/ab/cdef...`, each file holding the zlib stream of
//! `"<type> <size>\0<content>"`.
//!
//! Writes are idempotent. A new object is compressed into a temporary file in
//! its fan-out directory and renamed into place, so a reader sees either no
//! file or a complete one.

mod iter;
mod read;
mod write;

pub use iter::LooseOidIter;

use std::path::{Path, PathBuf};

use grove_hash::{HashAlgorithm, ObjectId};
use grove_utils::ErrorKind;

pub struct LooseStore {
    objects_dir: PathBuf,
    algo: HashAlgorithm,
    compression: flate2::Compression,
}

impl LooseStore {
    pub fn new(objects_dir: impl AsRef<Path>, algo: HashAlgorithm) -> Self {
        Self {
            objects_dir: objects_dir.as_ref().to_path_buf(),
            algo,
            compression: flate2::Compression::default(),
        }
    }

    /// zlib level 0-9; `-1` (git's "default") maps to the library default.
    pub fn set_compression(&mut self, level: i64) {
        self.compression = match u32::try_from(level) {
            Ok(l) if l <= 9 => flate2::Compression::new(l),
            _ => flate2::Compression::default(),
        };
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.algo
    }

    pub fn object_path(&self, oid: &ObjectId) -> PathBuf {
        self.objects_dir.join(oid.loose_path())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LooseError {
    #[error("loose object {oid} is corrupt: {reason}")]
    Corrupt { oid: ObjectId, reason: String },

    #[error("loose object {oid} hashes to {actual}")]
    HashMismatch { oid: ObjectId, actual: ObjectId },

    #[error(transparent)]
    Object(#[from] grove_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] grove_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LooseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Corrupt { .. } | Self::HashMismatch { .. } | Self::Object(_) => ErrorKind::Corrupt,
            Self::Hash(e) => e.kind(),
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_uses_fanout() {
        let store = LooseStore::new("/repo/.git/objects", HashAlgorithm::Sha1);
        let oid = ObjectId::from_hex("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391").unwrap();
        assert_eq!(
            store.object_path(&oid),
            PathBuf::from("/repo/.git/objects/e6/9de29bb2d1d6434b8b29ae775ad8c2e48c5391")
        );
    }
}
