//! Pack files: many objects in one zlib-framed file, some stored as deltas
//! against other entries, plus a sorted `.idx` for id lookup.
//!
//! Only version 2 of both formats is read or written. Delta chains are
//! resolved iteratively and bounded by [`MAX_DELTA_DEPTH`].

pub mod delta;
pub mod entry;
pub mod index;
pub mod pack;
pub mod write;

pub use index::PackIndex;
pub use pack::PackFile;
pub use write::{PackWriter, WrittenPack};

use grove_hash::ObjectId;
use grove_object::ObjectType;
use grove_utils::ErrorKind;

pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;
pub const PACK_HEADER_LEN: usize = 12;

/// `\377tOc`
pub const IDX_SIGNATURE: [u8; 4] = [0xff, b't', b'O', b'c'];
pub const IDX_VERSION: u32 = 2;

pub const MAX_DELTA_DEPTH: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("bad pack header: {0}")]
    InvalidHeader(String),

    #[error("bad pack index: {0}")]
    InvalidIndex(String),

    #[error("unsupported pack version {0}")]
    UnsupportedVersion(u32),

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("bad delta: {0}")]
    InvalidDelta(String),

    #[error("delta base {0} is not available")]
    MissingBase(ObjectId),

    #[error("delta chain starting at offset {0} is deeper than {MAX_DELTA_DEPTH}")]
    ChainTooDeep(u64),

    #[error("pack checksum mismatch: trailer {expected}, computed {actual}")]
    ChecksumMismatch { expected: ObjectId, actual: ObjectId },

    #[error(transparent)]
    Hash(#[from] grove_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingBase(_) => ErrorKind::NotFound,
            Self::Io(_) => ErrorKind::Io,
            Self::Hash(e) => e.kind(),
            _ => ErrorKind::Corrupt,
        }
    }
}

/// What a pack entry holds. Deltas carry the location of their base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Commit,
    Tree,
    Blob,
    Tag,
    /// Base lives earlier in the same pack at this absolute offset.
    OfsDelta { base_offset: u64 },
    RefDelta { base: ObjectId },
}

impl EntryKind {
    pub fn type_code(self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
            Self::OfsDelta { .. } => 6,
            Self::RefDelta { .. } => 7,
        }
    }

    pub fn object_type(self) -> Option<ObjectType> {
        match self {
            Self::Commit => Some(ObjectType::Commit),
            Self::Tree => Some(ObjectType::Tree),
            Self::Blob => Some(ObjectType::Blob),
            Self::Tag => Some(ObjectType::Tag),
            Self::OfsDelta { .. } | Self::RefDelta { .. } => None,
        }
    }

    pub fn from_object_type(kind: ObjectType) -> Self {
        match kind {
            ObjectType::Commit => Self::Commit,
            ObjectType::Tree => Self::Tree,
            ObjectType::Blob => Self::Blob,
            ObjectType::Tag => Self::Tag,
        }
    }
}

pub(crate) fn be_u32(data: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&data[at..at + 4]);
    u32::from_be_bytes(b)
}

pub(crate) fn be_u64(data: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&data[at..at + 8]);
    u64::from_be_bytes(b)
}
