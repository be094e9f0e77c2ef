use bstr::BString;
use grove_utils::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("invalid index header: {0}")]
    InvalidHeader(String),

    #[error("unsupported index version {0}")]
    UnsupportedVersion(u32),

    #[error("index checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid index entry at offset {offset}: {reason}")]
    InvalidEntry { offset: usize, reason: String },

    #[error("invalid index extension '{sig}': {reason}")]
    InvalidExtension { sig: String, reason: String },

    #[error("index extension '{0}' is required but not supported")]
    UnsupportedExtension(String),

    #[error("invalid index path '{0}'")]
    InvalidPath(BString),

    #[error("'{0}' is both a file and a directory")]
    PathCollision(BString),

    #[error("{0} path(s) still have unresolved conflicts")]
    UnresolvedConflicts(usize),

    #[error("no conflict recorded for '{0}'")]
    NoConflict(BString),

    #[error(transparent)]
    Object(#[from] grove_object::ObjectError),

    #[error(transparent)]
    Odb(#[from] grove_odb::OdbError),

    #[error(transparent)]
    Hash(#[from] grove_hash::HashError),

    #[error(transparent)]
    Util(#[from] grove_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidHeader(_)
            | Self::UnsupportedVersion(_)
            | Self::ChecksumMismatch
            | Self::InvalidEntry { .. }
            | Self::InvalidExtension { .. }
            | Self::UnsupportedExtension(_) => ErrorKind::Corrupt,
            Self::InvalidPath(_) | Self::PathCollision(_) => ErrorKind::InvalidArgument,
            Self::UnresolvedConflicts(_) => ErrorKind::Conflict,
            Self::NoConflict(_) => ErrorKind::NotFound,
            Self::Object(e) => e.kind(),
            Self::Odb(e) => e.kind(),
            Self::Hash(e) => e.kind(),
            Self::Util(e) => e.kind(),
            Self::Io(_) => ErrorKind::Io,
        }
    }
}
