use bstr::BString;
use grove_hash::HashError;
use grove_utils::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("unknown object type '{0}'")]
    InvalidType(BString),

    #[error("malformed object header: {0}")]
    InvalidHeader(String),

    #[error("object truncated: header says {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("malformed tree entry at byte {offset}: {reason}")]
    InvalidTreeEntry { offset: usize, reason: &'static str },

    #[error("invalid tree entry name '{0}'")]
    InvalidEntryName(BString),

    #[error("duplicate tree entry '{0}'")]
    DuplicateEntry(BString),

    #[error("commit is missing its '{0}' header")]
    MissingCommitField(&'static str),

    #[error("tag is missing its '{0}' header")]
    MissingTagField(&'static str),

    #[error("invalid file mode '{0}'")]
    InvalidFileMode(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] grove_utils::UtilError),

    #[error("expected a {expected} object, found a {actual}")]
    UnexpectedType {
        expected: crate::ObjectType,
        actual: crate::ObjectType,
    },

    #[error(transparent)]
    Hash(#[from] HashError),
}

impl ObjectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidEntryName(_) | Self::DuplicateEntry(_) | Self::UnexpectedType { .. } => {
                ErrorKind::InvalidArgument
            }
            _ => ErrorKind::Corrupt,
        }
    }
}
