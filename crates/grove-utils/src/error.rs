use std::path::PathBuf;

/// Coarse classification shared by every grove error type.
///
/// Each crate keeps its own detailed error enum; `kind()` on those enums maps
/// a failure onto one of these so callers can branch on the category without
/// matching every variant of every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Object, reference, or path absent.
    NotFound,
    /// Broken symbolic chain, depth exceeded, or malformed reference name.
    InvalidReference,
    /// Compare-and-swap failure or an unresolved merge conflict.
    Conflict,
    /// A line-level patch was requested for binary content.
    BinaryContent,
    /// The histories share no common ancestor.
    NoMergeBase,
    /// Digest mismatch or malformed serialization.
    Corrupt,
    /// The caller violated an operation's contract.
    InvalidArgument,
    /// Underlying I/O failure.
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotFound => "not found",
            Self::InvalidReference => "invalid reference",
            Self::Conflict => "conflict",
            Self::BinaryContent => "binary content",
            Self::NoMergeBase => "no merge base",
            Self::Corrupt => "corrupt",
            Self::InvalidArgument => "invalid argument",
            Self::Io => "i/o error",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    #[error("lock file error: {0}")]
    Lock(#[from] LockError),

    #[error("date parse error: {0}")]
    DateParse(String),

    #[error("malformed signature: {0}")]
    Signature(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl UtilError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Lock(LockError::AlreadyLocked { .. }) => ErrorKind::Conflict,
            Self::Lock(_) | Self::Io(_) => ErrorKind::Io,
            Self::DateParse(_) | Self::Signature(_) => ErrorKind::Corrupt,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("unable to create lock file '{path}': already locked")]
    AlreadyLocked { path: PathBuf },

    #[error("unable to create lock file '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to commit lock file '{path}': {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
