use std::path::PathBuf;

use grove_hash::ObjectId;
use grove_utils::ErrorKind;

use crate::remote::TransportError;

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not a git repository (or any of the parent directories): {0}")]
    NotFound(PathBuf),

    #[error("invalid git directory: {path}: {reason}")]
    InvalidGitDir { path: PathBuf, reason: String },

    #[error("bare repository has no working tree")]
    BareNoWorkTree,

    #[error("no identity configured: set user.name and user.email")]
    MissingIdentity,

    #[error("reference '{0}' does not point at any commit yet")]
    UnbornBranch(String),

    #[error("branch '{0}' not found")]
    BranchNotFound(String),

    #[error("cannot {action} the checked-out branch '{name}'")]
    CurrentBranch { action: &'static str, name: String },

    #[error("tag '{0}' not found")]
    TagNotFound(String),

    #[error("object {oid} is a {actual}, expected {expected}")]
    WrongObjectType {
        oid: ObjectId,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("invalid revision '{spec}': {reason}")]
    InvalidRevision { spec: String, reason: String },

    #[error("revision '{0}' not found")]
    RevisionNotFound(String),

    #[error("tag chain starting at {0} is too deep")]
    PeelTooDeep(ObjectId),

    #[error("no note for object {0}")]
    NoteNotFound(ObjectId),

    #[error("a note for object {0} already exists")]
    NoteExists(ObjectId),

    #[error("filter '{0}' is already registered")]
    FilterExists(String),

    #[error("filter '{0}' is not registered")]
    FilterNotFound(String),

    #[error("filter '{name}' failed on {path}: {source}")]
    Filter {
        name: String,
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("remote '{0}' is not configured")]
    RemoteNotFound(String),

    #[error("fetched ref {name} points at missing object {oid}")]
    MissingObject { name: String, oid: ObjectId },

    #[error("malformed FETCH_HEAD line: {0}")]
    FetchHead(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] grove_config::ConfigError),

    #[error(transparent)]
    Odb(#[from] grove_odb::OdbError),

    #[error(transparent)]
    Object(#[from] grove_object::ObjectError),

    #[error(transparent)]
    Ref(#[from] grove_ref::RefError),

    #[error(transparent)]
    Index(#[from] grove_index::IndexError),

    #[error(transparent)]
    Util(#[from] grove_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_)
            | Self::BranchNotFound(_)
            | Self::TagNotFound(_)
            | Self::NoteNotFound(_)
            | Self::FilterNotFound(_)
            | Self::RemoteNotFound(_)
            | Self::RevisionNotFound(_)
            | Self::MissingObject { .. }
            | Self::UnbornBranch(_)
            | Self::MissingIdentity => ErrorKind::NotFound,
            Self::InvalidGitDir { .. } | Self::FetchHead(_) => ErrorKind::Corrupt,
            Self::NoteExists(_) => ErrorKind::Conflict,
            Self::PeelTooDeep(_) => ErrorKind::InvalidReference,
            Self::BareNoWorkTree
            | Self::CurrentBranch { .. }
            | Self::WrongObjectType { .. }
            | Self::InvalidRevision { .. }
            | Self::FilterExists(_) => ErrorKind::InvalidArgument,
            Self::Filter { .. } => ErrorKind::Io,
            Self::Transport(e) => e.kind(),
            Self::Config(e) => e.kind(),
            Self::Odb(e) => e.kind(),
            Self::Object(e) => e.kind(),
            Self::Ref(e) => e.kind(),
            Self::Index(e) => e.kind(),
            Self::Util(e) => e.kind(),
            Self::Io(_) => ErrorKind::Io,
        }
    }
}
