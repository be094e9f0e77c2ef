use grove_hash::ObjectId;
use grove_utils::ErrorKind;

fn show(oid: &Option<ObjectId>) -> String {
    oid.map_or_else(|| "nothing".to_owned(), |o| o.to_hex())
}

#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("invalid reference name {0}")]
    InvalidName(String),

    #[error("reference not found: {0}")]
    NotFound(String),

    #[error("reference already exists: {0}")]
    AlreadyExists(String),

    #[error("cannot update {name}: expected {}, found {}", show(.expected), show(.actual))]
    CasFailed {
        name: String,
        expected: Option<ObjectId>,
        actual: Option<ObjectId>,
    },

    #[error("symbolic reference cycle through {0}")]
    SymrefCycle(String),

    #[error("symbolic reference chain from {0} is deeper than {max}", max = crate::MAX_SYMREF_DEPTH)]
    TooDeep(String),

    #[error("cannot create {name}: {conflict} is in the way")]
    DirectoryConflict { name: String, conflict: String },

    #[error("{name} is {what}, not a direct reference")]
    NotDirect { name: String, what: &'static str },

    #[error("reflog for {name} has no entry {index}")]
    NoReflogEntry { name: String, index: usize },

    #[error("malformed {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error("duplicate reference {0} in transaction")]
    DuplicateInTransaction(String),

    #[error(transparent)]
    Util(#[from] grove_utils::UtilError),

    #[error(transparent)]
    Hash(#[from] grove_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RefError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName(_) | Self::SymrefCycle(_) | Self::TooDeep(_) => {
                ErrorKind::InvalidReference
            }
            Self::NotFound(_) | Self::NoReflogEntry { .. } => ErrorKind::NotFound,
            Self::AlreadyExists(_) | Self::CasFailed { .. } | Self::DirectoryConflict { .. } => {
                ErrorKind::Conflict
            }
            Self::NotDirect { .. } | Self::DuplicateInTransaction(_) => ErrorKind::InvalidArgument,
            Self::Parse { .. } | Self::Hash(_) => ErrorKind::Corrupt,
            Self::Util(e) => e.kind(),
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn parse(what: &'static str, detail: impl Into<String>) -> Self {
        Self::Parse {
            what,
            detail: detail.into(),
        }
    }
}
