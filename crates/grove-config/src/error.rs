use grove_utils::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config key: {0}")]
    InvalidKey(String),

    #[error("{origin}:{line}: {message}")]
    Parse {
        origin: String,
        line: usize,
        message: String,
    },

    #[error("bad boolean value '{value}' for '{key}'")]
    InvalidBool { key: String, value: String },

    #[error("bad numeric value '{value}' for '{key}'")]
    InvalidInt { key: String, value: String },

    #[error("no file to write this configuration to")]
    NoWritableFile,

    #[error(transparent)]
    Util(#[from] grove_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse { .. } => ErrorKind::Corrupt,
            Self::InvalidKey(_) | Self::InvalidBool { .. } | Self::InvalidInt { .. } => {
                ErrorKind::InvalidArgument
            }
            Self::NoWritableFile => ErrorKind::InvalidArgument,
            Self::Util(e) => e.kind(),
            Self::Io(_) => ErrorKind::Io,
        }
    }
}
