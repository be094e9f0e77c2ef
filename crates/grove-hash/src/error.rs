use grove_utils::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid hex character at position {position}: '{character}'")]
    InvalidHex { position: usize, character: char },

    #[error("invalid hex length: expected {expected}, got {actual}")]
    InvalidHexLength { expected: usize, actual: usize },

    #[error("invalid hash length: expected {expected} bytes, got {actual}")]
    InvalidHashLength { expected: usize, actual: usize },

    #[error("prefix '{0}' is shorter than the minimum abbreviation")]
    PrefixTooShort(String),

    #[error("SHA-1 collision detected")]
    Sha1Collision,
}

impl HashError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Sha1Collision => ErrorKind::Corrupt,
            _ => ErrorKind::InvalidArgument,
        }
    }
}
