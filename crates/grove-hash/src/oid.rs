use std::fmt;
use std::str::FromStr;

use crate::hex;
use crate::{HashAlgorithm, HashError};

/// Identifier of a stored object: the digest of its canonical encoding.
///
/// Ordering is bytewise, which is also the order pack indexes and the
/// `packed-refs` peel lines rely on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectId {
    Sha1([u8; 20]),
    Sha256([u8; 32]),
}

impl ObjectId {
    pub const NULL_SHA1: Self = Self::Sha1([0u8; 20]);
    pub const NULL_SHA256: Self = Self::Sha256([0u8; 32]);

    pub fn from_bytes(bytes: &[u8], algo: HashAlgorithm) -> Result<Self, HashError> {
        if bytes.len() != algo.digest_len() {
            return Err(HashError::InvalidHashLength {
                expected: algo.digest_len(),
                actual: bytes.len(),
            });
        }
        Ok(match algo {
            HashAlgorithm::Sha1 => {
                let mut raw = [0u8; 20];
                raw.copy_from_slice(bytes);
                Self::Sha1(raw)
            }
            HashAlgorithm::Sha256 => {
                let mut raw = [0u8; 32];
                raw.copy_from_slice(bytes);
                Self::Sha256(raw)
            }
        })
    }

    /// Parse a full-length hex identifier. The algorithm follows from the length.
    pub fn from_hex(text: &str) -> Result<Self, HashError> {
        let algo = HashAlgorithm::from_hex_len(text.len()).ok_or(HashError::InvalidHexLength {
            expected: HashAlgorithm::Sha1.hex_len(),
            actual: text.len(),
        })?;
        let mut raw = [0u8; 32];
        let raw = &mut raw[..algo.digest_len()];
        hex::decode(text, raw)?;
        Self::from_bytes(raw, algo)
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Sha1(b) => b,
            Self::Sha256(b) => b,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Sha1(_) => HashAlgorithm::Sha1,
            Self::Sha256(_) => HashAlgorithm::Sha256,
        }
    }

    pub fn is_null(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }

    pub fn to_hex(&self) -> String {
        hex::to_hex_string(self.as_bytes())
    }

    /// The first `len` hex digits, clamped to the full length.
    pub fn short_hex(&self, len: usize) -> String {
        let mut s = self.to_hex();
        s.truncate(len);
        s
    }

    /// Fan-out bucket in pack indexes.
    pub fn first_byte(&self) -> u8 {
        self.as_bytes()[0]
    }

    /// Case-insensitive hex prefix test.
    pub fn starts_with_hex(&self, prefix: &str) -> bool {
        let full = self.to_hex();
        prefix.len() <= full.len()
            && full
                .bytes()
                .zip(prefix.bytes())
                .all(|(a, b)| a == b.to_ascii_lowercase())
    }

    /// `ab/cdef...` location below `objects/`.
    pub fn loose_path(&self) -> String {
        let full = self.to_hex();
        format!("{}/{}", &full[..2], &full[2..])
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex(8))
    }
}

impl FromStr for ObjectId {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for ObjectId {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
