use std::fmt;

use crate::hex;
use crate::{HashError, ObjectId};

/// Shortest abbreviation accepted for lookups.
pub const MIN_PREFIX_LEN: usize = 4;

/// An abbreviated object id as typed by a user, e.g. `e69de29`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OidPrefix {
    hex: String,
}

impl OidPrefix {
    /// Accepts between [`MIN_PREFIX_LEN`] and 64 hex digits.
    pub fn new(text: &str) -> Result<Self, HashError> {
        if text.len() < MIN_PREFIX_LEN {
            return Err(HashError::PrefixTooShort(text.to_owned()));
        }
        if text.len() > 64 {
            return Err(HashError::InvalidHexLength {
                expected: 64,
                actual: text.len(),
            });
        }
        hex::check_digits(text)?;
        Ok(Self {
            hex: text.to_ascii_lowercase(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.hex
    }

    pub fn len(&self) -> usize {
        self.hex.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hex.is_empty()
    }

    pub fn matches(&self, oid: &ObjectId) -> bool {
        oid.starts_with_hex(&self.hex)
    }

    /// First two digits, i.e. the loose object fan-out directory.
    pub fn fanout_dir(&self) -> &str {
        &self.hex[..2]
    }

    /// Byte value of the first two digits.
    pub fn first_byte(&self) -> u8 {
        let mut b = [0u8; 1];
        // Validated in `new`, cannot fail.
        let _ = hex::decode(&self.hex[..2], &mut b);
        b[0]
    }

    /// Full id if the prefix happens to be complete.
    pub fn to_full(&self) -> Option<ObjectId> {
        ObjectId::from_hex(&self.hex).ok()
    }
}

impl fmt::Display for OidPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

impl fmt::Debug for OidPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OidPrefix({})", self.hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_short_is_rejected() {
        let err = OidPrefix::new("e69").unwrap_err();
        assert!(matches!(err, HashError::PrefixTooShort(_)));
        assert_eq!(err.kind(), grove_utils::ErrorKind::InvalidArgument);
    }

    #[test]
    fn non_hex_is_rejected() {
        assert!(OidPrefix::new("e69z").is_err());
    }

    #[test]
    fn matches_full_id() {
        let oid = ObjectId::from_hex("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391").unwrap();
        let p = OidPrefix::new("E69DE2").unwrap();
        assert!(p.matches(&oid));
        assert_eq!(p.fanout_dir(), "e6");
        assert_eq!(p.first_byte(), 0xe6);
        assert!(p.to_full().is_none());
        assert!(!OidPrefix::new("e69f").unwrap().matches(&oid));
        assert_eq!(
            OidPrefix::new(&oid.to_hex()).unwrap().to_full(),
            Some(oid)
        );
    }
}
