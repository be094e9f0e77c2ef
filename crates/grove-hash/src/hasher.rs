//! Streaming digests over object encodings.

use std::io;

use digest::Digest;

use crate::{HashAlgorithm, HashError, ObjectId};

enum Inner {
    Sha1(Box<sha1_checked::Sha1>),
    Sha256(sha2::Sha256),
}

/// Incremental hasher producing an [`ObjectId`].
///
/// SHA-1 input goes through collision detection; a detected attack makes
/// [`finalize`](Hasher::finalize) fail instead of returning a digest.
pub struct Hasher {
    inner: Inner,
}

impl Hasher {
    pub fn new(algo: HashAlgorithm) -> Self {
        let inner = match algo {
            HashAlgorithm::Sha1 => Inner::Sha1(Box::new(sha1_checked::Sha1::new())),
            HashAlgorithm::Sha256 => Inner::Sha256(sha2::Sha256::new()),
        };
        Self { inner }
    }

    /// Start a hasher already primed with the `"<kind> <len>\0"` header.
    pub fn for_object(algo: HashAlgorithm, kind: &str, len: usize) -> Self {
        let mut h = Self::new(algo);
        h.update(format!("{kind} {len}\0").as_bytes());
        h
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Sha1(h) => Digest::update(h.as_mut(), data),
            Inner::Sha256(h) => Digest::update(h, data),
        }
    }

    pub fn finalize(self) -> Result<ObjectId, HashError> {
        match self.inner {
            Inner::Sha1(h) => {
                let out = h.try_finalize();
                if out.has_collision() {
                    return Err(HashError::Sha1Collision);
                }
                ObjectId::from_bytes(out.hash().as_slice(), HashAlgorithm::Sha1)
            }
            Inner::Sha256(h) => ObjectId::from_bytes(h.finalize().as_slice(), HashAlgorithm::Sha256),
        }
    }

    pub fn digest(algo: HashAlgorithm, data: &[u8]) -> Result<ObjectId, HashError> {
        let mut h = Self::new(algo);
        h.update(data);
        h.finalize()
    }

    /// Identifier of an object of `kind` with the given content.
    pub fn hash_object(algo: HashAlgorithm, kind: &str, data: &[u8]) -> Result<ObjectId, HashError> {
        let mut h = Self::for_object(algo, kind, data.len());
        h.update(data);
        h.finalize()
    }
}

impl io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    #[test]
    fn empty_input() {
        let oid = Hasher::digest(HashAlgorithm::Sha1, b"").unwrap();
        assert_eq!(oid.to_hex(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        let oid = Hasher::digest(HashAlgorithm::Sha256, b"").unwrap();
        assert_eq!(
            oid.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn blob_vectors() {
        let empty = Hasher::hash_object(HashAlgorithm::Sha1, "blob", b"").unwrap();
        assert_eq!(empty.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
        let hello = Hasher::hash_object(HashAlgorithm::Sha1, "blob", b"hello world").unwrap();
        assert_eq!(hello.to_hex(), "95d09f2b10159347eece71399a7e2e907ea3df4f");
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut h = Hasher::for_object(HashAlgorithm::Sha1, "blob", 11);
        h.write_all(b"hello ").unwrap();
        h.write_all(b"world").unwrap();
        assert_eq!(
            h.finalize().unwrap(),
            Hasher::hash_object(HashAlgorithm::Sha1, "blob", b"hello world").unwrap()
        );
    }

    proptest! {
        #[test]
        fn distinct_content_distinct_ids(a in proptest::collection::vec(any::<u8>(), 0..128),
                                         b in proptest::collection::vec(any::<u8>(), 0..128)) {
            prop_assume!(a != b);
            let x = Hasher::hash_object(HashAlgorithm::Sha1, "blob", &a).unwrap();
            let y = Hasher::hash_object(HashAlgorithm::Sha1, "blob", &b).unwrap();
            prop_assert_ne!(x, y);
        }
    }
}
