//! The four object kinds and their canonical encodings.
//!
//! An [`Object`] is parsed from, and encoded to, the exact bytes that are
//! hashed to produce its [`ObjectId`]. Encoding a parsed object reproduces the
//! input, including headers this crate does not interpret.

mod blob;
pub mod cache;
mod commit;
mod error;
mod fields;
pub mod header;
mod tag;
mod tree;

pub use blob::Blob;
pub use cache::ObjectCache;
pub use commit::Commit;
pub use error::ObjectError;
pub use tag::Tag;
pub use tree::{compare_names, FileMode, Tree, TreeBuilder, TreeEntry};

use bstr::BString;
use grove_hash::{HashAlgorithm, HashError, Hasher, ObjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    pub fn from_bytes(name: &[u8]) -> Result<Self, ObjectError> {
        match name {
            b"blob" => Ok(Self::Blob),
            b"tree" => Ok(Self::Tree),
            b"commit" => Ok(Self::Commit),
            b"tag" => Ok(Self::Tag),
            other => Err(ObjectError::InvalidType(BString::from(other))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    pub fn as_bytes(self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectType {
    type Err = ObjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    /// Parse a full loose encoding, header included.
    pub fn parse(data: &[u8], algo: HashAlgorithm) -> Result<Self, ObjectError> {
        let (kind, size, header_len) = header::parse_header(data)?;
        let content = &data[header_len..];
        if content.len() != size {
            return Err(ObjectError::Truncated {
                expected: size,
                actual: content.len(),
            });
        }
        Self::parse_content(kind, content, algo)
    }

    /// Parse object content whose type is already known.
    pub fn parse_content(
        kind: ObjectType,
        content: &[u8],
        algo: HashAlgorithm,
    ) -> Result<Self, ObjectError> {
        Ok(match kind {
            ObjectType::Blob => Self::Blob(Blob::new(content)),
            ObjectType::Tree => Self::Tree(Tree::parse(content, algo)?),
            ObjectType::Commit => Self::Commit(Commit::parse(content)?),
            ObjectType::Tag => Self::Tag(Tag::parse(content)?),
        })
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Blob(_) => ObjectType::Blob,
            Self::Tree(_) => ObjectType::Tree,
            Self::Commit(_) => ObjectType::Commit,
            Self::Tag(_) => ObjectType::Tag,
        }
    }

    /// Content bytes, without the type/size header.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Blob(b) => b.data.clone(),
            Self::Tree(t) => t.encode(),
            Self::Commit(c) => c.encode(),
            Self::Tag(t) => t.encode(),
        }
    }

    /// Header followed by content: the exact bytes that are hashed.
    pub fn encode_with_header(&self) -> Vec<u8> {
        let content = self.encode();
        let mut out = header::write_header(self.object_type(), content.len());
        out.extend_from_slice(&content);
        out
    }

    pub fn compute_oid(&self, algo: HashAlgorithm) -> Result<ObjectId, HashError> {
        Hasher::hash_object(algo, self.object_type().as_str(), &self.encode())
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Self::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_commit(&self) -> Option<&Commit> {
        match self {
            Self::Commit(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Self::Tag(t) => Some(t),
            _ => None,
        }
    }

    fn unexpected(&self, expected: ObjectType) -> ObjectError {
        ObjectError::UnexpectedType {
            expected,
            actual: self.object_type(),
        }
    }

    pub fn into_blob(self) -> Result<Blob, ObjectError> {
        match self {
            Self::Blob(b) => Ok(b),
            other => Err(other.unexpected(ObjectType::Blob)),
        }
    }

    pub fn into_tree(self) -> Result<Tree, ObjectError> {
        match self {
            Self::Tree(t) => Ok(t),
            other => Err(other.unexpected(ObjectType::Tree)),
        }
    }

    pub fn into_commit(self) -> Result<Commit, ObjectError> {
        match self {
            Self::Commit(c) => Ok(c),
            other => Err(other.unexpected(ObjectType::Commit)),
        }
    }

    pub fn into_tag(self) -> Result<Tag, ObjectError> {
        match self {
            Self::Tag(t) => Ok(t),
            other => Err(other.unexpected(ObjectType::Tag)),
        }
    }
}

impl From<Blob> for Object {
    fn from(b: Blob) -> Self {
        Self::Blob(b)
    }
}

impl From<Tree> for Object {
    fn from(t: Tree) -> Self {
        Self::Tree(t)
    }
}

impl From<Commit> for Object {
    fn from(c: Commit) -> Self {
        Self::Commit(c)
    }
}

impl From<Tag> for Object {
    fn from(t: Tag) -> Self {
        Self::Tag(t)
    }
}
