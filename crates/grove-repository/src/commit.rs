use bstr::{BString, ByteSlice};
use grove_hash::ObjectId;
use grove_object::{Blob, Commit, Object, ObjectType, Tag, Tree};
use grove_ref::{Expected, RefName, Reference};
use grove_utils::Signature;
use tracing::debug;

use crate::{RepoError, Repository};

/// Annotated tags pointing at annotated tags are followed at most this far.
const MAX_PEEL_DEPTH: usize = 32;

fn wrong_type(oid: ObjectId, expected: ObjectType, actual: ObjectType) -> RepoError {
    RepoError::WrongObjectType {
        oid,
        expected: expected.as_str(),
        actual: actual.as_str(),
    }
}

impl Repository {
    pub fn find_object(&self, oid: &ObjectId) -> Result<Object, RepoError> {
        Ok(self.odb.read(oid)?)
    }

    pub fn find_commit(&self, oid: &ObjectId) -> Result<Commit, RepoError> {
        match self.odb.read(oid)? {
            Object::Commit(commit) => Ok(commit),
            other => Err(wrong_type(*oid, ObjectType::Commit, other.object_type())),
        }
    }

    pub fn find_tree(&self, oid: &ObjectId) -> Result<Tree, RepoError> {
        match self.odb.read(oid)? {
            Object::Tree(tree) => Ok(tree),
            other => Err(wrong_type(*oid, ObjectType::Tree, other.object_type())),
        }
    }

    pub fn find_blob(&self, oid: &ObjectId) -> Result<Blob, RepoError> {
        match self.odb.read(oid)? {
            Object::Blob(blob) => Ok(blob),
            other => Err(wrong_type(*oid, ObjectType::Blob, other.object_type())),
        }
    }

    pub fn find_tag(&self, oid: &ObjectId) -> Result<Tag, RepoError> {
        match self.odb.read(oid)? {
            Object::Tag(tag) => Ok(tag),
            other => Err(wrong_type(*oid, ObjectType::Tag, other.object_type())),
        }
    }

    pub(crate) fn expect_kind(&self, oid: &ObjectId, kind: ObjectType) -> Result<(), RepoError> {
        let actual = self.odb.read_header(oid)?.kind;
        if actual != kind {
            return Err(wrong_type(*oid, kind, actual));
        }
        Ok(())
    }

    /// Follow annotated tags from `oid` to the first object that is not a
    /// tag.
    pub fn peel(&self, oid: &ObjectId) -> Result<(ObjectId, ObjectType), RepoError> {
        let mut current = *oid;
        for _ in 0..MAX_PEEL_DEPTH {
            let kind = self.odb.read_header(&current)?.kind;
            if kind != ObjectType::Tag {
                return Ok((current, kind));
            }
            current = self.find_tag(&current)?.target;
        }
        Err(RepoError::PeelTooDeep(*oid))
    }

    /// Peel tags, then require a commit.
    pub fn peel_to_commit(&self, oid: &ObjectId) -> Result<ObjectId, RepoError> {
        match self.peel(oid)? {
            (commit, ObjectType::Commit) => Ok(commit),
            (other, kind) => Err(wrong_type(other, ObjectType::Commit, kind)),
        }
    }

    /// The tree of a commit (through tags), or `oid` itself if it is a tree.
    pub fn peel_to_tree(&self, oid: &ObjectId) -> Result<ObjectId, RepoError> {
        match self.peel(oid)? {
            (tree, ObjectType::Tree) => Ok(tree),
            (commit, ObjectType::Commit) => Ok(self.find_commit(&commit)?.tree),
            (other, kind) => Err(wrong_type(other, ObjectType::Tree, kind)),
        }
    }

    pub fn head_commit(&self) -> Result<Commit, RepoError> {
        self.find_commit(&self.head_oid()?)
    }

    pub fn head_tree(&self) -> Result<ObjectId, RepoError> {
        Ok(self.head_commit()?.tree)
    }

    /// Write a commit object and, when `update_ref` names a ref, advance it.
    ///
    /// The ref update is a compare-and-swap against the first parent: the
    /// ref must currently point at `parents[0]`, or must not exist for a
    /// root commit. A symbolic `update_ref` such as `HEAD` moves the branch
    /// it points at.
    pub fn commit(
        &self,
        tree: &ObjectId,
        parents: &[ObjectId],
        author: &Signature,
        committer: &Signature,
        message: &str,
        update_ref: Option<&str>,
    ) -> Result<ObjectId, RepoError> {
        self.expect_kind(tree, ObjectType::Tree)?;
        for parent in parents {
            self.expect_kind(parent, ObjectType::Commit)?;
        }

        let commit = Commit {
            tree: *tree,
            parents: parents.to_vec(),
            author: author.clone(),
            committer: committer.clone(),
            encoding: None,
            signature: None,
            extra_headers: Vec::new(),
            message: BString::from(message),
        };
        let summary = commit.summary();
        let oid = self.odb.write(&Object::Commit(commit))?;
        debug!(%oid, parents = parents.len(), "wrote commit");

        if let Some(name) = update_ref {
            let refname = RefName::new(name)?;
            let expected = match parents.first() {
                Some(first) => Expected::Value(*first),
                None => Expected::MustNotExist,
            };
            let kind = match parents.len() {
                0 => "commit (initial)",
                1 => "commit",
                _ => "commit (merge)",
            };
            let log = format!("{kind}: {}", summary.to_str_lossy());
            self.refs.update_expected(&refname, oid, expected, &log)?;
        }
        Ok(oid)
    }

    /// Resolve a full ref name, or a short name looked up the way git does:
    /// as given, then under `refs/`, `refs/tags/`, `refs/heads/` and
    /// `refs/remotes/`.
    pub fn resolve_reference(&self, name: &str) -> Result<Reference, RepoError> {
        let candidates = [
            name.to_owned(),
            format!("refs/{name}"),
            format!("refs/tags/{name}"),
            format!("refs/heads/{name}"),
            format!("refs/remotes/{name}"),
        ];
        for candidate in candidates {
            let Ok(refname) = RefName::new(candidate) else {
                continue;
            };
            if let Some(reference) = self.refs.find(&refname)? {
                return Ok(reference);
            }
        }
        Err(grove_ref::RefError::NotFound(name.to_owned()).into())
    }

    /// A commit id from a full hex id, a unique hex prefix, or a ref name,
    /// peeling tags.
    pub fn resolve_commitish(&self, spec: &str) -> Result<ObjectId, RepoError> {
        if let Ok(reference) = self.resolve_reference(spec) {
            let oid = self.refs.resolve(&reference)?;
            return self.peel_to_commit(&oid);
        }
        let oid = self.odb.resolve_prefix(spec)?;
        self.peel_to_commit(&oid)
    }
}
