use bstr::BString;
use grove_hash::ObjectId;
use grove_object::{Object, Tag};
use grove_ref::{Expected, RefFilter, RefName};
use grove_utils::Signature;
use tracing::debug;

use crate::{RepoError, Repository};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    pub name: RefName,
    /// What the ref points at: the tag object for an annotated tag.
    pub target: ObjectId,
    /// The first non-tag object reached from `target`.
    pub peeled: ObjectId,
    pub annotated: bool,
}

impl TagRef {
    pub fn short_name(&self) -> &str {
        self.name.short_name()
    }
}

impl Repository {
    /// `refs/tags/<name>` pointing straight at `target`.
    pub fn create_lightweight_tag(&self, name: &str, target: ObjectId, force: bool) -> Result<TagRef, RepoError> {
        let refname = RefName::tag(name)?;
        let (peeled, _) = self.peel(&target)?;
        self.refs.create(&refname, target, force, &format!("tag: tagging {target}"))?;
        debug!(tag = %refname, %target, "created lightweight tag");
        Ok(TagRef {
            name: refname,
            target,
            peeled,
            annotated: target != peeled,
        })
    }

    /// Write a tag object for `target` and point `refs/tags/<name>` at it.
    /// Returns the tag object's id.
    pub fn create_annotated_tag(
        &self,
        name: &str,
        target: ObjectId,
        tagger: &Signature,
        message: &str,
        force: bool,
    ) -> Result<ObjectId, RepoError> {
        let refname = RefName::tag(name)?;
        if !force && self.refs.find(&refname)?.is_some() {
            return Err(grove_ref::RefError::AlreadyExists(refname.to_string()).into());
        }
        let target_type = self.odb.read_header(&target)?.kind;

        let mut message = BString::from(message);
        if !message.is_empty() && !message.ends_with(b"\n") {
            message.push(b'\n');
        }
        let tag = Tag {
            target,
            target_type,
            name: BString::from(name),
            tagger: Some(tagger.clone()),
            message,
            signature: None,
        };
        let oid = self.odb.write(&Object::Tag(tag))?;
        let expected = if force { Expected::Any } else { Expected::MustNotExist };
        self.refs
            .update_expected(&refname, oid, expected, &format!("tag: tagging {target}"))?;
        debug!(tag = %refname, %oid, %target, "created annotated tag");
        Ok(oid)
    }

    pub fn find_tag_ref(&self, name: &str) -> Result<TagRef, RepoError> {
        let refname = RefName::tag(name)?;
        let reference = self
            .refs
            .find(&refname)?
            .ok_or_else(|| RepoError::TagNotFound(name.to_owned()))?;
        let target = self.refs.resolve(&reference)?;
        self.tag_ref(refname, target, reference.peeled())
    }

    fn tag_ref(&self, name: RefName, target: ObjectId, peeled: Option<ObjectId>) -> Result<TagRef, RepoError> {
        let peeled = match peeled {
            Some(p) => p,
            None => self.peel(&target)?.0,
        };
        Ok(TagRef {
            name,
            target,
            peeled,
            annotated: target != peeled,
        })
    }

    /// Every tag, sorted by name. Tags recorded in `packed-refs` with a
    /// peeled value are not re-read from the object database.
    pub fn tags(&self) -> Result<Vec<TagRef>, RepoError> {
        let mut out = Vec::new();
        for reference in self.refs.list(RefFilter::ALL, Some("refs/tags/"))? {
            let Ok(target) = self.refs.resolve(&reference) else {
                continue;
            };
            out.push(self.tag_ref(reference.name().clone(), target, reference.peeled())?);
        }
        Ok(out)
    }

    pub fn delete_tag(&self, name: &str) -> Result<(), RepoError> {
        let refname = RefName::tag(name)?;
        if self.refs.find(&refname)?.is_none() {
            return Err(RepoError::TagNotFound(name.to_owned()));
        }
        self.refs.delete_checked(&refname, Expected::Any)?;
        Ok(())
    }
}
