//! Notes: blobs attached to other objects without changing them, stored in
//! a commit history under `refs/notes/commits`. Each notes tree maps the hex
//! id of the annotated object to the note blob. Trees written by other
//! tools may split the name into fan-out directories (`ab/cdef...`); those
//! are read, and rewritten flat on the next change.

use std::collections::BTreeMap;

use bstr::{BString, ByteSlice};
use grove_hash::ObjectId;
use grove_object::{Blob, Commit, FileMode, Object, Tree, TreeBuilder};
use grove_ref::{Expected, RefName};
use grove_utils::Signature;
use tracing::debug;

use crate::{RepoError, Repository};

pub const DEFAULT_NOTES_REF: &str = "refs/notes/commits";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// The annotated object.
    pub target: ObjectId,
    /// The blob holding the note text.
    pub blob: ObjectId,
    pub message: BString,
    /// Author and committer of the notes commit that last touched the ref.
    pub author: Signature,
    pub committer: Signature,
}

/// Current state of the notes ref.
struct NotesHead {
    commit: Option<(ObjectId, Commit)>,
    notes: BTreeMap<ObjectId, ObjectId>,
}

impl Repository {
    /// `core.notesRef`, or `refs/notes/commits`.
    pub fn notes_ref(&self) -> Result<RefName, RepoError> {
        let name = self
            .config
            .get_string("core.notesref")?
            .unwrap_or_else(|| DEFAULT_NOTES_REF.to_owned());
        Ok(RefName::new(name)?)
    }

    fn notes_head(&self, notes_ref: &RefName) -> Result<NotesHead, RepoError> {
        let Some(tip) = self.refs.resolve_name(notes_ref)? else {
            return Ok(NotesHead {
                commit: None,
                notes: BTreeMap::new(),
            });
        };
        let commit = self.find_commit(&tip)?;
        let mut notes = BTreeMap::new();
        self.collect_notes(&self.find_tree(&commit.tree)?, String::new(), &mut notes)?;
        Ok(NotesHead {
            commit: Some((tip, commit)),
            notes,
        })
    }

    fn collect_notes(
        &self,
        tree: &Tree,
        prefix: String,
        out: &mut BTreeMap<ObjectId, ObjectId>,
    ) -> Result<(), RepoError> {
        let hex_len = self.hash_algo.hex_len();
        for entry in tree.iter() {
            let Ok(name) = entry.name.to_str() else {
                continue;
            };
            if !name.bytes().all(|b| b.is_ascii_hexdigit()) {
                continue;
            }
            let full = format!("{prefix}{name}");
            if entry.mode.is_tree() && full.len() < hex_len {
                self.collect_notes(&self.find_tree(&entry.oid)?, full, out)?;
            } else if entry.mode.is_blob() && full.len() == hex_len {
                if let Ok(target) = ObjectId::from_hex(&full) {
                    out.insert(target, entry.oid);
                }
            }
        }
        Ok(())
    }

    fn write_notes(
        &self,
        notes_ref: &RefName,
        head: &NotesHead,
        notes: &BTreeMap<ObjectId, ObjectId>,
        author: &Signature,
        message: &str,
    ) -> Result<ObjectId, RepoError> {
        let mut builder = TreeBuilder::new();
        for (target, blob) in notes {
            builder.insert(target.to_hex(), FileMode::Regular, *blob)?;
        }
        let tree = self.odb.write(&Object::Tree(builder.build()))?;

        let parents: Vec<ObjectId> = head.commit.iter().map(|(oid, _)| *oid).collect();
        let commit = Commit {
            tree,
            parents: parents.clone(),
            author: author.clone(),
            committer: author.clone(),
            encoding: None,
            signature: None,
            extra_headers: Vec::new(),
            message: BString::from(format!("{message}\n")),
        };
        let oid = self.odb.write(&Object::Commit(commit))?;
        let expected = match parents.first() {
            Some(parent) => Expected::Value(*parent),
            None => Expected::MustNotExist,
        };
        self.refs
            .update_expected(notes_ref, oid, expected, &format!("notes: {message}"))?;
        Ok(oid)
    }

    /// Attach `note` to `target`. Returns the note blob's id. An existing
    /// note is replaced only with `force`.
    pub fn create_note(
        &self,
        target: &ObjectId,
        note: &str,
        author: &Signature,
        force: bool,
    ) -> Result<ObjectId, RepoError> {
        let notes_ref = self.notes_ref()?;
        let head = self.notes_head(&notes_ref)?;
        if !force && head.notes.contains_key(target) {
            return Err(RepoError::NoteExists(*target));
        }

        let blob = self.odb.write(&Object::Blob(Blob::new(note.as_bytes())))?;
        let mut notes = head.notes.clone();
        notes.insert(*target, blob);
        self.write_notes(&notes_ref, &head, &notes, author, "Notes added by 'grove notes add'")?;
        debug!(%target, %blob, "added note");
        Ok(blob)
    }

    pub fn note(&self, target: &ObjectId) -> Result<Note, RepoError> {
        let notes_ref = self.notes_ref()?;
        let head = self.notes_head(&notes_ref)?;
        let (Some(blob), Some((_, commit))) = (head.notes.get(target), head.commit) else {
            return Err(RepoError::NoteNotFound(*target));
        };
        let message = BString::from(self.find_blob(blob)?.data);
        Ok(Note {
            target: *target,
            blob: *blob,
            message,
            author: commit.author,
            committer: commit.committer,
        })
    }

    /// `(annotated object, note blob)` pairs, ordered by annotated object.
    pub fn notes(&self) -> Result<Vec<(ObjectId, ObjectId)>, RepoError> {
        let notes_ref = self.notes_ref()?;
        Ok(self.notes_head(&notes_ref)?.notes.into_iter().collect())
    }

    pub fn remove_note(&self, target: &ObjectId, author: &Signature) -> Result<(), RepoError> {
        let notes_ref = self.notes_ref()?;
        let head = self.notes_head(&notes_ref)?;
        let mut notes = head.notes.clone();
        if notes.remove(target).is_none() {
            return Err(RepoError::NoteNotFound(*target));
        }
        self.write_notes(&notes_ref, &head, &notes, author, "Notes removed by 'grove notes remove'")?;
        debug!(%target, "removed note");
        Ok(())
    }
}
