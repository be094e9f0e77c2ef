//! Several reference changes applied all-or-nothing.
//!
//! [`RefTransaction::commit`] locks every ref (in name order), verifies every
//! expectation, fills every lock, and only then renames them into place. Any
//! failure before that last step drops the locks, which removes them and
//! leaves every ref untouched.

use std::collections::HashSet;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use grove_hash::ObjectId;
use grove_utils::lockfile::LockFile;
use grove_utils::Signature;
use tracing::debug;

use crate::error::RefError;
use crate::name::RefName;
use crate::packed;
use crate::reflog;
use crate::store::{Expected, FilesRefStore};
use crate::{loose, Reference};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefUpdateAction {
    /// Fails if the ref exists.
    Create { target: ObjectId },
    /// `expected: None` skips the compare.
    Update { new: ObjectId, expected: Option<ObjectId> },
    Delete { expected: Option<ObjectId> },
    SetSymbolic { target: RefName },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub name: RefName,
    pub action: RefUpdateAction,
    pub message: String,
}

impl RefUpdate {
    fn expected(&self) -> Expected {
        match &self.action {
            RefUpdateAction::Create { .. } => Expected::MustNotExist,
            RefUpdateAction::Update { expected, .. } | RefUpdateAction::Delete { expected } => {
                (*expected).into()
            }
            RefUpdateAction::SetSymbolic { .. } => Expected::Any,
        }
    }

    fn new_content(&self) -> Option<Reference> {
        match &self.action {
            RefUpdateAction::Create { target } | RefUpdateAction::Update { new: target, .. } => {
                Some(Reference::direct(self.name.clone(), *target))
            }
            RefUpdateAction::SetSymbolic { target } => Some(Reference::Symbolic {
                name: self.name.clone(),
                target: target.clone(),
            }),
            RefUpdateAction::Delete { .. } => None,
        }
    }
}

/// Builder for an atomic batch. Names are taken literally; a symbolic ref
/// in the batch is rewritten itself rather than followed.
#[must_use = "a transaction does nothing until committed"]
pub struct RefTransaction<'a> {
    store: &'a FilesRefStore,
    updates: Vec<RefUpdate>,
    committer: Option<Signature>,
}

struct Prepared {
    update: RefUpdate,
    lock: LockFile,
    old: Option<ObjectId>,
}

impl<'a> RefTransaction<'a> {
    pub fn new(store: &'a FilesRefStore) -> Self {
        Self {
            store,
            updates: Vec::new(),
            committer: None,
        }
    }

    /// Reflog identity for this batch instead of the store's.
    pub fn with_committer(mut self, committer: Signature) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn push(&mut self, update: RefUpdate) -> &mut Self {
        self.updates.push(update);
        self
    }

    pub fn create(&mut self, name: RefName, target: ObjectId, message: &str) -> &mut Self {
        self.push(RefUpdate {
            name,
            action: RefUpdateAction::Create { target },
            message: message.to_owned(),
        })
    }

    pub fn update(&mut self, name: RefName, new: ObjectId, expected: Option<ObjectId>, message: &str) -> &mut Self {
        self.push(RefUpdate {
            name,
            action: RefUpdateAction::Update { new, expected },
            message: message.to_owned(),
        })
    }

    pub fn delete(&mut self, name: RefName, expected: Option<ObjectId>, message: &str) -> &mut Self {
        self.push(RefUpdate {
            name,
            action: RefUpdateAction::Delete { expected },
            message: message.to_owned(),
        })
    }

    pub fn set_symbolic(&mut self, name: RefName, target: RefName, message: &str) -> &mut Self {
        self.push(RefUpdate {
            name,
            action: RefUpdateAction::SetSymbolic { target },
            message: message.to_owned(),
        })
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn updates(&self) -> &[RefUpdate] {
        &self.updates
    }

    pub fn commit(self) -> Result<(), RefError> {
        if self.updates.is_empty() {
            return Ok(());
        }
        let store = self.store;
        let git_dir = store.git_dir();

        let mut seen = HashSet::new();
        for u in &self.updates {
            if !seen.insert(u.name.clone()) {
                return Err(RefError::DuplicateInTransaction(u.name.to_string()));
            }
        }

        let mut updates = self.updates;
        updates.sort_by(|a, b| a.name.cmp(&b.name));
        let mutexes: Vec<Arc<Mutex<()>>> = updates.iter().map(|u| store.ref_mutex(&u.name)).collect();
        let _guards: Vec<MutexGuard<'_, ()>> = mutexes
            .iter()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
            .collect();

        // Lock and verify everything before touching anything.
        let packed_now = store.packed_refs()?;
        let deleted: Vec<RefName> = updates
            .iter()
            .filter(|u| matches!(u.action, RefUpdateAction::Delete { .. }))
            .map(|u| u.name.clone())
            .collect();
        let mut prepared = Vec::with_capacity(updates.len());
        for update in updates {
            if !matches!(update.action, RefUpdateAction::Delete { .. }) {
                store.check_dir_conflict(&update.name, &packed_now, None)?;
            }
            let lock = LockFile::acquire(loose::path(git_dir, &update.name))?;
            let current = store.current(&update.name)?;
            if matches!(update.action, RefUpdateAction::Delete { .. }) && !current.exists {
                return Err(RefError::NotFound(update.name.to_string()));
            }
            FilesRefStore::verify(&update.name, update.expected(), &current)?;
            prepared.push(Prepared {
                update,
                lock,
                old: current.value,
            });
        }

        for p in &mut prepared {
            if let Some(content) = p.update.new_content() {
                p.lock.write_all(loose::render(&content).as_bytes())?;
            }
        }

        // Packed entries of deleted refs go first, while the loose locks
        // still keep other writers out.
        let packed_guard = store.lock_packed();
        let packed_lock = if deleted.iter().any(|n| packed_now.find(n).is_some()) {
            let mut lock = LockFile::acquire(packed::path(git_dir))?;
            let mut packed = store.packed_refs()?;
            for name in &deleted {
                packed.remove(name);
            }
            packed.write_into(&mut lock)?;
            Some(lock)
        } else {
            None
        };
        if let Some(lock) = packed_lock {
            lock.commit()?;
        }
        drop(packed_guard);

        let committer = match self.committer {
            Some(sig) => sig,
            None => store.committer()?,
        };
        let count = prepared.len();
        for Prepared { update, lock, old } in prepared {
            match &update.action {
                RefUpdateAction::Delete { .. } => {
                    loose::remove(git_dir, &update.name)?;
                    lock.rollback()?;
                    store.prune_after_unlock(&update.name);
                    reflog::delete(git_dir, &update.name)?;
                }
                RefUpdateAction::Create { target } | RefUpdateAction::Update { new: target, .. } => {
                    lock.commit()?;
                    let old = old.unwrap_or_else(|| target.algorithm().null_oid());
                    store.log(&update.name, old, *target, &update.message, Some(&committer))?;
                    if store.head_points_at(&update.name)? {
                        store.log(&RefName::head(), old, *target, &update.message, Some(&committer))?;
                    }
                }
                RefUpdateAction::SetSymbolic { .. } => {
                    lock.commit()?;
                }
            }
        }
        debug!(count, "committed ref transaction");
        Ok(())
    }
}

impl FilesRefStore {
    pub fn transaction(&self) -> RefTransaction<'_> {
        RefTransaction::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_hash::HashAlgorithm;

    fn oid(n: u8) -> ObjectId {
        ObjectId::from_bytes(&[n; 20], HashAlgorithm::Sha1).unwrap()
    }

    #[test]
    fn duplicate_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesRefStore::new(dir.path());
        let name = RefName::branch("x").unwrap();
        let mut tx = store.transaction();
        tx.create(name.clone(), oid(1), "").update(name, oid(2), None, "");
        let err = tx.commit().unwrap_err();
        assert!(matches!(err, RefError::DuplicateInTransaction(_)));
    }

    #[test]
    fn empty_transaction_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesRefStore::new(dir.path());
        let tx = store.transaction();
        assert!(tx.is_empty());
        tx.commit().unwrap();
    }

    #[test]
    fn delete_and_recreate_below() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesRefStore::new(dir.path());
        let a = RefName::branch("a").unwrap();
        let ab = RefName::branch("a/b").unwrap();
        store.create(&a, oid(1), false, "").unwrap();

        let mut tx = store.transaction();
        tx.delete(a.clone(), Some(oid(1)), "").create(ab.clone(), oid(2), "");
        // `a` is still a file while `a/b` is being locked.
        let err = tx.commit().unwrap_err();
        assert!(matches!(err, RefError::DirectoryConflict { .. }));
        assert!(!dir.path().join("refs/heads/a.lock").exists());
        assert_eq!(store.resolve_name(&a).unwrap(), Some(oid(1)));
        assert!(store.find(&ab).unwrap().is_none());
    }
}
