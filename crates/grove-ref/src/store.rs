//! Reference storage in a git directory.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bstr::BString;
use grove_hash::ObjectId;
use grove_utils::lockfile::LockFile;
use grove_utils::Signature;
use tracing::{debug, trace};

use crate::error::RefError;
use crate::name::RefName;
use crate::packed::{self, PackedRefs};
use crate::reflog::{self, ReflogEntry, ReflogIter, ReflogMode};
use crate::{loose, RefFilter, Reference, MAX_SYMREF_DEPTH};

/// What the current value must be for a write to go ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// No check.
    Any,
    /// The ref must not exist.
    MustNotExist,
    /// The ref must currently resolve to this id.
    Value(ObjectId),
}

impl From<Option<ObjectId>> for Expected {
    /// `None` is no check; a null id means the ref must not exist.
    fn from(value: Option<ObjectId>) -> Self {
        match value {
            None => Expected::Any,
            Some(oid) if oid.is_null() => Expected::MustNotExist,
            Some(oid) => Expected::Value(oid),
        }
    }
}

#[derive(Debug, Clone)]
enum Identity {
    /// Used verbatim, date included.
    Fixed(Signature),
    /// Stamped with the current time on every write.
    Named { name: BString, email: BString },
}

/// Loose refs, `packed-refs` and reflogs of one git directory.
///
/// Writers to the same name are serialized in-process by a mutex table and
/// across processes by `<ref>.lock`.
#[derive(Debug)]
pub struct FilesRefStore {
    git_dir: PathBuf,
    identity: Identity,
    reflog_mode: ReflogMode,
    ref_locks: Mutex<HashMap<RefName, Arc<Mutex<()>>>>,
    packed_lock: Mutex<()>,
}

/// Current state of one ref as seen under its lock.
pub(crate) struct Current {
    pub exists: bool,
    /// What the ref resolves to, `None` if absent or unborn.
    pub value: Option<ObjectId>,
}

impl FilesRefStore {
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
            identity: Identity::Named {
                name: BString::from("unknown"),
                email: BString::from("unknown"),
            },
            reflog_mode: ReflogMode::default(),
            ref_locks: Mutex::new(HashMap::new()),
            packed_lock: Mutex::new(()),
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Reflog identity taken from `user.name` / `user.email`.
    pub fn set_identity(&mut self, name: impl Into<BString>, email: impl Into<BString>) {
        self.identity = Identity::Named {
            name: name.into(),
            email: email.into(),
        };
    }

    /// Use exactly this signature (including its date) for reflog entries.
    pub fn set_committer(&mut self, committer: Signature) {
        self.identity = Identity::Fixed(committer);
    }

    pub fn set_reflog_mode(&mut self, mode: ReflogMode) {
        self.reflog_mode = mode;
    }

    pub fn reflog_mode(&self) -> ReflogMode {
        self.reflog_mode
    }

    pub(crate) fn committer(&self) -> Result<Signature, RefError> {
        match &self.identity {
            Identity::Fixed(sig) => Ok(sig.clone()),
            Identity::Named { name, email } => Ok(Signature::now(name.clone(), email.clone())?),
        }
    }

    pub(crate) fn ref_mutex(&self, name: &RefName) -> Arc<Mutex<()>> {
        let mut table = self.ref_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(table.entry(name.clone()).or_default())
    }

    pub(crate) fn lock_packed(&self) -> MutexGuard<'_, ()> {
        self.packed_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn packed_refs(&self) -> Result<PackedRefs, RefError> {
        PackedRefs::load(&self.git_dir)
    }

    // ---- reading --------------------------------------------------------

    /// The ref as stored, loose file first, then `packed-refs`.
    pub fn find(&self, name: &RefName) -> Result<Option<Reference>, RefError> {
        if let Some(found) = loose::read(&self.git_dir, name)? {
            return Ok(Some(found));
        }
        Ok(self.packed_refs()?.find(name).map(|p| Reference::Direct {
            name: p.name.clone(),
            target: p.oid,
            peeled: p.peeled,
        }))
    }

    pub fn lookup(&self, name: &RefName) -> Result<Reference, RefError> {
        self.find(name)?
            .ok_or_else(|| RefError::NotFound(name.to_string()))
    }

    pub fn lookup_str(&self, name: &str) -> Result<Reference, RefError> {
        self.lookup(&RefName::new(name)?)
    }

    /// Follow symbolic links from `name` to the first name that is direct
    /// or missing.
    pub(crate) fn follow(&self, name: &RefName) -> Result<(RefName, Option<ObjectId>), RefError> {
        let mut current = name.clone();
        let mut visited: Vec<RefName> = Vec::new();
        for _ in 0..=MAX_SYMREF_DEPTH {
            match self.find(&current)? {
                Some(Reference::Direct { target, .. }) => return Ok((current, Some(target))),
                None => return Ok((current, None)),
                Some(Reference::Symbolic { target, .. }) => {
                    visited.push(current);
                    if visited.contains(&target) {
                        return Err(RefError::SymrefCycle(name.to_string()));
                    }
                    current = target;
                }
            }
        }
        Err(RefError::TooDeep(name.to_string()))
    }

    /// The object id at the end of the chain. A dangling symbolic ref is
    /// `NotFound`.
    pub fn resolve(&self, reference: &Reference) -> Result<ObjectId, RefError> {
        match reference {
            Reference::Direct { target, .. } => Ok(*target),
            Reference::Symbolic { name, .. } => match self.follow(name)? {
                (_, Some(oid)) => Ok(oid),
                (last, None) => Err(RefError::NotFound(last.to_string())),
            },
        }
    }

    /// `None` when the name, or the end of its chain, does not exist.
    pub fn resolve_name(&self, name: &RefName) -> Result<Option<ObjectId>, RefError> {
        self.follow(name).map(|(_, oid)| oid)
    }

    pub(crate) fn current(&self, name: &RefName) -> Result<Current, RefError> {
        match self.find(name)? {
            None => Ok(Current {
                exists: false,
                value: None,
            }),
            Some(Reference::Direct { target, .. }) => Ok(Current {
                exists: true,
                value: Some(target),
            }),
            Some(Reference::Symbolic { target, .. }) => Ok(Current {
                exists: true,
                value: self.resolve_name(&target)?,
            }),
        }
    }

    /// Every ref under `refs/` matching `filter`, optionally restricted to
    /// names starting with `prefix`, sorted by name.
    pub fn list(&self, filter: RefFilter, prefix: Option<&str>) -> Result<Vec<Reference>, RefError> {
        let mut out: BTreeMap<RefName, Option<Reference>> = BTreeMap::new();
        for name in loose::enumerate(&self.git_dir, prefix)? {
            // Raced with a delete.
            let Some(reference) = loose::read(&self.git_dir, &name)? else {
                continue;
            };
            let wanted = if reference.is_symbolic() {
                filter.contains(RefFilter::SYMBOLIC)
            } else {
                filter.contains(RefFilter::DIRECT)
            };
            // An unwanted loose ref still shadows its packed twin.
            out.insert(name, wanted.then_some(reference));
        }
        if filter.contains(RefFilter::PACKED) {
            for p in self.packed_refs()?.iter() {
                if prefix.is_some_and(|pre| !p.name.as_str().starts_with(pre)) {
                    continue;
                }
                out.entry(p.name.clone()).or_insert_with(|| {
                    Some(Reference::Direct {
                        name: p.name.clone(),
                        target: p.oid,
                        peeled: p.peeled,
                    })
                });
            }
        }
        Ok(out.into_values().flatten().collect())
    }

    /// Names of every ref, as [`list`](Self::list) with all storage forms.
    pub fn names(&self, prefix: Option<&str>) -> Result<Vec<RefName>, RefError> {
        Ok(self
            .list(RefFilter::ALL, prefix)?
            .into_iter()
            .map(|r| r.name().clone())
            .collect())
    }

    // ---- checks ---------------------------------------------------------

    /// A ref cannot be created where a parent path is a ref, or where refs
    /// live below it. `ignore` is a ref about to disappear.
    pub(crate) fn check_dir_conflict(
        &self,
        name: &RefName,
        packed: &PackedRefs,
        ignore: Option<&RefName>,
    ) -> Result<(), RefError> {
        let s = name.as_str();
        let conflict = |other: &str| RefError::DirectoryConflict {
            name: s.to_owned(),
            conflict: other.to_owned(),
        };
        for (i, _) in s.match_indices('/').skip(1) {
            let parent = &s[..i];
            if ignore.is_some_and(|ig| ig.as_str() == parent) {
                continue;
            }
            let packed_hit = RefName::new(parent).is_ok_and(|p| packed.find(&p).is_some());
            if packed_hit || self.git_dir.join(parent).is_file() {
                return Err(conflict(parent));
            }
        }

        let below = format!("{s}/");
        let dir = loose::path(&self.git_dir, name);
        let loose_children = if dir.is_dir() {
            loose::enumerate(&self.git_dir, Some(&below))?
        } else {
            Vec::new()
        };
        let blocking = loose_children
            .into_iter()
            .chain(packed.iter().filter(|p| p.name.as_str().starts_with(&below)).map(|p| p.name.clone()))
            .find(|child| Some(child) != ignore);
        if let Some(child) = blocking {
            return Err(conflict(child.as_str()));
        }

        if dir.is_dir() && !loose::dir_has_refs(&dir) {
            trace!(path = %dir.display(), "removing leftover ref directory");
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    pub(crate) fn verify(name: &RefName, expected: Expected, current: &Current) -> Result<(), RefError> {
        match expected {
            Expected::Any => Ok(()),
            Expected::MustNotExist if current.exists => Err(RefError::AlreadyExists(name.to_string())),
            Expected::MustNotExist => Ok(()),
            Expected::Value(want) if current.value != Some(want) => Err(RefError::CasFailed {
                name: name.to_string(),
                expected: Some(want),
                actual: current.value,
            }),
            Expected::Value(_) => Ok(()),
        }
    }

    // ---- writing --------------------------------------------------------

    /// Point `name` at `target`. Fails with `AlreadyExists` if `name`
    /// exists and `force` is off.
    pub fn create(&self, name: &RefName, target: ObjectId, force: bool, message: &str) -> Result<Reference, RefError> {
        let expected = if force { Expected::Any } else { Expected::MustNotExist };
        self.write_direct(name, target, expected, message, false)
    }

    /// Make `name` a symbolic ref to `target`.
    pub fn create_symbolic(
        &self,
        name: &RefName,
        target: &RefName,
        force: bool,
        message: &str,
    ) -> Result<Reference, RefError> {
        let mutex = self.ref_mutex(name);
        let _guard = mutex.lock().unwrap_or_else(PoisonError::into_inner);
        self.check_dir_conflict(name, &self.packed_refs()?, None)?;
        let mut lock = LockFile::acquire(loose::path(&self.git_dir, name))?;
        let current = self.current(name)?;
        if !force {
            Self::verify(name, Expected::MustNotExist, &current)?;
        }

        let reference = Reference::Symbolic {
            name: name.clone(),
            target: target.clone(),
        };
        lock.write_all(loose::render(&reference).as_bytes())?;
        lock.commit()?;
        debug!(name = %name, target = %target, "wrote symbolic ref");

        // The resolved value may change, e.g. HEAD switching branches. A
        // dangling or cyclic target leaves nothing to log.
        let new_value = self.resolve_name(target).ok().flatten();
        if let Some(new) = new_value.filter(|n| current.value != Some(*n)) {
            let old = current.value.unwrap_or_else(|| new.algorithm().null_oid());
            self.log(name, old, new, message, None)?;
        }
        Ok(reference)
    }

    /// Compare-and-swap `name` (following symbolic refs) to `new_oid`.
    ///
    /// With `expected_old` set the current value must equal it; a null id
    /// demands that the ref does not exist yet. On success exactly one entry
    /// is appended to the final ref's log, plus one to `name`'s log when it
    /// was reached through a symbolic ref.
    pub fn update(
        &self,
        name: &RefName,
        new_oid: ObjectId,
        expected_old: Option<ObjectId>,
        message: &str,
    ) -> Result<Reference, RefError> {
        self.write_direct(name, new_oid, expected_old.into(), message, true)
    }

    /// [`update`](Self::update) with an explicit [`Expected`].
    pub fn update_expected(
        &self,
        name: &RefName,
        new_oid: ObjectId,
        expected: Expected,
        message: &str,
    ) -> Result<Reference, RefError> {
        self.write_direct(name, new_oid, expected, message, true)
    }

    fn write_direct(
        &self,
        name: &RefName,
        new_oid: ObjectId,
        expected: Expected,
        message: &str,
        deref: bool,
    ) -> Result<Reference, RefError> {
        let target = if deref { self.follow(name)?.0 } else { name.clone() };

        let mutex = self.ref_mutex(&target);
        let _guard = mutex.lock().unwrap_or_else(PoisonError::into_inner);
        self.check_dir_conflict(&target, &self.packed_refs()?, None)?;
        let mut lock = LockFile::acquire(loose::path(&self.git_dir, &target))?;

        let current = self.current(&target)?;
        Self::verify(&target, expected, &current)?;

        let reference = Reference::direct(target.clone(), new_oid);
        lock.write_all(loose::render(&reference).as_bytes())?;
        lock.commit()?;
        debug!(name = %target, new = %new_oid, "updated ref");

        let old = current.value.unwrap_or_else(|| new_oid.algorithm().null_oid());
        self.log(&target, old, new_oid, message, None)?;
        if target != *name {
            self.log(name, old, new_oid, message, None)?;
        } else if self.head_points_at(&target)? {
            self.log(&RefName::head(), old, new_oid, message, None)?;
        }
        Ok(reference)
    }

    /// Whether `HEAD` is a symbolic ref naming `name` directly.
    pub(crate) fn head_points_at(&self, name: &RefName) -> Result<bool, RefError> {
        if name.as_str() == crate::HEAD {
            return Ok(false);
        }
        Ok(matches!(
            loose::read(&self.git_dir, &RefName::head())?,
            Some(Reference::Symbolic { target, .. }) if target == *name
        ))
    }

    pub(crate) fn log(
        &self,
        name: &RefName,
        old: ObjectId,
        new: ObjectId,
        message: &str,
        committer: Option<&Signature>,
    ) -> Result<(), RefError> {
        let committer = match committer {
            Some(sig) => sig.clone(),
            None => self.committer()?,
        };
        let entry = ReflogEntry::new(old, new, committer, message);
        reflog::append(&self.git_dir, name, &entry, self.reflog_mode.should_create(name))
    }

    /// Remove `name` from loose storage, `packed-refs` and its reflog.
    /// Symbolic refs are removed themselves, not their targets.
    pub fn delete(&self, name: &RefName) -> Result<(), RefError> {
        self.delete_checked(name, Expected::Any)
    }

    /// [`delete`](Self::delete) guarded by a compare on the current value.
    pub fn delete_checked(&self, name: &RefName, expected: Expected) -> Result<(), RefError> {
        let mutex = self.ref_mutex(name);
        let _guard = mutex.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = LockFile::acquire(loose::path(&self.git_dir, name))?;

        let current = self.current(name)?;
        if !current.exists {
            return Err(RefError::NotFound(name.to_string()));
        }
        Self::verify(name, expected, &current)?;

        self.remove_packed(std::slice::from_ref(name))?;
        loose::remove(&self.git_dir, name)?;
        lock.rollback()?;
        self.prune_after_unlock(name);
        reflog::delete(&self.git_dir, name)?;
        debug!(name = %name, "deleted ref");
        Ok(())
    }

    /// A held lock keeps the ref's directory non-empty; tidy up once it is
    /// gone.
    pub(crate) fn prune_after_unlock(&self, name: &RefName) {
        loose::prune_empty_parents(&self.git_dir, &loose::path(&self.git_dir, name));
    }

    /// Drop `names` from `packed-refs`, rewriting it only if one was there.
    pub(crate) fn remove_packed(&self, names: &[RefName]) -> Result<(), RefError> {
        let _guard = self.lock_packed();
        let before = self.packed_refs()?;
        if !names.iter().any(|n| before.find(n).is_some()) {
            return Ok(());
        }
        let mut lock = LockFile::acquire(packed::path(&self.git_dir))?;
        // Re-read under the lock.
        let mut packed = self.packed_refs()?;
        for name in names {
            packed.remove(name);
        }
        packed.write_into(&mut lock)?;
        lock.commit()?;
        Ok(())
    }

    /// Move `old` to `new`, reflog included, then log the rename. When `HEAD`
    /// pointed at `old` it follows. Nothing changes if `new` exists and
    /// `force` is off.
    pub fn rename(&self, old: &RefName, new: &RefName, force: bool, message: &str) -> Result<Reference, RefError> {
        if old == new {
            return self.lookup(old);
        }
        let (first, second) = if old < new { (old, new) } else { (new, old) };
        let (m1, m2) = (self.ref_mutex(first), self.ref_mutex(second));
        let _g1 = m1.lock().unwrap_or_else(PoisonError::into_inner);
        let _g2 = m2.lock().unwrap_or_else(PoisonError::into_inner);

        let value = match self.find(old)? {
            None => return Err(RefError::NotFound(old.to_string())),
            Some(Reference::Symbolic { .. }) => {
                return Err(RefError::NotDirect {
                    name: old.to_string(),
                    what: "a symbolic ref",
                })
            }
            Some(Reference::Direct { target, .. }) => target,
        };
        let dest = self.current(new)?;
        if dest.exists && !force {
            return Err(RefError::AlreadyExists(new.to_string()));
        }
        let packed = self.packed_refs()?;
        self.check_dir_conflict(new, &packed, Some(old))?;

        let old_lock = LockFile::acquire(loose::path(&self.git_dir, old))?;
        if dest.exists {
            self.remove_packed(std::slice::from_ref(new))?;
            loose::remove(&self.git_dir, new)?;
            reflog::delete(&self.git_dir, new)?;
        }

        let parked = reflog::park(&self.git_dir, old)?;
        let removed = self
            .remove_packed(std::slice::from_ref(old))
            .and_then(|()| loose::remove(&self.git_dir, old).map(|_| ()));
        if let Err(err) = removed {
            if let Some(parked) = &parked {
                reflog::unpark(&self.git_dir, parked, old)?;
            }
            return Err(err);
        }
        old_lock.rollback()?;
        self.prune_after_unlock(old);

        let reference = match self.land_renamed(new, value, parked.as_deref(), message) {
            Ok(reference) => reference,
            Err(err) => {
                debug!(from = %old, to = %new, error = %err, "rename failed, restoring");
                if let Err(again) = self.restore_renamed(old, value, parked.as_deref()) {
                    debug!(name = %old, error = %again, "could not restore renamed ref");
                }
                return Err(err);
            }
        };

        if let Some(Reference::Symbolic { target, .. }) = loose::read(&self.git_dir, &RefName::head())? {
            if target == *old {
                let head = Reference::Symbolic {
                    name: RefName::head(),
                    target: new.clone(),
                };
                let mut head_lock = LockFile::acquire(loose::path(&self.git_dir, &RefName::head()))?;
                head_lock.write_all(loose::render(&head).as_bytes())?;
                head_lock.commit()?;
            }
        }
        debug!(from = %old, to = %new, "renamed ref");
        Ok(reference)
    }

    /// Second half of a rename: write `new` and hand it the parked log.
    fn land_renamed(
        &self,
        new: &RefName,
        value: ObjectId,
        parked: Option<&Path>,
        message: &str,
    ) -> Result<Reference, RefError> {
        let mut lock = LockFile::acquire(loose::path(&self.git_dir, new))?;
        let reference = Reference::direct(new.clone(), value);
        lock.write_all(loose::render(&reference).as_bytes())?;
        lock.commit()?;
        if let Some(parked) = parked {
            reflog::unpark(&self.git_dir, parked, new)?;
        }
        self.log(new, value, value, message, None)?;
        Ok(reference)
    }

    /// Put `old` and its log back after a rename that could not land.
    fn restore_renamed(&self, old: &RefName, value: ObjectId, parked: Option<&Path>) -> Result<(), RefError> {
        let mut lock = LockFile::acquire(loose::path(&self.git_dir, old))?;
        lock.write_all(loose::render(&Reference::direct(old.clone(), value)).as_bytes())?;
        lock.commit()?;
        if let Some(parked) = parked.filter(|p| p.is_file()) {
            reflog::unpark(&self.git_dir, parked, old)?;
        }
        Ok(())
    }

    /// Move every loose direct ref under `refs/` into `packed-refs`.
    /// `peel` maps an annotated tag to what it points at. Returns how many
    /// refs were packed.
    pub fn pack_refs(&self, peel: &dyn Fn(&ObjectId) -> Option<ObjectId>) -> Result<usize, RefError> {
        let names = loose::enumerate(&self.git_dir, None)?;
        let mutexes: Vec<Arc<Mutex<()>>> = names.iter().map(|n| self.ref_mutex(n)).collect();
        let _guards: Vec<MutexGuard<'_, ()>> = mutexes
            .iter()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
            .collect();
        let _packed_guard = self.lock_packed();

        let mut locks = Vec::new();
        let mut packed = self.packed_refs()?;
        for name in names {
            let lock = LockFile::acquire(loose::path(&self.git_dir, &name))?;
            let Some(Reference::Direct { target, .. }) = loose::read(&self.git_dir, &name)? else {
                continue;
            };
            packed.upsert(name.clone(), target, peel(&target));
            locks.push((name, lock));
        }
        if locks.is_empty() {
            return Ok(0);
        }

        let mut packed_lock = LockFile::acquire(packed::path(&self.git_dir))?;
        packed.write_into(&mut packed_lock)?;
        packed_lock.commit()?;
        let count = locks.len();
        for (name, lock) in locks {
            loose::remove(&self.git_dir, &name)?;
            lock.rollback()?;
            self.prune_after_unlock(&name);
        }
        debug!(count, "packed refs");
        Ok(count)
    }

    // ---- reflog ---------------------------------------------------------

    /// Entries newest first.
    pub fn reflog(&self, name: &RefName) -> Result<Vec<ReflogEntry>, RefError> {
        reflog::read(&self.git_dir, name)
    }

    pub fn reflog_iter(&self, name: &RefName) -> Result<ReflogIter, RefError> {
        reflog::iter(&self.git_dir, name)
    }

    pub fn reflog_count(&self, name: &RefName) -> Result<usize, RefError> {
        reflog::count(&self.git_dir, name)
    }

    pub fn reflog_entry(&self, name: &RefName, index: usize) -> Result<ReflogEntry, RefError> {
        reflog::entry_at(&self.git_dir, name, index)
    }

    /// `name@{n}`
    pub fn resolve_reflog(&self, name: &RefName, n: usize) -> Result<ObjectId, RefError> {
        reflog::resolve_at(&self.git_dir, name, n)
    }

    pub fn has_reflog(&self, name: &RefName) -> bool {
        reflog::exists(&self.git_dir, name)
    }

    /// Append an entry by hand, creating the log if needed.
    pub fn append_reflog(&self, name: &RefName, old: ObjectId, new: ObjectId, message: &str) -> Result<(), RefError> {
        let mutex = self.ref_mutex(name);
        let _guard = mutex.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = ReflogEntry::new(old, new, self.committer()?, message);
        reflog::append(&self.git_dir, name, &entry, true)
    }

    pub fn expire_reflog(&self, name: &RefName, before_timestamp: i64) -> Result<usize, RefError> {
        let mutex = self.ref_mutex(name);
        let _guard = mutex.lock().unwrap_or_else(PoisonError::into_inner);
        reflog::expire(&self.git_dir, name, before_timestamp)
    }

    pub fn delete_reflog(&self, name: &RefName) -> Result<bool, RefError> {
        let mutex = self.ref_mutex(name);
        let _guard = mutex.lock().unwrap_or_else(PoisonError::into_inner);
        reflog::delete(&self.git_dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> ObjectId {
        ObjectId::from_bytes(&[n; 20], grove_hash::HashAlgorithm::Sha1).unwrap()
    }

    #[test]
    fn store_is_send_and_sync() {
        fn assert_both<T: Send + Sync>() {}
        assert_both::<FilesRefStore>();
    }

    #[test]
    fn expected_from_option() {
        assert_eq!(Expected::from(None), Expected::Any);
        assert_eq!(Expected::from(Some(ObjectId::NULL_SHA1)), Expected::MustNotExist);
        assert_eq!(Expected::from(Some(oid(1))), Expected::Value(oid(1)));
    }

    #[test]
    fn verify_outcomes() {
        let name = RefName::branch("x").unwrap();
        let absent = Current { exists: false, value: None };
        let present = Current { exists: true, value: Some(oid(1)) };
        assert!(FilesRefStore::verify(&name, Expected::MustNotExist, &absent).is_ok());
        assert!(matches!(
            FilesRefStore::verify(&name, Expected::MustNotExist, &present),
            Err(RefError::AlreadyExists(_))
        ));
        assert!(FilesRefStore::verify(&name, Expected::Value(oid(1)), &present).is_ok());
        let err = FilesRefStore::verify(&name, Expected::Value(oid(2)), &present).unwrap_err();
        assert_eq!(err.kind(), grove_utils::ErrorKind::Conflict);
    }

    #[test]
    fn directory_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesRefStore::new(dir.path());
        store.create(&RefName::branch("a").unwrap(), oid(1), false, "").unwrap();
        store.create(&RefName::branch("d/e").unwrap(), oid(1), false, "").unwrap();

        let err = store.create(&RefName::branch("a/b").unwrap(), oid(2), false, "").unwrap_err();
        assert!(matches!(err, RefError::DirectoryConflict { .. }));
        let err = store.create(&RefName::branch("d").unwrap(), oid(2), false, "").unwrap_err();
        assert!(matches!(err, RefError::DirectoryConflict { .. }));
    }
}
