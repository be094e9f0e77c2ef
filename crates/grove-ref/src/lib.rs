//! References: loose files under `refs/`, the `packed-refs` file, and the
//! per-reference logs under `logs/`.
//!
//! [`FilesRefStore::update`] is the single mutation primitive for one ref:
//! serialized per name, compare-and-swap on the old value, one reflog entry
//! per success. [`RefTransaction`] applies several such changes atomically.

mod error;
mod loose;
mod name;
pub mod packed;
pub mod reflog;
mod store;
mod transaction;

pub use error::RefError;
pub use name::{is_valid_name, RefName, HEAD};
pub use packed::{PackedRef, PackedRefs};
pub use reflog::{ReflogEntry, ReflogMode};
pub use store::{Expected, FilesRefStore};
pub use transaction::{RefTransaction, RefUpdate, RefUpdateAction};


use grove_hash::ObjectId;

/// Symbolic chains longer than this are rejected.
pub const MAX_SYMREF_DEPTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Direct {
        name: RefName,
        target: ObjectId,
        /// What an annotated tag peels to, when packed-refs recorded it.
        peeled: Option<ObjectId>,
    },
    Symbolic {
        name: RefName,
        target: RefName,
    },
}

impl Reference {
    pub fn name(&self) -> &RefName {
        match self {
            Reference::Direct { name, .. } | Reference::Symbolic { name, .. } => name,
        }
    }

    pub fn target_oid(&self) -> Option<ObjectId> {
        match self {
            Reference::Direct { target, .. } => Some(*target),
            Reference::Symbolic { .. } => None,
        }
    }

    pub fn symbolic_target(&self) -> Option<&RefName> {
        match self {
            Reference::Symbolic { target, .. } => Some(target),
            Reference::Direct { .. } => None,
        }
    }

    pub fn peeled(&self) -> Option<ObjectId> {
        match self {
            Reference::Direct { peeled, .. } => *peeled,
            Reference::Symbolic { .. } => None,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Reference::Symbolic { .. })
    }

    pub(crate) fn direct(name: RefName, target: ObjectId) -> Self {
        Reference::Direct {
            name,
            target,
            peeled: None,
        }
    }
}

bitflags::bitflags! {
    /// Which storage forms [`FilesRefStore::list`] returns. Combine with `|`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RefFilter: u8 {
        /// Loose files holding an object id.
        const DIRECT = 1;
        /// Loose files holding `ref: <name>`.
        const SYMBOLIC = 1 << 1;
        /// Entries of `packed-refs` not shadowed by a loose file.
        const PACKED = 1 << 2;
        const ALL = Self::DIRECT.bits() | Self::SYMBOLIC.bits() | Self::PACKED.bits();
    }
}

impl Default for RefFilter {
    fn default() -> Self {
        Self::ALL
    }
}
