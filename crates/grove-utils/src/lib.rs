//! Foundation types shared by every grove crate.
//!
//! - [`ErrorKind`]: the coarse error taxonomy every crate-level error maps onto.
//! - [`date`]: timestamps with timezone offsets and author/committer signatures.
//! - [`lockfile`]: the `<path>.lock` create/write/rename protocol.
//! - [`wildmatch`]: glob matching for attribute patterns.

pub mod date;
pub mod error;
pub mod lockfile;
pub mod wildmatch;

pub use bstr::{BStr, BString, ByteSlice, ByteVec};
pub use date::{GitDate, Signature};
pub use error::{ErrorKind, LockError, UtilError};

pub type Result<T> = std::result::Result<T, UtilError>;
