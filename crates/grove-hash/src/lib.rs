//! Object identity for grove.
//!
//! [`ObjectId`] is the content digest every other layer keys on. It is
//! computed by [`Hasher`] over `"<type> <size>\0<content>"`. SHA-1 digests
//! run through collision detection. [`OidPrefix`] handles the abbreviated
//! hex forms users type.

mod algorithm;
mod error;
pub mod hasher;
pub mod hex;
mod oid;
mod prefix;

pub use algorithm::HashAlgorithm;
pub use error::HashError;
pub use hasher::Hasher;
pub use oid::ObjectId;
pub use prefix::{OidPrefix, MIN_PREFIX_LEN};
