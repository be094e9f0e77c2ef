//! The `packed-refs` file.
//!
//! ```text
//! # pack-refs with: peeled fully-peeled sorted
//! <hex> refs/heads/main
//! <hex> refs/tags/v1
//! ^<hex>
//! ```
//!
//! A `^` line records what the annotated tag on the previous line peels to.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use grove_hash::ObjectId;
use grove_utils::lockfile::LockFile;

use crate::error::RefError;
use crate::name::RefName;

const HEADER: &str = "# pack-refs with: peeled fully-peeled sorted \n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedRef {
    pub name: RefName,
    pub oid: ObjectId,
    pub peeled: Option<ObjectId>,
}

/// Parsed `packed-refs`, kept sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedRefs {
    refs: Vec<PackedRef>,
}

pub fn path(git_dir: &Path) -> PathBuf {
    git_dir.join("packed-refs")
}

fn oid_field(hex: &[u8], line: usize) -> Result<ObjectId, RefError> {
    let hex = hex
        .to_str()
        .map_err(|_| RefError::parse("packed-refs", format!("line {line}: not UTF-8")))?;
    ObjectId::from_hex(hex.trim()).map_err(|e| RefError::parse("packed-refs", format!("line {line}: {e}")))
}

impl PackedRefs {
    pub fn parse(data: &[u8]) -> Result<Self, RefError> {
        let mut refs: Vec<PackedRef> = Vec::new();
        for (i, line) in data.lines().enumerate() {
            let lineno = i + 1;
            if line.is_empty() || line.starts_with(b"#") {
                continue;
            }
            if let Some(hex) = line.strip_prefix(b"^") {
                let peeled = oid_field(hex, lineno)?;
                let last = refs.last_mut().ok_or_else(|| {
                    RefError::parse("packed-refs", format!("line {lineno}: peeled line without a ref"))
                })?;
                last.peeled = Some(peeled);
                continue;
            }
            let (hex, name) = line.split_once_str(" ").ok_or_else(|| {
                RefError::parse("packed-refs", format!("line {lineno}: expected '<oid> <name>'"))
            })?;
            let name = name
                .to_str()
                .map_err(|_| RefError::parse("packed-refs", format!("line {lineno}: name not UTF-8")))?;
            refs.push(PackedRef {
                name: RefName::new(name.trim_end())?,
                oid: oid_field(hex, lineno)?,
                peeled: None,
            });
        }
        refs.sort_by(|a, b| a.name.cmp(&b.name));
        refs.dedup_by(|later, earlier| later.name == earlier.name);
        Ok(Self { refs })
    }

    /// An absent file is an empty set.
    pub fn load(git_dir: &Path) -> Result<Self, RefError> {
        match fs::read(path(git_dir)) {
            Ok(data) => Self::parse(&data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find(&self, name: &RefName) -> Option<&PackedRef> {
        self.refs
            .binary_search_by(|r| r.name.cmp(name))
            .ok()
            .map(|i| &self.refs[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PackedRef> {
        self.refs.iter()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Any entry strictly below `dir/`.
    pub fn has_children(&self, dir: &str) -> bool {
        let prefix = format!("{dir}/");
        self.refs.iter().any(|r| r.name.as_str().starts_with(&prefix))
    }

    pub fn upsert(&mut self, name: RefName, oid: ObjectId, peeled: Option<ObjectId>) {
        let entry = PackedRef { name, oid, peeled };
        match self.refs.binary_search_by(|r| r.name.cmp(&entry.name)) {
            Ok(i) => self.refs[i] = entry,
            Err(i) => self.refs.insert(i, entry),
        }
    }

    pub fn remove(&mut self, name: &RefName) -> Option<PackedRef> {
        self.refs
            .binary_search_by(|r| r.name.cmp(name))
            .ok()
            .map(|i| self.refs.remove(i))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::with_capacity(HEADER.len() + self.refs.len() * 64);
        out.push_str(HEADER);
        for r in &self.refs {
            out.push_str(&format!("{} {}\n", r.oid, r.name));
            if let Some(peeled) = r.peeled {
                out.push_str(&format!("^{peeled}\n"));
            }
        }
        out.into_bytes()
    }

    /// Fill a lock taken on the `packed-refs` path. The caller commits it.
    pub(crate) fn write_into(&self, lock: &mut LockFile) -> Result<(), RefError> {
        lock.write_all(&self.to_bytes())?;
        Ok(())
    }
}
