//! Conversion between the index and tree objects.

use std::collections::BTreeMap;

use bstr::{BString, ByteSlice};
use grove_hash::ObjectId;
use grove_object::{FileMode, Object, ObjectType, Tree, TreeBuilder};
use grove_odb::ObjectDatabase;
use tracing::debug;

use crate::entry::IndexEntry;
use crate::{Index, IndexError};

/// One directory level while assembling trees bottom-up.
#[derive(Default)]
struct Dir<'a> {
    files: Vec<(&'a [u8], &'a IndexEntry)>,
    dirs: BTreeMap<&'a [u8], Dir<'a>>,
}

impl<'a> Dir<'a> {
    fn insert(&mut self, rest: &'a [u8], entry: &'a IndexEntry) {
        match rest.find_byte(b'/') {
            Some(slash) => self
                .dirs
                .entry(&rest[..slash])
                .or_default()
                .insert(&rest[slash + 1..], entry),
            None => self.files.push((rest, entry)),
        }
    }

    fn write(&self, odb: &ObjectDatabase) -> Result<ObjectId, IndexError> {
        let mut builder = TreeBuilder::new();
        for (name, entry) in &self.files {
            builder.insert(*name, entry.mode, entry.oid)?;
        }
        for (name, dir) in &self.dirs {
            builder.insert(*name, FileMode::Tree, dir.write(odb)?)?;
        }
        Ok(odb.write(&Object::Tree(builder.build()))?)
    }
}

impl Index {
    /// Store the stage-0 entries as nested trees and return the root.
    /// Intent-to-add placeholders are left out.
    pub fn write_tree(&self, odb: &ObjectDatabase) -> Result<ObjectId, IndexError> {
        let conflicted = self.conflicts().len();
        if conflicted > 0 {
            return Err(IndexError::UnresolvedConflicts(conflicted));
        }
        let mut root = Dir::default();
        for entry in self.iter().filter(|e| !e.flags.intent_to_add) {
            root.insert(&entry.path, entry);
        }
        let oid = root.write(odb)?;
        debug!(tree = %oid, entries = self.len(), "wrote tree from index");
        Ok(oid)
    }

    /// Replace every entry with the contents of `tree`, recursively.
    pub fn read_tree(&mut self, odb: &ObjectDatabase, tree: &ObjectId) -> Result<(), IndexError> {
        let mut entries = Vec::new();
        collect(odb, tree, &mut BString::default(), &mut entries)?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        self.clear();
        // Sorted and unique already, so no per-entry bookkeeping is needed.
        self.entries = entries;
        Ok(())
    }
}

fn collect(
    odb: &ObjectDatabase,
    oid: &ObjectId,
    prefix: &mut BString,
    out: &mut Vec<IndexEntry>,
) -> Result<(), IndexError> {
    let tree: Tree = match odb.read(oid)? {
        Object::Tree(tree) => tree,
        other => {
            return Err(grove_object::ObjectError::UnexpectedType {
                expected: ObjectType::Tree,
                actual: other.object_type(),
            }
            .into())
        }
    };
    for entry in &tree.entries {
        let len = prefix.len();
        prefix.extend_from_slice(&entry.name);
        if entry.mode.is_tree() {
            prefix.push(b'/');
            collect(odb, &entry.oid, prefix, out)?;
        } else {
            out.push(IndexEntry::new(prefix.clone(), entry.oid, entry.mode));
        }
        prefix.truncate(len);
    }
    Ok(())
}
