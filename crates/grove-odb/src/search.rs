//! Lookup across loose objects, packs and alternates.

use std::sync::PoisonError;

use grove_hash::ObjectId;
use grove_object::ObjectType;
use grove_pack::pack::{BaseResolver, NoExternalBases};
use grove_pack::PackFile;

use crate::{ObjectDatabase, ObjectInfo, OdbError};

/// REF_DELTA bases for one pack: loose objects, the other packs, then the
/// alternates. Bases found in another pack must be self-contained there.
struct CrossPackBases<'a> {
    odb: &'a ObjectDatabase,
    packs: &'a [PackFile],
    current: usize,
}

impl BaseResolver for CrossPackBases<'_> {
    fn resolve_base(&self, oid: &ObjectId) -> Option<(ObjectType, Vec<u8>)> {
        if let Ok(Some(found)) = self.odb.loose.read_raw(oid) {
            return Some(found);
        }
        for (i, pack) in self.packs.iter().enumerate() {
            if i == self.current {
                continue;
            }
            if let Ok(Some(found)) = pack.read(oid, &NoExternalBases) {
                return Some(found);
            }
        }
        self.odb
            .alternates
            .iter()
            .find_map(|alt| alt.read_raw(oid).ok().flatten())
    }
}

pub(crate) fn find_raw(
    odb: &ObjectDatabase,
    oid: &ObjectId,
) -> Result<Option<(ObjectType, Vec<u8>)>, OdbError> {
    if let Some(found) = odb.loose.read_raw(oid)? {
        return Ok(Some(found));
    }

    {
        let packs = odb.packs.read().unwrap_or_else(PoisonError::into_inner);
        for (current, pack) in packs.iter().enumerate() {
            let bases = CrossPackBases {
                odb,
                packs: &packs,
                current,
            };
            if let Some(found) = pack.read(oid, &bases)? {
                return Ok(Some(found));
            }
        }
    }

    for alt in &odb.alternates {
        if let Some(found) = alt.read_raw(oid)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

pub(crate) fn find_header(odb: &ObjectDatabase, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
    if let Some((kind, size)) = odb.loose.read_header(oid)? {
        return Ok(Some(ObjectInfo {
            kind,
            size: size as u64,
        }));
    }

    {
        let packs = odb.packs.read().unwrap_or_else(PoisonError::into_inner);
        for (current, pack) in packs.iter().enumerate() {
            let bases = CrossPackBases {
                odb,
                packs: &packs,
                current,
            };
            if let Some((kind, size)) = pack.read_header(oid, &bases)? {
                return Ok(Some(ObjectInfo { kind, size }));
            }
        }
    }

    for alt in &odb.alternates {
        if let Some(info) = find_header(alt, oid)? {
            return Ok(Some(info));
        }
    }
    Ok(None)
}
