//! Per-entry headers inside a pack.
//!
//! Each entry starts with a type and a size packed into a little-endian
//! base-128 varint (type in bits 4-6 of the first byte). OFS_DELTA entries
//! follow it with a big-endian "offset minus one per continuation" varint,
//! REF_DELTA entries with the raw base id.

use grove_hash::{HashAlgorithm, ObjectId};

use crate::{EntryKind, PackError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub kind: EntryKind,
    /// Inflated size of the entry data (the delta itself for delta entries).
    pub size: u64,
    /// Bytes taken by the header, i.e. where the zlib stream starts.
    pub header_len: usize,
}

fn corrupt(offset: u64, reason: &str) -> PackError {
    PackError::CorruptEntry {
        offset,
        reason: reason.to_owned(),
    }
}

/// Parse the header of the entry at absolute `offset`; `data` starts there.
pub fn parse_header(data: &[u8], offset: u64, algo: HashAlgorithm) -> Result<EntryHeader, PackError> {
    let mut bytes = data.iter().copied();
    let mut next = |what: &str| bytes.next().ok_or_else(|| corrupt(offset, what));

    let first = next("empty entry")?;
    let code = (first >> 4) & 0x07;
    let mut size = u64::from(first & 0x0f);
    let mut shift = 4u32;
    let mut c = first;
    let mut used = 1usize;
    while c & 0x80 != 0 {
        c = next("size truncated")?;
        used += 1;
        if shift > 57 {
            return Err(corrupt(offset, "size overflows 64 bits"));
        }
        size |= u64::from(c & 0x7f) << shift;
        shift += 7;
    }

    let kind = match code {
        1 => EntryKind::Commit,
        2 => EntryKind::Tree,
        3 => EntryKind::Blob,
        4 => EntryKind::Tag,
        6 => {
            let mut c = next("delta offset truncated")?;
            used += 1;
            let mut back = u64::from(c & 0x7f);
            while c & 0x80 != 0 {
                c = next("delta offset truncated")?;
                used += 1;
                back = back
                    .checked_add(1)
                    .and_then(|v| v.checked_mul(128))
                    .ok_or_else(|| corrupt(offset, "delta offset overflows"))?
                    | u64::from(c & 0x7f);
            }
            if back == 0 || back > offset {
                return Err(corrupt(offset, "delta base outside pack"));
            }
            EntryKind::OfsDelta {
                base_offset: offset - back,
            }
        }
        7 => {
            let width = algo.digest_len();
            let raw = data
                .get(used..used + width)
                .ok_or_else(|| corrupt(offset, "base id truncated"))?;
            used += width;
            EntryKind::RefDelta {
                base: ObjectId::from_bytes(raw, algo)?,
            }
        }
        other => return Err(corrupt(offset, &format!("unknown type code {other}"))),
    };

    Ok(EntryHeader {
        kind,
        size,
        header_len: used,
    })
}

/// Encode the type/size prefix of an entry.
pub fn encode_header(type_code: u8, size: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    let mut rest = size >> 4;
    let mut byte = (type_code << 4) | (size & 0x0f) as u8;
    while rest != 0 {
        out.push(byte | 0x80);
        byte = (rest & 0x7f) as u8;
        rest >>= 7;
    }
    out.push(byte);
    out
}

/// Encode the distance back to an OFS_DELTA base.
pub fn encode_ofs_distance(distance: u64) -> Vec<u8> {
    let mut out = vec![(distance & 0x7f) as u8];
    let mut rest = distance >> 7;
    while rest != 0 {
        rest -= 1;
        out.push(0x80 | (rest & 0x7f) as u8);
        rest >>= 7;
    }
    out.reverse();
    out
}
