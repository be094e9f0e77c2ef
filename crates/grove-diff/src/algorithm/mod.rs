//! Line diff algorithms. Lines are interned to integer ids first, so both
//! algorithms compare ids and whitespace handling is decided once, when
//! lines are interned.

pub mod myers;
pub mod patience;

use std::borrow::Cow;
use std::collections::HashMap;

use crate::DiffAlgorithm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    Equal,
    Insert,
    Delete,
}

/// One step of an edit script.
///
/// For an `Insert`, `old_index` is the old position the line is inserted
/// before; for a `Delete`, `new_index` is the new position at the point of
/// deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    pub op: EditOp,
    pub old_index: usize,
    pub new_index: usize,
}

impl Edit {
    pub(crate) fn equal(old_index: usize, new_index: usize) -> Self {
        Self { op: EditOp::Equal, old_index, new_index }
    }

    pub(crate) fn insert(old_index: usize, new_index: usize) -> Self {
        Self { op: EditOp::Insert, old_index, new_index }
    }

    pub(crate) fn delete(old_index: usize, new_index: usize) -> Self {
        Self { op: EditOp::Delete, old_index, new_index }
    }
}

/// How whitespace takes part in line comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Whitespace {
    #[default]
    Exact,
    /// Runs of whitespace compare equal to a single space; trailing
    /// whitespace is ignored.
    IgnoreChange,
    /// Whitespace is ignored entirely.
    IgnoreAll,
}

/// Split into lines, each keeping its `\n`. A final line without one is
/// kept as is.
pub fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    data.split_inclusive(|&b| b == b'\n').collect()
}

fn normalize(line: &[u8], whitespace: Whitespace) -> Cow<'_, [u8]> {
    match whitespace {
        Whitespace::Exact => Cow::Borrowed(line),
        Whitespace::IgnoreAll => Cow::Owned(line.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect()),
        Whitespace::IgnoreChange => {
            let mut out = Vec::with_capacity(line.len());
            let mut pending_space = false;
            for &b in line {
                if b.is_ascii_whitespace() {
                    pending_space = true;
                    continue;
                }
                if pending_space {
                    out.push(b' ');
                }
                pending_space = false;
                out.push(b);
            }
            Cow::Owned(out)
        }
    }
}

/// Map every line of both sides to an id; equal ids mean equal lines.
pub fn intern<'a>(old: &[&'a [u8]], new: &[&'a [u8]], whitespace: Whitespace) -> (Vec<u32>, Vec<u32>) {
    let mut ids: HashMap<Cow<'a, [u8]>, u32> = HashMap::with_capacity(old.len() + new.len());
    let mut id_of = |line: &'a [u8]| -> u32 {
        let key = normalize(line, whitespace);
        let next = ids.len() as u32;
        *ids.entry(key).or_insert(next)
    };
    let old_ids = old.iter().map(|&l| id_of(l)).collect();
    let new_ids = new.iter().map(|&l| id_of(l)).collect();
    (old_ids, new_ids)
}

pub fn diff_ids(old: &[u32], new: &[u32], algorithm: DiffAlgorithm) -> Vec<Edit> {
    match algorithm {
        DiffAlgorithm::Myers => myers::diff(old, new),
        DiffAlgorithm::Patience => patience::diff(old, new),
    }
}

/// Edit script turning `old` lines into `new` lines.
pub fn diff_lines(old: &[&[u8]], new: &[&[u8]], algorithm: DiffAlgorithm, whitespace: Whitespace) -> Vec<Edit> {
    let (old_ids, new_ids) = intern(old, new, whitespace);
    diff_ids(&old_ids, &new_ids, algorithm)
}

/// Lengths of the common prefix and, after it, the common suffix.
pub(crate) fn common_ends(old: &[u32], new: &[u32]) -> (usize, usize) {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    (prefix, suffix)
}
