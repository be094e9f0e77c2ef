use std::fmt;

use bstr::{BString, ByteVec};
use grove_hash::ObjectId;
use grove_object::{FileMode, Object, ObjectType};
use grove_odb::ObjectDatabase;
use grove_repository::{FilterDirection, FilterRegistry, Workdir};

use crate::delta::{DeltaStatus, DiffDelta, DiffFile, FileFlags};
use crate::patch::{Funcname, Patch};
use crate::{unified, DiffError, DiffOptions};

/// Which side of a delta lives in the working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Old,
    New,
}

/// File-level changes between two snapshots.
pub struct Diff<'r> {
    odb: &'r ObjectDatabase,
    filters: Option<&'r FilterRegistry>,
    workdir: Option<(&'r dyn Workdir, Side)>,
    pub(crate) deltas: Vec<DiffDelta>,
    options: DiffOptions,
    funcname: Funcname,
}

impl fmt::Debug for Diff<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diff")
            .field("deltas", &self.deltas)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Totals over every patch of a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
}

impl fmt::Display for DiffStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        write!(f, " {} file{} changed", self.files_changed, plural(self.files_changed))?;
        if self.insertions > 0 {
            write!(f, ", {} insertion{}(+)", self.insertions, plural(self.insertions))?;
        }
        if self.deletions > 0 {
            write!(f, ", {} deletion{}(-)", self.deletions, plural(self.deletions))?;
        }
        Ok(())
    }
}

/// Whether a delta takes part in patch text and stats.
fn is_printable(status: DeltaStatus) -> bool {
    !matches!(
        status,
        DeltaStatus::Unmodified | DeltaStatus::Ignored | DeltaStatus::Conflicted
    )
}

impl<'r> Diff<'r> {
    pub(crate) fn new(
        odb: &'r ObjectDatabase,
        filters: Option<&'r FilterRegistry>,
        workdir: Option<(&'r dyn Workdir, Side)>,
        deltas: Vec<DiffDelta>,
        options: &DiffOptions,
    ) -> Result<Self, DiffError> {
        Ok(Self {
            odb,
            filters,
            workdir,
            deltas,
            funcname: Funcname::from_options(options)?,
            options: options.clone(),
        })
    }

    pub fn deltas(&self) -> &[DiffDelta] {
        &self.deltas
    }

    pub fn delta(&self, index: usize) -> Option<&DiffDelta> {
        self.deltas.get(index)
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    pub fn num_deltas_of_type(&self, status: DeltaStatus) -> usize {
        self.deltas.iter().filter(|d| d.status == status).count()
    }

    /// Content of one side of a delta, in its object database form.
    pub(crate) fn load(&self, file: &DiffFile, side: Side) -> Result<Vec<u8>, DiffError> {
        let Some(mode) = file.mode else {
            return Ok(Vec::new());
        };
        if mode.is_gitlink() {
            return Ok(format!("Subproject commit {}\n", file.oid).into_bytes());
        }
        if mode.is_tree() {
            return Ok(Vec::new());
        }
        if let Some((workdir, wd_side)) = self.workdir {
            if wd_side == side {
                let raw = workdir.read_file(file.path())?;
                return match self.filters {
                    Some(filters) => Ok(filters.apply(file.path(), &raw, FilterDirection::ToOdb)?),
                    None => Ok(raw),
                };
            }
        }
        match self.odb.read(&file.oid)? {
            Object::Blob(blob) => Ok(blob.data),
            other => Err(DiffError::WrongObjectType {
                oid: file.oid,
                expected: "blob",
                actual: other.object_type().as_str(),
            }),
        }
    }

    /// Fill in the oid of a work tree file that was never hashed.
    fn complete_oid(&self, file: &mut DiffFile, content: &[u8]) -> Result<(), DiffError> {
        if file.exists() && !file.flags.contains(FileFlags::VALID_ID) {
            file.oid = self.odb.hash_only(content, ObjectType::Blob)?;
            file.size = content.len() as u64;
            file.flags |= FileFlags::VALID_ID;
        }
        Ok(())
    }

    /// The patch for delta `index`. Fails with `BinaryContent` for binary
    /// files.
    pub fn patch(&self, index: usize) -> Result<Patch, DiffError> {
        let delta = self.deltas.get(index).ok_or(DiffError::NoSuchDelta {
            index,
            len: self.deltas.len(),
        })?;
        let old = self.load(&delta.old_file, Side::Old)?;
        let new = self.load(&delta.new_file, Side::New)?;
        let mut delta = delta.clone();
        self.complete_oid(&mut delta.old_file, &old)?;
        self.complete_oid(&mut delta.new_file, &new)?;
        Patch::from_buffers(delta, &old, &new, &self.options, &self.funcname, self.filters)
    }

    /// Patches in delta order, each computed when reached.
    pub fn patches(&self) -> Patches<'_, 'r> {
        Patches { diff: self, next: 0 }
    }

    pub fn stats(&self) -> Result<DiffStats, DiffError> {
        let mut stats = DiffStats::default();
        for (index, delta) in self.deltas.iter().enumerate() {
            if !is_printable(delta.status) {
                continue;
            }
            match self.patch(index) {
                Ok(patch) => {
                    let (_, added, deleted) = patch.line_stats();
                    stats.insertions += added;
                    stats.deletions += deleted;
                }
                Err(DiffError::BinaryContent { .. }) => {}
                Err(e) => return Err(e),
            }
            stats.files_changed += 1;
        }
        Ok(stats)
    }

    /// Every changed file as `git diff` prints it. Binary files get a
    /// `Binary files ... differ` line instead of hunks.
    pub fn to_unified(&self) -> Result<BString, DiffError> {
        let mut out = BString::default();
        for (index, delta) in self.deltas.iter().enumerate() {
            if !is_printable(delta.status) {
                continue;
            }
            match self.patch(index) {
                Ok(patch) => out.extend_from_slice(&patch.to_unified()),
                Err(DiffError::BinaryContent { .. }) => {
                    let (old_prefix, new_prefix) = (&self.options.old_prefix, &self.options.new_prefix);
                    unified::write_file_header(&mut out, delta, old_prefix, new_prefix, false);
                    unified::write_binary_notice(&mut out, delta, old_prefix, new_prefix);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// One `X\tpath` line per delta, renames as `R100\told\tnew`.
    pub fn name_status(&self) -> BString {
        let mut out = BString::default();
        for delta in self.deltas.iter().filter(|d| is_printable(d.status)) {
            out.push_char(delta.status.as_char());
            if matches!(delta.status, DeltaStatus::Renamed | DeltaStatus::Copied) {
                out.extend_from_slice(format!("{:03}\t", (delta.similarity * 100.0).round() as u32).as_bytes());
                out.extend_from_slice(&delta.old_file.path);
            }
            out.push(b'\t');
            out.extend_from_slice(delta.path());
            out.push(b'\n');
        }
        out
    }
}

/// Lazy iterator over the patches of a [`Diff`].
pub struct Patches<'d, 'r> {
    diff: &'d Diff<'r>,
    next: usize,
}

impl Iterator for Patches<'_, '_> {
    type Item = Result<Patch, DiffError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.diff.deltas.len() {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.diff.patch(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.diff.deltas.len() - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Patches<'_, '_> {}

/// Size of a blob from its header, without inflating it. Missing objects
/// report zero.
pub(crate) fn blob_size(odb: &ObjectDatabase, oid: &ObjectId, mode: FileMode) -> u64 {
    if !mode.is_blob() && !mode.is_symlink() {
        return 0;
    }
    odb.read_header(oid).map_or(0, |info| info.size)
}
