//! Three-way merge of file content.
//!
//! Both sides are diffed against the ancestor. Changed regions from the two
//! sides are grouped into chunks; a chunk touched by one side takes that
//! side, a chunk touched by both takes their common result when they agree
//! and is a conflict otherwise. Regions that only meet end to start do not
//! conflict, but two sides inserting at the same line do.

use std::ops::Range;

use bstr::{BStr, BString};
use grove_diff::algorithm::{diff_ids, intern, split_lines, Edit, EditOp};
use grove_diff::binary::{looks_binary, DEFAULT_BINARY_SCAN};
use grove_object::FileMode;

use crate::{ConflictStyle, FileFavor, MergeFileOptions};

/// One input of [`merge_file`].
#[derive(Debug, Clone, Copy)]
pub struct MergeFileInput<'a> {
    pub content: &'a [u8],
    /// Left out of the path decision when `None`.
    pub path: Option<&'a BStr>,
    /// Left out of the mode decision when `None`.
    pub mode: Option<FileMode>,
}

impl<'a> MergeFileInput<'a> {
    pub fn new(content: &'a [u8]) -> Self {
        Self {
            content,
            path: None,
            mode: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<&'a BStr>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_mode(mut self, mode: FileMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Outcome of [`merge_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeFileResult {
    /// No region needed markers.
    pub automergeable: bool,
    pub path: Option<BString>,
    pub mode: Option<FileMode>,
    /// The merged text, with conflict markers where regions clashed.
    pub content: Vec<u8>,
    /// Number of regions written with markers.
    pub conflicts: usize,
}

/// The side that changed `T`, ours when both changed it the same way, and
/// the ancestor's when they disagree.
fn pick<T: PartialEq>(ancestor: Option<T>, ours: Option<T>, theirs: Option<T>) -> Option<T> {
    if ours == theirs || theirs == ancestor {
        ours
    } else if ours == ancestor {
        theirs
    } else {
        ancestor
    }
}

/// Merge `ours` and `theirs`, both descended from `ancestor`.
///
/// Binary input is never merged line by line: unless the favor picks a
/// side, the result holds our content and is not automergeable.
pub fn merge_file(
    ancestor: &MergeFileInput<'_>,
    ours: &MergeFileInput<'_>,
    theirs: &MergeFileInput<'_>,
    options: &MergeFileOptions,
) -> MergeFileResult {
    let path = pick(ancestor.path, ours.path, theirs.path).map(ToOwned::to_owned);
    let mode = pick(ancestor.mode, ours.mode, theirs.mode);
    let clean = |content: &[u8]| MergeFileResult {
        automergeable: true,
        path: path.clone(),
        mode,
        content: content.to_vec(),
        conflicts: 0,
    };

    if ours.content == theirs.content || ancestor.content == theirs.content {
        return clean(ours.content);
    }
    if ancestor.content == ours.content {
        return clean(theirs.content);
    }

    let binary = [ancestor, ours, theirs]
        .iter()
        .any(|input| looks_binary(input.content, DEFAULT_BINARY_SCAN));
    if binary {
        return match options.favor {
            FileFavor::Ours => clean(ours.content),
            FileFavor::Theirs => clean(theirs.content),
            FileFavor::Normal | FileFavor::Union => MergeFileResult {
                automergeable: false,
                path,
                mode,
                content: ours.content.to_vec(),
                conflicts: 1,
            },
        };
    }

    let base = split_lines(ancestor.content);
    let ours_lines = split_lines(ours.content);
    let theirs_lines = split_lines(theirs.content);
    let mut merger = Merger {
        ours_regions: regions(&base, &ours_lines, options),
        theirs_regions: regions(&base, &theirs_lines, options),
        base,
        ours: ours_lines,
        theirs: theirs_lines,
        options,
        out: Vec::with_capacity(ours.content.len().max(theirs.content.len())),
        conflicts: 0,
    };
    merger.run();
    MergeFileResult {
        automergeable: merger.conflicts == 0,
        path,
        mode,
        content: merger.out,
        conflicts: merger.conflicts,
    }
}

/// A run of changed lines: `base` lines of the ancestor replaced by `side`
/// lines of one side.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Region {
    base: Range<usize>,
    side: Range<usize>,
}

fn regions(base: &[&[u8]], side: &[&[u8]], options: &MergeFileOptions) -> Vec<Region> {
    let (base_ids, side_ids) = intern(base, side, options.whitespace());
    collect_regions(&diff_ids(&base_ids, &side_ids, options.algorithm))
}

fn collect_regions(edits: &[Edit]) -> Vec<Region> {
    let mut out = Vec::new();
    let mut current: Option<Region> = None;
    for edit in edits {
        if edit.op == EditOp::Equal {
            out.extend(current.take());
            continue;
        }
        let region = current.get_or_insert(Region {
            base: edit.old_index..edit.old_index,
            side: edit.new_index..edit.new_index,
        });
        match edit.op {
            EditOp::Delete => region.base.end = edit.old_index + 1,
            EditOp::Insert => region.side.end = edit.new_index + 1,
            EditOp::Equal => {}
        }
    }
    out.extend(current);
    out
}

/// Whether `region` has to be merged together with a chunk over `chunk`.
fn overlaps(chunk: &Range<usize>, region: &Region) -> bool {
    (region.base.start < chunk.end && chunk.start < region.base.end) || region.base.start == chunk.start
}

/// Lines of one side standing for base lines `chunk`, given that side's
/// regions inside the chunk. `None` when the side left the chunk alone.
fn side_span(regions: &[Region], chunk: &Range<usize>) -> Option<Range<usize>> {
    let (first, last) = (regions.first()?, regions.last()?);
    let start = first.side.start - (first.base.start - chunk.start);
    let end = last.side.end + (chunk.end - last.base.end);
    Some(start..end)
}

struct Merger<'a> {
    base: Vec<&'a [u8]>,
    ours: Vec<&'a [u8]>,
    theirs: Vec<&'a [u8]>,
    ours_regions: Vec<Region>,
    theirs_regions: Vec<Region>,
    options: &'a MergeFileOptions,
    out: Vec<u8>,
    conflicts: usize,
}

impl Merger<'_> {
    fn run(&mut self) {
        let (mut oi, mut ti) = (0, 0);
        // Unchanged stretches come from our side, which keeps our
        // whitespace when whitespace is ignored.
        let (mut base_pos, mut ours_pos) = (0, 0);
        loop {
            let chunk_start = match (self.ours_regions.get(oi), self.theirs_regions.get(ti)) {
                (None, None) => break,
                (Some(o), None) => o.base.start,
                (None, Some(t)) => t.base.start,
                (Some(o), Some(t)) => o.base.start.min(t.base.start),
            };
            let mut chunk = chunk_start..chunk_start;
            let (mut o_end, mut t_end) = (oi, ti);
            loop {
                let mut grew = false;
                for (regions, end) in [(&self.ours_regions, &mut o_end), (&self.theirs_regions, &mut t_end)] {
                    if let Some(region) = regions.get(*end) {
                        if overlaps(&chunk, region) {
                            chunk.end = chunk.end.max(region.base.end);
                            *end += 1;
                            grew = true;
                        }
                    }
                }
                if !grew {
                    break;
                }
            }

            let unchanged = chunk.start - base_pos;
            self.emit_ours(ours_pos..ours_pos + unchanged);
            ours_pos += unchanged;

            let ours_span = side_span(&self.ours_regions[oi..o_end], &chunk);
            let theirs_span = side_span(&self.theirs_regions[ti..t_end], &chunk);
            ours_pos = match (ours_span, theirs_span) {
                (Some(ours), Some(theirs)) => {
                    self.resolve(&chunk, ours.clone(), theirs);
                    ours.end
                }
                (Some(ours), None) => {
                    self.emit_ours(ours.clone());
                    ours.end
                }
                (None, Some(theirs)) => {
                    extend(&mut self.out, &self.theirs[theirs]);
                    ours_pos + chunk.len()
                }
                (None, None) => ours_pos + chunk.len(),
            };
            base_pos = chunk.end;
            oi = o_end;
            ti = t_end;
        }
        self.emit_ours(ours_pos..self.ours.len());
    }

    fn emit_ours(&mut self, range: Range<usize>) {
        extend(&mut self.out, &self.ours[range]);
    }

    /// A chunk both sides changed.
    fn resolve(&mut self, chunk: &Range<usize>, ours: Range<usize>, theirs: Range<usize>) {
        let ours_lines = &self.ours[ours];
        let theirs_lines = &self.theirs[theirs];
        let (ours_ids, theirs_ids) = intern(ours_lines, theirs_lines, self.options.whitespace());
        if ours_ids == theirs_ids {
            extend(&mut self.out, ours_lines);
            return;
        }
        match self.options.favor {
            FileFavor::Ours => extend(&mut self.out, ours_lines),
            FileFavor::Theirs => extend(&mut self.out, theirs_lines),
            FileFavor::Union => {
                append(&mut self.out, ours_lines);
                extend(&mut self.out, theirs_lines);
            }
            FileFavor::Normal => {
                self.conflicts += 1;
                let base = &self.base[chunk.clone()];
                write_conflict(&mut self.out, self.options, base, (ours_lines, &ours_ids), (theirs_lines, &theirs_ids));
            }
        }
    }
}

fn extend(out: &mut Vec<u8>, lines: &[&[u8]]) {
    for line in lines {
        out.extend_from_slice(line);
    }
}

/// Append lines, ending the last one with a newline so a marker can
/// follow.
fn append(out: &mut Vec<u8>, lines: &[&[u8]]) {
    extend(out, lines);
    if !lines.is_empty() && !out.ends_with(b"\n") {
        out.push(b'\n');
    }
}

fn marker(out: &mut Vec<u8>, ch: u8, size: usize, label: Option<&str>) {
    out.extend(std::iter::repeat(ch).take(size));
    if let Some(label) = label {
        out.push(b' ');
        out.extend_from_slice(label.as_bytes());
    }
    out.push(b'\n');
}

fn write_conflict(
    out: &mut Vec<u8>,
    options: &MergeFileOptions,
    base: &[&[u8]],
    (ours, ours_ids): (&[&[u8]], &[u32]),
    (theirs, theirs_ids): (&[&[u8]], &[u32]),
) {
    let size = options.marker_size;
    let (mut ours, mut theirs) = (ours, theirs);
    let mut suffix: &[&[u8]] = &[];
    if options.style == ConflictStyle::Merge {
        // Lines both sides share at the edges stay outside the markers.
        let prefix = ours_ids.iter().zip(theirs_ids).take_while(|(a, b)| a == b).count();
        let tail = ours_ids[prefix..]
            .iter()
            .rev()
            .zip(theirs_ids[prefix..].iter().rev())
            .take_while(|(a, b)| a == b)
            .count();
        append(out, &ours[..prefix]);
        suffix = &ours[ours.len() - tail..];
        ours = &ours[prefix..ours.len() - tail];
        theirs = &theirs[prefix..theirs.len() - tail];
    }

    marker(out, b'<', size, options.our_label.as_deref());
    append(out, ours);
    if options.style == ConflictStyle::Diff3 {
        marker(out, b'|', size, options.ancestor_label.as_deref());
        append(out, base);
    }
    marker(out, b'=', size, None);
    append(out, theirs);
    marker(out, b'>', size, options.their_label.as_deref());
    extend(out, suffix);
}
