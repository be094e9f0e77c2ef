//! Hunks and lines for one delta.

use bstr::{BString, ByteSlice};
use grove_hash::{HashAlgorithm, Hasher, ObjectId};
use grove_object::{FileMode, Object};
use grove_repository::{FilterRegistry, Repository};
use regex::bytes::Regex;

use crate::algorithm::{diff_lines, split_lines, Edit, EditOp};
use crate::delta::{DeltaStatus, DiffDelta, DiffFile, FileFlags};
use crate::{binary, unified, DiffError, DiffOptions};

/// Text of the line that follows a line lacking its final newline.
pub(crate) const NO_NEWLINE_MARKER: &[u8] = b"\n\\ No newline at end of file\n";

/// Longest hunk header context, in bytes.
const MAX_FUNCNAME: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOrigin {
    Context,
    Addition,
    Deletion,
    /// Both sides lack a final newline.
    ContextEofNl,
    /// The new side lacks a final newline.
    AddEofNl,
    /// The old side lacks a final newline.
    DelEofNl,
}

impl LineOrigin {
    pub fn as_char(self) -> char {
        match self {
            Self::Context => ' ',
            Self::Addition => '+',
            Self::Deletion => '-',
            Self::ContextEofNl => '=',
            Self::AddEofNl => '>',
            Self::DelEofNl => '<',
        }
    }

    pub fn is_eof_marker(self) -> bool {
        matches!(self, Self::ContextEofNl | Self::AddEofNl | Self::DelEofNl)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub origin: LineOrigin,
    pub content: BString,
    /// 1-based; `-1` for additions and markers.
    pub old_lineno: i64,
    /// 1-based; `-1` for deletions and markers.
    pub new_lineno: i64,
    /// Newlines in `content`.
    pub num_lines: usize,
}

impl DiffLine {
    fn new(origin: LineOrigin, content: &[u8], old_lineno: i64, new_lineno: i64) -> Self {
        Self {
            origin,
            content: content.into(),
            old_lineno,
            new_lineno,
            num_lines: content.iter().filter(|&&b| b == b'\n').count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// `@@ -a,b +c,d @@ context` with its newline.
    pub header: BString,
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    pub fn lines(&self) -> &[DiffLine] {
        &self.lines
    }
}

/// Hunk header context selection.
#[derive(Debug, Clone)]
pub(crate) enum Funcname {
    /// A line starting with a letter, `_` or `$`.
    Default,
    Pattern(Regex),
}

impl Funcname {
    pub(crate) fn from_options(options: &DiffOptions) -> Result<Self, DiffError> {
        Ok(match &options.funcname_pattern {
            Some(pattern) => Self::Pattern(Regex::new(pattern)?),
            None => Self::Default,
        })
    }

    fn context<'l>(&self, line: &'l [u8]) -> Option<&'l [u8]> {
        let line = line.trim_end();
        let found = match self {
            Self::Default => match line.first() {
                Some(b) if b.is_ascii_alphabetic() || *b == b'_' || *b == b'$' => line,
                _ => return None,
            },
            Self::Pattern(re) => {
                let caps = re.captures(line)?;
                caps.get(1).or_else(|| caps.get(0))?.as_bytes()
            }
        };
        let found = found.trim_end();
        Some(&found[..found.len().min(MAX_FUNCNAME)])
    }
}

/// The line-level form of one [`DiffDelta`].
#[derive(Debug, Clone)]
pub struct Patch {
    delta: DiffDelta,
    hunks: Vec<Hunk>,
    old_prefix: String,
    new_prefix: String,
}

impl Patch {
    /// Diff `old` against `new` as the contents of `delta`. Fails with
    /// `BinaryContent` unless both sides are text or `force_text` is set.
    pub(crate) fn from_buffers(
        mut delta: DiffDelta,
        old: &[u8],
        new: &[u8],
        options: &DiffOptions,
        funcname: &Funcname,
        filters: Option<&FilterRegistry>,
    ) -> Result<Self, DiffError> {
        if !options.force_text && binary::is_binary(filters, delta.path(), [old, new], options.max_binary_scan) {
            return Err(DiffError::BinaryContent {
                path: delta.path().to_owned(),
            });
        }
        delta.old_file.flags |= FileFlags::NOT_BINARY;
        delta.new_file.flags |= FileFlags::NOT_BINARY;

        let old_lines = split_lines(old);
        let new_lines = split_lines(new);
        let edits = diff_lines(&old_lines, &new_lines, options.algorithm, options.whitespace());
        let hunks = build_hunks(
            &old_lines,
            &new_lines,
            &edits,
            options.context_lines as usize,
            options.interhunk_lines as usize,
            funcname,
        );
        Ok(Self {
            delta,
            hunks,
            old_prefix: options.old_prefix.clone(),
            new_prefix: options.new_prefix.clone(),
        })
    }

    pub fn delta(&self) -> &DiffDelta {
        &self.delta
    }

    pub fn hunks(&self) -> &[Hunk] {
        &self.hunks
    }

    pub fn num_hunks(&self) -> usize {
        self.hunks.len()
    }

    pub fn hunk(&self, index: usize) -> Option<&Hunk> {
        self.hunks.get(index)
    }

    pub fn line_in_hunk(&self, hunk: usize, line: usize) -> Option<&DiffLine> {
        self.hunks.get(hunk)?.lines.get(line)
    }

    /// Lines of context, additions and deletions. Markers are not counted.
    pub fn line_stats(&self) -> (usize, usize, usize) {
        let mut stats = (0, 0, 0);
        for line in self.hunks.iter().flat_map(|h| &h.lines) {
            match line.origin {
                LineOrigin::Context => stats.0 += 1,
                LineOrigin::Addition => stats.1 += 1,
                LineOrigin::Deletion => stats.2 += 1,
                _ => {}
            }
        }
        stats
    }

    /// Bytes of line content, optionally with context lines, hunk headers
    /// and the `diff --git` file header.
    pub fn size(&self, include_context: bool, include_hunk_headers: bool, include_file_headers: bool) -> usize {
        let mut size = 0;
        for hunk in &self.hunks {
            if include_hunk_headers {
                size += hunk.header.len();
            }
            for line in &hunk.lines {
                let context = matches!(line.origin, LineOrigin::Context | LineOrigin::ContextEofNl);
                if include_context || !context {
                    size += line.content.len();
                }
            }
        }
        if include_file_headers {
            size += self.file_header().len();
        }
        size
    }

    pub(crate) fn file_header(&self) -> BString {
        let mut out = BString::default();
        unified::write_file_header(&mut out, &self.delta, &self.old_prefix, &self.new_prefix, !self.hunks.is_empty());
        out
    }

    /// The patch as `git diff` prints it.
    pub fn to_unified(&self) -> BString {
        let mut out = self.file_header();
        for hunk in &self.hunks {
            unified::write_hunk(&mut out, hunk);
        }
        out
    }
}

fn range(start: usize, count: usize) -> String {
    if count == 1 {
        start.to_string()
    } else {
        format!("{start},{count}")
    }
}

fn build_hunks(
    old: &[&[u8]],
    new: &[&[u8]],
    edits: &[Edit],
    context: usize,
    interhunk: usize,
    funcname: &Funcname,
) -> Vec<Hunk> {
    let changes: Vec<usize> = edits
        .iter()
        .enumerate()
        .filter(|(_, e)| e.op != EditOp::Equal)
        .map(|(i, _)| i)
        .collect();

    let mut hunks = Vec::new();
    let mut group_start = 0;
    while group_start < changes.len() {
        let mut group_end = group_start;
        while group_end + 1 < changes.len()
            && changes[group_end + 1] - changes[group_end] - 1 <= 2 * context + interhunk
        {
            group_end += 1;
        }
        let first = changes[group_start].saturating_sub(context);
        let last = (changes[group_end] + context).min(edits.len() - 1);
        hunks.push(make_hunk(old, new, &edits[first..=last], funcname));
        group_start = group_end + 1;
    }
    hunks
}

fn make_hunk(old: &[&[u8]], new: &[&[u8]], edits: &[Edit], funcname: &Funcname) -> Hunk {
    let head = edits[0];
    let old_count = edits.iter().filter(|e| e.op != EditOp::Insert).count();
    let new_count = edits.iter().filter(|e| e.op != EditOp::Delete).count();
    let old_start = head.old_index + usize::from(old_count > 0);
    let new_start = head.new_index + usize::from(new_count > 0);

    let mut header = BString::from(format!("@@ -{} +{} @@", range(old_start, old_count), range(new_start, new_count)));
    if let Some(context) = old[..head.old_index].iter().rev().find_map(|l| funcname.context(l)) {
        header.push(b' ');
        header.extend_from_slice(context);
    }
    header.push(b'\n');

    let mut lines = Vec::with_capacity(edits.len() + 1);
    for edit in edits {
        let (origin, marker, content, old_lineno, new_lineno) = match edit.op {
            EditOp::Equal => (
                LineOrigin::Context,
                LineOrigin::ContextEofNl,
                old[edit.old_index],
                edit.old_index as i64 + 1,
                edit.new_index as i64 + 1,
            ),
            EditOp::Delete => (
                LineOrigin::Deletion,
                LineOrigin::DelEofNl,
                old[edit.old_index],
                edit.old_index as i64 + 1,
                -1,
            ),
            EditOp::Insert => (
                LineOrigin::Addition,
                LineOrigin::AddEofNl,
                new[edit.new_index],
                -1,
                edit.new_index as i64 + 1,
            ),
        };
        lines.push(DiffLine::new(origin, content, old_lineno, new_lineno));
        if !content.ends_with(b"\n") {
            lines.push(DiffLine::new(marker, NO_NEWLINE_MARKER, -1, -1));
        }
    }

    Hunk {
        header,
        old_start: old_start as u32,
        old_lines: old_count as u32,
        new_start: new_start as u32,
        new_lines: new_count as u32,
        lines,
    }
}

fn status_of(old: Option<&[u8]>, new: Option<&[u8]>) -> DeltaStatus {
    match (old, new) {
        (None, Some(_)) => DeltaStatus::Added,
        (Some(_), None) => DeltaStatus::Deleted,
        (Some(a), Some(b)) if a == b => DeltaStatus::Unmodified,
        _ => DeltaStatus::Modified,
    }
}

/// Patch between two in-memory buffers. `None` is an absent file.
pub fn diff_buffers(
    old: Option<&[u8]>,
    old_path: &str,
    new: Option<&[u8]>,
    new_path: &str,
    options: &DiffOptions,
) -> Result<Patch, DiffError> {
    let algo = HashAlgorithm::default();
    let side = |data: Option<&[u8]>, path: &str| -> Result<DiffFile, DiffError> {
        Ok(match data {
            Some(data) => DiffFile::known(
                path,
                Hasher::hash_object(algo, "blob", data)?,
                FileMode::Regular,
                data.len() as u64,
            ),
            None => DiffFile::absent(path, algo),
        })
    };
    let mut delta = DiffDelta::new(status_of(old, new), side(old, old_path)?, side(new, new_path)?);
    let (mut old, mut new) = (old.unwrap_or_default(), new.unwrap_or_default());
    if options.reverse {
        delta = delta.reversed();
        std::mem::swap(&mut old, &mut new);
    }
    Patch::from_buffers(delta, old, new, options, &Funcname::from_options(options)?, None)
}

fn read_blob(repo: &Repository, oid: &ObjectId) -> Result<Vec<u8>, DiffError> {
    match repo.odb().read(oid)? {
        Object::Blob(blob) => Ok(blob.data),
        other => Err(DiffError::WrongObjectType {
            oid: *oid,
            expected: "blob",
            actual: other.object_type().as_str(),
        }),
    }
}

/// Patch between two blobs. `None` is an absent file.
pub fn diff_blobs(
    repo: &Repository,
    old: Option<&ObjectId>,
    old_path: &str,
    new: Option<&ObjectId>,
    new_path: &str,
    options: &DiffOptions,
) -> Result<Patch, DiffError> {
    let algo = repo.hash_algorithm();
    let old_data = old.map(|oid| read_blob(repo, oid)).transpose()?;
    let new_data = new.map(|oid| read_blob(repo, oid)).transpose()?;
    let side = |oid: Option<&ObjectId>, data: &Option<Vec<u8>>, path: &str| match (oid, data) {
        (Some(oid), Some(data)) => DiffFile::known(path, *oid, FileMode::Regular, data.len() as u64),
        _ => DiffFile::absent(path, algo),
    };
    let status = match (old, new) {
        (Some(a), Some(b)) if a == b => DeltaStatus::Unmodified,
        _ => status_of(old_data.as_deref(), new_data.as_deref()),
    };
    let mut delta = DiffDelta::new(status, side(old, &old_data, old_path), side(new, &new_data, new_path));
    let (mut old_bytes, mut new_bytes) = (old_data.as_deref().unwrap_or_default(), new_data.as_deref().unwrap_or_default());
    if options.reverse {
        delta = delta.reversed();
        std::mem::swap(&mut old_bytes, &mut new_bytes);
    }
    Patch::from_buffers(
        delta,
        old_bytes,
        new_bytes,
        options,
        &Funcname::from_options(options)?,
        Some(repo.filters()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(old: &[u8], new: &[u8]) -> Patch {
        diff_buffers(Some(old), "f.txt", Some(new), "f.txt", &DiffOptions::default()).unwrap()
    }

    fn origins(hunk: &Hunk) -> String {
        hunk.lines.iter().map(|l| l.origin.as_char()).collect()
    }

    #[test]
    fn single_line_change() {
        let p = patch(b"a\nb\nc\n", b"a\nX\nc\n");
        assert_eq!(p.num_hunks(), 1);
        let hunk = &p.hunks()[0];
        assert_eq!(hunk.header, "@@ -1,3 +1,3 @@\n");
        assert_eq!(origins(hunk), " -+ ");
        assert_eq!((hunk.old_start, hunk.old_lines, hunk.new_start, hunk.new_lines), (1, 3, 1, 3));
        assert_eq!(p.line_stats(), (2, 1, 1));

        let del = &hunk.lines[1];
        assert_eq!((del.old_lineno, del.new_lineno), (2, -1));
        let add = &hunk.lines[2];
        assert_eq!((add.old_lineno, add.new_lineno), (-1, 2));
        assert_eq!(add.content, "X\n");
        assert_eq!(add.num_lines, 1);
    }

    #[test]
    fn identical_buffers_have_no_hunks() {
        let p = patch(b"same\n", b"same\n");
        assert_eq!(p.delta().status, DeltaStatus::Unmodified);
        assert_eq!(p.num_hunks(), 0);
    }

    #[test]
    fn missing_final_newline_gets_markers() {
        let p = patch(b"a\nb", b"a\nc");
        let hunk = &p.hunks()[0];
        assert_eq!(origins(hunk), " -<+>");
        assert_eq!(hunk.lines[2].content, NO_NEWLINE_MARKER);
        assert_eq!(hunk.lines[2].old_lineno, -1);

        let p = patch(b"a\nb", b"a\nb\n");
        assert_eq!(origins(&p.hunks()[0]), " -<+");
    }

    #[test]
    fn far_apart_changes_split_into_hunks() {
        let old: Vec<u8> = (1..=20).flat_map(|i| format!("line {i}\n").into_bytes()).collect();
        let new = String::from_utf8(old.clone()).unwrap().replace("line 2\n", "two\n").replace("line 19\n", "nineteen\n");
        let p = patch(&old, new.as_bytes());
        assert_eq!(p.num_hunks(), 2);
        assert_eq!(p.hunks()[0].header, "@@ -1,5 +1,5 @@\n");
        assert_eq!(p.hunks()[1].header, "@@ -16,5 +16,5 @@ line 15\n");

        let merged = DiffOptions {
            interhunk_lines: 20,
            ..DiffOptions::default()
        };
        let p = diff_buffers(Some(&old[..]), "f", Some(new.as_bytes()), "f", &merged).unwrap();
        assert_eq!(p.num_hunks(), 1);
    }

    #[test]
    fn pure_insertion_and_empty_sides() {
        let p = patch(b"a\nb\n", b"a\nb\nc\n");
        assert_eq!(p.hunks()[0].header, "@@ -1,2 +1,3 @@\n");

        let added = diff_buffers(None, "n.txt", Some(&b"x\ny\n"[..]), "n.txt", &DiffOptions::default()).unwrap();
        assert_eq!(added.delta().status, DeltaStatus::Added);
        assert_eq!(added.hunks()[0].header, "@@ -0,0 +1,2 @@\n");

        let ctx0 = DiffOptions {
            context_lines: 0,
            ..DiffOptions::default()
        };
        let p = diff_buffers(Some(&b"a\nb\nc\n"[..]), "f", Some(&b"a\nb\nX\nc\n"[..]), "f", &ctx0).unwrap();
        assert_eq!(p.hunks()[0].header, "@@ -2,0 +3 @@ b\n");
    }

    #[test]
    fn custom_funcname_pattern() {
        let options = DiffOptions {
            funcname_pattern: Some(r"^\s*fn (\w+)".into()),
            context_lines: 1,
            ..DiffOptions::default()
        };
        let old = b"fn alpha() {\n    let x = 1;\n    let y = 2;\n    x + y\n}\n";
        let new = b"fn alpha() {\n    let x = 1;\n    let y = 3;\n    x + y\n}\n";
        let p = diff_buffers(Some(&old[..]), "f.rs", Some(&new[..]), "f.rs", &options).unwrap();
        assert_eq!(p.hunks()[0].header, "@@ -2,3 +2,3 @@ alpha\n");

        let bad = DiffOptions {
            funcname_pattern: Some("(".into()),
            ..DiffOptions::default()
        };
        let err = diff_buffers(Some(&old[..]), "f", Some(&new[..]), "f", &bad).unwrap_err();
        assert_eq!(err.kind(), grove_utils::ErrorKind::InvalidArgument);
    }

    #[test]
    fn binary_buffers_fail_unless_forced() {
        let err = diff_buffers(Some(&b"a\0b"[..]), "x.bin", Some(&b"a\0c"[..]), "x.bin", &DiffOptions::default()).unwrap_err();
        assert_eq!(err.kind(), grove_utils::ErrorKind::BinaryContent);

        let forced = DiffOptions {
            force_text: true,
            ..DiffOptions::default()
        };
        let p = diff_buffers(Some(&b"a\0b"[..]), "x.bin", Some(&b"a\0c"[..]), "x.bin", &forced).unwrap();
        assert_eq!(p.num_hunks(), 1);
    }

    #[test]
    fn whitespace_only_change_can_be_ignored() {
        let options = DiffOptions {
            ignore_whitespace_change: true,
            ..DiffOptions::default()
        };
        let p = diff_buffers(Some(&b"a  b\n"[..]), "f", Some(&b"a b \n"[..]), "f", &options).unwrap();
        assert_eq!(p.num_hunks(), 0);
    }

    #[test]
    fn size_counts_selected_parts() {
        let p = patch(b"a\nb\nc\n", b"a\nX\nc\n");
        assert_eq!(p.size(false, false, false), 4);
        assert_eq!(p.size(true, false, false), 8);
        assert_eq!(p.size(true, true, false), 8 + "@@ -1,3 +1,3 @@\n".len());
        assert!(p.size(true, true, true) > p.size(true, true, false));
    }

    #[test]
    fn reverse_swaps_sides() {
        let options = DiffOptions {
            reverse: true,
            ..DiffOptions::default()
        };
        let p = diff_buffers(None, "f", Some(&b"x\n"[..]), "f", &options).unwrap();
        assert_eq!(p.delta().status, DeltaStatus::Deleted);
        assert_eq!(origins(&p.hunks()[0]), "-");
    }

    #[test]
    fn line_lookup() {
        let p = patch(b"a\n", b"b\n");
        assert_eq!(p.line_in_hunk(0, 1).map(|l| l.origin), Some(LineOrigin::Addition));
        assert!(p.line_in_hunk(0, 2).is_none());
        assert!(p.line_in_hunk(1, 0).is_none());
        assert!(p.hunk(0).is_some());
        assert!(p.to_unified().contains_str("+b\n"));
    }
}
