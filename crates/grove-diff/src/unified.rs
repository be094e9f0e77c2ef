//! `git diff` text for deltas and hunks.

use bstr::{BString, ByteSlice};
use grove_object::FileMode;

use crate::delta::{DeltaStatus, DiffDelta, DiffFile};
use crate::patch::{Hunk, LineOrigin};

const ABBREV: usize = 7;

fn push_line(out: &mut BString, parts: &[&[u8]]) {
    for part in parts {
        out.extend_from_slice(part);
    }
    out.push(b'\n');
}

fn mode_text(mode: FileMode) -> String {
    format!("{:06o}", mode.raw())
}

fn side_name(file: &DiffFile, prefix: &str) -> BString {
    if file.exists() {
        let mut name = BString::from(prefix);
        name.extend_from_slice(&file.path);
        name
    } else {
        BString::from("/dev/null")
    }
}

/// The `diff --git` block up to and including `---`/`+++`, which are only
/// written when the patch has hunks.
pub(crate) fn write_file_header(out: &mut BString, delta: &DiffDelta, old_prefix: &str, new_prefix: &str, has_hunks: bool) {
    let (old, new) = (&delta.old_file, &delta.new_file);
    let old_path = if old.exists() { &old.path } else { &new.path };
    let new_path = if new.exists() { &new.path } else { &old.path };
    push_line(
        out,
        &[b"diff --git ", old_prefix.as_bytes(), old_path, b" ", new_prefix.as_bytes(), new_path],
    );

    match (old.mode, new.mode) {
        (None, Some(mode)) => push_line(out, &[b"new file mode ", mode_text(mode).as_bytes()]),
        (Some(mode), None) => push_line(out, &[b"deleted file mode ", mode_text(mode).as_bytes()]),
        (Some(a), Some(b)) if a != b => {
            push_line(out, &[b"old mode ", mode_text(a).as_bytes()]);
            push_line(out, &[b"new mode ", mode_text(b).as_bytes()]);
        }
        _ => {}
    }

    let verb: Option<&[u8]> = match delta.status {
        DeltaStatus::Renamed => Some(b"rename"),
        DeltaStatus::Copied => Some(b"copy"),
        _ => None,
    };
    if let Some(verb) = verb {
        let percent = (delta.similarity * 100.0).round() as u32;
        push_line(out, &[b"similarity index ", percent.to_string().as_bytes(), b"%"]);
        push_line(out, &[verb, b" from ", &old.path]);
        push_line(out, &[verb, b" to ", &new.path]);
    }

    if old.oid != new.oid {
        let mut line = BString::from(format!("index {}..{}", old.oid.short_hex(ABBREV), new.oid.short_hex(ABBREV)));
        if let (Some(a), Some(b)) = (old.mode, new.mode) {
            if a == b {
                line.extend_from_slice(format!(" {}", mode_text(a)).as_bytes());
            }
        }
        push_line(out, &[&line]);
    }

    if has_hunks {
        push_line(out, &[b"--- ", &side_name(old, old_prefix)]);
        push_line(out, &[b"+++ ", &side_name(new, new_prefix)]);
    }
}

pub(crate) fn write_binary_notice(out: &mut BString, delta: &DiffDelta, old_prefix: &str, new_prefix: &str) {
    push_line(
        out,
        &[
            b"Binary files ",
            &side_name(&delta.old_file, old_prefix),
            b" and ",
            &side_name(&delta.new_file, new_prefix),
            b" differ",
        ],
    );
}

pub(crate) fn write_hunk(out: &mut BString, hunk: &Hunk) {
    out.extend_from_slice(&hunk.header);
    for line in &hunk.lines {
        if !line.origin.is_eof_marker() {
            out.push(line.origin.as_char() as u8);
        }
        out.extend_from_slice(&line.content);
    }
}
