//! The `key value` header block shared by commits and tags.
//!
//! A value continues onto following lines that start with a single space;
//! the block ends at the first empty line and the rest is the message.

use bstr::ByteSlice;

pub(crate) struct Fields<'a> {
    data: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            done: false,
        }
    }

    /// Offset of the message once the iterator is exhausted.
    pub(crate) fn message_start(&self) -> usize {
        self.pos.min(self.data.len())
    }

    fn line_end(&self, from: usize) -> usize {
        self.data[from..]
            .find_byte(b'\n')
            .map_or(self.data.len(), |p| p + from)
    }
}

impl<'a> Iterator for Fields<'a> {
    /// `(key, value)`; continuation lines are joined with `\n`.
    type Item = (&'a [u8], Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done || self.pos >= self.data.len() {
                self.done = true;
                return None;
            }
            if self.data[self.pos] == b'\n' {
                self.pos += 1;
                self.done = true;
                return None;
            }
            let end = self.line_end(self.pos);
            let line = &self.data[self.pos..end];
            self.pos = end + 1;

            // Lines without a space carry no value; skip them.
            let Some(space) = line.find_byte(b' ') else {
                continue;
            };
            let key = &line[..space];
            let mut value = line[space + 1..].to_vec();
            while self.pos < self.data.len() && self.data[self.pos] == b' ' {
                let end = self.line_end(self.pos);
                value.push(b'\n');
                value.extend_from_slice(&self.data[self.pos + 1..end]);
                self.pos = end + 1;
            }
            return Some((key, value));
        }
    }
}

/// Append `key value\n`, indenting continuation lines of multi-line values.
pub(crate) fn write_field(out: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    out.extend_from_slice(key);
    out.push(b' ');
    for (i, line) in value.split(|&b| b == b'\n').enumerate() {
        if i > 0 {
            out.extend_from_slice(b"\n ");
        }
        out.extend_from_slice(line);
    }
    out.push(b'\n');
}
