//! Tokenizer for git's INI dialect.
//!
//! Every byte of the input ends up in exactly one event's `raw` text, so a
//! file can be written back unchanged apart from the edited lines.

use bstr::{BString, ByteVec};

use crate::error::ConfigError;

const BOM: &[u8] = b"\xef\xbb\xbf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    /// `[section]`, `[section "sub"]` or the legacy `[section.sub]`.
    Section {
        raw: BString,
        name: BString,
        subsection: Option<BString>,
    },
    /// `name = value`, or a bare `name` (value `None`, which reads as true).
    Entry {
        raw: BString,
        name: BString,
        value: Option<BString>,
        line: usize,
    },
    /// Comments, blank lines, a leading BOM.
    Other(BString),
}

impl Event {
    pub(crate) fn raw(&self) -> &BString {
        match self {
            Event::Section { raw, .. } | Event::Entry { raw, .. } | Event::Other(raw) => raw,
        }
    }
}

pub(crate) fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-'
}

fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    origin: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::Parse {
            origin: self.origin.to_owned(),
            line: self.line,
            message: message.into(),
        }
    }

    fn skip_blanks(&mut self) {
        while self.peek().is_some_and(is_blank) {
            self.pos += 1;
        }
    }

    /// Consume `\n` or `\r\n` if it is next. Returns whether a line ended.
    fn eat_newline(&mut self) -> bool {
        match self.peek() {
            Some(b'\n') => {
                self.pos += 1;
                self.line += 1;
                true
            }
            Some(b'\r') if self.input.get(self.pos + 1) == Some(&b'\n') => {
                self.pos += 2;
                self.line += 1;
                true
            }
            _ => false,
        }
    }

    /// Skip to and through the end of the current line.
    fn finish_line(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'\n' {
                break;
            }
            self.pos += 1;
        }
        self.eat_newline();
    }

    /// After `]` or a value: only blanks and a comment may follow.
    fn expect_line_end(&mut self) -> Result<(), ConfigError> {
        self.skip_blanks();
        match self.peek() {
            None => Ok(()),
            Some(b'#' | b';') => {
                self.finish_line();
                Ok(())
            }
            Some(_) if self.eat_newline() => Ok(()),
            Some(b) => Err(self.error(format!("unexpected '{}' after section header", b as char))),
        }
    }

    fn section(&mut self) -> Result<(BString, Option<BString>), ConfigError> {
        self.pos += 1;
        let start = self.pos;
        while self.peek().is_some_and(|b| is_name_char(b) || b == b'.') {
            self.pos += 1;
        }
        let word = &self.input[start..self.pos];
        if word.is_empty() {
            return Err(self.error("empty section name"));
        }

        let mut subsection = None;
        let mut name = word.to_ascii_lowercase();
        if let Some(dot) = word.iter().position(|&b| b == b'.') {
            // Legacy form: the subsection is case-insensitive.
            name = word[..dot].to_ascii_lowercase();
            subsection = Some(BString::from(word[dot + 1..].to_ascii_lowercase()));
        } else if self.peek().is_some_and(is_blank) {
            self.skip_blanks();
            if self.peek() != Some(b'"') {
                return Err(self.error("expected '\"' before subsection name"));
            }
            self.pos += 1;
            let mut sub = BString::default();
            loop {
                match self.peek() {
                    None | Some(b'\n') => return Err(self.error("unterminated subsection name")),
                    Some(b'"') => {
                        self.pos += 1;
                        break;
                    }
                    Some(b'\\') => {
                        self.pos += 1;
                        match self.peek() {
                            None | Some(b'\n') => {
                                return Err(self.error("unterminated subsection name"))
                            }
                            Some(b) => sub.push_byte(b),
                        }
                        self.pos += 1;
                    }
                    Some(b) => {
                        sub.push_byte(b);
                        self.pos += 1;
                    }
                }
            }
            subsection = Some(sub);
        }

        if self.peek() != Some(b']') {
            return Err(self.error("expected ']' to close section header"));
        }
        self.pos += 1;
        self.expect_line_end()?;
        Ok((BString::from(name), subsection))
    }

    fn entry(&mut self) -> Result<(BString, Option<BString>), ConfigError> {
        let start = self.pos;
        while self.peek().is_some_and(is_name_char) {
            self.pos += 1;
        }
        let name = &self.input[start..self.pos];
        if name.is_empty() || !name[0].is_ascii_alphabetic() {
            return Err(self.error("variable names must start with a letter"));
        }
        let name = BString::from(name.to_ascii_lowercase());

        self.skip_blanks();
        match self.peek() {
            None => return Ok((name, None)),
            Some(b'#' | b';') => {
                self.finish_line();
                return Ok((name, None));
            }
            Some(b'=') => self.pos += 1,
            Some(_) if self.eat_newline() => return Ok((name, None)),
            Some(b) => return Err(self.error(format!("expected '=' after name, found '{}'", b as char))),
        }
        self.skip_blanks();
        let value = self.value()?;
        Ok((name, Some(value)))
    }

    /// Quotes toggle, escapes decode, `\` before a newline continues the
    /// value. Blanks outside quotes become spaces; trailing ones are dropped.
    fn value(&mut self) -> Result<BString, ConfigError> {
        let mut out = BString::default();
        let mut quoted = false;
        let mut pending_spaces = 0usize;

        loop {
            let Some(b) = self.peek() else {
                if quoted {
                    return Err(self.error("unterminated quoted value"));
                }
                break;
            };
            if b == b'\n' || (b == b'\r' && self.input.get(self.pos + 1) == Some(&b'\n')) {
                if quoted {
                    return Err(self.error("newline inside quoted value"));
                }
                self.eat_newline();
                break;
            }
            self.pos += 1;

            if !quoted && is_blank(b) {
                if !out.is_empty() {
                    pending_spaces += 1;
                }
                continue;
            }
            if !quoted && (b == b'#' || b == b';') {
                self.finish_line();
                break;
            }
            for _ in 0..pending_spaces {
                out.push_byte(b' ');
            }
            pending_spaces = 0;

            match b {
                b'"' => quoted = !quoted,
                b'\\' => {
                    let Some(esc) = self.peek() else {
                        return Err(self.error("backslash at end of input"));
                    };
                    if self.eat_newline() {
                        continue;
                    }
                    self.pos += 1;
                    match esc {
                        b'n' => out.push_byte(b'\n'),
                        b't' => out.push_byte(b'\t'),
                        b'b' => out.push_byte(0x08),
                        b'\\' | b'"' => out.push_byte(esc),
                        other => {
                            return Err(self.error(format!("unknown escape '\\{}'", other as char)))
                        }
                    }
                }
                other => out.push_byte(other),
            }
        }
        Ok(out)
    }
}

/// Split a whole file into events.
pub(crate) fn parse(input: &[u8], origin: &str) -> Result<Vec<Event>, ConfigError> {
    let mut events = Vec::new();
    let mut p = Parser {
        input,
        pos: 0,
        line: 1,
        origin,
    };
    if input.starts_with(BOM) {
        p.pos = BOM.len();
        events.push(Event::Other(BString::from(BOM)));
    }

    while p.pos < input.len() {
        let start = p.pos;
        let line = p.line;
        p.skip_blanks();
        match p.peek() {
            None => {}
            Some(b'#' | b';') => p.finish_line(),
            Some(b'[') => {
                let (name, subsection) = p.section()?;
                events.push(Event::Section {
                    raw: BString::from(&input[start..p.pos]),
                    name,
                    subsection,
                });
                continue;
            }
            Some(_) if p.eat_newline() => {}
            Some(_) => {
                let (name, value) = p.entry()?;
                events.push(Event::Entry {
                    raw: BString::from(&input[start..p.pos]),
                    name,
                    value,
                    line,
                });
                continue;
            }
        }
        events.push(Event::Other(BString::from(&input[start..p.pos])));
    }
    Ok(events)
}

/// Render `value` so that [`parse`] reads it back unchanged.
pub(crate) fn quote_value(value: &[u8]) -> BString {
    let needs_quotes = value.first().is_some_and(|&b| is_blank(b))
        || value.last().is_some_and(|&b| is_blank(b))
        || value.iter().any(|&b| b == b'#' || b == b';')
        || value.windows(2).any(|w| is_blank(w[0]) && is_blank(w[1]));

    let mut out = BString::default();
    if needs_quotes {
        out.push_byte(b'"');
    }
    for &b in value {
        match b {
            b'\n' => out.push_str(b"\\n"),
            b'\t' if !needs_quotes => out.push_str(b"\\t"),
            b'\\' => out.push_str(b"\\\\"),
            b'"' => out.push_str(b"\\\""),
            0x08 => out.push_str(b"\\b"),
            other => out.push_byte(other),
        }
    }
    if needs_quotes {
        out.push_byte(b'"');
    }
    out
}

/// `[name]` or `[name "sub"]` with the subsection escaped.
pub(crate) fn section_header(name: &[u8], subsection: Option<&[u8]>) -> BString {
    let mut out = BString::from("[");
    out.push_str(name);
    if let Some(sub) = subsection {
        out.push_str(b" \"");
        for &b in sub {
            if b == b'"' || b == b'\\' {
                out.push_byte(b'\\');
            }
            out.push_byte(b);
        }
        out.push_byte(b'"');
    }
    out.push_str(b"]\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(input: &str) -> Vec<(String, Option<String>)> {
        parse(input.as_bytes(), "test")
            .unwrap()
            .into_iter()
            .filter_map(|e| match e {
                Event::Entry { name, value, .. } => {
                    Some((name.to_string(), value.map(|v| v.to_string())))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn sections_and_subsections() {
        let events = parse(b"[Core]\n[remote \"Origin\"]\n[branch.Main]\n", "t").unwrap();
        let heads: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::Section { name, subsection, .. } => {
                    Some((name.to_string(), subsection.as_ref().map(|s| s.to_string())))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            heads,
            vec![
                ("core".into(), None),
                ("remote".into(), Some("Origin".into())),
                ("branch".into(), Some("main".into())),
            ]
        );
    }

    #[test]
    fn values_and_comments() {
        let got = entries(
            "[user]\n\tName = A  U   Thor # trailing\n\tbare\n\temail=\"x@y\" ; c\n",
        );
        assert_eq!(
            got,
            vec![
                ("name".into(), Some("A  U   Thor".into())),
                ("bare".into(), None),
                ("email".into(), Some("x@y".into())),
            ]
        );
    }

    #[test]
    fn quoted_escapes_and_continuation() {
        let got = entries("[a]\nk = \"one # two\\t\\\"q\\\"\"\nlong = first \\\n  second\n");
        assert_eq!(got[0].1.as_deref(), Some("one # two\t\"q\""));
        assert_eq!(got[1].1.as_deref(), Some("first second"));
    }

    #[test]
    fn crlf_lines() {
        let got = entries("[a]\r\nk = v\r\n");
        assert_eq!(got, vec![("k".into(), Some("v".into()))]);
    }

    #[test]
    fn raw_text_is_lossless() {
        let input = "\u{feff}# top\n[a \"b\\\"c\"]  ; note\n  k = v  # c\n\n  flag\n[d]\nx=1";
        let events = parse(input.as_bytes(), "t").unwrap();
        let mut joined = Vec::new();
        for e in &events {
            joined.extend_from_slice(e.raw());
        }
        assert_eq!(joined, input.as_bytes());
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = parse(b"[ok]\nk = v\n[broken\n", "cfg").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 3, .. }));
        assert!(parse(b"[a]\nk = \"open\n", "cfg").is_err());
        assert!(parse(b"[a]\n1k = v\n", "cfg").is_err());
        assert!(parse(b"[a]\nk = \\q\n", "cfg").is_err());
    }

    #[test]
    fn quoting_round_trips() {
        for value in ["plain", " lead", "trail ", "a # b", "semi;colon", "two  spaces", "tab\there", "nl\nx", "q\"\\"] {
            let line = format!("[s]\nk = {}\n", quote_value(value.as_bytes()));
            assert_eq!(entries(&line)[0].1.as_deref(), Some(value), "{line:?}");
        }
    }
}
