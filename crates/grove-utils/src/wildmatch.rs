//! Shell-style glob matching over `/`-separated paths, as used by
//! `.gitattributes` lines.
//!
//! `*` and `?` never match `/`. `**` spans directories when it stands as a
//! whole path component (`**/x`, `a/**/b`, `a/**`); elsewhere it acts like
//! `*`. Bracket expressions support ranges, negation with `!` or `^`, and
//! the POSIX classes `[:alpha:]`, `[:digit:]` and friends. A backslash
//! escapes the next byte.

use bstr::{BStr, BString, ByteSlice};

/// A glob kept alongside its matching options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wildmatch {
    pattern: BString,
    casefold: bool,
}

impl Wildmatch {
    pub fn new(pattern: impl Into<BString>) -> Self {
        Self {
            pattern: pattern.into(),
            casefold: false,
        }
    }

    pub fn casefold(mut self, yes: bool) -> Self {
        self.casefold = yes;
        self
    }

    pub fn pattern(&self) -> &BStr {
        self.pattern.as_bstr()
    }

    pub fn matches(&self, path: &BStr) -> bool {
        Matcher {
            pattern: &self.pattern,
            text: path,
            casefold: self.casefold,
        }
        .at(0, 0)
    }
}

/// One-shot form of [`Wildmatch::matches`].
pub fn wildmatch(pattern: &BStr, path: &BStr) -> bool {
    Matcher {
        pattern,
        text: path,
        casefold: false,
    }
    .at(0, 0)
}

struct Matcher<'a> {
    pattern: &'a [u8],
    text: &'a [u8],
    casefold: bool,
}

impl Matcher<'_> {
    fn same(&self, a: u8, b: u8) -> bool {
        a == b || (self.casefold && a.eq_ignore_ascii_case(&b))
    }

    fn at(&self, mut pi: usize, mut ti: usize) -> bool {
        let (p, t) = (self.pattern, self.text);
        while pi < p.len() {
            match p[pi] {
                b'*' => return self.star(pi, ti),
                b'?' => {
                    if ti >= t.len() || t[ti] == b'/' {
                        return false;
                    }
                }
                b'[' => match self.bracket(pi, t.get(ti).copied()) {
                    Some((hit, end)) => {
                        if !hit {
                            return false;
                        }
                        pi = end;
                        ti += 1;
                        continue;
                    }
                    // Unterminated: the bracket is an ordinary byte.
                    None => {
                        if ti >= t.len() || t[ti] != b'[' {
                            return false;
                        }
                    }
                },
                b'\\' if pi + 1 < p.len() => {
                    pi += 1;
                    if ti >= t.len() || !self.same(p[pi], t[ti]) {
                        return false;
                    }
                }
                c => {
                    if ti >= t.len() || !self.same(c, t[ti]) {
                        return false;
                    }
                }
            }
            pi += 1;
            ti += 1;
        }
        ti == t.len()
    }

    fn star(&self, pi: usize, ti: usize) -> bool {
        let (p, t) = (self.pattern, self.text);
        let mut rest = pi;
        while rest < p.len() && p[rest] == b'*' {
            rest += 1;
        }
        let component_start = pi == 0 || p[pi - 1] == b'/';
        let double = rest - pi >= 2 && component_start;

        if double && rest == p.len() {
            return true;
        }
        if double && p[rest] == b'/' {
            // Zero directories, or skip whole components one at a time.
            if self.at(rest + 1, ti) {
                return true;
            }
            return t[ti..]
                .iter()
                .enumerate()
                .filter(|(_, &b)| b == b'/')
                .any(|(i, _)| self.at(rest + 1, ti + i + 1));
        }

        for i in ti..=t.len() {
            if self.at(rest, i) {
                return true;
            }
            if i < t.len() && t[i] == b'/' {
                return false;
            }
        }
        false
    }

    /// Evaluates the bracket expression opening at `pi` against `ch`.
    /// Returns whether it matched and the index just past the closing `]`,
    /// or `None` when the expression never closes.
    fn bracket(&self, pi: usize, ch: Option<u8>) -> Option<(bool, usize)> {
        let p = self.pattern;
        let mut i = pi + 1;
        let negated = matches!(p.get(i), Some(b'!' | b'^'));
        if negated {
            i += 1;
        }

        let mut hit = false;
        let mut first = true;
        loop {
            let c = *p.get(i)?;
            if c == b']' && !first {
                break;
            }
            first = false;

            if c == b'[' && p.get(i + 1) == Some(&b':') {
                let close = p[i + 2..].find(":]")? + i + 2;
                if let Some(ch) = ch {
                    hit |= posix_class(&p[i + 2..close], ch, self.casefold);
                }
                i = close + 2;
                continue;
            }

            let (lo, next) = match c {
                b'\\' => (*p.get(i + 1)?, i + 2),
                _ => (c, i + 1),
            };
            if p.get(next) == Some(&b'-') && p.get(next + 1).is_some_and(|&b| b != b']') {
                let (hi, after) = match p[next + 1] {
                    b'\\' => (*p.get(next + 2)?, next + 3),
                    b => (b, next + 2),
                };
                if let Some(ch) = ch {
                    let folded = [ch, ch.to_ascii_lowercase(), ch.to_ascii_uppercase()];
                    let candidates = if self.casefold { &folded[..] } else { &folded[..1] };
                    hit |= candidates.iter().any(|&c| (lo..=hi).contains(&c));
                }
                i = after;
            } else {
                if let Some(ch) = ch {
                    hit |= self.same(lo, ch);
                }
                i = next;
            }
        }

        let Some(ch) = ch else {
            return Some((false, i + 1));
        };
        Some((hit != negated && ch != b'/', i + 1))
    }
}

fn posix_class(name: &[u8], ch: u8, casefold: bool) -> bool {
    match name {
        b"alnum" => ch.is_ascii_alphanumeric(),
        b"alpha" => ch.is_ascii_alphabetic(),
        b"blank" => ch == b' ' || ch == b'\t',
        b"cntrl" => ch.is_ascii_control(),
        b"digit" => ch.is_ascii_digit(),
        b"graph" => ch.is_ascii_graphic(),
        b"lower" => ch.is_ascii_lowercase() || (casefold && ch.is_ascii_uppercase()),
        b"print" => ch.is_ascii_graphic() || ch == b' ',
        b"punct" => ch.is_ascii_punctuation(),
        b"space" => ch.is_ascii_whitespace(),
        b"upper" => ch.is_ascii_uppercase() || (casefold && ch.is_ascii_lowercase()),
        b"xdigit" => ch.is_ascii_hexdigit(),
        _ => false,
    }
}
