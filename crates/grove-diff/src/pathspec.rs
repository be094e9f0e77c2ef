//! Path filtering: each spec is a literal prefix (matching a file or
//! everything below a directory) or, when it contains glob characters, a
//! wildmatch pattern over the whole path.

use bstr::{BStr, BString, ByteSlice};
use grove_utils::wildmatch::wildmatch;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Pathspec<'a> {
    specs: &'a [BString],
}

fn is_glob(spec: &[u8]) -> bool {
    spec.iter().any(|b| matches!(b, b'*' | b'?' | b'['))
}

fn under(path: &[u8], dir: &[u8]) -> bool {
    let dir = dir.strip_suffix(b"/").unwrap_or(dir);
    path == dir || (path.starts_with(dir) && path.get(dir.len()) == Some(&b'/'))
}

impl<'a> Pathspec<'a> {
    pub(crate) fn new(specs: &'a [BString]) -> Self {
        Self { specs }
    }

    pub(crate) fn matches(&self, path: &BStr) -> bool {
        self.specs.is_empty()
            || self.specs.iter().any(|spec| {
                if is_glob(spec) {
                    wildmatch(spec.as_bstr(), path)
                        || (under(path, literal_prefix(spec)) && wildmatch(spec.as_bstr(), parent_prefix(path, spec)))
                } else {
                    spec.is_empty() || under(path, spec)
                }
            })
    }

    /// Whether anything below directory `dir` can match.
    pub(crate) fn may_contain(&self, dir: &BStr) -> bool {
        self.specs.is_empty()
            || self.specs.iter().any(|spec| {
                let literal = if is_glob(spec) { literal_prefix(spec) } else { spec.as_slice() };
                literal.is_empty() || under(dir, literal) || under(literal, dir)
            })
    }
}

/// The part of a glob before its first wildcard, cut back to a `/`.
fn literal_prefix(spec: &[u8]) -> &[u8] {
    let end = spec.iter().position(|b| matches!(b, b'*' | b'?' | b'[')).unwrap_or(spec.len());
    match spec[..end].rfind_byte(b'/') {
        Some(slash) => &spec[..slash],
        None => &[],
    }
}

/// `path` truncated to as many components as `spec` has, so `src/*`
/// matches everything below `src/x`.
fn parent_prefix<'p>(path: &'p BStr, spec: &[u8]) -> &'p BStr {
    let components = spec.iter().filter(|&&b| b == b'/').count() + 1;
    let mut seen = 0;
    for (i, b) in path.iter().enumerate() {
        if *b == b'/' {
            seen += 1;
            if seen == components {
                return path[..i].as_bstr();
            }
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(list: &[&str]) -> Vec<BString> {
        list.iter().map(|s| BString::from(*s)).collect()
    }

    #[test]
    fn empty_matches_everything() {
        let none = Vec::new();
        let spec = Pathspec::new(&none);
        assert!(spec.matches("a/b".into()));
        assert!(spec.may_contain("a".into()));
    }

    #[test]
    fn prefixes_match_whole_components() {
        let list = specs(&["src", "docs/"]);
        let spec = Pathspec::new(&list);
        assert!(spec.matches("src".into()));
        assert!(spec.matches("src/main.rs".into()));
        assert!(spec.matches("docs/a.md".into()));
        assert!(!spec.matches("srcs/x".into()));
        assert!(!spec.matches("README".into()));
        assert!(spec.may_contain("src".into()));
        assert!(!spec.may_contain("lib".into()));
    }

    #[test]
    fn nested_prefix_reaches_through_parents() {
        let list = specs(&["a/b/c.txt"]);
        let spec = Pathspec::new(&list);
        assert!(spec.may_contain("a".into()));
        assert!(spec.may_contain("a/b".into()));
        assert!(!spec.may_contain("a/c".into()));
        assert!(spec.matches("a/b/c.txt".into()));
    }

    #[test]
    fn globs() {
        let list = specs(&["*.rs", "docs/*"]);
        let spec = Pathspec::new(&list);
        assert!(spec.matches("main.rs".into()));
        assert!(!spec.matches("main.c".into()));
        assert!(spec.matches("docs/a.md".into()));
        assert!(spec.matches("docs/deep/b.md".into()));
        assert!(spec.may_contain("docs".into()));
        assert!(spec.may_contain("anything".into()));
    }
}
