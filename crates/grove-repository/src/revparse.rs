//! Revision expressions: `HEAD~2`, `main^2`, `v1.0^{tree}`, `@{1}`,
//! `topic:src/lib.rs` and friends.

use bstr::BStr;
use grove_hash::ObjectId;
use grove_object::ObjectType;
use grove_ref::RefName;
use tracing::trace;

use crate::{RepoError, Repository};

fn invalid(spec: &str, why: &str) -> RepoError {
    RepoError::InvalidRevision {
        spec: spec.to_owned(),
        reason: why.to_owned(),
    }
}

fn not_found(spec: &str) -> RepoError {
    RepoError::RevisionNotFound(spec.to_owned())
}

impl Repository {
    /// Resolve a revision expression to an object of any type.
    ///
    /// The base is a ref (short or full), `@` for `HEAD`, a hex id or unique
    /// prefix, optionally with `@{n}` for the n-th reflog entry. Any number
    /// of `~n`, `^n` and `^{type}` suffixes follow, and a final `:path`
    /// names an entry in the resulting tree.
    pub fn rev_parse(&self, spec: &str) -> Result<ObjectId, RepoError> {
        let (rev, path) = match spec.split_once(':') {
            Some((rev, path)) => (rev, Some(path)),
            None => (spec, None),
        };
        if rev.is_empty() {
            return Err(invalid(spec, "empty revision"));
        }

        let split = rev.find(&['~', '^'][..]).unwrap_or(rev.len());
        let (base, mut rest) = rev.split_at(split);
        let mut current = self.resolve_base(spec, base)?;

        while !rest.is_empty() {
            let op = rest.as_bytes()[0];
            if op != b'~' && op != b'^' {
                return Err(invalid(spec, "expected '~' or '^'"));
            }
            rest = &rest[1..];
            if op == b'^' && rest.starts_with('{') {
                let close = rest.find('}').ok_or_else(|| invalid(spec, "unclosed '^{'"))?;
                current = self.peel_to_kind(spec, &current, &rest[1..close])?;
                rest = &rest[close + 1..];
                continue;
            }
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            let count = match &rest[..digits] {
                "" => 1,
                n => n.parse::<usize>().map_err(|_| invalid(spec, "count out of range"))?,
            };
            rest = &rest[digits..];
            current = match op {
                b'~' => self.nth_ancestor(spec, &current, count)?,
                _ => self.nth_parent(spec, &current, count)?,
            };
        }

        match path {
            Some(path) => self.tree_path(spec, &current, path),
            None => {
                trace!(spec, oid = %current, "resolved revision");
                Ok(current)
            }
        }
    }

    fn resolve_base(&self, spec: &str, base: &str) -> Result<ObjectId, RepoError> {
        if let Some(open) = base.find("@{") {
            let (name, selector) = base.split_at(open);
            let n = selector[2..]
                .strip_suffix('}')
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| invalid(spec, "bad reflog selector"))?;
            let refname = match name {
                "" | "@" => RefName::head(),
                name => self.resolve_reference(name)?.name().clone(),
            };
            return match self.refs.resolve_reflog(&refname, n) {
                Ok(oid) => Ok(oid),
                Err(e) if e.kind() == grove_utils::ErrorKind::NotFound => Err(not_found(spec)),
                Err(e) => Err(e.into()),
            };
        }

        let name = if base == "@" { "HEAD" } else { base };
        if let Ok(reference) = self.resolve_reference(name) {
            return Ok(self.refs.resolve(&reference)?);
        }
        if name.len() >= 4 && name.bytes().all(|b| b.is_ascii_hexdigit()) {
            return match self.odb.resolve_prefix(name) {
                Ok(oid) => Ok(oid),
                Err(e) if e.kind() == grove_utils::ErrorKind::NotFound => Err(not_found(spec)),
                Err(e) => Err(e.into()),
            };
        }
        Err(not_found(spec))
    }

    /// `^{commit}`, `^{tree}`, `^{blob}`, `^{tag}`, `^{object}` and `^{}`.
    fn peel_to_kind(&self, spec: &str, oid: &ObjectId, kind: &str) -> Result<ObjectId, RepoError> {
        let wanted = match kind {
            "" => return Ok(self.peel(oid)?.0),
            "object" => {
                self.odb.read_header(oid)?;
                return Ok(*oid);
            }
            "tag" => {
                self.expect_kind(oid, ObjectType::Tag)?;
                return Ok(*oid);
            }
            "commit" => return self.peel_to_commit(oid),
            "tree" => return self.peel_to_tree(oid),
            "blob" => ObjectType::Blob,
            other => return Err(invalid(spec, &format!("unknown object type '{other}'"))),
        };
        let (peeled, actual) = self.peel(oid)?;
        if actual != wanted {
            return Err(RepoError::WrongObjectType {
                oid: peeled,
                expected: wanted.as_str(),
                actual: actual.as_str(),
            });
        }
        Ok(peeled)
    }

    /// `~n`: follow first parents `n` times.
    fn nth_ancestor(&self, spec: &str, oid: &ObjectId, n: usize) -> Result<ObjectId, RepoError> {
        let mut current = self.peel_to_commit(oid)?;
        for _ in 0..n {
            current = *self
                .find_commit(&current)?
                .parents
                .first()
                .ok_or_else(|| not_found(spec))?;
        }
        Ok(current)
    }

    /// `^n`: the n-th parent; `^0` is the commit itself.
    fn nth_parent(&self, spec: &str, oid: &ObjectId, n: usize) -> Result<ObjectId, RepoError> {
        let commit = self.peel_to_commit(oid)?;
        if n == 0 {
            return Ok(commit);
        }
        self.find_commit(&commit)?
            .parents
            .get(n - 1)
            .copied()
            .ok_or_else(|| not_found(spec))
    }

    /// The entry at `path` inside the tree of `oid`. An empty path is the
    /// tree itself.
    fn tree_path(&self, spec: &str, oid: &ObjectId, path: &str) -> Result<ObjectId, RepoError> {
        let mut current = self.peel_to_tree(oid)?;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let tree = self.find_tree(&current)?;
            let entry = tree
                .find(BStr::new(component))
                .ok_or_else(|| not_found(spec))?;
            current = entry.oid;
        }
        trace!(spec, path, oid = %current, "resolved tree path");
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_carry_the_expression() {
        let err = invalid("HEAD^{", "unclosed '^{'");
        assert_eq!(err.kind(), grove_utils::ErrorKind::InvalidArgument);
        assert_eq!(err.to_string(), "invalid revision 'HEAD^{': unclosed '^{'");
        let err = not_found("nope~3");
        assert_eq!(err.kind(), grove_utils::ErrorKind::NotFound);
    }
}
