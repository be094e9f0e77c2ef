//! Index-to-work-tree diff and the ignore rules that separate untracked
//! files from ignored ones.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::Path;

use bstr::{BStr, BString, ByteSlice};
use grove_index::Index;
use grove_object::ObjectType;
use grove_repository::{FilterDirection, Repository, Workdir, WorkdirFile};
use grove_utils::wildmatch::wildmatch;
use tracing::{debug, trace};

use crate::delta::{DeltaStatus, DiffDelta, DiffFile, FileFlags};
use crate::diff::{Diff, Side};
use crate::index::{index_file, split_index};
use crate::pathspec::Pathspec;
use crate::tree::{push_file_pair, sort_deltas};
use crate::{DiffError, DiffOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
struct IgnoreRule {
    pattern: BString,
    /// Directory holding the `.gitignore` the rule came from; empty for
    /// the root and `info/exclude`.
    base: BString,
    negated: bool,
    dir_only: bool,
    /// The pattern contains a `/`, so it matches from `base` rather than
    /// against the basename.
    anchored: bool,
}

impl IgnoreRule {
    fn parse(line: &[u8], base: &BStr) -> Option<Self> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let line = line.trim_end_with(|c| c == ' ');
        if line.is_empty() || line.starts_with(b"#") {
            return None;
        }
        let (negated, line) = match line.strip_prefix(b"!") {
            Some(rest) => (true, rest),
            None => (false, line.strip_prefix(b"\\").unwrap_or(line)),
        };
        let (dir_only, line) = match line.strip_suffix(b"/") {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        if line.is_empty() {
            return None;
        }
        let anchored = line.contains(&b'/');
        let pattern = line.strip_prefix(b"/").unwrap_or(line);
        Some(Self {
            pattern: pattern.into(),
            base: base.to_owned(),
            negated,
            dir_only,
            anchored,
        })
    }

    fn matches(&self, path: &BStr, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        let relative = if self.base.is_empty() {
            path
        } else {
            match path.strip_prefix(self.base.as_slice()).and_then(|r| r.strip_prefix(b"/")) {
                Some(rest) => rest.as_bstr(),
                None => return false,
            }
        };
        if self.anchored {
            wildmatch(self.pattern.as_bstr(), relative)
        } else {
            let name = relative.rsplit_str("/").next().unwrap_or_default();
            wildmatch(self.pattern.as_bstr(), name.as_bstr())
        }
    }
}

/// `.gitignore` style rules. Later rules override earlier ones, and a file
/// inside an ignored directory stays ignored.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &[u8]) -> Self {
        let mut rules = Self::new();
        rules.add_lines(text, BStr::new(""));
        rules
    }

    /// Append the rules in `text`, relative to directory `base`.
    pub fn add_lines(&mut self, text: &[u8], base: &BStr) {
        self.rules.extend(text.lines().filter_map(|line| IgnoreRule::parse(line, base)));
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// `info/exclude`, then every `.gitignore` in the work tree, shallow
    /// ones first.
    pub fn load(git_dir: &Path, workdir: &dyn Workdir) -> Result<Self, DiffError> {
        Self::from_files(git_dir, workdir, &workdir.list_files()?)
    }

    pub(crate) fn from_files(git_dir: &Path, workdir: &dyn Workdir, files: &[WorkdirFile]) -> Result<Self, DiffError> {
        let mut rules = Self::new();
        match std::fs::read(git_dir.join("info").join("exclude")) {
            Ok(text) => rules.add_lines(&text, BStr::new("")),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut ignore_files: Vec<&BStr> = files
            .iter()
            .map(|f| f.path.as_bstr())
            .filter(|p| *p == ".gitignore" || p.ends_with(b"/.gitignore"))
            .collect();
        ignore_files.sort_by_key(|p| p.iter().filter(|&&b| b == b'/').count());
        for path in ignore_files {
            let base = path.rsplit_once_str("/").map_or(BStr::new(""), |(dir, _)| dir.as_bstr());
            let text = workdir.read_file(path)?;
            rules.add_lines(&text, base);
        }
        trace!(rules = rules.len(), "loaded ignore rules");
        Ok(rules)
    }

    fn decide(&self, path: &BStr, is_dir: bool) -> Option<bool> {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(path, is_dir))
            .map(|rule| !rule.negated)
    }

    pub fn is_ignored(&self, path: &BStr) -> bool {
        for (i, &b) in path.iter().enumerate() {
            if b == b'/' && self.decide(path[..i].as_bstr(), true) == Some(true) {
                return true;
            }
        }
        self.decide(path, false) == Some(true)
    }
}

/// Diff the index (old) against the work tree (new). Work tree files are
/// hashed through the filter registry unless their cached stat data shows
/// them unchanged.
pub fn diff_index_to_workdir<'r>(
    repo: &'r Repository,
    index: &Index,
    workdir: &'r dyn Workdir,
    options: &DiffOptions,
) -> Result<Diff<'r>, DiffError> {
    let odb = repo.odb();
    let algo = repo.hash_algorithm();
    let pathspec = Pathspec::new(&options.pathspec);

    let listed = workdir.list_files()?;
    let ignores = if options.include_untracked || options.include_ignored {
        IgnoreRules::from_files(repo.git_dir(), workdir, &listed)?
    } else {
        IgnoreRules::new()
    };
    let files: BTreeMap<&BStr, &WorkdirFile> = listed
        .iter()
        .filter(|f| pathspec.matches(f.path.as_bstr()))
        .map(|f| (f.path.as_bstr(), f))
        .collect();
    let (resolved, conflicted) = split_index(index, &pathspec);

    let paths: BTreeSet<&BStr> = files
        .keys()
        .chain(resolved.keys())
        .chain(conflicted.keys())
        .copied()
        .collect();

    let unhashed = |file: &WorkdirFile| DiffFile {
        path: file.path.clone(),
        oid: algo.null_oid(),
        mode: Some(file.mode),
        size: file.size,
        flags: FileFlags::empty(),
    };

    let mut deltas = Vec::new();
    let mut hashed = 0usize;
    for path in paths {
        let file = files.get(path).copied();
        if let Some(ours) = conflicted.get(path) {
            let old = ours.map_or_else(|| DiffFile::absent(path, algo), index_file);
            let new = file.map_or_else(|| DiffFile::absent(path, algo), unhashed);
            deltas.push(DiffDelta::new(DeltaStatus::Conflicted, old, new));
            continue;
        }
        match (resolved.get(path).copied(), file) {
            (Some(entry), _) if entry.mode.is_gitlink() => {}
            (Some(entry), Some(file)) => {
                let mode = if options.ignore_filemode && entry.mode.is_blob() && file.mode.is_blob() {
                    entry.mode
                } else {
                    file.mode
                };
                let fresh = mode == entry.mode && file.stat.is_some_and(|st| entry.stat.is_fresh(&st));
                let new = if fresh {
                    DiffFile::known(path, entry.oid, mode, file.size)
                } else {
                    let raw = workdir.read_file(path)?;
                    let content = repo.filters().apply(path, &raw, FilterDirection::ToOdb)?;
                    hashed += 1;
                    DiffFile::known(path, odb.hash_only(&content, ObjectType::Blob)?, mode, content.len() as u64)
                };
                push_file_pair(index_file(entry), new, options, algo, &mut deltas);
            }
            (Some(entry), None) => deltas.push(DiffDelta::deleted(index_file(entry), algo)),
            (None, Some(file)) => {
                let status = if ignores.is_ignored(path) {
                    DeltaStatus::Ignored
                } else {
                    DeltaStatus::Untracked
                };
                let wanted = match status {
                    DeltaStatus::Ignored => options.include_ignored,
                    _ => options.include_untracked,
                };
                if wanted {
                    deltas.push(DiffDelta::new(status, DiffFile::absent(path, algo), unhashed(file)));
                }
            }
            (None, None) => {}
        }
    }

    let side = if options.reverse {
        deltas = deltas.into_iter().map(DiffDelta::reversed).collect();
        Side::Old
    } else {
        Side::New
    };
    sort_deltas(&mut deltas);
    debug!(deltas = deltas.len(), hashed, "diffed index to work tree");
    Diff::new(odb, Some(repo.filters()), Some((workdir, side)), deltas, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_and_anchored_rules() {
        let rules = IgnoreRules::parse(b"# comment\n*.log\n/build\ndocs/*.tmp\n\n");
        assert_eq!(rules.len(), 3);
        assert!(rules.is_ignored("a.log".into()));
        assert!(rules.is_ignored("deep/dir/a.log".into()));
        assert!(rules.is_ignored("build/out.o".into()));
        assert!(!rules.is_ignored("src/build/out.o".into()));
        assert!(rules.is_ignored("docs/x.tmp".into()));
        assert!(!rules.is_ignored("other/docs/x.tmp".into()));
        assert!(!rules.is_ignored("main.rs".into()));
    }

    #[test]
    fn negation_and_directories() {
        let rules = IgnoreRules::parse(b"*.txt\n!keep.txt\ntarget/\n");
        assert!(rules.is_ignored("a.txt".into()));
        assert!(!rules.is_ignored("keep.txt".into()));
        assert!(rules.is_ignored("target/debug/x".into()));
        // A file named like a dir-only pattern is not ignored.
        assert!(!rules.is_ignored("target".into()));
    }

    #[test]
    fn ignored_directory_cannot_be_reopened() {
        let rules = IgnoreRules::parse(b"out/\n!out/keep\n");
        assert!(rules.is_ignored("out/keep".into()));
    }

    #[test]
    fn nested_rules_are_relative() {
        let mut rules = IgnoreRules::new();
        rules.add_lines(b"/gen\n", "sub".into());
        assert!(rules.is_ignored("sub/gen/a".into()));
        assert!(!rules.is_ignored("gen/a".into()));
        assert!(!rules.is_ignored("subway/gen/a".into()));
    }
}
