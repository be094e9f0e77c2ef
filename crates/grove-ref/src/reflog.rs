//! Per-reference logs under `<git-dir>/logs/`.
//!
//! One line per change, oldest first on disk:
//! `<old-hex> <new-hex> Name <email> <seconds> <tz>\t<message>\n`.
//! Every reader here hands entries back newest first.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bstr::{BStr, BString, ByteSlice, ByteVec};
use grove_hash::ObjectId;
use grove_utils::lockfile::LockFile;
use grove_utils::Signature;

use crate::error::RefError;
use crate::name::RefName;

/// `core.logAllRefUpdates`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReflogMode {
    /// Only append to logs that already exist.
    Off,
    /// `HEAD`, branches, remote-tracking refs and notes, plus existing logs.
    #[default]
    Normal,
    /// Every ref.
    Always,
}

impl ReflogMode {
    /// Map the config value; `None` (unset) is [`ReflogMode::Normal`].
    pub fn from_config(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("always") => Self::Always,
            Some("false" | "no" | "off" | "0") => Self::Off,
            _ => Self::Normal,
        }
    }

    pub(crate) fn should_create(self, name: &RefName) -> bool {
        match self {
            Self::Off => false,
            Self::Always => true,
            Self::Normal => {
                name.as_str() == crate::HEAD
                    || name.is_branch()
                    || name.is_remote()
                    || name.is_note()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflogEntry {
    pub old_oid: ObjectId,
    pub new_oid: ObjectId,
    pub committer: Signature,
    pub message: BString,
}

impl ReflogEntry {
    pub fn new(old_oid: ObjectId, new_oid: ObjectId, committer: Signature, message: &str) -> Self {
        Self {
            old_oid,
            new_oid,
            committer,
            message: normalize_message(message),
        }
    }

    pub fn parse(line: &BStr) -> Result<Self, RefError> {
        let bad = |detail: &str| RefError::parse("reflog entry", detail.to_owned());
        let line = line.as_bytes();
        let line = line.strip_suffix(b"\n").unwrap_or(line);

        let mut fields = line.splitn_str(3, " ");
        let mut next_oid = || -> Result<ObjectId, RefError> {
            let field = fields.next().ok_or_else(|| bad("missing object id"))?;
            let hex = field.to_str().map_err(|_| bad("object id is not UTF-8"))?;
            ObjectId::from_hex(hex).map_err(|e| bad(&e.to_string()))
        };
        let old_oid = next_oid()?;
        let new_oid = next_oid()?;
        let rest = fields.next().ok_or_else(|| bad("missing identity"))?;

        let (who, message) = match rest.find_byte(b'\t') {
            Some(tab) => (&rest[..tab], &rest[tab + 1..]),
            None => (rest, &b""[..]),
        };
        let committer = Signature::parse(who.as_bstr()).map_err(|e| bad(&e.to_string()))?;
        Ok(Self {
            old_oid,
            new_oid,
            committer,
            message: BString::from(message),
        })
    }

    /// One line, without the trailing newline.
    pub fn to_bytes(&self) -> BString {
        let mut out = BString::from(format!("{} {} ", self.old_oid, self.new_oid));
        out.push_str(self.committer.to_bytes());
        if !self.message.is_empty() {
            out.push_byte(b'\t');
            out.push_str(&self.message);
        }
        out
    }
}

/// Newlines would split the entry; collapse them like git does.
fn normalize_message(message: &str) -> BString {
    let joined: Vec<&str> = message.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    BString::from(joined.join(" "))
}

pub fn path(git_dir: &Path, name: &RefName) -> PathBuf {
    git_dir.join("logs").join(name.as_str())
}

pub fn exists(git_dir: &Path, name: &RefName) -> bool {
    path(git_dir, name).is_file()
}

fn read_file(git_dir: &Path, name: &RefName) -> Result<Vec<u8>, RefError> {
    match fs::read(path(git_dir, name)) {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Entries parsed on demand, newest first.
pub struct ReflogIter {
    data: Vec<u8>,
    /// End of the not yet yielded region.
    end: usize,
}

impl Iterator for ReflogIter {
    type Item = Result<ReflogEntry, RefError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.end == 0 {
                return None;
            }
            let region = &self.data[..self.end];
            let region = region.strip_suffix(b"\n").unwrap_or(region);
            let start = region.rfind_byte(b'\n').map_or(0, |i| i + 1);
            let line = &region[start..];
            self.end = start;
            if line.is_empty() {
                continue;
            }
            return Some(ReflogEntry::parse(line.as_bstr()));
        }
    }
}

pub fn iter(git_dir: &Path, name: &RefName) -> Result<ReflogIter, RefError> {
    let data = read_file(git_dir, name)?;
    let end = data.len();
    Ok(ReflogIter { data, end })
}

pub fn read(git_dir: &Path, name: &RefName) -> Result<Vec<ReflogEntry>, RefError> {
    iter(git_dir, name)?.collect()
}

pub fn count(git_dir: &Path, name: &RefName) -> Result<usize, RefError> {
    let data = read_file(git_dir, name)?;
    Ok(data.lines().filter(|l| !l.is_empty()).count())
}

/// Entry `index`, 0 being the newest.
pub fn entry_at(git_dir: &Path, name: &RefName, index: usize) -> Result<ReflogEntry, RefError> {
    iter(git_dir, name)?
        .nth(index)
        .transpose()?
        .ok_or_else(|| RefError::NoReflogEntry {
            name: name.to_string(),
            index,
        })
}

/// `name@{n}`: the value the ref held `n` changes ago.
pub fn resolve_at(git_dir: &Path, name: &RefName, n: usize) -> Result<ObjectId, RefError> {
    entry_at(git_dir, name, n).map(|entry| entry.new_oid)
}

/// `name@{<timestamp>}`: the value in effect at `timestamp`, or `None` if
/// the log starts later.
pub fn resolve_at_time(git_dir: &Path, name: &RefName, timestamp: i64) -> Result<Option<ObjectId>, RefError> {
    for entry in iter(git_dir, name)? {
        let entry = entry?;
        if entry.committer.date.timestamp <= timestamp {
            return Ok(Some(entry.new_oid));
        }
    }
    Ok(None)
}

/// Create the log file when `force` is set, otherwise append only if it
/// already exists.
pub(crate) fn append(git_dir: &Path, name: &RefName, entry: &ReflogEntry, force: bool) -> Result<(), RefError> {
    let path = path(git_dir, name);
    if !force && !path.is_file() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut line = entry.to_bytes();
    line.push_byte(b'\n');
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.write_all(&line)?;
    Ok(())
}

/// Drop entries older than `before` (seconds since the epoch). Returns how
/// many were removed.
pub fn expire(git_dir: &Path, name: &RefName, before: i64) -> Result<usize, RefError> {
    let newest_first = read(git_dir, name)?;
    let total = newest_first.len();
    let kept: Vec<&ReflogEntry> = newest_first
        .iter()
        .rev()
        .filter(|e| e.committer.date.timestamp >= before)
        .collect();
    let removed = total - kept.len();
    if removed == 0 {
        return Ok(0);
    }
    let mut lock = LockFile::acquire(path(git_dir, name))?;
    for entry in kept {
        let mut line = entry.to_bytes();
        line.push_byte(b'\n');
        lock.write_all(&line)?;
    }
    lock.commit()?;
    Ok(removed)
}

pub fn delete(git_dir: &Path, name: &RefName) -> Result<bool, RefError> {
    let path = path(git_dir, name);
    match fs::remove_file(&path) {
        Ok(()) => {
            crate::loose::prune_empty_parents(git_dir, &path);
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Move `old`'s log to `new`. Nothing happens when `old` has no log.
/// Move the log of `name` aside to a file named after it, so the ref's own
/// path is free to become a directory. Returns where it went.
pub(crate) fn park(git_dir: &Path, name: &RefName) -> Result<Option<PathBuf>, RefError> {
    let from = path(git_dir, name);
    if !from.is_file() {
        return Ok(None);
    }
    let flat = name.as_str().replace('/', "%");
    let to = git_dir
        .join("logs")
        .join(format!("renamed-log-{}-{flat}", std::process::id()));
    fs::rename(&from, &to)?;
    crate::loose::prune_empty_parents(git_dir, &from);
    Ok(Some(to))
}

/// Give a parked log to `name`.
pub(crate) fn unpark(git_dir: &Path, parked: &Path, name: &RefName) -> Result<(), RefError> {
    let to = path(git_dir, name);
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(parked, &to)?;
    Ok(())
}
