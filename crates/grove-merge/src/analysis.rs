//! What merging a commit into HEAD would take, and the `MERGE_HEAD` state
//! of an unfinished merge.

use std::fmt::Write as _;

use bstr::ByteSlice;
use grove_config::{parse_bool, ConfigSet};
use grove_hash::ObjectId;
use grove_repository::Repository;
use grove_revwalk::is_ancestor;
use tracing::debug;

use crate::MergeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAnalysis {
    /// Their commit is already reachable from HEAD.
    UpToDate,
    /// HEAD is an ancestor of their commit.
    FastForward,
    /// The histories diverged; a real merge is needed.
    Normal,
    /// HEAD has no commit yet; their commit can simply be checked out.
    Unborn,
}

impl MergeAnalysis {
    pub fn can_fast_forward(&self) -> bool {
        matches!(self, Self::FastForward | Self::Unborn)
    }
}

/// The `merge.ff` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePreference {
    #[default]
    None,
    NoFastForward,
    FastForwardOnly,
}

impl MergePreference {
    pub fn from_config(config: &ConfigSet) -> Result<Self, MergeError> {
        let Some(value) = config.get_string("merge.ff")? else {
            return Ok(Self::None);
        };
        if value.eq_ignore_ascii_case("only") {
            return Ok(Self::FastForwardOnly);
        }
        Ok(match parse_bool("merge.ff", Some(value.as_bytes().as_bstr()))? {
            true => Self::None,
            false => Self::NoFastForward,
        })
    }
}

/// Classify a merge of `their_oid` into HEAD. Reads only.
pub fn analyze(repo: &Repository, their_oid: &ObjectId) -> Result<(MergeAnalysis, MergePreference), MergeError> {
    let preference = MergePreference::from_config(repo.config())?;
    let theirs = repo.peel_to_commit(their_oid)?;
    if repo.is_head_unborn()? {
        return Ok((MergeAnalysis::Unborn, preference));
    }
    let head = repo.head_oid()?;
    let analysis = if head == theirs || is_ancestor(repo, &theirs, &head)? {
        MergeAnalysis::UpToDate
    } else if is_ancestor(repo, &head, &theirs)? {
        MergeAnalysis::FastForward
    } else {
        MergeAnalysis::Normal
    };
    debug!(%head, %theirs, ?analysis, ?preference, "merge analysis");
    Ok((analysis, preference))
}

/// Commits recorded in `MERGE_HEAD`; empty when no merge is in progress.
pub fn merge_heads(repo: &Repository) -> Result<Vec<ObjectId>, MergeError> {
    let text = match std::fs::read_to_string(repo.git_dir().join("MERGE_HEAD")) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut heads = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let hex = line.split_whitespace().next().unwrap_or_default();
        let oid = ObjectId::from_hex(hex).map_err(|_| MergeError::MalformedMergeHead(line.to_string()))?;
        repo.find_commit(&oid)?;
        heads.push(oid);
    }
    Ok(heads)
}

/// Record an unfinished merge: `MERGE_HEAD` lists `heads`, `MERGE_MSG`
/// holds the proposed commit message.
pub fn write_merge_heads(repo: &Repository, heads: &[ObjectId], message: &str) -> Result<(), MergeError> {
    let mut text = String::new();
    for head in heads {
        let _ = writeln!(text, "{head}");
    }
    write_state_file(repo, "MERGE_HEAD", text.as_bytes())?;
    let mut message = message.to_string();
    if !message.ends_with('\n') {
        message.push('\n');
    }
    write_state_file(repo, "MERGE_MSG", message.as_bytes())?;
    debug!(heads = heads.len(), "wrote MERGE_HEAD");
    Ok(())
}

fn write_state_file(repo: &Repository, name: &str, bytes: &[u8]) -> Result<(), MergeError> {
    let mut lock = grove_utils::lockfile::LockFile::acquire(repo.git_dir().join(name))?;
    std::io::Write::write_all(&mut lock, bytes)?;
    lock.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_forward_possible() {
        assert!(MergeAnalysis::FastForward.can_fast_forward());
        assert!(MergeAnalysis::Unborn.can_fast_forward());
        assert!(!MergeAnalysis::Normal.can_fast_forward());
        assert!(!MergeAnalysis::UpToDate.can_fast_forward());
    }

    #[test]
    fn preference_from_merge_ff() {
        let mut config = ConfigSet::new();
        assert_eq!(MergePreference::from_config(&config).unwrap(), MergePreference::None);
        config.set_override("merge.ff", "only").unwrap();
        assert_eq!(
            MergePreference::from_config(&config).unwrap(),
            MergePreference::FastForwardOnly
        );
        config.set_override("merge.ff", "false").unwrap();
        assert_eq!(
            MergePreference::from_config(&config).unwrap(),
            MergePreference::NoFastForward
        );
        config.set_override("merge.ff", "yes").unwrap();
        assert_eq!(MergePreference::from_config(&config).unwrap(), MergePreference::None);
        config.set_override("merge.ff", "sometimes").unwrap();
        assert!(MergePreference::from_config(&config).is_err());
    }
}
