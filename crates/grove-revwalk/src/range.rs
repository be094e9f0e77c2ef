use grove_hash::ObjectId;
use grove_repository::Repository;

use crate::merge_base::merge_bases;
use crate::RevWalkError;

/// The tips to push and hide for one revision expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRange {
    pub include: Vec<ObjectId>,
    pub exclude: Vec<ObjectId>,
    /// `A...B`: both tips included, their merge bases excluded.
    pub symmetric: bool,
}

impl RevisionRange {
    /// Parse `A..B`, `A...B`, `^A` or a single revision. An empty side of
    /// `..` or `...` means `HEAD`.
    pub fn parse(repo: &Repository, spec: &str) -> Result<Self, RevWalkError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(RevWalkError::InvalidRange("empty revision".into()));
        }

        if let Some((left, right)) = spec.split_once("...") {
            let a = resolve(repo, left)?;
            let b = resolve(repo, right)?;
            let exclude = match merge_bases(repo, &a, &b) {
                Ok(bases) => bases,
                Err(RevWalkError::NoMergeBase) => Vec::new(),
                Err(e) => return Err(e),
            };
            return Ok(Self {
                include: vec![a, b],
                exclude,
                symmetric: true,
            });
        }

        if let Some((left, right)) = spec.split_once("..") {
            if left.trim().is_empty() && right.trim().is_empty() {
                return Err(RevWalkError::InvalidRange(spec.to_owned()));
            }
            return Ok(Self {
                include: vec![resolve(repo, right)?],
                exclude: vec![resolve(repo, left)?],
                symmetric: false,
            });
        }

        if let Some(rest) = spec.strip_prefix('^') {
            return Ok(Self {
                include: Vec::new(),
                exclude: vec![resolve(repo, rest)?],
                symmetric: false,
            });
        }

        Ok(Self {
            include: vec![resolve(repo, spec)?],
            exclude: Vec::new(),
            symmetric: false,
        })
    }
}

fn resolve(repo: &Repository, rev: &str) -> Result<ObjectId, RevWalkError> {
    let rev = rev.trim();
    if rev.is_empty() {
        return Ok(repo.head_oid()?);
    }
    let oid = repo.rev_parse(rev)?;
    Ok(repo.peel_to_commit(&oid)?)
}
