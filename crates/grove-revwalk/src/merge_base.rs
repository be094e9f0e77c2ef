//! Merge bases by painting: ancestors of one side get `PARENT1`, of the
//! other `PARENT2`. A commit carrying both is a common ancestor, and
//! everything below it is marked `STALE` so that only the lowest common
//! ancestors survive.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use grove_hash::ObjectId;
use grove_repository::Repository;
use tracing::debug;

use crate::walk::{read_commit_info, CommitInfo};
use crate::{RevWalk, RevWalkError};

const PARENT1: u8 = 1;
const PARENT2: u8 = 1 << 1;
const STALE: u8 = 1 << 2;
const RESULT: u8 = 1 << 3;

struct PaintEntry {
    oid: ObjectId,
    time: i64,
    seq: u64,
}

impl PartialEq for PaintEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PaintEntry {}

impl PartialOrd for PaintEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PaintEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Painter<'r> {
    repo: &'r Repository,
    flags: HashMap<ObjectId, u8>,
    infos: HashMap<ObjectId, CommitInfo>,
    queue: BinaryHeap<PaintEntry>,
    /// Queue entries per commit, so staleness can be counted in bulk.
    queued: HashMap<ObjectId, usize>,
    /// Queue entries whose commit is not yet stale.
    nonstale: usize,
    seq: u64,
}

impl<'r> Painter<'r> {
    fn new(repo: &'r Repository) -> Self {
        Self {
            repo,
            flags: HashMap::new(),
            infos: HashMap::new(),
            queue: BinaryHeap::new(),
            queued: HashMap::new(),
            nonstale: 0,
            seq: 0,
        }
    }

    fn info(&mut self, oid: &ObjectId) -> Result<&CommitInfo, RevWalkError> {
        if !self.infos.contains_key(oid) {
            let info = read_commit_info(self.repo, oid)?;
            self.infos.insert(*oid, info);
        }
        Ok(&self.infos[oid])
    }

    fn flags(&self, oid: &ObjectId) -> u8 {
        self.flags.get(oid).copied().unwrap_or(0)
    }

    fn paint(&mut self, oid: ObjectId, flags: u8) -> Result<(), RevWalkError> {
        let time = self.info(&oid)?.time;
        let was_stale = self.flags(&oid) & STALE != 0;
        *self.flags.entry(oid).or_insert(0) |= flags;
        let queued = self.queued.entry(oid).or_insert(0);
        if !was_stale && flags & STALE != 0 {
            self.nonstale -= *queued;
        }
        *queued += 1;
        if flags & STALE == 0 && !was_stale {
            self.nonstale += 1;
        }
        self.queue.push(PaintEntry { oid, time, seq: self.seq });
        self.seq += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<PaintEntry> {
        let entry = self.queue.pop()?;
        if let Some(queued) = self.queued.get_mut(&entry.oid) {
            *queued -= 1;
        }
        if self.flags(&entry.oid) & STALE == 0 {
            self.nonstale -= 1;
        }
        Some(entry)
    }

    /// Common ancestors of `one` and `two`, possibly redundant.
    fn run(mut self, one: ObjectId, two: ObjectId) -> Result<Vec<ObjectId>, RevWalkError> {
        self.paint(one, PARENT1)?;
        self.paint(two, PARENT2)?;

        let mut results = Vec::new();
        while self.nonstale > 0 {
            let Some(entry) = self.pop() else { break };
            let current = self.flags(&entry.oid);
            let mut flags = current & (PARENT1 | PARENT2 | STALE);
            if flags == PARENT1 | PARENT2 {
                if current & RESULT == 0 {
                    self.flags.insert(entry.oid, current | RESULT);
                    results.push(entry.oid);
                }
                flags |= STALE;
            }
            let parents = self.info(&entry.oid)?.parents.clone();
            for parent in parents {
                if self.flags(&parent) & flags == flags {
                    continue;
                }
                self.paint(parent, flags)?;
            }
        }

        let mut bases: Vec<ObjectId> = results
            .into_iter()
            .filter(|oid| self.flags(oid) & STALE == 0)
            .collect();
        bases.sort_by(|a, b| {
            let time = |oid: &ObjectId| self.infos.get(oid).map_or(0, |info| info.time);
            time(b).cmp(&time(a)).then_with(|| a.cmp(b))
        });
        Ok(bases)
    }
}

/// The best common ancestor of `a` and `b`.
pub fn merge_base(repo: &Repository, a: &ObjectId, b: &ObjectId) -> Result<ObjectId, RevWalkError> {
    merge_bases(repo, a, b)?
        .into_iter()
        .next()
        .ok_or(RevWalkError::NoMergeBase)
}

/// Every lowest common ancestor of `a` and `b`, newest first. Criss-cross
/// histories have more than one.
pub fn merge_bases(repo: &Repository, a: &ObjectId, b: &ObjectId) -> Result<Vec<ObjectId>, RevWalkError> {
    if a == b {
        read_commit_info(repo, a)?;
        return Ok(vec![*a]);
    }
    let candidates = Painter::new(repo).run(*a, *b)?;
    let bases = remove_redundant(repo, candidates)?;
    debug!(%a, %b, count = bases.len(), "computed merge bases");
    if bases.is_empty() {
        return Err(RevWalkError::NoMergeBase);
    }
    Ok(bases)
}

/// Whether `ancestor` is reachable from `descendant`. A commit is its own
/// ancestor.
pub fn is_ancestor(repo: &Repository, ancestor: &ObjectId, descendant: &ObjectId) -> Result<bool, RevWalkError> {
    read_commit_info(repo, ancestor)?;
    read_commit_info(repo, descendant)?;
    reaches(repo, descendant, ancestor)
}

/// Commits on `local` missing from `upstream`, and the reverse.
pub fn ahead_behind(repo: &Repository, local: &ObjectId, upstream: &ObjectId) -> Result<(usize, usize), RevWalkError> {
    let ahead = unique_commits(repo, local, upstream)?.len();
    let behind = unique_commits(repo, upstream, local)?.len();
    Ok((ahead, behind))
}

/// Commits reachable from `local` but not from `upstream`, newest first.
pub fn unique_commits(repo: &Repository, local: &ObjectId, upstream: &ObjectId) -> Result<Vec<ObjectId>, RevWalkError> {
    let mut walk = RevWalk::new(repo);
    walk.push(*local)?;
    walk.hide(*upstream)?;
    walk.collect()
}

/// Breadth-first search from `from` for `target`. Missing parents end a
/// path instead of failing.
fn reaches(repo: &Repository, from: &ObjectId, target: &ObjectId) -> Result<bool, RevWalkError> {
    let mut queue = VecDeque::from([*from]);
    let mut visited = HashSet::from([*from]);
    while let Some(current) = queue.pop_front() {
        if current == *target {
            return Ok(true);
        }
        let info = match read_commit_info(repo, &current) {
            Ok(info) => info,
            Err(RevWalkError::CommitNotFound(_)) => continue,
            Err(e) => return Err(e),
        };
        for parent in info.parents {
            if visited.insert(parent) {
                queue.push_back(parent);
            }
        }
    }
    Ok(false)
}

/// Drop every candidate that is an ancestor of another one.
fn remove_redundant(repo: &Repository, bases: Vec<ObjectId>) -> Result<Vec<ObjectId>, RevWalkError> {
    if bases.len() <= 1 {
        return Ok(bases);
    }
    let mut keep = vec![true; bases.len()];
    for i in 0..bases.len() {
        for j in 0..bases.len() {
            if i == j || !keep[i] || !keep[j] {
                continue;
            }
            if reaches(repo, &bases[j], &bases[i])? {
                keep[i] = false;
            }
        }
    }
    Ok(bases
        .into_iter()
        .zip(keep)
        .filter_map(|(oid, keep)| keep.then_some(oid))
        .collect())
}
