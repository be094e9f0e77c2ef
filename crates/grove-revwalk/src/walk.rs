use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use grove_hash::ObjectId;
use grove_object::{Commit, Object};
use grove_odb::OdbError;
use grove_repository::Repository;
use tracing::{debug, trace};

use crate::range::RevisionRange;
use crate::{RevWalkError, Sort};

/// Where a [`RevWalk`] is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    /// Nothing pushed since creation or the last [`RevWalk::reset`].
    Idle,
    /// At least one tip pushed; commits remain to be produced.
    Primed,
    /// Every reachable commit has been produced.
    Exhausted,
}

/// The parts of a commit the walk needs.
#[derive(Debug, Clone)]
pub(crate) struct CommitInfo {
    pub parents: Vec<ObjectId>,
    pub time: i64,
}

pub(crate) fn read_commit(repo: &Repository, oid: &ObjectId) -> Result<Commit, RevWalkError> {
    match repo.odb().read_cached(oid) {
        Ok(Object::Commit(commit)) => Ok(commit),
        Ok(other) => Err(RevWalkError::NotACommit {
            oid: *oid,
            actual: other.object_type().as_str(),
        }),
        Err(OdbError::NotFound(_)) => Err(RevWalkError::CommitNotFound(*oid)),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn read_commit_info(repo: &Repository, oid: &ObjectId) -> Result<CommitInfo, RevWalkError> {
    let commit = read_commit(repo, oid)?;
    Ok(CommitInfo {
        time: commit.committer.date.timestamp,
        parents: commit.parents,
    })
}

struct QueueEntry {
    oid: ObjectId,
    time: i64,
    seq: u64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // Max-heap: newest first, then earliest inserted.
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// An iterator over commit ids reachable from the pushed tips and not from
/// the hidden ones.
///
/// ```no_run
/// # fn run(repo: &grove_repository::Repository) -> Result<(), grove_revwalk::RevWalkError> {
/// let mut walk = grove_revwalk::RevWalk::new(repo);
/// walk.push_head()?;
/// walk.hide_ref("origin/main")?;
/// for oid in walk {
///     println!("{}", oid?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct RevWalk<'r> {
    repo: &'r Repository,
    sort: Sort,
    first_parent: bool,
    state: WalkState,
    queue: BinaryHeap<QueueEntry>,
    seq: u64,
    /// Every commit ever queued; nothing is queued twice until reset.
    seen: HashSet<ObjectId>,
    hidden: HashSet<ObjectId>,
    cache: HashMap<ObjectId, CommitInfo>,
    /// The full order, once a sort that needs it has collected the walk.
    buffer: Option<VecDeque<ObjectId>>,
}

impl<'r> RevWalk<'r> {
    pub fn new(repo: &'r Repository) -> Self {
        Self {
            repo,
            sort: Sort::default(),
            first_parent: false,
            state: WalkState::Idle,
            queue: BinaryHeap::new(),
            seq: 0,
            seen: HashSet::new(),
            hidden: HashSet::new(),
            cache: HashMap::new(),
            buffer: None,
        }
    }

    pub fn repository(&self) -> &'r Repository {
        self.repo
    }

    pub fn state(&self) -> WalkState {
        self.state
    }

    pub fn sort(&self) -> Sort {
        self.sort
    }

    pub fn set_sort(&mut self, sort: Sort) {
        self.sort = sort;
    }

    /// Follow only the first parent of each commit.
    pub fn first_parent_only(&mut self, yes: bool) {
        self.first_parent = yes;
    }

    /// Start the walk at `oid`. Fails without touching the walk if `oid` is
    /// missing or not a commit.
    pub fn push(&mut self, oid: ObjectId) -> Result<(), RevWalkError> {
        let time = self.commit_info(&oid)?.time;
        if self.seen.insert(oid) {
            self.enqueue(oid, time);
        }
        self.buffer = None;
        self.state = WalkState::Primed;
        trace!(%oid, "pushed tip");
        Ok(())
    }

    /// Exclude `oid` and every ancestor of it, even those reachable from
    /// another pushed tip. Ancestors missing from the object database end
    /// the exclusion quietly, as a shallow boundary does.
    pub fn hide(&mut self, oid: ObjectId) -> Result<(), RevWalkError> {
        self.commit_info(&oid)?;

        let mut closure = HashSet::new();
        let mut stack = vec![oid];
        while let Some(current) = stack.pop() {
            if self.hidden.contains(&current) || !closure.insert(current) {
                continue;
            }
            match self.commit_info(&current) {
                Ok(info) => stack.extend(info.parents.iter().copied()),
                Err(RevWalkError::CommitNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        trace!(%oid, hidden = closure.len(), "hid ancestors");
        self.hidden.extend(closure);
        if self.state == WalkState::Idle {
            self.state = WalkState::Primed;
        }
        Ok(())
    }

    /// Push the commit a reference (full or short name) peels to.
    pub fn push_ref(&mut self, name: &str) -> Result<(), RevWalkError> {
        let oid = self.ref_commit(name)?;
        self.push(oid)
    }

    pub fn hide_ref(&mut self, name: &str) -> Result<(), RevWalkError> {
        let oid = self.ref_commit(name)?;
        self.hide(oid)
    }

    pub fn push_head(&mut self) -> Result<(), RevWalkError> {
        let oid = self.repo.head_oid()?;
        self.push(oid)
    }

    /// Apply a range such as `main..topic`, `a...b` or `^old`.
    pub fn push_range(&mut self, spec: &str) -> Result<(), RevWalkError> {
        let range = RevisionRange::parse(self.repo, spec)?;
        for oid in &range.exclude {
            self.hide(*oid)?;
        }
        for oid in &range.include {
            self.push(*oid)?;
        }
        Ok(())
    }

    /// Forget every pushed and hidden commit. Sort settings are kept.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.seen.clear();
        self.hidden.clear();
        self.buffer = None;
        self.seq = 0;
        self.state = WalkState::Idle;
    }

    /// Yield parsed commits instead of ids.
    pub fn commits(self) -> Commits<'r> {
        Commits { walk: self }
    }

    fn ref_commit(&self, name: &str) -> Result<ObjectId, RevWalkError> {
        let reference = self.repo.resolve_reference(name)?;
        let oid = self.repo.refs().resolve(&reference)?;
        Ok(self.repo.peel_to_commit(&oid)?)
    }

    fn commit_info(&mut self, oid: &ObjectId) -> Result<&CommitInfo, RevWalkError> {
        if !self.cache.contains_key(oid) {
            let info = read_commit_info(self.repo, oid)?;
            self.cache.insert(*oid, info);
        }
        Ok(&self.cache[oid])
    }

    fn parents_of(&mut self, oid: &ObjectId) -> Result<Vec<ObjectId>, RevWalkError> {
        let first_parent = self.first_parent;
        let info = self.commit_info(oid)?;
        Ok(if first_parent {
            info.parents.iter().take(1).copied().collect()
        } else {
            info.parents.clone()
        })
    }

    fn enqueue(&mut self, oid: ObjectId, time: i64) {
        // Without TIME the heap degrades to insertion order.
        let time = if self.sort.contains(Sort::TIME) { time } else { 0 };
        self.queue.push(QueueEntry { oid, time, seq: self.seq });
        self.seq += 1;
    }

    fn next_incremental(&mut self) -> Result<Option<ObjectId>, RevWalkError> {
        while let Some(entry) = self.queue.pop() {
            if self.hidden.contains(&entry.oid) {
                continue;
            }
            for parent in self.parents_of(&entry.oid)? {
                if self.hidden.contains(&parent) || !self.seen.insert(parent) {
                    continue;
                }
                let time = self.commit_info(&parent)?.time;
                self.enqueue(parent, time);
            }
            return Ok(Some(entry.oid));
        }
        Ok(None)
    }

    fn next_buffered(&mut self) -> Result<Option<ObjectId>, RevWalkError> {
        if self.buffer.is_none() {
            let mut order = Vec::new();
            while let Some(oid) = self.next_incremental()? {
                order.push(oid);
            }
            if self.sort.contains(Sort::TOPOLOGICAL) {
                order = self.topo_sort(order)?;
            }
            if self.sort.contains(Sort::REVERSE) {
                order.reverse();
            }
            debug!(commits = order.len(), sort = ?self.sort, "collected walk");
            self.buffer = Some(order.into());
        }
        Ok(self.buffer.as_mut().and_then(VecDeque::pop_front))
    }

    /// Kahn's algorithm over the collected commits. Ready commits leave
    /// newest first under TIME, otherwise depth first.
    fn topo_sort(&mut self, order: Vec<ObjectId>) -> Result<Vec<ObjectId>, RevWalkError> {
        let members: HashSet<ObjectId> = order.iter().copied().collect();
        let mut parents: HashMap<ObjectId, Vec<ObjectId>> = HashMap::with_capacity(order.len());
        let mut indegree: HashMap<ObjectId, usize> = HashMap::with_capacity(order.len());
        for oid in &order {
            let list: Vec<ObjectId> = self
                .parents_of(oid)?
                .into_iter()
                .filter(|p| members.contains(p))
                .collect();
            for parent in &list {
                *indegree.entry(*parent).or_insert(0) += 1;
            }
            parents.insert(*oid, list);
        }

        let by_time = self.sort.contains(Sort::TIME);
        let mut heap = BinaryHeap::new();
        let mut stack = Vec::new();
        let mut seq = 0u64;
        let mut ready = |oid: ObjectId, time: i64, heap: &mut BinaryHeap<QueueEntry>, stack: &mut Vec<ObjectId>| {
            if by_time {
                heap.push(QueueEntry { oid, time, seq });
                seq += 1;
            } else {
                stack.push(oid);
            }
        };

        for oid in order.iter().rev().filter(|oid| !indegree.contains_key(*oid)) {
            let time = self.cache.get(oid).map_or(0, |info| info.time);
            ready(*oid, time, &mut heap, &mut stack);
        }

        let mut out = Vec::with_capacity(order.len());
        loop {
            let next = if by_time {
                heap.pop().map(|entry| entry.oid)
            } else {
                stack.pop()
            };
            let Some(oid) = next else { break };
            out.push(oid);
            let Some(list) = parents.get(&oid) else { continue };
            for parent in list.iter().rev() {
                if let Some(count) = indegree.get_mut(parent) {
                    *count -= 1;
                    if *count == 0 {
                        let time = self.cache.get(parent).map_or(0, |info| info.time);
                        ready(*parent, time, &mut heap, &mut stack);
                    }
                }
            }
        }
        Ok(out)
    }
}

impl Iterator for RevWalk<'_> {
    type Item = Result<ObjectId, RevWalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != WalkState::Primed {
            return None;
        }
        let step = if self.sort.needs_buffer() {
            self.next_buffered()
        } else {
            self.next_incremental()
        };
        match step {
            Ok(Some(oid)) => Some(Ok(oid)),
            Ok(None) => {
                self.state = WalkState::Exhausted;
                None
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// [`RevWalk`] yielding `(id, commit)` pairs.
pub struct Commits<'r> {
    walk: RevWalk<'r>,
}

impl Iterator for Commits<'_> {
    type Item = Result<(ObjectId, Commit), RevWalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        let oid = match self.walk.next()? {
            Ok(oid) => oid,
            Err(e) => return Some(Err(e)),
        };
        Some(read_commit(self.walk.repo, &oid).map(|commit| (oid, commit)))
    }
}

/// How many commits `tip` reaches, itself included.
pub fn count_commits(repo: &Repository, tip: &ObjectId) -> Result<usize, RevWalkError> {
    let mut walk = RevWalk::new(repo);
    walk.push(*tip)?;
    walk.try_fold(0usize, |n, oid| oid.map(|_| n + 1))
}

/// Commits reachable from `HEAD`; zero while the branch is unborn.
pub fn count_head_commits(repo: &Repository) -> Result<usize, RevWalkError> {
    match repo.head()?.oid() {
        Some(tip) => count_commits(repo, &tip),
        None => Ok(0),
    }
}
