use std::collections::HashSet;
use std::path::Path;

use grove_hash::ObjectId;
use grove_object::{Blob, FileMode, Object, TreeBuilder};
use grove_ref::RefName;
use grove_repository::Repository;
use grove_revwalk::{
    ahead_behind, count_commits, count_head_commits, is_ancestor, merge_base, merge_bases, unique_commits, RevWalk,
    RevWalkError, RevisionRange, Sort, WalkState,
};
use grove_utils::{ErrorKind, GitDate, Signature};

fn sig(t: i64) -> Signature {
    Signature::new("Ann Author", "ann@example.com", GitDate::new(t, 0)).unwrap()
}

fn repo(dir: &Path) -> Repository {
    let mut repo = Repository::init(dir).unwrap();
    repo.config_mut().set("user.name", "Ann Author").unwrap();
    repo.config_mut().set("user.email", "ann@example.com").unwrap();
    repo.reload_identity().unwrap();
    repo
}

fn tree(repo: &Repository, content: &str) -> ObjectId {
    let blob = repo.odb().write(&Object::Blob(Blob::new(content.as_bytes()))).unwrap();
    let mut builder = TreeBuilder::new();
    builder.insert("f", FileMode::Regular, blob).unwrap();
    repo.odb().write(&Object::Tree(builder.build())).unwrap()
}

/// A commit not attached to any ref.
fn commit(repo: &Repository, parents: &[ObjectId], t: i64) -> ObjectId {
    let tree = tree(repo, &format!("{t}\n"));
    repo.commit(&tree, parents, &sig(t), &sig(t), &format!("c{t}\n"), None).unwrap()
}

/// `n` commits in a line, oldest first, one second apart.
fn linear(repo: &Repository, n: usize) -> Vec<ObjectId> {
    let mut out: Vec<ObjectId> = Vec::new();
    for i in 0..n {
        let parents: Vec<ObjectId> = out.last().copied().into_iter().collect();
        out.push(commit(repo, &parents, 1_000 + i as i64));
    }
    out
}

fn collect(walk: RevWalk<'_>) -> Vec<ObjectId> {
    walk.collect::<Result<Vec<_>, _>>().unwrap()
}

fn position(order: &[ObjectId], oid: &ObjectId) -> usize {
    order.iter().position(|o| o == oid).unwrap()
}

/// ```text
///       b1 - b2
///      /        \
/// r - a          m
///      \        /
///       c1 ----
/// ```
struct Diamond {
    r: ObjectId,
    a: ObjectId,
    b1: ObjectId,
    b2: ObjectId,
    c1: ObjectId,
    m: ObjectId,
}

fn diamond(repo: &Repository) -> Diamond {
    let r = commit(repo, &[], 100);
    let a = commit(repo, &[r], 200);
    let b1 = commit(repo, &[a], 300);
    let c1 = commit(repo, &[a], 400);
    let b2 = commit(repo, &[b1], 500);
    let m = commit(repo, &[b2, c1], 600);
    Diamond { r, a, b1, b2, c1, m }
}

#[test]
fn linear_history_yields_each_commit_once_children_first() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let line = linear(&repo, 12);

    let mut walk = RevWalk::new(&repo);
    assert_eq!(walk.state(), WalkState::Idle);
    walk.push(*line.last().unwrap()).unwrap();
    assert_eq!(walk.state(), WalkState::Primed);

    let order = collect(walk);
    let expected: Vec<ObjectId> = line.iter().rev().copied().collect();
    assert_eq!(order, expected);
}

#[test]
fn idle_walk_yields_nothing_and_exhausts() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let line = linear(&repo, 2);

    let mut walk = RevWalk::new(&repo);
    assert!(walk.next().is_none());
    walk.push(line[1]).unwrap();
    assert_eq!(walk.by_ref().count(), 2);
    assert_eq!(walk.state(), WalkState::Exhausted);
    assert!(walk.next().is_none());
}

#[test]
fn hide_excludes_ancestors_reachable_from_other_tips() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let d = diamond(&repo);

    let mut walk = RevWalk::new(&repo);
    walk.push(d.m).unwrap();
    walk.push(d.c1).unwrap();
    walk.hide(d.b1).unwrap();
    let got: HashSet<ObjectId> = collect(walk).into_iter().collect();
    assert_eq!(got, HashSet::from([d.m, d.b2, d.c1]));
}

#[test]
fn hiding_a_pushed_tip_empties_the_walk() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let line = linear(&repo, 3);

    let mut walk = RevWalk::new(&repo);
    walk.push(line[2]).unwrap();
    walk.hide(line[2]).unwrap();
    assert!(collect(walk).is_empty());
}

#[test]
fn merge_commits_precede_both_parents() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let d = diamond(&repo);

    for sort in [
        Sort::TIME,
        Sort::NONE,
        Sort::TOPOLOGICAL,
        Sort::TOPOLOGICAL | Sort::TIME,
    ] {
        let mut walk = RevWalk::new(&repo);
        walk.set_sort(sort);
        walk.push(d.m).unwrap();
        let order = collect(walk);
        assert_eq!(order.len(), 6, "{sort:?}");
        assert_eq!(order[0], d.m);
        assert_eq!(*order.last().unwrap(), d.r);
        assert!(position(&order, &d.b2) < position(&order, &d.b1));
        assert!(position(&order, &d.c1) < position(&order, &d.a));
        assert!(position(&order, &d.b1) < position(&order, &d.a));
    }
}

#[test]
fn time_sort_is_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let d = diamond(&repo);

    let mut walk = RevWalk::new(&repo);
    walk.set_sort(Sort::TIME);
    walk.push(d.m).unwrap();
    assert_eq!(collect(walk), vec![d.m, d.b2, d.c1, d.b1, d.a, d.r]);
}

#[test]
fn topological_sort_keeps_branches_together() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let d = diamond(&repo);

    let mut walk = RevWalk::new(&repo);
    walk.set_sort(Sort::TOPOLOGICAL);
    walk.push(d.m).unwrap();
    assert_eq!(collect(walk), vec![d.m, d.b2, d.b1, d.c1, d.a, d.r]);
}

#[test]
fn topological_sort_survives_clock_skew() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let root = commit(&repo, &[], 5_000);
    let side = commit(&repo, &[root], 10);
    let main = commit(&repo, &[root], 20);
    let merge = commit(&repo, &[main, side], 30);

    let mut walk = RevWalk::new(&repo);
    walk.set_sort(Sort::TOPOLOGICAL | Sort::TIME);
    walk.push(merge).unwrap();
    let order = collect(walk);
    assert_eq!(order.len(), 4);
    assert_eq!(*order.last().unwrap(), root);
}

#[test]
fn reverse_flips_the_order() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let line = linear(&repo, 5);

    let mut walk = RevWalk::new(&repo);
    walk.set_sort(Sort::TIME | Sort::REVERSE);
    walk.push(line[4]).unwrap();
    assert_eq!(collect(walk), line);
}

#[test]
fn first_parent_only_skips_side_branches() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let d = diamond(&repo);

    let mut walk = RevWalk::new(&repo);
    walk.first_parent_only(true);
    walk.push(d.m).unwrap();
    assert_eq!(collect(walk), vec![d.m, d.b2, d.b1, d.a, d.r]);
}

#[test]
fn reset_discards_push_and_hide() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let line = linear(&repo, 4);

    let mut walk = RevWalk::new(&repo);
    walk.push(line[3]).unwrap();
    walk.hide(line[1]).unwrap();
    assert_eq!(walk.by_ref().count(), 2);

    walk.reset();
    assert_eq!(walk.state(), WalkState::Idle);
    assert!(walk.next().is_none());

    walk.push(line[3]).unwrap();
    assert_eq!(collect(walk).len(), 4);
}

#[test]
fn unknown_or_non_commit_push_fails_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let line = linear(&repo, 2);

    let mut walk = RevWalk::new(&repo);
    let missing = ObjectId::from_hex("1111111111111111111111111111111111111111").unwrap();
    let err = walk.push(missing).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(walk.state(), WalkState::Idle);

    let blob = repo.odb().write(&Object::Blob(Blob::new(b"x".as_slice()))).unwrap();
    let err = walk.hide(blob).unwrap_err();
    assert!(matches!(err, RevWalkError::NotACommit { actual: "blob", .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(walk.state(), WalkState::Idle);

    walk.push(line[1]).unwrap();
    assert_eq!(collect(walk).len(), 2);
}

#[test]
fn refs_head_and_ranges() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let d = diamond(&repo);
    repo.refs()
        .create(&RefName::branch("main").unwrap(), d.b2, false, "test")
        .unwrap();
    repo.refs()
        .create(&RefName::branch("side").unwrap(), d.c1, false, "test")
        .unwrap();

    let mut walk = RevWalk::new(&repo);
    walk.push_head().unwrap_err();
    walk.push_ref("main").unwrap();
    walk.hide_ref("refs/heads/side").unwrap();
    assert_eq!(collect(walk), vec![d.b2, d.b1]);

    let mut walk = RevWalk::new(&repo);
    walk.push_range("side..main").unwrap();
    assert_eq!(collect(walk), vec![d.b2, d.b1]);

    let range = RevisionRange::parse(&repo, "main...side").unwrap();
    assert!(range.symmetric);
    assert_eq!(range.exclude, vec![d.a]);
    let mut walk = RevWalk::new(&repo);
    walk.push_range("main...side").unwrap();
    let got: HashSet<ObjectId> = collect(walk).into_iter().collect();
    assert_eq!(got, HashSet::from([d.b2, d.b1, d.c1]));

    let mut walk = RevWalk::new(&repo);
    walk.push_range("main~1..main").unwrap();
    assert_eq!(collect(walk), vec![d.b2]);
    let range = RevisionRange::parse(&repo, "^main^").unwrap();
    assert_eq!(range.exclude, vec![d.b1]);

    let err = RevisionRange::parse(&repo, "  ").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(RevisionRange::parse(&repo, "nope..main").is_err());
}

#[test]
fn commit_counts_follow_head() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    assert_eq!(count_head_commits(&repo).unwrap(), 0);

    let d = diamond(&repo);
    repo.refs()
        .create(&RefName::branch("master").unwrap(), d.m, false, "test")
        .unwrap();
    assert_eq!(count_head_commits(&repo).unwrap(), 6);
    assert_eq!(count_commits(&repo, &d.b2).unwrap(), 4);

    repo.set_head_detached(d.c1).unwrap();
    assert_eq!(count_head_commits(&repo).unwrap(), 3);
}

#[test]
fn commits_adapter_parses() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let line = linear(&repo, 3);

    let mut walk = RevWalk::new(&repo);
    walk.push(line[2]).unwrap();
    let messages: Vec<String> = walk
        .commits()
        .map(|r| r.unwrap().1.summary().to_string())
        .collect();
    assert_eq!(messages, ["c1002", "c1001", "c1000"]);
}

#[test]
fn merge_base_of_diamond_branches() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let d = diamond(&repo);

    assert_eq!(merge_base(&repo, &d.b2, &d.c1).unwrap(), d.a);
    assert_eq!(merge_base(&repo, &d.m, &d.c1).unwrap(), d.c1);
    assert_eq!(merge_base(&repo, &d.m, &d.m).unwrap(), d.m);
    assert!(is_ancestor(&repo, &d.r, &d.m).unwrap());
    assert!(is_ancestor(&repo, &d.m, &d.m).unwrap());
    assert!(!is_ancestor(&repo, &d.c1, &d.b2).unwrap());
}

#[test]
fn criss_cross_has_two_bases() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let r = commit(&repo, &[], 100);
    let x = commit(&repo, &[r], 200);
    let y = commit(&repo, &[r], 300);
    let x2 = commit(&repo, &[x, y], 400);
    let y2 = commit(&repo, &[y, x], 500);

    let bases: HashSet<ObjectId> = merge_bases(&repo, &x2, &y2).unwrap().into_iter().collect();
    assert_eq!(bases, HashSet::from([x, y]));
    assert_eq!(merge_bases(&repo, &x2, &y2).unwrap()[0], y);
}

#[test]
fn merge_base_deep_in_a_long_history_with_merges() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let main = linear(&repo, 300);
    let mut side = main[10];
    for t in 0..3 {
        side = commit(&repo, &[side], 5_000 + t);
    }
    // A tip that merged several short-lived branches off the middle.
    let mut tip = main[299];
    for (i, fork) in [100usize, 150, 200].into_iter().enumerate() {
        let branch = commit(&repo, &[main[fork]], 6_000 + i as i64);
        tip = commit(&repo, &[tip, branch], 7_000 + i as i64);
    }

    assert_eq!(merge_bases(&repo, &tip, &side).unwrap(), vec![main[10]]);
    assert_eq!(merge_bases(&repo, &tip, &main[250]).unwrap(), vec![main[250]]);
    assert_eq!(merge_base(&repo, &side, &main[0]).unwrap(), main[0]);
}

#[test]
fn unrelated_histories_have_no_merge_base() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let one = linear(&repo, 2);
    let other = commit(&repo, &[], 9_999);

    let err = merge_base(&repo, &one[1], &other).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoMergeBase);
    assert!(!is_ancestor(&repo, &other, &one[1]).unwrap());
}

#[test]
fn ahead_behind_counts() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let d = diamond(&repo);

    assert_eq!(ahead_behind(&repo, &d.b2, &d.c1).unwrap(), (2, 1));
    assert_eq!(ahead_behind(&repo, &d.m, &d.b2).unwrap(), (2, 0));
    assert_eq!(unique_commits(&repo, &d.c1, &d.b2).unwrap(), vec![d.c1]);
}

#[test]
fn concurrent_walkers_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let line = linear(&repo, 20);

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let repo = &repo;
                let tip = line[19 - i];
                s.spawn(move || {
                    let mut walk = RevWalk::new(repo);
                    walk.push(tip).unwrap();
                    walk.count()
                })
            })
            .collect();
        let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(counts, [20, 19, 18, 17]);
    });
}
