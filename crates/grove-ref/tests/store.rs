use std::fs;
use std::path::Path;

use grove_hash::{HashAlgorithm, ObjectId};
use grove_ref::{Expected, FilesRefStore, RefError, RefFilter, RefName, Reference, ReflogMode};
use grove_utils::{ErrorKind, GitDate, Signature};

fn oid(n: u8) -> ObjectId {
    ObjectId::from_bytes(&[n; 20], HashAlgorithm::Sha1).unwrap()
}

fn store(dir: &Path) -> FilesRefStore {
    let mut store = FilesRefStore::new(dir);
    store.set_committer(
        Signature::new("Test User", "test@example.com", GitDate::new(1_700_000_000, 0)).unwrap(),
    );
    store
}

fn branch(name: &str) -> RefName {
    RefName::branch(name).unwrap()
}

fn point_head_at(store: &FilesRefStore, target: &RefName) {
    store.create_symbolic(&RefName::head(), target, true, "").unwrap();
}

#[test]
fn create_lookup_and_already_exists() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let main = branch("main");

    let created = store.create(&main, oid(1), false, "branch: Created").unwrap();
    assert_eq!(created.target_oid(), Some(oid(1)));
    assert_eq!(
        fs::read_to_string(dir.path().join("refs/heads/main")).unwrap(),
        format!("{}\n", oid(1))
    );

    let err = store.create(&main, oid(2), false, "").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(matches!(err, RefError::AlreadyExists(_)));

    store.create(&main, oid(2), true, "forced").unwrap();
    assert_eq!(store.lookup(&main).unwrap().target_oid(), Some(oid(2)));

    let missing = store.lookup(&branch("nope")).unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
    assert!(store.find(&branch("nope")).unwrap().is_none());
}

#[test]
fn cas_mismatch_leaves_ref_and_reflog_alone() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let main = branch("main");
    store.update(&main, oid(1), None, "first").unwrap();

    let err = store.update(&main, oid(3), Some(oid(2)), "stale").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    match err {
        RefError::CasFailed { expected, actual, .. } => {
            assert_eq!(expected, Some(oid(2)));
            assert_eq!(actual, Some(oid(1)));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(store.resolve_name(&main).unwrap(), Some(oid(1)));
    assert_eq!(store.reflog_count(&main).unwrap(), 1);

    store.update(&main, oid(3), Some(oid(1)), "fresh").unwrap();
    assert_eq!(store.reflog_count(&main).unwrap(), 2);
    assert!(!dir.path().join("refs/heads/main.lock").exists());
}

#[test]
fn null_expected_means_must_not_exist() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let main = branch("main");
    store.update(&main, oid(1), Some(ObjectId::NULL_SHA1), "create").unwrap();
    let err = store.update(&main, oid(2), Some(ObjectId::NULL_SHA1), "again").unwrap_err();
    assert!(matches!(err, RefError::AlreadyExists(_)));
    store
        .update_expected(&main, oid(2), Expected::Value(oid(1)), "cas")
        .unwrap();
}

#[test]
fn update_through_head_logs_both() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let main = branch("main");
    point_head_at(&store, &main);

    assert_eq!(store.resolve_name(&RefName::head()).unwrap(), None);
    let head = store.lookup(&RefName::head()).unwrap();
    assert_eq!(store.resolve(&head).unwrap_err().kind(), ErrorKind::NotFound);

    let updated = store.update(&RefName::head(), oid(1), None, "commit (initial): one").unwrap();
    assert_eq!(updated.name(), &main);
    assert_eq!(store.resolve(&head).unwrap(), oid(1));

    store.update(&main, oid(2), Some(oid(1)), "commit: two").unwrap();

    let branch_log = store.reflog(&main).unwrap();
    let head_log = store.reflog(&RefName::head()).unwrap();
    assert_eq!(branch_log.len(), 2);
    assert_eq!(head_log.len(), 2);
    assert_eq!(branch_log[0].message, "commit: two");
    assert_eq!(branch_log[1].old_oid, ObjectId::NULL_SHA1);
    assert_eq!(head_log[0].new_oid, oid(2));
    assert_eq!(store.resolve_reflog(&main, 1).unwrap(), oid(1));
}

#[test]
fn symref_cycle_and_depth() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());

    let a = RefName::new("refs/heads/cycle-a").unwrap();
    let b = RefName::new("refs/heads/cycle-b").unwrap();
    store.create_symbolic(&a, &b, false, "").unwrap();
    store.create_symbolic(&b, &a, false, "").unwrap();
    let err = store.resolve_name(&a).unwrap_err();
    assert!(matches!(err, RefError::SymrefCycle(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidReference);

    // link-0 -> link-1 -> ... -> link-N -> end
    let chain = |len: usize, tag: &str| {
        let end = RefName::new(format!("refs/heads/{tag}-end")).unwrap();
        store.create(&end, oid(7), true, "").unwrap();
        for i in (0..len).rev() {
            let link = RefName::new(format!("refs/heads/{tag}-{i}")).unwrap();
            let next = if i + 1 == len {
                end.clone()
            } else {
                RefName::new(format!("refs/heads/{tag}-{}", i + 1)).unwrap()
            };
            store.create_symbolic(&link, &next, true, "").unwrap();
        }
        RefName::new(format!("refs/heads/{tag}-0")).unwrap()
    };

    let ok = chain(10, "ten");
    assert_eq!(store.resolve_name(&ok).unwrap(), Some(oid(7)));

    let deep = chain(11, "eleven");
    let err = store.resolve_name(&deep).unwrap_err();
    assert!(matches!(err, RefError::TooDeep(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidReference);
}

#[test]
fn delete_removes_loose_packed_and_log() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let topic = branch("topic/one");
    store.update(&topic, oid(1), None, "create").unwrap();
    assert_eq!(store.pack_refs(&|_| None).unwrap(), 1);
    store.update(&topic, oid(2), None, "loose again").unwrap();
    assert!(store.has_reflog(&topic));

    let err = store.delete_checked(&topic, Expected::Value(oid(1))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    store.delete_checked(&topic, Expected::Value(oid(2))).unwrap();
    assert!(store.find(&topic).unwrap().is_none());
    assert!(store.packed_refs().unwrap().is_empty());
    assert!(!store.has_reflog(&topic));
    assert!(!dir.path().join("refs/heads/topic").exists());
    assert!(dir.path().join("refs/heads").is_dir());

    assert_eq!(store.delete(&topic).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn packed_refs_are_shadowed_by_loose() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let tag_target = oid(9);
    store.create(&branch("main"), oid(1), false, "").unwrap();
    store.create(&RefName::tag("v1").unwrap(), oid(5), false, "").unwrap();
    store
        .create_symbolic(&RefName::new("refs/remotes/origin/HEAD").unwrap(), &branch("main"), false, "")
        .unwrap();

    let packed = store
        .pack_refs(&|id| (*id == oid(5)).then_some(tag_target))
        .unwrap();
    assert_eq!(packed, 2);
    assert!(!dir.path().join("refs/heads/main").exists());
    let text = fs::read_to_string(dir.path().join("packed-refs")).unwrap();
    assert!(text.starts_with("# pack-refs with:"));
    assert!(text.contains(&format!("^{tag_target}")));

    let tag = store.lookup(&RefName::tag("v1").unwrap()).unwrap();
    assert_eq!(tag.peeled(), Some(tag_target));

    store.update(&branch("main"), oid(2), Some(oid(1)), "moved").unwrap();
    let all = store.list(RefFilter::ALL, None).unwrap();
    let names: Vec<&str> = all.iter().map(|r| r.name().as_str()).collect();
    assert_eq!(names, ["refs/heads/main", "refs/remotes/origin/HEAD", "refs/tags/v1"]);
    assert_eq!(all[0].target_oid(), Some(oid(2)));

    let packed_only = store.list(RefFilter::PACKED, None).unwrap();
    assert_eq!(packed_only.len(), 1);
    assert_eq!(packed_only[0].name().as_str(), "refs/tags/v1");

    let symbolic = store.list(RefFilter::SYMBOLIC, Some("refs/remotes/")).unwrap();
    assert_eq!(symbolic.len(), 1);
    assert!(symbolic[0].is_symbolic());

    let heads = store.names(Some("refs/heads/")).unwrap();
    assert_eq!(heads, vec![branch("main")]);
}

#[test]
fn rename_moves_reflog_and_head() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let old = branch("old");
    let new = branch("new/name");
    point_head_at(&store, &old);
    store.update(&old, oid(1), None, "one").unwrap();
    store.update(&old, oid(2), None, "two").unwrap();

    let renamed = store.rename(&old, &new, false, "Branch: renamed").unwrap();
    assert_eq!(renamed.target_oid(), Some(oid(2)));
    assert!(store.find(&old).unwrap().is_none());
    assert!(!store.has_reflog(&old));

    let log = store.reflog(&new).unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0].message, "Branch: renamed");
    assert_eq!(log[0].old_oid, oid(2));
    assert_eq!(log[0].new_oid, oid(2));

    let head = store.lookup(&RefName::head()).unwrap();
    assert_eq!(head.symbolic_target(), Some(&new));
}

#[test]
fn rename_onto_existing_fails_without_force() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let a = branch("a");
    let b = branch("b");
    store.update(&a, oid(1), None, "").unwrap();
    store.update(&b, oid(2), None, "").unwrap();

    let err = store.rename(&a, &b, false, "").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(store.resolve_name(&a).unwrap(), Some(oid(1)));
    assert_eq!(store.resolve_name(&b).unwrap(), Some(oid(2)));

    store.rename(&a, &b, true, "forced").unwrap();
    assert_eq!(store.resolve_name(&b).unwrap(), Some(oid(1)));
    assert!(store.find(&a).unwrap().is_none());
}

#[test]
fn rename_into_own_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let a = branch("a");
    let ab = branch("a/b");
    store.update(&a, oid(1), None, "").unwrap();
    store.rename(&a, &ab, false, "down").unwrap();
    assert_eq!(store.resolve_name(&ab).unwrap(), Some(oid(1)));
    store.rename(&ab, &a, false, "up").unwrap();
    assert_eq!(store.resolve_name(&a).unwrap(), Some(oid(1)));
    assert_eq!(store.reflog_count(&a).unwrap(), 3);
}

#[test]
fn failed_rename_puts_ref_and_log_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let old = branch("old");
    let new = branch("new");
    store.update(&old, oid(1), None, "one").unwrap();
    store.update(&old, oid(2), None, "two").unwrap();
    fs::write(dir.path().join("refs/heads/new.lock"), "").unwrap();

    assert!(store.rename(&old, &new, false, "moved").is_err());
    assert_eq!(store.resolve_name(&old).unwrap(), Some(oid(2)));
    assert!(store.find(&new).unwrap().is_none());
    assert_eq!(store.reflog_count(&old).unwrap(), 2);
    assert!(!store.has_reflog(&new));

    fs::remove_file(dir.path().join("refs/heads/new.lock")).unwrap();
    store.rename(&old, &new, false, "moved").unwrap();
    assert_eq!(store.reflog_count(&new).unwrap(), 3);
}

#[test]
fn reflog_mode_controls_creation() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store(dir.path());
    let tag = RefName::tag("v1").unwrap();
    store.update(&tag, oid(1), None, "").unwrap();
    assert!(!store.has_reflog(&tag));

    store.set_reflog_mode(ReflogMode::Off);
    store.update(&branch("main"), oid(1), None, "").unwrap();
    assert!(!store.has_reflog(&branch("main")));

    store.set_reflog_mode(ReflogMode::Always);
    store.update(&tag, oid(2), None, "").unwrap();
    assert_eq!(store.reflog_count(&tag).unwrap(), 1);
}

#[test]
fn reflog_expire_and_manual_append() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store(dir.path());
    let main = branch("main");
    for (n, ts) in [(1u8, 100i64), (2, 200), (3, 300)] {
        store.set_committer(Signature::new("T", "t@x", GitDate::new(ts, 0)).unwrap());
        store.update(&main, oid(n), None, &format!("step {n}")).unwrap();
    }
    assert_eq!(store.expire_reflog(&main, 250).unwrap(), 2);
    let entry = store.reflog_entry(&main, 0).unwrap();
    assert_eq!(entry.new_oid, oid(3));
    assert_eq!(store.reflog_entry(&main, 1).unwrap_err().kind(), ErrorKind::NotFound);

    store.append_reflog(&main, oid(3), oid(3), "checkout: noop").unwrap();
    let messages: Vec<String> = store
        .reflog_iter(&main)
        .unwrap()
        .map(|e| e.unwrap().message.to_string())
        .collect();
    assert_eq!(messages, ["checkout: noop", "step 3"]);
    assert!(store.delete_reflog(&main).unwrap());
}

#[test]
fn transaction_applies_all_or_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let main = branch("main");
    let gone = branch("gone");
    store.update(&main, oid(1), None, "").unwrap();
    store.update(&gone, oid(4), None, "").unwrap();
    store.pack_refs(&|_| None).unwrap();

    // Second update carries a stale expectation: nothing may change.
    let mut tx = store.transaction();
    tx.create(branch("fresh"), oid(2), "create")
        .update(main.clone(), oid(3), Some(oid(9)), "stale")
        .delete(gone.clone(), None, "");
    let err = tx.commit().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(store.find(&branch("fresh")).unwrap().is_none());
    assert_eq!(store.resolve_name(&main).unwrap(), Some(oid(1)));
    assert_eq!(store.resolve_name(&gone).unwrap(), Some(oid(4)));
    let leftovers: Vec<_> = walk_locks(dir.path());
    assert!(leftovers.is_empty(), "{leftovers:?}");

    let mut tx = store
        .transaction()
        .with_committer(Signature::new("Tx", "tx@x", GitDate::new(5, 0)).unwrap());
    tx.create(branch("fresh"), oid(2), "create")
        .update(main.clone(), oid(3), Some(oid(1)), "cas")
        .delete(gone.clone(), Some(oid(4)), "")
        .set_symbolic(RefName::head(), main.clone(), "");
    tx.commit().unwrap();

    assert_eq!(store.resolve_name(&RefName::head()).unwrap(), Some(oid(3)));
    assert_eq!(store.resolve_name(&branch("fresh")).unwrap(), Some(oid(2)));
    assert!(store.find(&gone).unwrap().is_none());
    assert!(store.packed_refs().unwrap().find(&gone).is_none());
    let entry = store.reflog_entry(&main, 0).unwrap();
    assert_eq!(entry.committer.name, "Tx");
    assert_eq!(entry.message, "cas");
}

fn walk_locks(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        for entry in fs::read_dir(&d).unwrap().flatten() {
            let p = entry.path();
            if p.is_dir() {
                stack.push(p);
            } else if p.extension().is_some_and(|e| e == "lock") {
                out.push(p);
            }
        }
    }
    out
}

#[test]
fn invalid_names_rejected() {
    for bad in ["refs/heads/a..b", "refs/heads/x.lock", "refs/heads/", "refs/heads/a b", "lower"] {
        let err = RefName::new(bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidReference, "{bad}");
    }
    assert!(grove_ref::is_valid_name("refs/heads/feature/x"));
    assert!(grove_ref::is_valid_name("MERGE_HEAD"));
}

#[test]
fn direct_reference_accessors() {
    let r = Reference::Direct {
        name: branch("main"),
        target: oid(1),
        peeled: None,
    };
    assert!(!r.is_symbolic());
    assert_eq!(r.symbolic_target(), None);
}
