use bstr::{BStr, ByteSlice};
use grove_hash::{HashAlgorithm, Hasher, ObjectId};
use grove_index::{EntryFlags, Index, IndexConflict, IndexEntry, IndexError, Stage, StatData};
use grove_object::{FileMode, Object};
use grove_odb::ObjectDatabase;
use grove_utils::ErrorKind;
use proptest::prelude::*;

fn oid(n: u8) -> ObjectId {
    ObjectId::from_bytes(&[n; 20], HashAlgorithm::Sha1).unwrap()
}

fn entry(path: &str, n: u8) -> IndexEntry {
    IndexEntry::new(path, oid(n), FileMode::Regular)
}

fn odb(dir: &std::path::Path) -> ObjectDatabase {
    let objects = dir.join("objects");
    std::fs::create_dir_all(&objects).unwrap();
    ObjectDatabase::open(&objects, HashAlgorithm::Sha1).unwrap()
}

#[test]
fn file_round_trip_keeps_entries_and_stages() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");

    let mut index = Index::new();
    let mut staged = entry("src/lib.rs", 1);
    staged.stat = StatData {
        mtime_secs: 1_700_000_000,
        mtime_nsecs: 5,
        size: 42,
        ino: 99,
        ..Default::default()
    };
    index.add(staged).unwrap();
    index.add(IndexEntry::new("run.sh", oid(2), FileMode::Executable)).unwrap();
    index.add(IndexEntry::new("link", oid(3), FileMode::Symlink)).unwrap();
    index
        .add_conflict(IndexConflict {
            ancestor: Some(entry("merge.txt", 4)),
            ours: Some(entry("merge.txt", 5)),
            theirs: Some(entry("merge.txt", 6)),
        })
        .unwrap();
    index.write_to(&path).unwrap();
    assert!(!dir.path().join("index.lock").exists());

    let back = Index::read_from(&path).unwrap();
    assert_eq!(back.entries(), index.entries());
    assert_eq!(back.version(), 2);
    let conflict = back.conflict(BStr::new("merge.txt")).unwrap();
    assert_eq!(conflict.ancestor.unwrap().oid, oid(4));
    assert_eq!(conflict.theirs.unwrap().stage, Stage::Theirs);
}

#[test]
fn missing_file_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let index = Index::read_or_default(dir.path().join("index"), HashAlgorithm::Sha1).unwrap();
    assert!(index.is_empty());
    let err = Index::read_from(dir.path().join("index")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn flipped_byte_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");
    let mut index = Index::new();
    index.add(entry("a", 1)).unwrap();
    index.write_to(&path).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[20] ^= 0xff;
    std::fs::write(&path, &bytes).unwrap();
    let err = Index::read_from(&path).unwrap_err();
    assert!(matches!(err, IndexError::ChecksumMismatch));
    assert_eq!(err.kind(), ErrorKind::Corrupt);
}

#[test]
fn unknown_extensions_survive_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");
    let mut index = Index::new();
    index.add(entry("a", 1)).unwrap();
    let mut bytes = index.to_bytes().unwrap();

    // Splice two optional extensions in front of the checksum.
    bytes.truncate(bytes.len() - 20);
    for (sig, data) in [(b"ZTST", &b"payload"[..]), (b"EOIE", &[0u8; 24][..])] {
        bytes.extend_from_slice(sig);
        bytes.extend_from_slice(&(data.len() as u32).to_be_bytes());
        bytes.extend_from_slice(data);
    }
    let sum = Hasher::digest(HashAlgorithm::Sha1, &bytes).unwrap();
    bytes.extend_from_slice(sum.as_bytes());
    std::fs::write(&path, &bytes).unwrap();

    let mut read = Index::read_from(&path).unwrap();
    let names: Vec<String> = read.extensions().iter().map(|e| e.name()).collect();
    assert_eq!(names, ["ZTST"]);

    read.add(entry("b", 2)).unwrap();
    read.write_to(&path).unwrap();
    let again = Index::read_from(&path).unwrap();
    assert_eq!(again.extensions()[0].data, b"payload");
    assert_eq!(again.len(), 2);
}

#[test]
fn write_tree_and_read_tree() {
    let dir = tempfile::tempdir().unwrap();
    let odb = odb(dir.path());
    let blob = |text: &str| {
        odb.write(&Object::Blob(grove_object::Blob::new(text.as_bytes())))
            .unwrap()
    };

    let mut index = Index::new();
    index.add(IndexEntry::new("README", blob("hi\n"), FileMode::Regular)).unwrap();
    index.add(IndexEntry::new("src/main.rs", blob("fn main() {}\n"), FileMode::Regular)).unwrap();
    index.add(IndexEntry::new("src/bin/tool.rs", blob("tool\n"), FileMode::Regular)).unwrap();
    index.add(IndexEntry::new("src.c", blob("c\n"), FileMode::Executable)).unwrap();
    let mut placeholder = IndexEntry::new("todo.txt", blob(""), FileMode::Regular);
    placeholder.flags = EntryFlags {
        intent_to_add: true,
        ..Default::default()
    };
    index.add(placeholder).unwrap();

    let root = index.write_tree(&odb).unwrap();
    let tree = odb.read(&root).unwrap().into_tree().unwrap();
    let names: Vec<String> = tree.entries.iter().map(|e| e.name.to_string()).collect();
    // Tree order: "src.c" sorts before the "src" directory.
    assert_eq!(names, ["README", "src.c", "src"]);
    assert_eq!(index.write_tree(&odb).unwrap(), root);

    let mut fresh = Index::new();
    fresh.read_tree(&odb, &root).unwrap();
    let paths: Vec<String> = fresh.iter().map(|e| e.path.to_string()).collect();
    assert_eq!(paths, ["README", "src.c", "src/bin/tool.rs", "src/main.rs"]);
    assert_eq!(fresh.write_tree(&odb).unwrap(), root);

    let err = fresh.read_tree(&odb, &blob("hi\n")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn empty_index_writes_empty_tree() {
    let dir = tempfile::tempdir().unwrap();
    let odb = odb(dir.path());
    let root = Index::new().write_tree(&odb).unwrap();
    assert_eq!(root.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
}

#[test]
fn write_tree_refuses_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let odb = odb(dir.path());
    let mut index = Index::new();
    index.add(entry("ok", 1)).unwrap();
    index.add(entry("both", 2).with_stage(Stage::Ours)).unwrap();
    index.add(entry("both", 3).with_stage(Stage::Theirs)).unwrap();
    let err = index.write_tree(&odb).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(matches!(err, IndexError::UnresolvedConflicts(1)));
}

#[test]
fn set_entries_sorts_and_keeps_last_duplicate() {
    let mut index = Index::new();
    index.add(entry("stale", 9)).unwrap();
    index
        .set_entries(vec![
            entry("z", 1),
            entry("a/b", 2),
            entry("m", 3).with_stage(Stage::Theirs),
            entry("m", 4).with_stage(Stage::Ours),
            entry("z", 5),
        ])
        .unwrap();
    let got: Vec<(&BStr, Stage, ObjectId)> = index.iter().map(|e| (e.path.as_bstr(), e.stage, e.oid)).collect();
    assert_eq!(
        got,
        vec![
            (BStr::new("a/b"), Stage::Normal, oid(2)),
            (BStr::new("m"), Stage::Ours, oid(4)),
            (BStr::new("m"), Stage::Theirs, oid(3)),
            (BStr::new("z"), Stage::Normal, oid(5)),
        ]
    );
}

#[test]
fn set_entries_refuses_file_under_file() {
    let mut index = Index::new();
    let err = index.set_entries(vec![entry("a", 1), entry("a.c", 2), entry("a/b", 3)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(matches!(err, IndexError::PathCollision(ref p) if p == "a"));
    let err = index.set_entries(vec![entry("ok", 1), entry("../x", 2)]).unwrap_err();
    assert!(matches!(err, IndexError::InvalidPath(_)));
}

#[test]
fn add_replaces_directory_and_parents() {
    let mut index = Index::new();
    for path in ["d/x", "d/y/z", "d.txt", "d0", "e"] {
        index.add(entry(path, 1)).unwrap();
    }
    index.add(entry("d", 2)).unwrap();
    let paths: Vec<&BStr> = index.iter().map(|e| e.path.as_bstr()).collect();
    assert_eq!(paths, ["d", "d.txt", "d0", "e"]);

    index.add(entry("d/y/z", 3)).unwrap();
    let paths: Vec<&BStr> = index.iter().map(|e| e.path.as_bstr()).collect();
    assert_eq!(paths, ["d.txt", "d/y/z", "d0", "e"]);
}

#[test]
fn large_tree_round_trips_through_bulk_load() {
    let dir = tempfile::tempdir().unwrap();
    let odb = odb(dir.path());
    let entries: Vec<IndexEntry> = (0..20_000u32)
        .rev()
        .map(|i| entry(&format!("dir{}/file{i}", i % 50), (i % 251) as u8))
        .collect();
    let mut index = Index::new();
    index.set_entries(entries).unwrap();
    assert_eq!(index.len(), 20_000);
    let tree = index.write_tree(&odb).unwrap();

    let mut back = Index::new();
    back.read_tree(&odb, &tree).unwrap();
    assert!(back.iter().map(|e| &e.path).eq(index.iter().map(|e| &e.path)));
}

proptest! {
    #[test]
    fn entries_stay_sorted_and_unique(ops in prop::collection::vec(("[a-c]{1,2}(/[a-c]{1,2})?", 0u8..4), 1..40)) {
        let mut index = Index::new();
        for (i, (path, stage)) in ops.iter().enumerate() {
            let stage = Stage::from_u8(*stage).unwrap();
            index.add(entry(path, i as u8).with_stage(stage)).unwrap();
        }
        let keys: Vec<(Vec<u8>, Stage)> = index.iter().map(|e| (e.path.to_vec(), e.stage)).collect();
        for pair in keys.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
        for e in index.iter() {
            if e.stage == Stage::Normal {
                prop_assert_eq!(index.get_all(e.path.as_bstr()).len(), 1);
            }
        }
    }
}
