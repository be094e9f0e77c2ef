use std::fs;
use std::sync::Arc;
use std::thread;

use grove_hash::{HashAlgorithm, ObjectId};
use grove_object::{Blob, FileMode, Object, ObjectType, TreeBuilder};
use grove_odb::{ObjectDatabase, ObjectInfo, OdbError};
use grove_pack::delta::DeltaBuilder;
use grove_pack::PackWriter;
use grove_utils::ErrorKind;
use proptest::prelude::*;

fn scratch() -> (tempfile::TempDir, ObjectDatabase) {
    let dir = tempfile::tempdir().unwrap();
    let odb = ObjectDatabase::open(dir.path().join("objects"), HashAlgorithm::Sha1).unwrap();
    (dir, odb)
}

#[test]
fn write_then_read() {
    let (_dir, odb) = scratch();
    let oid = odb.write_raw(ObjectType::Blob, b"hello\n").unwrap();
    assert_eq!(oid.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
    assert!(odb.exists(&oid));

    let obj = odb.read(&oid).unwrap();
    assert_eq!(obj.as_blob().unwrap().as_bytes(), b"hello\n");
    assert_eq!(
        odb.read_header(&oid).unwrap(),
        ObjectInfo {
            kind: ObjectType::Blob,
            size: 6
        }
    );
    assert_eq!(odb.read_cached(&oid).unwrap(), obj);
    assert_eq!(odb.read_verified(&oid).unwrap(), obj);
}

#[test]
fn hash_only_does_not_store() {
    let (_dir, odb) = scratch();
    let oid = odb.hash_only(b"hello\n", ObjectType::Blob).unwrap();
    assert!(!odb.exists(&oid));
    assert_eq!(odb.write_raw(ObjectType::Blob, b"hello\n").unwrap(), oid);
}

#[test]
fn missing_object() {
    let (_dir, odb) = scratch();
    let oid = odb.hash_only(b"nope", ObjectType::Blob).unwrap();
    let err = odb.read(&oid).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(odb.try_read(&oid).unwrap().is_none());
    assert!(!odb.exists(&oid));
}

#[test]
fn prefix_resolution() {
    let (_dir, odb) = scratch();
    let oid = odb.write_raw(ObjectType::Blob, b"hello\n").unwrap();

    assert_eq!(odb.resolve_prefix("ce0136").unwrap(), oid);
    assert_eq!(odb.resolve_prefix("CE0136").unwrap(), oid);
    assert_eq!(odb.resolve_prefix(&oid.to_hex()).unwrap(), oid);
    assert_eq!(odb.resolve_prefix("ce0").unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(odb.resolve_prefix("ffff").unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn ambiguous_prefix() {
    let (_dir, odb) = scratch();
    // Write until two ids share their first four hex digits.
    let mut seen = std::collections::HashMap::new();
    let mut shared = None;
    for i in 0..100_000u32 {
        let oid = odb.write_raw(ObjectType::Blob, format!("{i}").as_bytes()).unwrap();
        let key = oid.to_hex()[..4].to_string();
        if seen.insert(key.clone(), oid).is_some() {
            shared = Some(key);
            break;
        }
    }
    let shared = shared.unwrap();
    let err = odb.resolve_prefix(&shared).unwrap_err();
    assert!(matches!(err, OdbError::Ambiguous { count, .. } if count >= 2));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn tampered_object_fails_verification() {
    let (dir, odb) = scratch();
    let oid = odb.write_raw(ObjectType::Blob, b"original").unwrap();
    let other = odb.write_raw(ObjectType::Blob, b"imposter").unwrap();

    let objects = dir.path().join("objects");
    let target = objects.join(oid.loose_path());
    let mut perms = fs::metadata(&target).unwrap().permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(&target, perms).unwrap();
    fs::copy(objects.join(other.loose_path()), &target).unwrap();

    let err = odb.read_verified(&oid).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corrupt);
}

#[test]
fn packed_objects_are_readable() {
    let (dir, odb) = scratch();
    let pack_dir = dir.path().join("objects/pack");

    let base = b"fn main() {\n    println!(\"hi\");\n}\n".to_vec();
    let mut target = base.clone();
    target.extend_from_slice(b"// trailer\n");

    let mut w = PackWriter::new(&pack_dir, HashAlgorithm::Sha1).unwrap();
    let base_id = w.add_object(ObjectType::Blob, &base).unwrap();
    let target_id = odb.hash_only(&target, ObjectType::Blob).unwrap();
    let delta = DeltaBuilder::new(base.len())
        .copy(0, base.len() as u32)
        .insert(b"// trailer\n")
        .build();
    w.add_delta(&base_id, target_id, &delta).unwrap();
    w.finish().unwrap();

    assert!(!odb.exists(&target_id));
    odb.refresh().unwrap();
    assert_eq!(odb.pack_count(), 1);

    let obj = odb.read_verified(&target_id).unwrap();
    assert_eq!(obj.as_blob().unwrap().as_bytes(), target.as_slice());
    assert_eq!(odb.read_header(&target_id).unwrap().size, target.len() as u64);
    assert_eq!(odb.resolve_prefix(&target_id.to_hex()[..10]).unwrap(), target_id);

    let all: Vec<ObjectId> = odb.iter_oids().unwrap().collect();
    assert_eq!(all.len(), 2);
}

#[test]
fn loose_objects_fold_into_a_pack() {
    let (dir, odb) = scratch();
    let blob = odb.write(&Object::Blob(Blob::new(b"content".to_vec()))).unwrap();
    let mut tb = TreeBuilder::new();
    tb.insert("file.txt", FileMode::Regular, blob).unwrap();
    let tree = odb.write(&Object::Tree(tb.build())).unwrap();

    let written = odb.pack_loose_objects(true).unwrap().unwrap();
    assert_eq!(written.objects, 2);
    assert!(!dir.path().join("objects").join(blob.loose_path()).exists());

    let reopened = ObjectDatabase::open(dir.path().join("objects"), HashAlgorithm::Sha1).unwrap();
    assert_eq!(reopened.pack_count(), 1);
    let t = reopened.read(&tree).unwrap().into_tree().unwrap();
    assert_eq!(t.entries[0].oid, blob);
    assert!(reopened.pack_loose_objects(false).unwrap().is_none());
}

#[test]
fn alternates_are_searched_last() {
    let shared = tempfile::tempdir().unwrap();
    let shared_odb = ObjectDatabase::open(shared.path(), HashAlgorithm::Sha1).unwrap();
    let oid = shared_odb.write_raw(ObjectType::Blob, b"borrowed").unwrap();

    let (dir, _) = scratch();
    let objects = dir.path().join("objects");
    fs::create_dir_all(objects.join("info")).unwrap();
    fs::write(
        objects.join("info/alternates"),
        format!("{}\n", shared.path().display()),
    )
    .unwrap();

    let odb = ObjectDatabase::open(&objects, HashAlgorithm::Sha1).unwrap();
    assert_eq!(odb.alternate_dirs().len(), 1);
    assert!(odb.exists(&oid));
    assert_eq!(odb.read(&oid).unwrap().as_blob().unwrap().as_bytes(), b"borrowed");
    assert_eq!(odb.resolve_prefix(&oid.to_hex()[..8]).unwrap(), oid);
    assert!(!objects.join(oid.loose_path()).exists());
}

#[test]
fn concurrent_writers_agree() {
    let (_dir, odb) = scratch();
    let odb = Arc::new(odb);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let odb = Arc::clone(&odb);
            thread::spawn(move || odb.write_raw(ObjectType::Blob, b"same bytes").unwrap())
        })
        .collect();
    let ids: Vec<ObjectId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(odb.read(&ids[0]).unwrap().as_blob().unwrap().as_bytes(), b"same bytes");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn distinct_contents_distinct_ids(a in proptest::collection::vec(any::<u8>(), 0..256),
                                      b in proptest::collection::vec(any::<u8>(), 0..256)) {
        prop_assume!(a != b);
        let (_dir, odb) = scratch();
        let x = odb.write_raw(ObjectType::Blob, &a).unwrap();
        let y = odb.write_raw(ObjectType::Blob, &b).unwrap();
        prop_assert_ne!(x, y);
        let back = odb.read(&x).unwrap().into_blob().unwrap();
        prop_assert_eq!(back.as_bytes(), a.as_slice());
    }
}
