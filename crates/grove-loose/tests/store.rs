use std::fs;
use std::io::Write;

use flate2::write::ZlibEncoder;
use grove_hash::{HashAlgorithm, ObjectId, OidPrefix};
use grove_loose::{LooseError, LooseStore};
use grove_object::{Blob, Object, ObjectType};
use grove_utils::ErrorKind;
use proptest::prelude::*;

fn store() -> (tempfile::TempDir, LooseStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = LooseStore::new(dir.path().join("objects"), HashAlgorithm::Sha1);
    (dir, store)
}

#[test]
fn write_then_read() {
    let (_dir, store) = store();
    let oid = store.write_raw(ObjectType::Blob, b"hello world").unwrap();
    assert_eq!(oid.to_hex(), "95d09f2b10159347eece71399a7e2e907ea3df4f");
    assert!(store.contains(&oid));

    let obj = store.read(&oid).unwrap().unwrap();
    assert_eq!(obj.as_blob().unwrap().data, b"hello world");
    assert_eq!(store.read_header(&oid).unwrap(), Some((ObjectType::Blob, 11)));
    assert!(store.read_verified(&oid).unwrap().is_some());
}

#[test]
fn second_write_is_a_no_op() {
    let (_dir, store) = store();
    let obj = Object::Blob(Blob::new(b"same".to_vec()));
    let a = store.write(&obj).unwrap();
    let before = fs::metadata(store.object_path(&a)).unwrap().modified().unwrap();
    let b = store.write(&obj).unwrap();
    let after = fs::metadata(store.object_path(&a)).unwrap().modified().unwrap();
    assert_eq!(a, b);
    assert_eq!(before, after);
    assert_eq!(store.iter().unwrap().count(), 1);
}

#[cfg(unix)]
#[test]
fn objects_are_read_only() {
    use std::os::unix::fs::PermissionsExt;
    let (_dir, store) = store();
    let oid = store.write_raw(ObjectType::Blob, b"ro").unwrap();
    let mode = fs::metadata(store.object_path(&oid)).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o444);
}

#[test]
fn missing_object_is_none() {
    let (_dir, store) = store();
    let oid = ObjectId::from_hex("0123456789012345678901234567890123456789").unwrap();
    assert!(store.read(&oid).unwrap().is_none());
    assert!(store.read_header(&oid).unwrap().is_none());
    assert!(!store.contains(&oid));
}

#[test]
fn tampered_object_fails_verification() {
    let (_dir, store) = store();
    let oid = store.write_raw(ObjectType::Blob, b"original").unwrap();
    let path = store.object_path(&oid);

    let mut enc = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(b"blob 8\0tampered").unwrap();
    let bytes = enc.finish().unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
    }
    fs::write(&path, bytes).unwrap();

    // Unverified reads trust the file.
    assert!(store.read(&oid).unwrap().is_some());
    let err = store.read_verified(&oid).unwrap_err();
    assert!(matches!(err, LooseError::HashMismatch { .. }));
    assert_eq!(err.kind(), ErrorKind::Corrupt);
}

#[test]
fn garbage_is_corrupt() {
    let (_dir, store) = store();
    let oid = store.write_raw(ObjectType::Blob, b"x").unwrap();
    let path = store.object_path(&oid);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
    }
    fs::write(&path, b"not zlib").unwrap();
    assert_eq!(store.read(&oid).unwrap_err().kind(), ErrorKind::Corrupt);
}

#[test]
fn iterate_and_prefix() {
    let (_dir, store) = store();
    let mut written: Vec<ObjectId> = (0..20)
        .map(|i| store.write_raw(ObjectType::Blob, format!("blob {i}").as_bytes()).unwrap())
        .collect();
    written.sort();
    let listed: Vec<ObjectId> = store.iter().unwrap().map(Result::unwrap).collect();
    assert_eq!(listed, written);

    let target = written[7];
    let prefix = OidPrefix::new(&target.short_hex(10)).unwrap();
    assert_eq!(store.find_prefix(&prefix).unwrap(), vec![target]);
}

#[test]
fn iterating_missing_dir_is_empty() {
    let (_dir, store) = store();
    assert_eq!(store.iter().unwrap().count(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]
    #[test]
    fn content_round_trips(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let (_dir, store) = store();
        let oid = store.write_raw(ObjectType::Blob, &data).unwrap();
        let (kind, back) = store.read_raw(&oid).unwrap().unwrap();
        prop_assert_eq!(kind, ObjectType::Blob);
        prop_assert_eq!(back, data);
    }
}
