use grove_hash::{HashAlgorithm, Hasher, ObjectId, OidPrefix};
use grove_object::ObjectType;
use grove_pack::delta::DeltaBuilder;
use grove_pack::pack::{BaseResolver, NoExternalBases};
use grove_pack::{PackError, PackFile, PackWriter};
use grove_utils::ErrorKind;

const BASE: &[u8] = b"line one\nline two\nline three\nline four\n";

fn blob_id(data: &[u8]) -> ObjectId {
    Hasher::hash_object(HashAlgorithm::Sha1, "blob", data).unwrap()
}

#[test]
fn full_objects_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut w = PackWriter::new(dir.path(), HashAlgorithm::Sha1).unwrap();
    let a = w.add_object(ObjectType::Blob, b"alpha").unwrap();
    let b = w.add_object(ObjectType::Blob, b"beta").unwrap();
    let again = w.add_object(ObjectType::Blob, b"alpha").unwrap();
    assert_eq!(a, again);
    let written = w.finish().unwrap();
    assert_eq!(written.objects, 2);
    assert!(written.pack_path.ends_with(format!("pack-{}.pack", written.checksum)));

    let pack = PackFile::open(&written.pack_path, HashAlgorithm::Sha1).unwrap();
    pack.verify_checksum().unwrap();
    pack.index().verify().unwrap();
    assert_eq!(pack.len(), 2);
    assert_eq!(
        pack.read(&a, &NoExternalBases).unwrap(),
        Some((ObjectType::Blob, b"alpha".to_vec()))
    );
    assert_eq!(
        pack.read_header(&b, &NoExternalBases).unwrap(),
        Some((ObjectType::Blob, 4))
    );
    assert!(pack.read(&blob_id(b"gamma"), &NoExternalBases).unwrap().is_none());
}

#[test]
fn ofs_delta_chain_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let mut w = PackWriter::new(dir.path(), HashAlgorithm::Sha1).unwrap();
    let base = w.add_object(ObjectType::Blob, BASE).unwrap();

    // base -> v2 (replace line two) -> v3 (append a line)
    let v2 = b"line one\nline 2\nline three\nline four\n".to_vec();
    let d1 = DeltaBuilder::new(BASE.len())
        .copy(0, 9)
        .insert(b"line 2\n")
        .copy(18, (BASE.len() - 18) as u32)
        .build();
    let v2_id = blob_id(&v2);
    w.add_delta(&base, v2_id, &d1).unwrap();

    let mut v3 = v2.clone();
    v3.extend_from_slice(b"line five\n");
    let d2 = DeltaBuilder::new(v2.len())
        .copy(0, v2.len() as u32)
        .insert(b"line five\n")
        .build();
    let v3_id = blob_id(&v3);
    w.add_delta(&v2_id, v3_id, &d2).unwrap();
    let written = w.finish().unwrap();

    let pack = PackFile::open(&written.pack_path, HashAlgorithm::Sha1).unwrap();
    assert_eq!(pack.read(&v2_id, &NoExternalBases).unwrap().unwrap().1, v2);
    let (kind, data) = pack.read(&v3_id, &NoExternalBases).unwrap().unwrap();
    assert_eq!(kind, ObjectType::Blob);
    assert_eq!(data, v3);
    assert_eq!(blob_id(&data), v3_id);
    assert_eq!(
        pack.read_header(&v3_id, &NoExternalBases).unwrap(),
        Some((ObjectType::Blob, v3.len() as u64))
    );

    let prefix = OidPrefix::new(&v3_id.short_hex(8)).unwrap();
    assert_eq!(pack.find_prefix(&prefix).unwrap(), vec![v3_id]);
}

#[test]
fn delta_against_unknown_base_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let mut w = PackWriter::new(dir.path(), HashAlgorithm::Sha1).unwrap();
    let err = w
        .add_delta(&blob_id(b"nope"), blob_id(b"x"), &DeltaBuilder::new(4).build())
        .unwrap_err();
    assert!(matches!(err, PackError::MissingBase(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

struct OneBase(ObjectId, Vec<u8>);

impl BaseResolver for OneBase {
    fn resolve_base(&self, oid: &ObjectId) -> Option<(ObjectType, Vec<u8>)> {
        (*oid == self.0).then(|| (ObjectType::Blob, self.1.clone()))
    }
}

#[test]
fn ref_delta_uses_external_resolver() {
    use std::io::Write;

    // Hand-assemble a one-entry thin pack whose REF_DELTA base is elsewhere.
    let base_id = blob_id(BASE);
    let target = b"line one\n".to_vec();
    let delta = DeltaBuilder::new(BASE.len()).copy(0, 9).build();

    let mut body = b"PACK\0\0\0\x02\0\0\0\x01".to_vec();
    let mut header = grove_pack::entry::encode_header(7, delta.len() as u64);
    header.extend_from_slice(base_id.as_bytes());
    let mut z = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    z.write_all(&delta).unwrap();
    let compressed = z.finish().unwrap();
    body.extend_from_slice(&header);
    body.extend_from_slice(&compressed);
    let checksum = Hasher::digest(HashAlgorithm::Sha1, &body).unwrap();
    body.extend_from_slice(checksum.as_bytes());

    let dir = tempfile::tempdir().unwrap();
    let pack_path = dir.path().join("pack-thin.pack");
    std::fs::write(&pack_path, &body).unwrap();
    let target_id = blob_id(&target);
    let mut records = vec![grove_pack::index::IndexRecord {
        oid: target_id,
        offset: 12,
        crc32: 0,
    }];
    let idx = grove_pack::index::encode_index(&mut records, &checksum, HashAlgorithm::Sha1).unwrap();
    std::fs::write(dir.path().join("pack-thin.idx"), idx).unwrap();

    let pack = PackFile::open(&pack_path, HashAlgorithm::Sha1).unwrap();
    let err = pack.read(&target_id, &NoExternalBases).unwrap_err();
    assert!(matches!(err, PackError::MissingBase(b) if b == base_id));

    let resolver = OneBase(base_id, BASE.to_vec());
    assert_eq!(
        pack.read(&target_id, &resolver).unwrap(),
        Some((ObjectType::Blob, target.clone()))
    );
    assert_eq!(
        pack.read_header(&target_id, &resolver).unwrap(),
        Some((ObjectType::Blob, target.len() as u64))
    );
}

#[test]
fn mismatched_index_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut w = PackWriter::new(dir.path().join("a"), HashAlgorithm::Sha1).unwrap();
    w.add_object(ObjectType::Blob, b"one").unwrap();
    let first = w.finish().unwrap();
    let mut w = PackWriter::new(dir.path().join("b"), HashAlgorithm::Sha1).unwrap();
    w.add_object(ObjectType::Blob, b"two").unwrap();
    let second = w.finish().unwrap();

    std::fs::copy(&second.index_path, &first.index_path).unwrap();
    assert!(PackFile::open(&first.pack_path, HashAlgorithm::Sha1).is_err());
}
