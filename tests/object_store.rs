//! Object database round trips through the loose tier.

mod common;

use common::{init_repo, random_content, write_file};
use kit::{Error, ObjectBox, ObjectType};
use pretty_assertions::assert_eq;
use std::io::Read;

#[test]
fn round_trips_every_object_type() {
    let (_dir, repo) = init_repo();
    let database = repo.database();

    let cases: Vec<(ObjectType, Vec<u8>)> = vec![
        (ObjectType::Blob, b"hello\n".to_vec()),
        (ObjectType::Blob, vec![0u8, 255, 3, 7, 0]),
        (ObjectType::Blob, Vec::new()),
        (ObjectType::Blob, vec![0x42; 100_000]),
        (ObjectType::Blob, random_content().into_bytes()),
    ];

    for (object_type, payload) in cases {
        let oid = database.store_bytes(object_type, &payload).unwrap();

        let reader = database.open(&oid).unwrap();
        assert_eq!(reader.object_type(), object_type);
        assert_eq!(reader.size(), payload.len() as u64);
        assert_eq!(reader.read_to_bytes().unwrap().as_ref(), &payload[..]);
    }
}

#[test]
fn hashes_are_stable_across_stores() {
    let (_dir, repo) = init_repo();

    let first = repo
        .database()
        .store_bytes(ObjectType::Blob, b"hello\n")
        .unwrap();
    assert_eq!(first.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");

    // rewriting an existing object must leave byte-identical content
    let loose_path = repo.database().objects_path().join(first.to_path());
    let before = std::fs::read(&loose_path).unwrap();
    let second = repo
        .database()
        .store_bytes(ObjectType::Blob, b"hello\n")
        .unwrap();
    let after = std::fs::read(&loose_path).unwrap();

    assert_eq!(first, second);
    assert_eq!(before, after);
}

#[test]
fn payload_streams_without_full_materialization() {
    let (_dir, repo) = init_repo();
    let payload = vec![0xA5u8; 1 << 20];
    let oid = repo
        .database()
        .store_bytes(ObjectType::Blob, &payload)
        .unwrap();

    let mut reader = repo.database().open(&oid).unwrap();
    let mut first_chunk = [0u8; 1024];
    reader.read_exact(&mut first_chunk).unwrap();
    assert_eq!(&first_chunk[..], &payload[..1024]);
}

#[test]
fn missing_objects_are_not_found() {
    let (_dir, repo) = init_repo();
    let absent = kit::ObjectId::from_raw([0xEE; 20]);

    let err = repo.database().open(&absent).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::NotFound(_))
    ));
}

#[test]
fn truncated_loose_files_are_corrupt() {
    let (_dir, repo) = init_repo();
    let payload: Vec<u8> = (0..8192u32).flat_map(|i| i.to_le_bytes()).collect();
    let oid = repo
        .database()
        .store_bytes(ObjectType::Blob, &payload)
        .unwrap();

    let loose_path = repo.database().objects_path().join(oid.to_path());
    let bytes = std::fs::read(&loose_path).unwrap();
    std::fs::write(&loose_path, &bytes[..bytes.len() / 2]).unwrap();

    let err = repo
        .database()
        .open(&oid)
        .and_then(|reader| reader.read_to_bytes());
    assert!(matches!(
        err.unwrap_err().downcast_ref::<Error>(),
        Some(Error::Corrupt(_))
    ));
}

#[test]
fn hash_file_matches_store_bytes() {
    let (dir, repo) = init_repo();
    write_file(dir.path(), "a.txt", b"hello\n");

    let hashed = repo.database().hash_file(&dir.path().join("a.txt")).unwrap();
    assert_eq!(hashed.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");

    // hashing alone must not write the object
    let loose_path = repo.database().objects_path().join(hashed.to_path());
    assert!(!loose_path.exists());
}

#[test]
fn prefix_search_narrows_to_matches() {
    let (_dir, repo) = init_repo();
    let database = repo.database();

    let hello = database.store_bytes(ObjectType::Blob, b"hello\n").unwrap();
    let world = database.store_bytes(ObjectType::Blob, b"world\n").unwrap();

    let matches = database.find_objects_by_prefix(&hello.to_hex()[..8]).unwrap();
    assert_eq!(matches, vec![hello]);

    let empty = database.find_objects_by_prefix("0123456789").unwrap();
    assert!(empty.is_empty());

    let all = database.find_objects_by_prefix("").unwrap();
    assert!(all.contains(&hello) && all.contains(&world));
}

#[test]
fn parse_object_dispatches_on_type() {
    let (_dir, repo) = init_repo();
    let oid = repo
        .database()
        .store_bytes(ObjectType::Blob, b"typed payload")
        .unwrap();

    match repo.database().parse_object(&oid).unwrap() {
        ObjectBox::Blob(blob) => assert_eq!(blob.content().as_ref(), b"typed payload"),
        _ => panic!("expected a blob"),
    }

    assert!(repo.database().parse_object_as_commit(&oid).unwrap().is_none());
}
