use mindforge::store::Store;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Doc {
    value: u32,
}

#[test]
fn write_raw_round_trips_non_json_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path(), 5);
    let source = b"fn f() -> i32 {\n    2\n}\n";
    store.write_raw("candidate.rs", source).unwrap();

    let on_disk = std::fs::read(dir.path().join("candidate.rs")).unwrap();
    assert_eq!(on_disk, source);

    let checksum = std::fs::read_to_string(dir.path().join("candidate.rs.sha256")).unwrap();
    assert_eq!(checksum.trim().len(), 64, "sha256 hex digest should be 64 characters");
}

#[test]
fn write_delegates_to_write_raw_for_json_documents() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path(), 5);
    store.write("doc.json", &Doc { value: 7 }).unwrap();

    let raw = std::fs::read(dir.path().join("doc.json")).unwrap();
    let parsed: Doc = serde_json::from_slice(&raw).unwrap();
    assert_eq!(parsed, Doc { value: 7 });
}

#[test]
fn separate_stores_under_different_roots_do_not_share_backups() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let store_a = Store::new(dir_a.path(), 5);
    let store_b = Store::new(dir_b.path(), 5);

    store_a.write("x.json", &Doc { value: 1 }).unwrap();
    store_a.write("x.json", &Doc { value: 2 }).unwrap();

    let read_b: Option<Doc> = store_b.read("x.json").unwrap();
    assert!(read_b.is_none());
    assert!(!dir_b.path().join("backups").join("x.json").exists());
}
