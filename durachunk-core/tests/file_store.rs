use durachunk_core::checksum::checksum_hex;
use durachunk_core::store::{
    property_checksum, property_size, ContentStore, FileStore, Properties, PROP_MIMETYPE,
};
use durachunk_core::StoreError;
use std::fs;
use std::io::Read;

const SPACE: &str = "space-a";

fn put(
    store: &FileStore,
    id: &str,
    data: &[u8],
    checksum: Option<&str>,
) -> Result<String, StoreError> {
    let mut src = data;
    let mut props = Properties::new();
    props.insert("owner".into(), "alice".into());
    store.put(SPACE, id, &mut src, data.len() as u64, "text/plain", checksum, &props)
}

fn read_all(store: &FileStore, id: &str) -> Vec<u8> {
    let mut out = Vec::new();
    store.get(SPACE, id).unwrap().stream.read_to_end(&mut out).unwrap();
    out
}

#[test]
fn put_get_list_delete() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path().join("store")).unwrap();

    let stored = put(&store, "dir/a.txt", b"hello world", None).unwrap();
    assert_eq!(stored, checksum_hex(b"hello world"));
    put(&store, "b.txt", b"second", Some(&checksum_hex(b"second"))).unwrap();

    assert_eq!(read_all(&store, "dir/a.txt"), b"hello world");
    let props = store.get_properties(SPACE, "dir/a.txt").unwrap();
    assert_eq!(property_size(&props), Some(11));
    assert_eq!(property_checksum(&props), Some(stored.as_str()));
    assert_eq!(props.get(PROP_MIMETYPE).map(String::as_str), Some("text/plain"));
    assert_eq!(props.get("owner").map(String::as_str), Some("alice"));

    let mut ids = store.list(SPACE, None).unwrap();
    ids.sort();
    assert_eq!(ids, vec!["b.txt".to_string(), "dir/a.txt".to_string()]);
    assert_eq!(store.list(SPACE, Some("dir/")).unwrap(), vec!["dir/a.txt".to_string()]);
    assert!(store.list("empty-space", None).unwrap().is_empty());

    store.delete(SPACE, "dir/a.txt").unwrap();
    assert!(store.get(SPACE, "dir/a.txt").unwrap_err().is_not_found());
    assert!(store.get_properties(SPACE, "dir/a.txt").unwrap_err().is_not_found());
    assert!(store.delete(SPACE, "dir/a.txt").unwrap_err().is_not_found());
}

#[test]
fn overwrite_replaces_bytes_and_properties() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path()).unwrap();
    put(&store, "x", b"first version", None).unwrap();
    put(&store, "x", b"v2", None).unwrap();
    assert_eq!(read_all(&store, "x"), b"v2");
    assert_eq!(property_size(&store.get_properties(SPACE, "x").unwrap()), Some(2));
}

#[test]
fn rejected_writes_leave_nothing_behind() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path()).unwrap();

    let err = put(&store, "bad-sum", b"payload", Some("0000")).unwrap_err();
    assert!(matches!(err, StoreError::ChecksumMismatch { .. }));

    let mut src = &b"short"[..];
    let err = store
        .put(SPACE, "bad-size", &mut src, 99, "text/plain", None, &Properties::new())
        .unwrap_err();
    assert!(matches!(err, StoreError::SizeMismatch { expected: 99, actual: 5, .. }));

    assert!(store.list(SPACE, None).unwrap().is_empty());
    let tmp_dir = tmp.path().join(SPACE).join("tmp");
    assert_eq!(fs::read_dir(tmp_dir).unwrap().count(), 0);
}

#[test]
fn traversal_and_absolute_ids_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path().join("store")).unwrap();
    for id in ["../escape", "a/../../b", "/etc/passwd", "a//b", "./a", "a\\b", ""] {
        let err = put(&store, id, b"x", None).unwrap_err();
        assert!(matches!(err, StoreError::InvalidContentId(_)), "id {id:?} gave {err:?}");
    }
    let err = store.get("../other", "a").unwrap_err();
    assert!(matches!(err, StoreError::InvalidContentId(_)));
    assert!(!tmp.path().join("escape").exists());
}

#[cfg(target_family = "unix")]
#[test]
fn symlinked_directories_are_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path().join("store")).unwrap();
    let outside = tmp.path().join("outside");
    fs::create_dir_all(&outside).unwrap();
    put(&store, "real/file", b"inside", None).unwrap();

    let link = tmp.path().join("store").join(SPACE).join("data").join("link");
    std::os::unix::fs::symlink(&outside, &link).unwrap();

    let err = put(&store, "link/file", b"x", None).unwrap_err();
    assert!(matches!(err, StoreError::InvalidContentId(ref m) if m.contains("symlink")));
    assert_eq!(fs::read_dir(&outside).unwrap().count(), 0);
}

#[test]
fn failed_commit_removes_staged_files() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path()).unwrap();
    put(&store, "a", b"plain file", None).unwrap();

    // data/a is a file, so data/a/ cannot be created
    let err = put(&store, "a/b", b"nested", None).unwrap_err();
    assert!(matches!(err, StoreError::Io(_)), "unexpected error: {err:?}");
    let tmp_dir = tmp.path().join(SPACE).join("tmp");
    assert_eq!(fs::read_dir(tmp_dir).unwrap().count(), 0);

    assert_eq!(read_all(&store, "a"), b"plain file");
    assert_eq!(property_size(&store.get_properties(SPACE, "a").unwrap()), Some(10));
}

#[cfg(target_family = "unix")]
#[test]
fn bytes_never_outlive_their_properties() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path()).unwrap();
    put(&store, "x", b"old", None).unwrap();

    // a directory where the property file belongs makes the last rename fail
    let meta = tmp.path().join(SPACE).join("meta").join("x.json");
    fs::remove_file(&meta).unwrap();
    fs::create_dir_all(meta.join("blocker")).unwrap();

    assert!(put(&store, "x", b"new bytes", None).is_err());
    assert!(store.get(SPACE, "x").unwrap_err().is_not_found());
    assert!(store.list(SPACE, None).unwrap().is_empty());
    let tmp_dir = tmp.path().join(SPACE).join("tmp");
    assert_eq!(fs::read_dir(tmp_dir).unwrap().count(), 0);
}
