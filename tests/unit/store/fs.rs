use super::*;

fn state(n: u128) -> StateRow {
    StateRow {
        hash: StateHash(n),
        texture_hash: Some(TextureHash(n + 100)),
    }
}

fn texture(n: u128, len: usize) -> TextureRow {
    TextureRow {
        hash: TextureHash(n),
        compressed: vec![3; len],
        timestamp: 42,
    }
}

#[test]
fn rows_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut store = FsStore::open(dir.path()).unwrap();
        store.put_states(&[state(1), state(2)]).unwrap();
        store.put_textures(&[texture(101, 16)]).unwrap();
    }
    let mut store = FsStore::open(dir.path()).unwrap();
    assert_eq!(store.get_state(StateHash(2)).unwrap(), state(2));
    assert_eq!(store.get_texture(TextureHash(101)).unwrap(), texture(101, 16));
    assert_eq!(store.state_hashes().unwrap(), vec![StateHash(1), StateHash(2)]);
    assert!(store.used_bytes() > 0);
    assert!(dir.path().join("schema.json").is_file());
}

#[test]
fn missing_rows_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FsStore::open(dir.path()).unwrap();
    assert!(store.get_texture(TextureHash(7)).unwrap_err().is_not_found());
}

#[test]
fn schema_mismatch_resets_tables() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut store = FsStore::open(dir.path()).unwrap();
        store.put_states(&[state(1)]).unwrap();
    }
    std::fs::write(dir.path().join("schema.json"), r#"{"version": 999}"#).unwrap();
    let store = FsStore::open(dir.path()).unwrap();
    assert!(store.state_hashes().unwrap().is_empty());
    assert_eq!(store.used_bytes(), 0);
}

#[test]
fn insert_and_quota_errors_use_the_store_taxonomy() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FsStore::open(dir.path()).unwrap().with_quota(256);
    store.insert_texture(texture(1, 8)).unwrap();
    assert_eq!(
        store.insert_texture(texture(1, 8)).unwrap_err().store_kind(),
        Some(StoreErrorKind::Constraint)
    );
    assert_eq!(
        store.put_textures(&[texture(2, 4096)]).unwrap_err().store_kind(),
        Some(StoreErrorKind::QuotaExceeded)
    );
    assert_eq!(store.texture_hashes().unwrap(), vec![TextureHash(1)]);

    store.close().unwrap();
    assert_eq!(
        store.get_texture(TextureHash(1)).unwrap_err().store_kind(),
        Some(StoreErrorKind::Closed)
    );
}

#[test]
fn no_temporary_files_are_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FsStore::open(dir.path()).unwrap();
    store.put_states(&[state(1)]).unwrap();
    let leftovers = std::fs::read_dir(dir.path().join("states"))
        .unwrap()
        .flatten()
        .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
        .count();
    assert_eq!(leftovers, 0);
}
