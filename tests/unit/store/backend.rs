use super::*;

fn texture(n: u128, len: usize) -> TextureRow {
    TextureRow {
        hash: TextureHash(n),
        compressed: vec![7; len],
        timestamp: 1_700_000_000_000,
    }
}

#[test]
fn missing_keys_are_not_found() {
    let mut store = MemoryStore::new();
    assert!(store.get_state(StateHash(1)).unwrap_err().is_not_found());
    assert!(store.get_texture(TextureHash(1)).unwrap_err().is_not_found());
}

#[test]
fn puts_are_upserts() {
    let mut store = MemoryStore::new();
    let row = StateRow {
        hash: StateHash(1),
        texture_hash: None,
    };
    store.put_states(&[row.clone()]).unwrap();
    let updated = StateRow {
        texture_hash: Some(TextureHash(9)),
        ..row
    };
    store.put_states(&[updated.clone()]).unwrap();
    assert_eq!(store.get_state(StateHash(1)).unwrap(), updated);
    assert_eq!(store.state_hashes().unwrap(), vec![StateHash(1)]);
}

#[test]
fn insert_rejects_duplicates() {
    let mut store = MemoryStore::new();
    store.insert_texture(texture(1, 4)).unwrap();
    let err = store.insert_texture(texture(1, 4)).unwrap_err();
    assert_eq!(err.store_kind(), Some(StoreErrorKind::Constraint));
    store.put_textures(&[texture(1, 8)]).unwrap();
    assert_eq!(store.get_texture(TextureHash(1)).unwrap().compressed.len(), 8);
}

#[test]
fn quota_is_enforced_atomically() {
    let mut store = MemoryStore::new().with_quota(100);
    store.put_textures(&[texture(1, 50)]).unwrap();
    let err = store
        .put_textures(&[texture(2, 10), texture(3, 50)])
        .unwrap_err();
    assert_eq!(err.store_kind(), Some(StoreErrorKind::QuotaExceeded));
    assert_eq!(store.texture_hashes().unwrap(), vec![TextureHash(1)]);
}

#[test]
fn closed_store_rejects_everything() {
    let mut store = MemoryStore::new();
    store.close().unwrap();
    let err = store.get_state(StateHash(1)).unwrap_err();
    assert_eq!(err.store_kind(), Some(StoreErrorKind::Closed));
    assert!(store.put_states(&[]).is_err());
    assert!(store.texture_hashes().is_err());
}
