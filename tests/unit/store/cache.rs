use super::*;
use crate::foundation::error::{LayerError, StoreErrorKind};
use crate::raster::codec::encode_bc3;
use crate::store::backend::MemoryStore;

fn compressed() -> CompressedTexture {
    encode_bc3(&RgbaImage::from_pixel(8, 8, image::Rgba([1, 2, 3, 255]))).unwrap()
}

fn cache_with(store: MemoryStore) -> TextureCache {
    TextureCache::new(Box::new(store), Duration::from_millis(1000))
}

/// Backend that counts lookups and can be switched into a failing mode.
struct Counting {
    inner: MemoryStore,
    state_reads: Arc<std::sync::atomic::AtomicUsize>,
    fail_writes: Arc<std::sync::atomic::AtomicBool>,
}

impl StoreBackend for Counting {
    fn get_state(&mut self, hash: StateHash) -> LayerResult<StateRow> {
        self.state_reads
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.inner.get_state(hash)
    }
    fn get_texture(&mut self, hash: TextureHash) -> LayerResult<TextureRow> {
        self.inner.get_texture(hash)
    }
    fn put_states(&mut self, rows: &[StateRow]) -> LayerResult<()> {
        self.inner.put_states(rows)
    }
    fn put_textures(&mut self, rows: &[TextureRow]) -> LayerResult<()> {
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(LayerError::store(StoreErrorKind::QuotaExceeded, "full"));
        }
        self.inner.put_textures(rows)
    }
    fn insert_texture(&mut self, row: TextureRow) -> LayerResult<()> {
        self.inner.insert_texture(row)
    }
    fn state_hashes(&self) -> LayerResult<Vec<StateHash>> {
        self.inner.state_hashes()
    }
    fn texture_hashes(&self) -> LayerResult<Vec<TextureHash>> {
        self.inner.texture_hashes()
    }
    fn used_bytes(&self) -> u64 {
        self.inner.used_bytes()
    }
    fn close(&mut self) -> LayerResult<()> {
        self.inner.close()
    }
}

#[test]
fn persistent_lookups_happen_once_per_hash() {
    let reads = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let backend = Counting {
        inner: MemoryStore::new(),
        state_reads: reads.clone(),
        fail_writes: Arc::default(),
    };
    let mut cache = TextureCache::new(Box::new(backend), Duration::from_millis(10));
    assert!(!cache.request_stored_data(StateHash(1)).unwrap());
    assert!(!cache.request_stored_data(StateHash(1)).unwrap());
    assert!(!cache.request_stored_data(StateHash(2)).unwrap());
    assert_eq!(reads.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[test]
fn read_through_loads_state_and_texture() {
    let mut store = MemoryStore::new();
    let tex = compressed();
    store
        .put_textures(&[TextureRow {
            hash: TextureHash(9),
            compressed: pack_texture(&tex).unwrap(),
            timestamp: 5,
        }])
        .unwrap();
    store
        .put_states(&[StateRow {
            hash: StateHash(1),
            texture_hash: Some(TextureHash(9)),
        }])
        .unwrap();

    let mut cache = cache_with(store);
    assert!(cache.request_stored_data(StateHash(1)).unwrap());
    assert!(cache.has_usable_texture(StateHash(1)));
    let t = cache.texture(TextureHash(9)).unwrap();
    assert_eq!(t.status, CompressStatus::Ready);
    assert_eq!(t.compressed.as_deref(), Some(&tex));
    assert!(t.canvas.is_none());
}

#[test]
fn writes_are_buffered_until_save() {
    let mut cache = cache_with(MemoryStore::new());
    let now = Instant::now();
    cache.stage_state(StateHash(1), Some(TextureHash(2)), now);
    cache
        .stage_texture(TextureHash(2), &compressed(), 1, now)
        .unwrap();
    assert!(cache.backend().state_hashes().unwrap().is_empty());
    assert_eq!(cache.autosave_deadline(), Some(now + Duration::from_millis(1000)));

    assert!(cache.poll_autosave(now).is_none());
    let written = cache
        .poll_autosave(now + Duration::from_millis(1000))
        .unwrap()
        .unwrap();
    assert_eq!(written, 2);
    assert!(!cache.has_pending_writes());
    assert_eq!(cache.backend().texture_hashes().unwrap(), vec![TextureHash(2)]);
    assert_eq!(cache.autosave_deadline(), None);
}

#[test]
fn staged_state_alone_arms_the_autosave() {
    let mut cache = cache_with(MemoryStore::new());
    let now = Instant::now();
    cache.stage_state(StateHash(7), Some(TextureHash(2)), now);
    assert_eq!(cache.autosave_deadline(), Some(now + Duration::from_millis(1000)));

    let written = cache
        .poll_autosave(now + Duration::from_millis(1000))
        .unwrap()
        .unwrap();
    assert_eq!(written, 1);
    assert_eq!(cache.backend().state_hashes().unwrap(), vec![StateHash(7)]);
}

#[test]
fn failed_autosave_keeps_rows_and_reschedules() {
    let fail = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let backend = Counting {
        inner: MemoryStore::new(),
        state_reads: Arc::default(),
        fail_writes: fail.clone(),
    };
    let mut cache = TextureCache::new(Box::new(backend), Duration::from_millis(100));
    let t0 = Instant::now();
    cache.stage_state(StateHash(1), Some(TextureHash(2)), t0);
    cache.stage_texture(TextureHash(2), &compressed(), 1, t0).unwrap();

    let t1 = t0 + Duration::from_millis(100);
    assert!(cache.poll_autosave(t1).unwrap().is_err());
    assert!(cache.has_pending_writes());
    assert_eq!(cache.autosave_deadline(), Some(t1 + Duration::from_millis(100)));

    fail.store(false, std::sync::atomic::Ordering::SeqCst);
    assert!(cache.poll_autosave(t1).is_none());
    assert_eq!(
        cache
            .poll_autosave(t1 + Duration::from_millis(100))
            .unwrap()
            .unwrap(),
        2
    );
}

#[test]
fn explicit_save_surfaces_store_errors() {
    let mut cache = cache_with(MemoryStore::new().with_quota(8));
    cache
        .stage_texture(TextureHash(2), &compressed(), 1, Instant::now())
        .unwrap();
    let err = cache.save().unwrap_err();
    assert_eq!(err.store_kind(), Some(StoreErrorKind::QuotaExceeded));
    assert!(cache.has_pending_writes());
}

#[test]
fn export_import_round_trip_is_row_identical() {
    let mut a = cache_with(MemoryStore::new());
    let now = Instant::now();
    a.stage_state(StateHash(1), Some(TextureHash(10)), now);
    a.stage_state(StateHash(2), Some(TextureHash(10)), now);
    a.stage_state(StateHash(3), None, now);
    a.stage_texture(TextureHash(10), &compressed(), 77, now).unwrap();
    let blob = a.export_snapshot(None).unwrap();

    let mut b = cache_with(MemoryStore::new());
    let summary = b.import_snapshot(&blob).unwrap();
    assert_eq!(summary, ImportSummary { states: 3, textures: 1 });

    for h in [1, 2, 3] {
        let left = a.backend.get_state(StateHash(h)).unwrap();
        let right = b.backend.get_state(StateHash(h)).unwrap();
        assert_eq!(left, right);
    }
    assert_eq!(
        a.backend.get_texture(TextureHash(10)).unwrap(),
        b.backend.get_texture(TextureHash(10)).unwrap()
    );
}

#[test]
fn scoped_export_only_carries_referenced_textures() {
    let mut a = cache_with(MemoryStore::new());
    let now = Instant::now();
    a.stage_state(StateHash(1), Some(TextureHash(10)), now);
    a.stage_state(StateHash(2), Some(TextureHash(20)), now);
    a.stage_texture(TextureHash(10), &compressed(), 1, now).unwrap();
    a.stage_texture(TextureHash(20), &compressed(), 1, now).unwrap();

    let doc = unpack_export(&a.export_snapshot(Some(&[StateHash(2), StateHash(99)])).unwrap()).unwrap();
    assert_eq!(doc.states.len(), 1);
    assert_eq!(doc.textures.len(), 1);
    assert_eq!(doc.textures[0].hash, TextureHash(20));
}

#[test]
fn import_makes_previously_missed_hashes_eligible() {
    let mut source = cache_with(MemoryStore::new());
    source.stage_state(StateHash(1), Some(TextureHash(10)), Instant::now());
    source
        .stage_texture(TextureHash(10), &compressed(), 1, Instant::now())
        .unwrap();
    let blob = source.export_snapshot(None).unwrap();

    let mut target = cache_with(MemoryStore::new());
    assert!(!target.request_stored_data(StateHash(1)).unwrap());
    target.import_snapshot(&blob).unwrap();
    assert!(target.request_stored_data(StateHash(1)).unwrap());
}
