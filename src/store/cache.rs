//! In-memory hot tier in front of a [`StoreBackend`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use image::RgbaImage;

use crate::foundation::error::LayerResult;
use crate::layer::state::{CompressStatus, LayerState, TextureState};
use crate::raster::codec::CompressedTexture;
use crate::snapshot::fingerprint::{StateHash, TextureHash};
use crate::store::backend::{StateRow, StoreBackend, TextureRow};
use crate::store::blob::{ExportDocument, pack_export, pack_texture, unpack_export, unpack_texture};

/// Milliseconds since the Unix epoch.
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Rows written by an import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// State rows upserted.
    pub states: usize,
    /// Texture rows upserted.
    pub textures: usize,
}

/// Hot maps, write buffers and read-through bookkeeping.
pub struct TextureCache {
    backend: Box<dyn StoreBackend>,
    layer_states: HashMap<StateHash, LayerState>,
    textures: HashMap<TextureHash, TextureState>,
    requested_states: HashSet<StateHash>,
    requested_textures: HashSet<TextureHash>,
    pending_states: BTreeMap<StateHash, StateRow>,
    pending_textures: BTreeMap<TextureHash, TextureRow>,
    autosave_debounce: Duration,
    autosave_at: Option<Instant>,
}

impl std::fmt::Debug for TextureCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureCache")
            .field("layer_states", &self.layer_states.len())
            .field("textures", &self.textures.len())
            .field("pending_states", &self.pending_states.len())
            .field("pending_textures", &self.pending_textures.len())
            .field("autosave_at", &self.autosave_at)
            .finish()
    }
}

impl TextureCache {
    /// Wrap `backend`; autosave fires `autosave_debounce` after the latest staged row.
    pub fn new(backend: Box<dyn StoreBackend>, autosave_debounce: Duration) -> Self {
        Self {
            backend,
            layer_states: HashMap::new(),
            textures: HashMap::new(),
            requested_states: HashSet::new(),
            requested_textures: HashSet::new(),
            pending_states: BTreeMap::new(),
            pending_textures: BTreeMap::new(),
            autosave_debounce,
            autosave_at: None,
        }
    }

    /// Persistent tier.
    pub fn backend(&self) -> &dyn StoreBackend {
        self.backend.as_ref()
    }

    /// Snapshot metadata for `hash`.
    pub fn layer_state(&self, hash: StateHash) -> Option<&LayerState> {
        self.layer_states.get(&hash)
    }

    pub(crate) fn layer_state_entry(&mut self, hash: StateHash) -> &mut LayerState {
        self.layer_states.entry(hash).or_default()
    }

    /// Pixel data for `hash`.
    pub fn texture(&self, hash: TextureHash) -> Option<&TextureState> {
        self.textures.get(&hash)
    }

    pub(crate) fn texture_mut(&mut self, hash: TextureHash) -> Option<&mut TextureState> {
        self.textures.get_mut(&hash)
    }

    /// Return `true` when `hash` has a texture that can be displayed now.
    pub fn has_usable_texture(&self, hash: StateHash) -> bool {
        self.layer_states
            .get(&hash)
            .and_then(|s| s.texture)
            .and_then(|t| self.textures.get(&t))
            .is_some_and(TextureState::is_usable)
    }

    /// Number of cached layer states and textures.
    pub fn len(&self) -> (usize, usize) {
        (self.layer_states.len(), self.textures.len())
    }

    /// Record a freshly rasterized bitmap.
    ///
    /// Returns `true` when the texture still needs compressing. An existing compressed
    /// form is kept and the bitmap is dropped.
    pub(crate) fn insert_raw_texture(
        &mut self,
        hash: TextureHash,
        image: RgbaImage,
        timestamp: u64,
    ) -> bool {
        let tex = self
            .textures
            .entry(hash)
            .or_insert_with(|| TextureState::new(hash, timestamp));
        if tex.compressed.is_some() {
            return false;
        }
        if tex.canvas.is_none() {
            tex.canvas = Some(Arc::new(image));
            tex.timestamp = timestamp;
        }
        matches!(tex.status, CompressStatus::Idle)
    }

    /// Drop a raw texture that a retry replaced.
    ///
    /// Entries still referenced by a layer state, being encoded, or already compressed stay.
    pub(crate) fn release_superseded(&mut self, hash: TextureHash) -> bool {
        let Some(tex) = self.textures.get(&hash) else {
            return false;
        };
        if tex.compressed.is_some() || matches!(tex.status, CompressStatus::Loading) {
            return false;
        }
        if self.layer_states.values().any(|s| s.texture == Some(hash)) {
            return false;
        }
        self.textures.remove(&hash);
        tracing::trace!(texture = %hash, "superseded texture released");
        true
    }

    /// Read-through for a state key: consult the persistent tier once per process.
    ///
    /// Returns `true` when a texture reference is now known for `hash`.
    pub fn request_stored_data(&mut self, hash: StateHash) -> LayerResult<bool> {
        if let Some(t) = self.layer_states.get(&hash).and_then(|s| s.texture) {
            return Ok(self.textures.contains_key(&t) || self.request_stored_texture(t)?);
        }
        if !self.requested_states.insert(hash) {
            return Ok(false);
        }
        let row = match self.backend.get_state(hash) {
            Ok(row) => row,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        let Some(texture) = row.texture_hash else {
            return Ok(false);
        };
        self.layer_state_entry(hash).texture.get_or_insert(texture);
        tracing::debug!(state = %hash, texture = %texture, "state loaded from store");
        self.request_stored_texture(texture)
    }

    /// Read-through for a texture: load and unpack it once per process.
    pub fn request_stored_texture(&mut self, hash: TextureHash) -> LayerResult<bool> {
        if self.textures.get(&hash).is_some_and(TextureState::is_usable) {
            return Ok(true);
        }
        if !self.requested_textures.insert(hash) {
            return Ok(false);
        }
        let row = match self.backend.get_texture(hash) {
            Ok(row) => row,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        let compressed = unpack_texture(&row.compressed)?;
        let tex = self
            .textures
            .entry(hash)
            .or_insert_with(|| TextureState::new(hash, row.timestamp));
        tex.compressed = Some(Arc::new(compressed));
        tex.status = CompressStatus::Ready;
        tex.timestamp = row.timestamp;
        Ok(true)
    }

    /// Buffer a `states` row and push the autosave deadline out.
    pub(crate) fn stage_state(
        &mut self,
        hash: StateHash,
        texture: Option<TextureHash>,
        now: Instant,
    ) {
        self.pending_states.insert(
            hash,
            StateRow {
                hash,
                texture_hash: texture,
            },
        );
        self.autosave_at = Some(now + self.autosave_debounce);
    }

    /// Buffer a `textures` row and push the autosave deadline out.
    pub(crate) fn stage_texture(
        &mut self,
        hash: TextureHash,
        compressed: &CompressedTexture,
        timestamp: u64,
        now: Instant,
    ) -> LayerResult<()> {
        let packed = pack_texture(compressed)?;
        self.pending_textures.insert(
            hash,
            TextureRow {
                hash,
                compressed: packed,
                timestamp,
            },
        );
        self.autosave_at = Some(now + self.autosave_debounce);
        Ok(())
    }

    /// Return `true` while rows wait to be written.
    pub fn has_pending_writes(&self) -> bool {
        !self.pending_states.is_empty() || !self.pending_textures.is_empty()
    }

    /// When the next autosave is due.
    pub fn autosave_deadline(&self) -> Option<Instant> {
        self.autosave_at
    }

    /// Flush buffered rows. Textures go first so stored states never dangle.
    ///
    /// On failure the buffers are kept for the next attempt.
    pub fn save(&mut self) -> LayerResult<usize> {
        if !self.has_pending_writes() {
            self.autosave_at = None;
            return Ok(0);
        }
        let textures: Vec<TextureRow> = self.pending_textures.values().cloned().collect();
        self.backend.put_textures(&textures)?;
        self.pending_textures.clear();

        let states: Vec<StateRow> = self.pending_states.values().cloned().collect();
        self.backend.put_states(&states)?;
        self.pending_states.clear();

        self.autosave_at = None;
        tracing::debug!(states = states.len(), textures = textures.len(), "store flushed");
        Ok(states.len() + textures.len())
    }

    /// Run the debounced autosave when due. Failures are logged and retried one window later.
    pub fn poll_autosave(&mut self, now: Instant) -> Option<LayerResult<usize>> {
        let due = self.autosave_at.is_some_and(|at| at <= now);
        if !due {
            return None;
        }
        let result = self.save();
        if let Err(e) = &result {
            tracing::warn!(error = %e, "autosave failed, retrying after the next window");
            self.autosave_at = Some(now + self.autosave_debounce);
        }
        Some(result)
    }

    /// Flush, then pack `scope` (or every stored state) with the textures it references.
    pub fn export_snapshot(&mut self, scope: Option<&[StateHash]>) -> LayerResult<Vec<u8>> {
        self.save()?;
        let hashes = match scope {
            Some(s) => s.iter().copied().collect::<BTreeSet<_>>(),
            None => self.backend.state_hashes()?.into_iter().collect(),
        };

        let mut doc = ExportDocument::new();
        let mut referenced = BTreeSet::new();
        for hash in hashes {
            match self.backend.get_state(hash) {
                Ok(row) => {
                    referenced.extend(row.texture_hash);
                    doc.states.push(row);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        for hash in referenced {
            match self.backend.get_texture(hash) {
                Ok(row) => doc.textures.push(row),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        tracing::debug!(states = doc.states.len(), textures = doc.textures.len(), "export packed");
        pack_export(&doc)
    }

    /// Bulk-upsert an exported blob; the imported keys become eligible for lookup again.
    pub fn import_snapshot(&mut self, blob: &[u8]) -> LayerResult<ImportSummary> {
        let doc = unpack_export(blob)?;
        self.backend.put_textures(&doc.textures)?;
        self.backend.put_states(&doc.states)?;
        for row in &doc.states {
            self.requested_states.remove(&row.hash);
        }
        for row in &doc.textures {
            self.requested_textures.remove(&row.hash);
        }
        Ok(ImportSummary {
            states: doc.states.len(),
            textures: doc.textures.len(),
        })
    }

    /// Close the persistent tier.
    pub fn close(&mut self) -> LayerResult<()> {
        self.backend.close()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/store/cache.rs"]
mod tests;
