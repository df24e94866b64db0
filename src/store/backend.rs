//! Persistent `states` / `textures` tables.

use std::collections::BTreeMap;

use crate::foundation::error::{LayerError, LayerResult, StoreErrorKind};
use crate::snapshot::fingerprint::{StateHash, TextureHash};

/// Version of the row layout; stores with another version are reset on open.
pub const SCHEMA_VERSION: u32 = 1;

/// Row of the `states` table.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StateRow {
    /// Key.
    pub hash: StateHash,
    /// Texture rendered for this state, once known.
    pub texture_hash: Option<TextureHash>,
}

/// Row of the `textures` table.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TextureRow {
    /// Key.
    pub hash: TextureHash,
    /// zstd-packed `LTX1` container.
    pub compressed: Vec<u8>,
    /// Milliseconds since the Unix epoch when the texture was produced.
    pub timestamp: u64,
}

impl StateRow {
    pub(crate) const STORED_BYTES: u64 = 48;
}

impl TextureRow {
    pub(crate) fn stored_bytes(&self) -> u64 {
        self.compressed.len() as u64 + 24
    }
}

/// Durable key-value tables behind the in-memory cache.
///
/// Missing keys are reported as [`StoreErrorKind::NotFound`]. Bulk puts are upserts and
/// either apply completely or not at all with respect to the quota.
pub trait StoreBackend: Send {
    /// Row layout version of this store.
    fn schema_version(&self) -> u32 {
        SCHEMA_VERSION
    }

    /// Look up a state row.
    fn get_state(&mut self, hash: StateHash) -> LayerResult<StateRow>;

    /// Look up a texture row.
    fn get_texture(&mut self, hash: TextureHash) -> LayerResult<TextureRow>;

    /// Upsert state rows.
    fn put_states(&mut self, rows: &[StateRow]) -> LayerResult<()>;

    /// Upsert texture rows.
    fn put_textures(&mut self, rows: &[TextureRow]) -> LayerResult<()>;

    /// Insert a texture row that must not exist yet ([`StoreErrorKind::Constraint`]).
    ///
    /// The cache always upserts through [`StoreBackend::put_textures`]. This entry point
    /// is for strict-insert callers, such as seeding tools that must never overwrite an
    /// existing row, and every backend has to honour the constraint.
    fn insert_texture(&mut self, row: TextureRow) -> LayerResult<()>;

    /// Every stored state key.
    fn state_hashes(&self) -> LayerResult<Vec<StateHash>>;

    /// Every stored texture key.
    fn texture_hashes(&self) -> LayerResult<Vec<TextureHash>>;

    /// Bytes used by stored rows.
    fn used_bytes(&self) -> u64;

    /// Release the store; every later call fails with [`StoreErrorKind::Closed`].
    fn close(&mut self) -> LayerResult<()>;
}

pub(crate) fn not_found(table: &str, key: impl std::fmt::Display) -> LayerError {
    LayerError::store(StoreErrorKind::NotFound, format!("{table}/{key}"))
}

pub(crate) fn closed() -> LayerError {
    LayerError::store(StoreErrorKind::Closed, "the store has been closed")
}

pub(crate) fn check_quota(quota: Option<u64>, used: u64, extra: u64) -> LayerResult<()> {
    match quota {
        Some(limit) if used.saturating_add(extra) > limit => Err(LayerError::store(
            StoreErrorKind::QuotaExceeded,
            format!("{used} + {extra} bytes exceeds quota of {limit}"),
        )),
        _ => Ok(()),
    }
}

/// In-process [`StoreBackend`].
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    states: BTreeMap<StateHash, StateRow>,
    textures: BTreeMap<TextureHash, TextureRow>,
    quota: Option<u64>,
    closed: bool,
}

impl MemoryStore {
    /// Create an empty, unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit stored bytes to `bytes`.
    pub fn with_quota(mut self, bytes: u64) -> Self {
        self.quota = Some(bytes);
        self
    }

    fn ensure_open(&self) -> LayerResult<()> {
        if self.closed { Err(closed()) } else { Ok(()) }
    }

    fn growth_for_states(&self, rows: &[StateRow]) -> u64 {
        rows.iter()
            .filter(|r| !self.states.contains_key(&r.hash))
            .count() as u64
            * StateRow::STORED_BYTES
    }

    fn growth_for_textures(&self, rows: &[TextureRow]) -> i64 {
        rows.iter()
            .map(|r| {
                let old = self.textures.get(&r.hash).map_or(0, TextureRow::stored_bytes);
                r.stored_bytes() as i64 - old as i64
            })
            .sum()
    }
}

impl StoreBackend for MemoryStore {
    fn get_state(&mut self, hash: StateHash) -> LayerResult<StateRow> {
        self.ensure_open()?;
        self.states
            .get(&hash)
            .cloned()
            .ok_or_else(|| not_found("states", hash))
    }

    fn get_texture(&mut self, hash: TextureHash) -> LayerResult<TextureRow> {
        self.ensure_open()?;
        self.textures
            .get(&hash)
            .cloned()
            .ok_or_else(|| not_found("textures", hash))
    }

    fn put_states(&mut self, rows: &[StateRow]) -> LayerResult<()> {
        self.ensure_open()?;
        check_quota(self.quota, self.used_bytes(), self.growth_for_states(rows))?;
        for row in rows {
            self.states.insert(row.hash, row.clone());
        }
        Ok(())
    }

    fn put_textures(&mut self, rows: &[TextureRow]) -> LayerResult<()> {
        self.ensure_open()?;
        let growth = self.growth_for_textures(rows).max(0) as u64;
        check_quota(self.quota, self.used_bytes(), growth)?;
        for row in rows {
            self.textures.insert(row.hash, row.clone());
        }
        Ok(())
    }

    fn insert_texture(&mut self, row: TextureRow) -> LayerResult<()> {
        self.ensure_open()?;
        if self.textures.contains_key(&row.hash) {
            return Err(LayerError::store(
                StoreErrorKind::Constraint,
                format!("textures/{} already exists", row.hash),
            ));
        }
        check_quota(self.quota, self.used_bytes(), row.stored_bytes())?;
        self.textures.insert(row.hash, row);
        Ok(())
    }

    fn state_hashes(&self) -> LayerResult<Vec<StateHash>> {
        self.ensure_open()?;
        Ok(self.states.keys().copied().collect())
    }

    fn texture_hashes(&self) -> LayerResult<Vec<TextureHash>> {
        self.ensure_open()?;
        Ok(self.textures.keys().copied().collect())
    }

    fn used_bytes(&self) -> u64 {
        self.states.len() as u64 * StateRow::STORED_BYTES
            + self.textures.values().map(TextureRow::stored_bytes).sum::<u64>()
    }

    fn close(&mut self) -> LayerResult<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/store/backend.rs"]
mod tests;
