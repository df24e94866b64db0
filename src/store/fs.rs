//! Directory-backed [`StoreBackend`].
//!
//! ```text
//! <root>/schema.json        {"version": 1}
//! <root>/states/<hash>.bin  bincode StateRow
//! <root>/textures/<hash>.bin bincode TextureRow
//! ```
//!
//! Rows are written to a temporary file and renamed into place.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::foundation::error::{LayerError, LayerResult, StoreErrorKind};
use crate::snapshot::fingerprint::{StateHash, TextureHash};
use crate::store::backend::{
    SCHEMA_VERSION, StateRow, StoreBackend, TextureRow, check_quota, closed, not_found,
};

const SCHEMA_FILE: &str = "schema.json";
const STATES_DIR: &str = "states";
const TEXTURES_DIR: &str = "textures";

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct SchemaFile {
    version: u32,
}

/// Filesystem store rooted at a directory.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    quota: Option<u64>,
    used: u64,
    closed: bool,
}

impl FsStore {
    /// Open (creating if needed) the store at `root`.
    ///
    /// A store written with another schema version has its tables cleared.
    pub fn open(root: impl Into<PathBuf>) -> LayerResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("create store directory '{}'", root.display()))?;

        let schema_path = root.join(SCHEMA_FILE);
        let stored_version = match std::fs::read(&schema_path) {
            Ok(bytes) => Some(serde_json::from_slice::<SchemaFile>(&bytes).map_or(0, |s| s.version)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("read '{}'", schema_path.display()))
                    .into());
            }
        };
        if stored_version != Some(SCHEMA_VERSION) {
            if let Some(v) = stored_version {
                tracing::warn!(found = v, expected = SCHEMA_VERSION, "store schema changed, resetting tables");
                for dir in [STATES_DIR, TEXTURES_DIR] {
                    let p = root.join(dir);
                    if p.exists() {
                        std::fs::remove_dir_all(&p)
                            .with_context(|| format!("reset '{}'", p.display()))?;
                    }
                }
            }
            let json = serde_json::to_vec_pretty(&SchemaFile {
                version: SCHEMA_VERSION,
            })
            .map_err(|e| LayerError::serde(e.to_string()))?;
            write_atomic(&schema_path, &json)?;
        }
        for dir in [STATES_DIR, TEXTURES_DIR] {
            let p = root.join(dir);
            std::fs::create_dir_all(&p).with_context(|| format!("create '{}'", p.display()))?;
        }

        let used = dir_bytes(&root.join(STATES_DIR)) + dir_bytes(&root.join(TEXTURES_DIR));
        Ok(Self {
            root,
            quota: None,
            used,
            closed: false,
        })
    }

    /// Limit stored bytes to `bytes`.
    pub fn with_quota(mut self, bytes: u64) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Directory the store lives in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_open(&self) -> LayerResult<()> {
        if self.closed { Err(closed()) } else { Ok(()) }
    }

    fn row_path(&self, table: &str, key: impl std::fmt::Display) -> PathBuf {
        self.root.join(table).join(format!("{key}.bin"))
    }

    fn read_row<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        key: impl std::fmt::Display + Copy,
    ) -> LayerResult<T> {
        self.ensure_open()?;
        let path = self.row_path(table, key);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(not_found(table, key));
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("read '{}'", path.display()))
                    .into());
            }
        };
        bincode::deserialize(&bytes)
            .map_err(|e| LayerError::serde(format!("{}: {e}", path.display())))
    }

    /// Serialize `rows`, check the quota for the whole batch, then write each row.
    fn write_rows<K: std::fmt::Display + Copy, T: serde::Serialize>(
        &mut self,
        table: &str,
        rows: &[(K, &T)],
    ) -> LayerResult<()> {
        self.ensure_open()?;
        let mut encoded = Vec::with_capacity(rows.len());
        let mut growth: i64 = 0;
        for (key, row) in rows {
            let bytes = bincode::serialize(row).map_err(|e| LayerError::serde(e.to_string()))?;
            let path = self.row_path(table, *key);
            let old = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            growth += bytes.len() as i64 - old as i64;
            encoded.push((path, bytes, old));
        }
        check_quota(self.quota, self.used, growth.max(0) as u64)?;
        for (path, bytes, old) in encoded {
            write_atomic(&path, &bytes)?;
            self.used = self.used.saturating_sub(old) + bytes.len() as u64;
        }
        Ok(())
    }

    fn list(&self, table: &str) -> LayerResult<Vec<String>> {
        self.ensure_open()?;
        let dir = self.root.join(table);
        let rd = std::fs::read_dir(&dir).with_context(|| format!("list '{}'", dir.display()))?;
        let mut keys: Vec<String> = rd
            .flatten()
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                name.strip_suffix(".bin").map(str::to_string)
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}

impl StoreBackend for FsStore {
    fn get_state(&mut self, hash: StateHash) -> LayerResult<StateRow> {
        self.read_row(STATES_DIR, hash)
    }

    fn get_texture(&mut self, hash: TextureHash) -> LayerResult<TextureRow> {
        self.read_row(TEXTURES_DIR, hash)
    }

    fn put_states(&mut self, rows: &[StateRow]) -> LayerResult<()> {
        let keyed: Vec<_> = rows.iter().map(|r| (r.hash, r)).collect();
        self.write_rows(STATES_DIR, &keyed)
    }

    fn put_textures(&mut self, rows: &[TextureRow]) -> LayerResult<()> {
        let keyed: Vec<_> = rows.iter().map(|r| (r.hash, r)).collect();
        self.write_rows(TEXTURES_DIR, &keyed)
    }

    fn insert_texture(&mut self, row: TextureRow) -> LayerResult<()> {
        self.ensure_open()?;
        if self.row_path(TEXTURES_DIR, row.hash).exists() {
            return Err(LayerError::store(
                StoreErrorKind::Constraint,
                format!("textures/{} already exists", row.hash),
            ));
        }
        self.write_rows(TEXTURES_DIR, &[(row.hash, &row)])
    }

    fn state_hashes(&self) -> LayerResult<Vec<StateHash>> {
        self.list(STATES_DIR)?
            .iter()
            .map(|k| k.parse())
            .collect()
    }

    fn texture_hashes(&self) -> LayerResult<Vec<TextureHash>> {
        self.list(TEXTURES_DIR)?
            .iter()
            .map(|k| k.parse())
            .collect()
    }

    fn used_bytes(&self) -> u64 {
        self.used
    }

    fn close(&mut self) -> LayerResult<()> {
        self.closed = true;
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> LayerResult<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes).with_context(|| format!("write '{}'", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("rename into '{}'", path.display()))?;
    Ok(())
}

fn dir_bytes(dir: &Path) -> u64 {
    let Ok(rd) = std::fs::read_dir(dir) else {
        return 0;
    };
    rd.flatten()
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}

#[cfg(test)]
#[path = "../../tests/unit/store/fs.rs"]
mod tests;
