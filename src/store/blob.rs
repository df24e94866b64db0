//! Packed forms of texture rows and export documents.

use crate::foundation::error::{LayerError, LayerResult};
use crate::raster::codec::CompressedTexture;
use crate::store::backend::{SCHEMA_VERSION, StateRow, TextureRow};

const ZSTD_LEVEL: i32 = 3;

/// Portable dump of both tables.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExportDocument {
    /// Row layout version.
    pub version: u32,
    /// Exported state rows.
    pub states: Vec<StateRow>,
    /// Texture rows referenced by `states`.
    pub textures: Vec<TextureRow>,
}

impl ExportDocument {
    /// Empty document at the current schema version.
    pub fn new() -> Self {
        Self {
            version: SCHEMA_VERSION,
            ..Self::default()
        }
    }
}

fn zstd_pack(bytes: &[u8]) -> LayerResult<Vec<u8>> {
    zstd::encode_all(bytes, ZSTD_LEVEL).map_err(|e| LayerError::serde(format!("zstd encode: {e}")))
}

fn zstd_unpack(bytes: &[u8]) -> LayerResult<Vec<u8>> {
    zstd::decode_all(bytes).map_err(|e| LayerError::serde(format!("zstd decode: {e}")))
}

/// Container bytes as stored in [`TextureRow::compressed`].
pub fn pack_texture(tex: &CompressedTexture) -> LayerResult<Vec<u8>> {
    zstd_pack(&tex.to_bytes())
}

/// Inverse of [`pack_texture`].
pub fn unpack_texture(bytes: &[u8]) -> LayerResult<CompressedTexture> {
    CompressedTexture::from_bytes(&zstd_unpack(bytes)?)
}

/// `zstd(bincode(doc))`.
pub fn pack_export(doc: &ExportDocument) -> LayerResult<Vec<u8>> {
    let raw = bincode::serialize(doc).map_err(|e| LayerError::serde(format!("bincode: {e}")))?;
    zstd_pack(&raw)
}

/// Inverse of [`pack_export`]; rejects documents from another schema version.
pub fn unpack_export(blob: &[u8]) -> LayerResult<ExportDocument> {
    let raw = zstd_unpack(blob)?;
    let doc: ExportDocument =
        bincode::deserialize(&raw).map_err(|e| LayerError::serde(format!("bincode: {e}")))?;
    if doc.version != SCHEMA_VERSION {
        return Err(LayerError::validation(format!(
            "export version {} is not supported (expected {SCHEMA_VERSION})",
            doc.version
        )));
    }
    Ok(doc)
}
