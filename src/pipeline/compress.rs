use std::sync::Arc;
use std::time::Instant;

use crate::foundation::error::{LayerError, LayerResult};
use crate::layer::state::CompressStatus;
use crate::pipeline::opts::PipelineOpts;
use crate::raster::codec::CompressedTexture;
use crate::raster::worker::{CompressPool, EncodeRequest, EncodeResponse};
use crate::snapshot::fingerprint::TextureHash;
use crate::store::cache::TextureCache;

/// Hand the raw canvas of `hash` to the encoder pool.
///
/// Returns `false` when a compression is already running or done for this texture.
pub(crate) fn compress_texture(
    cache: &mut TextureCache,
    pool: &mut CompressPool,
    hash: TextureHash,
) -> LayerResult<bool> {
    let tex = cache
        .texture_mut(hash)
        .ok_or_else(|| LayerError::validation(format!("no texture {hash}")))?;
    if matches!(tex.status, CompressStatus::Loading | CompressStatus::Ready) {
        return Ok(false);
    }
    let pixels = tex
        .canvas
        .clone()
        .ok_or_else(|| LayerError::validation(format!("texture {hash} has no raw canvas")))?;
    tex.status = CompressStatus::Loading;
    pool.submit(EncodeRequest { hash, pixels });
    Ok(true)
}

/// Apply an encoder response: publish the compressed texture and stage its row.
///
/// On failure the texture is marked `Failed` and keeps its raw canvas.
pub(crate) fn finish_compress(
    cache: &mut TextureCache,
    opts: &PipelineOpts,
    resp: EncodeResponse,
    now: Instant,
) -> LayerResult<()> {
    let parsed = resp
        .result
        .and_then(|bytes| CompressedTexture::from_bytes(&bytes));
    let Some(tex) = cache.texture_mut(resp.hash) else {
        return Ok(());
    };
    let compressed = match parsed {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tex.status = CompressStatus::Failed;
            return Err(e);
        }
    };
    tex.compressed = Some(Arc::clone(&compressed));
    tex.status = CompressStatus::Ready;
    if !opts.retain_raw_after_compress {
        tex.canvas = None;
    }
    let timestamp = tex.timestamp;
    cache.stage_texture(resp.hash, &compressed, timestamp, now)
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/compress.rs"]
mod tests;
