use std::sync::Arc;

use image::RgbaImage;

use crate::foundation::core::{Bounds, Edges};
use crate::layer::surface::PseudoState;
use crate::raster::codec::CompressedTexture;
use crate::snapshot::fingerprint::TextureHash;

/// Snapshot metadata keyed by `StateHash`.
///
/// Geometry is refreshed on every serialize, even when the texture is reused.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerState {
    /// Border box relative to the parent surface.
    pub bounds: Bounds,
    /// Margin widths.
    pub margin: Edges,
    /// Border widths.
    pub border: Edges,
    /// Padding widths.
    pub padding: Edges,
    /// Border box width plus horizontal margins.
    pub full_width: f64,
    /// Border box height plus vertical margins.
    pub full_height: f64,
    /// Device pixels per CSS pixel.
    pub pixel_ratio: f64,
    /// Power-of-two texture width.
    pub texture_width: u32,
    /// Power-of-two texture height.
    pub texture_height: u32,
    /// Rasterize attempts since the texture content last changed.
    pub render_attempts: u32,
    /// Pseudo state baked into the snapshot.
    pub pseudo: PseudoState,
    /// Rendered texture, once rasterized (or loaded from the store).
    pub texture: Option<TextureHash>,
    /// Rendered through the media fast path.
    pub media: bool,
}

impl LayerState {
    /// Return `true` when there is nothing to draw.
    pub fn is_zero_area(&self) -> bool {
        !(self.full_width > 0.0 && self.full_height > 0.0)
    }
}

/// Progress of the compression of one texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressStatus {
    /// Not submitted.
    #[default]
    Idle,
    /// Submitted to the encoder pool.
    Loading,
    /// Compressed form available.
    Ready,
    /// Encoder failed; the raw canvas is the fallback.
    Failed,
}

/// Pixel data keyed by `TextureHash`.
#[derive(Clone, Debug)]
pub struct TextureState {
    /// Content address.
    pub hash: TextureHash,
    /// Raw premultiplied RGBA8 bitmap.
    pub canvas: Option<Arc<RgbaImage>>,
    /// GPU-ready compressed texture.
    pub compressed: Option<Arc<CompressedTexture>>,
    /// Compression progress.
    pub status: CompressStatus,
    /// Milliseconds since the Unix epoch when the texture was produced.
    pub timestamp: u64,
}

impl TextureState {
    pub(crate) fn new(hash: TextureHash, timestamp: u64) -> Self {
        Self {
            hash,
            canvas: None,
            compressed: None,
            status: CompressStatus::Idle,
            timestamp,
        }
    }

    /// Return `true` when either the raw or the compressed form can be displayed.
    pub fn is_usable(&self) -> bool {
        self.canvas.is_some() || self.compressed.is_some()
    }
}
