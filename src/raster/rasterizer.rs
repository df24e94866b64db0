use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;

use crate::foundation::error::{LayerError, LayerResult};
use crate::snapshot::markup::Snapshot;

/// Result of drawing one snapshot.
#[derive(Clone, Debug)]
pub struct RasterOutput {
    /// Full-size premultiplied RGBA8 bitmap.
    pub image: RgbaImage,
    /// Premultiplied RGBA8 pixels of the `proxy_size × proxy_size` render.
    pub proxy: Vec<u8>,
    /// Edge length of the proxy render.
    pub proxy_size: u32,
}

/// Draws snapshots into bitmaps.
///
/// Implementations must be deterministic: the same snapshot yields the same pixels.
pub trait Rasterizer: Send {
    /// Decode `snapshot` and draw it at texture size and at proxy size.
    fn rasterize(&mut self, snapshot: &Snapshot, proxy_size: u32) -> LayerResult<RasterOutput>;
}

/// [`Rasterizer`] backed by `usvg` parsing and `resvg` drawing.
pub struct SvgRasterizer {
    opts: usvg::Options<'static>,
}

impl std::fmt::Debug for SvgRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvgRasterizer")
            .field("font_faces", &self.opts.fontdb.len())
            .finish()
    }
}

impl Default for SvgRasterizer {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl SvgRasterizer {
    /// Create a rasterizer using system fonts plus any fonts found in `font_dirs`.
    pub fn new(font_dirs: &[PathBuf]) -> Self {
        let opts = usvg::Options {
            fontdb: build_fontdb(font_dirs),
            ..Default::default()
        };
        Self { opts }
    }

    /// Number of font faces available to text in snapshots.
    pub fn font_face_count(&self) -> usize {
        self.opts.fontdb.len()
    }

    fn parse(&self, snapshot: &Snapshot) -> LayerResult<usvg::Tree> {
        usvg::Tree::from_str(&snapshot.markup, &self.opts)
            .map_err(|e| LayerError::decode(format!("parse snapshot: {e}")))
    }
}

impl Rasterizer for SvgRasterizer {
    #[tracing::instrument(level = "debug", skip_all, fields(w = snapshot.texture_width, h = snapshot.texture_height))]
    fn rasterize(&mut self, snapshot: &Snapshot, proxy_size: u32) -> LayerResult<RasterOutput> {
        let tree = self.parse(snapshot)?;
        let proxy = draw(&tree, proxy_size, proxy_size)?;
        let full = draw(&tree, snapshot.texture_width, snapshot.texture_height)?;
        let image = RgbaImage::from_raw(snapshot.texture_width, snapshot.texture_height, full)
            .ok_or_else(|| LayerError::decode("raster buffer has unexpected length"))?;
        Ok(RasterOutput {
            image,
            proxy,
            proxy_size,
        })
    }
}

fn draw(tree: &usvg::Tree, width: u32, height: u32) -> LayerResult<Vec<u8>> {
    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| LayerError::decode(format!("cannot allocate {width}x{height} pixmap")))?;
    let size = tree.size();
    let xform = resvg::tiny_skia::Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(tree, xform, &mut pixmap.as_mut());
    Ok(pixmap.take())
}

fn build_fontdb(font_dirs: &[PathBuf]) -> Arc<usvg::fontdb::Database> {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    for dir in font_dirs {
        load_font_dir(&mut db, dir);
    }
    tracing::debug!(faces = db.len(), "font database ready");
    Arc::new(db)
}

fn load_font_dir(db: &mut usvg::fontdb::Database, dir: &Path) {
    let rd = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "font directory not readable");
            return;
        }
    };
    for path in rd.flatten().map(|e| e.path()) {
        let is_font = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf" | "ttc"));
        if is_font && path.is_file() {
            if let Err(e) = db.load_font_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "font not loaded");
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/raster/rasterizer.rs"]
mod tests;
