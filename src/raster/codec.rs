//! BC3 (DXT5) block compression and the `LTX1` texture container.
//!
//! Container layout, little endian:
//!
//! | bytes | field                     |
//! |-------|---------------------------|
//! | 0..4  | magic `LTX1`              |
//! | 4     | format tag                |
//! | 5..8  | reserved, zero            |
//! | 8..12 | width                     |
//! | 12..16| height                    |
//! | 16..  | block data                |

use image::RgbaImage;
use rayon::prelude::*;

use crate::foundation::error::{LayerError, LayerResult};

const MAGIC: &[u8; 4] = b"LTX1";
const HEADER_LEN: usize = 16;
const BLOCK_BYTES: usize = 16;

/// Block format of a [`CompressedTexture`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// BC3 / DXT5: interpolated alpha plus 4-color RGB, 16 bytes per 4×4 block.
    Bc3Rgba,
}

impl TextureFormat {
    fn tag(self) -> u8 {
        match self {
            Self::Bc3Rgba => 3,
        }
    }

    fn from_tag(tag: u8) -> LayerResult<Self> {
        match tag {
            3 => Ok(Self::Bc3Rgba),
            other => Err(LayerError::decode(format!("unknown texture format tag {other}"))),
        }
    }
}

/// Loadable GPU texture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressedTexture {
    /// Block format.
    pub format: TextureFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Block data, row-major by block.
    pub data: Vec<u8>,
}

impl CompressedTexture {
    /// Serialize into the `LTX1` container.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len());
        out.extend_from_slice(MAGIC);
        out.push(self.format.tag());
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Parse an `LTX1` container.
    pub fn from_bytes(bytes: &[u8]) -> LayerResult<Self> {
        if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
            return Err(LayerError::decode("not an LTX1 texture container"));
        }
        let format = TextureFormat::from_tag(bytes[4])?;
        let width = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let height = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let data = bytes[HEADER_LEN..].to_vec();
        let expected = bc3_len(width, height);
        if data.len() != expected {
            return Err(LayerError::decode(format!(
                "texture {width}x{height} needs {expected} block bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            data,
        })
    }

    /// Size of the block data in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

fn blocks(extent: u32) -> usize {
    extent.div_ceil(4) as usize
}

fn bc3_len(width: u32, height: u32) -> usize {
    blocks(width) * blocks(height) * BLOCK_BYTES
}

/// Compress an RGBA8 image into BC3 blocks. Block rows are encoded in parallel.
pub fn encode_bc3(image: &RgbaImage) -> LayerResult<CompressedTexture> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(LayerError::encode("cannot compress an empty image"));
    }
    let bx = blocks(width);
    let mut data = vec![0u8; bc3_len(width, height)];
    data.par_chunks_mut(bx * BLOCK_BYTES)
        .enumerate()
        .for_each(|(by, row)| {
            for (x, out) in row.chunks_exact_mut(BLOCK_BYTES).enumerate() {
                let texels = gather_block(image, x as u32 * 4, by as u32 * 4);
                encode_block(&texels, out);
            }
        });
    Ok(CompressedTexture {
        format: TextureFormat::Bc3Rgba,
        width,
        height,
        data,
    })
}

/// Expand BC3 blocks back into RGBA8.
pub fn decode_bc3(tex: &CompressedTexture) -> LayerResult<RgbaImage> {
    if tex.data.len() != bc3_len(tex.width, tex.height) {
        return Err(LayerError::decode("truncated block data"));
    }
    let bx = blocks(tex.width);
    let mut img = RgbaImage::new(tex.width, tex.height);
    for (i, block) in tex.data.chunks_exact(BLOCK_BYTES).enumerate() {
        let ox = (i % bx) as u32 * 4;
        let oy = (i / bx) as u32 * 4;
        let texels = decode_block(block);
        for (j, px) in texels.iter().enumerate() {
            let x = ox + (j % 4) as u32;
            let y = oy + (j / 4) as u32;
            if x < tex.width && y < tex.height {
                img.put_pixel(x, y, image::Rgba(*px));
            }
        }
    }
    Ok(img)
}

/// Edge blocks repeat the last row/column.
fn gather_block(image: &RgbaImage, ox: u32, oy: u32) -> [[u8; 4]; 16] {
    let (w, h) = image.dimensions();
    let mut out = [[0u8; 4]; 16];
    for (j, px) in out.iter_mut().enumerate() {
        let x = (ox + (j % 4) as u32).min(w - 1);
        let y = (oy + (j / 4) as u32).min(h - 1);
        *px = image.get_pixel(x, y).0;
    }
    out
}

fn encode_block(texels: &[[u8; 4]; 16], out: &mut [u8]) {
    encode_alpha(texels, &mut out[0..8]);
    encode_color(texels, &mut out[8..16]);
}

fn alpha_palette(a0: u8, a1: u8) -> [u8; 8] {
    let mut p = [a0, a1, 0, 0, 0, 0, 0, 0];
    if a0 > a1 {
        for (i, v) in p.iter_mut().enumerate().skip(2) {
            let i = i as u32;
            *v = (((8 - i) * u32::from(a0) + (i - 1) * u32::from(a1) + 3) / 7) as u8;
        }
    } else {
        for (i, v) in p.iter_mut().enumerate().take(6).skip(2) {
            let i = i as u32;
            *v = (((6 - i) * u32::from(a0) + (i - 1) * u32::from(a1) + 2) / 5) as u8;
        }
        p[6] = 0;
        p[7] = 255;
    }
    p
}

fn encode_alpha(texels: &[[u8; 4]; 16], out: &mut [u8]) {
    let max = texels.iter().map(|t| t[3]).max().unwrap_or(0);
    let min = texels.iter().map(|t| t[3]).min().unwrap_or(0);
    out[0] = max;
    out[1] = min;
    let palette = alpha_palette(max, min);
    let mut bits: u64 = 0;
    for (j, t) in texels.iter().enumerate() {
        let idx = nearest(palette.iter().map(|p| (i32::from(*p) - i32::from(t[3])).pow(2)));
        bits |= (idx as u64) << (3 * j);
    }
    out[2..8].copy_from_slice(&bits.to_le_bytes()[..6]);
}

fn to_565(c: [u8; 4]) -> u16 {
    let r = (u16::from(c[0]) * 31 + 127) / 255;
    let g = (u16::from(c[1]) * 63 + 127) / 255;
    let b = (u16::from(c[2]) * 31 + 127) / 255;
    (r << 11) | (g << 5) | b
}

fn from_565(v: u16) -> [u8; 3] {
    let r = ((v >> 11) & 0x1f) as u8;
    let g = ((v >> 5) & 0x3f) as u8;
    let b = (v & 0x1f) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

fn color_palette(c0: u16, c1: u16) -> [[u8; 3]; 4] {
    let a = from_565(c0);
    let b = from_565(c1);
    let mix = |wa: u16, wb: u16| -> [u8; 3] {
        let mut m = [0u8; 3];
        for k in 0..3 {
            m[k] = ((wa * u16::from(a[k]) + wb * u16::from(b[k]) + 1) / 3) as u8;
        }
        m
    };
    [a, b, mix(2, 1), mix(1, 2)]
}

fn encode_color(texels: &[[u8; 4]; 16], out: &mut [u8]) {
    let mut lo = [255u8; 4];
    let mut hi = [0u8; 4];
    for t in texels {
        for k in 0..3 {
            lo[k] = lo[k].min(t[k]);
            hi[k] = hi[k].max(t[k]);
        }
    }
    let c0 = to_565(hi);
    let c1 = to_565(lo);
    out[0..2].copy_from_slice(&c0.to_le_bytes());
    out[2..4].copy_from_slice(&c1.to_le_bytes());
    let palette = color_palette(c0, c1);
    let mut bits: u32 = 0;
    for (j, t) in texels.iter().enumerate() {
        let idx = nearest(palette.iter().map(|p| {
            (0..3)
                .map(|k| (i32::from(p[k]) - i32::from(t[k])).pow(2))
                .sum::<i32>()
        }));
        bits |= (idx as u32) << (2 * j);
    }
    out[4..8].copy_from_slice(&bits.to_le_bytes());
}

fn nearest(dists: impl Iterator<Item = i32>) -> usize {
    dists
        .enumerate()
        .min_by_key(|(_, d)| *d)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn decode_block(block: &[u8]) -> [[u8; 4]; 16] {
    let alphas = alpha_palette(block[0], block[1]);
    let mut abits = [0u8; 8];
    abits[..6].copy_from_slice(&block[2..8]);
    let abits = u64::from_le_bytes(abits);

    let c0 = u16::from_le_bytes([block[8], block[9]]);
    let c1 = u16::from_le_bytes([block[10], block[11]]);
    let colors = color_palette(c0, c1);
    let cbits = u32::from_le_bytes([block[12], block[13], block[14], block[15]]);

    let mut out = [[0u8; 4]; 16];
    for (j, px) in out.iter_mut().enumerate() {
        let c = colors[((cbits >> (2 * j)) & 0b11) as usize];
        let a = alphas[((abits >> (3 * j)) & 0b111) as usize];
        *px = [c[0], c[1], c[2], a];
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/raster/codec.rs"]
mod tests;
