use std::fmt;
use std::str::FromStr;

use xxhash_rust::xxh3::Xxh3;

use crate::document::tree::NodeId;
use crate::foundation::error::LayerError;
use crate::layer::surface::PseudoState;

const XXH3_SEED: u64 = 0x3c6e_f372_fe94_f82b;

const TAG_MARKUP: u8 = 1;
const TAG_MEDIA: u8 = 2;
const TAG_EMPTY: u8 = 3;
const TAG_TEXTURE: u8 = 4;

macro_rules! content_hash {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u128);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:032x}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:032x})", stringify!($name), self.0)
            }
        }

        impl FromStr for $name {
            type Err = LayerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.len() != 32 {
                    return Err(LayerError::validation(format!(
                        "content hash must be 32 hex digits: '{s}'"
                    )));
                }
                u128::from_str_radix(s, 16)
                    .map(Self)
                    .map_err(|e| LayerError::validation(format!("invalid content hash '{s}': {e}")))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

content_hash!(
    /// Content address of a visual snapshot (markup + pseudo state + size).
    StateHash
);
content_hash!(
    /// Content address of a rendered bitmap, taken from a low-resolution proxy render.
    TextureHash
);

struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    fn new(tag: u8) -> Self {
        let mut h = Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        };
        h.write_u8(tag);
        h
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        // Fold -0.0 into 0.0 so equal sizes hash equally.
        let v = if v == 0.0 { 0.0 } else { v };
        self.write_u64(v.to_bits());
    }

    fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write_bytes(s.as_bytes());
    }

    fn write_dims(&mut self, full: (f64, f64), texture: (u32, u32)) {
        self.write_f64(full.0);
        self.write_f64(full.1);
        self.write_u32(texture.0);
        self.write_u32(texture.1);
    }

    fn finish(self) -> u128 {
        self.inner.digest128()
    }
}

/// Hash of a markup snapshot together with its pseudo state and dimensions.
pub(crate) fn state_hash(
    markup: &str,
    pseudo: PseudoState,
    full: (f64, f64),
    texture: (u32, u32),
) -> StateHash {
    let mut h = StableHasher::new(TAG_MARKUP);
    h.write_str(markup);
    h.write_u8(pseudo.bits());
    h.write_dims(full, texture);
    StateHash(h.finish())
}

/// Media elements are keyed by identity: their pixels come from a live source.
pub(crate) fn media_state_hash(
    element: NodeId,
    pseudo: PseudoState,
    full: (f64, f64),
    texture: (u32, u32),
) -> StateHash {
    let mut h = StableHasher::new(TAG_MEDIA);
    h.write_u64(element.index() as u64);
    h.write_u8(pseudo.bits());
    h.write_dims(full, texture);
    StateHash(h.finish())
}

/// Key shared by every zero-area state of the same (degenerate) size.
pub(crate) fn empty_state_hash(full: (f64, f64)) -> StateHash {
    let mut h = StableHasher::new(TAG_EMPTY);
    h.write_f64(full.0);
    h.write_f64(full.1);
    StateHash(h.finish())
}

/// Hash of the proxy raster's pixels.
pub(crate) fn texture_hash(proxy_rgba: &[u8], width: u32, height: u32) -> TextureHash {
    let mut h = StableHasher::new(TAG_TEXTURE);
    h.write_u32(width);
    h.write_u32(height);
    h.write_bytes(proxy_rgba);
    TextureHash(h.finish())
}

#[cfg(test)]
#[path = "../../tests/unit/snapshot/fingerprint.rs"]
mod tests;
