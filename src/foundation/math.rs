use xxhash_rust::xxh3::xxh3_64_with_seed;

const JITTER_SEED: u64 = 0x5f1c_2a9e_0d73_b641;

/// Smallest power of two `>= v` (and `>= 1`).
pub(crate) fn next_pow2(v: u32) -> u32 {
    v.max(1).checked_next_power_of_two().unwrap_or(1 << 31)
}

/// Texture extent for a CSS length: `max(nextPow2(ceil(css * ratio)), min)`, clamped to `max`.
///
/// `min` and `max` are expected to be powers of two.
pub(crate) fn texture_extent(css_px: f64, pixel_ratio: f64, min: u32, max: u32) -> u32 {
    let device = (css_px * pixel_ratio).ceil();
    let device = if device.is_finite() && device > 0.0 {
        device.min(f64::from(u32::MAX)) as u32
    } else {
        0
    };
    next_pow2(device).max(min).min(max)
}

/// Deterministic pseudo-random fraction in `[0, 1)` derived from `seed`.
pub(crate) fn unit_jitter(seed: u64) -> f64 {
    let h = xxh3_64_with_seed(&seed.to_le_bytes(), JITTER_SEED);
    // 53 high bits map exactly onto the f64 mantissa.
    (h >> 11) as f64 / (1u64 << 53) as f64
}

/// Round to 1/1000 px so markup text is stable under float noise.
pub(crate) fn round_milli(v: f64) -> f64 {
    let r = (v * 1000.0).round() / 1000.0;
    if r == 0.0 { 0.0 } else { r }
}

/// Convert premultiplied RGBA8 to straight alpha in place.
pub fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u32::from(px[3]);
        if a == 0 || a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((u32::from(*c) * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
