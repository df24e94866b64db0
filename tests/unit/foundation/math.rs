use super::*;

#[test]
fn next_pow2_edges() {
    assert_eq!(next_pow2(0), 1);
    assert_eq!(next_pow2(1), 1);
    assert_eq!(next_pow2(31), 32);
    assert_eq!(next_pow2(32), 32);
    assert_eq!(next_pow2(33), 64);
    assert_eq!(next_pow2(u32::MAX), 1 << 31);
}

#[test]
fn texture_extent_has_floor_and_ceiling() {
    assert_eq!(texture_extent(100.0, 1.0, 32, 4096), 128);
    assert_eq!(texture_extent(50.0, 1.0, 32, 4096), 64);
    assert_eq!(texture_extent(10.0, 1.0, 32, 4096), 32);
    assert_eq!(texture_extent(0.0, 1.0, 32, 4096), 32);
    assert_eq!(texture_extent(100.0, 2.0, 32, 4096), 256);
    assert_eq!(texture_extent(100.5, 1.0, 32, 4096), 128);
    assert_eq!(texture_extent(10_000.0, 1.0, 32, 4096), 4096);
    assert_eq!(texture_extent(f64::NAN, 1.0, 32, 4096), 32);
}

#[test]
fn unit_jitter_is_deterministic_and_bounded() {
    for seed in 0..256u64 {
        let a = unit_jitter(seed);
        assert_eq!(a, unit_jitter(seed));
        assert!((0.0..1.0).contains(&a));
    }
    assert_ne!(unit_jitter(1), unit_jitter(2));
}

#[test]
fn round_milli_normalizes_negative_zero() {
    assert_eq!(round_milli(1.23456), 1.235);
    assert_eq!(round_milli(-0.0001).to_bits(), 0.0f64.to_bits());
}

#[test]
fn unpremultiply_restores_straight_alpha() {
    let mut px = vec![50u8, 25, 100, 128, 10, 20, 30, 255, 9, 9, 9, 0];
    unpremultiply_rgba8_in_place(&mut px);
    assert_eq!(&px[0..4], &[100, 50, 199, 128]);
    assert_eq!(&px[4..8], &[10, 20, 30, 255]);
    assert_eq!(&px[8..12], &[9, 9, 9, 0]);
}
