use super::*;
use crate::document::tree::{BoxStyle, Document};

#[test]
fn state_hash_is_stable_for_same_input() {
    let p = PseudoState::default();
    let a = state_hash("<svg/>", p, (100.0, 50.0), (128, 64));
    let b = state_hash("<svg/>", p, (100.0, 50.0), (128, 64));
    assert_eq!(a, b);
}

#[test]
fn state_hash_covers_markup_pseudo_and_dims() {
    let p = PseudoState::default();
    let base = state_hash("<svg/>", p, (100.0, 50.0), (128, 64));
    assert_ne!(base, state_hash("<svg />", p, (100.0, 50.0), (128, 64)));
    assert_ne!(base, state_hash("<svg/>", p, (100.0, 51.0), (128, 64)));
    assert_ne!(base, state_hash("<svg/>", p, (100.0, 50.0), (128, 128)));
    let hover = PseudoState {
        hover: true,
        ..PseudoState::default()
    };
    assert_ne!(base, state_hash("<svg/>", hover, (100.0, 50.0), (128, 64)));
}

#[test]
fn negative_zero_sizes_collapse() {
    assert_eq!(empty_state_hash((0.0, 10.0)), empty_state_hash((-0.0, 10.0)));
}

#[test]
fn hash_domains_do_not_collide() {
    let mut doc = Document::new();
    let video = doc.create_element("video", BoxStyle::default());
    let canvas = doc.create_element("canvas", BoxStyle::default());
    let p = PseudoState::default();
    let media = media_state_hash(video, p, (10.0, 10.0), (32, 32));
    let other = media_state_hash(canvas, p, (10.0, 10.0), (32, 32));
    assert_ne!(media, other);
    assert_ne!(media, empty_state_hash((10.0, 10.0)));
}

#[test]
fn texture_hash_depends_on_pixels() {
    let a = texture_hash(&[0, 0, 0, 255], 1, 1);
    let b = texture_hash(&[0, 0, 1, 255], 1, 1);
    assert_ne!(a, b);
    assert_eq!(a, texture_hash(&[0, 0, 0, 255], 1, 1));
}

#[test]
fn hex_display_parse_and_serde() {
    let h = StateHash(0x0123_4567_89ab_cdef_0011_2233_4455_6677);
    let s = h.to_string();
    assert_eq!(s, "0123456789abcdef0011223344556677");
    assert_eq!(s.parse::<StateHash>().unwrap(), h);
    assert!("xyz".parse::<StateHash>().is_err());

    let json = serde_json::to_string(&h).unwrap();
    assert_eq!(json, format!("\"{s}\""));
    let back: StateHash = serde_json::from_str(&json).unwrap();
    assert_eq!(back, h);

    let t = TextureHash(7);
    let bytes = bincode::serialize(&t).unwrap();
    assert_eq!(bincode::deserialize::<TextureHash>(&bytes).unwrap(), t);
}
