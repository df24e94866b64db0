use super::*;

fn snapshot(markup: &str, w: u32, h: u32) -> Snapshot {
    Snapshot {
        markup: Arc::from(markup),
        texture_width: w,
        texture_height: h,
    }
}

const RED_SQUARE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="64" height="32" viewBox="0 0 20 10" preserveAspectRatio="none"><rect x="0" y="0" width="10" height="10" fill="#ff0000"/></svg>"##;

#[test]
fn draws_at_texture_and_proxy_size() {
    let mut r = SvgRasterizer::new(&[]);
    let out = r.rasterize(&snapshot(RED_SQUARE, 64, 32), 30).unwrap();

    assert_eq!(out.image.dimensions(), (64, 32));
    assert_eq!(out.proxy.len(), 30 * 30 * 4);
    assert_eq!(out.proxy_size, 30);

    // Left half is covered, right half is transparent.
    assert_eq!(out.image.get_pixel(8, 16).0, [255, 0, 0, 255]);
    assert_eq!(out.image.get_pixel(56, 16).0, [0, 0, 0, 0]);
}

#[test]
fn rasterization_is_deterministic() {
    let mut r = SvgRasterizer::default();
    let a = r.rasterize(&snapshot(RED_SQUARE, 64, 32), 30).unwrap();
    let b = r.rasterize(&snapshot(RED_SQUARE, 64, 32), 30).unwrap();
    assert_eq!(a.proxy, b.proxy);
    assert_eq!(a.image.as_raw(), b.image.as_raw());
}

#[test]
fn malformed_markup_is_a_decode_error() {
    let mut r = SvgRasterizer::default();
    let err = r.rasterize(&snapshot("<svg", 32, 32), 30).unwrap_err();
    assert!(matches!(err, LayerError::Decode(_)));
}

#[test]
fn unreadable_font_files_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.ttf"), b"not a font").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
    let missing = dir.path().join("missing");

    let baseline = build_fontdb(&[]).len();
    let db = build_fontdb(&[dir.path().to_path_buf(), missing]);
    assert_eq!(db.len(), baseline);
}
