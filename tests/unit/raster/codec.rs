use super::*;

fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(w, h, image::Rgba(px))
}

#[test]
fn solid_colors_survive_exactly() {
    for px in [[255, 0, 0, 255], [0, 0, 255, 128], [0, 0, 0, 0], [255, 255, 255, 255]] {
        let img = solid(8, 8, px);
        let tex = encode_bc3(&img).unwrap();
        assert_eq!(tex.byte_len(), 4 * BLOCK_BYTES);
        let back = decode_bc3(&tex).unwrap();
        assert!(back.pixels().all(|p| p.0 == px), "{px:?}");
    }
}

#[test]
fn two_tone_block_keeps_both_endpoints() {
    let mut img = solid(4, 4, [0, 0, 0, 255]);
    for y in 0..4 {
        for x in 0..2 {
            img.put_pixel(x, y, image::Rgba([255, 255, 255, 0]));
        }
    }
    let back = decode_bc3(&encode_bc3(&img).unwrap()).unwrap();
    assert_eq!(back.get_pixel(0, 0).0, [255, 255, 255, 0]);
    assert_eq!(back.get_pixel(3, 3).0, [0, 0, 0, 255]);
}

#[test]
fn odd_sizes_round_up_to_whole_blocks() {
    let img = solid(5, 3, [10, 20, 30, 255]);
    let tex = encode_bc3(&img).unwrap();
    assert_eq!(tex.byte_len(), 2 * BLOCK_BYTES);
    let back = decode_bc3(&tex).unwrap();
    assert_eq!(back.dimensions(), (5, 3));
}

#[test]
fn container_parses_back() {
    let tex = encode_bc3(&solid(32, 32, [1, 2, 3, 4])).unwrap();
    let bytes = tex.to_bytes();
    assert_eq!(&bytes[0..4], b"LTX1");
    assert_eq!(bytes.len(), HEADER_LEN + tex.byte_len());
    assert_eq!(CompressedTexture::from_bytes(&bytes).unwrap(), tex);
}

#[test]
fn container_rejects_garbage() {
    assert!(CompressedTexture::from_bytes(b"nope").is_err());

    let tex = encode_bc3(&solid(8, 8, [0, 0, 0, 255])).unwrap();
    let mut bytes = tex.to_bytes();
    bytes.pop();
    assert!(matches!(
        CompressedTexture::from_bytes(&bytes),
        Err(LayerError::Decode(_))
    ));

    let mut bytes = tex.to_bytes();
    bytes[4] = 99;
    assert!(CompressedTexture::from_bytes(&bytes).is_err());
}

#[test]
fn empty_images_are_rejected() {
    assert!(matches!(
        encode_bc3(&RgbaImage::new(0, 4)),
        Err(LayerError::Encode(_))
    ));
}
