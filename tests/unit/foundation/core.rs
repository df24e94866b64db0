use super::*;

#[test]
fn bounds_contains_is_half_open() {
    let b = Bounds::new(10.0, 20.0, 100.0, 50.0);
    assert!(b.contains(Point::new(10.0, 20.0)));
    assert!(b.contains(Point::new(109.9, 69.9)));
    assert!(!b.contains(Point::new(110.0, 30.0)));
    assert!(!b.contains(Point::new(50.0, 70.0)));
}

#[test]
fn bounds_empty_detection() {
    assert!(Bounds::new(0.0, 0.0, 0.0, 10.0).is_empty());
    assert!(Bounds::new(0.0, 0.0, 10.0, -1.0).is_empty());
    assert!(Bounds::new(0.0, 0.0, f64::NAN, 10.0).is_empty());
    assert!(!Bounds::new(0.0, 0.0, 1.0, 1.0).is_empty());
}

#[test]
fn edges_sums() {
    let e = Edges {
        top: 1.0,
        right: 2.0,
        bottom: 3.0,
        left: 4.0,
    };
    assert_eq!(e.horizontal(), 6.0);
    assert_eq!(e.vertical(), 4.0);
    assert!(Edges::default().is_zero());
    assert!(!Edges::uniform(1.0).is_zero());
}

#[test]
fn color_hex_parsing() {
    assert_eq!(Rgba8::parse_hex("#f00").unwrap(), Rgba8::rgb(255, 0, 0));
    assert_eq!(Rgba8::parse_hex("#336699").unwrap(), Rgba8::rgb(0x33, 0x66, 0x99));
    let c = Rgba8::parse_hex("#33669980").unwrap();
    assert_eq!(c.a, 0x80);
    assert!(Rgba8::parse_hex("336699").is_err());
    assert!(Rgba8::parse_hex("#zz0000").is_err());
    assert!(Rgba8::parse_hex("#1234").is_err());
}

#[test]
fn color_serde_uses_hex_strings() {
    let c = Rgba8 {
        r: 1,
        g: 2,
        b: 3,
        a: 4,
    };
    let json = serde_json::to_string(&c).unwrap();
    assert_eq!(json, "\"#01020304\"");
    let back: Rgba8 = serde_json::from_str(&json).unwrap();
    assert_eq!(back, c);
    assert_eq!(
        serde_json::to_string(&Rgba8::rgb(255, 255, 255)).unwrap(),
        "\"#ffffff\""
    );
}
