use super::*;
use crate::document::tree::BoxStyle;
use crate::foundation::core::{Bounds, Edges};
use crate::layer::tree::LAYER_ATTR;

fn card(left: f64, top: f64) -> BoxStyle {
    BoxStyle {
        border_box: Bounds::new(left, top, 100.0, 40.0),
        margin: Edges::uniform(5.0),
        background: Some(Rgba8::rgb(255, 0, 0)),
        ..BoxStyle::default()
    }
}

/// Id minted by a larger document, unknown to the small ones built here.
fn stray_node() -> NodeId {
    let mut other = Document::new();
    (0..16).map(|_| other.create_text("")).last().unwrap()
}

fn doc_with_card(left: f64, top: f64) -> (Document, NodeId) {
    let mut doc = Document::new();
    let el = doc.create_element("div", card(left, top));
    doc.set_attribute(el, LAYER_ATTR, "").unwrap();
    doc.append_child(doc.body(), el).unwrap();
    let text = doc.create_text("Hello <world>");
    doc.append_child(el, text).unwrap();
    (doc, el)
}

fn snap(doc: &Document, el: NodeId, pseudo: PseudoState) -> Snapshot {
    let tree = SurfaceTree::new();
    build_snapshot(doc, &tree, el, pseudo, (110.0, 50.0), (128, 64)).unwrap()
}

#[test]
fn markup_is_relative_to_the_margin_box() {
    let (doc, el) = doc_with_card(200.0, 300.0);
    let s = snap(&doc, el, PseudoState::default());
    assert_eq!(s.texture_width, 128);
    assert_eq!(s.texture_height, 64);
    assert!(s.markup.starts_with("<svg "));
    assert!(s.markup.contains(r#"viewBox="0 0 110 50""#));
    assert!(s.markup.contains(r##"<rect x="5" y="5" width="100" height="40" fill="#ff0000"/>"##));
    assert!(s.markup.contains("Hello &lt;world&gt;"));
}

#[test]
fn translation_does_not_change_markup() {
    let (a, ea) = doc_with_card(0.0, 0.0);
    let (b, eb) = doc_with_card(400.0, 17.5);
    assert_eq!(
        snap(&a, ea, PseudoState::default()).markup,
        snap(&b, eb, PseudoState::default()).markup
    );
}

#[test]
fn pseudo_state_becomes_root_classes() {
    let (doc, el) = doc_with_card(0.0, 0.0);
    let s = snap(
        &doc,
        el,
        PseudoState {
            hover: true,
            focus: true,
            ..PseudoState::default()
        },
    );
    assert!(s.markup.contains(r#"<g class="layer-hover layer-focus">"#));
}

#[test]
fn loaded_stylesheets_are_inlined() {
    let (mut doc, el) = doc_with_card(0.0, 0.0);
    doc.add_stylesheet("late.css");
    doc.add_stylesheet("main.css");
    doc.finish_stylesheet("main.css", ".layer-hover rect { fill: blue; }")
        .unwrap();
    let s = snap(&doc, el, PseudoState::default());
    assert!(s.markup.contains("<style><![CDATA[.layer-hover rect { fill: blue; }"));
}

#[test]
fn nested_boundaries_become_hidden_placeholders() {
    let (mut doc, el) = doc_with_card(0.0, 0.0);
    let nested = doc.create_element(
        "div",
        BoxStyle {
            border_box: Bounds::new(10.0, 10.0, 20.0, 20.0),
            background: Some(Rgba8::rgb(0, 255, 0)),
            ..BoxStyle::default()
        },
    );
    doc.set_attribute(nested, LAYER_ATTR, "").unwrap();
    doc.append_child(el, nested).unwrap();

    let s = snap(&doc, el, PseudoState::default());
    assert!(s.markup.contains("data-layer-placeholder"));
    assert!(!s.markup.contains("#00ff00"));
}

#[test]
fn unknown_or_text_nodes_have_no_snapshot() {
    let (mut doc, _) = doc_with_card(0.0, 0.0);
    let text = doc.create_text("x");
    let tree = SurfaceTree::new();
    assert!(build_snapshot(&doc, &tree, text, PseudoState::default(), (1.0, 1.0), (32, 32)).is_none());
    assert!(build_snapshot(&doc, &tree, stray_node(), PseudoState::default(), (1.0, 1.0), (32, 32)).is_none());
}
