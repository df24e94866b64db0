//! Box metrics of document elements in the coordinate space of an ancestor.

use crate::document::tree::{BoxStyle, Document, NodeId};
use crate::foundation::core::{Affine, Bounds, Edges, Point};

/// Border box of `el`, relative to the border box of `reference`.
///
/// A missing or unknown `reference` yields document-relative bounds. Returns `None` only
/// when `el` itself is unknown.
pub fn get_bounds(doc: &Document, el: NodeId, reference: Option<NodeId>) -> Option<Bounds> {
    let b = doc.style(el)?.border_box;
    match reference.and_then(|r| doc.style(r)) {
        Some(rs) => Some(b.translate(-rs.border_box.left, -rs.border_box.top)),
        None => Some(b),
    }
}

/// Margin widths of `el` (zero for unknown ids).
pub fn get_margin(doc: &Document, el: NodeId) -> Edges {
    doc.style(el).map(|s| s.margin).unwrap_or_default()
}

/// Border widths of `el` (zero for unknown ids).
pub fn get_border(doc: &Document, el: NodeId) -> Edges {
    doc.style(el).map(|s| s.border).unwrap_or_default()
}

/// Padding widths of `el` (zero for unknown ids).
pub fn get_padding(doc: &Document, el: NodeId) -> Edges {
    doc.style(el).map(|s| s.padding).unwrap_or_default()
}

/// Border box grown by the margin, as `(width, height)`.
pub fn full_size(bounds: Bounds, margin: Edges) -> (f64, f64) {
    (
        (bounds.width + margin.horizontal()).max(0.0),
        (bounds.height + margin.vertical()).max(0.0),
    )
}

/// Top-left of the content box, in document coordinates.
pub fn content_origin(style: &BoxStyle) -> Point {
    Point::new(
        style.border_box.left + style.border.left + style.padding.left,
        style.border_box.top + style.border.top + style.padding.top,
    )
}

/// Return `true` when a transform is present and differs from identity.
pub fn has_nontrivial_transform(style: &BoxStyle) -> bool {
    style.transform.is_some_and(|t| t != Affine::IDENTITY)
}

#[cfg(test)]
#[path = "../../tests/unit/document/geometry.rs"]
mod tests;
