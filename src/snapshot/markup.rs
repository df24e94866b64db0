//! SVG markup snapshots of a surface's subtree.
//!
//! Coordinates are emitted relative to the surface's margin box, so moving an element
//! without changing its content keeps the markup (and thus its state hash) stable.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::document::geometry::content_origin;
use crate::document::tree::{BoxStyle, Document, NodeId, NodeKind};
use crate::foundation::core::{Bounds, Rgba8};
use crate::foundation::math::round_milli;
use crate::layer::surface::PseudoState;
use crate::layer::tree::{SurfaceTree, is_boundary};

const SVG_NS: &str = "http://www.w3.org/2000/svg";
const DEFAULT_TEXT_COLOR: Rgba8 = Rgba8::rgb(0, 0, 0);

/// Self-contained visual description of one surface, ready to rasterize.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// Standalone SVG document.
    pub markup: Arc<str>,
    /// Target bitmap width in device pixels.
    pub texture_width: u32,
    /// Target bitmap height in device pixels.
    pub texture_height: u32,
}

/// Serialize `el` and its subtree, stopping at nested boundaries.
///
/// Returns `None` when `el` is not an element of `doc`.
pub(crate) fn build_snapshot(
    doc: &Document,
    surfaces: &SurfaceTree,
    el: NodeId,
    pseudo: PseudoState,
    full: (f64, f64),
    texture: (u32, u32),
) -> Option<Snapshot> {
    let node = doc.node(el)?;
    node.tag()?;
    let style = node.style();
    let mut w = MarkupWriter {
        doc,
        surfaces,
        root: el,
        out: String::with_capacity(512),
        ox: style.border_box.left - style.margin.left,
        oy: style.border_box.top - style.margin.top,
    };

    let _ = write!(
        w.out,
        r#"<svg xmlns="{SVG_NS}" width="{}" height="{}" viewBox="0 0 {} {}" preserveAspectRatio="none">"#,
        texture.0,
        texture.1,
        num(full.0),
        num(full.1),
    );
    w.write_stylesheets();

    let mut classes: Vec<&str> = pseudo.class_names().collect();
    if let Some(class) = node.attr("class") {
        classes.extend(class.split_whitespace());
    }
    w.write_element(el, &classes, DEFAULT_TEXT_COLOR);
    w.out.push_str("</svg>");

    Some(Snapshot {
        markup: Arc::from(w.out),
        texture_width: texture.0,
        texture_height: texture.1,
    })
}

struct MarkupWriter<'a> {
    doc: &'a Document,
    surfaces: &'a SurfaceTree,
    /// Surface root; nested `last_bounds` are relative to its border box.
    root: NodeId,
    out: String,
    ox: f64,
    oy: f64,
}

impl MarkupWriter<'_> {
    fn write_stylesheets(&mut self) {
        let css: Vec<&str> = self
            .doc
            .loaded_stylesheets()
            .map(|s| s.text.as_str())
            .filter(|t| !t.trim().is_empty())
            .collect();
        if css.is_empty() {
            return;
        }
        self.out.push_str("<style><![CDATA[");
        for text in css {
            self.out.push_str(&text.replace("]]>", "]]]]><![CDATA[>"));
            self.out.push('\n');
        }
        self.out.push_str("]]></style>");
    }

    fn write_element(&mut self, el: NodeId, classes: &[&str], inherited_color: Rgba8) {
        let doc = self.doc;
        let Some(node) = doc.node(el) else {
            return;
        };
        let style = node.style();
        self.out.push_str("<g");
        if !classes.is_empty() {
            let _ = write!(self.out, r#" class="{}""#, escape(&classes.join(" ")));
        }
        if let Some(id) = node.attr("id") {
            let _ = write!(self.out, r#" id="{}""#, escape(id));
        }
        if style.opacity < 1.0 {
            let _ = write!(self.out, r#" opacity="{}""#, num(style.opacity.max(0.0)));
        }
        self.out.push('>');

        let b = self.local(style.border_box);
        if let Some(bg) = style.background {
            self.rect(b, bg);
        }
        self.write_border(style, b);

        let color = style.color.unwrap_or(inherited_color);
        for child in doc.children(el) {
            let Some(cn) = doc.node(child) else {
                continue;
            };
            match cn.kind() {
                NodeKind::Text(text) => self.write_text(style, text, color),
                NodeKind::Element { .. } if is_boundary(doc, child) => {
                    self.write_placeholder(child);
                }
                NodeKind::Element { .. } => {
                    let class: Vec<&str> = cn
                        .attr("class")
                        .map(|c| c.split_whitespace().collect())
                        .unwrap_or_default();
                    self.write_element(child, &class, color);
                }
            }
        }
        self.out.push_str("</g>");
    }

    fn write_border(&mut self, style: &BoxStyle, b: Bounds) {
        let (Some(color), e) = (style.border_color, style.border) else {
            return;
        };
        if e.is_zero() {
            return;
        }
        let sides = [
            Bounds::new(b.left, b.top, b.width, e.top),
            Bounds::new(b.left + b.width - e.right, b.top, e.right, b.height),
            Bounds::new(b.left, b.top + b.height - e.bottom, b.width, e.bottom),
            Bounds::new(b.left, b.top, e.left, b.height),
        ];
        for side in sides {
            if !side.is_empty() {
                self.rect(side, color);
            }
        }
    }

    fn write_text(&mut self, parent: &BoxStyle, text: &str, color: Rgba8) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let origin = content_origin(parent);
        let _ = write!(
            self.out,
            r#"<text x="{}" y="{}" font-size="{}""#,
            num(origin.x - self.ox),
            num(origin.y - self.oy + parent.font_size),
            num(parent.font_size),
        );
        if let Some(family) = &parent.font_family {
            let _ = write!(self.out, r#" font-family="{}""#, escape(family));
        }
        self.paint("fill", color);
        let _ = write!(self.out, ">{}</text>", escape(text));
    }

    /// Nested surfaces draw themselves; keep their footprint as an invisible box.
    fn write_placeholder(&mut self, child: NodeId) {
        let known = self
            .surfaces
            .surface_for_element(child)
            .and_then(|id| self.surfaces.get(id))
            .and_then(|s| s.last_bounds());
        let b = match (known, self.doc.style(self.root)) {
            (Some(lb), Some(rs)) => {
                self.local(lb.translate(rs.border_box.left, rs.border_box.top))
            }
            _ => match self.doc.style(child) {
                Some(cs) => self.local(cs.border_box),
                None => return,
            },
        };
        let _ = write!(
            self.out,
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="none" visibility="hidden" data-layer-placeholder=""/>"#,
            num(b.left),
            num(b.top),
            num(b.width.max(0.0)),
            num(b.height.max(0.0)),
        );
    }

    fn rect(&mut self, b: Bounds, color: Rgba8) {
        let _ = write!(
            self.out,
            r#"<rect x="{}" y="{}" width="{}" height="{}""#,
            num(b.left),
            num(b.top),
            num(b.width.max(0.0)),
            num(b.height.max(0.0)),
        );
        self.paint("fill", color);
        self.out.push_str("/>");
    }

    fn paint(&mut self, attr: &str, color: Rgba8) {
        let _ = write!(self.out, r#" {attr}="{}""#, color.to_rgb_hex());
        if color.a != 255 {
            let _ = write!(self.out, r#" {attr}-opacity="{}""#, num(color.opacity()));
        }
    }

    fn local(&self, b: Bounds) -> Bounds {
        b.translate(-self.ox, -self.oy)
    }
}

fn num(v: f64) -> f64 {
    round_milli(v)
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/snapshot/markup.rs"]
mod tests;
