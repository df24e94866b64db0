use std::collections::BTreeMap;
use std::fmt;

use indextree::Arena;

use crate::foundation::core::{Affine, Bounds, Edges, Rgba8};
use crate::foundation::error::{LayerError, LayerResult};

/// Stable handle of a node inside a [`Document`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(indextree::NodeId);

impl NodeId {
    /// One-based arena index, stable for the lifetime of the document.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index())
    }
}

/// Computed box style of an element, as reported by the upstream layout engine.
///
/// `border_box` is in document coordinates; the edge widths describe the box model around
/// and inside it.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BoxStyle {
    /// Border box in document coordinates.
    pub border_box: Bounds,
    /// Margin widths.
    pub margin: Edges,
    /// Border widths.
    pub border: Edges,
    /// Padding widths.
    pub padding: Edges,
    /// CSS transform; a non-identity value starts a new layer boundary.
    pub transform: Option<Affine>,
    /// Background fill.
    pub background: Option<Rgba8>,
    /// Border fill.
    pub border_color: Option<Rgba8>,
    /// Text color inherited by child text nodes.
    pub color: Option<Rgba8>,
    /// Font size in CSS pixels.
    pub font_size: f64,
    /// Font family list (CSS syntax).
    pub font_family: Option<String>,
    /// Element opacity in `[0, 1]`.
    pub opacity: f64,
}

impl Default for BoxStyle {
    fn default() -> Self {
        Self {
            border_box: Bounds::default(),
            margin: Edges::default(),
            border: Edges::default(),
            padding: Edges::default(),
            transform: None,
            background: None,
            border_color: None,
            color: None,
            font_size: 16.0,
            font_family: None,
            opacity: 1.0,
        }
    }
}

/// Element or text payload of a node.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Element with a tag name and attributes.
    Element {
        /// Lower-case tag name.
        tag: String,
        /// Attributes, ordered by name.
        attrs: BTreeMap<String, String>,
    },
    /// Character data.
    Text(String),
}

/// Payload of one document node. Tree links live in the [`Document`] arena.
#[derive(Clone, Debug)]
pub struct Node {
    kind: NodeKind,
    style: BoxStyle,
}

impl Node {
    /// Element or text payload.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Computed box style.
    pub fn style(&self) -> &BoxStyle {
        &self.style
    }

    /// Tag name for elements.
    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    /// Attribute value for elements.
    pub fn attr(&self, name: &str) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { attrs, .. } => attrs.get(name).map(String::as_str),
            NodeKind::Text(_) => None,
        }
    }

    /// Text content for text nodes.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text(t) => Some(t),
            NodeKind::Element { .. } => None,
        }
    }
}

/// Kind of change carried by a [`MutationRecord`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationKind {
    /// An attribute (or the computed style, reported as `style`) changed value.
    Attributes {
        /// Attribute name.
        name: String,
    },
    /// Text content changed.
    CharacterData,
    /// Children were added or removed.
    ChildList,
}

/// A single observed change in the document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationRecord {
    /// Node whose attributes, text or children changed.
    pub target: NodeId,
    /// Change kind.
    pub kind: MutationKind,
}

/// Document-level notifications that invalidate every layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentEvent {
    /// An external style sheet finished loading.
    StyleSheetLoaded(String),
    /// The window `load` event fired.
    WindowLoaded,
}

/// External style sheet text with its load state.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StyleSheet {
    /// Source URL or name.
    pub href: String,
    /// CSS text (empty until loaded).
    #[serde(default)]
    pub text: String,
    /// Whether the sheet finished loading.
    #[serde(default = "default_true")]
    pub loaded: bool,
}

fn default_true() -> bool {
    true
}

/// Serializable description of a node subtree.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
    /// Text node.
    Text {
        /// Character data.
        text: String,
    },
    /// Element node.
    Element {
        /// Tag name.
        tag: String,
        /// Attributes.
        #[serde(default)]
        attrs: BTreeMap<String, String>,
        /// Computed box style.
        #[serde(default)]
        style: BoxStyle,
        /// Child nodes.
        #[serde(default)]
        children: Vec<NodeSpec>,
    },
}

/// Serializable description of a whole document.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DocumentSpec {
    /// Style sheets referenced by the document.
    #[serde(default)]
    pub stylesheets: Vec<StyleSheet>,
    /// Children of `body`.
    #[serde(default)]
    pub body: Vec<NodeSpec>,
}

/// Arena-backed mutable document tree with a mutation feed.
///
/// Nodes are never freed; a removed subtree is simply detached and may be re-attached.
#[derive(Clone, Debug)]
pub struct Document {
    arena: Arena<Node>,
    body: NodeId,
    stylesheets: Vec<StyleSheet>,
    mutations: Vec<MutationRecord>,
    events: Vec<DocumentEvent>,
    loaded: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document containing only `body`.
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let body = arena.new_node(Node {
            kind: NodeKind::Element {
                tag: "body".to_string(),
                attrs: BTreeMap::new(),
            },
            style: BoxStyle::default(),
        });
        Self {
            arena,
            body: NodeId(body),
            stylesheets: Vec::new(),
            mutations: Vec::new(),
            events: Vec::new(),
            loaded: false,
        }
    }

    /// Build a document from its serializable description.
    ///
    /// Construction does not produce mutation records.
    pub fn from_spec(spec: &DocumentSpec) -> LayerResult<Self> {
        let mut doc = Self::new();
        doc.stylesheets = spec.stylesheets.clone();
        for node in &spec.body {
            let id = doc.build_spec(node);
            doc.append_child(doc.body, id)?;
        }
        doc.mutations.clear();
        Ok(doc)
    }

    fn build_spec(&mut self, spec: &NodeSpec) -> NodeId {
        match spec {
            NodeSpec::Text { text } => self.create_text(text.clone()),
            NodeSpec::Element {
                tag,
                attrs,
                style,
                children,
            } => {
                let id = self.arena.new_node(Node {
                    kind: NodeKind::Element {
                        tag: tag.to_ascii_lowercase(),
                        attrs: attrs.clone(),
                    },
                    style: style.clone(),
                });
                for child in children {
                    let c = self.build_spec(child);
                    id.append(c.0, &mut self.arena);
                }
                NodeId(id)
            }
        }
    }

    fn contains(&self, id: NodeId) -> bool {
        self.arena.get(id.0).is_some()
    }

    /// The `body` element (tree root).
    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id.0).map(indextree::Node::get)
    }

    /// Computed style of a node.
    pub fn style(&self, id: NodeId) -> Option<&BoxStyle> {
        self.node(id).map(Node::style)
    }

    /// Parent of a node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id.0)?.parent().map(NodeId)
    }

    /// Children of a node in document order (empty for unknown ids).
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        if !self.contains(id) {
            return Vec::new();
        }
        id.0.children(&self.arena).map(NodeId).collect()
    }

    /// Return `true` when `id` is reachable from `body`.
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.is_inclusive_ancestor(self.body, id)
    }

    /// Return `true` when `ancestor` is `id` or one of its ancestors.
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.contains(id) && id.0.ancestors(&self.arena).any(|n| n == ancestor.0)
    }

    fn push_node(&mut self, kind: NodeKind, style: BoxStyle) -> NodeId {
        NodeId(self.arena.new_node(Node { kind, style }))
    }

    fn node_mut(&mut self, id: NodeId) -> LayerResult<&mut Node> {
        self.arena
            .get_mut(id.0)
            .map(indextree::Node::get_mut)
            .ok_or_else(|| LayerError::validation(format!("unknown node {id}")))
    }

    fn record(&mut self, target: NodeId, kind: MutationKind) {
        self.mutations.push(MutationRecord { target, kind });
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str, style: BoxStyle) -> NodeId {
        self.push_node(
            NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
                attrs: BTreeMap::new(),
            },
            style,
        )
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push_node(NodeKind::Text(text.into()), BoxStyle::default())
    }

    /// Append `child` to `parent`, detaching it from its previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> LayerResult<()> {
        if matches!(self.node_mut(parent)?.kind, NodeKind::Text(_)) {
            return Err(LayerError::validation("text nodes cannot have children"));
        }
        self.node_mut(child)?;
        if self.is_inclusive_ancestor(child, parent) {
            return Err(LayerError::validation(
                "cannot append a node to itself or its descendant",
            ));
        }
        if let Some(old) = self.parent(child) {
            self.detach(old, child);
        }
        parent
            .0
            .checked_append(child.0, &mut self.arena)
            .map_err(|e| LayerError::validation(format!("append {child} to {parent}: {e}")))?;
        self.record(parent, MutationKind::ChildList);
        Ok(())
    }

    /// Remove `child` from `parent`. The subtree stays in the arena, detached.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> LayerResult<()> {
        if self.parent(child) != Some(parent) {
            return Err(LayerError::validation("node is not a child of the given parent"));
        }
        self.detach(parent, child);
        Ok(())
    }

    fn detach(&mut self, parent: NodeId, child: NodeId) {
        child.0.detach(&mut self.arena);
        self.record(parent, MutationKind::ChildList);
    }

    /// Set an attribute. Writing the current value is a no-op and records nothing.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> LayerResult<()> {
        let NodeKind::Element { attrs, .. } = &mut self.node_mut(id)?.kind else {
            return Err(LayerError::validation("attributes require an element"));
        };
        if attrs.get(name).map(String::as_str) == Some(value) {
            return Ok(());
        }
        attrs.insert(name.to_string(), value.to_string());
        self.record(
            id,
            MutationKind::Attributes {
                name: name.to_string(),
            },
        );
        Ok(())
    }

    /// Remove an attribute if present.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> LayerResult<()> {
        let NodeKind::Element { attrs, .. } = &mut self.node_mut(id)?.kind else {
            return Err(LayerError::validation("attributes require an element"));
        };
        if attrs.remove(name).is_some() {
            self.record(
                id,
                MutationKind::Attributes {
                    name: name.to_string(),
                },
            );
        }
        Ok(())
    }

    /// Replace the text of a text node.
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> LayerResult<()> {
        let text = text.into();
        let NodeKind::Text(current) = &mut self.node_mut(id)?.kind else {
            return Err(LayerError::validation("set_text requires a text node"));
        };
        if *current == text {
            return Ok(());
        }
        *current = text;
        self.record(id, MutationKind::CharacterData);
        Ok(())
    }

    /// Edit the computed style; records a `style` attribute mutation when it changed.
    pub fn update_style(&mut self, id: NodeId, f: impl FnOnce(&mut BoxStyle)) -> LayerResult<()> {
        let node = self.node_mut(id)?;
        let before = node.style.clone();
        f(&mut node.style);
        if node.style != before {
            self.record(
                id,
                MutationKind::Attributes {
                    name: "style".to_string(),
                },
            );
        }
        Ok(())
    }

    /// Register a style sheet that has not finished loading yet.
    pub fn add_stylesheet(&mut self, href: impl Into<String>) {
        self.stylesheets.push(StyleSheet {
            href: href.into(),
            text: String::new(),
            loaded: false,
        });
    }

    /// Complete a style sheet load and raise [`DocumentEvent::StyleSheetLoaded`].
    pub fn finish_stylesheet(&mut self, href: &str, text: impl Into<String>) -> LayerResult<()> {
        let sheet = self
            .stylesheets
            .iter_mut()
            .find(|s| s.href == href)
            .ok_or_else(|| LayerError::validation(format!("unknown style sheet '{href}'")))?;
        sheet.text = text.into();
        sheet.loaded = true;
        self.events
            .push(DocumentEvent::StyleSheetLoaded(href.to_string()));
        Ok(())
    }

    /// Loaded style sheets in registration order.
    pub fn loaded_stylesheets(&self) -> impl Iterator<Item = &StyleSheet> {
        self.stylesheets.iter().filter(|s| s.loaded)
    }

    /// Fire the window `load` event (once).
    pub fn finish_load(&mut self) {
        if !self.loaded {
            self.loaded = true;
            self.events.push(DocumentEvent::WindowLoaded);
        }
    }

    /// Whether [`Document::finish_load`] has run.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Take all pending mutation records.
    pub fn drain_mutations(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.mutations)
    }

    /// Return `true` while mutation records or events wait to be drained.
    pub fn has_pending_changes(&self) -> bool {
        !self.mutations.is_empty() || !self.events.is_empty()
    }

    /// Take all pending document events.
    pub fn drain_events(&mut self) -> Vec<DocumentEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/document/tree.rs"]
mod tests;
