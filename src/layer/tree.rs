//! Arena of surfaces mirroring the boundary structure of a [`Document`].

use std::collections::{BTreeSet, HashMap};

use smallvec::SmallVec;

use crate::document::geometry::has_nontrivial_transform;
use crate::document::tree::{Document, MutationKind, MutationRecord, NodeId};
use crate::foundation::core::Bounds;
use crate::foundation::error::{LayerError, LayerResult};
use crate::layer::surface::{PseudoState, Surface, SurfaceId};
use crate::snapshot::fingerprint::StateHash;

/// Attribute that marks an element as the root of its own layer.
pub const LAYER_ATTR: &str = "data-layer";

const MEDIA_TAGS: [&str; 3] = ["img", "video", "canvas"];

/// Notification raised to listeners of the surface tree.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerEvent {
    /// A surface started tracking an element.
    Created(SurfaceId),
    /// The bounds of a surface changed.
    Moved {
        /// Surface that moved.
        surface: SurfaceId,
        /// New bounds relative to the parent surface.
        bounds: Bounds,
    },
    /// A surface's current state advanced.
    Painted {
        /// Surface that was painted.
        surface: SurfaceId,
        /// State now displayed.
        state: StateHash,
    },
    /// A surface was torn down.
    Removed(SurfaceId),
}

/// Return `true` for tags whose pixels come from a live media source.
pub fn is_media_tag(tag: &str) -> bool {
    MEDIA_TAGS.contains(&tag)
}

/// Return `true` when `id` starts a new surface.
pub fn is_boundary(doc: &Document, id: NodeId) -> bool {
    let Some(node) = doc.node(id) else {
        return false;
    };
    let Some(tag) = node.tag() else {
        return false;
    };
    node.attr(LAYER_ATTR).is_some() || is_media_tag(tag) || has_nontrivial_transform(node.style())
}

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    surface: Option<Surface>,
}

/// Surface arena with an `element -> surface` side table.
#[derive(Debug, Default)]
pub struct SurfaceTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_element: HashMap<NodeId, SurfaceId>,
    roots: Vec<SurfaceId>,
    events: Vec<LayerEvent>,
}

impl SurfaceTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `el` as a root surface and discover its nested boundaries.
    ///
    /// Returns the existing surface when `el` is already tracked.
    pub fn create_root(&mut self, doc: &Document, el: NodeId) -> LayerResult<SurfaceId> {
        if let Some(id) = self.surface_for_element(el) {
            return Ok(id);
        }
        let node = doc
            .node(el)
            .ok_or_else(|| LayerError::validation(format!("unknown node {el}")))?;
        if node.tag().is_none() {
            return Err(LayerError::validation("a layer root must be an element"));
        }
        let id = self.alloc(doc, el, None);
        self.roots.push(id);
        self.refresh(doc, id);
        Ok(id)
    }

    /// Resolve a handle; stale handles resolve to `None`.
    pub fn get(&self, id: SurfaceId) -> Option<&Surface> {
        let slot = self.slots.get(id.idx as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.surface.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        let slot = self.slots.get_mut(id.idx as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.surface.as_mut()
    }

    /// Surface tracking `el`, if any.
    pub fn surface_for_element(&self, el: NodeId) -> Option<SurfaceId> {
        self.by_element
            .get(&el)
            .copied()
            .filter(|id| self.get(*id).is_some())
    }

    /// Root surfaces in creation order.
    pub fn roots(&self) -> &[SurfaceId] {
        &self.roots
    }

    /// Live surfaces in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (SurfaceId, &Surface)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.surface.as_ref().map(|s| {
                (
                    SurfaceId {
                        idx: idx as u32,
                        generation: slot.generation,
                    },
                    s,
                )
            })
        })
    }

    /// Ids of all live surfaces.
    pub fn ids(&self) -> Vec<SurfaceId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Number of live surfaces.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.surface.is_some()).count()
    }

    /// Return `true` when no surface is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn alloc(&mut self, doc: &Document, el: NodeId, parent: Option<SurfaceId>) -> SurfaceId {
        let mut surface = Surface::new(el, parent);
        surface.media = doc
            .node(el)
            .and_then(|n| n.tag())
            .is_some_and(is_media_tag);
        let id = match self.free.pop() {
            Some(idx) => {
                let slot = &mut self.slots[idx as usize];
                slot.surface = Some(surface);
                SurfaceId {
                    idx,
                    generation: slot.generation,
                }
            }
            None => {
                let idx = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    surface: Some(surface),
                });
                SurfaceId { idx, generation: 0 }
            }
        };
        self.by_element.insert(el, id);
        self.events.push(LayerEvent::Created(id));
        tracing::debug!(surface = id.idx, element = %el, "layer created");
        id
    }

    /// Re-scan the subtree of `id` for nested boundaries.
    ///
    /// Previous children that are not found again are flagged for removal; they survive
    /// if another refresh in the same pass re-attaches them before [`SurfaceTree::sweep`].
    pub fn refresh(&mut self, doc: &Document, id: SurfaceId) {
        let Some(surface) = self.get(id) else {
            return;
        };
        let el = surface.element;
        let old_children = surface.children.clone();
        for c in old_children {
            if let Some(child) = self.get_mut(c)
                && child.parent == Some(id)
            {
                child.needs_removal = true;
            }
        }

        let mut found = Vec::new();
        collect_boundaries(doc, el, &mut found);

        let mut children: SmallVec<[SurfaceId; 4]> = SmallVec::new();
        let mut created = Vec::new();
        for b in found {
            match self.surface_for_element(b) {
                Some(sid) => {
                    self.reparent(sid, id);
                    children.push(sid);
                }
                None => {
                    let sid = self.alloc(doc, b, Some(id));
                    children.push(sid);
                    created.push(sid);
                }
            }
        }

        let media = doc
            .node(el)
            .and_then(|n| n.tag())
            .is_some_and(is_media_tag);
        if let Some(surface) = self.get_mut(id) {
            surface.children = children;
            surface.media = media;
            surface.needs_refresh = true;
        }
        for sid in created {
            self.refresh(doc, sid);
        }
    }

    fn reparent(&mut self, sid: SurfaceId, parent: SurfaceId) {
        let old_parent = match self.get_mut(sid) {
            Some(s) => {
                s.needs_removal = false;
                let old = s.parent;
                s.parent = Some(parent);
                old
            }
            None => return,
        };
        if old_parent == Some(parent) {
            return;
        }
        match old_parent {
            Some(old) => {
                if let Some(o) = self.get_mut(old) {
                    o.children.retain(|c| *c != sid);
                }
            }
            None => self.roots.retain(|r| *r != sid),
        }
        if let Some(s) = self.get_mut(sid) {
            s.needs_refresh = true;
        }
    }

    /// Tear down surfaces flagged for removal or whose element left the document,
    /// together with their descendants. Returns the removed ids.
    pub fn sweep(&mut self, doc: &Document) -> Vec<SurfaceId> {
        let doomed: Vec<SurfaceId> = self
            .iter()
            .filter(|(_, s)| s.needs_removal || !doc.is_attached(s.element))
            .map(|(id, _)| id)
            .collect();
        let mut removed = Vec::new();
        for id in doomed {
            self.remove_subtree(id, &mut removed);
        }
        removed
    }

    fn remove_subtree(&mut self, id: SurfaceId, removed: &mut Vec<SurfaceId>) {
        let Some(slot) = self.slots.get_mut(id.idx as usize) else {
            return;
        };
        if slot.generation != id.generation {
            return;
        }
        let Some(surface) = slot.surface.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.idx);

        if self.by_element.get(&surface.element) == Some(&id) {
            self.by_element.remove(&surface.element);
        }
        match surface.parent {
            Some(p) => {
                if let Some(parent) = self.get_mut(p) {
                    parent.children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }
        self.events.push(LayerEvent::Removed(id));
        tracing::debug!(surface = id.idx, element = %surface.element, "layer removed");
        removed.push(id);

        for child in surface.children {
            let orphaned = self.get(child).is_some_and(|c| c.parent == Some(id));
            if orphaned {
                self.remove_subtree(child, removed);
            }
        }
    }

    /// Flag `id` for re-serialization.
    pub fn mark_dirty(&mut self, id: SurfaceId) {
        if let Some(s) = self.get_mut(id) {
            s.needs_refresh = true;
        }
    }

    /// Flag every surface for re-serialization.
    pub fn mark_all_dirty(&mut self) {
        for slot in &mut self.slots {
            if let Some(s) = slot.surface.as_mut() {
                s.needs_refresh = true;
            }
        }
    }

    /// Closest surface whose element is `node` or one of its ancestors.
    pub fn nearest_surface(&self, doc: &Document, node: NodeId) -> Option<SurfaceId> {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if let Some(id) = self.surface_for_element(n) {
                return Some(id);
            }
            cur = doc.parent(n);
        }
        None
    }

    pub(crate) fn depth(&self, id: SurfaceId) -> usize {
        let mut depth = 0;
        let mut cur = self.get(id).and_then(Surface::parent);
        while let Some(p) = cur {
            depth += 1;
            cur = self.get(p).and_then(Surface::parent);
        }
        depth
    }

    /// Map mutation records onto their owning surfaces.
    ///
    /// Every owner is marked dirty. Child-list, boundary-attribute and style changes also
    /// re-run [`SurfaceTree::refresh`] on the owner, and on the parent surface when the
    /// target is itself a surface element. Refreshes run deepest first.
    pub fn apply_mutations(&mut self, doc: &Document, records: &[MutationRecord]) {
        let mut to_refresh = BTreeSet::new();
        for rec in records {
            let Some(owner) = self.nearest_surface(doc, rec.target) else {
                continue;
            };
            self.mark_dirty(owner);
            let structural = match &rec.kind {
                MutationKind::ChildList => true,
                MutationKind::Attributes { name } => name == LAYER_ATTR || name == "style",
                MutationKind::CharacterData => false,
            };
            if !structural {
                continue;
            }
            to_refresh.insert(owner);
            if self.surface_for_element(rec.target) == Some(owner)
                && let Some(parent) = self.get(owner).and_then(Surface::parent)
            {
                self.mark_dirty(parent);
                to_refresh.insert(parent);
            }
        }

        let mut order: Vec<(usize, SurfaceId)> = to_refresh
            .into_iter()
            .map(|id| (self.depth(id), id))
            .collect();
        order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        for (_, id) in order {
            self.refresh(doc, id);
        }
    }

    /// Set the requested interaction state; returns `true` when it changed.
    pub fn set_pseudo_state(&mut self, id: SurfaceId, pseudo: PseudoState) -> bool {
        match self.get_mut(id) {
            Some(s) if s.desired_pseudo != pseudo => {
                s.desired_pseudo = pseudo;
                s.needs_refresh = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn push_event(&mut self, event: LayerEvent) {
        self.events.push(event);
    }

    /// Take pending events in the order they were raised.
    pub fn drain_events(&mut self) -> Vec<LayerEvent> {
        std::mem::take(&mut self.events)
    }
}

fn collect_boundaries(doc: &Document, el: NodeId, out: &mut Vec<NodeId>) {
    for child in doc.children(el) {
        if doc.node(child).and_then(|n| n.tag()).is_none() {
            continue;
        }
        if is_boundary(doc, child) {
            out.push(child);
        } else {
            collect_boundaries(doc, child, out);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/layer/tree.rs"]
mod tests;
