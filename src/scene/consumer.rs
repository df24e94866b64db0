//! Binds layer textures to scene meshes and routes pointer input back to layers.

use std::collections::{BTreeMap, HashMap};

use crate::document::geometry::{full_size, get_bounds, get_margin};
use crate::document::tree::{Document, NodeId};
use crate::foundation::core::{Affine, Bounds, Point};
use crate::layer::surface::{PseudoState, SurfaceId};
use crate::pipeline::manager::LayerPipeline;
use crate::snapshot::fingerprint::{StateHash, TextureHash};

/// Handle of a mesh inside a [`LayerScene`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshId(pub u32);

/// What a mesh samples from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextureBinding {
    /// Nothing to draw yet (or zero area).
    #[default]
    None,
    /// Uncompressed bitmap; used until the compressed form exists or when encoding failed.
    Raw(TextureHash),
    /// GPU block-compressed texture.
    Compressed(TextureHash),
    /// Live pixels of a media element.
    Media(NodeId),
}

/// A quad showing one layer.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerMesh {
    surface: SurfaceId,
    transform: Affine,
    size: (f64, f64),
    bounds: Bounds,
    binding: TextureBinding,
    state: Option<StateHash>,
    swaps: u64,
}

impl LayerMesh {
    /// Layer shown by this mesh.
    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    /// Mesh-local CSS pixels to world.
    pub fn transform(&self) -> Affine {
        self.transform
    }

    /// Quad size in CSS pixels (the layer's margin box).
    pub fn size(&self) -> (f64, f64) {
        self.size
    }

    /// Layer bounds relative to its parent layer.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Texture currently sampled.
    pub fn binding(&self) -> TextureBinding {
        self.binding
    }

    /// State the binding was taken from.
    pub fn state(&self) -> Option<StateHash> {
        self.state
    }

    /// Number of times the binding changed.
    pub fn swaps(&self) -> u64 {
        self.swaps
    }
}

/// Result of a pointer hit test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneHit {
    /// Mesh under the pointer.
    pub mesh: MeshId,
    /// Layer shown by that mesh.
    pub surface: SurfaceId,
    /// Pointer in mesh-local CSS pixels.
    pub local: Point,
}

/// Meshes bound to layers, with a `mesh -> surface` side table.
#[derive(Debug, Default)]
pub struct LayerScene {
    meshes: BTreeMap<MeshId, LayerMesh>,
    by_surface: HashMap<SurfaceId, MeshId>,
    next_id: u32,
    hovered: Option<SurfaceId>,
}

impl LayerScene {
    /// Empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `surface` on a mesh placed by `transform`. A surface has at most one mesh.
    pub fn bind(&mut self, surface: SurfaceId, transform: Affine) -> MeshId {
        if let Some(&id) = self.by_surface.get(&surface) {
            if let Some(mesh) = self.meshes.get_mut(&id) {
                mesh.transform = transform;
            }
            return id;
        }
        let id = MeshId(self.next_id);
        self.next_id += 1;
        self.meshes.insert(
            id,
            LayerMesh {
                surface,
                transform,
                size: (0.0, 0.0),
                bounds: Bounds::default(),
                binding: TextureBinding::None,
                state: None,
                swaps: 0,
            },
        );
        self.by_surface.insert(surface, id);
        id
    }

    /// Remove a mesh.
    pub fn unbind(&mut self, mesh: MeshId) -> bool {
        match self.meshes.remove(&mesh) {
            Some(m) => {
                self.by_surface.remove(&m.surface);
                if self.hovered == Some(m.surface) {
                    self.hovered = None;
                }
                true
            }
            None => false,
        }
    }

    /// Look up a mesh.
    pub fn mesh(&self, id: MeshId) -> Option<&LayerMesh> {
        self.meshes.get(&id)
    }

    /// Mesh showing `surface`.
    pub fn mesh_for_surface(&self, surface: SurfaceId) -> Option<MeshId> {
        self.by_surface.get(&surface).copied()
    }

    /// Move a mesh.
    pub fn set_transform(&mut self, mesh: MeshId, transform: Affine) {
        if let Some(m) = self.meshes.get_mut(&mesh) {
            m.transform = transform;
        }
    }

    /// Number of meshes.
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Return `true` when no mesh is bound.
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Pick up every layer's current texture and geometry.
    ///
    /// Meshes whose surface was torn down are unbound. Returns how many bindings changed.
    pub fn sync(&mut self, pipeline: &LayerPipeline) -> usize {
        let gone: Vec<MeshId> = self
            .meshes
            .iter()
            .filter(|(_, m)| pipeline.surface(m.surface).is_none())
            .map(|(id, _)| *id)
            .collect();
        for id in gone {
            self.unbind(id);
        }

        let mut changed = 0;
        for mesh in self.meshes.values_mut() {
            let Some(surface) = pipeline.surface(mesh.surface) else {
                continue;
            };
            let current = surface.current_state_key();
            let Some(state) = current.and_then(|k| pipeline.layer_state(k)) else {
                continue;
            };
            mesh.size = (state.full_width, state.full_height);
            mesh.bounds = state.bounds;

            let binding = if state.is_zero_area() {
                TextureBinding::None
            } else if state.media {
                TextureBinding::Media(surface.element())
            } else {
                match state.texture.and_then(|t| pipeline.texture(t)) {
                    Some(tex) if tex.compressed.is_some() => TextureBinding::Compressed(tex.hash),
                    Some(tex) if tex.canvas.is_some() => TextureBinding::Raw(tex.hash),
                    _ => mesh.binding,
                }
            };
            if binding != mesh.binding || current != mesh.state {
                mesh.binding = binding;
                mesh.state = current;
                mesh.swaps += 1;
                changed += 1;
            }
        }
        changed
    }

    /// Request re-serialization of layers whose element geometry no longer matches their
    /// latest serialized state. Returns the number of refreshes requested.
    pub fn update(&self, doc: &Document, pipeline: &mut LayerPipeline) -> usize {
        let mut stale = Vec::new();
        for mesh in self.meshes.values() {
            let Some(surface) = pipeline.surface(mesh.surface) else {
                continue;
            };
            if surface.needs_refresh() {
                continue;
            }
            let Some(state) = surface
                .desired_state_key()
                .and_then(|k| pipeline.layer_state(k))
            else {
                continue;
            };
            let el = surface.element();
            let reference = surface
                .parent()
                .and_then(|p| pipeline.surface(p))
                .map(|p| p.element());
            let Some(bounds) = get_bounds(doc, el, reference) else {
                continue;
            };
            let full = full_size(bounds, get_margin(doc, el));
            let current_pseudo = surface.pseudo_state();
            if bounds != state.bounds
                || full != (state.full_width, state.full_height)
                || current_pseudo != state.pseudo
            {
                stale.push(mesh.surface);
            }
        }
        for id in &stale {
            pipeline.request_refresh(*id);
        }
        stale.len()
    }

    /// Topmost mesh under `world`, most recently bound first.
    pub fn hit_test(&self, world: Point) -> Option<SceneHit> {
        self.meshes.iter().rev().find_map(|(id, m)| {
            if m.transform.determinant().abs() < f64::EPSILON {
                return None;
            }
            let local = m.transform.inverse() * world;
            let inside = Bounds::new(0.0, 0.0, m.size.0, m.size.1).contains(local);
            inside.then_some(SceneHit {
                mesh: *id,
                surface: m.surface,
                local,
            })
        })
    }

    /// Route a pointer position to the hover pseudo state.
    ///
    /// Returns the hovered surface after the update.
    pub fn set_hover(&mut self, pipeline: &mut LayerPipeline, world: Option<Point>) -> Option<SurfaceId> {
        let target = world.and_then(|p| self.hit_test(p)).map(|h| h.surface);
        if target == self.hovered {
            return target;
        }
        if let Some(prev) = self.hovered.take()
            && let Some(s) = pipeline.surface(prev)
        {
            let pseudo = PseudoState {
                hover: false,
                ..s.pseudo_state()
            };
            pipeline.set_pseudo_state(prev, pseudo);
        }
        if let Some(next) = target
            && let Some(s) = pipeline.surface(next)
        {
            let pseudo = PseudoState {
                hover: true,
                ..s.pseudo_state()
            };
            pipeline.set_pseudo_state(next, pseudo);
        }
        self.hovered = target;
        target
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/consumer.rs"]
mod tests;
