use std::collections::BTreeSet;

use smallvec::SmallVec;

use crate::document::tree::NodeId;
use crate::foundation::core::Bounds;
use crate::snapshot::fingerprint::StateHash;

/// Generational handle of a [`Surface`] in the surface arena.
///
/// A handle whose generation no longer matches its slot is stale and resolves to nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
}

/// Interaction pseudo-classes applied to a surface's root element.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct PseudoState {
    /// `:hover`
    pub hover: bool,
    /// `:active`
    pub active: bool,
    /// `:focus`
    pub focus: bool,
    /// `:target`
    pub target: bool,
}

impl PseudoState {
    pub(crate) fn bits(self) -> u8 {
        u8::from(self.hover)
            | (u8::from(self.active) << 1)
            | (u8::from(self.focus) << 2)
            | (u8::from(self.target) << 3)
    }

    /// Class names injected into snapshots, in a fixed order.
    pub(crate) fn class_names(self) -> impl Iterator<Item = &'static str> {
        [
            (self.hover, "layer-hover"),
            (self.active, "layer-active"),
            (self.focus, "layer-focus"),
            (self.target, "layer-target"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
    }
}

/// One tracked, independently rasterized element.
#[derive(Clone, Debug)]
pub struct Surface {
    pub(crate) element: NodeId,
    pub(crate) parent: Option<SurfaceId>,
    pub(crate) children: SmallVec<[SurfaceId; 4]>,
    pub(crate) desired_pseudo: PseudoState,
    pub(crate) needs_refresh: bool,
    pub(crate) needs_removal: bool,
    pub(crate) media: bool,
    pub(crate) all_state_hashes: BTreeSet<StateHash>,
    pub(crate) previous_state: Option<StateHash>,
    pub(crate) desired_state: Option<StateHash>,
    pub(crate) current_state: Option<StateHash>,
    pub(crate) last_bounds: Option<Bounds>,
}

impl Surface {
    pub(crate) fn new(element: NodeId, parent: Option<SurfaceId>) -> Self {
        Self {
            element,
            parent,
            children: SmallVec::new(),
            desired_pseudo: PseudoState::default(),
            needs_refresh: true,
            needs_removal: false,
            media: false,
            all_state_hashes: BTreeSet::new(),
            previous_state: None,
            desired_state: None,
            current_state: None,
            last_bounds: None,
        }
    }

    /// Element this surface renders.
    pub fn element(&self) -> NodeId {
        self.element
    }

    /// Enclosing surface, if any.
    pub fn parent(&self) -> Option<SurfaceId> {
        self.parent
    }

    /// Directly nested surfaces, in document order.
    pub fn children(&self) -> &[SurfaceId] {
        &self.children
    }

    /// Requested interaction state.
    pub fn pseudo_state(&self) -> PseudoState {
        self.desired_pseudo
    }

    /// Whether the surface waits for re-serialization.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    /// Whether the surface renders through the media fast path.
    pub fn is_media(&self) -> bool {
        self.media
    }

    /// Every state this surface has produced.
    pub fn all_state_hashes(&self) -> &BTreeSet<StateHash> {
        &self.all_state_hashes
    }

    /// State shown before the current one.
    pub fn previous_state_key(&self) -> Option<StateHash> {
        self.previous_state
    }

    /// Most recently serialized state.
    pub fn desired_state_key(&self) -> Option<StateHash> {
        self.desired_state
    }

    /// State currently displayable.
    pub fn current_state_key(&self) -> Option<StateHash> {
        self.current_state
    }

    /// Bounds recorded by the last serialize, relative to the parent surface.
    pub fn last_bounds(&self) -> Option<Bounds> {
        self.last_bounds
    }
}
