use crate::document::geometry::{full_size, get_border, get_bounds, get_margin, get_padding};
use crate::document::tree::Document;
use crate::foundation::math::texture_extent;
use crate::layer::surface::SurfaceId;
use crate::layer::tree::{LayerEvent, SurfaceTree};
use crate::pipeline::opts::PipelineOpts;
use crate::snapshot::fingerprint::{StateHash, empty_state_hash, media_state_hash, state_hash};
use crate::snapshot::markup::{Snapshot, build_snapshot};
use crate::store::cache::TextureCache;

/// Result of serializing one surface.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SerializeOutcome {
    /// Content address of the surface's current look; `None` for detached elements.
    pub state_key: Option<StateHash>,
    /// Whether a rasterize job is needed for `state_key`.
    pub needs_rasterize: bool,
    /// Snapshot to rasterize, present when `needs_rasterize` is set.
    pub raster_input: Option<Snapshot>,
}

#[tracing::instrument(level = "debug", skip_all, fields(surface = id.idx))]
pub(crate) fn serialize_surface(
    doc: &Document,
    surfaces: &mut SurfaceTree,
    cache: &mut TextureCache,
    opts: &PipelineOpts,
    id: SurfaceId,
) -> SerializeOutcome {
    let Some(surface) = surfaces.get(id) else {
        return SerializeOutcome::default();
    };
    let el = surface.element();
    if !doc.is_attached(el) {
        return SerializeOutcome::default();
    }
    let reference = surface
        .parent()
        .and_then(|p| surfaces.get(p))
        .map(|p| p.element());
    let pseudo = surface.pseudo_state();
    let media = surface.is_media();

    let Some(bounds) = get_bounds(doc, el, reference) else {
        return SerializeOutcome::default();
    };
    let margin = get_margin(doc, el);
    let full = full_size(bounds, margin);
    let texture = (
        texture_extent(full.0, opts.pixel_ratio, opts.min_texture_size, opts.max_texture_size),
        texture_extent(full.1, opts.pixel_ratio, opts.min_texture_size, opts.max_texture_size),
    );
    let zero_area = !(full.0 > 0.0 && full.1 > 0.0);

    let (key, snapshot) = if zero_area {
        (empty_state_hash(full), None)
    } else if media {
        (media_state_hash(el, pseudo, full, texture), None)
    } else {
        match build_snapshot(doc, surfaces, el, pseudo, full, texture) {
            Some(snap) => (state_hash(&snap.markup, pseudo, full, texture), Some(snap)),
            None => return SerializeOutcome::default(),
        }
    };

    if snapshot.is_some()
        && let Err(e) = cache.request_stored_data(key)
    {
        tracing::warn!(state = %key, error = %e, "store lookup failed");
    }

    let state = cache.layer_state_entry(key);
    state.bounds = bounds;
    state.margin = margin;
    state.border = get_border(doc, el);
    state.padding = get_padding(doc, el);
    state.full_width = full.0;
    state.full_height = full.1;
    state.pixel_ratio = opts.pixel_ratio;
    state.texture_width = texture.0;
    state.texture_height = texture.1;
    state.pseudo = pseudo;
    state.media = media;

    let needs_rasterize = snapshot.is_some() && !cache.has_usable_texture(key);

    let mut moved = false;
    if let Some(s) = surfaces.get_mut(id) {
        s.all_state_hashes.insert(key);
        s.desired_state = Some(key);
        s.needs_refresh = false;
        if s.last_bounds != Some(bounds) {
            moved = s.last_bounds.is_some();
            s.last_bounds = Some(bounds);
        }
    }
    if moved {
        surfaces.push_event(LayerEvent::Moved {
            surface: id,
            bounds,
        });
    }

    SerializeOutcome {
        state_key: Some(key),
        needs_rasterize,
        raster_input: if needs_rasterize { snapshot } else { None },
    }
}
