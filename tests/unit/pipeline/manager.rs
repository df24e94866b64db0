use super::*;
use crate::document::tree::BoxStyle;
use crate::foundation::core::{Bounds, Rgba8};
use crate::layer::tree::LAYER_ATTR;
use crate::raster::rasterizer::RasterOutput;
use crate::store::backend::MemoryStore;

fn fast_opts() -> PipelineOpts {
    PipelineOpts {
        retry_base_ms: 1,
        retry_jitter_ms: 1,
        compress_workers: 1,
        ..PipelineOpts::default()
    }
}

fn pipeline(opts: PipelineOpts) -> LayerPipeline {
    LayerPipeline::new(opts, Box::new(MemoryStore::new())).unwrap()
}

fn card(doc: &mut Document, parent: NodeId, left: f64, w: f64, h: f64) -> NodeId {
    let el = doc.create_element(
        "div",
        BoxStyle {
            border_box: Bounds::new(left, 0.0, w, h),
            background: Some(Rgba8::rgb(30, 60, 90)),
            ..BoxStyle::default()
        },
    );
    doc.set_attribute(el, LAYER_ATTR, "").unwrap();
    doc.append_child(parent, el).unwrap();
    el
}

const SETTLE: Duration = Duration::from_secs(20);

#[test]
fn layer_settles_with_a_usable_texture() {
    let mut doc = Document::new();
    let body = doc.body();
    let el = card(&mut doc, body, 0.0, 100.0, 50.0);
    let mut p = pipeline(fast_opts());
    let id = p.create_layer(&doc, el).unwrap();

    assert!(p.run_until_idle(&mut doc, SETTLE));
    let s = p.surface(id).unwrap();
    assert!(s.current_state_key().is_some());
    assert_eq!(s.current_state_key(), s.desired_state_key());

    let state = p.current_layer_state(id).unwrap();
    assert_eq!((state.texture_width, state.texture_height), (128, 64));
    assert!(state.render_attempts > p.opts().min_render_attempts);
    assert!(p.current_texture(id).unwrap().is_usable());

    let events = p.drain_events();
    assert!(events.contains(&LayerEvent::Created(id)));
    assert!(events.iter().any(|e| matches!(e, LayerEvent::Painted { surface, .. } if *surface == id)));
}

#[test]
fn zero_area_and_media_paint_without_rasterizing() {
    let mut doc = Document::new();
    let body = doc.body();
    let root = card(&mut doc, body, 0.0, 0.0, 0.0);
    let img = doc.create_element(
        "img",
        BoxStyle {
            border_box: Bounds::new(0.0, 0.0, 16.0, 16.0),
            ..BoxStyle::default()
        },
    );
    doc.append_child(root, img).unwrap();

    let mut p = pipeline(fast_opts());
    let rid = p.create_layer(&doc, root).unwrap();
    let summary = p.tick(&mut doc);

    assert_eq!(summary.serialized, 2);
    assert_eq!(summary.rasterized, 0);
    assert_eq!(summary.painted, 2);
    let mid = p.surfaces().surface_for_element(img).unwrap();
    assert!(p.current_layer_state(mid).unwrap().media);
    assert!(p.current_layer_state(rid).unwrap().is_zero_area());
    assert!(p.is_idle());
}

#[test]
fn detached_elements_have_no_state_key() {
    let mut doc = Document::new();
    let body = doc.body();
    let el = card(&mut doc, body, 0.0, 10.0, 10.0);
    let mut p = pipeline(fast_opts());
    let id = p.create_layer(&doc, el).unwrap();
    doc.remove_child(doc.body(), el).unwrap();

    let outcome = p.serialize(&doc, id);
    assert_eq!(outcome, SerializeOutcome::default());
}

#[test]
fn serializing_twice_is_idempotent() {
    let mut doc = Document::new();
    let body = doc.body();
    let el = card(&mut doc, body, 0.0, 40.0, 40.0);
    let mut p = pipeline(fast_opts());
    let id = p.create_layer(&doc, el).unwrap();

    let a = p.serialize(&doc, id);
    let b = p.serialize(&doc, id);
    assert!(a.state_key.is_some());
    assert_eq!(a.state_key, b.state_key);
    assert!(a.needs_rasterize);
    assert_eq!(p.surface(id).unwrap().all_state_hashes().len(), 1);
}

#[test]
fn moving_a_layer_keeps_its_state_and_raises_moved() {
    let mut doc = Document::new();
    let body = doc.body();
    let root = card(&mut doc, body, 0.0, 200.0, 200.0);
    let child = card(&mut doc, root, 10.0, 50.0, 50.0);
    let mut p = pipeline(fast_opts());
    p.create_layer(&doc, root).unwrap();
    assert!(p.run_until_idle(&mut doc, SETTLE));
    let cid = p.surfaces().surface_for_element(child).unwrap();
    let before = p.surface(cid).unwrap().current_state_key();
    let attempts = p.stats().raster_attempts;
    p.drain_events();

    doc.update_style(child, |s| s.border_box.left = 60.0).unwrap();
    assert!(p.run_until_idle(&mut doc, SETTLE));

    assert_eq!(p.surface(cid).unwrap().current_state_key(), before);
    let events = p.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        LayerEvent::Moved { surface, bounds } if *surface == cid && bounds.left == 60.0
    )));
    // The parent's placeholder moved with the child.
    assert!(p.stats().raster_attempts > attempts);
}

#[test]
fn rasterize_queue_respects_its_cap() {
    let mut doc = Document::new();
    let body = doc.body();
    let root = card(&mut doc, body, 0.0, 400.0, 400.0);
    for i in 0..6 {
        card(&mut doc, root, 0.0, 10.0 + f64::from(i), 10.0);
    }
    let mut p = pipeline(PipelineOpts {
        max_serialize_tasks: 2,
        max_rasterize_tasks: 2,
        ..fast_opts()
    });
    p.create_layer(&doc, root).unwrap();
    assert!(p.run_until_idle(&mut doc, SETTLE));

    let stats = p.stats();
    assert_eq!(stats.serialize_queue.max_in_flight, 2);
    assert_eq!(stats.raster_queue.max_in_flight, 2);
    assert_eq!(stats.raster_queue.completed, 7);
    assert!(stats.max_compress_in_flight <= 1);
}

#[test]
fn pseudo_state_change_produces_a_new_state() {
    let mut doc = Document::new();
    let body = doc.body();
    let el = card(&mut doc, body, 0.0, 32.0, 32.0);
    let mut p = pipeline(fast_opts());
    let id = p.create_layer(&doc, el).unwrap();
    assert!(p.run_until_idle(&mut doc, SETTLE));
    let first = p.surface(id).unwrap().current_state_key();

    assert!(p.set_pseudo_state(
        id,
        PseudoState {
            hover: true,
            ..PseudoState::default()
        }
    ));
    assert!(p.run_until_idle(&mut doc, SETTLE));
    let s = p.surface(id).unwrap();
    assert_ne!(s.current_state_key(), first);
    assert_eq!(s.previous_state_key(), first);
    assert_eq!(s.all_state_hashes().len(), 2);
}

#[test]
fn stylesheet_load_marks_every_layer_dirty() {
    let mut doc = Document::new();
    doc.add_stylesheet("theme.css");
    let body = doc.body();
    let el = card(&mut doc, body, 0.0, 32.0, 32.0);
    let mut p = pipeline(fast_opts());
    let id = p.create_layer(&doc, el).unwrap();
    assert!(p.run_until_idle(&mut doc, SETTLE));
    let first = p.surface(id).unwrap().current_state_key();

    doc.finish_stylesheet("theme.css", "rect { fill: #00ff00; }").unwrap();
    p.tick(&mut doc);
    assert_ne!(p.surface(id).unwrap().desired_state_key(), first);
}

#[test]
fn close_store_flushes_pending_rows() {
    let mut doc = Document::new();
    let body = doc.body();
    let el = card(&mut doc, body, 0.0, 32.0, 32.0);
    let mut p = pipeline(fast_opts());
    let id = p.create_layer(&doc, el).unwrap();
    assert!(p.run_until_idle(&mut doc, SETTLE));
    let key = p.surface(id).unwrap().current_state_key().unwrap();

    assert!(p.cache().has_pending_writes());
    p.save().unwrap();
    assert!(p.cache().backend().state_hashes().unwrap().contains(&key));
    p.close_store().unwrap();
    assert!(p.save().is_ok());
    assert!(p.export_snapshot(None).is_err());
}

#[test]
fn placeholder_behind_a_wrapper_keeps_the_parent_state() {
    let mut doc = Document::new();
    let body = doc.body();
    let parent = card(&mut doc, body, 0.0, 100.0, 100.0);
    let wrapper = doc.create_element(
        "div",
        BoxStyle {
            border_box: Bounds::new(10.0, 10.0, 50.0, 50.0),
            ..BoxStyle::default()
        },
    );
    doc.append_child(parent, wrapper).unwrap();
    let child = doc.create_element(
        "div",
        BoxStyle {
            border_box: Bounds::new(20.0, 20.0, 10.0, 10.0),
            ..BoxStyle::default()
        },
    );
    doc.set_attribute(child, LAYER_ATTR, "").unwrap();
    doc.append_child(wrapper, child).unwrap();

    let mut p = pipeline(fast_opts());
    let pid = p.create_layer(&doc, parent).unwrap();
    let cid = p.surfaces().surface_for_element(child).unwrap();

    let before = p.serialize(&doc, pid).state_key;
    assert!(p.serialize(&doc, cid).state_key.is_some());
    let after = p.serialize(&doc, pid).state_key;
    assert!(before.is_some());
    assert_eq!(before, after);
}

/// Paints every snapshot with the same pixels.
struct Flat;

impl Rasterizer for Flat {
    fn rasterize(&mut self, snapshot: &Snapshot, proxy_size: u32) -> LayerResult<RasterOutput> {
        Ok(RasterOutput {
            image: image::RgbaImage::from_pixel(
                snapshot.texture_width,
                snapshot.texture_height,
                image::Rgba([9, 9, 9, 255]),
            ),
            proxy: vec![9; (proxy_size * proxy_size * 4) as usize],
            proxy_size,
        })
    }
}

#[test]
fn deduplicated_state_row_is_autosaved() {
    let opts = PipelineOpts {
        autosave_debounce_ms: 5,
        ..fast_opts()
    };
    let mut p = LayerPipeline::with_parts(
        opts,
        Box::new(MemoryStore::new()),
        Box::new(Flat),
        Arc::new(Bc3Encoder),
    )
    .unwrap();
    let mut doc = Document::new();
    let body = doc.body();
    let a = card(&mut doc, body, 0.0, 32.0, 32.0);
    let label = doc.create_text("A");
    doc.append_child(a, label).unwrap();
    let aid = p.create_layer(&doc, a).unwrap();
    assert!(p.run_until_idle(&mut doc, SETTLE));
    p.save().unwrap();
    let shared = p.current_layer_state(aid).unwrap().texture;

    let body = doc.body();
    let b = card(&mut doc, body, 50.0, 32.0, 32.0);
    let label = doc.create_text("B");
    doc.append_child(b, label).unwrap();
    let bid = p.create_layer(&doc, b).unwrap();
    assert!(p.run_until_idle(&mut doc, SETTLE));
    let key = p.surface(bid).unwrap().current_state_key().unwrap();
    assert_ne!(Some(key), p.surface(aid).unwrap().current_state_key());
    assert_eq!(p.current_layer_state(bid).unwrap().texture, shared);

    p.tick_at(&mut doc, Instant::now() + Duration::from_millis(50));
    assert!(!p.cache().has_pending_writes());
    assert!(p.cache().backend().state_hashes().unwrap().contains(&key));
}
