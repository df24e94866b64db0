//! Cooperative driver of the serialize → rasterize → compress → persist pipeline.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::document::tree::{Document, NodeId};
use crate::foundation::error::LayerResult;
use crate::layer::state::{CompressStatus, LayerState, TextureState};
use crate::layer::surface::{PseudoState, Surface, SurfaceId};
use crate::layer::tree::{LayerEvent, SurfaceTree};
use crate::pipeline::compress::{compress_texture, finish_compress};
use crate::pipeline::opts::PipelineOpts;
use crate::pipeline::rasterize::{RasterJob, RasterStep, rasterize_state};
use crate::pipeline::scheduler::{QueueMarks, TaskQueue};
use crate::pipeline::serialize::{SerializeOutcome, serialize_surface};
use crate::raster::rasterizer::{Rasterizer, SvgRasterizer};
use crate::raster::worker::{Bc3Encoder, CompressPool, EncodeResponse, TextureEncoder};
use crate::snapshot::fingerprint::{StateHash, TextureHash};
use crate::snapshot::markup::Snapshot;
use crate::store::backend::StoreBackend;
use crate::store::cache::{ImportSummary, TextureCache};

const IDLE_POLL: Duration = Duration::from_millis(2);

/// Counters exposed for observation and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Serialize calls that produced a state key.
    pub serializations: u64,
    /// Rasterize attempts, successful or not.
    pub raster_attempts: u64,
    /// Attempts rescheduled for later.
    pub retries: u64,
    /// Jobs abandoned after repeated decode failures.
    pub failed_jobs: u64,
    /// Textures handed to the encoder pool.
    pub compressions: u64,
    /// Encoder failures.
    pub compress_failures: u64,
    /// `Painted` events raised.
    pub paints: u64,
    /// Serialize queue peaks.
    pub serialize_queue: QueueMarks,
    /// Rasterize queue peaks.
    pub raster_queue: QueueMarks,
    /// Largest number of requests held by encoder workers at once.
    pub max_compress_in_flight: usize,
}

/// Work done by one [`LayerPipeline::tick_at`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Surfaces serialized.
    pub serialized: usize,
    /// Rasterize attempts run.
    pub rasterized: usize,
    /// Encoder responses applied.
    pub compressed: usize,
    /// Surfaces whose current state advanced.
    pub painted: usize,
}

/// Owns the surface tree, the texture cache and the stage workers.
pub struct LayerPipeline {
    opts: PipelineOpts,
    surfaces: SurfaceTree,
    cache: TextureCache,
    rasterizer: Box<dyn Rasterizer>,
    pool: CompressPool,
    serialize_queue: TaskQueue<SurfaceId>,
    raster_queue: TaskQueue<StateHash>,
    raster_inputs: HashMap<StateHash, Snapshot>,
    raster_jobs: HashMap<StateHash, RasterJob>,
    stats: PipelineStats,
}

impl std::fmt::Debug for LayerPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerPipeline")
            .field("surfaces", &self.surfaces.len())
            .field("cache", &self.cache)
            .field("pool", &self.pool)
            .field("raster_jobs", &self.raster_jobs.len())
            .finish()
    }
}

impl LayerPipeline {
    /// Pipeline with the SVG rasterizer and the BC3 encoder.
    pub fn new(opts: PipelineOpts, backend: Box<dyn StoreBackend>) -> LayerResult<Self> {
        Self::with_parts(
            opts,
            backend,
            Box::new(SvgRasterizer::default()),
            Arc::new(Bc3Encoder),
        )
    }

    /// Pipeline with caller-supplied rasterizer and encoder.
    pub fn with_parts(
        opts: PipelineOpts,
        backend: Box<dyn StoreBackend>,
        rasterizer: Box<dyn Rasterizer>,
        encoder: Arc<dyn TextureEncoder>,
    ) -> LayerResult<Self> {
        opts.validate()?;
        let pool = CompressPool::new(opts.compress_workers, encoder)?;
        Ok(Self {
            cache: TextureCache::new(backend, opts.autosave_debounce()),
            serialize_queue: TaskQueue::new(opts.max_serialize_tasks),
            raster_queue: TaskQueue::new(opts.max_rasterize_tasks),
            surfaces: SurfaceTree::new(),
            rasterizer,
            pool,
            raster_inputs: HashMap::new(),
            raster_jobs: HashMap::new(),
            stats: PipelineStats::default(),
            opts,
        })
    }

    /// Active options.
    pub fn opts(&self) -> &PipelineOpts {
        &self.opts
    }

    /// Start tracking `el` (and its nested boundaries) as a layer.
    pub fn create_layer(&mut self, doc: &Document, el: NodeId) -> LayerResult<SurfaceId> {
        self.surfaces.create_root(doc, el)
    }

    /// The surface tree.
    pub fn surfaces(&self) -> &SurfaceTree {
        &self.surfaces
    }

    /// Resolve a surface handle.
    pub fn surface(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(id)
    }

    /// The hot cache and its persistent tier.
    pub fn cache(&self) -> &TextureCache {
        &self.cache
    }

    /// Request an interaction state; the surface is re-serialized on the next tick.
    pub fn set_pseudo_state(&mut self, id: SurfaceId, pseudo: PseudoState) -> bool {
        self.surfaces.set_pseudo_state(id, pseudo)
    }

    /// Flag a surface for re-serialization on the next tick.
    pub fn request_refresh(&mut self, id: SurfaceId) {
        self.surfaces.mark_dirty(id);
    }

    /// Snapshot metadata for `hash`.
    pub fn layer_state(&self, hash: StateHash) -> Option<&LayerState> {
        self.cache.layer_state(hash)
    }

    /// Pixel data for `hash`.
    pub fn texture(&self, hash: TextureHash) -> Option<&TextureState> {
        self.cache.texture(hash)
    }

    /// Layer state currently displayed by `id`.
    pub fn current_layer_state(&self, id: SurfaceId) -> Option<&LayerState> {
        let key = self.surfaces.get(id)?.current_state_key()?;
        self.cache.layer_state(key)
    }

    /// Texture currently displayed by `id`.
    pub fn current_texture(&self, id: SurfaceId) -> Option<&TextureState> {
        let tex = self.current_layer_state(id)?.texture?;
        self.cache.texture(tex)
    }

    /// Serialize one surface immediately, outside the task queue.
    pub fn serialize(&mut self, doc: &Document, id: SurfaceId) -> SerializeOutcome {
        let outcome = serialize_surface(doc, &mut self.surfaces, &mut self.cache, &self.opts, id);
        if outcome.state_key.is_some() {
            self.stats.serializations += 1;
        }
        outcome
    }

    /// Run one rasterize attempt for `hash` right now, outside the task queue.
    pub fn rasterize_now(&mut self, hash: StateHash, snapshot: Snapshot) -> RasterStep {
        let now = Instant::now();
        let mut job = RasterJob::new(snapshot, now);
        self.stats.raster_attempts += 1;
        rasterize_state(
            &mut self.cache,
            self.rasterizer.as_mut(),
            &self.opts,
            hash,
            &mut job,
            now,
        )
    }

    /// Submit the raw canvas of `texture` for compression.
    pub fn compress(&mut self, texture: TextureHash) -> LayerResult<bool> {
        let submitted = compress_texture(&mut self.cache, &mut self.pool, texture)?;
        if submitted {
            self.stats.compressions += 1;
            self.note_pool_load();
        }
        Ok(submitted)
    }

    fn note_pool_load(&mut self) {
        self.stats.max_compress_in_flight = self
            .stats
            .max_compress_in_flight
            .max(self.pool.in_flight());
    }

    /// [`LayerPipeline::tick_at`] with the current time.
    pub fn tick(&mut self, doc: &mut Document) -> TickSummary {
        self.tick_at(doc, Instant::now())
    }

    /// Advance every stage as far as possible without blocking.
    pub fn tick_at(&mut self, doc: &mut Document, now: Instant) -> TickSummary {
        let mut summary = TickSummary::default();

        if !doc.drain_events().is_empty() {
            self.surfaces.mark_all_dirty();
        }
        let records = doc.drain_mutations();
        self.surfaces.apply_mutations(doc, &records);
        for id in self.surfaces.sweep(doc) {
            self.serialize_queue.cancel(id);
        }

        // Deepest first, so parents see fresh placeholder bounds.
        let mut dirty: Vec<(usize, SurfaceId)> = self
            .surfaces
            .iter()
            .filter(|(_, s)| s.needs_refresh())
            .map(|(id, _)| (self.surfaces.depth(id), id))
            .collect();
        dirty.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        for (_, id) in dirty {
            self.serialize_queue.enqueue(id);
        }
        summary.serialized = self.drain_serialize(doc);
        summary.rasterized = self.drain_rasterize(now);
        let responses = self.pool.poll();
        summary.compressed = self.apply_encoder_responses(responses, now);
        summary.painted = self.advance_surfaces();

        if let Some(Ok(rows)) = self.cache.poll_autosave(now)
            && rows > 0
        {
            tracing::debug!(rows, "autosave complete");
        }
        summary
    }

    fn drain_serialize(&mut self, doc: &Document) -> usize {
        let mut done = 0;
        loop {
            let batch = self.serialize_queue.start_batch();
            if batch.is_empty() {
                return done;
            }
            for id in batch {
                let outcome = self.serialize(doc, id);
                self.serialize_queue.complete(id);
                done += 1;
                if let (Some(key), Some(snapshot)) = (outcome.state_key, outcome.raster_input)
                    && !self.raster_queue.contains(&key)
                {
                    self.raster_inputs.insert(key, snapshot);
                    self.raster_queue.enqueue(key);
                }
            }
        }
    }

    fn drain_rasterize(&mut self, now: Instant) -> usize {
        let mut ran = BTreeSet::new();
        loop {
            for key in self.raster_queue.start_batch() {
                match self.raster_inputs.remove(&key) {
                    Some(snapshot) => {
                        self.raster_jobs.insert(key, RasterJob::new(snapshot, now));
                    }
                    None => {
                        self.raster_queue.complete(key);
                    }
                }
            }

            let mut due: Vec<StateHash> = self
                .raster_jobs
                .iter()
                .filter(|(k, job)| job.next_attempt_at <= now && !ran.contains(*k))
                .map(|(k, _)| *k)
                .collect();
            if due.is_empty() {
                return ran.len();
            }
            due.sort();

            for key in due {
                ran.insert(key);
                let Some(job) = self.raster_jobs.get_mut(&key) else {
                    continue;
                };
                self.stats.raster_attempts += 1;
                let step = rasterize_state(
                    &mut self.cache,
                    self.rasterizer.as_mut(),
                    &self.opts,
                    key,
                    job,
                    now,
                );
                match step {
                    RasterStep::Retry(at) => {
                        job.next_attempt_at = at;
                        self.stats.retries += 1;
                    }
                    RasterStep::Finished(texture) => {
                        self.raster_jobs.remove(&key);
                        self.raster_queue.complete(key);
                        self.start_compression(texture);
                    }
                    RasterStep::Failed(_) => {
                        self.raster_jobs.remove(&key);
                        self.raster_queue.complete(key);
                        self.stats.failed_jobs += 1;
                    }
                }
            }
        }
    }

    fn start_compression(&mut self, texture: TextureHash) {
        let idle = self
            .cache
            .texture(texture)
            .is_some_and(|t| t.status == CompressStatus::Idle && t.canvas.is_some());
        if !idle {
            return;
        }
        if let Err(e) = self.compress(texture) {
            tracing::warn!(texture = %texture, error = %e, "compression not started");
        }
    }

    fn apply_encoder_responses(&mut self, responses: Vec<EncodeResponse>, now: Instant) -> usize {
        let n = responses.len();
        for resp in responses {
            let hash = resp.hash;
            if let Err(e) = finish_compress(&mut self.cache, &self.opts, resp, now) {
                self.stats.compress_failures += 1;
                tracing::warn!(texture = %hash, error = %e, "compression failed, keeping raw texture");
            }
        }
        self.note_pool_load();
        n
    }

    /// Move `current` to `desired` wherever the desired state is displayable.
    fn advance_surfaces(&mut self) -> usize {
        let ready: Vec<(SurfaceId, StateHash)> = self
            .surfaces
            .iter()
            .filter_map(|(id, s)| {
                let desired = s.desired_state_key()?;
                if s.current_state_key() == Some(desired) {
                    return None;
                }
                let state = self.cache.layer_state(desired)?;
                let displayable =
                    state.is_zero_area() || state.media || self.cache.has_usable_texture(desired);
                displayable.then_some((id, desired))
            })
            .collect();

        for &(id, state) in &ready {
            if let Some(s) = self.surfaces.get_mut(id) {
                s.previous_state = s.current_state;
                s.current_state = Some(state);
            }
            self.surfaces
                .push_event(LayerEvent::Painted { surface: id, state });
            self.stats.paints += 1;
        }
        ready.len()
    }

    /// Return `true` when no surface is dirty and no job is queued or running.
    pub fn is_idle(&self) -> bool {
        self.serialize_queue.is_idle()
            && self.raster_queue.is_idle()
            && self.raster_jobs.is_empty()
            && self.pool.is_idle()
            && self.surfaces.iter().all(|(_, s)| !s.needs_refresh())
    }

    /// Earliest instant at which a tick has timed work to do.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.raster_jobs
            .values()
            .map(RasterJob::next_attempt_at)
            .chain(self.cache.autosave_deadline())
            .min()
    }

    /// Tick until idle or until `timeout` elapses. Returns whether the pipeline went idle.
    pub fn run_until_idle(&mut self, doc: &mut Document, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.tick(doc);
            if self.is_idle() && !doc.has_pending_changes() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if self.pool.in_flight() > 0 {
                let responses = self.pool.wait(IDLE_POLL);
                self.apply_encoder_responses(responses, Instant::now());
                continue;
            }
            let sleep = self
                .next_wakeup()
                .map_or(IDLE_POLL, |at| at.saturating_duration_since(now))
                .min(IDLE_POLL)
                .min(deadline - now);
            std::thread::sleep(sleep);
        }
    }

    /// Flush buffered rows now; store failures are returned.
    pub fn save(&mut self) -> LayerResult<usize> {
        self.cache.save()
    }

    /// Export `scope` (or every stored state) as an opaque blob.
    pub fn export_snapshot(&mut self, scope: Option<&[StateHash]>) -> LayerResult<Vec<u8>> {
        self.cache.export_snapshot(scope)
    }

    /// Export every state ever produced by the given surfaces.
    pub fn export_layers(&mut self, ids: &[SurfaceId]) -> LayerResult<Vec<u8>> {
        let scope: Vec<StateHash> = ids
            .iter()
            .filter_map(|id| self.surfaces.get(*id))
            .flat_map(|s| s.all_state_hashes().iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.cache.export_snapshot(Some(&scope))
    }

    /// Import an exported blob into the persistent tier.
    pub fn import_snapshot(&mut self, blob: &[u8]) -> LayerResult<ImportSummary> {
        self.cache.import_snapshot(blob)
    }

    /// Take pending layer events.
    pub fn drain_events(&mut self) -> Vec<LayerEvent> {
        self.surfaces.drain_events()
    }

    /// Counters and queue peaks.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            serialize_queue: self.serialize_queue.marks(),
            raster_queue: self.raster_queue.marks(),
            ..self.stats
        }
    }

    /// Flush and close the persistent tier.
    pub fn close_store(&mut self) -> LayerResult<()> {
        self.cache.save()?;
        self.cache.close()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/manager.rs"]
mod tests;
