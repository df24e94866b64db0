use std::time::Instant;

use crate::foundation::error::LayerError;
use crate::foundation::math::unit_jitter;
use crate::pipeline::opts::PipelineOpts;
use crate::raster::rasterizer::Rasterizer;
use crate::snapshot::fingerprint::{StateHash, TextureHash, texture_hash};
use crate::snapshot::markup::Snapshot;
use crate::store::cache::{TextureCache, unix_millis};

/// Retry state of one rasterize job, keyed by its `StateHash`.
#[derive(Clone, Debug)]
pub struct RasterJob {
    pub(crate) snapshot: Snapshot,
    pub(crate) next_attempt_at: Instant,
    pub(crate) decode_failures: u32,
}

impl RasterJob {
    pub(crate) fn new(snapshot: Snapshot, now: Instant) -> Self {
        Self {
            snapshot,
            next_attempt_at: now,
            decode_failures: 0,
        }
    }

    /// Earliest time the next attempt may run.
    pub fn next_attempt_at(&self) -> Instant {
        self.next_attempt_at
    }

    /// Decode failures so far.
    pub fn decode_failures(&self) -> u32 {
        self.decode_failures
    }
}

/// What a single rasterize attempt decided.
#[derive(Debug)]
pub enum RasterStep {
    /// Run again at the given instant.
    Retry(Instant),
    /// The texture is final; the `states` row has been staged.
    Finished(TextureHash),
    /// The job gave up; store state is untouched.
    Failed(LayerError),
}

/// Deterministic jitter in `[0, 1)` for `attempt` of `hash`.
pub(crate) fn retry_jitter(hash: StateHash, attempt: u32) -> f64 {
    let lo = hash.0 as u64;
    let hi = (hash.0 >> 64) as u64;
    unit_jitter(lo ^ hi.rotate_left(17) ^ u64::from(attempt))
}

#[tracing::instrument(level = "debug", skip_all, fields(state = %hash))]
pub(crate) fn rasterize_state(
    cache: &mut TextureCache,
    rasterizer: &mut dyn Rasterizer,
    opts: &PipelineOpts,
    hash: StateHash,
    job: &mut RasterJob,
    now: Instant,
) -> RasterStep {
    let out = match rasterizer.rasterize(&job.snapshot, opts.hash_proxy_size) {
        Ok(out) => out,
        Err(e) => {
            job.decode_failures += 1;
            if job.decode_failures >= opts.max_decode_failures {
                tracing::warn!(state = %hash, failures = job.decode_failures, error = %e, "rasterize gave up");
                return RasterStep::Failed(e);
            }
            tracing::debug!(state = %hash, failures = job.decode_failures, error = %e, "rasterize failed, retrying");
            let delay = opts.retry_delay(job.decode_failures, retry_jitter(hash, job.decode_failures));
            return RasterStep::Retry(now + delay);
        }
    };

    let tex = texture_hash(&out.proxy, out.proxy_size, out.proxy_size);
    let state = cache.layer_state_entry(hash);
    let previous = state.texture.filter(|t| *t != tex);
    if state.texture != Some(tex) {
        state.render_attempts = 0;
    }
    state.render_attempts += 1;
    state.texture = Some(tex);
    let attempts = state.render_attempts;

    cache.insert_raw_texture(tex, out.image, unix_millis());
    if let Some(old) = previous {
        cache.release_superseded(old);
    }

    if attempts <= opts.min_render_attempts {
        let delay = opts.retry_delay(attempts, retry_jitter(hash, attempts));
        return RasterStep::Retry(now + delay);
    }
    cache.stage_state(hash, Some(tex), now);
    RasterStep::Finished(tex)
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/rasterize.rs"]
mod tests;
