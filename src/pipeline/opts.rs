use std::path::Path;
use std::time::Duration;

use anyhow::Context;

use crate::foundation::error::{LayerError, LayerResult};
use crate::raster::worker::MAX_COMPRESS_WORKERS;

/// Tuning knobs of a [`LayerPipeline`](crate::LayerPipeline).
///
/// Every field has a default, so a JSON file only needs the keys it overrides.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineOpts {
    /// Serialize tasks allowed in flight.
    pub max_serialize_tasks: usize,
    /// Rasterize jobs allowed in flight (including jobs waiting for a retry).
    pub max_rasterize_tasks: usize,
    /// Re-renders after the texture content last changed before a state is final.
    pub min_render_attempts: u32,
    /// Snapshot decode failures tolerated per job.
    pub max_decode_failures: u32,
    /// Linear backoff step per attempt.
    pub retry_base_ms: u64,
    /// Upper bound of the deterministic jitter added to each retry.
    pub retry_jitter_ms: u64,
    /// Encoder threads.
    pub compress_workers: usize,
    /// Quiet period after the latest compression before buffered rows are flushed.
    pub autosave_debounce_ms: u64,
    /// Device pixels per CSS pixel.
    pub pixel_ratio: f64,
    /// Edge of the low-resolution render hashed into a `TextureHash`.
    pub hash_proxy_size: u32,
    /// Smallest texture edge (power of two).
    pub min_texture_size: u32,
    /// Largest texture edge (power of two).
    pub max_texture_size: u32,
    /// Keep the raw bitmap after its compressed form exists.
    pub retain_raw_after_compress: bool,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            max_serialize_tasks: 10,
            max_rasterize_tasks: 10,
            min_render_attempts: 3,
            max_decode_failures: 4,
            retry_base_ms: 10,
            retry_jitter_ms: 20,
            compress_workers: 2,
            autosave_debounce_ms: 1000,
            pixel_ratio: 1.0,
            hash_proxy_size: 30,
            min_texture_size: 32,
            max_texture_size: 4096,
            retain_raw_after_compress: false,
        }
    }
}

impl PipelineOpts {
    /// Reject options the pipeline cannot run with.
    pub fn validate(&self) -> LayerResult<()> {
        if self.max_serialize_tasks == 0 || self.max_rasterize_tasks == 0 {
            return Err(LayerError::validation("task caps must be > 0"));
        }
        if !(1..=MAX_COMPRESS_WORKERS).contains(&self.compress_workers) {
            return Err(LayerError::validation(format!(
                "compress_workers must be in 1..={MAX_COMPRESS_WORKERS}"
            )));
        }
        if !self.pixel_ratio.is_finite() || self.pixel_ratio <= 0.0 {
            return Err(LayerError::validation("pixel_ratio must be finite and > 0"));
        }
        if self.hash_proxy_size == 0 {
            return Err(LayerError::validation("hash_proxy_size must be > 0"));
        }
        for (name, v) in [
            ("min_texture_size", self.min_texture_size),
            ("max_texture_size", self.max_texture_size),
        ] {
            if !v.is_power_of_two() {
                return Err(LayerError::validation(format!(
                    "{name} must be a power of two, got {v}"
                )));
            }
        }
        if self.min_texture_size > self.max_texture_size {
            return Err(LayerError::validation(
                "min_texture_size must not exceed max_texture_size",
            ));
        }
        Ok(())
    }

    /// Load and validate options from a JSON file.
    pub fn from_json_file(path: &Path) -> LayerResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read pipeline options '{}'", path.display()))?;
        let opts: Self = serde_json::from_str(&text)
            .map_err(|e| LayerError::serde(format!("{}: {e}", path.display())))?;
        opts.validate()?;
        Ok(opts)
    }

    pub(crate) fn retry_delay(&self, attempts: u32, jitter: f64) -> Duration {
        let base = self.retry_base_ms.saturating_mul(u64::from(attempts));
        Duration::from_millis(base) + Duration::from_secs_f64(self.retry_jitter_ms as f64 * jitter / 1000.0)
    }

    pub(crate) fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }
}
