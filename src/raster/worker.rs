//! Fixed-size pool of texture encoder threads.
//!
//! Requests travel over a bounded channel sized to the pool; work beyond that waits in a
//! FIFO on the caller's side so that each worker holds at most one request.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use image::RgbaImage;

use crate::foundation::error::{LayerError, LayerResult};
use crate::raster::codec::encode_bc3;
use crate::snapshot::fingerprint::TextureHash;

/// Largest supported pool size.
pub const MAX_COMPRESS_WORKERS: usize = 4;

/// Turns a raw bitmap into a compressed texture container.
pub trait TextureEncoder: Send + Sync {
    /// Encode `image`; the output must parse with
    /// [`CompressedTexture::from_bytes`](crate::CompressedTexture::from_bytes).
    fn encode(&self, image: &RgbaImage) -> LayerResult<Vec<u8>>;
}

/// Default encoder producing BC3 blocks.
#[derive(Clone, Copy, Debug, Default)]
pub struct Bc3Encoder;

impl TextureEncoder for Bc3Encoder {
    fn encode(&self, image: &RgbaImage) -> LayerResult<Vec<u8>> {
        Ok(encode_bc3(image)?.to_bytes())
    }
}

/// Work item sent to an encoder thread.
#[derive(Clone, Debug)]
pub struct EncodeRequest {
    /// Texture being compressed.
    pub hash: TextureHash,
    /// Shared raw pixels; never copied on the way to the worker.
    pub pixels: Arc<RgbaImage>,
}

/// Result returned by an encoder thread.
#[derive(Debug)]
pub struct EncodeResponse {
    /// Texture that was compressed.
    pub hash: TextureHash,
    /// Container bytes or the encoder failure.
    pub result: LayerResult<Vec<u8>>,
}

/// Encoder worker threads plus the overflow queue feeding them.
pub struct CompressPool {
    tx: Option<Sender<EncodeRequest>>,
    done: Receiver<EncodeResponse>,
    workers: Vec<JoinHandle<()>>,
    pending: VecDeque<EncodeRequest>,
    undeliverable: Vec<EncodeResponse>,
    in_flight: usize,
    size: usize,
}

impl std::fmt::Debug for CompressPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressPool")
            .field("size", &self.size)
            .field("in_flight", &self.in_flight)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl CompressPool {
    /// Start `size` worker threads sharing `encoder`.
    pub fn new(size: usize, encoder: Arc<dyn TextureEncoder>) -> LayerResult<Self> {
        if !(1..=MAX_COMPRESS_WORKERS).contains(&size) {
            return Err(LayerError::validation(format!(
                "compress pool size must be in 1..={MAX_COMPRESS_WORKERS}, got {size}"
            )));
        }
        let (tx, rx) = channel::bounded::<EncodeRequest>(size);
        let (done_tx, done) = channel::unbounded::<EncodeResponse>();

        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let rx = rx.clone();
            let done_tx = done_tx.clone();
            let encoder = Arc::clone(&encoder);
            let handle = std::thread::Builder::new()
                .name(format!("layertex-encode-{i}"))
                .spawn(move || encode_loop(&rx, &done_tx, encoder.as_ref()))
                .context("spawn texture encoder thread")?;
            workers.push(handle);
        }

        Ok(Self {
            tx: Some(tx),
            done,
            workers,
            pending: VecDeque::new(),
            undeliverable: Vec::new(),
            in_flight: 0,
            size,
        })
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Requests currently held by workers.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Requests waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    /// Return `true` when no request is queued or running.
    pub fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.pending.is_empty() && self.undeliverable.is_empty()
    }

    /// Queue a request; it is handed to a worker as soon as one is free.
    pub fn submit(&mut self, req: EncodeRequest) {
        self.pending.push_back(req);
        self.dispatch();
    }

    fn dispatch(&mut self) {
        while self.in_flight < self.size {
            let Some(req) = self.pending.pop_front() else {
                return;
            };
            let Some(tx) = self.tx.as_ref() else {
                self.fail_closed(req);
                continue;
            };
            match tx.try_send(req) {
                Ok(()) => self.in_flight += 1,
                Err(TrySendError::Full(req)) => {
                    self.pending.push_front(req);
                    return;
                }
                Err(TrySendError::Disconnected(req)) => self.fail_closed(req),
            }
        }
    }

    fn fail_closed(&mut self, req: EncodeRequest) {
        self.undeliverable.push(EncodeResponse {
            hash: req.hash,
            result: Err(LayerError::encode("encoder pool is shut down")),
        });
    }

    /// Collect finished responses without blocking.
    pub fn poll(&mut self) -> Vec<EncodeResponse> {
        let mut out = std::mem::take(&mut self.undeliverable);
        while let Ok(resp) = self.done.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            out.push(resp);
        }
        self.dispatch();
        out
    }

    /// Block up to `timeout` for at least one response, then collect what is ready.
    pub fn wait(&mut self, timeout: Duration) -> Vec<EncodeResponse> {
        if self.in_flight > 0 && self.undeliverable.is_empty() {
            match self.done.recv_timeout(timeout) {
                Ok(resp) => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    let mut out = vec![resp];
                    out.extend(self.poll());
                    return out;
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {}
            }
        }
        self.poll()
    }
}

impl Drop for CompressPool {
    fn drop(&mut self) {
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn encode_loop(
    rx: &Receiver<EncodeRequest>,
    done: &Sender<EncodeResponse>,
    encoder: &dyn TextureEncoder,
) {
    for req in rx.iter() {
        let result = catch_unwind(AssertUnwindSafe(|| encoder.encode(&req.pixels)))
            .unwrap_or_else(|_| Err(LayerError::encode("encoder panicked")));
        if let Err(e) = &result {
            tracing::warn!(texture = %req.hash, error = %e, "texture encode failed");
        }
        if done
            .send(EncodeResponse {
                hash: req.hash,
                result,
            })
            .is_err()
        {
            return;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/raster/worker.rs"]
mod tests;
