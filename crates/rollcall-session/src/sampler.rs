//! Paced frame sampler on a dedicated capture thread.
//!
//! V4L2 capture blocks, so sampling runs on its own OS thread and feeds
//! the async session through channels. Every tick captures a frame and
//! publishes it to the preview channel (the overlay refreshes regardless
//! of sends); the frame is only downscaled, encoded and sent when the
//! frame-skip policy and the backpressure budget both allow it. A
//! saturated budget drops the frame at the source; stale frames are
//! worthless for a live view.

use crate::budget::FrameBudget;
use rollcall_video::{downscale_to_width, encode_jpeg, FrameError, RgbFrame, VideoSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy)]
pub struct SamplerConfig {
    /// Wall-clock cadence of capture ticks.
    pub interval: Duration,
    /// Send every Nth tick (1 = every tick). Load shedding only; the
    /// preview still refreshes on skipped ticks.
    pub frame_skip: u32,
    /// Fixed small width frames are downsampled to before encoding.
    pub processing_width: u32,
    /// JPEG quality, 1–100.
    pub jpeg_quality: u8,
}

/// A frame ready for the wire.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

/// Owning handle to the sampler thread.
pub struct SamplerHandle {
    stop: Arc<AtomicBool>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl SamplerHandle {
    /// Stop the sampling loop and wait for the thread to release the video
    /// source. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the sampler thread. Frames flow into `frames`; the latest
/// full-resolution capture is always available on `preview`.
pub fn start_sampling(
    mut source: Box<dyn VideoSource>,
    cfg: SamplerConfig,
    budget: Arc<FrameBudget>,
    frames: mpsc::Sender<EncodedFrame>,
    preview: Arc<watch::Sender<Option<RgbFrame>>>,
) -> SamplerHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();

    let join = std::thread::Builder::new()
        .name("rollcall-sampler".into())
        .spawn(move || {
            tracing::debug!(
                interval_ms = cfg.interval.as_millis() as u64,
                processing_width = cfg.processing_width,
                "sampler thread started"
            );
            let mut tick: u64 = 0;
            let mut next = Instant::now();

            while !flag.load(Ordering::Relaxed) {
                tick += 1;
                match source.capture() {
                    Ok(frame) => {
                        let _ = preview.send(Some(frame.clone()));

                        let due = cfg.frame_skip <= 1 || tick % cfg.frame_skip as u64 == 0;
                        if due {
                            if budget.try_acquire() {
                                match encode(&frame, &cfg) {
                                    Ok(encoded) => {
                                        if frames.blocking_send(encoded).is_err() {
                                            budget.release();
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        budget.release();
                                        tracing::warn!(error = %e, "frame encode failed; dropped");
                                    }
                                }
                            } else {
                                tracing::trace!("frame budget saturated; frame dropped");
                            }
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "capture failed; skipping tick"),
                }

                next += cfg.interval;
                match next.checked_duration_since(Instant::now()) {
                    Some(wait) => std::thread::sleep(wait),
                    // A slow capture ate the whole interval; resync instead
                    // of bursting to catch up.
                    None => next = Instant::now(),
                }
            }

            source.release();
            tracing::debug!(ticks = tick, "sampler thread exiting");
        })
        .expect("failed to spawn sampler thread");

    SamplerHandle {
        stop,
        join: Some(join),
    }
}

fn encode(frame: &RgbFrame, cfg: &SamplerConfig) -> Result<EncodedFrame, FrameError> {
    let small = downscale_to_width(frame, cfg.processing_width)?;
    let jpeg = encode_jpeg(&small, cfg.jpeg_quality)?;
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    Ok(EncodedFrame {
        jpeg,
        width: small.width,
        height: small.height,
        timestamp_ms,
    })
}
