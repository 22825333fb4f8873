//! Session configuration, loaded from `ROLLCALL_*` environment variables
//! with defaults matching the reference deployment.

use rollcall_video::Constraints;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Recognition service endpoint, `host:port`.
    pub endpoint: String,
    /// Transport handshake timeout.
    pub connect_timeout: Duration,
    /// Sampling tick cadence.
    pub sample_interval: Duration,
    /// Send every Nth sampling tick (1 = every tick).
    pub frame_skip: u32,
    /// Width frames are downsampled to before encoding.
    pub processing_width: u32,
    /// JPEG quality for outbound frames.
    pub jpeg_quality: u8,
    /// Maximum frames in flight (backpressure budget).
    pub max_pending: u32,
    /// Track liveness window.
    pub track_ttl: Duration,
    /// Centroid radius for merging detections into one track.
    pub match_radius_px: f32,
    /// Similarity below this routes a recognition to the below-threshold
    /// tier and keeps it out of the ledger.
    pub similarity_gate: f32,
    /// Overlay snapshot publication cadence.
    pub render_interval: Duration,
    /// Ideal capture parameters.
    pub constraints: Constraints,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:5000".to_string(),
            connect_timeout: Duration::from_millis(5000),
            sample_interval: Duration::from_millis(500),
            frame_skip: 1,
            processing_width: 160,
            jpeg_quality: 60,
            max_pending: 2,
            track_ttl: Duration::from_millis(2000),
            match_radius_px: 30.0,
            similarity_gate: 0.75,
            render_interval: Duration::from_millis(100),
            constraints: Constraints::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from `ROLLCALL_*` environment variables,
    /// falling back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            endpoint: std::env::var("ROLLCALL_ENDPOINT").unwrap_or(d.endpoint),
            connect_timeout: Duration::from_millis(env_u64(
                "ROLLCALL_CONNECT_TIMEOUT_MS",
                d.connect_timeout.as_millis() as u64,
            )),
            sample_interval: Duration::from_millis(env_u64(
                "ROLLCALL_SAMPLE_INTERVAL_MS",
                d.sample_interval.as_millis() as u64,
            )),
            frame_skip: env_u32("ROLLCALL_FRAME_SKIP", d.frame_skip).max(1),
            processing_width: env_u32("ROLLCALL_PROCESSING_WIDTH", d.processing_width),
            jpeg_quality: env_u32("ROLLCALL_JPEG_QUALITY", d.jpeg_quality as u32)
                .clamp(1, 100) as u8,
            max_pending: env_u32("ROLLCALL_MAX_PENDING", d.max_pending),
            track_ttl: Duration::from_millis(env_u64(
                "ROLLCALL_TRACK_TTL_MS",
                d.track_ttl.as_millis() as u64,
            )),
            match_radius_px: env_f32("ROLLCALL_MATCH_RADIUS_PX", d.match_radius_px),
            similarity_gate: env_f32("ROLLCALL_SIMILARITY_GATE", d.similarity_gate),
            render_interval: Duration::from_millis(env_u64(
                "ROLLCALL_RENDER_INTERVAL_MS",
                d.render_interval.as_millis() as u64,
            )),
            constraints: Constraints {
                width: env_u32("ROLLCALL_CAPTURE_WIDTH", d.constraints.width),
                height: env_u32("ROLLCALL_CAPTURE_HEIGHT", d.constraints.height),
                frame_rate: env_u32("ROLLCALL_CAPTURE_FPS", d.constraints.frame_rate),
            },
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
