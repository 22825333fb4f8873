//! rollcall-video — Video acquisition for the attendance client.
//!
//! Provides the `VideoSource`/`VideoProvider` seam, a V4L2 implementation,
//! a deterministic test-pattern source for diagnostics, and RGB frame
//! conversion, downscaling and JPEG encoding.

pub mod frame;
pub mod source;

pub use frame::{downscale_to_width, encode_jpeg, yuyv_to_rgb, FrameError, RgbFrame};
pub use source::{
    AcquisitionError, Constraints, DeviceInfo, TestPatternProvider, TestPatternSource,
    V4lProvider, V4lSource, VideoProvider, VideoSource,
};
