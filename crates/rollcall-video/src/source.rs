//! Video source abstraction and implementations.
//!
//! `VideoSource` is the capture seam: the sampler pulls frames through it
//! without knowing whether they come from a V4L2 device or a synthetic
//! test pattern. Acquisition failures are recoverable; the session simply
//! never starts.

use crate::frame::{self, RgbFrame};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("video capture not supported by device")]
    CaptureNotSupported,
}

/// Ideal capture parameters. The device may negotiate something close.
#[derive(Debug, Clone, Copy)]
pub struct Constraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            frame_rate: 30,
        }
    }
}

/// A live, exclusive video feed.
pub trait VideoSource: Send {
    /// Negotiated capture resolution.
    fn intrinsic_size(&self) -> (u32, u32);
    /// Capture the current frame. Blocking; called from the sampler thread.
    fn capture(&mut self) -> Result<RgbFrame, AcquisitionError>;
    /// Release the underlying device. Called once when sampling stops.
    fn release(&mut self) {}
}

/// Factory for video sources. Failure to acquire is recoverable.
pub trait VideoProvider: Send + Sync {
    fn acquire(&self, constraints: &Constraints) -> Result<Box<dyn VideoSource>, AcquisitionError>;
}

/// Info about a discovered V4L2 capture device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
}

/// V4L2 camera source. Negotiates YUYV at the requested resolution and
/// converts to RGB on capture.
pub struct V4lSource {
    device: Device,
    width: u32,
    height: u32,
}

impl V4lSource {
    pub fn open(device_path: &str, constraints: &Constraints) -> Result<Self, AcquisitionError> {
        if !Path::new(device_path).exists() {
            return Err(AcquisitionError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                AcquisitionError::DeviceBusy
            } else {
                AcquisitionError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            AcquisitionError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(AcquisitionError::CaptureNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            AcquisitionError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = constraints.width;
        fmt.height = constraints.height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            AcquisitionError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;
        if negotiated.fourcc != FourCC::new(b"YUYV") {
            return Err(AcquisitionError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV)",
                negotiated.fourcc
            )));
        }

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            "opened camera"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
        })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();
        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
            });
        }
        devices
    }
}

impl VideoSource for V4lSource {
    fn intrinsic_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn capture(&mut self) -> Result<RgbFrame, AcquisitionError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4)
            .map_err(|e| {
                AcquisitionError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;

        let (buf, _meta) = stream.next().map_err(|e| {
            AcquisitionError::CaptureFailed(format!("failed to dequeue buffer: {e}"))
        })?;

        let rgb = frame::yuyv_to_rgb(buf, self.width, self.height)
            .map_err(|e| AcquisitionError::CaptureFailed(format!("YUYV conversion: {e}")))?;

        Ok(RgbFrame {
            data: rgb,
            width: self.width,
            height: self.height,
        })
    }
}

/// Provider opening a fixed V4L2 device path per session.
pub struct V4lProvider {
    pub device_path: String,
}

impl VideoProvider for V4lProvider {
    fn acquire(&self, constraints: &Constraints) -> Result<Box<dyn VideoSource>, AcquisitionError> {
        Ok(Box::new(V4lSource::open(&self.device_path, constraints)?))
    }
}

/// Deterministic moving-gradient source for diagnostics and tests.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    tick: u32,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: 0,
        }
    }
}

impl VideoSource for TestPatternSource {
    fn intrinsic_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn capture(&mut self) -> Result<RgbFrame, AcquisitionError> {
        self.tick = self.tick.wrapping_add(1);
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                data.push(((x + self.tick) % 256) as u8);
                data.push((y % 256) as u8);
                data.push((self.tick % 256) as u8);
            }
        }
        Ok(RgbFrame {
            data,
            width: self.width,
            height: self.height,
        })
    }
}

/// Provider handing out fresh test-pattern sources.
pub struct TestPatternProvider;

impl VideoProvider for TestPatternProvider {
    fn acquire(&self, constraints: &Constraints) -> Result<Box<dyn VideoSource>, AcquisitionError> {
        Ok(Box::new(TestPatternSource::new(
            constraints.width,
            constraints.height,
        )))
    }
}
