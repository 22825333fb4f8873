//! RGB frame type, YUYV conversion, downscaling and JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, RgbImage};

/// A captured RGB8 camera frame.
#[derive(Clone)]
pub struct RgbFrame {
    /// Packed RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RgbFrame {
    /// View the frame as an `image` buffer. Fails only if the data length
    /// does not match the dimensions.
    pub fn to_image(&self) -> Result<RgbImage, FrameError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            FrameError::InvalidLength {
                expected: (self.width * self.height * 3) as usize,
                actual: self.data.len(),
            },
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("jpeg encoding failed: {0}")]
    EncodeFailed(#[from] image::ImageError),
}

/// Convert packed YUYV (4:2:2) to RGB8 using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share
/// the U/V pair.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        push_yuv_pixel(&mut rgb, y0, u, v);
        push_yuv_pixel(&mut rgb, y1, u, v);
    }
    Ok(rgb)
}

fn push_yuv_pixel(rgb: &mut Vec<u8>, y: u8, u: u8, v: u8) {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;
    rgb.push(r.clamp(0.0, 255.0) as u8);
    rgb.push(g.clamp(0.0, 255.0) as u8);
    rgb.push(b.clamp(0.0, 255.0) as u8);
}

/// Resize a frame to a fixed small width, preserving aspect ratio.
pub fn downscale_to_width(frame: &RgbFrame, target_width: u32) -> Result<RgbFrame, FrameError> {
    let img = frame.to_image()?;
    let target_height =
        ((frame.height as u64 * target_width as u64) / frame.width.max(1) as u64).max(1) as u32;
    let resized = image::imageops::resize(&img, target_width, target_height, FilterType::Triangle);
    Ok(RgbFrame {
        data: resized.into_raw(),
        width: target_width,
        height: target_height,
    })
}

/// Encode a frame as JPEG at the given quality (1–100).
pub fn encode_jpeg(frame: &RgbFrame, quality: u8) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder.encode(
        &frame.data,
        frame.width,
        frame.height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_to_rgb_gray_pixel() {
        // Y=128, U=V=128 (no chroma) → mid gray for both pixels.
        let yuyv = vec![128, 128, 128, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.len(), 6);
        for c in rgb {
            assert!((c as i32 - 128).abs() <= 1, "expected ~128, got {c}");
        }
    }

    #[test]
    fn test_yuyv_to_rgb_red_cast() {
        // Strong V pushes red up and green down.
        let yuyv = vec![128, 128, 128, 255];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert!(rgb[0] > 200, "red should dominate, got {}", rgb[0]);
        assert!(rgb[1] < 80, "green should drop, got {}", rgb[1]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_rgb(&[0, 0], 2, 1).is_err());
    }

    #[test]
    fn test_downscale_preserves_aspect() {
        let frame = RgbFrame {
            data: vec![0u8; 640 * 480 * 3],
            width: 640,
            height: 480,
        };
        let small = downscale_to_width(&frame, 160).unwrap();
        assert_eq!(small.width, 160);
        assert_eq!(small.height, 120);
        assert_eq!(small.data.len(), 160 * 120 * 3);
    }

    #[test]
    fn test_encode_jpeg_magic_bytes() {
        let frame = RgbFrame {
            data: vec![90u8; 32 * 24 * 3],
            width: 32,
            height: 24,
        };
        let jpeg = encode_jpeg(&frame, 60).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "missing JPEG SOI marker");
    }

    #[test]
    fn test_to_image_rejects_bad_length() {
        let frame = RgbFrame {
            data: vec![0u8; 10],
            width: 4,
            height: 4,
        };
        assert!(frame.to_image().is_err());
    }
}
