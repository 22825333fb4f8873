//! Overlay layout and painting.
//!
//! Maps track bounding boxes from processing-resolution pixels up to the
//! display canvas in two stages: processing → intrinsic video resolution
//! (uniform scale, the sampler preserves aspect), then video → canvas via
//! the letterbox transform (uniform fit scale plus a centering offset on
//! whichever axis has slack). Layout is a pure function of its inputs;
//! painting draws onto any RGB canvas.

use crate::tracker::Track;
use crate::types::Tier;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const COLOR_RECOGNIZED: Rgb<u8> = Rgb([46, 204, 113]);
const COLOR_BELOW_THRESHOLD: Rgb<u8> = Rgb([255, 191, 0]);
const COLOR_UNRECOGNIZED: Rgb<u8> = Rgb([231, 76, 60]);

/// Approximate text metrics used to size the label background.
const LABEL_CHAR_W: f32 = 8.0;
const LABEL_H: f32 = 18.0;

/// Uniform scale-plus-offset mapping that fits a fixed-aspect video into a
/// differently-shaped canvas without distortion.
#[derive(Debug, Clone, Copy)]
pub struct LetterboxTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl LetterboxTransform {
    pub fn new(video: (u32, u32), canvas: (u32, u32)) -> Self {
        let (vw, vh) = (video.0 as f32, video.1 as f32);
        let (cw, ch) = (canvas.0 as f32, canvas.1 as f32);
        let scale = (cw / vw).min(ch / vh);
        Self {
            scale,
            offset_x: (cw - vw * scale) / 2.0,
            offset_y: (ch - vh * scale) / 2.0,
        }
    }

    /// Map a point from video coordinates into canvas coordinates.
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale + self.offset_x, y * self.scale + self.offset_y)
    }
}

/// One track, fully laid out in canvas coordinates.
#[derive(Debug, Clone)]
pub struct OverlayBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub color: Rgb<u8>,
    /// Label text (name, plus similarity percentage when known).
    pub label: String,
    /// Filled background rect for the label, clamped fully on-canvas.
    pub label_x: f32,
    pub label_y: f32,
    pub label_w: f32,
    pub label_h: f32,
}

fn tier_color(tier: Tier) -> Rgb<u8> {
    match tier {
        Tier::Recognized => COLOR_RECOGNIZED,
        Tier::BelowThreshold => COLOR_BELOW_THRESHOLD,
        Tier::Unrecognized => COLOR_UNRECOGNIZED,
    }
}

fn label_text(track: &Track) -> String {
    match track.similarity {
        Some(sim) => format!("{} {:.0}%", track.label, sim * 100.0),
        None => track.label.clone(),
    }
}

/// Lay out every track for drawing. Pure function of its inputs.
pub fn layout(
    tracks: &[Track],
    processing_width: u32,
    video_size: (u32, u32),
    canvas_size: (u32, u32),
) -> Vec<OverlayBox> {
    if processing_width == 0 || video_size.0 == 0 || video_size.1 == 0 {
        return Vec::new();
    }

    // Stage 1: processing-resolution → intrinsic video resolution.
    let up = video_size.0 as f32 / processing_width as f32;
    // Stage 2: video resolution → canvas, letterboxed.
    let lb = LetterboxTransform::new(video_size, canvas_size);

    tracks
        .iter()
        .map(|track| {
            let (x, y) = lb.apply(track.bbox.x * up, track.bbox.y * up);
            let w = track.bbox.w * up * lb.scale;
            let h = track.bbox.h * up * lb.scale;

            let label = label_text(track);
            let label_w = (label.len() as f32 * LABEL_CHAR_W).max(LABEL_CHAR_W);
            // Above the box, clamped so it never renders off-canvas.
            let label_x = x
                .min(canvas_size.0 as f32 - label_w)
                .max(0.0);
            let label_y = (y - LABEL_H)
                .min(canvas_size.1 as f32 - LABEL_H)
                .max(0.0);

            OverlayBox {
                x,
                y,
                w,
                h,
                color: tier_color(track.tier),
                label,
                label_x,
                label_y,
                label_w,
                label_h: LABEL_H,
            }
        })
        .collect()
}

/// Paint laid-out boxes onto an RGB canvas: hollow track rect plus a filled
/// label background. Glyph rasterization is the host display's concern; the
/// text itself travels in [`OverlayBox::label`].
pub fn paint(canvas: &mut RgbImage, boxes: &[OverlayBox]) {
    let (cw, ch) = (canvas.width() as i32, canvas.height() as i32);
    for b in boxes {
        let w = (b.w.round() as i32).max(1) as u32;
        let h = (b.h.round() as i32).max(1) as u32;
        let rect = Rect::at(b.x.round() as i32, b.y.round() as i32).of_size(w, h);
        draw_hollow_rect_mut(canvas, rect, b.color);

        let lw = (b.label_w.round() as i32).max(1) as u32;
        let lh = (b.label_h.round() as i32).max(1) as u32;
        let lx = (b.label_x.round() as i32).clamp(0, cw - 1);
        let ly = (b.label_y.round() as i32).clamp(0, ch - 1);
        draw_filled_rect_mut(canvas, Rect::at(lx, ly).of_size(lw, lh), b.color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use std::time::Instant;

    fn track(tier: Tier, bbox: BoundingBox) -> Track {
        Track {
            tier,
            label: "John".into(),
            student_id: matches!(tier, Tier::Recognized).then(|| "S2001".into()),
            similarity: matches!(tier, Tier::Recognized).then_some(0.9),
            bbox,
            last_seen: Instant::now(),
        }
    }

    #[test]
    fn test_letterbox_pillarbox_offsets() {
        // 640x480 video into a 1000x480 canvas: scale 1, x slack centered.
        let lb = LetterboxTransform::new((640, 480), (1000, 480));
        assert!((lb.scale - 1.0).abs() < 1e-6);
        assert!((lb.offset_x - 180.0).abs() < 1e-6);
        assert!(lb.offset_y.abs() < 1e-6);
    }

    #[test]
    fn test_center_maps_to_center_any_aspect() {
        // A box at the processing frame's center must land at the canvas
        // center under the letterbox transform, whatever the canvas shape.
        let processing = (160u32, 120u32);
        let video = (640u32, 480u32);
        for canvas in [(600u32, 480u32), (1920, 1080), (480, 640), (333, 777)] {
            let centered = BoundingBox::new(
                processing.0 as f32 / 2.0 - 5.0,
                processing.1 as f32 / 2.0 - 5.0,
                10.0,
                10.0,
            );
            let boxes = layout(&[track(Tier::Recognized, centered)], processing.0, video, canvas);
            let bx = boxes[0].x + boxes[0].w / 2.0;
            let by = boxes[0].y + boxes[0].h / 2.0;
            assert!(
                (bx - canvas.0 as f32 / 2.0).abs() < 1e-3,
                "x center off for canvas {canvas:?}: {bx}"
            );
            assert!(
                (by - canvas.1 as f32 / 2.0).abs() < 1e-3,
                "y center off for canvas {canvas:?}: {by}"
            );
        }
    }

    #[test]
    fn test_label_clamped_at_top_edge() {
        // Box at the very top: the label would go negative; it must clamp to 0.
        let boxes = layout(
            &[track(Tier::Unrecognized, BoundingBox::new(10.0, 0.0, 40.0, 40.0))],
            160,
            (640, 480),
            (640, 480),
        );
        assert_eq!(boxes[0].label_y, 0.0);
        assert!(boxes[0].label_x >= 0.0);
    }

    #[test]
    fn test_tier_colors_distinct() {
        let b = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        let boxes = layout(
            &[
                track(Tier::Recognized, b),
                track(Tier::BelowThreshold, b),
                track(Tier::Unrecognized, b),
            ],
            160,
            (640, 480),
            (640, 480),
        );
        assert_ne!(boxes[0].color, boxes[1].color);
        assert_ne!(boxes[1].color, boxes[2].color);
    }

    #[test]
    fn test_label_includes_similarity() {
        let boxes = layout(
            &[track(Tier::Recognized, BoundingBox::new(10.0, 30.0, 20.0, 20.0))],
            160,
            (640, 480),
            (640, 480),
        );
        assert_eq!(boxes[0].label, "John 90%");
    }

    #[test]
    fn test_paint_draws_box_outline() {
        let mut canvas = RgbImage::new(640, 480);
        let boxes = layout(
            &[track(Tier::Recognized, BoundingBox::new(20.0, 30.0, 40.0, 40.0))],
            160,
            (640, 480),
            (640, 480),
        );
        paint(&mut canvas, &boxes);
        let b = &boxes[0];
        let px = canvas.get_pixel(b.x.round() as u32, (b.y + b.h / 2.0).round() as u32);
        assert_eq!(*px, COLOR_RECOGNIZED);
    }

    #[test]
    fn test_layout_empty_inputs() {
        assert!(layout(&[], 160, (640, 480), (600, 480)).is_empty());
        let t = track(Tier::Recognized, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        assert!(layout(&[t], 0, (640, 480), (600, 480)).is_empty());
    }
}
