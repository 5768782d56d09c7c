//! Overlay rendering: the sampled frame plus one box and caption per
//! prediction, colored by the active mode.

use image::{DynamicImage, ImageBuffer, Rgba, RgbaImage, codecs::jpeg::JpegEncoder};
use ml_core::{DetectionMode, Prediction};
use thiserror::Error;
use video_ingest::{Frame, frame_to_rgb};

use crate::pipeline::glyphs::{GLYPH_ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH, glyph_bits};

pub const STROKE_WIDTH: i32 = 3;
pub const LABEL_SCALE: i32 = 2;
/// Gap between a caption's bottom row and the top edge of its box.
const LABEL_GAP: i32 = 4;
/// Box coordinates are clamped to this magnitude before conversion to pixels.
const COORD_LIMIT: f64 = 1_000_000.0;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("frame {width}x{height} cannot be drawn onto the canvas")]
    InvalidFrame { width: i32, height: i32 },
    #[error("overlay encode failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// One primitive drawn by [`OverlayRenderer::render`].
#[derive(Clone, Debug, PartialEq)]
pub enum OverlayShape {
    Rect {
        left: i32,
        top: i32,
        width: i32,
        height: i32,
        color: [u8; 4],
    },
    Label {
        x: i32,
        y: i32,
        text: String,
        color: [u8; 4],
    },
}

/// Off-screen drawing surface holding the latest overlay.
#[derive(Debug, Default)]
pub struct Canvas {
    image: RgbaImage,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// True until the first successful render.
    pub fn is_blank(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, RenderError> {
        let rgb = DynamicImage::ImageRgba8(self.image.clone()).to_rgb8();
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode_image(&rgb)?;
        Ok(buffer)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OverlayRenderer;

impl OverlayRenderer {
    /// Lay out the shapes for `predictions` in input order: each box is
    /// followed by its caption, so later detections paint over earlier ones.
    pub fn plan(&self, predictions: &[Prediction], mode: DetectionMode) -> Vec<OverlayShape> {
        let style = mode.style();
        let mut shapes = Vec::with_capacity(predictions.len() * 2);
        for prediction in predictions {
            let [left, top, width, height] = prediction.bbox_ltwh();
            let right = to_pixels(left + width);
            let bottom = to_pixels(top + height);
            let left = to_pixels(left);
            let top = to_pixels(top);
            shapes.push(OverlayShape::Rect {
                left,
                top,
                width: right - left,
                height: bottom - top,
                color: style.stroke,
            });
            shapes.push(OverlayShape::Label {
                x: left.max(0),
                y: top
                    .saturating_sub(GLYPH_HEIGHT * LABEL_SCALE + LABEL_GAP)
                    .max(0),
                text: prediction.label().to_string(),
                color: style.fill,
            });
        }
        shapes
    }

    /// Replace the canvas with `frame` and draw the overlay for `predictions`.
    pub fn render(
        &self,
        canvas: &mut Canvas,
        frame: &Frame,
        predictions: &[Prediction],
        mode: DetectionMode,
    ) -> Result<Vec<OverlayShape>, RenderError> {
        let invalid = || RenderError::InvalidFrame {
            width: frame.width,
            height: frame.height,
        };
        if frame.expected_len() != Some(frame.data.len()) {
            return Err(invalid());
        }
        let base = frame_to_rgb(frame).ok_or_else(invalid)?;
        canvas.image = DynamicImage::ImageRgb8(base).to_rgba8();

        let shapes = self.plan(predictions, mode);
        for shape in &shapes {
            match shape {
                OverlayShape::Rect {
                    left,
                    top,
                    width,
                    height,
                    color,
                } => stroke_rect(&mut canvas.image, *left, *top, *width, *height, Rgba(*color)),
                OverlayShape::Label { x, y, text, color } => {
                    draw_label(&mut canvas.image, *x, *y, text, Rgba(*color))
                }
            }
        }
        Ok(shapes)
    }
}

fn put_pixel(image: &mut ImageBuffer<Rgba<u8>, Vec<u8>>, x: i32, y: i32, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn to_pixels(value: f64) -> i32 {
    value.clamp(-COORD_LIMIT, COORD_LIMIT).round() as i32
}

/// Outline drawn inward from the box edges. Each edge is clipped to the
/// canvas before it is walked; edges entirely off the canvas are skipped.
fn stroke_rect(
    image: &mut ImageBuffer<Rgba<u8>, Vec<u8>>,
    left: i32,
    top: i32,
    width: i32,
    height: i32,
    color: Rgba<u8>,
) {
    if width <= 0 || height <= 0 {
        return;
    }
    let (canvas_w, canvas_h) = (image.width() as i32, image.height() as i32);
    let right = left.saturating_add(width - 1);
    let bottom = top.saturating_add(height - 1);
    for inset in 0..STROKE_WIDTH {
        let l = left.saturating_add(inset);
        let t = top.saturating_add(inset);
        let r = right.saturating_sub(inset);
        let b = bottom.saturating_sub(inset);
        if l > r || t > b {
            break;
        }
        if r < 0 || b < 0 || l >= canvas_w || t >= canvas_h {
            continue;
        }
        for x in l.max(0)..=r.min(canvas_w - 1) {
            put_pixel(image, x, t, color);
            put_pixel(image, x, b, color);
        }
        for y in t.max(0)..=b.min(canvas_h - 1) {
            put_pixel(image, l, y, color);
            put_pixel(image, r, y, color);
        }
    }
}

fn draw_label(
    image: &mut ImageBuffer<Rgba<u8>, Vec<u8>>,
    mut x: i32,
    y: i32,
    text: &str,
    color: Rgba<u8>,
) {
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if x >= image.width() as i32 {
            break;
        }
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        let px = x + col * LABEL_SCALE;
                        let py = y + row as i32 * LABEL_SCALE;
                        for dy in 0..LABEL_SCALE {
                            for dx in 0..LABEL_SCALE {
                                put_pixel(image, px + dx, py + dy, color);
                            }
                        }
                    }
                }
            }
        }
        x = x.saturating_add(GLYPH_ADVANCE * LABEL_SCALE);
    }
}

#[cfg(test)]
mod tests {
    use video_ingest::FrameFormat;

    use super::*;

    const GREY: [u8; 3] = [40, 40, 40];

    fn grey_frame(width: i32, height: i32) -> Frame {
        Frame {
            data: GREY
                .iter()
                .copied()
                .cycle()
                .take(width as usize * height as usize * 3)
                .collect(),
            width,
            height,
            timestamp_ms: 0,
            format: FrameFormat::Bgr8,
        }
    }

    fn person_at(x: f64, y: f64) -> Prediction {
        Prediction::new(x, y, 40.0, 60.0, "person", Some(0.9))
    }

    fn rects(shapes: &[OverlayShape]) -> usize {
        shapes
            .iter()
            .filter(|s| matches!(s, OverlayShape::Rect { .. }))
            .count()
    }

    fn labels(shapes: &[OverlayShape]) -> usize {
        shapes
            .iter()
            .filter(|s| matches!(s, OverlayShape::Label { .. }))
            .count()
    }

    #[test]
    fn one_rect_and_one_label_per_prediction() {
        let renderer = OverlayRenderer;
        for n in [0usize, 1, 4] {
            let predictions: Vec<_> = (0..n)
                .map(|i| person_at(50.0 + i as f64 * 30.0, 60.0))
                .collect();
            let shapes = renderer.plan(&predictions, DetectionMode::Fire);
            assert_eq!(rects(&shapes), n);
            assert_eq!(labels(&shapes), n);
        }
    }

    #[test]
    fn boxes_are_centered_on_the_prediction() {
        let shapes = OverlayRenderer.plan(&[person_at(100.0, 50.0)], DetectionMode::People);
        assert_eq!(
            shapes[0],
            OverlayShape::Rect {
                left: 80,
                top: 20,
                width: 40,
                height: 60,
                color: [0, 255, 0, 255],
            }
        );
        match &shapes[1] {
            OverlayShape::Label { x, y, text, color } => {
                assert_eq!(*x, 80);
                assert!(*y < 20);
                assert_eq!(text, "person");
                assert_eq!(*color, [0, 255, 0, 255]);
            }
            other => panic!("expected label, got {other:?}"),
        }
    }

    #[test]
    fn color_depends_only_on_mode() {
        let predictions = [person_at(100.0, 50.0), person_at(20.0, 90.0)];
        for mode in DetectionMode::ALL {
            for shape in OverlayRenderer.plan(&predictions, mode) {
                let color = match shape {
                    OverlayShape::Rect { color, .. } | OverlayShape::Label { color, .. } => color,
                };
                assert_eq!(color, mode.style().stroke);
            }
        }
    }

    #[test]
    fn draws_stroke_in_mode_color_over_base_frame() {
        let mut canvas = Canvas::new();
        let frame = grey_frame(200, 120);
        OverlayRenderer
            .render(&mut canvas, &frame, &[person_at(100.0, 50.0)], DetectionMode::People)
            .unwrap();

        assert_eq!((canvas.width(), canvas.height()), (200, 120));
        let green = Rgba([0, 255, 0, 255]);
        assert_eq!(*canvas.image().get_pixel(80, 50), green);
        assert_eq!(*canvas.image().get_pixel(82, 50), green);
        assert_eq!(*canvas.image().get_pixel(119, 79), green);
        let grey = Rgba([GREY[2], GREY[1], GREY[0], 255]);
        assert_eq!(*canvas.image().get_pixel(100, 50), grey);
        assert_eq!(*canvas.image().get_pixel(5, 110), grey);
    }

    #[test]
    fn empty_predictions_leave_only_the_base_frame() {
        let mut canvas = Canvas::new();
        let frame = grey_frame(64, 48);
        let shapes = OverlayRenderer
            .render(&mut canvas, &frame, &[], DetectionMode::Fire)
            .unwrap();
        assert!(shapes.is_empty());
        let grey = Rgba([GREY[2], GREY[1], GREY[0], 255]);
        assert!(canvas.image().pixels().all(|p| *p == grey));
    }

    #[test]
    fn each_render_replaces_the_previous_overlay() {
        let mut canvas = Canvas::new();
        let frame = grey_frame(200, 120);
        OverlayRenderer
            .render(&mut canvas, &frame, &[person_at(100.0, 50.0)], DetectionMode::Fire)
            .unwrap();
        assert_eq!(*canvas.image().get_pixel(80, 50), Rgba([255, 0, 0, 255]));

        OverlayRenderer
            .render(&mut canvas, &frame, &[person_at(150.0, 60.0)], DetectionMode::Fire)
            .unwrap();
        let grey = Rgba([GREY[2], GREY[1], GREY[0], 255]);
        assert_eq!(*canvas.image().get_pixel(80, 50), grey);
        assert_eq!(*canvas.image().get_pixel(130, 60), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn later_boxes_paint_over_earlier_ones() {
        let mut canvas = Canvas::new();
        let frame = grey_frame(200, 120);
        let first = Prediction::new(100.0, 60.0, 40.0, 40.0, "a", None);
        let second = Prediction::new(100.0, 60.0, 40.0, 40.0, "b", None);
        let shapes = OverlayRenderer
            .render(&mut canvas, &frame, &[first, second], DetectionMode::Earthquake)
            .unwrap();
        let texts: Vec<_> = shapes
            .iter()
            .filter_map(|s| match s {
                OverlayShape::Label { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, ["a", "b"]);
    }

    #[test]
    fn boxes_off_the_edge_are_clipped() {
        let mut canvas = Canvas::new();
        let frame = grey_frame(50, 50);
        let shapes = OverlayRenderer
            .render(
                &mut canvas,
                &frame,
                &[Prediction::new(0.0, 0.0, 30.0, 30.0, "fire", None)],
                DetectionMode::Fire,
            )
            .unwrap();
        assert_eq!(rects(&shapes), 1);
        assert_eq!(*canvas.image().get_pixel(14, 5), Rgba([255, 0, 0, 255]));
        match &shapes[1] {
            OverlayShape::Label { x, y, .. } => assert_eq!((*x, *y), (0, 0)),
            other => panic!("expected label, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_frames() {
        let mut canvas = Canvas::new();
        let mut frame = grey_frame(10, 10);
        frame.data.pop();
        let err = OverlayRenderer
            .render(&mut canvas, &frame, &[], DetectionMode::Fire)
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidFrame { .. }));
        assert!(canvas.is_blank());
    }

    #[test]
    fn encodes_rendered_canvas() {
        let mut canvas = Canvas::new();
        OverlayRenderer
            .render(&mut canvas, &grey_frame(32, 24), &[], DetectionMode::Fire)
            .unwrap();
        let jpeg = canvas.encode_jpeg(80).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn far_off_canvas_centers_are_clamped() {
        let mut canvas = Canvas::new();
        let frame = grey_frame(32, 32);
        let limit = COORD_LIMIT as i32;
        for (x, y) in [(10.0, -3e9), (3e9, 10.0), (-3e9, 10.0), (10.0, 3e9), (1e300, -1e300)] {
            let far = Prediction::new(x, y, 10.0, 10.0, "fire", None);
            let shapes = OverlayRenderer
                .render(&mut canvas, &frame, &[far], DetectionMode::Fire)
                .unwrap();
            match shapes[0] {
                OverlayShape::Rect {
                    left,
                    top,
                    width,
                    height,
                    ..
                } => {
                    assert!(left.abs() <= limit && top.abs() <= limit);
                    assert!((0..=10).contains(&width) && (0..=10).contains(&height));
                }
                ref other => panic!("expected rect, got {other:?}"),
            }
        }
    }

    #[test]
    fn oversized_boxes_only_walk_visible_edges() {
        let mut canvas = Canvas::new();
        let frame = grey_frame(32, 32);
        let grey = Rgba([GREY[2], GREY[1], GREY[0], 255]);
        let huge = Prediction::new(16.0, 16.0, 2e8, 2e8, "quake", None);
        let started = std::time::Instant::now();
        OverlayRenderer
            .render(&mut canvas, &frame, &[huge], DetectionMode::Earthquake)
            .unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        // The caption is pinned to the top-left corner; everything below it
        // is untouched because every edge of the box lies off the canvas.
        assert!(
            canvas
                .image()
                .enumerate_pixels()
                .filter(|(_, y, _)| *y >= 16)
                .all(|(_, _, p)| *p == grey)
        );

        let tall = Prediction::new(16.0, 16.0, 20.0, 2e8, "quake", None);
        OverlayRenderer
            .render(&mut canvas, &frame, &[tall], DetectionMode::Earthquake)
            .unwrap();
        let blue = Rgba(DetectionMode::Earthquake.style().stroke);
        for y in [0, 16, 31] {
            assert_eq!(*canvas.image().get_pixel(6, y), blue);
            assert_eq!(*canvas.image().get_pixel(25, y), blue);
        }
        assert_eq!(*canvas.image().get_pixel(16, 16), grey);
    }
}
