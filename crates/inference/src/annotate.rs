use crate::{codec::RasterImage, detection::Detection};
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use std::path::Path;

const BOX_COLOR: [u8; 3] = [255, 0, 0];
const TEXT_COLOR: [u8; 3] = [255, 255, 255];
const BOX_THICKNESS: u32 = 3;
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_PADDING: u32 = 4;
// Average glyph advance relative to the font size, used without a font
const FALLBACK_CHAR_WIDTH: f32 = 0.55;

pub const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

#[derive(Debug, Clone)]
pub struct AnnotatorConfig {
    pub box_color: [u8; 3],
    pub text_color: [u8; 3],
    pub box_thickness: u32,
    pub font_size: f32,
    pub label_padding: u32,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            box_color: BOX_COLOR,
            text_color: TEXT_COLOR,
            box_thickness: BOX_THICKNESS,
            font_size: LABEL_FONT_SIZE,
            label_padding: LABEL_PADDING,
        }
    }
}

/// Renders detections onto a copy of a raster. Holds no mutable state.
pub struct Annotator {
    config: AnnotatorConfig,
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new(config: AnnotatorConfig, font: Option<FontVec>) -> Self {
        Self { config, font }
    }

    /// Loads the label font from `path`; labels fall back to bare tags when
    /// the file is missing or unreadable.
    pub fn with_font_file(config: AnnotatorConfig, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let font = match std::fs::read(path) {
            Ok(data) => match FontVec::try_from_vec(data) {
                Ok(font) => Some(font),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Invalid label font");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Label font unavailable, labels will be drawn without text"
                );
                None
            }
        };
        Self::new(config, font)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Returns a new raster with every detection drawn in the given order.
    ///
    /// Boxes are clipped to the image; detections that do not intersect the
    /// image at all are skipped.
    pub fn draw(&self, image: &RasterImage, detections: &[Detection]) -> RasterImage {
        let mut canvas = image.pixels().clone();
        let (width, height) = canvas.dimensions();

        if width == 0 || height == 0 {
            return RasterImage::new(canvas);
        }

        for detection in detections {
            let Some(clipped) = detection.clipped(width, height) else {
                tracing::debug!(label = %detection.label, "Skipping detection outside image");
                continue;
            };

            let Some(rect) = pixel_rect(&clipped, width, height) else {
                continue;
            };

            self.draw_box(&mut canvas, rect);
            self.draw_tag(&mut canvas, rect, &clipped.tag());
        }

        RasterImage::new(canvas)
    }

    fn draw_box(&self, canvas: &mut RgbImage, rect: PixelRect) {
        let color = Rgb(self.config.box_color);
        for inset in 0..self.config.box_thickness.max(1) {
            let w = rect.width().saturating_sub(2 * inset);
            let h = rect.height().saturating_sub(2 * inset);
            if w == 0 || h == 0 {
                break;
            }
            let outline = Rect::at((rect.x0 + inset) as i32, (rect.y0 + inset) as i32).of_size(w, h);
            draw_hollow_rect_mut(canvas, outline, color);
        }
    }

    /// Filled tag above the box's top-left corner, moved inside the box
    /// when there is no room above.
    fn draw_tag(&self, canvas: &mut RgbImage, rect: PixelRect, text: &str) {
        let scale = PxScale::from(self.config.font_size);
        let (text_w, text_h) = match &self.font {
            Some(font) => text_size(scale, font, text),
            None => (
                (text.chars().count() as f32 * self.config.font_size * FALLBACK_CHAR_WIDTH) as u32,
                self.config.font_size as u32,
            ),
        };

        let pad = self.config.label_padding;
        let tag_w = text_w + 2 * pad;
        let tag_h = text_h + 2 * pad;
        if tag_w == 0 || tag_h == 0 {
            return;
        }

        let tag_x = rect.x0 as i32;
        let tag_y = if rect.y0 >= tag_h {
            (rect.y0 - tag_h) as i32
        } else {
            rect.y0 as i32
        };

        draw_filled_rect_mut(
            canvas,
            Rect::at(tag_x, tag_y).of_size(tag_w, tag_h),
            Rgb(self.config.box_color),
        );

        if let Some(font) = &self.font {
            draw_text_mut(
                canvas,
                Rgb(self.config.text_color),
                tag_x + pad as i32,
                tag_y + pad as i32,
                scale,
                font,
                text,
            );
        }
    }
}

/// Inclusive pixel bounds of a clipped box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelRect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl PixelRect {
    fn width(&self) -> u32 {
        self.x1 - self.x0 + 1
    }

    fn height(&self) -> u32 {
        self.y1 - self.y0 + 1
    }
}

fn pixel_rect(detection: &Detection, width: u32, height: u32) -> Option<PixelRect> {
    let bbox = detection.bbox;
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;

    let rect = PixelRect {
        x0: bbox.x_min.floor().clamp(0.0, max_x) as u32,
        y0: bbox.y_min.floor().clamp(0.0, max_y) as u32,
        x1: bbox.x_max.ceil().clamp(0.0, max_x) as u32,
        y1: bbox.y_max.ceil().clamp(0.0, max_y) as u32,
    };

    (rect.x0 <= rect.x1 && rect.y0 <= rect.y1).then_some(rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    const BACKGROUND: Rgb<u8> = Rgb([40, 40, 40]);

    fn blank(width: u32, height: u32) -> RasterImage {
        RasterImage::new(RgbImage::from_pixel(width, height, BACKGROUND))
    }

    fn cat() -> Detection {
        Detection::new(BoundingBox::new(100.0, 100.0, 200.0, 200.0), "cat", 0.9)
    }

    #[test]
    fn test_draw_does_not_mutate_input() {
        let source = blank(640, 480);
        let annotator = Annotator::new(AnnotatorConfig::default(), None);

        let annotated = annotator.draw(&source, &[cat()]);

        assert!(source.pixels().pixels().all(|p| *p == BACKGROUND));
        assert_ne!(annotated.pixels(), source.pixels());
    }

    #[test]
    fn test_draw_keeps_dimensions() {
        let annotator = Annotator::new(AnnotatorConfig::default(), None);
        let annotated = annotator.draw(&blank(640, 480), &[cat()]);
        assert_eq!(annotated.dimensions(), (640, 480));
    }

    #[test]
    fn test_box_outline_lands_on_reported_coordinates() {
        let annotator = Annotator::new(AnnotatorConfig::default(), None);
        let annotated = annotator.draw(&blank(640, 480), &[cat()]);
        let px = annotated.pixels();
        let red = Rgb(BOX_COLOR);

        // Left, right and bottom edges plus inner thickness
        assert_eq!(px.get_pixel(100, 150), &red);
        assert_eq!(px.get_pixel(102, 150), &red);
        assert_eq!(px.get_pixel(200, 150), &red);
        assert_eq!(px.get_pixel(150, 200), &red);

        // Inside and outside the outline stay untouched
        assert_eq!(px.get_pixel(150, 150), &BACKGROUND);
        assert_eq!(px.get_pixel(103, 150), &BACKGROUND);
        assert_eq!(px.get_pixel(99, 150), &BACKGROUND);
        assert_eq!(px.get_pixel(201, 150), &BACKGROUND);
    }

    #[test]
    fn test_tag_is_drawn_above_the_box() {
        let annotator = Annotator::new(AnnotatorConfig::default(), None);
        let annotated = annotator.draw(&blank(640, 480), &[cat()]);

        // Tag height = font size + 2 * padding = 28, so it covers y in 72..100
        assert_eq!(annotated.pixels().get_pixel(105, 80), &Rgb(BOX_COLOR));
        assert_eq!(annotated.pixels().get_pixel(105, 60), &BACKGROUND);
    }

    #[test]
    fn test_tag_moves_inside_when_box_touches_top_edge() {
        let annotator = Annotator::new(AnnotatorConfig::default(), None);
        let det = Detection::new(BoundingBox::new(10.0, 0.0, 300.0, 200.0), "dog", 0.5);
        let annotated = annotator.draw(&blank(640, 480), &[det]);

        assert_eq!(annotated.pixels().get_pixel(20, 10), &Rgb(BOX_COLOR));
    }

    #[test]
    fn test_out_of_bounds_box_is_clipped_not_rejected() {
        let annotator = Annotator::new(AnnotatorConfig::default(), None);
        let det = Detection::new(BoundingBox::new(600.0, 400.0, 900.0, 700.0), "car", 0.7);
        let annotated = annotator.draw(&blank(640, 480), &[det]);
        let red = Rgb(BOX_COLOR);

        // Clipped edges sit on the last row / column
        assert_eq!(annotated.pixels().get_pixel(639, 450), &red);
        assert_eq!(annotated.pixels().get_pixel(620, 479), &red);
        assert_eq!(annotated.pixels().get_pixel(600, 450), &red);
    }

    #[test]
    fn test_box_fully_outside_draws_nothing() {
        let source = blank(64, 64);
        let annotator = Annotator::new(AnnotatorConfig::default(), None);
        let det = Detection::new(BoundingBox::new(100.0, 100.0, 120.0, 120.0), "ghost", 0.9);

        let annotated = annotator.draw(&source, &[det]);
        assert_eq!(annotated.pixels(), source.pixels());
    }

    #[test]
    fn test_later_detections_render_over_earlier_ones() {
        let config = AnnotatorConfig::default();
        let first = Detection::new(BoundingBox::new(10.0, 50.0, 100.0, 100.0), "a", 0.9);
        let second = Detection::new(BoundingBox::new(10.0, 50.0, 100.0, 100.0), "b", 0.9);

        let green = Annotator::new(
            AnnotatorConfig {
                box_color: [0, 255, 0],
                ..config.clone()
            },
            None,
        );
        let base = green.draw(&blank(128, 128), &[first]);
        let red = Annotator::new(config, None);
        let annotated = red.draw(&base, &[second]);

        assert_eq!(annotated.pixels().get_pixel(10, 75), &Rgb(BOX_COLOR));
    }

    #[test]
    fn test_drawing_is_deterministic() {
        let annotator = Annotator::new(AnnotatorConfig::default(), None);
        let dets = vec![
            cat(),
            Detection::new(BoundingBox::new(150.0, 120.0, 260.0, 300.0), "dog", 0.4),
        ];
        let a = annotator.draw(&blank(320, 320), &dets);
        let b = annotator.draw(&blank(320, 320), &dets);
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_font_file_falls_back_to_bare_tags() {
        let annotator =
            Annotator::with_font_file(AnnotatorConfig::default(), "/nonexistent/font.ttf");
        assert!(!annotator.has_font());

        let annotated = annotator.draw(&blank(640, 480), &[cat()]);
        assert_eq!(annotated.pixels().get_pixel(100, 150), &Rgb(BOX_COLOR));
    }

    #[test]
    fn test_label_text_is_rendered_inside_tag() {
        if !Path::new(DEFAULT_FONT_PATH).exists() {
            eprintln!("skipping: {} not installed", DEFAULT_FONT_PATH);
            return;
        }
        let annotator = Annotator::with_font_file(AnnotatorConfig::default(), DEFAULT_FONT_PATH);
        assert!(annotator.has_font());

        let annotated = annotator.draw(&blank(640, 480), &[cat()]);
        let px = annotated.pixels();

        // Text pixels are the only bright-green ones; the tag is red and
        // the background grey
        let text_pixels: Vec<(u32, u32)> = px
            .enumerate_pixels()
            .filter(|(_, _, p)| p[1] > 200)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!text_pixels.is_empty(), "no label text drawn");

        let scale = PxScale::from(LABEL_FONT_SIZE);
        let font = annotator.font.as_ref().unwrap();
        let (text_w, text_h) = text_size(scale, font, &cat().tag());
        let tag_w = text_w + 2 * LABEL_PADDING;
        let tag_h = text_h + 2 * LABEL_PADDING;
        let (tag_x, tag_y) = (100, 100 - tag_h);
        for (x, y) in text_pixels {
            assert!(
                x >= tag_x && x < tag_x + tag_w && y >= tag_y && y < tag_y + tag_h,
                "text pixel ({}, {}) outside tag",
                x,
                y
            );
        }
    }

    #[test]
    fn test_bare_tags_have_no_text_pixels() {
        let annotator = Annotator::new(AnnotatorConfig::default(), None);
        let annotated = annotator.draw(&blank(640, 480), &[cat()]);
        assert!(annotated.pixels().pixels().all(|p| p[1] <= 200));
    }

    #[test]
    fn test_pixel_rect_clamps_to_last_pixel() {
        let det = Detection::new(BoundingBox::new(0.0, 0.0, 64.0, 64.0), "x", 0.5);
        let rect = pixel_rect(&det, 64, 64).unwrap();
        assert_eq!((rect.x0, rect.y0, rect.x1, rect.y1), (0, 0, 63, 63));
    }
}
