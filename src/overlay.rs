/// Overlay rendering and hit-testing
///
/// Each adjusted code is drawn as a colored outline with a filled label band
/// directly beneath it carrying the raw value in white. Rendering returns the
/// display-space boxes in drawing order; hit-testing walks that list and the
/// first box containing the point wins.
use crate::glyphs::{draw_text, text_width};
use crate::types::{AdjustedCode, TrackedBox};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const LABEL_TEXT: Rgba<u8> = Rgba([255, 255, 255, 255]);
const MIN_FONT_SIZE: f64 = 10.0;
const MAX_FONT_SIZE: f64 = 12.0;

#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    /// Outline thickness in pixels
    pub line_width: u32,
    /// Height of the label band under each box
    pub label_height: u32,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self {
            line_width: 2,
            label_height: 20,
        }
    }
}

impl OverlayRenderer {
    pub fn new(line_width: u32, label_height: u32) -> Self {
        Self {
            line_width,
            label_height,
        }
    }

    /// Label font size for a box, proportional to its share of the canvas width
    pub fn font_size(box_width: f64, canvas_width: u32) -> f64 {
        if canvas_width == 0 {
            return MIN_FONT_SIZE;
        }
        (50.0 * box_width / canvas_width as f64).clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
    }

    /// Clear the canvas and draw every code; returns the boxes for hit-testing
    pub fn render(&self, canvas: &mut RgbaImage, codes: &[AdjustedCode]) -> Vec<TrackedBox> {
        clear(canvas);
        codes
            .iter()
            .map(|code| {
                self.draw_code(canvas, code);
                TrackedBox {
                    x: code.display_box.x,
                    y: code.display_box.y,
                    width: code.display_box.width,
                    height: code.display_box.height,
                    raw_value: code.raw_value().to_string(),
                }
            })
            .collect()
    }

    fn draw_code(&self, canvas: &mut RgbaImage, code: &AdjustedCode) {
        let color = code.color.rgba();
        let b = &code.display_box;
        let x = b.x.round() as i32;
        let y = b.y.round() as i32;
        let width = b.width.round();
        let height = b.height.round();

        // Zero-sized rectangles cannot be drawn; the box is still hit-testable
        if width < 1.0 || height < 1.0 {
            log::debug!("Not drawing degenerate box for {:?}", code.raw_value());
            return;
        }
        let (width, height) = (width as u32, height as u32);

        for offset in 0..self.line_width as i32 {
            let outline = Rect::at(x - offset, y - offset)
                .of_size(width + 2 * offset as u32, height + 2 * offset as u32);
            draw_hollow_rect_mut(canvas, outline, color);
        }

        if self.label_height == 0 {
            return;
        }
        let band_y = y + height as i32;
        draw_filled_rect_mut(
            canvas,
            Rect::at(x, band_y).of_size(width, self.label_height),
            color,
        );

        let glyph_height = Self::font_size(b.width, canvas.width()).round() as u32;
        let label = code.raw_value();
        let label_width = text_width(label, glyph_height) as i32;
        let text_x = x + (width as i32 - label_width) / 2;
        let text_y = band_y + (self.label_height as i32 - glyph_height as i32) / 2;
        draw_text(canvas, label, text_x, text_y, glyph_height, LABEL_TEXT);
    }
}

/// Make every pixel transparent
pub fn clear(canvas: &mut RgbaImage) {
    for pixel in canvas.pixels_mut() {
        *pixel = Rgba([0, 0, 0, 0]);
    }
}

/// First box, in rendering order, containing the display-space point
pub fn hit_test(boxes: &[TrackedBox], x: f64, y: f64) -> Option<&TrackedBox> {
    boxes.iter().find(|b| b.contains(x, y))
}
