//! Native frame to display coordinate mapping under "cover" fit
//!
//! The frame is scaled up just enough to fill the display, then center
//! cropped. A mapping is only valid for the (native, display) pair it was
//! built from; rebuild it whenever either size changes.

use crate::error::{Result, ScanError};
use crate::types::{BoundingBox, DetectedCode, FrameSize, Point};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverMapping {
    pub native: FrameSize,
    pub display: FrameSize,
    pub scale_factor: f64,
    /// Centering offset per axis, negative on the cropped axis
    pub offset_x: f64,
    pub offset_y: f64,
}

impl CoverMapping {
    pub fn new(native: FrameSize, display: FrameSize) -> Result<Self> {
        if native.is_empty() {
            return Err(ScanError::surface(format!(
                "frame source reports empty resolution {}x{}",
                native.width, native.height
            )));
        }
        if display.is_empty() {
            return Err(ScanError::surface(format!(
                "display surface reports empty size {}x{}",
                display.width, display.height
            )));
        }

        let (rw, rh) = (native.width as f64, native.height as f64);
        let (dw, dh) = (display.width as f64, display.height as f64);
        let scale_factor = (dw / rw).max(dh / rh);

        let uncut_w = rw * scale_factor;
        let uncut_h = rh * scale_factor;

        Ok(Self {
            native,
            display,
            scale_factor,
            offset_x: (dw - uncut_w) / 2.0,
            offset_y: (dh - uncut_h) / 2.0,
        })
    }

    /// Whether this mapping was built for the given sizes
    pub fn matches(&self, native: FrameSize, display: FrameSize) -> bool {
        self.native == native && self.display == display
    }

    pub fn scale(&self, p: Point) -> Point {
        Point::new(
            (p.x * self.scale_factor).floor(),
            (p.y * self.scale_factor).floor(),
        )
    }

    pub fn translate(&self, p: Point) -> Point {
        Point::new((p.x + self.offset_x).floor(), (p.y + self.offset_y).floor())
    }

    pub fn map_point(&self, p: Point) -> Point {
        self.translate(self.scale(p))
    }

    /// Origin is scaled and translated, extent is only scaled
    pub fn map_box(&self, b: &BoundingBox) -> BoundingBox {
        let origin = self.map_point(b.top_left());
        let size = self.scale(Point::new(b.width, b.height));
        BoundingBox::new(origin.x, origin.y, size.x, size.y)
    }

    /// Display-space box and corners of a detected code
    pub fn map_code(&self, code: &DetectedCode) -> (BoundingBox, Vec<Point>) {
        let corners = code
            .corner_points
            .iter()
            .map(|p| self.map_point(*p))
            .collect();
        (self.map_box(&code.bounding_box), corners)
    }
}
