//! Type definitions shared across the scanning pipeline
//!
//! Geometry is always tagged by the space it lives in: detector output is in
//! native frame pixels, overlay records are in display pixels. Conversions go
//! through [`crate::coords::CoverMapping`].

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// 2D point in either native frame or display space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned rectangle given by its top-left corner and size
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Rotated rectangle: center, size and rotation in degrees
///
/// The angle is normalised to `[0, 90)`; `width` runs along the rotated x axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotatedRegion {
    pub center: Point,
    pub width: f64,
    pub height: f64,
    pub angle_deg: f64,
}

impl RotatedRegion {
    pub fn new(center: Point, width: f64, height: f64, angle_deg: f64) -> Self {
        Self {
            center,
            width: width.max(0.0),
            height: height.max(0.0),
            angle_deg,
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Same center and angle, each side grown by `fraction` of itself
    pub fn padded(&self, fraction: f64) -> Self {
        Self::new(
            self.center,
            self.width + self.width * fraction,
            self.height + self.height * fraction,
            self.angle_deg,
        )
    }

    /// Unrotated extent around the center, used as the reported bounding box
    pub fn upright_bounds(&self) -> BoundingBox {
        BoundingBox::new(
            self.center.x - self.width / 2.0,
            self.center.y - self.height / 2.0,
            self.width,
            self.height,
        )
    }
}

/// Optical code symbologies a recognizer can be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeFormat {
    Aztec,
    Codabar,
    #[serde(rename = "code_39")]
    Code39,
    #[serde(rename = "code_93")]
    Code93,
    #[serde(rename = "code_128")]
    Code128,
    DataMatrix,
    #[serde(rename = "ean_8")]
    Ean8,
    #[serde(rename = "ean_13")]
    Ean13,
    Itf,
    Pdf417,
    QrCode,
    UpcA,
    UpcE,
    Unknown,
}

impl std::fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Aztec => "aztec",
            Self::Codabar => "codabar",
            Self::Code39 => "code_39",
            Self::Code93 => "code_93",
            Self::Code128 => "code_128",
            Self::DataMatrix => "data_matrix",
            Self::Ean8 => "ean_8",
            Self::Ean13 => "ean_13",
            Self::Itf => "itf",
            Self::Pdf417 => "pdf417",
            Self::QrCode => "qr_code",
            Self::UpcA => "upc_a",
            Self::UpcE => "upc_e",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// A decoded code as reported by the recognizer, in native frame space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedCode {
    pub raw_value: String,
    pub format: BarcodeFormat,
    pub bounding_box: BoundingBox,
    pub corner_points: Vec<Point>,
}

impl DetectedCode {
    pub fn new(
        raw_value: impl Into<String>,
        format: BarcodeFormat,
        bounding_box: BoundingBox,
        corner_points: Vec<Point>,
    ) -> Self {
        Self {
            raw_value: raw_value.into(),
            format,
            bounding_box,
            corner_points,
        }
    }
}

/// Overlay color derived from a code's lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayColor {
    Green,
    Yellow,
    Red,
}

impl OverlayColor {
    pub fn rgba(&self) -> image::Rgba<u8> {
        match self {
            Self::Green => image::Rgba([0, 200, 0, 255]),
            Self::Yellow => image::Rgba([255, 210, 0, 255]),
            Self::Red => image::Rgba([220, 0, 0, 255]),
        }
    }
}

/// A detected code after mapping into display space and classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedCode {
    pub code: DetectedCode,
    pub display_box: BoundingBox,
    pub display_corners: Vec<Point>,
    pub color: OverlayColor,
}

impl AdjustedCode {
    pub fn raw_value(&self) -> &str {
        &self.code.raw_value
    }
}

/// Minimal display-space record kept for hit-testing after rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub raw_value: String,
}

impl TrackedBox {
    /// Inclusive containment test against the box edges
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }
}

/// Width/height pair in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Immutable frame captured from the video source
#[derive(Clone)]
pub struct Frame {
    pub frame_id: u64,
    pub image: Arc<DynamicImage>,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(frame_id: u64, image: DynamicImage) -> Self {
        Self {
            frame_id,
            image: Arc::new(image),
            timestamp: Instant::now(),
        }
    }

    /// Native resolution of the raster
    pub fn native_size(&self) -> FrameSize {
        FrameSize::new(self.image.width(), self.image.height())
    }
}
