//! Optical Code Scanner Library
//!
//! Continuously scans a live video stream for barcodes and 2D codes. A fast
//! whole-frame recognizer pass is complemented by a thorough pass over
//! perspective-corrected candidate regions; merged results are mapped onto
//! the display, classified by their validation lifecycle and rendered as a
//! clickable overlay.

pub mod config;
pub mod coords;
pub mod error;
pub mod frame_pipeline;
pub mod geometry;
pub mod glyphs;
pub mod merge;
pub mod overlay;
pub mod recognizer;
pub mod rectify;
pub mod roi;
pub mod scanner;
pub mod scheduler;
pub mod tracking;
pub mod types;

pub use config::{RectifyConfig, RoiConfig, ScannerConfig};
pub use coords::CoverMapping;
pub use error::{Result, ScanError};
pub use frame_pipeline::{DetectionPipeline, PipelineOutput};
pub use merge::merge_detections;
pub use overlay::{hit_test, OverlayRenderer};
pub use recognizer::Recognizer;
pub use rectify::Rectifier;
pub use roi::RoiExtractor;
pub use scanner::{Collaborators, DisplaySurface, ScanEvent, Scanner};
pub use scheduler::{FrameSource, ScanLoopState, ScanPolicy, ScanScheduler};
pub use tracking::{CodeState, CodeTracker, ErrorCallback, Validator};
pub use types::{
    AdjustedCode, BarcodeFormat, BoundingBox, DetectedCode, Frame, FrameSize, OverlayColor,
    Point, RotatedRegion, TrackedBox,
};

/// Initialize the scanner library
pub fn init() -> Result<()> {
    log::info!("Optical code scanner library initialized (v{})", version());
    Ok(())
}

/// Get library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Symbologies a recognizer can be asked for
pub fn supported_formats() -> Vec<BarcodeFormat> {
    vec![
        BarcodeFormat::Aztec,
        BarcodeFormat::Codabar,
        BarcodeFormat::Code39,
        BarcodeFormat::Code93,
        BarcodeFormat::Code128,
        BarcodeFormat::DataMatrix,
        BarcodeFormat::Ean8,
        BarcodeFormat::Ean13,
        BarcodeFormat::Itf,
        BarcodeFormat::Pdf417,
        BarcodeFormat::QrCode,
        BarcodeFormat::UpcA,
        BarcodeFormat::UpcE,
    ]
}
