//! Scanner configuration
//!
//! All sections deserialize with defaults, so a partial JSON document (or `{}`)
//! is a valid configuration.

use crate::error::{Result, ScanError};
use crate::types::BarcodeFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Retry delay used when region detection runs on every sample
const RETRY_DELAY_WITH_REGIONS_MS: u64 = 500;
/// Retry delay used for whole-frame detection only
const RETRY_DELAY_PRIMARY_ONLY_MS: u64 = 100;

/// Candidate region extraction tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    /// Fraction each side of a candidate grows by before rectification
    pub padding: f64,
    /// Minimum distance between accepted candidate centers (px)
    pub min_distance: f64,
    /// Largest contours considered per frame
    pub max_candidates: usize,
    /// Box blur radius (4 = 9x9 kernel)
    pub blur_radius: u32,
    /// Gaussian sigma of the local-mean window for adaptive thresholding
    pub threshold_block_sigma: f32,
    /// Constant subtracted from the local mean
    pub threshold_offset: i16,
    /// Closing kernel radius (6 = 13x13 kernel)
    pub close_radius: u8,
    /// Erosion/dilation passes with a 3x3 kernel
    pub morph_iterations: u8,
    pub canny_low: f32,
    pub canny_high: f32,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            padding: 0.1,
            min_distance: 10.0,
            max_candidates: 20,
            blur_radius: 4,
            threshold_block_sigma: 2.0,
            threshold_offset: 2,
            close_radius: 6,
            morph_iterations: 5,
            canny_low: 50.0,
            canny_high: 150.0,
        }
    }
}

/// Perspective rectification and crop enhancement tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifyConfig {
    /// Short side of the canonical crop
    pub short_side: f64,
    /// Regions rotated beyond this angle swap long and short sides
    pub swap_angle_deg: f64,
    /// Upper bound on the long side so extreme aspect ratios stay cheap
    pub max_long_side: f64,
    /// Gaussian sigma of the unsharp mask
    pub sharpen_sigma: f32,
    /// Intensities above this level are truncated
    pub truncate_level: u8,
}

impl Default for RectifyConfig {
    fn default() -> Self {
        Self {
            short_side: 200.0,
            swap_angle_deg: 80.0,
            max_long_side: 2000.0,
            sharpen_sigma: 1.5,
            truncate_level: 130,
        }
    }
}

/// Top-level scanner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Symbologies requested from the recognizer
    pub formats: Vec<BarcodeFormat>,
    /// Minimum time between samples; derived from `region_detection` when unset
    pub retry_delay_ms: Option<u64>,
    /// Minimum time between repeated scan events when `allow_multiple` is set
    pub scan_delay_ms: u64,
    /// Re-emit scan events for codes that were already reported
    pub allow_multiple: bool,
    /// Run the secondary per-region recognizer pass
    pub region_detection: bool,
    /// Render the tracking overlay on found events
    pub overlay_enabled: bool,
    /// Period of the frame clock driving the scan loop
    pub frame_interval_ms: u64,
    /// Capacity of the consumer event channel
    pub event_buffer: usize,
    /// Outline thickness of overlay boxes (px)
    pub overlay_line_width: u32,
    /// Height of the label band under each overlay box (px)
    pub overlay_label_height: u32,
    pub roi: RoiConfig,
    pub rectify: RectifyConfig,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            formats: vec![BarcodeFormat::QrCode],
            retry_delay_ms: None,
            scan_delay_ms: 0,
            allow_multiple: false,
            region_detection: true,
            overlay_enabled: true,
            frame_interval_ms: 16,
            event_buffer: 32,
            overlay_line_width: 2,
            overlay_label_height: 20,
            roi: RoiConfig::default(),
            rectify: RectifyConfig::default(),
        }
    }
}

impl ScannerConfig {
    /// Parse a JSON document and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ScannerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn retry_delay(&self) -> Duration {
        let ms = self.retry_delay_ms.unwrap_or(if self.region_detection {
            RETRY_DELAY_WITH_REGIONS_MS
        } else {
            RETRY_DELAY_PRIMARY_ONLY_MS
        });
        Duration::from_millis(ms)
    }

    pub fn scan_delay(&self) -> Duration {
        Duration::from_millis(self.scan_delay_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_interval_ms == 0 {
            return Err(ScanError::config("frame_interval_ms must be positive"));
        }
        if self.event_buffer == 0 {
            return Err(ScanError::config("event_buffer must be positive"));
        }
        if self.formats.is_empty() {
            return Err(ScanError::config("at least one format must be requested"));
        }
        let supported = crate::supported_formats();
        if let Some(format) = self.formats.iter().find(|f| !supported.contains(f)) {
            return Err(ScanError::config(format!("unsupported format {:?}", format)));
        }
        if !(self.roi.padding >= 0.0) {
            return Err(ScanError::config(format!(
                "roi.padding must be non-negative, got {}",
                self.roi.padding
            )));
        }
        if !(self.roi.min_distance >= 0.0) {
            return Err(ScanError::config(format!(
                "roi.min_distance must be non-negative, got {}",
                self.roi.min_distance
            )));
        }
        if self.roi.threshold_block_sigma <= 0.0 {
            return Err(ScanError::config("roi.threshold_block_sigma must be positive"));
        }
        if self.roi.canny_low > self.roi.canny_high {
            return Err(ScanError::config("roi.canny_low must not exceed roi.canny_high"));
        }
        if !(self.rectify.short_side >= 1.0) || self.rectify.max_long_side < self.rectify.short_side {
            return Err(ScanError::config(
                "rectify.short_side must be >= 1 and not exceed rectify.max_long_side",
            ));
        }
        if self.rectify.sharpen_sigma <= 0.0 {
            return Err(ScanError::config("rectify.sharpen_sigma must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScannerConfig::default();
        assert_eq!(config.formats, vec![BarcodeFormat::QrCode]);
        assert_eq!(config.roi.padding, 0.1);
        assert_eq!(config.roi.min_distance, 10.0);
        assert_eq!(config.roi.max_candidates, 20);
        assert_eq!((config.overlay_line_width, config.overlay_label_height), (2, 20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_delay_depends_on_region_detection() {
        let mut config = ScannerConfig::default();
        assert_eq!(config.retry_delay(), Duration::from_millis(500));
        config.region_detection = false;
        assert_eq!(config.retry_delay(), Duration::from_millis(100));
        config.retry_delay_ms = Some(250);
        assert_eq!(config.retry_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_partial_json() {
        let config = ScannerConfig::from_json_str(
            r#"{"allow_multiple": true, "scan_delay_ms": 500, "formats": ["qr_code", "ean_13"], "roi": {"padding": 0.2}}"#,
        )
        .unwrap();
        assert!(config.allow_multiple);
        assert_eq!(config.scan_delay(), Duration::from_millis(500));
        assert_eq!(config.formats, vec![BarcodeFormat::QrCode, BarcodeFormat::Ean13]);
        assert_eq!(config.roi.padding, 0.2);
        assert_eq!(config.roi.min_distance, 10.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ScannerConfig::from_json_str(r#"{"roi": {"padding": -0.5}}"#).unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));

        let err = ScannerConfig::from_json_str(r#"{"frame_interval_ms": 0}"#).unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));

        let err = ScannerConfig::from_json_str(r#"{"formats": []}"#).unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));

        let err = ScannerConfig::from_json_str(r#"{"formats": ["qr_code", "unknown"]}"#).unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));

        let err = ScannerConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, ScanError::Json(_)));
    }
}
