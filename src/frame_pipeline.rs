/// Frame detection pipeline with primary, secondary and merge stages
///
/// Processes single frames through:
/// 1. Primary: whole-frame recognition
/// 2. Secondary: candidate regions -> rectified, enhanced crops -> recognition
/// 3. Merge: secondary results fill gaps the primary pass missed
///
/// Every failure inside a stage is logged and treated as "no codes from this
/// path"; a bad frame never propagates an error to the scan loop.
use crate::config::ScannerConfig;
use crate::geometry::rotated_corners;
use crate::merge::merge_detections;
use crate::recognizer::Recognizer;
use crate::rectify::Rectifier;
use crate::roi::RoiExtractor;
use crate::types::{BarcodeFormat, DetectedCode, Frame, RotatedRegion};
use image::{DynamicImage, RgbImage};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tokio::task;

/// Final output of one pipeline run
#[derive(Clone, Debug, Default)]
pub struct PipelineOutput {
    pub codes: Vec<DetectedCode>,
    pub primary_count: usize,
    pub secondary_count: usize,
    pub candidates: usize,
    pub duplicates_removed: usize,
    pub pipeline_total_time_ms: f32,
}

/// Detection pipeline shared by every tick of a scanning session
pub struct DetectionPipeline {
    recognizer: Arc<dyn Recognizer>,
    roi: RoiExtractor,
    rectifier: Rectifier,
    formats: Vec<BarcodeFormat>,
    region_detection: bool,
}

impl DetectionPipeline {
    pub fn new(recognizer: Arc<dyn Recognizer>, config: &ScannerConfig) -> Self {
        Self {
            recognizer,
            roi: RoiExtractor::new(config.roi.clone()),
            rectifier: Rectifier::new(config.rectify.clone()),
            formats: config.formats.clone(),
            region_detection: config.region_detection,
        }
    }

    pub fn region_detection(&self) -> bool {
        self.region_detection
    }

    /// Whole-frame recognition
    pub fn primary(&self, image: &DynamicImage) -> Vec<DetectedCode> {
        match self.recognizer.detect(image, &self.formats) {
            Ok(codes) => codes,
            Err(e) => {
                log::warn!("⚠️  Primary recognition failed ({}): {}", self.recognizer.name(), e);
                Vec::new()
            }
        }
    }

    /// Recognize one candidate region; codes carry the region's own geometry
    fn recognize_region(&self, frame: &RgbImage, region: &RotatedRegion) -> Vec<DetectedCode> {
        let crop = match self.rectifier.prepare(frame, region) {
            Ok(crop) => crop,
            Err(e) => {
                log::debug!("Skipping region at ({:.1}, {:.1}): {}", region.center.x, region.center.y, e);
                return Vec::new();
            }
        };

        let codes = match self
            .recognizer
            .detect(&DynamicImage::ImageLuma8(crop), &self.formats)
        {
            Ok(codes) => codes,
            Err(e) => {
                log::warn!("⚠️  Region recognition failed: {}", e);
                return Vec::new();
            }
        };

        let bounding_box = region.upright_bounds();
        let corners = rotated_corners(region).to_vec();

        codes
            .into_iter()
            .map(|code| DetectedCode {
                raw_value: code.raw_value,
                format: code.format,
                bounding_box,
                corner_points: corners.clone(),
            })
            .collect()
    }

    /// Per-region recognition; returns the candidate count and the codes
    ///
    /// Regions are processed in parallel but results keep region order.
    pub fn secondary(&self, image: &DynamicImage) -> (usize, Vec<DetectedCode>) {
        let regions = match self.roi.extract(image) {
            Ok(regions) => regions,
            Err(e) => {
                log::warn!("⚠️  Region extraction failed: {}", e);
                return (0, Vec::new());
            }
        };

        if regions.is_empty() {
            return (0, Vec::new());
        }

        let frame = image.to_rgb8();
        let per_region: Vec<Vec<DetectedCode>> = regions
            .par_iter()
            .map(|region| self.recognize_region(&frame, region))
            .collect();

        (regions.len(), per_region.into_iter().flatten().collect())
    }

    /// Run all stages synchronously
    pub fn run(&self, image: &DynamicImage) -> PipelineOutput {
        let pipeline_start_time = Instant::now();

        let primary = self.primary(image);
        let primary_count = primary.len();

        let (candidates, secondary) = if self.region_detection {
            self.secondary(image)
        } else {
            (0, Vec::new())
        };
        let secondary_count = secondary.len();

        let codes = merge_detections(primary, secondary);
        let duplicates_removed = primary_count + secondary_count - codes.len();
        let pipeline_total_time_ms = pipeline_start_time.elapsed().as_secs_f32() * 1000.0;

        log::debug!(
            "{} codes ({} primary, {} secondary from {} regions, {} duplicates), time: {:.2} ms",
            codes.len(),
            primary_count,
            secondary_count,
            candidates,
            duplicates_removed,
            pipeline_total_time_ms,
        );

        PipelineOutput {
            codes,
            primary_count,
            secondary_count,
            candidates,
            duplicates_removed,
            pipeline_total_time_ms,
        }
    }

    /// Run the pipeline on a blocking worker so the scan loop stays responsive
    pub async fn process(self: &Arc<Self>, frame: &Frame) -> PipelineOutput {
        let pipeline = Arc::clone(self);
        let image = Arc::clone(&frame.image);

        match task::spawn_blocking(move || pipeline.run(&image)).await {
            Ok(output) => output,
            Err(e) => {
                log::error!("Detection task for frame {} failed: {}", frame.frame_id, e);
                PipelineOutput::default()
            }
        }
    }
}
