/// Region-of-interest extraction
///
/// Finds areas of a frame that are likely to hold an optical code:
/// 1. Binarization: box blur, inverted adaptive threshold, closing,
///    erosion + dilation, Canny edges
/// 2. Contours: outer borders only, largest enclosed area first
/// 3. Candidates: minimum-area rotated rectangle per contour, padded and
///    deduplicated by center distance
use crate::config::RoiConfig;
use crate::error::{Result, ScanError};
use crate::geometry::{min_area_rect, polygon_area};
use crate::types::{Point, RotatedRegion};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::{box_filter, gaussian_blur_f32};
use imageproc::morphology::{close, dilate, erode};

/// Smallest frame side the morphology chain can work with
const MIN_FRAME_SIDE: u32 = 3;

/// Extracts padded, deduplicated candidate regions from frames
#[derive(Debug, Clone)]
pub struct RoiExtractor {
    config: RoiConfig,
}

impl RoiExtractor {
    pub fn new(config: RoiConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoiConfig {
        &self.config
    }

    /// Inverted adaptive threshold against a Gaussian-weighted local mean
    ///
    /// A pixel becomes foreground when it is darker than `mean - offset`.
    fn adaptive_threshold_inv(&self, gray: &GrayImage) -> GrayImage {
        let local_mean = gaussian_blur_f32(gray, self.config.threshold_block_sigma);
        let offset = self.config.threshold_offset;

        let mut out = GrayImage::new(gray.width(), gray.height());
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let src = gray.get_pixel(x, y)[0] as i16;
            let threshold = local_mean.get_pixel(x, y)[0] as i16 - offset;
            *pixel = if src > threshold { Luma([0]) } else { Luma([255]) };
        }
        out
    }

    /// Edge map of the cleaned-up binary mask
    pub fn edge_map(&self, gray: &GrayImage) -> Result<GrayImage> {
        if gray.width() < MIN_FRAME_SIDE || gray.height() < MIN_FRAME_SIDE {
            return Err(ScanError::preprocessing(format!(
                "frame too small for region extraction: {}x{}",
                gray.width(),
                gray.height()
            )));
        }
        if self.config.threshold_block_sigma <= 0.0 {
            return Err(ScanError::preprocessing("threshold sigma must be positive"));
        }

        let blurred = box_filter(gray, self.config.blur_radius, self.config.blur_radius);
        let binary = self.adaptive_threshold_inv(&blurred);
        let closed = close(&binary, Norm::LInf, self.config.close_radius);

        // Repeated 3x3 passes collapse into a single square of radius k
        let eroded = erode(&closed, Norm::LInf, self.config.morph_iterations);
        let reconnected = dilate(&eroded, Norm::LInf, self.config.morph_iterations);

        Ok(canny(
            &reconnected,
            self.config.canny_low,
            self.config.canny_high,
        ))
    }

    /// Candidate regions, largest enclosed area first
    pub fn extract(&self, image: &DynamicImage) -> Result<Vec<RotatedRegion>> {
        let gray = image.to_luma8();
        let edges = self.edge_map(&gray)?;

        let mut contours: Vec<(f64, Vec<Point>)> = find_contours::<i32>(&edges)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .map(|c| {
                let points: Vec<Point> = c
                    .points
                    .iter()
                    .map(|p| Point::new(p.x as f64, p.y as f64))
                    .collect();
                (polygon_area(&points), points)
            })
            .collect();

        contours.sort_by(|a, b| b.0.total_cmp(&a.0));
        contours.truncate(self.config.max_candidates);

        let rects = contours
            .iter()
            .filter_map(|(_, points)| min_area_rect(points));

        let candidates = select_candidates(rects, self.config.padding, self.config.min_distance);

        log::debug!(
            "ROI extraction: {} contours kept, {} candidates",
            contours.len(),
            candidates.len()
        );

        Ok(candidates)
    }
}

/// Pad and deduplicate rectangles given in descending-area order
///
/// A rectangle is dropped when its center lies within `min_distance` of an
/// already accepted rectangle's unpadded center. Output keeps input order.
pub fn select_candidates<I>(rects: I, padding: f64, min_distance: f64) -> Vec<RotatedRegion>
where
    I: IntoIterator<Item = RotatedRegion>,
{
    let mut accepted = Vec::new();
    let mut centers: Vec<Point> = Vec::new();

    for rect in rects {
        if centers
            .iter()
            .any(|prev| rect.center.distance(prev) < min_distance)
        {
            continue;
        }
        centers.push(rect.center);
        accepted.push(rect.padded(padding));
    }

    accepted
}
