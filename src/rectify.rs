/// Perspective rectification and crop enhancement
///
/// Each candidate region is warped into an upright canonical rectangle whose
/// short side has a fixed length, then sharpened and contrast-normalised so
/// the recognizer sees a clean, high-contrast crop.
use crate::config::RectifyConfig;
use crate::error::{Result, ScanError};
use crate::geometry::{matrix_to_row_major, perspective_transform, rotated_corners};
use crate::types::{Point, RotatedRegion};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contrast::equalize_histogram;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

/// Output size of a rectified crop in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanonicalSize {
    pub width: f64,
    pub height: f64,
}

impl CanonicalSize {
    pub fn pixels(&self) -> (u32, u32) {
        (
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }
}

/// Warps candidate regions into canonical crops
#[derive(Debug, Clone)]
pub struct Rectifier {
    config: RectifyConfig,
}

impl Rectifier {
    pub fn new(config: RectifyConfig) -> Self {
        Self { config }
    }

    /// Long/short side lengths from the region's aspect ratio
    ///
    /// The long side lies along x unless the region is near-vertical
    /// (angle above the swap threshold), in which case the sides swap.
    pub fn canonical_size(&self, region: &RotatedRegion) -> Result<CanonicalSize> {
        if !(region.width > f64::EPSILON && region.height > f64::EPSILON) {
            return Err(ScanError::rectification(format!(
                "degenerate region {:.2}x{:.2}",
                region.width, region.height
            )));
        }

        let short = self.config.short_side;
        let aspect = region.height / region.width;
        let (mut long_side, mut short_side) = if aspect >= 1.0 {
            (short * aspect, short)
        } else {
            (short / aspect, short)
        };

        if region.angle_deg > self.config.swap_angle_deg {
            std::mem::swap(&mut long_side, &mut short_side);
        }

        Ok(CanonicalSize {
            width: long_side.min(self.config.max_long_side),
            height: short_side.min(self.config.max_long_side),
        })
    }

    /// Warp the region of `frame` onto an upright canonical rectangle
    pub fn rectify(&self, frame: &RgbImage, region: &RotatedRegion) -> Result<RgbImage> {
        let size = self.canonical_size(region)?;
        let (out_w, out_h) = size.pixels();

        let src = rotated_corners(region);
        let dst = [
            Point::new(0.0, 0.0),
            Point::new(size.width, 0.0),
            Point::new(size.width, size.height),
            Point::new(0.0, size.height),
        ];

        let h = perspective_transform(&src, &dst)
            .ok_or_else(|| ScanError::rectification("degenerate corner correspondences"))?;
        let projection = Projection::from_matrix(matrix_to_row_major(&h))
            .ok_or_else(|| ScanError::rectification("non-invertible perspective transform"))?;

        let mut out = RgbImage::new(out_w, out_h);
        warp_into(
            frame,
            &projection,
            Interpolation::Bilinear,
            Rgb([255, 255, 255]),
            &mut out,
        );
        Ok(out)
    }

    /// Unsharp mask, grayscale, histogram equalization, truncating threshold
    pub fn enhance(&self, crop: &RgbImage) -> GrayImage {
        let blurred = gaussian_blur_f32(crop, self.config.sharpen_sigma);

        let mut sharpened = crop.clone();
        for (out, (src, blur)) in sharpened
            .iter_mut()
            .zip(crop.iter().zip(blurred.iter()))
        {
            let detail = src.saturating_sub(*blur);
            *out = src.saturating_add(detail);
        }

        let gray = image::imageops::grayscale(&sharpened);
        let mut equalized = equalize_histogram(&gray);

        let level = self.config.truncate_level;
        for pixel in equalized.pixels_mut() {
            if pixel[0] > level {
                *pixel = Luma([level]);
            }
        }
        equalized
    }

    /// Rectified and enhanced crop, ready for recognition
    pub fn prepare(&self, frame: &RgbImage, region: &RotatedRegion) -> Result<GrayImage> {
        let crop = self.rectify(frame, region)?;
        Ok(self.enhance(&crop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rectifier() -> Rectifier {
        Rectifier::new(RectifyConfig::default())
    }

    fn region(w: f64, h: f64, angle: f64) -> RotatedRegion {
        RotatedRegion::new(Point::new(50.0, 50.0), w, h, angle)
    }

    #[test]
    fn test_canonical_size_from_aspect() {
        let size = rectifier().canonical_size(&region(100.0, 50.0, 10.0)).unwrap();
        assert_abs_diff_eq!(size.width, 400.0);
        assert_abs_diff_eq!(size.height, 200.0);

        let size = rectifier().canonical_size(&region(50.0, 100.0, 10.0)).unwrap();
        assert_abs_diff_eq!(size.width, 400.0);
        assert_abs_diff_eq!(size.height, 200.0);

        let size = rectifier().canonical_size(&region(60.0, 60.0, 0.0)).unwrap();
        assert_eq!(size.pixels(), (200, 200));
    }

    #[test]
    fn test_canonical_size_swaps_near_vertical() {
        let size = rectifier().canonical_size(&region(100.0, 50.0, 85.0)).unwrap();
        assert_abs_diff_eq!(size.width, 200.0);
        assert_abs_diff_eq!(size.height, 400.0);
    }

    #[test]
    fn test_canonical_size_is_capped() {
        let size = rectifier().canonical_size(&region(1000.0, 10.0, 0.0)).unwrap();
        assert_abs_diff_eq!(size.width, 2000.0);
        assert_abs_diff_eq!(size.height, 200.0);
    }

    #[test]
    fn test_degenerate_region_rejected() {
        let err = rectifier().canonical_size(&region(0.0, 10.0, 0.0)).unwrap_err();
        assert!(matches!(err, ScanError::Rectification(_)));
    }

    #[test]
    fn test_rectify_preserves_layout() {
        // Black block fills the left half of the region, white the right half
        let mut frame = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        for x in 20..40 {
            for y in 30..70 {
                frame.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        let region = RotatedRegion::new(Point::new(40.0, 50.0), 40.0, 40.0, 0.0);
        let crop = rectifier().rectify(&frame, &region).unwrap();

        assert_eq!(crop.dimensions(), (200, 200));
        assert!(crop.get_pixel(50, 100)[0] < 50);
        assert!(crop.get_pixel(150, 100)[0] > 200);
    }

    #[test]
    fn test_enhance_truncates_and_keeps_contrast() {
        let mut crop = RgbImage::from_pixel(40, 20, Rgb([220, 220, 220]));
        for x in 0..10 {
            for y in 0..20 {
                crop.put_pixel(x, y, Rgb([30, 30, 30]));
            }
        }
        let enhanced = rectifier().enhance(&crop);

        assert_eq!(enhanced.dimensions(), (40, 20));
        assert!(enhanced.pixels().all(|p| p[0] <= 130));
        assert!(enhanced.get_pixel(5, 10)[0] < enhanced.get_pixel(35, 10)[0]);
    }
}
