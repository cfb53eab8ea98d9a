/// Unified recognizer trait for optical code decoding backends
///
/// The scanner invokes the same recognizer twice per sample: once on the
/// whole frame and once per rectified candidate crop. Backends only need to
/// turn a raster into decoded codes; they must be side-effect free.
use crate::error::Result;
use crate::types::{BarcodeFormat, DetectedCode};
use image::DynamicImage;

/// Common interface for optical code recognizers
pub trait Recognizer: Send + Sync {
    /// Decode every code of the requested formats visible in `image`
    ///
    /// Geometry is reported in the coordinate space of `image`. An empty list
    /// means nothing was found.
    fn detect(&self, image: &DynamicImage, formats: &[BarcodeFormat]) -> Result<Vec<DetectedCode>>;

    /// Recognizer name (for logging/debugging)
    fn name(&self) -> &str {
        "recognizer"
    }
}

/// Closures work as recognizers, which keeps host glue and test fakes short
impl<F> Recognizer for F
where
    F: Fn(&DynamicImage, &[BarcodeFormat]) -> Result<Vec<DetectedCode>> + Send + Sync,
{
    fn detect(&self, image: &DynamicImage, formats: &[BarcodeFormat]) -> Result<Vec<DetectedCode>> {
        self(image, formats)
    }

    fn name(&self) -> &str {
        "closure"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use image::GrayImage;

    #[test]
    fn test_closure_recognizer() {
        let recognizer = |image: &DynamicImage, formats: &[BarcodeFormat]| -> Result<Vec<DetectedCode>> {
            Ok(vec![DetectedCode::new(
                format!("{}x{}", image.width(), image.height()),
                formats.first().copied().unwrap_or(BarcodeFormat::Unknown),
                BoundingBox::default(),
                Vec::new(),
            )])
        };
        let image = DynamicImage::ImageLuma8(GrayImage::new(4, 3));
        let codes = recognizer.detect(&image, &[BarcodeFormat::QrCode]).unwrap();
        assert_eq!(codes[0].raw_value, "4x3");
        assert_eq!(codes[0].format, BarcodeFormat::QrCode);
        assert_eq!(Recognizer::name(&recognizer), "closure");
    }
}
