//! Reconciliation of whole-frame and per-region recognizer output

use crate::types::DetectedCode;

/// Top-left corners closer than this are treated as the same physical code
pub const DUPLICATE_DISTANCE: f64 = 10.0;

/// Whether a secondary detection repeats a primary one
///
/// Matches on identical decoded text, or on bounding boxes whose top-left
/// corners are closer than `max_distance`.
#[inline]
pub fn is_duplicate(primary: &DetectedCode, secondary: &DetectedCode, max_distance: f64) -> bool {
    primary.raw_value == secondary.raw_value
        || primary
            .bounding_box
            .top_left()
            .distance(&secondary.bounding_box.top_left())
            < max_distance
}

/// Primary detections followed by the secondary ones the primary pass missed
///
/// Secondary results never replace primary ones; each is checked against the
/// primary list only.
pub fn merge_detections(
    primary: Vec<DetectedCode>,
    secondary: Vec<DetectedCode>,
) -> Vec<DetectedCode> {
    let additions: Vec<DetectedCode> = secondary
        .into_iter()
        .filter(|candidate| {
            !primary
                .iter()
                .any(|p| is_duplicate(p, candidate, DUPLICATE_DISTANCE))
        })
        .collect();

    let mut merged = primary;
    merged.extend(additions);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BarcodeFormat, BoundingBox};

    fn code(value: &str, x: f64, y: f64) -> DetectedCode {
        DetectedCode::new(
            value,
            BarcodeFormat::QrCode,
            BoundingBox::new(x, y, 10.0, 10.0),
            Vec::new(),
        )
    }

    #[test]
    fn test_primary_wins_over_nearby_secondary() {
        let merged = merge_detections(vec![code("A", 0.0, 0.0)], vec![code("A", 1.0, 1.0)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].bounding_box, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_same_value_far_away_is_duplicate() {
        let merged = merge_detections(vec![code("A", 0.0, 0.0)], vec![code("A", 300.0, 300.0)]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_different_value_at_same_place_is_duplicate() {
        let merged = merge_detections(vec![code("A", 0.0, 0.0)], vec![code("B", 3.0, 4.0)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].raw_value, "A");
    }

    #[test]
    fn test_secondary_fills_gaps_in_order() {
        let merged = merge_detections(
            vec![code("A", 0.0, 0.0)],
            vec![code("B", 100.0, 0.0), code("C", 10.0, 0.0)],
        );
        let values: Vec<&str> = merged.iter().map(|c| c.raw_value.as_str()).collect();
        // C sits exactly DUPLICATE_DISTANCE away, which is not a duplicate
        assert_eq!(values, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_empty_primary_keeps_all_secondary() {
        let merged = merge_detections(Vec::new(), vec![code("B", 0.0, 0.0), code("C", 50.0, 0.0)]);
        assert_eq!(merged.len(), 2);
    }
}
