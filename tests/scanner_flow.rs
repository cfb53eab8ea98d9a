use async_trait::async_trait;
use code_scanner::{
    BarcodeFormat, BoundingBox, Collaborators, DetectedCode, DisplaySurface, Frame, FrameSize,
    FrameSource, OverlayColor, Result, ScanEvent, Scanner, ScannerConfig, Validator,
};
use image::{DynamicImage, GrayImage, Luma, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
    code_scanner::init().unwrap();
}

struct StaticSource {
    image: DynamicImage,
    frames: AtomicUsize,
}

impl StaticSource {
    fn new(image: DynamicImage) -> Arc<Self> {
        Arc::new(Self {
            image,
            frames: AtomicUsize::new(0),
        })
    }
}

impl FrameSource for StaticSource {
    fn is_ready(&self) -> bool {
        true
    }

    fn current_frame(&self) -> Option<Frame> {
        let id = self.frames.fetch_add(1, Ordering::SeqCst) as u64;
        Some(Frame::new(id, self.image.clone()))
    }
}

struct SlowValidator {
    calls: AtomicUsize,
}

#[async_trait]
impl Validator for SlowValidator {
    async fn validate(&self, _raw_value: &str) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(true)
    }
}

struct Surface {
    size: FrameSize,
}

impl DisplaySurface for Surface {
    fn display_size(&self) -> Option<FrameSize> {
        Some(self.size)
    }

    fn present(&self, _overlay: &RgbaImage) -> Result<()> {
        Ok(())
    }
}

/// Collect events for `duration`, draining the channel every few milliseconds
async fn collect_events(scanner: &Scanner, duration: Duration) -> Vec<ScanEvent> {
    let events = scanner.events();
    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + duration;
    while tokio::time::Instant::now() < deadline {
        collected.extend(events.try_iter());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    collected.extend(events.try_iter());
    collected
}

fn found_colors(events: &[ScanEvent], value: &str) -> Vec<OverlayColor> {
    events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::Found(codes) => codes.iter().find(|c| c.raw_value() == value).map(|c| c.color),
            _ => None,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_code_turns_green_after_validation() {
    init_logging();

    let config = ScannerConfig {
        retry_delay_ms: Some(0),
        region_detection: false,
        frame_interval_ms: 10,
        event_buffer: 512,
        ..ScannerConfig::default()
    };
    let recognizer = |_: &DynamicImage, _: &[BarcodeFormat]| -> Result<Vec<DetectedCode>> {
        Ok(vec![DetectedCode::new(
            "ABC123",
            BarcodeFormat::QrCode,
            BoundingBox::new(10.0, 10.0, 20.0, 20.0),
            Vec::new(),
        )])
    };
    let validator = Arc::new(SlowValidator {
        calls: AtomicUsize::new(0),
    });

    let scanner = Scanner::new(
        config,
        Collaborators {
            source: StaticSource::new(DynamicImage::ImageLuma8(GrayImage::new(64, 48))),
            recognizer: Arc::new(recognizer),
            validator: validator.clone(),
            surface: Arc::new(Surface {
                size: FrameSize::new(128, 96),
            }),
            on_error: None,
        },
    )
    .unwrap();

    scanner.start();
    let events = collect_events(&scanner, Duration::from_millis(400)).await;

    // Scan fires once, on first appearance
    let scans: Vec<&ScanEvent> = events.iter().filter(|e| matches!(e, ScanEvent::Scan(_))).collect();
    assert_eq!(scans.len(), 1);

    // Yellow while pending, then green, never back
    let colors = found_colors(&events, "ABC123");
    assert_eq!(colors.first(), Some(&OverlayColor::Yellow));
    let first_green = colors
        .iter()
        .position(|c| *c == OverlayColor::Green)
        .expect("code never turned green");
    assert!(colors[first_green..].iter().all(|c| *c == OverlayColor::Green));

    assert_eq!(validator.calls.load(Ordering::SeqCst), 1);

    // Box at (10, 10, 20, 20) in native space is (20, 20, 40, 40) on the display
    assert_eq!(scanner.click(30.0, 30.0), Some("ABC123".to_string()));
    assert_eq!(scanner.click(100.0, 90.0), None);

    scanner.stop();
    assert!(!scanner.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_region_pass_recovers_missed_code() {
    init_logging();

    // Barcode-like block the whole-frame pass "misses"
    let mut frame = GrayImage::from_pixel(240, 200, Luma([255]));
    for k in 0..6u32 {
        let x0 = 72 + 16 * k;
        for x in x0..x0 + 8 {
            for y in 70..130 {
                frame.put_pixel(x, y, Luma([0]));
            }
        }
    }

    let config = ScannerConfig {
        retry_delay_ms: Some(0),
        frame_interval_ms: 10,
        event_buffer: 512,
        ..ScannerConfig::default()
    };
    let recognizer = |image: &DynamicImage, _: &[BarcodeFormat]| -> Result<Vec<DetectedCode>> {
        if image.width() == 240 {
            return Ok(Vec::new());
        }
        Ok(vec![DetectedCode::new(
            "CROP",
            BarcodeFormat::Code128,
            BoundingBox::new(0.0, 0.0, image.width() as f64, image.height() as f64),
            Vec::new(),
        )])
    };

    let scanner = Scanner::new(
        config,
        Collaborators {
            source: StaticSource::new(DynamicImage::ImageLuma8(frame)),
            recognizer: Arc::new(recognizer),
            validator: Arc::new(SlowValidator {
                calls: AtomicUsize::new(0),
            }),
            surface: Arc::new(Surface {
                size: FrameSize::new(240, 200),
            }),
            on_error: None,
        },
    )
    .unwrap();

    scanner.start();
    let events = collect_events(&scanner, Duration::from_millis(300)).await;
    scanner.stop();

    let codes = events
        .iter()
        .find_map(|e| match e {
            ScanEvent::Scan(codes) => Some(codes.clone()),
            _ => None,
        })
        .expect("no scan event");

    // Region results carry the region's geometry, not the crop's
    let best = &codes[0];
    assert_eq!(best.raw_value, "CROP");
    assert_eq!(best.corner_points.len(), 4);
    let cx = best.bounding_box.x + best.bounding_box.width / 2.0;
    let cy = best.bounding_box.y + best.bounding_box.height / 2.0;
    assert!((cx - 116.0).abs() < 10.0, "center x {}", cx);
    assert!((cy - 100.0).abs() < 10.0, "center y {}", cy);
}
