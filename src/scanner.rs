/// Scanning session - wires the scan loop to tracking, overlay and consumers
///
/// Owns the scheduler, the code tracker and the last rendered overlay. Scan
/// loop events are turned into:
/// - `ScanEvent::Scan` for the consumer
/// - display-space mapping, lifecycle classification and overlay rendering
///   for every found event, followed by `ScanEvent::Found`
/// - `ScanEvent::BoxClicked` when a click hits a rendered box
use crate::config::ScannerConfig;
use crate::coords::CoverMapping;
use crate::error::{Result, ScanError};
use crate::frame_pipeline::DetectionPipeline;
use crate::overlay::{hit_test, OverlayRenderer};
use crate::recognizer::Recognizer;
use crate::scheduler::{FrameSource, ScanListener, ScanScheduler, StatsSnapshot};
use crate::tracking::{CodeTracker, ErrorCallback, Validator};
use crate::types::{AdjustedCode, DetectedCode, FrameSize, TrackedBox};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use image::RgbaImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Rendering surface the overlay is drawn onto
pub trait DisplaySurface: Send + Sync {
    /// Current display size; `None` while the surface is unavailable
    fn display_size(&self) -> Option<FrameSize>;

    /// Replace the visible overlay
    fn present(&self, overlay: &RgbaImage) -> Result<()>;
}

/// Events delivered to the scanner's consumer
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// Full detected list in native frame space
    Scan(Vec<DetectedCode>),
    /// Codes currently on the overlay; empty when the overlay was cleared
    Found(Vec<AdjustedCode>),
    /// Raw value of a clicked overlay box
    BoxClicked(String),
}

/// External collaborators of a scanning session
pub struct Collaborators {
    pub source: Arc<dyn FrameSource>,
    pub recognizer: Arc<dyn Recognizer>,
    pub validator: Arc<dyn Validator>,
    pub surface: Arc<dyn DisplaySurface>,
    pub on_error: Option<ErrorCallback>,
}

/// Session state shared with the scan loop
struct Session {
    tracker: Arc<CodeTracker>,
    surface: Arc<dyn DisplaySurface>,
    renderer: OverlayRenderer,
    overlay_enabled: bool,
    events: Sender<ScanEvent>,
    boxes: Mutex<Vec<TrackedBox>>,
    mapping: Mutex<Option<CoverMapping>>,
    surface_failed: AtomicBool,
    on_error: Option<ErrorCallback>,
}

impl Session {
    fn emit(&self, event: ScanEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!("⚠️  Event channel full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("Event receiver gone, dropping event");
            }
        }
    }

    /// Report a surface failure once until the next successful render
    fn surface_failure(&self, err: ScanError) {
        if self.surface_failed.swap(true, Ordering::SeqCst) {
            log::debug!("{}", err);
            return;
        }
        log::error!("❌ {}", err);
        if let Some(callback) = &self.on_error {
            callback(&err);
        }
    }

    fn present(&self, canvas: &RgbaImage) -> bool {
        match self.surface.present(canvas) {
            Ok(()) => {
                self.surface_failed.store(false, Ordering::SeqCst);
                true
            }
            Err(e) => {
                self.surface_failure(e);
                false
            }
        }
    }

    /// Mapping for the current sizes, rebuilt when either size changes
    fn mapping_for(&self, native: FrameSize, display: FrameSize) -> Result<CoverMapping> {
        let mut cached = self.mapping.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mapping) = cached.as_ref() {
            if mapping.matches(native, display) {
                return Ok(*mapping);
            }
        }
        let mapping = CoverMapping::new(native, display)?;
        log::debug!(
            "Cover mapping {}x{} -> {}x{}: scale {:.3}, offset ({:.1}, {:.1})",
            native.width,
            native.height,
            display.width,
            display.height,
            mapping.scale_factor,
            mapping.offset_x,
            mapping.offset_y
        );
        *cached = Some(mapping);
        Ok(mapping)
    }

    fn set_boxes(&self, boxes: Vec<TrackedBox>) {
        *self.boxes.lock().unwrap_or_else(PoisonError::into_inner) = boxes;
    }

    fn boxes(&self) -> Vec<TrackedBox> {
        self.boxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn clear_overlay(&self) {
        self.set_boxes(Vec::new());
        if let Some(display) = self.surface.display_size().filter(|d| !d.is_empty()) {
            self.present(&RgbaImage::new(display.width, display.height));
        }
    }

    fn render(&self, codes: &[DetectedCode], native: FrameSize) -> Result<Vec<AdjustedCode>> {
        let display = self
            .surface
            .display_size()
            .ok_or_else(|| ScanError::surface("display size unavailable"))?;
        let mapping = self.mapping_for(native, display)?;

        let adjusted: Vec<AdjustedCode> = codes
            .iter()
            .map(|code| {
                let (display_box, display_corners) = mapping.map_code(code);
                AdjustedCode {
                    code: code.clone(),
                    display_box,
                    display_corners,
                    color: self.tracker.color_for(&code.raw_value),
                }
            })
            .collect();

        let mut canvas = RgbaImage::new(display.width, display.height);
        let boxes = self.renderer.render(&mut canvas, &adjusted);
        // Only boxes that actually reached the display are clickable
        if self.present(&canvas) {
            self.set_boxes(boxes);
        } else {
            self.set_boxes(Vec::new());
        }
        Ok(adjusted)
    }
}

impl ScanListener for Session {
    fn on_scan(&self, codes: &[DetectedCode]) {
        self.emit(ScanEvent::Scan(codes.to_vec()));
    }

    fn on_found(&self, codes: &[DetectedCode], native: FrameSize) {
        if !codes.is_empty() {
            // Fire-and-forget; completions land in the tracker
            drop(self.tracker.observe(codes));
        }

        if codes.is_empty() || !self.overlay_enabled {
            self.clear_overlay();
            self.emit(ScanEvent::Found(Vec::new()));
            return;
        }

        match self.render(codes, native) {
            Ok(adjusted) => self.emit(ScanEvent::Found(adjusted)),
            Err(e) => {
                self.set_boxes(Vec::new());
                self.surface_failure(e);
            }
        }
    }
}

/// A scanning session over one frame source and display surface
pub struct Scanner {
    config: ScannerConfig,
    scheduler: ScanScheduler,
    session: Arc<Session>,
    events: Receiver<ScanEvent>,
    paused: AtomicBool,
}

impl Scanner {
    /// Build a session; must be called inside a tokio runtime
    pub fn new(config: ScannerConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let Collaborators {
            source,
            recognizer,
            validator,
            surface,
            on_error,
        } = collaborators;

        let mut tracker = CodeTracker::new(validator)?;
        if let Some(callback) = &on_error {
            tracker = tracker.with_error_callback(Arc::clone(callback));
        }

        let (events_tx, events) = bounded(config.event_buffer);
        let session = Arc::new(Session {
            tracker: Arc::new(tracker),
            surface,
            renderer: OverlayRenderer::new(config.overlay_line_width, config.overlay_label_height),
            overlay_enabled: config.overlay_enabled,
            events: events_tx,
            boxes: Mutex::new(Vec::new()),
            mapping: Mutex::new(None),
            surface_failed: AtomicBool::new(false),
            on_error,
        });

        let pipeline = Arc::new(DetectionPipeline::new(recognizer, &config));
        let listener: Arc<dyn ScanListener> = session.clone();
        let scheduler = ScanScheduler::new(source, pipeline, listener, &config)?;

        log::info!(
            "Scanner ready: formats {:?}, region detection {}, overlay {}",
            config.formats,
            config.region_detection,
            config.overlay_enabled
        );

        Ok(Self {
            config,
            scheduler,
            session,
            events,
            paused: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn start(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.scheduler.start();
    }

    pub fn stop(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.scheduler.stop();
    }

    /// Stop sampling but keep the current overlay and hit-test boxes
    pub fn pause(&self) {
        if self.scheduler.is_running() {
            self.scheduler.stop();
            self.paused.store(true, Ordering::SeqCst);
            log::info!("Scanner paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            log::info!("Scanner resumed");
            self.scheduler.start();
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Start a new tracking session and clear the overlay
    pub fn reset(&self) {
        self.session.tracker.reset();
        self.session.clear_overlay();
    }

    /// Raw value of the first rendered box containing the display point
    pub fn click(&self, x: f64, y: f64) -> Option<String> {
        let boxes = self.session.boxes();
        let hit = hit_test(&boxes, x, y)?.raw_value.clone();
        log::debug!("Click at ({:.0}, {:.0}) hit {:?}", x, y, hit);
        self.session.emit(ScanEvent::BoxClicked(hit.clone()));
        Some(hit)
    }

    /// Consumer end of the event channel
    pub fn events(&self) -> Receiver<ScanEvent> {
        self.events.clone()
    }

    pub fn tracked_boxes(&self) -> Vec<TrackedBox> {
        self.session.boxes()
    }

    pub fn tracker(&self) -> &CodeTracker {
        &self.session.tracker
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.scheduler.stats()
    }
}
