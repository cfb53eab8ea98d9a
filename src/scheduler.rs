/// Frame scheduler - the recurring scan loop
///
/// One tokio task ticks on the host frame clock:
/// - throttles sampling to the retry delay
/// - skips ticks while the frame source is not ready
/// - runs the detection pipeline and awaits it before the next tick
/// - decides which events to emit through a pure state transition
///
/// Ticks never overlap, including across a stop and an immediate restart:
/// every tick body runs under a lock shared by all loops of one scheduler.
///
/// The per-session loop state is an immutable value threaded from tick to
/// tick, so the emission rules are testable without a runtime.
use crate::config::ScannerConfig;
use crate::error::{Result, ScanError};
use crate::frame_pipeline::DetectionPipeline;
use crate::types::{DetectedCode, Frame, FrameSize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const STATS_LOG_INTERVAL: u64 = 100;

/// Video frame provider
pub trait FrameSource: Send + Sync {
    /// Whether enough data is buffered to sample a frame
    fn is_ready(&self) -> bool;

    /// Latest frame, if any
    fn current_frame(&self) -> Option<Frame>;
}

/// Receiver of scan loop events
pub trait ScanListener: Send + Sync {
    /// Full detected list, emitted on new content or repeated emission
    fn on_scan(&self, codes: &[DetectedCode]);

    /// Detected list for the overlay; empty means "clear"
    fn on_found(&self, codes: &[DetectedCode], native: FrameSize);
}

/// Emission rules for one scanning session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanPolicy {
    pub retry_delay: Duration,
    pub scan_delay: Duration,
    pub allow_multiple: bool,
}

impl ScanPolicy {
    pub fn from_config(config: &ScannerConfig) -> Self {
        Self {
            retry_delay: config.retry_delay(),
            scan_delay: config.scan_delay(),
            allow_multiple: config.allow_multiple,
        }
    }
}

/// Events a tick should emit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Emission {
    pub scan: bool,
    pub found: bool,
}

/// State carried from one tick to the next
#[derive(Debug, Clone, PartialEq)]
pub struct ScanLoopState {
    pub last_scan: Instant,
    pub last_emitted_scan: Instant,
    pub previous_had_content: bool,
    pub last_seen: HashSet<String>,
}

impl ScanLoopState {
    /// Fresh session state; the first sample waits one retry delay
    pub fn new(now: Instant) -> Self {
        Self {
            last_scan: now,
            last_emitted_scan: now,
            previous_had_content: false,
            last_seen: HashSet::new(),
        }
    }

    pub fn is_throttled(&self, now: Instant, retry_delay: Duration) -> bool {
        now.saturating_duration_since(self.last_scan) < retry_delay
    }

    /// Next state and the events to emit for a sampled tick
    pub fn advance(&self, now: Instant, codes: &[DetectedCode], policy: &ScanPolicy) -> (Self, Emission) {
        let any_new = codes.iter().any(|c| !self.last_seen.contains(&c.raw_value));
        let has_content = !codes.is_empty();
        let scan_delay_elapsed =
            now.saturating_duration_since(self.last_emitted_scan) >= policy.scan_delay;

        let scan = any_new || (policy.allow_multiple && has_content && scan_delay_elapsed);
        let found = has_content || self.previous_had_content;

        let last_seen = if any_new {
            codes.iter().map(|c| c.raw_value.clone()).collect()
        } else {
            self.last_seen.clone()
        };

        let next = Self {
            last_scan: now,
            last_emitted_scan: if scan { now } else { self.last_emitted_scan },
            previous_had_content: has_content,
            last_seen,
        };
        (next, Emission { scan, found })
    }
}

/// Loop counters, readable while the loop runs
#[derive(Debug, Default)]
pub struct SchedulerStats {
    ticks: AtomicU64,
    sampled: AtomicU64,
    throttled: AtomicU64,
    skipped: AtomicU64,
    scans_emitted: AtomicU64,
    found_emitted: AtomicU64,
}

/// Point-in-time copy of [`SchedulerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub sampled: u64,
    pub throttled: u64,
    pub skipped: u64,
    pub scans_emitted: u64,
    pub found_emitted: u64,
}

impl SchedulerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            sampled: self.sampled.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            scans_emitted: self.scans_emitted.load(Ordering::Relaxed),
            found_emitted: self.found_emitted.load(Ordering::Relaxed),
        }
    }
}

struct RunningLoop {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Everything the loop task needs, cloned into it on start
#[derive(Clone)]
struct LoopContext {
    source: Arc<dyn FrameSource>,
    pipeline: Arc<DetectionPipeline>,
    listener: Arc<dyn ScanListener>,
    policy: ScanPolicy,
    frame_interval: Duration,
    stats: Arc<SchedulerStats>,
    tick_lock: Arc<tokio::sync::Mutex<()>>,
}

pub struct ScanScheduler {
    context: LoopContext,
    running: Mutex<Option<RunningLoop>>,
    runtime: Handle,
}

impl ScanScheduler {
    pub fn new(
        source: Arc<dyn FrameSource>,
        pipeline: Arc<DetectionPipeline>,
        listener: Arc<dyn ScanListener>,
        config: &ScannerConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| ScanError::runtime(format!("scan scheduler needs a tokio runtime: {}", e)))?;
        Ok(Self {
            context: LoopContext {
                source,
                pipeline,
                listener,
                policy: ScanPolicy::from_config(config),
                frame_interval: config.frame_interval(),
                stats: Arc::new(SchedulerStats::default()),
                tick_lock: Arc::new(tokio::sync::Mutex::new(())),
            },
            running: Mutex::new(None),
            runtime,
        })
    }

    pub fn policy(&self) -> ScanPolicy {
        self.context.policy
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.context.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|running| !running.handle.is_finished())
            .unwrap_or(false)
    }

    /// Begin ticking; a second call while running is a no-op
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = running.as_ref() {
            if !active.handle.is_finished() {
                log::debug!("Scan loop already running");
                return;
            }
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let context = self.context.clone();
        let handle = self.runtime.spawn(run_loop(context, shutdown_rx));
        *running = Some(RunningLoop {
            shutdown_tx,
            handle,
        });
    }

    /// Cancel the loop; safe to call when already stopped
    ///
    /// A tick that is mid-detection is abandoned without emitting. A tick
    /// already inside a listener callback finishes first; a loop started
    /// right after waits for it.
    pub fn stop(&self) {
        let taken = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(active) = taken {
            let _ = active.shutdown_tx.send(());
        }
    }
}

impl Drop for ScanScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(context: LoopContext, mut shutdown_rx: oneshot::Receiver<()>) {
    log::info!(
        "🎬 Scan loop started (frame interval {:?}, retry delay {:?}, scan delay {:?}, allow multiple: {}, region detection: {})",
        context.frame_interval,
        context.policy.retry_delay,
        context.policy.scan_delay,
        context.policy.allow_multiple,
        context.pipeline.region_detection()
    );

    let mut interval = tokio::time::interval(context.frame_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut state = ScanLoopState::new(Instant::now());
    let stats = &context.stats;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            _ = interval.tick() => {}
        }
        let _tick = tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            guard = context.tick_lock.lock() => guard,
        };

        let now = Instant::now();
        let ticks = stats.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if ticks % STATS_LOG_INTERVAL == 0 {
            let s = stats.snapshot();
            log::info!(
                "Scan loop: {} ticks, {} sampled, {} throttled, {} skipped, {} scan / {} found events",
                s.ticks,
                s.sampled,
                s.throttled,
                s.skipped,
                s.scans_emitted,
                s.found_emitted
            );
        }

        if state.is_throttled(now, context.policy.retry_delay) {
            stats.throttled.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let frame = if context.source.is_ready() {
            context.source.current_frame()
        } else {
            None
        };
        let Some(frame) = frame else {
            stats.skipped.fetch_add(1, Ordering::Relaxed);
            continue;
        };

        let output = tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            output = context.pipeline.process(&frame) => output,
        };
        stats.sampled.fetch_add(1, Ordering::Relaxed);

        let (next, emission) = state.advance(now, &output.codes, &context.policy);
        state = next;

        if emission.scan {
            stats.scans_emitted.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "Frame {}: scan event with {} codes ({:?} after capture)",
                frame.frame_id,
                output.codes.len(),
                frame.timestamp.elapsed()
            );
            context.listener.on_scan(&output.codes);
        }
        if emission.found {
            stats.found_emitted.fetch_add(1, Ordering::Relaxed);
            context.listener.on_found(&output.codes, frame.native_size());
        }
    }

    log::info!("Scan loop stopped after {} ticks", stats.ticks.load(Ordering::Relaxed));
}
