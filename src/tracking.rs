/// Per-value validation lifecycle tracking
///
/// Every distinct raw value moves through `Unseen -> Pending -> Known | Rejected`.
/// A single map from value to state keeps the three states mutually exclusive,
/// and the check-then-insert of a new value happens under one lock so
/// concurrent observers never submit the same value twice.
///
/// Validation runs as a detached tokio task per new value. Each task carries
/// the session token it was started under; after `reset()` its late result is
/// dropped instead of leaking into the fresh session.
use crate::error::{Result, ScanError};
use crate::types::{DetectedCode, OverlayColor};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// External async validator, called at most once per value per session
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, raw_value: &str) -> anyhow::Result<bool>;
}

/// Sink for errors surfaced by the scanner (validator failures, surface loss)
pub type ErrorCallback = Arc<dyn Fn(&ScanError) + Send + Sync>;

/// Lifecycle state of a value that has been seen at least once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeState {
    Pending,
    Known,
    Rejected,
}

impl CodeState {
    pub fn color(&self) -> OverlayColor {
        match self {
            CodeState::Known => OverlayColor::Green,
            CodeState::Pending => OverlayColor::Yellow,
            CodeState::Rejected => OverlayColor::Red,
        }
    }
}

/// Number of values in each state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerCounts {
    pub pending: usize,
    pub known: usize,
    pub rejected: usize,
}

#[derive(Default)]
struct Lifecycle {
    session: u64,
    states: HashMap<String, CodeState>,
}

/// Tracks the validation lifecycle of every value seen during a session
pub struct CodeTracker {
    lifecycle: Arc<Mutex<Lifecycle>>,
    validator: Arc<dyn Validator>,
    on_error: Option<ErrorCallback>,
    runtime: Handle,
}

fn lock(lifecycle: &Mutex<Lifecycle>) -> MutexGuard<'_, Lifecycle> {
    // States are only ever replaced whole, so a poisoned map is still consistent
    lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CodeTracker {
    /// Create a tracker bound to the current tokio runtime
    pub fn new(validator: Arc<dyn Validator>) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| ScanError::runtime(format!("code tracker needs a tokio runtime: {}", e)))?;
        Ok(Self {
            lifecycle: Arc::new(Mutex::new(Lifecycle::default())),
            validator,
            on_error: None,
            runtime,
        })
    }

    pub fn with_error_callback(mut self, on_error: ErrorCallback) -> Self {
        self.on_error = Some(on_error);
        self
    }

    /// Submit every unseen value to the validator
    ///
    /// Values already pending, known or rejected are skipped. Returns the
    /// handles of the validation tasks started by this call; dropping them
    /// leaves the tasks running.
    pub fn observe(&self, codes: &[DetectedCode]) -> Vec<JoinHandle<()>> {
        let mut submitted = Vec::new();
        let session = {
            let mut lifecycle = lock(&self.lifecycle);
            for code in codes {
                if lifecycle.states.contains_key(&code.raw_value) {
                    continue;
                }
                lifecycle
                    .states
                    .insert(code.raw_value.clone(), CodeState::Pending);
                submitted.push(code.raw_value.clone());
            }
            lifecycle.session
        };

        submitted
            .into_iter()
            .map(|raw_value| {
                log::debug!("🔎 Validating {:?} (session {})", raw_value, session);
                self.runtime.spawn(Self::validate_task(
                    Arc::clone(&self.lifecycle),
                    Arc::clone(&self.validator),
                    self.on_error.clone(),
                    session,
                    raw_value,
                ))
            })
            .collect()
    }

    async fn validate_task(
        lifecycle: Arc<Mutex<Lifecycle>>,
        validator: Arc<dyn Validator>,
        on_error: Option<ErrorCallback>,
        session: u64,
        raw_value: String,
    ) {
        // A panicking validator must still settle the value as rejected
        let value = raw_value.clone();
        let outcome = match tokio::spawn(async move { validator.validate(&value).await }).await {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("validator task failed: {}", e)),
        };

        let (next, failure) = match outcome {
            Ok(true) => (CodeState::Known, None),
            Ok(false) => (CodeState::Rejected, None),
            Err(e) => (CodeState::Rejected, Some(ScanError::validation(raw_value.clone(), e))),
        };

        {
            let mut lifecycle = lock(&lifecycle);
            if lifecycle.session != session {
                log::debug!(
                    "Discarding late validation of {:?} from session {} (now {})",
                    raw_value,
                    session,
                    lifecycle.session
                );
                return;
            }
            match lifecycle.states.get_mut(&raw_value) {
                Some(state) if *state == CodeState::Pending => *state = next,
                _ => return,
            }
        }

        log::debug!("{:?} -> {:?}", raw_value, next);

        if let Some(err) = failure {
            log::warn!("⚠️  {}", err);
            if let Some(callback) = &on_error {
                callback(&err);
            }
        }
    }

    pub fn state_of(&self, raw_value: &str) -> Option<CodeState> {
        lock(&self.lifecycle).states.get(raw_value).copied()
    }

    /// Overlay color for a value; values not yet seen render as pending
    pub fn color_for(&self, raw_value: &str) -> OverlayColor {
        self.state_of(raw_value)
            .map(|state| state.color())
            .unwrap_or(OverlayColor::Yellow)
    }

    /// Forget every value and start a new session
    pub fn reset(&self) {
        let mut lifecycle = lock(&self.lifecycle);
        lifecycle.session += 1;
        lifecycle.states.clear();
        log::info!("Tracking session reset (session {})", lifecycle.session);
    }

    pub fn session(&self) -> u64 {
        lock(&self.lifecycle).session
    }

    pub fn counts(&self) -> TrackerCounts {
        let lifecycle = lock(&self.lifecycle);
        let mut counts = TrackerCounts::default();
        for state in lifecycle.states.values() {
            match state {
                CodeState::Pending => counts.pending += 1,
                CodeState::Known => counts.known += 1,
                CodeState::Rejected => counts.rejected += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BarcodeFormat, BoundingBox};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers after `delay`; values starting with "bad" are rejected,
    /// values starting with "err" fail
    struct FakeValidator {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl FakeValidator {
        fn new(delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(delay_ms),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Validator for FakeValidator {
        async fn validate(&self, raw_value: &str) -> anyhow::Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if raw_value.starts_with("err") {
                anyhow::bail!("backend unavailable");
            }
            Ok(!raw_value.starts_with("bad"))
        }
    }

    fn code(value: &str) -> DetectedCode {
        DetectedCode::new(value, BarcodeFormat::QrCode, BoundingBox::default(), Vec::new())
    }

    async fn settle(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_known_value_is_validated_once() {
        let validator = FakeValidator::new(0);
        let tracker = CodeTracker::new(validator.clone()).unwrap();

        settle(tracker.observe(&[code("ABC123")])).await;
        assert_eq!(tracker.state_of("ABC123"), Some(CodeState::Known));
        assert_eq!(tracker.color_for("ABC123"), OverlayColor::Green);

        for _ in 0..5 {
            assert!(tracker.observe(&[code("ABC123")]).is_empty());
        }
        assert_eq!(validator.calls(), 1);
        assert_eq!(tracker.color_for("ABC123"), OverlayColor::Green);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_value_is_not_resubmitted() {
        let validator = FakeValidator::new(50);
        let tracker = CodeTracker::new(validator.clone()).unwrap();

        let handles = tracker.observe(&[code("ABC123")]);
        assert_eq!(handles.len(), 1);
        assert_eq!(tracker.color_for("ABC123"), OverlayColor::Yellow);

        assert!(tracker.observe(&[code("ABC123")]).is_empty());
        assert_eq!(tracker.state_of("ABC123"), Some(CodeState::Pending));

        settle(handles).await;
        assert_eq!(tracker.color_for("ABC123"), OverlayColor::Green);
        assert_eq!(validator.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejection_and_failure() {
        let validator = FakeValidator::new(0);
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = errors.clone();
        let tracker = CodeTracker::new(validator.clone())
            .unwrap()
            .with_error_callback(Arc::new(move |err: &ScanError| {
                assert!(matches!(err, ScanError::Validation { raw_value, .. } if raw_value == "err-1"));
                seen.fetch_add(1, Ordering::SeqCst);
            }));

        settle(tracker.observe(&[code("bad-1"), code("err-1"), code("good-1")])).await;

        assert_eq!(tracker.color_for("bad-1"), OverlayColor::Red);
        assert_eq!(tracker.color_for("err-1"), OverlayColor::Red);
        assert_eq!(tracker.color_for("good-1"), OverlayColor::Green);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(
            tracker.counts(),
            TrackerCounts {
                pending: 0,
                known: 1,
                rejected: 2
            }
        );
    }

    struct PanickingValidator;

    #[async_trait]
    impl Validator for PanickingValidator {
        async fn validate(&self, raw_value: &str) -> anyhow::Result<bool> {
            panic!("validator blew up on {}", raw_value);
        }
    }

    #[tokio::test]
    async fn test_panicking_validator_rejects_value() {
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = errors.clone();
        let tracker = CodeTracker::new(Arc::new(PanickingValidator))
            .unwrap()
            .with_error_callback(Arc::new(move |err: &ScanError| {
                assert!(matches!(err, ScanError::Validation { raw_value, .. } if raw_value == "P"));
                seen.fetch_add(1, Ordering::SeqCst);
            }));

        settle(tracker.observe(&[code("P")])).await;

        assert_eq!(tracker.state_of("P"), Some(CodeState::Rejected));
        assert_eq!(tracker.color_for("P"), OverlayColor::Red);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        // Settled values are never resubmitted
        assert!(tracker.observe(&[code("P")]).is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_within_one_batch() {
        let validator = FakeValidator::new(0);
        let tracker = CodeTracker::new(validator.clone()).unwrap();
        settle(tracker.observe(&[code("X"), code("X"), code("Y")])).await;
        assert_eq!(validator.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_discards_late_results() {
        let validator = FakeValidator::new(50);
        let tracker = CodeTracker::new(validator.clone()).unwrap();

        let handles = tracker.observe(&[code("ABC123")]);
        tracker.reset();
        settle(handles).await;

        assert_eq!(tracker.state_of("ABC123"), None);
        assert_eq!(tracker.counts(), TrackerCounts::default());
        assert_eq!(tracker.session(), 1);

        // A fresh session validates the value again
        settle(tracker.observe(&[code("ABC123")])).await;
        assert_eq!(validator.calls(), 2);
        assert_eq!(tracker.state_of("ABC123"), Some(CodeState::Known));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_observers_submit_once() {
        let validator = FakeValidator::new(10);
        let tracker = Arc::new(CodeTracker::new(validator.clone()).unwrap());

        let observers: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move { tracker.observe(&[code("SHARED")]) })
            })
            .collect();

        let mut handles = Vec::new();
        for observer in observers {
            handles.extend(observer.await.unwrap());
        }
        assert_eq!(handles.len(), 1);
        settle(handles).await;
        assert_eq!(validator.calls(), 1);
    }

    #[test]
    fn test_requires_runtime() {
        let err = CodeTracker::new(FakeValidator::new(0)).err().unwrap();
        assert!(matches!(err, ScanError::Runtime(_)));
    }
}
