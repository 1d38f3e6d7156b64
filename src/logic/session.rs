//! Monitoring Session
//!
//! The session-scoped controller that owns every shared flag (camera
//! active, expulsion latch, cooldown bookkeeping) and wires the sampler,
//! reporter, escalation machine and attempt timer together. One instance
//! per exam attempt; the host UI talks to it through `start`/`stop`/
//! `finish` and the `MonitorSignal` channel.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::constants;
use crate::error::MonitorError;
use crate::logic::attempt::{AnswerRecord, Attempt, AttemptApi, TerminalReason};
use crate::logic::camera::{CameraConfig, CameraSession, VideoSource};
use crate::logic::detection::DetectionApi;
use crate::logic::escalation::{EscalationOutcome, Escalator, MonitorState, ViolationNotice};
use crate::logic::events::{self, MonitorSignal, SignalSender};
use crate::logic::reporter::EventReporter;
use crate::logic::timer::AttemptTimer;
use crate::logic::verdict::{DetectionVerdict, EventKind, Severity};

/// Per-session tunables, snapshotted at start
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub capture_interval: Duration,
    pub event_cooldown: Duration,
    pub escalation_window: Duration,
    pub max_warnings: u32,
    pub jpeg_quality: u8,
    pub camera: CameraConfig,
    /// Whether an informational-tier verdict still touches the submission
    /// cooldown bookkeeping (it never submits and never escalates)
    pub count_informational_toward_cooldown: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            capture_interval: Duration::from_millis(constants::get_capture_interval_ms()),
            event_cooldown: Duration::from_millis(constants::get_event_cooldown_ms()),
            escalation_window: Duration::from_millis(constants::get_escalation_window_ms()),
            max_warnings: constants::get_max_warnings(),
            jpeg_quality: constants::JPEG_QUALITY,
            camera: CameraConfig::default(),
            count_informational_toward_cooldown: false,
        }
    }
}

/// Flags shared between the loops; single controller, no globals
struct SessionShared {
    /// Checked at the top of every tick and after every await; a network
    /// response arriving after teardown becomes a no-op
    active: AtomicBool,
    /// Expulsion/finalize latch; set at most once per session
    finalized: AtomicBool,
    status: RwLock<String>,
    last_latency_ms: AtomicU64,
    local_warnings: Mutex<Vec<String>>,
}

struct SessionInner {
    config: MonitorConfig,
    attempt: Attempt,
    shared: SessionShared,
    escalator: Mutex<Escalator>,
    reporter: EventReporter,
    detection: Arc<dyn DetectionApi>,
    authority: Arc<dyn AttemptApi>,
    answers: Mutex<Vec<AnswerRecord>>,
    timer: Mutex<Option<AttemptTimer>>,
    signals: SignalSender,
}

/// Handle owned by the host exam UI
pub struct MonitoringSession {
    inner: Arc<SessionInner>,
    startup_failure: Option<MonitorError>,
    #[allow(dead_code)]
    sampler: Mutex<Option<JoinHandle<()>>>,
}

/// Kinds evaluated against a verdict, in reporting order
const VIOLATION_KINDS: [EventKind; 4] = [
    EventKind::MultipleFaces,
    EventKind::OutOfFrame,
    EventKind::GazeAverted,
    EventKind::EyesClosed,
];

impl MonitoringSession {
    /// Start monitoring for one attempt.
    ///
    /// Degradation never blocks the exam: on camera denial or an
    /// unhealthy detection service the session comes back with monitoring
    /// inactive and the failure in `startup_failure()`, one diagnostic
    /// event submitted, and the attempt timer still running. Deployments
    /// that require a working camera inspect `startup_failure()` and
    /// abort the attempt themselves.
    pub async fn start(
        config: MonitorConfig,
        attempt: Attempt,
        video: &dyn VideoSource,
        detection: Arc<dyn DetectionApi>,
        authority: Arc<dyn AttemptApi>,
        signals: SignalSender,
    ) -> MonitoringSession {
        let reporter = EventReporter::new(
            attempt.clone(),
            Arc::clone(&authority),
            config.event_cooldown,
        );

        let inner = Arc::new(SessionInner {
            escalator: Mutex::new(Escalator::new(config.escalation_window, config.max_warnings)),
            shared: SessionShared {
                active: AtomicBool::new(false),
                finalized: AtomicBool::new(false),
                status: RwLock::new(String::new()),
                last_latency_ms: AtomicU64::new(0),
                local_warnings: Mutex::new(Vec::new()),
            },
            reporter,
            detection,
            authority,
            answers: Mutex::new(Vec::new()),
            timer: Mutex::new(None),
            signals,
            attempt: attempt.clone(),
            config,
        });
        inner.set_status("Initializing monitoring…");

        // The countdown is independent of monitoring outcome.
        let timer_inner = Arc::clone(&inner);
        let timer = AttemptTimer::start(attempt.remaining_secs, move || async move {
            timer_inner.finalize(TerminalReason::TimeExpired).await;
        });
        *inner.timer.lock() = Some(timer);

        let camera = match CameraSession::acquire(video, &inner.config.camera) {
            Ok(camera) => camera,
            Err(e) => {
                log::error!("Monitoring inactive: {}", e);
                inner.set_status("No camera access");
                let mut details = BTreeMap::new();
                details.insert("error".to_string(), serde_json::json!(e.to_string()));
                // diagnostic only; the response carries nothing actionable
                let _ = inner
                    .reporter
                    .report(
                        EventKind::ConnectionLost,
                        "Could not access the camera",
                        50,
                        details,
                    )
                    .await;
                return MonitoringSession {
                    inner,
                    startup_failure: Some(e),
                    sampler: Mutex::new(None),
                };
            }
        };

        inner.set_status("Connecting to detection backend…");
        match inner.detection.health().await {
            Ok(health) if health.is_ready() => {
                let model = health.model.unwrap_or_else(|| "model".to_string());
                inner.set_status(&format!("Backend ready ({})", model));
            }
            Ok(_) => {
                log::warn!("Detection model not loaded; sampling will not start");
                inner.set_status("Detection model not loaded");
                return MonitoringSession {
                    inner,
                    startup_failure: Some(MonitorError::ServiceUnready(
                        "model not loaded".to_string(),
                    )),
                    sampler: Mutex::new(None),
                };
            }
            Err(e) => {
                log::warn!("Detection health check failed: {}", e);
                inner.set_status("Could not reach detection backend");
                return MonitoringSession {
                    inner,
                    startup_failure: Some(MonitorError::ServiceUnready(e.to_string())),
                    sampler: Mutex::new(None),
                };
            }
        }

        let start_outcome = inner
            .reporter
            .report(
                EventKind::SessionStart,
                "Monitoring started",
                100,
                BTreeMap::new(),
            )
            .await;
        // A resumed attempt may already be expelled server-side; the start
        // marker's response reconciles that before sampling begins.
        if let Some(outcome) = start_outcome {
            if outcome.backend_expelled {
                inner
                    .handle_notice(ViolationNotice::backend_expulsion(
                        "Attempt already expelled",
                    ))
                    .await;
                return MonitoringSession {
                    inner,
                    startup_failure: None,
                    sampler: Mutex::new(None),
                };
            }
        }

        inner.shared.active.store(true, Ordering::SeqCst);
        let loop_inner = Arc::clone(&inner);
        let handle = tokio::spawn(run_sampling_loop(loop_inner, camera));

        MonitoringSession {
            inner,
            startup_failure: None,
            sampler: Mutex::new(Some(handle)),
        }
    }

    /// Why monitoring came up inactive, if it did
    pub fn startup_failure(&self) -> Option<&MonitorError> {
        self.startup_failure.as_ref()
    }

    /// Whether the sampling loop is currently contributing signal
    pub fn monitoring_active(&self) -> bool {
        self.inner.shared.active.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> MonitorState {
        self.inner.escalator.lock().state()
    }

    pub fn warnings(&self) -> u32 {
        self.inner.escalator.lock().warnings()
    }

    pub fn is_finalized(&self) -> bool {
        self.inner.shared.finalized.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> String {
        self.inner.shared.status.read().clone()
    }

    pub fn last_latency_ms(&self) -> u64 {
        self.inner.shared.last_latency_ms.load(Ordering::SeqCst)
    }

    pub fn remaining_secs(&self) -> u64 {
        self.inner
            .timer
            .lock()
            .as_ref()
            .map(|t| t.remaining_secs())
            .unwrap_or(0)
    }

    /// Recent local warning messages, oldest first
    pub fn recent_warnings(&self) -> Vec<String> {
        self.inner.shared.local_warnings.lock().clone()
    }

    /// Buffer an answer for the best-effort flush during finalization
    pub fn record_answer(&self, answer: AnswerRecord) {
        if self.is_finalized() {
            log::debug!("Answer recorded after finalize; dropped");
            return;
        }
        self.inner.answers.lock().push(answer);
    }

    /// Disable monitoring without finalizing the attempt. The sampling
    /// loop halts, the camera is released, and any in-flight analysis
    /// result is discarded.
    pub async fn stop(&self) {
        let was_active = self.inner.shared.active.swap(false, Ordering::SeqCst);
        if was_active && !self.is_finalized() {
            let _ = self
                .inner
                .reporter
                .report(
                    EventKind::SessionEnd,
                    "Monitoring stopped",
                    100,
                    BTreeMap::new(),
                )
                .await;
            self.inner.set_status("Monitoring stopped");
        }
    }

    /// Normal completion: stop monitoring, flush answers, mark the
    /// attempt completed.
    pub async fn finish(&self) {
        self.stop().await;
        self.inner.finalize(TerminalReason::Completed).await;
    }
}

impl Drop for MonitoringSession {
    /// A dropped handle must not leave the loops running or the camera
    /// held: the sampler exits at its next check and releases the device,
    /// and the countdown is cancelled. No events are submitted from here;
    /// hosts that want the session-end marker call `stop`/`finish` first.
    fn drop(&mut self) {
        self.inner.shared.active.store(false, Ordering::SeqCst);
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.cancel();
        }
    }
}

impl SessionInner {
    fn set_status(&self, text: &str) {
        *self.shared.status.write() = text.to_string();
        events::emit(&self.signals, MonitorSignal::Status(text.to_string()));
    }

    fn push_local_warning(&self, message: &str) {
        let mut warnings = self.shared.local_warnings.lock();
        warnings.push(message.to_string());
        let len = warnings.len();
        if len > constants::LOCAL_WARNING_HISTORY {
            warnings.drain(0..len - constants::LOCAL_WARNING_HISTORY);
        }
    }

    /// Evaluate one verdict: submit qualifying events and feed the
    /// escalation machine. Runs on the sampling task only.
    async fn apply_verdict(&self, verdict: &DetectionVerdict) {
        // Informational tier: nothing is recorded and nothing fires.
        if verdict.severity == Severity::Info {
            if self.config.count_informational_toward_cooldown {
                for kind in &verdict.events {
                    self.reporter.touch(*kind);
                }
            }
            return;
        }
        if verdict.events.is_empty() {
            return;
        }

        let confidence = verdict.confidence_pct();
        for kind in VIOLATION_KINDS {
            if !verdict.events.contains(&kind) {
                continue;
            }

            let (message, details) = describe_violation(kind, verdict);
            self.push_local_warning(&message);

            let outcome = self
                .reporter
                .report(kind, &message, confidence, details)
                .await;
            if !self.shared.active.load(Ordering::SeqCst) {
                return;
            }

            if let Some(outcome) = outcome {
                if outcome.backend_expelled {
                    self.handle_notice(ViolationNotice::backend_expulsion(
                        "Expelled: maximum warnings reached",
                    ))
                    .await;
                    return;
                }
            }

            self.handle_notice(ViolationNotice::local(kind, message)).await;
            if self.shared.finalized.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    async fn handle_notice(&self, notice: ViolationNotice) {
        let outcome = { self.escalator.lock().on_violation(&notice) };

        match outcome {
            EscalationOutcome::Ignored => {}
            EscalationOutcome::Warning { count, max } => {
                events::emit(
                    &self.signals,
                    MonitorSignal::Warning {
                        kind: notice.kind,
                        count,
                        max,
                        message: notice.message,
                    },
                );
            }
            EscalationOutcome::Expelled {
                by_backend,
                warnings,
            } => {
                if !by_backend {
                    events::emit(
                        &self.signals,
                        MonitorSignal::Warning {
                            kind: notice.kind,
                            count: warnings,
                            max: self.config.max_warnings,
                            message: notice.message.clone(),
                        },
                    );
                }
                events::emit(
                    &self.signals,
                    MonitorSignal::Expelled {
                        message: notice.message,
                    },
                );
                self.finalize(TerminalReason::Expelled).await;
            }
        }
    }

    /// Terminal path shared by expulsion, timer expiry and normal
    /// completion. Latched: fires at most once per session; every
    /// sub-step is attempted even if an earlier one fails.
    async fn finalize(&self, reason: TerminalReason) {
        if self.shared.finalized.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!(
            "Finalizing attempt {} as {}",
            self.attempt.attempt_id,
            reason.as_str()
        );

        self.shared.active.store(false, Ordering::SeqCst);
        if let Some(timer) = self.timer.lock().take() {
            timer.cancel();
        }

        // Session-end marker on every terminal path. When `stop()` already
        // sent it moments earlier the cooldown gate absorbs this one.
        let _ = self
            .reporter
            .report(
                EventKind::SessionEnd,
                "Monitoring stopped",
                100,
                BTreeMap::new(),
            )
            .await;

        let answers = std::mem::take(&mut *self.answers.lock());
        for answer in &answers {
            if let Err(e) = self
                .authority
                .save_answer(self.attempt.attempt_id, answer)
                .await
            {
                log::warn!("Answer flush failed (question {}): {}", answer.question_id, e);
            }
        }

        if let Err(e) = self.authority.finalize(self.attempt.attempt_id, reason).await {
            log::warn!("Finalize request failed: {}", e);
        }

        events::emit(&self.signals, MonitorSignal::Finished { reason });
    }
}

/// The frame-sampling loop: capture, encode, analyze, evaluate. Ticks
/// are discrete units; a failed tick is skipped, never fatal. The loop
/// halts permanently once the latch is set and deterministically on
/// `stop()`, releasing the camera either way.
async fn run_sampling_loop(inner: Arc<SessionInner>, mut camera: CameraSession) {
    let mut ticker = tokio::time::interval(inner.config.capture_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    log::info!(
        "Sampling loop started (interval: {:?})",
        inner.config.capture_interval
    );

    loop {
        ticker.tick().await;
        if !inner.shared.active.load(Ordering::SeqCst)
            || inner.shared.finalized.load(Ordering::SeqCst)
        {
            break;
        }

        // Insufficient buffered data is a no-op tick, not an error.
        let Some(frame) = camera.poll_frame() else {
            continue;
        };

        let encoded = match frame.encode_jpeg(inner.config.jpeg_quality) {
            Ok(encoded) => encoded,
            Err(e) => {
                log::warn!("Frame encode failed, tick skipped: {}", e);
                continue;
            }
        };

        let started = Instant::now();
        let verdict = match inner.detection.analyze(&encoded).await {
            Ok(verdict) => verdict,
            Err(e) => {
                log::warn!("Frame analysis failed, tick skipped: {}", e);
                inner.set_status("Frame analysis failed");
                continue;
            }
        };

        // Verdict may land after teardown; discard instead of mutating a
        // discarded session.
        if !inner.shared.active.load(Ordering::SeqCst) {
            break;
        }

        let millis = started.elapsed().as_millis() as u64;
        inner.shared.last_latency_ms.store(millis, Ordering::SeqCst);
        events::emit(&inner.signals, MonitorSignal::Latency { millis });

        if let Some(text) = &verdict.status_text {
            inner.set_status(text);
        }

        inner.apply_verdict(&verdict).await;
        if inner.shared.finalized.load(Ordering::SeqCst) {
            break;
        }
    }

    camera.release();
    log::info!("Sampling loop stopped");
}

/// Student-facing message and detail map for one qualifying kind
fn describe_violation(
    kind: EventKind,
    verdict: &DetectionVerdict,
) -> (String, BTreeMap<String, serde_json::Value>) {
    let mut details = BTreeMap::new();
    let primary = verdict.primary.as_ref();

    let message = match kind {
        EventKind::MultipleFaces => {
            details.insert("num_faces".to_string(), serde_json::json!(verdict.num_faces));
            format!("{} people detected in the frame", verdict.num_faces)
        }
        EventKind::OutOfFrame => {
            details.insert("num_faces".to_string(), serde_json::json!(verdict.num_faces));
            if let Some(width) = primary.and_then(|p| p.face_width_norm) {
                details.insert("face_width_norm".to_string(), serde_json::json!(width));
            }
            if verdict.num_faces == 0 {
                "Student is not in the frame".to_string()
            } else {
                "Student is too far from the camera".to_string()
            }
        }
        EventKind::GazeAverted => {
            if let Some(yaw) = primary.and_then(|p| p.yaw) {
                details.insert("yaw".to_string(), serde_json::json!(yaw));
            }
            if let Some(gaze_x) = primary.and_then(|p| p.gaze_x) {
                details.insert("gaze_x".to_string(), serde_json::json!(gaze_x));
            }
            verdict
                .status_text
                .clone()
                .unwrap_or_else(|| "Gaze averted from the screen".to_string())
        }
        EventKind::EyesClosed => {
            if let Some(ear) = primary.and_then(|p| p.ear) {
                details.insert("ear".to_string(), serde_json::json!(ear));
            }
            "Eyes closed".to_string()
        }
        other => other.as_str().to_string(),
    };

    (message, details)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::attempt::test_support::{test_attempt, FakeAuthority};
    use crate::logic::camera::test_support::FakeVideoSource;
    use crate::logic::detection::test_support::{violation_verdict, FakeDetection};
    use crate::logic::events::{signal_channel, SignalReceiver};
    use tokio::sync::Notify;
    use tokio::time::sleep;

    fn test_config() -> MonitorConfig {
        MonitorConfig {
            capture_interval: Duration::from_millis(800),
            event_cooldown: Duration::from_millis(2_500),
            escalation_window: Duration::from_millis(15_000),
            max_warnings: 3,
            jpeg_quality: 75,
            camera: CameraConfig {
                width: 64,
                height: 48,
            },
            count_informational_toward_cooldown: false,
        }
    }

    fn drain(rx: &mut SignalReceiver) -> Vec<MonitorSignal> {
        let mut signals = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            signals.push(signal);
        }
        signals
    }

    fn warning_counts(signals: &[MonitorSignal]) -> Vec<u32> {
        signals
            .iter()
            .filter_map(|s| match s {
                MonitorSignal::Warning { count, .. } => Some(*count),
                _ => None,
            })
            .collect()
    }

    async fn start_session(
        detection: Arc<FakeDetection>,
        authority: Arc<FakeAuthority>,
        remaining_secs: u64,
    ) -> (MonitoringSession, SignalReceiver) {
        let (tx, rx) = signal_channel();
        let video = FakeVideoSource::new();
        let mut attempt = test_attempt();
        attempt.remaining_secs = remaining_secs;
        let session = MonitoringSession::start(
            test_config(),
            attempt,
            &video,
            detection,
            authority,
            tx,
        )
        .await;
        (session, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_unready_backend_never_analyzes() {
        let detection = Arc::new(FakeDetection::not_ready());
        let authority = Arc::new(FakeAuthority::new());
        let (session, _rx) =
            start_session(Arc::clone(&detection), Arc::clone(&authority), 600).await;

        assert!(!session.monitoring_active());
        assert!(matches!(
            session.startup_failure(),
            Some(MonitorError::ServiceUnready(_))
        ));

        sleep(Duration::from_secs(5)).await;
        assert_eq!(detection.calls(), 0);
        // no session-start marker either; sampling never began
        assert_eq!(authority.submissions_of(EventKind::SessionStart), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_denial_reports_once_and_stays_inactive() {
        let detection = Arc::new(FakeDetection::ready());
        let authority = Arc::new(FakeAuthority::new());
        let (tx, _rx) = signal_channel();
        let video = FakeVideoSource::denied();

        let session = MonitoringSession::start(
            test_config(),
            test_attempt(),
            &video,
            Arc::clone(&detection) as Arc<dyn DetectionApi>,
            Arc::clone(&authority) as Arc<dyn AttemptApi>,
            tx,
        )
        .await;

        assert!(matches!(
            session.startup_failure(),
            Some(MonitorError::DeviceUnavailable(_))
        ));
        assert!(!session.monitoring_active());

        sleep(Duration::from_secs(5)).await;
        assert_eq!(detection.calls(), 0);
        assert_eq!(authority.submissions_of(EventKind::ConnectionLost), 1);
        // the exam itself keeps running: the countdown is alive
        assert!(session.remaining_secs() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_distinct_violations_expel_and_finalize_once() {
        let detection = Arc::new(FakeDetection::ready());
        detection.push(Ok(violation_verdict(EventKind::MultipleFaces)));
        detection.push(Ok(violation_verdict(EventKind::GazeAverted)));
        detection.push(Ok(violation_verdict(EventKind::EyesClosed)));
        let authority = Arc::new(FakeAuthority::new());

        let (session, mut rx) =
            start_session(Arc::clone(&detection), Arc::clone(&authority), 600).await;
        assert!(session.monitoring_active());

        sleep(Duration::from_secs(10)).await;

        assert_eq!(session.state(), MonitorState::Expelled);
        assert_eq!(session.warnings(), 3);
        // loop halted on the latch: three analyzed frames, no more
        assert_eq!(detection.calls(), 3);

        let finalized = authority.finalized.lock().clone();
        assert_eq!(finalized, vec![(42, TerminalReason::Expelled)]);

        let signals = drain(&mut rx);
        assert_eq!(warning_counts(&signals), vec![1, 2, 3]);
        assert!(signals
            .iter()
            .any(|s| matches!(s, MonitorSignal::Expelled { .. })));
        assert!(signals.iter().any(|s| matches!(
            s,
            MonitorSignal::Finished {
                reason: TerminalReason::Expelled
            }
        )));

        // session-start marker plus one submission per kind, and the
        // session-end marker goes out with the expulsion finalize
        assert_eq!(authority.submissions_of(EventKind::SessionStart), 1);
        assert_eq!(authority.submissions_of(EventKind::MultipleFaces), 1);
        assert_eq!(authority.submissions_of(EventKind::GazeAverted), 1);
        assert_eq!(authority.submissions_of(EventKind::EyesClosed), 1);
        assert_eq!(authority.submissions_of(EventKind::SessionEnd), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_kind_submits_on_cooldown_but_counts_once() {
        let detection = Arc::new(FakeDetection::always(violation_verdict(
            EventKind::MultipleFaces,
        )));
        let authority = Arc::new(FakeAuthority::new());

        let (session, mut rx) =
            start_session(Arc::clone(&detection), Arc::clone(&authority), 600).await;

        // ticks every 800 ms for ~10 s: the 2.5 s cooldown reopens
        // repeatedly, the 15 s escalation window counts exactly once
        sleep(Duration::from_secs(10)).await;
        session.stop().await;

        assert_eq!(session.warnings(), 1);
        assert_eq!(session.state(), MonitorState::Active { warnings: 1 });
        let submissions = authority.submissions_of(EventKind::MultipleFaces);
        assert!(
            submissions >= 3,
            "expected repeated submissions, got {}",
            submissions
        );

        let signals = drain(&mut rx);
        assert_eq!(warning_counts(&signals), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_expelled_attempt_reconciles_at_start() {
        use crate::logic::attempt::EventSubmitResponse;

        let detection = Arc::new(FakeDetection::ready());
        let authority = Arc::new(FakeAuthority::new());
        // the start marker's response says the attempt is already gone
        authority.responses.lock().push(Ok(EventSubmitResponse {
            attempt_expelled: true,
            expulsion: None,
        }));

        let (session, mut rx) =
            start_session(Arc::clone(&detection), Arc::clone(&authority), 600).await;

        assert_eq!(session.state(), MonitorState::Expelled);
        assert!(!session.monitoring_active());
        assert!(session.is_finalized());

        sleep(Duration::from_secs(5)).await;
        // sampling never began
        assert_eq!(detection.calls(), 0);
        let finalized = authority.finalized.lock().clone();
        assert_eq!(finalized, vec![(42, TerminalReason::Expelled)]);

        let signals = drain(&mut rx);
        assert!(signals
            .iter()
            .any(|s| matches!(s, MonitorSignal::Expelled { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_expulsion_record_overrides_local_count() {
        let detection = Arc::new(FakeDetection::ready());
        detection.push(Ok(violation_verdict(EventKind::OutOfFrame)));
        let authority = Arc::new(FakeAuthority::expelling());

        let (session, mut rx) =
            start_session(Arc::clone(&detection), Arc::clone(&authority), 600).await;

        sleep(Duration::from_secs(5)).await;

        // backend said expelled on the very first submission: terminal at
        // local count zero
        assert_eq!(session.state(), MonitorState::Expelled);
        assert_eq!(session.warnings(), 0);

        let finalized = authority.finalized.lock().clone();
        assert_eq!(finalized, vec![(42, TerminalReason::Expelled)]);

        let signals = drain(&mut rx);
        assert!(warning_counts(&signals).is_empty());
        assert!(signals
            .iter()
            .any(|s| matches!(s, MonitorSignal::Expelled { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_inflight_verdict() {
        let gate = Arc::new(Notify::new());
        let detection = Arc::new(FakeDetection {
            gate: Some(Arc::clone(&gate)),
            ..FakeDetection::ready()
        });
        detection.push(Ok(violation_verdict(EventKind::MultipleFaces)));
        let authority = Arc::new(FakeAuthority::new());

        let (session, mut rx) =
            start_session(Arc::clone(&detection), Arc::clone(&authority), 600).await;

        // let the first tick reach the gated analyze call
        sleep(Duration::from_millis(100)).await;
        assert_eq!(detection.calls(), 1);

        session.stop().await;
        gate.notify_one();
        sleep(Duration::from_secs(5)).await;

        // the late verdict was discarded: no warning, no submission, and
        // no further analysis
        assert_eq!(session.warnings(), 0);
        assert_eq!(session.state(), MonitorState::Active { warnings: 0 });
        assert_eq!(detection.calls(), 1);
        assert_eq!(authority.submissions_of(EventKind::MultipleFaces), 0);
        assert_eq!(authority.submissions_of(EventKind::SessionEnd), 1);
        assert!(warning_counts(&drain(&mut rx)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_expiry_flushes_and_finalizes() {
        let detection = Arc::new(FakeDetection::ready());
        let authority = Arc::new(FakeAuthority::new());

        let (session, mut rx) =
            start_session(Arc::clone(&detection), Arc::clone(&authority), 3).await;
        session.record_answer(AnswerRecord {
            question_id: 9,
            order: 1,
            payload: serde_json::json!({ "option_id": 4 }),
        });

        sleep(Duration::from_secs(6)).await;

        assert!(session.is_finalized());
        assert!(!session.monitoring_active());
        assert_eq!(authority.saved_answers.lock().len(), 1);
        assert_eq!(authority.submissions_of(EventKind::SessionEnd), 1);
        let finalized = authority.finalized.lock().clone();
        assert_eq!(finalized, vec![(42, TerminalReason::TimeExpired)]);

        let signals = drain(&mut rx);
        assert!(signals.iter().any(|s| matches!(
            s,
            MonitorSignal::Finished {
                reason: TerminalReason::TimeExpired
            }
        )));

        // loop halted; no further analysis after expiry
        let calls = detection.calls();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(detection.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_is_single_fire_under_race() {
        let detection = Arc::new(FakeDetection::ready());
        detection.push(Ok(violation_verdict(EventKind::MultipleFaces)));
        let authority = Arc::new(FakeAuthority::expelling());

        // expulsion lands at the first tick, the timer expires right after
        let (session, _rx) =
            start_session(Arc::clone(&detection), Arc::clone(&authority), 1).await;

        sleep(Duration::from_secs(5)).await;
        session.finish().await;
        session.finish().await;

        let finalized = authority.finalized.lock().clone();
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0], (42, TerminalReason::Expelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_completes_normally() {
        let detection = Arc::new(FakeDetection::ready());
        let authority = Arc::new(FakeAuthority::new());

        let (session, mut rx) =
            start_session(Arc::clone(&detection), Arc::clone(&authority), 600).await;
        session.record_answer(AnswerRecord {
            question_id: 1,
            order: 1,
            payload: serde_json::json!({ "option_id": 2 }),
        });
        session.record_answer(AnswerRecord {
            question_id: 2,
            order: 2,
            payload: serde_json::json!({ "option_ids": [3, 5] }),
        });

        sleep(Duration::from_secs(2)).await;
        session.finish().await;

        assert_eq!(authority.saved_answers.lock().len(), 2);
        let finalized = authority.finalized.lock().clone();
        assert_eq!(finalized, vec![(42, TerminalReason::Completed)]);
        assert_eq!(authority.submissions_of(EventKind::SessionEnd), 1);

        let signals = drain(&mut rx);
        assert!(signals.iter().any(|s| matches!(
            s,
            MonitorSignal::Finished {
                reason: TerminalReason::Completed
            }
        )));

        // answers were drained by the flush; a late record is dropped
        session.record_answer(AnswerRecord {
            question_id: 3,
            order: 3,
            payload: serde_json::json!({}),
        });
        assert_eq!(authority.saved_answers.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_informational_verdict_is_noop() {
        let detection = Arc::new(FakeDetection::ready());
        let mut info = violation_verdict(EventKind::GazeAverted);
        info.severity = Severity::Info;
        detection.push(Ok(info));
        let authority = Arc::new(FakeAuthority::new());

        let (session, mut rx) =
            start_session(Arc::clone(&detection), Arc::clone(&authority), 600).await;

        sleep(Duration::from_secs(3)).await;
        session.stop().await;

        assert_eq!(session.warnings(), 0);
        assert_eq!(authority.submissions_of(EventKind::GazeAverted), 0);
        assert!(warning_counts(&drain(&mut rx)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_session_halts_loops_and_releases_camera() {
        let detection = Arc::new(FakeDetection::ready());
        let authority = Arc::new(FakeAuthority::new());
        let (tx, _rx) = signal_channel();
        let video = FakeVideoSource::new();
        let stats = Arc::clone(&video.stats);

        let session = MonitoringSession::start(
            test_config(),
            test_attempt(),
            &video,
            Arc::clone(&detection) as Arc<dyn DetectionApi>,
            Arc::clone(&authority) as Arc<dyn AttemptApi>,
            tx,
        )
        .await;

        sleep(Duration::from_secs(2)).await;
        assert!(detection.calls() > 0);
        drop(session);

        sleep(Duration::from_secs(2)).await;
        let calls = detection.calls();
        sleep(Duration::from_secs(10)).await;

        // the sampler exited at its next check and let go of the device;
        // the countdown was cancelled, so nothing finalized the attempt
        assert_eq!(detection.calls(), calls);
        assert!(stats.stopped.load(Ordering::SeqCst));
        assert!(authority.finalized.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_analysis_failure_skips_tick() {
        let detection = Arc::new(FakeDetection::ready());
        detection.push(Err(MonitorError::Network("timeout".to_string())));
        detection.push(Ok(violation_verdict(EventKind::EyesClosed)));
        let authority = Arc::new(FakeAuthority::new());

        let (session, _rx) =
            start_session(Arc::clone(&detection), Arc::clone(&authority), 600).await;

        sleep(Duration::from_secs(3)).await;
        session.stop().await;

        // the failed tick was skipped, the loop recovered and the next
        // verdict still produced a warning
        assert_eq!(session.warnings(), 1);
        assert_eq!(authority.submissions_of(EventKind::EyesClosed), 1);
    }
}
