//! Event Reporter
//!
//! Builds monitoring events for qualifying detections and submits them to
//! the attempt authority, behind the per-kind cooldown gate. The
//! synchronous response is inspected for the authoritative expulsion
//! verdict. Submission failures are logged and swallowed: losing one
//! sample is immaterial at this sampling rate, and a failed report must
//! never stall the loop or the exam UI.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::logic::attempt::{Attempt, AttemptApi, EventSubmitResponse, MonitoringEvent};
use crate::logic::cooldown::CooldownTable;
use crate::logic::verdict::EventKind;

/// Result of one accepted submission
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    /// The authority has expelled this attempt (by flag or by record)
    pub backend_expelled: bool,
    pub response: EventSubmitResponse,
}

/// Submits qualifying events for one attempt
pub struct EventReporter {
    attempt: Attempt,
    api: Arc<dyn AttemptApi>,
    cooldown: Mutex<CooldownTable>,
}

impl EventReporter {
    pub fn new(attempt: Attempt, api: Arc<dyn AttemptApi>, cooldown_window: Duration) -> Self {
        Self {
            attempt,
            api,
            cooldown: Mutex::new(CooldownTable::new(cooldown_window)),
        }
    }

    /// Submit one event, unless its kind is still inside the cooldown
    /// window.
    ///
    /// Returns `None` when suppressed or when the submission failed; the
    /// caller treats both as "nothing authoritative happened this tick".
    pub async fn report(
        &self,
        kind: EventKind,
        message: &str,
        confidence: u32,
        details: BTreeMap<String, serde_json::Value>,
    ) -> Option<ReportOutcome> {
        if !self.cooldown.lock().should_send(kind) {
            log::debug!("Submission of {} suppressed by cooldown", kind);
            return None;
        }

        let mut event = MonitoringEvent::new(&self.attempt, kind, confidence)
            .with_message(message)
            .with_attempt_context(&self.attempt);
        for (key, value) in details {
            event = event.with_detail(&key, value);
        }

        match self.api.submit_event(&event).await {
            Ok(response) => {
                let backend_expelled = response.backend_expelled();
                if backend_expelled {
                    log::warn!(
                        "Attempt {} expelled by authority on {} submission",
                        self.attempt.attempt_id,
                        kind
                    );
                }
                Some(ReportOutcome {
                    backend_expelled,
                    response,
                })
            }
            Err(e) => {
                // Dropped, not retried or queued.
                log::warn!("Event submission failed ({}): {}", kind, e);
                None
            }
        }
    }

    /// Record cooldown bookkeeping for a kind without submitting anything
    pub fn touch(&self, kind: EventKind) {
        self.cooldown.lock().should_send(kind);
    }

    /// Clear cooldown bookkeeping (monitoring restart)
    pub fn reset(&self) {
        self.cooldown.lock().reset();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::attempt::test_support::{test_attempt, FakeAuthority};

    fn reporter_with(api: Arc<FakeAuthority>, window_ms: u64) -> EventReporter {
        EventReporter::new(test_attempt(), api, Duration::from_millis(window_ms))
    }

    #[tokio::test]
    async fn test_cooldown_dedupes_same_kind() {
        let api = Arc::new(FakeAuthority::new());
        let reporter = reporter_with(Arc::clone(&api), 2_500);

        let first = reporter
            .report(EventKind::MultipleFaces, "two people", 90, BTreeMap::new())
            .await;
        assert!(first.is_some());

        // same kind, immediately after: suppressed, never hits the wire
        let second = reporter
            .report(EventKind::MultipleFaces, "two people", 90, BTreeMap::new())
            .await;
        assert!(second.is_none());
        assert_eq!(api.submissions_of(EventKind::MultipleFaces), 1);
    }

    #[tokio::test]
    async fn test_distinct_kinds_not_gated_together() {
        let api = Arc::new(FakeAuthority::new());
        let reporter = reporter_with(Arc::clone(&api), 2_500);

        reporter
            .report(EventKind::MultipleFaces, "two people", 90, BTreeMap::new())
            .await;
        reporter
            .report(EventKind::GazeAverted, "looking away", 85, BTreeMap::new())
            .await;

        assert_eq!(api.submitted.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_backend_expulsion_surfaces_in_outcome() {
        let api = Arc::new(FakeAuthority::expelling());
        let reporter = reporter_with(Arc::clone(&api), 2_500);

        let outcome = reporter
            .report(EventKind::OutOfFrame, "out of frame", 80, BTreeMap::new())
            .await
            .unwrap();
        assert!(outcome.backend_expelled);
        assert!(outcome.response.expulsion.is_some());
    }

    #[tokio::test]
    async fn test_submission_failure_is_swallowed() {
        let api = Arc::new(FakeAuthority::new());
        *api.fail_all.lock() = true;
        let reporter = reporter_with(Arc::clone(&api), 0);

        let outcome = reporter
            .report(EventKind::EyesClosed, "eyes closed", 70, BTreeMap::new())
            .await;
        assert!(outcome.is_none());

        // gate recorded the send anyway; with a zero window the next
        // report goes through once the authority recovers
        *api.fail_all.lock() = false;
        let retry = reporter
            .report(EventKind::EyesClosed, "eyes closed", 70, BTreeMap::new())
            .await;
        assert!(retry.is_some());
    }

    #[tokio::test]
    async fn test_details_reach_the_wire() {
        let api = Arc::new(FakeAuthority::new());
        let reporter = reporter_with(Arc::clone(&api), 2_500);

        let mut details = BTreeMap::new();
        details.insert("num_faces".to_string(), serde_json::json!(3));
        reporter
            .report(EventKind::MultipleFaces, "three people", 95, details)
            .await;

        let submitted = api.submitted.lock();
        let event = &submitted[0];
        assert_eq!(event.details["num_faces"], 3);
        assert_eq!(event.details["message"], "three people");
        assert_eq!(event.details["exam_title"], "Databases II");
        assert_eq!(event.confidence, 95);
    }
}
