//! Event Cooldown Gate
//!
//! Per-kind rate limiter in front of the Event Reporter. Suppresses
//! re-submission of an unchanged condition to the attempt authority; it
//! does NOT throttle the user-facing warning count, which has its own
//! independent window in the escalation state machine.

use std::collections::HashMap;
use std::time::Duration;
// tokio's Instant so the paused test clock drives the window
use tokio::time::Instant;

use crate::logic::verdict::EventKind;

/// Mapping from event kind to last-sent time, scoped to one monitoring
/// session. Reset when monitoring (re)starts.
#[derive(Debug)]
pub struct CooldownTable {
    window: Duration,
    last_sent: HashMap<EventKind, Instant>,
}

impl CooldownTable {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: HashMap::new(),
        }
    }

    /// Whether an event of this kind may be submitted now.
    ///
    /// Records `now` as the last-sent time only when it returns true; a
    /// suppressed call has no side effect, so the window is measured from
    /// the last accepted submission.
    pub fn should_send(&mut self, kind: EventKind) -> bool {
        self.should_send_at(kind, Instant::now())
    }

    pub fn should_send_at(&mut self, kind: EventKind, now: Instant) -> bool {
        if let Some(last) = self.last_sent.get(&kind) {
            if now.duration_since(*last) < self.window {
                return false;
            }
        }
        self.last_sent.insert(kind, now);
        true
    }

    /// Drop all bookkeeping (monitoring restart)
    pub fn reset(&mut self) {
        self.last_sent.clear();
    }
}

// ============================================================================
// TESTS
// ============================================================================
