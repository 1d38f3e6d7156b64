//! Violation Escalation State Machine
//!
//! Session-level authority over the warning count. Receives one
//! violation notification per qualifying detection, applies its own
//! per-kind suppression window (independent of the submission cooldown),
//! and latches the attempt into `Expelled` at the threshold, or
//! immediately when the backend has already decided.

use std::collections::HashMap;
use std::time::Duration;
// tokio's Instant so the paused test clock drives the window
use tokio::time::Instant;

use crate::logic::verdict::EventKind;

/// Session state as seen by the escalation machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Active { warnings: u32 },
    Expelled,
}

/// One escalation-worthy notification
#[derive(Debug, Clone)]
pub struct ViolationNotice {
    pub kind: EventKind,
    pub message: String,
    /// The attempt authority has already expelled this attempt
    pub expelled_by_backend: bool,
}

impl ViolationNotice {
    pub fn local(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            expelled_by_backend: false,
        }
    }

    pub fn backend_expulsion(message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Expulsion,
            message: message.into(),
            expelled_by_backend: true,
        }
    }
}

/// What the state machine decided for one notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// Suppressed by the window, informational kind, or already expelled
    Ignored,
    /// Counted; surface "warning N of MAX" to the student
    Warning { count: u32, max: u32 },
    /// Terminal transition happened on this notice; finalize exactly once
    Expelled { by_backend: bool, warnings: u32 },
}

/// Warning ledger plus latch. Single writer: the owning session mutates
/// this under its own lock, so two near-simultaneous notices cannot both
/// pass the threshold check.
#[derive(Debug)]
pub struct Escalator {
    window: Duration,
    max_warnings: u32,
    warnings: u32,
    last_counted: HashMap<EventKind, Instant>,
    expelled: bool,
}

impl Escalator {
    pub fn new(window: Duration, max_warnings: u32) -> Self {
        Self {
            window,
            max_warnings,
            warnings: 0,
            last_counted: HashMap::new(),
            expelled: false,
        }
    }

    pub fn state(&self) -> MonitorState {
        if self.expelled {
            MonitorState::Expelled
        } else {
            MonitorState::Active {
                warnings: self.warnings,
            }
        }
    }

    pub fn warnings(&self) -> u32 {
        self.warnings
    }

    pub fn is_expelled(&self) -> bool {
        self.expelled
    }

    /// Apply one notice at the current time
    pub fn on_violation(&mut self, notice: &ViolationNotice) -> EscalationOutcome {
        self.on_violation_at(notice, Instant::now())
    }

    /// Apply one notice at an explicit time
    pub fn on_violation_at(&mut self, notice: &ViolationNotice, now: Instant) -> EscalationOutcome {
        // Latched: the ledger is frozen, nothing fires twice.
        if self.expelled {
            return EscalationOutcome::Ignored;
        }

        // The backend is the final authority; it may expel for reasons the
        // client cannot locally observe.
        if notice.expelled_by_backend || notice.kind == EventKind::Expulsion {
            self.expelled = true;
            log::warn!("Attempt expelled by backend verdict ({})", notice.message);
            return EscalationOutcome::Expelled {
                by_backend: true,
                warnings: self.warnings,
            };
        }

        if !notice.kind.escalates() {
            return EscalationOutcome::Ignored;
        }

        // Same kind already counted within the escalation window: no
        // counter change, no notice to the student.
        if let Some(last) = self.last_counted.get(&notice.kind) {
            if now.duration_since(*last) < self.window {
                log::debug!("Warning for {} suppressed by escalation window", notice.kind);
                return EscalationOutcome::Ignored;
            }
        }
        self.last_counted.insert(notice.kind, now);

        self.warnings += 1;
        log::info!(
            "Warning {}/{} for {}: {}",
            self.warnings,
            self.max_warnings,
            notice.kind,
            notice.message
        );

        if self.warnings >= self.max_warnings {
            self.expelled = true;
            return EscalationOutcome::Expelled {
                by_backend: false,
                warnings: self.warnings,
            };
        }

        EscalationOutcome::Warning {
            count: self.warnings,
            max: self.max_warnings,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
