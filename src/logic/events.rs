//! Monitor Signals
//!
//! The typed channel contract between a monitoring session and the host
//! exam UI. Replaces an ad-hoc callback: the session emits signals, the
//! host renders them. Terminal signals fire exactly once per session.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::logic::attempt::TerminalReason;
use crate::logic::verdict::EventKind;

/// One message from the monitoring session to the host UI
#[derive(Debug, Clone, Serialize)]
pub enum MonitorSignal {
    /// Status line text (camera/backend readiness, per-frame caption)
    Status(String),
    /// Round-trip latency of the last frame analysis
    Latency { millis: u64 },
    /// A counted warning; show "warning N of MAX"
    Warning {
        kind: EventKind,
        count: u32,
        max: u32,
        message: String,
    },
    /// Terminal expulsion, locally latched or backend-authoritative
    Expelled { message: String },
    /// The attempt was finalized (navigation cue for the host)
    Finished { reason: TerminalReason },
}

pub type SignalSender = mpsc::UnboundedSender<MonitorSignal>;
pub type SignalReceiver = mpsc::UnboundedReceiver<MonitorSignal>;

/// Channel pair for one session
pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    mpsc::unbounded_channel()
}

/// Send a signal, tolerating a departed host
pub(crate) fn emit(tx: &SignalSender, signal: MonitorSignal) {
    if tx.send(signal).is_err() {
        log::debug!("Monitor signal dropped: host receiver is gone");
    }
}

// ============================================================================
// TESTS
// ============================================================================
