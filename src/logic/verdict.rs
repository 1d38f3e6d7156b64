//! Detection Verdict Types
//!
//! Per-frame structured output of the Detection Service. Verdicts are
//! ephemeral: consumed on the tick that produced them and discarded.

use serde::{Deserialize, Serialize};

// ============================================================================
// EVENT KINDS
// ============================================================================

/// Closed set of anomaly categories understood by the pipeline.
///
/// The first four escalate to warnings; the session-lifecycle markers are
/// informational and are submitted for the audit trail only. `Expulsion`
/// never comes from the detection service; it is synthesized when the
/// attempt authority reports an authoritative expulsion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "MULTIPLE_FACES")]
    MultipleFaces,
    #[serde(rename = "OUT_OF_FRAME")]
    OutOfFrame,
    #[serde(rename = "GAZE_AVERTED")]
    GazeAverted,
    #[serde(rename = "EYES_CLOSED")]
    EyesClosed,
    #[serde(rename = "SESSION_START")]
    SessionStart,
    #[serde(rename = "SESSION_END")]
    SessionEnd,
    #[serde(rename = "CONNECTION_LOST")]
    ConnectionLost,
    #[serde(rename = "EXPULSION")]
    Expulsion,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MultipleFaces => "MULTIPLE_FACES",
            EventKind::OutOfFrame => "OUT_OF_FRAME",
            EventKind::GazeAverted => "GAZE_AVERTED",
            EventKind::EyesClosed => "EYES_CLOSED",
            EventKind::SessionStart => "SESSION_START",
            EventKind::SessionEnd => "SESSION_END",
            EventKind::ConnectionLost => "CONNECTION_LOST",
            EventKind::Expulsion => "EXPULSION",
        }
    }

    /// Lifecycle markers never escalate to warnings
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            EventKind::SessionStart | EventKind::SessionEnd | EventKind::ConnectionLost
        )
    }

    /// Kinds that count toward the local warning ledger
    pub fn escalates(&self) -> bool {
        matches!(
            self,
            EventKind::MultipleFaces
                | EventKind::OutOfFrame
                | EventKind::GazeAverted
                | EventKind::EyesClosed
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SEVERITY
// ============================================================================

/// Severity tier attached to a verdict.
///
/// `Info` is the "informational, do not escalate" tier: the verdict is a
/// complete no-op downstream even when its event list is non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "OK_INFO")]
    Info,
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "VIOLATION")]
    Violation,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Ok
    }
}

// ============================================================================
// VERDICT
// ============================================================================

/// Gaze and eye descriptors for the primary (largest) face in the frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaceMetrics {
    /// Head yaw angle (degrees, signed)
    #[serde(default)]
    pub yaw: Option<f64>,
    /// Horizontal gaze offset, normalized
    #[serde(default)]
    pub gaze_x: Option<f64>,
    /// Eye aspect ratio (low = eyes closed)
    #[serde(default)]
    pub ear: Option<f64>,
    /// Face box width relative to frame width
    #[serde(default)]
    pub face_width_norm: Option<f64>,
}

fn default_confidence() -> f64 {
    1.0
}

/// Per-frame verdict returned by the detection service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionVerdict {
    #[serde(default)]
    pub num_faces: u32,
    #[serde(default)]
    pub events: Vec<EventKind>,
    #[serde(default)]
    pub severity: Severity,
    /// 0.0 - 1.0, defaults to 1.0 when the service omits it
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub primary: Option<FaceMetrics>,
    /// Human caption for the host UI status line
    #[serde(default)]
    pub status_text: Option<String>,
}

impl DetectionVerdict {
    /// A verdict with no events, or at the informational tier, produces
    /// no submissions and no violations.
    pub fn is_noop(&self) -> bool {
        self.severity == Severity::Info || self.events.is_empty()
    }

    /// Confidence as the 0-100 integer the attempt authority stores
    pub fn confidence_pct(&self) -> u32 {
        (self.confidence * 100.0).round().clamp(0.0, 100.0) as u32
    }
}

/// Readiness response of the detection service health endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    /// Identifier of the loaded vision model, when ready
    #[serde(default)]
    pub model: Option<String>,
}

impl HealthStatus {
    pub fn is_ready(&self) -> bool {
        self.status == "ok"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_defaults() {
        let verdict: DetectionVerdict = serde_json::from_str("{}").unwrap();
        assert_eq!(verdict.num_faces, 0);
        assert!(verdict.events.is_empty());
        assert_eq!(verdict.severity, Severity::Ok);
        assert_eq!(verdict.confidence, 1.0);
        assert!(verdict.primary.is_none());
        assert!(verdict.is_noop());
    }

    #[test]
    fn test_verdict_full_parse() {
        let json = r#"{
            "num_faces": 2,
            "events": ["MULTIPLE_FACES", "GAZE_AVERTED"],
            "severity": "VIOLATION",
            "confidence": 0.87,
            "primary": { "yaw": -21.5, "gaze_x": 0.31, "ear": 0.27, "face_width_norm": 0.42 },
            "status_text": "Two people in frame"
        }"#;
        let verdict: DetectionVerdict = serde_json::from_str(json).unwrap();
        assert_eq!(verdict.num_faces, 2);
        assert_eq!(
            verdict.events,
            vec![EventKind::MultipleFaces, EventKind::GazeAverted]
        );
        assert_eq!(verdict.severity, Severity::Violation);
        assert_eq!(verdict.confidence_pct(), 87);
        assert_eq!(verdict.primary.as_ref().unwrap().yaw, Some(-21.5));
        assert!(!verdict.is_noop());
    }

    #[test]
    fn test_informational_tier_is_noop() {
        let json = r#"{ "events": ["GAZE_AVERTED"], "severity": "OK_INFO" }"#;
        let verdict: DetectionVerdict = serde_json::from_str(json).unwrap();
        assert!(verdict.is_noop());
    }

    #[test]
    fn test_kind_classification() {
        assert!(EventKind::MultipleFaces.escalates());
        assert!(EventKind::EyesClosed.escalates());
        assert!(!EventKind::SessionStart.escalates());
        assert!(EventKind::ConnectionLost.is_informational());
        assert!(!EventKind::Expulsion.is_informational());
        assert!(!EventKind::Expulsion.escalates());
    }

    #[test]
    fn test_health_readiness() {
        let ready: HealthStatus =
            serde_json::from_str(r#"{"status":"ok","model":"landmarker-v2"}"#).unwrap();
        assert!(ready.is_ready());
        assert_eq!(ready.model.as_deref(), Some("landmarker-v2"));

        let not_ready: HealthStatus =
            serde_json::from_str(r#"{"status":"model not loaded"}"#).unwrap();
        assert!(!not_ready.is_ready());
    }
}
