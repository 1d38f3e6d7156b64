//! Exam Integrity Monitor - Core Monitoring Pipeline
//!
//! Client-resident subsystem that turns a camera feed into trust
//! decisions during a timed exam attempt. Hosts embed a
//! [`MonitoringSession`]: it samples frames on a fixed cadence, ships
//! them to the detection service, reports qualifying events to the
//! attempt authority, escalates repeated violations toward expulsion and
//! runs the attempt countdown. Everything the host needs to render
//! arrives over the [`MonitorSignal`] channel.

pub mod constants;
pub mod error;
pub mod logic;

pub use error::MonitorError;
pub use logic::attempt::{
    AnswerRecord, Attempt, AttemptApi, AttemptState, AuthorityConfig, EventSubmitResponse,
    HttpAttemptClient, MonitoringEvent, TerminalReason,
};
pub use logic::camera::{CameraConfig, VideoFeed, VideoSource};
pub use logic::detection::{DetectionApi, DetectionConfig, HttpDetectionClient};
pub use logic::escalation::MonitorState;
pub use logic::events::{signal_channel, MonitorSignal, SignalReceiver, SignalSender};
pub use logic::frame::{EncodedFrame, RawFrame};
pub use logic::session::{MonitorConfig, MonitoringSession};
pub use logic::verdict::{DetectionVerdict, EventKind, FaceMetrics, HealthStatus, Severity};
