//! Logic Module - Monitoring Pipeline Engines
//!
//! The client-side exam integrity pipeline: camera session, frame
//! sampling, detection client, event reporting, violation escalation and
//! the attempt countdown, all owned by one `MonitoringSession`.

// Core pipeline
pub mod camera;
pub mod detection;
pub mod frame;
pub mod verdict;

// Attempt authority and reporting
pub mod attempt;
pub mod cooldown;
pub mod reporter;

// Session state
pub mod escalation;
pub mod events;
pub mod session;
pub mod timer;
