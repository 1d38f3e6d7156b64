//! Error taxonomy for the monitoring pipeline
//!
//! Device and readiness failures are surfaced to the caller; per-tick and
//! per-event failures are recovered locally and never abort the exam.

/// Monitoring pipeline errors
#[derive(Debug, Clone)]
pub enum MonitorError {
    /// Camera permission denied, no device, or device busy
    DeviceUnavailable(String),
    /// Detection service health check failed or reported not-ready
    ServiceUnready(String),
    /// Network-level failure talking to a remote service
    Network(String),
    /// Remote service returned a non-success status
    Server(u16),
    /// Response body could not be parsed
    Parse(String),
    /// Frame could not be encoded for upload
    Encode(String),
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeviceUnavailable(e) => write!(f, "Camera unavailable: {}", e),
            Self::ServiceUnready(e) => write!(f, "Detection service not ready: {}", e),
            Self::Network(e) => write!(f, "Network error: {}", e),
            Self::Server(code) => write!(f, "Server error: {}", code),
            Self::Parse(e) => write!(f, "Parse error: {}", e),
            Self::Encode(e) => write!(f, "Frame encode error: {}", e),
        }
    }
}

impl std::error::Error for MonitorError {}
