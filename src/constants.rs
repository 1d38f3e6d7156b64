//! Central Configuration Constants
//!
//! Single source of truth for all monitoring defaults.
//! To change a default endpoint or window, only edit this file.

/// Default Detection Service URL (frame analysis + health check)
pub const DEFAULT_DETECTION_URL: &str = "http://localhost:8000/api/monitoring";

/// Default Attempt Authority URL (event submission + attempt finalization)
pub const DEFAULT_AUTHORITY_URL: &str = "http://localhost:8000/api";

/// Frame capture cadence (milliseconds)
pub const CAPTURE_INTERVAL_MS: u64 = 800;

/// Minimum spacing between two submissions of the same event kind (milliseconds)
pub const EVENT_COOLDOWN_MS: u64 = 2_500;

/// Minimum spacing between two counted warnings of the same event kind (milliseconds)
pub const ESCALATION_WINDOW_MS: u64 = 15_000;

/// Warnings before the attempt is expelled
pub const MAX_WARNINGS: u32 = 3;

/// JPEG quality factor for uploaded frames (1-100, reduced to keep uploads small)
pub const JPEG_QUALITY: u8 = 75;

/// Target capture resolution
pub const CAPTURE_WIDTH: u32 = 640;
pub const CAPTURE_HEIGHT: u32 = 480;

/// HTTP timeout for detection and authority calls (seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// How many recent local warning messages to retain for the host UI
pub const LOCAL_WARNING_HISTORY: usize = 10;

/// Crate version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get detection service URL from environment or use default
pub fn get_detection_url() -> String {
    std::env::var("DETECTION_SERVICE_URL")
        .unwrap_or_else(|_| DEFAULT_DETECTION_URL.to_string())
}

/// Get attempt authority URL from environment or use default
pub fn get_authority_url() -> String {
    std::env::var("ATTEMPT_AUTHORITY_URL")
        .unwrap_or_else(|_| DEFAULT_AUTHORITY_URL.to_string())
}

/// Get bearer token for both services, if configured
pub fn get_auth_token() -> Option<String> {
    std::env::var("MONITOR_AUTH_TOKEN").ok().filter(|t| !t.is_empty())
}

/// Get capture interval from environment or use default
pub fn get_capture_interval_ms() -> u64 {
    std::env::var("MONITOR_CAPTURE_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(CAPTURE_INTERVAL_MS)
}

/// Get submission cooldown from environment or use default
pub fn get_event_cooldown_ms() -> u64 {
    std::env::var("MONITOR_EVENT_COOLDOWN_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(EVENT_COOLDOWN_MS)
}

/// Get escalation window from environment or use default
pub fn get_escalation_window_ms() -> u64 {
    std::env::var("MONITOR_ESCALATION_WINDOW_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(ESCALATION_WINDOW_MS)
}

/// Get warning threshold from environment or use default
pub fn get_max_warnings() -> u32 {
    std::env::var("MONITOR_MAX_WARNINGS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(MAX_WARNINGS)
}
