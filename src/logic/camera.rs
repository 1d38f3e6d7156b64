//! Camera Session Manager
//!
//! Owns the capture device for the lifetime of one monitoring session.
//! The platform camera itself lives behind the `VideoSource`/`VideoFeed`
//! seam so the host embeds whatever capture backend it has, and tests
//! inject synthetic feeds.

use crate::constants;
use crate::error::MonitorError;
use crate::logic::frame::RawFrame;

/// Requested capture parameters for the front-facing camera
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: constants::CAPTURE_WIDTH,
            height: constants::CAPTURE_HEIGHT,
        }
    }
}

/// A capture device that can be acquired for exclusive use
pub trait VideoSource: Send + Sync {
    /// Request exclusive access to the device at the target resolution.
    ///
    /// Fails with `MonitorError::DeviceUnavailable` on denied permission,
    /// missing device, or device busy.
    fn acquire(&self, config: &CameraConfig) -> Result<Box<dyn VideoFeed>, MonitorError>;
}

/// A live video feed obtained from an acquired device
pub trait VideoFeed: Send {
    /// Grab the current still frame.
    ///
    /// `None` means the feed has insufficient buffered data; the caller
    /// treats that as a no-op tick, not an error.
    fn poll_frame(&mut self) -> Option<RawFrame>;

    /// Stop all device tracks. Idempotent.
    fn stop(&mut self);
}

/// Holds the acquired feed for the duration monitoring is enabled
pub struct CameraSession {
    feed: Option<Box<dyn VideoFeed>>,
}

impl CameraSession {
    /// Acquire the device and open a session
    pub fn acquire(
        source: &dyn VideoSource,
        config: &CameraConfig,
    ) -> Result<Self, MonitorError> {
        let feed = source.acquire(config)?;
        log::info!("Camera acquired ({}x{})", config.width, config.height);
        Ok(Self { feed: Some(feed) })
    }

    pub fn is_active(&self) -> bool {
        self.feed.is_some()
    }

    pub fn poll_frame(&mut self) -> Option<RawFrame> {
        self.feed.as_mut()?.poll_frame()
    }

    /// Release the device. Idempotent.
    pub fn release(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            feed.stop();
            log::info!("Camera released");
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// TESTS
// ============================================================================
