//! Detection Client
//!
//! HTTP client for the remote Detection Service: one multipart frame in,
//! one structured verdict out, plus the readiness probe polled before the
//! sampling loop is allowed to start.

use async_trait::async_trait;
use std::time::Duration;

use crate::constants;
use crate::error::MonitorError;
use crate::logic::frame::EncodedFrame;
use crate::logic::verdict::{DetectionVerdict, HealthStatus};

/// Detection service configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            base_url: constants::get_detection_url(),
            auth_token: constants::get_auth_token(),
            timeout_seconds: constants::DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

/// Seam to the detection service, object-safe so sessions and tests can
/// share the same wiring
#[async_trait]
pub trait DetectionApi: Send + Sync {
    /// Readiness probe. Sampling must never start unless this reports ok.
    async fn health(&self) -> Result<HealthStatus, MonitorError>;

    /// Classify one encoded frame
    async fn analyze(&self, frame: &EncodedFrame) -> Result<DetectionVerdict, MonitorError>;
}

/// Production client backed by `reqwest`
pub struct HttpDetectionClient {
    config: DetectionConfig,
    http_client: reqwest::Client,
}

impl HttpDetectionClient {
    pub fn new(config: DetectionConfig) -> Result<Self, MonitorError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| MonitorError::Network(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth_token {
            Some(token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }
}

#[async_trait]
impl DetectionApi for HttpDetectionClient {
    async fn health(&self) -> Result<HealthStatus, MonitorError> {
        let url = format!("{}/detection-health/", self.config.base_url);

        let response = self
            .with_auth(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| MonitorError::Network(e.to_string()))?;

        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| MonitorError::Parse(e.to_string()))
        } else {
            Err(MonitorError::Server(response.status().as_u16()))
        }
    }

    async fn analyze(&self, frame: &EncodedFrame) -> Result<DetectionVerdict, MonitorError> {
        let url = format!("{}/analyze-frame/", self.config.base_url);

        let part = reqwest::multipart::Part::bytes(frame.jpeg.clone())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| MonitorError::Network(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .with_auth(self.http_client.post(&url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| MonitorError::Network(e.to_string()))?;

        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| MonitorError::Parse(e.to_string()))
        } else {
            Err(MonitorError::Server(response.status().as_u16()))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
