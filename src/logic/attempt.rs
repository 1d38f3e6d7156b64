//! Attempt Authority Client
//!
//! The backend system of record for an exam attempt. It persists
//! monitoring events, decides authoritative expulsion, and accepts the
//! finalize request. Everything here is a thin, typed wire contract; the
//! authority's own rules are opaque to the client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::constants;
use crate::error::MonitorError;
use crate::logic::verdict::EventKind;

// ============================================================================
// ATTEMPT MODEL
// ============================================================================

/// Lifecycle state of one exam-taking session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptState {
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "EXPELLED")]
    Expelled,
    #[serde(rename = "TIME_EXPIRED")]
    TimeExpired,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptState::InProgress)
    }
}

/// Reason passed to the finalize request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalReason {
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "EXPELLED")]
    Expelled,
    #[serde(rename = "TIME_EXPIRED")]
    TimeExpired,
}

impl TerminalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalReason::Completed => "COMPLETED",
            TerminalReason::Expelled => "EXPELLED",
            TerminalReason::TimeExpired => "TIME_EXPIRED",
        }
    }

    pub fn to_state(&self) -> AttemptState {
        match self {
            TerminalReason::Completed => AttemptState::Completed,
            TerminalReason::Expelled => AttemptState::Expelled,
            TerminalReason::TimeExpired => AttemptState::TimeExpired,
        }
    }
}

/// Client-side view of the attempt being monitored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub attempt_id: u64,
    pub exam_id: Option<u64>,
    pub exam_title: Option<String>,
    pub student_id: u64,
    pub student_name: Option<String>,
    /// Remaining time budget in seconds when monitoring starts
    pub remaining_secs: u64,
}

// ============================================================================
// MONITORING EVENT
// ============================================================================

/// Durable record submitted to the attempt authority.
///
/// Lifetime ends at submission; the server owns persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringEvent {
    pub event_id: String,
    pub attempt_id: u64,
    pub student_id: u64,
    pub kind: EventKind,
    /// 0-100
    pub confidence: u32,
    pub details: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl MonitoringEvent {
    pub fn new(attempt: &Attempt, kind: EventKind, confidence: u32) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            attempt_id: attempt.attempt_id,
            student_id: attempt.student_id,
            kind,
            confidence: confidence.min(100),
            details: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    // Builder pattern methods
    pub fn with_message(mut self, message: &str) -> Self {
        self.details
            .insert("message".to_string(), serde_json::json!(message));
        self
    }

    pub fn with_detail(mut self, key: &str, value: serde_json::Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    /// Attach the exam metadata the authority stores alongside the event
    pub fn with_attempt_context(mut self, attempt: &Attempt) -> Self {
        if let Some(name) = &attempt.student_name {
            self.details
                .insert("student_name".to_string(), serde_json::json!(name));
        }
        if let Some(exam_id) = attempt.exam_id {
            self.details
                .insert("exam_id".to_string(), serde_json::json!(exam_id));
        }
        if let Some(title) = &attempt.exam_title {
            self.details
                .insert("exam_title".to_string(), serde_json::json!(title));
        }
        self
    }
}

/// Synchronous response to an event submission.
///
/// Either field being truthy means the backend has authoritatively
/// expelled this attempt.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventSubmitResponse {
    #[serde(default)]
    pub attempt_expelled: bool,
    #[serde(default)]
    pub expulsion: Option<serde_json::Value>,
}

impl EventSubmitResponse {
    pub fn backend_expelled(&self) -> bool {
        self.attempt_expelled || self.expulsion.is_some()
    }
}

/// One locally buffered answer, flushed best-effort during finalization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: u64,
    pub order: u32,
    /// Selected option id(s) and any per-question metadata
    pub payload: serde_json::Value,
}

// ============================================================================
// AUTHORITY CLIENT
// ============================================================================

/// Attempt authority configuration
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: constants::get_authority_url(),
            auth_token: constants::get_auth_token(),
            timeout_seconds: constants::DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

/// Seam to the attempt authority
#[async_trait]
pub trait AttemptApi: Send + Sync {
    /// Submit one monitoring event; the response carries the
    /// authoritative expulsion verdict.
    async fn submit_event(
        &self,
        event: &MonitoringEvent,
    ) -> Result<EventSubmitResponse, MonitorError>;

    /// Persist one buffered answer
    async fn save_answer(&self, attempt_id: u64, answer: &AnswerRecord)
        -> Result<(), MonitorError>;

    /// Mark the attempt terminal with the given reason
    async fn finalize(&self, attempt_id: u64, reason: TerminalReason)
        -> Result<(), MonitorError>;
}

/// Production client backed by `reqwest`
pub struct HttpAttemptClient {
    config: AuthorityConfig,
    http_client: reqwest::Client,
}

impl HttpAttemptClient {
    pub fn new(config: AuthorityConfig) -> Result<Self, MonitorError> {
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

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R, MonitorError> {
        let response = self
            .with_auth(self.http_client.post(url))
            .json(body)
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

#[derive(Serialize)]
struct FinalizeRequest<'a> {
    reason: &'a str,
}

#[derive(Deserialize)]
struct Acknowledged {
    #[serde(default)]
    #[allow(dead_code)]
    ok: bool,
}

#[async_trait]
impl AttemptApi for HttpAttemptClient {
    async fn submit_event(
        &self,
        event: &MonitoringEvent,
    ) -> Result<EventSubmitResponse, MonitorError> {
        let url = format!("{}/monitoring/events/", self.config.base_url);
        self.post_json(&url, event).await
    }

    async fn save_answer(
        &self,
        attempt_id: u64,
        answer: &AnswerRecord,
    ) -> Result<(), MonitorError> {
        let url = format!("{}/attempts/{}/answers/", self.config.base_url, attempt_id);
        let _ack: Acknowledged = self.post_json(&url, answer).await?;
        Ok(())
    }

    async fn finalize(&self, attempt_id: u64, reason: TerminalReason) -> Result<(), MonitorError> {
        let url = format!("{}/attempts/{}/finalize/", self.config.base_url, attempt_id);
        let _ack: Acknowledged = self
            .post_json(
                &url,
                &FinalizeRequest {
                    reason: reason.as_str(),
                },
            )
            .await?;
        log::info!("Attempt {} finalized as {}", attempt_id, reason.as_str());
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
