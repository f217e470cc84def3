//! Backend transport: command/response shapes and the transport trait.
//!
//! The engine never talks HTTP directly — it goes through the [`Backend`]
//! trait, which takes the backend's bit-exact command objects and returns
//! schema-validated payloads. `HttpBackend` is the production
//! implementation; tests substitute a scripted fake.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::InstanceConfig;
use crate::error::{QueryError, Result};

// ──────────────── request shapes ──────────────────────────────────────────

/// Event search command.
#[derive(Debug, Clone, Serialize)]
pub struct EventSearchRequest {
    pub instance_id: String,
    pub cameras: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<String>>,
    /// Epoch seconds, inclusive lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<i64>,
    /// Epoch seconds, exclusive upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<i64>,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_clip: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_snapshot: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorites: Option<bool>,
}

/// Recording summary command — returns per-day, per-hour counts.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingSummaryRequest {
    pub instance_id: String,
    pub camera: String,
    pub timezone: String,
}

/// Recording segments command.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingSegmentsRequest {
    pub instance_id: String,
    pub camera: String,
    pub after: i64,
    pub before: i64,
}

/// Favorite/retain toggle command.
#[derive(Debug, Clone, Serialize)]
pub struct RetainRequest {
    pub instance_id: String,
    pub event_id: String,
    pub retain: bool,
}

// ──────────────── response payloads ───────────────────────────────────────

/// Raw event record as returned by the backend. `camera` is the backend's
/// own camera name, not a local camera ID.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendEvent {
    pub id: String,
    pub camera: String,
    pub label: String,
    /// Epoch seconds, possibly fractional.
    pub start_time: f64,
    pub end_time: Option<f64>,
    pub has_clip: bool,
    pub has_snapshot: bool,
    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default)]
    pub top_score: Option<f64>,
    #[serde(default)]
    pub retain_indefinitely: bool,
}

/// One day in a recording summary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordingSummaryDay {
    pub day: NaiveDate,
    #[serde(default)]
    pub events: u32,
    pub hours: Vec<RecordingSummaryHour>,
}

/// One recorded hour within a summary day.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordingSummaryHour {
    pub hour: u32,
    #[serde(default)]
    pub events: u32,
    #[serde(default)]
    pub duration: u32,
}

/// Raw segment record.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SegmentRecord {
    pub start_time: f64,
    pub end_time: f64,
    pub id: String,
}

/// Response to a retain toggle.
#[derive(Debug, Clone, Deserialize)]
pub struct RetainResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// Convert backend epoch seconds (possibly fractional) to a UTC instant.
pub fn datetime_from_epoch(secs: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}

// ──────────────── transport trait ─────────────────────────────────────────

/// Asynchronous request/response transport to a surveillance backend.
///
/// Implementations fail the whole sub-query on transport or validation
/// errors; the engine decides how failures are contained.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn events(&self, request: &EventSearchRequest) -> Result<Vec<BackendEvent>>;

    async fn recording_summary(
        &self,
        request: &RecordingSummaryRequest,
    ) -> Result<Vec<RecordingSummaryDay>>;

    async fn recording_segments(
        &self,
        request: &RecordingSegmentsRequest,
    ) -> Result<Vec<SegmentRecord>>;

    async fn retain_event(&self, request: &RetainRequest) -> Result<RetainResponse>;
}

// ──────────────── HTTP implementation ─────────────────────────────────────

/// HTTP transport: posts command objects as JSON to each instance's base
/// URL and validates the JSON responses against the payload schemas.
pub struct HttpBackend {
    client: reqwest::Client,
    /// instance_id → base URL.
    instances: HashMap<String, String>,
}

impl HttpBackend {
    pub fn new(instances: &[InstanceConfig]) -> Self {
        Self {
            client: reqwest::Client::new(),
            instances: instances
                .iter()
                .map(|i| (i.id.clone(), i.url.trim_end_matches('/').to_string()))
                .collect(),
        }
    }

    fn instance_url(&self, instance_id: &str, path: &str) -> Result<String> {
        let base = self.instances.get(instance_id).ok_or_else(|| {
            QueryError::Transport(format!("Unknown backend instance '{instance_id}'"))
        })?;
        Ok(format!("{base}{path}"))
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        url: String,
        request: &Req,
    ) -> Result<Resp> {
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| QueryError::Transport(format!("POST {url}: {e}")))?
            .error_for_status()
            .map_err(|e| QueryError::Transport(format!("POST {url}: {e}")))?;
        response
            .json::<Resp>()
            .await
            .map_err(|e| QueryError::Validation(format!("{url}: {e}")))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn events(&self, request: &EventSearchRequest) -> Result<Vec<BackendEvent>> {
        let url = self.instance_url(&request.instance_id, "/api/events/search")?;
        self.post(url, request).await
    }

    async fn recording_summary(
        &self,
        request: &RecordingSummaryRequest,
    ) -> Result<Vec<RecordingSummaryDay>> {
        let url = self.instance_url(&request.instance_id, "/api/recordings/summary")?;
        self.post(url, request).await
    }

    async fn recording_segments(
        &self,
        request: &RecordingSegmentsRequest,
    ) -> Result<Vec<SegmentRecord>> {
        let url = self.instance_url(&request.instance_id, "/api/recordings/segments")?;
        self.post(url, request).await
    }

    async fn retain_event(&self, request: &RetainRequest) -> Result<RetainResponse> {
        let url = self.instance_url(&request.instance_id, "/api/events/retain")?;
        self.post(url, request).await
    }
}
