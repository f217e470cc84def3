//! HTTP API — exposes the query engine to a UI layer.
//!
//! Endpoints:
//!   GET  /api/status                                        → engine status (JSON)
//!   GET  /api/events?cameras=cam1,cam2&from=...&to=...      → event list (JSON)
//!   GET  /api/recordings?cameras=cam1&from=...&to=...       → recording list (JSON)
//!   GET  /api/segments?camera=cam1&from=...&to=...          → segment list (JSON)
//!   GET  /api/seek?camera=cam1&from=...&to=...&target=...   → seek offset (JSON)

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{Query as Params, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::engine::executor::CameraQueryEngine;
use crate::engine::planner;
use crate::media::Media;
use crate::query::{Event, EventQuery, Query, Recording, RecordingQuery, Segment};

/// Shared state passed to all handlers.
pub struct AppState {
    pub engine: CameraQueryEngine,
}

// ──────────────── request / response types ────────────────────────────────

#[derive(Deserialize)]
pub struct EventParams {
    cameras: String,
    from: Option<String>,
    to: Option<String>,
    limit: Option<u32>,
    label: Option<String>,
    zone: Option<String>,
}

#[derive(Deserialize)]
pub struct RecordingParams {
    cameras: String,
    from: Option<String>,
    to: Option<String>,
    limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct SegmentParams {
    camera: String,
    from: String,
    to: String,
}

#[derive(Deserialize)]
pub struct SeekParams {
    camera: String,
    from: String,
    to: String,
    target: String,
}

#[derive(Serialize)]
struct EventsResponse {
    events: Vec<Event>,
    /// Renderable media for events carrying a clip or snapshot.
    media: Vec<Media>,
    total: usize,
    /// Seconds the client may reuse this response before re-querying.
    max_age_seconds: Option<u64>,
}

#[derive(Serialize)]
struct RecordingsResponse {
    recordings: Vec<Recording>,
    /// One VOD locator per recording hour.
    media: Vec<Media>,
    total: usize,
    max_age_seconds: Option<u64>,
}

#[derive(Serialize)]
struct SegmentsResponse {
    camera: String,
    segments: Vec<Segment>,
    total: usize,
}

#[derive(Serialize)]
struct SeekResponse {
    seek_seconds: Option<f64>,
}

// ──────────────── router ──────────────────────────────────────────────────

/// Build the axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(handle_status))
        .route("/api/events", get(handle_events))
        .route("/api/recordings", get(handle_recordings))
        .route("/api/segments", get(handle_segments))
        .route("/api/seek", get(handle_seek))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn start_server(state: Arc<AppState>, port: u16) {
    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", port);
    info!(port, "HTTP API listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, "Failed to bind HTTP server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "HTTP server error");
    }
}

// ──────────────── helpers ─────────────────────────────────────────────────

fn parse_time(value: &str, field: &str) -> Result<DateTime<Utc>, String> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .map(|dt| dt.and_utc())
        .map_err(|e| format!("Invalid '{field}': {e}. Use format: 2026-02-19T14:00:00"))
}

fn parse_opt_time(value: &Option<String>, field: &str) -> Result<Option<DateTime<Utc>>, String> {
    match value {
        Some(v) => parse_time(v, field).map(Some),
        None => Ok(None),
    }
}

fn camera_set(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn bad_request(message: String) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(serde_json::json!({"error": message})),
    )
        .into_response()
}

fn engine_error(e: crate::error::QueryError) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(serde_json::json!({"error": e.to_string()})),
    )
        .into_response()
}

// ──────────────── handlers ────────────────────────────────────────────────

async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.engine.status();
    (StatusCode::OK, axum::Json(serde_json::to_value(status).unwrap()))
}

async fn handle_events(
    State(state): State<Arc<AppState>>,
    Params(params): Params<EventParams>,
) -> axum::response::Response {
    let start = match parse_opt_time(&params.from, "from") {
        Ok(t) => t,
        Err(e) => return bad_request(e),
    };
    let end = match parse_opt_time(&params.to, "to") {
        Ok(t) => t,
        Err(e) => return bad_request(e),
    };

    let camera_ids = camera_set(&params.cameras);
    let base = EventQuery {
        start,
        end,
        limit: params.limit,
        labels: params.label.clone().map(|l| std::iter::once(l).collect()),
        zones: params.zone.clone().map(|z| std::iter::once(z).collect()),
        ..Default::default()
    };

    let Some(queries) = planner::plan_event_queries(state.engine.cameras(), &camera_ids, &base)
    else {
        let resp = EventsResponse {
            events: Vec::new(),
            media: Vec::new(),
            total: 0,
            max_age_seconds: None,
        };
        return (StatusCode::OK, axum::Json(serde_json::to_value(resp).unwrap())).into_response();
    };
    let queries: Vec<Query> = queries.into_iter().map(Query::Event).collect();
    let max_age_seconds = queries
        .first()
        .and_then(|q| state.engine.query_result_max_age(q.kind()));

    let mut events: Vec<Event> = Vec::new();
    for query in &queries {
        match state.engine.execute(query).await {
            Ok(Some(map)) => {
                for result in map.values() {
                    if let Some(e) = result.events() {
                        events.extend_from_slice(e);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => return engine_error(e),
        }
    }
    events.sort_by(|a, b| b.start_time.cmp(&a.start_time));

    let media: Vec<Media> = events.iter().filter_map(Media::from_event).collect();
    let total = events.len();
    let resp = EventsResponse { events, media, total, max_age_seconds };
    (StatusCode::OK, axum::Json(serde_json::to_value(resp).unwrap())).into_response()
}

async fn handle_recordings(
    State(state): State<Arc<AppState>>,
    Params(params): Params<RecordingParams>,
) -> axum::response::Response {
    let start = match parse_opt_time(&params.from, "from") {
        Ok(t) => t,
        Err(e) => return bad_request(e),
    };
    let end = match parse_opt_time(&params.to, "to") {
        Ok(t) => t,
        Err(e) => return bad_request(e),
    };

    let camera_ids = camera_set(&params.cameras);
    let base = RecordingQuery {
        start,
        end,
        limit: params.limit,
        ..Default::default()
    };
    let Some(query) = planner::plan_recording_query(&camera_ids, &base) else {
        let resp = RecordingsResponse {
            recordings: Vec::new(),
            media: Vec::new(),
            total: 0,
            max_age_seconds: None,
        };
        return (StatusCode::OK, axum::Json(serde_json::to_value(resp).unwrap())).into_response();
    };
    let query = Query::Recording(query);
    let max_age_seconds = state.engine.query_result_max_age(query.kind());

    let mut recordings: Vec<Recording> = Vec::new();
    match state.engine.execute(&query).await {
        Ok(Some(map)) => {
            for result in map.values() {
                if let Some(r) = result.recordings() {
                    recordings.extend_from_slice(r);
                }
            }
        }
        Ok(None) => {}
        Err(e) => return engine_error(e),
    }
    recordings.sort_by(|a, b| b.start_time.cmp(&a.start_time));

    let media: Vec<Media> = recordings
        .iter()
        .filter_map(|rec| {
            let cam = state.engine.cameras().get(&rec.camera_id)?;
            Some(Media::from_recording(rec, cam))
        })
        .collect();
    let total = recordings.len();
    let resp = RecordingsResponse { recordings, media, total, max_age_seconds };
    (StatusCode::OK, axum::Json(serde_json::to_value(resp).unwrap())).into_response()
}

async fn handle_segments(
    State(state): State<Arc<AppState>>,
    Params(params): Params<SegmentParams>,
) -> axum::response::Response {
    let from = match parse_time(&params.from, "from") {
        Ok(t) => t,
        Err(e) => return bad_request(e),
    };
    let to = match parse_time(&params.to, "to") {
        Ok(t) => t,
        Err(e) => return bad_request(e),
    };

    let camera_ids: BTreeSet<String> = std::iter::once(params.camera.clone()).collect();
    let Some(query) = planner::plan_segments_query(&camera_ids, Some(from), Some(to)) else {
        return bad_request("No segments query possible for this camera".to_string());
    };

    let mut segments: Vec<Segment> = Vec::new();
    match state.engine.execute_segments_query(&query).await {
        Ok(Some(map)) => {
            for result in map.values() {
                if let Some(s) = result.segments() {
                    segments.extend_from_slice(s);
                }
            }
        }
        Ok(None) => {}
        Err(e) => return engine_error(e),
    }

    let total = segments.len();
    let resp = SegmentsResponse {
        camera: params.camera,
        segments,
        total,
    };
    (StatusCode::OK, axum::Json(serde_json::to_value(resp).unwrap())).into_response()
}

async fn handle_seek(
    State(state): State<Arc<AppState>>,
    Params(params): Params<SeekParams>,
) -> axum::response::Response {
    let from = match parse_time(&params.from, "from") {
        Ok(t) => t,
        Err(e) => return bad_request(e),
    };
    let to = match parse_time(&params.to, "to") {
        Ok(t) => t,
        Err(e) => return bad_request(e),
    };
    let target = match parse_time(&params.target, "target") {
        Ok(t) => t,
        Err(e) => return bad_request(e),
    };

    let Some(camera) = state.engine.cameras().get(&params.camera) else {
        return bad_request(format!("Unknown camera: {}", params.camera));
    };
    // Synthesized span; only the time bounds matter for seeking.
    let recording = Recording {
        camera_id: params.camera.clone(),
        start_time: from,
        end_time: to,
        events: 0,
    };
    let media = Media::from_recording(&recording, camera);

    match state.engine.get_media_seek_time(&media, target).await {
        Ok(seek_seconds) => {
            let resp = SeekResponse { seek_seconds };
            (StatusCode::OK, axum::Json(serde_json::to_value(resp).unwrap())).into_response()
        }
        Err(e) => engine_error(e),
    }
}
