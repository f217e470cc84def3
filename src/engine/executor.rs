// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Query executor: fans logical queries out into per-instance or
//! per-camera backend sub-queries, consults the request cache and segment
//! store, and fans the results back into a single map.
//!
//! The engine owns the cache and the store exclusively; nothing else
//! mutates them. Concurrent sub-fetches are joined with `join_all` and
//! each sub-query resolves to its own `Result`, so one failed camera or
//! instance never invalidates siblings that succeeded. The first error
//! propagates only when no sub-query produced anything.

use std::collections::{BTreeMap, BTreeSet};
use std::iter;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{
    datetime_from_epoch, Backend, BackendEvent, EventSearchRequest, RecordingSegmentsRequest,
    RecordingSummaryDay, RecordingSummaryRequest, RetainRequest,
};
use crate::config::{CameraMap, EngineConfig};
use crate::engine::cache::RequestCache;
use crate::engine::store::SegmentStore;
use crate::engine::{gc, planner};
use crate::error::{QueryError, Result};
use crate::media::Media;
use crate::query::{
    Event, EventQuery, Query, QueryKind, QueryResult, QueryResultMap, Recording, RecordingQuery,
    RecordingSegmentsQuery, ResultData, Segment,
};
use crate::seek;

/// Backend-side result cap applied when the caller gives no limit.
pub const DEFAULT_EVENT_LIMIT: u32 = 50;

/// Snapshot of engine population, for status output.
#[derive(Debug, Serialize)]
pub struct EngineStatus {
    pub cached_requests: usize,
    pub stored_segments: usize,
    pub cameras: Vec<CameraSegmentCount>,
}

#[derive(Debug, Serialize)]
pub struct CameraSegmentCount {
    pub camera_id: String,
    pub segments: usize,
}

/// The camera query engine: executor plus the caches it owns.
pub struct CameraQueryEngine {
    backend: Arc<dyn Backend>,
    cameras: Arc<CameraMap>,
    timezone: String,
    event_ttl: Duration,
    recording_ttl: Duration,
    cache: RwLock<RequestCache>,
    store: Arc<RwLock<SegmentStore>>,
    gc_tx: mpsc::Sender<()>,
    gc_handle: JoinHandle<()>,
}

impl CameraQueryEngine {
    /// Create the engine and spawn its GC task. Must be called from within
    /// a tokio runtime.
    pub fn new(backend: Arc<dyn Backend>, cameras: CameraMap, engine: &EngineConfig) -> Self {
        let cameras = Arc::new(cameras);
        let store = Arc::new(RwLock::new(SegmentStore::new()));
        let (gc_tx, gc_handle) = gc::spawn_gc(
            backend.clone(),
            cameras.clone(),
            store.clone(),
            StdDuration::from_secs(engine.gc_interval_secs),
            engine.timezone.clone(),
        );

        info!(
            cameras = cameras.len(),
            event_ttl = engine.event_ttl_secs,
            recording_ttl = engine.recording_ttl_secs,
            gc_interval = engine.gc_interval_secs,
            "Camera query engine started"
        );

        Self {
            backend,
            cameras: cameras.clone(),
            timezone: engine.timezone.clone(),
            event_ttl: Duration::seconds(engine.event_ttl_secs as i64),
            recording_ttl: Duration::seconds(engine.recording_ttl_secs as i64),
            cache: RwLock::new(RequestCache::new()),
            store,
            gc_tx,
            gc_handle,
        }
    }

    /// Camera lookup map this engine was built with.
    pub fn cameras(&self) -> &CameraMap {
        &self.cameras
    }

    /// Execute a logical query of any kind.
    pub async fn execute(&self, query: &Query) -> Result<Option<QueryResultMap>> {
        debug!(
            kind = ?query.kind(),
            cameras = query.camera_ids().len(),
            "Executing query"
        );
        match query {
            Query::Event(q) => self.execute_event_query(q).await,
            Query::Recording(q) => self.execute_recording_query(q).await,
            Query::RecordingSegments(q) => self.execute_segments_query(q).await,
        }
    }

    /// Execute an event query: one sub-query per backend instance, each
    /// covering all target cameras on that instance.
    ///
    /// The request cache is keyed by the instance-scoped query. On a hit
    /// the *outer* query keys the result map, preserving caller-visible
    /// query identity even though fetching is batched by instance.
    pub async fn execute_event_query(&self, query: &EventQuery) -> Result<Option<QueryResultMap>> {
        if query.camera_ids.is_empty() {
            return Ok(None);
        }

        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for id in &query.camera_ids {
            if let Some(cam) = self.cameras.get(id) {
                if cam.camera_name.is_some() && !cam.synthetic {
                    groups
                        .entry(cam.instance.clone())
                        .or_default()
                        .insert(id.clone());
                }
            }
        }
        if groups.is_empty() {
            return Ok(None);
        }

        let now = Utc::now();
        let mut results = QueryResultMap::new();
        let mut fetches = Vec::new();

        for (instance_id, ids) in groups {
            let scoped = EventQuery {
                camera_ids: ids.clone(),
                ..query.clone()
            };
            let key = Query::Event(scoped);

            let hit = { self.cache.read().get(&key, now) };
            if let Some(result) = hit {
                debug!(instance = instance_id, "Event sub-query served from cache");
                results.insert(Query::Event(query.clone()), result);
                continue;
            }

            let request = self.event_request(&instance_id, &ids, query);
            fetches.push(async move {
                let outcome = self.backend.events(&request).await;
                (instance_id, ids, key, outcome)
            });
        }

        let mut first_err = None;
        for (instance_id, ids, key, outcome) in join_all(fetches).await {
            match outcome {
                Ok(raw) => {
                    let events = self.resolve_events(&instance_id, &ids, raw);
                    let result = QueryResult {
                        instance_id,
                        cached: false,
                        expiry: Some(now + self.event_ttl),
                        data: ResultData::Events(events),
                    };
                    self.cache
                        .write()
                        .set(key.clone(), result.clone(), now + self.event_ttl);
                    results.insert(key, result);
                }
                Err(e) => {
                    warn!(instance = instance_id, error = %e, "Event sub-query failed");
                    first_err.get_or_insert(e);
                }
            }
        }

        finish(results, first_err)
    }

    /// Execute a recording query: the backend cannot search recordings
    /// across cameras, so exactly one sub-query per camera is issued.
    ///
    /// Recordings are synthesized locally from the per-camera day/hour
    /// summary. A `limit` truncates per camera, before merging — the
    /// merged map is not a global top-N across cameras.
    pub async fn execute_recording_query(
        &self,
        query: &RecordingQuery,
    ) -> Result<Option<QueryResultMap>> {
        if query.camera_ids.is_empty() {
            return Ok(None);
        }

        let now = Utc::now();
        let mut results = QueryResultMap::new();
        let mut fetches = Vec::new();

        for id in &query.camera_ids {
            let Some(cam) = self.cameras.get(id) else {
                continue;
            };
            let Some(name) = cam.camera_name.clone() else {
                continue;
            };
            if cam.synthetic {
                continue;
            }

            let scoped = RecordingQuery {
                camera_ids: iter::once(id.clone()).collect(),
                ..query.clone()
            };
            let key = Query::Recording(scoped);

            let hit = { self.cache.read().get(&key, now) };
            if let Some(result) = hit {
                debug!(camera = id, "Recording sub-query served from cache");
                results.insert(key, result);
                continue;
            }

            let request = RecordingSummaryRequest {
                instance_id: cam.instance.clone(),
                camera: name,
                timezone: self.timezone.clone(),
            };
            let camera_id = id.clone();
            let instance_id = cam.instance.clone();
            fetches.push(async move {
                let outcome = self.backend.recording_summary(&request).await;
                (camera_id, instance_id, key, outcome)
            });
        }

        let mut first_err = None;
        for (camera_id, instance_id, key, outcome) in join_all(fetches).await {
            match outcome {
                Ok(days) => {
                    let mut recordings =
                        recordings_from_summary(&camera_id, &days, query.start, query.end);
                    recordings.sort_by(|a, b| b.start_time.cmp(&a.start_time));
                    if let Some(limit) = query.limit {
                        recordings.truncate(limit as usize);
                    }
                    let result = QueryResult {
                        instance_id,
                        cached: false,
                        expiry: Some(now + self.recording_ttl),
                        data: ResultData::Recordings(recordings),
                    };
                    self.cache
                        .write()
                        .set(key.clone(), result.clone(), now + self.recording_ttl);
                    results.insert(key, result);
                }
                Err(e) => {
                    warn!(camera = camera_id, error = %e, "Recording sub-query failed");
                    first_err.get_or_insert(e);
                }
            }
        }

        finish(results, first_err)
    }

    /// Execute a recording-segments query: one sub-query per camera.
    ///
    /// Cache granularity is finer than the outer query: the segment store
    /// is consulted for a previously fetched window covering the request,
    /// so segment data is reused across overlapping-but-different
    /// windows. Fresh fetches land in the store and schedule a GC pass
    /// without blocking the caller. Segment results carry no TTL —
    /// freshness is maintained by GC reconciliation.
    pub async fn execute_segments_query(
        &self,
        query: &RecordingSegmentsQuery,
    ) -> Result<Option<QueryResultMap>> {
        if query.camera_ids.is_empty() {
            return Ok(None);
        }

        let mut results = QueryResultMap::new();
        let mut fetches = Vec::new();

        for id in &query.camera_ids {
            let Some(cam) = self.cameras.get(id) else {
                continue;
            };
            let Some(name) = cam.camera_name.clone() else {
                continue;
            };
            if cam.synthetic {
                continue;
            }

            let scoped = RecordingSegmentsQuery {
                camera_ids: iter::once(id.clone()).collect(),
                start: query.start,
                end: query.end,
            };
            let key = Query::RecordingSegments(scoped);

            let covered = self.store.read().has_coverage(id, query.start, query.end);
            if covered {
                let segments = self
                    .store
                    .read()
                    .segments_in_range(id, query.start, query.end);
                debug!(camera = id, segments = segments.len(), "Segments served from store");
                results.insert(
                    key,
                    QueryResult {
                        instance_id: cam.instance.clone(),
                        cached: true,
                        expiry: None,
                        data: ResultData::Segments(segments),
                    },
                );
                continue;
            }

            let request = RecordingSegmentsRequest {
                instance_id: cam.instance.clone(),
                camera: name,
                after: query.start.timestamp(),
                before: query.end.timestamp(),
            };
            let camera_id = id.clone();
            let instance_id = cam.instance.clone();
            fetches.push(async move {
                let outcome = self.backend.recording_segments(&request).await;
                (camera_id, instance_id, key, outcome)
            });
        }

        let mut first_err = None;
        let mut fetched_any = false;
        for (camera_id, instance_id, key, outcome) in join_all(fetches).await {
            match outcome {
                Ok(records) => {
                    fetched_any = true;
                    let segments: Vec<Segment> = records
                        .into_iter()
                        .filter_map(|r| {
                            Some(Segment {
                                start_time: datetime_from_epoch(r.start_time)?,
                                end_time: datetime_from_epoch(r.end_time)?,
                                id: r.id,
                            })
                        })
                        .collect();
                    self.store
                        .write()
                        .add(&camera_id, (query.start, query.end), segments);
                    let segments = self
                        .store
                        .read()
                        .segments_in_range(&camera_id, query.start, query.end);
                    results.insert(
                        key,
                        QueryResult {
                            instance_id,
                            cached: false,
                            expiry: None,
                            data: ResultData::Segments(segments),
                        },
                    );
                }
                Err(e) => {
                    warn!(camera = camera_id, error = %e, "Segments sub-query failed");
                    first_err.get_or_insert(e);
                }
            }
        }

        if fetched_any {
            // Reconcile the store when the runtime gets to it; never
            // blocks this caller, and the GC task collapses bursts.
            let _ = self.gc_tx.try_send(());
        }

        finish(results, first_err)
    }

    /// Seconds a cached result of `kind` stays fresh, or `None` for kinds
    /// without a fixed TTL (segments are GC-reconciled instead).
    pub fn query_result_max_age(&self, kind: QueryKind) -> Option<u64> {
        match kind {
            QueryKind::Event => Some(self.event_ttl.num_seconds() as u64),
            QueryKind::Recording => Some(self.recording_ttl.num_seconds() as u64),
            QueryKind::RecordingSegments => None,
        }
    }

    /// Compute the playable-stream seek offset for `target` within
    /// `media`, in seconds. Returns `None` when `target` falls outside the
    /// media's span or no segments exist for it.
    pub async fn get_media_seek_time(
        &self,
        media: &Media,
        target: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let end = media.end_time.unwrap_or(media.start_time);
        if target < media.start_time || target > end {
            return Ok(None);
        }

        let camera_ids: BTreeSet<String> = iter::once(media.camera_id.clone()).collect();
        let Some(query) =
            planner::plan_segments_query(&camera_ids, Some(media.start_time), Some(end))
        else {
            return Ok(None);
        };
        let Some(map) = self.execute_segments_query(&query).await? else {
            return Ok(None);
        };
        // Single camera, so at most one entry.
        let Some(result) = map.values().next() else {
            return Ok(None);
        };
        let Some(segments) = result.segments() else {
            return Ok(None);
        };
        Ok(seek::seek_offset(media.start_time, target, segments))
    }

    /// Toggle the favorite/retain flag of an event. An explicit
    /// `success: false` from the backend surfaces as a typed error.
    pub async fn set_event_retention(
        &self,
        camera_id: &str,
        event_id: &str,
        retain: bool,
    ) -> Result<()> {
        let cam = self
            .cameras
            .get(camera_id)
            .ok_or_else(|| QueryError::CameraNotFound { id: camera_id.to_string() })?;
        let request = RetainRequest {
            instance_id: cam.instance.clone(),
            event_id: event_id.to_string(),
            retain,
        };
        let response = self.backend.retain_event(&request).await?;
        if !response.success {
            return Err(QueryError::RetainFailed {
                event_id: request.event_id,
                message: response.message,
            });
        }
        info!(camera = camera_id, event = event_id, retain, "Event retention updated");
        Ok(())
    }

    /// Population snapshot for status output.
    pub fn status(&self) -> EngineStatus {
        let store = self.store.read();
        let mut cameras: Vec<CameraSegmentCount> = store
            .camera_ids()
            .into_iter()
            .map(|id| CameraSegmentCount {
                segments: store.camera_len(&id),
                camera_id: id,
            })
            .collect();
        cameras.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        EngineStatus {
            cached_requests: self.cache.read().len(),
            stored_segments: store.len(),
            cameras,
        }
    }

    /// Stop the GC task. Queries keep working afterwards; they just stop
    /// scheduling reconciliation passes. Idempotent.
    pub fn shutdown(&self) {
        self.gc_handle.abort();
        info!("Camera query engine stopped");
    }

    fn event_request(
        &self,
        instance_id: &str,
        camera_ids: &BTreeSet<String>,
        query: &EventQuery,
    ) -> EventSearchRequest {
        let cameras: Vec<String> = camera_ids
            .iter()
            .filter_map(|id| self.cameras.get(id)?.camera_name.clone())
            .collect();
        EventSearchRequest {
            instance_id: instance_id.to_string(),
            cameras,
            labels: query.labels.as_ref().map(|s| s.iter().cloned().collect()),
            zones: query.zones.as_ref().map(|s| s.iter().cloned().collect()),
            after: query.start.map(|t| t.timestamp()),
            before: query.end.map(|t| t.timestamp()),
            limit: query.limit.unwrap_or(DEFAULT_EVENT_LIMIT),
            has_clip: query.has_clip,
            has_snapshot: query.has_snapshot,
            favorites: query.favorite,
        }
    }

    /// Attribute raw backend events to local camera IDs.
    fn resolve_events(
        &self,
        instance_id: &str,
        scoped_ids: &BTreeSet<String>,
        raw: Vec<BackendEvent>,
    ) -> Vec<Event> {
        raw.into_iter()
            .filter_map(|e| {
                let camera_id = self.resolve_camera_id(instance_id, &e.camera, scoped_ids)?;
                let start_time = datetime_from_epoch(e.start_time)?;
                Some(Event {
                    id: e.id,
                    camera_id,
                    start_time,
                    end_time: e.end_time.and_then(datetime_from_epoch),
                    has_clip: e.has_clip,
                    has_snapshot: e.has_snapshot,
                    label: e.label,
                    zones: e.zones,
                    top_score: e.top_score,
                    retain_indefinitely: e.retain_indefinitely,
                })
            })
            .collect()
    }

    /// Match a backend camera name to a local camera ID.
    ///
    /// Fast path: a sub-query targeting exactly one camera owns every
    /// returned item, whatever name the backend reports. Otherwise a
    /// linear scan over configured cameras matches on the
    /// (instance, backend-name) pair; synthetic cameras never match.
    fn resolve_camera_id(
        &self,
        instance_id: &str,
        backend_camera: &str,
        scoped_ids: &BTreeSet<String>,
    ) -> Option<String> {
        if scoped_ids.len() == 1 {
            return scoped_ids.iter().next().cloned();
        }
        self.cameras
            .iter()
            .find(|(_, c)| {
                !c.synthetic
                    && c.instance == instance_id
                    && c.camera_name.as_deref() == Some(backend_camera)
            })
            .map(|(id, _)| id.clone())
    }
}

/// Merge outcome: empty map with an error propagates the error, empty map
/// without one is "nothing to return".
fn finish(results: QueryResultMap, first_err: Option<QueryError>) -> Result<Option<QueryResultMap>> {
    if results.is_empty() {
        return match first_err {
            Some(e) => Err(e),
            None => Ok(None),
        };
    }
    Ok(Some(results))
}

/// Synthesize hour-aligned recordings from a day/hour summary, keeping
/// hours that overlap the `[start, end)` window.
fn recordings_from_summary(
    camera_id: &str,
    days: &[RecordingSummaryDay],
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Vec<Recording> {
    let mut out = Vec::new();
    for day in days {
        for hour in &day.hours {
            let Some(naive) = day.day.and_hms_opt(hour.hour, 0, 0) else {
                continue;
            };
            let hour_start = naive.and_utc();
            let hour_end = hour_start + Duration::hours(1);
            if let Some(s) = start {
                if hour_end <= s {
                    continue;
                }
            }
            if let Some(e) = end {
                if hour_start >= e {
                    continue;
                }
            }
            out.push(Recording {
                camera_id: camera_id.to_string(),
                start_time: hour_start,
                end_time: hour_end,
                events: hour.events,
            });
        }
    }
    out
}
