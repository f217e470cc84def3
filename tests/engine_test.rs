//! Engine integration tests: planner + executor + cache + store + GC
//! against a scripted fake backend.
//!
//! Run with: `cargo test`

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Timelike, Utc};
use parking_lot::Mutex;

use camquery::backend::{
    Backend, BackendEvent, EventSearchRequest, RecordingSegmentsRequest, RecordingSummaryDay,
    RecordingSummaryHour, RecordingSummaryRequest, RetainRequest, RetainResponse, SegmentRecord,
};
use camquery::config::{CameraConfig, CameraMap, EngineConfig};
use camquery::engine::executor::CameraQueryEngine;
use camquery::engine::planner;
use camquery::error::QueryError;
use camquery::media::{Media, MediaKind};
use camquery::query::{EventQuery, Query, RecordingQuery, RecordingSegmentsQuery};

// ──────────────── fixtures ────────────────────────────────────────────────

#[derive(Default)]
struct FakeBackend {
    /// Returned verbatim for every event search.
    events: Vec<BackendEvent>,
    /// Recording summary per backend camera name; mutable so tests can
    /// change the GC's ground truth mid-flight.
    summaries: Mutex<HashMap<String, Vec<RecordingSummaryDay>>>,
    /// Segment records per backend camera name.
    segments: HashMap<String, Vec<SegmentRecord>>,
    retain_success: bool,
    event_calls: AtomicUsize,
    summary_calls: AtomicUsize,
    segment_calls: AtomicUsize,
}

#[async_trait]
impl Backend for FakeBackend {
    async fn events(
        &self,
        _request: &EventSearchRequest,
    ) -> camquery::error::Result<Vec<BackendEvent>> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.events.clone())
    }

    async fn recording_summary(
        &self,
        request: &RecordingSummaryRequest,
    ) -> camquery::error::Result<Vec<RecordingSummaryDay>> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .summaries
            .lock()
            .get(&request.camera)
            .cloned()
            .unwrap_or_default())
    }

    async fn recording_segments(
        &self,
        request: &RecordingSegmentsRequest,
    ) -> camquery::error::Result<Vec<SegmentRecord>> {
        self.segment_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .segments
            .get(&request.camera)
            .cloned()
            .unwrap_or_default())
    }

    async fn retain_event(
        &self,
        _request: &RetainRequest,
    ) -> camquery::error::Result<RetainResponse> {
        Ok(RetainResponse {
            success: self.retain_success,
            message: if self.retain_success {
                String::new()
            } else {
                "event not found".to_string()
            },
        })
    }
}

fn camera(id: &str, instance: &str, name: &str) -> CameraConfig {
    CameraConfig {
        id: id.to_string(),
        instance: instance.to_string(),
        camera_name: Some(name.to_string()),
        label: None,
        zone: None,
        synthetic: false,
    }
}

fn camera_map(cameras: Vec<CameraConfig>) -> CameraMap {
    cameras.into_iter().map(|c| (c.id.clone(), c)).collect()
}

fn ids(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn backend_event(id: &str, camera: &str, start_secs: i64) -> BackendEvent {
    BackendEvent {
        id: id.to_string(),
        camera: camera.to_string(),
        label: "person".to_string(),
        start_time: start_secs as f64,
        end_time: Some(start_secs as f64 + 10.0),
        has_clip: true,
        has_snapshot: true,
        zones: vec![],
        top_score: Some(0.9),
        retain_indefinitely: false,
    }
}

fn summary_day(day: &str, hours: &[(u32, u32)]) -> RecordingSummaryDay {
    RecordingSummaryDay {
        day: day.parse::<NaiveDate>().expect("valid date"),
        events: hours.iter().map(|(_, e)| e).sum(),
        hours: hours
            .iter()
            .map(|&(hour, events)| RecordingSummaryHour { hour, events, duration: 3600 })
            .collect(),
    }
}

fn engine_with(backend: FakeBackend, cameras: Vec<CameraConfig>) -> CameraQueryEngine {
    let cfg = EngineConfig {
        gc_interval_secs: 1,
        ..Default::default()
    };
    CameraQueryEngine::new(Arc::new(backend), camera_map(cameras), &cfg)
}

// ──────────────── events ──────────────────────────────────────────────────

#[tokio::test]
async fn test_event_query_batched_per_instance() {
    let backend = FakeBackend {
        events: vec![
            backend_event("ev1", "front_door", 1_700_000_000),
            backend_event("ev2", "garage", 1_700_000_100),
        ],
        ..Default::default()
    };
    let engine = engine_with(
        backend,
        vec![
            camera("cam1", "inst1", "front_door"),
            camera("cam2", "inst1", "garage"),
        ],
    );

    let query = EventQuery {
        camera_ids: ids(&["cam1", "cam2"]),
        ..Default::default()
    };
    let map = engine
        .execute_event_query(&query)
        .await
        .expect("query")
        .expect("results");

    // Both cameras share one instance: exactly one sub-query, with each
    // event resolved to its own camera by backend name.
    assert_eq!(map.len(), 1);
    let result = map.values().next().unwrap();
    assert!(!result.cached);
    let events = result.events().unwrap();
    assert_eq!(events.len(), 2);
    let by_id: HashMap<&str, &str> = events
        .iter()
        .map(|e| (e.id.as_str(), e.camera_id.as_str()))
        .collect();
    assert_eq!(by_id["ev1"], "cam1");
    assert_eq!(by_id["ev2"], "cam2");
}

#[tokio::test]
async fn test_event_query_cached_within_ttl() {
    let backend = FakeBackend {
        events: vec![backend_event("ev1", "front_door", 1_700_000_000)],
        ..Default::default()
    };
    let engine = engine_with(backend, vec![camera("cam1", "inst1", "front_door")]);

    let query = EventQuery {
        camera_ids: ids(&["cam1"]),
        ..Default::default()
    };

    let first = engine
        .execute_event_query(&query)
        .await
        .expect("query")
        .expect("results");
    assert!(!first.values().next().unwrap().cached);

    // Second execution within the 60 s TTL comes from the cache.
    let second = engine
        .execute_event_query(&query)
        .await
        .expect("query")
        .expect("results");
    let result = second.values().next().unwrap();
    assert!(result.cached);
    assert!(result.expiry.is_some());
    assert_eq!(result.events().unwrap().len(), 1);
}

#[tokio::test]
async fn test_round_trip_outer_query_keys_result_map() {
    let backend = FakeBackend {
        events: vec![backend_event("ev1", "front_door", 1_700_000_000)],
        ..Default::default()
    };
    let engine = engine_with(backend, vec![camera("cam1", "inst1", "front_door")]);

    let planned = planner::plan_event_queries(
        engine.cameras(),
        &ids(&["cam1"]),
        &EventQuery::default(),
    )
    .expect("planned");
    assert_eq!(planned.len(), 1);
    let query = &planned[0];

    engine.execute_event_query(query).await.expect("first").expect("results");
    let map = engine
        .execute_event_query(query)
        .await
        .expect("second")
        .expect("results");

    // A structurally identical query retrieves the cached entry, and the
    // cached entry is keyed by the original query.
    let key = Query::Event(query.clone());
    let result = map.get(&key).expect("keyed by outer query");
    assert!(result.cached);
}

#[tokio::test]
async fn test_single_camera_fast_path_owns_mismatched_names() {
    // The backend reports a camera name that matches nothing; a
    // single-camera sub-query still claims the item. Permissive by
    // contract, not a bug.
    let backend = FakeBackend {
        events: vec![backend_event("ev1", "some_other_name", 1_700_000_000)],
        ..Default::default()
    };
    let engine = engine_with(backend, vec![camera("cam1", "inst1", "front_door")]);

    let query = EventQuery {
        camera_ids: ids(&["cam1"]),
        ..Default::default()
    };
    let map = engine
        .execute_event_query(&query)
        .await
        .expect("query")
        .expect("results");
    let events = map.values().next().unwrap().events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].camera_id, "cam1");
}

#[tokio::test]
async fn test_synthetic_camera_never_matches() {
    let mut birdseye = camera("overview", "inst1", "garage");
    birdseye.synthetic = true;

    let backend = FakeBackend {
        events: vec![backend_event("ev1", "garage", 1_700_000_000)],
        ..Default::default()
    };
    let engine = engine_with(
        backend,
        vec![
            camera("cam1", "inst1", "front_door"),
            camera("cam2", "inst1", "garage"),
            birdseye,
        ],
    );

    // Multi-camera sub-query forces the linear scan; the synthetic camera
    // also claims the name "garage" but must lose to cam2.
    let query = EventQuery {
        camera_ids: ids(&["cam1", "cam2"]),
        ..Default::default()
    };
    let map = engine
        .execute_event_query(&query)
        .await
        .expect("query")
        .expect("results");
    let events = map.values().next().unwrap().events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].camera_id, "cam2");
}

#[tokio::test]
async fn test_empty_camera_set_short_circuits() {
    let engine = engine_with(FakeBackend::default(), vec![camera("cam1", "inst1", "front_door")]);
    let query = EventQuery::default();
    assert!(engine.execute_event_query(&query).await.expect("query").is_none());
}

// ──────────────── recordings ──────────────────────────────────────────────

#[tokio::test]
async fn test_recording_hour_derivation() {
    let mut summaries = HashMap::new();
    summaries.insert(
        "front_door".to_string(),
        vec![summary_day("2024-01-05", &[(3, 2)])],
    );
    let backend = FakeBackend {
        summaries: Mutex::new(summaries),
        ..Default::default()
    };
    let engine = engine_with(backend, vec![camera("cam1", "inst1", "front_door")]);

    let query = RecordingQuery {
        camera_ids: ids(&["cam1"]),
        start: Some(Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap()),
        end: Some(Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap()),
        ..Default::default()
    };
    let map = engine
        .execute_recording_query(&query)
        .await
        .expect("query")
        .expect("results");

    let recordings = map.values().next().unwrap().recordings().unwrap();
    assert_eq!(recordings.len(), 1);
    let rec = &recordings[0];
    assert_eq!(rec.camera_id, "cam1");
    assert_eq!(rec.start_time, Utc.with_ymd_and_hms(2024, 1, 5, 3, 0, 0).unwrap());
    assert_eq!(rec.end_time, Utc.with_ymd_and_hms(2024, 1, 5, 4, 0, 0).unwrap());
    assert_eq!(rec.events, 2);
}

#[tokio::test]
async fn test_recording_limit_keeps_most_recent() {
    let mut summaries = HashMap::new();
    summaries.insert(
        "front_door".to_string(),
        vec![summary_day("2024-01-05", &[(1, 1), (4, 1), (9, 1), (13, 1), (20, 1)])],
    );
    let backend = FakeBackend {
        summaries: Mutex::new(summaries),
        ..Default::default()
    };
    let engine = engine_with(backend, vec![camera("cam1", "inst1", "front_door")]);

    let query = RecordingQuery {
        camera_ids: ids(&["cam1"]),
        limit: Some(2),
        ..Default::default()
    };
    let map = engine
        .execute_recording_query(&query)
        .await
        .expect("query")
        .expect("results");

    let recordings = map.values().next().unwrap().recordings().unwrap();
    assert_eq!(recordings.len(), 2);
    // Sorted by start descending: hours 20 and 13 survive.
    assert_eq!(recordings[0].start_time, Utc.with_ymd_and_hms(2024, 1, 5, 20, 0, 0).unwrap());
    assert_eq!(recordings[1].start_time, Utc.with_ymd_and_hms(2024, 1, 5, 13, 0, 0).unwrap());
}

#[tokio::test]
async fn test_recording_window_excludes_other_hours() {
    let mut summaries = HashMap::new();
    summaries.insert(
        "front_door".to_string(),
        vec![summary_day("2024-01-05", &[(3, 2), (7, 1)])],
    );
    let backend = FakeBackend {
        summaries: Mutex::new(summaries),
        ..Default::default()
    };
    let engine = engine_with(backend, vec![camera("cam1", "inst1", "front_door")]);

    // Window covers only hour 3.
    let query = RecordingQuery {
        camera_ids: ids(&["cam1"]),
        start: Some(Utc.with_ymd_and_hms(2024, 1, 5, 3, 0, 0).unwrap()),
        end: Some(Utc.with_ymd_and_hms(2024, 1, 5, 4, 0, 0).unwrap()),
        ..Default::default()
    };
    let map = engine
        .execute_recording_query(&query)
        .await
        .expect("query")
        .expect("results");
    let recordings = map.values().next().unwrap().recordings().unwrap();
    assert_eq!(recordings.len(), 1);
    assert_eq!(recordings[0].start_time.hour(), 3);
}

// ──────────────── segments ────────────────────────────────────────────────

fn segment_records(base_secs: i64, spans: &[(i64, i64)]) -> Vec<SegmentRecord> {
    spans
        .iter()
        .enumerate()
        .map(|(i, &(from, to))| SegmentRecord {
            start_time: (base_secs + from) as f64,
            end_time: (base_secs + to) as f64,
            id: format!("seg{i}"),
        })
        .collect()
}

#[tokio::test]
async fn test_segments_store_coverage_avoids_refetch() {
    let base = Utc.with_ymd_and_hms(2024, 1, 5, 3, 0, 0).unwrap();
    let mut segments = HashMap::new();
    segments.insert(
        "front_door".to_string(),
        segment_records(base.timestamp(), &[(0, 10), (20, 30)]),
    );
    let mut summaries = HashMap::new();
    summaries.insert(
        "front_door".to_string(),
        vec![summary_day("2024-01-05", &[(3, 1)])],
    );
    let backend = FakeBackend {
        segments,
        summaries: Mutex::new(summaries),
        ..Default::default()
    };
    let engine = engine_with(backend, vec![camera("cam1", "inst1", "front_door")]);

    let query = RecordingSegmentsQuery {
        camera_ids: ids(&["cam1"]),
        start: base,
        end: base + chrono::Duration::hours(1),
    };

    let first = engine
        .execute_segments_query(&query)
        .await
        .expect("query")
        .expect("results");
    let result = first.values().next().unwrap();
    assert!(!result.cached);
    assert_eq!(result.segments().unwrap().len(), 2);

    // Identical window: served from the store, no second fetch.
    let second = engine
        .execute_segments_query(&query)
        .await
        .expect("query")
        .expect("results");
    assert!(second.values().next().unwrap().cached);

    // Narrower window inside the covered range: also no fetch, and only
    // the overlapping segment comes back.
    let narrow = RecordingSegmentsQuery {
        camera_ids: ids(&["cam1"]),
        start: base,
        end: base + chrono::Duration::seconds(15),
    };
    let third = engine
        .execute_segments_query(&narrow)
        .await
        .expect("query")
        .expect("results");
    let result = third.values().next().unwrap();
    assert!(result.cached);
    assert_eq!(result.segments().unwrap().len(), 1);
}

#[tokio::test]
async fn test_gc_evicts_hours_missing_from_summary() {
    // Segments span hours 3 and 4, but the summary only knows hour 3.
    let base = Utc.with_ymd_and_hms(2024, 1, 5, 3, 0, 0).unwrap();
    let mut segments = HashMap::new();
    segments.insert(
        "front_door".to_string(),
        segment_records(base.timestamp(), &[(0, 10), (3600, 3610)]),
    );
    let mut summaries = HashMap::new();
    summaries.insert(
        "front_door".to_string(),
        vec![summary_day("2024-01-05", &[(3, 1)])],
    );
    let backend = FakeBackend {
        segments,
        summaries: Mutex::new(summaries),
        ..Default::default()
    };
    let engine = engine_with(backend, vec![camera("cam1", "inst1", "front_door")]);

    let query = RecordingSegmentsQuery {
        camera_ids: ids(&["cam1"]),
        start: base,
        end: base + chrono::Duration::hours(2),
    };
    engine.execute_segments_query(&query).await.expect("query").expect("results");
    assert_eq!(engine.status().stored_segments, 2);

    // The fetch scheduled a GC pass; wait for it to reconcile.
    let mut remaining = engine.status().stored_segments;
    for _ in 0..50 {
        remaining = engine.status().stored_segments;
        if remaining == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(remaining, 1, "hour-4 segment should be evicted");
}

// ──────────────── retain / max-age / seek ─────────────────────────────────

#[tokio::test]
async fn test_retain_failure_is_typed_error() {
    let backend = FakeBackend {
        retain_success: false,
        ..Default::default()
    };
    let engine = engine_with(backend, vec![camera("cam1", "inst1", "front_door")]);

    let err = engine
        .set_event_retention("cam1", "ev1", true)
        .await
        .expect_err("should fail");
    match err {
        QueryError::RetainFailed { event_id, message } => {
            assert_eq!(event_id, "ev1");
            assert_eq!(message, "event not found");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_query_result_max_age() {
    use camquery::query::QueryKind;
    let engine = engine_with(FakeBackend::default(), vec![camera("cam1", "inst1", "front_door")]);
    assert_eq!(engine.query_result_max_age(QueryKind::Event), Some(60));
    assert_eq!(engine.query_result_max_age(QueryKind::Recording), Some(60));
    assert_eq!(engine.query_result_max_age(QueryKind::RecordingSegments), None);
}

#[tokio::test]
async fn test_media_seek_time_over_fetched_segments() {
    let base = Utc.with_ymd_and_hms(2024, 1, 5, 3, 0, 0).unwrap();
    let mut segments = HashMap::new();
    segments.insert(
        "front_door".to_string(),
        segment_records(base.timestamp(), &[(0, 10), (20, 30)]),
    );
    let backend = FakeBackend {
        segments,
        ..Default::default()
    };
    let engine = engine_with(backend, vec![camera("cam1", "inst1", "front_door")]);

    let media = Media {
        kind: MediaKind::Recording,
        id: "cam1/rec".to_string(),
        camera_id: "cam1".to_string(),
        start_time: base,
        end_time: Some(base + chrono::Duration::hours(1)),
        content_path: String::new(),
        thumbnail_path: None,
    };

    let offset = engine
        .get_media_seek_time(&media, base + chrono::Duration::seconds(25))
        .await
        .expect("seek");
    assert_eq!(offset, Some(15.0));

    // Target outside the media span: no offset.
    let outside = engine
        .get_media_seek_time(&media, base - chrono::Duration::seconds(1))
        .await
        .expect("seek");
    assert_eq!(outside, None);
}

#[tokio::test]
async fn test_shutdown_leaves_queries_usable() {
    let base = Utc.with_ymd_and_hms(2024, 1, 5, 3, 0, 0).unwrap();
    let mut segments = HashMap::new();
    segments.insert(
        "front_door".to_string(),
        segment_records(base.timestamp(), &[(0, 10), (20, 30)]),
    );
    let backend = FakeBackend {
        segments,
        ..Default::default()
    };
    let engine = engine_with(backend, vec![camera("cam1", "inst1", "front_door")]);

    engine.shutdown();

    // The GC task is gone but queries still execute and populate the
    // store; the dropped GC trigger is not an error.
    let query = Query::RecordingSegments(RecordingSegmentsQuery {
        camera_ids: ids(&["cam1"]),
        start: base,
        end: base + chrono::Duration::hours(1),
    });
    let map = engine.execute(&query).await.expect("query").expect("results");
    assert_eq!(map.values().next().unwrap().segments().unwrap().len(), 2);
    assert_eq!(engine.status().stored_segments, 2);

    // Calling it again is harmless.
    engine.shutdown();
}
