//! Query planner — turns a camera set plus a partial query into zero or
//! more concrete queries.
//!
//! Malformed partials (missing required bounds, empty camera sets) plan
//! to `None`, never an error: "no query possible" is a normal outcome and
//! callers short-circuit on it.

use std::collections::BTreeSet;
use std::iter;

use crate::config::CameraMap;
use crate::query::{EventQuery, RecordingQuery, RecordingSegmentsQuery};

/// Plan event queries for `camera_ids`.
///
/// Cameras without a label/zone override are grouped into a single
/// batched query. Each camera carrying an override gets its own query,
/// seeded with the camera's label/zone unless the caller already supplied
/// a filter — caller values override camera defaults.
pub fn plan_event_queries(
    cameras: &CameraMap,
    camera_ids: &BTreeSet<String>,
    base: &EventQuery,
) -> Option<Vec<EventQuery>> {
    let mut batched: BTreeSet<String> = BTreeSet::new();
    let mut filtered: Vec<&str> = Vec::new();

    for id in camera_ids {
        match cameras.get(id) {
            Some(cam) if cam.has_event_filter() => filtered.push(id),
            Some(_) => {
                batched.insert(id.clone());
            }
            // Unknown cameras cannot be queried.
            None => {}
        }
    }

    let mut queries = Vec::with_capacity(filtered.len() + 1);

    if !batched.is_empty() {
        queries.push(EventQuery {
            camera_ids: batched,
            ..base.clone()
        });
    }

    for id in filtered {
        let cam = &cameras[id];
        let labels = base
            .labels
            .clone()
            .or_else(|| cam.label.clone().map(|l| iter::once(l).collect()));
        let zones = base
            .zones
            .clone()
            .or_else(|| cam.zone.clone().map(|z| iter::once(z).collect()));
        queries.push(EventQuery {
            camera_ids: iter::once(id.to_string()).collect(),
            labels,
            zones,
            ..base.clone()
        });
    }

    if queries.is_empty() {
        None
    } else {
        Some(queries)
    }
}

/// Plan a recording query: always a single query over all requested
/// cameras. The per-camera fan-out happens in the executor, not here.
pub fn plan_recording_query(
    camera_ids: &BTreeSet<String>,
    base: &RecordingQuery,
) -> Option<RecordingQuery> {
    if camera_ids.is_empty() {
        return None;
    }
    Some(RecordingQuery {
        camera_ids: camera_ids.clone(),
        ..base.clone()
    })
}

/// Plan a recording-segments query. Both time bounds are required.
pub fn plan_segments_query(
    camera_ids: &BTreeSet<String>,
    start: Option<chrono::DateTime<chrono::Utc>>,
    end: Option<chrono::DateTime<chrono::Utc>>,
) -> Option<RecordingSegmentsQuery> {
    if camera_ids.is_empty() {
        return None;
    }
    Some(RecordingSegmentsQuery {
        camera_ids: camera_ids.clone(),
        start: start?,
        end: end?,
    })
}
