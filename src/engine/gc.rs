// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Segment garbage collection — a throttled background task that
//! reconciles the segment store against the backend's recording summary.
//!
//! ```text
//! segment fetch ──┐
//! segment fetch ──┤    mpsc     ┌──────────────┐   summary per camera
//! segment fetch ──┼──→ trigger ─→   GC task    │──→ backend
//! ...             ┘             └──────┬───────┘
//!                                      ▼
//!                          SegmentStore batch eviction
//! ```
//!
//! Triggers are cheap `try_send`s from the executor. The task enforces
//! trailing-edge throttling: after a pass it sleeps out the remainder of
//! the interval before honoring the next trigger, and drains queued
//! triggers so bursts collapse into one deferred pass. At most one pass
//! runs per interval regardless of trigger volume.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{Backend, RecordingSummaryRequest};
use crate::config::CameraMap;
use crate::engine::store::SegmentStore;

/// Bucketing key for "known good" recorded hours.
///
/// Deliberately day-of-month only, not a full date: hours from the same
/// day-of-month in different months collide. Acceptable while segment
/// retention is short relative to a month; widen to a full date here if
/// that ever changes.
pub type HourKey = (String, u32, u32);

/// Compute the `(camera, day-of-month, hour)` bucket for an instant.
pub fn hour_key(camera_id: &str, t: DateTime<Utc>) -> HourKey {
    (camera_id.to_string(), t.day(), t.hour())
}

/// Create the trigger channel and spawn the GC task.
///
/// Returns:
///   - `mpsc::Sender<()>` — trigger handle for the executor; `try_send`
///     so callers are never blocked.
///   - `JoinHandle` for the GC task.
pub fn spawn_gc(
    backend: Arc<dyn Backend>,
    cameras: Arc<CameraMap>,
    store: Arc<RwLock<SegmentStore>>,
    interval: Duration,
    timezone: String,
) -> (mpsc::Sender<()>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<()>(8);
    let handle = tokio::spawn(async move {
        gc_loop(backend, cameras, store, interval, timezone, rx).await;
    });
    (tx, handle)
}

async fn gc_loop(
    backend: Arc<dyn Backend>,
    cameras: Arc<CameraMap>,
    store: Arc<RwLock<SegmentStore>>,
    interval: Duration,
    timezone: String,
    mut rx: mpsc::Receiver<()>,
) {
    let mut last_run: Option<tokio::time::Instant> = None;

    while rx.recv().await.is_some() {
        if let Some(prev) = last_run {
            // Trailing edge: wait out the remainder of the interval.
            tokio::time::sleep_until(prev + interval).await;
        }
        // Triggers that piled up while waiting are served by this pass.
        while rx.try_recv().is_ok() {}

        run_pass(&*backend, &cameras, &store, &timezone).await;
        last_run = Some(tokio::time::Instant::now());
    }

    debug!("Segment GC task shutting down (channel closed)");
}

/// One reconciliation pass.
///
/// Fetches the recording summary for every camera currently holding
/// segments, builds the good-hour set, then evicts every segment whose
/// hour bucket is absent — a single O(n) scan plus one batch delete.
/// After a pass the store holds only segments belonging to a known-good
/// recording hour.
async fn run_pass(
    backend: &dyn Backend,
    cameras: &CameraMap,
    store: &RwLock<SegmentStore>,
    timezone: &str,
) {
    let camera_ids = store.read().camera_ids();
    if camera_ids.is_empty() {
        return;
    }

    let mut good_hours: HashSet<HourKey> = HashSet::new();
    // Cameras whose ground truth could not be fetched keep their segments.
    let mut unknown: HashSet<String> = HashSet::new();

    for camera_id in &camera_ids {
        let Some(cam) = cameras.get(camera_id) else {
            unknown.insert(camera_id.clone());
            continue;
        };
        let Some(name) = cam.camera_name.as_deref() else {
            unknown.insert(camera_id.clone());
            continue;
        };

        let request = RecordingSummaryRequest {
            instance_id: cam.instance.clone(),
            camera: name.to_string(),
            timezone: timezone.to_string(),
        };
        match backend.recording_summary(&request).await {
            Ok(days) => {
                for day in &days {
                    for hour in &day.hours {
                        good_hours.insert((camera_id.clone(), day.day.day(), hour.hour));
                    }
                }
            }
            Err(e) => {
                warn!(
                    camera = camera_id,
                    error = %e,
                    "Recording summary fetch failed, keeping camera's segments"
                );
                unknown.insert(camera_id.clone());
            }
        }
    }

    let evicted = store.write().evict(|camera_id, seg| {
        !unknown.contains(camera_id)
            && !good_hours.contains(&hour_key(camera_id, seg.start_time))
    });

    if evicted > 0 {
        info!(
            evicted,
            remaining = store.read().len(),
            cameras = camera_ids.len(),
            "Segment GC pass complete"
        );
    } else {
        debug!(cameras = camera_ids.len(), "Segment GC pass found nothing to evict");
    }
}
