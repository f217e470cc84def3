// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Recording-segment store — per-camera ordered collections of segments
//! plus the fetched-range windows that produced them.
//!
//! Segment data is reusable across overlapping-but-different query
//! windows, so the store tracks which windows have already been fetched
//! per camera: a query fully inside a covered window is served without a
//! backend call. Segments are immutable once inserted; the only mutation
//! is batch eviction by the garbage collector. The store must stay cheap
//! at 10K–1M entries, so eviction is a single `retain` pass, never
//! one-by-one removal.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::query::Segment;

/// Ordering key: (start_time, id). The id tiebreaks identical starts and
/// doubles as dedup across re-fetched windows.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct StoreKey {
    start_time: DateTime<Utc>,
    id: String,
}

#[derive(Default)]
struct CameraSegments {
    segments: BTreeMap<StoreKey, Segment>,
    /// Merged, non-overlapping windows already fetched for this camera.
    coverage: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

impl CameraSegments {
    fn add_coverage(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.coverage.push((start, end));
        self.coverage.sort();
        let mut merged: Vec<(DateTime<Utc>, DateTime<Utc>)> = Vec::with_capacity(self.coverage.len());
        for &(s, e) in &self.coverage {
            match merged.last_mut() {
                Some(last) if s <= last.1 => last.1 = last.1.max(e),
                _ => merged.push((s, e)),
            }
        }
        self.coverage = merged;
    }

    fn covers(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.coverage.iter().any(|&(s, e)| s <= start && end <= e)
    }
}

/// In-memory segment store for all cameras.
#[derive(Default)]
pub struct SegmentStore {
    cameras: HashMap<String, CameraSegments>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert fetched segments and record the window they were fetched
    /// for. Re-fetched segments (same start + id) are overwritten in place.
    pub fn add(
        &mut self,
        camera_id: &str,
        window: (DateTime<Utc>, DateTime<Utc>),
        segments: Vec<Segment>,
    ) {
        let cam = self.cameras.entry(camera_id.to_string()).or_default();
        for seg in segments {
            let key = StoreKey {
                start_time: seg.start_time,
                id: seg.id.clone(),
            };
            cam.segments.insert(key, seg);
        }
        cam.add_coverage(window.0, window.1);
    }

    /// Whether a previously fetched window fully covers `[start, end]` for
    /// this camera.
    pub fn has_coverage(&self, camera_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.cameras
            .get(camera_id)
            .map(|c| c.covers(start, end))
            .unwrap_or(false)
    }

    /// Segments for `camera_id` overlapping `[start, end]`, oldest first.
    pub fn segments_in_range(
        &self,
        camera_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Segment> {
        match self.cameras.get(camera_id) {
            Some(cam) => cam
                .segments
                .values()
                .filter(|s| s.start_time < end && s.end_time > start)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Cameras currently holding at least one segment.
    pub fn camera_ids(&self) -> Vec<String> {
        self.cameras
            .iter()
            .filter(|(_, c)| !c.segments.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Segment count for one camera.
    pub fn camera_len(&self, camera_id: &str) -> usize {
        self.cameras
            .get(camera_id)
            .map(|c| c.segments.len())
            .unwrap_or(0)
    }

    /// Total segment count across all cameras.
    pub fn len(&self) -> usize {
        self.cameras.values().map(|c| c.segments.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Batch-evict every segment for which `should_evict` returns true.
    /// One `retain` pass per camera; cameras that lost segments also lose
    /// their coverage windows, so the next query re-fetches rather than
    /// trusting a window whose contents were just reclaimed. Returns the
    /// number of evicted segments.
    pub fn evict<F>(&mut self, should_evict: F) -> usize
    where
        F: Fn(&str, &Segment) -> bool,
    {
        let mut evicted = 0;
        for (camera_id, cam) in self.cameras.iter_mut() {
            let before = cam.segments.len();
            cam.segments.retain(|_, seg| !should_evict(camera_id, seg));
            let removed = before - cam.segments.len();
            if removed > 0 {
                evicted += removed;
                cam.coverage.clear();
            }
        }
        self.cameras.retain(|_, c| !c.segments.is_empty() || !c.coverage.is_empty());
        evicted
    }
}
