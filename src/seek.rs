// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Seek-offset calculation over concatenated segment streams.
//!
//! A recording stream is played back as a concatenation of its segments,
//! so the player-visible offset of a wall-clock instant is the amount of
//! *covered* time before it — gaps between segments contribute nothing.

use chrono::{DateTime, Utc};

use crate::query::Segment;

/// Compute the playable-stream offset (in seconds) needed to seek to
/// `target`, given the segments that make up the stream.
///
/// `segments` must be sorted oldest-to-youngest; this is a single linear
/// pass and no sort is performed. Time before `earliest_allowed` never
/// counts toward the offset. Returns `None` for an empty segment list.
pub fn seek_offset(
    earliest_allowed: DateTime<Utc>,
    target: DateTime<Utc>,
    segments: &[Segment],
) -> Option<f64> {
    if segments.is_empty() {
        return None;
    }

    let mut covered_ms: i64 = 0;
    for seg in segments {
        if seg.start_time > target {
            break;
        }
        let from = seg.start_time.max(earliest_allowed);
        let to = seg.end_time.min(target);
        covered_ms += (to - from).num_milliseconds().max(0);
    }

    Some(covered_ms as f64 / 1000.0)
}
