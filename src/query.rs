// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Query and result data model.
//!
//! Queries are tagged unions over the three media kinds. All query types
//! derive `Eq + Hash` over their normalized fields (set-valued fields are
//! `BTreeSet`, so hashing is order-independent), which makes them directly
//! usable as cache and result-map keys — no object-identity tricks.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discriminator for the three query kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Event,
    Recording,
    RecordingSegments,
}

/// A logical media query, used both as executor input and as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Query {
    Event(EventQuery),
    Recording(RecordingQuery),
    RecordingSegments(RecordingSegmentsQuery),
}

impl Query {
    pub fn kind(&self) -> QueryKind {
        match self {
            Query::Event(_) => QueryKind::Event,
            Query::Recording(_) => QueryKind::Recording,
            Query::RecordingSegments(_) => QueryKind::RecordingSegments,
        }
    }

    pub fn camera_ids(&self) -> &BTreeSet<String> {
        match self {
            Query::Event(q) => &q.camera_ids,
            Query::Recording(q) => &q.camera_ids,
            Query::RecordingSegments(q) => &q.camera_ids,
        }
    }
}

/// Event search query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventQuery {
    pub camera_ids: BTreeSet<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub labels: Option<BTreeSet<String>>,
    pub zones: Option<BTreeSet<String>>,
    pub favorite: Option<bool>,
    pub has_clip: Option<bool>,
    pub has_snapshot: Option<bool>,
}

/// Recording query. Recordings are hour-aligned units synthesized from the
/// backend's day/hour summary, so no kind-specific filters exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordingQuery {
    pub camera_ids: BTreeSet<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

/// Recording-segments query. Both time bounds are required; the planner
/// refuses to produce one without them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordingSegmentsQuery {
    pub camera_ids: BTreeSet<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// An event as exposed to the UI layer: backend record resolved to a local
/// camera ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    /// Local camera ID the event was attributed to.
    pub camera_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub has_clip: bool,
    pub has_snapshot: bool,
    pub label: String,
    pub zones: Vec<String>,
    pub top_score: Option<f64>,
    /// Favorite/retain flag; mutated only via the backend retain call.
    pub retain_indefinitely: bool,
}

/// One hour of recorded video, synthesized locally from the backend's
/// day/hour summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub camera_id: String,
    /// Hour-aligned start.
    pub start_time: DateTime<Utc>,
    /// Start of the following hour.
    pub end_time: DateTime<Utc>,
    /// Events counted by the backend for this hour.
    pub events: u32,
}

/// A contiguous span of recorded video within an hour; the finest-grained
/// unit cached and the unit of garbage collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Result payload, mirroring the query kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", content = "items")]
pub enum ResultData {
    Events(Vec<Event>),
    Recordings(Vec<Recording>),
    Segments(Vec<Segment>),
}

/// Result of one (sub-)query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Backend instance the data originated from.
    pub instance_id: String,
    /// Whether this result was served from the request cache or the
    /// segment store rather than a fresh backend fetch.
    pub cached: bool,
    /// Instant after which the result is stale; `None` for segment data,
    /// whose freshness is maintained by garbage collection instead.
    pub expiry: Option<DateTime<Utc>>,
    pub data: ResultData,
}

impl QueryResult {
    pub fn events(&self) -> Option<&[Event]> {
        match &self.data {
            ResultData::Events(e) => Some(e),
            _ => None,
        }
    }

    pub fn recordings(&self) -> Option<&[Recording]> {
        match &self.data {
            ResultData::Recordings(r) => Some(r),
            _ => None,
        }
    }

    pub fn segments(&self) -> Option<&[Segment]> {
        match &self.data {
            ResultData::Segments(s) => Some(s),
            _ => None,
        }
    }
}

/// Fan-in output: one entry per sub-query that produced a result.
pub type QueryResultMap = HashMap<Query, QueryResult>;
