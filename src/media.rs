//! Display-ready media objects.
//!
//! The UI layer renders media straight from these records without
//! re-querying: each carries the owning camera, a content locator and a
//! thumbnail locator, all relative to the originating backend instance.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::CameraConfig;
use crate::query::{Event, Recording};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Clip,
    Snapshot,
    Recording,
}

/// A renderable media item derived from an event or a recording.
#[derive(Debug, Clone, Serialize)]
pub struct Media {
    pub kind: MediaKind,
    pub id: String,
    pub camera_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Instance-relative locator for the playable/displayable content.
    pub content_path: String,
    /// Instance-relative locator for a preview image, when one exists.
    pub thumbnail_path: Option<String>,
}

impl Media {
    /// Build media from an event, preferring the clip and falling back to
    /// the snapshot. Returns `None` for events with neither.
    pub fn from_event(event: &Event) -> Option<Self> {
        let kind = if event.has_clip {
            MediaKind::Clip
        } else if event.has_snapshot {
            MediaKind::Snapshot
        } else {
            return None;
        };
        let content_path = match kind {
            MediaKind::Clip => format!("/api/events/{}/clip.mp4", event.id),
            _ => format!("/api/events/{}/snapshot.jpg", event.id),
        };
        Some(Media {
            kind,
            id: event.id.clone(),
            camera_id: event.camera_id.clone(),
            start_time: event.start_time,
            end_time: event.end_time,
            content_path,
            thumbnail_path: Some(format!("/api/events/{}/thumbnail.jpg", event.id)),
        })
    }

    /// Build media for one recorded hour. The VOD locator addresses the
    /// backend camera name, not the local camera ID.
    pub fn from_recording(recording: &Recording, camera: &CameraConfig) -> Self {
        let name = camera.camera_name.as_deref().unwrap_or(&camera.id);
        Media {
            kind: MediaKind::Recording,
            id: format!(
                "{}/{}",
                recording.camera_id,
                recording.start_time.timestamp()
            ),
            camera_id: recording.camera_id.clone(),
            start_time: recording.start_time,
            end_time: Some(recording.end_time),
            content_path: format!(
                "/vod/{}/start/{}/end/{}/index.m3u8",
                name,
                recording.start_time.timestamp(),
                recording.end_time.timestamp()
            ),
            thumbnail_path: None,
        }
    }
}
