use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::error::{QueryError, Result};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Backend instances the engine can talk to.
    pub instances: Vec<InstanceConfig>,
    /// Cameras exposed to the dashboard.
    pub cameras: Vec<CameraConfig>,
    /// Engine tuning (optional).
    #[serde(default)]
    pub engine: EngineConfig,
    /// HTTP API configuration (optional).
    #[serde(default)]
    pub api: ApiConfig,
}

/// One addressable deployment of the surveillance backend.
#[derive(Debug, Deserialize, Clone)]
pub struct InstanceConfig {
    /// Instance identifier referenced by cameras.
    pub id: String,
    /// Base URL of the backend's HTTP endpoint.
    pub url: String,
}

/// HTTP API configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Whether to enable the HTTP API.
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    /// Port to listen on.
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { enabled: default_api_enabled(), port: default_api_port() }
    }
}

fn default_api_enabled() -> bool { true }
fn default_api_port() -> u16 { 8080 }

/// Engine tuning knobs. Defaults match the dashboard card's behavior.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// TTL for cached event query results, in seconds.
    #[serde(default = "default_event_ttl")]
    pub event_ttl_secs: u64,
    /// TTL for cached recording query results, in seconds.
    #[serde(default = "default_recording_ttl")]
    pub recording_ttl_secs: u64,
    /// Minimum interval between segment garbage-collection passes, in seconds.
    #[serde(default = "default_gc_interval")]
    pub gc_interval_secs: u64,
    /// IANA timezone name sent with recording summary requests.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_ttl_secs: default_event_ttl(),
            recording_ttl_secs: default_recording_ttl(),
            gc_interval_secs: default_gc_interval(),
            timezone: default_timezone(),
        }
    }
}

fn default_event_ttl() -> u64 { 60 }
fn default_recording_ttl() -> u64 { 60 }
fn default_gc_interval() -> u64 { 3600 }
fn default_timezone() -> String { "UTC".to_string() }

/// Per-camera configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Card-level identifier, unique across the config.
    pub id: String,
    /// Backend instance this camera lives on.
    pub instance: String,
    /// The backend's own name for this camera.
    pub camera_name: Option<String>,
    /// Label filter applied to every event query for this camera.
    #[serde(default)]
    pub label: Option<String>,
    /// Zone filter applied to every event query for this camera.
    #[serde(default)]
    pub zone: Option<String>,
    /// Synthetic/aggregate camera (e.g. birdseye). Never matched to
    /// backend items and never queried for segments.
    #[serde(default)]
    pub synthetic: bool,
}

impl CameraConfig {
    /// Whether this camera has a camera-specific event filter.
    pub fn has_event_filter(&self) -> bool {
        self.label.is_some() || self.zone.is_some()
    }
}

/// Camera lookup map handed to the planner and executor.
pub type CameraMap = HashMap<String, CameraConfig>;

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| QueryError::Config(format!("Cannot read config file: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| QueryError::Config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Build the camera lookup map keyed by camera ID.
    pub fn camera_map(&self) -> CameraMap {
        self.cameras
            .iter()
            .map(|c| (c.id.clone(), c.clone()))
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.cameras.is_empty() {
            return Err(QueryError::Config("No cameras defined".into()));
        }
        if self.instances.is_empty() {
            return Err(QueryError::Config("No backend instances defined".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for cam in &self.cameras {
            if !seen.insert(&cam.id) {
                return Err(QueryError::Config(format!(
                    "Duplicate camera id '{}'", cam.id
                )));
            }
            if !self.instances.iter().any(|i| i.id == cam.instance) {
                return Err(QueryError::Config(format!(
                    "Camera '{}' references unknown instance '{}'",
                    cam.id, cam.instance
                )));
            }
        }
        if self.engine.event_ttl_secs == 0 || self.engine.recording_ttl_secs == 0 {
            return Err(QueryError::Config("TTLs must be > 0".into()));
        }
        if self.engine.gc_interval_secs == 0 {
            return Err(QueryError::Config("gc_interval_secs must be > 0".into()));
        }
        Ok(())
    }
}
