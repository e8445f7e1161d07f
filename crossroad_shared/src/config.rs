//! Configuration system.
//!
//! Loads client configuration from JSON strings/files.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Shortest step duration the animation accepts, in seconds.
pub const MIN_STEP_DURATION: f32 = 0.2;
/// Longest step duration the animation accepts, in seconds.
pub const MAX_STEP_DURATION: f32 = 10.0;

/// Root configuration of the visual client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Simulation endpoint receiving the POST requests.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Wall-clock length of one simulation step.
    #[serde(default = "default_step_duration")]
    pub step_duration_secs: f32,
    /// Render/update ticks per second of the headless loop.
    #[serde(default = "default_frame_hz")]
    pub frame_hz: u32,
    /// Optional HTTP timeout handed to the transport.
    #[serde(default)]
    pub request_timeout_secs: Option<f32>,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8585".to_string()
}

fn default_step_duration() -> f32 {
    2.0
}

fn default_frame_hz() -> u32 {
    60
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            step_duration_secs: default_step_duration(),
            frame_hz: default_frame_hz(),
            request_timeout_secs: None,
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Step duration clamped to the supported range.
    pub fn step_duration(&self) -> f32 {
        if self.step_duration_secs.is_nan() {
            return default_step_duration();
        }
        self.step_duration_secs
            .clamp(MIN_STEP_DURATION, MAX_STEP_DURATION)
    }

    /// Seconds per frame tick.
    pub fn frame_interval(&self) -> f32 {
        1.0 / self.frame_hz.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg = ClientConfig::from_json_str(r#"{"server_url":"http://sim:9000"}"#).unwrap();
        assert_eq!(cfg.server_url, "http://sim:9000");
        assert_eq!(cfg.step_duration(), 2.0);
        assert_eq!(cfg.frame_hz, 60);
        assert_eq!(cfg.request_timeout_secs, None);
    }

    #[test]
    fn step_duration_is_clamped() {
        let mut cfg = ClientConfig::default();
        cfg.step_duration_secs = 0.01;
        assert_eq!(cfg.step_duration(), MIN_STEP_DURATION);
        cfg.step_duration_secs = 60.0;
        assert_eq!(cfg.step_duration(), MAX_STEP_DURATION);
        cfg.step_duration_secs = f32::INFINITY;
        assert_eq!(cfg.step_duration(), MAX_STEP_DURATION);
    }

    #[test]
    fn nan_step_duration_falls_back_to_default() {
        let mut cfg = ClientConfig::default();
        cfg.step_duration_secs = f32::NAN;
        assert_eq!(cfg.step_duration(), default_step_duration());
        assert!(cfg.step_duration().is_finite());
    }
}
