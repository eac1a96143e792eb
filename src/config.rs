//! Viewer configuration.
//!
//! Loaded from `configs/viewer.json` when present (or the file named by
//! `VIEWER_CONFIG`), then overridden from the environment. Every field has a
//! default so an empty or missing file is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "configs/viewer.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Remote recognition endpoint receiving the multipart `file` field.
    pub recognition_url: String,
    pub bind_addr: String,
    pub max_upload_bytes: usize,
    pub request_timeout_secs: u64,
    /// How long a transient notice stays visible.
    pub notice_ttl_secs: u64,
    /// Upper bound on waiting for the zoom modal's render-complete signal.
    pub modal_ready_timeout_secs: u64,
    pub render: RenderConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            recognition_url: "http://localhost:5000/recognize".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            request_timeout_secs: 60,
            notice_ttl_secs: 5,
            modal_ready_timeout_secs: 10,
            render: RenderConfig::default(),
        }
    }
}

/// Constants of the rendering engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// List switches to the dense layout above this many rows.
    pub compact_after: usize,
    /// Minimum boxed items before the inline zoom trigger is offered.
    pub zoom_min_boxes: usize,
    pub high_confidence: f64,
    pub medium_confidence: f64,
    /// Sources narrower or shorter than this get the modal magnification floor.
    pub small_image_px: f64,
    pub min_magnification: f64,
    /// Confidence assigned to a plain-string result that carries no score.
    pub unscored_confidence: f64,
    pub threshold_presets: Vec<ThresholdPreset>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            compact_after: 5,
            zoom_min_boxes: 5,
            high_confidence: 0.90,
            medium_confidence: 0.70,
            small_image_px: 100.0,
            min_magnification: 5.0,
            unscored_confidence: 1.0,
            threshold_presets: default_presets(),
        }
    }
}

/// Quick-pick marker on the threshold slider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdPreset {
    pub percent: u8,
    pub label: String,
}

fn default_presets() -> Vec<ThresholdPreset> {
    [(0, "All"), (50, "Fair"), (70, "Good"), (85, "Very good"), (95, "Excellent")]
        .into_iter()
        .map(|(percent, label)| ThresholdPreset {
            percent,
            label: label.to_string(),
        })
        .collect()
}

impl ViewerConfig {
    /// Load from the default location, honoring `VIEWER_CONFIG`, then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("VIEWER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut config = Self::load_from_file(Path::new(&path))?;
        config.apply_env();
        Ok(config)
    }

    /// Read a JSON config file; a missing file yields the defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: ViewerConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("RECOGNITION_URL") {
            self.recognition_url = url;
        }
        if let Ok(addr) = std::env::var("BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(bytes) = std::env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.max_upload_bytes = bytes;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_secs(self.notice_ttl_secs)
    }

    pub fn modal_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.modal_ready_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ViewerConfig::default();
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.render.compact_after, 5);
        assert_eq!(config.render.threshold_presets.len(), 5);
        assert_eq!(config.render.threshold_presets[2].percent, 70);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ViewerConfig =
            serde_json::from_str(r#"{"bind_addr": "127.0.0.1:8080", "render": {"zoom_min_boxes": 3}}"#)
                .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.render.zoom_min_boxes, 3);
        assert_eq!(config.render.compact_after, 5);
        assert_eq!(config.notice_ttl_secs, 5);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ViewerConfig::load_from_file(Path::new("does/not/exist.json")).unwrap();
        assert_eq!(config.recognition_url, "http://localhost:5000/recognize");
    }
}
