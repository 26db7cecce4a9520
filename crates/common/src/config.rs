//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{TrackzoomError, TrackzoomResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// How tracking events drive the overlay.
    pub tracking: TrackingConfig,

    /// Pipeline lifecycle settings.
    pub supervisor: SupervisorConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Parameters of the centering transform and the pad it writes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Horizontal center of the target canvas.
    pub frame_center_x: i32,

    /// Vertical center of the target canvas.
    pub frame_center_y: i32,

    /// Only events from this tracked object move the overlay.
    pub object_id: u32,

    /// Structure name carried by tracking messages on the bus.
    pub message_name: String,

    /// Name of the compositor node whose pad is repositioned.
    pub compositor: String,

    /// Index into the compositor's sink pads.
    pub pad_index: usize,
}

/// Pipeline supervisor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Granularity of the termination poll, in milliseconds.
    pub poll_interval_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trackzoom_control=trace,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            frame_center_x: 320,
            frame_center_y: 180,
            object_id: 0,
            message_name: "track".to_string(),
            compositor: "mix".to_string(),
            pad_index: 0,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::from_file(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path. Errors are propagated.
    pub fn from_file(path: &Path) -> TrackzoomResult<Self> {
        if !path.exists() {
            return Err(TrackzoomError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse config from a JSON document. Missing fields take their defaults.
    pub fn from_json(content: &str) -> TrackzoomResult<Self> {
        let config: Self = serde_json::from_str(content)?;
        if config.tracking.compositor.trim().is_empty() {
            return Err(TrackzoomError::config("tracking.compositor must not be empty"));
        }
        if config.tracking.message_name.trim().is_empty() {
            return Err(TrackzoomError::config(
                "tracking.message_name must not be empty",
            ));
        }
        Ok(config)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("trackzoom").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_canvas() {
        let config = AppConfig::default();
        assert_eq!(config.tracking.frame_center_x, 320);
        assert_eq!(config.tracking.frame_center_y, 180);
        assert_eq!(config.tracking.object_id, 0);
        assert_eq!(config.tracking.compositor, "mix");
        assert_eq!(config.supervisor.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config =
            AppConfig::from_json(r#"{"tracking": {"frame_center_x": 640}}"#).unwrap();
        assert_eq!(config.tracking.frame_center_x, 640);
        assert_eq!(config.tracking.frame_center_y, 180);
        assert_eq!(config.tracking.message_name, "track");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn empty_compositor_name_is_rejected() {
        let err = AppConfig::from_json(r#"{"tracking": {"compositor": " "}}"#).unwrap_err();
        assert!(matches!(err, TrackzoomError::Config { .. }));
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let config = SupervisorConfig {
            poll_interval_ms: 0,
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = AppConfig::from_file(Path::new("/nonexistent/trackzoom.json")).unwrap_err();
        assert!(matches!(err, TrackzoomError::FileNotFound { .. }));
    }
}
