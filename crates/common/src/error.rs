//! Error types shared across trackzoom crates.

use std::path::PathBuf;

/// Top-level error type for trackzoom operations.
///
/// `GraphConstruction` and `StateTransition` are fatal to the controlling
/// flow. `PadResolution` is reported by the tracking handler and swallowed.
#[derive(Debug, thiserror::Error)]
pub enum TrackzoomError {
    #[error("Graph construction error: {message}")]
    GraphConstruction { message: String },

    #[error("State transition error: {message}")]
    StateTransition { message: String },

    #[error("Pad resolution error: {message}")]
    PadResolution { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using TrackzoomError.
pub type TrackzoomResult<T> = Result<T, TrackzoomError>;

impl TrackzoomError {
    pub fn graph_construction(msg: impl Into<String>) -> Self {
        Self::GraphConstruction {
            message: msg.into(),
        }
    }

    pub fn state_transition(msg: impl Into<String>) -> Self {
        Self::StateTransition {
            message: msg.into(),
        }
    }

    pub fn pad_resolution(msg: impl Into<String>) -> Self {
        Self::PadResolution {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether playback can continue after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::PadResolution { .. })
    }
}
