//! Trackzoom Control
//!
//! Drives a media pipeline that tracks an object in one stream and keeps a
//! picture-in-picture overlay centered on it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  start/stop   ┌──────────────────────────────┐
//! │  Supervisor  │──────────────▶│          MediaGraph           │
//! │              │◀── poll EOS ──│  (GStreamer or simulated)     │
//! └──────┬───────┘   / Error     │                               │
//!        │ subscribe             │  bus ── Tracking ──┐          │
//!        ▼                       │                    ▼          │
//! ┌──────────────┐  xpos/ypos    │            ┌──────────────┐   │
//! │TrackingHandler│─────────────▶│            │ compositor   │   │
//! └──────────────┘               │            │ "mix" sink_0 │   │
//!                                │            └──────────────┘   │
//!                                └──────────────────────────────┘
//! ```

pub mod event;
pub mod graph;
pub mod gst_graph;
pub mod handler;
pub mod simulated;
pub mod supervisor;
pub mod topology;

pub use event::*;
pub use graph::*;
pub use handler::*;
pub use supervisor::*;
pub use topology::*;
