//! Backend interface for the excluded media pipeline.
//!
//! The supervisor and handler only talk to the pipeline through these traits,
//! so the control loop runs the same against GStreamer and the in-process
//! simulation used by tests.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use trackzoom_common::config::TrackingConfig;
use trackzoom_common::error::TrackzoomResult;

use crate::event::{EventSubscriber, OverlayOffset, Termination};
use crate::topology::Topology;

/// Lifecycle states the controller asks the graph to enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Null,
    Playing,
}

/// Address of the pad whose position follows the tracked object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayTarget {
    /// Stable name of the compositor node.
    pub node: String,

    /// Index into the node's sink pads, in request order.
    pub pad_index: usize,
}

impl OverlayTarget {
    pub fn new(node: impl Into<String>, pad_index: usize) -> Self {
        Self {
            node: node.into(),
            pad_index,
        }
    }
}

impl From<&TrackingConfig> for OverlayTarget {
    fn from(config: &TrackingConfig) -> Self {
        Self::new(config.compositor.clone(), config.pad_index)
    }
}

impl fmt::Display for OverlayTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[sink #{}]", self.node, self.pad_index)
    }
}

/// Write access to compositor pad positions.
///
/// Resolution happens on every call, so a topology change surfaces as a
/// `PadResolution` error on the next write rather than a stale handle.
pub trait OverlaySink: Send + Sync {
    fn set_position(&self, target: &OverlayTarget, offset: OverlayOffset) -> TrackzoomResult<()>;
}

/// An instantiated processing graph.
pub trait MediaGraph: Send {
    /// Instantiate and link every node of `topology`.
    ///
    /// `tracking` names the bus messages to surface as tracking events. Fails
    /// with `GraphConstruction` on malformed topologies or unavailable
    /// elements. Nothing partial is returned.
    fn build(topology: &Topology, tracking: &TrackingConfig) -> TrackzoomResult<Self>
    where
        Self: Sized;

    /// Request a lifecycle transition, failing with `StateTransition`.
    fn set_state(&mut self, state: GraphState) -> TrackzoomResult<()>;

    /// Register the single bus subscriber. Must be called before `Playing`.
    fn subscribe(&mut self, subscriber: Arc<dyn EventSubscriber>) -> TrackzoomResult<()>;

    /// Wait up to `timeout` for end-of-stream or error.
    fn poll_terminal(&self, timeout: Duration) -> Option<Termination>;

    /// Handle the tracking handler uses to move compositor pads.
    fn overlay_sink(&self) -> Arc<dyn OverlaySink>;
}
