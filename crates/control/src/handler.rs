//! Tracking event handler: recenters the overlay on the primary object.

use std::sync::Arc;

use trackzoom_common::config::TrackingConfig;
use trackzoom_common::error::TrackzoomResult;

use crate::event::{EventSubscriber, FrameCenter, OverlayOffset, PipelineEvent};
use crate::graph::{OverlaySink, OverlayTarget};

/// Moves the compositor pad so the tracked object stays centered.
///
/// Only the latest coordinate is used. No history or smoothing is kept, so
/// each event fully overwrites the previous offset.
pub struct TrackingHandler {
    center: FrameCenter,
    object_id: u32,
    target: OverlayTarget,
    sink: Arc<dyn OverlaySink>,
}

impl TrackingHandler {
    pub fn new(config: &TrackingConfig, sink: Arc<dyn OverlaySink>) -> Self {
        Self {
            center: FrameCenter::new(config.frame_center_x, config.frame_center_y),
            object_id: config.object_id,
            target: OverlayTarget::from(config),
            sink,
        }
    }

    /// Apply one event. Returns the offset written, or `None` when the event
    /// is not a tracking event for the followed object.
    pub fn apply(&self, event: &PipelineEvent) -> TrackzoomResult<Option<OverlayOffset>> {
        let PipelineEvent::Tracking(tracking) = event else {
            return Ok(None);
        };
        if tracking.object_id != self.object_id {
            return Ok(None);
        }

        let offset = OverlayOffset::centering(self.center, tracking);
        self.sink.set_position(&self.target, offset)?;
        Ok(Some(offset))
    }
}

impl EventSubscriber for TrackingHandler {
    fn on_event(&self, event: &PipelineEvent) {
        match self.apply(event) {
            Ok(Some(offset)) => {
                tracing::trace!(
                    target_pad = %self.target,
                    xpos = offset.xpos,
                    ypos = offset.ypos,
                    "Overlay repositioned"
                );
            }
            Ok(None) => {}
            Err(e) => {
                // Dropped, not retried: the next event resolves the pad again.
                tracing::warn!(target_pad = %self.target, error = %e, "Skipping overlay update");
            }
        }
    }
}
