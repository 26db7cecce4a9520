//! Events delivered on the graph's bus and the values derived from them.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Latest reported center of one tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    /// Which tracked object produced the event. `0` is the primary object.
    pub object_id: u32,

    /// Horizontal center in source coordinates.
    pub x: i32,

    /// Vertical center in source coordinates.
    pub y: i32,
}

/// Everything multiplexed on the bus, reduced to what the controller reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Tracking(TrackingEvent),
    EndOfStream,
    Error { source: String, message: String },
    Other { kind: String },
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::EndOfStream | Self::Error { .. })
    }

    /// The termination this event signals, if any.
    pub fn termination(&self) -> Option<Termination> {
        match self {
            Self::EndOfStream => Some(Termination::EndOfStream),
            Self::Error { source, message } => Some(Termination::Error {
                source: source.clone(),
                message: message.clone(),
            }),
            _ => None,
        }
    }
}

/// How a pipeline's active lifetime ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    EndOfStream,
    Error { source: String, message: String },
}

impl Termination {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Center of the target canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameCenter {
    pub x: i32,
    pub y: i32,
}

impl FrameCenter {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Position written to the compositor pad's `xpos`/`ypos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OverlayOffset {
    pub xpos: i32,
    pub ypos: i32,
}

impl OverlayOffset {
    /// Offset that moves the tracked point onto the frame center.
    ///
    /// Pure and stateless: every event yields a fresh offset. Saturates at
    /// the `i32` bounds instead of wrapping.
    pub fn centering(center: FrameCenter, event: &TrackingEvent) -> Self {
        Self {
            xpos: center.x.saturating_sub(event.x),
            ypos: center.y.saturating_sub(event.y),
        }
    }
}

/// A registered consumer of bus events.
///
/// Invoked on whatever thread delivers the event. Delivery of later events
/// always continues after `on_event` returns.
pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Guarantees at most one concurrent invocation of the wrapped subscriber.
///
/// GStreamer posts element messages from streaming threads, so two branches
/// can deliver at once; the pad write must still be single-writer.
pub struct SerializedSubscriber {
    inner: Arc<dyn EventSubscriber>,
    gate: Mutex<()>,
}

impl SerializedSubscriber {
    pub fn new(inner: Arc<dyn EventSubscriber>) -> Self {
        Self {
            inner,
            gate: Mutex::new(()),
        }
    }
}

impl EventSubscriber for SerializedSubscriber {
    fn on_event(&self, event: &PipelineEvent) {
        // A poisoned gate only means an earlier delivery panicked; keep going.
        let _guard = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        self.inner.on_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn offset_for_off_center_object() {
        let event = TrackingEvent {
            object_id: 0,
            x: 300,
            y: 160,
        };
        let offset = OverlayOffset::centering(FrameCenter::new(320, 180), &event);
        assert_eq!(offset, OverlayOffset { xpos: 20, ypos: 20 });
    }

    #[test]
    fn offset_for_centered_object_is_zero() {
        let event = TrackingEvent {
            object_id: 0,
            x: 320,
            y: 180,
        };
        let offset = OverlayOffset::centering(FrameCenter::new(320, 180), &event);
        assert_eq!(offset, OverlayOffset::default());
    }

    #[test]
    fn offset_saturates_instead_of_overflowing() {
        let event = TrackingEvent {
            object_id: 0,
            x: i32::MIN,
            y: i32::MAX,
        };
        let offset = OverlayOffset::centering(FrameCenter::new(320, -180), &event);
        assert_eq!(offset.xpos, i32::MAX);
        assert_eq!(offset.ypos, i32::MIN);
    }

    #[test]
    fn only_eos_and_error_terminate() {
        assert!(PipelineEvent::EndOfStream.is_terminal());
        assert!(PipelineEvent::Error {
            source: "filesrc0".into(),
            message: "not found".into()
        }
        .termination()
        .unwrap()
        .is_error());
        assert!(!PipelineEvent::Other {
            kind: "state-changed".into()
        }
        .is_terminal());
        assert!(PipelineEvent::Tracking(TrackingEvent {
            object_id: 0,
            x: 0,
            y: 0
        })
        .termination()
        .is_none());
    }

    struct OverlapDetector {
        active: AtomicUsize,
        max_seen: AtomicUsize,
    }

    impl EventSubscriber for OverlapDetector {
        fn on_event(&self, _event: &PipelineEvent) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn serialized_subscriber_never_overlaps() {
        let detector = Arc::new(OverlapDetector {
            active: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
        });
        let serialized = Arc::new(SerializedSubscriber::new(detector.clone()));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let serialized = serialized.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        serialized.on_event(&PipelineEvent::EndOfStream);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(detector.max_seen.load(Ordering::SeqCst), 1);
    }
}
