//! In-process stand-in for the media pipeline.
//!
//! Mirrors the parts of GStreamer the controller relies on: element factory
//! lookup, request sink pads numbered in link order, synchronous delivery to
//! the bus subscriber on the posting thread, and a queue of terminal messages
//! for the supervisor to poll.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use indexmap::IndexMap;
use trackzoom_common::config::TrackingConfig;
use trackzoom_common::error::{TrackzoomError, TrackzoomResult};

use crate::event::{EventSubscriber, OverlayOffset, PipelineEvent, Termination};
use crate::graph::{GraphState, MediaGraph, OverlaySink, OverlayTarget};
use crate::topology::Topology;

/// Element factories the simulation knows how to "instantiate".
pub const DEFAULT_FACTORIES: &[&str] = &[
    "autovideosink",
    "capsfilter",
    "compositor",
    "decodebin",
    "fakesink",
    "filesrc",
    "queue",
    "tee",
    "textoverlay",
    "track",
    "videoconvert",
    "videocrop",
    "videoscale",
    "videotestsrc",
];

#[derive(Debug, Default)]
struct SimNode {
    factory: String,
    sink_pads: Vec<SimPad>,
}

#[derive(Debug)]
struct SimPad {
    name: String,
    properties: IndexMap<String, String>,
}

struct Shared {
    nodes: Mutex<IndexMap<String, SimNode>>,
    subscriber: Mutex<Option<Arc<dyn EventSubscriber>>>,
    state: Mutex<GraphState>,
    refuse: Mutex<Option<GraphState>>,
    terminal_tx: Sender<Termination>,
    terminal_rx: Receiver<Termination>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A simulated, instantiated graph.
pub struct SimulatedGraph {
    shared: Arc<Shared>,
}

/// Cloneable handle used to drive a [`SimulatedGraph`] from outside: post
/// events, inspect pad state, inject faults.
#[derive(Clone)]
pub struct SimulatedBus {
    shared: Arc<Shared>,
}

impl SimulatedGraph {
    /// Build against an explicit factory registry.
    pub fn build_with_factories(topology: &Topology, factories: &[&str]) -> TrackzoomResult<Self> {
        topology.validate()?;

        let mut nodes: IndexMap<String, SimNode> = IndexMap::new();
        for node in &topology.nodes {
            if !factories.contains(&node.factory.as_str()) {
                return Err(TrackzoomError::graph_construction(format!(
                    "No element factory '{}' for node '{}'",
                    node.factory, node.name
                )));
            }
            nodes.insert(
                node.name.clone(),
                SimNode {
                    factory: node.factory.clone(),
                    sink_pads: Vec::new(),
                },
            );
        }

        for link in &topology.links {
            let Some(dst) = nodes.get_mut(&link.to) else {
                continue;
            };
            let name = format!("sink_{}", dst.sink_pads.len());
            dst.sink_pads.push(SimPad {
                name,
                properties: IndexMap::new(),
            });
        }

        for spec in &topology.pad_properties {
            let pad = nodes
                .get_mut(&spec.node)
                .and_then(|n| n.sink_pads.iter_mut().find(|p| p.name == spec.pad))
                .ok_or_else(|| {
                    TrackzoomError::graph_construction(format!(
                        "No pad '{}' on node '{}'",
                        spec.pad, spec.node
                    ))
                })?;
            pad.properties
                .insert(spec.property.clone(), spec.value.clone());
        }

        let (terminal_tx, terminal_rx) = unbounded();
        Ok(Self {
            shared: Arc::new(Shared {
                nodes: Mutex::new(nodes),
                subscriber: Mutex::new(None),
                state: Mutex::new(GraphState::Null),
                refuse: Mutex::new(None),
                terminal_tx,
                terminal_rx,
            }),
        })
    }

    pub fn bus(&self) -> SimulatedBus {
        SimulatedBus {
            shared: self.shared.clone(),
        }
    }
}

impl MediaGraph for SimulatedGraph {
    fn build(topology: &Topology, _tracking: &TrackingConfig) -> TrackzoomResult<Self> {
        Self::build_with_factories(topology, DEFAULT_FACTORIES)
    }

    fn set_state(&mut self, state: GraphState) -> TrackzoomResult<()> {
        if *lock(&self.shared.refuse) == Some(state) {
            return Err(TrackzoomError::state_transition(format!(
                "Simulated graph refused transition to {state:?}"
            )));
        }
        *lock(&self.shared.state) = state;
        Ok(())
    }

    fn subscribe(&mut self, subscriber: Arc<dyn EventSubscriber>) -> TrackzoomResult<()> {
        let mut slot = lock(&self.shared.subscriber);
        if slot.is_some() {
            return Err(TrackzoomError::state_transition(
                "A bus subscriber is already registered",
            ));
        }
        *slot = Some(subscriber);
        Ok(())
    }

    fn poll_terminal(&self, timeout: Duration) -> Option<Termination> {
        self.shared.terminal_rx.recv_timeout(timeout).ok()
    }

    fn overlay_sink(&self) -> Arc<dyn OverlaySink> {
        Arc::new(SimulatedSink {
            shared: self.shared.clone(),
        })
    }
}

impl SimulatedBus {
    /// Deliver `event` to the subscriber on the calling thread, then queue it
    /// for the termination poll if it is terminal.
    pub fn post(&self, event: PipelineEvent) {
        let subscriber = lock(&self.shared.subscriber).clone();
        if let Some(subscriber) = subscriber {
            subscriber.on_event(&event);
        }
        if let Some(termination) = event.termination() {
            // The receiver lives in `shared`, so the send cannot fail.
            let _ = self.shared.terminal_tx.send(termination);
        }
    }

    pub fn state(&self) -> GraphState {
        *lock(&self.shared.state)
    }

    /// Make the next transitions to `state` fail.
    pub fn refuse_transition(&self, state: GraphState) {
        *lock(&self.shared.refuse) = Some(state);
    }

    /// Remove a node, as an unexpected topology change would.
    pub fn remove_node(&self, name: &str) {
        lock(&self.shared.nodes).shift_remove(name);
    }

    pub fn factory(&self, node: &str) -> Option<String> {
        lock(&self.shared.nodes).get(node).map(|n| n.factory.clone())
    }

    pub fn pad_property(&self, node: &str, pad: &str, property: &str) -> Option<String> {
        lock(&self.shared.nodes)
            .get(node)?
            .sink_pads
            .iter()
            .find(|p| p.name == pad)?
            .properties
            .get(property)
            .cloned()
    }

    /// Current `xpos`/`ypos` of a sink pad, or `None` if never positioned.
    pub fn pad_position(&self, node: &str, pad_index: usize) -> Option<OverlayOffset> {
        let nodes = lock(&self.shared.nodes);
        let pad = nodes.get(node)?.sink_pads.get(pad_index)?;
        let xpos = pad.properties.get("xpos")?.parse().ok()?;
        let ypos = pad.properties.get("ypos")?.parse().ok()?;
        Some(OverlayOffset { xpos, ypos })
    }
}

struct SimulatedSink {
    shared: Arc<Shared>,
}

impl OverlaySink for SimulatedSink {
    fn set_position(&self, target: &OverlayTarget, offset: OverlayOffset) -> TrackzoomResult<()> {
        let mut nodes = lock(&self.shared.nodes);
        let node = nodes.get_mut(&target.node).ok_or_else(|| {
            TrackzoomError::pad_resolution(format!("No node named '{}'", target.node))
        })?;
        let pad = node.sink_pads.get_mut(target.pad_index).ok_or_else(|| {
            TrackzoomError::pad_resolution(format!(
                "Node '{}' has no sink pad #{}",
                target.node, target.pad_index
            ))
        })?;
        pad.properties
            .insert("xpos".to_string(), offset.xpos.to_string());
        pad.properties
            .insert("ypos".to_string(), offset.ypos.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::NodeSpec;
    use std::path::Path;

    #[test]
    fn sink_pads_are_numbered_in_link_order() {
        let topology = Topology::track_zoom_demo(Path::new("paper.avi")).unwrap();
        let graph = SimulatedGraph::build(&topology, &TrackingConfig::default()).unwrap();
        let bus = graph.bus();

        assert_eq!(
            bus.pad_property("mix2", "sink_0", "ypos").as_deref(),
            Some("200")
        );
        assert_eq!(bus.pad_property("mix2", "sink_1", "ypos"), None);
        assert_eq!(bus.factory("trk").as_deref(), Some("track"));
    }

    #[test]
    fn unknown_factory_fails_construction() {
        let topology = Topology::builder()
            .node(NodeSpec::new("videotestsrc"))
            .node(NodeSpec::new("nosuchelement"))
            .build()
            .unwrap();
        let err = SimulatedGraph::build(&topology, &TrackingConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, TrackzoomError::GraphConstruction { .. }));
        assert!(err.to_string().contains("nosuchelement"));
    }

    #[test]
    fn pad_property_on_missing_pad_fails_construction() {
        let topology = Topology::builder()
            .node(NodeSpec::new("compositor").named("mix"))
            .pad_property("mix", "sink_3", "xpos", 10)
            .build()
            .unwrap();
        assert!(SimulatedGraph::build(&topology, &TrackingConfig::default()).is_err());
    }

    #[test]
    fn terminal_events_are_queued_for_polling() {
        let topology = Topology::builder()
            .node(NodeSpec::new("videotestsrc"))
            .build()
            .unwrap();
        let graph = SimulatedGraph::build(&topology, &TrackingConfig::default()).unwrap();
        let bus = graph.bus();

        assert_eq!(graph.poll_terminal(Duration::from_millis(5)), None);
        bus.post(PipelineEvent::Other {
            kind: "state-changed".into(),
        });
        assert_eq!(graph.poll_terminal(Duration::from_millis(5)), None);
        bus.post(PipelineEvent::EndOfStream);
        assert_eq!(
            graph.poll_terminal(Duration::from_millis(5)),
            Some(Termination::EndOfStream)
        );
    }
}
