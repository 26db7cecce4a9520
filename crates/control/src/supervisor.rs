//! Pipeline supervisor: builds the graph, drives its lifecycle, and blocks
//! until the stream terminates.

use std::sync::Arc;
use std::time::Duration;

use trackzoom_common::config::TrackingConfig;
use trackzoom_common::error::{TrackzoomError, TrackzoomResult};

use crate::event::{EventSubscriber, SerializedSubscriber, Termination};
use crate::graph::{GraphState, MediaGraph};
use crate::handler::TrackingHandler;
use crate::topology::Topology;

/// Lifecycle of a supervised graph. `Stopped` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed, not yet started.
    Uninitialized,
    Playing,
    Stopped,
    Error,
}

/// Owns exactly one graph for its whole lifetime.
pub struct Supervisor<G: MediaGraph> {
    graph: Option<G>,
    state: PipelineState,
    tracking: TrackingConfig,
    termination: Option<Termination>,
}

impl<G: MediaGraph> Supervisor<G> {
    /// Instantiate `topology` in full. No partial graph survives a failure.
    pub fn initialize(topology: &Topology, tracking: TrackingConfig) -> TrackzoomResult<Self> {
        topology.validate()?;
        tracing::info!(nodes = topology.nodes.len(), "Building processing graph");
        tracing::debug!(pipeline = %topology.describe(), "Topology");

        let graph = G::build(topology, &tracking)?;

        if topology.node(&tracking.compositor).is_none() {
            tracing::warn!(
                compositor = %tracking.compositor,
                "Topology has no node with the configured compositor name; overlay updates will be skipped"
            );
        }

        Ok(Self {
            graph: Some(graph),
            state: PipelineState::Uninitialized,
            tracking,
            termination: None,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The live graph, until shutdown drops it.
    pub fn graph(&self) -> Option<&G> {
        self.graph.as_ref()
    }

    /// Subscribe a [`TrackingHandler`] and transition to playing.
    pub fn start(&mut self) -> TrackzoomResult<()> {
        let graph = self.live_graph()?;
        let handler = TrackingHandler::new(&self.tracking, graph.overlay_sink());
        self.start_with(Arc::new(handler))
    }

    /// Subscribe `subscriber` and transition to playing.
    ///
    /// The subscriber is registered before the transition, so no event
    /// posted once playing begins is missed. Only valid from
    /// `Uninitialized`; a second start fails with `StateTransition`.
    pub fn start_with(&mut self, subscriber: Arc<dyn EventSubscriber>) -> TrackzoomResult<()> {
        if self.state != PipelineState::Uninitialized {
            return Err(TrackzoomError::state_transition(format!(
                "Cannot start a pipeline in {:?} state",
                self.state
            )));
        }

        let graph = self
            .graph
            .as_mut()
            .ok_or_else(|| TrackzoomError::state_transition("Pipeline graph is gone"))?;
        graph.subscribe(Arc::new(SerializedSubscriber::new(subscriber)))?;

        if let Err(e) = graph.set_state(GraphState::Playing) {
            tracing::error!(error = %e, "Pipeline failed to start");
            self.state = PipelineState::Error;
            return Err(e);
        }

        self.state = PipelineState::Playing;
        tracing::info!("Pipeline playing");
        Ok(())
    }

    /// Block until end-of-stream or error, polling every `poll_interval`.
    ///
    /// Never returns while playing without a terminal event. Returns the
    /// recorded termination immediately if one was already observed.
    pub fn wait_for_termination(&mut self, poll_interval: Duration) -> TrackzoomResult<Termination> {
        match self.state {
            PipelineState::Playing => {}
            PipelineState::Stopped | PipelineState::Error => {
                return self.termination.clone().ok_or_else(|| {
                    TrackzoomError::state_transition(format!(
                        "Pipeline is {:?} without having terminated",
                        self.state
                    ))
                });
            }
            PipelineState::Uninitialized => {
                return Err(TrackzoomError::state_transition(
                    "Cannot wait on a pipeline that was never started",
                ));
            }
        }

        let graph = self
            .graph
            .as_ref()
            .ok_or_else(|| TrackzoomError::state_transition("Pipeline graph is gone"))?;

        let termination = loop {
            if let Some(termination) = graph.poll_terminal(poll_interval) {
                break termination;
            }
            tracing::trace!("No terminal event yet");
        };

        match &termination {
            Termination::EndOfStream => {
                tracing::info!("End of stream");
                self.state = PipelineState::Stopped;
            }
            Termination::Error { source, message } => {
                tracing::error!(%source, %message, "Pipeline error");
                self.state = PipelineState::Error;
            }
        }
        self.termination = Some(termination.clone());
        Ok(termination)
    }

    /// Transition the graph to stopped and release it.
    ///
    /// Valid from any state; a second call is a no-op.
    pub fn shutdown(&mut self) -> TrackzoomResult<()> {
        let Some(mut graph) = self.graph.take() else {
            return Ok(());
        };

        if let Err(e) = graph.set_state(GraphState::Null) {
            tracing::error!(error = %e, "Pipeline refused to stop");
            self.state = PipelineState::Error;
            return Err(e);
        }

        self.state = PipelineState::Stopped;
        tracing::info!("Pipeline stopped");
        Ok(())
    }

    /// Start, wait for termination, and shut down.
    pub fn run(&mut self, poll_interval: Duration) -> TrackzoomResult<Termination> {
        self.start()?;
        let termination = self.wait_for_termination(poll_interval)?;
        self.shutdown()?;
        Ok(termination)
    }

    fn live_graph(&self) -> TrackzoomResult<&G> {
        self.graph
            .as_ref()
            .ok_or_else(|| TrackzoomError::state_transition("Pipeline graph is gone"))
    }
}

impl<G: MediaGraph> Drop for Supervisor<G> {
    fn drop(&mut self) {
        if self.graph.is_some() {
            if let Err(e) = self.shutdown() {
                tracing::warn!(error = %e, "Failed to stop pipeline on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PipelineEvent;
    use crate::simulated::SimulatedGraph;
    use crate::topology::NodeSpec;

    fn minimal() -> Topology {
        Topology::builder()
            .node(NodeSpec::new("videotestsrc"))
            .node(NodeSpec::new("compositor").named("mix"))
            .node(NodeSpec::new("fakesink"))
            .build()
            .unwrap()
    }

    fn supervisor() -> Supervisor<SimulatedGraph> {
        Supervisor::initialize(&minimal(), TrackingConfig::default()).unwrap()
    }

    #[test]
    fn starts_uninitialized() {
        assert_eq!(supervisor().state(), PipelineState::Uninitialized);
    }

    #[test]
    fn second_start_is_rejected() {
        let mut sup = supervisor();
        sup.start().unwrap();
        let err = sup.start().unwrap_err();
        assert!(matches!(err, TrackzoomError::StateTransition { .. }));
        assert_eq!(sup.state(), PipelineState::Playing);
    }

    #[test]
    fn failed_start_enters_error_state() {
        let mut sup = supervisor();
        sup.graph().unwrap().bus().refuse_transition(GraphState::Playing);
        assert!(sup.start().is_err());
        assert_eq!(sup.state(), PipelineState::Error);
    }

    #[test]
    fn wait_before_start_is_rejected() {
        let mut sup = supervisor();
        assert!(sup.wait_for_termination(Duration::from_millis(1)).is_err());
    }

    #[test]
    fn error_event_ends_wait_in_error_state() {
        let mut sup = supervisor();
        sup.start().unwrap();
        sup.graph().unwrap().bus().post(PipelineEvent::Error {
            source: "/trackzoom/filesrc0".into(),
            message: "Resource not found".into(),
        });

        let termination = sup.wait_for_termination(Duration::from_millis(5)).unwrap();
        assert!(termination.is_error());
        assert_eq!(sup.state(), PipelineState::Error);

        // Already terminated: the recorded outcome comes back immediately.
        assert_eq!(
            sup.wait_for_termination(Duration::from_millis(5)).unwrap(),
            termination
        );
    }

    #[test]
    fn shutdown_is_idempotent_and_drops_graph() {
        let mut sup = supervisor();
        let bus = sup.graph().unwrap().bus();
        sup.start().unwrap();
        sup.shutdown().unwrap();
        assert_eq!(sup.state(), PipelineState::Stopped);
        assert_eq!(bus.state(), GraphState::Null);
        assert!(sup.graph().is_none());

        sup.shutdown().unwrap();
        assert_eq!(sup.state(), PipelineState::Stopped);
    }

    #[test]
    fn no_restart_after_stop() {
        let mut sup = supervisor();
        sup.start().unwrap();
        sup.shutdown().unwrap();
        assert!(sup.start().is_err());
    }

    #[test]
    fn rejected_shutdown_is_fatal() {
        let mut sup = supervisor();
        sup.start().unwrap();
        sup.graph().unwrap().bus().refuse_transition(GraphState::Null);
        let err = sup.shutdown().unwrap_err();
        assert!(matches!(err, TrackzoomError::StateTransition { .. }));
        assert_eq!(sup.state(), PipelineState::Error);
    }

    #[test]
    fn drop_stops_a_playing_graph() {
        let mut sup = supervisor();
        let bus = sup.graph().unwrap().bus();
        sup.start().unwrap();
        assert_eq!(bus.state(), GraphState::Playing);
        drop(sup);
        assert_eq!(bus.state(), GraphState::Null);
    }
}
