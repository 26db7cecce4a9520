//! Play a tracking zoom pipeline.

use trackzoom_common::config::AppConfig;
use trackzoom_control::gst_graph::GstGraph;
use trackzoom_control::{Supervisor, Termination};

use crate::TopologySource;

pub fn run(source: &TopologySource, config: &AppConfig) -> anyhow::Result<()> {
    let topology = super::load_topology(source)?;
    let mut supervisor = Supervisor::<GstGraph>::initialize(&topology, config.tracking.clone())?;

    tracing::info!(
        compositor = %config.tracking.compositor,
        object_id = config.tracking.object_id,
        "Tracking zoom running"
    );

    match supervisor.run(config.supervisor.poll_interval())? {
        Termination::EndOfStream => {
            println!("Playback finished.");
            Ok(())
        }
        Termination::Error { source, message } => {
            anyhow::bail!("Pipeline error from {source}: {message}")
        }
    }
}
