pub mod check;
pub mod describe;
pub mod run;

use trackzoom_control::Topology;

use crate::TopologySource;

/// Load the topology named on the command line.
pub fn load_topology(source: &TopologySource) -> anyhow::Result<Topology> {
    let topology = match &source.topology {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
            Topology::from_json(&content)?
        }
        None => Topology::track_zoom_demo(&source.input)?,
    };
    Ok(topology)
}
