//! Print the processing graph.

use crate::TopologySource;

pub fn run(source: &TopologySource) -> anyhow::Result<()> {
    let topology = super::load_topology(source)?;
    println!("{}", topology.describe());
    Ok(())
}
