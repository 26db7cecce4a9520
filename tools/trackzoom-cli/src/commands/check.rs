//! Check element availability.

use trackzoom_control::gst_graph::missing_factories;

use crate::TopologySource;

pub fn run(source: &TopologySource) -> anyhow::Result<()> {
    println!("trackzoom Pipeline Check");
    println!("{}", "=".repeat(50));

    let topology = super::load_topology(source)?;
    println!(
        "[OK] Topology: {} nodes, {} links",
        topology.nodes.len(),
        topology.links.len()
    );

    let missing = missing_factories(&topology)?;
    if missing.is_empty() {
        println!("[OK] All element factories are installed");
        return Ok(());
    }

    for factory in &missing {
        println!("[MISSING] {factory}");
    }
    anyhow::bail!("{} element factories are not installed", missing.len())
}
