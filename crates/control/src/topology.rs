//! Typed description of the processing graph.
//!
//! A [`Topology`] is described once and instantiated fully by a
//! [`MediaGraph`](crate::graph::MediaGraph) backend. It replaces the
//! launch-string DSL with an ordered list of node specs and named links.

use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use trackzoom_common::error::{TrackzoomError, TrackzoomResult};

/// One processing node: an element factory plus its static properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique name used for later lookup. Filled in as `{factory}{n}` when empty.
    #[serde(default)]
    pub name: String,

    /// Element factory, e.g. `"compositor"`.
    pub factory: String,

    /// Property values in string form, applied in insertion order.
    #[serde(default)]
    pub properties: IndexMap<String, String>,
}

impl NodeSpec {
    pub fn new(factory: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            factory: factory.into(),
            properties: IndexMap::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.properties.insert(key.into(), value.to_string());
        self
    }
}

/// A directed connection between two named nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub from: String,
    pub to: String,
}

/// A static property on a named pad of a node (`sink_0::ypos=200`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadPropertySpec {
    pub node: String,
    pub pad: String,
    pub property: String,
    pub value: String,
}

/// The full processing graph: nodes in order, links, and pad settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
    #[serde(default)]
    pub pad_properties: Vec<PadPropertySpec>,
}

impl Topology {
    pub fn builder() -> TopologyBuilder {
        TopologyBuilder::default()
    }

    /// Parse and validate a topology from JSON. Unnamed nodes are named the
    /// way the builder names them.
    pub fn from_json(content: &str) -> TrackzoomResult<Self> {
        let mut topology: Self = serde_json::from_str(content).map_err(|e| {
            TrackzoomError::graph_construction(format!("Malformed topology: {e}"))
        })?;
        for index in 0..topology.nodes.len() {
            if topology.nodes[index].name.trim().is_empty() {
                let name = topology.unused_name(&topology.nodes[index].factory);
                topology.nodes[index].name = name;
            }
        }
        topology.validate()?;
        Ok(topology)
    }

    /// `"{factory}{n}"`, skipping names already taken.
    fn unused_name(&self, factory: &str) -> String {
        let mut index = self
            .nodes
            .iter()
            .filter(|n| n.factory == factory && !n.name.trim().is_empty())
            .count();
        loop {
            let candidate = format!("{factory}{index}");
            if self.node(&candidate).is_none() {
                return candidate;
            }
            index += 1;
        }
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Links whose destination is `name`, in declaration order.
    pub fn incoming<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a LinkSpec> + 'a {
        self.links.iter().filter(move |l| l.to == name)
    }

    /// Check structural soundness. Element availability is left to the backend.
    pub fn validate(&self) -> TrackzoomResult<()> {
        if self.nodes.is_empty() {
            return Err(TrackzoomError::graph_construction("Topology has no nodes"));
        }

        let mut names = HashSet::new();
        for node in &self.nodes {
            if node.factory.trim().is_empty() {
                return Err(TrackzoomError::graph_construction(format!(
                    "Node '{}' has no element factory",
                    node.name
                )));
            }
            if node.name.trim().is_empty() {
                return Err(TrackzoomError::graph_construction(format!(
                    "Node of type '{}' has no name",
                    node.factory
                )));
            }
            if !names.insert(node.name.as_str()) {
                return Err(TrackzoomError::graph_construction(format!(
                    "Duplicate node name '{}'",
                    node.name
                )));
            }
        }

        for link in &self.links {
            for end in [&link.from, &link.to] {
                if !names.contains(end.as_str()) {
                    return Err(TrackzoomError::graph_construction(format!(
                        "Link {} -> {} references unknown node '{end}'",
                        link.from, link.to
                    )));
                }
            }
            if link.from == link.to {
                return Err(TrackzoomError::graph_construction(format!(
                    "Node '{}' is linked to itself",
                    link.from
                )));
            }
        }

        for pad in &self.pad_properties {
            if !names.contains(pad.node.as_str()) {
                return Err(TrackzoomError::graph_construction(format!(
                    "Pad property {}::{} references unknown node '{}'",
                    pad.pad, pad.property, pad.node
                )));
            }
        }

        Ok(())
    }

    /// Render a launch-style one-liner for logs and diagnostics.
    pub fn describe(&self) -> String {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut parts: Vec<String> = Vec::new();
        let mut previous: Option<&str> = None;

        for link in &self.links {
            if previous != Some(link.from.as_str()) {
                parts.push(self.describe_ref(&link.from, &mut seen));
            }
            parts.push("!".to_string());
            parts.push(self.describe_ref(&link.to, &mut seen));
            previous = Some(link.to.as_str());
        }

        for node in &self.nodes {
            if !seen.contains(node.name.as_str()) {
                parts.push(self.describe_ref(&node.name, &mut seen));
            }
        }

        parts.join(" ")
    }

    fn describe_ref<'a>(&'a self, name: &'a str, seen: &mut HashSet<&'a str>) -> String {
        if !seen.insert(name) {
            return format!("{name}.");
        }
        let Some(node) = self.node(name) else {
            return format!("{name}.");
        };

        let mut out = format!("{} name={}", node.factory, node.name);
        for (key, value) in &node.properties {
            out.push_str(&format!(" {key}={}", quote(value)));
        }
        for pad in self.pad_properties.iter().filter(|p| p.node == name) {
            out.push_str(&format!(" {}::{}={}", pad.pad, pad.property, quote(&pad.value)));
        }
        out
    }

    /// The reference zoom graph: a tracked, cropped close-up composited as a
    /// picture-in-picture over a scaled view of the full frame.
    pub fn track_zoom_demo(location: &Path) -> TrackzoomResult<Self> {
        Topology::builder()
            .node(NodeSpec::new("filesrc").property("location", location.to_string_lossy()))
            .node(NodeSpec::new("queue"))
            .node(NodeSpec::new("decodebin"))
            .node(NodeSpec::new("tee").named("tee"))
            .node(NodeSpec::new("videoscale"))
            .node(
                NodeSpec::new("capsfilter")
                    .property("caps", "video/x-raw,width=240,height=200"),
            )
            .node(NodeSpec::new("textoverlay").property("text", "unstable camera?"))
            .node(NodeSpec::new("compositor").named("mix2"))
            .pad_property("mix2", "sink_0", "ypos", "200")
            .node(NodeSpec::new("videocrop").property("top", 50))
            .node(NodeSpec::new("videoconvert"))
            .node(NodeSpec::new("autovideosink"))
            .branch("tee")
            .node(NodeSpec::new("queue"))
            .node(
                NodeSpec::new("track")
                    .named("trk")
                    .property("mark", 0)
                    .property("objects", 1)
                    .property("bgcolor", "0x7CA0D5")
                    .property("size", 5),
            )
            .node(NodeSpec::new("compositor").named("mix"))
            .node(
                NodeSpec::new("videocrop")
                    .property("left", 200)
                    .property("right", 200)
                    .property("top", 120)
                    .property("bottom", 100),
            )
            .node(NodeSpec::new("textoverlay").property("text", "zoom to objects"))
            .link_to("mix2")
            .build()
    }
}

fn quote(value: &str) -> String {
    if value.contains(char::is_whitespace) || value.is_empty() {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// Chain-oriented builder mirroring how a launch line reads: each `node`
/// links from the current tail, `branch` restarts at an existing node and
/// `link_to` ends the chain in one.
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    topology: Topology,
    tail: Option<String>,
}

impl TopologyBuilder {
    pub fn node(mut self, mut spec: NodeSpec) -> Self {
        if spec.name.is_empty() {
            spec.name = self.topology.unused_name(&spec.factory);
        }
        if let Some(tail) = self.tail.take() {
            self.topology.links.push(LinkSpec {
                from: tail,
                to: spec.name.clone(),
            });
        }
        self.tail = Some(spec.name.clone());
        self.topology.nodes.push(spec);
        self
    }

    pub fn branch(mut self, from: impl Into<String>) -> Self {
        self.tail = Some(from.into());
        self
    }

    pub fn link_to(mut self, name: impl Into<String>) -> Self {
        let to = name.into();
        if let Some(from) = self.tail.take() {
            self.topology.links.push(LinkSpec { from, to });
        }
        self
    }

    pub fn pad_property(
        mut self,
        node: impl Into<String>,
        pad: impl Into<String>,
        property: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        self.topology.pad_properties.push(PadPropertySpec {
            node: node.into(),
            pad: pad.into(),
            property: property.into(),
            value: value.to_string(),
        });
        self
    }

    pub fn build(self) -> TrackzoomResult<Topology> {
        self.topology.validate()?;
        Ok(self.topology)
    }
}
