//! GStreamer-backed processing graph.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use gst::glib;
use gst::prelude::*;
use gstreamer as gst;
use trackzoom_common::config::TrackingConfig;
use trackzoom_common::error::{TrackzoomError, TrackzoomResult};

use crate::event::{EventSubscriber, OverlayOffset, PipelineEvent, Termination, TrackingEvent};
use crate::graph::{GraphState, MediaGraph, OverlaySink, OverlayTarget};
use crate::topology::{LinkSpec, NodeSpec, PadPropertySpec, Topology};

/// A topology instantiated as a `gst::Pipeline`.
pub struct GstGraph {
    pipeline: gst::Pipeline,
    tracking_message: String,
    subscribed: bool,
}

impl MediaGraph for GstGraph {
    fn build(topology: &Topology, tracking: &TrackingConfig) -> TrackzoomResult<Self> {
        topology.validate()?;
        init_gstreamer()?;

        let pipeline = gst::Pipeline::with_name("trackzoom");
        let mut elements: HashMap<&str, gst::Element> = HashMap::new();

        for node in &topology.nodes {
            let element = make_element(node)?;
            pipeline.add(&element).map_err(|e| {
                TrackzoomError::graph_construction(format!(
                    "Failed to add '{}' to pipeline: {e}",
                    node.name
                ))
            })?;
            elements.insert(node.name.as_str(), element);
        }

        // Link order decides request pad numbering (sink_0, sink_1, ...).
        for link in &topology.links {
            link_nodes(&elements, link)?;
        }

        for pad in &topology.pad_properties {
            apply_pad_property(&elements, pad)?;
        }

        tracing::debug!(nodes = elements.len(), "GStreamer pipeline constructed");

        Ok(Self {
            pipeline,
            tracking_message: tracking.message_name.clone(),
            subscribed: false,
        })
    }

    fn set_state(&mut self, state: GraphState) -> TrackzoomResult<()> {
        let target = match state {
            GraphState::Null => gst::State::Null,
            GraphState::Playing => gst::State::Playing,
        };

        self.pipeline.set_state(target).map_err(|e| {
            TrackzoomError::state_transition(format!("Failed to set pipeline to {target:?}: {e:?}"))
        })?;

        if state == GraphState::Playing {
            // State changes are async; a missing file or device only shows up
            // once the pipeline tries to preroll.
            match self.pipeline.state(gst::ClockTime::from_seconds(10)) {
                (Ok(_), gst::State::Playing, _) => {}
                (Ok(_), current, _) => {
                    tracing::warn!(
                        ?current,
                        "Pipeline did not reach Playing state within timeout"
                    );
                }
                (Err(e), _, _) => {
                    return Err(TrackzoomError::state_transition(format!(
                        "Pipeline failed to reach Playing state: {e:?}"
                    )));
                }
            }
        }

        Ok(())
    }

    fn subscribe(&mut self, subscriber: Arc<dyn EventSubscriber>) -> TrackzoomResult<()> {
        if self.subscribed {
            return Err(TrackzoomError::state_transition(
                "A bus subscriber is already registered",
            ));
        }
        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| TrackzoomError::state_transition("Pipeline has no bus"))?;

        let tracking_message = self.tracking_message.clone();
        // Runs on the posting thread. Messages always continue to the bus
        // queue so the termination poll still sees EOS and errors.
        bus.set_sync_handler(move |_bus, msg| {
            let event = translate_message(msg, &tracking_message);
            subscriber.on_event(&event);
            gst::BusSyncReply::Pass
        });
        self.subscribed = true;
        Ok(())
    }

    fn poll_terminal(&self, timeout: Duration) -> Option<Termination> {
        let bus = self.pipeline.bus()?;
        let msg = bus.timed_pop_filtered(
            clock_timeout(timeout),
            &[gst::MessageType::Eos, gst::MessageType::Error],
        )?;

        if let gst::MessageView::Error(err) = msg.view() {
            tracing::debug!(debug = ?err.debug(), "Pipeline error details");
        }
        translate_message(&msg, &self.tracking_message).termination()
    }

    fn overlay_sink(&self) -> Arc<dyn OverlaySink> {
        Arc::new(GstOverlaySink {
            pipeline: self.pipeline.clone(),
        })
    }
}

impl Drop for GstGraph {
    fn drop(&mut self) {
        // The sync handler owns a sink that owns the pipeline; break the cycle.
        if let Some(bus) = self.pipeline.bus() {
            bus.unset_sync_handler();
        }
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::warn!("Failed to release pipeline on drop: {e:?}");
        }
    }
}

/// Resolves the compositor pad by name on every write.
struct GstOverlaySink {
    pipeline: gst::Pipeline,
}

impl OverlaySink for GstOverlaySink {
    fn set_position(&self, target: &OverlayTarget, offset: OverlayOffset) -> TrackzoomResult<()> {
        let node = self.pipeline.by_name(&target.node).ok_or_else(|| {
            TrackzoomError::pad_resolution(format!("No node named '{}'", target.node))
        })?;
        let pad = node
            .sink_pads()
            .into_iter()
            .nth(target.pad_index)
            .ok_or_else(|| {
                TrackzoomError::pad_resolution(format!(
                    "Node '{}' has no sink pad #{}",
                    target.node, target.pad_index
                ))
            })?;
        if pad.find_property("xpos").is_none() || pad.find_property("ypos").is_none() {
            return Err(TrackzoomError::pad_resolution(format!(
                "Pad {} has no position properties",
                pad.name()
            )));
        }

        pad.set_property("xpos", offset.xpos);
        pad.set_property("ypos", offset.ypos);
        Ok(())
    }
}

fn init_gstreamer() -> TrackzoomResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(TrackzoomError::graph_construction(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

/// Element factories from `topology` that are not installed.
pub fn missing_factories(topology: &Topology) -> TrackzoomResult<Vec<String>> {
    init_gstreamer()?;
    let mut missing: Vec<String> = topology
        .nodes
        .iter()
        .filter(|n| gst::ElementFactory::find(&n.factory).is_none())
        .map(|n| n.factory.clone())
        .collect();
    missing.sort();
    missing.dedup();
    Ok(missing)
}

fn make_element(node: &NodeSpec) -> TrackzoomResult<gst::Element> {
    if gst::ElementFactory::find(&node.factory).is_none() {
        return Err(TrackzoomError::graph_construction(format!(
            "No element factory '{}' for node '{}'",
            node.factory, node.name
        )));
    }

    let element = gst::ElementFactory::make(&node.factory)
        .name(node.name.as_str())
        .build()
        .map_err(|e| {
            TrackzoomError::graph_construction(format!(
                "Failed to create '{}' ({}): {e}",
                node.name, node.factory
            ))
        })?;

    for (key, value) in &node.properties {
        set_property_checked(element.upcast_ref::<glib::Object>(), &node.name, key, value)?;
    }
    Ok(element)
}

/// Durations past the clock range wait as long as GStreamer can express.
fn clock_timeout(timeout: Duration) -> gst::ClockTime {
    gst::ClockTime::try_from(timeout).unwrap_or(gst::ClockTime::MAX)
}

/// Parse `value` against the property's declared type and check that it may
/// be set after construction, instead of letting glib panic.
fn set_property_checked(
    object: &glib::Object,
    owner: &str,
    key: &str,
    value: &str,
) -> TrackzoomResult<()> {
    let pspec = object.find_property(key).ok_or_else(|| {
        TrackzoomError::graph_construction(format!("'{owner}' has no property '{key}'"))
    })?;
    let flags = pspec.flags();
    if !flags.contains(glib::ParamFlags::WRITABLE)
        || flags.contains(glib::ParamFlags::CONSTRUCT_ONLY)
    {
        return Err(TrackzoomError::graph_construction(format!(
            "{owner}.{key} is not writable"
        )));
    }
    let parsed = glib::Value::deserialize(value, pspec.value_type()).map_err(|_| {
        TrackzoomError::graph_construction(format!("Invalid value '{value}' for {owner}.{key}"))
    })?;
    object.set_property_from_value(key, &parsed);
    Ok(())
}

fn link_nodes(elements: &HashMap<&str, gst::Element>, link: &LinkSpec) -> TrackzoomResult<()> {
    let (Some(src), Some(dst)) = (elements.get(link.from.as_str()), elements.get(link.to.as_str()))
    else {
        return Err(TrackzoomError::graph_construction(format!(
            "Link {} -> {} references a missing node",
            link.from, link.to
        )));
    };

    if src.link(dst).is_ok() {
        return Ok(());
    }

    if !has_sometimes_src_pad(src) {
        return Err(TrackzoomError::graph_construction(format!(
            "Failed to link {} -> {}",
            link.from, link.to
        )));
    }

    // Demuxers and decodebin expose their outputs only once data flows.
    tracing::debug!(from = %link.from, to = %link.to, "Deferring link until pad is added");
    let downstream = dst.clone();
    let to = link.to.clone();
    src.connect_pad_added(move |src, pad| {
        let Some(sink_pad) = downstream.compatible_pad(pad, None) else {
            tracing::debug!(pad = %pad.name(), %to, "No compatible pad for new output");
            return;
        };
        if sink_pad.is_linked() {
            return;
        }
        if let Err(e) = pad.link(&sink_pad) {
            tracing::warn!(from = %src.name(), %to, "Deferred link failed: {e:?}");
        }
    });
    Ok(())
}

fn has_sometimes_src_pad(element: &gst::Element) -> bool {
    element.pad_template_list().iter().any(|template| {
        template.direction() == gst::PadDirection::Src
            && template.presence() == gst::PadPresence::Sometimes
    })
}

fn apply_pad_property(
    elements: &HashMap<&str, gst::Element>,
    spec: &PadPropertySpec,
) -> TrackzoomResult<()> {
    let pad = elements
        .get(spec.node.as_str())
        .and_then(|element| element.static_pad(&spec.pad))
        .ok_or_else(|| {
            TrackzoomError::graph_construction(format!(
                "No pad '{}' on node '{}'",
                spec.pad, spec.node
            ))
        })?;
    let owner = format!("{}::{}", spec.node, spec.pad);
    set_property_checked(pad.upcast_ref::<glib::Object>(), &owner, &spec.property, &spec.value)
}

fn translate_message(msg: &gst::MessageRef, tracking_message: &str) -> PipelineEvent {
    match msg.view() {
        gst::MessageView::Eos(_) => PipelineEvent::EndOfStream,
        gst::MessageView::Error(err) => PipelineEvent::Error {
            source: msg
                .src()
                .map(|s| s.path_string().to_string())
                .unwrap_or_default(),
            message: err.error().to_string(),
        },
        gst::MessageView::Element(element) => match element.structure() {
            Some(s) if s.has_name(tracking_message) => match tracking_from_structure(s) {
                Some(event) => PipelineEvent::Tracking(event),
                None => {
                    tracing::debug!(structure = %s, "Tracking message without usable coordinates");
                    PipelineEvent::Other {
                        kind: tracking_message.to_string(),
                    }
                }
            },
            Some(s) => PipelineEvent::Other {
                kind: s.name().to_string(),
            },
            None => PipelineEvent::Other {
                kind: "element".to_string(),
            },
        },
        _ => PipelineEvent::Other {
            kind: format!("{:?}", msg.type_()),
        },
    }
}

/// Reads `object`, `xc` and `yc`. The track element posts them as unsigned
/// ints; signed and floating point fields are accepted too.
fn tracking_from_structure(s: &gst::StructureRef) -> Option<TrackingEvent> {
    Some(TrackingEvent {
        object_id: u32::try_from(numeric_field(s, "object")?).ok()?,
        x: i32::try_from(numeric_field(s, "xc")?).ok()?,
        y: i32::try_from(numeric_field(s, "yc")?).ok()?,
    })
}

fn numeric_field(s: &gst::StructureRef, field: &str) -> Option<i64> {
    if let Ok(v) = s.get::<u32>(field) {
        return Some(i64::from(v));
    }
    if let Ok(v) = s.get::<i32>(field) {
        return Some(i64::from(v));
    }
    if let Ok(v) = s.get::<f64>(field) {
        return Some(v.round() as i64);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element_message(structure: gst::Structure) -> gst::Message {
        init_gstreamer().unwrap();
        gst::message::Element::new(structure)
    }

    fn track_message(object: u32, xc: u32, yc: u32) -> gst::Message {
        element_message(
            gst::Structure::builder("track")
                .field("count", 1u32)
                .field("object", object)
                .field("xc", xc)
                .field("yc", yc)
                .build(),
        )
    }

    #[test]
    fn track_structure_becomes_tracking_event() {
        let msg = track_message(0, 300, 160);
        assert_eq!(
            translate_message(&msg, "track"),
            PipelineEvent::Tracking(TrackingEvent {
                object_id: 0,
                x: 300,
                y: 160
            })
        );
    }

    #[test]
    fn signed_and_floating_coordinates_are_accepted() {
        let signed = element_message(
            gst::Structure::builder("track")
                .field("object", 1i32)
                .field("xc", -20i32)
                .field("yc", 40i32)
                .build(),
        );
        assert_eq!(
            translate_message(&signed, "track"),
            PipelineEvent::Tracking(TrackingEvent {
                object_id: 1,
                x: -20,
                y: 40
            })
        );

        let floating = element_message(
            gst::Structure::builder("track")
                .field("object", 0u32)
                .field("xc", 299.6f64)
                .field("yc", 160.2f64)
                .build(),
        );
        assert_eq!(
            translate_message(&floating, "track"),
            PipelineEvent::Tracking(TrackingEvent {
                object_id: 0,
                x: 300,
                y: 160
            })
        );
    }

    #[test]
    fn other_structure_names_are_not_tracking() {
        let msg = track_message(0, 300, 160);
        assert_eq!(
            translate_message(&msg, "motrack"),
            PipelineEvent::Other {
                kind: "track".into()
            }
        );
    }

    #[test]
    fn missing_coordinate_is_not_tracking() {
        let msg = element_message(
            gst::Structure::builder("track")
                .field("object", 0u32)
                .field("xc", 300u32)
                .build(),
        );
        assert_eq!(
            translate_message(&msg, "track"),
            PipelineEvent::Other {
                kind: "track".into()
            }
        );
    }

    #[test]
    fn out_of_range_coordinate_is_not_tracking() {
        let msg = track_message(0, i32::MAX as u32 + 1, 160);
        assert_eq!(
            translate_message(&msg, "track"),
            PipelineEvent::Other {
                kind: "track".into()
            }
        );
    }

    #[test]
    fn eos_and_error_map_to_terminations() {
        init_gstreamer().unwrap();
        let eos = gst::message::Eos::new();
        assert_eq!(translate_message(&eos, "track"), PipelineEvent::EndOfStream);

        let source = gst::Bin::with_name("decoder");
        let error = gst::message::Error::builder(gst::CoreError::Failed, "Could not open file")
            .src(&source)
            .build();
        match translate_message(&error, "track") {
            PipelineEvent::Error { source, message } => {
                assert!(source.contains("decoder"));
                assert_eq!(message, "Could not open file");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let other = gst::message::DurationChanged::new();
        assert!(matches!(
            translate_message(&other, "track"),
            PipelineEvent::Other { .. }
        ));
    }

    #[test]
    fn read_only_and_construct_only_properties_are_rejected() {
        init_gstreamer().unwrap();
        let pad = gst::Pad::builder(gst::PadDirection::Src).name("src").build();
        let object = pad.upcast_ref::<glib::Object>();

        let err = set_property_checked(object, "src", "caps", "video/x-raw").unwrap_err();
        assert!(matches!(err, TrackzoomError::GraphConstruction { .. }));
        assert!(err.to_string().contains("not writable"));

        let err = set_property_checked(object, "src", "direction", "sink").unwrap_err();
        assert!(err.to_string().contains("not writable"));

        assert!(set_property_checked(object, "src", "nonexistent", "1").is_err());
        set_property_checked(object, "src", "offset", "1000").unwrap();
        assert_eq!(pad.property::<i64>("offset"), 1000);
    }

    #[test]
    fn oversized_poll_interval_is_clamped() {
        assert_eq!(clock_timeout(Duration::MAX), gst::ClockTime::MAX);
        assert_eq!(
            clock_timeout(Duration::from_millis(250)),
            gst::ClockTime::from_mseconds(250)
        );
    }
}
