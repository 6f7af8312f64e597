// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions and instances for the network.

use crate::library::{self, NodeState};
use crate::port::{PortSpec, PortType, PortValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Node category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Frame context source
    Input,
    /// Network sink
    Output,
    /// Constants and arithmetic
    Math,
    /// Waveform and spectrum measurements
    Analysis,
    /// Smoothing and normalisation over time
    Dynamics,
    /// Gates, counters and detectors producing discrete changes
    Trigger,
    /// Pitch and harmonic tracking
    Pitch,
    /// Conversions and value builders
    Utility,
}

/// Closed set of node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Emits the frame context
    Input,
    /// Network sink with a declared value type
    Output(PortType),
    /// Constant number
    Number,
    /// Constant string
    Text,
    /// Binary arithmetic
    Math,
    /// Linear remap between ranges
    MapRange,
    /// Threshold comparison
    Compare,
    /// Exponential smoothing
    Smooth,
    /// Time-driven periodic waveform
    Oscillator,
    /// Picks one entry of a comma-separated list
    SelectMode,
    /// HSL to color
    HslColor,
    /// Builds a vector from components
    Vector3,
    /// Waveform loudness
    AudioVolume,
    /// Spectrum slice between two frequencies
    FrequencyBand,
    /// Statistics over a byte buffer
    BandInfo,
    /// Bass/mid/high split
    MultiBandAnalysis,
    /// Centroid, flatness and rolloff
    SpectralFeatures,
    /// Onset strength
    SpectralFlux,
    /// Attack/release smoothing
    EnvelopeFollower,
    /// Windowed quantile normalisation
    AdaptiveNormalize,
    /// Two-threshold latch
    HysteresisGate,
    /// Counts rising edges
    ThresholdCounter,
    /// Holds values for a minimum interval
    RateLimiter,
    /// Fires on large jumps with hold and cooldown
    SectionChangeDetector,
    /// YIN fundamental frequency
    PitchDetection,
    /// Harmonic series detection on the spectrum
    HarmonicPresence,
}

impl NodeKind {
    /// Every kind except the typed `Output` variants
    pub const BUILTIN: &'static [NodeKind] = &[
        Self::Input,
        Self::Number,
        Self::Text,
        Self::Math,
        Self::MapRange,
        Self::Compare,
        Self::Smooth,
        Self::Oscillator,
        Self::SelectMode,
        Self::HslColor,
        Self::Vector3,
        Self::AudioVolume,
        Self::FrequencyBand,
        Self::BandInfo,
        Self::MultiBandAnalysis,
        Self::SpectralFeatures,
        Self::SpectralFlux,
        Self::EnvelopeFollower,
        Self::AdaptiveNormalize,
        Self::HysteresisGate,
        Self::ThresholdCounter,
        Self::RateLimiter,
        Self::SectionChangeDetector,
        Self::PitchDetection,
        Self::HarmonicPresence,
    ];

    /// Types an `Output` node may declare
    pub const OUTPUT_TYPES: &'static [PortType] = &[
        PortType::Number,
        PortType::String,
        PortType::Boolean,
        PortType::Color,
        PortType::Object,
        PortType::Vector3,
    ];

    /// Label persisted as `definitionLabel`
    pub fn label(&self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::Output(_) => "Output",
            Self::Number => "Number",
            Self::Text => "Text",
            Self::Math => "Math",
            Self::MapRange => "Map Range",
            Self::Compare => "Compare",
            Self::Smooth => "Smooth",
            Self::Oscillator => "Oscillator",
            Self::SelectMode => "Select Mode",
            Self::HslColor => "HSL Color",
            Self::Vector3 => "Vector3",
            Self::AudioVolume => "Audio Volume",
            Self::FrequencyBand => "Frequency Band",
            Self::BandInfo => "Band Info",
            Self::MultiBandAnalysis => "Multi-Band Analysis",
            Self::SpectralFeatures => "Spectral Features",
            Self::SpectralFlux => "Spectral Flux",
            Self::EnvelopeFollower => "Envelope Follower",
            Self::AdaptiveNormalize => "Adaptive Normalize",
            Self::HysteresisGate => "Hysteresis Gate",
            Self::ThresholdCounter => "Threshold Counter",
            Self::RateLimiter => "Rate Limiter",
            Self::SectionChangeDetector => "Section Change Detector",
            Self::PitchDetection => "Pitch Detection",
            Self::HarmonicPresence => "Harmonic Presence",
        }
    }

    /// Resolve a persisted label; `Output` needs its declared type
    pub fn from_label(label: &str, output_type: Option<PortType>) -> Option<Self> {
        if label == "Output" {
            return output_type.map(Self::Output);
        }
        Self::BUILTIN.iter().copied().find(|kind| kind.label() == label)
    }

    /// Whether this is the frame context source
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input)
    }

    /// Declared type if this is the sink
    pub fn output_type(&self) -> Option<PortType> {
        match self {
            Self::Output(port_type) => Some(*port_type),
            _ => None,
        }
    }

    /// Whether the kind keeps history between frames
    pub fn is_stateful(&self) -> bool {
        matches!(
            self,
            Self::Smooth
                | Self::SpectralFlux
                | Self::EnvelopeFollower
                | Self::AdaptiveNormalize
                | Self::HysteresisGate
                | Self::ThresholdCounter
                | Self::RateLimiter
                | Self::SectionChangeDetector
                | Self::PitchDetection
                | Self::HarmonicPresence
        )
    }

    /// Definition from the builtin registry
    pub fn definition(&self) -> Option<&'static NodeDefinition> {
        NodeRegistry::builtin().definition(self)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Output(port_type) => write!(f, "Output<{}>", port_type.display_name()),
            other => f.write_str(other.label()),
        }
    }
}

/// Immutable template shared by every instance of a kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Kind this definition describes
    pub kind: NodeKind,
    /// Display name
    pub label: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
    /// Input ports
    pub inputs: Vec<PortSpec>,
    /// Output ports
    pub outputs: Vec<PortSpec>,
}

impl NodeDefinition {
    /// Get an input port by id
    pub fn input(&self, port_id: &str) -> Option<&PortSpec> {
        self.inputs.iter().find(|p| p.id == port_id)
    }

    /// Get an output port by id
    pub fn output(&self, port_id: &str) -> Option<&PortSpec> {
        self.outputs.iter().find(|p| p.id == port_id)
    }

    /// First declared output, used when an edge names no handle
    pub fn primary_output(&self) -> Option<&PortSpec> {
        self.outputs.first()
    }
}

/// A node instance in the network
#[derive(Debug, Clone)]
pub struct NodeInstance {
    /// Unique instance ID
    pub id: NodeId,
    /// Definition this instance uses
    pub kind: NodeKind,
    /// Literal values for unconnected inputs
    pub input_overrides: IndexMap<String, PortValue>,
    /// History kept between frames, never persisted
    pub(crate) state: NodeState,
}

impl NodeInstance {
    /// Create a new node of the given kind with a random id
    pub fn new(kind: NodeKind) -> Self {
        Self::with_id(NodeId::new(), kind)
    }

    /// Create a new node with an explicit id
    pub fn with_id(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            input_overrides: IndexMap::new(),
            state: NodeState::default(),
        }
    }

    /// Set an input override
    pub fn with_override(mut self, port_id: impl Into<String>, value: impl Into<PortValue>) -> Self {
        self.input_overrides.insert(port_id.into(), value.into());
        self
    }

    /// Get the definition
    pub fn definition(&self) -> Option<&'static NodeDefinition> {
        self.kind.definition()
    }

    /// Whether the node has accumulated any history
    pub fn has_state(&self) -> bool {
        !matches!(self.state, NodeState::Empty)
    }

    /// Forget all history
    pub fn reset_state(&mut self) {
        self.state = NodeState::Empty;
    }
}

static BUILTIN_REGISTRY: LazyLock<NodeRegistry> = LazyLock::new(library::create_registry);

/// Registry of available node definitions
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    /// Registered definitions by kind
    types: IndexMap<NodeKind, NodeDefinition>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            types: IndexMap::new(),
        }
    }

    /// The registry holding every builtin definition
    pub fn builtin() -> &'static NodeRegistry {
        &BUILTIN_REGISTRY
    }

    /// Register a definition
    pub fn register(&mut self, definition: NodeDefinition) {
        self.types.insert(definition.kind, definition);
    }

    /// Get a definition by kind
    pub fn definition(&self, kind: &NodeKind) -> Option<&NodeDefinition> {
        self.types.get(kind)
    }

    /// Get a definition by label; `Output` resolves to its number variant
    pub fn get(&self, label: &str) -> Option<&NodeDefinition> {
        let kind = NodeKind::from_label(label, Some(PortType::Number))?;
        self.definition(&kind)
    }

    /// Get all registered definitions
    pub fn types(&self) -> impl Iterator<Item = &NodeDefinition> {
        self.types.values()
    }

    /// Get definitions by category
    pub fn types_in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeDefinition> {
        self.types.values().filter(move |t| t.category == category)
    }

    /// Number of registered definitions
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Create a node from a label
    pub fn create_node(&self, label: &str) -> Option<NodeInstance> {
        self.get(label).map(|definition| NodeInstance::new(definition.kind))
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_is_registered() {
        let registry = NodeRegistry::builtin();
        for kind in NodeKind::BUILTIN {
            let definition = registry.definition(kind).expect("builtin kind registered");
            assert_eq!(definition.label, kind.label());
        }
        for port_type in NodeKind::OUTPUT_TYPES {
            let definition = registry.definition(&NodeKind::Output(*port_type)).unwrap();
            assert_eq!(definition.inputs[0].port_type, *port_type);
        }
        assert_eq!(registry.len(), NodeKind::BUILTIN.len() + NodeKind::OUTPUT_TYPES.len());
    }

    #[test]
    fn test_label_round_trip() {
        for kind in NodeKind::BUILTIN {
            assert_eq!(NodeKind::from_label(kind.label(), None), Some(*kind));
        }
        assert_eq!(
            NodeKind::from_label("Output", Some(PortType::Color)),
            Some(NodeKind::Output(PortType::Color))
        );
        assert_eq!(NodeKind::from_label("Output", None), None);
        assert_eq!(NodeKind::from_label("Reverb", None), None);
    }

    #[test]
    fn test_port_ids_unique_per_direction() {
        for definition in NodeRegistry::builtin().types() {
            let mut ids: Vec<&str> = definition.inputs.iter().map(|p| p.id.as_str()).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), definition.inputs.len(), "{}", definition.label);

            let mut ids: Vec<&str> = definition.outputs.iter().map(|p| p.id.as_str()).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), definition.outputs.len(), "{}", definition.label);
        }
    }

    #[test]
    fn test_create_node_by_label() {
        let registry = NodeRegistry::builtin();
        let node = registry.create_node("Envelope Follower").unwrap();
        assert_eq!(node.kind, NodeKind::EnvelopeFollower);
        assert!(!node.has_state());
        assert!(registry.create_node("Nope").is_none());
    }
}
