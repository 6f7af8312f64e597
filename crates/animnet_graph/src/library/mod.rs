// SPDX-License-Identifier: MIT OR Apache-2.0
//! Builtin node library.
//!
//! Every [`NodeKind`] is implemented here: the port layout lives in
//! [`create_registry`], the behaviour in [`compute`], and any history a kind
//! keeps between frames in its [`NodeState`] variant.

pub mod basic;
pub mod dynamics;
pub mod harmonic;
pub mod pitch;
pub mod spectrum;

use crate::frame::{fields, FrameContext};
use crate::node::{NodeCategory, NodeDefinition, NodeKind, NodeRegistry};
use crate::port::{MathOperation, PortSpec, PortType, PortValue, PortValues};
use std::mem;

pub use basic::Smooth;
pub use dynamics::{
    AdaptiveNormalize, EnvelopeFollower, HysteresisGate, RateLimiter, SectionChangeDetector, ThresholdCounter,
};
pub use harmonic::HarmonicPresence;
pub use pitch::PitchDetection;
pub use spectrum::SpectralFlux;

/// Derives frame deltas from the frame context's clock
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameClock {
    previous: Option<f64>,
}

impl FrameClock {
    /// Seconds since the last tick; 0 on the first tick and when time runs backwards
    pub fn tick(&mut self, time: f64) -> f64 {
        let dt = match self.previous {
            Some(previous) if time > previous => time - previous,
            _ => 0.0,
        };
        self.previous = Some(time);
        dt
    }

    /// Time of the last tick
    pub fn previous(&self) -> Option<f64> {
        self.previous
    }
}

/// Per-instance history, one variant per stateful kind
#[derive(Debug, Clone, Default)]
pub enum NodeState {
    /// Nothing recorded yet, or a stateless kind
    #[default]
    Empty,
    /// `Smooth`
    Smooth(Smooth),
    /// `Spectral Flux`
    SpectralFlux(SpectralFlux),
    /// `Envelope Follower`
    Envelope(EnvelopeFollower),
    /// `Adaptive Normalize`
    Normalize(AdaptiveNormalize),
    /// `Hysteresis Gate`
    Gate(HysteresisGate),
    /// `Threshold Counter`
    Counter(ThresholdCounter),
    /// `Rate Limiter`
    RateLimit(RateLimiter),
    /// `Section Change Detector`
    SectionChange(SectionChangeDetector),
    /// `Pitch Detection`
    Pitch(PitchDetection),
    /// `Harmonic Presence`
    Harmonic(HarmonicPresence),
}

impl NodeState {
    /// Fresh state for a kind
    pub fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Smooth => Self::Smooth(Smooth::default()),
            NodeKind::SpectralFlux => Self::SpectralFlux(SpectralFlux::default()),
            NodeKind::EnvelopeFollower => Self::Envelope(EnvelopeFollower::default()),
            NodeKind::AdaptiveNormalize => Self::Normalize(AdaptiveNormalize::default()),
            NodeKind::HysteresisGate => Self::Gate(HysteresisGate::default()),
            NodeKind::ThresholdCounter => Self::Counter(ThresholdCounter::default()),
            NodeKind::RateLimiter => Self::RateLimit(RateLimiter::default()),
            NodeKind::SectionChangeDetector => Self::SectionChange(SectionChangeDetector::default()),
            NodeKind::PitchDetection => Self::Pitch(PitchDetection::default()),
            NodeKind::HarmonicPresence => Self::Harmonic(HarmonicPresence::default()),
            _ => Self::Empty,
        }
    }

    /// Whether this state belongs to `kind`
    pub fn fits(&self, kind: NodeKind) -> bool {
        mem::discriminant(self) == mem::discriminant(&Self::for_kind(kind))
    }
}

/// Run one node
///
/// A state of the wrong variant is replaced with a fresh one before the kind
/// runs.
pub(crate) fn compute(kind: NodeKind, inputs: &PortValues, frame: &FrameContext, state: &mut NodeState) -> PortValues {
    if !state.fits(kind) {
        *state = NodeState::for_kind(kind);
    }

    match (kind, state) {
        (NodeKind::Input, _) => frame.to_values(),
        (NodeKind::Output(port_type), _) => {
            let value = inputs.get("value").cloned().unwrap_or_else(|| port_type.zero_value());
            PortValues::new().with("value", value)
        }
        (NodeKind::Number, _) => PortValues::new().with("value", inputs.number("value")),
        (NodeKind::Text, _) => PortValues::new().with("value", inputs.text("value")),
        (NodeKind::Math, _) => basic::compute_math(inputs),
        (NodeKind::MapRange, _) => basic::compute_map_range(inputs),
        (NodeKind::Compare, _) => basic::compute_compare(inputs),
        (NodeKind::Oscillator, _) => basic::compute_oscillator(inputs),
        (NodeKind::SelectMode, _) => basic::compute_select_mode(inputs),
        (NodeKind::HslColor, _) => basic::compute_hsl_color(inputs),
        (NodeKind::Vector3, _) => basic::compute_vector3(inputs),
        (NodeKind::AudioVolume, _) => spectrum::compute_audio_volume(inputs),
        (NodeKind::FrequencyBand, _) => spectrum::compute_frequency_band(inputs),
        (NodeKind::BandInfo, _) => spectrum::compute_band_info(inputs),
        (NodeKind::MultiBandAnalysis, _) => spectrum::compute_multi_band(inputs),
        (NodeKind::SpectralFeatures, _) => spectrum::compute_spectral_features(inputs),
        (NodeKind::Smooth, NodeState::Smooth(smooth)) => smooth.compute(inputs),
        (NodeKind::SpectralFlux, NodeState::SpectralFlux(flux)) => flux.compute(inputs),
        (NodeKind::EnvelopeFollower, NodeState::Envelope(envelope)) => envelope.compute(inputs, frame),
        (NodeKind::AdaptiveNormalize, NodeState::Normalize(normalize)) => normalize.compute(inputs, frame),
        (NodeKind::HysteresisGate, NodeState::Gate(gate)) => gate.compute(inputs),
        (NodeKind::ThresholdCounter, NodeState::Counter(counter)) => counter.compute(inputs),
        (NodeKind::RateLimiter, NodeState::RateLimit(limiter)) => limiter.compute(inputs, frame),
        (NodeKind::SectionChangeDetector, NodeState::SectionChange(detector)) => detector.compute(inputs, frame),
        (NodeKind::PitchDetection, NodeState::Pitch(pitch)) => pitch.compute(inputs),
        (NodeKind::HarmonicPresence, NodeState::Harmonic(harmonic)) => harmonic.compute(inputs),
        (kind, _) => {
            tracing::warn!(%kind, "node state does not match its kind");
            PortValues::new()
        }
    }
}

fn analysis_input() -> PortSpec {
    PortSpec::input(fields::FREQUENCY_ANALYSIS, "Frequency Analysis", PortType::FrequencyAnalysis)
}

fn number_output(id: &str, label: &str) -> PortSpec {
    PortSpec::output(id, label, PortType::Number)
}

/// Build the registry of every builtin definition
pub fn create_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    let mut register = |kind: NodeKind, category: NodeCategory, description: &str, inputs: Vec<PortSpec>, outputs: Vec<PortSpec>| {
        registry.register(NodeDefinition {
            kind,
            label: kind.label().to_string(),
            category,
            description: description.to_string(),
            inputs,
            outputs,
        });
    };

    // ========================================================================
    // Input / Output
    // ========================================================================

    register(
        NodeKind::Input,
        NodeCategory::Input,
        "Audio samples, spectrum and time of the current frame",
        vec![],
        vec![
            PortSpec::output(fields::AUDIO_SIGNAL, "Audio Signal", PortType::ByteBuffer),
            PortSpec::output(fields::FREQUENCY_ANALYSIS, "Frequency Analysis", PortType::FrequencyAnalysis),
            number_output(fields::TIME, "Time"),
        ],
    );

    for port_type in NodeKind::OUTPUT_TYPES {
        register(
            NodeKind::Output(*port_type),
            NodeCategory::Output,
            "Value handed to the animated parameter",
            vec![PortSpec::input("value", "Value", *port_type)],
            vec![PortSpec::output("value", "Value", *port_type)],
        );
    }

    // ========================================================================
    // Math / Constants
    // ========================================================================

    register(
        NodeKind::Number,
        NodeCategory::Math,
        "Constant number",
        vec![PortSpec::number("value", "Value", 0.0)],
        vec![number_output("value", "Value")],
    );

    register(
        NodeKind::Text,
        NodeCategory::Math,
        "Constant text",
        vec![PortSpec::input("value", "Value", PortType::String).with_default(PortValue::from(""))],
        vec![PortSpec::output("value", "Value", PortType::String)],
    );

    register(
        NodeKind::Math,
        NodeCategory::Math,
        "Binary arithmetic",
        vec![
            PortSpec::number("a", "A", 0.0),
            PortSpec::number("b", "B", 0.0),
            PortSpec::input("operation", "Operation", PortType::MathOp)
                .with_default(PortValue::MathOp(MathOperation::Add)),
        ],
        vec![number_output("result", "Result")],
    );

    register(
        NodeKind::MapRange,
        NodeCategory::Math,
        "Linear remap from one range to another",
        vec![
            PortSpec::number("value", "Value", 0.0),
            PortSpec::number("inMin", "In Min", 0.0),
            PortSpec::number("inMax", "In Max", 1.0),
            PortSpec::number("outMin", "Out Min", 0.0),
            PortSpec::number("outMax", "Out Max", 1.0),
            PortSpec::input("clamp", "Clamp", PortType::Boolean).with_default(PortValue::Boolean(true)),
        ],
        vec![number_output("result", "Result")],
    );

    register(
        NodeKind::Compare,
        NodeCategory::Math,
        "True when the value reaches the threshold",
        vec![
            PortSpec::number("value", "Value", 0.0),
            PortSpec::number("threshold", "Threshold", 0.5),
        ],
        vec![PortSpec::output("result", "Result", PortType::Boolean)],
    );

    // ========================================================================
    // Utility
    // ========================================================================

    register(
        NodeKind::Oscillator,
        NodeCategory::Utility,
        "Periodic waveform in 0..1 (sine, square, triangle, saw)",
        vec![
            PortSpec::number(fields::TIME, "Time", 0.0),
            PortSpec::number("frequency", "Frequency", 1.0),
            PortSpec::input("waveform", "Waveform", PortType::String).with_default(PortValue::from("sine")),
            PortSpec::number("phase", "Phase", 0.0),
        ],
        vec![number_output("value", "Value")],
    );

    register(
        NodeKind::SelectMode,
        NodeCategory::Utility,
        "Pick an entry of a comma separated list by index",
        vec![
            PortSpec::number("index", "Index", 0.0),
            PortSpec::input("options", "Options", PortType::String).with_default(PortValue::from("a,b,c")),
        ],
        vec![
            PortSpec::output("value", "Value", PortType::String),
            number_output("count", "Count"),
        ],
    );

    register(
        NodeKind::HslColor,
        NodeCategory::Utility,
        "Color from hue (degrees), saturation and lightness",
        vec![
            PortSpec::number("hue", "Hue", 0.0),
            PortSpec::number("saturation", "Saturation", 1.0),
            PortSpec::number("lightness", "Lightness", 0.5),
        ],
        vec![PortSpec::output("color", "Color", PortType::Color)],
    );

    register(
        NodeKind::Vector3,
        NodeCategory::Utility,
        "Vector from components",
        vec![
            PortSpec::number("x", "X", 0.0),
            PortSpec::number("y", "Y", 0.0),
            PortSpec::number("z", "Z", 0.0),
        ],
        vec![PortSpec::output("vector", "Vector", PortType::Vector3)],
    );

    // ========================================================================
    // Analysis
    // ========================================================================

    register(
        NodeKind::AudioVolume,
        NodeCategory::Analysis,
        "RMS and peak level of the waveform",
        vec![PortSpec::input(fields::AUDIO_SIGNAL, "Audio Signal", PortType::ByteBuffer)],
        vec![number_output("rms", "RMS"), number_output("peak", "Peak")],
    );

    register(
        NodeKind::FrequencyBand,
        NodeCategory::Analysis,
        "Spectrum bins between two frequencies",
        vec![
            analysis_input(),
            PortSpec::number("minHz", "Min Hz", 20.0),
            PortSpec::number("maxHz", "Max Hz", 200.0),
        ],
        vec![PortSpec::output("band", "Band", PortType::ByteBuffer)],
    );

    register(
        NodeKind::BandInfo,
        NodeCategory::Analysis,
        "Average, max, min and RMS of a band",
        vec![PortSpec::input("band", "Band", PortType::ByteBuffer)],
        vec![
            number_output("average", "Average"),
            number_output("max", "Max"),
            number_output("min", "Min"),
            number_output("rms", "RMS"),
            PortSpec::output("info", "Info", PortType::Object),
        ],
    );

    register(
        NodeKind::MultiBandAnalysis,
        NodeCategory::Analysis,
        "Perceptually weighted bass, mid and high levels",
        vec![
            analysis_input(),
            PortSpec::number("bassMaxHz", "Bass Max Hz", 250.0),
            PortSpec::number("midMaxHz", "Mid Max Hz", 4000.0),
        ],
        vec![
            number_output("bass", "Bass"),
            number_output("mid", "Mid"),
            number_output("high", "High"),
            number_output("bassPercent", "Bass %"),
            number_output("midPercent", "Mid %"),
            number_output("highPercent", "High %"),
        ],
    );

    register(
        NodeKind::SpectralFeatures,
        NodeCategory::Analysis,
        "Spectral centroid, flatness and rolloff",
        vec![analysis_input()],
        vec![
            number_output("centroid", "Centroid"),
            number_output("flatness", "Flatness"),
            number_output("rolloff", "Rolloff"),
        ],
    );

    register(
        NodeKind::SpectralFlux,
        NodeCategory::Analysis,
        "Smoothed rise in spectral energy between frames",
        vec![analysis_input(), PortSpec::number("smoothing", "Smoothing", 0.5)],
        vec![number_output("flux", "Flux")],
    );

    // ========================================================================
    // Dynamics
    // ========================================================================

    register(
        NodeKind::Smooth,
        NodeCategory::Dynamics,
        "Exponential smoothing",
        vec![
            PortSpec::number("value", "Value", 0.0),
            PortSpec::number("smoothing", "Smoothing", 0.8),
        ],
        vec![number_output("value", "Value")],
    );

    register(
        NodeKind::EnvelopeFollower,
        NodeCategory::Dynamics,
        "Attack/release envelope of the rectified input",
        vec![
            PortSpec::number("value", "Value", 0.0),
            PortSpec::number("attackMs", "Attack (ms)", 10.0),
            PortSpec::number("releaseMs", "Release (ms)", 200.0),
        ],
        vec![number_output("envelope", "Envelope")],
    );

    register(
        NodeKind::AdaptiveNormalize,
        NodeCategory::Dynamics,
        "Normalise against windowed quantiles",
        vec![
            PortSpec::number("value", "Value", 0.0),
            PortSpec::number("windowMs", "Window (ms)", 4000.0),
            PortSpec::number("qLow", "Low Quantile", 0.05),
            PortSpec::number("qHigh", "High Quantile", 0.95),
            PortSpec::number("freezeBelow", "Freeze Below", 0.0),
        ],
        vec![
            number_output("result", "Result"),
            number_output("low", "Low"),
            number_output("high", "High"),
        ],
    );

    // ========================================================================
    // Triggers
    // ========================================================================

    register(
        NodeKind::HysteresisGate,
        NodeCategory::Trigger,
        "Opens at the high threshold, closes below the low one",
        vec![
            PortSpec::number("value", "Value", 0.0),
            PortSpec::number("low", "Low", 0.3),
            PortSpec::number("high", "High", 0.6),
        ],
        vec![number_output("value", "Value"), number_output("state", "State")],
    );

    register(
        NodeKind::ThresholdCounter,
        NodeCategory::Trigger,
        "Cycles through modes on each rising edge",
        vec![
            PortSpec::number("value", "Value", 0.0),
            PortSpec::number("threshold", "Threshold", 0.5),
            PortSpec::number("maxValue", "Max Value", 4.0),
        ],
        vec![number_output("count", "Count")],
    );

    register(
        NodeKind::RateLimiter,
        NodeCategory::Trigger,
        "Holds each accepted value for a minimum interval",
        vec![
            PortSpec::number("value", "Value", 0.0),
            PortSpec::number("minIntervalMs", "Min Interval (ms)", 250.0),
        ],
        vec![number_output("value", "Value")],
    );

    register(
        NodeKind::SectionChangeDetector,
        NodeCategory::Trigger,
        "Fires on large jumps, then holds and cools down",
        vec![
            PortSpec::number("value", "Value", 0.0),
            PortSpec::number("threshold", "Threshold", 0.2),
            PortSpec::number("holdMs", "Hold (ms)", 200.0),
            PortSpec::number("cooldownMs", "Cooldown (ms)", 2000.0),
        ],
        vec![number_output("trigger", "Trigger"), number_output("change", "Change")],
    );

    // ========================================================================
    // Pitch
    // ========================================================================

    register(
        NodeKind::PitchDetection,
        NodeCategory::Pitch,
        "YIN fundamental frequency of the waveform",
        vec![
            PortSpec::input(fields::AUDIO_SIGNAL, "Audio Signal", PortType::ByteBuffer),
            analysis_input(),
            PortSpec::number("minHz", "Min Hz", 60.0),
            PortSpec::number("maxHz", "Max Hz", 1000.0),
            PortSpec::number("threshold", "Threshold", 0.15),
            PortSpec::number("smoothing", "Smoothing", 0.5),
        ],
        vec![
            number_output("frequency", "Frequency"),
            number_output("midi", "MIDI"),
            PortSpec::output("note", "Note", PortType::String),
            number_output("cents", "Cents"),
            number_output("confidence", "Confidence"),
        ],
    );

    register(
        NodeKind::HarmonicPresence,
        NodeCategory::Pitch,
        "How strongly the spectrum forms a harmonic series",
        vec![
            analysis_input(),
            PortSpec::number("minHz", "Min Hz", 60.0),
            PortSpec::number("maxHz", "Max Hz", 2000.0),
            PortSpec::number("harmonics", "Harmonics", 5.0),
            PortSpec::number("toleranceCents", "Tolerance (cents)", 50.0),
            PortSpec::number("smoothing", "Smoothing", 0.6),
        ],
        vec![
            number_output("presence", "Presence"),
            number_output("fundamental", "Fundamental"),
            number_output("confidence", "Confidence"),
        ],
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_clock() {
        let mut clock = FrameClock::default();
        assert_eq!(clock.tick(1.0), 0.0);
        assert!((clock.tick(1.5) - 0.5).abs() < 1e-12);
        assert_eq!(clock.tick(0.2), 0.0);
        assert_eq!(clock.previous(), Some(0.2));
    }

    #[test]
    fn test_mismatched_state_is_replaced() {
        let mut state = NodeState::for_kind(NodeKind::HysteresisGate);
        let inputs = PortValues::new().with("value", 1.0).with("smoothing", 0.5);
        let frame = FrameContext::silent(44_100, 64, 0.0);

        let outputs = compute(NodeKind::Smooth, &inputs, &frame, &mut state);
        assert!(matches!(state, NodeState::Smooth(_)));
        assert_eq!(outputs.number("value"), 1.0);
    }

    #[test]
    fn test_stateless_kinds_keep_empty_state() {
        let mut state = NodeState::default();
        let inputs = PortValues::new().with("x", 1.0).with("y", 2.0).with("z", 3.0);
        let frame = FrameContext::silent(44_100, 64, 0.0);

        let outputs = compute(NodeKind::Vector3, &inputs, &frame, &mut state);
        assert_eq!(outputs.get("vector"), Some(&PortValue::Vector3([1.0, 2.0, 3.0])));
        assert!(matches!(state, NodeState::Empty));
    }

    #[test]
    fn test_stateful_kinds_have_state() {
        for kind in NodeKind::BUILTIN {
            let state = NodeState::for_kind(*kind);
            assert_eq!(kind.is_stateful(), !matches!(state, NodeState::Empty), "{kind}");
        }
    }

    #[test]
    fn test_registry_defaults() {
        let registry = create_registry();
        let envelope = registry.definition(&NodeKind::EnvelopeFollower).unwrap();
        assert_eq!(
            envelope.input("releaseMs").unwrap().fallback_value(),
            PortValue::Number(200.0)
        );
        let band = registry.definition(&NodeKind::FrequencyBand).unwrap();
        assert!(band.input(fields::FREQUENCY_ANALYSIS).unwrap().default_value.is_none());
    }
}
