// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ready-made networks offered when a parameter is first animated.

use crate::document::{DocumentResult, EdgeDocument, NetworkDocument, NodeDocument};
use crate::network::Network;
use crate::node::{NodeId, NodeKind};
use crate::port::{MathOperation, PortType, PortValue};
use indexmap::IndexMap;

/// Builtin preset networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// Enveloped, normalised low-band energy
    BassPulse,
    /// Steps through modes on spectral onsets
    BeatCounter,
    /// Maps the detected pitch class onto the hue wheel
    PitchColor,
    /// True on strong onsets
    OnsetFlash,
    /// Pulses when the bass share of the mix jumps
    SectionStrobe,
    /// How tonal the current sound is
    HarmonicGlow,
}

impl Preset {
    /// Get all presets
    pub fn all() -> &'static [Preset] {
        &[
            Self::BassPulse,
            Self::BeatCounter,
            Self::PitchColor,
            Self::OnsetFlash,
            Self::SectionStrobe,
            Self::HarmonicGlow,
        ]
    }

    /// Identifier used on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Self::BassPulse => "bass-pulse",
            Self::BeatCounter => "beat-counter",
            Self::PitchColor => "pitch-color",
            Self::OnsetFlash => "onset-flash",
            Self::SectionStrobe => "section-strobe",
            Self::HarmonicGlow => "harmonic-glow",
        }
    }

    /// Look a preset up by name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|preset| preset.name() == name)
    }

    /// One-line summary
    pub fn description(&self) -> &'static str {
        match self {
            Self::BassPulse => "20-150 Hz energy, enveloped and normalised to 0..1",
            Self::BeatCounter => "cycles wave/pulse/scan on each onset",
            Self::PitchColor => "pitch class of the detected note as a hue",
            Self::OnsetFlash => "true while spectral flux is in its top range",
            Self::SectionStrobe => "1 for a moment when the bass share jumps",
            Self::HarmonicGlow => "smoothed harmonic presence",
        }
    }

    /// Type of the value the preset produces
    pub fn output_type(&self) -> PortType {
        match self {
            Self::BassPulse | Self::SectionStrobe | Self::HarmonicGlow => PortType::Number,
            Self::BeatCounter => PortType::String,
            Self::PitchColor => PortType::Color,
            Self::OnsetFlash => PortType::Boolean,
        }
    }

    /// The preset's persisted shape
    pub fn document(&self) -> NetworkDocument {
        let mut builder = PresetBuilder::new(self.output_type());
        match self {
            Self::BassPulse => {
                builder
                    .node("band", NodeKind::FrequencyBand, &[("minHz", PortValue::Number(20.0)), ("maxHz", PortValue::Number(150.0))])
                    .node("info", NodeKind::BandInfo, &[])
                    .node(
                        "envelope",
                        NodeKind::EnvelopeFollower,
                        &[("attackMs", PortValue::Number(5.0)), ("releaseMs", PortValue::Number(150.0))],
                    )
                    .node("normalize", NodeKind::AdaptiveNormalize, &[("freezeBelow", PortValue::Number(0.01))])
                    .edge("input", Some("frequencyAnalysis"), "band", "frequencyAnalysis")
                    .edge("band", Some("band"), "info", "band")
                    .edge("info", Some("average"), "envelope", "value")
                    .edge("envelope", Some("envelope"), "normalize", "value")
                    .edge("normalize", Some("result"), "output", "value");
            }
            Self::BeatCounter => {
                builder
                    .node("flux", NodeKind::SpectralFlux, &[])
                    .node("normalize", NodeKind::AdaptiveNormalize, &[])
                    .node("gate", NodeKind::HysteresisGate, &[])
                    .node("counter", NodeKind::ThresholdCounter, &[("maxValue", PortValue::Number(3.0))])
                    .node("mode", NodeKind::SelectMode, &[("options", PortValue::from("wave,pulse,scan"))])
                    .edge("input", Some("frequencyAnalysis"), "flux", "frequencyAnalysis")
                    .edge("flux", Some("flux"), "normalize", "value")
                    .edge("normalize", Some("result"), "gate", "value")
                    .edge("gate", Some("state"), "counter", "value")
                    .edge("counter", Some("count"), "mode", "index")
                    .edge("mode", Some("value"), "output", "value");
            }
            Self::PitchColor => {
                builder
                    .node("pitch", NodeKind::PitchDetection, &[])
                    .node(
                        "pitch_class",
                        NodeKind::Math,
                        &[("b", PortValue::Number(12.0)), ("operation", PortValue::MathOp(MathOperation::Modulo))],
                    )
                    .node(
                        "hue",
                        NodeKind::MapRange,
                        &[("inMax", PortValue::Number(12.0)), ("outMax", PortValue::Number(360.0))],
                    )
                    .node("color", NodeKind::HslColor, &[])
                    .edge("input", Some("audioSignal"), "pitch", "audioSignal")
                    .edge("input", Some("frequencyAnalysis"), "pitch", "frequencyAnalysis")
                    .edge("pitch", Some("midi"), "pitch_class", "a")
                    .edge("pitch_class", Some("result"), "hue", "value")
                    .edge("hue", Some("result"), "color", "hue")
                    .edge("color", Some("color"), "output", "value");
            }
            Self::OnsetFlash => {
                builder
                    .node("flux", NodeKind::SpectralFlux, &[("smoothing", PortValue::Number(0.2))])
                    .node("normalize", NodeKind::AdaptiveNormalize, &[("windowMs", PortValue::Number(2000.0))])
                    .node("compare", NodeKind::Compare, &[("threshold", PortValue::Number(0.7))])
                    .edge("input", Some("frequencyAnalysis"), "flux", "frequencyAnalysis")
                    .edge("flux", Some("flux"), "normalize", "value")
                    .edge("normalize", Some("result"), "compare", "value")
                    .edge("compare", Some("result"), "output", "value");
            }
            Self::SectionStrobe => {
                builder
                    .node("bands", NodeKind::MultiBandAnalysis, &[])
                    .node("smooth", NodeKind::Smooth, &[("smoothing", PortValue::Number(0.9))])
                    .node(
                        "section",
                        NodeKind::SectionChangeDetector,
                        &[("threshold", PortValue::Number(10.0)), ("holdMs", PortValue::Number(150.0))],
                    )
                    .edge("input", Some("frequencyAnalysis"), "bands", "frequencyAnalysis")
                    .edge("bands", Some("bassPercent"), "smooth", "value")
                    .edge("smooth", Some("value"), "section", "value")
                    .edge("section", Some("trigger"), "output", "value");
            }
            Self::HarmonicGlow => {
                builder
                    .node("harmonic", NodeKind::HarmonicPresence, &[])
                    .node("range", NodeKind::MapRange, &[("inMax", PortValue::Number(0.6))])
                    .edge("input", Some("frequencyAnalysis"), "harmonic", "frequencyAnalysis")
                    .edge("harmonic", Some("presence"), "range", "value")
                    .edge("range", Some("result"), "output", "value");
            }
        }
        builder.finish()
    }

    /// Build a fresh network from the preset
    pub fn build(&self) -> DocumentResult<Network> {
        self.document().into_network()
    }
}

/// Assembles a preset document around an `input` and an `output` node
struct PresetBuilder {
    document: NetworkDocument,
}

impl PresetBuilder {
    fn new(output_type: PortType) -> Self {
        let mut builder = Self {
            document: NetworkDocument {
                id: None,
                nodes: Vec::new(),
                edges: Vec::new(),
                is_enabled: true,
            },
        };
        builder.node("input", NodeKind::Input, &[]);
        builder.node("output", NodeKind::Output(output_type), &[]);
        builder
    }

    fn node(&mut self, id: &str, kind: NodeKind, overrides: &[(&str, PortValue)]) -> &mut Self {
        self.document.nodes.push(NodeDocument {
            id: NodeId::from(id),
            definition_label: kind.label().to_string(),
            input_overrides: overrides
                .iter()
                .map(|(port, value)| ((*port).to_string(), value.clone()))
                .collect::<IndexMap<_, _>>(),
            output_type: kind.output_type(),
        });
        self
    }

    fn edge(&mut self, source: &str, handle: Option<&str>, target: &str, input: &str) -> &mut Self {
        self.document.edges.push(EdgeDocument {
            source: NodeId::from(source),
            source_handle: handle.map(str::to_string),
            target: NodeId::from(target),
            target_handle: input.to_string(),
        });
        self
    }

    fn finish(self) -> NetworkDocument {
        self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::evaluate;
    use crate::frame::FrameContext;

    #[test]
    fn test_every_preset_builds_and_evaluates() {
        let frame = FrameContext::silent(44_100, 2048, 0.0);
        for preset in Preset::all() {
            let mut network = preset.build().unwrap();
            assert_eq!(network.output_type(), Some(preset.output_type()), "{}", preset.name());
            let value = evaluate(&mut network, &frame).unwrap();
            assert_eq!(value.port_type(), preset.output_type(), "{}", preset.name());
        }
    }

    #[test]
    fn test_names_round_trip() {
        for preset in Preset::all() {
            assert_eq!(Preset::from_name(preset.name()), Some(*preset));
        }
        assert_eq!(Preset::from_name("disco"), None);
    }

    #[test]
    fn test_beat_counter_starts_on_first_mode() {
        let mut network = Preset::BeatCounter.build().unwrap();
        let frame = FrameContext::silent(44_100, 2048, 0.0);
        assert_eq!(evaluate(&mut network, &frame), Ok(PortValue::String("wave".to_string())));
    }

    #[test]
    fn test_pitch_color_of_silence() {
        let mut network = Preset::PitchColor.build().unwrap();
        let frame = FrameContext::silent(44_100, 2048, 0.0);
        // No pitch yet: midi 0 maps to hue 0.
        assert_eq!(evaluate(&mut network, &frame), Ok(PortValue::Color("#ff0000".to_string())));
    }
}
