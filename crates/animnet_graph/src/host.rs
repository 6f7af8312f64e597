// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-parameter network ownership and frame-by-frame evaluation.

use crate::document::DocumentError;
use crate::evaluation::evaluate;
use crate::frame::FrameContext;
use crate::network::Network;
use crate::port::{PortType, PortValue};
use crate::presets::Preset;
use indexmap::IndexMap;

/// New value for an animated parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterUpdate {
    /// Parameter the network drives
    pub parameter: String,
    /// Value computed this frame
    pub value: PortValue,
}

/// Owns one network per animated parameter
#[derive(Debug, Default)]
pub struct NetworkHost {
    networks: IndexMap<String, Network>,
}

impl NetworkHost {
    /// Create an empty host
    pub fn new() -> Self {
        Self::default()
    }

    /// Start animating a parameter
    ///
    /// Creates a bare `Input`/`Output` pair, or the given preset, unless the
    /// parameter is already animated, in which case its network is kept.
    pub fn animate(
        &mut self,
        parameter: impl Into<String>,
        output_type: PortType,
        preset: Option<Preset>,
    ) -> Result<&mut Network, HostError> {
        let parameter = parameter.into();
        if !self.networks.contains_key(&parameter) {
            let network = match preset {
                Some(preset) if preset.output_type() != output_type => {
                    return Err(HostError::PresetTypeMismatch {
                        preset: preset.name(),
                        expected: output_type,
                        actual: preset.output_type(),
                    });
                }
                Some(preset) => preset.build()?,
                None => Network::new(output_type),
            };
            tracing::debug!(%parameter, network = %network.id, "animate parameter");
            self.networks.insert(parameter.clone(), network);
        }

        self.networks
            .get_mut(&parameter)
            .ok_or(HostError::NotAnimated(parameter))
    }

    /// Add or replace the network driving a parameter
    pub fn insert(&mut self, parameter: impl Into<String>, network: Network) -> Option<Network> {
        self.networks.insert(parameter.into(), network)
    }

    /// Stop animating a parameter, discarding its network
    pub fn stop_animating(&mut self, parameter: &str) -> Option<Network> {
        let removed = self.networks.shift_remove(parameter);
        if removed.is_some() {
            tracing::debug!(%parameter, "stop animating parameter");
        }
        removed
    }

    /// Network driving a parameter
    pub fn network(&self, parameter: &str) -> Option<&Network> {
        self.networks.get(parameter)
    }

    /// Mutable network driving a parameter
    pub fn network_mut(&mut self, parameter: &str) -> Option<&mut Network> {
        self.networks.get_mut(parameter)
    }

    /// Animated parameter names
    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }

    /// Number of animated parameters
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    /// Whether nothing is animated
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    /// Evaluate every enabled network for one frame
    ///
    /// Networks that fail to evaluate are logged and left out.
    pub fn evaluate_frame(&mut self, frame: &FrameContext) -> Vec<ParameterUpdate> {
        let mut updates = Vec::with_capacity(self.networks.len());
        for (parameter, network) in &mut self.networks {
            if !network.is_enabled() {
                continue;
            }
            match evaluate(network, frame) {
                Ok(value) => updates.push(ParameterUpdate {
                    parameter: parameter.clone(),
                    value,
                }),
                Err(error) => {
                    tracing::warn!(%parameter, network = %network.id, %error, "network evaluation failed");
                }
            }
        }
        updates
    }
}

/// Error when setting up an animated parameter
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The preset produces a different type than the parameter takes
    #[error("Preset '{preset}' produces {} but the parameter takes {}", .actual.display_name(), .expected.display_name())]
    PresetTypeMismatch {
        /// Preset name
        preset: &'static str,
        /// Parameter type
        expected: PortType,
        /// Preset output type
        actual: PortType,
    },

    /// The preset failed to build
    #[error("Preset failed to build: {0}")]
    Preset(#[from] DocumentError),

    /// The parameter has no network
    #[error("Parameter is not animated: {0}")]
    NotAnimated(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeInstance, NodeKind};

    fn frame() -> FrameContext {
        FrameContext::silent(44_100, 2048, 0.0)
    }

    #[test]
    fn test_animate_and_evaluate() {
        let mut host = NetworkHost::new();
        host.animate("intensity", PortType::Number, None).unwrap();
        host.animate("mode", PortType::String, Some(Preset::BeatCounter)).unwrap();

        let updates = host.evaluate_frame(&frame());
        assert_eq!(
            updates,
            vec![
                ParameterUpdate {
                    parameter: "intensity".to_string(),
                    value: PortValue::Number(0.0),
                },
                ParameterUpdate {
                    parameter: "mode".to_string(),
                    value: PortValue::String("wave".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_animate_keeps_existing_network() {
        let mut host = NetworkHost::new();
        let id = host.animate("intensity", PortType::Number, None).unwrap().id.clone();
        let again = host.animate("intensity", PortType::Number, None).unwrap().id.clone();
        assert_eq!(id, again);
        assert_eq!(host.len(), 1);
    }

    #[test]
    fn test_preset_type_must_match() {
        let mut host = NetworkHost::new();
        let result = host.animate("color", PortType::Color, Some(Preset::BassPulse));
        assert!(matches!(result, Err(HostError::PresetTypeMismatch { .. })));
        assert!(host.is_empty());
    }

    #[test]
    fn test_disabled_and_broken_networks_are_skipped() {
        let mut host = NetworkHost::new();
        host.animate("a", PortType::Number, None).unwrap().set_enabled(false);

        let mut broken = Network::empty("broken");
        broken.add_node(NodeInstance::new(NodeKind::Input)).unwrap();
        host.insert("b", broken);
        host.animate("c", PortType::Boolean, None).unwrap();

        let updates = host.evaluate_frame(&frame());
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].parameter, "c");
        assert_eq!(updates[0].value, PortValue::Boolean(false));
    }

    #[test]
    fn test_stop_animating() {
        let mut host = NetworkHost::new();
        host.animate("intensity", PortType::Number, None).unwrap();
        assert!(host.stop_animating("intensity").is_some());
        assert!(host.stop_animating("intensity").is_none());
        assert!(host.network_mut("intensity").is_none());
    }
}
