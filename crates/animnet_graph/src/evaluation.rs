// SPDX-License-Identifier: MIT OR Apache-2.0
//! Network evaluation.
//!
//! Evaluation starts at the `Output` node and resolves inputs recursively.
//! Each node is computed at most once per call; the cache is dropped when the
//! call returns so stateful nodes advance exactly once per frame. Nodes the
//! output does not depend on are never computed.

use crate::frame::{fields, FrameContext};
use crate::library;
use crate::network::Network;
use crate::node::{NodeId, NodeInstance};
use crate::port::{PortSpec, PortValue, PortValues};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Counters collected during one evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationStats {
    /// Number of compute calls made
    pub nodes_computed: usize,
}

/// Evaluate a network for one frame, returning the output node's value
pub fn evaluate(network: &mut Network, frame: &FrameContext) -> Result<PortValue, EvaluationError> {
    evaluate_with_stats(network, frame).map(|(value, _)| value)
}

/// Evaluate a network and report how much work was done
pub fn evaluate_with_stats(
    network: &mut Network,
    frame: &FrameContext,
) -> Result<(PortValue, EvaluationStats), EvaluationError> {
    if !network.is_enabled {
        return Err(EvaluationError::NetworkDisabled);
    }

    let Network { id, nodes, edges, .. } = network;
    let (output_index, output_type) = nodes
        .values()
        .enumerate()
        .find_map(|(index, node)| node.kind.output_type().map(|port_type| (index, port_type)))
        .ok_or(EvaluationError::OutputNodeMissing)?;

    let mut incoming: Vec<HashMap<&str, (usize, Option<&str>)>> = vec![HashMap::new(); nodes.len()];
    for edge in edges.iter() {
        match (nodes.get_index_of(&edge.source), nodes.get_index_of(&edge.target)) {
            (Some(source), Some(target)) => {
                incoming[target].insert(edge.target_input.as_str(), (source, edge.source_output.as_deref()));
            }
            _ => tracing::warn!(network = %id, ?edge, "edge references a missing node"),
        }
    }

    let node_count = nodes.len();
    let mut context = EvaluationContext {
        nodes,
        incoming,
        frame,
        computed: vec![None; node_count],
        on_stack: vec![false; node_count],
        stats: EvaluationStats::default(),
    };
    context.resolve(output_index)?;

    let value = context.computed[output_index]
        .as_ref()
        .and_then(|outputs| outputs.get("value"))
        .cloned()
        .unwrap_or_else(|| output_type.zero_value())
        .coerce_to(output_type);
    let stats = context.stats;

    tracing::trace!(network = %id, nodes_computed = stats.nodes_computed, %value, "evaluated");
    Ok((value, stats))
}

/// Per-call resolution state
struct EvaluationContext<'a> {
    nodes: &'a mut IndexMap<NodeId, NodeInstance>,
    /// Per node: target input id → (source index, source output id)
    incoming: Vec<HashMap<&'a str, (usize, Option<&'a str>)>>,
    frame: &'a FrameContext,
    computed: Vec<Option<PortValues>>,
    on_stack: Vec<bool>,
    stats: EvaluationStats,
}

impl EvaluationContext<'_> {
    fn resolve(&mut self, index: usize) -> Result<(), EvaluationError> {
        if self.computed[index].is_some() {
            return Ok(());
        }
        let Some((node_id, node)) = self.nodes.get_index(index) else {
            return Err(EvaluationError::OutputNodeMissing);
        };
        if self.on_stack[index] {
            return Err(EvaluationError::CycleDetected(node_id.clone()));
        }
        self.on_stack[index] = true;

        let kind = node.kind;
        let mut inputs = PortValues::new();
        if let Some(definition) = kind.definition() {
            for port in &definition.inputs {
                let edge = self.incoming[index].get(port.id.as_str()).copied();
                let value = match edge {
                    Some((source, handle)) => {
                        self.resolve(source)?;
                        let record = self.computed[source].as_ref();
                        let connected = match handle {
                            Some(handle) => record.and_then(|outputs| outputs.get(handle)),
                            None => record.and_then(PortValues::first),
                        };
                        connected
                            .cloned()
                            .unwrap_or_else(|| self.unconnected_value(index, port))
                    }
                    None => self.unconnected_value(index, port),
                };
                inputs.set(port.id.clone(), value.coerce_to(port.port_type));
            }
        }

        let outputs = match self.nodes.get_index_mut(index) {
            Some((_, node)) => library::compute(kind, &inputs, self.frame, &mut node.state),
            None => PortValues::new(),
        };
        self.stats.nodes_computed += 1;
        self.on_stack[index] = false;
        self.computed[index] = Some(outputs);
        Ok(())
    }

    /// Override, then frame field, then port default, then the type's zero
    fn unconnected_value(&self, index: usize, port: &PortSpec) -> PortValue {
        if let Some(value) = self
            .nodes
            .get_index(index)
            .and_then(|(_, node)| node.input_overrides.get(&port.id))
        {
            return value.clone();
        }

        match port.id.as_str() {
            fields::AUDIO_SIGNAL => PortValue::ByteBuffer(self.frame.audio_signal.clone()),
            fields::FREQUENCY_ANALYSIS => PortValue::FrequencyAnalysis(self.frame.frequency_analysis.clone()),
            fields::TIME => PortValue::Number(self.frame.time),
            _ => port.fallback_value(),
        }
    }
}

/// Error during evaluation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    /// The network is switched off
    #[error("Network is disabled")]
    NetworkDisabled,

    /// No node declares the network's output
    #[error("Network has no output node")]
    OutputNodeMissing,

    /// Resolution reached a node that is still being resolved
    #[error("Network contains a cycle through node {0}")]
    CycleDetected(NodeId),
}
