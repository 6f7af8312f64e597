// SPDX-License-Identifier: MIT OR Apache-2.0
//! Network data structure: node instances and the edges between their ports.

use crate::node::{NodeId, NodeInstance, NodeKind};
use crate::port::{types_compatible, PortType, PortValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// An edge from a node output to a node input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node ID
    pub source: NodeId,
    /// Source output port; `None` reads the source's first output
    pub source_output: Option<String>,
    /// Target node ID
    pub target: NodeId,
    /// Target input port
    pub target_input: String,
}

impl Edge {
    /// Create a new edge
    pub fn new(
        source: NodeId,
        source_output: Option<String>,
        target: NodeId,
        target_input: impl Into<String>,
    ) -> Self {
        Self {
            source,
            source_output,
            target,
            target_input: target_input.into(),
        }
    }

    /// Check if this edge involves a specific node
    pub fn involves_node(&self, node_id: &NodeId) -> bool {
        &self.source == node_id || &self.target == node_id
    }
}

/// An independently evaluated dataflow graph driving one parameter
#[derive(Debug, Clone)]
pub struct Network {
    /// Network ID
    pub id: String,
    pub(crate) is_enabled: bool,
    /// Node arena; a node's position is its index for evaluation
    pub(crate) nodes: IndexMap<NodeId, NodeInstance>,
    pub(crate) edges: Vec<Edge>,
}

impl Network {
    /// Create a bare `Input` → `Output` pair with the given output type
    ///
    /// The two nodes are not connected; the output yields its type's zero
    /// value until something feeds it.
    pub fn new(output_type: PortType) -> Self {
        let mut network = Self::empty(Uuid::new_v4().to_string());
        for node in [
            NodeInstance::new(NodeKind::Input),
            NodeInstance::new(NodeKind::Output(output_type)),
        ] {
            network.nodes.insert(node.id.clone(), node);
        }
        network
    }

    /// Create a network with no nodes
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_enabled: true,
            nodes: IndexMap::new(),
            edges: Vec::new(),
        }
    }

    /// Whether the network takes part in evaluation
    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    /// Enable or disable evaluation
    pub fn set_enabled(&mut self, enabled: bool) {
        self.is_enabled = enabled;
    }

    /// Add a node
    pub fn add_node(&mut self, node: NodeInstance) -> Result<NodeId, NetworkError> {
        if self.nodes.contains_key(&node.id) {
            return Err(NetworkError::DuplicateNode(node.id));
        }
        if node.kind.output_type().is_some() && self.output_node().is_some() {
            return Err(NetworkError::OutputAlreadyPresent);
        }

        tracing::debug!(network = %self.id, node = %node.id, kind = %node.kind, "add node");
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// Remove a node and every edge touching it
    pub fn remove_node(&mut self, node_id: &NodeId) -> Result<NodeInstance, NetworkError> {
        let node = self
            .nodes
            .get(node_id)
            .ok_or_else(|| NetworkError::NodeNotFound(node_id.clone()))?;
        if node.kind.output_type().is_some() {
            return Err(NetworkError::CannotRemoveOutput);
        }

        self.edges.retain(|edge| !edge.involves_node(node_id));
        let node = self
            .nodes
            .shift_remove(node_id)
            .ok_or_else(|| NetworkError::NodeNotFound(node_id.clone()))?;
        tracing::debug!(network = %self.id, node = %node_id, "remove node");
        Ok(node)
    }

    /// Get a node by ID
    pub fn node(&self, node_id: &NodeId) -> Option<&NodeInstance> {
        self.nodes.get(node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: &NodeId) -> Option<&mut NodeInstance> {
        self.nodes.get_mut(node_id)
    }

    /// Get all nodes in arena order
    pub fn nodes(&self) -> impl Iterator<Item = &NodeInstance> {
        self.nodes.values()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Position of a node in the arena
    pub fn node_index(&self, node_id: &NodeId) -> Option<usize> {
        self.nodes.get_index_of(node_id)
    }

    /// The frame context source, if present
    pub fn input_node(&self) -> Option<&NodeInstance> {
        self.nodes.values().find(|node| node.kind.is_input())
    }

    /// The sink node, if present
    pub fn output_node(&self) -> Option<&NodeInstance> {
        self.nodes.values().find(|node| node.kind.output_type().is_some())
    }

    /// Type declared by the sink node
    pub fn output_type(&self) -> Option<PortType> {
        self.output_node().and_then(|node| node.kind.output_type())
    }

    /// Set the literal used for an unconnected input, coerced to the port type
    pub fn set_input_override(
        &mut self,
        node_id: &NodeId,
        port_id: &str,
        value: impl Into<PortValue>,
    ) -> Result<(), NetworkError> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| NetworkError::NodeNotFound(node_id.clone()))?;
        let Some(port) = node.definition().and_then(|d| d.input(port_id)) else {
            return Err(NetworkError::UnknownInput {
                node: node_id.clone(),
                port: port_id.to_string(),
            });
        };
        node.input_overrides
            .insert(port_id.to_string(), value.into().coerce_to(port.port_type));
        Ok(())
    }

    /// Remove an input override, returning it
    pub fn clear_input_override(&mut self, node_id: &NodeId, port_id: &str) -> Option<PortValue> {
        self.nodes
            .get_mut(node_id)
            .and_then(|node| node.input_overrides.shift_remove(port_id))
    }

    /// Add an edge between ports
    ///
    /// `source_output` of `None` connects the source's first output.
    pub fn connect(
        &mut self,
        source: &NodeId,
        source_output: Option<&str>,
        target: &NodeId,
        target_input: &str,
    ) -> Result<(), ConnectionError> {
        // Validate nodes exist
        let source_node = self
            .nodes
            .get(source)
            .ok_or_else(|| ConnectionError::NodeNotFound(source.clone()))?;
        let target_node = self
            .nodes
            .get(target)
            .ok_or_else(|| ConnectionError::NodeNotFound(target.clone()))?;

        // Validate ports exist
        let source_definition = source_node
            .definition()
            .ok_or_else(|| ConnectionError::NodeNotFound(source.clone()))?;
        let target_definition = target_node
            .definition()
            .ok_or_else(|| ConnectionError::NodeNotFound(target.clone()))?;
        let source_port = match source_output {
            Some(port_id) => source_definition.output(port_id),
            None => source_definition.primary_output(),
        }
        .ok_or_else(|| ConnectionError::PortNotFound {
            node: source.clone(),
            port: source_output.unwrap_or_default().to_string(),
        })?;
        let target_port = target_definition
            .input(target_input)
            .ok_or_else(|| ConnectionError::PortNotFound {
                node: target.clone(),
                port: target_input.to_string(),
            })?;

        if !types_compatible(source_port.port_type, target_port.port_type) {
            return Err(ConnectionError::IncompatiblePorts {
                output: source_port.port_type,
                input: target_port.port_type,
            });
        }

        if self.incoming(target, target_input).is_some() {
            return Err(ConnectionError::PortAlreadyConnected(target_input.to_string()));
        }

        if source == target {
            return Err(ConnectionError::SelfLoop);
        }

        if self.reaches(target, source) {
            return Err(ConnectionError::WouldCreateCycle);
        }

        tracing::debug!(
            network = %self.id,
            %source,
            output = source_output.unwrap_or("<first>"),
            %target,
            input = target_input,
            "connect"
        );
        self.edges.push(Edge::new(
            source.clone(),
            source_output.map(str::to_string),
            target.clone(),
            target_input,
        ));
        Ok(())
    }

    /// Remove the edge feeding an input
    pub fn disconnect(&mut self, target: &NodeId, target_input: &str) -> Option<Edge> {
        let position = self
            .edges
            .iter()
            .position(|edge| &edge.target == target && edge.target_input == target_input)?;
        Some(self.edges.remove(position))
    }

    /// The edge feeding an input, if any
    pub fn incoming(&self, target: &NodeId, target_input: &str) -> Option<&Edge> {
        self.edges
            .iter()
            .find(|edge| &edge.target == target && edge.target_input == target_input)
    }

    /// Get all edges
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Get the number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Whether `to` is reachable from `from` by following edges downstream
    fn reaches(&self, from: &NodeId, to: &NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            stack.extend(
                self.edges
                    .iter()
                    .filter(|edge| &edge.source == current)
                    .map(|edge| &edge.target),
            );
        }
        false
    }

    /// Get nodes in dependency order (sources before their consumers)
    pub fn topological_order(&self) -> Result<Vec<NodeId>, CycleError> {
        let mut visited = HashSet::new();
        let mut temp_mark = HashSet::new();
        let mut order = Vec::new();

        for node_id in self.nodes.keys() {
            if !visited.contains(node_id) {
                self.visit(node_id, &mut visited, &mut temp_mark, &mut order)?;
            }
        }

        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        node_id: &'a NodeId,
        visited: &mut HashSet<&'a NodeId>,
        temp_mark: &mut HashSet<&'a NodeId>,
        order: &mut Vec<NodeId>,
    ) -> Result<(), CycleError> {
        if temp_mark.contains(node_id) {
            return Err(CycleError(node_id.clone()));
        }
        if visited.contains(node_id) {
            return Ok(());
        }

        temp_mark.insert(node_id);

        // Visit all nodes that this node depends on
        for edge in self.edges.iter().filter(|edge| &edge.target == node_id) {
            self.visit(&edge.source, visited, temp_mark, order)?;
        }

        temp_mark.remove(node_id);
        visited.insert(node_id);
        order.push(node_id.clone());

        Ok(())
    }

    /// Forget every node's history
    pub fn reset_state(&mut self) {
        for node in self.nodes.values_mut() {
            node.reset_state();
        }
    }
}

/// Error when creating an edge
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectionError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Port not found
    #[error("Port not found: {node}.{port}")]
    PortNotFound {
        /// Node that was searched
        node: NodeId,
        /// Requested port id
        port: String,
    },

    /// Incompatible port types
    #[error("Incompatible port types: {} cannot feed {}", .output.display_name(), .input.display_name())]
    IncompatiblePorts {
        /// Type of the source output
        output: PortType,
        /// Type of the target input
        input: PortType,
    },

    /// Input already has an incoming edge
    #[error("Port already connected: {0}")]
    PortAlreadyConnected(String),

    /// Self-loop not allowed
    #[error("Self-loop not allowed")]
    SelfLoop,

    /// The edge would close a cycle
    #[error("Connection would create a cycle")]
    WouldCreateCycle,
}

/// Error when editing nodes
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetworkError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// The sink node is never removed
    #[error("The output node cannot be removed")]
    CannotRemoveOutput,

    /// The node's definition declares no such input
    #[error("Unknown input {node}.{port}")]
    UnknownInput {
        /// Node that was searched
        node: NodeId,
        /// Requested port id
        port: String,
    },

    /// A node with this ID already exists
    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// The network already has a sink
    #[error("The network already has an output node")]
    OutputAlreadyPresent,
}

/// Error when the network contains a cycle
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Network contains a cycle through {0}")]
pub struct CycleError(pub NodeId);
