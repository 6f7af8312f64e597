// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persisted network documents.
//!
//! Documents carry nodes, overrides and edges but never node state; a loaded
//! network always starts from empty history. RON is the native format, JSON
//! is accepted for interchange.

use crate::network::{ConnectionError, Network, NetworkError};
use crate::node::{NodeId, NodeInstance, NodeKind};
use crate::port::{PortType, PortValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Result alias for document operations
pub type DocumentResult<T> = Result<T, DocumentError>;

fn default_enabled() -> bool {
    true
}

/// Serializable shape of a [`Network`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDocument {
    /// Network ID; a fresh one is generated on load when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Nodes in arena order
    pub nodes: Vec<NodeDocument>,
    /// Edges
    #[serde(default)]
    pub edges: Vec<EdgeDocument>,
    /// Whether the network is evaluated
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

/// Serializable node instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDocument {
    /// Node ID
    pub id: NodeId,
    /// Definition label, e.g. `Envelope Follower`
    pub definition_label: String,
    /// Literal values for unconnected inputs
    #[serde(default)]
    pub input_overrides: IndexMap<String, PortValue>,
    /// Declared type of the `Output` node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_type: Option<PortType>,
}

/// Serializable edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDocument {
    /// Source node ID
    pub source: NodeId,
    /// Source output port; absent means the first output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Target node ID
    pub target: NodeId,
    /// Target input port
    pub target_handle: String,
}

impl NetworkDocument {
    /// Capture a network's persisted shape
    pub fn from_network(network: &Network) -> Self {
        Self {
            id: Some(network.id.clone()),
            nodes: network
                .nodes()
                .map(|node| NodeDocument {
                    id: node.id.clone(),
                    definition_label: node.kind.label().to_string(),
                    input_overrides: node.input_overrides.clone(),
                    output_type: node.kind.output_type(),
                })
                .collect(),
            edges: network
                .edges()
                .map(|edge| EdgeDocument {
                    source: edge.source.clone(),
                    source_handle: edge.source_output.clone(),
                    target: edge.target.clone(),
                    target_handle: edge.target_input.clone(),
                })
                .collect(),
            is_enabled: network.is_enabled(),
        }
    }

    /// Build and validate a network with fresh node state
    pub fn into_network(self) -> DocumentResult<Network> {
        let mut network = Network::empty(self.id.unwrap_or_else(|| Uuid::new_v4().to_string()));
        network.set_enabled(self.is_enabled);

        for node in self.nodes {
            let kind = match NodeKind::from_label(&node.definition_label, node.output_type) {
                Some(kind) => kind,
                None if node.definition_label == "Output" => {
                    return Err(DocumentError::MissingOutputType(node.id));
                }
                None => {
                    return Err(DocumentError::UnknownDefinition {
                        node: node.id,
                        label: node.definition_label,
                    });
                }
            };

            let mut instance = NodeInstance::with_id(node.id, kind);
            for (port_id, value) in node.input_overrides {
                if let Some(port) = kind.definition().and_then(|d| d.input(&port_id)) {
                    instance.input_overrides.insert(port_id, value.coerce_to(port.port_type));
                } else {
                    tracing::warn!(node = %instance.id, port = %port_id, "dropping override for unknown input");
                }
            }

            network.add_node(instance).map_err(|error| match error {
                NetworkError::DuplicateNode(id) => DocumentError::DuplicateNode(id),
                NetworkError::OutputAlreadyPresent => DocumentError::MultipleOutputs,
                other => DocumentError::Network(other),
            })?;
        }

        if network.output_node().is_none() {
            return Err(DocumentError::MissingOutput);
        }

        for edge in &self.edges {
            network.connect(
                &edge.source,
                edge.source_handle.as_deref(),
                &edge.target,
                &edge.target_handle,
            )?;
        }

        tracing::debug!(
            network = %network.id,
            nodes = network.node_count(),
            edges = network.edge_count(),
            "loaded network document"
        );
        Ok(network)
    }

    /// Serialize as pretty RON
    pub fn to_ron(&self) -> DocumentResult<String> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Parse RON
    pub fn from_ron(source: &str) -> DocumentResult<Self> {
        Ok(ron::from_str(source)?)
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> DocumentResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse JSON
    pub fn from_json(source: &str) -> DocumentResult<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Read a document; `.json` files are JSON, anything else RON
    pub fn load(path: &Path) -> DocumentResult<Self> {
        let content = std::fs::read_to_string(path)?;
        if is_json(path) {
            Self::from_json(&content)
        } else {
            Self::from_ron(&content)
        }
    }

    /// Write a document in the format its extension names
    pub fn save(&self, path: &Path) -> DocumentResult<()> {
        let content = if is_json(path) {
            self.to_json()?
        } else {
            self.to_ron()?
        };
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Error when reading, writing or validating a document
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// RON serialization failed
    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),

    /// RON parsing failed
    #[error("RON parse error: {0}")]
    RonSpanned(#[from] ron::error::SpannedError),

    /// JSON serialization or parsing failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No definition carries this label
    #[error("Unknown definition '{label}' on node {node}")]
    UnknownDefinition {
        /// Offending node
        node: NodeId,
        /// Label that was not found
        label: String,
    },

    /// An `Output` node without a declared type
    #[error("Output node {0} has no output type")]
    MissingOutputType(NodeId),

    /// Two nodes share an ID
    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// An edge failed validation
    #[error("Invalid edge: {0}")]
    Connection(#[from] ConnectionError),

    /// Node edit failed
    #[error("Invalid node: {0}")]
    Network(NetworkError),

    /// More than one `Output` node
    #[error("Document has more than one output node")]
    MultipleOutputs,

    /// No `Output` node
    #[error("Document has no output node")]
    MissingOutput,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::evaluate;
    use crate::frame::{FrameContext, FrequencyAnalysis};
    use crate::port::MathOperation;

    /// Number 0.25 -> Map Range [0, 0.5] to [10, 20] -> Smooth -> Math (* 3) -> Output
    fn sample_network() -> Network {
        let mut network = Network::new(PortType::Number);
        let output = network.output_node().unwrap().id.clone();
        let number = network
            .add_node(NodeInstance::with_id("number", NodeKind::Number).with_override("value", 0.25))
            .unwrap();
        let range = network
            .add_node(
                NodeInstance::with_id("range", NodeKind::MapRange)
                    .with_override("inMax", 0.5)
                    .with_override("outMin", 10.0)
                    .with_override("outMax", 20.0),
            )
            .unwrap();
        let smooth = network.add_node(NodeInstance::with_id("smooth", NodeKind::Smooth)).unwrap();
        let math = network
            .add_node(
                NodeInstance::with_id("math", NodeKind::Math)
                    .with_override("b", 3.0)
                    .with_override("operation", MathOperation::Multiply),
            )
            .unwrap();
        network.connect(&number, None, &range, "value").unwrap();
        network.connect(&range, Some("result"), &smooth, "value").unwrap();
        network.connect(&smooth, None, &math, "a").unwrap();
        network.connect(&math, Some("result"), &output, "value").unwrap();
        network
    }

    fn loud_frame() -> FrameContext {
        FrameContext::new(
            vec![0, 255, 0, 255],
            FrequencyAnalysis::new(vec![0; 2], 44_100, 4),
            0.0,
        )
    }

    #[test]
    fn test_ron_round_trip_evaluates_the_same() {
        let mut original = sample_network();
        let frame = loud_frame();
        // Advance the original once so it has state that must not persist.
        evaluate(&mut original, &frame).unwrap();

        let document = NetworkDocument::from_network(&original);
        let ron_str = document.to_ron().unwrap();
        let loaded = NetworkDocument::from_ron(&ron_str).unwrap();
        assert_eq!(loaded.nodes.len(), document.nodes.len());
        assert_eq!(loaded.edges, document.edges);

        let mut restored = loaded.into_network().unwrap();
        assert!(restored.nodes().all(|node| !node.has_state()));
        assert_eq!(restored.id, original.id);
        assert_eq!(restored.edge_count(), 4);
        assert_eq!(
            restored.node(&NodeId::from("math")).unwrap().input_overrides.get("operation"),
            Some(&PortValue::MathOp(MathOperation::Multiply))
        );

        original.reset_state();
        let value = evaluate(&mut restored, &frame).unwrap();
        assert_eq!(value, PortValue::Number(45.0));
        assert_eq!(value, evaluate(&mut original, &frame).unwrap());
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{
            "nodes": [
                { "id": "in", "definitionLabel": "Input" },
                { "id": "out", "definitionLabel": "Output", "outputType": "Number",
                  "inputOverrides": { "value": 0.25 } }
            ],
            "edges": []
        }"#;
        let document = NetworkDocument::from_json(json).unwrap();
        assert!(document.is_enabled);
        assert!(document.id.is_none());

        let mut network = document.into_network().unwrap();
        let value = evaluate(&mut network, &loud_frame()).unwrap();
        assert_eq!(value, PortValue::Number(0.25));

        let exported = NetworkDocument::from_network(&network).to_json().unwrap();
        assert!(exported.contains("\"definitionLabel\": \"Output\""));
        assert!(exported.contains("\"isEnabled\": true"));
    }

    #[test]
    fn test_plain_literal_overrides_load() {
        let json = r##"{
            "nodes": [
                { "id": "in", "definitionLabel": "Input" },
                { "id": "env", "definitionLabel": "Envelope Follower",
                  "inputOverrides": { "value": 1, "attackMs": 5, "releaseMs": 150 } },
                { "id": "math", "definitionLabel": "Math",
                  "inputOverrides": { "b": 2, "operation": "multiply" } },
                { "id": "out", "definitionLabel": "Output", "outputType": "Color",
                  "inputOverrides": { "value": "#336699" } }
            ],
            "edges": [
                { "source": "env", "target": "math", "targetHandle": "a" }
            ]
        }"##;
        let network = NetworkDocument::from_json(json).unwrap().into_network().unwrap();

        let envelope = network.node(&NodeId::from("env")).unwrap();
        assert_eq!(envelope.input_overrides.get("attackMs"), Some(&PortValue::Number(5.0)));
        assert_eq!(envelope.input_overrides.get("releaseMs"), Some(&PortValue::Number(150.0)));
        let math = network.node(&NodeId::from("math")).unwrap();
        assert_eq!(
            math.input_overrides.get("operation"),
            Some(&PortValue::MathOp(MathOperation::Multiply))
        );

        let mut network = network;
        assert_eq!(
            evaluate(&mut network, &loud_frame()),
            Ok(PortValue::Color("#336699".to_string()))
        );

        let exported = NetworkDocument::from_network(&network).to_json().unwrap();
        assert!(exported.contains("\"attackMs\": 5.0"));
        assert!(exported.contains("\"operation\": \"multiply\""));
    }

    fn document_with(nodes: Vec<NodeDocument>, edges: Vec<EdgeDocument>) -> NetworkDocument {
        NetworkDocument {
            id: None,
            nodes,
            edges,
            is_enabled: true,
        }
    }

    fn node(id: &str, label: &str, output_type: Option<PortType>) -> NodeDocument {
        NodeDocument {
            id: NodeId::from(id),
            definition_label: label.to_string(),
            input_overrides: IndexMap::new(),
            output_type,
        }
    }

    fn edge(source: &str, handle: Option<&str>, target: &str, input: &str) -> EdgeDocument {
        EdgeDocument {
            source: NodeId::from(source),
            source_handle: handle.map(str::to_string),
            target: NodeId::from(target),
            target_handle: input.to_string(),
        }
    }

    #[test]
    fn test_validation_errors() {
        let unknown = document_with(vec![node("x", "Reverb", None)], vec![]);
        assert!(matches!(
            unknown.into_network(),
            Err(DocumentError::UnknownDefinition { .. })
        ));

        let untyped = document_with(vec![node("out", "Output", None)], vec![]);
        assert!(matches!(untyped.into_network(), Err(DocumentError::MissingOutputType(_))));

        let no_output = document_with(vec![node("in", "Input", None)], vec![]);
        assert!(matches!(no_output.into_network(), Err(DocumentError::MissingOutput)));

        let two_outputs = document_with(
            vec![
                node("a", "Output", Some(PortType::Number)),
                node("b", "Output", Some(PortType::String)),
            ],
            vec![],
        );
        assert!(matches!(two_outputs.into_network(), Err(DocumentError::MultipleOutputs)));

        let duplicate = document_with(
            vec![node("a", "Number", None), node("a", "Smooth", None)],
            vec![],
        );
        assert!(matches!(duplicate.into_network(), Err(DocumentError::DuplicateNode(_))));
    }

    #[test]
    fn test_edge_validation_on_load() {
        let nodes = || {
            vec![
                node("in", "Input", None),
                node("a", "Smooth", None),
                node("b", "Smooth", None),
                node("out", "Output", Some(PortType::Number)),
            ]
        };

        let incompatible = document_with(nodes(), vec![edge("in", Some("audioSignal"), "out", "value")]);
        assert!(matches!(
            incompatible.into_network(),
            Err(DocumentError::Connection(ConnectionError::IncompatiblePorts { .. }))
        ));

        let cyclic = document_with(
            nodes(),
            vec![edge("a", None, "b", "value"), edge("b", None, "a", "value")],
        );
        assert!(matches!(
            cyclic.into_network(),
            Err(DocumentError::Connection(ConnectionError::WouldCreateCycle))
        ));

        let dangling = document_with(nodes(), vec![edge("ghost", None, "out", "value")]);
        assert!(matches!(
            dangling.into_network(),
            Err(DocumentError::Connection(ConnectionError::NodeNotFound(_)))
        ));
    }

    #[test]
    fn test_unknown_override_is_dropped() {
        let mut number = node("n", "Number", None);
        number.input_overrides.insert("value".to_string(), PortValue::Number(3.0));
        number.input_overrides.insert("volume".to_string(), PortValue::Number(9.0));
        let document = document_with(
            vec![number, node("out", "Output", Some(PortType::Number))],
            vec![edge("n", None, "out", "value")],
        );

        let mut network = document.into_network().unwrap();
        let loaded = network.node(&NodeId::from("n")).unwrap();
        assert_eq!(loaded.input_overrides.len(), 1);
        assert_eq!(evaluate(&mut network, &loud_frame()), Ok(PortValue::Number(3.0)));
    }
}
