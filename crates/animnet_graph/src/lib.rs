// SPDX-License-Identifier: MIT OR Apache-2.0
//! Audio-reactive animation networks.
//!
//! A network is a small dataflow graph that turns per-frame audio analysis
//! (waveform bytes, a byte spectrum and elapsed time) into one value driving
//! a visual parameter. The network is evaluated once per rendered frame.
//!
//! ## Architecture
//!
//! - [`port`]: value types, the edge compatibility relation and coercion
//! - [`node`]: node kinds, definitions, instances and the builtin registry
//! - [`library`]: the signal-processing nodes and their per-instance state
//! - [`network`]: nodes plus validated edges
//! - [`evaluation`]: recursive, per-frame memoized evaluation
//! - [`document`]: the persisted shape, in RON or JSON
//! - [`presets`] and [`host`]: ready-made networks and per-parameter ownership

pub mod document;
pub mod evaluation;
pub mod frame;
pub mod host;
pub mod library;
pub mod network;
pub mod node;
pub mod port;
pub mod presets;

pub use document::{DocumentError, NetworkDocument};
pub use evaluation::{evaluate, evaluate_with_stats, EvaluationError, EvaluationStats};
pub use frame::{FrameContext, FrequencyAnalysis};
pub use host::{HostError, NetworkHost, ParameterUpdate};
pub use network::{ConnectionError, Edge, Network, NetworkError};
pub use node::{NodeDefinition, NodeId, NodeInstance, NodeKind, NodeRegistry};
pub use port::{types_compatible, MathOperation, PortType, PortValue, PortValues};
pub use presets::Preset;
