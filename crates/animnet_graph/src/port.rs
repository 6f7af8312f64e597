// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for node inputs/outputs.

use crate::frame::FrequencyAnalysis;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Data type that can flow through ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortType {
    /// Floating point value
    Number,
    /// String value
    String,
    /// Boolean value
    Boolean,
    /// Color as a CSS hex string
    Color,
    /// Raw bytes (waveform samples, spectrum slices)
    ByteBuffer,
    /// Spectrum plus the parameters needed to map bins to frequencies
    FrequencyAnalysis,
    /// Keyed record of values
    Object,
    /// 3D vector
    Vector3,
    /// Arithmetic operation selector
    MathOp,
}

impl PortType {
    /// Get display name for this type
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Number => "Number",
            Self::String => "String",
            Self::Boolean => "Boolean",
            Self::Color => "Color",
            Self::ByteBuffer => "Byte Buffer",
            Self::FrequencyAnalysis => "Frequency Analysis",
            Self::Object => "Object",
            Self::Vector3 => "Vector3",
            Self::MathOp => "Math Operation",
        }
    }

    /// Check if a value of this type can flow into a port of the other type
    pub fn can_connect_to(&self, other: &PortType) -> bool {
        // Same types can always connect
        if self == other {
            return true;
        }

        // Implicit conversions
        matches!(
            (self, other),
            (Self::Number, Self::String | Self::Boolean)
                | (Self::Boolean, Self::Number | Self::String)
                | (Self::Color, Self::String)
                | (Self::String, Self::Color)
                | (Self::Vector3, Self::Object)
        )
    }

    /// Value used when an unconnected port declares no default
    pub fn zero_value(&self) -> PortValue {
        match self {
            Self::Number => PortValue::Number(0.0),
            Self::String => PortValue::String(String::new()),
            Self::Boolean => PortValue::Boolean(false),
            Self::Color => PortValue::Color("#000000".to_string()),
            Self::ByteBuffer => PortValue::ByteBuffer(Vec::new()),
            Self::FrequencyAnalysis => PortValue::FrequencyAnalysis(FrequencyAnalysis::default()),
            Self::Object => PortValue::Object(IndexMap::new()),
            Self::Vector3 => PortValue::Vector3([0.0; 3]),
            Self::MathOp => PortValue::MathOp(MathOperation::Add),
        }
    }
}

/// Edge validation relation between a source output type and a target input type.
pub fn types_compatible(source: PortType, target: PortType) -> bool {
    source.can_connect_to(&target)
}

/// Operation applied by the `Math` node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(into = "String", try_from = "String")]
pub enum MathOperation {
    /// a + b
    #[default]
    Add,
    /// a - b
    Subtract,
    /// a * b
    Multiply,
    /// a / b, zero when b is zero
    Divide,
    /// a % b, zero when b is zero
    Modulo,
    /// a ^ b
    Power,
    /// min(a, b)
    Min,
    /// max(a, b)
    Max,
    /// (a + b) / 2
    Average,
    /// |a - b|
    AbsDifference,
}

impl MathOperation {
    /// Get all operations
    pub fn all() -> &'static [MathOperation] {
        &[
            Self::Add,
            Self::Subtract,
            Self::Multiply,
            Self::Divide,
            Self::Modulo,
            Self::Power,
            Self::Min,
            Self::Max,
            Self::Average,
            Self::AbsDifference,
        ]
    }

    /// Identifier used in documents and string overrides
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Modulo => "modulo",
            Self::Power => "power",
            Self::Min => "min",
            Self::Max => "max",
            Self::Average => "average",
            Self::AbsDifference => "abs_diff",
        }
    }

    /// Apply the operation
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        let result = match self {
            Self::Add => a + b,
            Self::Subtract => a - b,
            Self::Multiply => a * b,
            Self::Divide => {
                if b != 0.0 {
                    a / b
                } else {
                    0.0
                }
            }
            Self::Modulo => {
                if b != 0.0 {
                    a % b
                } else {
                    0.0
                }
            }
            Self::Power => a.powf(b),
            Self::Min => a.min(b),
            Self::Max => a.max(b),
            Self::Average => (a + b) * 0.5,
            Self::AbsDifference => (a - b).abs(),
        };

        if result.is_finite() {
            result
        } else {
            0.0
        }
    }
}

impl From<MathOperation> for String {
    fn from(op: MathOperation) -> Self {
        op.name().to_string()
    }
}

impl TryFrom<String> for MathOperation {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse().map_err(|()| format!("unknown math operation '{name}'"))
    }
}

impl FromStr for MathOperation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|op| op.name() == wanted)
            .ok_or(())
    }
}

/// A port declared by a node definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSpec {
    /// Port identifier, unique per direction within a definition
    pub id: String,
    /// Display label
    pub label: String,
    /// Data type
    pub port_type: PortType,
    /// Default value (for inputs)
    pub default_value: Option<PortValue>,
}

impl PortSpec {
    /// Create a new input port
    pub fn input(id: impl Into<String>, label: impl Into<String>, port_type: PortType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            port_type,
            default_value: None,
        }
    }

    /// Create a new output port
    pub fn output(id: impl Into<String>, label: impl Into<String>, port_type: PortType) -> Self {
        Self::input(id, label, port_type)
    }

    /// Create a number input with a default
    pub fn number(id: impl Into<String>, label: impl Into<String>, default: f64) -> Self {
        Self::input(id, label, PortType::Number).with_default(PortValue::Number(default))
    }

    /// Set the default value
    pub fn with_default(mut self, value: PortValue) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Value used when nothing is connected or overridden
    pub fn fallback_value(&self) -> PortValue {
        self.default_value
            .clone()
            .unwrap_or_else(|| self.port_type.zero_value())
    }
}

/// Value that can be stored in a port
///
/// Persisted as a bare literal. Colors and math operations are written as
/// strings and read back as `String`; [`PortValue::coerce_to`] restores them
/// from the declaring port's type. Three-element byte arrays read back as
/// `ByteBuffer` and likewise coerce to `Vector3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    /// Boolean
    Boolean(bool),
    /// Number
    Number(f64),
    /// String
    String(String),
    /// Raw bytes
    ByteBuffer(Vec<u8>),
    /// 3D vector
    Vector3([f64; 3]),
    /// Spectrum with sample rate and FFT size
    FrequencyAnalysis(FrequencyAnalysis),
    /// Keyed record
    Object(IndexMap<String, PortValue>),
    /// Color (`#rrggbb`)
    Color(String),
    /// Math operation selector
    MathOp(MathOperation),
}

impl PortValue {
    /// Get the port type for this value
    pub fn port_type(&self) -> PortType {
        match self {
            Self::Number(_) => PortType::Number,
            Self::String(_) => PortType::String,
            Self::Boolean(_) => PortType::Boolean,
            Self::Color(_) => PortType::Color,
            Self::ByteBuffer(_) => PortType::ByteBuffer,
            Self::FrequencyAnalysis(_) => PortType::FrequencyAnalysis,
            Self::Object(_) => PortType::Object,
            Self::Vector3(_) => PortType::Vector3,
            Self::MathOp(_) => PortType::MathOp,
        }
    }

    /// Read as a number; strings are parsed, anything unreadable is zero
    pub fn as_number(&self) -> f64 {
        match self {
            Self::Number(n) if n.is_finite() => *n,
            Self::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()).unwrap_or(0.0),
            Self::Boolean(b) => f64::from(u8::from(*b)),
            _ => 0.0,
        }
    }

    /// Read as a boolean
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Boolean(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"),
            _ => false,
        }
    }

    /// Read as raw bytes; a frequency analysis yields its spectrum
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::ByteBuffer(bytes) => bytes,
            Self::FrequencyAnalysis(analysis) => &analysis.spectrum,
            _ => &[],
        }
    }

    /// Read as a frequency analysis
    pub fn as_analysis(&self) -> Option<&FrequencyAnalysis> {
        match self {
            Self::FrequencyAnalysis(analysis) => Some(analysis),
            _ => None,
        }
    }

    /// Read as a math operation; strings are parsed by name
    pub fn as_math_op(&self) -> MathOperation {
        match self {
            Self::MathOp(op) => *op,
            Self::String(s) => s.parse().unwrap_or_default(),
            _ => MathOperation::default(),
        }
    }

    /// Best-effort conversion into the type a port declares
    ///
    /// The result always has type `target`; values that cannot be converted
    /// become the target's zero value.
    pub fn coerce_to(self, target: PortType) -> PortValue {
        if self.port_type() == target {
            return self;
        }

        match (target, self) {
            (PortType::Number, value @ (Self::String(_) | Self::Boolean(_))) => Self::Number(value.as_number()),
            (PortType::String, value) => Self::String(value.to_string()),
            (PortType::Boolean, value @ (Self::Number(_) | Self::String(_))) => Self::Boolean(value.as_bool()),
            (PortType::Color, Self::String(s)) => Self::Color(s),
            (PortType::MathOp, value @ Self::String(_)) => Self::MathOp(value.as_math_op()),
            (PortType::Object, Self::Vector3([x, y, z])) => {
                let mut fields = IndexMap::new();
                fields.insert("x".to_string(), Self::Number(x));
                fields.insert("y".to_string(), Self::Number(y));
                fields.insert("z".to_string(), Self::Number(z));
                Self::Object(fields)
            }
            (PortType::ByteBuffer, Self::FrequencyAnalysis(analysis)) => Self::ByteBuffer(analysis.spectrum),
            (PortType::Vector3, Self::ByteBuffer(bytes)) if bytes.len() == 3 => {
                Self::Vector3([f64::from(bytes[0]), f64::from(bytes[1]), f64::from(bytes[2])])
            }
            (target, _) => target.zero_value(),
        }
    }
}

impl fmt::Display for PortValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) | Self::Color(s) => f.write_str(s),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::ByteBuffer(bytes) => {
                for (i, byte) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{byte}")?;
                }
                Ok(())
            }
            Self::FrequencyAnalysis(analysis) => write!(
                f,
                "[spectrum {} bins @ {} Hz]",
                analysis.spectrum.len(),
                analysis.sample_rate
            ),
            Self::Object(fields) => {
                f.write_str("{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Self::Vector3([x, y, z]) => write!(f, "{x},{y},{z}"),
            Self::MathOp(op) => f.write_str(op.name()),
        }
    }
}

impl From<f64> for PortValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for PortValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<String> for PortValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for PortValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<Vec<u8>> for PortValue {
    fn from(value: Vec<u8>) -> Self {
        Self::ByteBuffer(value)
    }
}

impl From<FrequencyAnalysis> for PortValue {
    fn from(value: FrequencyAnalysis) -> Self {
        Self::FrequencyAnalysis(value)
    }
}

impl From<MathOperation> for PortValue {
    fn from(value: MathOperation) -> Self {
        Self::MathOp(value)
    }
}

impl From<[f64; 3]> for PortValue {
    fn from(value: [f64; 3]) -> Self {
        Self::Vector3(value)
    }
}

/// Values keyed by port id, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortValues {
    values: IndexMap<String, PortValue>,
}

impl PortValues {
    /// Create a new empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value
    pub fn set(&mut self, port_id: impl Into<String>, value: impl Into<PortValue>) {
        self.values.insert(port_id.into(), value.into());
    }

    /// Builder form of [`PortValues::set`]
    pub fn with(mut self, port_id: impl Into<String>, value: impl Into<PortValue>) -> Self {
        self.set(port_id, value);
        self
    }

    /// Get a value
    pub fn get(&self, port_id: &str) -> Option<&PortValue> {
        self.values.get(port_id)
    }

    /// First value in declaration order
    pub fn first(&self) -> Option<&PortValue> {
        self.values.first().map(|(_, value)| value)
    }

    /// Number at `port_id`, zero if absent
    pub fn number(&self, port_id: &str) -> f64 {
        self.get(port_id).map_or(0.0, PortValue::as_number)
    }

    /// Boolean at `port_id`, false if absent
    pub fn boolean(&self, port_id: &str) -> bool {
        self.get(port_id).is_some_and(PortValue::as_bool)
    }

    /// Stringified value at `port_id`, empty if absent
    pub fn text(&self, port_id: &str) -> String {
        self.get(port_id).map(ToString::to_string).unwrap_or_default()
    }

    /// Bytes at `port_id`, empty if absent
    pub fn bytes(&self, port_id: &str) -> &[u8] {
        match self.get(port_id) {
            Some(value) => value.as_bytes(),
            None => &[],
        }
    }

    /// Frequency analysis at `port_id`
    pub fn analysis(&self, port_id: &str) -> Option<&FrequencyAnalysis> {
        self.get(port_id).and_then(PortValue::as_analysis)
    }

    /// Iterate over `(port id, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PortValue)> {
        self.values.iter()
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record holds no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Convert into an `Object` value
    pub fn into_object(self) -> PortValue {
        PortValue::Object(self.values)
    }
}
