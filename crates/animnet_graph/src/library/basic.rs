// SPDX-License-Identifier: MIT OR Apache-2.0
//! Constants, arithmetic and value shaping.

use crate::port::{PortValue, PortValues};
use std::f64::consts::TAU;

/// Oscillator wave shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    /// Sine, centred on 0.5
    Sine,
    /// High for the first half of the cycle
    Square,
    /// Rises to 1 at mid-cycle, falls back to 0
    Triangle,
    /// Ramps from 0 to 1
    Sawtooth,
}

impl Waveform {
    /// Parse a waveform name; unknown names fall back to sine
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "square" => Self::Square,
            "triangle" => Self::Triangle,
            "saw" | "sawtooth" => Self::Sawtooth,
            _ => Self::Sine,
        }
    }

    /// Sample the waveform at a cycle position in 0..1
    pub fn sample(self, position: f64) -> f64 {
        match self {
            Self::Sine => 0.5 + 0.5 * (TAU * position).sin(),
            Self::Square => {
                if position < 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Triangle => 1.0 - (1.0 - 2.0 * position).abs(),
            Self::Sawtooth => position,
        }
    }
}

/// Oscillator output in 0..1
pub fn oscillator(time: f64, frequency: f64, waveform: Waveform, phase: f64) -> f64 {
    let position = (time * frequency + phase).rem_euclid(1.0);
    if position.is_finite() {
        waveform.sample(position)
    } else {
        0.0
    }
}

/// Linear remap of `value` from one range to another
pub fn map_range(value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64, clamp: bool) -> f64 {
    let span = in_max - in_min;
    if span.abs() <= f64::EPSILON {
        return out_min;
    }
    let mut t = (value - in_min) / span;
    if clamp {
        t = t.clamp(0.0, 1.0);
    }
    out_min + t * (out_max - out_min)
}

/// Pick an entry from a comma separated list; returns the entry and the list length
pub fn select_mode(index: f64, options: &str) -> (String, usize) {
    let entries: Vec<&str> = options
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect();
    if entries.is_empty() {
        return (String::new(), 0);
    }

    let index = if index.is_finite() { index.round() as i64 } else { 0 };
    let selected = index.rem_euclid(entries.len() as i64) as usize;
    (entries[selected].to_string(), entries.len())
}

/// HSL to a `#rrggbb` string; hue in degrees, saturation and lightness in 0..1
pub fn hsl_to_hex(hue: f64, saturation: f64, lightness: f64) -> String {
    let hue = if hue.is_finite() { hue.rem_euclid(360.0) } else { 0.0 };
    let saturation = saturation.clamp(0.0, 1.0);
    let lightness = lightness.clamp(0.0, 1.0);

    let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector.rem_euclid(2.0) - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = lightness - chroma / 2.0;
    let channel = |c: f64| ((c + m) * 255.0).round().clamp(0.0, 255.0) as u8;

    format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
}

/// One-pole smoother
#[derive(Debug, Clone, Default)]
pub struct Smooth {
    previous: Option<f64>,
}

impl Smooth {
    /// Blend `value` into the running value; the first value passes through
    pub fn update(&mut self, value: f64, smoothing: f64) -> f64 {
        let smoothing = smoothing.clamp(0.0, 1.0);
        let next = match self.previous {
            Some(previous) => previous * smoothing + value * (1.0 - smoothing),
            None => value,
        };
        self.previous = Some(next);
        next
    }

    pub(crate) fn compute(&mut self, inputs: &PortValues) -> PortValues {
        let value = self.update(inputs.number("value"), inputs.number("smoothing"));
        PortValues::new().with("value", value)
    }
}

pub(crate) fn compute_math(inputs: &PortValues) -> PortValues {
    let operation = inputs
        .get("operation")
        .map(PortValue::as_math_op)
        .unwrap_or_default();
    PortValues::new().with("result", operation.apply(inputs.number("a"), inputs.number("b")))
}

pub(crate) fn compute_map_range(inputs: &PortValues) -> PortValues {
    let result = map_range(
        inputs.number("value"),
        inputs.number("inMin"),
        inputs.number("inMax"),
        inputs.number("outMin"),
        inputs.number("outMax"),
        inputs.boolean("clamp"),
    );
    PortValues::new().with("result", result)
}

pub(crate) fn compute_compare(inputs: &PortValues) -> PortValues {
    PortValues::new().with("result", inputs.number("value") >= inputs.number("threshold"))
}

pub(crate) fn compute_oscillator(inputs: &PortValues) -> PortValues {
    let value = oscillator(
        inputs.number("time"),
        inputs.number("frequency"),
        Waveform::from_name(&inputs.text("waveform")),
        inputs.number("phase"),
    );
    PortValues::new().with("value", value)
}

pub(crate) fn compute_select_mode(inputs: &PortValues) -> PortValues {
    let (value, count) = select_mode(inputs.number("index"), &inputs.text("options"));
    PortValues::new().with("value", value).with("count", count as f64)
}

pub(crate) fn compute_hsl_color(inputs: &PortValues) -> PortValues {
    let color = hsl_to_hex(
        inputs.number("hue"),
        inputs.number("saturation"),
        inputs.number("lightness"),
    );
    PortValues::new().with("color", PortValue::Color(color))
}

pub(crate) fn compute_vector3(inputs: &PortValues) -> PortValues {
    let vector = [inputs.number("x"), inputs.number("y"), inputs.number("z")];
    PortValues::new().with("vector", vector)
}
