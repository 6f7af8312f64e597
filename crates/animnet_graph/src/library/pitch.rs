// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fundamental frequency estimation with the YIN difference function.

use crate::frame::fields;
use crate::port::PortValues;
use std::f64::consts::PI;

/// Sample rate assumed when the analysis carries none
pub const FALLBACK_SAMPLE_RATE: f64 = 44_100.0;

/// Pitch moves of at least this many cents are followed without smoothing
const SNAP_CENTS: f64 = 80.0;

/// Slack allowed when preferring the doubled lag
const OCTAVE_GUARD_SLACK: f64 = 0.01;

/// Mean energy below which a buffer counts as silence
const SILENCE_ENERGY: f64 = 1e-6;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A raw detection from one buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Fundamental frequency in Hz
    pub frequency: f64,
    /// Normalised difference at the chosen lag, lower is better
    pub cost: f64,
}

/// Convert a frequency to a fractional MIDI note number
pub fn frequency_to_midi(frequency: f64) -> f64 {
    69.0 + 12.0 * (frequency / 440.0).log2()
}

/// Convert a fractional MIDI note number to Hz
pub fn midi_to_frequency(midi: f64) -> f64 {
    440.0 * 2f64.powf((midi - 69.0) / 12.0)
}

/// Scientific pitch name of the nearest note, e.g. `A4`
pub fn note_name(midi: f64) -> String {
    let nearest = midi.round() as i64;
    let name = NOTE_NAMES[nearest.rem_euclid(12) as usize];
    format!("{name}{}", nearest.div_euclid(12) - 1)
}

fn prepare_samples(signal: &[u8]) -> Option<Vec<f64>> {
    let n = signal.len();
    let mut samples: Vec<f64> = signal.iter().map(|&b| (f64::from(b) - 128.0) / 128.0).collect();

    let mean = samples.iter().sum::<f64>() / n as f64;
    let denominator = (n - 1).max(1) as f64;
    let mut energy = 0.0;
    for (i, sample) in samples.iter_mut().enumerate() {
        let window = 0.5 - 0.5 * (2.0 * PI * i as f64 / denominator).cos();
        *sample = (*sample - mean) * window;
        energy += *sample * *sample;
    }

    (energy / n as f64 >= SILENCE_ENERGY).then_some(samples)
}

/// Cumulative mean normalised difference for lags `0..=tau_max`
fn normalised_difference(samples: &[f64], tau_max: usize) -> Vec<f64> {
    let width = samples.len() - tau_max;
    let mut cmnd = vec![1.0; tau_max + 1];
    let mut running = 0.0;

    for tau in 1..=tau_max {
        let difference: f64 = (0..width)
            .map(|j| {
                let delta = samples[j] - samples[j + tau];
                delta * delta
            })
            .sum();
        running += difference;
        cmnd[tau] = if running > 0.0 {
            difference * tau as f64 / running
        } else {
            1.0
        };
    }
    cmnd
}

/// Offset of the vertex of the parabola through three points, in -0.5..0.5
fn parabolic_offset(before: f64, at: f64, after: f64) -> f64 {
    let curvature = before - 2.0 * at + after;
    if curvature.abs() <= f64::EPSILON {
        return 0.0;
    }
    (0.5 * (before - after) / curvature).clamp(-0.5, 0.5)
}

/// Estimate the fundamental of a waveform
///
/// Returns `None` for silent or too-short buffers, unusable ranges, and when
/// the best lag does not fall below `threshold`.
pub fn detect_pitch(
    signal: &[u8],
    sample_rate: f64,
    min_hz: f64,
    max_hz: f64,
    threshold: f64,
) -> Option<PitchEstimate> {
    if signal.len() < 8 || sample_rate <= 0.0 {
        return None;
    }
    let (low_hz, high_hz) = if min_hz <= max_hz {
        (min_hz, max_hz)
    } else {
        (max_hz, min_hz)
    };
    if low_hz <= 0.0 {
        return None;
    }

    let n = signal.len();
    let tau_min = ((sample_rate / high_hz).floor() as usize).max(2);
    let tau_max = ((sample_rate / low_hz).ceil() as usize).min(n / 2);
    if tau_max <= tau_min {
        return None;
    }

    let samples = prepare_samples(signal)?;
    let cmnd = normalised_difference(&samples, tau_max);

    let mut tau = tau_min;
    for candidate in tau_min..=tau_max {
        if cmnd[candidate] < cmnd[tau] {
            tau = candidate;
        }
    }
    if cmnd[tau] >= threshold {
        return None;
    }

    let doubled = tau * 2;
    if doubled <= tau_max && cmnd[doubled] <= cmnd[tau] + OCTAVE_GUARD_SLACK {
        tau = doubled;
    }

    let refined = if tau > 1 && tau < tau_max {
        tau as f64 + parabolic_offset(cmnd[tau - 1], cmnd[tau], cmnd[tau + 1])
    } else {
        tau as f64
    };

    Some(PitchEstimate {
        frequency: sample_rate / refined,
        cost: cmnd[tau].max(0.0),
    })
}

/// Tracks a detected pitch across frames
#[derive(Debug, Clone, Default)]
pub struct PitchDetection {
    midi: Option<f64>,
}

/// What the tracker reports for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct PitchReading {
    /// Smoothed frequency in Hz, 0 before the first detection
    pub frequency: f64,
    /// Smoothed fractional MIDI note
    pub midi: f64,
    /// Nearest note name, empty before the first detection
    pub note: String,
    /// Deviation from the nearest note in cents
    pub cents: f64,
    /// `1 - cost` of this frame's detection, 0 when rejected
    pub confidence: f64,
}

impl PitchDetection {
    /// Fold one raw estimate into the tracked pitch
    pub fn track(&mut self, estimate: Option<PitchEstimate>, smoothing: f64) -> PitchReading {
        let confidence = match estimate {
            Some(estimate) => {
                let target = frequency_to_midi(estimate.frequency);
                let next = match self.midi {
                    Some(previous) if ((target - previous) * 100.0).abs() < SNAP_CENTS => {
                        previous + (1.0 - smoothing.clamp(0.0, 1.0)) * (target - previous)
                    }
                    _ => target,
                };
                self.midi = Some(next);
                (1.0 - estimate.cost).clamp(0.0, 1.0)
            }
            None => 0.0,
        };

        match self.midi {
            Some(midi) => PitchReading {
                frequency: midi_to_frequency(midi),
                midi,
                note: note_name(midi),
                cents: (midi - midi.round()) * 100.0,
                confidence,
            },
            None => PitchReading {
                frequency: 0.0,
                midi: 0.0,
                note: String::new(),
                cents: 0.0,
                confidence,
            },
        }
    }

    pub(crate) fn compute(&mut self, inputs: &PortValues) -> PortValues {
        let sample_rate = inputs
            .analysis(fields::FREQUENCY_ANALYSIS)
            .map(|analysis| f64::from(analysis.sample_rate))
            .filter(|rate| *rate > 0.0)
            .unwrap_or(FALLBACK_SAMPLE_RATE);

        let estimate = detect_pitch(
            inputs.bytes(fields::AUDIO_SIGNAL),
            sample_rate,
            inputs.number("minHz"),
            inputs.number("maxHz"),
            inputs.number("threshold"),
        );
        let reading = self.track(estimate, inputs.number("smoothing"));

        PortValues::new()
            .with("frequency", reading.frequency)
            .with("midi", reading.midi)
            .with("note", reading.note)
            .with("cents", reading.cents)
            .with("confidence", reading.confidence)
    }
}
