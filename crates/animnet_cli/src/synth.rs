// SPDX-License-Identifier: MIT OR Apache-2.0
//! Synthesised audio frames for driving networks without a live input.
//!
//! Each frame holds one FFT block of a sine tone as unsigned bytes, plus its
//! byte spectrum scaled the way browser analysers scale theirs: magnitudes in
//! decibels mapped linearly from `MIN_DECIBELS..MAX_DECIBELS` onto `0..=255`.

use animnet_graph::{FrameContext, FrequencyAnalysis};
use realfft::{RealFftPlanner, RealToComplex};
use std::f32::consts::PI;
use std::sync::Arc;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Tone parameters for a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    /// Frequency in Hz
    pub frequency: f32,
    /// Peak amplitude, 0..1
    pub amplitude: f32,
    /// First silent frame, if any
    pub gap_from: Option<u32>,
}

/// Produces one [`FrameContext`] per rendered frame
pub struct FrameSynth {
    plan: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    sample_rate: u32,
    fft_size: usize,
    frame_interval: f64,
    tone: Tone,
}

impl FrameSynth {
    /// Create a synthesiser; `fft_size` must be even
    pub fn new(sample_rate: u32, fft_size: usize, frame_interval: f64, tone: Tone) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(fft_size);
        Self {
            plan,
            window: hann_window(fft_size),
            sample_rate,
            fft_size,
            frame_interval: frame_interval.max(0.0),
            tone,
        }
    }

    /// Frame number `index`
    pub fn frame(&self, index: u32) -> FrameContext {
        let time = f64::from(index) * self.frame_interval;
        let silent = self.tone.gap_from.is_some_and(|gap| index >= gap);
        if silent || self.tone.amplitude <= 0.0 {
            return FrameContext::silent(self.sample_rate, self.fft_size as u32, time);
        }

        let start = (time * f64::from(self.sample_rate)).round() as u64;
        let samples: Vec<f32> = (0..self.fft_size as u64)
            .map(|i| {
                let t = (start + i) as f32 / self.sample_rate as f32;
                self.tone.amplitude.min(1.0) * (2.0 * PI * self.tone.frequency * t).sin()
            })
            .collect();

        let audio_signal = samples
            .iter()
            .map(|s| (128.0 + s * 127.0).round().clamp(0.0, 255.0) as u8)
            .collect();
        let spectrum = self.spectrum(&samples);

        FrameContext::new(
            audio_signal,
            FrequencyAnalysis::new(spectrum, self.sample_rate, self.fft_size as u32),
            time,
        )
    }

    fn spectrum(&self, samples: &[f32]) -> Vec<u8> {
        let bins = self.fft_size / 2;
        let mut input = self.plan.make_input_vec();
        for ((slot, sample), w) in input.iter_mut().zip(samples).zip(&self.window) {
            *slot = sample * w;
        }
        let mut output = self.plan.make_output_vec();
        if let Err(error) = self.plan.process(&mut input, &mut output) {
            tracing::warn!(%error, "FFT failed, emitting an empty spectrum");
            return vec![0; bins];
        }

        let scale = self.fft_size as f32;
        output
            .iter()
            .take(bins)
            .map(|c| {
                let magnitude = c.norm() / scale;
                let db = 20.0 * magnitude.max(1e-12).log10();
                let level = (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
                (level.clamp(0.0, 1.0) * 255.0) as u8
            })
            .collect()
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    let denominator = size.saturating_sub(1).max(1) as f32;
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / denominator).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth(gap_from: Option<u32>) -> FrameSynth {
        let tone = Tone {
            frequency: 440.0,
            amplitude: 0.8,
            gap_from,
        };
        FrameSynth::new(44_100, 2048, 1.0 / 60.0, tone)
    }

    #[test]
    fn test_frame_shape() {
        let frame = synth(None).frame(3);
        assert_eq!(frame.audio_signal.len(), 2048);
        assert_eq!(frame.frequency_analysis.spectrum.len(), 1024);
        assert!((frame.time - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_frame_time_follows_interval() {
        let tone = Tone {
            frequency: 440.0,
            amplitude: 0.0,
            gap_from: None,
        };
        let synth = FrameSynth::new(44_100, 2048, 1.0 / 30.0, tone);
        assert!((synth.frame(3).time - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_spectrum_peaks_at_tone() {
        let frame = synth(None).frame(0);
        let spectrum = &frame.frequency_analysis.spectrum;
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by_key(|(_, level)| **level)
            .map(|(bin, _)| bin)
            .unwrap();
        // 440 Hz at 21.53 Hz per bin
        assert!((19..=22).contains(&peak), "peak bin {peak}");
        assert_eq!(spectrum[peak], 255);
        assert!(spectrum[500] < 64);
    }

    #[test]
    fn test_waveform_is_centred() {
        let frame = synth(None).frame(0);
        let max = *frame.audio_signal.iter().max().unwrap();
        let min = *frame.audio_signal.iter().min().unwrap();
        assert!(max > 220 && min < 36);
    }

    #[test]
    fn test_gap_is_silent() {
        let synth = synth(Some(2));
        assert!(synth.frame(1).frequency_analysis.spectrum.iter().any(|&b| b > 0));
        let silent = synth.frame(2);
        assert!(silent.audio_signal.iter().all(|&b| b == 128));
        assert!(silent.frequency_analysis.spectrum.iter().all(|&b| b == 0));
    }
}
