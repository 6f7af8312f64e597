// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-frame audio inputs handed to every evaluation.

use crate::port::PortValues;
use serde::{Deserialize, Serialize};

/// Port ids of the frame context record
pub mod fields {
    /// Waveform samples
    pub const AUDIO_SIGNAL: &str = "audioSignal";
    /// Spectrum and its parameters
    pub const FREQUENCY_ANALYSIS: &str = "frequencyAnalysis";
    /// Elapsed time in seconds
    pub const TIME: &str = "time";
}

/// Byte spectrum as produced by an analyser, plus what is needed to map bins to Hz
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyAnalysis {
    /// Bin magnitudes, 0-255
    pub spectrum: Vec<u8>,
    /// Sample rate of the analysed signal
    pub sample_rate: u32,
    /// FFT size; the spectrum holds `fft_size / 2` bins
    pub fft_size: u32,
}

impl FrequencyAnalysis {
    /// Create a new analysis
    pub fn new(spectrum: Vec<u8>, sample_rate: u32, fft_size: u32) -> Self {
        Self {
            spectrum,
            sample_rate,
            fft_size,
        }
    }

    /// Width of one bin in Hz, if the parameters are usable
    pub fn bin_hz(&self) -> Option<f64> {
        if self.sample_rate == 0 || self.fft_size == 0 {
            None
        } else {
            Some(f64::from(self.sample_rate) / f64::from(self.fft_size))
        }
    }

    /// Center frequency of a bin
    pub fn bin_frequency(&self, bin: usize) -> f64 {
        self.bin_hz().map_or(0.0, |hz| bin as f64 * hz)
    }

    /// Whether there is nothing to analyse
    pub fn is_empty(&self) -> bool {
        self.spectrum.is_empty() || self.bin_hz().is_none()
    }
}

/// Global inputs for one rendered frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameContext {
    /// Waveform samples, 0-255 centred on 128
    pub audio_signal: Vec<u8>,
    /// Spectrum of the same block
    pub frequency_analysis: FrequencyAnalysis,
    /// Elapsed time in seconds
    pub time: f64,
}

impl FrameContext {
    /// Create a new frame context
    pub fn new(audio_signal: Vec<u8>, frequency_analysis: FrequencyAnalysis, time: f64) -> Self {
        Self {
            audio_signal,
            frequency_analysis,
            time,
        }
    }

    /// Silence at the given time
    pub fn silent(sample_rate: u32, fft_size: u32, time: f64) -> Self {
        let bins = (fft_size / 2) as usize;
        Self {
            audio_signal: vec![128; fft_size as usize],
            frequency_analysis: FrequencyAnalysis::new(vec![0; bins], sample_rate, fft_size),
            time,
        }
    }

    /// The record emitted by the `Input` node
    pub fn to_values(&self) -> PortValues {
        PortValues::new()
            .with(fields::AUDIO_SIGNAL, self.audio_signal.clone())
            .with(fields::FREQUENCY_ANALYSIS, self.frequency_analysis.clone())
            .with(fields::TIME, self.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_mapping() {
        let analysis = FrequencyAnalysis::new(vec![0; 1024], 44_100, 2048);
        let hz = analysis.bin_hz().unwrap();
        assert!((hz - 21.533).abs() < 0.01);
        assert!((analysis.bin_frequency(10) - 215.33).abs() < 0.1);
    }

    #[test]
    fn test_unusable_parameters() {
        let analysis = FrequencyAnalysis::new(vec![10; 4], 0, 2048);
        assert!(analysis.bin_hz().is_none());
        assert!(analysis.is_empty());
        assert_eq!(analysis.bin_frequency(3), 0.0);
    }

    #[test]
    fn test_input_record_order() {
        let frame = FrameContext::silent(48_000, 64, 1.5);
        let values = frame.to_values();
        let keys: Vec<&str> = values.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["audioSignal", "frequencyAnalysis", "time"]);
        assert_eq!(values.number("time"), 1.5);
        assert_eq!(values.bytes("audioSignal").len(), 64);
    }
}
