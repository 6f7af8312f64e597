// SPDX-License-Identifier: MIT OR Apache-2.0
//! Waveform and spectrum measurements.

use crate::frame::{fields, FrequencyAnalysis};
use crate::port::{PortValue, PortValues};
use indexmap::IndexMap;

/// Fraction of spectral energy below the rolloff frequency
const ROLLOFF_FRACTION: f64 = 0.85;

/// Lowest frequency used by the perceptual weighting curve
const WEIGHTING_FLOOR_HZ: f64 = 20.0;

/// Reference frequency where the perceptual weight is 1
const WEIGHTING_REFERENCE_HZ: f64 = 1000.0;

fn normalised(byte: u8) -> f64 {
    f64::from(byte) / 255.0
}

fn sample(byte: u8) -> f64 {
    (f64::from(byte) - 128.0) / 128.0
}

/// Copy the bins covering `[min_hz, max_hz]`
pub fn frequency_band(analysis: &FrequencyAnalysis, min_hz: f64, max_hz: f64) -> Vec<u8> {
    let Some(bin_hz) = analysis.bin_hz() else {
        return Vec::new();
    };
    if analysis.spectrum.is_empty() {
        return Vec::new();
    }

    let (low, high) = if min_hz <= max_hz {
        (min_hz, max_hz)
    } else {
        (max_hz, min_hz)
    };
    let last = analysis.spectrum.len() - 1;
    let start = (low.max(0.0) / bin_hz).floor() as usize;
    let end = ((high.max(0.0) / bin_hz).ceil() as usize).min(last);

    if start > end {
        return Vec::new();
    }
    analysis.spectrum[start..=end].to_vec()
}

/// Summary of a byte buffer, normalised to 0..1
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandStats {
    /// Mean level
    pub average: f64,
    /// Highest level
    pub max: f64,
    /// Lowest level
    pub min: f64,
    /// Root mean square level
    pub rms: f64,
}

impl BandStats {
    /// Measure a buffer; empty buffers measure zero
    pub fn measure(band: &[u8]) -> Self {
        if band.is_empty() {
            return Self::default();
        }

        let count = band.len() as f64;
        let mut sum = 0.0;
        let mut squares = 0.0;
        let mut max = 0.0_f64;
        let mut min = 1.0_f64;
        for &byte in band {
            let level = normalised(byte);
            sum += level;
            squares += level * level;
            max = max.max(level);
            min = min.min(level);
        }

        Self {
            average: sum / count,
            max,
            min,
            rms: (squares / count).sqrt(),
        }
    }

    fn to_object(self) -> PortValue {
        let mut fields = IndexMap::new();
        fields.insert("average".to_string(), PortValue::Number(self.average));
        fields.insert("max".to_string(), PortValue::Number(self.max));
        fields.insert("min".to_string(), PortValue::Number(self.min));
        fields.insert("rms".to_string(), PortValue::Number(self.rms));
        PortValue::Object(fields)
    }
}

/// RMS and peak of a waveform centred on 128
pub fn audio_volume(signal: &[u8]) -> (f64, f64) {
    if signal.is_empty() {
        return (0.0, 0.0);
    }

    let mut squares = 0.0;
    let mut peak = 0.0_f64;
    for &byte in signal {
        let value = sample(byte);
        squares += value * value;
        peak = peak.max(value.abs());
    }
    ((squares / signal.len() as f64).sqrt(), peak.min(1.0))
}

/// Perceptual weight of a bin at `frequency`
pub fn perceptual_weight(frequency: f64) -> f64 {
    (WEIGHTING_REFERENCE_HZ / frequency.max(WEIGHTING_FLOOR_HZ)).sqrt()
}

/// Bass/mid/high levels and their shares of the total
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MultiBandLevels {
    /// Weighted mean level below `bass_max_hz`
    pub bass: f64,
    /// Weighted mean level between the crossovers
    pub mid: f64,
    /// Weighted mean level above `mid_max_hz`
    pub high: f64,
    /// Share of weighted energy in the bass band, percent
    pub bass_percent: f64,
    /// Share of weighted energy in the mid band, percent
    pub mid_percent: f64,
    /// Share of weighted energy in the high band, percent
    pub high_percent: f64,
}

impl MultiBandLevels {
    /// Split a spectrum at two crossover frequencies
    pub fn analyse(analysis: &FrequencyAnalysis, bass_max_hz: f64, mid_max_hz: f64) -> Self {
        let Some(bin_hz) = analysis.bin_hz() else {
            return Self::default();
        };

        let (bass_max, mid_max) = if bass_max_hz <= mid_max_hz {
            (bass_max_hz, mid_max_hz)
        } else {
            (mid_max_hz, bass_max_hz)
        };

        // [weighted level sum, weight sum] per band
        let mut bands = [[0.0_f64; 2]; 3];
        for (bin, &byte) in analysis.spectrum.iter().enumerate().skip(1) {
            let frequency = bin as f64 * bin_hz;
            let weight = perceptual_weight(frequency);
            let band = if frequency < bass_max {
                0
            } else if frequency < mid_max {
                1
            } else {
                2
            };
            bands[band][0] += weight * normalised(byte);
            bands[band][1] += weight;
        }

        let level = |band: [f64; 2]| if band[1] > 0.0 { band[0] / band[1] } else { 0.0 };
        let total: f64 = bands.iter().map(|band| band[0]).sum();
        let share = |band: [f64; 2]| if total > 0.0 { band[0] / total * 100.0 } else { 0.0 };

        Self {
            bass: level(bands[0]),
            mid: level(bands[1]),
            high: level(bands[2]),
            bass_percent: share(bands[0]),
            mid_percent: share(bands[1]),
            high_percent: share(bands[2]),
        }
    }
}

/// Spectral shape descriptors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralShape {
    /// Magnitude-weighted mean frequency, Hz
    pub centroid: f64,
    /// Geometric over arithmetic mean of power; 1 for flat or silent spectra
    pub flatness: f64,
    /// Frequency below which most of the energy sits, Hz
    pub rolloff: f64,
}

impl Default for SpectralShape {
    fn default() -> Self {
        Self {
            centroid: 0.0,
            flatness: 1.0,
            rolloff: 0.0,
        }
    }
}

impl SpectralShape {
    /// Describe a spectrum
    pub fn analyse(analysis: &FrequencyAnalysis) -> Self {
        let Some(bin_hz) = analysis.bin_hz() else {
            return Self::default();
        };

        let magnitudes: Vec<f64> = analysis.spectrum.iter().map(|&b| normalised(b)).collect();
        let magnitude_sum: f64 = magnitudes.iter().sum();
        if magnitude_sum <= f64::EPSILON {
            return Self::default();
        }

        let weighted: f64 = magnitudes
            .iter()
            .enumerate()
            .map(|(bin, m)| bin as f64 * bin_hz * m)
            .sum();
        let centroid = weighted / magnitude_sum;

        let count = magnitudes.len() as f64;
        let mut log_sum = 0.0;
        let mut power_sum = 0.0;
        for m in &magnitudes {
            let power = m * m + 1e-12;
            log_sum += power.ln();
            power_sum += power;
        }
        let flatness = ((log_sum / count).exp() / (power_sum / count)).clamp(0.0, 1.0);

        let threshold = magnitude_sum * ROLLOFF_FRACTION;
        let mut cumulative = 0.0;
        let mut rolloff_bin = magnitudes.len() - 1;
        for (bin, m) in magnitudes.iter().enumerate() {
            cumulative += m;
            if cumulative >= threshold {
                rolloff_bin = bin;
                break;
            }
        }

        Self {
            centroid,
            flatness,
            rolloff: rolloff_bin as f64 * bin_hz,
        }
    }
}

/// Positive spectral change between frames, smoothed
#[derive(Debug, Clone, Default)]
pub struct SpectralFlux {
    previous: Vec<u8>,
    smoothed: f64,
}

impl SpectralFlux {
    /// Feed one spectrum; returns the smoothed flux
    pub fn update(&mut self, spectrum: &[u8], smoothing: f64) -> f64 {
        let raw = if spectrum.is_empty() || self.previous.len() != spectrum.len() {
            0.0
        } else {
            let rise: f64 = spectrum
                .iter()
                .zip(&self.previous)
                .map(|(&current, &previous)| (f64::from(current) - f64::from(previous)).max(0.0))
                .sum();
            rise / (spectrum.len() as f64 * 255.0)
        };

        self.previous.clear();
        self.previous.extend_from_slice(spectrum);

        let smoothing = smoothing.clamp(0.0, 0.999);
        self.smoothed = smoothing * self.smoothed + (1.0 - smoothing) * raw;
        self.smoothed
    }

    pub(crate) fn compute(&mut self, inputs: &PortValues) -> PortValues {
        let spectrum = inputs.bytes(fields::FREQUENCY_ANALYSIS);
        let flux = self.update(spectrum, inputs.number("smoothing"));
        PortValues::new().with("flux", flux)
    }
}

pub(crate) fn compute_frequency_band(inputs: &PortValues) -> PortValues {
    let band = inputs
        .analysis(fields::FREQUENCY_ANALYSIS)
        .map(|analysis| frequency_band(analysis, inputs.number("minHz"), inputs.number("maxHz")))
        .unwrap_or_default();
    PortValues::new().with("band", band)
}

pub(crate) fn compute_band_info(inputs: &PortValues) -> PortValues {
    let stats = BandStats::measure(inputs.bytes("band"));
    PortValues::new()
        .with("average", stats.average)
        .with("max", stats.max)
        .with("min", stats.min)
        .with("rms", stats.rms)
        .with("info", stats.to_object())
}

pub(crate) fn compute_audio_volume(inputs: &PortValues) -> PortValues {
    let (rms, peak) = audio_volume(inputs.bytes(fields::AUDIO_SIGNAL));
    PortValues::new().with("rms", rms).with("peak", peak)
}

pub(crate) fn compute_multi_band(inputs: &PortValues) -> PortValues {
    let levels = inputs
        .analysis(fields::FREQUENCY_ANALYSIS)
        .map(|analysis| {
            MultiBandLevels::analyse(analysis, inputs.number("bassMaxHz"), inputs.number("midMaxHz"))
        })
        .unwrap_or_default();
    PortValues::new()
        .with("bass", levels.bass)
        .with("mid", levels.mid)
        .with("high", levels.high)
        .with("bassPercent", levels.bass_percent)
        .with("midPercent", levels.mid_percent)
        .with("highPercent", levels.high_percent)
}

pub(crate) fn compute_spectral_features(inputs: &PortValues) -> PortValues {
    let shape = inputs
        .analysis(fields::FREQUENCY_ANALYSIS)
        .map(SpectralShape::analyse)
        .unwrap_or_default();
    PortValues::new()
        .with("centroid", shape.centroid)
        .with("flatness", shape.flatness)
        .with("rolloff", shape.rolloff)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis_with(bins: &[(usize, u8)]) -> FrequencyAnalysis {
        let mut spectrum = vec![0u8; 1024];
        for &(bin, level) in bins {
            spectrum[bin] = level;
        }
        FrequencyAnalysis::new(spectrum, 44_100, 2048)
    }

    #[test]
    fn test_frequency_band_bounds() {
        let analysis = analysis_with(&[(5, 255)]);
        let band = frequency_band(&analysis, 80.0, 150.0);
        // 80 Hz falls in bin 3, 150 Hz rounds up to bin 7.
        assert_eq!(band.len(), 5);
        assert_eq!(band[2], 255);

        let reversed = frequency_band(&analysis, 150.0, 80.0);
        assert_eq!(band, reversed);
    }

    #[test]
    fn test_frequency_band_degenerate_input() {
        let analysis = FrequencyAnalysis::new(Vec::new(), 44_100, 2048);
        assert!(frequency_band(&analysis, 0.0, 100.0).is_empty());

        let no_rate = FrequencyAnalysis::new(vec![1; 16], 0, 32);
        assert!(frequency_band(&no_rate, 0.0, 100.0).is_empty());

        let above_nyquist = analysis_with(&[]);
        assert!(frequency_band(&above_nyquist, 30_000.0, 40_000.0).is_empty());
    }

    #[test]
    fn test_band_stats() {
        let stats = BandStats::measure(&[0, 255, 0, 255]);
        assert_eq!(stats.average, 0.5);
        assert_eq!(stats.max, 1.0);
        assert_eq!(stats.min, 0.0);
        assert!((stats.rms - 0.5_f64.sqrt()).abs() < 1e-12);
        assert_eq!(BandStats::measure(&[]), BandStats::default());
    }

    #[test]
    fn test_audio_volume() {
        assert_eq!(audio_volume(&[128; 64]), (0.0, 0.0));
        let (rms, peak) = audio_volume(&[0, 255, 0, 255]);
        assert!(rms > 0.99);
        assert_eq!(peak, 1.0);
        assert_eq!(audio_volume(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_multi_band_percentages() {
        // ~107 Hz, ~1 kHz and ~8.6 kHz.
        let analysis = analysis_with(&[(5, 200), (47, 200), (400, 200)]);
        let levels = MultiBandLevels::analyse(&analysis, 250.0, 4000.0);
        let total = levels.bass_percent + levels.mid_percent + levels.high_percent;
        assert!((total - 100.0).abs() < 1e-9);
        // Equal levels, but low frequencies weigh more.
        assert!(levels.bass_percent > levels.mid_percent);
        assert!(levels.mid_percent > levels.high_percent);
        assert!(levels.bass > levels.high);
    }

    #[test]
    fn test_multi_band_silence() {
        let levels = MultiBandLevels::analyse(&analysis_with(&[]), 250.0, 4000.0);
        assert_eq!(levels, MultiBandLevels::default());
    }

    #[test]
    fn test_spectral_shape() {
        let silent = SpectralShape::analyse(&analysis_with(&[]));
        assert_eq!(silent.flatness, 1.0);
        assert_eq!(silent.centroid, 0.0);

        let tone = SpectralShape::analyse(&analysis_with(&[(100, 255)]));
        assert!((tone.centroid - 100.0 * 44_100.0 / 2048.0).abs() < 1e-6);
        assert!(tone.flatness < 0.01);
        assert_eq!(tone.rolloff, tone.centroid);

        let flat = SpectralShape::analyse(&FrequencyAnalysis::new(vec![128; 64], 44_100, 128));
        assert!(flat.flatness > 0.99);
    }

    #[test]
    fn test_spectral_flux_counts_rises_only() {
        let mut flux = SpectralFlux::default();
        assert_eq!(flux.update(&[0, 0, 0, 0], 0.0), 0.0);
        let rising = flux.update(&[255, 255, 0, 0], 0.0);
        assert_eq!(rising, 0.5);
        let falling = flux.update(&[0, 0, 0, 0], 0.0);
        assert_eq!(falling, 0.0);
    }

    #[test]
    fn test_spectral_flux_smoothing_and_resize() {
        let mut flux = SpectralFlux::default();
        flux.update(&[0; 4], 0.5);
        let smoothed = flux.update(&[255; 4], 0.5);
        assert_eq!(smoothed, 0.5);
        // A new spectrum size restarts the history.
        let resized = flux.update(&[255; 8], 0.5);
        assert_eq!(resized, 0.25);
    }
}
