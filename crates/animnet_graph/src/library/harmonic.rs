// SPDX-License-Identifier: MIT OR Apache-2.0
//! Harmonic series scoring over a byte spectrum.

use crate::frame::{fields, FrequencyAnalysis};
use crate::port::PortValues;

/// Upper bound on the number of harmonics scored
pub const MAX_HARMONICS: usize = 16;

/// Candidates scoring below this are ignored
const MIN_SCORE: f64 = 0.05;

/// Peaks must reach this level, and this fraction of the loudest bin
const ABSOLUTE_PEAK_FLOOR: f64 = 0.05;
const RELATIVE_PEAK_FLOOR: f64 = 0.1;

/// A locked fundamental follows candidates within this distance
const LOCK_CENTS: f64 = 50.0;

/// A new candidate must beat the lock's score by this factor to replace it
const REPLACE_RATIO: f64 = 1.25;

/// Frames after which an unrefreshed lock may be replaced by anything
const STALE_FRAMES: u32 = 30;

/// Best harmonic series found in one spectrum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicCandidate {
    /// Estimated fundamental in Hz
    pub fundamental: f64,
    /// Weighted coverage times weighted energy ratio, 0..1
    pub score: f64,
}

fn cents_between(a: f64, b: f64) -> f64 {
    1200.0 * (a / b).log2()
}

/// Score the harmonic series built on `f0_bin` (fractional bin index)
fn score_series(magnitudes: &[f64], f0_bin: f64, harmonics: usize, tolerance_cents: f64, floor: f64) -> f64 {
    let tolerance_ratio = 2f64.powf(tolerance_cents.max(0.0) / 1200.0) - 1.0;
    let last = magnitudes.len() - 1;

    let mut weight_total = 0.0;
    let mut weight_covered = 0.0;
    let mut weighted_harmonic_energy = 0.0;
    let mut weighted_region_energy = 0.0;

    for h in 1..=harmonics {
        let target = f0_bin * h as f64;
        if target > last as f64 {
            break;
        }
        let weight = 1.0 / h as f64;
        weight_total += weight;

        let tolerance = (target * tolerance_ratio).max(0.5);
        let start = (target - tolerance).ceil().max(0.0) as usize;
        let end = ((target + tolerance).floor() as usize).min(last);

        let mut peak = 0.0_f64;
        let mut energy = 0.0;
        for m in magnitudes.iter().take(end + 1).skip(start) {
            peak = peak.max(*m);
            energy += m * m;
        }

        let region_start = ((h as f64 - 0.5) * f0_bin).ceil().max(0.0) as usize;
        let region_end = (((h as f64 + 0.5) * f0_bin).ceil() as usize).min(last + 1);
        let region_energy: f64 = magnitudes
            .iter()
            .take(region_end)
            .skip(region_start)
            .map(|m| m * m)
            .sum();

        if peak >= floor {
            weight_covered += weight;
        }
        if region_energy > 0.0 {
            weighted_harmonic_energy += weight * energy.min(region_energy);
            weighted_region_energy += weight * region_energy;
        }
    }

    if weight_total <= 0.0 || weighted_region_energy <= 0.0 {
        return 0.0;
    }
    (weight_covered / weight_total) * (weighted_harmonic_energy / weighted_region_energy)
}

/// Find the best-scoring fundamental in `[min_hz, max_hz]`
pub fn best_candidate(
    analysis: &FrequencyAnalysis,
    min_hz: f64,
    max_hz: f64,
    harmonics: usize,
    tolerance_cents: f64,
) -> Option<HarmonicCandidate> {
    let bin_hz = analysis.bin_hz()?;
    if analysis.spectrum.len() < 3 {
        return None;
    }

    let magnitudes: Vec<f64> = analysis.spectrum.iter().map(|&b| f64::from(b) / 255.0).collect();
    let loudest = magnitudes.iter().copied().fold(0.0, f64::max);
    let floor = ABSOLUTE_PEAK_FLOOR.max(RELATIVE_PEAK_FLOOR * loudest);
    if loudest < floor {
        return None;
    }

    let (low_hz, high_hz) = if min_hz <= max_hz {
        (min_hz, max_hz)
    } else {
        (max_hz, min_hz)
    };
    let last = magnitudes.len() - 1;
    let first_bin = ((low_hz / bin_hz).ceil().max(1.0)) as usize;
    let last_bin = ((high_hz / bin_hz).floor() as usize).min(last - 1);
    let harmonics = harmonics.clamp(1, MAX_HARMONICS);

    let mut best: Option<HarmonicCandidate> = None;
    for bin in first_bin..=last_bin {
        let (before, at, after) = (magnitudes[bin - 1], magnitudes[bin], magnitudes[bin + 1]);
        if at < floor || at <= before || at < after {
            continue;
        }

        let curvature = before - 2.0 * at + after;
        let offset = if curvature.abs() > f64::EPSILON {
            (0.5 * (before - after) / curvature).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        let f0_bin = bin as f64 + offset;

        let score = score_series(&magnitudes, f0_bin, harmonics, tolerance_cents, floor);
        if best.map_or(true, |b| score > b.score) {
            best = Some(HarmonicCandidate {
                fundamental: f0_bin * bin_hz,
                score,
            });
        }
    }

    best.filter(|candidate| candidate.score >= MIN_SCORE)
}

#[derive(Debug, Clone, Copy)]
struct Lock {
    fundamental: f64,
    score: f64,
    age: u32,
}

/// Smooths presence and holds a fundamental across frames
#[derive(Debug, Clone, Default)]
pub struct HarmonicPresence {
    presence: f64,
    lock: Option<Lock>,
}

impl HarmonicPresence {
    /// Fold one frame's candidate in; returns `(presence, fundamental)`
    pub fn track(&mut self, candidate: Option<HarmonicCandidate>, smoothing: f64) -> (f64, f64) {
        let smoothing = smoothing.clamp(0.0, 0.999);
        let raw = candidate.map_or(0.0, |c| c.score);
        self.presence = smoothing * self.presence + (1.0 - smoothing) * raw;

        if let Some(lock) = self.lock.as_mut() {
            lock.age = lock.age.saturating_add(1);
        }

        if let Some(candidate) = candidate {
            self.lock = match self.lock {
                Some(lock) if cents_between(candidate.fundamental, lock.fundamental).abs() <= LOCK_CENTS => {
                    Some(Lock {
                        fundamental: candidate.fundamental,
                        score: candidate.score,
                        age: 0,
                    })
                }
                Some(lock) if candidate.score < lock.score * REPLACE_RATIO && lock.age < STALE_FRAMES => {
                    Some(lock)
                }
                _ => Some(Lock {
                    fundamental: candidate.fundamental,
                    score: candidate.score,
                    age: 0,
                }),
            };
        }

        (self.presence, self.lock.map_or(0.0, |lock| lock.fundamental))
    }

    pub(crate) fn compute(&mut self, inputs: &PortValues) -> PortValues {
        let harmonics = inputs.number("harmonics").round().max(1.0) as usize;
        let candidate = inputs.analysis(fields::FREQUENCY_ANALYSIS).and_then(|analysis| {
            best_candidate(
                analysis,
                inputs.number("minHz"),
                inputs.number("maxHz"),
                harmonics,
                inputs.number("toleranceCents"),
            )
        });
        let (presence, fundamental) = self.track(candidate, inputs.number("smoothing"));

        PortValues::new()
            .with("presence", presence)
            .with("fundamental", fundamental)
            .with("confidence", candidate.map_or(0.0, |c| c.score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(fundamental_bin: usize, levels: &[u8]) -> FrequencyAnalysis {
        let mut spectrum = vec![0u8; 1024];
        for (i, &level) in levels.iter().enumerate() {
            spectrum[fundamental_bin * (i + 1)] = level;
        }
        FrequencyAnalysis::new(spectrum, 44_100, 2048)
    }

    #[test]
    fn test_full_series_scores_one() {
        let analysis = series(10, &[255, 200, 160, 120, 100]);
        let candidate = best_candidate(&analysis, 60.0, 2000.0, 5, 50.0).unwrap();
        assert!((candidate.fundamental - 10.0 * 44_100.0 / 2048.0).abs() < 1e-9);
        assert!((candidate.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_harmonics_lower_the_score() {
        let full = series(10, &[255, 200, 160, 120, 100]);
        let sparse = series(10, &[255]);
        let full_score = best_candidate(&full, 60.0, 2000.0, 5, 50.0).unwrap().score;
        let sparse_score = best_candidate(&sparse, 60.0, 2000.0, 5, 50.0).unwrap().score;
        assert!(sparse_score < full_score);
        // Only the fundamental is covered: weight 1 of 1 + 1/2 + 1/3 + 1/4 + 1/5.
        assert!((sparse_score - 1.0 / 2.283_333_333_333_333).abs() < 1e-9);
    }

    #[test]
    fn test_silence_has_no_candidate() {
        let silent = FrequencyAnalysis::new(vec![0; 1024], 44_100, 2048);
        assert!(best_candidate(&silent, 60.0, 2000.0, 5, 50.0).is_none());

        let mut tracker = HarmonicPresence::default();
        assert_eq!(tracker.track(None, 0.6), (0.0, 0.0));
    }

    #[test]
    fn test_presence_smoothing() {
        let mut tracker = HarmonicPresence::default();
        let candidate = HarmonicCandidate {
            fundamental: 220.0,
            score: 1.0,
        };
        let (presence, fundamental) = tracker.track(Some(candidate), 0.6);
        assert!((presence - 0.4).abs() < 1e-12);
        assert_eq!(fundamental, 220.0);
    }

    #[test]
    fn test_lock_holds_against_weaker_candidates() {
        let mut tracker = HarmonicPresence::default();
        tracker.track(
            Some(HarmonicCandidate {
                fundamental: 220.0,
                score: 0.8,
            }),
            0.5,
        );

        // Within 50 cents the lock follows.
        let (_, followed) = tracker.track(
            Some(HarmonicCandidate {
                fundamental: 222.0,
                score: 0.5,
            }),
            0.5,
        );
        assert_eq!(followed, 222.0);

        // A distant, not clearly better candidate is ignored.
        let (_, held) = tracker.track(
            Some(HarmonicCandidate {
                fundamental: 330.0,
                score: 0.6,
            }),
            0.5,
        );
        assert_eq!(held, 222.0);

        // A clearly better one takes over.
        let (_, replaced) = tracker.track(
            Some(HarmonicCandidate {
                fundamental: 330.0,
                score: 0.7,
            }),
            0.5,
        );
        assert_eq!(replaced, 330.0);
    }

    #[test]
    fn test_stale_lock_is_replaced() {
        let mut tracker = HarmonicPresence::default();
        let strong = HarmonicCandidate {
            fundamental: 220.0,
            score: 1.0,
        };
        let weak = HarmonicCandidate {
            fundamental: 330.0,
            score: 0.2,
        };
        tracker.track(Some(strong), 0.5);
        for _ in 0..STALE_FRAMES - 1 {
            assert_eq!(tracker.track(None, 0.5).1, 220.0);
        }
        assert_eq!(tracker.track(Some(weak), 0.5).1, 330.0);
    }
}
