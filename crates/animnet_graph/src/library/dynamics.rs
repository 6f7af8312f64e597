// SPDX-License-Identifier: MIT OR Apache-2.0
//! Smoothing, normalisation and trigger nodes that keep history between frames.

use super::FrameClock;
use crate::frame::FrameContext;
use crate::port::PortValues;
use std::collections::VecDeque;

/// Upper bound on samples held by the normaliser window
const MAX_WINDOW_SAMPLES: usize = 8192;

/// Ranges narrower than this are treated as flat
const DEGENERATE_RANGE: f64 = 1e-9;

/// One-pole coefficient for a time constant in milliseconds
fn one_pole(dt: f64, time_constant_ms: f64) -> f64 {
    if time_constant_ms <= 0.0 {
        return 1.0;
    }
    1.0 - (-dt / (time_constant_ms / 1000.0)).exp()
}

/// Attack/release envelope
#[derive(Debug, Clone, Default)]
pub struct EnvelopeFollower {
    envelope: f64,
    clock: FrameClock,
}

impl EnvelopeFollower {
    /// Advance to `time` with a new input sample
    pub fn process(&mut self, value: f64, attack_ms: f64, release_ms: f64, time: f64) -> f64 {
        let dt = self.clock.tick(time);
        let target = value.abs();

        let coefficient = if target > self.envelope {
            one_pole(dt, attack_ms)
        } else {
            one_pole(dt, release_ms)
        };

        self.envelope += coefficient * (target - self.envelope);
        self.envelope = self.envelope.max(0.0);
        self.envelope
    }

    pub(crate) fn compute(&mut self, inputs: &PortValues, frame: &FrameContext) -> PortValues {
        let envelope = self.process(
            inputs.number("value"),
            inputs.number("attackMs"),
            inputs.number("releaseMs"),
            frame.time,
        );
        PortValues::new().with("envelope", envelope)
    }
}

/// Result of one normaliser update
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NormalizeSnapshot {
    /// Input mapped into the window's quantile range, 0..1
    pub result: f64,
    /// Lower quantile
    pub low: f64,
    /// Upper quantile
    pub high: f64,
}

/// Quantile-based normaliser over a sliding time window
#[derive(Debug, Clone, Default)]
pub struct AdaptiveNormalize {
    window: VecDeque<(f64, f64)>,
    snapshot: NormalizeSnapshot,
    sorted: Vec<f64>,
}

impl AdaptiveNormalize {
    /// Ingest `value` at `time` and normalise it against the window
    pub fn update(
        &mut self,
        value: f64,
        time: f64,
        window_ms: f64,
        q_low: f64,
        q_high: f64,
        freeze_below: f64,
    ) -> NormalizeSnapshot {
        if self.window.back().is_some_and(|&(t, _)| time < t) {
            tracing::debug!(time, "time went backwards, clearing normaliser window");
            self.window.clear();
        }

        let frozen = freeze_below > 0.0 && value < freeze_below;
        if !frozen {
            self.window.push_back((time, value));
            if self.window.len() > MAX_WINDOW_SAMPLES {
                self.window.pop_front();
            }
        }

        let horizon = time - window_ms.max(0.0) / 1000.0;
        while self.window.front().is_some_and(|&(t, _)| t < horizon) {
            self.window.pop_front();
        }

        if self.window.is_empty() {
            return self.snapshot;
        }

        self.sorted.clear();
        self.sorted.extend(self.window.iter().map(|&(_, v)| v));
        self.sorted.sort_by(f64::total_cmp);

        let (q_low, q_high) = {
            let a = q_low.clamp(0.0, 1.0);
            let b = q_high.clamp(0.0, 1.0);
            (a.min(b), a.max(b))
        };
        let last = (self.sorted.len() - 1) as f64;
        let low = self.sorted[(q_low * last).round() as usize];
        let high = self.sorted[(q_high * last).round() as usize];

        let range = high - low;
        let result = if range > DEGENERATE_RANGE {
            ((value - low) / range).clamp(0.0, 1.0)
        } else {
            0.0
        };

        self.snapshot = NormalizeSnapshot { result, low, high };
        self.snapshot
    }

    /// Samples currently in the window
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub(crate) fn compute(&mut self, inputs: &PortValues, frame: &FrameContext) -> PortValues {
        let snapshot = self.update(
            inputs.number("value"),
            frame.time,
            inputs.number("windowMs"),
            inputs.number("qLow"),
            inputs.number("qHigh"),
            inputs.number("freezeBelow"),
        );
        PortValues::new()
            .with("result", snapshot.result)
            .with("low", snapshot.low)
            .with("high", snapshot.high)
    }
}

/// Latch that opens at `high` and closes below `low`
#[derive(Debug, Clone, Default)]
pub struct HysteresisGate {
    open: bool,
}

impl HysteresisGate {
    /// Returns the gated value and the 0/1 state
    pub fn update(&mut self, value: f64, low: f64, high: f64) -> (f64, f64) {
        if !self.open && value >= high {
            self.open = true;
        } else if self.open && value < low {
            self.open = false;
        }

        if self.open {
            (value, 1.0)
        } else {
            (0.0, 0.0)
        }
    }

    /// Whether the gate is currently open
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub(crate) fn compute(&mut self, inputs: &PortValues) -> PortValues {
        let (value, state) = self.update(
            inputs.number("value"),
            inputs.number("low"),
            inputs.number("high"),
        );
        PortValues::new().with("value", value).with("state", state)
    }
}

/// Counts rising edges through a threshold, wrapping at `max_value`
#[derive(Debug, Clone, Default)]
pub struct ThresholdCounter {
    above: bool,
    count: Option<u32>,
}

impl ThresholdCounter {
    /// Feed a sample; returns the current count
    pub fn update(&mut self, value: f64, threshold: f64, max_value: f64) -> u32 {
        let modulus = if max_value.is_finite() {
            max_value.floor().max(1.0) as u32
        } else {
            1
        };

        let above = value >= threshold;
        if above && !self.above {
            // The first trigger selects mode zero; later ones advance.
            self.count = Some(match self.count {
                None => 0,
                Some(count) => (count + 1) % modulus,
            });
        }
        self.above = above;

        self.count.unwrap_or(0) % modulus
    }

    pub(crate) fn compute(&mut self, inputs: &PortValues) -> PortValues {
        let count = self.update(
            inputs.number("value"),
            inputs.number("threshold"),
            inputs.number("maxValue"),
        );
        PortValues::new().with("count", f64::from(count))
    }
}

/// Holds the last accepted value for at least `min_interval_ms`
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    held: Option<f64>,
    last_change: f64,
}

impl RateLimiter {
    /// Feed a sample; returns the held value
    pub fn update(&mut self, value: f64, min_interval_ms: f64, time: f64) -> f64 {
        let Some(held) = self.held else {
            self.held = Some(value);
            self.last_change = time;
            return value;
        };

        if time < self.last_change {
            self.last_change = time;
        }

        let elapsed_ms = (time - self.last_change) * 1000.0;
        if value != held && elapsed_ms >= min_interval_ms {
            self.held = Some(value);
            self.last_change = time;
            return value;
        }

        held
    }

    pub(crate) fn compute(&mut self, inputs: &PortValues, frame: &FrameContext) -> PortValues {
        let value = self.update(inputs.number("value"), inputs.number("minIntervalMs"), frame.time);
        PortValues::new().with("value", value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionPhase {
    Idle,
    Holding,
    Cooldown,
}

/// Fires when the input jumps by at least `threshold` between frames
#[derive(Debug, Clone, Default)]
pub struct SectionChangeDetector {
    previous: Option<f64>,
    triggered_at: Option<f64>,
}

impl SectionChangeDetector {
    /// Returns the trigger (0/1) and the frame-to-frame change
    pub fn update(
        &mut self,
        value: f64,
        threshold: f64,
        hold_ms: f64,
        cooldown_ms: f64,
        time: f64,
    ) -> (f64, f64) {
        let change = self.previous.map_or(0.0, |previous| (value - previous).abs());
        self.previous = Some(value);

        let hold_ms = hold_ms.max(0.0);
        let cooldown_ms = cooldown_ms.max(0.0);

        let mut phase = match self.triggered_at {
            Some(started) => {
                let elapsed_ms = (time - started) * 1000.0;
                if elapsed_ms < 0.0 {
                    tracing::debug!(time, started, "playback looped, resetting section trigger");
                    self.triggered_at = None;
                    SectionPhase::Idle
                } else if elapsed_ms < hold_ms {
                    SectionPhase::Holding
                } else if elapsed_ms < hold_ms + cooldown_ms {
                    SectionPhase::Cooldown
                } else {
                    self.triggered_at = None;
                    SectionPhase::Idle
                }
            }
            None => SectionPhase::Idle,
        };

        if phase == SectionPhase::Idle && change > 0.0 && change >= threshold {
            self.triggered_at = Some(time);
            // A zero hold still reports the firing frame.
            phase = SectionPhase::Holding;
        }

        let trigger = if phase == SectionPhase::Holding { 1.0 } else { 0.0 };
        (trigger, change)
    }

    pub(crate) fn compute(&mut self, inputs: &PortValues, frame: &FrameContext) -> PortValues {
        let (trigger, change) = self.update(
            inputs.number("value"),
            inputs.number("threshold"),
            inputs.number("holdMs"),
            inputs.number("cooldownMs"),
            frame.time,
        );
        PortValues::new().with("trigger", trigger).with("change", change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: f64 = 1.0 / 60.0;

    #[test]
    fn test_envelope_converges_to_constant_input() {
        let mut follower = EnvelopeFollower::default();
        let mut envelope = 0.0;
        for frame in 0..600 {
            envelope = follower.process(-0.7, 10.0, 200.0, frame as f64 * FRAME);
        }
        assert!((envelope - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_envelope_releases_slower_than_attack() {
        let mut follower = EnvelopeFollower::default();
        follower.process(0.0, 5.0, 500.0, 0.0);
        let attacked = follower.process(1.0, 5.0, 500.0, FRAME);
        assert!(attacked > 0.9);

        let released = follower.process(0.0, 5.0, 500.0, 2.0 * FRAME);
        assert!(released > 0.9 * attacked);
        assert!(released >= 0.0);
    }

    #[test]
    fn test_envelope_first_frame_has_no_elapsed_time() {
        let mut follower = EnvelopeFollower::default();
        assert_eq!(follower.process(1.0, 10.0, 10.0, 5.0), 0.0);
    }

    #[test]
    fn test_normalize_constant_stream_is_degenerate() {
        let mut normalize = AdaptiveNormalize::default();
        let mut snapshot = NormalizeSnapshot::default();
        for frame in 0..200 {
            snapshot = normalize.update(0.4, frame as f64 * FRAME, 1000.0, 0.05, 0.95, 0.0);
        }
        assert_eq!(snapshot.low, 0.4);
        assert_eq!(snapshot.high, 0.4);
        assert_eq!(snapshot.result, 0.0);
    }

    #[test]
    fn test_normalize_drops_old_samples() {
        let mut normalize = AdaptiveNormalize::default();
        for frame in 0..120 {
            normalize.update(frame as f64, frame as f64 * FRAME, 500.0, 0.0, 1.0, 0.0);
        }
        // 500 ms at 60 fps keeps 31 samples including both ends.
        assert!(normalize.window_len() <= 31);
        let snapshot = normalize.update(200.0, 120.0 * FRAME, 500.0, 0.0, 1.0, 0.0);
        assert_eq!(snapshot.result, 1.0);
    }

    #[test]
    fn test_normalize_ranges_between_quantiles() {
        let mut normalize = AdaptiveNormalize::default();
        for (i, value) in [0.0, 1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            normalize.update(*value, i as f64 * 0.1, 10_000.0, 0.0, 1.0, 0.0);
        }
        let snapshot = normalize.update(2.0, 0.5, 10_000.0, 0.0, 1.0, 0.0);
        assert_eq!(snapshot.low, 0.0);
        assert_eq!(snapshot.high, 4.0);
        assert_eq!(snapshot.result, 0.5);
    }

    #[test]
    fn test_normalize_accepts_negative_input_with_defaults() {
        let mut normalize = AdaptiveNormalize::default();
        let frame = |i: usize| FrameContext::silent(44_100, 64, i as f64 * FRAME);
        let inputs = |value: f64| {
            PortValues::new()
                .with("value", value)
                .with("windowMs", 4000.0)
                .with("qLow", 0.05)
                .with("qHigh", 0.95)
                .with("freezeBelow", 0.0)
        };

        let mut outputs = PortValues::new();
        for i in 0..100 {
            let value = -1.0 + 0.9 * i as f64 / 99.0;
            outputs = normalize.compute(&inputs(value), &frame(i));
        }
        assert_eq!(normalize.window_len(), 100);
        assert!(outputs.number("low") < -0.9);
        assert!(outputs.number("high") > -0.2 && outputs.number("high") < -0.1);
        assert_eq!(outputs.number("result"), 1.0);
    }

    #[test]
    fn test_normalize_frozen_returns_last_snapshot() {
        let mut normalize = AdaptiveNormalize::default();
        normalize.update(0.2, 0.0, 100.0, 0.0, 1.0, 0.1);
        let before = normalize.update(0.8, 0.05, 100.0, 0.0, 1.0, 0.1);

        // Below the freeze level nothing is ingested; once the window ages out
        // the last snapshot is held instead of dropping to zero.
        let frozen = normalize.update(0.0, 1.0, 100.0, 0.0, 1.0, 0.1);
        assert_eq!(normalize.window_len(), 0);
        assert_eq!(frozen, before);
        assert_eq!(frozen.result, 1.0);
    }

    #[test]
    fn test_hysteresis_gate_sequence() {
        let mut gate = HysteresisGate::default();
        let states: Vec<f64> = [0.0, 0.3, 0.6, 0.3, 0.1]
            .iter()
            .map(|&v| gate.update(v, 0.2, 0.5).1)
            .collect();
        assert_eq!(states, vec![0.0, 0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_hysteresis_gate_passes_value_while_open() {
        let mut gate = HysteresisGate::default();
        assert_eq!(gate.update(0.7, 0.2, 0.5), (0.7, 1.0));
        assert_eq!(gate.update(0.25, 0.2, 0.5), (0.25, 1.0));
        assert_eq!(gate.update(0.1, 0.2, 0.5), (0.0, 0.0));
        assert!(!gate.is_open());
    }

    #[test]
    fn test_threshold_counter_wraps_on_rising_edges() {
        let mut counter = ThresholdCounter::default();
        let input = [0.0, 1.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0];
        let counts: Vec<u32> = input.iter().map(|&v| counter.update(v, 0.5, 2.0)).collect();

        // Crossings at index 1, 5 and 8.
        assert_eq!(counts[1], 0);
        assert_eq!(counts[5], 1);
        assert_eq!(counts[8], 0);
        // Holding above does not advance.
        assert_eq!(counts[2], counts[1]);
        assert_eq!(counts[3], counts[1]);
        assert_eq!(counts[9], counts[8]);
    }

    #[test]
    fn test_threshold_counter_guards_bad_modulus() {
        let mut counter = ThresholdCounter::default();
        for i in 0..6 {
            let value = if i % 2 == 0 { 1.0 } else { 0.0 };
            assert_eq!(counter.update(value, 0.5, 0.0), 0);
        }
    }

    #[test]
    fn test_rate_limiter_suppresses_fast_changes() {
        let mut limiter = RateLimiter::default();
        assert_eq!(limiter.update(0.0, 250.0, 0.0), 0.0);
        assert_eq!(limiter.update(1.0, 250.0, 0.5), 1.0);
        // Within 250 ms of the last accepted change.
        assert_eq!(limiter.update(2.0, 250.0, 0.6), 1.0);
        assert_eq!(limiter.update(2.0, 250.0, 0.7), 1.0);
        // Interval elapsed.
        assert_eq!(limiter.update(3.0, 250.0, 0.8), 3.0);
    }

    #[test]
    fn test_section_change_hold_and_cooldown() {
        let mut detector = SectionChangeDetector::default();
        let step = |d: &mut SectionChangeDetector, v: f64, t: f64| d.update(v, 0.3, 100.0, 500.0, t).0;

        assert_eq!(step(&mut detector, 0.0, 0.0), 0.0);
        assert_eq!(step(&mut detector, 0.5, 0.05), 1.0);
        assert_eq!(step(&mut detector, 0.5, 0.10), 1.0);
        // Hold over, cooling down: a second jump is ignored.
        assert_eq!(step(&mut detector, 0.0, 0.20), 0.0);
        assert_eq!(step(&mut detector, 0.9, 0.30), 0.0);
        // Cooldown over.
        assert_eq!(step(&mut detector, 0.0, 0.70), 1.0);
    }

    #[test]
    fn test_section_change_resets_when_time_loops() {
        let mut detector = SectionChangeDetector::default();
        detector.update(0.0, 0.3, 100.0, 10_000.0, 5.0);
        assert_eq!(detector.update(1.0, 0.3, 100.0, 10_000.0, 5.1).0, 1.0);
        // Playback jumped back to the start while cooling down.
        let (trigger, change) = detector.update(0.0, 0.3, 100.0, 10_000.0, 0.0);
        assert_eq!(change, 1.0);
        assert_eq!(trigger, 1.0);
    }
}
