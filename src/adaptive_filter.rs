//! Adaptive Three-Phase Noise Filter
//!
//! This module turns raw controller readings into stable display values.
//!
//! ## The Problem
//! The controller's analog channels are noisy and heavily disturbed right
//! after power-on:
//! - ADC quantisation and supply ripple on every sample
//! - Occasional single-sample outliers (loose contacts, EMI)
//! - A settling drift while the gas sensor heater warms up
//!
//! A single fixed low-pass filter is either too slow once the signal is
//! quiet or too easily dragged around by outliers while it is settling.
//!
//! ## The Solution
//! Three phases, advanced by the number of accepted samples since connect:
//! 1. **Calibrating** (samples 1-15): collect raw values and pass them
//!    through unchanged. At sample 15 the baseline is the median of the
//!    collected values, so outliers do not skew it.
//! 2. **Stabilizing** (samples 16-25): median of a 5-sample window, blended
//!    into the previous output with a low weight (0.3). Outliers are still
//!    rejected while the signal settles.
//! 3. **Steady** (samples 26+): mean of the same window, blended with a
//!    high weight (0.6) for faster tracking once noise has subsided.

use crate::channel::ChannelId;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

// ============================================================================
// FILTER CONSTANTS
// ============================================================================

/// Samples collected before the baseline is computed
pub const CALIBRATION_SAMPLES: usize = 15;
/// Samples after calibration that use the median (stabilizing) path
pub const STABILIZING_SAMPLES: usize = 10;
/// Capacity of the smoothing window
pub const WINDOW_CAPACITY: usize = 5;
/// Window entries needed before smoothing is applied
const MIN_WINDOW_FILL: usize = 3;
/// Copies of the baseline seeded into the window at the end of calibration
const BASELINE_SEED_COPIES: usize = 3;
/// EMA weight of the window median while stabilizing
pub const STABILIZING_ALPHA: f64 = 0.3;
/// EMA weight of the window mean in steady state
pub const STEADY_ALPHA: f64 = 0.6;

/// Filter phase for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterPhase {
    /// Collecting samples for the baseline; raw values pass through
    Calibrating,
    /// Median window with slow smoothing
    Stabilizing,
    /// Mean window with fast smoothing (terminal until reset)
    Steady,
}

/// Result of filtering one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOutput {
    /// The value to display
    pub value: f64,
    /// Phase that produced the value
    pub phase: FilterPhase,
}

/// Per-channel adaptive filter state
#[derive(Debug, Clone)]
pub struct AdaptiveFilter {
    phase: FilterPhase,

    /// Raw samples collected during calibration
    calibration: Vec<f64>,

    /// Smoothing window shared by the stabilizing and steady phases
    window: VecDeque<f64>,

    /// Samples accepted since the last reset
    accepted: usize,

    /// Previous output, blended into the next one
    last_filtered: Option<f64>,

    /// Median of the calibration samples, once known
    baseline: Option<f64>,
}

impl Default for AdaptiveFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveFilter {
    pub fn new() -> Self {
        Self {
            phase: FilterPhase::Calibrating,
            calibration: Vec::with_capacity(CALIBRATION_SAMPLES),
            window: VecDeque::with_capacity(WINDOW_CAPACITY + 1),
            accepted: 0,
            last_filtered: None,
            baseline: None,
        }
    }

    /// Filter one accepted raw sample.
    pub fn filter(&mut self, raw: f64) -> FilterOutput {
        self.accepted += 1;

        let value = match self.phase {
            FilterPhase::Calibrating => self.calibrate(raw),
            FilterPhase::Stabilizing | FilterPhase::Steady => {
                if self.phase == FilterPhase::Stabilizing
                    && self.accepted > CALIBRATION_SAMPLES + STABILIZING_SAMPLES
                {
                    debug!("[Filter] Steady after {} samples", self.accepted - 1);
                    self.phase = FilterPhase::Steady;
                }
                self.smooth(raw)
            }
        };

        self.last_filtered = Some(value);
        FilterOutput {
            value,
            phase: self.phase_of_output(),
        }
    }

    fn calibrate(&mut self, raw: f64) -> f64 {
        self.calibration.push(raw);
        if self.calibration.len() < CALIBRATION_SAMPLES {
            return raw;
        }

        let baseline = median(&self.calibration);
        self.baseline = Some(baseline);
        self.window.clear();
        for _ in 0..BASELINE_SEED_COPIES {
            self.window.push_back(baseline);
        }
        self.phase = FilterPhase::Stabilizing;
        debug!(
            "[Filter] Calibrated from {} samples: baseline={:.3}",
            self.calibration.len(),
            baseline
        );
        baseline
    }

    fn smooth(&mut self, raw: f64) -> f64 {
        self.window.push_back(raw);
        if self.window.len() > WINDOW_CAPACITY {
            self.window.pop_front();
        }

        if self.window.len() < MIN_WINDOW_FILL {
            return raw;
        }

        let buffer: Vec<f64> = self.window.iter().copied().collect();
        let (center, alpha) = match self.phase {
            FilterPhase::Steady => (mean(&buffer), STEADY_ALPHA),
            _ => (median(&buffer), STABILIZING_ALPHA),
        };

        match self.last_filtered {
            Some(last) => alpha * center + (1.0 - alpha) * last,
            None => center,
        }
    }

    /// The sample that completes calibration is reported as calibration output.
    fn phase_of_output(&self) -> FilterPhase {
        if self.accepted == CALIBRATION_SAMPLES {
            FilterPhase::Calibrating
        } else {
            self.phase
        }
    }

    pub fn phase(&self) -> FilterPhase {
        self.phase
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    pub fn last_filtered(&self) -> Option<f64> {
        self.last_filtered
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Return to calibration (call on every new connection)
    pub fn reset(&mut self) {
        self.phase = FilterPhase::Calibrating;
        self.calibration.clear();
        self.window.clear();
        self.accepted = 0;
        self.last_filtered = None;
        self.baseline = None;
    }
}

/// One adaptive filter per channel
#[derive(Debug, Clone, Default)]
pub struct FilterBank {
    filters: [AdaptiveFilter; 3],
}

impl FilterBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&mut self, channel: ChannelId, raw: f64) -> FilterOutput {
        let filter = &mut self.filters[channel.index()];
        let out = filter.filter(raw);
        if filter.accepted() == CALIBRATION_SAMPLES {
            info!("[Filter] {} baseline: {:.3}", channel, out.value);
        }
        out
    }

    pub fn get(&self, channel: ChannelId) -> &AdaptiveFilter {
        &self.filters[channel.index()]
    }

    pub fn reset_all(&mut self) {
        for f in self.filters.iter_mut() {
            f.reset();
        }
    }
}

/// Middle element of the sorted values (upper middle for even lengths).
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted[sorted.len() / 2]
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
