//! Slope-based door motion classifier.
//!
//! Distance shrinks while the door opens (the sensor looks up at the panel
//! rolling toward it) and grows while it closes. The classifier fits a line
//! through the last [`WINDOW`] samples and only acts on slopes inside the
//! `(jitter_slope, max_slope)` band; anything else keeps the previous state.
use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

/// Samples in the regression window.
pub const WINDOW: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionState {
    Opening,
    Closing,
    Static,
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MotionState::Opening => "opening",
            MotionState::Closing => "closing",
            MotionState::Static => "static",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub sequence: u64,
    pub distance_cm: f64,
}

impl MotionSample {
    pub fn new(sequence: u64, distance_cm: f64) -> Self {
        Self {
            sequence,
            distance_cm,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MotionClassifier {
    window: VecDeque<MotionSample>,
    /// Running ceiling; raised whenever a steeper slope is seen.
    pub max_slope: f64,
    pub jitter_slope: f64,
    state: MotionState,
    last_slope: Option<f64>,
}

impl MotionClassifier {
    pub fn new(max_slope: f64, jitter_slope: f64) -> Self {
        Self {
            window: VecDeque::with_capacity(WINDOW),
            max_slope,
            jitter_slope,
            state: MotionState::Static,
            last_slope: None,
        }
    }

    pub fn input(&mut self, sample: MotionSample) {
        if self.window.len() == WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(sample);
        if self.window.len() < WINDOW {
            return;
        }

        // Degenerate x spread (repeated sequence numbers): no slope to act on.
        let Some(m) = ols_slope(&self.window) else {
            return;
        };
        self.last_slope = Some(m);

        let magnitude = m.abs();
        if magnitude > self.max_slope {
            self.max_slope = magnitude;
        }

        if magnitude == 0.0 || (magnitude > self.jitter_slope && magnitude < self.max_slope) {
            self.state = if m < 0.0 {
                MotionState::Opening
            } else if m > 0.0 {
                MotionState::Closing
            } else {
                MotionState::Static
            };
        }
    }

    #[inline]
    pub fn motion(&self) -> MotionState {
        self.state
    }

    /// Slope from the most recent full window, if any.
    pub fn last_slope(&self) -> Option<f64> {
        self.last_slope
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

/// Least-squares slope of distance over sequence, mean-centered for precision.
fn ols_slope(window: &VecDeque<MotionSample>) -> Option<f64> {
    let n = window.len() as f64;
    // Offsets from the first sequence keep large counters exact in f64.
    let base = window.front()?.sequence;
    let xs: Vec<f64> = window
        .iter()
        .map(|s| s.sequence.wrapping_sub(base) as f64)
        .collect();
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = window.iter().map(|s| s.distance_cm).sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (x, s) in xs.iter().zip(window) {
        let dx = x - x_mean;
        sxy += dx * (s.distance_cm - y_mean);
        sxx += dx * dx;
    }
    if sxx == 0.0 {
        return None;
    }
    Some(sxy / sxx)
}
