//! Transfer functions mapping raw feature values to conductivity contributions.

use crate::errors::{RealignError, RealignResult};
use crate::grid::Grid;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// Ramp between two thresholds `[t0, t1]`
    PiecewiseLinear,
    /// Binary step at a single cutoff
    Threshold,
}

/// Activation settings for one feature channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activation {
    pub mode: ActivationMode,
    pub thresholds: Vec<f64>,
    /// When true, high raw values map to high conductivity
    #[serde(default)]
    pub ascending: bool,
}

impl Activation {
    pub fn piecewise(t0: f64, t1: f64, ascending: bool) -> Self {
        Self {
            mode: ActivationMode::PiecewiseLinear,
            thresholds: vec![t0, t1],
            ascending,
        }
    }

    pub fn threshold(cutoff: f64, ascending: bool) -> Self {
        Self {
            mode: ActivationMode::Threshold,
            thresholds: vec![cutoff],
            ascending,
        }
    }

    pub fn validate(&self) -> RealignResult<()> {
        check_thresholds(&self.thresholds, self.mode).map(|_| ())
    }

    pub fn apply(&self, grid: &Grid) -> RealignResult<Grid> {
        activate(grid, &self.thresholds, self.mode, self.ascending)
    }
}

/// Maps every valid cell of `grid` into [0, 1].
///
/// Piecewise-linear: 1 at or below `t0`, 0 at or above `t1`, linear in
/// between. Threshold: 1 below the cutoff, 0 from it upward. `ascending`
/// flips either curve. No-data cells stay no-data.
pub fn activate(
    grid: &Grid,
    thresholds: &[f64],
    mode: ActivationMode,
    ascending: bool,
) -> RealignResult<Grid> {
    let (t0, t1) = check_thresholds(thresholds, mode)?;
    let descending = move |v: f64| -> f64 {
        match mode {
            ActivationMode::Threshold => {
                if v < t0 {
                    1.0
                } else {
                    0.0
                }
            }
            ActivationMode::PiecewiseLinear => {
                if v <= t0 {
                    1.0
                } else if v >= t1 {
                    0.0
                } else {
                    (t1 - v) / (t1 - t0)
                }
            }
        }
    };
    Ok(grid.map(|v| {
        let out = descending(v);
        if ascending { 1.0 - out } else { out }
    }))
}

fn check_thresholds(thresholds: &[f64], mode: ActivationMode) -> RealignResult<(f64, f64)> {
    if thresholds.iter().any(|t| !t.is_finite()) {
        return Err(RealignError::InvalidConfig(format!(
            "activation thresholds must be finite: {:?}",
            thresholds
        )));
    }
    match (mode, thresholds) {
        (ActivationMode::Threshold, [cutoff]) => Ok((*cutoff, *cutoff)),
        (ActivationMode::PiecewiseLinear, [t0, t1]) if t0 <= t1 => Ok((*t0, *t1)),
        _ => Err(RealignError::InvalidConfig(format!(
            "{:?} activation cannot use thresholds {:?}",
            mode, thresholds
        ))),
    }
}
