//! Plot-ready frames for distance-from-best and regret reports.
//!
//! Both report paths reduce a set of shortfalls to the same curve: the
//! fraction of observations within X of the best, for X on a fixed grid of
//! hundredths. [`cumulative_within`] is that reduction.

mod frames;
mod plot;

pub use frames::{
    regret_curve_frame, regret_plot_spec, BestDistanceHistogrammer, GroupLabels,
    ModelGroupPerformancePlotter, SelectionRulePlotter, BEST_CASE,
};
pub use plot::{CsvPlotSink, PlotSink, PlotSpec};

use audition_core::StoreError;
use polars::prelude::PolarsError;
use thiserror::Error;

use crate::regrets::RegretError;

/// Grid resolution: one step per percentage point.
pub const GRID_STEPS: u32 = 100;

/// Absorbs float noise in computed shortfalls (0.8 - 0.6 > 0.2).
const GRID_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("max_below_best must be within [0, 1], got {0}")]
    InvalidBound(f64),

    #[error("failed to write {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to serialize plot spec: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Regret(#[from] RegretError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// `0.00, 0.01, ..., upper` with `upper` rounded to the grid and clamped to
/// `[0, 1]`.
pub fn pct_grid(upper: f64) -> Vec<f64> {
    let steps = (upper.clamp(0.0, 1.0) * f64::from(GRID_STEPS)).round() as u32;
    (0..=steps)
        .map(|i| f64::from(i) / f64::from(GRID_STEPS))
        .collect()
}

/// For each `x` in `grid`, the fraction of `values` that are `<= x`.
///
/// An empty `values` slice yields zeros.
pub fn cumulative_within(values: &[f64], grid: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return vec![0.0; grid.len()];
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len() as f64;
    grid.iter()
        .map(|&x| sorted.partition_point(|&v| v <= x + GRID_TOLERANCE) as f64 / n)
        .collect()
}

/// Tick positions `0.0, 0.1, ..., 1.0`.
pub fn unit_ticks() -> Vec<f64> {
    (0..=10).map(|i| f64::from(i) / 10.0).collect()
}
