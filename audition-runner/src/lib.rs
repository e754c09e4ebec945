//! Audition Runner — filtering and evaluating model groups over a distance table.
//!
//! This crate builds on `audition-core` to provide:
//! - Threshold filtering of model groups across rules and times
//! - Selection rules that pick a group from as-of history
//! - Regret calculation for selection rules
//! - Plot-ready frames and a plotting handoff
//! - CSV/Markdown export
//! - TOML experiment configuration

pub mod config;
pub mod export;
pub mod regrets;
pub mod reporting;
pub mod selection_rules;
pub mod thresholding;

pub use config::{ConfigError, ExperimentConfig};
pub use export::{export_distance_csv, export_regrets_csv, generate_summary};
pub use regrets::{regrets_from_history, RegretCalculator, RegretError};
pub use reporting::{
    cumulative_within, pct_grid, regret_curve_frame, regret_plot_spec, BestDistanceHistogrammer,
    CsvPlotSink, GroupLabels, ModelGroupPerformancePlotter, PlotSink, PlotSpec, ReportError,
    SelectionRulePlotter,
};
pub use selection_rules::{BoundSelectionRule, SelectionRule, SelectionRuleSpec};
pub use thresholding::{MetricFilter, ModelGroupThresholder};

#[cfg(test)]
mod send_sync_checks {
    use super::*;
    use audition_core::MemoryBackend;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn rules_are_send_sync() {
        assert_send::<BoundSelectionRule>();
        assert_sync::<BoundSelectionRule>();
        assert_send::<SelectionRuleSpec>();
        assert_sync::<SelectionRuleSpec>();
    }

    #[test]
    fn calculators_are_send_sync() {
        assert_send::<RegretCalculator<'static, MemoryBackend>>();
        assert_sync::<RegretCalculator<'static, MemoryBackend>>();
        assert_send::<ModelGroupThresholder>();
        assert_sync::<ModelGroupThresholder>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<ExperimentConfig>();
        assert_sync::<ExperimentConfig>();
        assert_send::<MetricFilter>();
        assert_sync::<MetricFilter>();
    }
}
