//! Tabular export: distance table and regret series as CSV, plus a Markdown
//! summary of an audition run.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use audition_core::{DistanceRecord, ModelGroupId, TrainEndTime};

// ─── CSV export ─────────────────────────────────────────────────────

/// Export distance rows as CSV.
///
/// Columns: model_group_id, model_id, train_end_time, metric, parameter,
/// raw_value, below_best, below_best_next_time (empty when absent)
pub fn export_distance_csv(records: &[DistanceRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "model_group_id",
        "model_id",
        "train_end_time",
        "metric",
        "parameter",
        "raw_value",
        "below_best",
        "below_best_next_time",
    ])?;

    for r in records {
        wtr.write_record([
            &r.model_group_id.to_string(),
            &r.model_id.to_string(),
            &r.train_end_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            &r.metric,
            &r.parameter,
            &format!("{:.6}", r.raw_value),
            &format!("{:.6}", r.below_best),
            &r.below_best_next_time
                .map(|v| format!("{v:.6}"))
                .unwrap_or_default(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export per-rule regret series in long form.
///
/// Columns: selection_rule, train_end_time, regret (empty when the chosen
/// group had no later round)
pub fn export_regrets_csv(
    train_end_times: &[TrainEndTime],
    regrets: &[(String, Vec<Option<f64>>)],
) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["selection_rule", "train_end_time", "regret"])?;
    for (rule, series) in regrets {
        for (time, regret) in train_end_times.iter().zip(series) {
            wtr.write_record([
                rule.as_str(),
                &time.format("%Y-%m-%d %H:%M:%S").to_string(),
                &regret.map(|v| format!("{v:.6}")).unwrap_or_default(),
            ])?;
        }
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Write an export next to the plot frames.
pub fn write_export(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

// ─── Markdown summary ───────────────────────────────────────────────

/// Human-readable summary: surviving groups and regret statistics per rule.
pub fn generate_summary(
    surviving: &BTreeSet<ModelGroupId>,
    regrets: &[(String, Vec<Option<f64>>)],
) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Audition Summary\n");

    let _ = writeln!(md, "## Surviving model groups ({})\n", surviving.len());
    if surviving.is_empty() {
        let _ = writeln!(md, "_none_\n");
    } else {
        let ids: Vec<String> = surviving.iter().map(ToString::to_string).collect();
        let _ = writeln!(md, "{}\n", ids.join(", "));
    }

    if !regrets.is_empty() {
        let _ = writeln!(md, "## Selection rule regrets\n");
        let _ = writeln!(md, "| Rule | Times | Mean | Max |");
        let _ = writeln!(md, "|------|------:|-----:|----:|");
        for (rule, series) in regrets {
            let realized: Vec<f64> = series.iter().flatten().copied().collect();
            let (mean, max) = if realized.is_empty() {
                ("-".to_string(), "-".to_string())
            } else {
                let mean = realized.iter().sum::<f64>() / realized.len() as f64;
                let max = realized.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (format!("{mean:.4}"), format!("{max:.4}"))
            };
            let _ = writeln!(md, "| {rule} | {} | {mean} | {max} |", realized.len());
        }
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use audition_core::{parse_train_end_time, ModelId};

    fn t(s: &str) -> TrainEndTime {
        parse_train_end_time(s).unwrap()
    }

    fn record(next: Option<f64>) -> DistanceRecord {
        DistanceRecord {
            model_group_id: ModelGroupId(3),
            model_id: ModelId(30),
            train_end_time: t("2015-01-01"),
            metric: "precision@".into(),
            parameter: "100_abs".into(),
            raw_value: 0.84,
            below_best: 0.0,
            below_best_next_time: next,
        }
    }

    #[test]
    fn distance_csv_all_columns() {
        let csv = export_distance_csv(&[record(Some(0.3))]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "model_group_id,model_id,train_end_time,metric,parameter,raw_value,below_best,below_best_next_time"
        );
        assert_eq!(
            lines.next().unwrap(),
            "3,30,2015-01-01 00:00:00,precision@,100_abs,0.840000,0.000000,0.300000"
        );
    }

    #[test]
    fn distance_csv_leaves_missing_next_time_empty() {
        let csv = export_distance_csv(&[record(None)]).unwrap();
        assert!(csv.lines().nth(1).unwrap().ends_with("0.000000,"));
    }

    #[test]
    fn distance_csv_empty() {
        let csv = export_distance_csv(&[]).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn regrets_csv_long_form() {
        let times = [t("2014-01-01"), t("2015-01-01")];
        let csv = export_regrets_csv(
            &times,
            &[("pick_spiky".into(), vec![Some(0.19), None])],
        )
        .unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "pick_spiky,2014-01-01 00:00:00,0.190000");
        assert_eq!(lines[2], "pick_spiky,2015-01-01 00:00:00,");
    }

    #[test]
    fn summary_lists_groups_and_rules() {
        let surviving: BTreeSet<_> = [ModelGroupId(1), ModelGroupId(2)].into();
        let md = generate_summary(
            &surviving,
            &[
                ("best_current_value_precision@_100_abs".into(), vec![Some(0.1), Some(0.3), None]),
                ("never".into(), vec![None]),
            ],
        );
        assert!(md.contains("## Surviving model groups (2)"));
        assert!(md.contains("1, 2"));
        assert!(md.contains("| best_current_value_precision@_100_abs | 2 | 0.2000 | 0.3000 |"));
        assert!(md.contains("| never | 0 | - | - |"));
    }

    #[test]
    fn write_export_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("distance.csv");
        write_export(&path, "a,b\n").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "a,b\n");
    }
}
