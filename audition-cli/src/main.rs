//! Audition CLI — populate a distance table, then filter and evaluate model
//! groups against it.
//!
//! Commands:
//! - `populate`: rank evaluations from a CSV file into a Parquet distance store
//! - `filter`: apply the experiment's threshold rules and print survivors
//! - `regrets`: print per-rule regrets over the experiment's times
//! - `report`: write plot-ready frames, exports and a Markdown summary

mod logging;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use audition_core::{
    CsvEvaluations, DistanceStore, ModelGroupId, ParquetBackend, RankingEngine, TrainEndTime,
};
use audition_runner::export::{export_regrets_csv, write_export};
use audition_runner::{
    export_distance_csv, generate_summary, regret_curve_frame, regret_plot_spec,
    BestDistanceHistogrammer, CsvPlotSink, ExperimentConfig, ModelGroupPerformancePlotter,
    ModelGroupThresholder, PlotSink, RegretCalculator,
};
use clap::{Parser, Subcommand};

use logging::Verbosity;

#[derive(Parser)]
#[command(
    name = "audition",
    about = "Audition CLI: distance-from-best filtering and selection-rule regrets"
)]
struct Cli {
    /// Debug-level logging.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, global = true, default_value_t = false)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank evaluations into the distance store.
    Populate {
        /// CSV with header model_id,model_group_id,train_end_time,metric,parameter,value.
        #[arg(long)]
        evaluations: PathBuf,

        /// Distance store directory.
        #[arg(long)]
        store: PathBuf,

        /// Experiment TOML.
        #[arg(long)]
        config: PathBuf,

        /// Keep existing rows and add only new metrics.
        #[arg(long, default_value_t = false)]
        append: bool,
    },
    /// Apply threshold rules and print surviving model groups.
    Filter {
        #[arg(long)]
        store: PathBuf,

        #[arg(long)]
        config: PathBuf,
    },
    /// Print per-rule regrets.
    Regrets {
        #[arg(long)]
        store: PathBuf,

        #[arg(long)]
        config: PathBuf,
    },
    /// Write plot-ready frames and exports.
    Report {
        #[arg(long)]
        store: PathBuf,

        #[arg(long)]
        config: PathBuf,

        /// Output directory.
        #[arg(long, default_value = "report")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_subscriber(Verbosity::from_flags(cli.verbose, cli.quiet));

    match cli.command {
        Commands::Populate {
            evaluations,
            store,
            config,
            append,
        } => run_populate(&evaluations, &store, &config, append),
        Commands::Filter { store, config } => run_filter(&store, &config),
        Commands::Regrets { store, config } => run_regrets(&store, &config),
        Commands::Report { store, config, out } => run_report(&store, &config, &out),
    }
}

fn load_config(path: &Path) -> Result<ExperimentConfig> {
    ExperimentConfig::from_file(path)
        .with_context(|| format!("failed to load experiment {}", path.display()))
}

fn open_store(dir: &Path) -> DistanceStore<ParquetBackend> {
    DistanceStore::new(ParquetBackend::new(dir))
}

fn run_populate(
    evaluations: &Path,
    store_dir: &Path,
    config_path: &Path,
    append: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let source = CsvEvaluations::from_path(evaluations)
        .with_context(|| format!("failed to read evaluations {}", evaluations.display()))?;
    tracing::info!(rows = source.len(), "loaded evaluations");

    let engine = RankingEngine::new(config.registry(), config.seeds());
    let mut store = open_store(store_dir);
    let populated = if append {
        store.populate(
            &engine,
            &source,
            &config.model_group_ids,
            &config.train_end_times,
            &config.metrics,
        )
    } else {
        store.create_and_populate(
            &engine,
            &source,
            &config.model_group_ids,
            &config.train_end_times,
            &config.metrics,
        )
    };
    let written =
        populated.with_context(|| format!("failed to populate {}", store_dir.display()))?;

    println!("Wrote {written} distance rows to {}", store_dir.display());
    Ok(())
}

/// Survivors of the experiment's filters; every candidate when there are none.
fn thresholded_groups(
    store: &DistanceStore<ParquetBackend>,
    config: &ExperimentConfig,
) -> Result<(ModelGroupThresholder, Vec<ModelGroupId>)> {
    let mut thresholder = ModelGroupThresholder::from_store(
        store,
        config.train_end_times.clone(),
        &config.model_group_ids,
    )
    .context("failed to read distance store")?;
    thresholder.update_filters(config.filters.clone());
    let groups = thresholder.model_group_ids().iter().copied().collect();
    Ok((thresholder, groups))
}

fn run_filter(store_dir: &Path, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(store_dir);
    let (thresholder, survivors) = thresholded_groups(&store, &config)?;

    println!("{:<22} Passing", "Train end time");
    println!("{}", "-".repeat(50));
    for time in thresholder.train_end_times() {
        println!("{:<22} {}", time.to_string(), join_ids(thresholder.passing_as_of(*time)));
    }
    println!();
    println!(
        "Surviving model groups ({}/{}): {}",
        survivors.len(),
        config.model_group_ids.len(),
        join_ids(survivors.iter().copied())
    );
    Ok(())
}

/// Per-rule regret series, in config order.
fn compute_regrets(
    store: &DistanceStore<ParquetBackend>,
    config: &ExperimentConfig,
    groups: &[ModelGroupId],
) -> Result<Vec<(String, Vec<Option<f64>>)>> {
    let Some(regret) = config.regret_metric() else {
        return Ok(Vec::new());
    };
    if groups.is_empty() {
        tracing::warn!("no model groups survived filtering, skipping regrets");
        return Ok(Vec::new());
    }
    let rules = config.bound_rules(&config.registry());
    let series = RegretCalculator::new(store)
        .regrets_for_rules(
            &rules,
            groups,
            &config.train_end_times,
            &regret.metric,
            &regret.parameter,
        )
        .context("regret calculation failed")?;
    Ok(rules
        .iter()
        .map(|r| r.descriptive_name().to_string())
        .zip(series)
        .collect())
}

fn run_regrets(store_dir: &Path, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(store_dir);
    let (_, groups) = thresholded_groups(&store, &config)?;
    if groups.is_empty() {
        println!("No model groups survived filtering.");
        return Ok(());
    }
    let regrets = compute_regrets(&store, &config, &groups)?;

    if regrets.is_empty() {
        println!("No selection rules configured.");
        return Ok(());
    }
    print_regret_table(&config.train_end_times, &regrets);
    Ok(())
}

fn print_regret_table(times: &[TrainEndTime], regrets: &[(String, Vec<Option<f64>>)]) {
    let width = regrets.iter().map(|(n, _)| n.len()).max().unwrap_or(4).max(4);
    print!("{:<width$}", "Rule");
    for t in times {
        print!(" {:>10}", t.format("%Y-%m-%d").to_string());
    }
    println!();
    println!("{}", "-".repeat(width + 11 * times.len()));
    for (name, series) in regrets {
        print!("{name:<width$}");
        for value in series {
            match value {
                Some(v) => print!(" {v:>10.4}"),
                None => print!(" {:>10}", "-"),
            }
        }
        println!();
    }
}

fn run_report(store_dir: &Path, config_path: &Path, out: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(store_dir);
    let history = store
        .fetch(&config.model_group_ids)
        .context("failed to read distance store")?;
    let metrics = config.metric_pairs();
    let mut sink = CsvPlotSink::new(out.join("plots"));

    BestDistanceHistogrammer::new(config.labels.clone())
        .plot_all_best_dist(
            &mut sink,
            &history,
            &metrics,
            &config.model_group_ids,
            &config.train_end_times,
        )
        .context("failed to build distance-from-best frames")?;
    ModelGroupPerformancePlotter::new(config.labels.clone())
        .plot_all(
            &mut sink,
            &history,
            &metrics,
            &config.model_group_ids,
            &config.train_end_times,
        )
        .context("failed to build performance frames")?;

    let (_, survivors) = thresholded_groups(&store, &config)?;
    let regrets = compute_regrets(&store, &config, &survivors)?;
    // empty when no rules are configured or no group survived filtering
    if !regrets.is_empty() {
        if let Some(regret) = config.regret_metric() {
            let frame = regret_curve_frame(&regrets).context("failed to build regret frames")?;
            sink.plot_cats(&frame, &regret_plot_spec(&regret.metric, &regret.parameter))
                .context("failed to write regret frames")?;
        }
    }

    write_export(&out.join("distance.csv"), &export_distance_csv(history.records())?)?;
    write_export(
        &out.join("regrets.csv"),
        &export_regrets_csv(&config.train_end_times, &regrets)?,
    )?;
    let survivor_set = survivors.iter().copied().collect();
    write_export(&out.join("summary.md"), &generate_summary(&survivor_set, &regrets))?;

    println!(
        "Wrote {} plot files and 3 exports to {}",
        sink.written().len(),
        out.display()
    );
    Ok(())
}

fn join_ids(ids: impl IntoIterator<Item = ModelGroupId>) -> String {
    let ids: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
    if ids.is_empty() {
        "(none)".to_string()
    } else {
        ids.join(", ")
    }
}
