//! Handoff to an external chart renderer.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::ReportError;

/// Everything a renderer needs to draw one categorized line chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSpec {
    pub cat_col: String,
    pub x_col: String,
    pub y_col: String,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    #[serde(default)]
    pub x_ticks: Vec<f64>,
}

impl PlotSpec {
    /// File-name-safe form of the title.
    pub fn slug(&self) -> String {
        let mut slug = String::with_capacity(self.title.len());
        for c in self.title.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.is_empty() && !slug.ends_with('_') {
                slug.push('_');
            }
        }
        while slug.ends_with('_') {
            slug.pop();
        }
        if slug.is_empty() {
            slug.push_str("plot");
        }
        slug
    }
}

/// Receives plot-ready frames.
pub trait PlotSink {
    fn plot_cats(&mut self, frame: &DataFrame, spec: &PlotSpec) -> Result<(), ReportError>;
}

/// Writes `<slug>.csv` (the frame) and `<slug>.json` (the spec) into a
/// directory for a renderer to pick up.
#[derive(Debug)]
pub struct CsvPlotSink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl CsvPlotSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths written so far, in write order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// `slug`, or `slug_2`, `slug_3`, ... when an earlier plot in this sink
    /// already took that name.
    fn unused_stem(&self, slug: &str) -> String {
        let taken = |stem: &str| {
            let csv = self.dir.join(format!("{stem}.csv"));
            self.written.iter().any(|p| *p == csv)
        };
        if !taken(slug) {
            return slug.to_string();
        }
        let mut n = 2;
        loop {
            let stem = format!("{slug}_{n}");
            if !taken(&stem) {
                tracing::debug!(slug, %stem, "plot title slug already written, using suffix");
                return stem;
            }
            n += 1;
        }
    }
}

impl PlotSink for CsvPlotSink {
    fn plot_cats(&mut self, frame: &DataFrame, spec: &PlotSpec) -> Result<(), ReportError> {
        fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let slug = self.unused_stem(&spec.slug());

        let csv_path = self.dir.join(format!("{slug}.csv"));
        let mut file = File::create(&csv_path).map_err(|e| io_error(&csv_path, e))?;
        let mut frame = frame.clone();
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut frame)?;

        let json_path = self.dir.join(format!("{slug}.json"));
        let json = serde_json::to_string_pretty(spec)?;
        fs::write(&json_path, json).map_err(|e| io_error(&json_path, e))?;

        tracing::debug!(path = %csv_path.display(), rows = frame.height(), "wrote plot frame");
        self.written.push(csv_path);
        self.written.push(json_path);
        Ok(())
    }
}

fn io_error(path: &Path, e: std::io::Error) -> ReportError {
    ReportError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}
