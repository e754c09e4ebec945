//! Parquet-directory distance table.
//!
//! Layout: `{dir}/part-{NNNNN}.parquet` plus a `meta.json` sidecar.
//!
//! - Each append writes one new part file atomically (write `.tmp`, rename).
//! - Existing part files are never rewritten.
//! - The sidecar records row count, metric keys and a BLAKE3 content hash
//!   chained across appends.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::schema::{dataframe_to_records, records_to_dataframe};
use super::{DistanceBackend, StoreError};
use crate::domain::{DistanceRecord, MetricKey};

const META_FILE: &str = "meta.json";
const PART_PREFIX: &str = "part-";

/// Metadata sidecar for a distance table directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub row_count: usize,
    pub part_count: usize,
    pub metric_keys: BTreeSet<MetricKey>,
    pub content_hash: String,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct ParquetBackend {
    dir: PathBuf,
}

impl ParquetBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    fn part_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{PART_PREFIX}{index:05}.parquet"))
    }

    /// Read the sidecar; a missing sidecar means an empty table.
    pub fn meta(&self) -> Result<StoreMeta, StoreError> {
        let path = self.meta_path();
        if !path.exists() {
            return Ok(StoreMeta::default());
        }
        let content = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        serde_json::from_str(&content).map_err(|e| StoreError::Meta(format!("parse meta: {e}")))
    }

    fn write_meta(&self, meta: &StoreMeta) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(meta)
            .map_err(|e| StoreError::Meta(format!("meta serialization: {e}")))?;
        let path = self.meta_path();
        fs::write(&path, json).map_err(|e| io_err(&path, e))
    }

    /// Part files in write order.
    fn part_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let mut parts = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_err(&self.dir, e))?.path();
            let is_part = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(PART_PREFIX) && n.ends_with(".parquet"));
            if is_part {
                parts.push(path);
            }
        }
        parts.sort();
        Ok(parts)
    }
}

impl DistanceBackend for ParquetBackend {
    fn create(&mut self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        for part in self.part_files()? {
            fs::remove_file(&part).map_err(|e| io_err(&part, e))?;
        }
        self.write_meta(&StoreMeta::default())
    }

    fn append(&mut self, records: &[DistanceRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;

        let mut meta = self.meta()?;
        let existing_parts = self.part_files()?.len();
        let index = meta.part_count.max(existing_parts);
        let path = self.part_path(index);
        let tmp_path = path.with_extension("parquet.tmp");

        let mut df = records_to_dataframe(records)?;
        write_parquet(&mut df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Parquet(format!("atomic rename failed: {e}"))
        })?;

        let batch = serde_json::to_vec(records)
            .map_err(|e| StoreError::Meta(format!("hash serialization: {e}")))?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(meta.content_hash.as_bytes());
        hasher.update(&batch);

        meta.row_count += records.len();
        meta.part_count = index + 1;
        meta.metric_keys
            .extend(records.iter().map(DistanceRecord::metric_key));
        meta.content_hash = hasher.finalize().to_hex().to_string();
        meta.updated_at = Some(chrono::Local::now().naive_local());
        self.write_meta(&meta)
    }

    fn scan(&self) -> Result<Vec<DistanceRecord>, StoreError> {
        let mut records = Vec::new();
        for part in self.part_files()? {
            records.extend(read_parquet(&part)?);
        }
        Ok(records)
    }
}

fn io_err(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), StoreError> {
    let file =
        fs::File::create(path).map_err(|e| StoreError::Parquet(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| StoreError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

fn read_parquet(path: &Path) -> Result<Vec<DistanceRecord>, StoreError> {
    let file = fs::File::open(path).map_err(|e| StoreError::Parquet(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Parquet(format!("read {}: {e}", path.display())))?;
    Ok(dataframe_to_records(&df)?)
}
