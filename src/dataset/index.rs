//! Sample index
//!
//! A CSV table listing one sample id per row, optionally tagged with a
//! difficulty category. Each id resolves to two array files in the
//! preprocessed directory: `{id}_image.npy` and `{id}_label.npy`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{PlumeError, Result};

/// One row of the index file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Sample identifier, the stem of both array files
    pub id: String,
    /// Difficulty category (e.g. "easy", "hard"), if the index has the column
    #[serde(default)]
    pub difficulty: Option<String>,
}

/// Ordered list of samples plus the directory holding their arrays
#[derive(Debug, Clone)]
pub struct SampleIndex {
    records: Vec<SampleRecord>,
    data_dir: PathBuf,
}

impl SampleIndex {
    pub fn new(records: Vec<SampleRecord>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            records,
            data_dir: data_dir.into(),
        }
    }

    /// Read an index CSV; columns other than `id` and `difficulty` are ignored
    pub fn from_csv(csv_path: impl AsRef<Path>, data_dir: impl Into<PathBuf>) -> Result<Self> {
        let csv_path = csv_path.as_ref();
        if !csv_path.exists() {
            return Err(PlumeError::PathNotFound(csv_path.to_path_buf()));
        }

        let mut reader = csv::Reader::from_path(csv_path)
            .map_err(|e| PlumeError::Csv(csv_path.to_path_buf(), e.to_string()))?;

        let mut records = Vec::new();
        for row in reader.deserialize::<SampleRecord>() {
            let mut record = row.map_err(|e| PlumeError::Csv(csv_path.to_path_buf(), e.to_string()))?;
            record.difficulty = record
                .difficulty
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty());
            records.push(record);
        }

        tracing::debug!("Read {} rows from {}", records.len(), csv_path.display());
        Ok(Self::new(records, data_dir))
    }

    /// Subset whose difficulty equals `category` (case-insensitive)
    pub fn filter_difficulty(&self, category: &str) -> SampleIndex {
        let records = self
            .records
            .iter()
            .filter(|r| {
                r.difficulty
                    .as_deref()
                    .is_some_and(|d| d.eq_ignore_ascii_case(category))
            })
            .cloned()
            .collect();

        SampleIndex::new(records, self.data_dir.clone())
    }

    /// Number of samples per difficulty category; untagged rows count as "unknown"
    pub fn difficulty_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            let key = record
                .difficulty
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[SampleRecord] {
        &self.records
    }

    pub fn record(&self, index: usize) -> Option<&SampleRecord> {
        self.records.get(index)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the image array for a sample id
    pub fn image_path(&self, id: &str) -> PathBuf {
        self.data_dir.join(format!("{}_image.npy", id))
    }

    /// Path of the label array for a sample id
    pub fn label_path(&self, id: &str) -> PathBuf {
        self.data_dir.join(format!("{}_label.npy", id))
    }
}
