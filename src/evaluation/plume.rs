//! Object-level plume evaluation
//!
//! Pixel counts are summed over the whole dataset before the scores are
//! derived (micro average), and each ground-truth plume counts as captured
//! when any of its pixels is predicted as plume.

use std::fmt;
use std::path::Path;

use burn::tensor::backend::Backend;
use colored::Colorize;
use serde::{Deserialize, Serialize};

use super::components::{count_captured, label_components};
use super::for_each_prediction;
use crate::dataset::{PlumeDataset, SampleIndex, DIFFICULTY_EASY, DIFFICULTY_HARD};
use crate::model::NestedUNet;
use crate::utils::error::Result;
use crate::utils::metrics::{ConfusionCounts, METRIC_EPS};

/// Dataset-level plume scores
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlumeMetrics {
    #[serde(rename = "F1")]
    pub f1: f64,
    #[serde(rename = "FPR")]
    pub fpr: f64,
    #[serde(rename = "Captured Plumes (%)")]
    pub captured_plumes_percent: f64,
    pub total_plumes: usize,
    pub captured_plumes: usize,
}

impl fmt::Display for PlumeMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{F1: {:.4}, FPR: {:.6}, Captured Plumes (%): {:.2}}}",
            self.f1, self.fpr, self.captured_plumes_percent
        )
    }
}

/// Running totals for [`PlumeMetrics`]
#[derive(Debug, Clone, Default)]
pub struct PlumeAccumulator {
    counts: ConfusionCounts,
    total_plumes: usize,
    captured_plumes: usize,
    samples: usize,
}

impl PlumeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample's prediction and ground truth (row-major H×W masks)
    pub fn add_sample(
        &mut self,
        prediction: &[i64],
        label: &[i64],
        height: usize,
        width: usize,
    ) -> Result<()> {
        let counts = ConfusionCounts::from_masks(prediction, label)?;
        self.counts.merge(&counts);

        let (components, count) = label_components(label, height, width);
        self.total_plumes += count;
        self.captured_plumes += count_captured(&components, count, prediction);
        self.samples += 1;
        Ok(())
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn counts(&self) -> &ConfusionCounts {
        &self.counts
    }

    pub fn finish(&self) -> PlumeMetrics {
        PlumeMetrics {
            f1: self.counts.dice(),
            fpr: self.counts.fpr(),
            captured_plumes_percent: self.captured_plumes as f64
                / (self.total_plumes as f64 + METRIC_EPS)
                * 100.0,
            total_plumes: self.total_plumes,
            captured_plumes: self.captured_plumes,
        }
    }
}

/// Run inference over a dataset and compute its plume metrics
pub fn evaluate_plume_metrics<B: Backend>(
    model: &NestedUNet<B>,
    dataset: &PlumeDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<PlumeMetrics> {
    let mut accumulator = PlumeAccumulator::new();

    for_each_prediction(model, dataset, batch_size, device, |item, prediction| {
        accumulator.add_sample(prediction, &item.label, item.height, item.width)
    })?;

    tracing::debug!(
        "Plume evaluation over {} samples: {} plumes",
        accumulator.samples(),
        accumulator.total_plumes
    );
    Ok(accumulator.finish())
}

/// Evaluate the whole index and its easy and hard subsets
pub fn evaluate_subsets<B: Backend>(
    model: &NestedUNet<B>,
    index: &SampleIndex,
    in_channels: usize,
    batch_size: usize,
    device: &B::Device,
) -> Result<SubsetReport> {
    let subsets = [
        ("overall", index.clone()),
        (DIFFICULTY_EASY, index.filter_difficulty(DIFFICULTY_EASY)),
        (DIFFICULTY_HARD, index.filter_difficulty(DIFFICULTY_HARD)),
    ];

    let mut results = Vec::with_capacity(subsets.len());
    for (name, subset) in subsets {
        tracing::info!("Evaluating {} subset ({} samples)", name, subset.len());
        let dataset = PlumeDataset::with_channels(subset, in_channels);
        results.push(evaluate_plume_metrics(model, &dataset, batch_size, device)?);
    }

    Ok(SubsetReport::new(results[0], results[1], results[2]))
}

/// Plume metrics for the whole test set and its difficulty subsets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsetReport {
    pub overall: PlumeMetrics,
    pub easy: PlumeMetrics,
    pub hard: PlumeMetrics,
    pub generated_at: String,
}

impl SubsetReport {
    pub fn new(overall: PlumeMetrics, easy: PlumeMetrics, hard: PlumeMetrics) -> Self {
        Self {
            overall,
            easy,
            hard,
            generated_at: chrono::Local::now().to_rfc3339(),
        }
    }

    pub fn print(&self) {
        println!("{}", "Overall Test Metrics:".cyan().bold());
        println!("  {}", self.overall);
        println!();
        println!("{}", "Easy Subset Metrics:".cyan().bold());
        println!("  {}", self.easy);
        println!();
        println!("{}", "Hard Subset Metrics:".cyan().bold());
        println!("  {}", self.hard);
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    const LABEL: [i64; 16] = [
        1, 1, 0, 0,
        1, 0, 0, 0,
        0, 0, 0, 1,
        0, 0, 1, 1,
    ];

    #[test]
    fn test_all_plumes_captured() {
        let mut acc = PlumeAccumulator::new();
        // One pixel of each plume is enough
        let mut prediction = [0i64; 16];
        prediction[0] = 1;
        prediction[15] = 1;
        acc.add_sample(&prediction, &LABEL, 4, 4).unwrap();

        let metrics = acc.finish();
        assert_eq!(metrics.total_plumes, 2);
        assert_eq!(metrics.captured_plumes, 2);
        assert!((metrics.captured_plumes_percent - 100.0).abs() < 1e-3);
        assert_eq!(metrics.fpr, 0.0);
    }

    #[test]
    fn test_no_plume_captured() {
        let mut acc = PlumeAccumulator::new();
        let mut prediction = [0i64; 16];
        // A false positive outside every plume captures nothing
        prediction[5] = 1;
        acc.add_sample(&prediction, &LABEL, 4, 4).unwrap();

        let metrics = acc.finish();
        assert_eq!(metrics.captured_plumes, 0);
        assert_eq!(metrics.captured_plumes_percent, 0.0);
        assert_eq!(metrics.f1, 0.0);
        assert!(metrics.fpr > 0.0);
    }

    #[test]
    fn test_counts_are_micro_averaged() {
        let mut acc = PlumeAccumulator::new();
        // Sample 1: perfect on 1 pixel; sample 2: misses 3 pixels
        acc.add_sample(&[1, 0, 0, 0], &[1, 0, 0, 0], 2, 2).unwrap();
        acc.add_sample(&[0, 0, 0, 0], &[1, 1, 1, 0], 2, 2).unwrap();

        let metrics = acc.finish();
        // 2·1 / (2·1 + 0 + 3)
        assert!((metrics.f1 - 0.4).abs() < 1e-5);
        assert_eq!(metrics.total_plumes, 2);
        assert_eq!(metrics.captured_plumes, 1);
        assert!((metrics.captured_plumes_percent - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_empty_accumulator() {
        let metrics = PlumeAccumulator::new().finish();
        assert_eq!(metrics, PlumeMetrics::default());
    }

    #[test]
    fn test_report_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/plume_metrics.json");
        let report = SubsetReport::new(
            PlumeMetrics::default(),
            PlumeMetrics::default(),
            PlumeMetrics::default(),
        );
        report.save(&path).unwrap();

        let json = std::fs::read_to_string(&path).unwrap();
        assert!(json.contains("Captured Plumes (%)"));
        assert!(json.contains("\"easy\""));
    }
}
