//! Pixel-level segmentation metrics
//!
//! Binary confusion counts over class-id masks and the three scores derived
//! from them:
//! - IoU  = TP / (TP + FP + FN + ε)
//! - Dice = 2·TP / (2·TP + FP + FN + ε)
//! - FPR  = FP / (FP + TN + ε)
//!
//! The same formulas serve the per-sample (macro-averaged) evaluation of the
//! training driver and the corpus-level (micro-averaged) plume evaluator.

use serde::{Deserialize, Serialize};

use crate::utils::error::{PlumeError, Result};

/// Guard added to every denominator
pub const METRIC_EPS: f64 = 1e-6;

/// True/false positive/negative pixel counts for the plume class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub true_negatives: u64,
}

impl ConfusionCounts {
    /// Count agreement between a predicted and a ground-truth mask
    ///
    /// Both masks hold class ids; any non-zero id counts as plume.
    pub fn from_masks(prediction: &[i64], label: &[i64]) -> Result<Self> {
        if prediction.len() != label.len() {
            return Err(PlumeError::ShapeMismatch(format!(
                "prediction has {} pixels, label has {}",
                prediction.len(),
                label.len()
            )));
        }

        let mut counts = Self::default();
        for (&p, &l) in prediction.iter().zip(label.iter()) {
            match (p != 0, l != 0) {
                (true, true) => counts.true_positives += 1,
                (true, false) => counts.false_positives += 1,
                (false, true) => counts.false_negatives += 1,
                (false, false) => counts.true_negatives += 1,
            }
        }
        Ok(counts)
    }

    /// Add another set of counts into this one
    pub fn merge(&mut self, other: &ConfusionCounts) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
        self.true_negatives += other.true_negatives;
    }

    /// Total number of pixels counted
    pub fn total(&self) -> u64 {
        self.true_positives + self.false_positives + self.false_negatives + self.true_negatives
    }

    pub fn iou(&self) -> f64 {
        let tp = self.true_positives as f64;
        tp / (tp + self.false_positives as f64 + self.false_negatives as f64 + METRIC_EPS)
    }

    /// Dice coefficient; identical to the pixel F1 score
    pub fn dice(&self) -> f64 {
        let tp = self.true_positives as f64;
        (2.0 * tp)
            / (2.0 * tp + self.false_positives as f64 + self.false_negatives as f64 + METRIC_EPS)
    }

    pub fn fpr(&self) -> f64 {
        let fp = self.false_positives as f64;
        fp / (fp + self.true_negatives as f64 + METRIC_EPS)
    }
}

/// IoU, Dice and false positive rate for one sample or an average of samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentationMetrics {
    #[serde(rename = "IoU")]
    pub iou: f64,
    #[serde(rename = "Dice")]
    pub dice: f64,
    #[serde(rename = "FPR")]
    pub fpr: f64,
}

impl SegmentationMetrics {
    pub fn from_counts(counts: &ConfusionCounts) -> Self {
        Self {
            iou: counts.iou(),
            dice: counts.dice(),
            fpr: counts.fpr(),
        }
    }
}

impl std::fmt::Display for SegmentationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{IoU: {:.4}, Dice: {:.4}, FPR: {:.6}}}",
            self.iou, self.dice, self.fpr
        )
    }
}

/// Compute IoU, Dice and FPR between a predicted and a ground-truth mask
pub fn compute_segmentation_metrics(prediction: &[i64], label: &[i64]) -> Result<SegmentationMetrics> {
    let counts = ConfusionCounts::from_masks(prediction, label)?;
    Ok(SegmentationMetrics::from_counts(&counts))
}

/// Running mean of per-sample metrics (macro average)
#[derive(Debug, Clone, Default)]
pub struct MetricsAverager {
    sum: SegmentationMetrics,
    count: usize,
}

impl MetricsAverager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metrics: SegmentationMetrics) {
        self.sum.iou += metrics.iou;
        self.sum.dice += metrics.dice;
        self.sum.fpr += metrics.fpr;
        self.count += 1;
    }

    /// Number of samples seen so far
    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean over all pushed samples; all zeros when nothing was pushed
    pub fn mean(&self) -> SegmentationMetrics {
        if self.count == 0 {
            return SegmentationMetrics::default();
        }
        let n = self.count as f64;
        SegmentationMetrics {
            iou: self.sum.iou / n,
            dice: self.sum.dice / n,
            fpr: self.sum.fpr / n,
        }
    }
}
