//! Evaluation module
//!
//! This module provides:
//! - Connected-component labelling of ground-truth plume masks
//! - Dataset-level plume metrics (F1, FPR, captured plume percentage)
//! - Batched inference over a dataset shared by every evaluator

pub mod components;
pub mod plume;

pub use components::label_components;
pub use plume::{evaluate_plume_metrics, evaluate_subsets, PlumeAccumulator, PlumeMetrics, SubsetReport};

use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;

use crate::dataset::{PlumeBatch, PlumeBatcher, PlumeDataset, PlumeItem};
use crate::model::NestedUNet;
use crate::utils::error::Result;

/// Predict every sample of `dataset` in order and hand each one to `visit`
///
/// The dataset is walked sequentially in batches of `batch_size`; `visit`
/// receives the loaded item and its predicted class mask (row-major H×W).
pub fn for_each_prediction<B, F>(
    model: &NestedUNet<B>,
    dataset: &PlumeDataset,
    batch_size: usize,
    device: &B::Device,
    mut visit: F,
) -> Result<()>
where
    B: Backend,
    F: FnMut(&PlumeItem, &[i64]) -> Result<()>,
{
    let batcher = PlumeBatcher::new();
    let indices: Vec<usize> = (0..dataset.len()).collect();

    for chunk in indices.chunks(batch_size.max(1)) {
        let items = chunk
            .iter()
            .map(|&i| dataset.load(i))
            .collect::<Result<Vec<_>>>()?;

        let batch: PlumeBatch<B> = batcher.try_batch(items.clone(), device)?;
        let predictions: Vec<i64> = model
            .predict_mask(batch.images)
            .into_data()
            .iter::<i64>()
            .collect();

        let pixels = (predictions.len() / items.len()).max(1);
        for (item, prediction) in items.iter().zip(predictions.chunks(pixels)) {
            visit(item, prediction)?;
        }
    }

    Ok(())
}
