//! Burn Dataset Integration for plume samples
//!
//! This module implements Burn's Dataset trait and Batcher for loading the
//! preprocessed image/label arrays and stacking them into training batches.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use super::index::SampleIndex;
use super::loader::{load_image, load_label};
use crate::utils::error::{PlumeError, Result};
use crate::IN_CHANNELS;

/// A single sample ready for Burn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlumeItem {
    /// Image data as flattened CHW float array [C * H * W]
    pub image: Vec<f32>,
    /// Label mask as flattened HW class ids {0, 1}
    pub label: Vec<i64>,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    /// Sample id (for debugging/logging)
    pub id: String,
}

impl PlumeItem {
    /// Build an item from raw buffers, checking that the sizes agree
    pub fn from_parts(
        id: impl Into<String>,
        image: Vec<f32>,
        label: Vec<i64>,
        channels: usize,
        height: usize,
        width: usize,
    ) -> Result<Self> {
        let id = id.into();
        if image.len() != channels * height * width {
            return Err(PlumeError::ShapeMismatch(format!(
                "sample '{}': image has {} values, expected {}x{}x{}",
                id,
                image.len(),
                channels,
                height,
                width
            )));
        }
        if label.len() != height * width {
            return Err(PlumeError::ShapeMismatch(format!(
                "sample '{}': label has {} values, expected {}x{}",
                id,
                label.len(),
                height,
                width
            )));
        }

        Ok(Self {
            image,
            label,
            channels,
            height,
            width,
            id,
        })
    }
}

/// Dataset over a sample index implementing Burn's Dataset trait
///
/// Arrays are loaded lazily from disk; datasets built with `from_items` serve
/// their in-memory items instead.
#[derive(Debug, Clone)]
pub struct PlumeDataset {
    index: SampleIndex,
    in_channels: usize,
    cached_items: Option<Vec<PlumeItem>>,
}

impl PlumeDataset {
    /// Create a lazily loading dataset expecting the default channel count
    pub fn new(index: SampleIndex) -> Self {
        Self::with_channels(index, IN_CHANNELS)
    }

    /// Create a lazily loading dataset expecting `in_channels` image bands
    pub fn with_channels(index: SampleIndex, in_channels: usize) -> Self {
        Self {
            index,
            in_channels,
            cached_items: None,
        }
    }

    /// Build a dataset from in-memory items (no index on disk)
    pub fn from_items(items: Vec<PlumeItem>) -> Self {
        let in_channels = items.first().map(|i| i.channels).unwrap_or(IN_CHANNELS);
        let records = items
            .iter()
            .map(|item| super::index::SampleRecord {
                id: item.id.clone(),
                difficulty: None,
            })
            .collect();
        Self {
            index: SampleIndex::new(records, ""),
            in_channels,
            cached_items: Some(items),
        }
    }

    pub fn index(&self) -> &SampleIndex {
        &self.index
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Load one sample, propagating any IO, decode or shape failure
    pub fn load(&self, index: usize) -> Result<PlumeItem> {
        if let Some(ref cached) = self.cached_items {
            return cached.get(index).cloned().ok_or_else(|| {
                PlumeError::Dataset(format!("index {} out of range ({})", index, cached.len()))
            });
        }

        let record = self.index.record(index).ok_or_else(|| {
            PlumeError::Dataset(format!("index {} out of range ({})", index, self.index.len()))
        })?;

        let image = load_image(&self.index.image_path(&record.id))?;
        let label = load_label(&self.index.label_path(&record.id))?;

        let (channels, height, width) = image.dim();
        if channels != self.in_channels {
            return Err(PlumeError::ShapeMismatch(format!(
                "sample '{}': expected {} channels, found {}",
                record.id, self.in_channels, channels
            )));
        }
        if label.dim() != (height, width) {
            return Err(PlumeError::ShapeMismatch(format!(
                "sample '{}': image is {}x{} but label is {}x{}",
                record.id,
                height,
                width,
                label.dim().0,
                label.dim().1
            )));
        }

        PlumeItem::from_parts(
            record.id.clone(),
            image.iter().copied().collect(),
            label.iter().copied().collect(),
            channels,
            height,
            width,
        )
    }
}

impl Dataset<PlumeItem> for PlumeDataset {
    fn get(&self, index: usize) -> Option<PlumeItem> {
        match self.load(index) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Failed to load sample {}: {}", index, e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        match self.cached_items {
            Some(ref cached) => cached.len(),
            None => self.index.len(),
        }
    }
}

/// A batch of samples for training or evaluation
#[derive(Clone, Debug)]
pub struct PlumeBatch<B: Backend> {
    /// Images with shape [batch_size, channels, height, width]
    pub images: Tensor<B, 4>,
    /// Class masks with shape [batch_size, height, width]
    pub targets: Tensor<B, 3, Int>,
}

/// Batcher stacking plume items into tensors
#[derive(Clone, Debug, Default)]
pub struct PlumeBatcher;

impl PlumeBatcher {
    pub fn new() -> Self {
        Self
    }

    /// Stack items after checking they share one shape
    pub fn try_batch<B: Backend>(
        &self,
        items: Vec<PlumeItem>,
        device: &B::Device,
    ) -> Result<PlumeBatch<B>> {
        let first = items
            .first()
            .ok_or_else(|| PlumeError::Dataset("cannot batch zero samples".to_string()))?;
        let shape = (first.channels, first.height, first.width);

        if let Some(odd) = items
            .iter()
            .find(|item| (item.channels, item.height, item.width) != shape)
        {
            return Err(PlumeError::ShapeMismatch(format!(
                "sample '{}' is {}x{}x{}, batch expects {}x{}x{}",
                odd.id, odd.channels, odd.height, odd.width, shape.0, shape.1, shape.2
            )));
        }

        Ok(<Self as Batcher<B, PlumeItem, PlumeBatch<B>>>::batch(
            self, items, device,
        ))
    }
}

impl<B: Backend> Batcher<B, PlumeItem, PlumeBatch<B>> for PlumeBatcher {
    fn batch(&self, items: Vec<PlumeItem>, device: &B::Device) -> PlumeBatch<B> {
        let batch_size = items.len();
        let (channels, height, width) = items
            .first()
            .map(|item| (item.channels, item.height, item.width))
            .unwrap_or((IN_CHANNELS, 0, 0));

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().flat_map(|item| item.label.iter().copied()).collect();
        let targets = Tensor::<B, 3, Int>::from_data(
            TensorData::new(targets_data, [batch_size, height, width]),
            device,
        );

        PlumeBatch { images, targets }
    }
}
