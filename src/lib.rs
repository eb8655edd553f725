//! # Plume Segmentation
//!
//! A Rust library for segmenting methane plumes in multispectral satellite
//! imagery with a nested U-Net (UNet++) built on the Burn framework.
//!
//! ## Features
//!
//! - **Nested U-Net** with dense skip pathways that preserves arbitrary input sizes
//! - **Combined Dice + cross entropy loss** with plateau learning-rate reduction
//! - **Pixel metrics** (IoU, Dice, FPR) and **object-level metrics** (captured plumes)
//! - **Preprocessed `.npy` datasets** indexed by a CSV file with difficulty tags
//!
//! ## Modules
//!
//! - `dataset`: Sample index, array loading and Burn dataset/batcher integration
//! - `model`: Nested U-Net architecture and run configuration
//! - `training`: Losses, scheduler, checkpointing and the epoch-loop driver
//! - `evaluation`: Connected components and dataset-level plume metrics
//! - `utils`: Logging, pixel metrics, errors and helper functions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use plume_seg::backend::{default_device, TrainingBackend};
//! use plume_seg::dataset::{PlumeDataset, SampleIndex};
//! use plume_seg::model::RunConfig;
//! use plume_seg::training::trainer_from_config;
//!
//! let config = RunConfig::default();
//! let train = PlumeDataset::new(SampleIndex::from_csv("train.csv", "preprocessed/train")?);
//! let test = PlumeDataset::new(SampleIndex::from_csv("test.csv", "preprocessed/test")?);
//!
//! let mut trainer = trainer_from_config::<TrainingBackend>(&config, &default_device());
//! let history = trainer.run(&train, &test)?;
//! ```

pub mod backend;
pub mod dataset;
pub mod evaluation;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{PlumeBatch, PlumeBatcher, PlumeDataset, PlumeItem, SampleIndex};
pub use evaluation::{evaluate_plume_metrics, PlumeMetrics, SubsetReport};
pub use model::{ForwardMode, NestedUNet, NestedUNetConfig, RunConfig};
pub use training::{CombinedLoss, DiceLoss, Trainer, TrainingHistory};
pub use utils::error::{PlumeError, Result};
pub use utils::metrics::{ConfusionCounts, SegmentationMetrics};

/// Number of spectral bands per input sample
pub const IN_CHANNELS: usize = 9;

/// Background and plume
pub const NUM_CLASSES: usize = 2;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
