//! Dataset module for plume segmentation data
//!
//! This module provides functionality for:
//! - Reading the sample index (CSV with `id` and `difficulty` columns)
//! - Loading the preprocessed `.npy` image/label arrays per sample
//! - Burn `Dataset`/`Batcher` integration for training and evaluation
//! - Dataset statistics
//!
//! ## On-disk layout
//!
//! ```text
//! <data_dir>/
//!   <id>_image.npy   # C×H×W float bands
//!   <id>_label.npy   # H×W mask, 1 = plume
//! ```

pub mod burn_dataset;
pub mod index;
pub mod loader;
pub mod stats;

// Re-export main types for convenience
pub use burn_dataset::{PlumeBatch, PlumeBatcher, PlumeDataset, PlumeItem};
pub use index::{SampleIndex, SampleRecord};
pub use loader::{load_image, load_label};
pub use stats::DatasetStats;

/// Difficulty category for the easy subset report
pub const DIFFICULTY_EASY: &str = "easy";

/// Difficulty category for the hard subset report
pub const DIFFICULTY_HARD: &str = "hard";
