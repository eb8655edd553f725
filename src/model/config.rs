//! Run Configuration Module
//!
//! Every hyperparameter of a training or evaluation run, loadable from a TOML
//! file. Missing sections and fields fall back to their defaults, so an empty
//! file is a valid configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::nested_unet::NestedUNetConfig;
use crate::training::scheduler::ThresholdMode;
use crate::utils::error::{PlumeError, Result};

/// Complete configuration of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub model: ModelSection,
    pub training: TrainingSection,
    pub scheduler: SchedulerSection,
    pub data: DataSection,
    pub output: OutputSection,
}

/// Network architecture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// Number of input bands
    pub in_channels: usize,
    /// Number of output classes
    pub num_classes: usize,
    /// Width of the first encoder stage
    pub base_channels: usize,
    /// Bottleneck channel dropout
    pub dropout: f64,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            in_channels: 9,
            num_classes: 2,
            base_channels: 64,
            dropout: 0.1,
        }
    }
}

impl ModelSection {
    pub fn to_network_config(&self) -> NestedUNetConfig {
        NestedUNetConfig::new()
            .with_in_channels(self.in_channels)
            .with_num_classes(self.num_classes)
            .with_base_channels(self.base_channels)
            .with_dropout(self.dropout)
    }
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
    /// Number of training epochs
    pub epochs: usize,
    /// Batch size
    pub batch_size: usize,
    /// Initial learning rate
    pub learning_rate: f64,
    /// Weight of the Dice term in the combined loss
    pub weight_dice: f64,
    /// Weight of the cross entropy term in the combined loss
    pub weight_ce: f64,
    /// Save a checkpoint every N epochs
    pub checkpoint_every: usize,
    /// Random seed for reproducibility
    pub seed: u64,
    /// Shuffle the training set each epoch
    pub shuffle: bool,
    /// Show a batch progress bar
    pub progress_bar: bool,
}

impl Default for TrainingSection {
    fn default() -> Self {
        Self {
            epochs: 250,
            batch_size: 4,
            learning_rate: 1e-4,
            weight_dice: 1.0,
            weight_ce: 1.0,
            checkpoint_every: 5,
            seed: 42,
            shuffle: true,
            progress_bar: true,
        }
    }
}

/// Plateau learning-rate reduction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub factor: f64,
    pub patience: usize,
    pub threshold: f64,
    pub threshold_mode: ThresholdMode,
    pub min_lr: f64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            factor: 0.5,
            patience: 5,
            threshold: 1e-4,
            threshold_mode: ThresholdMode::Rel,
            min_lr: 0.0,
        }
    }
}

/// Input locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub train_csv: PathBuf,
    pub train_dir: PathBuf,
    pub test_csv: PathBuf,
    pub test_dir: PathBuf,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            train_csv: PathBuf::from("data/train.csv"),
            train_dir: PathBuf::from("data/preprocessed/train"),
            test_csv: PathBuf::from("data/test.csv"),
            test_dir: PathBuf::from("data/preprocessed/test"),
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Directory for checkpoints, history and reports
    pub checkpoint_dir: PathBuf,
    /// Tag appended to checkpoint file names
    pub tag: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("output/checkpoints"),
            tag: "UnetPp_V2".to_string(),
        }
    }
}

impl RunConfig {
    /// Load a configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PlumeError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|e| {
            PlumeError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })
    }

    /// Write the configuration as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PlumeError::Serialization(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(PlumeError::Config(msg.to_string()));

        if self.model.in_channels == 0 || self.model.num_classes < 2 {
            return fail("model needs at least one input band and two classes");
        }
        if self.model.base_channels == 0 {
            return fail("base_channels must be greater than 0");
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return fail("dropout must be in range [0.0, 1.0)");
        }
        if self.training.epochs == 0 {
            return fail("epochs must be greater than 0");
        }
        if self.training.batch_size == 0 {
            return fail("batch_size must be greater than 0");
        }
        if self.training.learning_rate <= 0.0 {
            return fail("learning_rate must be positive");
        }
        if self.training.weight_dice < 0.0 || self.training.weight_ce < 0.0 {
            return fail("loss weights must not be negative");
        }
        if self.training.checkpoint_every == 0 {
            return fail("checkpoint_every must be greater than 0");
        }
        if self.scheduler.factor <= 0.0 || self.scheduler.factor >= 1.0 {
            return fail("scheduler factor must be in range (0.0, 1.0)");
        }

        Ok(())
    }
}
