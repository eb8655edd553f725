//! Training module for the plume segmentation network
//!
//! This module provides:
//! - Dice, cross entropy and combined segmentation losses
//! - A reduce-on-plateau learning-rate scheduler
//! - Periodic model checkpointing
//! - The epoch-loop training driver

pub mod checkpoint;
pub mod loss;
pub mod scheduler;
pub mod trainer;

// Re-export main types for convenience
pub use checkpoint::{checkpoint_path, load_model, save_model, should_checkpoint, CheckpointPolicy};
pub use loss::{CombinedLoss, DiceLoss};
pub use scheduler::{PlateauConfig, ReduceLROnPlateau, ThresholdMode};
pub use trainer::{
    adam_optimizer, evaluate, test_one_epoch, trainer_from_config, Trainer, TrainerSettings,
    TrainingHistory,
};
