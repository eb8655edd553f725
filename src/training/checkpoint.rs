//! Model checkpointing
//!
//! Periodic snapshots of the full network parameters. A checkpoint for epoch
//! `N` lives at `<dir>/epoch_<N>_<tag>` plus the extension the record format
//! appends (`.mpk` for [`CompactRecorder`]).

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::CompactRecorder,
    tensor::backend::Backend,
};
use tracing::info;

use crate::model::NestedUNet;
use crate::utils::error::{PlumeError, Result};

/// Extension [`CompactRecorder`] appends to checkpoint paths
pub const CHECKPOINT_EXTENSION: &str = "mpk";

/// Whether epoch `epoch` (1-based) gets a checkpoint
pub fn should_checkpoint(epoch: usize, every: usize) -> bool {
    every > 0 && epoch > 0 && epoch % every == 0
}

/// Checkpoint base path for an epoch, without the recorder's extension
pub fn checkpoint_path(dir: &Path, epoch: usize, tag: &str) -> PathBuf {
    dir.join(format!("epoch_{}_{}", epoch, tag))
}

/// Extract the epoch from a checkpoint file name such as `epoch_15_UnetPp_V2.mpk`
pub fn extract_epoch_from_filename(filename: &str) -> Option<usize> {
    filename
        .strip_prefix("epoch_")
        .and_then(|rest| rest.split('_').next())
        .and_then(|s| s.parse().ok())
}

/// Where and how often the trainer writes checkpoints
#[derive(Debug, Clone)]
pub struct CheckpointPolicy {
    pub dir: PathBuf,
    pub tag: String,
    pub every: usize,
}

impl CheckpointPolicy {
    pub fn new(dir: impl Into<PathBuf>, tag: impl Into<String>, every: usize) -> Self {
        Self {
            dir: dir.into(),
            tag: tag.into(),
            every,
        }
    }

    pub fn should_save(&self, epoch: usize) -> bool {
        should_checkpoint(epoch, self.every)
    }

    pub fn path_for(&self, epoch: usize) -> PathBuf {
        checkpoint_path(&self.dir, epoch, &self.tag)
    }
}

/// Save the model parameters; returns the path that was written
pub fn save_model<B: Backend>(model: &NestedUNet<B>, base_path: &Path) -> Result<PathBuf> {
    if let Some(parent) = base_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let recorder = CompactRecorder::new();
    model
        .clone()
        .save_file(base_path, &recorder)
        .map_err(|e| PlumeError::Checkpoint(format!("Failed to save {:?}: {:?}", base_path, e)))?;

    let written = base_path.with_extension(CHECKPOINT_EXTENSION);
    info!("Checkpoint saved to {:?}", written);
    Ok(written)
}

/// Load saved parameters into a freshly initialized model
pub fn load_model<B: Backend>(
    model: NestedUNet<B>,
    path: &Path,
    device: &B::Device,
) -> Result<NestedUNet<B>> {
    let base = path.with_extension("");
    let model = model
        .load_file(&base, &CompactRecorder::new(), device)
        .map_err(|e| PlumeError::Checkpoint(format!("Failed to load {:?}: {:?}", path, e)))?;

    info!("Checkpoint loaded from {:?}", path);
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NestedUNetConfig;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_checkpoint_every_fifth_epoch() {
        for epoch in 1..=250 {
            assert_eq!(should_checkpoint(epoch, 5), epoch % 5 == 0, "epoch {}", epoch);
        }
        assert!(!should_checkpoint(0, 5));
        assert!(!should_checkpoint(5, 0));
    }

    #[test]
    fn test_checkpoint_path_format() {
        let path = checkpoint_path(Path::new("/out"), 15, "UnetPp_V2");
        assert_eq!(path, PathBuf::from("/out/epoch_15_UnetPp_V2"));
    }

    #[test]
    fn test_extract_epoch() {
        assert_eq!(extract_epoch_from_filename("epoch_15_UnetPp_V2.mpk"), Some(15));
        assert_eq!(extract_epoch_from_filename("history.json"), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = NestedUNetConfig::new().with_base_channels(2);
        let model: NestedUNet<TestBackend> = config.init(&device);

        let policy = CheckpointPolicy::new(dir.path(), "test", 5);
        let written = save_model(&model, &policy.path_for(10)).unwrap();
        assert!(written.exists());
        assert_eq!(written, dir.path().join("epoch_10_test.mpk"));

        let restored = load_model(config.init::<TestBackend>(&device), &written, &device);
        assert!(restored.is_ok());
    }
}
