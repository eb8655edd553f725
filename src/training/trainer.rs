//! Training driver
//!
//! Runs the epoch loop: a training pass with gradient updates, a metric pass
//! and a loss pass over the test set in inference mode, a plateau step on the
//! test loss, and a checkpoint every `checkpoint_every` epochs. Any failure
//! while loading or batching a sample aborts the run.

use std::path::{Path, PathBuf};

use burn::{
    data::dataset::Dataset,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion,
    },
};
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::checkpoint::{extract_epoch_from_filename, load_model, save_model, CheckpointPolicy};
use super::loss::CombinedLoss;
use super::scheduler::{PlateauConfig, ReduceLROnPlateau};
use crate::dataset::{PlumeBatch, PlumeBatcher, PlumeDataset};
use crate::evaluation::for_each_prediction;
use crate::model::{ForwardMode, NestedUNet, RunConfig};
use crate::utils::error::{PlumeError, Result};
use crate::utils::logging::EpochLogger;
use crate::utils::metrics::{compute_segmentation_metrics, MetricsAverager, SegmentationMetrics};

/// File name of the training history written next to the checkpoints
pub const HISTORY_FILE: &str = "history.json";

/// Loop settings of a [`Trainer`]
#[derive(Debug, Clone)]
pub struct TrainerSettings {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub shuffle: bool,
    pub seed: u64,
    pub progress_bar: bool,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            epochs: 250,
            batch_size: 4,
            learning_rate: 1e-4,
            shuffle: true,
            seed: 42,
            progress_bar: false,
        }
    }
}

/// One row of the training history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub test_loss: f64,
    pub metrics: SegmentationMetrics,
    pub learning_rate: f64,
    pub checkpoint: Option<PathBuf>,
}

/// Per-epoch results of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub started_at: String,
    pub finished_at: Option<String>,
    pub epochs: Vec<EpochRecord>,
}

impl Default for TrainingHistory {
    fn default() -> Self {
        Self {
            started_at: chrono::Local::now().to_rfc3339(),
            finished_at: None,
            epochs: Vec::new(),
        }
    }
}

impl TrainingHistory {
    /// Epoch with the lowest test loss
    pub fn best_epoch(&self) -> Option<&EpochRecord> {
        self.epochs
            .iter()
            .min_by(|a, b| a.test_loss.total_cmp(&b.test_loss))
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.epochs.last()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Adam with default moments, as used for every run
pub fn adam_optimizer<B: AutodiffBackend>() -> impl Optimizer<NestedUNet<B>, B> {
    AdamConfig::new().init()
}

/// Build a trainer with a fresh network from a run configuration
pub fn trainer_from_config<B: AutodiffBackend>(
    config: &RunConfig,
    device: &B::Device,
) -> Trainer<B, impl Optimizer<NestedUNet<B>, B>> {
    let model = config.model.to_network_config().init::<B>(device);

    let settings = TrainerSettings {
        epochs: config.training.epochs,
        batch_size: config.training.batch_size,
        learning_rate: config.training.learning_rate,
        shuffle: config.training.shuffle,
        seed: config.training.seed,
        progress_bar: config.training.progress_bar,
    };
    let plateau = PlateauConfig {
        factor: config.scheduler.factor,
        patience: config.scheduler.patience,
        threshold: config.scheduler.threshold,
        threshold_mode: config.scheduler.threshold_mode,
        min_lr: config.scheduler.min_lr,
    };

    Trainer::new(model, adam_optimizer::<B>(), device.clone())
        .with_settings(settings)
        .with_loss(CombinedLoss::new(
            config.training.weight_dice,
            config.training.weight_ce,
        ))
        .with_plateau(plateau)
        .with_checkpoints(CheckpointPolicy::new(
            &config.output.checkpoint_dir,
            &config.output.tag,
            config.training.checkpoint_every,
        ))
}

/// Epoch-loop driver owning the model and its optimizer
pub struct Trainer<B: AutodiffBackend, O: Optimizer<NestedUNet<B>, B>> {
    model: NestedUNet<B>,
    optimizer: O,
    loss: CombinedLoss,
    scheduler: ReduceLROnPlateau,
    checkpoints: CheckpointPolicy,
    settings: TrainerSettings,
    batcher: PlumeBatcher,
    rng: ChaCha8Rng,
    start_epoch: usize,
    history: TrainingHistory,
    device: B::Device,
}

impl<B, O> Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<NestedUNet<B>, B>,
{
    pub fn new(model: NestedUNet<B>, optimizer: O, device: B::Device) -> Self {
        let settings = TrainerSettings::default();
        Self {
            model,
            optimizer,
            loss: CombinedLoss::default(),
            scheduler: ReduceLROnPlateau::new(PlateauConfig::default(), settings.learning_rate),
            checkpoints: CheckpointPolicy::new("checkpoints", "UnetPp_V2", 5),
            rng: ChaCha8Rng::seed_from_u64(settings.seed),
            settings,
            batcher: PlumeBatcher::new(),
            start_epoch: 1,
            history: TrainingHistory::default(),
            device,
        }
    }

    /// Replace the loop settings; resets the scheduler's learning rate and the shuffle seed
    pub fn with_settings(mut self, settings: TrainerSettings) -> Self {
        self.scheduler = ReduceLROnPlateau::new(self.scheduler.config().clone(), settings.learning_rate);
        self.rng = ChaCha8Rng::seed_from_u64(settings.seed);
        self.settings = settings;
        self
    }

    pub fn with_loss(mut self, loss: CombinedLoss) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_plateau(mut self, config: PlateauConfig) -> Self {
        self.scheduler = ReduceLROnPlateau::new(config, self.settings.learning_rate);
        self
    }

    pub fn with_checkpoints(mut self, policy: CheckpointPolicy) -> Self {
        self.checkpoints = policy;
        self
    }

    /// Load parameters from a checkpoint and continue after its epoch
    ///
    /// When a `history.json` sits next to the checkpoint, its records up to the
    /// checkpoint epoch are kept and their test losses are replayed through the
    /// plateau scheduler, so the learning rate picks up where the run stopped.
    pub fn resume_from(mut self, path: &Path) -> Result<Self> {
        self.model = load_model(self.model, path, &self.device)?;

        let Some(epoch) = path
            .file_name()
            .and_then(|s| s.to_str())
            .and_then(extract_epoch_from_filename)
        else {
            return Ok(self);
        };
        self.start_epoch = epoch + 1;

        let history_path = path.with_file_name(HISTORY_FILE);
        if history_path.exists() {
            let mut history = TrainingHistory::load(&history_path)?;
            history.epochs.retain(|record| record.epoch <= epoch);
            history.finished_at = None;

            let mut scheduler =
                ReduceLROnPlateau::new(self.scheduler.config().clone(), self.settings.learning_rate);
            for record in &history.epochs {
                scheduler.step(record.test_loss);
            }
            self.scheduler = scheduler;

            if let Some(last) = history.last() {
                tracing::info!(
                    "Restored {} epochs of history (last test loss {:.4})",
                    history.epochs.len(),
                    last.test_loss
                );
            }
            self.history = history;
        } else {
            tracing::warn!(
                "No {} next to {:?}; learning rate restarts at {:.2e}",
                HISTORY_FILE,
                path,
                self.settings.learning_rate
            );
        }

        tracing::info!(
            "Resuming after epoch {} at learning rate {:.2e}",
            epoch,
            self.scheduler.get_lr()
        );
        Ok(self)
    }

    pub fn model(&self) -> &NestedUNet<B> {
        &self.model
    }

    pub fn learning_rate(&self) -> f64 {
        self.scheduler.get_lr()
    }

    pub fn start_epoch(&self) -> usize {
        self.start_epoch
    }

    fn progress_bar(&self, batches: usize, epoch: usize) -> ProgressBar {
        if !self.settings.progress_bar {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new(batches as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{prefix} [{bar:40.cyan/blue}] {pos}/{len} batches {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_prefix(format!("Epoch {}/{}", epoch, self.settings.epochs));
        bar
    }

    /// One pass over the training set; returns the sample-weighted mean loss
    pub fn train_one_epoch(&mut self, dataset: &PlumeDataset, epoch: usize) -> Result<f64> {
        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        if self.settings.shuffle {
            indices.shuffle(&mut self.rng);
        }

        let batch_size = self.settings.batch_size.max(1);
        let progress = self.progress_bar(indices.len().div_ceil(batch_size), epoch);
        let learning_rate = self.scheduler.get_lr();

        let mut loss_sum = 0.0;
        let mut seen = 0usize;

        for chunk in indices.chunks(batch_size) {
            let items = chunk
                .iter()
                .map(|&i| dataset.load(i))
                .collect::<Result<Vec<_>>>()?;
            let batch: PlumeBatch<B> = self.batcher.try_batch(items, &self.device)?;

            let logits = self.model.forward_with_mode(batch.images, ForwardMode::Train);
            let loss = self.loss.forward(logits, batch.targets);
            let loss_value: f64 = loss.clone().into_scalar().elem();

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self.optimizer.step(learning_rate, self.model.clone(), grads);

            loss_sum += loss_value * chunk.len() as f64;
            seen += chunk.len();
            progress.inc(1);
            progress.set_message(format!("loss {:.4}", loss_value));
        }
        progress.finish_and_clear();

        Ok(mean_or_zero(loss_sum, seen))
    }

    /// Execute the full epoch loop and write `history.json` next to the checkpoints
    pub fn run(&mut self, train: &PlumeDataset, test: &PlumeDataset) -> Result<TrainingHistory> {
        if self.start_epoch > self.settings.epochs {
            return Err(PlumeError::Config(format!(
                "nothing to do: resuming at epoch {} of {}",
                self.start_epoch, self.settings.epochs
            )));
        }
        std::fs::create_dir_all(&self.checkpoints.dir)?;

        tracing::info!(
            "Training on {} samples, testing on {} (epochs {}..={}, batch size {})",
            train.len(),
            test.len(),
            self.start_epoch,
            self.settings.epochs,
            self.settings.batch_size
        );

        let mut logger = EpochLogger::new(self.settings.epochs);
        let history_path = self.checkpoints.dir.join(HISTORY_FILE);
        let mut history = std::mem::take(&mut self.history);
        let mut epochs_run = 0;

        for epoch in self.start_epoch..=self.settings.epochs {
            logger.start_epoch(epoch);
            let learning_rate = self.scheduler.get_lr();

            let train_loss = self.train_one_epoch(train, epoch)?;

            let model = self.model.valid();
            let metrics = evaluate(&model, test, self.settings.batch_size, &self.device)?;
            let test_loss = test_one_epoch(
                &model,
                test,
                &self.loss,
                self.settings.batch_size,
                &self.device,
            )?;

            logger.end_epoch(epoch, train_loss, test_loss, &metrics, learning_rate);
            self.scheduler.step(test_loss);

            let checkpoint = if self.checkpoints.should_save(epoch) {
                Some(save_model(&self.model, &self.checkpoints.path_for(epoch))?)
            } else {
                None
            };

            history.epochs.push(EpochRecord {
                epoch,
                train_loss,
                test_loss,
                metrics,
                learning_rate,
                checkpoint,
            });
            history.save(&history_path)?;
            epochs_run += 1;
        }

        history.finished_at = Some(chrono::Local::now().to_rfc3339());
        history.save(&history_path)?;
        logger.log_complete(epochs_run);

        Ok(history)
    }
}

fn mean_or_zero(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Sample-weighted mean loss over a dataset, without gradients
pub fn test_one_epoch<B: Backend>(
    model: &NestedUNet<B>,
    dataset: &PlumeDataset,
    loss: &CombinedLoss,
    batch_size: usize,
    device: &B::Device,
) -> Result<f64> {
    let batcher = PlumeBatcher::new();
    let indices: Vec<usize> = (0..dataset.len()).collect();

    let mut loss_sum = 0.0;
    let mut seen = 0usize;

    for chunk in indices.chunks(batch_size.max(1)) {
        let items = chunk
            .iter()
            .map(|&i| dataset.load(i))
            .collect::<Result<Vec<_>>>()?;
        let batch: PlumeBatch<B> = batcher.try_batch(items, device)?;

        let logits = model.forward_with_mode(batch.images, ForwardMode::Eval);
        let value: f64 = loss.forward(logits, batch.targets).into_scalar().elem();

        loss_sum += value * chunk.len() as f64;
        seen += chunk.len();
    }

    Ok(mean_or_zero(loss_sum, seen))
}

/// IoU, Dice and FPR computed per sample and averaged over the dataset
pub fn evaluate<B: Backend>(
    model: &NestedUNet<B>,
    dataset: &PlumeDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<SegmentationMetrics> {
    let mut averager = MetricsAverager::new();

    for_each_prediction(model, dataset, batch_size, device, |item, prediction| {
        averager.push(compute_segmentation_metrics(prediction, &item.label)?);
        Ok(())
    })?;

    Ok(averager.mean())
}
