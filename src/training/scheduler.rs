//! Plateau learning-rate scheduler
//!
//! Reduces the learning rate by a constant factor once the monitored loss has
//! failed to improve for more than `patience` consecutive epochs. Only minimisation is
//! supported; the driver monitors the test loss.

use serde::{Deserialize, Serialize};

/// How `threshold` is compared against the best value seen so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    /// Improvement means `value < best * (1 - threshold)`
    #[default]
    Rel,
    /// Improvement means `value < best - threshold`
    Abs,
}

/// Configuration for [`ReduceLROnPlateau`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateauConfig {
    pub factor: f64,
    pub patience: usize,
    pub threshold: f64,
    pub threshold_mode: ThresholdMode,
    pub min_lr: f64,
}

impl Default for PlateauConfig {
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

/// Reduce-on-plateau learning-rate controller
#[derive(Debug, Clone)]
pub struct ReduceLROnPlateau {
    config: PlateauConfig,
    current_lr: f64,
    best: Option<f64>,
    bad_epochs: usize,
    num_reductions: usize,
}

impl ReduceLROnPlateau {
    pub fn new(config: PlateauConfig, initial_lr: f64) -> Self {
        Self {
            config,
            current_lr: initial_lr,
            best: None,
            bad_epochs: 0,
            num_reductions: 0,
        }
    }

    /// Get the current learning rate
    pub fn get_lr(&self) -> f64 {
        self.current_lr
    }

    pub fn config(&self) -> &PlateauConfig {
        &self.config
    }

    /// Best monitored value so far
    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Consecutive epochs without improvement
    pub fn bad_epochs(&self) -> usize {
        self.bad_epochs
    }

    pub fn num_reductions(&self) -> usize {
        self.num_reductions
    }

    fn is_improvement(&self, value: f64, best: f64) -> bool {
        match self.config.threshold_mode {
            ThresholdMode::Rel => value < best * (1.0 - self.config.threshold),
            ThresholdMode::Abs => value < best - self.config.threshold,
        }
    }

    /// Feed one epoch's monitored loss; returns the new learning rate when it was reduced
    pub fn step(&mut self, value: f64) -> Option<f64> {
        let improved = match self.best {
            Some(best) => self.is_improvement(value, best),
            None => true,
        };

        if improved {
            self.best = Some(value);
            self.bad_epochs = 0;
            return None;
        }

        self.bad_epochs += 1;
        if self.bad_epochs <= self.config.patience {
            return None;
        }

        self.bad_epochs = 0;
        let new_lr = (self.current_lr * self.config.factor).max(self.config.min_lr);
        if new_lr < self.current_lr {
            tracing::info!(
                "Reducing learning rate: {:.2e} -> {:.2e}",
                self.current_lr,
                new_lr
            );
            self.current_lr = new_lr;
            self.num_reductions += 1;
            Some(new_lr)
        } else {
            None
        }
    }
}
