//! Logging Module
//!
//! Structured logging on top of the `tracing` crate, plus a small epoch
//! logger that produces the per-epoch report line of the training driver.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::utils::metrics::SegmentationMetrics;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Create a verbose logging config for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// Create a quiet logging config (errors only)
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Initialize logging with the given configuration
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Per-epoch reporter for the training driver
pub struct EpochLogger {
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl EpochLogger {
    pub fn new(total_epochs: usize) -> Self {
        let now = Instant::now();
        Self {
            total_epochs,
            epoch_start: now,
            training_start: now,
        }
    }

    /// Mark the start of an epoch (1-based)
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch_start = Instant::now();
        tracing::debug!("Epoch {}/{} started", epoch, self.total_epochs);
    }

    /// Format the report line for a finished epoch
    pub fn format_epoch(
        &self,
        epoch: usize,
        train_loss: f64,
        test_loss: f64,
        metrics: &SegmentationMetrics,
    ) -> String {
        format!(
            "Epoch {}/{} - Train Loss: {:.4}; Test Loss: {:.4} - Metrics: {}",
            epoch, self.total_epochs, train_loss, test_loss, metrics
        )
    }

    /// Log the report line for a finished epoch
    pub fn end_epoch(
        &self,
        epoch: usize,
        train_loss: f64,
        test_loss: f64,
        metrics: &SegmentationMetrics,
        learning_rate: f64,
    ) {
        tracing::info!(
            "{} | LR: {:.2e} | {:.1}s",
            self.format_epoch(epoch, train_loss, test_loss, metrics),
            learning_rate,
            self.epoch_start.elapsed().as_secs_f64()
        );
    }

    /// Log training completion
    pub fn log_complete(&self, epochs_run: usize) {
        tracing::info!(
            "Training complete! {} epochs in {:.1}s",
            epochs_run,
            self.training_start.elapsed().as_secs_f64()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert!(!config.include_target);
        assert_eq!(LogConfig::quiet().level, LogLevel::Error);
    }

    #[test]
    fn test_epoch_line_format() {
        let logger = EpochLogger::new(250);
        let metrics = SegmentationMetrics {
            iou: 0.5,
            dice: 0.6667,
            fpr: 0.01,
        };
        let line = logger.format_epoch(3, 0.81234, 0.7, &metrics);
        assert!(line.starts_with("Epoch 3/250 - Train Loss: 0.8123; Test Loss: 0.7000"));
        assert!(line.contains("IoU"));
        assert!(line.contains("Dice"));
        assert!(line.contains("FPR"));
    }
}
