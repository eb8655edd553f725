//! Plume segmentation CLI
//!
//! Entry point for training the nested U-Net on preprocessed methane plume
//! data, evaluating checkpoints on the test set and its difficulty subsets,
//! previewing single predictions and inspecting datasets.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::module::AutodiffModule;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use plume_seg::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use plume_seg::dataset::{DatasetStats, PlumeDataset, SampleIndex};
use plume_seg::evaluation::{evaluate_subsets, for_each_prediction};
use plume_seg::model::{NestedUNet, RunConfig};
use plume_seg::training::{load_model, trainer_from_config};
use plume_seg::utils::format_duration;
use plume_seg::utils::logging::{init_logging, LogConfig};
use plume_seg::utils::metrics::compute_segmentation_metrics;

/// Methane Plume Segmentation
///
/// Trains and evaluates a nested U-Net on 9-band satellite tiles using the
/// Burn framework.
#[derive(Parser, Debug)]
#[command(name = "plume_seg")]
#[command(version)]
#[command(about = "Methane plume segmentation with a nested U-Net and Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// TOML run configuration (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train the network
    Train {
        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Initial learning rate
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Output directory for checkpoints and history
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Checkpoint to continue training from; the learning rate is replayed
        /// from the history.json next to it
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Hide the batch progress bar
        #[arg(long, default_value = "false")]
        no_progress: bool,
    },

    /// Evaluate a checkpoint on the test set and its easy/hard subsets
    Evaluate {
        /// Path to a saved checkpoint
        #[arg(short = 'm', long)]
        checkpoint: PathBuf,

        /// Batch size for inference
        #[arg(short, long, default_value = "1")]
        batch_size: usize,

        /// Where to write the JSON report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Predict one test sample and write a ground truth | prediction PNG
    Predict {
        /// Path to a saved checkpoint
        #[arg(short = 'm', long)]
        checkpoint: PathBuf,

        /// Row of the test index to predict
        #[arg(short, long, default_value = "0")]
        index: usize,

        /// Output PNG path
        #[arg(short, long, default_value = "prediction.png")]
        output: PathBuf,
    },

    /// Show dataset statistics
    Stats {
        /// Index CSV (defaults to the configured test index)
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Directory with the sample arrays
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    let config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };

    match cli.command {
        Commands::Train {
            epochs,
            batch_size,
            learning_rate,
            output_dir,
            resume,
            no_progress,
        } => {
            let mut config = config;
            if let Some(epochs) = epochs {
                config.training.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                config.training.batch_size = batch_size;
            }
            if let Some(learning_rate) = learning_rate {
                config.training.learning_rate = learning_rate;
            }
            if let Some(output_dir) = output_dir {
                config.output.checkpoint_dir = output_dir;
            }
            if no_progress {
                config.training.progress_bar = false;
            }
            cmd_train(&config, resume.as_deref())?;
        }

        Commands::Evaluate {
            checkpoint,
            batch_size,
            output,
        } => {
            cmd_evaluate(&config, &checkpoint, batch_size, output)?;
        }

        Commands::Predict {
            checkpoint,
            index,
            output,
        } => {
            cmd_predict(&config, &checkpoint, index, &output)?;
        }

        Commands::Stats { csv, data_dir } => {
            let csv = csv.unwrap_or_else(|| config.data.test_csv.clone());
            let data_dir = data_dir.unwrap_or_else(|| config.data.test_dir.clone());
            cmd_stats(&csv, &data_dir, config.model.in_channels)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════════╗
 ║   Methane Plume Segmentation                                     ║
 ║   Nested U-Net with Burn + Rust                                  ║
 ╚══════════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn print_config_summary(config: &RunConfig) {
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Backend:        {}", backend_name());
    println!("  Epochs:         {}", config.training.epochs);
    println!("  Batch size:     {}", config.training.batch_size);
    println!("  Learning rate:  {}", config.training.learning_rate);
    println!(
        "  Loss weights:   dice {} / ce {}",
        config.training.weight_dice, config.training.weight_ce
    );
    println!("  Base channels:  {}", config.model.base_channels);
    println!("  Checkpoints:    {:?}", config.output.checkpoint_dir);
    println!();
}

fn load_dataset(csv: &Path, dir: &Path, in_channels: usize) -> Result<PlumeDataset> {
    let index = SampleIndex::from_csv(csv, dir)
        .with_context(|| format!("Failed to load index {:?}", csv))?;
    Ok(PlumeDataset::with_channels(index, in_channels))
}

fn load_eval_model(config: &RunConfig, checkpoint: &Path) -> Result<NestedUNet<DefaultBackend>> {
    let device = default_device();
    let model = config.model.to_network_config().init::<DefaultBackend>(&device);
    Ok(load_model(model, checkpoint, &device)?)
}

fn cmd_train(config: &RunConfig, resume: Option<&Path>) -> Result<()> {
    config.validate()?;
    print_config_summary(config);

    let in_channels = config.model.in_channels;
    let train = load_dataset(&config.data.train_csv, &config.data.train_dir, in_channels)?;
    let test = load_dataset(&config.data.test_csv, &config.data.test_dir, in_channels)?;
    info!("Loaded {} training and {} test samples", train.index().len(), test.index().len());

    let device = default_device();
    let mut trainer = trainer_from_config::<TrainingBackend>(config, &device);
    if let Some(path) = resume {
        trainer = trainer.resume_from(path)?;
    }

    std::fs::create_dir_all(&config.output.checkpoint_dir)?;
    config.save(&config.output.checkpoint_dir.join("config.toml"))?;

    println!("{}", "Starting Training...".green().bold());
    let start = std::time::Instant::now();
    let history = trainer.run(&train, &test)?;

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!("  Duration: {}", format_duration(start.elapsed().as_secs_f64()));
    if let Some(best) = history.best_epoch() {
        println!(
            "  Best test loss: {:.4} (epoch {}) - Metrics: {}",
            best.test_loss, best.epoch, best.metrics
        );
    }

    let model = trainer.model().valid();
    let output = config.output.checkpoint_dir.join("plume_metrics.json");
    evaluate_subsets_report(config, &model, 1, &output)
}

fn cmd_evaluate(
    config: &RunConfig,
    checkpoint: &Path,
    batch_size: usize,
    output: Option<PathBuf>,
) -> Result<()> {
    let model = load_eval_model(config, checkpoint)?;
    let output = output.unwrap_or_else(|| config.output.checkpoint_dir.join("plume_metrics.json"));
    evaluate_subsets_report(config, &model, batch_size, &output)
}

/// Plume metrics on the test index and its easy/hard subsets, printed and saved
fn evaluate_subsets_report(
    config: &RunConfig,
    model: &NestedUNet<DefaultBackend>,
    batch_size: usize,
    output: &Path,
) -> Result<()> {
    let device = default_device();
    let index = SampleIndex::from_csv(&config.data.test_csv, &config.data.test_dir)
        .with_context(|| format!("Failed to load index {:?}", config.data.test_csv))?;

    let report = evaluate_subsets(model, &index, config.model.in_channels, batch_size, &device)?;
    println!();
    report.print();

    report.save(output)?;
    println!();
    println!("  Report saved to: {:?}", output);
    Ok(())
}

fn cmd_predict(config: &RunConfig, checkpoint: &Path, index: usize, output: &Path) -> Result<()> {
    let model = load_eval_model(config, checkpoint)?;
    let device = default_device();

    let full = load_dataset(&config.data.test_csv, &config.data.test_dir, config.model.in_channels)?;
    let record = full
        .index()
        .record(index)
        .cloned()
        .with_context(|| format!("Index {} out of range ({} samples)", index, full.index().len()))?;
    let single = PlumeDataset::with_channels(
        SampleIndex::new(vec![record], full.index().data_dir()),
        config.model.in_channels,
    );

    let mut preview = None;
    for_each_prediction(&model, &single, 1, &device, |item, prediction| {
        let metrics = compute_segmentation_metrics(prediction, &item.label)?;
        println!("{} {}", "Sample".cyan().bold(), item.id);
        println!("  Metrics: {}", metrics);
        preview = Some(side_by_side(&item.label, prediction, item.height, item.width));
        Ok(())
    })?;

    let image = preview.context("No prediction produced")?;
    image
        .save(output)
        .with_context(|| format!("Failed to write {:?}", output))?;
    println!("  Preview saved to: {:?}", output);
    Ok(())
}

/// Ground truth on the left, prediction on the right, separated by a gray column
fn side_by_side(label: &[i64], prediction: &[i64], height: usize, width: usize) -> image::GrayImage {
    let gap = 4;
    image::GrayImage::from_fn((2 * width + gap) as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let value = if x < width {
            label[y * width + x]
        } else if x >= width + gap {
            prediction[y * width + x - width - gap]
        } else {
            return image::Luma([128]);
        };
        image::Luma([if value != 0 { 255 } else { 0 }])
    })
}

fn cmd_stats(csv: &Path, data_dir: &Path, in_channels: usize) -> Result<()> {
    let dataset = load_dataset(csv, data_dir, in_channels)?;
    let stats = DatasetStats::collect(&dataset)?;
    stats.print();
    Ok(())
}
