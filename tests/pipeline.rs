use std::fs;
use std::path::Path;

use burn::backend::Autodiff;
use burn::module::{AutodiffModule, Module};
use burn_ndarray::NdArray;
use ndarray::{Array2, Array3};
use ndarray_npy::write_npy;

use plume_seg::dataset::{PlumeDataset, SampleIndex, DIFFICULTY_EASY, DIFFICULTY_HARD};
use plume_seg::evaluation::{evaluate_plume_metrics, evaluate_subsets};
use plume_seg::model::RunConfig;
use plume_seg::training::{load_model, trainer_from_config};
use plume_seg::utils::metrics::compute_segmentation_metrics;

type Train = Autodiff<NdArray>;
type Infer = NdArray;

/// Four 16x16 samples; plumes are a square whose corner depends on the sample
fn write_fixture(dir: &Path) {
    let mut csv = String::from("id,difficulty\n");
    for i in 0..4 {
        let id = format!("tile{}", i);
        let offset = 2 + i * 2;

        let label = Array2::<u8>::from_shape_fn((16, 16), |(y, x)| {
            u8::from((offset..offset + 4).contains(&y) && (offset..offset + 4).contains(&x))
        });
        let image = Array3::<f32>::from_shape_fn((9, 16, 16), |(c, y, x)| {
            let plume = f32::from(label[[y, x]]);
            plume * (c as f32 + 1.0) * 0.1 + ((x + y) % 5) as f32 * 0.01
        });

        write_npy(dir.join(format!("{}_image.npy", id)), &image).unwrap();
        write_npy(dir.join(format!("{}_label.npy", id)), &label).unwrap();
        csv.push_str(&format!("{},{}\n", id, if i % 2 == 0 { "easy" } else { "hard" }));
    }
    fs::write(dir.join("index.csv"), csv).unwrap();
}

fn tiny_config(root: &Path) -> RunConfig {
    let mut config = RunConfig::default();
    config.model.base_channels = 2;
    config.training.epochs = 5;
    config.training.batch_size = 2;
    config.training.learning_rate = 1e-3;
    config.training.progress_bar = false;
    config.data.train_csv = root.join("index.csv");
    config.data.train_dir = root.to_path_buf();
    config.data.test_csv = root.join("index.csv");
    config.data.test_dir = root.to_path_buf();
    config.output.checkpoint_dir = root.join("checkpoints");
    config.output.tag = "tiny".to_string();
    config
}

#[test]
fn train_checkpoint_and_evaluate_subsets() {
    let temp = tempfile::tempdir().unwrap();
    write_fixture(temp.path());
    let config = tiny_config(temp.path());
    config.validate().unwrap();

    let index = SampleIndex::from_csv(&config.data.train_csv, &config.data.train_dir).unwrap();
    let dataset = PlumeDataset::new(index.clone());

    let device = Default::default();
    let mut trainer = trainer_from_config::<Train>(&config, &device);
    let history = trainer.run(&dataset, &dataset).unwrap();

    assert_eq!(history.epochs.len(), 5);
    for record in &history.epochs {
        assert!(record.train_loss.is_finite());
        assert!(record.test_loss.is_finite());
        assert!((0.0..=1.0).contains(&record.metrics.iou));
    }

    let checkpoint = config.output.checkpoint_dir.join("epoch_5_tiny.mpk");
    assert!(checkpoint.exists());
    assert!(!config.output.checkpoint_dir.join("epoch_4_tiny.mpk").exists());
    assert!(config.output.checkpoint_dir.join("history.json").exists());

    // Reload into an inference model and score the difficulty subsets
    let model = load_model(
        config.model.to_network_config().init::<Infer>(&device),
        &checkpoint,
        &device,
    )
    .unwrap();

    let easy = PlumeDataset::new(index.filter_difficulty(DIFFICULTY_EASY));
    let hard = PlumeDataset::new(index.filter_difficulty(DIFFICULTY_HARD));
    assert_eq!(easy.index().len(), 2);
    assert_eq!(hard.index().len(), 2);

    let easy = evaluate_plume_metrics(&model, &easy, 1, &device).unwrap();
    let hard = evaluate_plume_metrics(&model, &hard, 1, &device).unwrap();
    assert_eq!(easy.total_plumes + hard.total_plumes, 4);

    // End-of-run report straight from the trained weights
    let report = evaluate_subsets(&trainer.model().valid(), &index, 9, 1, &device).unwrap();
    assert_eq!(report.overall.total_plumes, 4);
    assert_eq!(report.easy.total_plumes, easy.total_plumes);
    assert_eq!(report.hard.total_plumes, hard.total_plumes);
    assert!((0.0..=100.0).contains(&report.overall.captured_plumes_percent));

    let reloaded = evaluate_plume_metrics(&model, &dataset, 1, &device).unwrap();
    assert_eq!(reloaded.total_plumes, report.overall.total_plumes);

    let path = temp.path().join("report.json");
    report.save(&path).unwrap();
    assert!(fs::read_to_string(&path).unwrap().contains("Captured Plumes (%)"));

    // The trained autodiff model and the reloaded one agree on parameter count
    assert_eq!(trainer.model().valid().num_params(), model.num_params());
}

#[test]
fn malformed_array_aborts_training() {
    let temp = tempfile::tempdir().unwrap();
    write_fixture(temp.path());
    fs::write(temp.path().join("tile0_image.npy"), b"not an array").unwrap();

    // Unshuffled, so the first batch holds the broken tile
    let mut config = tiny_config(temp.path());
    config.training.epochs = 1;
    config.training.shuffle = false;
    let dataset = PlumeDataset::new(
        SampleIndex::from_csv(&config.data.train_csv, &config.data.train_dir).unwrap(),
    );

    let device = Default::default();
    let mut trainer = trainer_from_config::<Train>(&config, &device);
    assert!(trainer.run(&dataset, &dataset).is_err());
}

#[test]
fn all_ones_sample_scores_perfectly() {
    let label = vec![1i64; 16];
    let prediction = vec![1i64; 16];
    let metrics = compute_segmentation_metrics(&prediction, &label).unwrap();

    assert!((metrics.iou - 1.0).abs() < 1e-6);
    assert!((metrics.dice - 1.0).abs() < 1e-6);
    assert_eq!(metrics.fpr, 0.0);
}
