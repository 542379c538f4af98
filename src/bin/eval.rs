use anyhow::{bail, Context, Result};
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::NdArray;
use clap::Parser;
use finegrain_classifier::data::{resize_batch, ClassifyDataLoader, ClassifyDataset};
use finegrain_classifier::training::ClassificationMetric;
use finegrain_classifier::{FineGrainedClassifier, TrainConfig};
use std::path::{Path, PathBuf};

type EvalBackend = NdArray<f32>;

#[derive(Parser, Debug)]
#[command(name = "eval", about = "Score a trained classifier checkpoint")]
struct Args {
    /// Path to the YAML training configuration used for the run.
    #[arg(short, long, default_value = "train_config.yaml")]
    config: String,

    /// Checkpoint file to evaluate.
    #[arg(short, long)]
    weights: PathBuf,

    /// Fold whose validation subset to score.
    #[arg(long, default_value_t = 0)]
    fold: usize,

    /// Evaluate at every configured scale instead of the base size only.
    #[arg(long, default_value_t = false)]
    multi_scale: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = TrainConfig::from_yaml(&args.config)
        .with_context(|| format!("load config {}", args.config))?;

    let device = NdArrayDevice::Cpu;
    let dataset = ClassifyDataset::new(
        Path::new(&config.dataset_root),
        config.selected_labels.as_deref(),
    )?;
    let splits = dataset.fold_splits_with_manifest(
        config.n_splits,
        config.val_size,
        config.seed,
        config.load_split_from_file.as_deref(),
    )?;
    let Some(split) = splits.get(args.fold) else {
        bail!(
            "fold {} out of range, {} splits available",
            args.fold,
            splits.len()
        );
    };

    let model = FineGrainedClassifier::<EvalBackend>::new(
        &device,
        config.model_type,
        dataset.num_classes(),
        0.0,
    )
    .load_weights(&args.weights, &device)?;
    log::info!(
        "evaluating {} on fold {} ({} samples)",
        args.weights.display(),
        args.fold,
        split.val.len()
    );

    let scales = if args.multi_scale && !config.multi_scale_size.is_empty() {
        config.multi_scale_size.clone()
    } else {
        vec![config.image_size]
    };

    let mut metric = ClassificationMetric::new(dataset.class_names().to_vec());
    for &scale in &scales {
        let loader = ClassifyDataLoader::<EvalBackend>::new(
            dataset.clone(),
            split.val.clone(),
            config.batch_size,
            config.image_size,
            false,
            None,
            config.seed,
            device,
        );
        for batch in loader {
            let images = resize_batch(batch.images, scale);
            let output = model.forward(images);
            let truths: Vec<usize> = batch
                .labels
                .into_data()
                .iter::<i64>()
                .map(|v| v as usize)
                .collect();
            let preds: Vec<usize> = output
                .scores
                .argmax(1)
                .squeeze::<1>(1)
                .into_data()
                .iter::<i64>()
                .map(|v| v as usize)
                .collect();
            metric.update(&truths, &preds);
        }
    }

    println!("{}", metric.report());
    Ok(())
}
