use anyhow::{bail, Context, Result};
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use clap::Parser;
use finegrain_classifier::data::ClassifyDataset;
use finegrain_classifier::training::TrainVal;
use finegrain_classifier::TrainConfig;
use std::path::Path;

type TrainBackend = Autodiff<NdArray<f32>>;

#[derive(Parser, Debug)]
#[command(name = "train", about = "Train the fine-grained classifier")]
struct Args {
    /// Path to the YAML training configuration. Created with defaults when
    /// missing.
    #[arg(short, long, default_value = "train_config.yaml")]
    config: String,

    /// Override the dataset root directory.
    #[arg(long)]
    data: Option<String>,

    /// Override the number of training epochs.
    #[arg(long)]
    epochs: Option<usize>,

    /// Override the batch size.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override which folds to run, e.g. --folds 0,1,2.
    #[arg(long, value_delimiter = ',')]
    folds: Option<Vec<usize>>,

    /// Override the RNG seed.
    #[arg(long)]
    seed: Option<u64>,
}

fn load_config(args: &Args) -> Result<TrainConfig> {
    let mut config = if Path::new(&args.config).exists() {
        TrainConfig::from_yaml(&args.config)
            .with_context(|| format!("load config {}", args.config))?
    } else {
        let config = TrainConfig::default();
        config
            .save(&args.config)
            .with_context(|| format!("write default config {}", args.config))?;
        log::info!("wrote default config to {}", args.config);
        config
    };

    if let Some(data) = &args.data {
        config.dataset_root = data.clone();
    }
    if let Some(epochs) = args.epochs {
        config.epoch = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(folds) = &args.folds {
        config.selected_folds = folds.clone();
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;

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

    for &fold in &config.selected_folds {
        let Some(split) = splits.get(fold) else {
            bail!("fold {fold} out of range, {} splits available", splits.len());
        };
        log::info!("starting fold {fold}");
        let device = NdArrayDevice::Cpu;
        let mut session =
            TrainVal::<TrainBackend>::new(config.clone(), fold, &dataset, device)?;
        let best = session.train(&dataset, split)?;
        log::info!("fold {fold} finished, best accuracy {best:.4}");
    }

    Ok(())
}
