use crate::config::{OptimizerKind, TrainConfig};
use crate::data::{
    generate_mixed_sample, resize_batch, should_mix, ClassifyDataLoader, ClassifyDataset,
    DataAugmentation, FoldSplit, MultiScaleSchedule,
};
use crate::model::{ClassifyLoss, FineGrainedClassifier};
use crate::training::checkpoint::Checkpointer;
use crate::training::logging::RunLogger;
use crate::training::metrics::ClassificationMetric;
use crate::training::scheduler::LrSchedule;
use crate::training::state::{BestTracker, EpochStats};
use anyhow::{bail, Result};
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{
    Adam, AdamConfig, AdamW, AdamWConfig, GradientsParams, Optimizer, Sgd, SgdConfig,
};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

/// Optimizer resolved once from the configuration.
pub enum ClassifyOptimizer<B: AutodiffBackend> {
    Adam(OptimizerAdaptor<Adam<B::InnerBackend>, FineGrainedClassifier<B>, B>),
    AdamW(OptimizerAdaptor<AdamW<B::InnerBackend>, FineGrainedClassifier<B>, B>),
    Sgd(OptimizerAdaptor<Sgd<B::InnerBackend>, FineGrainedClassifier<B>, B>),
}

impl<B: AutodiffBackend> ClassifyOptimizer<B> {
    pub fn new(config: &TrainConfig) -> Self {
        let decay = (config.weight_decay > 0.0).then(|| WeightDecayConfig::new(config.weight_decay.into()));
        match config.optimizer {
            OptimizerKind::Adam => Self::Adam(
                AdamConfig::new()
                    .with_weight_decay(decay)
                    .init::<B, FineGrainedClassifier<B>>(),
            ),
            OptimizerKind::AdamW => Self::AdamW(
                AdamWConfig::new()
                    .with_weight_decay(config.weight_decay)
                    .init::<B, FineGrainedClassifier<B>>(),
            ),
            OptimizerKind::Sgd => Self::Sgd(
                SgdConfig::new()
                    .with_momentum(Some(
                        MomentumConfig::new().with_momentum(config.momentum),
                    ))
                    .with_weight_decay(decay)
                    .init::<B, FineGrainedClassifier<B>>(),
            ),
        }
    }

    pub fn step(
        &mut self,
        lr: f64,
        model: FineGrainedClassifier<B>,
        grads: GradientsParams,
    ) -> FineGrainedClassifier<B> {
        match self {
            Self::Adam(inner) => inner.step(lr, model, grads),
            Self::AdamW(inner) => inner.step(lr, model, grads),
            Self::Sgd(inner) => inner.step(lr, model, grads),
        }
    }
}

/// Result of one validation pass.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// Mean accuracy over the evaluated scales.
    pub overall_accuracy: f32,
    pub avg_loss: f32,
    /// Whether this epoch strictly improved on the best score so far.
    pub is_best: bool,
    pub per_scale: Vec<(usize, f32)>,
}

/// One train/validate session for a single fold: owns the model, optimizer,
/// schedule and bookkeeping, and drives the epoch loop.
pub struct TrainVal<B: AutodiffBackend> {
    config: TrainConfig,
    fold: usize,
    seed: u64,
    model: FineGrainedClassifier<B>,
    optimizer: ClassifyOptimizer<B>,
    scheduler: LrSchedule<B>,
    criterion: ClassifyLoss<B>,
    metric: ClassificationMetric,
    logger: RunLogger,
    checkpointer: Checkpointer,
    best: BestTracker,
    scale_schedule: MultiScaleSchedule,
    rng: StdRng,
    lr: f64,
    iteration: usize,
    device: B::Device,
}

impl<B: AutodiffBackend> core::fmt::Debug for TrainVal<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TrainVal")
            .field("fold", &self.fold)
            .field("seed", &self.seed)
            .field("iteration", &self.iteration)
            .finish_non_exhaustive()
    }
}

impl<B: AutodiffBackend> TrainVal<B> {
    pub fn new(
        config: TrainConfig,
        fold: usize,
        dataset: &ClassifyDataset,
        device: B::Device,
    ) -> Result<Self> {
        // selected_labels narrows the class set, so the configured count only
        // binds when the full dataset is in play.
        if config.selected_labels.is_none() && config.num_classes != dataset.num_classes() {
            bail!(
                "config num_classes is {} but the dataset has {} classes",
                config.num_classes,
                dataset.num_classes()
            );
        }

        let seed = config.seed.unwrap_or_else(rand::random);

        let mut model = FineGrainedClassifier::<B>::new(
            &device,
            config.model_type,
            dataset.num_classes(),
            config.drop_rate,
        );
        if let Some(path) = &config.weight_path {
            model = model.load_weights(path, &device)?;
            log::info!("loaded initial weights from {}", path.display());
        }

        let scale_sizes = if config.multi_scale {
            config.multi_scale_size.clone()
        } else {
            Vec::new()
        };

        Ok(Self {
            optimizer: ClassifyOptimizer::new(&config),
            scheduler: LrSchedule::new(&config),
            criterion: ClassifyLoss::new(config.loss_name, config.fine_grained_weight, &device),
            metric: ClassificationMetric::new(dataset.class_names().to_vec()),
            logger: RunLogger::new(&config, seed)?,
            checkpointer: Checkpointer::new(
                Path::new(&config.save_path),
                config.model_type.name(),
                fold,
                config.save_interval,
            )?,
            best: BestTracker::new(),
            scale_schedule: MultiScaleSchedule::new(
                scale_sizes,
                config.multi_scale_interval,
                config.image_size,
            ),
            rng: StdRng::seed_from_u64(seed),
            lr: config.lr,
            iteration: 0,
            seed,
            model,
            config,
            fold,
            device,
        })
    }

    /// Runs the full epoch loop for this fold and returns the best validation
    /// accuracy reached.
    pub fn train(&mut self, dataset: &ClassifyDataset, split: &FoldSplit) -> Result<f32> {
        log::info!(
            "fold {}: {} train / {} val samples, {} classes",
            self.fold,
            split.train.len(),
            split.val.len(),
            dataset.num_classes()
        );

        let augmentation = DataAugmentation::new(
            self.config.augmentation_flag,
            self.config.erase_prob,
            self.config.gray_prob,
        );
        let mut train_loader = ClassifyDataLoader::<B>::new(
            dataset.clone(),
            split.train.clone(),
            self.config.batch_size,
            self.config.image_size,
            true,
            Some(augmentation),
            Some(self.seed),
            self.device.clone(),
        );

        for epoch in 1..=self.config.epoch {
            train_loader.reset();
            self.train_epoch(&mut train_loader, epoch)?;

            let outcome = self.validate(dataset, split, epoch)?;
            self.logger.scalar("ValAccEpoch", epoch, outcome.overall_accuracy);
            self.logger.scalar("ValLossEpoch", epoch, outcome.avg_loss);
            for &(scale, acc) in &outcome.per_scale {
                self.logger.scalar(&format!("ValAccScale{scale}"), epoch, acc);
            }

            self.checkpointer.save_latest::<B::InnerBackend, _>(
                self.model.valid(),
                epoch,
                self.best.best(),
            )?;
            if self
                .checkpointer
                .maybe_save_interval::<B::InnerBackend, _>(self.model.valid(), epoch)?
            {
                log::info!("saved interval checkpoint at epoch {epoch}");
            }
            if outcome.is_best {
                self.checkpointer.save_best::<B::InnerBackend, _>(
                    self.model.valid(),
                    epoch,
                    self.best.best(),
                )?;
                if self.config.selected_labels.is_none() {
                    self.metric
                        .save_report(self.logger.dir(), &format!("fold{}", self.fold))?;
                }
                log::info!(
                    "epoch {epoch}: new best accuracy {:.4}",
                    outcome.overall_accuracy
                );
            }

            self.lr = self.scheduler.step_epoch(Some(outcome.overall_accuracy as f64));
            self.logger.scalar("Lr", epoch, self.lr as f32);
        }

        self.checkpointer.backup_best()?;
        Ok(self.best.best())
    }

    fn train_epoch(&mut self, loader: &mut ClassifyDataLoader<B>, epoch: usize) -> Result<()> {
        let mut stats = EpochStats::new();
        let bar = ProgressBar::new(loader.len() as u64);
        let style = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);

        // Scale re-sampling keys on the position within the epoch, so every
        // epoch starts with a fresh draw regardless of the global step count.
        let mut batch_index = 0usize;
        for batch in loader.by_ref() {
            let size = self.scale_schedule.select(batch_index, &mut self.rng);
            batch_index += 1;
            self.iteration += 1;

            let images = resize_batch(batch.images, size);
            let labels = batch.labels;

            let (loss, correct) = if self.config.cut_mix
                && should_mix(self.config.beta, self.config.cutmix_prob, &mut self.rng)
            {
                let mixed =
                    generate_mixed_sample(self.config.beta, images, labels, &mut self.rng)?;
                let output = self.model.forward(mixed.images);
                let loss = self.criterion.compute_mixed(
                    &output,
                    mixed.labels_a.clone(),
                    mixed.labels_b,
                    mixed.lam,
                );
                // Iteration accuracy is scored against the plain batch labels.
                let correct = self
                    .model
                    .correct(output.scores, mixed.labels_a)
                    .sum()
                    .into_scalar()
                    .elem::<f32>();
                (loss, correct)
            } else {
                let output = self.model.forward(images);
                let loss = self.criterion.compute(&output, labels.clone());
                let correct = self
                    .model
                    .correct(output.scores, labels)
                    .sum()
                    .into_scalar()
                    .elem::<f32>();
                (loss, correct)
            };

            let mut loss = loss;
            if self.config.sparsity {
                loss = loss
                    + self
                        .model
                        .bn_gamma_l1()
                        .mul_scalar(self.config.sparsity_scale);
            }
            if self.config.l1_regular {
                loss = loss + self.model.weight_l1().mul_scalar(self.config.l1_decay);
            }

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self.optimizer.step(self.lr, self.model.clone(), grads);

            stats.record_batch(correct, batch.batch_size);
            self.logger
                .scalar("TrainAccIteration", self.iteration, stats.accuracy());

            let logger = &mut self.logger;
            let loss_fragment = self
                .criterion
                .record_iteration(self.iteration, |tag, value, step| {
                    logger.scalar(tag, step, value)
                });
            bar.set_message(format!(
                "[Train Fold {}][Epoch {}/{}][Size {}][Lr {:.6}]{}[Acc: {:.4}]",
                self.fold,
                epoch,
                self.config.epoch,
                size,
                self.lr,
                loss_fragment,
                stats.accuracy()
            ));
            bar.inc(1);
        }

        let logger = &mut self.logger;
        let epoch_fragment = self
            .criterion
            .record_epoch(stats.batches(), epoch, |tag, value, step| {
                logger.scalar(tag, step, value)
            });
        self.logger.scalar("TrainAccEpoch", epoch, stats.accuracy());
        bar.finish_with_message(format!(
            "[Train Fold {}][Epoch {}/{}]{}[Acc: {:.4}]",
            self.fold,
            epoch,
            self.config.epoch,
            epoch_fragment,
            stats.accuracy()
        ));
        Ok(())
    }

    /// Evaluates the frozen model on the validation subset. With multi-scale
    /// validation enabled, every configured scale is scored and the reported
    /// accuracy is their mean.
    fn validate(
        &mut self,
        dataset: &ClassifyDataset,
        split: &FoldSplit,
        epoch: usize,
    ) -> Result<ValidationOutcome> {
        let model = self.model.valid();
        let mut criterion = ClassifyLoss::<B::InnerBackend>::new(
            self.config.loss_name,
            self.config.fine_grained_weight,
            &self.device,
        );

        let scales = if self.config.val_multi_scale && !self.config.multi_scale_size.is_empty() {
            self.config.multi_scale_size.clone()
        } else {
            vec![self.config.image_size]
        };

        let mut per_scale = Vec::with_capacity(scales.len());
        let mut loss_sum = 0.0;
        let mut batches = 0usize;

        for &scale in &scales {
            let mut stats = EpochStats::new();
            // The persisted report reflects the last scale evaluated.
            self.metric.reset();
            let loader = ClassifyDataLoader::<B::InnerBackend>::new(
                dataset.clone(),
                split.val.clone(),
                self.config.batch_size,
                self.config.image_size,
                false,
                None,
                Some(self.seed),
                self.device.clone(),
            );
            for batch in loader {
                let images = resize_batch(batch.images, scale);
                let output = model.forward(images);
                criterion.compute(&output, batch.labels.clone());
                loss_sum += criterion.last_value();
                batches += 1;

                let correct = model
                    .correct(output.scores.clone(), batch.labels.clone())
                    .sum()
                    .into_scalar()
                    .elem::<f32>();
                stats.record_batch(correct, batch.batch_size);

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
                self.metric.update(&truths, &preds);
            }
            log::debug!(
                "fold {} epoch {epoch} scale {scale}: accuracy {:.4}",
                self.fold,
                stats.accuracy()
            );
            per_scale.push((scale, stats.accuracy()));
        }

        let overall_accuracy = if per_scale.is_empty() {
            0.0
        } else {
            per_scale.iter().map(|&(_, acc)| acc).sum::<f32>() / per_scale.len() as f32
        };
        let avg_loss = if batches == 0 {
            0.0
        } else {
            loss_sum / batches as f32
        };
        let is_best = self.best.observe(overall_accuracy);

        Ok(ValidationOutcome {
            overall_accuracy,
            avg_loss,
            is_best,
            per_scale,
        })
    }
}
