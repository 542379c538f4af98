use crate::config::{SchedulerKind, TrainConfig};
use burn::lr_scheduler::cosine::{CosineAnnealingLrScheduler, CosineAnnealingLrSchedulerConfig};
use burn::lr_scheduler::LrScheduler;
use burn::prelude::*;
use std::marker::PhantomData;

/// Epoch-granular learning-rate schedule.
///
/// Step, multi-step and plateau decay run on epoch boundaries; cosine
/// annealing wraps the framework scheduler stepped once per epoch over
/// `restart_step` epochs.
pub enum LrSchedule<B: Backend> {
    StepLr {
        base_lr: f64,
        step_size: usize,
        gamma: f64,
        epoch: usize,
    },
    MultiStepLr {
        base_lr: f64,
        milestones: Vec<usize>,
        gamma: f64,
        epoch: usize,
    },
    Cosine {
        inner: CosineAnnealingLrScheduler,
        _backend: PhantomData<B>,
    },
    ReduceOnPlateau {
        lr: f64,
        factor: f64,
        patience: usize,
        best: f64,
        bad_epochs: usize,
    },
}

impl<B: Backend> LrSchedule<B> {
    pub fn new(config: &TrainConfig) -> Self {
        let base_lr = config.lr;
        match config.lr_scheduler {
            SchedulerKind::StepLr => Self::StepLr {
                base_lr,
                step_size: config.lr_step_size,
                gamma: config.lr_gamma,
                epoch: 0,
            },
            SchedulerKind::MultiStepLr => Self::MultiStepLr {
                base_lr,
                milestones: config.multi_step.clone(),
                gamma: config.lr_gamma,
                epoch: 0,
            },
            SchedulerKind::CosineLr => Self::Cosine {
                inner: CosineAnnealingLrSchedulerConfig::new(base_lr, config.restart_step).init(),
                _backend: PhantomData,
            },
            SchedulerKind::ReduceLr => Self::ReduceOnPlateau {
                lr: base_lr,
                factor: config.plateau_factor,
                patience: config.plateau_patience,
                best: 0.0,
                bad_epochs: 0,
            },
        }
    }

    /// Advances the schedule by one epoch and returns the learning rate for
    /// the next epoch. `metric` feeds the plateau schedule and is ignored by
    /// the others.
    pub fn step_epoch(&mut self, metric: Option<f64>) -> f64 {
        match self {
            Self::StepLr {
                base_lr,
                step_size,
                gamma,
                epoch,
            } => {
                *epoch += 1;
                *base_lr * gamma.powi((*epoch / *step_size) as i32)
            }
            Self::MultiStepLr {
                base_lr,
                milestones,
                gamma,
                epoch,
            } => {
                *epoch += 1;
                let passed = milestones.iter().filter(|&&m| m <= *epoch).count();
                *base_lr * gamma.powi(passed as i32)
            }
            Self::Cosine { inner, .. } => LrScheduler::<B>::step(inner),
            Self::ReduceOnPlateau {
                lr,
                factor,
                patience,
                best,
                bad_epochs,
            } => {
                let score = metric.unwrap_or(0.0);
                if score > *best {
                    *best = score;
                    *bad_epochs = 0;
                } else {
                    *bad_epochs += 1;
                    if *bad_epochs > *patience {
                        *lr *= *factor;
                        *bad_epochs = 0;
                    }
                }
                *lr
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn config(kind: SchedulerKind) -> TrainConfig {
        TrainConfig {
            lr: 0.1,
            lr_scheduler: kind,
            lr_step_size: 2,
            lr_gamma: 0.1,
            multi_step: vec![2, 4],
            restart_step: 10,
            plateau_patience: 1,
            plateau_factor: 0.5,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn step_decays_at_step_size_boundaries() {
        let mut sched = LrSchedule::<B>::new(&config(SchedulerKind::StepLr));
        assert!((sched.step_epoch(None) - 0.1).abs() < 1e-9);
        assert!((sched.step_epoch(None) - 0.01).abs() < 1e-9);
        assert!((sched.step_epoch(None) - 0.01).abs() < 1e-9);
        assert!((sched.step_epoch(None) - 0.001).abs() < 1e-9);
    }

    #[test]
    fn multi_step_decays_at_each_milestone() {
        let mut sched = LrSchedule::<B>::new(&config(SchedulerKind::MultiStepLr));
        assert!((sched.step_epoch(None) - 0.1).abs() < 1e-9);
        assert!((sched.step_epoch(None) - 0.01).abs() < 1e-9);
        assert!((sched.step_epoch(None) - 0.01).abs() < 1e-9);
        assert!((sched.step_epoch(None) - 0.001).abs() < 1e-9);
    }

    #[test]
    fn cosine_decreases_across_epochs() {
        let mut sched = LrSchedule::<B>::new(&config(SchedulerKind::CosineLr));
        let first = sched.step_epoch(None);
        let mut last = first;
        for _ in 0..5 {
            last = sched.step_epoch(None);
        }
        assert!(last < first);
    }

    #[test]
    fn plateau_reduces_after_patience_exceeded() {
        let mut sched = LrSchedule::<B>::new(&config(SchedulerKind::ReduceLr));
        assert!((sched.step_epoch(Some(0.5)) - 0.1).abs() < 1e-9);
        // First stall is tolerated, the second trips the factor.
        assert!((sched.step_epoch(Some(0.4)) - 0.1).abs() < 1e-9);
        assert!((sched.step_epoch(Some(0.4)) - 0.05).abs() < 1e-9);
        // Improvement resets the counter.
        assert!((sched.step_epoch(Some(0.6)) - 0.05).abs() < 1e-9);
    }
}
