use crate::config::LossKind;
use crate::model::classifier::ClassifyOutput;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::prelude::*;
use burn::tensor::activation::log_softmax;

const FOCAL_GAMMA: f32 = 2.0;
const SMOOTHING: f32 = 0.1;

/// Classification criterion resolved once from the configured loss kind.
/// Tracks running loss values so the trainer can emit per-iteration and
/// per-epoch scalars with a human-readable fragment.
pub struct ClassifyLoss<B: Backend> {
    kind: LossKind,
    ce: CrossEntropyLoss<B>,
    fine_weight: f32,
    last_value: f32,
    epoch_sum: f32,
}

impl<B: Backend> ClassifyLoss<B> {
    pub fn new(kind: LossKind, fine_weight: f32, device: &B::Device) -> Self {
        let smoothing = match kind {
            LossKind::SmoothCrossEntropy => Some(SMOOTHING),
            _ => None,
        };
        let ce = CrossEntropyLossConfig::new()
            .with_smoothing(smoothing)
            .init(device);
        Self {
            kind,
            ce,
            fine_weight,
            last_value: 0.0,
            epoch_sum: 0.0,
        }
    }

    /// Standard loss over both heads.
    pub fn compute(&mut self, output: &ClassifyOutput<B>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let loss = self.total(output, labels);
        self.note(&loss);
        loss
    }

    /// CutMix loss: lam-weighted blend of the two label vectors.
    pub fn compute_mixed(
        &mut self,
        output: &ClassifyOutput<B>,
        labels_a: Tensor<B, 1, Int>,
        labels_b: Tensor<B, 1, Int>,
        lam: f32,
    ) -> Tensor<B, 1> {
        let loss_a = self.total(output, labels_a);
        let loss_b = self.total(output, labels_b);
        let loss = loss_a.mul_scalar(lam) + loss_b.mul_scalar(1.0 - lam);
        self.note(&loss);
        loss
    }

    fn total(&self, output: &ClassifyOutput<B>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let mut loss = self.head_loss(output.scores.clone(), labels.clone());
        if self.fine_weight > 0.0 {
            let fine = self.head_loss(output.fine_scores.clone(), labels);
            loss = loss + fine.mul_scalar(self.fine_weight);
        }
        loss
    }

    fn head_loss(&self, logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        match self.kind {
            LossKind::CrossEntropy | LossKind::SmoothCrossEntropy => {
                self.ce.forward(logits, labels)
            }
            LossKind::Focal => focal_loss(logits, labels),
        }
    }

    fn note(&mut self, loss: &Tensor<B, 1>) {
        let value = loss.clone().into_scalar().elem::<f32>();
        self.last_value = value;
        self.epoch_sum += value;
    }

    /// Last computed loss value.
    pub fn last_value(&self) -> f32 {
        self.last_value
    }

    /// Emits the per-iteration scalar and returns the progress-bar fragment.
    pub fn record_iteration(
        &self,
        step: usize,
        mut add_scalar: impl FnMut(&str, f32, usize),
    ) -> String {
        add_scalar("TrainLossIteration", self.last_value, step);
        format!("[Loss: {:.4}]", self.last_value)
    }

    /// Emits the per-epoch scalar, resets the accumulator, and returns the
    /// log fragment.
    pub fn record_epoch(
        &mut self,
        batches: usize,
        epoch: usize,
        mut add_scalar: impl FnMut(&str, f32, usize),
    ) -> String {
        let avg = if batches > 0 {
            self.epoch_sum / batches as f32
        } else {
            0.0
        };
        self.epoch_sum = 0.0;
        add_scalar("TrainLossEpoch", avg, epoch);
        format!("[Average Loss: {avg:.4}]")
    }
}

/// Focal loss with fixed gamma: -(1 - p)^gamma * log(p) on the target class.
fn focal_loss<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    let log_probs = log_softmax(logits, 1);
    let log_p = log_probs
        .gather(1, labels.unsqueeze_dim(1))
        .squeeze::<1>(1);
    let p = log_p.clone().exp();
    let weight = (p.ones_like() - p).powf_scalar(FOCAL_GAMMA);
    (weight * log_p.neg()).mean()
}
