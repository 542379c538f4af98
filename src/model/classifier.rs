use crate::config::ModelKind;
use crate::model::backbone::Backbone;
use anyhow::{anyhow, Result};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::activation::softmax;
use std::path::Path;

/// Raw scores from both classification heads.
pub struct ClassifyOutput<B: Backend> {
    pub scores: Tensor<B, 2>,
    pub fine_scores: Tensor<B, 2>,
}

/// Backbone + global average pool feeding a primary classifier and an
/// auxiliary fine-grained head that shares the pooled features.
#[derive(Module, Debug)]
pub struct FineGrainedClassifier<B: Backend> {
    backbone: Backbone<B>,
    avg_pool: AdaptiveAvgPool2d,
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
    fine_fc1: Linear<B>,
    fine_fc2: Linear<B>,
    dropout: Dropout,
    relu: Relu,
}

impl<B: Backend> FineGrainedClassifier<B> {
    pub fn new(device: &B::Device, kind: ModelKind, num_classes: usize, drop_rate: f64) -> Self {
        let backbone = Backbone::new(device, kind);
        let features = backbone.feature_dim();

        Self {
            backbone,
            avg_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(features, 1024).init(device),
            fc2: LinearConfig::new(1024, 512).init(device),
            fc3: LinearConfig::new(512, num_classes).init(device),
            fine_fc1: LinearConfig::new(features, 1024).init(device),
            fine_fc2: LinearConfig::new(1024, num_classes).init(device),
            dropout: DropoutConfig::new(drop_rate).init(),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> ClassifyOutput<B> {
        let features = self.backbone.forward(x);
        let pooled = self.avg_pool.forward(features);
        let pooled = pooled.flatten::<2>(1, 3);

        let h = self.relu.forward(self.fc1.forward(pooled.clone()));
        let h = self.relu.forward(self.fc2.forward(h));
        let h = self.dropout.forward(h);
        let scores = self.fc3.forward(h);

        let g = self.relu.forward(self.fine_fc1.forward(pooled));
        let g = self.dropout.forward(g);
        let fine_scores = self.fine_fc2.forward(g);

        ClassifyOutput {
            scores,
            fine_scores,
        }
    }

    /// Per-sample correctness (1.0 / 0.0) of the primary head.
    pub fn correct(&self, scores: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let probs = softmax(scores, 1);
        let predicted = probs.argmax(1).squeeze::<1>(1);
        predicted.equal(labels).float()
    }

    /// Summed |gamma| over all BatchNorm layers, for sparsity training.
    pub fn bn_gamma_l1(&self) -> Tensor<B, 1> {
        self.backbone.bn_gamma_l1()
    }

    /// Summed |w| over the backbone convolutions and both head stacks.
    pub fn weight_l1(&self) -> Tensor<B, 1> {
        self.backbone.weight_l1()
            + self.fc1.weight.val().abs().sum()
            + self.fc2.weight.val().abs().sum()
            + self.fc3.weight.val().abs().sum()
            + self.fine_fc1.weight.val().abs().sum()
            + self.fine_fc2.weight.val().abs().sum()
    }

    /// Warm-start from a previously recorded checkpoint.
    pub fn load_weights(self, path: &Path, device: &B::Device) -> Result<Self> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        self.load_file(path.to_path_buf(), &recorder, device)
            .map_err(|e| anyhow!("failed to load weights from {}: {e:?}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn forward_produces_both_heads() {
        let device = Default::default();
        let model = FineGrainedClassifier::<B>::new(&device, ModelKind::Resnet18, 7, 0.0);
        let x = Tensor::<B, 4>::zeros([2, 3, 64, 64], &device);
        let out = model.forward(x);
        assert_eq!(out.scores.dims(), [2, 7]);
        assert_eq!(out.fine_scores.dims(), [2, 7]);
    }

    #[test]
    fn correct_marks_matching_argmax() {
        let device = Default::default();
        let model = FineGrainedClassifier::<B>::new(&device, ModelKind::Resnet18, 3, 0.0);
        let scores = Tensor::<B, 2>::from_floats(
            [[5.0, 0.0, 0.0], [0.0, 0.0, 5.0], [0.0, 5.0, 0.0]],
            &device,
        );
        let labels = Tensor::<B, 1, Int>::from_ints([0, 2, 0], &device);
        let correct: Vec<f32> = model
            .correct(scores, labels)
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(correct, vec![1.0, 1.0, 0.0]);
    }
}
