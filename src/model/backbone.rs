use crate::config::ModelKind;
use crate::model::blocks::{BasicBlock, Bottleneck, ConvBlock, BOTTLENECK_EXPANSION};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;

const STAGE_CHANNELS: [usize; 4] = [64, 128, 256, 512];

/// ResNet-style feature extractor. The residual stages are flattened into a
/// single ordered list; exactly one of the two lists is populated depending on
/// the configured depth (basic blocks for 18/34, bottlenecks for 50).
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    stem: ConvBlock<B>,
    pool: MaxPool2d,
    basic_layers: Vec<BasicBlock<B>>,
    bottleneck_layers: Vec<Bottleneck<B>>,
    feature_dim: usize,
}

impl<B: Backend> Backbone<B> {
    pub fn new(device: &B::Device, kind: ModelKind) -> Self {
        let stem = ConvBlock::new(device, 3, 64, 7, 2);
        let pool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let depths: [usize; 4] = match kind {
            ModelKind::Resnet18 => [2, 2, 2, 2],
            ModelKind::Resnet34 | ModelKind::Resnet50 => [3, 4, 6, 3],
        };

        let mut basic_layers = Vec::new();
        let mut bottleneck_layers = Vec::new();
        let feature_dim;

        match kind {
            ModelKind::Resnet18 | ModelKind::Resnet34 => {
                let mut in_channels = 64;
                for (stage, &depth) in depths.iter().enumerate() {
                    let out_channels = STAGE_CHANNELS[stage];
                    for block in 0..depth {
                        let stride = if stage > 0 && block == 0 { 2 } else { 1 };
                        basic_layers.push(BasicBlock::new(device, in_channels, out_channels, stride));
                        in_channels = out_channels;
                    }
                }
                feature_dim = in_channels;
            }
            ModelKind::Resnet50 => {
                let mut in_channels = 64;
                for (stage, &depth) in depths.iter().enumerate() {
                    let mid_channels = STAGE_CHANNELS[stage];
                    for block in 0..depth {
                        let stride = if stage > 0 && block == 0 { 2 } else { 1 };
                        bottleneck_layers.push(Bottleneck::new(
                            device,
                            in_channels,
                            mid_channels,
                            stride,
                        ));
                        in_channels = mid_channels * BOTTLENECK_EXPANSION;
                    }
                }
                feature_dim = in_channels;
            }
        }

        Self {
            stem,
            pool,
            basic_layers,
            bottleneck_layers,
            feature_dim,
        }
    }

    /// Output channel count of the final stage.
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.pool.forward(self.stem.forward(x));
        for block in &self.basic_layers {
            x = block.forward(x);
        }
        for block in &self.bottleneck_layers {
            x = block.forward(x);
        }
        x
    }

    /// Summed |gamma| over every BatchNorm in the backbone.
    pub fn bn_gamma_l1(&self) -> Tensor<B, 1> {
        let mut sum = self.stem.bn_gamma_l1();
        for block in &self.basic_layers {
            sum = sum + block.bn_gamma_l1();
        }
        for block in &self.bottleneck_layers {
            sum = sum + block.bn_gamma_l1();
        }
        sum
    }

    /// Summed |w| over every convolution in the backbone.
    pub fn weight_l1(&self) -> Tensor<B, 1> {
        let mut sum = self.stem.weight_l1();
        for block in &self.basic_layers {
            sum = sum + block.weight_l1();
        }
        for block in &self.bottleneck_layers {
            sum = sum + block.weight_l1();
        }
        sum
    }
}
