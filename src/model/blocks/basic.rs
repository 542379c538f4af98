use crate::model::blocks::ConvBlock;
use burn::prelude::*;
use burn::tensor::activation;

/// Two 3x3 convolutions with an identity (or 1x1 projection) shortcut.
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    cv1: ConvBlock<B>,
    cv2: ConvBlock<B>,
    downsample: Option<ConvBlock<B>>,
}

impl<B: Backend> BasicBlock<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize, stride: usize) -> Self {
        let downsample = if stride != 1 || in_channels != out_channels {
            Some(ConvBlock::new(device, in_channels, out_channels, 1, stride))
        } else {
            None
        };

        Self {
            cv1: ConvBlock::new(device, in_channels, out_channels, 3, stride),
            cv2: ConvBlock::new(device, out_channels, out_channels, 3, 1),
            downsample,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let shortcut = match &self.downsample {
            Some(proj) => proj.forward_linear(x.clone()),
            None => x.clone(),
        };
        let out = self.cv1.forward(x);
        let out = self.cv2.forward_linear(out);
        activation::relu(out + shortcut)
    }

    pub fn bn_gamma_l1(&self) -> Tensor<B, 1> {
        let mut sum = self.cv1.bn_gamma_l1() + self.cv2.bn_gamma_l1();
        if let Some(proj) = &self.downsample {
            sum = sum + proj.bn_gamma_l1();
        }
        sum
    }

    pub fn weight_l1(&self) -> Tensor<B, 1> {
        let mut sum = self.cv1.weight_l1() + self.cv2.weight_l1();
        if let Some(proj) = &self.downsample {
            sum = sum + proj.weight_l1();
        }
        sum
    }
}
