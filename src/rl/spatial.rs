//! Convolutional encoder for the occupancy grid.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::*;

/// Embedding width produced by the encoder.
pub const SPATIAL_EMBED_DIM: usize = 64;

const CHANNELS: usize = 16;
const NUM_BLOCKS: usize = 3;

/// 3x3 same-size residual block.
#[derive(Module, Debug)]
struct ResidualBlock<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    activation: Relu,
}

impl<B: Backend> ResidualBlock<B> {
    fn new(device: &B::Device) -> Self {
        let conv = || {
            Conv2dConfig::new([CHANNELS, CHANNELS], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        };
        Self {
            conv1: conv(),
            conv2: conv(),
            activation: Relu::new(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let y = self.activation.forward(self.conv1.forward(x.clone()));
        let y = self.conv2.forward(y);
        self.activation.forward(y + x)
    }
}

/// Residual tower mapping `[batch, 1, grid, grid]` occupancy images to
/// `[batch, 64]` embeddings. Padded 3x3 convolutions keep the spatial size,
/// so any grid edge works with the same weights.
#[derive(Module, Debug)]
pub struct SpatialEncoder<B: Backend> {
    stem: Conv2d<B>,
    blocks: Vec<ResidualBlock<B>>,
    head: Linear<B>,
    activation: Relu,
}

impl<B: Backend> SpatialEncoder<B> {
    pub fn new(device: &B::Device) -> Self {
        let stem = Conv2dConfig::new([1, CHANNELS], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let blocks = (0..NUM_BLOCKS).map(|_| ResidualBlock::new(device)).collect();
        let head = LinearConfig::new(CHANNELS, SPATIAL_EMBED_DIM).init(device);
        Self {
            stem,
            blocks,
            head,
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, image: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.activation.forward(self.stem.forward(image));
        for block in &self.blocks {
            x = block.forward(x);
        }
        // Average pool over the spatial dims, then project per image.
        let pooled = x.mean_dim(3).mean_dim(2);
        let [batch, channels, _, _] = pooled.dims();
        self.head.forward(pooled.reshape([batch, channels]))
    }
}
