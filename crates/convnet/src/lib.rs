//! Convolutional Network Builder
//!
//! Assembles EfficientNet- and ResNet-style single-channel classifiers from
//! ndarray-backed layers. Feature maps are `(batch, channels, height, width)`;
//! networks return raw logits of shape `(batch, num_classes)`.

mod activation;
mod blocks;
mod dropout;
mod efficientnet;
mod error;
mod init;
mod layers;
mod pool;
mod resnet;
mod sequential;
mod topology;

pub use activation::{sigmoid, swish, Activation};
pub use blocks::{basic_block, mbconv, mbconv_with, SeGate};
pub use dropout::Dropout;
pub use efficientnet::EfficientNet;
pub use error::{ConvNetError, Result};
pub use init::Initializer;
pub use layers::{flatten, BatchNorm2d, Conv2d, Conv2dConfig, Linear};
pub use pool::Pool;
pub use resnet::{ResNet, ResNetConfig};
pub use sequential::{Layer, Residual, Sequential, Shortcut};
pub use topology::{validate_topology, LayerSpec};

use ndarray::{Array2, Array4, Axis};
use rand::RngCore;

/// Class count used when none is given
pub const DEFAULT_NUM_CLASSES: usize = 30;

/// A classifier consumed by an external training or evaluation loop
pub trait Network {
    /// Inference forward pass; parameters are read-only and dropout is off
    fn forward(&self, x: &Array4<f32>) -> Result<Array2<f32>>;

    /// Training forward pass: dropout active, normalization on batch
    /// statistics with running estimates updated
    fn forward_train(&mut self, x: &Array4<f32>, rng: &mut dyn RngCore) -> Result<Array2<f32>>;

    fn num_classes(&self) -> usize;

    /// Learnable parameter count
    fn num_parameters(&self) -> usize;
}

/// Non-empty single-channel batch
pub(crate) fn check_input(x: &Array4<f32>) -> Result<()> {
    if x.len_of(Axis(0)) == 0 {
        return Err(ConvNetError::shape("input", "batch >= 1", 0));
    }
    let channels = x.len_of(Axis(1));
    if channels != 1 {
        return Err(ConvNetError::shape("input", 1, channels));
    }
    Ok(())
}
