//! EfficientNet-style classifier

use ndarray::{Array2, Array4};
use rand::RngCore;
use tracing::{debug, info};

use crate::activation::Activation;
use crate::blocks::mbconv_with;
use crate::dropout::Dropout;
use crate::error::{ConvNetError, Result};
use crate::init::Initializer;
use crate::layers::{flatten, BatchNorm2d, Conv2d, Conv2dConfig, Linear};
use crate::pool::Pool;
use crate::sequential::Sequential;
use crate::topology::{validate_topology, LayerSpec};
use crate::{check_input, Network};

/// Stem output width
pub const STEM_CHANNELS: usize = 32;
/// Width of the 1x1 head convolution
pub const HEAD_CHANNELS: usize = 1280;
/// Drop probability between body and head
pub const DROPOUT: f32 = 0.6;

/// Stem -> MBConv body -> dropout -> head -> logits
#[derive(Debug, Clone)]
pub struct EfficientNet {
    stem: Sequential,
    blocks: Sequential,
    dropout: Dropout,
    head: Sequential,
    classifier: Linear,
    topology: Vec<LayerSpec>,
    activation: Activation,
}

impl EfficientNet {
    /// The 14-block B0-like table
    pub fn b0_topology() -> Vec<LayerSpec> {
        vec![
            LayerSpec::new(32, 16, 3, 1, 1, 4),
            LayerSpec::new(16, 24, 3, 2, 6, 4),
            LayerSpec::new(24, 24, 3, 1, 6, 4),
            LayerSpec::new(24, 40, 5, 2, 6, 4),
            LayerSpec::new(40, 40, 5, 1, 6, 4),
            LayerSpec::new(40, 80, 3, 2, 6, 4),
            LayerSpec::new(80, 80, 3, 1, 6, 4),
            LayerSpec::new(80, 80, 3, 1, 6, 4),
            LayerSpec::new(80, 112, 5, 1, 6, 4),
            LayerSpec::new(112, 112, 5, 1, 6, 4),
            LayerSpec::new(112, 192, 5, 2, 6, 4),
            LayerSpec::new(192, 192, 5, 1, 6, 4),
            LayerSpec::new(192, 192, 5, 1, 6, 4),
            LayerSpec::new(192, 320, 3, 1, 6, 4),
        ]
    }

    /// Default B0 table
    pub fn b0(num_classes: usize, init: &mut Initializer) -> Result<Self> {
        Self::new(&Self::b0_topology(), num_classes, init)
    }

    /// Build from an arbitrary block table. The first block must consume the
    /// stem's 32 channels and consecutive blocks must chain.
    pub fn new(topology: &[LayerSpec], num_classes: usize, init: &mut Initializer) -> Result<Self> {
        Self::with_activation(topology, num_classes, Activation::Swish, init)
    }

    /// Build with `activation` in the stem, every block and the head
    /// instead of Swish
    pub fn with_activation(
        topology: &[LayerSpec],
        num_classes: usize,
        activation: Activation,
        init: &mut Initializer,
    ) -> Result<Self> {
        validate_topology(STEM_CHANNELS, topology)?;
        if num_classes == 0 {
            return Err(ConvNetError::config("num_classes must be positive"));
        }
        info!(
            "Building EfficientNet: {} blocks, {} classes, {:?}",
            topology.len(),
            num_classes,
            activation
        );

        let stem = Sequential::new()
            .with(Conv2d::new(
                Conv2dConfig::new(1, STEM_CHANNELS, 3)
                    .with_stride(2)
                    .with_padding(1),
                init,
            )?)
            .with(BatchNorm2d::new(STEM_CHANNELS))
            .with(activation);

        let mut blocks = Sequential::new();
        for spec in topology {
            blocks.push(mbconv_with(spec, activation, init)?);
        }

        let body_channels = topology
            .last()
            .map(|spec| spec.out_channels)
            .unwrap_or(STEM_CHANNELS);
        let head = Sequential::new()
            .with(Conv2d::new(Conv2dConfig::new(body_channels, HEAD_CHANNELS, 1), init)?)
            .with(BatchNorm2d::new(HEAD_CHANNELS))
            .with(activation)
            .with(Pool::GlobalAverage);

        let mut model = Self {
            stem,
            blocks,
            dropout: Dropout::new(DROPOUT)?,
            head,
            classifier: Linear::new(HEAD_CHANNELS, num_classes, init)?,
            topology: topology.to_vec(),
            activation,
        };
        model.initialize(init);
        debug!("EfficientNet parameters: {}", model.num_parameters());
        Ok(model)
    }

    pub fn topology(&self) -> &[LayerSpec] {
        &self.topology
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Xavier-uniform weights and zero biases for every conv and linear layer
    pub fn initialize(&mut self, init: &mut Initializer) {
        self.stem.initialize(init);
        self.blocks.initialize(init);
        self.head.initialize(init);
        self.classifier.initialize(init);
    }

    /// Stem and MBConv body
    pub fn features(&self, x: &Array4<f32>) -> Result<Array4<f32>> {
        check_input(x)?;
        let x = self.stem.forward(x.clone())?;
        self.blocks.forward(x)
    }
}

impl Network for EfficientNet {
    fn forward(&self, x: &Array4<f32>) -> Result<Array2<f32>> {
        let features = self.dropout.forward(self.features(x)?);
        let pooled = self.head.forward(features)?;
        self.classifier.forward(&flatten(&pooled)?)
    }

    fn forward_train(&mut self, x: &Array4<f32>, rng: &mut dyn RngCore) -> Result<Array2<f32>> {
        check_input(x)?;
        let x = self.stem.forward_train(x.clone())?;
        let x = self.blocks.forward_train(x)?;
        let x = self.dropout.forward_train(x, rng);
        let pooled = self.head.forward_train(x)?;
        self.classifier.forward(&flatten(&pooled)?)
    }

    fn num_classes(&self) -> usize {
        self.classifier.out_features()
    }

    fn num_parameters(&self) -> usize {
        self.stem.num_parameters()
            + self.blocks.num_parameters()
            + self.head.num_parameters()
            + self.classifier.num_parameters()
    }
}
