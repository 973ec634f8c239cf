//! ResNet-style classifier with Swish activations

use ndarray::{Array2, Array4};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::activation::Activation;
use crate::blocks::basic_block;
use crate::dropout::Dropout;
use crate::error::{ConvNetError, Result};
use crate::init::Initializer;
use crate::layers::{flatten, BatchNorm2d, Conv2d, Conv2dConfig, Linear};
use crate::pool::Pool;
use crate::sequential::Sequential;
use crate::{check_input, Network, DEFAULT_NUM_CLASSES};

/// Channel width of each of the four stages
pub const STAGE_CHANNELS: [usize; 4] = [64, 128, 256, 512];
/// Stride of the first block in each stage
pub const STAGE_STRIDES: [usize; 4] = [1, 2, 2, 2];
/// Window of the average pool in front of the classifier
pub const HEAD_POOL: usize = 3;

/// ResNet configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResNetConfig {
    /// Residual blocks per stage
    pub stage_blocks: [usize; 4],
    /// Number of output logits
    pub num_classes: usize,
    /// Drop probability in front of the classifier
    pub dropout: f32,
}

impl Default for ResNetConfig {
    fn default() -> Self {
        Self::resnet18()
    }
}

impl ResNetConfig {
    /// Two blocks per stage
    pub fn resnet18() -> Self {
        Self {
            stage_blocks: [2, 2, 2, 2],
            num_classes: DEFAULT_NUM_CLASSES,
            dropout: 0.5,
        }
    }

    /// 3/4/6/3 blocks per stage
    pub fn resnet34() -> Self {
        Self {
            stage_blocks: [3, 4, 6, 3],
            ..Self::resnet18()
        }
    }

    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    fn validate(&self) -> Result<()> {
        if let Some(stage) = self.stage_blocks.iter().position(|&n| n == 0) {
            return Err(ConvNetError::config(format!("stage {} has no blocks", stage)));
        }
        if self.num_classes == 0 {
            return Err(ConvNetError::config("num_classes must be positive"));
        }
        Ok(())
    }
}

/// Stem -> four residual stages -> avg pool -> dropout -> linear
#[derive(Debug, Clone)]
pub struct ResNet {
    stem: Sequential,
    stages: Vec<Sequential>,
    pool: Pool,
    dropout: Dropout,
    fc: Linear,
    config: ResNetConfig,
}

impl ResNet {
    pub fn new(config: ResNetConfig, init: &mut Initializer) -> Result<Self> {
        config.validate()?;
        info!(
            "Building ResNet: stages={:?}, {} classes",
            config.stage_blocks, config.num_classes
        );

        let stem = Sequential::new()
            .with(Conv2d::new(
                Conv2dConfig::new(1, STAGE_CHANNELS[0], 7)
                    .with_stride(2)
                    .with_padding(3)
                    .with_bias(true),
                init,
            )?)
            .with(BatchNorm2d::new(STAGE_CHANNELS[0]))
            .with(Activation::Swish)
            .with(Pool::Max {
                kernel: 3,
                stride: 2,
                padding: 1,
            });

        let mut inplanes = STAGE_CHANNELS[0];
        let mut stages = Vec::with_capacity(STAGE_CHANNELS.len());
        for ((&planes, &stride), &blocks) in STAGE_CHANNELS
            .iter()
            .zip(STAGE_STRIDES.iter())
            .zip(config.stage_blocks.iter())
        {
            stages.push(Self::make_stage(&mut inplanes, planes, blocks, stride, init)?);
        }

        let mut model = Self {
            stem,
            stages,
            pool: Pool::Average { kernel: HEAD_POOL },
            dropout: Dropout::new(config.dropout)?,
            fc: Linear::new(STAGE_CHANNELS[3], config.num_classes, init)?,
            config,
        };
        model.initialize(init);
        debug!("ResNet parameters: {}", model.num_parameters());
        Ok(model)
    }

    fn make_stage(
        inplanes: &mut usize,
        planes: usize,
        blocks: usize,
        stride: usize,
        init: &mut Initializer,
    ) -> Result<Sequential> {
        let mut stage = Sequential::new().with(basic_block(*inplanes, planes, stride, init)?);
        *inplanes = planes;
        for _ in 1..blocks {
            stage.push(basic_block(planes, planes, 1, init)?);
        }
        Ok(stage)
    }

    pub fn config(&self) -> &ResNetConfig {
        &self.config
    }

    pub fn initialize(&mut self, init: &mut Initializer) {
        self.stem.initialize(init);
        for stage in &mut self.stages {
            stage.initialize(init);
        }
        self.fc.initialize(init);
    }

    /// Stem and residual stages
    pub fn features(&self, x: &Array4<f32>) -> Result<Array4<f32>> {
        check_input(x)?;
        let x = self.stem.forward(x.clone())?;
        self.stages
            .iter()
            .try_fold(x, |acc, stage| stage.forward(acc))
    }
}

impl Network for ResNet {
    fn forward(&self, x: &Array4<f32>) -> Result<Array2<f32>> {
        let pooled = self.pool.forward(&self.features(x)?)?;
        let flat = self.dropout.forward(flatten(&pooled)?);
        self.fc.forward(&flat)
    }

    fn forward_train(&mut self, x: &Array4<f32>, rng: &mut dyn RngCore) -> Result<Array2<f32>> {
        check_input(x)?;
        let mut x = self.stem.forward_train(x.clone())?;
        for stage in &mut self.stages {
            x = stage.forward_train(x)?;
        }
        let pooled = self.pool.forward(&x)?;
        let flat = self.dropout.forward_train(flatten(&pooled)?, rng);
        self.fc.forward(&flat)
    }

    fn num_classes(&self) -> usize {
        self.fc.out_features()
    }

    fn num_parameters(&self) -> usize {
        self.stem.num_parameters()
            + self.stages.iter().map(Sequential::num_parameters).sum::<usize>()
            + self.fc.num_parameters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn tiny(num_classes: usize) -> ResNetConfig {
        ResNetConfig {
            stage_blocks: [1, 1, 1, 1],
            num_classes,
            dropout: 0.5,
        }
    }

    fn random_batch(batch: usize, side: usize, seed: u64) -> Array4<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array4::from_shape_fn((batch, 1, side, side), |_| rng.gen_range(-1.0f32..1.0))
    }

    #[test]
    fn test_presets() {
        assert_eq!(ResNetConfig::resnet18().stage_blocks, [2, 2, 2, 2]);
        assert_eq!(ResNetConfig::resnet34().stage_blocks, [3, 4, 6, 3]);
        assert_eq!(ResNetConfig::default().num_classes, DEFAULT_NUM_CLASSES);
        assert_eq!(ResNetConfig::default().dropout, 0.5);
    }

    #[test]
    fn test_forward_shape() {
        let mut init = Initializer::seeded(31);
        let model = ResNet::new(tiny(6), &mut init).unwrap();
        // 96 -> 48 (stem) -> 24 (pool) -> 24, 12, 6, 3 -> avg pool 1x1
        let logits = model.forward(&random_batch(2, 96, 1)).unwrap();
        assert_eq!(logits.dim(), (2, 6));
        assert!(logits.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_stage_shortcuts() {
        let mut init = Initializer::seeded(32);
        let model = ResNet::new(
            ResNetConfig {
                stage_blocks: [2, 1, 1, 1],
                ..tiny(3)
            },
            &mut init,
        )
        .unwrap();
        let features = model.features(&random_batch(1, 96, 2)).unwrap();
        assert_eq!(features.dim(), (1, 512, 3, 3));
        assert_eq!(model.stages[0].len(), 2);
    }

    #[test]
    fn test_too_small_input_is_shape_error() {
        let mut init = Initializer::seeded(33);
        let model = ResNet::new(tiny(4), &mut init).unwrap();
        // 64 -> ... -> 2x2, smaller than the 3x3 head pool
        let result = model.forward(&random_batch(1, 64, 3));
        assert!(matches!(result, Err(ConvNetError::Shape { .. })));
    }

    #[test]
    fn test_rejects_empty_stage() {
        let mut init = Initializer::seeded(34);
        let config = ResNetConfig {
            stage_blocks: [2, 0, 2, 2],
            ..ResNetConfig::resnet18()
        };
        assert!(matches!(ResNet::new(config, &mut init), Err(ConvNetError::Configuration(_))));
    }

    #[test]
    fn test_inference_repeatable_and_training_shape() {
        let mut init = Initializer::seeded(35);
        let mut model = ResNet::new(tiny(2), &mut init).unwrap();
        let x = random_batch(1, 96, 4);
        let before = model.forward(&x).unwrap();
        assert_eq!(before, model.forward(&x).unwrap());

        let mut rng = StdRng::seed_from_u64(8);
        let trained = model.forward_train(&x, &mut rng).unwrap();
        assert_eq!(trained.dim(), (1, 2));
    }
}
