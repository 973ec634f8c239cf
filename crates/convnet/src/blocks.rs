//! Squeeze-and-Excitation gate and the residual block builders

use ndarray::Array4;
use tracing::debug;

use crate::activation::Activation;
use crate::error::{ConvNetError, Result};
use crate::init::Initializer;
use crate::layers::{BatchNorm2d, Conv2d, Conv2dConfig};
use crate::pool::Pool;
use crate::sequential::{Residual, Sequential, Shortcut};
use crate::topology::LayerSpec;

/// Channel attention: rescales each channel by a learned function of its
/// global average
#[derive(Debug, Clone)]
pub struct SeGate {
    reduce: Conv2d,
    expand: Conv2d,
}

impl SeGate {
    /// Bottleneck width is `channels / squeeze_ratio` (integer division);
    /// a zero-width bottleneck is rejected
    pub fn new(channels: usize, squeeze_ratio: usize, init: &mut Initializer) -> Result<Self> {
        if squeeze_ratio == 0 || channels / squeeze_ratio == 0 {
            return Err(ConvNetError::config(format!(
                "squeeze ratio {} leaves no bottleneck for {} channels",
                squeeze_ratio, channels
            )));
        }
        let squeezed = channels / squeeze_ratio;
        Ok(Self {
            reduce: Conv2d::new(Conv2dConfig::new(channels, squeezed, 1).with_bias(true), init)?,
            expand: Conv2d::new(Conv2dConfig::new(squeezed, channels, 1).with_bias(true), init)?,
        })
    }

    pub fn channels(&self) -> usize {
        self.reduce.config().in_channels
    }

    pub fn squeeze_channels(&self) -> usize {
        self.reduce.config().out_channels
    }

    /// Per-channel gate in [0, 1], shape (batch, channels, 1, 1)
    pub fn gate(&self, x: &Array4<f32>) -> Result<Array4<f32>> {
        let pooled = Pool::GlobalAverage.forward(x)?;
        let squeezed = Activation::Relu.forward(self.reduce.forward(&pooled)?);
        Ok(Activation::Sigmoid.forward(self.expand.forward(&squeezed)?))
    }

    pub fn forward(&self, x: Array4<f32>) -> Result<Array4<f32>> {
        let gate = self.gate(&x)?;
        Ok(x * &gate)
    }

    pub fn num_parameters(&self) -> usize {
        self.reduce.num_parameters() + self.expand.num_parameters()
    }

    pub fn initialize(&mut self, init: &mut Initializer) {
        self.reduce.initialize(init);
        self.expand.initialize(init);
    }
}

/// Mobile inverted-bottleneck block: expand, depthwise, gate, project,
/// optional identity skip
pub fn mbconv(spec: &LayerSpec, init: &mut Initializer) -> Result<Residual> {
    mbconv_with(spec, Activation::Swish, init)
}

/// [`mbconv`] with `activation` after the expansion and depthwise stages
pub fn mbconv_with(
    spec: &LayerSpec,
    activation: Activation,
    init: &mut Initializer,
) -> Result<Residual> {
    spec.validate()?;
    let hidden = spec.hidden_channels();
    let mut body = Sequential::new();

    if spec.expansion_ratio != 1 {
        body.push(Conv2d::new(Conv2dConfig::new(spec.in_channels, hidden, 1), init)?);
        body.push(BatchNorm2d::new(hidden));
        body.push(activation);
    }

    body.push(Conv2d::new(
        Conv2dConfig::new(hidden, hidden, spec.kernel_size)
            .with_stride(spec.stride)
            .with_padding(spec.kernel_size / 2)
            .with_groups(hidden),
        init,
    )?);
    body.push(BatchNorm2d::new(hidden));
    body.push(activation);

    body.push(SeGate::new(hidden, spec.squeeze_ratio, init)?);

    body.push(Conv2d::new(Conv2dConfig::new(hidden, spec.out_channels, 1), init)?);
    body.push(BatchNorm2d::new(spec.out_channels));

    let shortcut = if spec.use_residual() {
        Shortcut::Identity
    } else {
        Shortcut::None
    };
    debug!(
        "mbconv {}->{} k={} s={} e={} hidden={} act={:?} skip={}",
        spec.in_channels,
        spec.out_channels,
        spec.kernel_size,
        spec.stride,
        spec.expansion_ratio,
        hidden,
        activation,
        spec.use_residual()
    );
    Ok(Residual::new(body, shortcut, None))
}

/// Two 3x3 convolutions with a Swish after the skip add. A projection
/// shortcut is used when the stride or the width changes.
pub fn basic_block(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    init: &mut Initializer,
) -> Result<Residual> {
    let body = Sequential::new()
        .with(Conv2d::new(
            Conv2dConfig::new(in_channels, out_channels, 3)
                .with_stride(stride)
                .with_padding(1)
                .with_bias(true),
            init,
        )?)
        .with(BatchNorm2d::new(out_channels))
        .with(Activation::Swish)
        .with(Conv2d::new(
            Conv2dConfig::new(out_channels, out_channels, 3)
                .with_padding(1)
                .with_bias(true),
            init,
        )?)
        .with(BatchNorm2d::new(out_channels));

    let shortcut = if stride != 1 || in_channels != out_channels {
        Shortcut::Projection(
            Sequential::new()
                .with(Conv2d::new(
                    Conv2dConfig::new(in_channels, out_channels, 1)
                        .with_stride(stride)
                        .with_bias(true),
                    init,
                )?)
                .with(BatchNorm2d::new(out_channels)),
        )
    } else {
        Shortcut::Identity
    };
    Ok(Residual::new(body, shortcut, Some(Activation::Swish)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequential::Layer;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_tensor(shape: (usize, usize, usize, usize), seed: u64) -> Array4<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array4::from_shape_fn(shape, |_| rng.gen_range(-1.0f32..1.0))
    }

    #[test]
    fn test_se_gate_bounded() {
        let mut init = Initializer::seeded(2);
        let gate = SeGate::new(16, 4, &mut init).unwrap();
        assert_eq!(gate.squeeze_channels(), 4);

        let x = random_tensor((2, 16, 8, 8), 3);
        let g = gate.gate(&x).unwrap();
        assert_eq!(g.dim(), (2, 16, 1, 1));
        assert!(g.iter().all(|&v| (0.0..=1.0).contains(&v)));

        let y = gate.forward(x.clone()).unwrap();
        assert_eq!(y.dim(), x.dim());
        for (out, inp) in y.iter().zip(x.iter()) {
            assert!(out.abs() <= inp.abs() + 1e-6);
        }
    }

    #[test]
    fn test_se_gate_rejects_zero_bottleneck() {
        let mut init = Initializer::seeded(2);
        assert!(SeGate::new(3, 4, &mut init).is_err());
        assert!(SeGate::new(16, 0, &mut init).is_err());
    }

    #[test]
    fn test_mbconv_residual_path() {
        let mut init = Initializer::seeded(10);
        let block = mbconv(&LayerSpec::new(16, 16, 3, 1, 1, 4), &mut init).unwrap();
        assert!(block.has_skip());

        let x = random_tensor((1, 16, 32, 32), 4);
        let y = block.forward(x.clone()).unwrap();
        assert_eq!(y.dim(), (1, 16, 32, 32));

        let expected = &x + &block.body().forward(x.clone()).unwrap();
        for (a, b) in y.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_mbconv_downsampling_has_no_skip() {
        let mut init = Initializer::seeded(11);
        let block = mbconv(&LayerSpec::new(24, 40, 5, 2, 6, 4), &mut init).unwrap();
        assert!(!block.has_skip());

        let x = random_tensor((1, 24, 64, 64), 5);
        let y = block.forward(x.clone()).unwrap();
        assert_eq!(y.dim(), (1, 40, 32, 32));
        let body_only = block.body().forward(x).unwrap();
        assert_eq!(y, body_only);
    }

    #[test]
    fn test_mbconv_skips_expansion_when_ratio_one() {
        let mut init = Initializer::seeded(12);
        let plain = mbconv(&LayerSpec::new(32, 16, 3, 1, 1, 4), &mut init).unwrap();
        let expanded = mbconv(&LayerSpec::new(32, 16, 3, 1, 6, 4), &mut init).unwrap();
        // depthwise, norm, swish, gate, project, norm
        assert_eq!(plain.body().len(), 6);
        assert_eq!(expanded.body().len(), 9);
    }

    #[test]
    fn test_mbconv_with_leaky_relu() {
        let spec = LayerSpec::new(16, 16, 3, 1, 6, 4);
        let leaky =
            mbconv_with(&spec, Activation::leaky_relu(), &mut Initializer::seeded(15)).unwrap();
        let swish = mbconv(&spec, &mut Initializer::seeded(15)).unwrap();
        let acts: Vec<Activation> = leaky
            .body()
            .layers()
            .iter()
            .filter_map(|layer| match layer {
                Layer::Activation(act) => Some(*act),
                _ => None,
            })
            .collect();
        assert_eq!(acts, vec![Activation::LeakyRelu(0.01); 2]);

        let x = random_tensor((1, 16, 8, 8), 8);
        let y = leaky.forward(x.clone()).unwrap();
        assert_eq!(y.dim(), x.dim());
        assert_ne!(y, swish.forward(x).unwrap());
    }

    #[test]
    fn test_basic_block_projection() {
        let mut init = Initializer::seeded(13);
        let block = basic_block(8, 16, 2, &mut init).unwrap();
        assert!(matches!(block.shortcut(), Shortcut::Projection(_)));
        let y = block.forward(random_tensor((2, 8, 8, 8), 6)).unwrap();
        assert_eq!(y.dim(), (2, 16, 4, 4));
        // Post-add Swish output is bounded below by swish's minimum
        assert!(y.iter().all(|&v| v > -0.28));

        let same = basic_block(16, 16, 1, &mut init).unwrap();
        assert!(matches!(same.shortcut(), Shortcut::Identity));
    }

    #[test]
    fn test_mbconv_odd_spatial_stride_two() {
        let mut init = Initializer::seeded(14);
        let block = mbconv(&LayerSpec::new(8, 8, 3, 2, 1, 4), &mut init).unwrap();
        let y = block.forward(random_tensor((1, 8, 7, 7), 7)).unwrap();
        // (7 + 2 - 3) / 2 + 1 = 4
        assert_eq!(y.dim(), (1, 8, 4, 4));
    }
}
