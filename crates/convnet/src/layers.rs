//! Parameterized Layers: convolution, batch normalization, linear projection

use ndarray::{Array1, Array2, Array4, Axis};
use tracing::debug;

use crate::error::{ConvNetError, Result};
use crate::init::Initializer;

/// Hyper-parameters of a 2-D convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub groups: usize,
    pub bias: bool,
}

impl Conv2dConfig {
    /// Square kernel, stride 1, no padding, dense, no bias
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride: 1,
            padding: 0,
            groups: 1,
            bias: false,
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.in_channels == 0 || self.out_channels == 0 {
            return Err(ConvNetError::config(format!(
                "conv channels must be positive, got {} -> {}",
                self.in_channels, self.out_channels
            )));
        }
        if self.kernel_size == 0 || self.stride == 0 {
            return Err(ConvNetError::config(format!(
                "conv kernel and stride must be positive, got kernel={} stride={}",
                self.kernel_size, self.stride
            )));
        }
        if self.groups == 0
            || self.in_channels % self.groups != 0
            || self.out_channels % self.groups != 0
        {
            return Err(ConvNetError::config(format!(
                "groups={} must divide both {} and {}",
                self.groups, self.in_channels, self.out_channels
            )));
        }
        Ok(())
    }
}

/// 2-D convolution over (batch, channels, height, width) tensors
#[derive(Debug, Clone)]
pub struct Conv2d {
    config: Conv2dConfig,
    /// (out, in / groups, k, k)
    weight: Array4<f32>,
    bias: Option<Array1<f32>>,
}

impl Conv2d {
    /// Build a convolution with Xavier-uniform weights and zero bias
    pub fn new(config: Conv2dConfig, init: &mut Initializer) -> Result<Self> {
        config.validate()?;
        let weight = init.conv_weight(Self::weight_shape(&config));
        let bias = config.bias.then(|| Array1::zeros(config.out_channels));
        Ok(Self {
            config,
            weight,
            bias,
        })
    }

    /// Build a convolution from explicit parameters
    pub fn with_weights(
        config: Conv2dConfig,
        weight: Array4<f32>,
        bias: Option<Array1<f32>>,
    ) -> Result<Self> {
        config.validate()?;
        let expected = Self::weight_shape(&config);
        if weight.dim() != expected {
            return Err(ConvNetError::shape(
                "conv2d weight",
                format!("{:?}", expected),
                format!("{:?}", weight.dim()),
            ));
        }
        match &bias {
            Some(b) if b.len() != config.out_channels => {
                return Err(ConvNetError::shape("conv2d bias", config.out_channels, b.len()));
            }
            Some(_) if !config.bias => {
                return Err(ConvNetError::config("conv2d configured without bias but one given"));
            }
            None if config.bias => {
                return Err(ConvNetError::config("conv2d configured with bias but none given"));
            }
            _ => {}
        }
        Ok(Self {
            config,
            weight,
            bias,
        })
    }

    fn weight_shape(config: &Conv2dConfig) -> (usize, usize, usize, usize) {
        (
            config.out_channels,
            config.in_channels / config.groups,
            config.kernel_size,
            config.kernel_size,
        )
    }

    pub fn config(&self) -> &Conv2dConfig {
        &self.config
    }

    pub fn weight(&self) -> &Array4<f32> {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Array1<f32>> {
        self.bias.as_ref()
    }

    /// Output spatial size for a given input size
    pub fn output_hw(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        let Conv2dConfig {
            kernel_size: k,
            stride: s,
            padding: p,
            ..
        } = self.config;
        if height + 2 * p < k || width + 2 * p < k {
            return Err(ConvNetError::shape(
                "conv2d",
                format!("padded spatial size >= {}", k),
                format!("{}x{} with padding {}", height, width, p),
            ));
        }
        Ok(((height + 2 * p - k) / s + 1, (width + 2 * p - k) / s + 1))
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.as_ref().map_or(0, |b| b.len())
    }

    /// Redraw weights (Xavier uniform) and zero the bias
    pub fn initialize(&mut self, init: &mut Initializer) {
        self.weight = init.conv_weight(self.weight.dim());
        if let Some(bias) = self.bias.as_mut() {
            bias.fill(0.0);
        }
    }

    pub fn forward(&self, x: &Array4<f32>) -> Result<Array4<f32>> {
        let (batch, channels, height, width) = x.dim();
        let Conv2dConfig {
            in_channels,
            out_channels,
            kernel_size: k,
            stride,
            padding,
            groups,
            ..
        } = self.config;
        if channels != in_channels {
            return Err(ConvNetError::shape("conv2d", in_channels, channels));
        }
        let (out_h, out_w) = self.output_hw(height, width)?;

        let input = x.as_standard_layout();
        let kernel = self.weight.as_standard_layout();
        let (Some(src), Some(kernel)) = (input.as_slice(), kernel.as_slice()) else {
            return Err(ConvNetError::shape("conv2d", "contiguous tensor", "strided view"));
        };

        let in_per_group = in_channels / groups;
        let out_per_group = out_channels / groups;
        let plane_in = height * width;
        let plane_out = out_h * out_w;
        let pad = padding as isize;
        let mut out = vec![0.0f32; batch * out_channels * plane_out];

        for b in 0..batch {
            for oc in 0..out_channels {
                let group = oc / out_per_group;
                let out_base = (b * out_channels + oc) * plane_out;
                let out_plane = &mut out[out_base..out_base + plane_out];
                if let Some(bias) = &self.bias {
                    out_plane.fill(bias[oc]);
                }
                for icg in 0..in_per_group {
                    let ic = group * in_per_group + icg;
                    let in_base = (b * channels + ic) * plane_in;
                    let in_plane = &src[in_base..in_base + plane_in];
                    for kh in 0..k {
                        for kw in 0..k {
                            let w = kernel[((oc * in_per_group + icg) * k + kh) * k + kw];
                            if w == 0.0 {
                                continue;
                            }
                            for oy in 0..out_h {
                                let iy = (oy * stride + kh) as isize - pad;
                                if iy < 0 || iy >= height as isize {
                                    continue;
                                }
                                let row_start = iy as usize * width;
                                let row = &in_plane[row_start..row_start + width];
                                let out_row = &mut out_plane[oy * out_w..(oy + 1) * out_w];
                                for (ox, acc) in out_row.iter_mut().enumerate() {
                                    let ix = (ox * stride + kw) as isize - pad;
                                    if ix >= 0 && ix < width as isize {
                                        *acc += w * row[ix as usize];
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        Array4::from_shape_vec((batch, out_channels, out_h, out_w), out)
            .map_err(|e| ConvNetError::shape("conv2d", "contiguous output", e))
    }
}

/// Per-channel batch normalization
#[derive(Debug, Clone)]
pub struct BatchNorm2d {
    gamma: Array1<f32>,
    beta: Array1<f32>,
    running_mean: Array1<f32>,
    running_var: Array1<f32>,
    eps: f32,
    momentum: f32,
}

impl BatchNorm2d {
    pub fn new(channels: usize) -> Self {
        Self {
            gamma: Array1::ones(channels),
            beta: Array1::zeros(channels),
            running_mean: Array1::zeros(channels),
            running_var: Array1::ones(channels),
            eps: 1e-5,
            momentum: 0.1,
        }
    }

    pub fn channels(&self) -> usize {
        self.gamma.len()
    }

    pub fn running_mean(&self) -> &Array1<f32> {
        &self.running_mean
    }

    pub fn running_var(&self) -> &Array1<f32> {
        &self.running_var
    }

    pub fn num_parameters(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }

    fn check_channels(&self, x: &Array4<f32>) -> Result<()> {
        let channels = x.len_of(Axis(1));
        if channels != self.channels() {
            return Err(ConvNetError::shape("batch_norm", self.channels(), channels));
        }
        Ok(())
    }

    fn normalize(&self, mut x: Array4<f32>, mean: &Array1<f32>, var: &Array1<f32>) -> Array4<f32> {
        for (c, mut plane) in x.axis_iter_mut(Axis(1)).enumerate() {
            let scale = self.gamma[c] / (var[c] + self.eps).sqrt();
            let shift = self.beta[c] - mean[c] * scale;
            plane.mapv_inplace(|v| v * scale + shift);
        }
        x
    }

    /// Normalize with running statistics
    pub fn forward(&self, x: Array4<f32>) -> Result<Array4<f32>> {
        self.check_channels(&x)?;
        Ok(self.normalize(x, &self.running_mean, &self.running_var))
    }

    /// Normalize with batch statistics and update the running estimates
    pub fn forward_train(&mut self, x: Array4<f32>) -> Result<Array4<f32>> {
        self.check_channels(&x)?;
        let (batch, _, height, width) = x.dim();
        let count = batch * height * width;
        if count < 2 {
            return Err(ConvNetError::shape(
                "batch_norm",
                "more than one value per channel in training mode",
                count,
            ));
        }

        let channels = self.channels();
        let mut mean = Array1::zeros(channels);
        let mut var = Array1::zeros(channels);
        for (c, plane) in x.axis_iter(Axis(1)).enumerate() {
            let m = plane.sum() / count as f32;
            mean[c] = m;
            var[c] = plane.fold(0.0, |acc, &v| acc + (v - m) * (v - m)) / count as f32;
        }

        let unbiased = count as f32 / (count - 1) as f32;
        let m = self.momentum;
        self.running_mean = &self.running_mean * (1.0 - m) + &mean * m;
        self.running_var = &self.running_var * (1.0 - m) + &var * (m * unbiased);
        debug!("batch_norm updated running stats for {} channels", channels);

        Ok(self.normalize(x, &mean, &var))
    }
}

/// Fully connected projection over (batch, features) inputs
#[derive(Debug, Clone)]
pub struct Linear {
    /// (out_features, in_features)
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize, init: &mut Initializer) -> Result<Self> {
        if in_features == 0 || out_features == 0 {
            return Err(ConvNetError::config(format!(
                "linear features must be positive, got {} -> {}",
                in_features, out_features
            )));
        }
        Ok(Self {
            weight: init.linear_weight(out_features, in_features),
            bias: Array1::zeros(out_features),
        })
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    pub fn initialize(&mut self, init: &mut Initializer) {
        self.weight = init.linear_weight(self.out_features(), self.in_features());
        self.bias.fill(0.0);
    }

    pub fn forward(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.in_features() {
            return Err(ConvNetError::shape("linear", self.in_features(), x.ncols()));
        }
        Ok(x.dot(&self.weight.t()) + &self.bias)
    }
}

/// Collapse (batch, c, h, w) into (batch, c * h * w), row-major
pub fn flatten(x: &Array4<f32>) -> Result<Array2<f32>> {
    let (batch, channels, height, width) = x.dim();
    Array2::from_shape_vec(
        (batch, channels * height * width),
        x.iter().copied().collect(),
    )
    .map_err(|e| ConvNetError::shape("flatten", "row-major tensor", e))
}
