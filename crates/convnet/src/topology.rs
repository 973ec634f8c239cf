//! Block Topology Description

use serde::{Deserialize, Serialize};

use crate::error::{ConvNetError, Result};

/// One MBConv block instantiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub expansion_ratio: usize,
    pub squeeze_ratio: usize,
}

impl LayerSpec {
    pub const fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        expansion_ratio: usize,
        squeeze_ratio: usize,
    ) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride,
            expansion_ratio,
            squeeze_ratio,
        }
    }

    /// Width of the expanded (depthwise) stage
    pub fn hidden_channels(&self) -> usize {
        self.in_channels * self.expansion_ratio
    }

    /// Width of the squeeze-and-excitation bottleneck
    pub fn squeeze_channels(&self) -> usize {
        if self.squeeze_ratio == 0 {
            0
        } else {
            self.hidden_channels() / self.squeeze_ratio
        }
    }

    /// Skip connection only when input and output shapes agree
    pub fn use_residual(&self) -> bool {
        self.stride == 1 && self.in_channels == self.out_channels
    }

    /// Check the hyper-parameters of this block in isolation
    pub fn validate(&self) -> Result<()> {
        if self.in_channels == 0 || self.out_channels == 0 {
            return Err(ConvNetError::config(format!("{:?}: channels must be positive", self)));
        }
        if self.kernel_size == 0 || self.stride == 0 {
            return Err(ConvNetError::config(format!(
                "{:?}: kernel size and stride must be positive",
                self
            )));
        }
        if self.expansion_ratio == 0 || self.squeeze_ratio == 0 {
            return Err(ConvNetError::config(format!(
                "{:?}: expansion and squeeze ratios must be positive",
                self
            )));
        }
        if self.squeeze_channels() == 0 {
            return Err(ConvNetError::config(format!(
                "{:?}: squeeze bottleneck has zero width ({} / {})",
                self,
                self.hidden_channels(),
                self.squeeze_ratio
            )));
        }
        Ok(())
    }
}

/// Validate a whole block table entering from a stem of `input_channels`
pub fn validate_topology(input_channels: usize, specs: &[LayerSpec]) -> Result<()> {
    if specs.is_empty() {
        return Err(ConvNetError::config("topology has no blocks"));
    }
    let mut channels = input_channels;
    for (idx, spec) in specs.iter().enumerate() {
        spec.validate()?;
        if spec.in_channels != channels {
            return Err(ConvNetError::config(format!(
                "block {} expects {} input channels but previous stage produces {}",
                idx, spec.in_channels, channels
            )));
        }
        channels = spec.out_channels;
    }
    Ok(())
}
