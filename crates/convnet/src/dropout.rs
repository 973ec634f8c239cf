//! Inverted Dropout

use ndarray::{Array, Dimension};
use rand::Rng;

use crate::error::{ConvNetError, Result};

/// Zeroes activations with probability `p` during training and rescales the
/// survivors by `1 / (1 - p)`. Identity at inference time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    probability: f32,
}

impl Dropout {
    pub fn new(probability: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&probability) {
            return Err(ConvNetError::config(format!(
                "dropout probability must be in [0, 1), got {}",
                probability
            )));
        }
        Ok(Self { probability })
    }

    pub fn probability(&self) -> f32 {
        self.probability
    }

    /// Inference mode
    pub fn forward<D: Dimension>(&self, x: Array<f32, D>) -> Array<f32, D> {
        x
    }

    /// Training mode
    pub fn forward_train<D, R>(&self, x: Array<f32, D>, rng: &mut R) -> Array<f32, D>
    where
        D: Dimension,
        R: Rng + ?Sized,
    {
        if self.probability == 0.0 {
            return x;
        }
        let keep_scale = 1.0 / (1.0 - self.probability);
        let p = self.probability;
        x.mapv_into(|v| if rng.gen::<f32>() < p { 0.0 } else { v * keep_scale })
    }
}
