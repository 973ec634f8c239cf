//! Element-wise Activations

use ndarray::{Array, Dimension};
use serde::{Deserialize, Serialize};

/// Logistic sigmoid, evaluated without overflow for large |x|
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Swish: x * sigmoid(x)
pub fn swish(x: f32) -> f32 {
    x * sigmoid(x)
}

/// Activation applied element-wise, shape preserving
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Activation {
    Swish,
    Relu,
    Sigmoid,
    /// Leaky ReLU with the given negative slope
    LeakyRelu(f32),
}

impl Activation {
    /// Leaky ReLU with the conventional 0.01 slope
    pub fn leaky_relu() -> Self {
        Activation::LeakyRelu(0.01)
    }

    /// Apply to a single value
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Swish => swish(x),
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => sigmoid(x),
            Activation::LeakyRelu(slope) => {
                if x >= 0.0 {
                    x
                } else {
                    slope * x
                }
            }
        }
    }

    /// Apply in place to an owned tensor
    pub fn forward<D: Dimension>(self, x: Array<f32, D>) -> Array<f32, D> {
        x.mapv_into(|v| self.apply(v))
    }
}
