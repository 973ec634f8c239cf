//! Network Builder Error Types

use thiserror::Error;

/// Errors raised while assembling or running a network
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvNetError {
    /// Invalid topology or layer hyper-parameters
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Tensor shape disagreement entering a layer
    #[error("Shape mismatch in {layer}: expected {expected}, got {actual}")]
    Shape {
        layer: &'static str,
        expected: String,
        actual: String,
    },
}

impl ConvNetError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        ConvNetError::Configuration(message.into())
    }

    pub(crate) fn shape(layer: &'static str, expected: impl ToString, actual: impl ToString) -> Self {
        ConvNetError::Shape {
            layer,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, ConvNetError>;
