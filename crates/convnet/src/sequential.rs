//! Layer sum type and left-to-right composition

use ndarray::Array4;

use crate::activation::Activation;
use crate::blocks::SeGate;
use crate::error::{ConvNetError, Result};
use crate::init::Initializer;
use crate::layers::{BatchNorm2d, Conv2d};
use crate::pool::Pool;

/// One stage of a feature extractor
#[derive(Debug, Clone)]
pub enum Layer {
    Conv(Conv2d),
    Norm(BatchNorm2d),
    Activation(Activation),
    Pool(Pool),
    SeGate(SeGate),
    Residual(Residual),
}

impl Layer {
    pub fn forward(&self, x: Array4<f32>) -> Result<Array4<f32>> {
        match self {
            Layer::Conv(conv) => conv.forward(&x),
            Layer::Norm(norm) => norm.forward(x),
            Layer::Activation(act) => Ok(act.forward(x)),
            Layer::Pool(pool) => pool.forward(&x),
            Layer::SeGate(gate) => gate.forward(x),
            Layer::Residual(block) => block.forward(x),
        }
    }

    /// Training-mode forward: normalization layers use batch statistics
    pub fn forward_train(&mut self, x: Array4<f32>) -> Result<Array4<f32>> {
        match self {
            Layer::Norm(norm) => norm.forward_train(x),
            Layer::Residual(block) => block.forward_train(x),
            other => other.forward(x),
        }
    }

    pub fn num_parameters(&self) -> usize {
        match self {
            Layer::Conv(conv) => conv.num_parameters(),
            Layer::Norm(norm) => norm.num_parameters(),
            Layer::Activation(_) | Layer::Pool(_) => 0,
            Layer::SeGate(gate) => gate.num_parameters(),
            Layer::Residual(block) => block.num_parameters(),
        }
    }

    /// Xavier-uniform weights and zero biases for every convolution inside
    pub fn initialize(&mut self, init: &mut Initializer) {
        match self {
            Layer::Conv(conv) => conv.initialize(init),
            Layer::SeGate(gate) => gate.initialize(init),
            Layer::Residual(block) => block.initialize(init),
            Layer::Norm(_) | Layer::Activation(_) | Layer::Pool(_) => {}
        }
    }
}

impl From<Conv2d> for Layer {
    fn from(conv: Conv2d) -> Self {
        Layer::Conv(conv)
    }
}

impl From<BatchNorm2d> for Layer {
    fn from(norm: BatchNorm2d) -> Self {
        Layer::Norm(norm)
    }
}

impl From<Activation> for Layer {
    fn from(act: Activation) -> Self {
        Layer::Activation(act)
    }
}

impl From<Pool> for Layer {
    fn from(pool: Pool) -> Self {
        Layer::Pool(pool)
    }
}

impl From<SeGate> for Layer {
    fn from(gate: SeGate) -> Self {
        Layer::SeGate(gate)
    }
}

impl From<Residual> for Layer {
    fn from(block: Residual) -> Self {
        Layer::Residual(block)
    }
}

/// Ordered stack of layers applied left to right
#[derive(Debug, Clone, Default)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer (builder style)
    pub fn with(mut self, layer: impl Into<Layer>) -> Self {
        self.layers.push(layer.into());
        self
    }

    pub fn push(&mut self, layer: impl Into<Layer>) {
        self.layers.push(layer.into());
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn forward(&self, x: Array4<f32>) -> Result<Array4<f32>> {
        self.layers.iter().try_fold(x, |acc, layer| layer.forward(acc))
    }

    pub fn forward_train(&mut self, x: Array4<f32>) -> Result<Array4<f32>> {
        self.layers
            .iter_mut()
            .try_fold(x, |acc, layer| layer.forward_train(acc))
    }

    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(Layer::num_parameters).sum()
    }

    pub fn initialize(&mut self, init: &mut Initializer) {
        for layer in &mut self.layers {
            layer.initialize(init);
        }
    }
}

/// Skip path of a residual block
#[derive(Debug, Clone)]
pub enum Shortcut {
    /// No skip connection; the body output is returned as is
    None,
    /// Add the block input unchanged
    Identity,
    /// Add a projection of the block input (1x1 conv + norm)
    Projection(Sequential),
}

/// Body plus optional skip connection and post-add activation
#[derive(Debug, Clone)]
pub struct Residual {
    body: Sequential,
    shortcut: Shortcut,
    post: Option<Activation>,
}

impl Residual {
    pub fn new(body: Sequential, shortcut: Shortcut, post: Option<Activation>) -> Self {
        Self {
            body,
            shortcut,
            post,
        }
    }

    pub fn body(&self) -> &Sequential {
        &self.body
    }

    pub fn shortcut(&self) -> &Shortcut {
        &self.shortcut
    }

    /// Whether the block input reaches the output through a skip path
    pub fn has_skip(&self) -> bool {
        !matches!(self.shortcut, Shortcut::None)
    }

    pub fn forward(&self, x: Array4<f32>) -> Result<Array4<f32>> {
        let skip = match &self.shortcut {
            Shortcut::None => None,
            Shortcut::Identity => Some(x.clone()),
            Shortcut::Projection(projection) => Some(projection.forward(x.clone())?),
        };
        let out = self.body.forward(x)?;
        self.finish(out, skip)
    }

    pub fn forward_train(&mut self, x: Array4<f32>) -> Result<Array4<f32>> {
        let skip = match &mut self.shortcut {
            Shortcut::None => None,
            Shortcut::Identity => Some(x.clone()),
            Shortcut::Projection(projection) => Some(projection.forward_train(x.clone())?),
        };
        let out = self.body.forward_train(x)?;
        self.finish(out, skip)
    }

    fn finish(&self, mut out: Array4<f32>, skip: Option<Array4<f32>>) -> Result<Array4<f32>> {
        if let Some(skip) = skip {
            if skip.dim() != out.dim() {
                return Err(ConvNetError::shape(
                    "residual",
                    format!("{:?}", out.dim()),
                    format!("{:?}", skip.dim()),
                ));
            }
            out += &skip;
        }
        Ok(match self.post {
            Some(act) => act.forward(out),
            None => out,
        })
    }

    pub fn num_parameters(&self) -> usize {
        let projection = match &self.shortcut {
            Shortcut::Projection(projection) => projection.num_parameters(),
            _ => 0,
        };
        self.body.num_parameters() + projection
    }

    pub fn initialize(&mut self, init: &mut Initializer) {
        self.body.initialize(init);
        if let Shortcut::Projection(projection) = &mut self.shortcut {
            projection.initialize(init);
        }
    }
}
