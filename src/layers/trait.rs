//! Layer trait definition for neural network layers
//!
//! Every layer type implements [`Layer`]: a cache-free inference pass, a
//! caching forward pass, a backward pass that consumes that cache, and access
//! to its parameters.

use crate::error::Result;
use crate::layers::Param;
use crate::optimizers::Optimizer;
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag identifying a layer variant, used in architecture files and
/// parameter records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Convolutional,
    FullyConnected,
    Recurrent,
    Embedding,
}

impl LayerKind {
    pub fn tag(self) -> &'static str {
        match self {
            LayerKind::Convolutional => "convolutional",
            LayerKind::FullyConnected => "fully_connected",
            LayerKind::Recurrent => "recurrent",
            LayerKind::Embedding => "embedding",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// What a layer retains from one forward call for the matching backward call.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationCache {
    pub input: Tensor,
    pub pre_activation: Tensor,
    pub output: Tensor,
}

/// Core trait for neural network layers.
///
/// A layer is not reentrant across an in-flight forward/backward pair: the
/// cache written by `forward` is consumed by the next `backward`, and a second
/// `backward` without an intervening `forward` fails with
/// [`EngineError::MissingCache`](crate::EngineError::MissingCache).
///
/// # Example
///
/// ```
/// use neural_layers::layers::{FullyConnectedLayer, Layer};
/// use neural_layers::utils::{Activation, SimpleRng};
/// use neural_layers::Tensor;
///
/// let mut rng = SimpleRng::new(42);
/// let mut layer = FullyConnectedLayer::new(3, 2, Activation::Tanh, &mut rng).unwrap();
/// let output = layer.forward(&Tensor::from_vec(vec![0.1, 0.2, 0.3])).unwrap();
/// let grad_input = layer.backward(&Tensor::from_vec(vec![1.0, -1.0])).unwrap();
/// assert_eq!(output.len(), 2);
/// assert_eq!(grad_input.len(), 3);
/// ```
pub trait Layer: Send + Sync {
    /// Variant tag of this layer.
    fn kind(&self) -> LayerKind;

    /// Number of input elements per call, when fixed.
    ///
    /// A convolution built without an input geometry accepts any input at
    /// least as large as its kernel and reports `None`. Such a layer can only
    /// sit next to other feature-map layers in a `Network`.
    fn input_size(&self) -> Option<usize>;

    /// Number of output elements per call, when fixed.
    fn output_size(&self) -> Option<usize>;

    /// (input channels, output channels) for layers that work on feature
    /// maps. Known even when the spatial sizes are not.
    fn channels(&self) -> Option<(usize, usize)> {
        None
    }

    /// Forward pass without touching the cache.
    fn infer(&self, input: &Tensor) -> Result<Tensor>;

    /// Forward pass that retains what the next `backward` needs.
    fn forward(&mut self, input: &Tensor) -> Result<Tensor>;

    /// Backward pass for the most recent `forward`.
    ///
    /// Accumulates parameter gradients and returns the gradient with respect
    /// to the forward input, computed with the pre-update parameters.
    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor>;

    /// Parameters in a fixed order (weights before biases).
    fn params(&self) -> Vec<&Param>;

    fn params_mut(&mut self) -> Vec<&mut Param>;

    /// Apply accumulated gradients and clear them.
    fn apply_gradients(&mut self, optimizer: &mut dyn Optimizer) {
        for param in self.params_mut() {
            param.step(optimizer);
        }
    }

    fn zero_gradients(&mut self) {
        for param in self.params_mut() {
            param.zero_grad();
        }
    }

    /// Total count of trainable scalars.
    fn parameter_count(&self) -> usize {
        self.params().iter().map(|p| p.value().len()).sum()
    }
}
