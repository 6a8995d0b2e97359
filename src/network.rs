//! Sequential network composition
//!
//! A [`Network`] exclusively owns an ordered sequence of heterogeneous layers.
//! Forward threads each layer's output into the next; backward walks the
//! layers in strictly reverse order and then applies one gradient-descent step
//! to every layer.

use crate::error::{EngineError, Result};
use crate::layers::Layer;
use crate::optimizers::{Optimizer, SGD};
use crate::tensor::Tensor;
use log::{debug, trace, warn};
use rayon::prelude::*;
use std::fmt;

/// Ordered sequence of layers plus the optimizer that updates them.
///
/// # Example
///
/// ```
/// use neural_layers::layers::FullyConnectedLayer;
/// use neural_layers::utils::{Activation, SimpleRng};
/// use neural_layers::{Network, Tensor};
///
/// let mut rng = SimpleRng::new(42);
/// let mut network = Network::new(0.1);
/// network.push(FullyConnectedLayer::new(4, 8, Activation::Tanh, &mut rng).unwrap()).unwrap();
/// network.push(FullyConnectedLayer::new(8, 3, Activation::Softmax, &mut rng).unwrap()).unwrap();
///
/// let probabilities = network.forward(&Tensor::from_vec(vec![0.1, 0.2, 0.3, 0.4])).unwrap();
/// assert!((probabilities.sum() - 1.0).abs() < 1e-5);
/// network.backward(&Tensor::from_vec(vec![0.0, -1.0, 0.0])).unwrap();
/// ```
pub struct Network {
    layers: Vec<Box<dyn Layer>>,
    optimizer: SGD,
}

impl Network {
    /// Empty network whose updates use the given fixed learning rate.
    pub fn new(learning_rate: f32) -> Self {
        Self {
            layers: Vec::new(),
            optimizer: SGD::new(learning_rate),
        }
    }

    /// Build a network from layers, checking every connection.
    pub fn from_layers(layers: Vec<Box<dyn Layer>>, learning_rate: f32) -> Result<Self> {
        let mut network = Self::new(learning_rate);
        for layer in layers {
            network.push_boxed(layer)?;
        }
        Ok(network)
    }

    /// Append a layer.
    ///
    /// Fails with a configuration error when this layer cannot follow the
    /// previous one; see [`Network::push_boxed`].
    pub fn push<L: Layer + 'static>(&mut self, layer: L) -> Result<()> {
        self.push_boxed(Box::new(layer))
    }

    /// Append an already boxed layer.
    ///
    /// # Arguments
    ///
    /// * `layer` - Layer to place after the current last layer
    ///
    /// # Returns
    ///
    /// A configuration error, leaving the network unchanged, when:
    /// * the previous output size and this input size are both fixed and differ
    /// * both layers work on feature maps and their channel counts differ
    /// * one side has a fixed size the other side cannot be checked against
    pub fn push_boxed(&mut self, layer: Box<dyn Layer>) -> Result<()> {
        if let Some(previous) = self.layers.last() {
            check_connection(previous.as_ref(), layer.as_ref(), self.layers.len() - 1)?;
        }
        debug!(
            "Network: layer {} = {} ({} parameters)",
            self.layers.len(),
            layer.kind(),
            layer.parameter_count()
        );
        self.layers.push(layer);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [Box<dyn Layer>] {
        &mut self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&dyn Layer> {
        self.layers.get(index).map(|l| l.as_ref())
    }

    pub fn learning_rate(&self) -> f32 {
        self.optimizer.learning_rate()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }

    fn ensure_layers(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(EngineError::config("network has no layers"));
        }
        Ok(())
    }

    /// Forward pass; every layer caches what its backward needs.
    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        self.ensure_layers()?;
        let mut current = input.clone();
        for layer in self.layers.iter_mut() {
            current = layer.forward(&current)?;
        }
        trace!("Network: forward produced {:?}", current.shape());
        Ok(current)
    }

    /// Forward pass without caching, usable through a shared reference.
    pub fn infer(&self, input: &Tensor) -> Result<Tensor> {
        self.ensure_layers()?;
        let mut current = input.clone();
        for layer in &self.layers {
            current = layer.infer(&current)?;
        }
        Ok(current)
    }

    /// Inference over a batch, parallelised across samples.
    pub fn predict_batch(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        inputs.par_iter().map(|input| self.infer(input)).collect()
    }

    /// Backward pass in reverse layer order without updating parameters.
    ///
    /// Returns the gradient with respect to the network input. On failure
    /// all partially accumulated gradients are discarded.
    pub fn accumulate_gradients(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        self.ensure_layers()?;
        let mut grad = grad_output.clone();
        for index in (0..self.layers.len()).rev() {
            match self.layers[index].backward(&grad) {
                Ok(next) => grad = next,
                Err(err) => {
                    self.zero_gradients();
                    return Err(err);
                }
            }
        }
        Ok(grad)
    }

    /// Apply accumulated gradients to every layer with the network's SGD
    /// optimizer, then clear them.
    pub fn apply_gradients(&mut self) {
        let any_gradient = self
            .layers
            .iter()
            .any(|l| l.params().iter().any(|p| p.has_gradient()));
        if !any_gradient {
            warn!("Network: gradient step requested with no accumulated gradients");
        }
        for layer in self.layers.iter_mut() {
            layer.apply_gradients(&mut self.optimizer);
        }
    }

    /// Backward pass followed by one parameter update.
    ///
    /// The returned input gradient is computed with the pre-update parameters.
    pub fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let grad_input = self.accumulate_gradients(grad_output)?;
        self.apply_gradients();
        Ok(grad_input)
    }

    pub fn zero_gradients(&mut self) {
        for layer in self.layers.iter_mut() {
            layer.zero_gradients();
        }
    }
}

fn check_connection(previous: &dyn Layer, next: &dyn Layer, index: usize) -> Result<()> {
    let channels = (previous.channels(), next.channels());
    if let (Some((_, output)), Some((input, _))) = channels {
        if output != input {
            return Err(EngineError::config(format!(
                "Layer connection mismatch: Layer {} output channels ({}) does not match Layer {} input channels ({})",
                index,
                output,
                index + 1,
                input
            )));
        }
    }

    match (previous.output_size(), next.input_size()) {
        (Some(output), Some(input)) if output != input => Err(EngineError::config(format!(
            "Layer connection mismatch: Layer {} output size ({}) does not match Layer {} input size ({})",
            index,
            output,
            index + 1,
            input
        ))),
        (Some(_), Some(_)) | (None, None) => Ok(()),
        // Feature map into feature map: channels were checked above.
        _ if channels.0.is_some() && channels.1.is_some() => Ok(()),
        (output, input) => Err(EngineError::config(format!(
            "Layer connection mismatch: cannot verify Layer {} output size ({}) against Layer {} input size ({}); fix the convolution input geometry",
            index,
            describe_size(output),
            index + 1,
            describe_size(input)
        ))),
    }
}

fn describe_size(size: Option<usize>) -> String {
    size.map_or_else(|| "unknown".to_string(), |s| s.to_string())
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<_> = self.layers.iter().map(|l| l.kind()).collect();
        f.debug_struct("Network")
            .field("layers", &kinds)
            .field("learning_rate", &self.optimizer.learning_rate())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{EmbeddingLayer, FullyConnectedLayer};
    use crate::utils::{Activation, SimpleRng};

    #[test]
    fn test_mismatched_layers_are_config_error() {
        let mut rng = SimpleRng::new(42);
        let mut network = Network::new(0.1);
        network
            .push(FullyConnectedLayer::new(4, 3, Activation::Relu, &mut rng).unwrap())
            .unwrap();
        let err = network
            .push(FullyConnectedLayer::new(5, 2, Activation::Relu, &mut rng).unwrap())
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert_eq!(network.len(), 1);
    }

    #[test]
    fn test_empty_network_forward_fails() {
        let mut network = Network::new(0.1);
        assert!(network.forward(&Tensor::from_vec(vec![1.0])).is_err());
    }

    #[test]
    fn test_embedding_feeds_fully_connected() {
        let mut rng = SimpleRng::new(42);
        let mut network = Network::new(0.1);
        network.push(EmbeddingLayer::new(10, 4, &mut rng).unwrap()).unwrap();
        network
            .push(FullyConnectedLayer::new(4, 10, Activation::Softmax, &mut rng).unwrap())
            .unwrap();

        let probabilities = network.forward(&Tensor::from_vec(vec![3.0])).unwrap();
        assert_eq!(probabilities.len(), 10);
        let grad = network.backward(&probabilities).unwrap();
        assert_eq!(grad.shape(), &[1]);
    }

    #[test]
    fn test_parameter_count_sums_layers() {
        let mut rng = SimpleRng::new(42);
        let network = Network::from_layers(
            vec![
                Box::new(FullyConnectedLayer::new(3, 4, Activation::Tanh, &mut rng).unwrap()),
                Box::new(FullyConnectedLayer::new(4, 2, Activation::Identity, &mut rng).unwrap()),
            ],
            0.01,
        )
        .unwrap();
        assert_eq!(network.parameter_count(), 3 * 4 + 4 + 4 * 2 + 2);
    }
}
