//! Architecture configuration structures
//!
//! Networks can be described in JSON as an ordered list of layer records and
//! built without code changes. Every layer and every connection is validated
//! before any parameters are allocated.

use crate::error::{EngineError, Result};
use crate::layers::{
    ConvolutionalLayer, EmbeddingLayer, FullyConnectedLayer, Layer, LayerKind, RecurrentLayer,
};
use crate::network::Network;
use crate::utils::{Activation, SimpleRng};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;

/// Configuration for a single layer.
///
/// Different layer types require different fields:
///
/// - **fully_connected**: `input_size`, `output_size`
/// - **convolutional**: `kernel_size`, `in_channels`, `out_channels`,
///   `input_height`, `input_width`, optional `stride` (default 1)
/// - **recurrent**: `input_size`, `hidden_size`, optional `sequence_length`
///   (default 1)
/// - **embedding**: `vocab_size`, `embed_size`
///
/// `activation` applies to fully connected and convolutional layers and
/// defaults to `identity`.
///
/// # Examples
///
/// ```json
/// {
///   "layer_type": "convolutional",
///   "kernel_size": 3,
///   "in_channels": 1,
///   "out_channels": 8,
///   "stride": 1,
///   "input_height": 28,
///   "input_width": 28,
///   "activation": "relu"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    /// "fully_connected", "convolutional", "recurrent" or "embedding"
    pub layer_type: String,

    /// Activation name, e.g. "relu" or "softmax"
    pub activation: Option<String>,

    // Fully connected and recurrent
    pub input_size: Option<usize>,
    pub output_size: Option<usize>,

    // Convolutional
    pub kernel_size: Option<usize>,
    pub in_channels: Option<usize>,
    pub out_channels: Option<usize>,
    pub stride: Option<usize>,
    pub input_height: Option<usize>,
    pub input_width: Option<usize>,

    // Recurrent
    pub hidden_size: Option<usize>,
    pub sequence_length: Option<usize>,

    // Embedding
    pub vocab_size: Option<usize>,
    pub embed_size: Option<usize>,
}

/// Configuration for the entire network. Layers run in the order listed.
///
/// # Example
///
/// ```json
/// {
///   "layers": [
///     { "layer_type": "fully_connected", "input_size": 100, "output_size": 256, "activation": "tanh" },
///     { "layer_type": "fully_connected", "input_size": 256, "output_size": 12288, "activation": "sigmoid" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    pub layers: Vec<LayerConfig>,
}

/// Loads and validates an architecture configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use neural_layers::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/classifier.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture(path: &str) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

fn parse_layer_type(layer: &LayerConfig, index: usize) -> Result<LayerKind> {
    match layer.layer_type.to_lowercase().as_str() {
        "fully_connected" => Ok(LayerKind::FullyConnected),
        "convolutional" => Ok(LayerKind::Convolutional),
        "recurrent" => Ok(LayerKind::Recurrent),
        "embedding" => Ok(LayerKind::Embedding),
        _ => Err(EngineError::config(format!(
            "Layer {}: Invalid layer type '{}'. Must be one of: fully_connected, convolutional, recurrent, embedding",
            index, layer.layer_type
        ))),
    }
}

fn parse_activation(layer: &LayerConfig, index: usize) -> Result<Activation> {
    match &layer.activation {
        Some(name) => name.parse().map_err(|_| {
            EngineError::config(format!(
                "Layer {}: Unknown activation '{}'. Must be one of: identity, relu, sigmoid, tanh, softmax",
                index, name
            ))
        }),
        None => Ok(Activation::Identity),
    }
}

/// A required, strictly positive field.
fn require(value: Option<usize>, field: &str, kind: LayerKind, index: usize) -> Result<usize> {
    match value {
        None => Err(EngineError::config(format!(
            "Layer {}: {} layer requires '{}'",
            index, kind, field
        ))),
        Some(0) => Err(EngineError::config(format!(
            "Layer {}: {} must be greater than 0",
            index, field
        ))),
        Some(v) => Ok(v),
    }
}

/// An optional field that must be positive when present.
fn optional(value: Option<usize>, field: &str, default: usize, index: usize) -> Result<usize> {
    match value {
        Some(0) => Err(EngineError::config(format!(
            "Layer {}: {} must be greater than 0",
            index, field
        ))),
        Some(v) => Ok(v),
        None => Ok(default),
    }
}

/// Flat input and output sizes a layer configuration implies.
fn layer_sizes(layer: &LayerConfig, index: usize) -> Result<(usize, usize)> {
    let kind = parse_layer_type(layer, index)?;
    match kind {
        LayerKind::FullyConnected => Ok((
            require(layer.input_size, "input_size", kind, index)?,
            require(layer.output_size, "output_size", kind, index)?,
        )),
        LayerKind::Convolutional => {
            let kernel_size = require(layer.kernel_size, "kernel_size", kind, index)?;
            let in_channels = require(layer.in_channels, "in_channels", kind, index)?;
            let out_channels = require(layer.out_channels, "out_channels", kind, index)?;
            let height = require(layer.input_height, "input_height", kind, index)?;
            let width = require(layer.input_width, "input_width", kind, index)?;
            let stride = optional(layer.stride, "stride", 1, index)?;
            if height < kernel_size || width < kernel_size {
                return Err(EngineError::config(format!(
                    "Layer {}: input {}x{} is smaller than the {}x{} kernel",
                    index, height, width, kernel_size, kernel_size
                )));
            }
            let out_height = (height - kernel_size) / stride + 1;
            let out_width = (width - kernel_size) / stride + 1;
            Ok((
                height * width * in_channels,
                out_height * out_width * out_channels,
            ))
        }
        LayerKind::Recurrent => {
            let input_size = require(layer.input_size, "input_size", kind, index)?;
            let hidden_size = require(layer.hidden_size, "hidden_size", kind, index)?;
            let sequence_length = optional(layer.sequence_length, "sequence_length", 1, index)?;
            Ok((sequence_length * input_size, sequence_length * hidden_size))
        }
        LayerKind::Embedding => {
            require(layer.vocab_size, "vocab_size", kind, index)?;
            Ok((1, require(layer.embed_size, "embed_size", kind, index)?))
        }
    }
}

/// Validates a single layer: known type, required fields present and
/// positive, activation name recognised.
pub fn validate_layer(layer: &LayerConfig, index: usize) -> Result<()> {
    layer_sizes(layer, index)?;
    parse_activation(layer, index)?;
    Ok(())
}

/// Validates an architecture configuration.
///
/// Checks that:
/// - Architecture has at least one layer
/// - Each layer has the required fields for its type
/// - Layer connections are valid (output size of layer i matches input size of layer i+1)
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    if config.layers.is_empty() {
        return Err(EngineError::config("Architecture must have at least one layer"));
    }

    let mut sizes = Vec::with_capacity(config.layers.len());
    for (i, layer) in config.layers.iter().enumerate() {
        validate_layer(layer, i)?;
        sizes.push(layer_sizes(layer, i)?);
    }

    for (i, pair) in sizes.windows(2).enumerate() {
        let current_output = pair[0].1;
        let next_input = pair[1].0;
        if current_output != next_input {
            return Err(EngineError::config(format!(
                "Layer connection mismatch: Layer {} output size ({}) does not match Layer {} input size ({})",
                i, current_output, i + 1, next_input
            )));
        }
    }

    Ok(())
}

fn build_layer(layer: &LayerConfig, index: usize, rng: &mut SimpleRng) -> Result<Box<dyn Layer>> {
    let kind = parse_layer_type(layer, index)?;
    let activation = parse_activation(layer, index)?;
    let built: Box<dyn Layer> = match kind {
        LayerKind::FullyConnected => Box::new(FullyConnectedLayer::new(
            require(layer.input_size, "input_size", kind, index)?,
            require(layer.output_size, "output_size", kind, index)?,
            activation,
            rng,
        )?),
        LayerKind::Convolutional => Box::new(
            ConvolutionalLayer::new(
                require(layer.kernel_size, "kernel_size", kind, index)?,
                require(layer.in_channels, "in_channels", kind, index)?,
                require(layer.out_channels, "out_channels", kind, index)?,
                optional(layer.stride, "stride", 1, index)?,
                activation,
                rng,
            )?
            .with_input_geometry(
                require(layer.input_height, "input_height", kind, index)?,
                require(layer.input_width, "input_width", kind, index)?,
            )?,
        ),
        LayerKind::Recurrent => Box::new(
            RecurrentLayer::new(
                require(layer.input_size, "input_size", kind, index)?,
                require(layer.hidden_size, "hidden_size", kind, index)?,
                rng,
            )?
            .with_sequence_length(optional(layer.sequence_length, "sequence_length", 1, index)?)?,
        ),
        LayerKind::Embedding => Box::new(EmbeddingLayer::new(
            require(layer.vocab_size, "vocab_size", kind, index)?,
            require(layer.embed_size, "embed_size", kind, index)?,
            rng,
        )?),
    };
    Ok(built)
}

/// Builds a network from an architecture configuration.
///
/// Layers are initialised in order from `rng`, so the same seed always yields
/// the same parameters.
///
/// # Examples
///
/// ```
/// use neural_layers::architecture::{build_network, ArchitectureConfig, LayerConfig};
/// use neural_layers::utils::SimpleRng;
///
/// let config = ArchitectureConfig {
///     layers: vec![LayerConfig {
///         layer_type: "fully_connected".to_string(),
///         input_size: Some(4),
///         output_size: Some(2),
///         activation: Some("softmax".to_string()),
///         ..LayerConfig::default()
///     }],
/// };
/// let mut rng = SimpleRng::new(42);
/// let network = build_network(&config, &mut rng, 0.01).unwrap();
/// assert_eq!(network.len(), 1);
/// ```
pub fn build_network(
    config: &ArchitectureConfig,
    rng: &mut SimpleRng,
    learning_rate: f32,
) -> Result<Network> {
    validate_architecture(config)?;
    let mut network = Network::new(learning_rate);
    for (i, layer_config) in config.layers.iter().enumerate() {
        network.push_boxed(build_layer(layer_config, i, rng)?)?;
    }
    info!(
        "Built network: {} layers, {} parameters",
        network.len(),
        network.parameter_count()
    );
    Ok(network)
}
