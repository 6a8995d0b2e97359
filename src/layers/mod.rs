//! Layer abstractions for neural networks
//!
//! This module provides the Layer trait and its four implementations:
//! convolutional, fully connected, recurrent and embedding layers.

mod r#trait;
pub mod convolutional;
pub mod embedding;
pub mod fully_connected;
pub mod param;
pub mod recurrent;

// Re-export the Layer trait for convenience
pub use convolutional::ConvolutionalLayer;
pub use embedding::EmbeddingLayer;
pub use fully_connected::FullyConnectedLayer;
pub use param::Param;
pub use r#trait::{ActivationCache, Layer, LayerKind};
pub use recurrent::{RecurrentLayer, RecurrentStep, SequenceGradients, StepGradients};
