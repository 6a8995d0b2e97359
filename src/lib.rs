//! Neural Layers Library
//!
//! A minimal neural-network layer engine: parameterised layers with
//! hand-written forward and backward passes, composed into small networks.
//!
//! # Modules
//!
//! - `tensor`: Dense row-major f32 tensors
//! - `layers`: Layer trait and implementations (convolutional, fully connected, recurrent, embedding)
//! - `network`: Sequential composition of layers
//! - `optimizers`: Optimizer trait and SGD
//! - `loss`: Cross-entropy and squared-error losses
//! - `models`: Image classifier, caption generator and image generator
//! - `persist`: Saving and loading network parameters
//! - `utils`: Shared utilities (RNG, activation functions)
//! - `config`: Training configuration structures
//! - `architecture`: Architecture configuration and network building

pub mod architecture;
pub mod config;
pub mod error;
pub mod layers;
pub mod loss;
pub mod models;
pub mod network;
pub mod optimizers;
pub mod persist;
pub mod tensor;
pub mod utils;

pub use error::{EngineError, Result};
pub use network::Network;
pub use tensor::Tensor;
