//! Shared utilities: seeded random number generation and activation functions.

pub mod activations;
pub mod rng;

pub use activations::Activation;
pub use rng::SimpleRng;
