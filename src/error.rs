//! Error type shared by every component of the engine.

use thiserror::Error;

/// Errors raised by tensors, layers, networks and the file-backed formats.
///
/// Shape, index and configuration errors are raised synchronously at the point
/// of violation. Nothing is retried: all computation is in memory.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Shape mismatch during {operation}: expected {expected:?}, got {actual:?}")]
    Shape {
        expected: Vec<usize>,
        actual: Vec<usize>,
        operation: String,
    },

    #[error("Index {index} out of bounds [0, {bound}) during {operation}")]
    Index {
        index: i64,
        bound: usize,
        operation: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{layer} layer: backward called without a matching forward pass")]
    MissingCache { layer: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn shape(expected: &[usize], actual: &[usize], operation: &str) -> Self {
        EngineError::Shape {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
            operation: operation.to_string(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        EngineError::Config(message.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
