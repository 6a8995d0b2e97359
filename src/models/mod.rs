//! Small ready-made networks built from the engine's layers.

pub mod caption;
pub mod classifier;
pub mod generator;

pub use caption::{CaptionGenerator, END_TOKEN, START_TOKEN};
pub use classifier::{Classification, ImageClassifier};
pub use generator::ImageGenerator;
