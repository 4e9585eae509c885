//! Checkpoint loading and the model handle used for inference.

mod loader;
mod predictor;

pub use loader::{
    Checkpoint, CheckpointLoader, CheckpointMetadata, Device, DevicePreference, LoaderOptions,
    ModelHandle, DEFAULT_CHECKPOINT, EPOCH_METADATA_KEY,
};
pub use predictor::{OnnxPredictor, Predictor};
