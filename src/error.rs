//! Custom error types for pixelfill.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the pixelfill library.
#[derive(Error, Debug)]
pub enum Error {
    /// No checkpoint file exists at the expected path.
    #[error("no checkpoint found at {path}")]
    MissingCheckpoint { path: PathBuf },

    /// Inference was requested while no model is loaded.
    #[error("model not available: {reason}")]
    ModelUnavailable { reason: String },

    /// The checkpoint is not a model file at all.
    #[error("invalid checkpoint {path}: {reason}")]
    InvalidCheckpoint { path: PathBuf, reason: String },

    /// Failed to load an ONNX model.
    #[error("failed to load ONNX model {path}: {source}")]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: ort::Error,
    },

    /// Failed to register an execution provider.
    #[error("failed to register {device} execution provider: {reason}")]
    ExecutionProvider { device: String, reason: String },

    /// The uploaded bytes could not be decoded as an image.
    #[error("failed to decode image: {source}")]
    Decode {
        #[source]
        source: image::ImageError,
    },

    /// The uploaded bytes use an encoding outside the allow-list.
    #[error("unsupported image format: {format}")]
    UnsupportedFormat { format: String },

    /// Image dimensions are not supported.
    #[error("unsupported image dimensions {width}x{height}: {reason}")]
    UnsupportedDimensions {
        width: u32,
        height: u32,
        reason: String,
    },

    /// Model inference failed.
    #[error("model inference failed: {source}")]
    Inference {
        #[source]
        source: ort::Error,
    },

    /// A non-ONNX predictor failed.
    #[error("prediction failed: {reason}")]
    Prediction { reason: String },

    /// Shape mismatch in tensor operations.
    #[error("tensor shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// Failed to encode a rendered image.
    #[error("failed to encode {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: image::ImageError,
    },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse failure category reported at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No usable model; the pipeline is inert until one is provided.
    MissingCheckpoint,
    /// A checkpoint exists but is undeserializable or incompatible.
    Load,
    /// The request input is not a supported image.
    Decode,
    /// The forward pass failed for this request.
    Inference,
    /// Rendering or export failed for this request.
    Encode,
    /// A configuration value is out of range.
    Config,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCheckpoint { .. } | Self::ModelUnavailable { .. } => {
                ErrorKind::MissingCheckpoint
            }
            Self::InvalidCheckpoint { .. }
            | Self::ModelLoad { .. }
            | Self::ExecutionProvider { .. }
            | Self::Io(_) => ErrorKind::Load,
            Self::Decode { .. }
            | Self::UnsupportedFormat { .. }
            | Self::UnsupportedDimensions { .. } => ErrorKind::Decode,
            Self::Inference { .. } | Self::Prediction { .. } | Self::ShapeMismatch { .. } => {
                ErrorKind::Inference
            }
            Self::Encode { .. } => ErrorKind::Encode,
            Self::InvalidParameter { .. } => ErrorKind::Config,
        }
    }
}

/// Result type alias for pixelfill operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = Error::MissingCheckpoint {
            path: PathBuf::from("outputs/model.onnx"),
        };
        assert_eq!(err.kind(), ErrorKind::MissingCheckpoint);

        let err = Error::ShapeMismatch {
            expected: "[1, 3, 128, 128]".to_string(),
            actual: "[1, 3, 64, 64]".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Inference);

        let err = Error::UnsupportedFormat {
            format: "Tiff".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Decode);

        let err = Error::InvalidCheckpoint {
            path: PathBuf::from("outputs/model.onnx"),
            reason: "file is empty".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Load);

        let err = Error::Prediction {
            reason: "device memory exhausted".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Inference);
    }

    #[test]
    fn test_display_includes_context() {
        let err = Error::InvalidCheckpoint {
            path: PathBuf::from("outputs/model.onnx"),
            reason: "not an ONNX model".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("outputs/model.onnx"));
        assert!(message.contains("not an ONNX model"));
    }
}
