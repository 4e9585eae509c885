//! Image decoding, normalization, rendering, and export.

mod export;
mod load;
mod render;

pub use export::{export, Artifact, ArtifactKind, PNG_MIME};
pub use load::{decode, normalize, InputImage, SUPPORTED_FORMATS};
pub use render::{compose_comparison, render, tensor_to_image, Rendered};

use std::fmt;
use std::str::FromStr;

use image::imageops::FilterType;
use ndarray::Array4;

use crate::error::{Error, Result};

/// Image tensor in NCHW format (batch, channels, height, width).
/// Values are normalized to [0, 1].
pub type ImageTensor = Array4<f32>;

/// Number of channels in RGB images.
pub const RGB_CHANNELS: usize = 3;

/// Resampling filter used for every resize in the pipeline.
pub const RESAMPLE_FILTER: FilterType = FilterType::Lanczos3;

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either side is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = Error;

    /// Parse `WIDTHxHEIGHT`, e.g. `300x300`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidParameter {
            name: "size".to_string(),
            reason: format!("expected WIDTHxHEIGHT, got {s:?}"),
        };

        let (width, height) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(invalid)?;
        let width = width.trim().parse().map_err(|_| invalid())?;
        let height = height.trim().parse().map_err(|_| invalid())?;

        Ok(Self { width, height })
    }
}
