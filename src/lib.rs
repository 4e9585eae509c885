//! # `pixelfill`
//!
//! Image completion with a pretrained ONNX model.
//!
//! An uploaded image is decoded and forced to RGB, resized to the model's
//! fixed input size, passed through one forward pass, and rendered back at
//! the preview size and the original upload size. Each request yields three
//! PNG artifacts: the full-resolution reconstruction, a preview, and a
//! before/after comparison.
//!
//! ## Example
//!
//! ```no_run
//! use pixelfill::{Config, Pipeline};
//!
//! # fn main() -> pixelfill::Result<()> {
//! let pipeline = Pipeline::new(Config::default())?;
//!
//! if pipeline.is_ready() {
//!     let bytes = std::fs::read("damaged.jpg")?;
//!     let completion = pipeline.process(&bytes)?;
//!     for artifact in completion.artifacts() {
//!         artifact.write_to_dir("out")?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod image;
pub mod model;
pub mod pipeline;

#[cfg(test)]
mod testing;

pub use error::{Error, ErrorKind, Result};
pub use pipeline::{Completion, Config, ModelStatus, Pipeline};
