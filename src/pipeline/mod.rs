//! Image completion pipeline.

mod completion;
mod inference;

pub use completion::{Completion, Config, ModelStatus, Pipeline};
pub use inference::{clamp_unit, infer};
