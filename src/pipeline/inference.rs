//! The single forward pass.

use crate::error::{Error, Result};
use crate::image::{ImageTensor, RGB_CHANNELS};
use crate::model::ModelHandle;

/// Run one no-gradient forward pass and clamp the result to [0, 1].
///
/// The input must be a single NCHW RGB image; the output must have the
/// same shape. NaN outputs become 0.
///
/// # Errors
///
/// Returns an error if the input or output shape is wrong, or the forward pass fails.
pub fn infer(model: &ModelHandle, input: &ImageTensor) -> Result<ImageTensor> {
    let (batch, channels, height, width) = input.dim();
    if batch != 1 || channels != RGB_CHANNELS || height == 0 || width == 0 {
        return Err(Error::ShapeMismatch {
            expected: "[1, 3, H, W]".to_string(),
            actual: format!("{:?}", input.shape()),
        });
    }

    tracing::debug!(device = %model.device(), shape = ?input.shape(), "Running forward pass");

    let mut output = model.predict(input)?;

    if output.shape() != input.shape() {
        return Err(Error::ShapeMismatch {
            expected: format!("{:?}", input.shape()),
            actual: format!("{:?}", output.shape()),
        });
    }

    clamp_unit(&mut output);
    Ok(output)
}

/// Clamp every value into [0, 1] in place.
pub fn clamp_unit(tensor: &mut ImageTensor) {
    tensor.mapv_inplace(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) });
}
