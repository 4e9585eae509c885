//! Rendering reconstruction tensors back into images.

use image::{imageops, Rgb, RgbImage};

use crate::error::{Error, Result};

use super::{ImageTensor, Size, RESAMPLE_FILTER, RGB_CHANNELS};

/// Images derived from one reconstruction.
#[derive(Debug, Clone)]
pub struct Rendered {
    /// Reconstruction at the preview size.
    pub preview: RgbImage,
    /// Reconstruction at the original upload size.
    pub full_resolution: RgbImage,
    /// Display copy and preview side by side.
    pub comparison: RgbImage,
}

/// Render a reconstruction at preview and original sizes, plus a before/after composite.
///
/// `display` is the input's display copy; it is resized to `preview_size`
/// if it does not already match.
///
/// # Errors
///
/// Returns an error if the tensor is not a single RGB image or a target size is empty.
pub fn render(
    tensor: &ImageTensor,
    original_size: Size,
    preview_size: Size,
    display: &RgbImage,
) -> Result<Rendered> {
    for size in [original_size, preview_size] {
        if size.is_empty() {
            return Err(Error::UnsupportedDimensions {
                width: size.width,
                height: size.height,
                reason: "render target has no pixels".to_string(),
            });
        }
    }

    let reconstructed = tensor_to_image(tensor)?;

    let preview = imageops::resize(
        &reconstructed,
        preview_size.width,
        preview_size.height,
        RESAMPLE_FILTER,
    );
    let full_resolution = imageops::resize(
        &reconstructed,
        original_size.width,
        original_size.height,
        RESAMPLE_FILTER,
    );

    let comparison = if display.dimensions() == (preview_size.width, preview_size.height) {
        compose_comparison(display, &preview)?
    } else {
        let display =
            imageops::resize(display, preview_size.width, preview_size.height, RESAMPLE_FILTER);
        compose_comparison(&display, &preview)?
    };

    Ok(Rendered {
        preview,
        full_resolution,
        comparison,
    })
}

/// Paste `before` at x = 0 and `after` at x = width on a canvas twice as wide.
///
/// # Errors
///
/// Returns an error if the two images differ in size.
pub fn compose_comparison(before: &RgbImage, after: &RgbImage) -> Result<RgbImage> {
    if before.dimensions() != after.dimensions() {
        return Err(Error::ShapeMismatch {
            expected: Size::from(before.dimensions()).to_string(),
            actual: Size::from(after.dimensions()).to_string(),
        });
    }

    let (width, height) = before.dimensions();
    let mut canvas = RgbImage::new(width * 2, height);
    imageops::replace(&mut canvas, before, 0, 0);
    imageops::replace(&mut canvas, after, i64::from(width), 0);

    Ok(canvas)
}

/// Convert a [0, 1] NCHW tensor of shape (1, 3, H, W) to an RGB image.
///
/// # Errors
///
/// Returns an error if the tensor shape is not (1, 3, H, W).
#[allow(clippy::cast_possible_truncation)]
pub fn tensor_to_image(tensor: &ImageTensor) -> Result<RgbImage> {
    let (batch, channels, height, width) = tensor.dim();
    if batch != 1 || channels != RGB_CHANNELS || height == 0 || width == 0 {
        return Err(Error::ShapeMismatch {
            expected: "[1, 3, H, W]".to_string(),
            actual: format!("{:?}", tensor.shape()),
        });
    }

    let img = RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([
            denormalize(tensor[[0, 0, y, x]]),
            denormalize(tensor[[0, 1, y, x]]),
            denormalize(tensor[[0, 2, y, x]]),
        ])
    });

    Ok(img)
}

/// Denormalize a value from [0, 1] to [0, 255] with clamping.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn denormalize(value: f32) -> u8 {
    // NaN saturates to 0 in the cast
    (value.clamp(0.0, 1.0) * 255.0) as u8
}
