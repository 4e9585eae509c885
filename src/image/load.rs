//! Image decoding and normalization.

use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use ndarray::Array4;

use crate::error::{Error, Result};

use super::{ImageTensor, Size, RESAMPLE_FILTER, RGB_CHANNELS};

/// Encodings accepted for uploads.
pub const SUPPORTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Bmp,
    ImageFormat::Gif,
];

/// A decoded upload, forced to RGB.
#[derive(Debug, Clone)]
pub struct InputImage {
    pixels: RgbImage,
    display: RgbImage,
}

impl InputImage {
    /// Dimensions of the upload before any resize.
    #[must_use]
    pub fn original_size(&self) -> Size {
        self.pixels.dimensions().into()
    }

    /// Full-resolution RGB pixels.
    #[must_use]
    pub const fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Fixed-size copy used for side-by-side display.
    #[must_use]
    pub const fn display(&self) -> &RgbImage {
        &self.display
    }
}

/// Decode raw bytes into an image, rejecting encodings outside [`SUPPORTED_FORMATS`].
///
/// # Errors
///
/// Returns an error if the format is not recognized or not allowed, or the
/// payload is corrupt.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    let format = image::guess_format(bytes).map_err(|source| Error::Decode { source })?;

    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(Error::UnsupportedFormat {
            format: format!("{format:?}"),
        });
    }

    image::load_from_memory_with_format(bytes, format).map_err(|source| Error::Decode { source })
}

/// Decode an upload and derive the display copy and the model input tensor.
///
/// The image is:
/// 1. Decoded and converted to RGB (alpha and extra channels are dropped)
/// 2. Resized to `preview_size` for display
/// 3. Resized to `input_size` and scaled to [0, 1] as an NCHW tensor (1, 3, H, W)
///
/// The original dimensions are kept on the returned [`InputImage`].
///
/// # Errors
///
/// Returns an error if the bytes are not a supported image or the image is empty.
pub fn normalize(
    bytes: &[u8],
    input_size: Size,
    preview_size: Size,
) -> Result<(InputImage, ImageTensor)> {
    let decoded = decode(bytes)?;

    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::UnsupportedDimensions {
            width,
            height,
            reason: "image has no pixels".to_string(),
        });
    }

    let pixels = decoded.to_rgb8();
    let display = image::imageops::resize(
        &pixels,
        preview_size.width,
        preview_size.height,
        RESAMPLE_FILTER,
    );
    let tensor = image_to_tensor(&pixels, input_size);

    tracing::debug!(
        original = %Size::new(width, height),
        input = %input_size,
        preview = %preview_size,
        "Normalized upload"
    );

    Ok((InputImage { pixels, display }, tensor))
}

/// Convert an RGB image to a [0, 1] NCHW tensor of the given spatial size.
#[allow(clippy::cast_possible_truncation)]
fn image_to_tensor(img: &RgbImage, size: Size) -> ImageTensor {
    let resized = image::imageops::resize(img, size.width, size.height, RESAMPLE_FILTER);

    let (width, height) = (size.width as usize, size.height as usize);

    let mut tensor = Array4::<f32>::zeros((1, RGB_CHANNELS, height, width));

    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..RGB_CHANNELS {
            tensor[[0, c, y, x]] = f32::from(pixel[c]) / 255.0;
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use image::{Rgb, Rgba, RgbaImage};
    use rand::{Rng, SeedableRng};

    fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    #[test]
    fn test_tensor_shape() {
        let img = DynamicImage::new_rgb8(100, 100);
        let bytes = encode(&img, ImageFormat::Png);

        let (input, tensor) = normalize(&bytes, Size::new(128, 128), Size::new(300, 300)).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 128, 128]);
        assert_eq!(input.original_size(), Size::new(100, 100));
        assert_eq!(input.display().dimensions(), (300, 300));
    }

    #[test]
    fn test_tensor_shape_ignores_input_size() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);

        for _ in 0..8 {
            let width = rng.random_range(1..400);
            let height = rng.random_range(1..400);
            let img = DynamicImage::new_rgb8(width, height);

            for format in [ImageFormat::Png, ImageFormat::Jpeg] {
                let bytes = encode(&img, format);
                let (input, tensor) =
                    normalize(&bytes, Size::new(64, 48), Size::new(30, 20)).unwrap();

                assert_eq!(tensor.shape(), &[1, 3, 48, 64]);
                assert_eq!(input.original_size(), Size::new(width, height));
                assert_eq!(input.display().dimensions(), (30, 20));
            }
        }
    }

    #[test]
    fn test_normalization_range() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 40, Rgb([255, 255, 255])));
        let bytes = encode(&img, ImageFormat::Png);

        let (_, tensor) = normalize(&bytes, Size::new(16, 16), Size::new(8, 8)).unwrap();

        let min = tensor.iter().copied().fold(f32::INFINITY, f32::min);
        let max = tensor.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        // White image should be all 1.0
        assert!((min - 1.0).abs() < 0.01);
        assert!((max - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_alpha_is_dropped() {
        // Fully transparent red stays red: no blending against a background.
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 0])));
        let bytes = encode(&img, ImageFormat::Png);

        let (input, tensor) = normalize(&bytes, Size::new(4, 4), Size::new(4, 4)).unwrap();

        assert_eq!(input.pixels().get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert!((tensor[[0, 0, 2, 2]] - 1.0).abs() < 0.01);
        assert!(tensor[[0, 1, 2, 2]].abs() < 0.01);
    }

    #[test]
    fn test_grayscale_becomes_rgb() {
        let img = DynamicImage::new_luma8(12, 9);
        let bytes = encode(&img, ImageFormat::Png);

        let (input, tensor) = normalize(&bytes, Size::new(8, 8), Size::new(8, 8)).unwrap();

        assert_eq!(input.original_size(), Size::new(12, 9));
        assert_eq!(tensor.shape(), &[1, 3, 8, 8]);
    }

    #[test]
    fn test_rejects_non_image() {
        let err = normalize(b"definitely not an image", Size::new(8, 8), Size::new(8, 8))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Decode);
    }

    #[test]
    fn test_rejects_format_outside_allow_list() {
        // TIFF little-endian magic.
        let err = decode(b"II*\0\x08\0\0\0\0\0").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_rejects_truncated_png() {
        let img = DynamicImage::new_rgb8(32, 32);
        let bytes = encode(&img, ImageFormat::Png);

        let err = decode(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }
}
