//! Stand-in predictors for tests.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::error::{Error, Result};
use crate::image::{ImageTensor, Size};
use crate::model::{CheckpointMetadata, Device, ModelHandle, Predictor};

/// Returns its input unchanged.
pub struct Identity;

impl Predictor for Identity {
    fn predict(&self, input: &ImageTensor) -> Result<ImageTensor> {
        Ok(input.clone())
    }
}

/// Stretches values past [0, 1] in both directions.
pub struct Overshoot;

impl Predictor for Overshoot {
    fn predict(&self, input: &ImageTensor) -> Result<ImageTensor> {
        Ok(input.mapv(|v| v.mul_add(3.0, -1.0)))
    }
}

/// Fails the first `failures` calls, then behaves like [`Identity`].
pub struct Flaky {
    failures: usize,
    calls: AtomicUsize,
}

impl Flaky {
    pub const fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Predictor for Flaky {
    fn predict(&self, input: &ImageTensor) -> Result<ImageTensor> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(Error::Prediction {
                reason: "device memory exhausted".to_string(),
            });
        }
        Ok(input.clone())
    }
}

/// Drops the last row, as a model exported for another resolution would.
pub struct WrongShape;

impl Predictor for WrongShape {
    fn predict(&self, input: &ImageTensor) -> Result<ImageTensor> {
        let (n, c, h, w) = input.dim();
        Ok(ImageTensor::zeros((n, c, h.saturating_sub(1), w)))
    }
}

pub fn handle<P: Predictor + 'static>(predictor: P) -> ModelHandle {
    ModelHandle::new(
        Arc::new(predictor),
        Device::Cpu,
        CheckpointMetadata {
            path: PathBuf::from("outputs/test.onnx"),
            epoch: Some(3),
        },
    )
}

/// A gradient image encoded in `format`.
#[allow(clippy::cast_possible_truncation)]
pub fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });

    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

/// A serialized ONNX model whose single `Identity` node maps a FLOAT
/// `[1, 3, height, width]` input `x` straight to its output `y`.
///
/// `epoch`, when given, is stored as the `epoch` metadata entry.
pub fn identity_onnx(size: Size, epoch: Option<&str>) -> Vec<u8> {
    let dims = [1, 3, u64::from(size.height), u64::from(size.width)];

    let mut node = Vec::new();
    put_bytes(&mut node, 1, b"x");
    put_bytes(&mut node, 2, b"y");
    put_bytes(&mut node, 4, b"Identity");

    let mut graph = Vec::new();
    put_bytes(&mut graph, 1, &node);
    put_bytes(&mut graph, 2, b"identity");
    put_bytes(&mut graph, 11, &float_tensor_info("x", &dims));
    put_bytes(&mut graph, 12, &float_tensor_info("y", &dims));

    let mut opset = Vec::new();
    put_varint_field(&mut opset, 2, 13);

    // ir_version must come first; the loader checks the leading tag
    let mut model = Vec::new();
    put_varint_field(&mut model, 1, 8);
    put_bytes(&mut model, 2, b"pixelfill-tests");
    put_bytes(&mut model, 7, &graph);
    put_bytes(&mut model, 8, &opset);
    if let Some(epoch) = epoch {
        let mut entry = Vec::new();
        put_bytes(&mut entry, 1, crate::model::EPOCH_METADATA_KEY.as_bytes());
        put_bytes(&mut entry, 2, epoch.as_bytes());
        put_bytes(&mut model, 14, &entry);
    }
    model
}

/// `ValueInfoProto` for a FLOAT tensor of fixed shape.
fn float_tensor_info(name: &str, dims: &[u64]) -> Vec<u8> {
    let mut shape = Vec::new();
    for &dim in dims {
        let mut dimension = Vec::new();
        put_varint_field(&mut dimension, 1, dim);
        put_bytes(&mut shape, 1, &dimension);
    }

    let mut tensor = Vec::new();
    put_varint_field(&mut tensor, 1, 1); // FLOAT
    put_bytes(&mut tensor, 2, &shape);

    let mut type_proto = Vec::new();
    put_bytes(&mut type_proto, 1, &tensor);

    let mut info = Vec::new();
    put_bytes(&mut info, 1, name.as_bytes());
    put_bytes(&mut info, 2, &type_proto);
    info
}

#[allow(clippy::cast_possible_truncation)]
fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

fn put_varint_field(buf: &mut Vec<u8>, field: u64, value: u64) {
    put_varint(buf, field << 3);
    put_varint(buf, value);
}

fn put_bytes(buf: &mut Vec<u8>, field: u64, bytes: &[u8]) {
    put_varint(buf, (field << 3) | 2);
    put_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}
