//! The forward-pass seam and its ONNX Runtime implementation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;

use crate::error::{Error, Result};
use crate::image::ImageTensor;

/// A trained model viewed as a pure function from tensor to tensor.
///
/// Implementations must be safe to call from several threads at once.
pub trait Predictor: Send + Sync {
    /// Run one forward pass on an NCHW batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the forward pass fails.
    fn predict(&self, input: &ImageTensor) -> Result<ImageTensor>;
}

/// ONNX Runtime predictor backed by a pool of independent sessions.
///
/// Each forward pass locks one session; a pass only waits when every
/// session in the pool is busy.
pub struct OnnxPredictor {
    sessions: Vec<Mutex<Session>>,
    next: AtomicUsize,
}

impl OnnxPredictor {
    /// Wrap already-built sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if `sessions` is empty.
    pub fn new(sessions: Vec<Session>) -> Result<Self> {
        if sessions.is_empty() {
            return Err(Error::InvalidParameter {
                name: "sessions".to_string(),
                reason: "at least one session is required".to_string(),
            });
        }

        Ok(Self {
            sessions: sessions.into_iter().map(Mutex::new).collect(),
            next: AtomicUsize::new(0),
        })
    }

    /// Number of sessions in the pool.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.sessions.len()
    }

    fn acquire(&self) -> MutexGuard<'_, Session> {
        let len = self.sessions.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % len;

        for offset in 0..len {
            match self.sessions[(start + offset) % len].try_lock() {
                Ok(guard) => return guard,
                Err(TryLockError::Poisoned(poisoned)) => return poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {}
            }
        }

        // All busy: wait on our round-robin slot
        self.sessions[start]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Predictor for OnnxPredictor {
    fn predict(&self, input: &ImageTensor) -> Result<ImageTensor> {
        let input_value =
            Tensor::from_array(input.clone()).map_err(|source| Error::Inference { source })?;

        let mut session = self.acquire();

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|source| Error::Inference { source })?;

        // Get first output
        let output = outputs
            .values()
            .next()
            .ok_or_else(|| Error::ShapeMismatch {
                expected: "reconstruction output".to_string(),
                actual: "no output".to_string(),
            })?;

        extract_array4(&output)
    }
}

impl std::fmt::Debug for OnnxPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxPredictor")
            .field("pool_size", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

/// Extract a 4D array from an ONNX value.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn extract_array4(value: &ort::value::ValueRef<'_>) -> Result<Array4<f32>> {
    let (shape_info, data) = value
        .try_extract_tensor::<f32>()
        .map_err(|source| Error::Inference { source })?;

    // Safe: tensor dimensions are always non-negative and within bounds
    let dims: Vec<usize> = shape_info.iter().map(|&x| x as usize).collect();

    if dims.len() != 4 {
        return Err(Error::ShapeMismatch {
            expected: "4D tensor".to_string(),
            actual: format!("{}D tensor", dims.len()),
        });
    }

    Array4::from_shape_vec((dims[0], dims[1], dims[2], dims[3]), data.to_vec()).map_err(|_| {
        Error::ShapeMismatch {
            expected: format!("{dims:?}"),
            actual: "reshape failed".to_string(),
        }
    })
}
