//! Checkpoint discovery, loading, and caching.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use ort::session::Session;

use crate::error::{Error, Result};
use crate::image::ImageTensor;

use super::predictor::{OnnxPredictor, Predictor};

/// Default checkpoint location, relative to the working directory.
pub const DEFAULT_CHECKPOINT: &str = "outputs/pixelrnn_best_model.onnx";

/// Custom metadata key holding the training epoch.
pub const EPOCH_METADATA_KEY: &str = "epoch";

/// First byte of every ONNX `ModelProto`: field 1 (`ir_version`), varint.
const ONNX_LEADING_TAG: u8 = 0x08;

/// Which compute device the caller allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DevicePreference {
    /// Use an accelerator when one is available.
    #[default]
    Auto,
    /// Always run on the CPU.
    Cpu,
}

/// Compute device a model runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Accelerator,
}

impl Device {
    /// Resolve a preference against the devices present on this machine.
    ///
    /// Queried once per load, never per request.
    #[must_use]
    pub fn select(preference: DevicePreference) -> Self {
        match preference {
            DevicePreference::Cpu => Self::Cpu,
            DevicePreference::Auto => {
                if CUDAExecutionProvider::default().is_available().unwrap_or(false) {
                    Self::Accelerator
                } else {
                    Self::Cpu
                }
            }
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Accelerator => write!(f, "cuda"),
        }
    }
}

/// Facts about a loaded checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointMetadata {
    pub path: PathBuf,
    /// Training epoch recorded in the checkpoint, if any.
    pub epoch: Option<u64>,
}

/// A loaded, inference-only model and the device it runs on.
///
/// Cheap to clone; clones share the underlying model.
#[derive(Clone)]
pub struct ModelHandle {
    predictor: Arc<dyn Predictor>,
    device: Device,
    metadata: CheckpointMetadata,
}

impl ModelHandle {
    #[must_use]
    pub fn new(
        predictor: Arc<dyn Predictor>,
        device: Device,
        metadata: CheckpointMetadata,
    ) -> Self {
        Self {
            predictor,
            device,
            metadata,
        }
    }

    /// Run the raw forward pass. Prefer [`crate::pipeline::infer`], which validates and clamps.
    ///
    /// # Errors
    ///
    /// Returns an error if the forward pass fails.
    pub fn predict(&self, input: &ImageTensor) -> Result<ImageTensor> {
        self.predictor.predict(input)
    }

    #[must_use]
    pub const fn device(&self) -> Device {
        self.device
    }

    #[must_use]
    pub const fn metadata(&self) -> &CheckpointMetadata {
        &self.metadata
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("device", &self.device)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Result of looking for a checkpoint.
#[derive(Debug, Clone)]
pub enum Checkpoint {
    /// Nothing on disk yet; the model has not been provided.
    Missing { path: PathBuf },
    /// A usable model.
    Ready(ModelHandle),
}

impl Checkpoint {
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    #[must_use]
    pub const fn handle(&self) -> Option<&ModelHandle> {
        match self {
            Self::Ready(handle) => Some(handle),
            Self::Missing { .. } => None,
        }
    }

    #[must_use]
    pub fn into_handle(self) -> Option<ModelHandle> {
        match self {
            Self::Ready(handle) => Some(handle),
            Self::Missing { .. } => None,
        }
    }

    /// Metadata of the loaded checkpoint; `None` when missing.
    #[must_use]
    pub fn metadata(&self) -> Option<&CheckpointMetadata> {
        self.handle().map(ModelHandle::metadata)
    }
}

/// Options applied to every model built by a [`CheckpointLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoaderOptions {
    pub device: DevicePreference,
    /// Number of independent sessions, i.e. concurrent forward passes.
    pub sessions: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            device: DevicePreference::Auto,
            sessions: 1,
        }
    }
}

type BuildFn = dyn Fn(&Path) -> Result<ModelHandle> + Send + Sync;
type Slot = Arc<Mutex<Option<ModelHandle>>>;

static SHARED_LOADERS: OnceLock<Mutex<HashMap<LoaderOptions, Arc<CheckpointLoader>>>> =
    OnceLock::new();

/// Loads checkpoints once and hands out shared handles.
///
/// Concurrent loads of the same path wait on a per-path guard, so the file
/// is read at most once until [`CheckpointLoader::invalidate`] is called.
/// Missing files and failed loads are not cached.
pub struct CheckpointLoader {
    build: Box<BuildFn>,
    slots: Mutex<HashMap<PathBuf, Slot>>,
}

impl CheckpointLoader {
    /// Loader that builds ONNX Runtime models.
    #[must_use]
    pub fn new(options: LoaderOptions) -> Self {
        Self::with_builder(move |path| load_onnx(path, options))
    }

    /// Process-wide ONNX loader for `options`.
    ///
    /// Every call with equal options returns the same loader, so a checkpoint
    /// is loaded once per process however many pipelines are built.
    #[must_use]
    pub fn shared(options: LoaderOptions) -> Arc<Self> {
        let mut loaders = SHARED_LOADERS
            .get_or_init(Mutex::default)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            loaders
                .entry(options)
                .or_insert_with(|| Arc::new(Self::new(options))),
        )
    }

    /// Loader with a custom model builder, called only for files that exist.
    pub fn with_builder<F>(build: F) -> Self
    where
        F: Fn(&Path) -> Result<ModelHandle> + Send + Sync + 'static,
    {
        Self {
            build: Box::new(build),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Load the checkpoint at `path`, reusing a cached handle when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded as a model.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Checkpoint> {
        let path = path.as_ref();

        if !path.is_file() {
            tracing::warn!("No checkpoint at {}", path.display());
            return Ok(Checkpoint::Missing {
                path: path.to_path_buf(),
            });
        }

        let key = fs::canonicalize(path)?;
        let slot = self.slot(&key);

        let mut cached = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = cached.as_ref() {
            tracing::debug!("Reusing loaded checkpoint {}", key.display());
            return Ok(Checkpoint::Ready(handle.clone()));
        }

        tracing::info!("Loading checkpoint {}", path.display());
        let handle = (self.build)(path)?;
        tracing::info!(
            device = %handle.device(),
            epoch = ?handle.metadata().epoch,
            "Checkpoint loaded"
        );

        *cached = Some(handle.clone());
        Ok(Checkpoint::Ready(handle))
    }

    /// Drop the cached handle for `path`. Returns whether one was cached.
    ///
    /// Handles already given out stay valid.
    pub fn invalidate<P: AsRef<Path>>(&self, path: P) -> bool {
        let Ok(key) = fs::canonicalize(path.as_ref()) else {
            return false;
        };

        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);

        let Some(slot) = slot else {
            return false;
        };
        let mut cached = slot.lock().unwrap_or_else(PoisonError::into_inner);
        cached.take().is_some()
    }

    fn slot(&self, key: &Path) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.to_path_buf()).or_default())
    }
}

impl Default for CheckpointLoader {
    fn default() -> Self {
        Self::new(LoaderOptions::default())
    }
}

impl fmt::Debug for CheckpointLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointLoader").finish_non_exhaustive()
    }
}

/// Build an inference-only ONNX model from `path`.
fn load_onnx(path: &Path, options: LoaderOptions) -> Result<ModelHandle> {
    check_header(path)?;

    let device = Device::select(options.device);
    tracing::info!(%device, sessions = options.sessions, "Selected compute device");

    let mut sessions = Vec::with_capacity(options.sessions.max(1));
    for _ in 0..options.sessions.max(1) {
        sessions.push(build_session(path, device)?);
    }

    let epoch = read_epoch(&sessions[0]);
    let predictor = OnnxPredictor::new(sessions)?;

    Ok(ModelHandle::new(
        Arc::new(predictor),
        device,
        CheckpointMetadata {
            path: path.to_path_buf(),
            epoch,
        },
    ))
}

/// Reject files that cannot be an ONNX model before handing them to the runtime.
fn check_header(path: &Path) -> Result<()> {
    let mut first = [0u8; 1];
    let read = fs::File::open(path)?.read(&mut first)?;

    let reason = if read == 0 {
        "file is empty"
    } else if first[0] != ONNX_LEADING_TAG {
        "not an ONNX model"
    } else {
        return Ok(());
    };

    Err(Error::InvalidCheckpoint {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    })
}

fn build_session(path: &Path, device: Device) -> Result<Session> {
    let model_load = |source: ort::Error| Error::ModelLoad {
        path: path.to_path_buf(),
        source,
    };

    let session = match device {
        // CUDA registration falls back to CPU on failure
        Device::Accelerator => Session::builder()
            .map_err(model_load)?
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .map_err(|err| Error::ExecutionProvider {
                device: device.to_string(),
                reason: err.to_string(),
            })?
            .commit_from_file(path),
        Device::Cpu => Session::builder().map_err(model_load)?.commit_from_file(path),
    };

    session.map_err(model_load)
}

fn read_epoch(session: &Session) -> Option<u64> {
    let metadata = session.metadata().ok()?;
    let value = metadata.custom(EPOCH_METADATA_KEY)?;
    value.trim().parse().ok()
}
